use super::errors::SimError;
use super::time::SimTime;
use log::trace;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// An action waiting in the queue for its instant.
#[derive(Debug)]
pub struct ScheduledEvent<A> {
    pub time: SimTime,
    pub sequence: u64,
    pub action: A,
}

impl<A> PartialEq for ScheduledEvent<A> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence == other.sequence
    }
}

impl<A> Eq for ScheduledEvent<A> {}

impl<A> PartialOrd for ScheduledEvent<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A> Ord for ScheduledEvent<A> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (BinaryHeap is max-heap by default)
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Virtual clock plus the queue of pending events.
///
/// Events pop in `(time, sequence)` order. The sequence number is handed out
/// at scheduling time, so events for the same instant run in the order they
/// were scheduled. Time never moves backwards.
pub struct Clock<A> {
    event_queue: BinaryHeap<ScheduledEvent<A>>,
    sequence_counter: u64,
    now: SimTime,
}

impl<A> Clock<A> {
    /// Create a clock at time zero with an empty queue
    pub fn new() -> Self {
        Self {
            event_queue: BinaryHeap::new(),
            sequence_counter: 0,
            now: SimTime::ZERO,
        }
    }

    /// Current simulated time
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedule `action` to run `delay` after now, returning its sequence number
    pub fn schedule(&mut self, delay: SimTime, action: A) -> Result<u64, SimError> {
        if !delay.is_valid_delay() {
            return Err(SimError::InvalidDelay(delay.as_minutes()));
        }

        let sequence = self.sequence_counter;
        let time = self.now + delay;
        trace!("schedule #{} at t={}", sequence, time);

        self.event_queue.push(ScheduledEvent {
            time,
            sequence,
            action,
        });
        self.sequence_counter += 1;

        Ok(sequence)
    }

    /// Check if there are any events remaining in the queue
    pub fn has_events(&self) -> bool {
        !self.event_queue.is_empty()
    }

    /// Number of events still queued
    pub fn pending(&self) -> usize {
        self.event_queue.len()
    }

    /// Time of the earliest pending event without removing it
    pub fn peek_next_time(&self) -> Option<SimTime> {
        self.event_queue.peek().map(|event| event.time)
    }

    /// Pop the earliest event if it is due at or before `until`, moving the
    /// clock to its time.
    pub fn pop_due(&mut self, until: Option<SimTime>) -> Option<ScheduledEvent<A>> {
        let next_time = self.peek_next_time()?;
        if until.map_or(false, |limit| next_time > limit) {
            return None;
        }

        let event = self.event_queue.pop()?;
        debug_assert!(event.time >= self.now, "clock moved backwards");
        self.now = event.time;
        Some(event)
    }

    /// Move the clock forward to `time`. Earlier times are ignored.
    pub fn advance_to(&mut self, time: SimTime) {
        if time > self.now {
            self.now = time;
        }
    }

    /// Run events until the queue drains or the next one lies past `until`.
    ///
    /// The handler may schedule more events through the clock it is given;
    /// they take part in the same run. When a bound is given the clock ends
    /// on it. Returns the number of events executed.
    pub fn run<E, F>(&mut self, until: Option<SimTime>, mut handler: F) -> Result<usize, E>
    where
        F: FnMut(&mut Self, A) -> Result<(), E>,
    {
        let mut executed = 0;
        while let Some(event) = self.pop_due(until) {
            trace!("run #{} at t={}", event.sequence, event.time);
            handler(self, event.action)?;
            executed += 1;
        }

        if let Some(limit) = until {
            self.advance_to(limit);
        }

        Ok(executed)
    }
}

impl<A> Default for Clock<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(minutes: f64) -> SimTime {
        SimTime::from(minutes)
    }

    #[test]
    fn test_events_pop_in_time_order() {
        let mut clock = Clock::new();
        clock.schedule(t(5.0), "late").unwrap();
        clock.schedule(t(1.0), "early").unwrap();
        clock.schedule(t(3.0), "middle").unwrap();

        let mut seen = Vec::new();
        clock
            .run::<SimError, _>(None, |clock, action| {
                seen.push((clock.now().as_minutes(), action));
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, vec![(1.0, "early"), (3.0, "middle"), (5.0, "late")]);
        assert_eq!(clock.now(), t(5.0));
    }

    #[test]
    fn test_simultaneous_events_run_in_scheduling_order() {
        let mut clock = Clock::new();
        for name in ["a", "b", "c", "d"] {
            clock.schedule(t(2.0), name).unwrap();
        }

        let mut seen = Vec::new();
        clock
            .run::<SimError, _>(None, |_, action| {
                seen.push(action);
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_negative_and_nan_delays_are_rejected() {
        let mut clock: Clock<()> = Clock::new();
        assert_eq!(
            clock.schedule(t(-1.0), ()),
            Err(SimError::InvalidDelay(-1.0))
        );
        assert!(clock.schedule(t(f64::NAN), ()).is_err());
        assert!(!clock.has_events());
    }

    #[test]
    fn test_reentrant_scheduling_is_visible_in_same_run() {
        let mut clock = Clock::new();
        clock.schedule(t(1.0), 3u32).unwrap();

        // Each action schedules a follow-up until the counter reaches zero
        let mut times = Vec::new();
        let executed = clock
            .run::<SimError, _>(None, |clock, remaining| {
                times.push(clock.now().as_minutes());
                if remaining > 0 {
                    clock.schedule(t(2.0), remaining - 1)?;
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(executed, 4);
        assert_eq!(times, vec![1.0, 3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_zero_delay_from_handler_runs_after_already_queued_peers() {
        let mut clock = Clock::new();
        clock.schedule(t(1.0), "first").unwrap();
        clock.schedule(t(1.0), "second").unwrap();

        let mut seen = Vec::new();
        clock
            .run::<SimError, _>(None, |clock, action| {
                seen.push(action);
                if action == "first" {
                    clock.schedule(SimTime::ZERO, "spawned")?;
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, vec!["first", "second", "spawned"]);
    }

    #[test]
    fn test_run_until_stops_at_bound_and_keeps_later_events() {
        let mut clock = Clock::new();
        clock.schedule(t(4.0), "at-bound").unwrap();
        clock.schedule(t(10.0), "past-bound").unwrap();

        let mut seen = Vec::new();
        let executed = clock
            .run::<SimError, _>(Some(t(4.0)), |_, action| {
                seen.push(action);
                Ok(())
            })
            .unwrap();

        assert_eq!(executed, 1);
        assert_eq!(seen, vec!["at-bound"]);
        assert_eq!(clock.pending(), 1);
        assert_eq!(clock.now(), t(4.0));

        // Bound past the last event still lands the clock on the bound
        clock
            .run::<SimError, _>(Some(t(20.0)), |_, _| Ok(()))
            .unwrap();
        assert_eq!(clock.now(), t(20.0));
    }

    #[test]
    fn test_handler_error_stops_run() {
        let mut clock = Clock::new();
        clock.schedule(t(1.0), 1).unwrap();
        clock.schedule(t(2.0), 2).unwrap();

        let result = clock.run(None, |_, action| {
            if action == 1 {
                Err("boom")
            } else {
                Ok(())
            }
        });

        assert_eq!(result, Err("boom"));
        assert_eq!(clock.pending(), 1);
    }
}
