use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::{Add, AddAssign, Sub};

/// Simulated time in minutes.
///
/// Wraps an `f64` so it can live in ordered collections; comparison uses
/// `f64::total_cmp`, which gives a total order even for values the clock
/// would refuse to schedule.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(f64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0.0);

    pub const fn from_minutes(minutes: f64) -> Self {
        SimTime(minutes)
    }

    pub fn as_minutes(self) -> f64 {
        self.0
    }

    /// True if this value may be used as a delay: finite and not negative.
    pub fn is_valid_delay(self) -> bool {
        self.0.is_finite() && self.0 >= 0.0
    }
}

impl From<f64> for SimTime {
    fn from(minutes: f64) -> Self {
        SimTime(minutes)
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 + rhs.0)
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        self.0 += rhs.0;
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 - rhs.0)
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_validity() {
        assert!(SimTime::ZERO.is_valid_delay());
        assert!(SimTime::from(2.5).is_valid_delay());
        assert!(!SimTime::from(-0.1).is_valid_delay());
        assert!(!SimTime::from(f64::NAN).is_valid_delay());
        assert!(!SimTime::from(f64::INFINITY).is_valid_delay());
    }

    #[test]
    fn test_ordering_and_arithmetic() {
        let a = SimTime::from(3.0);
        let b = SimTime::from(5.0);
        assert!(a < b);
        assert_eq!(a + b, SimTime::from(8.0));
        assert_eq!(b - a, SimTime::from(2.0));
        assert_eq!(format!("{}", a), "3.00");
    }
}
