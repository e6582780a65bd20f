//! Wall-clock abstraction so the tick loop and cadence gates can be tested
//! with a virtual clock instead of real sleeps.

use std::time::Duration;

use chrono::{DateTime, Utc};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, d: Duration);
}

/// The real thing: `chrono::Utc::now` + `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeClock;
    use super::*;

    #[test]
    fn fake_clock_advances_on_sleep() {
        let start = "2025-06-01T00:00:00Z".parse().unwrap();
        let clock = FakeClock::at(start);
        clock.sleep(Duration::from_secs(20));
        assert_eq!(clock.now(), start + chrono::TimeDelta::seconds(20));
        assert_eq!(clock.slept.borrow().as_slice(), &[Duration::from_secs(20)]);
    }
}
