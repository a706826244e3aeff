//! Host clock and delay

use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use twowire_hal::Clock;

/// Microseconds since creation; relaxing yields the thread
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_us(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    fn relax(&self) {
        thread::yield_now();
    }
}

/// Sleeping delay
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_across_delay() {
        let clock = StdClock::new();
        let start = clock.now_us();
        StdDelay.delay_us(200);
        assert!(clock.elapsed_since(start) >= 200);
    }
}
