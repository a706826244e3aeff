//! Time source abstraction
//!
//! Bit-banging needs two notions of time: short fixed waits between line
//! transitions (served by `embedded_hal::delay::DelayNs`) and a monotonic
//! clock to bound how long a slave may stretch SCL. This module covers the
//! latter.

/// Monotonic microsecond clock
pub trait Clock {
    /// Microseconds since an arbitrary, fixed origin
    fn now_us(&self) -> u64;

    /// Give other work a chance to run while polling
    ///
    /// Called between polls of a stretched clock line. The default does
    /// nothing (busy polling); hosted implementations yield the thread.
    fn relax(&self) {}

    /// Microseconds elapsed since `start` (a previous [`Clock::now_us`] value)
    fn elapsed_since(&self, start: u64) -> u64 {
        self.now_us().saturating_sub(start)
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }

    fn relax(&self) {
        (**self).relax();
    }
}
