//! Bit-level I2C signaling
//!
//! [`BitBangTransport`] emulates the I2C electrical protocol by toggling two
//! lines with software timing. Every line transition is followed by the
//! adapter's per-transition delay (`udelay`); raising SCL additionally waits
//! for slaves that stretch the clock, bounded by the adapter timeout.
//!
//! The [`Transport`] trait is the seam between wire signaling and the
//! addressing/transaction logic, so the latter can be exercised against a
//! recording transport.

use embedded_hal::delay::DelayNs;
use twowire_hal::{Clock, GpioLine};

use crate::config::BitTiming;
use crate::error::{LineFault, Timeout};

/// Wire-level primitives a transaction is composed from
pub trait Transport {
    /// START condition: SDA falls, then SCL falls (both assumed high)
    fn start(&mut self);

    /// Repeated START: release both lines, then a fresh START
    fn repeated_start(&mut self) -> Result<(), Timeout>;

    /// STOP condition: SDA low, SCL high, SDA rises (bus idle)
    fn stop(&mut self) -> Result<(), Timeout>;

    /// Shift out one byte MSB-first and sample the slave's acknowledge
    ///
    /// Returns `true` when the slave pulled SDA low (ACK).
    fn send_byte(&mut self, byte: u8) -> Result<bool, Timeout>;

    /// Shift in one byte MSB-first
    fn recv_byte(&mut self) -> Result<u8, Timeout>;

    /// Master acknowledge after a received byte
    ///
    /// `true` drives SDA low (ACK, more data wanted), `false` leaves it
    /// high (NACK, last byte).
    fn acknowledge(&mut self, ack: bool) -> Result<(), Timeout>;

    /// Short fixed pause between a NACKed address and the next attempt
    fn retry_pause(&mut self);
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn start(&mut self) {
        (**self).start();
    }

    fn repeated_start(&mut self) -> Result<(), Timeout> {
        (**self).repeated_start()
    }

    fn stop(&mut self) -> Result<(), Timeout> {
        (**self).stop()
    }

    fn send_byte(&mut self, byte: u8) -> Result<bool, Timeout> {
        (**self).send_byte(byte)
    }

    fn recv_byte(&mut self) -> Result<u8, Timeout> {
        (**self).recv_byte()
    }

    fn acknowledge(&mut self, ack: bool) -> Result<(), Timeout> {
        (**self).acknowledge(ack)
    }

    fn retry_pause(&mut self) {
        (**self).retry_pause();
    }
}

/// Bit-banged transport over one adapter's lines
///
/// Borrowed from the adapter's hardware data for the duration of one
/// transfer, while the adapter's transfer lock is held.
pub struct BitBangTransport<'a> {
    lines: &'a mut dyn GpioLine,
    delay: &'a mut dyn DelayNs,
    clock: &'a dyn Clock,
    timing: BitTiming,
    timeout_us: u64,
}

impl<'a> BitBangTransport<'a> {
    /// Create a transport
    ///
    /// # Arguments
    /// - `timing`: per-transition and address-retry delays
    /// - `timeout_us`: how long a slave may hold SCL low
    pub fn new(
        lines: &'a mut dyn GpioLine,
        delay: &'a mut dyn DelayNs,
        clock: &'a dyn Clock,
        timing: BitTiming,
        timeout_us: u64,
    ) -> Self {
        Self {
            lines,
            delay,
            clock,
            timing,
            timeout_us,
        }
    }

    fn pause(&mut self) {
        self.delay.delay_us(self.timing.udelay_us);
    }

    fn sda_low(&mut self) {
        self.lines.set_sda(false);
        self.pause();
    }

    fn sda_high(&mut self) {
        self.lines.set_sda(true);
        self.pause();
    }

    fn scl_low(&mut self) {
        self.lines.set_scl(false);
        self.pause();
    }

    /// Release SCL and wait until it actually reads high
    ///
    /// Without SCL read-back the line is assumed to follow immediately.
    /// With read-back, a slave stretching the clock is polled (yielding via
    /// [`Clock::relax`] between polls) until it lets go or the timeout
    /// elapses.
    pub fn raise_clock(&mut self) -> Result<(), Timeout> {
        self.lines.set_scl(true);
        let start = self.clock.now_us();
        while let Some(false) = self.lines.get_scl() {
            if self.clock.elapsed_since(start) >= self.timeout_us {
                warn!("SCL held low for more than {} us", self.timeout_us);
                return Err(Timeout);
            }
            self.clock.relax();
        }
        self.pause();
        Ok(())
    }

    /// Check that both lines idle high and can be toggled independently
    ///
    /// Checks that need SCL read-back are skipped on lines that cannot
    /// read SCL. Both lines are released again before returning.
    pub fn self_test(&mut self) -> Result<(), LineFault> {
        let result = self.check_lines();
        self.lines.release();
        if let Err(fault) = result {
            error!("bus self-test failed: {}", fault);
        }
        result
    }

    fn check_lines(&mut self) -> Result<(), LineFault> {
        if !self.lines.can_read_scl() {
            warn!("SCL not readable, skipping clock line checks");
        }

        let scl = self.lines.get_scl().unwrap_or(true);
        if !self.lines.get_sda() || !scl {
            return Err(LineFault::Busy);
        }

        self.sda_low();
        if self.lines.get_sda() {
            return Err(LineFault::SdaStuckHigh);
        }
        if self.lines.get_scl() == Some(false) {
            return Err(LineFault::Crosstalk);
        }

        self.sda_high();
        if !self.lines.get_sda() {
            return Err(LineFault::SdaStuckLow);
        }
        if self.lines.get_scl() == Some(false) {
            return Err(LineFault::Crosstalk);
        }

        self.scl_low();
        if self.lines.get_scl() == Some(true) {
            return Err(LineFault::SclStuckHigh);
        }
        if !self.lines.get_sda() {
            return Err(LineFault::Crosstalk);
        }

        self.lines.set_scl(true);
        self.pause();
        if self.lines.get_scl() == Some(false) {
            return Err(LineFault::SclStuckLow);
        }
        if !self.lines.get_sda() {
            return Err(LineFault::Crosstalk);
        }

        Ok(())
    }
}

impl Transport for BitBangTransport<'_> {
    fn start(&mut self) {
        self.sda_low();
        self.scl_low();
    }

    fn repeated_start(&mut self) -> Result<(), Timeout> {
        self.sda_high();
        self.raise_clock()?;
        self.sda_low();
        self.scl_low();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Timeout> {
        self.sda_low();
        self.raise_clock()?;
        self.sda_high();
        Ok(())
    }

    fn send_byte(&mut self, byte: u8) -> Result<bool, Timeout> {
        for bit in (0..8).rev() {
            self.lines.set_sda(byte & (1 << bit) != 0);
            self.pause();
            if let Err(timeout) = self.raise_clock() {
                // Leave SDA released so the bus is not blocked
                self.lines.set_sda(true);
                return Err(timeout);
            }
            self.scl_low();
        }

        self.sda_high();
        self.raise_clock()?;
        let ack = !self.lines.get_sda();
        self.scl_low();

        trace!("sent {=u8:#x}, ack={}", byte, ack);
        Ok(ack)
    }

    fn recv_byte(&mut self) -> Result<u8, Timeout> {
        self.sda_high();
        let mut byte = 0u8;
        for _ in 0..8 {
            self.raise_clock()?;
            byte = (byte << 1) | u8::from(self.lines.get_sda());
            self.scl_low();
        }
        trace!("received {=u8:#x}", byte);
        Ok(byte)
    }

    fn acknowledge(&mut self, ack: bool) -> Result<(), Timeout> {
        if ack {
            self.sda_low();
        } else {
            self.sda_high();
        }
        if let Err(timeout) = self.raise_clock() {
            self.lines.set_sda(true);
            return Err(timeout);
        }
        self.scl_low();
        self.sda_high();
        Ok(())
    }

    fn retry_pause(&mut self) {
        self.delay.delay_us(self.timing.address_retry_delay_us);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::collections::VecDeque;
    use alloc::vec::Vec;
    use core::cell::Cell;

    /// Line transitions as seen by the hardware
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Edge {
        Sda(bool),
        Scl(bool),
    }

    /// Lines with a scripted slave
    ///
    /// While the master releases SDA, reads return the next scripted slave
    /// bit (high once the script runs out).
    pub(crate) struct TestLines {
        pub sda: bool,
        pub scl: bool,
        pub readback: bool,
        pub scl_stuck_low: bool,
        pub slave_bits: VecDeque<bool>,
        /// SDA level at every SCL rising edge
        pub sampled: Vec<bool>,
        pub edges: Vec<Edge>,
    }

    impl TestLines {
        pub fn new() -> Self {
            Self {
                sda: true,
                scl: true,
                readback: true,
                scl_stuck_low: false,
                slave_bits: VecDeque::new(),
                sampled: Vec::new(),
                edges: Vec::new(),
            }
        }

        pub fn slave_sends(&mut self, byte: u8) {
            for bit in (0..8).rev() {
                self.slave_bits.push_back(byte & (1 << bit) != 0);
            }
        }

        pub fn slave_acks(&mut self) {
            self.slave_bits.push_back(false);
        }
    }

    impl GpioLine for TestLines {
        fn set_sda(&mut self, high: bool) {
            self.sda = high;
            self.edges.push(Edge::Sda(high));
        }

        fn set_scl(&mut self, high: bool) {
            if high && !self.scl {
                self.sampled.push(self.sda);
            }
            self.scl = high;
            self.edges.push(Edge::Scl(high));
        }

        fn get_sda(&mut self) -> bool {
            if !self.sda {
                return false;
            }
            if self.scl {
                self.slave_bits.pop_front().unwrap_or(true)
            } else {
                true
            }
        }

        fn get_scl(&mut self) -> Option<bool> {
            if !self.readback {
                return None;
            }
            Some(self.scl && !self.scl_stuck_low)
        }
    }

    /// Delay that only accumulates requested time
    #[derive(Default)]
    pub(crate) struct TotalDelay {
        pub total_ns: u64,
    }

    impl DelayNs for TotalDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ns += u64::from(ns);
        }
    }

    /// Clock that advances on every relax
    pub(crate) struct StepClock {
        pub now: Cell<u64>,
        pub step_us: u64,
        pub polls: Cell<u32>,
    }

    impl StepClock {
        pub fn new(step_us: u64) -> Self {
            Self {
                now: Cell::new(0),
                step_us,
                polls: Cell::new(0),
            }
        }
    }

    impl Clock for StepClock {
        fn now_us(&self) -> u64 {
            self.now.get()
        }

        fn relax(&self) {
            self.polls.set(self.polls.get() + 1);
            self.now.set(self.now.get() + self.step_us);
        }
    }

    /// Transport-level operations, in issue order
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Op {
        Start,
        RepeatedStart,
        Stop,
        Send(u8),
        Recv,
        Ack(bool),
        RetryPause,
    }

    /// Transport that records operations instead of toggling lines
    pub(crate) struct RecordingTransport {
        pub ops: Vec<Op>,
        /// Decides whether a sent byte is acknowledged
        pub acks: alloc::boxed::Box<dyn FnMut(u8) -> bool>,
        /// Bytes handed out by `recv_byte`
        pub rx: VecDeque<u8>,
        /// Fail the n-th (0-based) `recv_byte` with a timeout
        pub recv_timeout_at: Option<usize>,
        /// Fail the n-th (0-based) `acknowledge` with a timeout
        pub ack_timeout_at: Option<usize>,
        recvs: usize,
        ack_calls: usize,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self {
                ops: Vec::new(),
                acks: alloc::boxed::Box::new(|_| true),
                rx: VecDeque::new(),
                recv_timeout_at: None,
                ack_timeout_at: None,
                recvs: 0,
                ack_calls: 0,
            }
        }

        pub fn nacking(mut self, nack: impl Fn(u8) -> bool + 'static) -> Self {
            self.acks = alloc::boxed::Box::new(move |b| !nack(b));
            self
        }

        pub fn sends(&self) -> Vec<u8> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Send(b) => Some(*b),
                    _ => None,
                })
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn start(&mut self) {
            self.ops.push(Op::Start);
        }

        fn repeated_start(&mut self) -> Result<(), Timeout> {
            self.ops.push(Op::RepeatedStart);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), Timeout> {
            self.ops.push(Op::Stop);
            Ok(())
        }

        fn send_byte(&mut self, byte: u8) -> Result<bool, Timeout> {
            self.ops.push(Op::Send(byte));
            Ok((self.acks)(byte))
        }

        fn recv_byte(&mut self) -> Result<u8, Timeout> {
            let n = self.recvs;
            self.recvs += 1;
            self.ops.push(Op::Recv);
            if self.recv_timeout_at == Some(n) {
                return Err(Timeout);
            }
            Ok(self.rx.pop_front().unwrap_or(0xFF))
        }

        fn acknowledge(&mut self, ack: bool) -> Result<(), Timeout> {
            let n = self.ack_calls;
            self.ack_calls += 1;
            self.ops.push(Op::Ack(ack));
            if self.ack_timeout_at == Some(n) {
                return Err(Timeout);
            }
            Ok(())
        }

        fn retry_pause(&mut self) {
            self.ops.push(Op::RetryPause);
        }
    }

    fn timing() -> BitTiming {
        BitTiming {
            udelay_us: 10,
            address_retry_delay_us: 5,
        }
    }

    fn bits(byte: u8) -> Vec<bool> {
        (0..8).rev().map(|b| byte & (1 << b) != 0).collect()
    }

    #[test]
    fn test_start_and_stop_edges() {
        let mut lines = TestLines::new();
        let mut delay = TotalDelay::default();
        let clock = StepClock::new(1);
        let mut t = BitBangTransport::new(&mut lines, &mut delay, &clock, timing(), 1000);

        t.start();
        t.stop().unwrap();

        assert_eq!(
            lines.edges,
            [
                Edge::Sda(false),
                Edge::Scl(false),
                Edge::Sda(false),
                Edge::Scl(true),
                Edge::Sda(true),
            ]
        );
        // Every transition is followed by one udelay
        assert_eq!(delay.total_ns, 5 * 10_000);
    }

    #[test]
    fn test_repeated_start_releases_both_lines_first() {
        let mut lines = TestLines::new();
        lines.sda = false;
        lines.scl = false;
        let mut delay = TotalDelay::default();
        let clock = StepClock::new(1);
        let mut t = BitBangTransport::new(&mut lines, &mut delay, &clock, timing(), 1000);

        t.repeated_start().unwrap();

        assert_eq!(
            lines.edges,
            [
                Edge::Sda(true),
                Edge::Scl(true),
                Edge::Sda(false),
                Edge::Scl(false),
            ]
        );
    }

    #[test]
    fn test_send_byte_msb_first_with_ack() {
        let mut lines = TestLines::new();
        lines.scl = false;
        lines.slave_acks();
        let mut delay = TotalDelay::default();
        let clock = StepClock::new(1);
        let mut t = BitBangTransport::new(&mut lines, &mut delay, &clock, timing(), 1000);

        assert_eq!(t.send_byte(0xA5), Ok(true));

        let mut expected = bits(0xA5);
        expected.push(true); // SDA released for the ACK clock
        assert_eq!(lines.sampled, expected);
        assert!(!lines.scl);
    }

    #[test]
    fn test_send_byte_nack() {
        let mut lines = TestLines::new();
        lines.scl = false;
        let mut delay = TotalDelay::default();
        let clock = StepClock::new(1);
        let mut t = BitBangTransport::new(&mut lines, &mut delay, &clock, timing(), 1000);

        assert_eq!(t.send_byte(0x90), Ok(false));
    }

    #[test]
    fn test_recv_byte() {
        let mut lines = TestLines::new();
        lines.scl = false;
        lines.slave_sends(0x3C);
        let mut delay = TotalDelay::default();
        let clock = StepClock::new(1);
        let mut t = BitBangTransport::new(&mut lines, &mut delay, &clock, timing(), 1000);

        assert_eq!(t.recv_byte(), Ok(0x3C));
        assert_eq!(lines.sampled.len(), 8);
    }

    #[test]
    fn test_acknowledge_levels() {
        let mut lines = TestLines::new();
        lines.scl = false;
        let mut delay = TotalDelay::default();
        let clock = StepClock::new(1);
        let mut t = BitBangTransport::new(&mut lines, &mut delay, &clock, timing(), 1000);

        t.acknowledge(true).unwrap();
        t.acknowledge(false).unwrap();

        // SDA level at each clock rise: low for ACK, high for NACK
        assert_eq!(lines.sampled, [false, true]);
        assert!(lines.sda);
    }

    #[test]
    fn test_raise_clock_times_out() {
        let mut lines = TestLines::new();
        lines.scl_stuck_low = true;
        let mut delay = TotalDelay::default();
        let clock = StepClock::new(100);
        let mut t = BitBangTransport::new(&mut lines, &mut delay, &clock, timing(), 1000);

        assert_eq!(t.raise_clock(), Err(Timeout));
        assert_eq!(clock.polls.get(), 10);
        assert!(clock.now_us() >= 1000);
    }

    #[test]
    fn test_raise_clock_without_readback_is_best_effort() {
        let mut lines = TestLines::new();
        lines.readback = false;
        lines.scl_stuck_low = true;
        let mut delay = TotalDelay::default();
        let clock = StepClock::new(100);
        let mut t = BitBangTransport::new(&mut lines, &mut delay, &clock, timing(), 1000);

        assert_eq!(t.raise_clock(), Ok(()));
        assert_eq!(clock.polls.get(), 0);
    }

    #[test]
    fn test_send_byte_timeout_releases_sda() {
        let mut lines = TestLines::new();
        lines.scl = false;
        lines.scl_stuck_low = true;
        let mut delay = TotalDelay::default();
        let clock = StepClock::new(100);
        let mut t = BitBangTransport::new(&mut lines, &mut delay, &clock, timing(), 1000);

        // First bit of 0x00 drives SDA low, then the clock never rises
        assert_eq!(t.send_byte(0x00), Err(Timeout));
        assert!(lines.sda);
    }

    #[test]
    fn test_retry_pause_uses_its_own_delay() {
        let mut lines = TestLines::new();
        let mut delay = TotalDelay::default();
        let clock = StepClock::new(1);
        let mut t = BitBangTransport::new(&mut lines, &mut delay, &clock, timing(), 1000);

        t.retry_pause();
        assert_eq!(delay.total_ns, 5_000);
    }

    #[test]
    fn test_self_test_healthy_lines() {
        let mut lines = TestLines::new();
        let mut delay = TotalDelay::default();
        let clock = StepClock::new(1);
        let mut t = BitBangTransport::new(&mut lines, &mut delay, &clock, timing(), 1000);

        assert_eq!(t.self_test(), Ok(()));
        assert!(lines.sda && lines.scl);
    }

    #[test]
    fn test_self_test_detects_busy_bus() {
        let mut lines = TestLines::new();
        lines.scl_stuck_low = true;
        let mut delay = TotalDelay::default();
        let clock = StepClock::new(1);
        let mut t = BitBangTransport::new(&mut lines, &mut delay, &clock, timing(), 1000);

        assert_eq!(t.self_test(), Err(LineFault::Busy));
    }

    #[test]
    fn test_self_test_skips_clock_checks_without_readback() {
        let mut lines = TestLines::new();
        lines.readback = false;
        lines.scl_stuck_low = true;
        let mut delay = TotalDelay::default();
        let clock = StepClock::new(1);
        let mut t = BitBangTransport::new(&mut lines, &mut delay, &clock, timing(), 1000);

        assert_eq!(t.self_test(), Ok(()));
    }
}
