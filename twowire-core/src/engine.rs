//! Bit-banged transaction engine
//!
//! Chains a slice of [`Message`]s into one bus transaction: START, then per
//! message the addressing phase and the data phase, a repeated START between
//! messages, and a final STOP.
//!
//! # Error behavior
//!
//! Writes abort cleanly: a NACKed data byte issues STOP and fails the
//! transaction. Reads report how many bytes arrived before a clock timeout,
//! but [`BitAlgorithm`] still fails the whole transaction with that timeout.
//! No STOP is issued after a timeout; the bus is left as it was.

use alloc::boxed::Box;
use alloc::sync::Arc;

use embedded_hal::delay::DelayNs;
use twowire_hal::{Clock, GpioLine};

use crate::adapter::{Adapter, BusState};
use crate::address::address_client;
use crate::algorithm::{AdapterBackend, Algorithm, AlgorithmId};
use crate::config::{AdapterConfig, BitTiming};
use crate::error::{Error, LineFault, Timeout};
use crate::message::{Buffer, Message};
use crate::registry::BusRegistry;
use crate::transport::{BitBangTransport, Transport};

/// Hardware data of a bit-banged adapter
pub struct BitBangBus {
    lines: Box<dyn GpioLine + Send>,
    delay: Box<dyn DelayNs + Send>,
    clock: Box<dyn Clock + Send>,
    timing: BitTiming,
}

impl BitBangBus {
    pub fn new(
        lines: impl GpioLine + Send + 'static,
        delay: impl DelayNs + Send + 'static,
        clock: impl Clock + Send + 'static,
        timing: BitTiming,
    ) -> Self {
        Self {
            lines: Box::new(lines),
            delay: Box::new(delay),
            clock: Box::new(clock),
            timing,
        }
    }

    pub fn timing(&self) -> BitTiming {
        self.timing
    }

    pub fn set_timing(&mut self, timing: BitTiming) {
        self.timing = timing;
    }

    /// Borrow the lines as a transport for one transaction
    pub fn transport(&mut self, timeout_us: u64) -> BitBangTransport<'_> {
        BitBangTransport::new(
            &mut *self.lines,
            &mut *self.delay,
            &*self.clock,
            self.timing,
            timeout_us,
        )
    }

    /// Check that both lines idle high and can be toggled independently
    ///
    /// SCL checks are skipped when SCL cannot be read back.
    pub fn test_lines(&mut self) -> Result<(), LineFault> {
        // The self-test never waits on clock stretching
        self.transport(0).self_test()
    }
}

/// Send `bytes`, stopping at the first NACK
///
/// A NACKed byte issues STOP and fails with [`Error::RemoteIo`].
pub fn write_bytes<T: Transport + ?Sized>(transport: &mut T, bytes: &[u8]) -> Result<usize, Error> {
    for (i, &byte) in bytes.iter().enumerate() {
        if !transport.send_byte(byte)? {
            debug!("write: byte {} of {} NACKed", i, bytes.len());
            transport.stop()?;
            return Err(Error::RemoteIo);
        }
    }
    Ok(bytes.len())
}

/// Fill `buf`, acknowledging every byte except the last
///
/// Returns how many bytes were received together with the outcome; on a
/// clock timeout the count covers the bytes completed before it.
pub fn read_bytes<T: Transport + ?Sized>(transport: &mut T, buf: &mut [u8]) -> (usize, Result<(), Timeout>) {
    let count = buf.len();
    for (i, slot) in buf.iter_mut().enumerate() {
        match transport.recv_byte() {
            Ok(byte) => *slot = byte,
            Err(e) => return (i, Err(e)),
        }
        let more = i + 1 < count;
        if let Err(e) = transport.acknowledge(more) {
            return (i + 1, Err(e));
        }
    }
    (count, Ok(()))
}

/// Run `msgs` as a single transaction
///
/// Returns the number of messages processed, which is `msgs.len()` on
/// success.
pub fn transfer_messages<T: Transport + ?Sized>(
    transport: &mut T,
    msgs: &mut [Message<'_>],
    retries: u32,
) -> Result<usize, Error> {
    let total = msgs.len();
    transport.start();

    for (i, msg) in msgs.iter_mut().enumerate() {
        address_client(transport, msg, retries)?;

        match &mut msg.buffer {
            Buffer::Write(bytes) => {
                write_bytes(transport, bytes)?;
            }
            Buffer::Read(buf) => {
                let wanted = buf.len();
                let (got, result) = read_bytes(transport, buf);
                if let Err(e) = result {
                    warn!("read: clock timeout after {} of {} bytes", got, wanted);
                    return Err(e.into());
                }
            }
        }

        if i + 1 < total {
            transport.repeated_start()?;
        }
    }

    transport.stop()?;
    Ok(total)
}

/// The bit-shift algorithm
///
/// Drives adapters whose backend is [`AdapterBackend::BitBang`]; any other
/// backend fails with [`Error::NoCapability`].
///
/// Algorithm-specific control commands ([`Command::Algorithm`]):
/// [`BitAlgorithm::SET_UDELAY`] and [`BitAlgorithm::SET_RETRY_DELAY`], both
/// taking microseconds.
///
/// [`Command::Algorithm`]: crate::algorithm::Command::Algorithm
#[derive(Debug, Default, Clone, Copy)]
pub struct BitAlgorithm;

impl BitAlgorithm {
    /// Set the per-transition delay
    pub const SET_UDELAY: u32 = 0x0001;
    /// Set the pause between address attempts
    pub const SET_RETRY_DELAY: u32 = 0x0002;

    pub const fn new() -> Self {
        Self
    }
}

impl Algorithm for BitAlgorithm {
    fn name(&self) -> &str {
        "bit-shift"
    }

    fn id(&self) -> AlgorithmId {
        AlgorithmId::BIT
    }

    fn master_transfer(&self, bus: &mut BusState, msgs: &mut [Message<'_>]) -> Result<usize, Error> {
        let retries = bus.retries;
        let timeout_us = bus.timeout_us;
        let lines = bus.backend.bit_bang_mut().ok_or(Error::NoCapability)?;
        let mut transport = lines.transport(timeout_us);
        transfer_messages(&mut transport, msgs, retries)
    }

    fn algo_control(&self, bus: &mut BusState, cmd: u32, arg: u64) -> Result<(), Error> {
        let lines = bus.backend.bit_bang_mut().ok_or(Error::NoCapability)?;
        let micros = u32::try_from(arg).unwrap_or(u32::MAX);
        let mut timing = lines.timing();
        match cmd {
            Self::SET_UDELAY => timing.udelay_us = micros,
            Self::SET_RETRY_DELAY => timing.address_retry_delay_us = micros,
            _ => return Err(Error::Unsupported),
        }
        lines.set_timing(timing);
        Ok(())
    }
}

/// Build a bit-banged adapter from `config` and register it
///
/// The adapter id is `algorithm.id() | config.hw_id`. When
/// `config.test_bus` is set the lines are self-tested first and a failure
/// is reported as [`Error::BusFault`] without registering anything.
pub fn add_bit_adapter(
    registry: &BusRegistry,
    algorithm: Arc<dyn Algorithm>,
    config: &AdapterConfig,
    mut bus: BitBangBus,
) -> Result<Arc<Adapter>, Error> {
    bus.set_timing(config.timing);

    if config.test_bus {
        if let Err(fault) = bus.test_lines() {
            warn!("{}: not registered, bus self-test failed", config.name.as_str());
            return Err(Error::BusFault(fault));
        }
        debug!("{}: bus self-test passed", config.name.as_str());
    }

    let adapter = Arc::new(Adapter::from_config(
        config,
        algorithm,
        AdapterBackend::BitBang(bus),
    ));
    registry.add_adapter(adapter.clone())?;
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Address;
    use crate::sim::{SimBus, SimClock};
    use crate::transport::tests::{Op, RecordingTransport};
    use crate::transport::tests::{StepClock, TestLines, TotalDelay};

    #[test]
    fn test_write_then_read_sequence() {
        let mut t = RecordingTransport::new();
        t.rx.extend([0xAB, 0xCD]);

        let mut rx = [0u8; 2];
        let mut msgs = [
            Message::write(Address::seven_bit(0x20), &[0x10]),
            Message::read(Address::seven_bit(0x21), &mut rx),
        ];
        assert_eq!(transfer_messages(&mut t, &mut msgs, 3), Ok(2));
        assert_eq!(rx, [0xAB, 0xCD]);
        assert_eq!(
            t.ops,
            [
                Op::Start,
                Op::Send(0x40),
                Op::Send(0x10),
                Op::RepeatedStart,
                Op::Send(0x43),
                Op::Recv,
                Op::Ack(true),
                Op::Recv,
                Op::Ack(false),
                Op::Stop,
            ]
        );
    }

    #[test]
    fn test_read_ack_pattern() {
        let mut t = RecordingTransport::new();
        let mut buf = [0u8; 4];
        assert_eq!(read_bytes(&mut t, &mut buf), (4, Ok(())));
        let acks: alloc::vec::Vec<_> = t
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Ack(a) => Some(*a),
                _ => None,
            })
            .collect();
        assert_eq!(acks, [true, true, true, false]);

        let mut t = RecordingTransport::new();
        let mut one = [0u8; 1];
        assert_eq!(read_bytes(&mut t, &mut one), (1, Ok(())));
        assert_eq!(t.ops, [Op::Recv, Op::Ack(false)]);
    }

    #[test]
    fn test_read_ack_levels_on_wire() {
        // SDA level at the clock raise of each acknowledge bit
        let mut lines = TestLines::new();
        lines.scl = false;
        let mut delay = TotalDelay::default();
        let clock = StepClock::new(1);
        let mut t = BitBangTransport::new(&mut lines, &mut delay, &clock, BitTiming::default(), 1000);

        let mut buf = [0u8; 3];
        assert_eq!(read_bytes(&mut t, &mut buf), (3, Ok(())));
        drop(t);

        // 9 clock pulses per byte, the ninth is the acknowledge
        assert_eq!(lines.sampled.len(), 27);
        assert!(!lines.sampled[8]);
        assert!(!lines.sampled[17]);
        assert!(lines.sampled[26]);
    }

    #[test]
    fn test_read_timeout_reports_partial_count() {
        let mut t = RecordingTransport::new();
        t.recv_timeout_at = Some(2);
        let mut buf = [0u8; 4];
        assert_eq!(read_bytes(&mut t, &mut buf), (2, Err(Timeout)));

        let mut t = RecordingTransport::new();
        t.ack_timeout_at = Some(1);
        assert_eq!(read_bytes(&mut t, &mut buf), (2, Err(Timeout)));
    }

    #[test]
    fn test_short_read_fails_transaction() {
        let mut t = RecordingTransport::new();
        t.recv_timeout_at = Some(1);
        let mut buf = [0u8; 3];
        let mut msgs = [Message::read(Address::seven_bit(0x50), &mut buf)];
        assert_eq!(transfer_messages(&mut t, &mut msgs, 1), Err(Error::Timeout));
        assert!(!t.ops.contains(&Op::Stop));
    }

    #[test]
    fn test_write_nack_stops_and_aborts() {
        let mut t = RecordingTransport::new().nacking(|b| b == 0x22);
        let mut msgs = [
            Message::write(Address::seven_bit(0x20), &[0x11, 0x22, 0x33]),
            Message::write(Address::seven_bit(0x21), &[0x44]),
        ];
        assert_eq!(transfer_messages(&mut t, &mut msgs, 3), Err(Error::RemoteIo));
        assert_eq!(
            t.ops,
            [Op::Start, Op::Send(0x40), Op::Send(0x11), Op::Send(0x22), Op::Stop]
        );
    }

    #[test]
    fn test_empty_transaction() {
        let mut t = RecordingTransport::new();
        assert_eq!(transfer_messages(&mut t, &mut [], 3), Ok(0));
        assert_eq!(t.ops, [Op::Start, Op::Stop]);
    }

    #[test]
    fn test_bit_algorithm_requires_bit_bang_backend() {
        let mut state = BusState {
            backend: AdapterBackend::Custom(Box::new(0u8)),
            retries: 3,
            timeout_us: 1000,
        };
        let algo = BitAlgorithm::new();
        assert_eq!(algo.master_transfer(&mut state, &mut []), Err(Error::NoCapability));
        assert_eq!(algo.algo_control(&mut state, BitAlgorithm::SET_UDELAY, 1), Err(Error::NoCapability));
    }

    #[test]
    fn test_bit_algorithm_control_updates_timing() {
        let sim = SimBus::new();
        let clock = SimClock::new(1);
        let mut state = BusState {
            backend: AdapterBackend::BitBang(BitBangBus::new(
                sim,
                clock.delay(),
                clock.clone(),
                BitTiming::default(),
            )),
            retries: 3,
            timeout_us: 1000,
        };
        let algo = BitAlgorithm::new();
        algo.algo_control(&mut state, BitAlgorithm::SET_UDELAY, 2).unwrap();
        algo.algo_control(&mut state, BitAlgorithm::SET_RETRY_DELAY, 7).unwrap();
        assert_eq!(algo.algo_control(&mut state, 0x99, 0), Err(Error::Unsupported));

        let timing = state.backend.bit_bang_mut().unwrap().timing();
        assert_eq!(timing.udelay_us, 2);
        assert_eq!(timing.address_retry_delay_us, 7);
    }

    #[test]
    fn test_add_bit_adapter_self_test_failure() {
        let registry = BusRegistry::default();
        let sim = SimBus::new();
        sim.hold_scl_low(true);
        let clock = SimClock::new(1);
        let bus = BitBangBus::new(sim, clock.delay(), clock.clone(), BitTiming::default());

        let mut config = AdapterConfig::new("stuck", 1);
        config.test_bus = true;
        let result = add_bit_adapter(&registry, Arc::new(BitAlgorithm), &config, bus);
        assert!(matches!(result, Err(Error::BusFault(LineFault::Busy))));
        assert!(registry.adapters().is_empty());
    }

    #[test]
    fn test_add_bit_adapter_registers() {
        let registry = BusRegistry::default();
        let sim = SimBus::new();
        let clock = SimClock::new(1);
        let bus = BitBangBus::new(sim, clock.delay(), clock.clone(), BitTiming::default());

        let mut config = AdapterConfig::new("gpio-0", 3);
        config.test_bus = true;
        config.timing = BitTiming::FAST;
        let adapter = add_bit_adapter(&registry, Arc::new(BitAlgorithm), &config, bus).unwrap();

        assert!(adapter.is_registered());
        assert_eq!(adapter.id().0, 0x01_0003);
        assert_eq!(adapter.name(), "gpio-0");
        let timing = adapter.lock_bus().backend.bit_bang_mut().unwrap().timing();
        assert_eq!(timing, BitTiming::FAST);
    }
}
