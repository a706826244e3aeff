//! Simulated bus for host tests
//!
//! [`SimBus`] is a [`GpioLine`] that models the open-drain wiring of SDA
//! and SCL, decodes the master's START/STOP conditions and bit traffic, and
//! answers as one or more [`SimDevice`] slaves. Decoded traffic is kept as a
//! list of [`BusEvent`]s for assertions.
//!
//! [`SimClock`] and [`SimDelay`] share one simulated microsecond counter, so
//! clock-stretch timeouts are reached without real waiting.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::sync::atomic::{AtomicU64, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embedded_hal::delay::DelayNs;
use twowire_hal::{Clock, GpioLine};

/// A slave on the simulated bus
pub trait SimDevice: Send {
    /// 7-bit address the device answers to
    fn address(&self) -> u8;

    /// The device was addressed; `read` is the direction bit
    fn start(&mut self, _read: bool) {}

    /// The master wrote `byte`; return `false` to NACK it
    fn write(&mut self, byte: u8) -> bool;

    /// The master wants the next byte
    fn read(&mut self) -> u8;

    /// STOP condition after the device was addressed
    fn stop(&mut self) {}
}

/// Decoded bus traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Start,
    Stop,
    /// Address byte (7-bit address and direction) and whether a slave answered
    Address { byte: u8, acked: bool },
    /// Byte written by the master and the slave's answer
    Write { byte: u8, acked: bool },
    /// Byte sent by a slave and the master's answer
    Read { byte: u8, acked: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Address,
    Receive,
    Transmit,
    /// Nobody answered, or the transfer was refused; wait for START/STOP
    Ignore,
}

struct SimState {
    master_sda: bool,
    master_scl: bool,
    slave_sda: bool,
    sda_stuck_low: bool,
    scl_stuck_low: bool,
    readback: bool,
    stretch_polls: u32,
    stretch_left: u32,
    phase: Phase,
    bits: u8,
    shift: u8,
    read: bool,
    out: u8,
    master_acked: bool,
    active: Option<usize>,
    devices: Vec<Box<dyn SimDevice>>,
    events: Vec<BusEvent>,
}

impl SimState {
    fn new() -> Self {
        Self {
            master_sda: true,
            master_scl: true,
            slave_sda: true,
            sda_stuck_low: false,
            scl_stuck_low: false,
            readback: true,
            stretch_polls: 0,
            stretch_left: 0,
            phase: Phase::Idle,
            bits: 0,
            shift: 0,
            read: false,
            out: 0xFF,
            master_acked: false,
            active: None,
            devices: Vec::new(),
            events: Vec::new(),
        }
    }

    fn sda(&self) -> bool {
        self.master_sda && self.slave_sda && !self.sda_stuck_low
    }

    fn scl(&self) -> bool {
        self.master_scl && !self.scl_stuck_low
    }

    fn set_sda(&mut self, high: bool) {
        let before = self.sda();
        self.master_sda = high;
        let after = self.sda();
        if self.scl() && before != after {
            if after {
                self.stop_condition();
            } else {
                self.start_condition();
            }
        }
    }

    fn set_scl(&mut self, high: bool) {
        if high == self.master_scl {
            return;
        }
        self.master_scl = high;
        if self.scl_stuck_low {
            return;
        }
        if high {
            self.stretch_left = self.stretch_polls;
            self.rising_edge();
        } else {
            self.falling_edge();
        }
    }

    fn get_scl(&mut self) -> Option<bool> {
        if !self.readback {
            return None;
        }
        if self.scl() && self.stretch_left > 0 {
            self.stretch_left -= 1;
            return Some(false);
        }
        Some(self.scl())
    }

    fn start_condition(&mut self) {
        self.events.push(BusEvent::Start);
        self.phase = Phase::Address;
        self.bits = 0;
        self.shift = 0;
        self.slave_sda = true;
    }

    fn stop_condition(&mut self) {
        self.events.push(BusEvent::Stop);
        if let Some(i) = self.active.take() {
            self.devices[i].stop();
        }
        self.phase = Phase::Idle;
        self.slave_sda = true;
    }

    fn rising_edge(&mut self) {
        match self.phase {
            Phase::Address | Phase::Receive => {
                if self.bits < 8 {
                    self.shift = (self.shift << 1) | u8::from(self.sda());
                }
                self.bits += 1;
            }
            Phase::Transmit => {
                if self.bits == 8 {
                    self.master_acked = !self.sda();
                }
                self.bits += 1;
            }
            Phase::Idle | Phase::Ignore => {}
        }
    }

    fn falling_edge(&mut self) {
        match (self.phase, self.bits) {
            (Phase::Address, 8) => {
                let byte = self.shift;
                self.read = byte & 1 != 0;
                self.active = self.devices.iter().position(|d| d.address() == byte >> 1);
                if let Some(i) = self.active {
                    self.devices[i].start(self.read);
                    self.slave_sda = false;
                }
                self.events.push(BusEvent::Address {
                    byte,
                    acked: self.active.is_some(),
                });
            }
            (Phase::Address, 9) => {
                self.slave_sda = true;
                self.bits = 0;
                self.shift = 0;
                match self.active {
                    None => self.phase = Phase::Ignore,
                    Some(i) if self.read => {
                        self.phase = Phase::Transmit;
                        self.load(i);
                    }
                    Some(_) => self.phase = Phase::Receive,
                }
            }
            (Phase::Receive, 8) => {
                let byte = self.shift;
                let acked = match self.active {
                    Some(i) => self.devices[i].write(byte),
                    None => false,
                };
                self.slave_sda = !acked;
                self.events.push(BusEvent::Write { byte, acked });
            }
            (Phase::Receive, 9) => {
                if !self.slave_sda {
                    self.slave_sda = true;
                } else {
                    self.phase = Phase::Ignore;
                }
                self.bits = 0;
                self.shift = 0;
            }
            (Phase::Transmit, 1..=7) => {
                self.slave_sda = self.out & (0x80 >> self.bits) != 0;
            }
            (Phase::Transmit, 8) => self.slave_sda = true,
            (Phase::Transmit, 9) => {
                self.events.push(BusEvent::Read {
                    byte: self.out,
                    acked: self.master_acked,
                });
                match self.active {
                    Some(i) if self.master_acked => self.load(i),
                    _ => self.phase = Phase::Ignore,
                }
            }
            _ => {}
        }
    }

    fn load(&mut self, device: usize) {
        self.out = self.devices[device].read();
        self.bits = 0;
        self.slave_sda = self.out & 0x80 != 0;
    }
}

/// Simulated open-drain bus
///
/// Cloning yields another handle to the same bus, so a test can keep one
/// handle for inspection after moving another into an adapter.
#[derive(Clone)]
pub struct SimBus {
    state: Arc<BlockingMutex<CriticalSectionRawMutex, RefCell<SimState>>>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(BlockingMutex::new(RefCell::new(SimState::new()))),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        self.state.lock(|state| f(&mut state.borrow_mut()))
    }

    /// Connect a slave
    pub fn attach(&self, device: impl SimDevice + 'static) {
        self.with(|s| s.devices.push(Box::new(device)));
    }

    /// Whether the master can read SCL back
    pub fn set_scl_readback(&self, readback: bool) {
        self.with(|s| s.readback = readback);
    }

    /// Hold SCL low, as a wedged slave would
    pub fn hold_scl_low(&self, low: bool) {
        self.with(|s| s.scl_stuck_low = low);
    }

    /// Hold SDA low
    pub fn hold_sda_low(&self, low: bool) {
        self.with(|s| s.sda_stuck_low = low);
    }

    /// Stretch the clock after every rising edge for `polls` SCL reads
    pub fn stretch_clock(&self, polls: u32) {
        self.with(|s| s.stretch_polls = polls);
    }

    /// Decoded traffic so far
    pub fn events(&self) -> Vec<BusEvent> {
        self.with(|s| s.events.clone())
    }

    pub fn clear_events(&self) {
        self.with(|s| s.events.clear());
    }

    /// Bus levels as `(sda, scl)`
    pub fn levels(&self) -> (bool, bool) {
        self.with(|s| (s.sda(), s.scl()))
    }
}

impl GpioLine for SimBus {
    fn set_sda(&mut self, high: bool) {
        self.with(|s| s.set_sda(high));
    }

    fn set_scl(&mut self, high: bool) {
        self.with(|s| s.set_scl(high));
    }

    fn get_sda(&mut self) -> bool {
        self.with(|s| s.sda())
    }

    fn get_scl(&mut self) -> Option<bool> {
        self.with(|s| s.get_scl())
    }

    fn can_read_scl(&mut self) -> bool {
        self.with(|s| s.readback)
    }
}

/// Register shared between a [`RegisterDevice`] and the test inspecting it
#[derive(Clone)]
pub struct Registers {
    cells: Arc<BlockingMutex<CriticalSectionRawMutex, RefCell<[u8; 256]>>>,
}

impl Registers {
    pub fn get(&self, reg: u8) -> u8 {
        self.cells.lock(|cells| cells.borrow()[usize::from(reg)])
    }

    pub fn set(&self, reg: u8, value: u8) {
        self.cells.lock(|cells| cells.borrow_mut()[usize::from(reg)] = value);
    }
}

/// EEPROM-style register file
///
/// The first byte written after addressing sets the register pointer;
/// later writes store at the pointer and reads return from it, both
/// auto-incrementing.
pub struct RegisterDevice {
    address: u8,
    registers: Registers,
    pointer: u8,
    expect_pointer: bool,
}

impl RegisterDevice {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            registers: Registers {
                cells: Arc::new(BlockingMutex::new(RefCell::new([0; 256]))),
            },
            pointer: 0,
            expect_pointer: false,
        }
    }

    /// Handle to the register contents
    pub fn registers(&self) -> Registers {
        self.registers.clone()
    }
}

impl SimDevice for RegisterDevice {
    fn address(&self) -> u8 {
        self.address
    }

    fn start(&mut self, read: bool) {
        self.expect_pointer = !read;
    }

    fn write(&mut self, byte: u8) -> bool {
        if self.expect_pointer {
            self.pointer = byte;
            self.expect_pointer = false;
        } else {
            self.registers.set(self.pointer, byte);
            self.pointer = self.pointer.wrapping_add(1);
        }
        true
    }

    fn read(&mut self) -> u8 {
        let value = self.registers.get(self.pointer);
        self.pointer = self.pointer.wrapping_add(1);
        value
    }
}

/// Simulated microsecond clock
///
/// Every [`Clock::relax`] advances time by the configured tick.
#[derive(Clone)]
pub struct SimClock {
    now: Arc<AtomicU64>,
    tick_us: u64,
}

impl SimClock {
    pub fn new(tick_us: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(0)),
            tick_us,
        }
    }

    /// A delay that advances this clock
    pub fn delay(&self) -> SimDelay {
        SimDelay {
            now: self.now.clone(),
        }
    }
}

impl Clock for SimClock {
    fn now_us(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }

    fn relax(&self) {
        self.now.fetch_add(self.tick_us, Ordering::Relaxed);
    }
}

/// Delay that advances a [`SimClock`] instead of waiting
pub struct SimDelay {
    now: Arc<AtomicU64>,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.now.fetch_add(u64::from(ns).div_ceil(1000), Ordering::Relaxed);
    }
}
