//! Transfer strategies
//!
//! An [`Algorithm`] knows how to move [`Message`]s over one kind of bus
//! hardware (bit-banging, a PCF8584-style byte controller, an SMBus-only
//! host). It is immutable once constructed and shared by every adapter that
//! uses it; the per-adapter hardware data lives in an [`AdapterBackend`].

use alloc::boxed::Box;
use core::any::Any;

use crate::adapter::BusState;
use crate::driver::Client;
use crate::engine::BitBangBus;
use crate::error::Error;
use crate::message::Message;

/// Algorithm identifier
///
/// The high byte of an adapter id; see [`crate::adapter::AdapterId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlgorithmId(pub u32);

impl AlgorithmId {
    /// Bit-shift (bit-banged) algorithm
    pub const BIT: Self = Self(0x01_0000);
    /// PCF8584 byte-oriented controllers
    pub const PCF: Self = Self(0x02_0000);
    /// SMBus-only host controllers
    pub const SMBUS: Self = Self(0x04_0000);

    /// Bits of an adapter id that belong to the algorithm
    pub const MASK: u32 = 0xFFFF_0000;
}

/// Adapter control commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Set the number of address attempts per message
    Retries,
    /// Set the clock-stretch timeout in microseconds
    Timeout,
    /// Algorithm-specific command, passed to [`Algorithm::algo_control`]
    Algorithm(u32),
}

/// Hardware data owned by one adapter
pub enum AdapterBackend {
    /// Two GPIO-like lines driven in software
    BitBang(BitBangBus),
    /// Hardware data of an algorithm defined outside this crate
    Custom(Box<dyn Any + Send>),
}

impl AdapterBackend {
    /// Bit-bang hardware data, if this is a bit-banged adapter
    pub fn bit_bang_mut(&mut self) -> Option<&mut BitBangBus> {
        match self {
            AdapterBackend::BitBang(bus) => Some(bus),
            AdapterBackend::Custom(_) => None,
        }
    }

    /// Custom hardware data of type `T`
    pub fn custom_mut<T: Any>(&mut self) -> Option<&mut T> {
        match self {
            AdapterBackend::Custom(data) => data.downcast_mut::<T>(),
            AdapterBackend::BitBang(_) => None,
        }
    }
}

/// A transfer strategy
///
/// Only [`Algorithm::master_transfer`] is required; the control and client
/// hooks default to "not supported" / no-op.
pub trait Algorithm: Send + Sync {
    /// Display name
    fn name(&self) -> &str;

    /// Algorithm identifier, unique within a registry
    fn id(&self) -> AlgorithmId;

    /// Execute `msgs` in order as one bus transaction
    ///
    /// Called with the adapter's transfer lock held. Returns the number of
    /// messages processed.
    fn master_transfer(&self, bus: &mut BusState, msgs: &mut [Message<'_>])
        -> Result<usize, Error>;

    /// Algorithm-specific control command
    fn algo_control(&self, _bus: &mut BusState, _cmd: u32, _arg: u64) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    /// Called after a client is attached to an adapter using this algorithm
    fn client_register(&self, _client: &Client) -> Result<(), Error> {
        Ok(())
    }

    /// Called before a client is detached from an adapter using this algorithm
    fn client_unregister(&self, _client: &Client) -> Result<(), Error> {
        Ok(())
    }
}
