//! Bus error taxonomy

use core::fmt;

/// The clock line did not go high within the adapter's timeout
///
/// Byte-level operations fail with this narrower error; `?` lifts it into
/// [`Error::Timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeout;

/// Which check of the bus self-test failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineFault {
    /// SDA or SCL was low while the bus should be idle
    Busy,
    /// SDA stayed high while driven low
    SdaStuckHigh,
    /// SDA stayed low after being released
    SdaStuckLow,
    /// SCL stayed high while driven low
    SclStuckHigh,
    /// SCL stayed low after being released
    SclStuckLow,
    /// Toggling one line moved the other
    Crosstalk,
}

/// Errors surfaced by transfers and registry operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Clock-stretch wait exceeded the adapter timeout
    Timeout,
    /// Addressing failed after all retries, or a written byte was not acknowledged
    RemoteIo,
    /// Registry or client-set capacity exceeded
    OutOfSlots,
    /// Entity is not (or no longer) registered
    NotFound,
    /// The adapter backend cannot perform the operation
    NoCapability,
    /// An entity with the same id is already registered
    AlreadyRegistered,
    /// Algorithm is still referenced by a registered adapter
    InUse,
    /// Another client already occupies this address on the adapter
    AddressInUse,
    /// Control command not handled by the adapter or its algorithm
    Unsupported,
    /// Bus self-test failed
    BusFault(LineFault),
}

impl From<Timeout> for Error {
    fn from(_: Timeout) -> Self {
        Error::Timeout
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("clock stretch timeout")
    }
}

impl fmt::Display for LineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            LineFault::Busy => "bus busy at idle",
            LineFault::SdaStuckHigh => "SDA stuck high",
            LineFault::SdaStuckLow => "SDA stuck low",
            LineFault::SclStuckHigh => "SCL stuck high",
            LineFault::SclStuckLow => "SCL stuck low",
            LineFault::Crosstalk => "lines affect each other",
        };
        f.write_str(msg)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Timeout => f.write_str("clock stretch timeout"),
            Error::RemoteIo => f.write_str("remote I/O error (no acknowledge)"),
            Error::OutOfSlots => f.write_str("no free slot"),
            Error::NotFound => f.write_str("not registered"),
            Error::NoCapability => f.write_str("operation not supported by adapter backend"),
            Error::AlreadyRegistered => f.write_str("id already registered"),
            Error::InUse => f.write_str("still in use by a registered adapter"),
            Error::AddressInUse => f.write_str("address already in use"),
            Error::Unsupported => f.write_str("unsupported control command"),
            Error::BusFault(fault) => write!(f, "bus self-test failed: {}", fault),
        }
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

        match self {
            Error::RemoteIo => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            Error::Timeout | Error::BusFault(_) => ErrorKind::Bus,
            _ => ErrorKind::Other,
        }
    }
}
