//! Bus configuration types
//!
//! Plain data describing adapters and registry limits. With the `toml`
//! feature a whole [`BusConfig`] can be loaded from a TOML document, e.g.:
//!
//! ```toml
//! [limits]
//! max_adapters = 4
//!
//! [[adapters]]
//! name = "parport-0"
//! hw_id = 0
//! retries = 3
//! timeout_us = 1000000
//! test_bus = true
//!
//! [adapters.timing]
//! udelay_us = 10
//! address_retry_delay_us = 5
//! ```

use alloc::vec::Vec;
use heapless::String;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum adapter/driver/client name length
pub const MAX_NAME_LEN: usize = 32;

/// Default address attempts per message
pub const DEFAULT_RETRIES: u32 = 3;

/// Default clock-stretch timeout (1 s)
pub const DEFAULT_TIMEOUT_US: u64 = 1_000_000;

/// Build a bounded name, truncating at a character boundary
pub fn bounded_name(name: &str) -> String<MAX_NAME_LEN> {
    let mut out = String::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Bit-level timing of a bit-banged adapter
///
/// `udelay_us` follows every line transition and sets the bus speed;
/// `address_retry_delay_us` is the pause between a NACKed address and the
/// next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BitTiming {
    /// Wait after each SDA/SCL transition, in microseconds
    pub udelay_us: u32,
    /// Pause between address retries, in microseconds
    pub address_retry_delay_us: u32,
}

impl Default for BitTiming {
    fn default() -> Self {
        Self {
            udelay_us: 10,
            address_retry_delay_us: 5,
        }
    }
}

impl BitTiming {
    /// Standard mode (~100 kHz)
    pub const STANDARD: Self = Self::from_frequency(100_000);

    /// Fast mode (~400 kHz, best effort in software)
    pub const FAST: Self = Self::from_frequency(400_000);

    /// Timing for a target SCL frequency
    ///
    /// Each clock half-period is one transition delay, rounded up so the
    /// bus never runs faster than requested.
    pub const fn from_frequency(hz: u32) -> Self {
        let hz = if hz == 0 { 1 } else { hz };
        let half_period = 500_000u32.div_ceil(hz);
        Self {
            udelay_us: if half_period == 0 { 1 } else { half_period },
            address_retry_delay_us: 5,
        }
    }
}

/// Configuration of one adapter instance
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AdapterConfig {
    /// Display name
    pub name: String<MAX_NAME_LEN>,
    /// Hardware id, combined with the algorithm id into the adapter id
    pub hw_id: u16,
    /// Address attempts per message
    pub retries: u32,
    /// Clock-stretch timeout in microseconds
    pub timeout_us: u64,
    /// Bit timing (bit-bang adapters only)
    pub timing: BitTiming,
    /// Run the line self-test before registering
    pub test_bus: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            hw_id: 0,
            retries: DEFAULT_RETRIES,
            timeout_us: DEFAULT_TIMEOUT_US,
            timing: BitTiming::default(),
            test_bus: false,
        }
    }
}

impl AdapterConfig {
    /// Create a default configuration with a name and hardware id
    pub fn new(name: &str, hw_id: u16) -> Self {
        Self {
            name: bounded_name(name),
            hw_id,
            ..Self::default()
        }
    }
}

/// Registry capacity limits
///
/// Collections grow dynamically; these limits only decide when an
/// insertion is refused with `OutOfSlots`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegistryLimits {
    /// Maximum registered algorithms
    pub max_algorithms: usize,
    /// Maximum registered adapters
    pub max_adapters: usize,
    /// Maximum registered drivers
    pub max_drivers: usize,
    /// Maximum clients per adapter
    pub max_clients: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_algorithms: 4,
            max_adapters: 16,
            max_drivers: 16,
            max_clients: 32,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// TOML parsing failed
    Parse,
    /// An adapter has no name
    MissingName,
    /// Two adapters share a hardware id
    DuplicateHwId(u16),
    /// Address attempts must be at least one
    ZeroRetries,
}

/// Complete bus configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BusConfig {
    /// Registry limits
    pub limits: RegistryLimits,
    /// Adapters to bring up
    pub adapters: Vec<AdapterConfig>,
}

impl BusConfig {
    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, adapter) in self.adapters.iter().enumerate() {
            if adapter.name.is_empty() {
                return Err(ConfigError::MissingName);
            }
            if adapter.retries == 0 {
                return Err(ConfigError::ZeroRetries);
            }
            if self.adapters[..i].iter().any(|a| a.hw_id == adapter.hw_id) {
                return Err(ConfigError::DuplicateHwId(adapter.hw_id));
            }
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    #[cfg(feature = "toml")]
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }
}
