//! Software I2C bus core
//!
//! This crate contains the bus logic that does not depend on any specific
//! adapter hardware:
//!
//! - Bit-level wire protocol over two GPIO-like lines ([`transport`])
//! - 7-bit / 10-bit addressing with bounded retry ([`address`])
//! - Multi-message transactions with repeated start ([`engine`])
//! - Algorithm / adapter / driver / client registry ([`registry`])
//! - The transfer entry points chip drivers use ([`bus`], [`smbus`])
//! - A simulated bus and slaves for host tests (`sim`, feature `sim`)
//!
//! # Data flow
//!
//! ```text
//! chip driver ──► bus::master_send ──► Adapter lock ──► Algorithm::master_transfer
//!                                                           │
//!                                      BitBangTransport ◄───┘
//!                                             │
//!                                         GpioLine (SDA/SCL)
//! ```

#![no_std]
#![deny(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

extern crate alloc;
#[cfg(test)]
#[macro_use]
extern crate std;

#[macro_use]
mod fmt;

pub mod adapter;
pub mod address;
pub mod algorithm;
pub mod bus;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod message;
pub mod registry;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod smbus;
pub mod transport;

// Re-export key types at crate root for convenience
pub use adapter::{Adapter, AdapterId, BusState};
pub use algorithm::{AdapterBackend, Algorithm, AlgorithmId, Command};
pub use bus::{control, master_recv, master_send, probe, probe_adapter, transfer, AdapterBus};
pub use config::{AdapterConfig, BitTiming, BusConfig, RegistryLimits};
pub use driver::{Client, ClientId, Driver, DriverId};
pub use engine::{add_bit_adapter, BitAlgorithm, BitBangBus};
pub use error::{Error, LineFault, Timeout};
pub use message::{Address, Buffer, Message};
pub use registry::BusRegistry;
pub use transport::{BitBangTransport, Transport};
