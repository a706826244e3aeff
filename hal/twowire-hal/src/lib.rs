//! twowire Hardware Abstraction Layer
//!
//! This crate defines the line-level capabilities a bit-banged I2C adapter
//! needs from its hardware. Adapter shims (parallel-port cables, GPIO pins on
//! a board, simulators) implement these traits; `twowire-core` drives them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Chip drivers (LM75, ...)               │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  twowire-core (registry, bit-bang algo) │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  twowire-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ embedded-hal  │       │   simulated   │
//! │     pins      │       │      bus      │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`gpio::GpioLine`] - SDA/SCL access with optional SCL read-back
//! - [`clock::Clock`] - Monotonic time source for clock-stretch timeouts

#![no_std]
#![deny(unsafe_code)]

pub mod clock;
pub mod gpio;

// Re-export key traits at crate root for convenience
pub use clock::Clock;
pub use gpio::GpioLine;
