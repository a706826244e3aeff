//! Adapter shims and chip drivers
//!
//! - [`lines`]: `GpioLine` over `embedded-hal` digital pins
//! - [`clock`]: host clock and delay (`std` feature)
//! - [`sensor`]: chip drivers that register with a `BusRegistry`

#![no_std]
#![deny(unsafe_code)]

extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

#[macro_use]
mod fmt;

#[cfg(feature = "std")]
pub mod clock;
pub mod lines;
pub mod sensor;
