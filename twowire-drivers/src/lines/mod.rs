//! `GpioLine` over `embedded-hal` digital pins
//!
//! Both lines are open-drain: driving high releases the line and the
//! pull-up raises it, so a slave can still hold it low. SDA must be
//! readable. SCL read-back is optional; wrap the clock pin in
//! [`ReadableScl`] or [`WriteOnlyScl`] accordingly.

use core::convert::Infallible;

use embedded_hal::digital::{InputPin, OutputPin};
use twowire_hal::GpioLine;

fn infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

fn drive<P: OutputPin<Error = Infallible>>(pin: &mut P, high: bool) {
    if high {
        infallible(pin.set_high());
    } else {
        infallible(pin.set_low());
    }
}

/// A clock pin
pub trait SclPin {
    fn set(&mut self, high: bool);

    /// Line level, or `None` when the pin cannot be read
    fn read(&mut self) -> Option<bool>;
}

/// Clock pin that can also be read, enabling clock-stretch support
pub struct ReadableScl<P>(pub P);

impl<P> SclPin for ReadableScl<P>
where
    P: OutputPin<Error = Infallible> + InputPin,
{
    fn set(&mut self, high: bool) {
        drive(&mut self.0, high);
    }

    fn read(&mut self) -> Option<bool> {
        Some(infallible(self.0.is_high()))
    }
}

/// Output-only clock pin
pub struct WriteOnlyScl<P>(pub P);

impl<P> SclPin for WriteOnlyScl<P>
where
    P: OutputPin<Error = Infallible>,
{
    fn set(&mut self, high: bool) {
        drive(&mut self.0, high);
    }

    fn read(&mut self) -> Option<bool> {
        None
    }
}

/// SDA and SCL pins as a [`GpioLine`]
pub struct PinLines<SDA, SCL> {
    sda: SDA,
    scl: SCL,
}

impl<SDA, SCL> PinLines<SDA, SCL>
where
    SDA: OutputPin<Error = Infallible> + InputPin,
    SCL: SclPin,
{
    /// Wrap the pins and release both lines
    pub fn new(sda: SDA, scl: SCL) -> Self {
        let mut lines = Self { sda, scl };
        lines.release();
        lines
    }

    /// Give the pins back
    pub fn free(self) -> (SDA, SCL) {
        (self.sda, self.scl)
    }
}

impl<SDA, SCL> GpioLine for PinLines<SDA, SCL>
where
    SDA: OutputPin<Error = Infallible> + InputPin,
    SCL: SclPin,
{
    fn set_sda(&mut self, high: bool) {
        drive(&mut self.sda, high);
    }

    fn set_scl(&mut self, high: bool) {
        self.scl.set(high);
    }

    fn get_sda(&mut self) -> bool {
        infallible(self.sda.is_high())
    }

    fn get_scl(&mut self) -> Option<bool> {
        self.scl.read()
    }
}
