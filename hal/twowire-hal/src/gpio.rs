//! Bus line abstractions
//!
//! An I2C bus is two open-drain lines. Setting a line "high" releases it
//! (the pull-up takes it high unless some device holds it low); setting it
//! "low" actively drives it.

/// Access to the SDA and SCL lines of one bus
///
/// Each implementation is owned by exactly one adapter; the lines are never
/// shared between two adapters.
///
/// Reads take `&mut self` because sampling a port register usually needs
/// mutable access to the peripheral.
pub trait GpioLine {
    /// Drive SDA low (`false`) or release it high (`true`)
    fn set_sda(&mut self, high: bool);

    /// Drive SCL low (`false`) or release it high (`true`)
    fn set_scl(&mut self, high: bool);

    /// Sample the actual SDA level
    fn get_sda(&mut self) -> bool;

    /// Sample the actual SCL level
    ///
    /// Returns `None` when the hardware cannot read SCL back. Without
    /// read-back, clock stretching by slaves cannot be detected and the
    /// master assumes SCL follows what it drives.
    fn get_scl(&mut self) -> Option<bool>;

    /// Whether SCL can be read back at all
    fn can_read_scl(&mut self) -> bool {
        self.get_scl().is_some()
    }

    /// Release both lines (bus idle)
    fn release(&mut self) {
        self.set_sda(true);
        self.set_scl(true);
    }
}

impl<T: GpioLine + ?Sized> GpioLine for &mut T {
    fn set_sda(&mut self, high: bool) {
        (**self).set_sda(high);
    }

    fn set_scl(&mut self, high: bool) {
        (**self).set_scl(high);
    }

    fn get_sda(&mut self) -> bool {
        (**self).get_sda()
    }

    fn get_scl(&mut self) -> Option<bool> {
        (**self).get_scl()
    }
}
