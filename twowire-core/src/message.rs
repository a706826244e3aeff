//! Transfer messages
//!
//! A [`Message`] is one addressing phase plus the data that follows it.
//! Buffers are borrowed from the caller for the duration of one transfer;
//! the direction is carried by the buffer itself so a read can never be
//! issued against an immutable slice.

/// Slave address in one of the two I2C widths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Address {
    /// Classic 7-bit address (0x00..=0x7F)
    SevenBit(u8),
    /// Extended 10-bit address (0x000..=0x3FF)
    TenBit(u16),
}

impl Address {
    /// Highest 7-bit address
    pub const MAX_SEVEN_BIT: u8 = 0x7F;

    /// Highest 10-bit address
    pub const MAX_TEN_BIT: u16 = 0x3FF;

    /// 7-bit address, upper bit discarded
    pub const fn seven_bit(addr: u8) -> Self {
        Address::SevenBit(addr & Self::MAX_SEVEN_BIT)
    }

    /// 10-bit address, bits above bit 9 discarded
    pub const fn ten_bit(addr: u16) -> Self {
        Address::TenBit(addr & Self::MAX_TEN_BIT)
    }

    /// Numeric address value
    pub const fn value(self) -> u16 {
        match self {
            Address::SevenBit(a) => a as u16,
            Address::TenBit(a) => a,
        }
    }

    /// Check if this is a 10-bit address
    pub const fn is_ten_bit(self) -> bool {
        matches!(self, Address::TenBit(_))
    }
}

/// Caller-owned data buffer, tagged with the transfer direction
#[derive(Debug)]
pub enum Buffer<'a> {
    /// Master reads from the slave into this buffer
    Read(&'a mut [u8]),
    /// Master writes these bytes to the slave
    Write(&'a [u8]),
}

/// One logical transfer unit
#[derive(Debug)]
pub struct Message<'a> {
    /// Target slave address
    pub address: Address,
    /// Data and direction
    pub buffer: Buffer<'a>,
}

impl<'a> Message<'a> {
    /// Create a write message
    pub fn write(address: Address, bytes: &'a [u8]) -> Self {
        Self {
            address,
            buffer: Buffer::Write(bytes),
        }
    }

    /// Create a read message
    pub fn read(address: Address, buf: &'a mut [u8]) -> Self {
        Self {
            address,
            buffer: Buffer::Read(buf),
        }
    }

    /// Check if the master reads in this message
    pub fn is_read(&self) -> bool {
        matches!(self.buffer, Buffer::Read(_))
    }

    /// Number of data bytes
    pub fn len(&self) -> usize {
        match &self.buffer {
            Buffer::Read(buf) => buf.len(),
            Buffer::Write(bytes) => bytes.len(),
        }
    }

    /// Check if the message carries no data (address-only)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_masking() {
        assert_eq!(Address::seven_bit(0xC8), Address::SevenBit(0x48));
        assert_eq!(Address::ten_bit(0xFFFF), Address::TenBit(0x3FF));
        assert_eq!(Address::ten_bit(0x2A5).value(), 0x2A5);
        assert!(Address::ten_bit(0x10).is_ten_bit());
        assert!(!Address::seven_bit(0x10).is_ten_bit());
    }

    #[test]
    fn test_message_direction() {
        let data = [0x10, 0x20];
        let mut buf = [0u8; 3];

        let write = Message::write(Address::seven_bit(0x48), &data);
        assert!(!write.is_read());
        assert_eq!(write.len(), 2);

        let read = Message::read(Address::seven_bit(0x48), &mut buf);
        assert!(read.is_read());
        assert_eq!(read.len(), 3);
    }

    #[test]
    fn test_address_only_message() {
        let msg = Message::write(Address::seven_bit(0x42), &[]);
        assert!(msg.is_empty());
    }
}
