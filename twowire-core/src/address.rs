//! Addressing phase
//!
//! Turns a message's logical address into the bytes the I2C protocol puts on
//! the wire, retrying NACKed address bytes a bounded number of times.
//!
//! | Width  | Write                                | Read                                                   |
//! |--------|--------------------------------------|--------------------------------------------------------|
//! | 7-bit  | `addr << 1`                          | `addr << 1 \| 1`                                       |
//! | 10-bit | `0xF0 \| a9a8 << 1`, `a7..a0`        | as write, then repeated START, `0xF0 \| a9a8 << 1 \| 1` |

use crate::error::Error;
use crate::message::{Address, Message};
use crate::transport::Transport;

/// High bits of the first byte of a 10-bit address (`11110xx`)
pub const TEN_BIT_PREFIX: u8 = 0xF0;

/// R/W bit value for a master read
pub const READ_BIT: u8 = 0x01;

/// Address byte for a 7-bit slave
pub const fn seven_bit_byte(addr: u8, read: bool) -> u8 {
    ((addr & Address::MAX_SEVEN_BIT) << 1) | read as u8
}

/// First (prefix) byte of a 10-bit address, write direction
pub const fn ten_bit_prefix(addr: u16) -> u8 {
    TEN_BIT_PREFIX | ((addr >> 7) & 0x06) as u8
}

/// Send an address byte, retrying on NACK
///
/// Makes at most `retries` attempts (at least one). Between attempts the
/// bus is stopped, held for the transport's retry pause and started again.
/// After the last failed attempt the bus is left stopped.
///
/// # Errors
/// - [`Error::RemoteIo`] if every attempt was NACKed
/// - [`Error::Timeout`] if a slave held the clock too long
pub fn try_address<T: Transport + ?Sized>(
    transport: &mut T,
    byte: u8,
    retries: u32,
) -> Result<(), Error> {
    let attempts = retries.max(1);
    for attempt in 1..=attempts {
        if transport.send_byte(byte)? {
            if attempt > 1 {
                debug!("address {=u8:#x} acknowledged on attempt {}", byte, attempt);
            }
            return Ok(());
        }
        transport.stop()?;
        transport.retry_pause();
        if attempt == attempts {
            break;
        }
        trace!("address {=u8:#x} NACKed, retrying", byte);
        transport.start();
    }
    debug!("address {=u8:#x} not acknowledged after {} attempts", byte, attempts);
    Err(Error::RemoteIo)
}

/// Run the addressing phase for one message
///
/// For a 10-bit read the address is first sent in write direction, then a
/// repeated START re-sends the prefix with the read bit set.
pub fn address_client<T: Transport + ?Sized>(
    transport: &mut T,
    msg: &Message<'_>,
    retries: u32,
) -> Result<(), Error> {
    let read = msg.is_read();
    match msg.address {
        Address::SevenBit(addr) => try_address(transport, seven_bit_byte(addr, read), retries),
        Address::TenBit(addr) => {
            let prefix = ten_bit_prefix(addr);
            try_address(transport, prefix, retries)?;

            // Low eight address bits: no retry, a NACK here means no such slave
            if !transport.send_byte(addr as u8)? {
                debug!("10-bit address {=u16:#x}: second byte NACKed", addr);
                return Err(Error::RemoteIo);
            }

            if read {
                transport.repeated_start()?;
                try_address(transport, prefix | READ_BIT, retries)?;
            }
            Ok(())
        }
    }
}
