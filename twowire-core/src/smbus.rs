//! SMBus transactions emulated over plain I2C messages
//!
//! SMBus words are little-endian: the low byte goes first on the wire.

use crate::bus::transfer;
use crate::driver::Client;
use crate::error::Error;
use crate::message::Message;

fn run(client: &Client, msgs: &mut [Message<'_>]) -> Result<(), Error> {
    let count = msgs.len();
    match transfer(client.adapter(), msgs)? {
        n if n == count => Ok(()),
        _ => Err(Error::RemoteIo),
    }
}

/// Address the client with no data; `read` is the single data bit
pub fn write_quick(client: &Client, read: bool) -> Result<(), Error> {
    if read {
        run(client, &mut [Message::read(client.address(), &mut [])])
    } else {
        run(client, &mut [Message::write(client.address(), &[])])
    }
}

pub fn read_byte(client: &Client) -> Result<u8, Error> {
    let mut buf = [0u8; 1];
    run(client, &mut [Message::read(client.address(), &mut buf)])?;
    Ok(buf[0])
}

pub fn write_byte(client: &Client, value: u8) -> Result<(), Error> {
    run(client, &mut [Message::write(client.address(), &[value])])
}

pub fn read_byte_data(client: &Client, command: u8) -> Result<u8, Error> {
    let mut buf = [0u8; 1];
    run(
        client,
        &mut [
            Message::write(client.address(), &[command]),
            Message::read(client.address(), &mut buf),
        ],
    )?;
    Ok(buf[0])
}

pub fn write_byte_data(client: &Client, command: u8, value: u8) -> Result<(), Error> {
    run(client, &mut [Message::write(client.address(), &[command, value])])
}

pub fn read_word_data(client: &Client, command: u8) -> Result<u16, Error> {
    let mut buf = [0u8; 2];
    run(
        client,
        &mut [
            Message::write(client.address(), &[command]),
            Message::read(client.address(), &mut buf),
        ],
    )?;
    Ok(u16::from_le_bytes(buf))
}

pub fn write_word_data(client: &Client, command: u8, value: u16) -> Result<(), Error> {
    let [lo, hi] = value.to_le_bytes();
    run(client, &mut [Message::write(client.address(), &[command, lo, hi])])
}

/// Read `buf.len()` bytes starting at `command`, without a count byte
pub fn read_i2c_block_data(client: &Client, command: u8, buf: &mut [u8]) -> Result<usize, Error> {
    let len = buf.len();
    run(
        client,
        &mut [
            Message::write(client.address(), &[command]),
            Message::read(client.address(), buf),
        ],
    )?;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterConfig;
    use crate::driver::DriverId;
    use crate::engine::{add_bit_adapter, BitAlgorithm, BitBangBus};
    use crate::message::Address;
    use crate::registry::BusRegistry;
    use crate::sim::{BusEvent, RegisterDevice, Registers, SimBus, SimClock};
    use alloc::sync::Arc;

    fn setup(addr: u8) -> (BusRegistry, SimBus, Registers, Arc<Client>) {
        let registry = BusRegistry::default();
        let sim = SimBus::new();
        let dev = RegisterDevice::new(0x2D);
        let regs = dev.registers();
        sim.attach(dev);

        let clock = SimClock::new(1);
        let bus = BitBangBus::new(sim.clone(), clock.delay(), clock.clone(), Default::default());
        let adapter = add_bit_adapter(
            &registry,
            Arc::new(BitAlgorithm),
            &AdapterConfig::new("smbus-sim", 0),
            bus,
        )
        .unwrap();
        let client = Arc::new(Client::new(
            registry.next_client_id(),
            "sensor",
            Address::seven_bit(addr),
            adapter,
            DriverId(1),
        ));
        registry.attach_client(&client).unwrap();
        (registry, sim, regs, client)
    }

    #[test]
    fn test_byte_data() {
        let (_registry, _sim, regs, client) = setup(0x2D);
        write_byte_data(&client, 0x40, 0x81).unwrap();
        assert_eq!(regs.get(0x40), 0x81);
        assert_eq!(read_byte_data(&client, 0x40), Ok(0x81));
    }

    #[test]
    fn test_word_data_is_little_endian() {
        let (_registry, _sim, regs, client) = setup(0x2D);
        write_word_data(&client, 0x10, 0xBEEF).unwrap();
        assert_eq!(regs.get(0x10), 0xEF);
        assert_eq!(regs.get(0x11), 0xBE);

        regs.set(0x20, 0x34);
        regs.set(0x21, 0x12);
        assert_eq!(read_word_data(&client, 0x20), Ok(0x1234));
    }

    #[test]
    fn test_pointer_then_byte() {
        let (_registry, _sim, regs, client) = setup(0x2D);
        regs.set(0x07, 0x5A);
        write_byte(&client, 0x07).unwrap();
        assert_eq!(read_byte(&client), Ok(0x5A));
    }

    #[test]
    fn test_block_read() {
        let (_registry, _sim, regs, client) = setup(0x2D);
        for (i, v) in [1u8, 2, 3, 4].iter().enumerate() {
            regs.set(0x30 + i as u8, *v);
        }
        let mut buf = [0u8; 4];
        assert_eq!(read_i2c_block_data(&client, 0x30, &mut buf), Ok(4));
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn test_quick_command() {
        let (_registry, sim, _regs, client) = setup(0x2D);
        write_quick(&client, false).unwrap();
        write_quick(&client, true).unwrap();
        let addresses: alloc::vec::Vec<_> = sim
            .events()
            .into_iter()
            .filter(|e| matches!(e, BusEvent::Address { .. }))
            .collect();
        assert_eq!(
            addresses,
            [
                BusEvent::Address { byte: 0x5A, acked: true },
                BusEvent::Address { byte: 0x5B, acked: true },
            ]
        );
    }

    #[test]
    fn test_absent_device() {
        let (_registry, _sim, _regs, client) = setup(0x2E);
        assert_eq!(read_byte_data(&client, 0), Err(Error::RemoteIo));
        assert_eq!(write_quick(&client, false), Err(Error::RemoteIo));
    }
}
