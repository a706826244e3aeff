//! Client-facing transfer API
//!
//! Chip drivers talk to the bus only through these functions. Every
//! transfer holds the adapter's transfer lock for its whole duration, so
//! concurrent callers on one adapter are serialized; callers on different
//! adapters never wait on each other.

use alloc::sync::Arc;
use alloc::vec::Vec;

use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress};

use crate::adapter::Adapter;
use crate::algorithm::Command;
use crate::driver::Client;
use crate::error::Error;
use crate::message::{Address, Message};

/// Run `msgs` as one transaction on `adapter`
///
/// Blocks until no other transfer is in flight on the adapter. Fails with
/// [`Error::NotFound`] once the adapter has been unregistered.
pub fn transfer(adapter: &Adapter, msgs: &mut [Message<'_>]) -> Result<usize, Error> {
    let mut bus = adapter.lock_bus();
    if !adapter.is_registered() {
        return Err(Error::NotFound);
    }
    adapter.algorithm().master_transfer(&mut bus, msgs)
}

/// Write `bytes` to the client's address
pub fn master_send(client: &Client, bytes: &[u8]) -> Result<usize, Error> {
    let mut msgs = [Message::write(client.address(), bytes)];
    match transfer(client.adapter(), &mut msgs)? {
        1 => Ok(bytes.len()),
        _ => Err(Error::RemoteIo),
    }
}

/// Fill `buf` from the client's address
pub fn master_recv(client: &Client, buf: &mut [u8]) -> Result<usize, Error> {
    let len = buf.len();
    let mut msgs = [Message::read(client.address(), buf)];
    match transfer(client.adapter(), &mut msgs)? {
        1 => Ok(len),
        _ => Err(Error::RemoteIo),
    }
}

/// Adapter control
///
/// [`Command::Retries`] and [`Command::Timeout`] change the adapter's live
/// settings; [`Command::Algorithm`] is passed to the algorithm.
pub fn control(client: &Client, command: Command, arg: u64) -> Result<(), Error> {
    let adapter = client.adapter();
    let mut bus = adapter.lock_bus();
    if !adapter.is_registered() {
        return Err(Error::NotFound);
    }
    match command {
        Command::Retries => bus.retries = u32::try_from(arg).unwrap_or(u32::MAX),
        Command::Timeout => bus.timeout_us = arg,
        Command::Algorithm(cmd) => adapter.algorithm().algo_control(&mut bus, cmd, arg)?,
    }
    Ok(())
}

/// First address in `lo..=hi` on the client's adapter that acknowledges
///
/// The scan uses the client's address width: a 10-bit client scans up to
/// 0x3FF, a 7-bit client up to 0x7F.
pub fn probe(client: &Client, lo: u16, hi: u16) -> Option<Address> {
    let ten_bit = client.address().is_ten_bit();
    let max = if ten_bit {
        Address::MAX_TEN_BIT
    } else {
        u16::from(Address::MAX_SEVEN_BIT)
    };
    let addresses = (lo..=hi.min(max)).map(|addr| {
        if ten_bit {
            Address::TenBit(addr)
        } else {
            Address::SevenBit(addr as u8)
        }
    });
    scan(client.adapter(), addresses)
}

/// First 7-bit address in `lo..=hi` on `adapter` that acknowledges
///
/// Each address gets one zero-length write. The transfer lock is held for
/// the whole scan. Addresses above 0x7F are not scanned; use [`probe`]
/// with a 10-bit client for the wider space.
pub fn probe_adapter(adapter: &Adapter, lo: u8, hi: u8) -> Option<u8> {
    scan(adapter, (lo..=hi.min(Address::MAX_SEVEN_BIT)).map(Address::SevenBit))
        .map(|addr| addr.value() as u8)
}

fn scan(adapter: &Adapter, mut addresses: impl Iterator<Item = Address>) -> Option<Address> {
    let mut bus = adapter.lock_bus();
    if !adapter.is_registered() {
        return None;
    }
    addresses.find(|&addr| {
        let mut msgs = [Message::write(addr, &[])];
        adapter.algorithm().master_transfer(&mut bus, &mut msgs).is_ok()
    })
}

/// A registered adapter as an `embedded-hal` I2C bus
///
/// Lets chip drivers written against `embedded_hal::i2c::I2c` run on any
/// adapter. Every transaction is one [`transfer`].
#[derive(Clone)]
pub struct AdapterBus {
    adapter: Arc<Adapter>,
}

impl AdapterBus {
    pub fn new(adapter: Arc<Adapter>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<Adapter> {
        &self.adapter
    }
}

impl ErrorType for AdapterBus {
    type Error = Error;
}

impl I2c<SevenBitAddress> for AdapterBus {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Error> {
        let address = Address::seven_bit(address);
        let mut msgs: Vec<Message<'_>> = operations
            .iter_mut()
            .map(|op| match op {
                Operation::Read(buf) => Message::read(address, buf),
                Operation::Write(bytes) => Message::write(address, *bytes),
            })
            .collect();
        transfer(&self.adapter, &mut msgs).map(|_| ())
    }
}
