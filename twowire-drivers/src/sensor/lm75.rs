//! National Semiconductor LM75 temperature sensor
//!
//! The LM75 answers at 0x48..=0x4F. Temperatures are 9-bit two's
//! complement values in 0.5 °C steps, left-justified in a big-endian word;
//! this driver works in 0.1 °C units like the other temperature sensors.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use twowire_core::bus::probe_adapter;
use twowire_core::smbus;
use twowire_core::{Adapter, Address, BusRegistry, Client, Driver, DriverId, Error};

/// First address an LM75 can be strapped to
pub const ADDRESS_LO: u8 = 0x48;
/// Last address an LM75 can be strapped to
pub const ADDRESS_HI: u8 = 0x4F;

const REG_TEMP: u8 = 0x00;
const REG_CONF: u8 = 0x01;
const REG_THYST: u8 = 0x02;
const REG_TOS: u8 = 0x03;

/// Configuration bits that read as zero on a real LM75
const CONF_RESERVED: u8 = 0xE0;
/// Unused low bits of a temperature word
const TEMP_UNUSED: u16 = 0x007F;

/// Lowest temperature the chip can represent, in 0.1 °C
pub const MIN_X10: i16 = -550;
/// Highest temperature the chip can represent, in 0.1 °C
pub const MAX_X10: i16 = 1250;

/// Register word to 0.1 °C
pub fn word_to_x10(word: u16) -> i16 {
    ((word as i16) >> 7) * 5
}

/// 0.1 °C to register word, clamped to the chip range and rounded to 0.5 °C
pub fn x10_to_word(temp_x10: i16) -> u16 {
    let clamped = temp_x10.clamp(MIN_X10, MAX_X10);
    let half_degrees = if clamped < 0 {
        (clamped - 2) / 5
    } else {
        (clamped + 2) / 5
    };
    (half_degrees << 7) as u16
}

// The chip sends words MSB first; SMBus words are LSB first
fn read_word(client: &Client, reg: u8) -> Result<u16, Error> {
    smbus::read_word_data(client, reg).map(u16::swap_bytes)
}

fn write_word(client: &Client, reg: u8, word: u16) -> Result<(), Error> {
    smbus::write_word_data(client, reg, word.swap_bytes())
}

/// LM75 driver
///
/// Scans every adapter it is offered and attaches a client per chip found.
pub struct Lm75 {
    id: DriverId,
    clients: BlockingMutex<CriticalSectionRawMutex, RefCell<Vec<Arc<Client>>>>,
}

impl Lm75 {
    pub fn new(id: DriverId) -> Self {
        Self {
            id,
            clients: BlockingMutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Chips currently attached
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.clients.lock(|list| list.borrow().clone())
    }

    /// Check the configuration and limit registers for LM75 signatures
    pub fn detect(client: &Client) -> Result<bool, Error> {
        let conf = smbus::read_byte_data(client, REG_CONF)?;
        if conf & CONF_RESERVED != 0 {
            return Ok(false);
        }
        let hyst = read_word(client, REG_THYST)?;
        let os = read_word(client, REG_TOS)?;
        Ok(hyst & TEMP_UNUSED == 0 && os & TEMP_UNUSED == 0)
    }

    /// Current temperature in 0.1 °C
    pub fn read_celsius_x10(client: &Client) -> Result<i16, Error> {
        read_word(client, REG_TEMP).map(word_to_x10)
    }

    /// Overtemperature shutdown limit in 0.1 °C
    pub fn overtemp_x10(client: &Client) -> Result<i16, Error> {
        read_word(client, REG_TOS).map(word_to_x10)
    }

    pub fn set_overtemp_x10(client: &Client, temp_x10: i16) -> Result<(), Error> {
        write_word(client, REG_TOS, x10_to_word(temp_x10))
    }

    /// Hysteresis limit in 0.1 °C
    pub fn hysteresis_x10(client: &Client) -> Result<i16, Error> {
        read_word(client, REG_THYST).map(word_to_x10)
    }

    pub fn set_hysteresis_x10(client: &Client, temp_x10: i16) -> Result<(), Error> {
        write_word(client, REG_THYST, x10_to_word(temp_x10))
    }

    fn try_attach(&self, registry: &BusRegistry, adapter: &Arc<Adapter>, addr: u8) -> Result<(), Error> {
        let client = Arc::new(Client::new(
            registry.next_client_id(),
            "lm75",
            Address::seven_bit(addr),
            adapter.clone(),
            self.id,
        ));
        if !Self::detect(&client)? {
            debug!("lm75: {=u8:#x} on {} is not an LM75", addr, adapter.name());
            return Ok(());
        }
        registry.attach_client(&client)?;
        self.clients.lock(|list| list.borrow_mut().push(client));
        info!("lm75: found chip at {=u8:#x} on {}", addr, adapter.name());
        Ok(())
    }
}

impl Driver for Lm75 {
    fn name(&self) -> &str {
        "lm75"
    }

    fn id(&self) -> DriverId {
        self.id
    }

    fn attach_adapter(&self, registry: &BusRegistry, adapter: &Arc<Adapter>) -> Result<(), Error> {
        let mut next = ADDRESS_LO;
        while let Some(addr) = probe_adapter(adapter, next, ADDRESS_HI) {
            if !adapter.address_in_use(Address::seven_bit(addr)) {
                if let Err(e) = self.try_attach(registry, adapter, addr) {
                    warn!("lm75: {=u8:#x} on {}: {}", addr, adapter.name(), e);
                }
            }
            if addr >= ADDRESS_HI {
                break;
            }
            next = addr + 1;
        }
        Ok(())
    }

    fn detach_client(&self, registry: &BusRegistry, client: &Arc<Client>) -> Result<(), Error> {
        registry.detach_client(client)?;
        self.clients
            .lock(|list| list.borrow_mut().retain(|c| !Arc::ptr_eq(c, client)));
        Ok(())
    }
}
