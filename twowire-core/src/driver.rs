//! Chip drivers and their per-device clients

use alloc::sync::Arc;

use heapless::String;

use crate::adapter::Adapter;
use crate::config::{bounded_name, MAX_NAME_LEN};
use crate::error::Error;
use crate::message::Address;
use crate::registry::BusRegistry;

/// Driver identifier, unique within a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverId(pub u32);

/// Client identifier
///
/// Hand these out with [`BusRegistry::next_client_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClientId(pub u32);

/// One chip at one address on one adapter
///
/// The client keeps its adapter alive; the owning driver is referenced by
/// id and looked up through the registry when the client must be detached.
pub struct Client {
    id: ClientId,
    name: String<MAX_NAME_LEN>,
    address: Address,
    adapter: Arc<Adapter>,
    driver: DriverId,
}

impl Client {
    /// Create a client; it is not attached until [`BusRegistry::attach_client`]
    pub fn new(
        id: ClientId,
        name: &str,
        address: Address,
        adapter: Arc<Adapter>,
        driver: DriverId,
    ) -> Self {
        Self {
            id,
            name: bounded_name(name),
            address,
            adapter,
            driver,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn adapter(&self) -> &Arc<Adapter> {
        &self.adapter
    }

    pub fn driver(&self) -> DriverId {
        self.driver
    }
}

/// A chip driver
///
/// Drivers are notified of adapters as they appear (and of every adapter
/// already present when the driver registers), decide whether their chip is
/// there, and attach clients for what they find. Both callbacks run without
/// any registry lock held, so they may call back into the registry and
/// perform transfers.
pub trait Driver: Send + Sync {
    /// Display name
    fn name(&self) -> &str;

    /// Driver identifier
    fn id(&self) -> DriverId;

    /// Whether [`Driver::attach_adapter`] should be called at all
    fn notify_on_attach(&self) -> bool {
        true
    }

    /// An adapter became available
    ///
    /// Errors are logged by the registry and otherwise ignored.
    fn attach_adapter(&self, registry: &BusRegistry, adapter: &Arc<Adapter>) -> Result<(), Error>;

    /// `client` must be detached, because its adapter or this driver is
    /// being removed
    ///
    /// Implementations normally end with [`BusRegistry::detach_client`].
    fn detach_client(&self, registry: &BusRegistry, client: &Arc<Client>) -> Result<(), Error>;
}
