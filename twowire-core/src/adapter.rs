//! Bus instances
//!
//! An [`Adapter`] binds an [`Algorithm`] to one piece of hardware. It owns
//! two independent locks:
//!
//! - the transfer lock around [`BusState`], held for a whole transaction so
//!   at most one transfer is in flight per adapter;
//! - the client-set lock, held only while the set of attached clients is
//!   read or changed, so attach/detach never waits for a transfer.

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use heapless::String;

use crate::algorithm::{AdapterBackend, Algorithm, AlgorithmId};
use crate::config::{bounded_name, AdapterConfig, MAX_NAME_LEN};
use crate::driver::{Client, DriverId};
use crate::error::Error;
use crate::message::Address;

/// Adapter identifier: algorithm id | hardware id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdapterId(pub u32);

impl AdapterId {
    /// Compose an id from its algorithm and hardware parts
    pub const fn new(algorithm: AlgorithmId, hw_id: u16) -> Self {
        Self((algorithm.0 & AlgorithmId::MASK) | hw_id as u32)
    }

    /// Algorithm part
    pub const fn algorithm(self) -> AlgorithmId {
        AlgorithmId(self.0 & AlgorithmId::MASK)
    }

    /// Hardware part
    pub const fn hw_id(self) -> u16 {
        (self.0 & !AlgorithmId::MASK) as u16
    }
}

/// State guarded by the transfer lock
pub struct BusState {
    /// Hardware data for the algorithm
    pub backend: AdapterBackend,
    /// Address attempts per message
    pub retries: u32,
    /// Clock-stretch timeout in microseconds
    pub timeout_us: u64,
}

/// Guard over an adapter's [`BusState`]; the transfer lock is held while it lives
pub type BusGuard<'a> = MutexGuard<'a, CriticalSectionRawMutex, BusState>;

/// One physical or virtual bus
pub struct Adapter {
    name: String<MAX_NAME_LEN>,
    id: AdapterId,
    algorithm: Arc<dyn Algorithm>,
    bus: Mutex<CriticalSectionRawMutex, BusState>,
    clients: BlockingMutex<CriticalSectionRawMutex, RefCell<ClientSet>>,
    registered: AtomicBool,
}

#[derive(Default)]
struct ClientSet {
    list: Vec<Weak<Client>>,
    /// Removal in progress; no new clients
    closing: bool,
}

impl Adapter {
    /// Create an adapter
    ///
    /// The adapter id is `algorithm.id() | hw_id`.
    pub fn new(
        name: &str,
        hw_id: u16,
        algorithm: Arc<dyn Algorithm>,
        backend: AdapterBackend,
        retries: u32,
        timeout_us: u64,
    ) -> Self {
        Self {
            name: bounded_name(name),
            id: AdapterId::new(algorithm.id(), hw_id),
            algorithm,
            bus: Mutex::new(BusState {
                backend,
                retries,
                timeout_us,
            }),
            clients: BlockingMutex::new(RefCell::new(ClientSet::default())),
            registered: AtomicBool::new(false),
        }
    }

    /// Create an adapter from its configuration
    pub fn from_config(
        config: &AdapterConfig,
        algorithm: Arc<dyn Algorithm>,
        backend: AdapterBackend,
    ) -> Self {
        Self::new(
            config.name.as_str(),
            config.hw_id,
            algorithm,
            backend,
            config.retries,
            config.timeout_us,
        )
    }

    /// Display name
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Adapter id
    pub fn id(&self) -> AdapterId {
        self.id
    }

    /// The algorithm transfers are delegated to
    pub fn algorithm(&self) -> &Arc<dyn Algorithm> {
        &self.algorithm
    }

    /// Check if the adapter is currently registered
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub(crate) fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::Release);
    }

    /// Acquire the transfer lock, blocking until it is free
    ///
    /// Waiting is a busy poll of the lock future. On hosted builds a
    /// contending thread spins for the length of the transfer in flight.
    pub fn lock_bus(&self) -> BusGuard<'_> {
        embassy_futures::block_on(self.bus.lock())
    }

    /// Acquire the transfer lock if no transfer is in flight
    pub fn try_lock_bus(&self) -> Option<BusGuard<'_>> {
        self.bus.try_lock().ok()
    }

    /// Current address attempts per message
    pub fn retries(&self) -> u32 {
        self.lock_bus().retries
    }

    /// Current clock-stretch timeout in microseconds
    pub fn timeout_us(&self) -> u64 {
        self.lock_bus().timeout_us
    }

    /// Clients currently attached, in attach order
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.clients
            .lock(|set| set.borrow().list.iter().filter_map(Weak::upgrade).collect())
    }

    /// Number of clients currently attached
    pub fn client_count(&self) -> usize {
        self.clients
            .lock(|set| set.borrow().list.iter().filter(|c| c.strong_count() > 0).count())
    }

    /// Check if a live client occupies `address`
    pub fn address_in_use(&self, address: Address) -> bool {
        self.clients().iter().any(|c| c.address() == address)
    }

    /// Check if `client` is attached here
    pub fn has_client(&self, client: &Client) -> bool {
        self.clients.lock(|set| {
            set.borrow()
                .list
                .iter()
                .any(|c| core::ptr::eq(c.as_ptr(), client))
        })
    }

    pub(crate) fn insert_client(&self, client: &Arc<Client>, max_clients: usize) -> Result<(), Error> {
        self.clients.lock(|set| {
            let mut set = set.borrow_mut();
            if set.closing {
                return Err(Error::NotFound);
            }
            let set = &mut set.list;
            set.retain(|c| c.strong_count() > 0);

            if set.iter().any(|c| core::ptr::eq(c.as_ptr(), Arc::as_ptr(client))) {
                return Err(Error::AlreadyRegistered);
            }
            if set
                .iter()
                .filter_map(Weak::upgrade)
                .any(|c| c.address() == client.address())
            {
                return Err(Error::AddressInUse);
            }
            if set.len() >= max_clients {
                return Err(Error::OutOfSlots);
            }

            set.push(Arc::downgrade(client));
            Ok(())
        })
    }

    pub(crate) fn remove_client(&self, client: &Client) -> Result<(), Error> {
        self.clients.lock(|set| {
            let mut set = set.borrow_mut();
            let set = &mut set.list;
            let pos = set
                .iter()
                .position(|c| core::ptr::eq(c.as_ptr(), client))
                .ok_or(Error::NotFound)?;
            set.remove(pos);
            Ok(())
        })
    }

    /// Detach every client bound to `driver`, returning the live ones
    pub(crate) fn remove_clients_of(&self, driver: DriverId) -> Vec<Arc<Client>> {
        self.clients.lock(|set| {
            let mut set = set.borrow_mut();
            let set = &mut set.list;
            let mut removed = Vec::new();
            set.retain(|c| match c.upgrade() {
                Some(c) if c.driver() == driver => {
                    removed.push(c);
                    false
                }
                Some(_) => true,
                None => false,
            });
            removed
        })
    }

    pub(crate) fn open_clients(&self) {
        self.clients.lock(|set| set.borrow_mut().closing = false);
    }

    pub(crate) fn close_clients(&self) {
        self.clients.lock(|set| set.borrow_mut().closing = true);
    }

    pub(crate) fn clear_clients(&self) -> usize {
        self.clients.lock(|set| {
            let mut set = set.borrow_mut();
            let set = &mut set.list;
            let live = set.iter().filter(|c| c.strong_count() > 0).count();
            set.clear();
            live
        })
    }
}
