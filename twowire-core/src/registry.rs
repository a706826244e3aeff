//! Algorithm, adapter and driver registry
//!
//! Lists are kept in registration order. Every driver callback (adapter
//! notifications and detach cascades) runs on a snapshot taken after the
//! list lock is released, so callbacks may re-enter the registry and run
//! transfers.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;

use crate::adapter::{Adapter, AdapterId};
use crate::algorithm::{Algorithm, AlgorithmId};
use crate::config::RegistryLimits;
use crate::driver::{Client, ClientId, Driver, DriverId};
use crate::error::Error;

type List<T> = BlockingMutex<CriticalSectionRawMutex, RefCell<Vec<T>>>;

/// The bus registry
pub struct BusRegistry {
    limits: RegistryLimits,
    algorithms: List<Arc<dyn Algorithm>>,
    adapters: List<Arc<Adapter>>,
    drivers: List<Arc<dyn Driver>>,
    next_client: AtomicU32,
}

impl Default for BusRegistry {
    fn default() -> Self {
        Self::new(RegistryLimits::default())
    }
}

impl BusRegistry {
    pub fn new(limits: RegistryLimits) -> Self {
        Self {
            limits,
            algorithms: BlockingMutex::new(RefCell::new(Vec::new())),
            adapters: BlockingMutex::new(RefCell::new(Vec::new())),
            drivers: BlockingMutex::new(RefCell::new(Vec::new())),
            next_client: AtomicU32::new(1),
        }
    }

    pub fn limits(&self) -> &RegistryLimits {
        &self.limits
    }

    /// A client id not handed out before by this registry
    pub fn next_client_id(&self) -> ClientId {
        ClientId(self.next_client.fetch_add(1, Ordering::Relaxed))
    }

    pub fn add_algorithm(&self, algorithm: Arc<dyn Algorithm>) -> Result<(), Error> {
        self.algorithms.lock(|list| {
            let mut list = list.borrow_mut();
            if list.iter().any(|a| a.id() == algorithm.id()) {
                return Err(Error::AlreadyRegistered);
            }
            if list.len() >= self.limits.max_algorithms {
                return Err(Error::OutOfSlots);
            }
            list.push(algorithm.clone());
            Ok(())
        })?;
        info!("algorithm {} registered", algorithm.name());
        Ok(())
    }

    /// Remove an algorithm
    ///
    /// Fails with [`Error::InUse`] while a registered adapter still uses it.
    pub fn remove_algorithm(&self, id: AlgorithmId) -> Result<(), Error> {
        if self.adapters().iter().any(|a| a.algorithm().id() == id) {
            return Err(Error::InUse);
        }
        let removed = self.algorithms.lock(|list| {
            let mut list = list.borrow_mut();
            let pos = list.iter().position(|a| a.id() == id).ok_or(Error::NotFound)?;
            Ok::<_, Error>(list.remove(pos))
        })?;
        info!("algorithm {} removed", removed.name());
        Ok(())
    }

    pub fn algorithms(&self) -> Vec<Arc<dyn Algorithm>> {
        self.algorithms.lock(|list| list.borrow().clone())
    }

    pub fn algorithm_by_id(&self, id: AlgorithmId) -> Option<Arc<dyn Algorithm>> {
        self.algorithms
            .lock(|list| list.borrow().iter().find(|a| a.id() == id).cloned())
    }

    /// Register an adapter and offer it to every notified driver
    ///
    /// Drivers see the adapter in their registration order. A failing
    /// driver is logged and does not keep later drivers from seeing it.
    pub fn add_adapter(&self, adapter: Arc<Adapter>) -> Result<(), Error> {
        self.adapters.lock(|list| {
            let mut list = list.borrow_mut();
            if list.iter().any(|a| Arc::ptr_eq(a, &adapter) || a.id() == adapter.id()) {
                return Err(Error::AlreadyRegistered);
            }
            if list.len() >= self.limits.max_adapters {
                return Err(Error::OutOfSlots);
            }
            adapter.open_clients();
            adapter.set_registered(true);
            list.push(adapter.clone());
            Ok(())
        })?;
        info!("adapter {} registered as {=u32:#x}", adapter.name(), adapter.id().0);

        for driver in self.drivers() {
            if !driver.notify_on_attach() {
                continue;
            }
            if let Err(e) = driver.attach_adapter(self, &adapter) {
                warn!("driver {} failed to attach to {}: {}", driver.name(), adapter.name(), e);
            }
        }
        Ok(())
    }

    /// Unregister an adapter, detaching every client first
    ///
    /// Each client is handed to its own driver's `detach_client`, whatever
    /// that driver's notify flag. New clients are refused from the moment
    /// removal starts. Clients a driver fails to detach are dropped from
    /// the adapter anyway.
    pub fn remove_adapter(&self, adapter: &Arc<Adapter>) -> Result<(), Error> {
        if !self.adapters.lock(|list| list.borrow().iter().any(|a| Arc::ptr_eq(a, adapter))) {
            return Err(Error::NotFound);
        }

        adapter.close_clients();
        for client in adapter.clients() {
            match self.driver_by_id(client.driver()) {
                Some(driver) => {
                    if let Err(e) = driver.detach_client(self, &client) {
                        warn!("driver {} failed to detach client {}: {}", driver.name(), client.name(), e);
                    }
                }
                None => warn!("client {} has no registered driver", client.name()),
            }
        }

        let stale = adapter.clear_clients();
        if stale > 0 {
            warn!("{}: dropped {} clients left attached", adapter.name(), stale);
        }

        adapter.set_registered(false);
        self.adapters.lock(|list| list.borrow_mut().retain(|a| !Arc::ptr_eq(a, adapter)));
        info!("adapter {} removed", adapter.name());
        Ok(())
    }

    pub fn adapters(&self) -> Vec<Arc<Adapter>> {
        self.adapters.lock(|list| list.borrow().clone())
    }

    pub fn adapter_by_id(&self, id: AdapterId) -> Option<Arc<Adapter>> {
        self.adapters
            .lock(|list| list.borrow().iter().find(|a| a.id() == id).cloned())
    }

    /// Register a driver and offer it every adapter already present
    pub fn add_driver(&self, driver: Arc<dyn Driver>) -> Result<(), Error> {
        self.drivers.lock(|list| {
            let mut list = list.borrow_mut();
            if list.iter().any(|d| d.id() == driver.id()) {
                return Err(Error::AlreadyRegistered);
            }
            if list.len() >= self.limits.max_drivers {
                return Err(Error::OutOfSlots);
            }
            list.push(driver.clone());
            Ok(())
        })?;
        info!("driver {} registered", driver.name());

        if driver.notify_on_attach() {
            for adapter in self.adapters() {
                if let Err(e) = driver.attach_adapter(self, &adapter) {
                    warn!("driver {} failed to attach to {}: {}", driver.name(), adapter.name(), e);
                }
            }
        }
        Ok(())
    }

    /// Unregister a driver, detaching its clients on every adapter first
    ///
    /// Clients the driver fails to detach are dropped from their adapter.
    pub fn remove_driver(&self, id: DriverId) -> Result<(), Error> {
        let driver = self.driver_by_id(id).ok_or(Error::NotFound)?;

        for adapter in self.adapters() {
            for client in adapter.clients() {
                if client.driver() != id {
                    continue;
                }
                if let Err(e) = driver.detach_client(self, &client) {
                    warn!("driver {} failed to detach client {}: {}", driver.name(), client.name(), e);
                }
            }
            for client in adapter.remove_clients_of(id) {
                warn!("{}: dropped client {} of driver {}", adapter.name(), client.name(), driver.name());
            }
        }

        self.drivers.lock(|list| list.borrow_mut().retain(|d| d.id() != id));
        info!("driver {} removed", driver.name());
        Ok(())
    }

    pub fn drivers(&self) -> Vec<Arc<dyn Driver>> {
        self.drivers.lock(|list| list.borrow().clone())
    }

    pub fn driver_by_id(&self, id: DriverId) -> Option<Arc<dyn Driver>> {
        self.drivers
            .lock(|list| list.borrow().iter().find(|d| d.id() == id).cloned())
    }

    /// Attach `client` to its adapter
    ///
    /// The adapter must be registered. If the algorithm's
    /// `client_register` hook fails the client is taken off again.
    pub fn attach_client(&self, client: &Arc<Client>) -> Result<(), Error> {
        let adapter = client.adapter();
        if !adapter.is_registered() {
            return Err(Error::NotFound);
        }
        adapter.insert_client(client, self.limits.max_clients)?;

        if let Err(e) = adapter.algorithm().client_register(client) {
            let _ = adapter.remove_client(client);
            return Err(e);
        }
        debug!("client {} attached to {} at {=u16:#x}", client.name(), adapter.name(), client.address().value());
        Ok(())
    }

    /// Detach `client` from its adapter
    ///
    /// If the algorithm's `client_unregister` hook fails the client stays
    /// attached.
    pub fn detach_client(&self, client: &Arc<Client>) -> Result<(), Error> {
        let adapter = client.adapter();
        if !adapter.has_client(client) {
            return Err(Error::NotFound);
        }
        adapter.algorithm().client_unregister(client)?;
        adapter.remove_client(client)?;
        debug!("client {} detached from {}", client.name(), adapter.name());
        Ok(())
    }

    /// Remove every driver, then every adapter, then every algorithm
    pub fn teardown(&self) {
        for driver in self.drivers().iter().rev() {
            if let Err(e) = self.remove_driver(driver.id()) {
                warn!("teardown: driver {}: {}", driver.name(), e);
            }
        }
        for adapter in self.adapters().iter().rev() {
            if let Err(e) = self.remove_adapter(adapter) {
                warn!("teardown: adapter {}: {}", adapter.name(), e);
            }
        }
        self.algorithms.lock(|list| list.borrow_mut().clear());
        info!("registry torn down");
    }
}
