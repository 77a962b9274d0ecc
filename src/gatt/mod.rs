//! The GATT service registry
//!
//! The registry is the set of services that the peripheral exposes. It is built by the
//! application before the server is started and it is frozen when the server starts.
//!
//! ```
//! use bo_tie_peripheral::gatt::{Registry, ServiceKind};
//! use bo_tie_peripheral::gatt::characteristic::{Permissions, Properties};
//! use bo_tie_peripheral::Uuid;
//!
//! let registry = Registry::new();
//!
//! let service = registry.add_service(Uuid::from_u16(0x180D), ServiceKind::Primary).unwrap();
//!
//! registry.add_characteristic(
//!     service,
//!     Uuid::from_u16(0x2A37),
//!     [Properties::Notify].into(),
//!     [Permissions::Readable].into(),
//! ).unwrap();
//!
//! registry.freeze();
//!
//! assert!(registry.add_service(Uuid::from_u16(0x180F), ServiceKind::Primary).is_err());
//! ```
//!
//! # Freezing
//! A frozen registry cannot be changed. Services are moved out from behind the builder lock into
//! an immutable list the moment the registry is frozen, so everything reading the registry after
//! that point does it without taking a lock. Characteristic values are still mutable as each value
//! has its own lock.

pub mod characteristic;

use crate::{lock, Error, Uuid};
use characteristic::{Characteristic, CharacteristicRecord, PermissionFlags, PropertyFlags};
use std::sync::{Mutex, OnceLock};

/// The kind of service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ServiceKind {
    Primary,
    Secondary,
}

impl ServiceKind {
    pub fn is_primary(&self) -> bool {
        *self == ServiceKind::Primary
    }
}

/// The identifier of a service within the registry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ServiceId(pub Uuid);

/// The identifier of a characteristic within the registry
///
/// A characteristic UUID is only unique within its service so the identifier is the pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CharacteristicId {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl CharacteristicId {
    pub fn new(service: Uuid, characteristic: Uuid) -> Self {
        CharacteristicId { service, characteristic }
    }

    pub fn service_id(&self) -> ServiceId {
        ServiceId(self.service)
    }
}

/// A GATT Service
#[derive(Debug)]
pub struct Service {
    uuid: Uuid,
    kind: ServiceKind,
    characteristics: Vec<Characteristic>,
}

impl Service {
    fn new(uuid: Uuid, kind: ServiceKind) -> Self {
        Service {
            uuid,
            kind,
            characteristics: Vec::new(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    /// Get a characteristic of this service
    pub fn get_characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid() == uuid)
    }

    /// Iterate over the characteristics in the order they were added
    pub fn characteristics(&self) -> impl Iterator<Item = &Characteristic> {
        self.characteristics.iter()
    }

    fn record(&self) -> ServiceRecord {
        ServiceRecord {
            uuid: self.uuid,
            kind: self.kind,
            characteristics: self.characteristics.iter().map(|c| c.record()).collect(),
        }
    }
}

/// The declaration of a service
///
/// This is a copy of the declaration information of a service and its characteristics. It is what
/// is handed to the radio when the service is registered with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRecord {
    pub uuid: Uuid,
    pub kind: ServiceKind,
    pub characteristics: Vec<CharacteristicRecord>,
}

/// The registry of services
#[derive(Debug, Default)]
pub struct Registry {
    builder: Mutex<Vec<Service>>,
    frozen: OnceLock<Box<[Service]>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service
    ///
    /// If a service with `uuid` already exists this does nothing, the first registration of a
    /// service wins. Either way the identifier of the service is returned.
    ///
    /// # Error
    /// [`Error::AlreadyStarted`] is returned if the registry is frozen.
    pub fn add_service(&self, uuid: Uuid, kind: ServiceKind) -> Result<ServiceId, Error> {
        let mut services = lock(&self.builder);

        if self.is_frozen() {
            return Err(Error::AlreadyStarted);
        }

        if services.iter().any(|s| s.uuid == uuid) {
            log::debug!("(GATT) service {:?} is already registered", uuid);
        } else {
            log::info!("(GATT) adding {:?} service {:?}", kind, uuid);

            services.push(Service::new(uuid, kind));
        }

        Ok(ServiceId(uuid))
    }

    /// Add a characteristic to a service
    ///
    /// # Error
    /// * [`Error::NotFound`] if there is no service for `service`
    /// * [`Error::InvalidArgument`] if the service already has a characteristic with `uuid`
    /// * [`Error::AlreadyStarted`] if the registry is frozen
    pub fn add_characteristic(
        &self,
        service: ServiceId,
        uuid: Uuid,
        properties: PropertyFlags,
        permissions: PermissionFlags,
    ) -> Result<CharacteristicId, Error> {
        let mut services = lock(&self.builder);

        if self.is_frozen() {
            return Err(Error::AlreadyStarted);
        }

        let owner = services
            .iter_mut()
            .find(|s| s.uuid == service.0)
            .ok_or_else(|| Error::NotFound(format!("service {}", service.0)))?;

        if owner.get_characteristic(uuid).is_some() {
            return Err(Error::InvalidArgument(format!(
                "service {} already has the characteristic {}",
                service.0, uuid
            )));
        }

        log::info!(
            "(GATT) adding characteristic {:?} to service {:?} {{ properties: {:?}, permissions: {:?} }}",
            uuid,
            service.0,
            properties,
            permissions
        );

        owner
            .characteristics
            .push(Characteristic::new(uuid, properties, permissions));

        Ok(CharacteristicId::new(service.0, uuid))
    }

    /// Freeze the registry
    ///
    /// Once frozen every method that would change the services fails with
    /// [`Error::AlreadyStarted`]. Freezing an already frozen registry does nothing.
    pub fn freeze(&self) {
        let mut services = lock(&self.builder);

        if !self.is_frozen() {
            let services = core::mem::take(&mut *services).into_boxed_slice();

            log::debug!("(GATT) registry frozen with {} service(s)", services.len());

            // the builder lock is held, nothing else can be setting `frozen`
            let _ = self.frozen.set(services);
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get().is_some()
    }

    /// Run `f` with the services
    ///
    /// This does not lock once the registry is frozen.
    fn with_services<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&[Service]) -> T,
    {
        match self.frozen.get() {
            Some(services) => f(services),
            None => f(&lock(&self.builder)),
        }
    }

    /// Run `f` with the characteristic for `id`
    ///
    /// `None` is returned if the characteristic is not within the registry.
    pub fn with_characteristic<F, T>(&self, id: &CharacteristicId, f: F) -> Option<T>
    where
        F: FnOnce(&Characteristic) -> T,
    {
        self.with_services(|services| {
            services
                .iter()
                .find(|s| s.uuid == id.service)
                .and_then(|s| s.get_characteristic(id.characteristic))
                .map(f)
        })
    }

    /// Check if a characteristic exists
    pub fn contains(&self, id: &CharacteristicId) -> bool {
        self.with_characteristic(id, |_| ()).is_some()
    }

    /// Read the value of a characteristic
    pub fn read_value(&self, id: &CharacteristicId) -> Result<Vec<u8>, Error> {
        self.with_characteristic(id, |c| c.read_value())
            .ok_or_else(|| not_found(id))
    }

    /// Replace the value of a characteristic
    pub fn write_value(&self, id: &CharacteristicId, value: &[u8]) -> Result<(), Error> {
        self.with_characteristic(id, |c| c.write_value(value))
            .ok_or_else(|| not_found(id))
    }

    /// Get the properties of a characteristic
    pub fn properties(&self, id: &CharacteristicId) -> Result<PropertyFlags, Error> {
        self.with_characteristic(id, |c| c.properties())
            .ok_or_else(|| not_found(id))
    }

    /// Get the first service added to the registry
    pub fn first_service(&self) -> Option<ServiceRecord> {
        self.with_services(|services| services.first().map(|s| s.record()))
    }

    /// Get all services in the order they were added
    pub fn services(&self) -> Vec<ServiceRecord> {
        self.with_services(|services| services.iter().map(|s| s.record()).collect())
    }

    /// Get the number of services
    pub fn len(&self) -> usize {
        self.with_services(|services| services.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn not_found(id: &CharacteristicId) -> Error {
    Error::NotFound(format!(
        "characteristic {} of service {}",
        id.characteristic, id.service
    ))
}
