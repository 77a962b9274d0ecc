//! GATT characteristic information
//!
//! A characteristic is created through [`Registry::add_characteristic`] and lives for as long as
//! the service that owns it. The declaration information (UUID, properties, and permissions) is
//! fixed at creation, only the value of a characteristic can change.
//!
//! [`Registry::add_characteristic`]: crate::gatt::Registry::add_characteristic

use crate::{lock, Error, Uuid};
use core::borrow::Borrow;
use core::fmt;
use std::sync::Mutex;

/// Characteristic Properties
///
/// These are the properties that are part of the Characteristic Declaration. They tell a client
/// how the characteristic value can be used.
#[derive(Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Debug)]
pub enum Properties {
    Broadcast,
    Read,
    WriteWithoutResponse,
    Write,
    Notify,
    Indicate,
    AuthenticatedSignedWrite,
    ExtendedProperties,
}

impl Properties {
    const ALL: [Properties; 8] = [
        Properties::Broadcast,
        Properties::Read,
        Properties::WriteWithoutResponse,
        Properties::Write,
        Properties::Notify,
        Properties::Indicate,
        Properties::AuthenticatedSignedWrite,
        Properties::ExtendedProperties,
    ];

    pub const fn to_val(&self) -> u8 {
        match *self {
            Properties::Broadcast => 1 << 0,
            Properties::Read => 1 << 1,
            Properties::WriteWithoutResponse => 1 << 2,
            Properties::Write => 1 << 3,
            Properties::Notify => 1 << 4,
            Properties::Indicate => 1 << 5,
            Properties::AuthenticatedSignedWrite => 1 << 6,
            Properties::ExtendedProperties => 1 << 7,
        }
    }
}

/// The bit field of a characteristic's [`Properties`]
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PropertyFlags(u8);

impl PropertyFlags {
    /// Create a property bit field from a list of properties
    pub fn new<P>(properties: P) -> Self
    where
        P: Borrow<[Properties]>,
    {
        PropertyFlags(properties.borrow().iter().fold(0u8, |u, p| u | p.to_val()))
    }

    /// Try to create the bit field from a raw value
    ///
    /// Raw values come from the application, so any bit beyond the eight defined properties is
    /// rejected.
    pub fn try_from_bits(bits: u32) -> Result<Self, Error> {
        u8::try_from(bits)
            .map(PropertyFlags)
            .map_err(|_| Error::InvalidArgument(format!("properties {:#x} are out of range", bits)))
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, property: Properties) -> bool {
        self.0 & property.to_val() != 0
    }

    /// Iterate over the properties within this bit field
    pub fn iter(&self) -> impl Iterator<Item = Properties> + '_ {
        Properties::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl fmt::Debug for PropertyFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<const N: usize> From<[Properties; N]> for PropertyFlags {
    fn from(properties: [Properties; N]) -> Self {
        PropertyFlags::new(properties)
    }
}

/// Characteristic Permissions
///
/// Permissions are the access control of the characteristic value. They are distinct from the
/// [`Properties`] as properties only describe to the client what it can do with the value, the
/// permissions are what the radio enforces.
#[derive(Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Debug)]
pub enum Permissions {
    Readable,
    ReadableEncrypted,
    ReadableEncryptedMitm,
    Writable,
    WritableEncrypted,
    WritableEncryptedMitm,
    WritableSigned,
    WritableSignedMitm,
}

impl Permissions {
    const ALL: [Permissions; 8] = [
        Permissions::Readable,
        Permissions::ReadableEncrypted,
        Permissions::ReadableEncryptedMitm,
        Permissions::Writable,
        Permissions::WritableEncrypted,
        Permissions::WritableEncryptedMitm,
        Permissions::WritableSigned,
        Permissions::WritableSignedMitm,
    ];

    /// Bit `0x08` is not assigned to any permission
    const VALID_BITS: u16 = 0x1F7;

    pub const fn to_val(&self) -> u16 {
        match *self {
            Permissions::Readable => 1 << 0,
            Permissions::ReadableEncrypted => 1 << 1,
            Permissions::ReadableEncryptedMitm => 1 << 2,
            Permissions::Writable => 1 << 4,
            Permissions::WritableEncrypted => 1 << 5,
            Permissions::WritableEncryptedMitm => 1 << 6,
            Permissions::WritableSigned => 1 << 7,
            Permissions::WritableSignedMitm => 1 << 8,
        }
    }
}

/// The bit field of a characteristic's [`Permissions`]
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PermissionFlags(u16);

impl PermissionFlags {
    /// Create a permission bit field from a list of permissions
    pub fn new<P>(permissions: P) -> Self
    where
        P: Borrow<[Permissions]>,
    {
        PermissionFlags(permissions.borrow().iter().fold(0u16, |u, p| u | p.to_val()))
    }

    /// Try to create the bit field from a raw value
    pub fn try_from_bits(bits: u32) -> Result<Self, Error> {
        match u16::try_from(bits) {
            Ok(raw) if raw & !Permissions::VALID_BITS == 0 => Ok(PermissionFlags(raw)),
            _ => Err(Error::InvalidArgument(format!(
                "permissions {:#x} contain undefined bits",
                bits
            ))),
        }
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn contains(&self, permission: Permissions) -> bool {
        self.0 & permission.to_val() != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Permissions> + '_ {
        Permissions::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl fmt::Debug for PermissionFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<const N: usize> From<[Permissions; N]> for PermissionFlags {
    fn from(permissions: [Permissions; N]) -> Self {
        PermissionFlags::new(permissions)
    }
}

/// A characteristic of a service
///
/// The value is behind its own lock so that reads and writes of different characteristics never
/// contend with each other.
pub struct Characteristic {
    uuid: Uuid,
    properties: PropertyFlags,
    permissions: PermissionFlags,
    value: Mutex<Vec<u8>>,
}

impl Characteristic {
    pub(crate) fn new(uuid: Uuid, properties: PropertyFlags, permissions: PermissionFlags) -> Self {
        Characteristic {
            uuid,
            properties,
            permissions,
            value: Mutex::new(Vec::new()),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn properties(&self) -> PropertyFlags {
        self.properties
    }

    pub fn permissions(&self) -> PermissionFlags {
        self.permissions
    }

    /// Get a copy of the current value
    pub fn read_value(&self) -> Vec<u8> {
        lock(&self.value).clone()
    }

    /// Replace the value
    pub fn write_value(&self, value: &[u8]) {
        let mut current = lock(&self.value);

        current.clear();

        current.extend_from_slice(value);
    }

    pub(crate) fn record(&self) -> CharacteristicRecord {
        CharacteristicRecord {
            uuid: self.uuid,
            properties: self.properties,
            permissions: self.permissions,
        }
    }
}

impl fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Characteristic")
            .field("uuid", &self.uuid)
            .field("properties", &self.properties)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}

/// The declaration of a characteristic
///
/// This is the information a radio needs to register a characteristic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CharacteristicRecord {
    pub uuid: Uuid,
    pub properties: PropertyFlags,
    pub permissions: PermissionFlags,
}
