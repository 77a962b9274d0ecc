//! Bluetooth UUIDs
//!
//! Services and characteristics are keyed by a 128-bit UUID. Bluetooth maps two ranges of the
//! 128-bit space onto shortened 16 and 32 bit UUIDs (see the Bluetooth Base UUID in the assigned
//! numbers document). Shortened forms matter to a peripheral because an advertising payload only
//! has 31 bytes, and a 16 bit service UUID costs two bytes instead of sixteen.
//!
//! ```
//! # use bo_tie_peripheral::Uuid;
//! let heart_rate: Uuid = "0000180d-0000-1000-8000-00805f9b34fb".parse().unwrap();
//!
//! assert_eq!(Uuid::from_u16(0x180D), heart_rate);
//! assert!(heart_rate.can_be_16_bit());
//! ```

use core::fmt;
use core::str::FromStr;

/// Universally Unique Identifier
///
/// The display format is the hyphenated lower case form used by most BLE stacks
/// (`68d82662-0305-4e6f-a679-6be1475f5e04`). The debug format shows the shortest form of the UUID
/// along with its size.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Uuid {
    base_uuid: u128,
}

impl Uuid {
    /// See Vol 3 part B sec 2.5.1 for where this value comes from.
    const BLUETOOTH_BASE_UUID: u128 = 0x0000000000001000800000805F9B34FB;

    pub const fn from_u16(v: u16) -> Self {
        Uuid {
            base_uuid: ((v as u128) << 96) | Self::BLUETOOTH_BASE_UUID,
        }
    }

    pub const fn from_u32(v: u32) -> Self {
        Uuid {
            base_uuid: ((v as u128) << 96) | Self::BLUETOOTH_BASE_UUID,
        }
    }

    pub const fn from_u128(v: u128) -> Self {
        Uuid { base_uuid: v }
    }

    /// Returns true if the UUID can be a 16 bit shortened UUID
    pub fn can_be_16_bit(&self) -> bool {
        !((!0u16 as u128) << 96) & self.base_uuid == Uuid::BLUETOOTH_BASE_UUID
    }

    /// Returns true if the UUID can be a 32 bit shortened UUID
    pub fn can_be_32_bit(&self) -> bool {
        !(((!0u32) as u128) << 96) & self.base_uuid == Uuid::BLUETOOTH_BASE_UUID
    }

    /// Get the UUID in its over the air (little endian) byte order
    pub fn to_le_bytes(&self) -> [u8; 16] {
        self.base_uuid.to_le_bytes()
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&uuid::Uuid::from_u128(self.base_uuid).hyphenated(), f)
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Ok(val) = <u16>::try_from(*self) {
            write!(f, "{:#06x} (16b)", val)
        } else if let Ok(val) = <u32>::try_from(*self) {
            write!(f, "{:#010x} (32b)", val)
        } else {
            write!(f, "{} (128b)", self)
        }
    }
}

impl From<u128> for Uuid {
    fn from(v: u128) -> Uuid {
        Self::from_u128(v)
    }
}

impl From<u32> for Uuid {
    fn from(v: u32) -> Uuid {
        Self::from_u32(v)
    }
}

impl From<u16> for Uuid {
    fn from(v: u16) -> Uuid {
        Self::from_u16(v)
    }
}

impl From<uuid::Uuid> for Uuid {
    fn from(uuid: uuid::Uuid) -> Uuid {
        Self::from_u128(uuid.as_u128())
    }
}

impl From<Uuid> for uuid::Uuid {
    fn from(uuid: Uuid) -> uuid::Uuid {
        uuid::Uuid::from_u128(uuid.base_uuid)
    }
}

impl From<Uuid> for u128 {
    fn from(uuid: Uuid) -> u128 {
        uuid.base_uuid
    }
}

impl TryFrom<Uuid> for u32 {
    type Error = ();

    /// Try to convert a UUID into its 32 bit shortened form. This doesn't check that the value is
    /// pre-allocated (a.k.a. assigned number) from the Bluetooth SIG.
    fn try_from(uuid: Uuid) -> Result<u32, ()> {
        if uuid.can_be_32_bit() {
            Ok((uuid.base_uuid >> 96) as u32)
        } else {
            Err(())
        }
    }
}

impl TryFrom<Uuid> for u16 {
    type Error = ();

    /// Try to convert a UUID into its 16 bit shortened form. This doesn't check that the value is
    /// pre-allocated (a.k.a. assigned number) from the Bluetooth SIG.
    fn try_from(uuid: Uuid) -> Result<u16, ()> {
        if uuid.can_be_16_bit() {
            Ok((uuid.base_uuid >> 96) as u16)
        } else {
            Err(())
        }
    }
}

/// Error for a UUID string that could not be parsed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UuidFormatError {
    input: String,
    reason: String,
}

impl fmt::Display for UuidFormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "malformed UUID '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for UuidFormatError {}

/// Create a UUID from its formatted type
///
/// Any format accepted by the `uuid` crate is accepted here, but the expected format is the
/// hyphenated form \[8\]-\[4\]-\[4\]-\[4\]-\[12\] (e.g. '68d82662-0305-4e6f-a679-6be1475f5e04').
impl FromStr for Uuid {
    type Err = UuidFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Uuid::from).map_err(|e| UuidFormatError {
            input: s.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Uuid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Uuid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;

        s.parse().map_err(serde::de::Error::custom)
    }
}
