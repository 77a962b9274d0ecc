//! Advertising
//!
//! Advertising data is a sequence of AD structures. Each structure is a length byte, an assigned
//! number for the type of data, and then the data itself (v5.2 | Vol 3, Part C | sec. 11). Legacy
//! advertising PDUs (the only ones used here) carry at most 31 bytes of advertising data, and the
//! same goes for the scan response.
//!
//! The peripheral advertises with two payloads. The primary payload has the flags and the UUID of
//! the first service added to the registry. The scan response has the name of the device.

use core::fmt;

use crate::gatt::Registry;
use crate::Uuid;

/// The maximum size of legacy advertising data or scan response data
pub const ADV_PAYLOAD_MAX: usize = 31;

/// LE General Discoverable Mode
const FLAG_LE_GENERAL_DISCOVERABLE: u8 = 1 << 1;
/// BR/EDR Not Supported
const FLAG_BR_EDR_NOT_SUPPORTED: u8 = 1 << 2;

/// The assigned numbers of the AD types used by the peripheral
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignedTypes {
    Flags,
    IncompleteListOf16bitServiceClassUUIDs,
    CompleteListOf16bitServiceClassUUIDs,
    IncompleteListOf32bitServiceClassUUIDs,
    CompleteListOf32bitServiceClassUUIDs,
    IncompleteListOf128bitServiceClassUUIDs,
    CompleteListOf128bitServiceClassUUIDs,
    ShortenedLocalName,
    CompleteLocalName,
    TxPowerLevel,
}

impl AssignedTypes {
    pub const fn val(&self) -> u8 {
        match *self {
            AssignedTypes::Flags => 0x01,
            AssignedTypes::IncompleteListOf16bitServiceClassUUIDs => 0x02,
            AssignedTypes::CompleteListOf16bitServiceClassUUIDs => 0x03,
            AssignedTypes::IncompleteListOf32bitServiceClassUUIDs => 0x04,
            AssignedTypes::CompleteListOf32bitServiceClassUUIDs => 0x05,
            AssignedTypes::IncompleteListOf128bitServiceClassUUIDs => 0x06,
            AssignedTypes::CompleteListOf128bitServiceClassUUIDs => 0x07,
            AssignedTypes::ShortenedLocalName => 0x08,
            AssignedTypes::CompleteLocalName => 0x09,
            AssignedTypes::TxPowerLevel => 0x0A,
        }
    }

    fn service_uuid_list(uuid: &Uuid, complete: bool) -> Self {
        match (uuid.can_be_16_bit(), uuid.can_be_32_bit(), complete) {
            (true, _, true) => AssignedTypes::CompleteListOf16bitServiceClassUUIDs,
            (true, _, false) => AssignedTypes::IncompleteListOf16bitServiceClassUUIDs,
            (false, true, true) => AssignedTypes::CompleteListOf32bitServiceClassUUIDs,
            (false, true, false) => AssignedTypes::IncompleteListOf32bitServiceClassUUIDs,
            (false, false, true) => AssignedTypes::CompleteListOf128bitServiceClassUUIDs,
            (false, false, false) => AssignedTypes::IncompleteListOf128bitServiceClassUUIDs,
        }
    }
}

/// Error for data that does not fit within the payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvertError {
    pub required: usize,
    pub remaining: usize,
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "AD structure requires {} bytes but only {} bytes remain in the payload",
            self.required, self.remaining
        )
    }
}

impl std::error::Error for ConvertError {}

/// Builder of a legacy advertising payload
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sequence {
    data: Vec<u8>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of bytes that can still be added
    pub fn remaining(&self) -> usize {
        ADV_PAYLOAD_MAX - self.data.len()
    }

    /// Append an AD structure
    ///
    /// The length byte is added by this method, `data` is only the AD data.
    pub fn try_push(&mut self, ad_type: AssignedTypes, data: &[u8]) -> Result<&mut Self, ConvertError> {
        let required = data.len() + 2;

        if required > self.remaining() {
            return Err(ConvertError {
                required,
                remaining: self.remaining(),
            });
        }

        self.data.push((data.len() + 1) as u8);
        self.data.push(ad_type.val());
        self.data.extend_from_slice(data);

        Ok(self)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

/// An AD structure within a payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdStructure<'a> {
    pub ad_type: u8,
    pub data: &'a [u8],
}

/// Iterate over the AD structures of a raw payload
///
/// Iteration stops at the first zero length byte (the remainder of a payload is allowed to be zero
/// padded) or at a structure whose length goes beyond the payload.
pub fn iter_structs(payload: &[u8]) -> impl Iterator<Item = AdStructure<'_>> {
    let mut rest = payload;

    core::iter::from_fn(move || {
        let (&len, tail) = rest.split_first()?;

        let len = len as usize;

        if len == 0 || len > tail.len() {
            rest = &[];

            return None;
        }

        let (structure, next) = tail.split_at(len);

        rest = next;

        Some(AdStructure {
            ad_type: structure[0],
            data: &structure[1..],
        })
    })
}

macro_rules! payload {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, Default)]
        pub struct $name(Sequence);

        impl $name {
            /// Get the raw payload
            pub fn as_bytes(&self) -> &[u8] {
                self.0.as_slice()
            }

            pub fn len(&self) -> usize {
                self.0.data.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.data.is_empty()
            }

            /// Iterate over the AD structures of the payload
            pub fn iter(&self) -> impl Iterator<Item = AdStructure<'_>> {
                iter_structs(self.as_bytes())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.debug_list().entries(self.iter()).finish()
            }
        }
    };
}

payload! {
    /// The primary advertising payload
    AdvertisingData
}

payload! {
    /// The data sent in response to a scan request
    ScanResponseData
}

impl AdvertisingData {
    /// Build the primary payload
    ///
    /// The payload contains the flags, and the first service of the registry (if there is one).
    /// Neither the name nor the TX power is part of the primary payload.
    pub fn new(registry: &Registry) -> Result<Self, ConvertError> {
        let mut sequence = Sequence::new();

        sequence.try_push(
            AssignedTypes::Flags,
            &[FLAG_LE_GENERAL_DISCOVERABLE | FLAG_BR_EDR_NOT_SUPPORTED],
        )?;

        if let Some(service) = registry.first_service() {
            // the list is only complete when there is nothing else to list
            let complete = registry.len() == 1;

            let ad_type = AssignedTypes::service_uuid_list(&service.uuid, complete);

            match (
                <u16>::try_from(service.uuid),
                <u32>::try_from(service.uuid),
            ) {
                (Ok(v), _) => sequence.try_push(ad_type, &v.to_le_bytes())?,
                (_, Ok(v)) => sequence.try_push(ad_type, &v.to_le_bytes())?,
                _ => sequence.try_push(ad_type, &service.uuid.to_le_bytes())?,
            };
        }

        Ok(AdvertisingData(sequence))
    }

    /// Get the service UUIDs listed within this payload
    pub fn service_uuids(&self) -> Vec<Uuid> {
        self.iter()
            .flat_map(|ad| {
                let uuids: Vec<Uuid> = match ad.ad_type {
                    0x02 | 0x03 => ad
                        .data
                        .chunks_exact(2)
                        .map(|c| Uuid::from_u16(u16::from_le_bytes([c[0], c[1]])))
                        .collect(),
                    0x04 | 0x05 => ad
                        .data
                        .chunks_exact(4)
                        .map(|c| Uuid::from_u32(u32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                        .collect(),
                    0x06 | 0x07 => ad
                        .data
                        .chunks_exact(16)
                        .filter_map(|c| <[u8; 16]>::try_from(c).ok())
                        .map(|c| Uuid::from_u128(u128::from_le_bytes(c)))
                        .collect(),
                    _ => Vec::new(),
                };

                uuids
            })
            .collect()
    }
}

impl ScanResponseData {
    /// Build the scan response
    ///
    /// The scan response is the local name of the device. If the name is too long it is shortened
    /// to what fits, the name is never cut within a UTF-8 character.
    pub fn new(name: &str) -> Self {
        let mut sequence = Sequence::new();

        let max = sequence.remaining() - 2;

        if name.len() <= max {
            let pushed = sequence.try_push(AssignedTypes::CompleteLocalName, name.as_bytes());

            debug_assert!(pushed.is_ok(), "name length was checked");
        } else {
            let end = (0..=max).rev().find(|i| name.is_char_boundary(*i)).unwrap_or(0);

            log::debug!("(GAP) name '{}' shortened to '{}'", name, &name[..end]);

            let pushed = sequence.try_push(AssignedTypes::ShortenedLocalName, &name.as_bytes()[..end]);

            debug_assert!(pushed.is_ok(), "shortened name fits");
        }

        ScanResponseData(sequence)
    }

    /// Get the local name within the scan response
    ///
    /// The boolean is true if the name is the complete name.
    pub fn local_name(&self) -> Option<(&str, bool)> {
        self.iter().find_map(|ad| {
            let complete = match ad.ad_type {
                0x08 => false,
                0x09 => true,
                _ => return None,
            };

            core::str::from_utf8(ad.data).ok().map(|name| (name, complete))
        })
    }
}

/// The advertising mode
///
/// The mode trades the power used for advertising against how quickly a scanner finds the
/// peripheral.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    #[default]
    LowLatency,
}

/// The transmit power level of advertising
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TxPowerLevel {
    UltraLow,
    Low,
    Medium,
    #[default]
    High,
}

/// Advertising settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AdvertiseSettings {
    pub mode: AdvertiseMode,
    pub tx_power: TxPowerLevel,
    pub connectable: bool,
}

impl Default for AdvertiseSettings {
    fn default() -> Self {
        AdvertiseSettings {
            mode: AdvertiseMode::default(),
            tx_power: TxPowerLevel::default(),
            connectable: true,
        }
    }
}

/// The reason the radio failed to start advertising
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdvertiseFailure {
    /// The advertising data is larger than what the radio can send
    DataTooLarge,
    /// There are no advertising instances left
    TooManyAdvertisers,
    /// Advertising with these settings is already started
    AlreadyStarted,
    /// An internal error of the radio
    InternalError,
    /// The radio does not support advertising
    FeatureUnsupported,
    /// A code with no known meaning
    Unknown(i32),
}

impl AdvertiseFailure {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => AdvertiseFailure::DataTooLarge,
            2 => AdvertiseFailure::TooManyAdvertisers,
            3 => AdvertiseFailure::AlreadyStarted,
            4 => AdvertiseFailure::InternalError,
            5 => AdvertiseFailure::FeatureUnsupported,
            c => AdvertiseFailure::Unknown(c),
        }
    }

    pub fn code(&self) -> i32 {
        match *self {
            AdvertiseFailure::DataTooLarge => 1,
            AdvertiseFailure::TooManyAdvertisers => 2,
            AdvertiseFailure::AlreadyStarted => 3,
            AdvertiseFailure::InternalError => 4,
            AdvertiseFailure::FeatureUnsupported => 5,
            AdvertiseFailure::Unknown(c) => c,
        }
    }
}

impl fmt::Display for AdvertiseFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AdvertiseFailure::DataTooLarge => f.write_str("advertising data is too large"),
            AdvertiseFailure::TooManyAdvertisers => f.write_str("too many advertisers"),
            AdvertiseFailure::AlreadyStarted => f.write_str("advertising is already started"),
            AdvertiseFailure::InternalError => f.write_str("internal error"),
            AdvertiseFailure::FeatureUnsupported => f.write_str("advertising is not supported"),
            AdvertiseFailure::Unknown(c) => write!(f, "unknown error code {}", c),
        }
    }
}
