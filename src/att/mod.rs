//! Attribute requests
//!
//! The radio does the Attribute Protocol, what reaches this library is a read or write request that
//! has already been matched to a characteristic. The [`RequestHandler`] performs the request
//! against the registry and answers it through the radio.
//!
//! Every request that expects a response gets one. A request for a characteristic that is not in
//! the registry is answered with [`AttStatus::InvalidHandle`].

pub mod notify;

use core::fmt;

use crate::connection::Device;
use crate::event::{self, Event, EventSink};
use crate::gatt::{CharacteristicId, Registry};
use crate::radio::Radio;
use crate::Error;

/// The identifier the radio gives to a request
pub type RequestId = i32;

/// The status of a response to a request
///
/// These are the error codes of the Attribute Protocol (v5.0 | Vol 3, Part F | sec. 3.4.1.1) that
/// the peripheral uses, along with success.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AttStatus {
    Success,
    InvalidHandle,
    ReadNotPermitted,
    WriteNotPermitted,
    RequestNotSupported,
    InvalidOffset,
    AttributeNotFound,
    InvalidAttributeValueLength,
    UnlikelyError,
    /// Any other error code
    Other(u8),
}

impl AttStatus {
    pub fn from_raw(val: u8) -> AttStatus {
        match val {
            0x00 => AttStatus::Success,
            0x01 => AttStatus::InvalidHandle,
            0x02 => AttStatus::ReadNotPermitted,
            0x03 => AttStatus::WriteNotPermitted,
            0x06 => AttStatus::RequestNotSupported,
            0x07 => AttStatus::InvalidOffset,
            0x0A => AttStatus::AttributeNotFound,
            0x0D => AttStatus::InvalidAttributeValueLength,
            0x0E => AttStatus::UnlikelyError,
            _ => AttStatus::Other(val),
        }
    }

    pub fn get_raw(&self) -> u8 {
        match *self {
            AttStatus::Success => 0x00,
            AttStatus::InvalidHandle => 0x01,
            AttStatus::ReadNotPermitted => 0x02,
            AttStatus::WriteNotPermitted => 0x03,
            AttStatus::RequestNotSupported => 0x06,
            AttStatus::InvalidOffset => 0x07,
            AttStatus::AttributeNotFound => 0x0A,
            AttStatus::InvalidAttributeValueLength => 0x0D,
            AttStatus::UnlikelyError => 0x0E,
            AttStatus::Other(val) => val,
        }
    }
}

impl fmt::Display for AttStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AttStatus::Success => f.write_str("Success"),
            AttStatus::InvalidHandle => f.write_str("The attribute handle given was not valid on this server"),
            AttStatus::ReadNotPermitted => f.write_str("The attribute cannot be read"),
            AttStatus::WriteNotPermitted => f.write_str("The attribute cannot be written"),
            AttStatus::RequestNotSupported => f.write_str("Attribute server does not support the request received from the client"),
            AttStatus::InvalidOffset => f.write_str("Offset specified was past the end of the attribute"),
            AttStatus::AttributeNotFound => f.write_str("No attribute found within the given attribute handle range"),
            AttStatus::InvalidAttributeValueLength => f.write_str("The attribute value length is invalid for the operation"),
            AttStatus::UnlikelyError => f.write_str("The attribute request has encountered an error that was unlikely"),
            AttStatus::Other(val) => write!(f, "ATT error code 0x{:X}", val),
        }
    }
}

/// A read request
#[derive(Clone, Debug)]
pub struct ReadRequest {
    pub device: Device,
    pub request_id: RequestId,
    pub offset: u16,
    pub characteristic: CharacteristicId,
}

/// A write request
#[derive(Clone, Debug)]
pub struct WriteRequest {
    pub device: Device,
    pub request_id: RequestId,
    pub characteristic: CharacteristicId,
    pub prepared_write: bool,
    pub response_needed: bool,
    pub offset: u16,
    pub value: Vec<u8>,
}

/// Handler of read and write requests
pub struct RequestHandler<'a, R> {
    radio: &'a R,
    registry: &'a Registry,
    events: &'a EventSink,
}

impl<'a, R: Radio> RequestHandler<'a, R> {
    pub fn new(radio: &'a R, registry: &'a Registry, events: &'a EventSink) -> Self {
        RequestHandler { radio, registry, events }
    }

    fn respond(&self, device: &Device, request_id: RequestId, status: AttStatus, offset: u16, value: Option<&[u8]>) -> Result<(), Error> {
        self.radio
            .send_response(&device.address, request_id, status, offset, value)
            .map_err(|e| {
                log::error!("(ATT) failed to send response to {}: {}", device.address, e);

                Error::radio("send_response", e)
            })
    }

    /// Process a read request
    ///
    /// Reading with a non-zero offset is not supported. The response to a read with an offset is
    /// [`AttStatus::InvalidOffset`].
    pub fn read(&self, request: &ReadRequest) -> Result<(), Error> {
        log::info!(
            "(ATT) read request from {} for {:?} at offset {}",
            request.device.address,
            request.characteristic.characteristic,
            request.offset
        );

        let Some(value) = self.registry.with_characteristic(&request.characteristic, |c| c.read_value()) else {
            log::warn!("(ATT) read of unknown characteristic {}", request.characteristic.characteristic);

            self.respond(&request.device, request.request_id, AttStatus::InvalidHandle, request.offset, None)?;

            return Err(crate::gatt::not_found(&request.characteristic));
        };

        if request.offset != 0 {
            self.respond(&request.device, request.request_id, AttStatus::InvalidOffset, request.offset, None)
        } else {
            self.respond(&request.device, request.request_id, AttStatus::Success, 0, Some(&value))
        }
    }

    /// Process a write request
    ///
    /// The value of the characteristic is replaced with the value of the request. The offset is
    /// ignored, and a prepared write is committed immediately. The [`Event::CharacteristicWrite`]
    /// is emitted before the response is sent.
    pub fn write(&self, request: WriteRequest) -> Result<(), Error> {
        log::info!(
            "(ATT) write request from {} for {:?}: {:x?}",
            request.device.address,
            request.characteristic.characteristic,
            request.value
        );

        if request.prepared_write {
            log::debug!("(ATT) prepared write is committed as a write");
        }

        if self.registry.write_value(&request.characteristic, &request.value).is_err() {
            log::warn!("(ATT) write to unknown characteristic {}", request.characteristic.characteristic);

            if request.response_needed {
                self.respond(&request.device, request.request_id, AttStatus::InvalidHandle, request.offset, None)?;
            }

            return Err(crate::gatt::not_found(&request.characteristic));
        }

        self.events.emit(Event::CharacteristicWrite {
            characteristic_uuid: request.characteristic.characteristic,
            device_id: request.device.address,
            device_name: request.device.name.clone(),
            data: request.value.clone(),
            timestamp: event::timestamp(),
        });

        if request.response_needed {
            self.respond(
                &request.device,
                request.request_id,
                AttStatus::Success,
                request.offset,
                Some(&request.value),
            )
        } else {
            Ok(())
        }
    }
}
