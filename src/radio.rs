//! The boundary to the radio
//!
//! The radio is the BLE stack of the platform. Commands go to the radio through the [`Radio`]
//! trait, and everything the radio reports back is a [`RadioEvent`] sent to
//! [`Server::run`](crate::Server::run).
//!
//! The commands are not async. A radio command only hands the work to the radio, the result of
//! something that takes time (like starting advertising) is reported back as a `RadioEvent`.

use core::fmt;

use crate::att::{AttStatus, RequestId};
use crate::connection::{Device, DeviceAddress};
use crate::gap::{AdvertiseFailure, AdvertiseSettings, AdvertisingData, ScanResponseData};
use crate::gatt::{CharacteristicId, ServiceRecord};

/// The commands of a radio
pub trait Radio {
    type Error: fmt::Debug + fmt::Display;

    /// Check if there is a radio
    fn is_present(&self) -> bool;

    /// Check if the radio is turned on
    fn is_enabled(&self) -> bool;

    /// Set the name of the adapter
    fn set_name(&self, name: &str) -> Result<(), Self::Error>;

    /// Open the GATT server session
    fn open_server_session(&self) -> Result<(), Self::Error>;

    /// Register a service with the GATT server session
    fn add_service(&self, service: &ServiceRecord) -> Result<(), Self::Error>;

    /// Respond to a read or write request
    fn send_response(
        &self,
        device: &DeviceAddress,
        request_id: RequestId,
        status: AttStatus,
        offset: u16,
        value: Option<&[u8]>,
    ) -> Result<(), Self::Error>;

    /// Notify or indicate a new characteristic value to a device
    fn notify_characteristic_changed(
        &self,
        device: &DeviceAddress,
        characteristic: &CharacteristicId,
        value: &[u8],
        indicate: bool,
    ) -> Result<(), Self::Error>;

    /// Start advertising
    ///
    /// The result is reported with [`RadioEvent::AdvertiseStartResult`].
    fn start_advertising(
        &self,
        settings: &AdvertiseSettings,
        data: &AdvertisingData,
        scan_response: &ScanResponseData,
    ) -> Result<(), Self::Error>;

    fn stop_advertising(&self) -> Result<(), Self::Error>;

    /// Close the GATT server session
    ///
    /// This disconnects all devices without producing connection state events.
    fn close_server_session(&self) -> Result<(), Self::Error>;
}

/// The state of a connection with a device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// The status code that the radio uses for success
pub const GATT_SUCCESS: u8 = 0;

/// An event reported by the radio
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RadioEvent {
    /// The connection state with a device changed
    ///
    /// A non-zero `status` is a connection that failed or was lost abnormally.
    ConnectionStateChanged {
        device: Device,
        status: u8,
        new_state: ConnectionState,
    },
    /// A device wants to read a characteristic
    ReadRequest {
        device: Device,
        request_id: RequestId,
        offset: u16,
        characteristic: CharacteristicId,
    },
    /// A device wrote to a characteristic
    WriteRequest {
        device: Device,
        request_id: RequestId,
        characteristic: CharacteristicId,
        prepared_write: bool,
        response_needed: bool,
        offset: u16,
        value: Vec<u8>,
    },
    /// The result of [`Radio::start_advertising`]
    AdvertiseStartResult(Result<(), AdvertiseFailure>),
    /// A notification or indication was sent to a device
    NotificationSent { device: DeviceAddress, status: u8 },
}
