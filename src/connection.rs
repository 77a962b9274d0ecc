//! Connected central devices
//!
//! The [`ConnectionTracker`] is the set of central devices currently connected to the peripheral.
//! It only records transitions, every change to the set produces the [`Event`] that the server
//! forwards to the application.

use crate::event::{self, Event};
use crate::lock;
use core::fmt;
use core::str::FromStr;
use std::collections::HashMap;
use std::sync::Mutex;

/// A Bluetooth device address
///
/// The address is stored in the order it is displayed, the most significant octet is first.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DeviceAddress(pub [u8; 6]);

impl DeviceAddress {
    pub const fn new(address: [u8; 6]) -> Self {
        DeviceAddress(address)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;

        write!(f, "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}", a, b, c, d, e, g)
    }
}

impl fmt::Debug for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Error for a string that is not a device address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressFormatError(String);

impl fmt::Display for AddressFormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "'{}' is not a device address of the form AA:BB:CC:DD:EE:FF", self.0)
    }
}

impl std::error::Error for AddressFormatError {}

impl FromStr for DeviceAddress {
    type Err = AddressFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut address = [0u8; 6];

        let mut octets = s.split(':');

        for octet in address.iter_mut() {
            *octet = octets
                .next()
                .filter(|o| o.len() == 2)
                .and_then(|o| u8::from_str_radix(o, 16).ok())
                .ok_or_else(|| AddressFormatError(s.to_string()))?;
        }

        match octets.next() {
            None => Ok(DeviceAddress(address)),
            Some(_) => Err(AddressFormatError(s.to_string())),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for DeviceAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for DeviceAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;

        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A remote (central) device
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Device {
    pub address: DeviceAddress,
    pub name: Option<String>,
}

impl Device {
    pub fn new(address: DeviceAddress, name: Option<String>) -> Self {
        Device { address, name }
    }
}

/// The set of connected devices
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    devices: Mutex<HashMap<DeviceAddress, Device>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `device` connected
    ///
    /// The event is only returned when the device was not already connected.
    pub fn on_connected(&self, device: Device) -> Option<Event> {
        let mut devices = lock(&self.devices);

        if devices.contains_key(&device.address) {
            log::debug!("(CONN) {} is already connected", device.address);

            return None;
        }

        log::info!("(CONN) device connected: {}", device.address);

        let event = Event::DeviceConnected {
            device_id: device.address,
            device_name: device.name.clone(),
            timestamp: event::timestamp(),
        };

        devices.insert(device.address, device);

        Some(event)
    }

    /// Record that `device` disconnected
    ///
    /// This always produces an event, it is also used for a connection attempt that failed and
    /// so the device may never have been tracked. An `error` is the reason for an abnormal
    /// disconnection.
    pub fn on_disconnected(&self, device: Device, error: Option<String>) -> Event {
        let removed = lock(&self.devices).remove(&device.address);

        match (&removed, &error) {
            (_, Some(reason)) => log::info!("(CONN) device {} disconnected: {}", device.address, reason),
            (Some(_), None) => log::info!("(CONN) device disconnected: {}", device.address),
            (None, None) => log::debug!("(CONN) {} was not connected", device.address),
        }

        // prefer the name known from when the device connected
        let device_name = removed.and_then(|d| d.name).or(device.name);

        Event::DeviceDisconnected {
            device_id: device.address,
            device_name,
            error,
            timestamp: event::timestamp(),
        }
    }

    /// Get a snapshot of the connected devices
    pub fn connected_devices(&self) -> Vec<Device> {
        lock(&self.devices).values().cloned().collect()
    }

    /// Get a connected device
    pub fn get(&self, address: &DeviceAddress) -> Option<Device> {
        lock(&self.devices).get(address).cloned()
    }

    pub fn is_connected(&self, address: &DeviceAddress) -> bool {
        lock(&self.devices).contains_key(address)
    }

    pub fn len(&self) -> usize {
        lock(&self.devices).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget all devices
    ///
    /// No events are produced.
    pub fn clear(&self) {
        lock(&self.devices).clear()
    }
}
