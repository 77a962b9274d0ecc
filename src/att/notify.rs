//! Server initiated updates of characteristic values
//!
//! An update is sent to every connected device as either a notification or an indication. The
//! kind is decided by the properties of the characteristic. The peripheral does not track client
//! configuration descriptors, every connected device gets the update.

use crate::connection::{ConnectionTracker, DeviceAddress};
use crate::gatt::characteristic::Properties;
use crate::gatt::{CharacteristicId, Registry};
use crate::radio::{Radio, GATT_SUCCESS};
use crate::Error;

/// How an update is delivered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Unacknowledged
    Notify,
    /// Acknowledged by the client
    Indicate,
}

/// The outcome of sending an update
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchReport {
    pub mode: DeliveryMode,
    /// The devices the radio accepted the update for
    pub delivered: Vec<DeviceAddress>,
    /// The devices the radio refused the update for along with the reason
    pub failed: Vec<(DeviceAddress, String)>,
}

/// Sender of characteristic updates
pub struct NotificationDispatcher<'a, R> {
    radio: &'a R,
    registry: &'a Registry,
    connections: &'a ConnectionTracker,
}

impl<'a, R: Radio> NotificationDispatcher<'a, R> {
    pub fn new(radio: &'a R, registry: &'a Registry, connections: &'a ConnectionTracker) -> Self {
        NotificationDispatcher {
            radio,
            registry,
            connections,
        }
    }

    /// Set the value of a characteristic and send it to every connected device
    ///
    /// Indications are used when the characteristic has the indicate property, otherwise
    /// notifications are used. A failure to send to a device does not stop sending to the other
    /// devices and is not an error, it is listed in the returned report. Acknowledgements of
    /// indications are not waited for.
    ///
    /// # Error
    /// [`Error::NotFound`] is returned if the characteristic is not within the registry.
    pub fn dispatch(&self, id: &CharacteristicId, value: &[u8]) -> Result<DispatchReport, Error> {
        let properties = self.registry.properties(id)?;

        self.registry.write_value(id, value)?;

        let mode = if properties.contains(Properties::Indicate) {
            DeliveryMode::Indicate
        } else {
            DeliveryMode::Notify
        };

        let mut report = DispatchReport {
            mode,
            delivered: Vec::new(),
            failed: Vec::new(),
        };

        for device in self.connections.connected_devices() {
            match self.radio.notify_characteristic_changed(
                &device.address,
                id,
                value,
                mode == DeliveryMode::Indicate,
            ) {
                Ok(()) => report.delivered.push(device.address),
                Err(e) => {
                    log::warn!("(ATT) failed to {:?} {}: {}", mode, device.address, e);

                    report.failed.push((device.address, e.to_string()));
                }
            }
        }

        log::debug!(
            "(ATT) {:?} of {:?} sent to {} device(s)",
            mode,
            id.characteristic,
            report.delivered.len()
        );

        Ok(report)
    }
}

/// Process the radio's report of a sent notification
pub fn on_notification_sent(device: &DeviceAddress, status: u8) {
    if status == GATT_SUCCESS {
        log::trace!("(ATT) notification sent to {}", device);
    } else {
        log::warn!("(ATT) notification to {} failed with status {}", device, status);
    }
}
