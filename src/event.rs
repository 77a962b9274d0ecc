//! Events for the application
//!
//! Events are delivered to a single observer over a bounded channel. Delivery is best effort, an
//! event is dropped when there is no observer or when the observer has fallen so far behind that
//! the channel is full. Events are never allowed to back up into the processing of radio events.
//!
//! Dropping keeps the order of the events of a device. When the connection event of a device is
//! dropped, the writes of that device are dropped too until one of its connection events gets
//! through. The observer never sees a write from a device it was not told connected.

use crate::connection::DeviceAddress;
use crate::{lock, Uuid};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// The default number of events buffered for the observer
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// An event of the peripheral
///
/// The `timestamp` of every event is the number of seconds since the UNIX epoch.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Event {
    DeviceConnected {
        device_id: DeviceAddress,
        device_name: Option<String>,
        timestamp: f64,
    },
    DeviceDisconnected {
        device_id: DeviceAddress,
        device_name: Option<String>,
        /// The reason for a failed connection or an abnormal disconnection
        error: Option<String>,
        timestamp: f64,
    },
    CharacteristicWrite {
        characteristic_uuid: Uuid,
        device_id: DeviceAddress,
        device_name: Option<String>,
        data: Vec<u8>,
        timestamp: f64,
    },
}

impl Event {
    /// Get the address of the device this event is about
    pub fn device_id(&self) -> DeviceAddress {
        match self {
            Event::DeviceConnected { device_id, .. }
            | Event::DeviceDisconnected { device_id, .. }
            | Event::CharacteristicWrite { device_id, .. } => *device_id,
        }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            Event::DeviceConnected { timestamp, .. }
            | Event::DeviceDisconnected { timestamp, .. }
            | Event::CharacteristicWrite { timestamp, .. } => *timestamp,
        }
    }
}

/// Get the current time as seconds since the UNIX epoch
pub(crate) fn timestamp() -> f64 {
    // a clock set before 1970 is reported as the epoch
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// The sending side of the events
#[derive(Debug)]
pub struct EventSink {
    observer: Mutex<Option<mpsc::Sender<Event>>>,
    /// Devices whose last connection event was dropped
    unsynced: Mutex<HashSet<DeviceAddress>>,
    capacity: usize,
}

impl EventSink {
    /// Create a new `EventSink`
    ///
    /// A `capacity` of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        EventSink {
            observer: Mutex::new(None),
            unsynced: Mutex::new(HashSet::new()),
            capacity: capacity.max(1),
        }
    }

    /// Attach the observer
    ///
    /// This replaces the previous observer. The receiver of the previous observer will return
    /// `None` once it has received the events already sent to it.
    pub fn subscribe(&self) -> mpsc::Receiver<Event> {
        let (sender, receiver) = mpsc::channel(self.capacity);

        let mut observer = lock(&self.observer);

        if observer.replace(sender).is_some() {
            log::debug!("(EVENT) previous observer replaced");
        }

        lock(&self.unsynced).clear();

        receiver
    }

    pub fn has_observer(&self) -> bool {
        lock(&self.observer).is_some()
    }

    /// Send an event to the observer
    ///
    /// This never waits. Returns true if the event was sent.
    pub fn emit(&self, event: Event) -> bool {
        let mut observer = lock(&self.observer);

        let Some(sender) = observer.as_ref() else {
            log::trace!("(EVENT) no observer for {:?}", event);

            return false;
        };

        let device = event.device_id();

        let is_write = matches!(event, Event::CharacteristicWrite { .. });

        let mut unsynced = lock(&self.unsynced);

        if is_write && unsynced.contains(&device) {
            log::warn!("(EVENT) connection event of {} was dropped, dropped {:?}", device, event);

            return false;
        }

        match sender.try_send(event) {
            Ok(()) => {
                if !is_write {
                    unsynced.remove(&device);
                }

                true
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                log::warn!("(EVENT) observer is not keeping up, dropped {:?}", event);

                if !is_write {
                    unsynced.insert(device);
                }

                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::info!("(EVENT) observer closed, detaching it");

                *observer = None;

                false
            }
        }
    }
}

impl Default for EventSink {
    fn default() -> Self {
        EventSink::new(DEFAULT_EVENT_CAPACITY)
    }
}
