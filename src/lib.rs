//! A Bluetooth Low Energy GATT Peripheral
//!
//! This library is the application facing part of a BLE peripheral. It holds the services and
//! characteristics the peripheral exposes, tracks which central devices are connected, answers the
//! read and write requests sent by those centrals, and pushes notifications or indications of
//! characteristic values.
//!
//! The radio (the BLE stack of the platform) is not part of this library. It is abstracted by the
//! [`Radio`] trait for the commands sent *to* the radio, and by [`RadioEvent`] for everything the
//! radio reports back. Radio events are sent over a channel to [`Server::run`], which processes
//! them one at a time.
//!
//! ```
//! # use bo_tie_peripheral::{radio::{Radio, RadioEvent}, Server};
//! # async fn example<R: Radio + Send + Sync + 'static>(radio: R) -> Result<(), bo_tie_peripheral::Error> {
//! let server = std::sync::Arc::new(Server::new(radio));
//!
//! let (radio_sender, radio_receiver) = tokio::sync::mpsc::unbounded_channel::<RadioEvent>();
//! # drop(radio_sender);
//!
//! server.add_service("6e400001-b5a3-f393-e0a9-e50e24dcca9e", true)?;
//!
//! server.add_characteristic(
//!     "6e400001-b5a3-f393-e0a9-e50e24dcca9e",
//!     "6e400002-b5a3-f393-e0a9-e50e24dcca9e",
//!     0x11,
//!     0x1A,
//! )?;
//!
//! let mut events = server.subscribe();
//!
//! let event_loop = server.clone();
//!
//! tokio::spawn(async move { event_loop.run(radio_receiver).await });
//!
//! server.start().await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//! * `serde`: implements `Serialize` and `Deserialize` for the configuration, the event, and the
//!   identifier types.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod att;
pub mod connection;
mod error;
pub mod event;
pub mod gap;
pub mod gatt;
pub mod radio;
pub mod server;
pub mod uuid;

pub use crate::uuid::Uuid;
pub use error::Error;
pub use event::Event;
pub use radio::{Radio, RadioEvent};
pub use server::{Server, ServerConfig};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Acquire a lock
///
/// A poisoned lock is still acquired. None of the state within this library can be left in a
/// partial state by a panic, so the data behind a poisoned lock is still valid.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
