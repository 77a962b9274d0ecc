//! The peripheral server
//!
//! [`Server`] owns the registry of services, the set of connected devices, and the event sink. The
//! application configures the services, starts the server, and sends updates of characteristic
//! values. The radio reports to the server through the channel processed by [`Server::run`].
//!
//! # Advertising state
//! * `Idle` to `Starting` by [`Server::start`]
//! * `Starting` to `Advertising` when the radio reports that advertising started
//! * `Starting` to `Idle` when the radio reports a failure
//! * `Advertising` to `Stopping` to `Idle` by [`Server::stop`]

use core::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};

use crate::att::notify::{self, DispatchReport, NotificationDispatcher};
use crate::att::{ReadRequest, RequestHandler, WriteRequest};
use crate::connection::{ConnectionTracker, Device};
use crate::event::{Event, EventSink, DEFAULT_EVENT_CAPACITY};
use crate::gap::{AdvertiseFailure, AdvertiseSettings, AdvertisingData, ScanResponseData};
use crate::gatt::characteristic::{PermissionFlags, PropertyFlags};
use crate::gatt::{CharacteristicId, Registry, ServiceId, ServiceKind};
use crate::radio::{ConnectionState, Radio, RadioEvent, GATT_SUCCESS};
use crate::{lock, Error, Uuid};
use std::sync::Mutex;

/// The name advertised when no name is set
pub const DEFAULT_NAME: &str = "RN_BLE";

/// Configuration of a [`Server`]
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ServerConfig {
    /// The name put in the scan response
    pub name: String,
    pub advertise: AdvertiseSettings,
    /// The number of events buffered for the observer
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            name: DEFAULT_NAME.to_string(),
            advertise: AdvertiseSettings::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// The state of advertising
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdvertisingState {
    Idle,
    Starting,
    Advertising,
    Stopping,
}

/// A GATT peripheral server
pub struct Server<R> {
    radio: R,
    settings: AdvertiseSettings,
    name: Mutex<String>,
    registry: Registry,
    connections: ConnectionTracker,
    events: EventSink,
    state: Mutex<AdvertisingState>,
    advertising: AtomicBool,
    session_open: AtomicBool,
    /// Set once `start_advertising` was accepted by the radio, until advertising is stopped or
    /// the radio reports that it failed
    advertise_issued: AtomicBool,
    pending_start: Mutex<Option<oneshot::Sender<Result<(), Error>>>>,
}

impl<R: Radio> Server<R> {
    /// Create a new server with the default configuration
    pub fn new(radio: R) -> Self {
        Self::with_config(radio, ServerConfig::default())
    }

    pub fn with_config(radio: R, config: ServerConfig) -> Self {
        Server {
            radio,
            settings: config.advertise,
            name: Mutex::new(config.name),
            registry: Registry::new(),
            connections: ConnectionTracker::new(),
            events: EventSink::new(config.event_capacity),
            state: Mutex::new(AdvertisingState::Idle),
            advertising: AtomicBool::new(false),
            session_open: AtomicBool::new(false),
            advertise_issued: AtomicBool::new(false),
            pending_start: Mutex::new(None),
        }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Set the advertised name
    ///
    /// # Error
    /// The name cannot be changed once the server has been started.
    pub fn set_name<S: Into<String>>(&self, name: S) -> Result<(), Error> {
        let mut current = lock(&self.name);

        if self.registry.is_frozen() {
            return Err(Error::AlreadyStarted);
        }

        *current = name.into();

        log::info!("(SERVER) name set to '{}'", current);

        Ok(())
    }

    pub fn name(&self) -> String {
        lock(&self.name).clone()
    }

    /// Add a service
    ///
    /// Adding a service that already exists does nothing.
    pub fn add_service(&self, uuid: &str, is_primary: bool) -> Result<ServiceId, Error> {
        let uuid: Uuid = uuid.parse()?;

        let kind = if is_primary {
            ServiceKind::Primary
        } else {
            ServiceKind::Secondary
        };

        self.registry.add_service(uuid, kind)
    }

    /// Add a characteristic to a service
    ///
    /// `permissions` and `properties` are the raw bit fields of
    /// [`Permissions`](crate::gatt::characteristic::Permissions) and
    /// [`Properties`](crate::gatt::characteristic::Properties).
    pub fn add_characteristic(
        &self,
        service_uuid: &str,
        uuid: &str,
        permissions: u32,
        properties: u32,
    ) -> Result<CharacteristicId, Error> {
        let service = ServiceId(service_uuid.parse()?);

        let uuid: Uuid = uuid.parse()?;

        let permissions = PermissionFlags::try_from_bits(permissions)?;

        let properties = PropertyFlags::try_from_bits(properties)?;

        self.registry
            .add_characteristic(service, uuid, properties, permissions)
    }

    /// Attach the observer of events
    ///
    /// Events emitted before the observer is attached are lost. Calling this again replaces the
    /// observer.
    pub fn subscribe(&self) -> mpsc::Receiver<Event> {
        self.events.subscribe()
    }

    /// Check if the server is advertising
    pub fn is_advertising(&self) -> bool {
        self.advertising.load(Ordering::Acquire)
    }

    pub fn state(&self) -> AdvertisingState {
        *lock(&self.state)
    }

    /// Get the devices that are connected
    pub fn connected_devices(&self) -> Vec<Device> {
        self.connections.connected_devices()
    }

    /// Read the current value of a characteristic
    pub fn read_value(&self, service_uuid: &str, characteristic_uuid: &str) -> Result<Vec<u8>, Error> {
        let id = CharacteristicId::new(service_uuid.parse()?, characteristic_uuid.parse()?);

        self.registry.read_value(&id)
    }

    /// Start the server
    ///
    /// This freezes the registry, opens the GATT server session of the radio, registers every
    /// service with it, and then starts advertising. The returned future completes when the radio
    /// reports the result of starting to advertise, so [`run`](Server::run) must be processing the
    /// radio events for this to complete.
    ///
    /// # Error
    /// * [`Error::RadioUnavailable`] if there is no radio or it is not enabled
    /// * [`Error::AlreadyStarted`] if the server is already starting or advertising
    /// * [`Error::AdvertiseError`] if the radio failed to start advertising
    /// * [`Error::Radio`] if a command to the radio failed
    /// * [`Error::Cancelled`] if the radio events stopped before the result was reported
    pub async fn start(&self) -> Result<(), Error> {
        let result = self.begin_start()?;

        match result.await {
            Ok(result) => result,
            Err(_) => Err(Error::Cancelled),
        }
    }

    fn begin_start(&self) -> Result<oneshot::Receiver<Result<(), Error>>, Error> {
        {
            let mut state = lock(&self.state);

            if *state != AdvertisingState::Idle {
                return Err(Error::AlreadyStarted);
            }

            if !self.radio.is_present() || !self.radio.is_enabled() {
                log::error!("(SERVER) bluetooth radio is unavailable");

                return Err(Error::RadioUnavailable);
            }

            *state = AdvertisingState::Starting;
        }

        self.issue_start().map_err(|e| {
            *lock(&self.state) = AdvertisingState::Idle;

            e
        })
    }

    fn issue_start(&self) -> Result<oneshot::Receiver<Result<(), Error>>, Error> {
        // the name lock is held until frozen so that `set_name` cannot race the freeze
        let name = {
            let name = lock(&self.name);

            self.registry.freeze();

            name.clone()
        };

        self.radio
            .set_name(&name)
            .map_err(|e| self.radio_error("set_name", e))?;

        let data = AdvertisingData::new(&self.registry).map_err(|e| {
            log::error!("(GAP) {}", e);

            Error::AdvertiseError(AdvertiseFailure::DataTooLarge)
        })?;

        let scan_response = ScanResponseData::new(&name);

        self.radio
            .open_server_session()
            .map_err(|e| self.radio_error("open_server_session", e))?;

        self.session_open.store(true, Ordering::Release);

        for service in self.registry.services() {
            if let Err(e) = self.radio.add_service(&service) {
                self.close_session();

                return Err(self.radio_error("add_service", e));
            }
        }

        let (sender, receiver) = oneshot::channel();

        *lock(&self.pending_start) = Some(sender);

        log::info!("(SERVER) starting to advertise as '{}'", name);

        // set before the command, the radio may report a failure before it returns
        self.advertise_issued.store(true, Ordering::Release);

        if let Err(e) = self.radio.start_advertising(&self.settings, &data, &scan_response) {
            self.advertise_issued.store(false, Ordering::Release);

            lock(&self.pending_start).take();

            self.close_session();

            return Err(self.radio_error("start_advertising", e));
        }

        Ok(receiver)
    }

    /// Stop the server
    ///
    /// The GATT server session is closed first, and then advertising is stopped. Advertising is
    /// only stopped when the radio is still enabled and advertising was issued to the radio without
    /// it reporting a failure. This includes a start that was cancelled before the radio reported
    /// its result. Either way the server is no longer advertising when this returns.
    ///
    /// # Error
    /// * [`Error::StartPending`] if the server is waiting for the result of starting
    /// * [`Error::Radio`] if the radio failed to stop advertising
    pub fn stop(&self) -> Result<(), Error> {
        {
            let mut state = lock(&self.state);

            match *state {
                AdvertisingState::Starting => return Err(Error::StartPending),
                AdvertisingState::Stopping => return Ok(()),
                _ => *state = AdvertisingState::Stopping,
            }
        }

        self.close_session();

        let issued = self.advertise_issued.swap(false, Ordering::AcqRel);

        let result = if issued && self.radio.is_enabled() {
            log::info!("(SERVER) stopping advertising");

            self.radio
                .stop_advertising()
                .map_err(|e| self.radio_error("stop_advertising", e))
        } else {
            Ok(())
        };

        self.advertising.store(false, Ordering::Release);

        *lock(&self.state) = AdvertisingState::Idle;

        result
    }

    /// Send a new value of a characteristic to every connected device
    ///
    /// See [`NotificationDispatcher::dispatch`].
    pub fn notify(
        &self,
        service_uuid: &str,
        characteristic_uuid: &str,
        value: &[u8],
    ) -> Result<DispatchReport, Error> {
        let id = CharacteristicId::new(service_uuid.parse()?, characteristic_uuid.parse()?);

        NotificationDispatcher::new(&self.radio, &self.registry, &self.connections).dispatch(&id, value)
    }

    /// Process an event from the radio
    ///
    /// Processing the events through [`run`](Server::run) is preferred, this is for a radio that
    /// delivers its events in a way that is not a channel. Events must not be processed
    /// concurrently.
    pub fn process(&self, event: RadioEvent) -> Result<(), Error> {
        match event {
            RadioEvent::ConnectionStateChanged {
                device,
                status,
                new_state,
            } => {
                self.connection_state_changed(device, status, new_state);

                Ok(())
            }
            RadioEvent::ReadRequest {
                device,
                request_id,
                offset,
                characteristic,
            } => self.request_handler().read(&ReadRequest {
                device,
                request_id,
                offset,
                characteristic,
            }),
            RadioEvent::WriteRequest {
                device,
                request_id,
                characteristic,
                prepared_write,
                response_needed,
                offset,
                value,
            } => self.request_handler().write(WriteRequest {
                device,
                request_id,
                characteristic,
                prepared_write,
                response_needed,
                offset,
                value,
            }),
            RadioEvent::AdvertiseStartResult(result) => {
                self.advertise_start_result(result);

                Ok(())
            }
            RadioEvent::NotificationSent { device, status } => {
                notify::on_notification_sent(&device, status);

                Ok(())
            }
        }
    }

    /// Process the events from the radio
    ///
    /// This runs until every sender of the channel is dropped. A start that is waiting on the
    /// radio when the channel closes fails with [`Error::Cancelled`]. The server session of that
    /// start is closed, but advertising may have started so it is left for [`stop`](Server::stop).
    pub async fn run(&self, mut receiver: mpsc::UnboundedReceiver<RadioEvent>) {
        log::debug!("(SERVER) processing radio events");

        while let Some(event) = receiver.recv().await {
            if let Err(e) = self.process(event) {
                log::warn!("(SERVER) {}", e);
            }
        }

        log::info!("(SERVER) radio event channel closed");

        let mut state = lock(&self.state);

        if lock(&self.pending_start).take().is_some() {
            log::warn!("(SERVER) start cancelled before the radio reported a result");

            self.close_session();

            *state = AdvertisingState::Idle;
        }
    }

    fn request_handler(&self) -> RequestHandler<'_, R> {
        RequestHandler::new(&self.radio, &self.registry, &self.events)
    }

    fn connection_state_changed(&self, device: Device, status: u8, new_state: ConnectionState) {
        if status != GATT_SUCCESS {
            let reason = format!("Connection failed with status: {}", status);

            log::warn!("(SERVER) {}: {}", device.address, reason);

            self.events
                .emit(self.connections.on_disconnected(device, Some(reason)));

            return;
        }

        match new_state {
            ConnectionState::Connected => {
                if let Some(event) = self.connections.on_connected(device) {
                    self.events.emit(event);
                }
            }
            ConnectionState::Disconnected => {
                self.events.emit(self.connections.on_disconnected(device, None));
            }
            transitional => {
                log::debug!("(SERVER) {} is {:?}", device.address, transitional);
            }
        }
    }

    fn advertise_start_result(&self, result: Result<(), AdvertiseFailure>) {
        let mut state = lock(&self.state);

        let Some(pending) = lock(&self.pending_start).take() else {
            log::warn!("(SERVER) unexpected advertise start result {:?}", result);

            return;
        };

        let result = match result {
            Ok(()) => {
                log::info!("(SERVER) advertising started");

                self.advertising.store(true, Ordering::Release);

                *state = AdvertisingState::Advertising;

                Ok(())
            }
            Err(failure) => {
                log::error!("(SERVER) advertising failed to start: {}", failure);

                self.advertise_issued.store(false, Ordering::Release);

                self.close_session();

                *state = AdvertisingState::Idle;

                Err(Error::AdvertiseError(failure))
            }
        };

        drop(state);

        // the start future may have been dropped
        let _ = pending.send(result);
    }

    /// Close the GATT server session if it is open
    fn close_session(&self) {
        if self.session_open.swap(false, Ordering::AcqRel) {
            log::debug!("(SERVER) closing the server session");

            if let Err(e) = self.radio.close_server_session() {
                log::error!("(SERVER) failed to close the server session: {}", e);
            }

            self.connections.clear();
        }
    }

    fn radio_error(&self, command: &'static str, e: R::Error) -> Error {
        log::error!("(SERVER) radio command '{}' failed: {}", command, e);

        Error::radio(command, e)
    }
}
