//! A radio that records the commands sent to it

#![allow(dead_code)]

use bo_tie_peripheral::att::{AttStatus, RequestId};
use bo_tie_peripheral::connection::{Device, DeviceAddress};
use bo_tie_peripheral::gap::{AdvertiseFailure, AdvertiseSettings, AdvertisingData, ScanResponseData};
use bo_tie_peripheral::gatt::{CharacteristicId, ServiceRecord};
use bo_tie_peripheral::radio::{ConnectionState, Radio, RadioEvent, GATT_SUCCESS};
use bo_tie_peripheral::Uuid;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub const D1: DeviceAddress = DeviceAddress::new([0xD1, 0, 0, 0, 0, 0x01]);
pub const D2: DeviceAddress = DeviceAddress::new([0xD2, 0, 0, 0, 0, 0x02]);

pub const S1: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";
pub const C1: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";

pub fn init_logger() {
    let _ = simplelog::TestLogger::init(simplelog::LevelFilter::Trace, simplelog::Config::default());
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SetName(String),
    OpenServerSession,
    AddService(Uuid),
    SendResponse {
        device: DeviceAddress,
        request_id: RequestId,
        status: AttStatus,
        offset: u16,
        value: Option<Vec<u8>>,
    },
    Notify {
        device: DeviceAddress,
        characteristic: CharacteristicId,
        value: Vec<u8>,
        indicate: bool,
    },
    StartAdvertising {
        settings: AdvertiseSettings,
        data: AdvertisingData,
        scan_response: ScanResponseData,
    },
    StopAdvertising,
    CloseServerSession,
}

#[derive(Debug)]
pub struct MockError(pub &'static str);

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

pub struct MockRadio {
    pub present: AtomicBool,
    pub enabled: AtomicBool,
    commands: Mutex<Vec<Command>>,
    events: Mutex<Option<mpsc::UnboundedSender<RadioEvent>>>,
    /// Reported back when advertising is started, nothing is reported when this is `None`
    pub advertise_result: Mutex<Option<Result<(), AdvertiseFailure>>>,
    /// Devices that notifications cannot be sent to
    pub unreachable: Mutex<Vec<DeviceAddress>>,
}

impl MockRadio {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RadioEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();

        let radio = MockRadio {
            present: AtomicBool::new(true),
            enabled: AtomicBool::new(true),
            commands: Mutex::new(Vec::new()),
            events: Mutex::new(Some(sender)),
            advertise_result: Mutex::new(Some(Ok(()))),
            unreachable: Mutex::new(Vec::new()),
        };

        (radio, receiver)
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clear_commands(&self) {
        self.commands.lock().unwrap().clear()
    }

    /// Send an event as if the radio reported it
    pub fn report(&self, event: RadioEvent) {
        if let Some(sender) = self.events.lock().unwrap().as_ref() {
            sender.send(event).unwrap();
        }
    }

    /// Drop the sender of radio events
    pub fn disconnect(&self) {
        self.events.lock().unwrap().take();
    }

    pub fn responses(&self) -> Vec<Command> {
        self.commands()
            .into_iter()
            .filter(|c| matches!(c, Command::SendResponse { .. }))
            .collect()
    }

    fn record(&self, command: Command) {
        self.commands.lock().unwrap().push(command)
    }
}

impl Radio for MockRadio {
    type Error = MockError;

    fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_name(&self, name: &str) -> Result<(), Self::Error> {
        self.record(Command::SetName(name.to_string()));

        Ok(())
    }

    fn open_server_session(&self) -> Result<(), Self::Error> {
        self.record(Command::OpenServerSession);

        Ok(())
    }

    fn add_service(&self, service: &ServiceRecord) -> Result<(), Self::Error> {
        self.record(Command::AddService(service.uuid));

        Ok(())
    }

    fn send_response(
        &self,
        device: &DeviceAddress,
        request_id: RequestId,
        status: AttStatus,
        offset: u16,
        value: Option<&[u8]>,
    ) -> Result<(), Self::Error> {
        self.record(Command::SendResponse {
            device: *device,
            request_id,
            status,
            offset,
            value: value.map(|v| v.to_vec()),
        });

        Ok(())
    }

    fn notify_characteristic_changed(
        &self,
        device: &DeviceAddress,
        characteristic: &CharacteristicId,
        value: &[u8],
        indicate: bool,
    ) -> Result<(), Self::Error> {
        if self.unreachable.lock().unwrap().contains(device) {
            return Err(MockError("device is unreachable"));
        }

        self.record(Command::Notify {
            device: *device,
            characteristic: *characteristic,
            value: value.to_vec(),
            indicate,
        });

        Ok(())
    }

    fn start_advertising(
        &self,
        settings: &AdvertiseSettings,
        data: &AdvertisingData,
        scan_response: &ScanResponseData,
    ) -> Result<(), Self::Error> {
        self.record(Command::StartAdvertising {
            settings: *settings,
            data: data.clone(),
            scan_response: scan_response.clone(),
        });

        if let Some(result) = *self.advertise_result.lock().unwrap() {
            self.report(RadioEvent::AdvertiseStartResult(result));
        }

        Ok(())
    }

    fn stop_advertising(&self) -> Result<(), Self::Error> {
        self.record(Command::StopAdvertising);

        Ok(())
    }

    fn close_server_session(&self) -> Result<(), Self::Error> {
        self.record(Command::CloseServerSession);

        Ok(())
    }
}

pub fn device(address: DeviceAddress) -> Device {
    Device::new(address, Some(format!("central {}", address.0[5])))
}

pub fn connected(address: DeviceAddress) -> RadioEvent {
    RadioEvent::ConnectionStateChanged {
        device: device(address),
        status: GATT_SUCCESS,
        new_state: ConnectionState::Connected,
    }
}

pub fn disconnected(address: DeviceAddress, status: u8) -> RadioEvent {
    RadioEvent::ConnectionStateChanged {
        device: device(address),
        status,
        new_state: ConnectionState::Disconnected,
    }
}

pub fn characteristic(service: &str, characteristic: &str) -> CharacteristicId {
    CharacteristicId::new(service.parse().unwrap(), characteristic.parse().unwrap())
}

pub fn read(address: DeviceAddress, request_id: RequestId, offset: u16, id: CharacteristicId) -> RadioEvent {
    RadioEvent::ReadRequest {
        device: device(address),
        request_id,
        offset,
        characteristic: id,
    }
}

pub fn write(
    address: DeviceAddress,
    request_id: RequestId,
    id: CharacteristicId,
    response_needed: bool,
    value: &[u8],
) -> RadioEvent {
    RadioEvent::WriteRequest {
        device: device(address),
        request_id,
        characteristic: id,
        prepared_write: false,
        response_needed,
        offset: 0,
        value: value.to_vec(),
    }
}

/// Yield to the event loop until `condition` holds
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F) {
    for _ in 0..1000 {
        if condition() {
            return;
        }

        tokio::task::yield_now().await;
    }

    panic!("condition was never met");
}
