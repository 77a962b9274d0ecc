mod common;

use bo_tie_peripheral::att::notify::DeliveryMode;
use bo_tie_peripheral::att::AttStatus;
use bo_tie_peripheral::gap::{AdvertiseFailure, ADV_PAYLOAD_MAX};
use bo_tie_peripheral::radio::RadioEvent;
use bo_tie_peripheral::server::AdvertisingState;
use bo_tie_peripheral::{Error, Event, Server, Uuid};
use common::*;
use std::sync::Arc;

/// Read, Write, and Notify
const RW_NOTIFY: u32 = 0x1A;
/// Readable and Writable
const READ_WRITE: u32 = 0x11;

fn server() -> (Arc<Server<MockRadio>>, tokio::sync::mpsc::UnboundedReceiver<RadioEvent>) {
    init_logger();

    let (radio, receiver) = MockRadio::new();

    (Arc::new(Server::new(radio)), receiver)
}

/// Create a server with S1/C1 that is processing radio events
fn running_server() -> Arc<Server<MockRadio>> {
    let (server, receiver) = server();

    server.add_service(S1, true).unwrap();

    server.add_characteristic(S1, C1, READ_WRITE, RW_NOTIFY).unwrap();

    let event_loop = server.clone();

    tokio::spawn(async move { event_loop.run(receiver).await });

    server
}

#[tokio::test]
async fn write_read_notify_scenario() {
    let server = running_server();

    let mut events = server.subscribe();

    server.start().await.unwrap();

    assert!(server.is_advertising());

    server.radio().report(connected(D1));

    assert!(matches!(
        events.recv().await,
        Some(Event::DeviceConnected { device_id, .. }) if device_id == D1
    ));

    let c1 = characteristic(S1, C1);

    server.radio().report(write(D1, 1, c1, true, &[1, 2, 3]));

    match events.recv().await {
        Some(Event::CharacteristicWrite {
            characteristic_uuid,
            device_id,
            data,
            ..
        }) => {
            assert_eq!(C1.parse::<Uuid>().unwrap(), characteristic_uuid);
            assert_eq!(D1, device_id);
            assert_eq!(vec![1, 2, 3], data);
        }
        other => panic!("unexpected event {:?}", other),
    }

    server.radio().report(read(D1, 2, 0, c1));

    wait_until(|| server.radio().responses().len() == 2).await;

    assert_eq!(
        vec![
            Command::SendResponse {
                device: D1,
                request_id: 1,
                status: AttStatus::Success,
                offset: 0,
                value: Some(vec![1, 2, 3]),
            },
            Command::SendResponse {
                device: D1,
                request_id: 2,
                status: AttStatus::Success,
                offset: 0,
                value: Some(vec![1, 2, 3]),
            },
        ],
        server.radio().responses()
    );

    let report = server.notify(S1, C1, &[9, 9]).unwrap();

    assert_eq!(DeliveryMode::Notify, report.mode);

    assert_eq!(vec![D1], report.delivered);

    assert!(report.failed.is_empty());

    assert!(server.radio().commands().contains(&Command::Notify {
        device: D1,
        characteristic: c1,
        value: vec![9, 9],
        indicate: false,
    }));

    assert_eq!(vec![9, 9], server.read_value(S1, C1).unwrap());

    server.radio().report(read(D1, 3, 0, c1));

    wait_until(|| server.radio().responses().len() == 3).await;

    assert!(matches!(
        server.radio().responses().last(),
        Some(Command::SendResponse { request_id: 3, value: Some(v), .. }) if *v == vec![9, 9]
    ));
}

#[test]
fn duplicate_service_is_registered_once() {
    let (server, _receiver) = server();

    server.add_service(S1, true).unwrap();

    server.add_service(S1, false).unwrap();

    assert_eq!(1, server.registry().len());
}

#[test]
fn malformed_arguments() {
    let (server, _receiver) = server();

    assert!(matches!(server.add_service("S1", true), Err(Error::InvalidArgument(_))));

    assert!(matches!(
        server.add_characteristic(S1, C1, READ_WRITE, RW_NOTIFY),
        Err(Error::NotFound(_))
    ));

    server.add_service(S1, true).unwrap();

    assert!(matches!(
        server.add_characteristic(S1, C1, 0x08, RW_NOTIFY),
        Err(Error::InvalidArgument(_))
    ));

    assert!(matches!(
        server.add_characteristic(S1, C1, READ_WRITE, 0x1FF),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn read_with_offset_is_rejected() {
    let (server, _receiver) = server();

    server.add_service(S1, true).unwrap();
    server.add_characteristic(S1, C1, READ_WRITE, RW_NOTIFY).unwrap();

    server.process(write(D1, 1, characteristic(S1, C1), false, &[4, 5])).unwrap();

    server.process(read(D1, 7, 1, characteristic(S1, C1))).unwrap();

    assert_eq!(
        vec![Command::SendResponse {
            device: D1,
            request_id: 7,
            status: AttStatus::InvalidOffset,
            offset: 1,
            value: None,
        }],
        server.radio().responses()
    );
}

#[test]
fn write_commits_before_event_and_response() {
    let (server, _receiver) = server();

    server.add_service(S1, true).unwrap();
    server.add_characteristic(S1, C1, READ_WRITE, RW_NOTIFY).unwrap();

    let mut events = server.subscribe();

    // without response
    server.process(write(D1, 1, characteristic(S1, C1), false, &[1])).unwrap();

    assert!(server.radio().responses().is_empty());

    assert!(matches!(
        events.try_recv(),
        Ok(Event::CharacteristicWrite { ref data, ref device_name, .. })
            if *data == vec![1] && device_name.as_deref() == Some("central 1")
    ));

    assert_eq!(vec![1], server.read_value(S1, C1).unwrap());

    // with response
    server.process(write(D1, 2, characteristic(S1, C1), true, &[2, 2])).unwrap();

    assert!(matches!(events.try_recv(), Ok(Event::CharacteristicWrite { .. })));

    assert_eq!(1, server.radio().responses().len());

    assert_eq!(vec![2, 2], server.read_value(S1, C1).unwrap());
}

#[test]
fn request_for_unknown_characteristic() {
    let (server, _receiver) = server();

    server.add_service(S1, true).unwrap();
    server.add_characteristic(S1, C1, READ_WRITE, RW_NOTIFY).unwrap();

    let mut events = server.subscribe();

    let unknown = characteristic(S1, "6e400003-b5a3-f393-e0a9-e50e24dcca9e");

    assert!(matches!(
        server.process(write(D1, 1, unknown, true, &[1])),
        Err(Error::NotFound(_))
    ));

    assert!(matches!(
        server.process(write(D1, 2, unknown, false, &[1])),
        Err(Error::NotFound(_))
    ));

    assert!(matches!(
        server.process(read(D1, 3, 0, unknown)),
        Err(Error::NotFound(_))
    ));

    assert!(events.try_recv().is_err());

    assert!(server.read_value(S1, C1).unwrap().is_empty());

    let statuses: Vec<(i32, AttStatus)> = server
        .radio()
        .responses()
        .into_iter()
        .filter_map(|c| match c {
            Command::SendResponse { request_id, status, .. } => Some((request_id, status)),
            _ => None,
        })
        .collect();

    assert_eq!(vec![(1, AttStatus::InvalidHandle), (3, AttStatus::InvalidHandle)], statuses);
}

#[test]
fn connect_is_reported_once() {
    let (server, _receiver) = server();

    let mut events = server.subscribe();

    server.process(connected(D1)).unwrap();
    server.process(connected(D1)).unwrap();

    assert!(matches!(events.try_recv(), Ok(Event::DeviceConnected { .. })));

    assert!(events.try_recv().is_err());

    assert_eq!(1, server.connected_devices().len());

    server.process(disconnected(D1, 0)).unwrap();

    assert!(matches!(
        events.try_recv(),
        Ok(Event::DeviceDisconnected { error: None, .. })
    ));

    assert!(server.connected_devices().is_empty());
}

#[test]
fn failed_connection_is_a_disconnect() {
    let (server, _receiver) = server();

    let mut events = server.subscribe();

    server.process(connected(D1)).unwrap();

    let _ = events.try_recv();

    // the status is a failure even though the new state is "connected"
    server.process(RadioEvent::ConnectionStateChanged {
        device: device(D1),
        status: 133,
        new_state: bo_tie_peripheral::radio::ConnectionState::Connected,
    })
    .unwrap();

    assert!(matches!(
        events.try_recv(),
        Ok(Event::DeviceDisconnected { error: Some(ref e), .. })
            if e == "Connection failed with status: 133"
    ));

    assert!(server.connected_devices().is_empty());
}

#[test]
fn indicate_is_chosen_by_properties() {
    let (server, _receiver) = server();

    server.add_service(S1, true).unwrap();

    let cases = [
        ("00002a01-0000-1000-8000-00805f9b34fb", 0x12, DeliveryMode::Notify),
        ("00002a02-0000-1000-8000-00805f9b34fb", 0x22, DeliveryMode::Indicate),
        ("00002a03-0000-1000-8000-00805f9b34fb", 0x32, DeliveryMode::Indicate),
        ("00002a04-0000-1000-8000-00805f9b34fb", 0x02, DeliveryMode::Notify),
    ];

    for (uuid, properties, _) in cases.iter() {
        server.add_characteristic(S1, uuid, READ_WRITE, *properties).unwrap();
    }

    server.process(connected(D1)).unwrap();

    for (uuid, _, mode) in cases.iter() {
        let report = server.notify(S1, uuid, &[1]).unwrap();

        assert_eq!(*mode, report.mode);

        assert!(matches!(
            server.radio().commands().last(),
            Some(Command::Notify { indicate, .. }) if *indicate == (*mode == DeliveryMode::Indicate)
        ));
    }
}

#[test]
fn notify_failures_are_per_device() {
    let (server, _receiver) = server();

    server.add_service(S1, true).unwrap();
    server.add_characteristic(S1, C1, READ_WRITE, RW_NOTIFY).unwrap();

    // no connected devices
    let report = server.notify(S1, C1, &[1]).unwrap();

    assert!(report.delivered.is_empty());

    server.process(connected(D1)).unwrap();
    server.process(connected(D2)).unwrap();

    server.radio().unreachable.lock().unwrap().push(D2);

    let report = server.notify(S1, C1, &[2]).unwrap();

    assert_eq!(vec![D1], report.delivered);

    assert_eq!(1, report.failed.len());

    assert_eq!(D2, report.failed[0].0);

    assert_eq!(vec![2], server.read_value(S1, C1).unwrap());

    assert!(matches!(
        server.notify(S1, "00002a01-0000-1000-8000-00805f9b34fb", &[1]),
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn advertising_payloads() {
    let server = running_server();

    server.add_service("0000180f-0000-1000-8000-00805f9b34fb", true).unwrap();

    server.set_name("a peripheral with a name too long for a scan response").unwrap();

    server.start().await.unwrap();

    let Some(Command::StartAdvertising { settings, data, scan_response }) = server
        .radio()
        .commands()
        .into_iter()
        .find(|c| matches!(c, Command::StartAdvertising { .. }))
    else {
        panic!("advertising was not started")
    };

    assert_eq!(bo_tie_peripheral::gap::AdvertiseSettings::default(), settings);

    assert!(settings.connectable);

    assert!(data.len() <= ADV_PAYLOAD_MAX);

    assert_eq!(vec![S1.parse::<Uuid>().unwrap()], data.service_uuids());

    assert!(scan_response.len() <= ADV_PAYLOAD_MAX);

    let (name, complete) = scan_response.local_name().unwrap();

    assert!(!complete);

    assert!("a peripheral with a name too long for a scan response".starts_with(name));

    let commands = server.radio().commands();

    assert_eq!(
        &[
            Command::SetName("a peripheral with a name too long for a scan response".to_string()),
            Command::OpenServerSession,
            Command::AddService(S1.parse().unwrap()),
            Command::AddService(Uuid::from_u16(0x180F)),
        ],
        &commands[..4]
    );
}

#[tokio::test]
async fn registry_is_frozen_by_start() {
    let server = running_server();

    server.start().await.unwrap();

    assert_eq!(Err(Error::AlreadyStarted), server.add_service(S1, true).map(|_| ()));

    assert_eq!(
        Err(Error::AlreadyStarted),
        server
            .add_characteristic(S1, "6e400003-b5a3-f393-e0a9-e50e24dcca9e", READ_WRITE, RW_NOTIFY)
            .map(|_| ())
    );

    assert_eq!(Err(Error::AlreadyStarted), server.set_name("other"));

    assert_eq!(Err(Error::AlreadyStarted), server.start().await);
}

#[tokio::test]
async fn radio_unavailable() {
    let server = running_server();

    server
        .radio()
        .enabled
        .store(false, std::sync::atomic::Ordering::SeqCst);

    assert_eq!(Err(Error::RadioUnavailable), server.start().await);

    assert!(!server.is_advertising());

    // nothing was frozen
    server.add_service("0000180f-0000-1000-8000-00805f9b34fb", true).unwrap();

    server.radio().present.store(false, std::sync::atomic::Ordering::SeqCst);
    server.radio().enabled.store(true, std::sync::atomic::Ordering::SeqCst);

    assert_eq!(Err(Error::RadioUnavailable), server.start().await);

    assert!(server.radio().commands().is_empty());
}

#[tokio::test]
async fn advertise_failure() {
    let server = running_server();

    *server.radio().advertise_result.lock().unwrap() = Some(Err(AdvertiseFailure::TooManyAdvertisers));

    assert_eq!(
        Err(Error::AdvertiseError(AdvertiseFailure::TooManyAdvertisers)),
        server.start().await
    );

    assert!(!server.is_advertising());

    assert_eq!(AdvertisingState::Idle, server.state());

    assert_eq!(Some(&Command::CloseServerSession), server.radio().commands().last());

    // the server can be started again
    *server.radio().advertise_result.lock().unwrap() = Some(Ok(()));

    server.start().await.unwrap();

    assert!(server.is_advertising());
}

#[tokio::test]
async fn stop_closes_session_then_stops_advertising() {
    let server = running_server();

    server.start().await.unwrap();

    server.process(connected(D1)).unwrap();

    server.radio().clear_commands();

    server.stop().unwrap();

    assert!(!server.is_advertising());

    assert_eq!(
        vec![Command::CloseServerSession, Command::StopAdvertising],
        server.radio().commands()
    );

    assert!(server.connected_devices().is_empty());

    // stopping again does not issue commands
    server.radio().clear_commands();

    server.stop().unwrap();

    assert!(server.radio().commands().is_empty());

    // restarting registers the services again
    server.start().await.unwrap();

    assert!(server.radio().commands().contains(&Command::AddService(S1.parse().unwrap())));

    assert!(server.is_advertising());
}

#[tokio::test]
async fn stop_with_radio_disabled() {
    let server = running_server();

    server.start().await.unwrap();

    server.radio().clear_commands();

    server
        .radio()
        .enabled
        .store(false, std::sync::atomic::Ordering::SeqCst);

    server.stop().unwrap();

    assert_eq!(vec![Command::CloseServerSession], server.radio().commands());

    assert!(!server.is_advertising());
}

#[tokio::test]
async fn stop_while_start_is_pending() {
    let server = running_server();

    *server.radio().advertise_result.lock().unwrap() = None;

    let starting = server.clone();

    let start = tokio::spawn(async move { starting.start().await });

    wait_until(|| server.state() == AdvertisingState::Starting).await;

    assert_eq!(Err(Error::StartPending), server.stop());

    wait_until(|| {
        server
            .radio()
            .commands()
            .iter()
            .any(|c| matches!(c, Command::StartAdvertising { .. }))
    })
    .await;

    server.radio().report(RadioEvent::AdvertiseStartResult(Ok(())));

    assert_eq!(Ok(()), start.await.unwrap());

    assert!(server.is_advertising());

    server.stop().unwrap();
}

#[tokio::test]
async fn start_is_cancelled_when_radio_events_end() {
    let server = running_server();

    *server.radio().advertise_result.lock().unwrap() = None;

    let starting = server.clone();

    let start = tokio::spawn(async move { starting.start().await });

    wait_until(|| {
        server
            .radio()
            .commands()
            .iter()
            .any(|c| matches!(c, Command::StartAdvertising { .. }))
    })
    .await;

    server.radio().disconnect();

    assert_eq!(Err(Error::Cancelled), start.await.unwrap());

    assert_eq!(AdvertisingState::Idle, server.state());
}

#[tokio::test]
async fn cancelled_start_can_be_stopped() {
    let server = running_server();

    *server.radio().advertise_result.lock().unwrap() = None;

    let starting = server.clone();

    let start = tokio::spawn(async move { starting.start().await });

    wait_until(|| {
        server
            .radio()
            .commands()
            .iter()
            .any(|c| matches!(c, Command::StartAdvertising { .. }))
    })
    .await;

    server.radio().clear_commands();

    server.radio().disconnect();

    assert_eq!(Err(Error::Cancelled), start.await.unwrap());

    // the session of the cancelled start is closed
    assert_eq!(vec![Command::CloseServerSession], server.radio().commands());

    server.radio().clear_commands();

    // the radio may be advertising, stop must still stop it
    server.stop().unwrap();

    assert_eq!(vec![Command::StopAdvertising], server.radio().commands());

    assert!(!server.is_advertising());
}

#[test]
fn write_offset_is_ignored_and_echoed() {
    let (server, _receiver) = server();

    server.add_service(S1, true).unwrap();
    server.add_characteristic(S1, C1, READ_WRITE, RW_NOTIFY).unwrap();

    server.process(write(D1, 1, characteristic(S1, C1), false, &[0; 8])).unwrap();

    server
        .process(RadioEvent::WriteRequest {
            device: device(D1),
            request_id: 2,
            characteristic: characteristic(S1, C1),
            prepared_write: true,
            response_needed: true,
            offset: 5,
            value: vec![7, 8, 9],
        })
        .unwrap();

    // the whole value is replaced, nothing of the earlier value is kept
    assert_eq!(vec![7, 8, 9], server.read_value(S1, C1).unwrap());

    assert_eq!(
        vec![Command::SendResponse {
            device: D1,
            request_id: 2,
            status: AttStatus::Success,
            offset: 5,
            value: Some(vec![7, 8, 9]),
        }],
        server.radio().responses()
    );

    server.process(read(D1, 3, 0, characteristic(S1, C1))).unwrap();

    assert!(matches!(
        server.radio().responses().last(),
        Some(Command::SendResponse { request_id: 3, value: Some(v), .. }) if *v == vec![7, 8, 9]
    ));
}

#[test]
fn concurrent_callbacks_and_notifications() {
    const ROUNDS: u8 = 200;

    let (server, _receiver) = server();

    server.add_service(S1, true).unwrap();
    server.add_characteristic(S1, C1, READ_WRITE, RW_NOTIFY).unwrap();

    let addresses: Vec<_> = (0..4u8)
        .map(|n| bo_tie_peripheral::connection::DeviceAddress::new([0xC0, 0, 0, 0, 0, n]))
        .collect();

    let reports = std::thread::scope(|scope| {
        // radio callbacks, processed in order on one thread
        scope.spawn(|| {
            for round in 0..ROUNDS {
                let address = addresses[(round % 4) as usize];

                server.process(connected(address)).unwrap();

                server
                    .process(write(address, round as i32, characteristic(S1, C1), true, &[1, round]))
                    .unwrap();

                if round % 3 == 0 {
                    server.process(disconnected(address, 0)).unwrap();
                }
            }
        });

        scope.spawn(|| {
            for _ in 0..ROUNDS {
                for device in server.connected_devices() {
                    assert!(addresses.contains(&device.address));
                }

                let value = server.read_value(S1, C1).unwrap();

                assert!(value.is_empty() || (value.len() == 2 && (value[0] == 1 || value[0] == 2)));
            }
        });

        let notifier = scope.spawn(|| {
            (0..ROUNDS)
                .map(|round| server.notify(S1, C1, &[2, round]).unwrap())
                .collect::<Vec<_>>()
        });

        notifier.join().unwrap()
    });

    for report in reports {
        assert!(report.failed.is_empty());

        for address in report.delivered {
            assert!(addresses.contains(&address));
        }
    }

    // the last writer of either thread wins, no update is lost halfway
    let last = server.read_value(S1, C1).unwrap();

    assert!(last == vec![1, ROUNDS - 1] || last == vec![2, ROUNDS - 1]);
}
