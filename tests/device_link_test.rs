use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use wavy_bird::device::{
    DeviceLine, DeviceLink, LinkCallbacks, LinkConfig, LinkError, ScriptedPortProvider, StatusKind,
};
use wavy_bird::input::EventSlots;
use wavy_bird::types::{ConnectionState, InputEvent, InputSource, TiltDirection};

/// Everything the link reported, in order.
#[derive(Default)]
struct Recorded {
    states: Vec<ConnectionState>,
    opens: usize,
    closes: usize,
    errors: Vec<&'static str>,
}

fn recording_callbacks(
    slots: Arc<EventSlots>,
) -> (
    Arc<Mutex<Recorded>>,
    mpsc::UnboundedReceiver<DeviceLine>,
    LinkCallbacks,
) {
    let rec = Arc::new(Mutex::new(Recorded::default()));
    let (line_tx, line_rx) = mpsc::unbounded_channel();

    let (r1, r2, r3, r4) = (
        Arc::clone(&rec),
        Arc::clone(&rec),
        Arc::clone(&rec),
        Arc::clone(&rec),
    );
    let callbacks = LinkCallbacks::new()
        .on_state(move |s| r1.lock().unwrap().states.push(s))
        .on_open(move || r2.lock().unwrap().opens += 1)
        .on_close(move || r3.lock().unwrap().closes += 1)
        .on_error(move |e| r4.lock().unwrap().errors.push(e.kind()))
        .on_line(move |line| {
            if let Some(event) = line.to_event(42) {
                slots.publish(event);
            }
            let _ = line_tx.send(line.clone());
        });
    (rec, line_rx, callbacks)
}

async fn next_line(rx: &mut mpsc::UnboundedReceiver<DeviceLine>) -> DeviceLine {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timeout waiting for device line")
        .expect("link dropped")
}

async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn tilt_split_across_reads_then_wave_arrive_in_order() {
    let (link_end, mut device) = tokio::io::duplex(256);
    let slots = Arc::new(EventSlots::new());
    let (_rec, mut lines, callbacks) = recording_callbacks(Arc::clone(&slots));
    let provider = ScriptedPortProvider::new().with_stream("mem", link_end);
    let link = DeviceLink::new(LinkConfig::default(), provider, callbacks);

    link.connect().await.unwrap();
    device.write_all(b"TILT_LEFT:30:-").await.unwrap();
    device.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    device.write_all(b"12.5\nWAVE\n").await.unwrap();

    assert_eq!(
        next_line(&mut lines).await,
        DeviceLine::Tilt {
            direction: TiltDirection::Left,
            velocity: 30,
            angle: -12.5,
        }
    );
    assert_eq!(next_line(&mut lines).await, DeviceLine::Wave);

    let events = slots.drain();
    assert_eq!(events.len(), 2);
    assert!(events[0].is_flap());
    match events[1] {
        InputEvent::Tilt(tilt) => {
            assert_eq!(tilt.direction, TiltDirection::Left);
            assert_eq!(tilt.velocity, Some(30));
            assert_eq!(tilt.angle, Some(-12.5));
            assert_eq!(tilt.source, InputSource::Serial);
            assert_eq!(tilt.timestamp_ms, 42);
        }
        InputEvent::Flap => panic!("expected tilt"),
    }

    link.disconnect().await;
}

#[tokio::test]
async fn status_and_unknown_lines_reach_callbacks_without_events() {
    let (link_end, mut device) = tokio::io::duplex(256);
    let slots = Arc::new(EventSlots::new());
    let (_rec, mut lines, callbacks) = recording_callbacks(Arc::clone(&slots));
    let provider = ScriptedPortProvider::new().with_stream("mem", link_end);
    let link = DeviceLink::new(LinkConfig::default(), provider, callbacks);

    link.connect().await.unwrap();
    device
        .write_all(b"hello there\n\n   \nREADY\nTILT_RIGHT:abc:1\n")
        .await
        .unwrap();

    assert_eq!(
        next_line(&mut lines).await,
        DeviceLine::Unrecognized("hello there".to_string())
    );
    assert!(matches!(
        next_line(&mut lines).await,
        DeviceLine::Status {
            kind: StatusKind::Ready,
            ..
        }
    ));
    assert!(matches!(
        next_line(&mut lines).await,
        DeviceLine::Unrecognized(_)
    ));
    assert!(slots.drain().is_empty());

    link.disconnect().await;
}

#[tokio::test]
async fn read_failure_disconnects_once_without_error_state() {
    let mock = tokio_test::io::Builder::new()
        .read(b"WAVE\n")
        .read_error(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        .build();
    let slots = Arc::new(EventSlots::new());
    let (rec, mut lines, callbacks) = recording_callbacks(Arc::clone(&slots));
    let provider = ScriptedPortProvider::new().with_stream("mock", mock);
    let link = DeviceLink::new(LinkConfig::default(), provider, callbacks);

    link.connect().await.unwrap();
    assert_eq!(next_line(&mut lines).await, DeviceLine::Wave);
    eventually("close", || rec.lock().unwrap().closes == 1).await;

    assert_eq!(link.state(), ConnectionState::Disconnected);
    let rec = rec.lock().unwrap();
    assert_eq!(
        rec.states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ]
    );
    assert_eq!(rec.opens, 1);
    assert_eq!(rec.closes, 1);
    assert_eq!(rec.errors, vec!["read_failure"]);
    assert!(link.last_error().unwrap().contains("unplugged"));
}

#[tokio::test]
async fn device_closing_the_stream_disconnects() {
    let (link_end, device) = tokio::io::duplex(64);
    let (rec, _lines, callbacks) = recording_callbacks(Arc::new(EventSlots::new()));
    let provider = ScriptedPortProvider::new().with_stream("mem", link_end);
    let link = DeviceLink::new(LinkConfig::default(), provider, callbacks);

    link.connect().await.unwrap();
    drop(device);

    eventually("close", || rec.lock().unwrap().closes == 1).await;
    assert_eq!(link.state(), ConnectionState::Disconnected);
    assert!(rec.lock().unwrap().errors.is_empty());
}

#[tokio::test]
async fn disconnect_cancels_pending_read() {
    let (link_end, mut device) = tokio::io::duplex(64);
    let (rec, _lines, callbacks) = recording_callbacks(Arc::new(EventSlots::new()));
    let provider = ScriptedPortProvider::new().with_stream("mem", link_end);
    let link = DeviceLink::new(LinkConfig::default(), provider, callbacks);

    link.connect().await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), link.disconnect())
        .await
        .expect("disconnect should not wait for device output");

    assert_eq!(link.state(), ConnectionState::Disconnected);
    assert_eq!(rec.lock().unwrap().closes, 1);

    // The link closed its side of the pipe.
    let mut buf = [0u8; 8];
    let n = tokio::time::timeout(Duration::from_secs(2), device.read(&mut buf))
        .await
        .expect("device side should see end of stream")
        .unwrap();
    assert_eq!(n, 0);

    // A second disconnect changes nothing.
    link.disconnect().await;
    assert_eq!(rec.lock().unwrap().closes, 1);
}

/// Connects over a pipe too small for `bytes` and starts a send nobody drains.
async fn stalled_send(
    bytes: &'static [u8],
) -> (
    Arc<DeviceLink>,
    Arc<Mutex<Recorded>>,
    tokio::io::DuplexStream,
    tokio::task::JoinHandle<Result<(), LinkError>>,
) {
    let (link_end, device) = tokio::io::duplex(8);
    let (rec, _lines, callbacks) = recording_callbacks(Arc::new(EventSlots::new()));
    let provider = ScriptedPortProvider::new().with_stream("mem", link_end);
    let link = Arc::new(DeviceLink::new(LinkConfig::default(), provider, callbacks));
    link.connect().await.unwrap();

    let pending = tokio::spawn({
        let link = Arc::clone(&link);
        async move { link.send(bytes).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished(), "send should be waiting on the full pipe");
    (link, rec, device, pending)
}

#[tokio::test]
async fn disconnect_completes_while_a_send_is_stalled() {
    let (link, rec, _device, pending) = stalled_send(&[b'0'; 64]).await;

    tokio::time::timeout(Duration::from_secs(2), link.disconnect())
        .await
        .expect("disconnect must not wait for a stalled write");
    assert_eq!(link.state(), ConnectionState::Disconnected);
    assert_eq!(rec.lock().unwrap().closes, 1);

    let result = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("stalled send should be released")
        .unwrap();
    assert!(matches!(result, Err(LinkError::NotConnected)));
}

#[tokio::test]
async fn toggle_disconnects_while_a_send_is_stalled() {
    let (link, rec, _device, pending) = stalled_send(&[b'0'; 64]).await;

    tokio::time::timeout(Duration::from_secs(2), link.connect())
        .await
        .expect("toggle must not wait for a stalled write")
        .unwrap();
    assert_eq!(link.state(), ConnectionState::Disconnected);
    assert_eq!(rec.lock().unwrap().closes, 1);
    assert!(pending.await.unwrap().is_err());
}

#[tokio::test]
async fn send_while_disconnected_never_opens_a_port() {
    let (link_end, _device) = tokio::io::duplex(64);
    let provider = Arc::new(ScriptedPortProvider::new().with_stream("mem", link_end));
    let link = DeviceLink::new(
        LinkConfig::default(),
        Arc::clone(&provider),
        LinkCallbacks::new(),
    );

    let err = link.send(b"0").await.unwrap_err();
    assert!(matches!(err, LinkError::NotConnected));
    assert!(matches!(link.calibrate().await, Err(LinkError::NotConnected)));

    assert_eq!(provider.remaining(), 1);
    assert_eq!(link.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn calibrate_writes_command_byte() {
    let (link_end, mut device) = tokio::io::duplex(64);
    let provider = ScriptedPortProvider::new().with_stream("mem", link_end);
    let link = DeviceLink::new(LinkConfig::default(), provider, LinkCallbacks::new());

    link.connect().await.unwrap();
    link.calibrate().await.unwrap();

    let mut buf = [0u8; 1];
    tokio::time::timeout(Duration::from_secs(2), device.read_exact(&mut buf))
        .await
        .expect("timeout waiting for calibrate command")
        .unwrap();
    assert_eq!(&buf, b"0");

    link.disconnect().await;
}

#[tokio::test]
async fn error_state_allows_a_new_attempt() {
    let (link_end, _device) = tokio::io::duplex(64);
    let (rec, _lines, callbacks) = recording_callbacks(Arc::new(EventSlots::new()));
    let provider = ScriptedPortProvider::new()
        .with_error(LinkError::TransportUnsupported("no serial support".to_string()))
        .with_stream("mem", link_end);
    let link = DeviceLink::new(LinkConfig::default(), provider, callbacks);

    assert!(link.connect().await.is_err());
    assert_eq!(link.state(), ConnectionState::Error);

    link.connect().await.unwrap();
    assert_eq!(link.state(), ConnectionState::Connected);
    assert_eq!(link.last_error(), None);

    link.disconnect().await;
    let rec = rec.lock().unwrap();
    assert_eq!(
        rec.states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Error,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ]
    );
    assert_eq!(rec.errors, vec!["transport_unsupported"]);
    assert_eq!(rec.closes, 1);
}

#[tokio::test]
async fn reconnect_after_device_went_away() {
    let (first, first_dev) = tokio::io::duplex(64);
    let (second, mut second_dev) = tokio::io::duplex(64);
    let slots = Arc::new(EventSlots::new());
    let (rec, mut lines, callbacks) = recording_callbacks(Arc::clone(&slots));
    let provider = ScriptedPortProvider::new()
        .with_stream("first", first)
        .with_stream("second", second);
    let link = DeviceLink::new(LinkConfig::default(), provider, callbacks);

    link.connect().await.unwrap();
    drop(first_dev);
    eventually("first close", || rec.lock().unwrap().closes == 1).await;

    link.connect().await.unwrap();
    second_dev.write_all(b"WAVE\n").await.unwrap();
    assert_eq!(next_line(&mut lines).await, DeviceLine::Wave);
    assert!(slots.take_flap());

    link.disconnect().await;
    assert_eq!(rec.lock().unwrap().opens, 2);
    assert_eq!(rec.lock().unwrap().closes, 2);
}

#[tokio::test]
async fn wire_log_records_received_lines_and_commands() {
    let path = std::env::temp_dir().join(format!("wavy-link-wire-{}.jsonl", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let (link_end, mut device) = tokio::io::duplex(64);
    let (_rec, mut lines, callbacks) = recording_callbacks(Arc::new(EventSlots::new()));
    let config = LinkConfig {
        wire_log_path: Some(path.display().to_string()),
        ..LinkConfig::default()
    };
    let provider = ScriptedPortProvider::new().with_stream("mem", link_end);
    let link = DeviceLink::new(config, provider, callbacks);

    link.connect().await.unwrap();
    device.write_all(b"TILT_RIGHT:5:2.5\r\n").await.unwrap();
    next_line(&mut lines).await;
    link.calibrate().await.unwrap();

    let mut records: Vec<serde_json::Value> = Vec::new();
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let contents = std::fs::read_to_string(&path).unwrap_or_default();
        records = contents
            .lines()
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        if records.len() == 2 {
            break;
        }
    }

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["dir"], "rx");
    assert_eq!(records[0]["line"], "TILT_RIGHT:5:2.5");
    assert_eq!(records[1]["dir"], "tx");
    assert_eq!(records[1]["line"], "0");

    link.disconnect().await;
    let _ = std::fs::remove_file(&path);
}
