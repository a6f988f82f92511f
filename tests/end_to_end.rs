//! Acquisition scenarios driven through the public API with an in-memory producer.

use ira_telemetry::session::{parse_int, parse_string, query_str};
use ira_telemetry::types::VariableType;
use ira_telemetry::{
    ClientConfig, ConnectionEvent, ConnectionState, FrameContext, FrameReader, MemoryProducer,
    PollOutcome, SharedRegion, StateChange, TelemetryClient, TelemetryObserver,
};
use std::time::Duration;

const WAIT: Duration = Duration::from_millis(5);

#[derive(Default)]
struct Recorder {
    changes: Vec<StateChange>,
    ticks: Vec<i32>,
    speeds: Vec<Option<f32>>,
}

impl TelemetryObserver for Recorder {
    fn on_state_change(&mut self, change: &StateChange) {
        self.changes.push(*change);
    }

    fn on_frame(&mut self, frame: &FrameContext<'_>) {
        self.ticks.push(frame.tick());
        self.speeds.push(frame.sample().speed);
    }
}

impl Recorder {
    fn phases(&self) -> Vec<ConnectionState> {
        self.changes.iter().map(|change| change.to).collect()
    }
}

fn config() -> ClientConfig {
    ClientConfig {
        frame_timeout_ms: 5,
        connect_timeout_ms: 5,
        reconnect_interval_ms: 5,
        liveness_window_ms: 1_000,
        required_channels: vec!["Speed".into(), "RPM".into(), "Gear".into()],
        optional_channels: vec!["Throttle".into()],
        ..ClientConfig::default()
    }
}

fn single_buffer_producer() -> MemoryProducer {
    MemoryProducer::builder()
        .buffers(1)
        .variable("Speed", VariableType::Float32, 1)
        .variable("RPM", VariableType::Float32, 1)
        .variable("Gear", VariableType::Int32, 1)
        .build()
}

fn write_tick(producer: &MemoryProducer, tick: i32) {
    producer.write_frame(0, tick, |frame| {
        frame.set_f32("Speed", tick as f32).set_f32("RPM", 4000.0).set_i32("Gear", 3);
    });
}

#[test]
fn disconnected_producer_is_never_attached() {
    let producer = single_buffer_producer();
    write_tick(&producer, 5);
    write_tick(&producer, 6);

    let mut region = producer.region();
    assert!(region.open());
    let mut reader = FrameReader::new();
    for _ in 0..5 {
        let outcome = reader.wait(&region, WAIT, None).unwrap();
        assert_eq!(outcome, PollOutcome::Disconnected);
        assert!(!outcome.is_new_frame());
    }

    let mut client = TelemetryClient::new(producer.region(), config()).unwrap();
    let mut recorder = Recorder::default();
    for _ in 0..5 {
        assert_eq!(client.step(&mut recorder), ConnectionState::Waiting);
    }
    assert!(recorder.changes.is_empty());
}

#[test]
fn new_tick_is_reported_exactly_once() {
    let producer = single_buffer_producer();
    producer.set_connected(true);
    write_tick(&producer, 5);

    let mut client = TelemetryClient::new(producer.region(), config()).unwrap();
    let mut recorder = Recorder::default();

    assert_eq!(client.step(&mut recorder), ConnectionState::Connected { frame_seen: false });
    // Tick 5 only synchronises the reader.
    client.step(&mut recorder);
    assert!(recorder.ticks.is_empty());

    write_tick(&producer, 6);
    assert_eq!(client.step(&mut recorder), ConnectionState::InSession);
    for _ in 0..3 {
        assert_eq!(client.step(&mut recorder), ConnectionState::InSession);
    }

    assert_eq!(recorder.phases(), [ConnectionState::Connected { frame_seen: false }, ConnectionState::InSession]);
    assert_eq!(recorder.ticks, [6]);
    assert_eq!(recorder.speeds, [Some(6.0)]);
    assert_eq!(client.reader_stats().frames, 1);
}

#[test]
fn metadata_value_is_found_by_path() {
    let text = "WeekendInfo:\n  TrackName: Texas\n";
    assert_eq!(query_str(text, "WeekendInfo:TrackName"), Some("Texas"));
    assert_eq!(parse_string(text, "WeekendInfo:TrackName"), "Texas");
}

#[test]
fn list_entry_is_selected_by_literal() {
    let text = "\
DriverInfo:
 Drivers:
 - CarIdx: 0
   UserName: First Driver
   CarNumber: 4
 - CarIdx: 1
   UserName: Second Driver
   CarNumber: 8
";
    assert_eq!(query_str(text, "DriverInfo:Drivers:CarIdx:{1}UserName"), Some("Second Driver"));
    assert_eq!(parse_int(text, "DriverInfo:Drivers:CarIdx:{0}CarNumber"), 4);
    assert_eq!(query_str(text, "DriverInfo:Drivers:CarIdx:{2}UserName"), None);
}

#[test]
fn restart_returns_to_waiting_and_clears_resolution() {
    let producer = single_buffer_producer();
    producer.set_connected(true);
    write_tick(&producer, 999);

    let mut client = TelemetryClient::new(producer.region(), config()).unwrap();
    let mut recorder = Recorder::default();
    client.step(&mut recorder);
    client.step(&mut recorder);
    write_tick(&producer, 1000);
    assert_eq!(client.step(&mut recorder), ConnectionState::InSession);
    assert!(client.channels().is_some());

    write_tick(&producer, 3);
    assert_eq!(client.step(&mut recorder), ConnectionState::Waiting);
    assert!(client.channels().is_none());
    assert!(client.directory().is_none());
    assert_eq!(recorder.ticks, [1000]);

    let last = recorder.changes.last().unwrap();
    assert_eq!(last.event, ConnectionEvent::ProducerRestarted);
    assert_eq!(last.from, ConnectionState::InSession);
    assert_eq!(client.reader_stats().restarts, 1);

    // The producer keeps running after the restart; the client reattaches.
    assert_eq!(client.step(&mut recorder), ConnectionState::Connected { frame_seen: false });
    client.step(&mut recorder);
    write_tick(&producer, 4);
    assert_eq!(client.step(&mut recorder), ConnectionState::InSession);
    assert_eq!(recorder.ticks, [1000, 4]);
}

#[test]
fn regression_poll_never_reports_a_frame() {
    let producer = single_buffer_producer();
    producer.set_connected(true);
    write_tick(&producer, 1000);

    let mut region = producer.region();
    assert!(region.open());
    let mut reader = FrameReader::new();
    assert!(!reader.poll(&region, None).unwrap());

    write_tick(&producer, 3);
    assert!(!reader.poll(&region, None).unwrap());
    assert_eq!(reader.last_tick(), Some(3));

    write_tick(&producer, 4);
    assert!(reader.poll(&region, None).unwrap());
}
