//! End-to-end paths: discovery, wire-format ingestion, watchdog reverts and
//! telemetry publication running against the simulated bus.

use fanbus::protocol::{IngestReport, ProtocolHandler, Request};
use fanbus::{ControlMode, FanBank, SimulatedBus};

fn ingest(bank: &mut FanBank<SimulatedBus>, json: &str, now_ms: u64) -> IngestReport {
    let mut handler = ProtocolHandler::new();
    match handler.parse_request(json).unwrap() {
        Request::Config(doc) => bank.apply_config(&doc),
        Request::Command(doc) => bank.apply_command(&doc, now_ms),
    }
}

#[test]
fn test_sparse_discovery_then_partial_config() {
    // One mux at 0x70 with controllers on channels 0 and 2.
    let bus = SimulatedBus::new().with_device(0, 0).with_device(0, 2);
    let mut bank = FanBank::new(bus);
    assert_eq!(bank.discover(), 2);

    let report = ingest(
        &mut bank,
        r#"{
            "type": "config",
            "fans": [
                {"fan": 1, "externalTemperatureTimeoutSeconds": 30},
                {"fan": 5, "externalTemperatureTimeoutSeconds": 30}
            ]
        }"#,
        0,
    );

    // Fan 1 exists; fan 5 maps to an empty channel and is skipped.
    assert_eq!(report, IngestReport { applied: 1, skipped: 1 });
    assert_eq!(bank.fan_state(1).unwrap().external_temp_timeout_ms, 30_000);
    assert_eq!(bank.fan_state(3).unwrap().external_temp_timeout_ms, 90_000);
    assert!(bank.fan_state(5).is_none());
}

#[test]
fn test_external_temperature_expires_after_default_window() {
    let mut bank = FanBank::new(SimulatedBus::new().with_device(0, 0));
    bank.discover();

    let report = ingest(
        &mut bank,
        r#"{"type": "command", "fans": [{"fan": 1, "externalTemperature": 45}]}"#,
        10_000,
    );
    assert_eq!(report, IngestReport { applied: 1, skipped: 0 });
    assert_eq!(bank.fan_state(1).unwrap().mode, ControlMode::ForcedExternal);

    bank.poll_watchdog(100_000);
    assert_eq!(bank.fan_state(1).unwrap().mode, ControlMode::ForcedExternal);

    bank.poll_watchdog(100_001);
    assert_eq!(bank.fan_state(1).unwrap().mode, ControlMode::Automatic);
    assert!(!bank.driver().device(0, 0).unwrap().forced_enabled);
}

#[test]
fn test_full_lifecycle() {
    let mut bus = SimulatedBus::new()
        .with_device(0, 0)
        .with_device(0, 1)
        .with_device(2, 4);
    bus.set_reading(0, 0, 28.0, 900);
    bus.set_reading(0, 1, 32.0, 1_300);
    bus.set_reading(2, 4, 127.0, 0);

    let mut bank = FanBank::new(bus);
    assert_eq!(bank.discover(), 3);

    // Tighten the publish interval and fan 1's watchdog window.
    let report = ingest(
        &mut bank,
        r#"{
            "type": "config",
            "publishFanTelemetrySeconds": 10,
            "fans": [
                {
                    "fan": 1,
                    "externalTemperatureTimeoutSeconds": 20,
                    "fanSpeedThresholds": [
                        {"temperature": 25, "dutyCycle": 20},
                        {"temperature": 45, "dutyCycle": 80}
                    ]
                }
            ]
        }"#,
        0,
    );
    assert_eq!(report, IngestReport { applied: 2, skipped: 0 });
    assert_eq!(bank.sampler().publish_interval_ms(), 10_000);
    assert_eq!(bank.driver().device(0, 0).unwrap().curve[0], (25, 20));

    // Pin fan 2 manually, feed fan 1 an external temperature.
    let report = ingest(
        &mut bank,
        r#"{
            "type": "command",
            "fans": [
                {"fan": 1, "externalTemperature": 45},
                {"fan": 2, "dutyCycle": 65}
            ]
        }"#,
        1_000,
    );
    assert_eq!(report, IngestReport { applied: 2, skipped: 0 });

    // First publish: fan 21's sensor reads the disconnected sentinel.
    let snapshot = bank.sample_telemetry(11_001).unwrap();
    let indices: Vec<u8> = snapshot.iter().map(|t| t.fan).collect();
    assert_eq!(indices, vec![1, 2]);
    assert_eq!(snapshot[1].duty_cycle, 65);

    // Fan 1's 20 s window lapses; fan 2 stays pinned.
    bank.poll_watchdog(21_001);
    assert_eq!(bank.fan_state(1).unwrap().mode, ControlMode::Automatic);
    assert_eq!(bank.fan_state(2).unwrap().mode, ControlMode::Manual { duty_cycle: 65 });
    assert_eq!(bank.stats().watchdog_reverts, 1);

    // Second publish on the new interval.
    assert!(bank.sample_telemetry(21_001).is_none());
    assert!(bank.sample_telemetry(22_002).is_some());
    assert_eq!(bank.sampler().snapshots_published(), 2);
}

#[test]
fn test_wire_round_trip_reports_and_telemetry() {
    let mut bus = SimulatedBus::new().with_device(0, 0);
    bus.set_reading(0, 0, 30.0, 1_000);
    let mut bank = FanBank::new(bus);
    bank.discover();

    let mut handler = ProtocolHandler::new();
    let request = handler
        .parse_request(r#"{"type": "command", "fans": [{"fan": 1, "dutyCycle": 50}]}"#)
        .unwrap();
    let report = match request {
        Request::Command(doc) => bank.apply_command(&doc, 0),
        Request::Config(doc) => bank.apply_config(&doc),
    };

    assert_eq!(
        handler.serialize_report(&report).unwrap(),
        r#"{"applied":1,"skipped":0}"#
    );

    let snapshot = bank.sample_telemetry(60_001).unwrap();
    let json = handler.serialize_telemetry(&snapshot).unwrap();
    assert!(json.starts_with('['));
    assert!(json.contains("\"dutyCycle\":50"));
    assert!(json.contains("\"rpm\":1000"));
}
