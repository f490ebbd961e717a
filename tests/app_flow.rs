//! end-to-end flows through the app controller with a channel sink

use monitor_dashboard::app::{App, AppSettings};
use monitor_dashboard::bridge::{ChannelSink, InboundEvent, OutboundEvent};
use monitor_dashboard::controller::{Channel, DeviceClass, Display, Key, WarningForm};
use monitor_dashboard::model::RelayState;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

fn event(v: Value) -> InboundEvent {
    serde_json::from_value(v).expect("valid event")
}

fn snapshot() -> InboundEvent {
    event(json!({
        "event": "initial data",
        "data": {
            "sensors": [{
                "sensor_code": "ZGT", "description": "Greenhouse temperature", "unit": "°C",
                "value": 22.5, "read_ts": 1_700_000_000,
                "min_possible_value": -10.0, "max_possible_value": 45.0,
                "min_warning_value": 15.0, "max_warning_value": 32.0,
                "history": {"from": 1_699_990_000, "to": 1_699_990_600, "step": 300, "data": [20.0, null, 21.0]}
            }],
            "relays": [
                {"id": 1, "description": "Irrigation", "arduino_pin": 7, "state": 0, "is_initialized": true,
                 "switch_on_text": "ON", "switch_off_text": "OFF"}
            ],
            "notifications": [
                {"id": 10, "text": "temperature high", "created_ts": 1_699_999_000},
                {"id": 11, "text": "relay error", "created_ts": 1_699_999_500}
            ],
            "contacts": [{"id": 3, "name": "Operator", "phone": "+38640111222"}],
            "calls": []
        }
    }))
}

fn drain(rx: &mut UnboundedReceiver<OutboundEvent>) -> Vec<OutboundEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

fn setup(settings: AppSettings) -> (App, UnboundedReceiver<OutboundEvent>) {
    let (sink, rx) = ChannelSink::channel();
    (App::new(settings, Arc::new(sink)), rx)
}

#[tokio::test]
async fn connect_then_snapshot_renders_everything() {
    let (mut app, mut rx) = setup(AppSettings::default());
    app.connect();
    assert_eq!(drain(&mut rx), vec![OutboundEvent::Connect]);

    app.handle(snapshot(), 1_700_000_000).unwrap();
    let view = app.render(1_700_000_000);

    assert!(view.initialized);
    assert_eq!(view.sensors.len(), 1);
    assert_eq!(view.sensors[0].value, "22.5°C");
    let chart = view.sensors[0].chart.as_ref().expect("chart on large screens");
    assert_eq!(chart.points.len(), 3);
    assert_eq!(chart.points[1].1, None);

    assert_eq!(view.relays[0].description, "Irrigation (7)");
    let ids: Vec<i64> = view.notifications.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![11, 10]);
    assert!(view.notifications[0].highlight);
    assert!(!view.notifications[1].highlight);
}

#[tokio::test]
async fn optimistic_sensor_edit_then_server_confirms() {
    let (mut app, mut rx) = setup(AppSettings::default());
    app.handle(snapshot(), 1_700_000_000).unwrap();

    app.sensor_open_max_warning_edit("ZGT").unwrap();
    assert!(app.render(0).sensors[0].editing);

    let form = WarningForm {
        min_warning_value: "15".into(),
        max_warning_value: "30".into(),
        enable_warnings: true,
        observable_measurements: "5".into(),
        observable_alarming_measurements: "3".into(),
        warning_wait_minutes: "10".into(),
    };
    app.sensor_key("ZGT", Key::Enter, &form).unwrap();

    let view = app.render(0);
    assert!(!view.sensors[0].editing);
    assert_eq!(view.sensors[0].max_warning, "30°C*");
    assert_eq!(view.sensors[0].min_warning, "15°C");

    let sent = drain(&mut rx);
    assert_eq!(sent.len(), 1);
    let wire = serde_json::to_value(&sent[0]).unwrap();
    assert_eq!(wire["event"], json!("sensor update warning values"));
    assert_eq!(wire["data"]["max_warning_value"], json!(30.0));

    // the authoritative echo clears the pending marker
    app.handle(
        event(json!({"event": "sensor update warning values", "data": {
            "sensor_code": "ZGT", "max_warning_value": 30.0, "pending_max_warning_input": false
        }})),
        1_700_000_010,
    )
    .unwrap();
    assert_eq!(app.render(0).sensors[0].max_warning, "30°C");
}

#[tokio::test]
async fn live_readings_slide_the_window() {
    let settings = AppSettings {
        window: std::time::Duration::from_secs(3600),
        ..Default::default()
    };
    let (mut app, _rx) = setup(settings);
    app.handle(snapshot(), 1_700_000_000).unwrap();

    // history starts at 1_699_990_000, well outside an hour of now
    app.handle(
        event(json!({"event": "sensor update", "data": {"sensor_code": "ZGT", "value": 23.0, "read_ts": 1_700_000_060}})),
        1_700_000_060,
    )
    .unwrap();

    let chart = app.sensor_controller("ZGT").unwrap().chart().unwrap();
    assert_eq!(chart.len(), 3);
    let last = chart.points().last().copied().unwrap();
    assert_eq!(last.0, 1_700_000_060 * 1000);
    assert_eq!(app.sensor_controller("ZGT").unwrap().gauge().unwrap().value(), Some(23.0));
}

#[tokio::test]
async fn small_devices_skip_charts() {
    let settings = AppSettings {
        display: Display { charts_enabled: true, device: DeviceClass::Sm },
        ..Default::default()
    };
    let (mut app, _rx) = setup(settings);
    app.handle(snapshot(), 0).unwrap();
    let view = app.render(0);
    assert!(view.sensors[0].chart.is_none());
    assert!(view.sensors[0].gauge.is_some());
    assert!(!view.sensors[0].chart_button);
    assert!(app.sensor_toggle_chart("ZGT").is_err());
}

#[tokio::test]
async fn relay_switch_round_trip() {
    let (mut app, mut rx) = setup(AppSettings::default());
    app.handle(snapshot(), 0).unwrap();

    app.toggle_relays_locked(true).unwrap();
    assert!(app.relay_toggle_on(1).unwrap());
    assert_eq!(app.relays().get(&1).unwrap().state, RelayState::PendingOn);

    let sent = drain(&mut rx);
    let wire = serde_json::to_value(&sent[0]).unwrap();
    assert_eq!(wire["event"], json!("relay switch"));
    assert_eq!(wire["data"]["state"], json!(3));

    app.handle(event(json!({"event": "relay switch", "data": {"id": 1, "state": 2, "changed_ts": 5}})), 5)
        .unwrap();
    assert_eq!(app.relays().get(&1).unwrap().state, RelayState::On);

    app.toggle_relays_locked(false).unwrap();
    assert!(!app.relay_toggle_off(1).unwrap());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn contacts_and_calls() {
    let (mut app, mut rx) = setup(AppSettings::default());
    app.handle(snapshot(), 0).unwrap();

    app.contact_toggle(3, Channel::Calls, true).unwrap();
    app.contact_open_edit(3).unwrap();
    app.contact_confirm_edit(3, "15").unwrap();
    let view = app.render(0);
    assert!(view.contacts[0].phone_calls);
    assert_eq!(view.contacts[0].call_wait_minutes, Some(15));
    assert_eq!(view.contacts[0].name, "Operator*");

    let names: Vec<&str> = drain(&mut rx).iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["contact notification update", "contact notification update"]);

    app.handle(event(json!({"event": "call in progress", "data": {"id": "+38640111222"}})), 0)
        .unwrap();
    app.call_hang("+38640111222").unwrap();
    assert_eq!(drain(&mut rx)[0].name(), "call cancel");
    app.handle(event(json!({"event": "call ended", "data": {"id": "+38640111222"}})), 0)
        .unwrap();
    assert!(app.render(0).calls.is_empty());
}

#[tokio::test]
async fn notification_list_stays_bounded() {
    let settings = AppSettings { notification_limit: 2, ..Default::default() };
    let (mut app, _rx) = setup(settings);
    app.handle(snapshot(), 0).unwrap();

    app.handle(
        event(json!({"event": "notification update", "data": {"id": 12, "text": "new", "created_ts": 1_700_000_100}})),
        1_700_000_100,
    )
    .unwrap();

    let view = app.render(1_700_000_100);
    let ids: Vec<i64> = view.notifications.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![12, 11]);
    assert_eq!(app.tick(1_700_000_200), 2);
}
