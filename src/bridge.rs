//! ==============================================================================
//! bridge.rs - push-event vocabulary and sinks
//! ==============================================================================
//!
//! purpose:
//!     names every event that crosses between the dashboard and the server
//!     and fixes its json shape: `{"event": "<name>", "data": <payload>}`.
//!
//! ```text
//!     inbound  (server -> dashboard): initial data, incremental updates
//!     outbound (dashboard -> server): user commands
//! ```
//!
//! relationships:
//!     - used by: controller.rs (emits outbound events through EventSink)
//!     - used by: app.rs (consumes InboundEvent)
//!     - used by: server.rs (POST /api/events decodes InboundEvent)
//!     - used by: main.rs (HttpForwarder drains the ChannelSink)
//!
//! ==============================================================================

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::chart::HistoryData;
use crate::model::{Call, Patch, Relay, Sensor};

// ==============================================================================
// events
// ==============================================================================

/// full state pushed once after connecting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialData {
    pub sensors: Vec<Patch>,
    pub relays: Vec<Patch>,
    pub notifications: Vec<Patch>,
    pub contacts: Vec<Patch>,
    pub calls: Vec<Patch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    #[serde(rename = "initial data")]
    InitialData(InitialData),
    #[serde(rename = "sensor update")]
    SensorUpdate(Patch),
    #[serde(rename = "sensor update warning values")]
    SensorWarningValues(Patch),
    #[serde(rename = "relay update")]
    RelayUpdate(Patch),
    #[serde(rename = "relay switch")]
    RelaySwitch(Patch),
    #[serde(rename = "notification update")]
    NotificationUpdate(Patch),
    #[serde(rename = "contact update")]
    ContactUpdate(Patch),
    #[serde(rename = "call in progress")]
    CallInProgress(Patch),
    #[serde(rename = "call ended")]
    CallEnded(Patch),
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::InitialData(_) => "initial data",
            InboundEvent::SensorUpdate(_) => "sensor update",
            InboundEvent::SensorWarningValues(_) => "sensor update warning values",
            InboundEvent::RelayUpdate(_) => "relay update",
            InboundEvent::RelaySwitch(_) => "relay switch",
            InboundEvent::NotificationUpdate(_) => "notification update",
            InboundEvent::ContactUpdate(_) => "contact update",
            InboundEvent::CallInProgress(_) => "call in progress",
            InboundEvent::CallEnded(_) => "call ended",
        }
    }
}

/// forced reading for a sensor, only honoured by servers in debug mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DummyReading {
    pub sensor_code: String,
    pub value: Option<f64>,
    pub min_possible_value: Option<f64>,
    pub max_possible_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    /// asks the server for `initial data`
    #[serde(rename = "connect")]
    Connect,
    #[serde(rename = "sensor update warning values")]
    SensorWarningValues(Sensor),
    #[serde(rename = "relay switch")]
    RelaySwitch(Relay),
    #[serde(rename = "relay refresh state")]
    RelayRefreshState(Relay),
    #[serde(rename = "contact notification update")]
    ContactUpdate(Patch),
    #[serde(rename = "call cancel")]
    CallCancel(Call),
    #[serde(rename = "apply dummy")]
    ApplyDummy(DummyReading),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::Connect => "connect",
            OutboundEvent::SensorWarningValues(_) => "sensor update warning values",
            OutboundEvent::RelaySwitch(_) => "relay switch",
            OutboundEvent::RelayRefreshState(_) => "relay refresh state",
            OutboundEvent::ContactUpdate(_) => "contact notification update",
            OutboundEvent::CallCancel(_) => "call cancel",
            OutboundEvent::ApplyDummy(_) => "apply dummy",
        }
    }
}

// ==============================================================================
// sinks
// ==============================================================================

/// where controllers send their commands
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OutboundEvent);
}

/// in-process sink feeding an unbounded tokio channel
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: OutboundEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            tracing::warn!("[BRIDGE] outbound channel closed, dropping `{}`", name);
        } else {
            tracing::debug!("[BRIDGE] queued `{}`", name);
        }
    }
}

/// keeps everything emitted; for tests and dry runs
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<OutboundEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// drain what was recorded so far
    pub fn take(&self) -> Vec<OutboundEvent> {
        match self.events.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: OutboundEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

// ==============================================================================
// http forwarding
// ==============================================================================

/// drains the outbound channel and POSTs each event to the server
///
/// a failed delivery is logged and skipped; the server's next push will
/// reconcile whatever the optimistic update assumed.
pub struct HttpForwarder {
    client: reqwest::Client,
    events_url: String,
}

impl HttpForwarder {
    pub fn new(client: reqwest::Client, events_url: impl Into<String>) -> Self {
        Self { client, events_url: events_url.into() }
    }

    pub async fn send(&self, event: &OutboundEvent) -> Result<()> {
        let resp = self
            .client
            .post(&self.events_url)
            .json(event)
            .send()
            .await
            .with_context(|| format!("failed to deliver `{}`", event.name()))?;
        resp.error_for_status()
            .with_context(|| format!("server rejected `{}`", event.name()))?;
        Ok(())
    }

    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<OutboundEvent>) {
        while let Some(event) = rx.recv().await {
            match self.send(&event).await {
                Ok(()) => tracing::debug!("[BRIDGE] sent `{}`", event.name()),
                Err(e) => tracing::warn!("[BRIDGE] ⚠ {:#}", e),
            }
        }
        tracing::info!("[BRIDGE] outbound channel closed, forwarder stopping");
    }
}

/// fetch the long-term history document
pub async fn fetch_history(client: &reqwest::Client, url: &str) -> Result<HistoryData> {
    let data = client
        .get(url)
        .send()
        .await
        .context("history request failed")?
        .error_for_status()
        .context("history request rejected")?
        .json::<HistoryData>()
        .await
        .context("history document did not decode")?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inbound_wire_shape() {
        let ev: InboundEvent = serde_json::from_value(json!({
            "event": "relay switch",
            "data": {"id": 3, "state": 2, "changed_ts": 1700000000}
        }))
        .unwrap();
        match ev {
            InboundEvent::RelaySwitch(p) => assert_eq!(p["id"], json!(3)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn initial_data_tolerates_missing_lists() {
        let ev: InboundEvent = serde_json::from_value(json!({
            "event": "initial data",
            "data": {"sensors": [{"sensor_code": "ZGT"}]}
        }))
        .unwrap();
        match ev {
            InboundEvent::InitialData(d) => {
                assert_eq!(d.sensors.len(), 1);
                assert!(d.calls.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn outbound_wire_shape() {
        let v = serde_json::to_value(OutboundEvent::CallCancel(Call { id: "+123".into() })).unwrap();
        assert_eq!(v, json!({"event": "call cancel", "data": {"id": "+123"}}));
        let v = serde_json::to_value(OutboundEvent::Connect).unwrap();
        assert_eq!(v["event"], json!("connect"));
    }

    #[test]
    fn unknown_event_is_rejected() {
        let r = serde_json::from_value::<InboundEvent>(json!({"event": "reboot", "data": {}}));
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.emit(OutboundEvent::Connect);
        sink.emit(OutboundEvent::CallCancel(Call { id: "1".into() }));
        assert_eq!(rx.recv().await, Some(OutboundEvent::Connect));
        assert_eq!(rx.recv().await.map(|e| e.name()), Some("call cancel"));
    }

    #[test]
    fn channel_sink_survives_closed_receiver() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        sink.emit(OutboundEvent::Connect);
    }

    #[test]
    fn recording_sink_drains() {
        let sink = RecordingSink::new();
        sink.emit(OutboundEvent::Connect);
        assert_eq!(sink.take().len(), 1);
        assert!(sink.take().is_empty());
    }
}
