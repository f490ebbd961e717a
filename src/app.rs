//! ==============================================================================
//! app.rs - dashboard composition root
//! ==============================================================================
//!
//! purpose:
//!     owns the five collections and one controller per record. inbound
//!     push events are applied to the collections, then the controller maps
//!     are reconciled against what the collections now hold.
//!
//! relationships:
//!     - uses: collection.rs, controller.rs, bridge.rs
//!     - used by: server.rs (interaction routes, inbound events)
//!     - used by: main.rs (connect, tick loop)
//!
//! lifecycle:
//!
//! ```text
//!     connect() ──► "connect" ──► server
//!                                   │
//!     handle(initial data) ◄────────┘   (applied once)
//!        │
//!        ├─► fill collections
//!        └─► sync controllers
//!
//!     handle(update) ──► upsert/remove ──► sync ──► on_record_change
//!
//! ```
//! ==============================================================================

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::bridge::{DummyReading, EventSink, InboundEvent, InitialData, OutboundEvent};
use crate::chart::DEFAULT_WINDOW;
use crate::collection::{Change, Collection, NotificationCollection, DEFAULT_NOTIFICATION_LIMIT};
use crate::controller::{
    CallController, CallView, Channel, ContactController, ContactView, Display, Key,
    NotificationController, NotificationView, RelayController, RelayView, SensorController,
    SensorView, WarningForm,
};
use crate::error::{DashboardError, Result};
use crate::model::{to_patch, Call, Contact, Patch, Record, Relay, Sensor};

/// knobs the app is built with, taken from the config file
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub display: Display,
    pub window: Duration,
    pub notification_limit: usize,
    pub notification_refresh: Duration,
    pub debug: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            display: Display::default(),
            window: DEFAULT_WINDOW,
            notification_limit: DEFAULT_NOTIFICATION_LIMIT,
            notification_refresh: Duration::from_secs(30),
            debug: false,
        }
    }
}

/// the whole dashboard as the renderer sees it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub initialized: bool,
    pub debug: bool,
    pub relays_unlocked: bool,
    pub sensors: Vec<SensorView>,
    pub relays: Vec<RelayView>,
    /// newest first
    pub notifications: Vec<NotificationView>,
    pub contacts: Vec<ContactView>,
    pub calls: Vec<CallView>,
}

/// raw collection contents
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub sensors: Collection<Sensor>,
    pub relays: Collection<Relay>,
    pub notifications: NotificationCollection,
    pub contacts: Collection<Contact>,
    pub calls: Collection<Call>,
}

fn unknown(kind: &'static str, key: impl ToString) -> DashboardError {
    DashboardError::UnknownRecord { kind, key: key.to_string() }
}

pub struct App {
    settings: AppSettings,
    sink: Arc<dyn EventSink>,
    initialized: bool,
    relays_unlocked: bool,
    /// unix seconds of the last event or tick
    clock: i64,

    sensors: Collection<Sensor>,
    relays: Collection<Relay>,
    notifications: NotificationCollection,
    contacts: Collection<Contact>,
    calls: Collection<Call>,

    sensor_views: HashMap<String, SensorController>,
    relay_views: HashMap<i64, RelayController>,
    notification_views: HashMap<i64, NotificationController>,
    contact_views: HashMap<i64, ContactController>,
    call_views: HashMap<String, CallController>,
}

impl App {
    pub fn new(settings: AppSettings, sink: Arc<dyn EventSink>) -> Self {
        let notifications = NotificationCollection::with_limit(settings.notification_limit);
        Self {
            settings,
            sink,
            initialized: false,
            relays_unlocked: false,
            clock: 0,
            sensors: Collection::new(),
            relays: Collection::new(),
            notifications,
            contacts: Collection::new(),
            calls: Collection::new(),
            sensor_views: HashMap::new(),
            relay_views: HashMap::new(),
            notification_views: HashMap::new(),
            contact_views: HashMap::new(),
            call_views: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn sensors(&self) -> &Collection<Sensor> {
        &self.sensors
    }

    pub fn relays(&self) -> &Collection<Relay> {
        &self.relays
    }

    pub fn notifications(&self) -> &NotificationCollection {
        &self.notifications
    }

    pub fn contacts(&self) -> &Collection<Contact> {
        &self.contacts
    }

    pub fn calls(&self) -> &Collection<Call> {
        &self.calls
    }

    pub fn sensor_controller(&self, code: &str) -> Option<&SensorController> {
        self.sensor_views.get(code)
    }

    pub fn notification_controllers(&self) -> usize {
        self.notification_views.len()
    }

    /// ask the server for its initial data
    pub fn connect(&self) {
        tracing::info!("[APP] connecting, requesting initial data");
        self.sink.emit(OutboundEvent::Connect);
    }

    // ==========================================================================
    // inbound events
    // ==========================================================================

    pub fn handle(&mut self, event: InboundEvent, now: i64) -> Result<()> {
        self.clock = now;
        match event {
            InboundEvent::InitialData(data) => {
                if self.initialized {
                    tracing::debug!("[APP] initial data already applied, ignoring repeat");
                    return Ok(());
                }
                self.apply_initial(data);
                Ok(())
            }
            other if !self.initialized => {
                tracing::debug!("[APP] `{}` before initial data, dropped", other.name());
                Ok(())
            }
            InboundEvent::SensorUpdate(patch) | InboundEvent::SensorWarningValues(patch) => {
                let change = self.sensors.upsert(&patch)?;
                self.sync_sensors();
                if let Change::Updated(code) = change {
                    self.sensor_changed(&code);
                }
                Ok(())
            }
            InboundEvent::RelayUpdate(patch) | InboundEvent::RelaySwitch(patch) => {
                if let Change::Added(id) = self.relays.upsert(&patch)? {
                    // late arrivals follow the current lock state
                    let editing = serde_json::json!({"id": id, "editing": self.relays_unlocked});
                    self.relays.set(&to_patch(Relay::KIND, editing)?)?;
                }
                self.sync_relays();
                Ok(())
            }
            InboundEvent::NotificationUpdate(patch) => {
                for change in self.notifications.push(&patch)? {
                    tracing::debug!("[APP] notification {:?}", change);
                }
                self.sync_notifications();
                Ok(())
            }
            InboundEvent::ContactUpdate(patch) => {
                self.contacts.upsert(&patch)?;
                self.sync_contacts();
                Ok(())
            }
            InboundEvent::CallInProgress(patch) => {
                self.calls.upsert(&patch)?;
                self.sync_calls();
                Ok(())
            }
            InboundEvent::CallEnded(patch) => {
                let id = Call::patch_key(&patch)?;
                if self.calls.remove(&id).is_none() {
                    tracing::debug!("[APP] call {} ended but was not listed", id);
                }
                self.sync_calls();
                Ok(())
            }
        }
    }

    /// a bad record in the snapshot is skipped, the rest still loads
    fn apply_initial(&mut self, data: InitialData) {
        fn load(kind: &str, patches: &[Patch], mut push: impl FnMut(&Patch) -> Result<()>) -> usize {
            let mut loaded = 0;
            for patch in patches {
                match push(patch) {
                    Ok(()) => loaded += 1,
                    Err(e) => tracing::warn!("[APP] ⚠ skipping {} in initial data: {}", kind, e),
                }
            }
            loaded
        }

        let sensors = load("sensor", &data.sensors, |p| self.sensors.push(p).map(drop));
        let relays = load("relay", &data.relays, |p| self.relays.push(p).map(drop));
        let notifications = load("notification", &data.notifications, |p| self.notifications.push(p).map(drop));
        let contacts = load("contact", &data.contacts, |p| self.contacts.push(p).map(drop));
        let calls = load("call", &data.calls, |p| self.calls.push(p).map(drop));

        self.initialized = true;
        self.sync_all();
        tracing::info!(
            "[APP] ✓ initial data: {} sensors, {} relays, {} notifications, {} contacts, {} calls",
            sensors,
            relays,
            notifications,
            contacts,
            calls
        );
    }

    // ==========================================================================
    // controller sync
    // ==========================================================================

    fn sync_all(&mut self) {
        self.sync_sensors();
        self.sync_relays();
        self.sync_notifications();
        self.sync_contacts();
        self.sync_calls();
    }

    fn sync_sensors(&mut self) {
        let codes = self.sensors.keys();
        self.sensor_views.retain(|code, _| codes.contains(code));
        for code in codes {
            if self.sensor_views.contains_key(&code) {
                continue;
            }
            match SensorController::new(&code, self.settings.display, self.settings.window, &mut self.sensors) {
                Ok(ctl) => {
                    self.sensor_views.insert(code, ctl);
                }
                Err(e) => tracing::warn!("[APP] ⚠ no controller for sensor {}: {}", code, e),
            }
        }
    }

    fn sync_relays(&mut self) {
        let ids = self.relays.keys();
        self.relay_views.retain(|id, _| ids.contains(id));
        for id in ids {
            self.relay_views.entry(id).or_insert_with(|| RelayController::new(id));
        }
    }

    fn sync_notifications(&mut self) {
        let ids = self.notifications.keys();
        self.notification_views.retain(|id, _| ids.contains(id));
        let refresh = self.settings.notification_refresh;
        for id in ids {
            self.notification_views
                .entry(id)
                .or_insert_with(|| NotificationController::new(id, refresh));
        }
    }

    fn sync_contacts(&mut self) {
        let ids = self.contacts.keys();
        self.contact_views.retain(|id, _| ids.contains(id));
        for id in ids {
            self.contact_views.entry(id).or_insert_with(|| ContactController::new(id));
        }
    }

    fn sync_calls(&mut self) {
        let ids = self.calls.keys();
        self.call_views.retain(|id, _| ids.contains(id));
        for id in ids {
            self.call_views
                .entry(id.clone())
                .or_insert_with(|| CallController::new(&id));
        }
    }

    /// let the sensor's chart and gauge catch up with its record
    fn sensor_changed(&mut self, code: &str) {
        if let (Some(ctl), Some(sensor)) = (self.sensor_views.get_mut(code), self.sensors.get(&code.to_string())) {
            ctl.on_record_change(sensor, self.clock);
        }
    }

    // ==========================================================================
    // sensor interactions
    // ==========================================================================

    pub fn sensor_open_edit(&mut self, code: &str) -> Result<()> {
        let ctl = self.sensor_views.get(code).ok_or_else(|| unknown(Sensor::KIND, code))?;
        ctl.open_edit(&mut self.sensors)
    }

    pub fn sensor_open_min_warning_edit(&mut self, code: &str) -> Result<()> {
        let ctl = self.sensor_views.get(code).ok_or_else(|| unknown(Sensor::KIND, code))?;
        ctl.open_min_warning_value_edit(&mut self.sensors)
    }

    pub fn sensor_open_max_warning_edit(&mut self, code: &str) -> Result<()> {
        let ctl = self.sensor_views.get(code).ok_or_else(|| unknown(Sensor::KIND, code))?;
        ctl.open_max_warning_value_edit(&mut self.sensors)
    }

    pub fn sensor_cancel_edit(&mut self, code: &str) -> Result<()> {
        let ctl = self.sensor_views.get(code).ok_or_else(|| unknown(Sensor::KIND, code))?;
        ctl.cancel_edit(&mut self.sensors)
    }

    pub fn sensor_key(&mut self, code: &str, key: Key, form: &WarningForm) -> Result<()> {
        let ctl = self.sensor_views.get(code).ok_or_else(|| unknown(Sensor::KIND, code))?;
        ctl.key(key, form, &mut self.sensors, self.sink.as_ref())?;
        self.sensor_changed(code);
        Ok(())
    }

    pub fn sensor_confirm_edit(&mut self, code: &str, form: &WarningForm) -> Result<()> {
        let ctl = self.sensor_views.get(code).ok_or_else(|| unknown(Sensor::KIND, code))?;
        ctl.confirm_edit(form, &mut self.sensors, self.sink.as_ref())?;
        self.sensor_changed(code);
        Ok(())
    }

    pub fn sensor_toggle_warnings(&mut self, code: &str) -> Result<()> {
        let ctl = self.sensor_views.get(code).ok_or_else(|| unknown(Sensor::KIND, code))?;
        ctl.toggle_warnings(&mut self.sensors, self.sink.as_ref())
    }

    pub fn sensor_toggle_gauge(&mut self, code: &str) -> Result<()> {
        let ctl = self.sensor_views.get_mut(code).ok_or_else(|| unknown(Sensor::KIND, code))?;
        ctl.toggle_display_gauge(&mut self.sensors)
    }

    pub fn sensor_toggle_chart(&mut self, code: &str) -> Result<()> {
        let ctl = self.sensor_views.get_mut(code).ok_or_else(|| unknown(Sensor::KIND, code))?;
        ctl.toggle_display_chart(&mut self.sensors)
    }

    /// force a reading on the server; debug builds of the server only
    pub fn apply_dummy(&mut self, code: &str, value: Option<f64>) -> Result<()> {
        if !self.settings.debug {
            return Err(DashboardError::DebugDisabled);
        }
        let sensor = self.sensors.get(&code.to_string()).ok_or_else(|| unknown(Sensor::KIND, code))?;
        tracing::info!("[APP] applying dummy value {:?} to {}", value, code);
        self.sink.emit(OutboundEvent::ApplyDummy(DummyReading {
            sensor_code: sensor.sensor_code.clone(),
            value,
            min_possible_value: sensor.min_possible_value,
            max_possible_value: sensor.max_possible_value,
        }));
        Ok(())
    }

    // ==========================================================================
    // relay interactions
    // ==========================================================================

    /// lock or unlock every relay for switching
    pub fn toggle_relays_locked(&mut self, unlocked: bool) -> Result<()> {
        for id in self.relays.keys() {
            self.relays.set(&to_patch(Relay::KIND, serde_json::json!({"id": id, "editing": unlocked}))?)?;
        }
        self.relays_unlocked = unlocked;
        tracing::info!("[APP] relays {}", if unlocked { "unlocked" } else { "locked" });
        Ok(())
    }

    /// false when the relay is locked
    pub fn relay_toggle_on(&mut self, id: i64) -> Result<bool> {
        let ctl = self.relay_views.get(&id).ok_or_else(|| unknown(Relay::KIND, id))?;
        ctl.toggle_on(&mut self.relays, self.sink.as_ref())
    }

    pub fn relay_toggle_off(&mut self, id: i64) -> Result<bool> {
        let ctl = self.relay_views.get(&id).ok_or_else(|| unknown(Relay::KIND, id))?;
        ctl.toggle_off(&mut self.relays, self.sink.as_ref())
    }

    pub fn relay_refresh_state(&mut self, id: i64) -> Result<()> {
        let ctl = self.relay_views.get(&id).ok_or_else(|| unknown(Relay::KIND, id))?;
        ctl.refresh_state(&mut self.relays, self.sink.as_ref())
    }

    // ==========================================================================
    // contact and call interactions
    // ==========================================================================

    pub fn contact_toggle(&mut self, id: i64, channel: Channel, on: bool) -> Result<()> {
        let ctl = self.contact_views.get(&id).ok_or_else(|| unknown(Contact::KIND, id))?;
        ctl.set_toggle(channel, on, &mut self.contacts, self.sink.as_ref())
    }

    pub fn contact_open_edit(&mut self, id: i64) -> Result<()> {
        let ctl = self.contact_views.get(&id).ok_or_else(|| unknown(Contact::KIND, id))?;
        ctl.open_edit(&mut self.contacts)
    }

    pub fn contact_cancel_edit(&mut self, id: i64) -> Result<()> {
        let ctl = self.contact_views.get(&id).ok_or_else(|| unknown(Contact::KIND, id))?;
        ctl.cancel_edit(&mut self.contacts)
    }

    pub fn contact_key(&mut self, id: i64, key: Key, call_wait_minutes: &str) -> Result<()> {
        let ctl = self.contact_views.get(&id).ok_or_else(|| unknown(Contact::KIND, id))?;
        ctl.key(key, call_wait_minutes, &mut self.contacts, self.sink.as_ref())
    }

    pub fn contact_confirm_edit(&mut self, id: i64, call_wait_minutes: &str) -> Result<()> {
        let ctl = self.contact_views.get(&id).ok_or_else(|| unknown(Contact::KIND, id))?;
        ctl.confirm_edit(call_wait_minutes, &mut self.contacts, self.sink.as_ref())
    }

    pub fn call_hang(&mut self, id: &str) -> Result<()> {
        let ctl = self.call_views.get(id).ok_or_else(|| unknown(Call::KIND, id))?;
        ctl.hang(&self.calls, self.sink.as_ref())
    }

    // ==========================================================================
    // timers and rendering
    // ==========================================================================

    /// refresh notification timers; returns how many are still live
    pub fn tick(&mut self, now: i64) -> usize {
        self.clock = now;
        let notifications = &self.notifications;
        self.notification_views.retain(|id, ctl| {
            let live = ctl.tick(notifications, now);
            if !live {
                tracing::debug!("[APP] notification {} gone, dropping its timer", id);
            }
            live
        });
        self.notification_views.len()
    }

    pub fn render(&self, now: i64) -> DashboardView {
        let sensors = self
            .sensors
            .all()
            .iter()
            .filter_map(|s| self.sensor_views.get(&s.sensor_code).map(|ctl| ctl.render(s)))
            .collect();
        let relays = self
            .relays
            .all()
            .iter()
            .filter_map(|r| self.relay_views.get(&r.id).map(|ctl| ctl.render(r)))
            .collect();
        let notifications = self
            .notifications
            .recent()
            .into_iter()
            .filter_map(|n| self.notification_views.get(&n.id).map(|ctl| ctl.render(n, now)))
            .collect();
        let contacts = self
            .contacts
            .all()
            .iter()
            .filter_map(|c| self.contact_views.get(&c.id).map(|ctl| ctl.render(c)))
            .collect();
        let calls = self
            .calls
            .all()
            .iter()
            .filter_map(|c| self.call_views.get(&c.id).map(|ctl| ctl.render(c)))
            .collect();

        DashboardView {
            initialized: self.initialized,
            debug: self.settings.debug,
            relays_unlocked: self.relays_unlocked,
            sensors,
            relays,
            notifications,
            contacts,
            calls,
        }
    }

    pub fn state(&self) -> StateSnapshot {
        StateSnapshot {
            sensors: self.sensors.clone(),
            relays: self.relays.clone(),
            notifications: self.notifications.clone(),
            contacts: self.contacts.clone(),
            calls: self.calls.clone(),
        }
    }
}
