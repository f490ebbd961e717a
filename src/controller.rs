//! ==============================================================================
//! controller.rs - per-record view controllers
//! ==============================================================================
//!
//! purpose:
//!     one controller per displayed record. a controller:
//!     - turns user interactions into an optimistic collection write
//!       followed by an outbound event
//!     - reacts to record changes (sensors feed their chart and gauge)
//!     - renders its record into a view model
//!
//! relationships:
//!     - uses: collection.rs (writes), bridge.rs (EventSink), chart.rs
//!     - used by: app.rs (creates/drops controllers as records come and go)
//!
//! write-then-emit:
//!
//! ```text
//!     user edit ──► collection.set(patch) ──► sink.emit(event)
//!                        (optimistic)              │
//!                                                  ▼
//!     collection.upsert(server patch) ◄── authoritative push
//! ```
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::bridge::{EventSink, OutboundEvent};
use crate::chart::{to_millis, ChartFrame, GaugeFrame, SensorChart, SensorGauge};
use crate::collection::{Collection, NotificationCollection};
use crate::error::{DashboardError, Result};
use crate::format::{format_date, format_value, time_ago};
use crate::model::{to_patch, Call, Contact, Notification, Record, Relay, RelayState, Sensor};

fn record<'a, R: Record>(collection: &'a Collection<R>, key: &R::Key) -> Result<&'a R> {
    collection.get(key).ok_or_else(|| DashboardError::UnknownRecord {
        kind: R::KIND,
        key: key.to_string(),
    })
}

fn parse_float(input: &str) -> Option<f64> {
    input.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_int(input: &str) -> Option<i64> {
    input.trim().parse::<i64>().ok()
}

/// keys an edit form reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Enter,
    Escape,
    Other,
}

// ==============================================================================
// display capabilities
// ==============================================================================

/// viewport size class of the device showing the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Xs,
    Sm,
    Md,
    #[default]
    Lg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Display {
    pub charts_enabled: bool,
    pub device: DeviceClass,
}

impl Default for Display {
    fn default() -> Self {
        Self { charts_enabled: true, device: DeviceClass::Lg }
    }
}

impl Display {
    /// gauges are hidden on the smallest screens
    pub fn renders_gauge(&self) -> bool {
        self.charts_enabled && self.device != DeviceClass::Xs
    }

    /// charts need at least a medium screen
    pub fn renders_chart(&self) -> bool {
        self.charts_enabled && !matches!(self.device, DeviceClass::Xs | DeviceClass::Sm)
    }
}

// ==============================================================================
// sensor
// ==============================================================================

/// raw contents of the warning-values form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarningForm {
    pub min_warning_value: String,
    pub max_warning_value: String,
    pub enable_warnings: bool,
    pub observable_measurements: String,
    pub observable_alarming_measurements: String,
    pub warning_wait_minutes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelStatus {
    Default,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorView {
    pub sensor_code: String,
    pub description: String,
    pub panel: PanelStatus,
    pub value: String,
    pub read_ts: String,
    pub min_warning: String,
    pub max_warning: String,
    pub min_warning_input: Option<f64>,
    pub max_warning_input: Option<f64>,
    pub editing: bool,
    pub enable_warnings: bool,
    pub observable_measurements: Option<i64>,
    pub observable_alarming_measurements: Option<i64>,
    pub warning_wait_minutes: Option<i64>,
    pub gauge_button: bool,
    pub chart_button: bool,
    pub show_gauge: bool,
    pub show_chart: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gauge: Option<GaugeFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartFrame>,
}

pub struct SensorController {
    code: String,
    display: Display,
    gauge: Option<SensorGauge>,
    chart: Option<SensorChart>,
    last_reading: Option<(i64, f64)>,
}

impl SensorController {
    /// bind a controller to a sensor already in `sensors`
    pub fn new(code: &str, display: Display, window: Duration, sensors: &mut Collection<Sensor>) -> Result<Self> {
        let sensor = record(sensors, &code.to_string())?;
        let gauge = display.renders_gauge().then(|| SensorGauge::new(sensor));
        let chart = display.renders_chart().then(|| SensorChart::new(sensor, window));

        sensors.set(&to_patch(
            Sensor::KIND,
            json!({
                "sensor_code": code,
                "show_gauge": gauge.is_some(),
                "show_chart": chart.is_some(),
            }),
        )?)?;

        Ok(Self {
            code: code.to_string(),
            display,
            gauge,
            chart,
            last_reading: None,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn gauge(&self) -> Option<&SensorGauge> {
        self.gauge.as_ref()
    }

    pub fn chart(&self) -> Option<&SensorChart> {
        self.chart.as_ref()
    }

    /// feed a changed record into the chart and gauge
    ///
    /// a point is added only when the (read_ts, value) pair moved; threshold
    /// edits re-shape the axes either way.
    pub fn on_record_change(&mut self, sensor: &Sensor, now: i64) {
        let thresholds = sensor.thresholds();

        match sensor.reading() {
            Some(reading) if self.last_reading == Some(reading) => {}
            Some((read_ts, _)) if to_millis(read_ts).is_none() => {
                // unplottable, keep the gauge and chart on the previous reading
                tracing::warn!("[CHART] ⚠ {}: read_ts {} out of range, reading ignored", self.code, read_ts);
            }
            Some((read_ts, value)) => {
                self.last_reading = Some((read_ts, value));
                if let Some(gauge) = self.gauge.as_mut() {
                    gauge.add_point(value, &thresholds);
                }
                if let Some(chart) = self.chart.as_mut() {
                    chart.add_point(read_ts, Some(value), &thresholds, now);
                }
            }
            None => {}
        }

        if let Some(gauge) = self.gauge.as_mut() {
            gauge.update_plot_bands(&thresholds);
        }
        if let Some(chart) = self.chart.as_mut() {
            chart.update_plot_bands(&thresholds);
        }
    }

    fn write(&self, sensors: &mut Collection<Sensor>, mut fields: serde_json::Value) -> Result<()> {
        fields["sensor_code"] = json!(self.code);
        sensors.set(&to_patch(Sensor::KIND, fields)?)?;
        Ok(())
    }

    fn emit_warning_values(&self, sensors: &Collection<Sensor>, sink: &dyn EventSink) -> Result<()> {
        let sensor = record(sensors, &self.code)?;
        sink.emit(OutboundEvent::SensorWarningValues(sensor.clone()));
        Ok(())
    }

    pub fn open_edit(&self, sensors: &mut Collection<Sensor>) -> Result<()> {
        self.write(sensors, json!({"editing": true}))
    }

    pub fn open_min_warning_value_edit(&self, sensors: &mut Collection<Sensor>) -> Result<()> {
        self.open_edit(sensors)
    }

    pub fn open_max_warning_value_edit(&self, sensors: &mut Collection<Sensor>) -> Result<()> {
        self.open_edit(sensors)
    }

    pub fn cancel_edit(&self, sensors: &mut Collection<Sensor>) -> Result<()> {
        self.write(sensors, json!({"editing": false}))
    }

    /// enter confirms the form, escape drops it
    pub fn key(&self, key: Key, form: &WarningForm, sensors: &mut Collection<Sensor>, sink: &dyn EventSink) -> Result<()> {
        match key {
            Key::Enter => self.confirm_edit(form, sensors, sink),
            Key::Escape => self.cancel_edit(sensors),
            Key::Other => Ok(()),
        }
    }

    pub fn confirm_edit(&self, form: &WarningForm, sensors: &mut Collection<Sensor>, sink: &dyn EventSink) -> Result<()> {
        let pending_min = parse_float(&form.min_warning_value);
        let pending_max = parse_float(&form.max_warning_value);

        let current = record(sensors, &self.code)?;
        let mut flags = json!({"editing": false});
        if current.min_warning_value != pending_min {
            flags["pending_min_warning_input"] = json!(true);
        }
        if current.max_warning_value != pending_max {
            flags["pending_max_warning_input"] = json!(true);
        }
        self.write(sensors, flags)?;

        self.write(
            sensors,
            json!({
                "min_warning_value": pending_min,
                "max_warning_value": pending_max,
                "enable_warnings": form.enable_warnings,
                "observable_measurements": parse_int(&form.observable_measurements),
                "observable_alarming_measurements": parse_int(&form.observable_alarming_measurements),
                "warning_wait_minutes": parse_int(&form.warning_wait_minutes),
            }),
        )?;
        self.emit_warning_values(sensors, sink)
    }

    pub fn toggle_warnings(&self, sensors: &mut Collection<Sensor>, sink: &dyn EventSink) -> Result<()> {
        let enabled = record(sensors, &self.code)?.enable_warnings;
        self.write(sensors, json!({"enable_warnings": !enabled}))?;
        self.emit_warning_values(sensors, sink)
    }

    pub fn toggle_display_gauge(&mut self, sensors: &mut Collection<Sensor>) -> Result<()> {
        let show = !record(sensors, &self.code)?.show_gauge;
        let gauge = self.gauge.as_mut().ok_or(DashboardError::NotRendered("gauge"))?;
        if show {
            gauge.surface.enable_redraw();
        } else {
            gauge.surface.disable_redraw();
        }
        self.write(sensors, json!({"show_gauge": show}))
    }

    pub fn toggle_display_chart(&mut self, sensors: &mut Collection<Sensor>) -> Result<()> {
        let show = !record(sensors, &self.code)?.show_chart;
        let chart = self.chart.as_mut().ok_or(DashboardError::NotRendered("chart"))?;
        if show {
            chart.surface.enable_redraw();
        } else {
            chart.surface.disable_redraw();
        }
        chart.surface.resize();
        self.write(sensors, json!({"show_chart": show}))
    }

    pub fn render(&self, sensor: &Sensor) -> SensorView {
        let panel = if sensor.has_notification {
            PanelStatus::Danger
        } else if sensor.has_warning {
            PanelStatus::Warning
        } else {
            PanelStatus::Default
        };
        let pending = |flag: bool| if flag { "*" } else { "" };

        let show_gauge = self.display.renders_gauge() && sensor.show_gauge;
        let show_chart = self.display.renders_chart() && sensor.show_chart;

        SensorView {
            sensor_code: sensor.sensor_code.clone(),
            description: sensor.description.clone(),
            panel,
            value: format_value(sensor.value, &sensor.unit),
            read_ts: format_date(sensor.read_ts),
            min_warning: format!(
                "{}{}",
                format_value(sensor.min_warning_value, &sensor.unit),
                pending(sensor.pending_min_warning_input)
            ),
            max_warning: format!(
                "{}{}",
                format_value(sensor.max_warning_value, &sensor.unit),
                pending(sensor.pending_max_warning_input)
            ),
            min_warning_input: sensor.min_warning_value,
            max_warning_input: sensor.max_warning_value,
            editing: sensor.editing,
            enable_warnings: sensor.enable_warnings,
            observable_measurements: sensor.observable_measurements,
            observable_alarming_measurements: sensor.observable_alarming_measurements,
            warning_wait_minutes: sensor.warning_wait_minutes,
            gauge_button: self.display.renders_gauge(),
            chart_button: self.display.renders_chart(),
            show_gauge,
            show_chart,
            gauge: self.gauge.as_ref().filter(|_| show_gauge).map(SensorGauge::frame),
            chart: self.chart.as_ref().filter(|_| show_chart).map(SensorChart::frame),
        }
    }
}

// ==============================================================================
// relay
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonStyle {
    Default,
    Active,
    Pending,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchButton {
    pub text: String,
    pub style: ButtonStyle,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayView {
    pub id: i64,
    pub description: String,
    pub changed_ts: String,
    pub refresh: ButtonStyle,
    pub switch_on: SwitchButton,
    pub switch_off: SwitchButton,
    pub unlocked: bool,
}

fn switch_style(state: RelayState, active: RelayState, pending: RelayState) -> ButtonStyle {
    match state {
        RelayState::Error => ButtonStyle::Danger,
        s if s == active => ButtonStyle::Active,
        s if s == pending => ButtonStyle::Pending,
        _ => ButtonStyle::Default,
    }
}

pub struct RelayController {
    id: i64,
}

impl RelayController {
    pub fn new(id: i64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn toggle_on(&self, relays: &mut Collection<Relay>, sink: &dyn EventSink) -> Result<bool> {
        self.toggle_switch(RelayState::PendingOn, relays, sink)
    }

    pub fn toggle_off(&self, relays: &mut Collection<Relay>, sink: &dyn EventSink) -> Result<bool> {
        self.toggle_switch(RelayState::PendingOff, relays, sink)
    }

    /// returns false when the relay is locked and nothing was sent
    fn toggle_switch(&self, state: RelayState, relays: &mut Collection<Relay>, sink: &dyn EventSink) -> Result<bool> {
        if !record(relays, &self.id)?.editing {
            tracing::debug!("[RELAY] {} is locked, ignoring switch", self.id);
            return Ok(false);
        }
        relays.upsert(&to_patch(Relay::KIND, json!({"id": self.id, "state": state}))?)?;
        sink.emit(OutboundEvent::RelaySwitch(record(relays, &self.id)?.clone()));
        Ok(true)
    }

    pub fn refresh_state(&self, relays: &mut Collection<Relay>, sink: &dyn EventSink) -> Result<()> {
        relays.upsert(&to_patch(Relay::KIND, json!({"id": self.id, "pending_refresh": true}))?)?;
        sink.emit(OutboundEvent::RelayRefreshState(record(relays, &self.id)?.clone()));
        Ok(())
    }

    pub fn render(&self, relay: &Relay) -> RelayView {
        let pin = relay.arduino_pin.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        RelayView {
            id: relay.id,
            description: format!("{} ({})", relay.description, pin),
            changed_ts: format_date(relay.changed_ts),
            refresh: if relay.pending_refresh { ButtonStyle::Pending } else { ButtonStyle::Default },
            switch_on: SwitchButton {
                text: relay.switch_on_text.clone(),
                style: switch_style(relay.state, RelayState::On, RelayState::PendingOn),
                disabled: !relay.is_initialized,
            },
            switch_off: SwitchButton {
                text: relay.switch_off_text.clone(),
                style: switch_style(relay.state, RelayState::Off, RelayState::PendingOff),
                disabled: !relay.is_initialized,
            },
            unlocked: relay.editing,
        }
    }
}

// ==============================================================================
// notification
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationView {
    pub id: i64,
    pub text: String,
    pub created: String,
    pub time_ago: String,
    pub highlight: bool,
}

pub struct NotificationController {
    id: i64,
    refresh: Duration,
    last_render: Option<i64>,
}

impl NotificationController {
    pub fn new(id: i64, refresh: Duration) -> Self {
        Self { id, refresh, last_render: None }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// periodic refresh of the relative time
    ///
    /// returns false once the notification left the list; the caller drops
    /// the controller then.
    pub fn tick(&mut self, notifications: &NotificationCollection, now: i64) -> bool {
        if !notifications.contains(&self.id) {
            return false;
        }
        let due = self
            .last_render
            .map_or(true, |last| now - last >= self.refresh.as_secs() as i64);
        if due {
            self.last_render = Some(now);
        }
        true
    }

    pub fn last_render(&self) -> Option<i64> {
        self.last_render
    }

    pub fn render(&self, notification: &Notification, now: i64) -> NotificationView {
        // relative time is frozen between ticks
        let at = self.last_render.unwrap_or(now);
        NotificationView {
            id: notification.id,
            text: notification.text.clone(),
            created: format_date(Some(notification.created_ts)),
            time_ago: time_ago(notification.created_ts, at),
            highlight: notification.is_first,
        }
    }
}

// ==============================================================================
// contact
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Email,
    Calls,
}

impl Channel {
    fn field(self) -> &'static str {
        match self {
            Channel::Sms => "enable_sms_warnings",
            Channel::Email => "enable_email_warnings",
            Channel::Calls => "enable_phone_call_warnings",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactView {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub sms: bool,
    pub email_warnings: bool,
    pub phone_calls: bool,
    pub last_phone_call: String,
    pub next_available_phone_call: String,
    pub call_wait_minutes: Option<i64>,
    pub editing: bool,
}

pub struct ContactController {
    id: i64,
}

impl ContactController {
    pub fn new(id: i64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn toggle_sms(&self, on: bool, contacts: &mut Collection<Contact>, sink: &dyn EventSink) -> Result<()> {
        self.set_toggle(Channel::Sms, on, contacts, sink)
    }

    pub fn toggle_email(&self, on: bool, contacts: &mut Collection<Contact>, sink: &dyn EventSink) -> Result<()> {
        self.set_toggle(Channel::Email, on, contacts, sink)
    }

    pub fn toggle_calls(&self, on: bool, contacts: &mut Collection<Contact>, sink: &dyn EventSink) -> Result<()> {
        self.set_toggle(Channel::Calls, on, contacts, sink)
    }

    pub fn set_toggle(&self, channel: Channel, on: bool, contacts: &mut Collection<Contact>, sink: &dyn EventSink) -> Result<()> {
        let mut fields = json!({"id": self.id});
        fields[channel.field()] = json!(on);
        contacts.set(&to_patch(Contact::KIND, fields)?)?;

        let contact = record(contacts, &self.id)?;
        let whole = serde_json::to_value(contact).map_err(|source| DashboardError::Decode {
            kind: Contact::KIND,
            source,
        })?;
        sink.emit(OutboundEvent::ContactUpdate(to_patch(Contact::KIND, whole)?));
        Ok(())
    }

    pub fn open_edit(&self, contacts: &mut Collection<Contact>) -> Result<()> {
        contacts.set(&to_patch(Contact::KIND, json!({"id": self.id, "editing": true}))?)?;
        Ok(())
    }

    pub fn cancel_edit(&self, contacts: &mut Collection<Contact>) -> Result<()> {
        contacts.set(&to_patch(Contact::KIND, json!({"id": self.id, "editing": false}))?)?;
        Ok(())
    }

    pub fn key(&self, key: Key, call_wait_minutes: &str, contacts: &mut Collection<Contact>, sink: &dyn EventSink) -> Result<()> {
        match key {
            Key::Enter => self.confirm_edit(call_wait_minutes, contacts, sink),
            Key::Escape => self.cancel_edit(contacts),
            Key::Other => Ok(()),
        }
    }

    /// only the changed fields go to the server here, not the whole record
    pub fn confirm_edit(&self, call_wait_minutes: &str, contacts: &mut Collection<Contact>, sink: &dyn EventSink) -> Result<()> {
        let patch = to_patch(
            Contact::KIND,
            json!({
                "id": self.id,
                "pending": true,
                "editing": false,
                "call_wait_minutes": parse_int(call_wait_minutes),
            }),
        )?;
        contacts.set(&patch)?;
        sink.emit(OutboundEvent::ContactUpdate(patch));
        Ok(())
    }

    pub fn render(&self, contact: &Contact) -> ContactView {
        ContactView {
            id: contact.id,
            name: format!("{}{}", contact.name, if contact.pending { "*" } else { "" }),
            phone: contact.phone.clone().unwrap_or_default(),
            email: contact.email.clone().unwrap_or_default(),
            sms: contact.enable_sms_warnings,
            email_warnings: contact.enable_email_warnings,
            phone_calls: contact.enable_phone_call_warnings,
            last_phone_call: format_date(contact.last_phone_call_ts),
            next_available_phone_call: format_date(contact.next_available_phone_call),
            call_wait_minutes: contact.call_wait_minutes,
            editing: contact.editing,
        }
    }
}

// ==============================================================================
// call
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallView {
    pub phone: String,
}

pub struct CallController {
    id: String,
}

impl CallController {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// ask the server to cancel; the call stays listed until `call ended`
    pub fn hang(&self, calls: &Collection<Call>, sink: &dyn EventSink) -> Result<()> {
        sink.emit(OutboundEvent::CallCancel(record(calls, &self.id)?.clone()));
        Ok(())
    }

    pub fn render(&self, call: &Call) -> CallView {
        CallView { phone: call.id.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::RecordingSink;
    use crate::chart::DEFAULT_WINDOW;
    use crate::model::Patch;
    use serde_json::Value;

    fn p(v: Value) -> Patch {
        to_patch("test", v).unwrap()
    }

    fn sensors() -> Collection<Sensor> {
        let mut c = Collection::new();
        c.push(&p(json!({
            "sensor_code": "ZGT", "description": "Temperature", "unit": "°C",
            "min_possible_value": -10.0, "max_possible_value": 40.0,
            "min_warning_value": 20.0, "max_warning_value": 33.0,
            "enable_warnings": true
        })))
        .unwrap();
        c
    }

    fn form(min: &str, max: &str) -> WarningForm {
        WarningForm {
            min_warning_value: min.into(),
            max_warning_value: max.into(),
            enable_warnings: true,
            observable_measurements: "3".into(),
            observable_alarming_measurements: "2".into(),
            warning_wait_minutes: "x".into(),
        }
    }

    #[test]
    fn display_capabilities_by_device() {
        let d = |device| Display { charts_enabled: true, device };
        assert!(!d(DeviceClass::Xs).renders_gauge());
        assert!(d(DeviceClass::Sm).renders_gauge());
        assert!(!d(DeviceClass::Sm).renders_chart());
        assert!(d(DeviceClass::Md).renders_chart());
        assert!(!Display { charts_enabled: false, device: DeviceClass::Lg }.renders_gauge());
    }

    #[test]
    fn sensor_controller_marks_display_flags() {
        let mut c = sensors();
        let display = Display { charts_enabled: true, device: DeviceClass::Sm };
        let ctl = SensorController::new("ZGT", display, DEFAULT_WINDOW, &mut c).unwrap();
        assert!(ctl.gauge().is_some());
        assert!(ctl.chart().is_none());
        let s = c.get(&"ZGT".to_string()).unwrap();
        assert!(s.show_gauge);
        assert!(!s.show_chart);
    }

    #[test]
    fn new_reading_feeds_chart_and_gauge_once() {
        let mut c = sensors();
        let mut ctl = SensorController::new("ZGT", Display::default(), DEFAULT_WINDOW, &mut c).unwrap();
        c.upsert(&p(json!({"sensor_code": "ZGT", "value": 25.0, "read_ts": 1000}))).unwrap();
        let s = c.get(&"ZGT".to_string()).unwrap().clone();
        ctl.on_record_change(&s, 1000);
        ctl.on_record_change(&s, 1001);
        assert_eq!(ctl.chart().unwrap().len(), 1);
        assert_eq!(ctl.gauge().unwrap().value(), Some(25.0));
    }

    #[test]
    fn out_of_range_reading_leaves_chart_and_gauge_alone() {
        let mut c = sensors();
        let mut ctl = SensorController::new("ZGT", Display::default(), DEFAULT_WINDOW, &mut c).unwrap();
        c.upsert(&p(json!({"sensor_code": "ZGT", "value": 1.0, "read_ts": 100_000_000_000_000_000i64}))).unwrap();
        let s = c.get(&"ZGT".to_string()).unwrap().clone();
        ctl.on_record_change(&s, 0);
        assert!(ctl.chart().unwrap().is_empty());
        assert_eq!(ctl.gauge().unwrap().value(), None);

        c.upsert(&p(json!({"sensor_code": "ZGT", "read_ts": 1000}))).unwrap();
        let s = c.get(&"ZGT".to_string()).unwrap().clone();
        ctl.on_record_change(&s, 1000);
        assert_eq!(ctl.chart().unwrap().len(), 1);
        assert_eq!(ctl.gauge().unwrap().value(), Some(1.0));
    }

    #[test]
    fn threshold_change_reshapes_axes_without_new_point() {
        let mut c = sensors();
        let mut ctl = SensorController::new("ZGT", Display::default(), DEFAULT_WINDOW, &mut c).unwrap();
        c.upsert(&p(json!({"sensor_code": "ZGT", "max_warning_value": 35.0}))).unwrap();
        let s = c.get(&"ZGT".to_string()).unwrap().clone();
        ctl.on_record_change(&s, 0);
        assert_eq!(ctl.chart().unwrap().axis().plot_lines[1].value, Some(35.0));
        assert!(ctl.chart().unwrap().is_empty());
    }

    #[test]
    fn confirm_edit_writes_then_emits() {
        let mut c = sensors();
        let sink = RecordingSink::new();
        let ctl = SensorController::new("ZGT", Display::default(), DEFAULT_WINDOW, &mut c).unwrap();
        ctl.open_edit(&mut c).unwrap();
        ctl.confirm_edit(&form("18.5", "33"), &mut c, &sink).unwrap();

        let s = c.get(&"ZGT".to_string()).unwrap();
        assert!(!s.editing);
        assert!(s.pending_min_warning_input);
        assert!(!s.pending_max_warning_input);
        assert_eq!(s.min_warning_value, Some(18.5));
        assert_eq!(s.observable_measurements, Some(3));
        assert_eq!(s.warning_wait_minutes, None);

        let events = sink.take();
        assert_eq!(events.len(), 1);
        match &events[0] {
            OutboundEvent::SensorWarningValues(sent) => assert_eq!(sent.min_warning_value, Some(18.5)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unparsable_threshold_becomes_null() {
        let mut c = sensors();
        let sink = RecordingSink::new();
        let ctl = SensorController::new("ZGT", Display::default(), DEFAULT_WINDOW, &mut c).unwrap();
        ctl.key(Key::Enter, &form("", "abc"), &mut c, &sink).unwrap();
        let s = c.get(&"ZGT".to_string()).unwrap();
        assert_eq!(s.min_warning_value, None);
        assert_eq!(s.max_warning_value, None);
        assert_eq!(ctl.render(s).max_warning, "∞*");
    }

    #[test]
    fn escape_cancels_without_emitting() {
        let mut c = sensors();
        let sink = RecordingSink::new();
        let ctl = SensorController::new("ZGT", Display::default(), DEFAULT_WINDOW, &mut c).unwrap();
        ctl.open_edit(&mut c).unwrap();
        ctl.key(Key::Escape, &form("1", "2"), &mut c, &sink).unwrap();
        assert!(!c.get(&"ZGT".to_string()).unwrap().editing);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn toggle_warnings_flips_and_emits() {
        let mut c = sensors();
        let sink = RecordingSink::new();
        let ctl = SensorController::new("ZGT", Display::default(), DEFAULT_WINDOW, &mut c).unwrap();
        ctl.toggle_warnings(&mut c, &sink).unwrap();
        assert!(!c.get(&"ZGT".to_string()).unwrap().enable_warnings);
        assert_eq!(sink.take().len(), 1);
    }

    #[test]
    fn toggle_chart_disables_redraw_and_resizes() {
        let mut c = sensors();
        let mut ctl = SensorController::new("ZGT", Display::default(), DEFAULT_WINDOW, &mut c).unwrap();
        ctl.toggle_display_chart(&mut c).unwrap();
        assert!(!c.get(&"ZGT".to_string()).unwrap().show_chart);
        let chart = ctl.chart().unwrap();
        assert!(!chart.surface.redraw_enabled());
        assert_eq!(chart.surface.resizes(), 1);
    }

    #[test]
    fn toggle_gauge_on_small_device_is_rejected() {
        let mut c = sensors();
        let display = Display { charts_enabled: true, device: DeviceClass::Xs };
        let mut ctl = SensorController::new("ZGT", display, DEFAULT_WINDOW, &mut c).unwrap();
        assert!(matches!(ctl.toggle_display_gauge(&mut c), Err(DashboardError::NotRendered("gauge"))));
    }

    #[test]
    fn sensor_panel_status() {
        let mut c = sensors();
        let ctl = SensorController::new("ZGT", Display::default(), DEFAULT_WINDOW, &mut c).unwrap();
        let mut s = c.get(&"ZGT".to_string()).unwrap().clone();
        assert_eq!(ctl.render(&s).panel, PanelStatus::Default);
        s.has_warning = true;
        assert_eq!(ctl.render(&s).panel, PanelStatus::Warning);
        s.has_notification = true;
        assert_eq!(ctl.render(&s).panel, PanelStatus::Danger);
        assert_eq!(ctl.render(&s).value, "∞");
    }

    fn relays(editing: bool) -> Collection<Relay> {
        let mut c = Collection::new();
        c.push(&p(json!({
            "id": 1, "description": "Pump", "arduino_pin": 13,
            "switch_on_text": "ON", "switch_off_text": "OFF",
            "state": 0, "is_initialized": true, "editing": editing
        })))
        .unwrap();
        c
    }

    #[test]
    fn locked_relay_ignores_switch() {
        let mut c = relays(false);
        let sink = RecordingSink::new();
        assert!(!RelayController::new(1).toggle_on(&mut c, &sink).unwrap());
        assert_eq!(c.get(&1).unwrap().state, RelayState::Off);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn unlocked_relay_goes_pending_and_emits() {
        let mut c = relays(true);
        let sink = RecordingSink::new();
        let ctl = RelayController::new(1);
        assert!(ctl.toggle_on(&mut c, &sink).unwrap());
        assert_eq!(c.get(&1).unwrap().state, RelayState::PendingOn);
        match sink.take().as_slice() {
            [OutboundEvent::RelaySwitch(r)] => assert_eq!(r.state, RelayState::PendingOn),
            other => panic!("unexpected {:?}", other),
        }
        let view = ctl.render(c.get(&1).unwrap());
        assert_eq!(view.switch_on.style, ButtonStyle::Pending);
        assert_eq!(view.switch_off.style, ButtonStyle::Default);
        assert_eq!(view.description, "Pump (13)");
    }

    #[test]
    fn refresh_marks_pending() {
        let mut c = relays(false);
        let sink = RecordingSink::new();
        let ctl = RelayController::new(1);
        ctl.refresh_state(&mut c, &sink).unwrap();
        assert_eq!(ctl.render(c.get(&1).unwrap()).refresh, ButtonStyle::Pending);
        assert_eq!(sink.take()[0].name(), "relay refresh state");
    }

    #[test]
    fn relay_error_and_uninitialized_rendering() {
        let ctl = RelayController::new(1);
        let r = Relay { id: 1, state: RelayState::Error, ..Default::default() };
        let view = ctl.render(&r);
        assert_eq!(view.switch_on.style, ButtonStyle::Danger);
        assert_eq!(view.switch_off.style, ButtonStyle::Danger);
        assert!(view.switch_on.disabled);
        let r = Relay { id: 1, state: RelayState::Off, is_initialized: true, ..Default::default() };
        assert_eq!(ctl.render(&r).switch_off.style, ButtonStyle::Active);
    }

    #[test]
    fn notification_tick_stops_when_removed() {
        let mut n = NotificationCollection::with_limit(1);
        n.push(&p(json!({"id": 1, "created_ts": 0, "text": "ALARM"}))).unwrap();
        let mut ctl = NotificationController::new(1, Duration::from_secs(30));
        assert!(ctl.tick(&n, 100));
        assert_eq!(ctl.last_render(), Some(100));
        assert!(ctl.tick(&n, 110));
        assert_eq!(ctl.last_render(), Some(100));
        assert!(ctl.tick(&n, 130));
        assert_eq!(ctl.last_render(), Some(130));

        let view = ctl.render(n.get(&1).unwrap(), 200);
        assert_eq!(view.time_ago, "2 minutes ago");
        assert!(view.highlight);

        n.push(&p(json!({"id": 2, "created_ts": 50}))).unwrap();
        assert!(!ctl.tick(&n, 200));
    }

    fn contacts() -> Collection<Contact> {
        let mut c = Collection::new();
        c.push(&p(json!({"id": 7, "name": "Admin", "phone": "+123", "call_wait_minutes": 20}))).unwrap();
        c
    }

    #[test]
    fn contact_toggle_sends_whole_record() {
        let mut c = contacts();
        let sink = RecordingSink::new();
        ContactController::new(7).toggle_sms(true, &mut c, &sink).unwrap();
        assert!(c.get(&7).unwrap().enable_sms_warnings);
        match sink.take().as_slice() {
            [OutboundEvent::ContactUpdate(p)] => {
                assert_eq!(p["enable_sms_warnings"], json!(true));
                assert_eq!(p["name"], json!("Admin"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn contact_edit_sends_only_changes() {
        let mut c = contacts();
        let sink = RecordingSink::new();
        let ctl = ContactController::new(7);
        ctl.open_edit(&mut c).unwrap();
        ctl.key(Key::Enter, "45", &mut c, &sink).unwrap();
        let contact = c.get(&7).unwrap();
        assert_eq!(contact.call_wait_minutes, Some(45));
        assert!(contact.pending);
        assert!(!contact.editing);
        assert_eq!(ctl.render(contact).name, "Admin*");
        match sink.take().as_slice() {
            [OutboundEvent::ContactUpdate(p)] => {
                assert_eq!(p.len(), 4);
                assert_eq!(p["call_wait_minutes"], json!(45));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn hang_emits_cancel() {
        let mut calls = Collection::new();
        calls.push(&p(json!({"id": "+123"}))).unwrap();
        let sink = RecordingSink::new();
        let ctl = CallController::new("+123");
        ctl.hang(&calls, &sink).unwrap();
        assert_eq!(sink.take(), vec![OutboundEvent::CallCancel(Call { id: "+123".into() })]);
        assert!(CallController::new("+999").hang(&calls, &sink).is_err());
    }
}
