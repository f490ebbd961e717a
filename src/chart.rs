//! ==============================================================================
//! chart.rs - chart and gauge data models
//! ==============================================================================
//!
//! purpose:
//!     keeps what a charting surface needs to draw a sensor, without drawing
//!     anything itself:
//!     - SensorChart: time series with a rolling window, dashed threshold lines
//!     - SensorGauge: one live value over coloured threshold bands
//!     - HistoryChart: stacked y-axes for the long-term history page
//!
//! relationships:
//!     - uses: model.rs (Sensor, Thresholds, SensorHistory)
//!     - used by: controller.rs (SensorController owns a chart and a gauge)
//!
//! threshold axis:
//!
//! ```text
//!     v0 ─────── v1 ─────────────── v2 ─────── v3
//!        low        normal              high
//!      #3498DB     #00BC8C            #E74C3C
//!
//!     v1/v2 are the warning values (falling back to the possible values),
//!     v0/v3 widen the axis so both warning values are always visible.
//! ```
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::model::{Sensor, Thresholds};

pub const LOW_COLOR: &str = "#3498DB";
pub const NORMAL_COLOR: &str = "#00BC8C";
pub const HIGH_COLOR: &str = "#E74C3C";

/// default rolling window for the live chart
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

// ==============================================================================
// threshold bands and lines
// ==============================================================================

pub type BandValues = [Option<f64>; 4];

fn lower(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn higher(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// axis edges and warning marks for a set of thresholds
pub fn plot_band_values(t: &Thresholds) -> BandValues {
    let lo = t.min_warning.or(t.min_possible);
    let hi = t.max_warning.or(t.max_possible);
    [lower(t.min_possible, lo), lo, hi, higher(hi, t.max_possible)]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotBand {
    pub from: Option<f64>,
    pub to: Option<f64>,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotLine {
    pub value: Option<f64>,
    pub color: &'static str,
    pub dash_style: &'static str,
    pub width: u8,
}

pub fn plot_bands(v: &BandValues) -> Vec<PlotBand> {
    vec![
        PlotBand { from: v[0], to: v[1], color: LOW_COLOR },
        PlotBand { from: v[1], to: v[2], color: NORMAL_COLOR },
        PlotBand { from: v[2], to: v[3], color: HIGH_COLOR },
    ]
}

pub fn plot_lines(v: &BandValues) -> Vec<PlotLine> {
    vec![
        PlotLine { value: v[1], color: LOW_COLOR, dash_style: "LongDash", width: 2 },
        PlotLine { value: v[2], color: HIGH_COLOR, dash_style: "LongDash", width: 2 },
    ]
}

/// new value-axis settings for the surface
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisUpdate {
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plot_bands: Vec<PlotBand>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plot_lines: Vec<PlotLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marks {
    Bands,
    Lines,
}

/// remembers the last applied values so unchanged thresholds cost nothing
#[derive(Debug, Clone)]
struct ThresholdAxis {
    marks: Marks,
    applied: Option<BandValues>,
    current: AxisUpdate,
}

impl ThresholdAxis {
    fn new(marks: Marks) -> Self {
        Self { marks, applied: None, current: AxisUpdate::default() }
    }

    fn update(&mut self, t: &Thresholds) -> Option<AxisUpdate> {
        let values = plot_band_values(t);
        if self.applied == Some(values) {
            return None;
        }
        let mut update = AxisUpdate { min: values[0], max: values[3], ..Default::default() };
        match self.marks {
            Marks::Bands => update.plot_bands = plot_bands(&values),
            Marks::Lines => update.plot_lines = plot_lines(&values),
        }
        self.applied = Some(values);
        self.current = update.clone();
        Some(update)
    }
}

// ==============================================================================
// redraw bookkeeping shared by chart and gauge
// ==============================================================================

#[derive(Debug, Clone)]
pub struct Surface {
    redraw_enabled: bool,
    redraws: u64,
    resizes: u64,
}

impl Default for Surface {
    fn default() -> Self {
        Self { redraw_enabled: true, redraws: 0, resizes: 0 }
    }
}

impl Surface {
    fn redraw(&mut self) {
        if self.redraw_enabled {
            self.redraws += 1;
        }
    }

    pub fn disable_redraw(&mut self) {
        self.redraw_enabled = false;
    }

    /// re-enabling catches up with one immediate redraw
    pub fn enable_redraw(&mut self) {
        self.redraw_enabled = true;
        self.redraw();
    }

    pub fn resize(&mut self) {
        self.resizes += 1;
    }

    pub fn redraw_enabled(&self) -> bool {
        self.redraw_enabled
    }

    pub fn redraws(&self) -> u64 {
        self.redraws
    }

    pub fn resizes(&self) -> u64 {
        self.resizes
    }
}

// ==============================================================================
// live time series
// ==============================================================================

/// unix seconds to chart milliseconds, `None` on overflow
pub fn to_millis(secs: i64) -> Option<i64> {
    secs.checked_mul(1000)
}

/// `[x milliseconds, y]`; a null y is a gap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point(pub i64, pub Option<f64>);

#[derive(Debug, Clone)]
pub struct SensorChart {
    name: String,
    unit: String,
    window: Duration,
    points: VecDeque<Point>,
    axis: ThresholdAxis,
    pub surface: Surface,
}

impl SensorChart {
    /// build the chart and seed it with the sensor's shipped history
    pub fn new(sensor: &Sensor, window: Duration) -> Self {
        let mut points = VecDeque::new();
        if let Some(history) = &sensor.history {
            for (i, y) in history.data.iter().enumerate() {
                let x = (i as i64)
                    .checked_mul(history.step)
                    .and_then(|offset| history.from.checked_add(offset))
                    .and_then(to_millis);
                match x {
                    Some(x) => points.push_back(Point(x, *y)),
                    None => {
                        tracing::warn!("[CHART] ⚠ {} history sample {} is out of range, skipped", sensor.sensor_code, i);
                    }
                }
            }
        }
        let mut chart = Self {
            name: sensor.description.clone(),
            unit: sensor.unit.clone(),
            window,
            points,
            axis: ThresholdAxis::new(Marks::Lines),
            surface: Surface::default(),
        };
        chart.update_plot_bands(&sensor.thresholds());
        chart
    }

    /// append a reading; `x` and `now` are unix seconds
    ///
    /// when the oldest point has fallen out of the window it is shifted out
    /// in the same step, so the series slides instead of growing forever.
    /// returns false, leaving the series untouched, when `x` has no
    /// millisecond representation.
    pub fn add_point(&mut self, x: i64, y: Option<f64>, thresholds: &Thresholds, now: i64) -> bool {
        let Some(x_ms) = to_millis(x) else {
            tracing::warn!("[CHART] ⚠ {}: timestamp {} out of range, point skipped", self.name, x);
            return false;
        };
        let window = self.window.as_secs() as i64;
        if let Some(Point(first_ms, _)) = self.points.front() {
            if now.saturating_sub(first_ms / 1000) > window {
                self.points.pop_front();
            }
        }
        self.points.push_back(Point(x_ms, y));
        self.update_plot_bands(thresholds);
        self.surface.redraw();
        true
    }

    pub fn update_plot_bands(&mut self, thresholds: &Thresholds) -> Option<AxisUpdate> {
        self.axis.update(thresholds)
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn axis(&self) -> &AxisUpdate {
        &self.axis.current
    }

    pub fn frame(&self) -> ChartFrame {
        ChartFrame {
            name: self.name.clone(),
            unit: self.unit.clone(),
            color: NORMAL_COLOR,
            axis: self.axis.current.clone(),
            points: self.points.iter().copied().collect(),
        }
    }
}

/// everything a renderer needs for one time-series panel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartFrame {
    pub name: String,
    pub unit: String,
    pub color: &'static str,
    pub axis: AxisUpdate,
    pub points: Vec<Point>,
}

// ==============================================================================
// gauge
// ==============================================================================

#[derive(Debug, Clone)]
pub struct SensorGauge {
    name: String,
    unit: String,
    value: Option<f64>,
    axis: ThresholdAxis,
    pub surface: Surface,
}

impl SensorGauge {
    pub fn new(sensor: &Sensor) -> Self {
        let mut gauge = Self {
            name: sensor.description.clone(),
            unit: sensor.unit.clone(),
            value: None,
            axis: ThresholdAxis::new(Marks::Bands),
            surface: Surface::default(),
        };
        gauge.update_plot_bands(&sensor.thresholds());
        gauge
    }

    /// the gauge has a single point: the first call adds it, later calls move it
    pub fn add_point(&mut self, value: f64, thresholds: &Thresholds) {
        self.value = Some(value);
        self.update_plot_bands(thresholds);
        self.surface.redraw();
    }

    pub fn update_plot_bands(&mut self, thresholds: &Thresholds) -> Option<AxisUpdate> {
        self.axis.update(thresholds)
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn axis(&self) -> &AxisUpdate {
        &self.axis.current
    }

    pub fn frame(&self) -> GaugeFrame {
        GaugeFrame {
            name: self.name.clone(),
            unit: self.unit.clone(),
            value: self.value,
            axis: self.axis.current.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeFrame {
    pub name: String,
    pub unit: String,
    pub value: Option<f64>,
    pub axis: AxisUpdate,
}

// ==============================================================================
// history chart - stacked y-axes, one per sensor type
// ==============================================================================

/// gap between stacked axes, in percent of the chart height
pub const AXIS_TOP_PADDING: f64 = 5.0;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct HistoryAxis {
    pub label: String,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct HistorySeries {
    pub name: String,
    #[serde(rename = "yAxis")]
    pub y_axis: String,
    #[serde(default)]
    pub data: Vec<Point>,
}

/// payload of the server's history document
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct HistoryData {
    #[serde(rename = "yAxes", default)]
    pub y_axes: Vec<HistoryAxis>,
    #[serde(default)]
    pub series: Vec<HistorySeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisLayout {
    pub id: String,
    pub title: String,
    pub unit: String,
    /// percent of the chart height
    pub top: f64,
    pub height: f64,
    pub label_band: LabelBand,
}

/// grey band behind an axis title
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelBand {
    pub from: Option<f64>,
    pub to: Option<f64>,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesLayout {
    pub name: String,
    pub y_axis: String,
    pub unit: Option<String>,
    pub data: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryChart {
    pub axes: Vec<AxisLayout>,
    pub series: Vec<SeriesLayout>,
}

impl HistoryChart {
    pub fn layout(data: HistoryData) -> Self {
        let n = data.y_axes.len().max(1) as f64;
        let units: HashMap<&str, &str> = data
            .y_axes
            .iter()
            .map(|a| (a.label.as_str(), a.unit.as_str()))
            .collect();

        let axes = data
            .y_axes
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let (top, height) = if i == 0 {
                    (0.0, 100.0 / n)
                } else {
                    (i as f64 * 100.0 / n + AXIS_TOP_PADDING, 100.0 / n - AXIS_TOP_PADDING)
                };
                // nothing is zoomed yet, so the band covers the data
                let (from, to) = label_band(&Extremes::of_axis(&a.label, &data.series));
                AxisLayout {
                    id: a.label.clone(),
                    title: a.label.clone(),
                    unit: a.unit.clone(),
                    top,
                    height,
                    label_band: LabelBand { from, to, title: a.label.clone() },
                }
            })
            .collect();

        let series = data
            .series
            .iter()
            .map(|s| SeriesLayout {
                name: s.name.clone(),
                y_axis: s.y_axis.clone(),
                unit: units.get(s.y_axis.as_str()).map(|u| u.to_string()),
                data: s.data.clone(),
            })
            .collect();

        Self { axes, series }
    }
}

/// visible and data extremes of one axis
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Extremes {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub data_min: Option<f64>,
    pub data_max: Option<f64>,
}

impl Extremes {
    /// data extremes of every series drawn against `axis`
    pub fn of_axis(axis: &str, series: &[HistorySeries]) -> Self {
        let values = series
            .iter()
            .filter(|s| s.y_axis == axis)
            .flat_map(|s| s.data.iter().filter_map(|p| p.1));
        values.fold(Self::default(), |ex, v| Self {
            data_min: Some(ex.data_min.map_or(v, |m| m.min(v))),
            data_max: Some(ex.data_max.map_or(v, |m| m.max(v))),
            ..ex
        })
    }
}

/// span of the grey label band behind an axis title
///
/// with visible extremes the band is pulled 10% towards the data; without
/// them it covers the data extremes.
pub fn label_band(ex: &Extremes) -> (Option<f64>, Option<f64>) {
    let from = match (ex.min, ex.data_min) {
        (None, dm) => dm,
        (Some(m), Some(dm)) => Some(m + (dm - m) * 0.1),
        (Some(m), None) => Some(m),
    };
    let to = match (ex.max, ex.data_max) {
        (None, dm) => dm,
        (Some(m), Some(dm)) => Some(m - (m - dm) * 0.1),
        (Some(m), None) => Some(m),
    };
    (from, to)
}
