//! ==============================================================================
//! config.rs - dashboard configuration loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `dashboard.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ServerConfig: where outbound events go, where history comes from.
//!     - HttpConfig: the local listen address for views and inbound push.
//!     - DisplayConfig: chart toggle, device size class, debug mode.
//!     - ChartsConfig: rolling window of the live charts.
//!     - NotificationsConfig: list length and timer refresh.
//!     - LoggingConfig: default tracing filter.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::AppSettings;
use crate::controller::{DeviceClass, Display};

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DashboardConfig {
    pub server: ServerConfig,
    pub http: HttpConfig,
    pub display: DisplayConfig,
    pub charts: ChartsConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// outbound events are POSTed here
    pub events_url: String,
    /// long-term history document, if the server publishes one
    pub history_url: Option<String>,
    /// applies to event forwarding and history fetches alike
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            events_url: "http://127.0.0.1:5000/api/events".to_string(),
            history_url: None,
            request_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub listen_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { listen_addr: "0.0.0.0:3000".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub charts_enabled: bool,
    pub device: DeviceClass,
    /// allows `apply dummy`
    pub debug: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { charts_enabled: true, device: DeviceClass::Lg, debug: false }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChartsConfig {
    pub window_hours: u64,
}

impl Default for ChartsConfig {
    fn default() -> Self {
        Self { window_hours: 24 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationsConfig {
    pub max_length: usize,
    pub refresh_seconds: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { max_length: 6, refresh_seconds: 30 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl DashboardConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            PathBuf::from("config").join("dashboard.toml"),
            PathBuf::from("..").join("config").join("dashboard.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// what the app controller needs out of the file
    pub fn app_settings(&self) -> AppSettings {
        AppSettings {
            display: Display {
                charts_enabled: self.display.charts_enabled,
                device: self.display.device,
            },
            window: Duration::from_secs(self.charts.window_hours.max(1) * 60 * 60),
            notification_limit: self.notifications.max_length,
            notification_refresh: self.refresh_interval(),
            debug: self.display.debug,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.notifications.refresh_seconds.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds.max(1))
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│        DASHBOARD CONFIGURATION          │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Events URL: {} (timeout {}s)", self.server.events_url, self.server.request_timeout_seconds);
        println!("│ Listen: {}", self.http.listen_addr);
        println!("│ Device: {:?} | Charts: {}", self.display.device, self.display.charts_enabled);
        println!("│ Chart Window: {}h", self.charts.window_hours);
        println!("│ Notifications: {} (refresh {}s)", self.notifications.max_length, self.notifications.refresh_seconds);
        println!("│ Debug: {} | Log Level: {}", self.display.debug, self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = DashboardConfig::parse("").unwrap();
        assert_eq!(config.http.listen_addr, "0.0.0.0:3000");
        assert_eq!(config.notifications.max_length, 6);
        assert!(config.display.charts_enabled);
    }

    #[test]
    fn partial_sections_fill_in() {
        let config = DashboardConfig::parse(
            r#"
            [display]
            device = "sm"
            debug = true

            [charts]
            window_hours = 6
            "#,
        )
        .unwrap();
        let settings = config.app_settings();
        assert_eq!(settings.display.device, DeviceClass::Sm);
        assert!(settings.debug);
        assert_eq!(settings.window, Duration::from_secs(6 * 3600));
        assert_eq!(settings.notification_refresh, Duration::from_secs(30));
    }

    #[test]
    fn request_timeout_defaults_and_floors() {
        assert_eq!(DashboardConfig::parse("").unwrap().request_timeout(), Duration::from_secs(10));
        let config = DashboardConfig::parse("[server]\nrequest_timeout_seconds = 0").unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn bad_device_is_an_error() {
        assert!(DashboardConfig::parse("[display]\ndevice = \"huge\"").is_err());
    }
}
