//! ==============================================================================
//! monitor-dashboard - real-time monitoring dashboard client
//! ==============================================================================
//!
//! purpose:
//!     keeps a live, in-memory copy of a monitoring server's sensors, relays,
//!     notifications, contacts and calls, renders them into view models, and
//!     turns user interactions into optimistic updates plus outbound events.
//!
//! module map:
//!
//! ```text
//!     model ──► collection ──► controller ──► app ──► server
//!                   ▲              │  ▲                  │
//!                   │              ▼  │                  ▼
//!                 bridge ◄──── chart  format          (axum)
//! ```
//!
//! ==============================================================================

pub mod app;
pub mod bridge;
pub mod chart;
pub mod collection;
pub mod config;
pub mod controller;
pub mod error;
pub mod format;
pub mod model;
pub mod server;

pub use app::{App, AppSettings, DashboardView};
pub use bridge::{ChannelSink, EventSink, InboundEvent, OutboundEvent, RecordingSink};
pub use error::{DashboardError, Result};
