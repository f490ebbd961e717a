//! error types for the dashboard core.
//!
//! the binary and the http glue use `anyhow`; everything below the app
//! controller reports one of these so callers can tell a stale id apart
//! from a malformed payload.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    /// a patch arrived without the field that identifies its record
    #[error("{kind} patch is missing its `{field}` key")]
    MissingKey {
        kind: &'static str,
        field: &'static str,
    },

    /// merged mapping no longer decodes as the record type
    #[error("invalid {kind} data: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// a patch must be a json object
    #[error("{kind} patch is not an object")]
    NotAnObject { kind: &'static str },

    /// an interaction addressed a record that is not (or no longer) present
    #[error("unknown {kind} `{key}`")]
    UnknownRecord { kind: &'static str, key: String },

    /// the interaction needs a widget that is not rendered on this device
    #[error("{0} is not rendered on this device")]
    NotRendered(&'static str),

    #[error("debug mode is disabled")]
    DebugDisabled,
}

pub type Result<T> = std::result::Result<T, DashboardError>;
