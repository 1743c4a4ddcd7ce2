//! Error types for ShipAbility.

use std::time::Duration;

use crate::orders::model::RowId;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to read CSV input: {0}")]
    Input(#[from] csv::Error),

    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Purchase error: {0}")]
    Purchase(#[from] PurchaseError),

    #[error("Label cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Rule ranges overlap: [{first_min}, {first_max}] and [{second_min}, {second_max}]")]
    OverlappingRules {
        first_min: u32,
        first_max: u32,
        second_min: u32,
        second_max: u32,
    },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while turning raw marketplace rows into order rows.
///
/// Only the format-level variants abort a load. `IncompleteRow` and
/// `InvalidField` are collected per row and reported alongside the batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("Unrecognized CSV format (headers: {})", headers.join(", "))]
    UnrecognizedFormat { headers: Vec<String> },

    #[error("Headers match more than one marketplace format: {}", candidates.join(", "))]
    AmbiguousFormat { candidates: Vec<String> },

    #[error("Row {row_id} is missing required fields: {}", missing.join(", "))]
    IncompleteRow {
        row_id: RowId,
        missing: Vec<&'static str>,
    },

    #[error("Row {row_id} has an invalid {field}: {value:?}")]
    InvalidField {
        row_id: RowId,
        field: &'static str,
        value: String,
    },
}

/// Failures reported by the external label-purchase service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PurchaseError {
    /// The provider refused the shipment (bad address, no matching rate, ...).
    #[error("{reason}")]
    Rejected {
        reason: String,
        provider_detail: String,
    },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Purchase timed out after {0:?}")]
    Timeout(Duration),
}

impl PurchaseError {
    /// Short human-readable reason for the purchase report.
    pub fn reason(&self) -> String {
        match self {
            Self::Rejected { reason, .. } => reason.clone(),
            Self::Transport(_) => "transport failure".to_string(),
            Self::Timeout(_) => "purchase timed out".to_string(),
        }
    }

    /// Provider-supplied detail text, if any.
    pub fn provider_detail(&self) -> String {
        match self {
            Self::Rejected {
                provider_detail, ..
            } => provider_detail.clone(),
            Self::Transport(detail) => detail.clone(),
            Self::Timeout(after) => format!("no response within {after:?}"),
        }
    }
}

/// Label cache persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Batch export errors.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the label rendering collaborator.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Label image for row {row_id} is unavailable: {image_ref}")]
    MissingImage { row_id: RowId, image_ref: String },

    #[error("Renderer failed: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session-level errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("No order batch is loaded")]
    NoBatchLoaded,

    #[error("Row {0} does not exist in the loaded batch")]
    UnknownRow(RowId),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
