//! Shared types for label acquisition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::ServiceDefaults;
use crate::error::PurchaseError;
use crate::labels::fingerprint::Fingerprint;
use crate::orders::model::{Address, RowId};
use crate::rules::engine::EnrichedRow;
use crate::rules::model::{Dimensions, PredefinedPackage, ShipmentKind};

// ── Outbound request ────────────────────────────────────────────────

/// One shipment as submitted to the purchase service.
///
/// Built from an `EnrichedRow`. Every field except `row_id` is
/// purchase-relevant and feeds the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRequest {
    pub row_id: RowId,
    /// Marketplace order number; identifies the shipment across re-exports.
    pub order_ref: Option<String>,
    pub to_address: Address,
    pub from_address: Address,
    pub carrier: String,
    pub service: String,
    pub label_format: String,
    pub kind: ShipmentKind,
    pub weight_oz: Decimal,
    pub machinable: bool,
    pub dimensions: Option<Dimensions>,
    pub predefined_package: Option<PredefinedPackage>,
}

impl ShipmentRequest {
    pub fn from_enriched(row: &EnrichedRow, from: &Address, defaults: &ServiceDefaults) -> Self {
        let c = &row.classification;
        Self {
            row_id: row.row_id(),
            order_ref: row.row.order_ref.clone(),
            to_address: row.row.recipient.canonical(&defaults.country),
            from_address: from.canonical(&defaults.country),
            carrier: defaults.carrier.clone(),
            service: c.service.clone(),
            label_format: defaults.label_format.clone(),
            kind: c.kind,
            weight_oz: c.weight_oz,
            machinable: c.machinable,
            dimensions: c.dimensions,
            predefined_package: c.predefined_package,
        }
    }
}

// ── Purchase service ────────────────────────────────────────────────

/// What the purchase service returns for a successful buy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasedLabel {
    pub tracking_id: String,
    /// Where the label image lives (URL or local path).
    pub label_image_ref: String,
    pub cost: Decimal,
}

/// External label-purchase service (carrier API, broker, ...).
///
/// Implementations must be safe to call concurrently; each call is one
/// independent purchase.
#[async_trait]
pub trait LabelService: Send + Sync {
    /// Service name for logging.
    fn name(&self) -> &str;

    /// Buy a label for one shipment.
    async fn purchase(&self, request: &ShipmentRequest) -> Result<PurchasedLabel, PurchaseError>;
}

// ── Results ─────────────────────────────────────────────────────────

/// A purchased label, as cached and reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelArtifact {
    pub row_id: RowId,
    pub tracking_id: String,
    pub label_image_ref: String,
    pub cost: Decimal,
    pub kind: ShipmentKind,
    pub fingerprint: Fingerprint,
    pub purchased_at: DateTime<Utc>,
}

impl LabelArtifact {
    pub fn new(request: &ShipmentRequest, fingerprint: Fingerprint, label: PurchasedLabel) -> Self {
        Self {
            row_id: request.row_id,
            tracking_id: label.tracking_id,
            label_image_ref: label.label_image_ref,
            cost: label.cost,
            kind: request.kind,
            fingerprint,
            purchased_at: Utc::now(),
        }
    }
}

/// Outcome for one row of a purchase run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PurchaseOutcome {
    Artifact {
        artifact: LabelArtifact,
        /// Reused from the cache; the service was not called.
        from_cache: bool,
    },
    Failed {
        reason: String,
        provider_detail: String,
    },
    /// Row failed classification validation and was never submitted.
    Skipped { reason: String },
    /// Run was cancelled before this row started.
    Cancelled,
}

impl PurchaseOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Artifact {
                from_cache: true, ..
            } => "cached",
            Self::Artifact { .. } => "purchased",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn artifact(&self) -> Option<&LabelArtifact> {
        match self {
            Self::Artifact { artifact, .. } => Some(artifact),
            _ => None,
        }
    }
}

impl From<PurchaseError> for PurchaseOutcome {
    fn from(e: PurchaseError) -> Self {
        Self::Failed {
            reason: e.reason(),
            provider_detail: e.provider_detail(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowOutcome {
    pub row_id: RowId,
    pub outcome: PurchaseOutcome,
}

/// Per-row outcomes, aligned to the input row order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurchaseReport {
    pub outcomes: Vec<RowOutcome>,
}

/// Counts across a purchase report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub purchased: usize,
    pub cached: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    /// Sum of label costs, cached labels included.
    pub total_cost: Decimal,
}

impl PurchaseReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn get(&self, row_id: RowId) -> Option<&PurchaseOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.row_id == row_id)
            .map(|o| &o.outcome)
    }

    pub fn summary(&self) -> ReportSummary {
        let mut s = ReportSummary::default();
        for RowOutcome { outcome, .. } in &self.outcomes {
            match outcome {
                PurchaseOutcome::Artifact {
                    artifact,
                    from_cache,
                } => {
                    if *from_cache {
                        s.cached += 1;
                    } else {
                        s.purchased += 1;
                    }
                    s.total_cost += artifact.cost;
                }
                PurchaseOutcome::Failed { .. } => s.failed += 1,
                PurchaseOutcome::Skipped { .. } => s.skipped += 1,
                PurchaseOutcome::Cancelled => s.cancelled += 1,
            }
        }
        s
    }
}
