//! Print assembly: which label images go into the merged document, in what
//! order and layout, and which rows need the user's attention instead.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::error::RenderError;
use crate::labels::types::{PurchaseOutcome, PurchaseReport};
use crate::orders::model::RowId;
use crate::rules::model::ShipmentKind;

/// Output page size (4×6 in thermal label stock).
pub const PAGE_WIDTH_IN: u32 = 4;
pub const PAGE_HEIGHT_IN: u32 = 6;
/// Render resolution for the merged document.
pub const PAGE_DPI: u32 = 300;

/// How a label image is placed on its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageLayout {
    /// Landscape letter label: rotate to portrait and pad onto the page.
    RotateToPortrait,
    /// Package label already sized for the page.
    AsIs,
}

impl From<ShipmentKind> for PageLayout {
    fn from(kind: ShipmentKind) -> Self {
        match kind {
            ShipmentKind::Letter => Self::RotateToPortrait,
            ShipmentKind::Package => Self::AsIs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelPage {
    pub row_id: RowId,
    pub label_image_ref: String,
    pub layout: PageLayout,
}

/// A row left out of the document, with why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewItem {
    pub row_id: RowId,
    /// Outcome label: `failed`, `skipped` or `cancelled`.
    pub status: &'static str,
    pub reason: String,
    pub provider_detail: Option<String>,
}

/// Everything the renderer needs for one merged document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblyRequest {
    /// One page per label, in row order.
    pub pages: Vec<LabelPage>,
    pub needs_review: Vec<ReviewItem>,
    pub page_width_in: u32,
    pub page_height_in: u32,
    pub dpi: u32,
}

impl AssemblyRequest {
    /// Build from a purchase report. Every row ends up in exactly one of
    /// `pages` or `needs_review`.
    pub fn from_report(report: &PurchaseReport) -> Self {
        let mut pages = Vec::new();
        let mut needs_review = Vec::new();

        for row in &report.outcomes {
            let status = row.outcome.label();
            match &row.outcome {
                PurchaseOutcome::Artifact { artifact, .. } => pages.push(LabelPage {
                    row_id: row.row_id,
                    label_image_ref: artifact.label_image_ref.clone(),
                    layout: artifact.kind.into(),
                }),
                PurchaseOutcome::Failed {
                    reason,
                    provider_detail,
                } => needs_review.push(ReviewItem {
                    row_id: row.row_id,
                    status,
                    reason: reason.clone(),
                    provider_detail: Some(provider_detail.clone()),
                }),
                PurchaseOutcome::Skipped { reason } => needs_review.push(ReviewItem {
                    row_id: row.row_id,
                    status,
                    reason: reason.clone(),
                    provider_detail: None,
                }),
                PurchaseOutcome::Cancelled => needs_review.push(ReviewItem {
                    row_id: row.row_id,
                    status,
                    reason: "run cancelled before this row started".to_string(),
                    provider_detail: None,
                }),
            }
        }

        info!(
            pages = pages.len(),
            needs_review = needs_review.len(),
            "Assembly request built"
        );

        Self {
            pages,
            needs_review,
            page_width_in: PAGE_WIDTH_IN,
            page_height_in: PAGE_HEIGHT_IN,
            dpi: PAGE_DPI,
        }
    }

    pub fn page_pixels(&self) -> (u32, u32) {
        (self.page_width_in * self.dpi, self.page_height_in * self.dpi)
    }
}

/// Produces the merged printable document from an assembly request.
#[async_trait]
pub trait LabelRenderer: Send + Sync {
    /// Render every page in order; returns the output document location.
    async fn render(&self, request: &AssemblyRequest) -> Result<PathBuf, RenderError>;
}
