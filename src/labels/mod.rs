//! Label acquisition and print assembly.

pub mod assembly;
pub mod cache;
pub mod fingerprint;
pub mod orchestrator;
pub mod types;

pub use assembly::{AssemblyRequest, LabelPage, LabelRenderer, PageLayout, ReviewItem};
pub use cache::LabelCache;
pub use fingerprint::Fingerprint;
pub use orchestrator::{CancelFlag, Orchestrator};
pub use types::{
    LabelArtifact, LabelService, PurchaseOutcome, PurchaseReport, PurchasedLabel, ReportSummary,
    RowOutcome, ShipmentRequest,
};
