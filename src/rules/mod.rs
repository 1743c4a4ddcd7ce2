//! Shipment classification.
//!
//! `RuleSet` + `DetectionRule` give per-row defaults, `OverrideStore` holds
//! the user's edits, and `RulesEngine` merges the two into an `EnrichedRow`.

pub mod engine;
pub mod model;
pub mod overrides;

pub use engine::{EnrichedRow, NotPurchasableReason, Readiness, RulesEngine};
pub use model::{
    Classification, DetectionRule, Dimensions, PredefinedPackage, Rule, RuleOutcome, RuleSet,
    ShipmentKind,
};
pub use overrides::{OverrideField, OverrideStore, OverrideValue, RowOverrides};
