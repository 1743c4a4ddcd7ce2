//! Override store: per-row manual edits that win over rule-derived values.
//!
//! A plain key-value map with last-write-wins per field. No validation happens
//! here; the classification engine validates the merged result.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::orders::model::RowId;
use crate::rules::model::{Dimensions, PredefinedPackage, ShipmentKind};

/// Classification field an override replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideField {
    Kind,
    WeightOz,
    Machinable,
    Service,
    Dimensions,
    PredefinedPackage,
}

/// A user-supplied value. The field it replaces is implied by the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum OverrideValue {
    Kind(ShipmentKind),
    WeightOz(Decimal),
    Machinable(bool),
    Service(String),
    Dimensions(Dimensions),
    PredefinedPackage(PredefinedPackage),
}

impl OverrideValue {
    pub fn field(&self) -> OverrideField {
        match self {
            Self::Kind(_) => OverrideField::Kind,
            Self::WeightOz(_) => OverrideField::WeightOz,
            Self::Machinable(_) => OverrideField::Machinable,
            Self::Service(_) => OverrideField::Service,
            Self::Dimensions(_) => OverrideField::Dimensions,
            Self::PredefinedPackage(_) => OverrideField::PredefinedPackage,
        }
    }
}

/// All overrides recorded for one row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowOverrides(BTreeMap<OverrideField, OverrideValue>);

impl RowOverrides {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = OverrideField> + '_ {
        self.0.keys().copied()
    }

    pub fn get(&self, field: OverrideField) -> Option<&OverrideValue> {
        self.0.get(&field)
    }

    pub fn kind(&self) -> Option<ShipmentKind> {
        match self.get(OverrideField::Kind)? {
            OverrideValue::Kind(k) => Some(*k),
            _ => None,
        }
    }

    pub fn weight_oz(&self) -> Option<Decimal> {
        match self.get(OverrideField::WeightOz)? {
            OverrideValue::WeightOz(w) => Some(*w),
            _ => None,
        }
    }

    pub fn machinable(&self) -> Option<bool> {
        match self.get(OverrideField::Machinable)? {
            OverrideValue::Machinable(m) => Some(*m),
            _ => None,
        }
    }

    pub fn service(&self) -> Option<&str> {
        match self.get(OverrideField::Service)? {
            OverrideValue::Service(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        match self.get(OverrideField::Dimensions)? {
            OverrideValue::Dimensions(d) => Some(*d),
            _ => None,
        }
    }

    pub fn predefined_package(&self) -> Option<PredefinedPackage> {
        match self.get(OverrideField::PredefinedPackage)? {
            OverrideValue::PredefinedPackage(p) => Some(*p),
            _ => None,
        }
    }

    fn insert(&mut self, value: OverrideValue) {
        self.0.insert(value.field(), value);
    }
}

/// Overrides for the loaded batch, keyed by stable row id.
#[derive(Debug, Clone, Default)]
pub struct OverrideStore {
    rows: HashMap<RowId, RowOverrides>,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or replace the override for `value.field()` on `row_id`.
    pub fn set(&mut self, row_id: RowId, value: OverrideValue) {
        debug!(row_id = %row_id, field = ?value.field(), "Override set");
        self.rows.entry(row_id).or_default().insert(value);
    }

    /// Remove a single field's override.
    pub fn unset(&mut self, row_id: RowId, field: OverrideField) {
        if let Some(overrides) = self.rows.get_mut(&row_id) {
            overrides.0.remove(&field);
            if overrides.is_empty() {
                self.rows.remove(&row_id);
            }
        }
    }

    /// Remove all overrides for a row.
    pub fn clear(&mut self, row_id: RowId) {
        if self.rows.remove(&row_id).is_some() {
            debug!(row_id = %row_id, "Overrides cleared");
        }
    }

    /// Drop every override (a new batch was loaded).
    pub fn clear_all(&mut self) {
        self.rows.clear();
    }

    /// Current overrides for a row; empty when none were set.
    pub fn get(&self, row_id: RowId) -> RowOverrides {
        self.rows.get(&row_id).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
