//! Classification engine: letter vs. package plus weight, machinability and service.
//!
//! For each row:
//! 1. Kind from the detection rule (skipped when the kind is overridden)
//! 2. Defaults from the first matching item-count range (or the fallback)
//! 3. Every overridden field replaces the rule-derived value
//! 4. Validation: purchasable, or `NotPurchasable` with reasons
//!
//! The engine is pure: same row, rules and overrides give the same result.

use std::collections::BTreeSet;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ServiceDefaults, ShipConfig};
use crate::orders::model::{OrderRow, RowId};
use crate::rules::model::{Classification, DetectionRule, PredefinedPackage, RuleSet, ShipmentKind};
use crate::rules::overrides::{OverrideField, OverrideStore, RowOverrides};

/// Why a row cannot be purchased yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotPurchasableReason {
    MissingDimensions,
    NonPositiveDimensions,
    NonPositiveWeight,
    MissingService,
}

impl fmt::Display for NotPurchasableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingDimensions => "package needs length, width and height",
            Self::NonPositiveDimensions => "package dimensions must be positive",
            Self::NonPositiveWeight => "weight must be positive",
            Self::MissingService => "no shipping service selected",
        })
    }
}

/// Whether a classified row may be submitted for purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Readiness {
    Purchasable,
    NotPurchasable { reasons: Vec<NotPurchasableReason> },
}

impl Readiness {
    pub fn is_purchasable(&self) -> bool {
        matches!(self, Self::Purchasable)
    }

    /// Reasons joined for display.
    pub fn describe(&self) -> String {
        match self {
            Self::Purchasable => "ready".to_string(),
            Self::NotPurchasable { reasons } => reasons
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

/// An order row with its classification: the unit handed to purchase and export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRow {
    pub row: OrderRow,
    pub classification: Classification,
    pub readiness: Readiness,
    /// Fields whose value came from an override.
    pub overridden: BTreeSet<OverrideField>,
}

impl EnrichedRow {
    pub fn row_id(&self) -> RowId {
        self.row.row_id
    }
}

/// Rules engine bound to one rule set, detection rule and service defaults.
#[derive(Debug, Clone)]
pub struct RulesEngine {
    rules: RuleSet,
    detection: DetectionRule,
    defaults: ServiceDefaults,
}

impl RulesEngine {
    pub fn new(rules: RuleSet, detection: DetectionRule, defaults: ServiceDefaults) -> Self {
        Self {
            rules,
            detection,
            defaults,
        }
    }

    pub fn from_config(config: &ShipConfig) -> Self {
        Self::new(
            config.rules.clone(),
            config.detection.clone(),
            config.defaults.clone(),
        )
    }

    /// Classify one row against its overrides.
    pub fn classify(&self, row: &OrderRow, overrides: &RowOverrides) -> EnrichedRow {
        let outcome = self.rules.lookup(row.item_count);

        // Step 1: kind. A rule naming `Package` promotes, detection may too.
        let kind = overrides.kind().unwrap_or_else(|| {
            if self.detection.is_package(row)
                || outcome.predefined_package == PredefinedPackage::Package
            {
                ShipmentKind::Package
            } else {
                ShipmentKind::Letter
            }
        });

        // Step 2: rule defaults for that kind. A letter rule's service never
        // applies to a package.
        let is_package_rule = outcome.predefined_package == PredefinedPackage::Package;
        let rule_service = match kind {
            ShipmentKind::Letter => outcome.service.as_ref().unwrap_or(&self.defaults.service),
            ShipmentKind::Package if is_package_rule => outcome
                .service
                .as_ref()
                .unwrap_or(&self.defaults.package_service),
            ShipmentKind::Package => &self.defaults.package_service,
        };
        let rule_package = match (kind, outcome.predefined_package) {
            (ShipmentKind::Package, _) | (_, PredefinedPackage::Package) => None,
            (ShipmentKind::Letter, pkg) => Some(pkg),
        };

        // Step 3: overrides win field by field.
        let classification = Classification {
            kind,
            weight_oz: overrides.weight_oz().unwrap_or(outcome.weight_oz),
            machinable: overrides.machinable().unwrap_or(outcome.machinable),
            service: overrides
                .service()
                .map(str::to_string)
                .unwrap_or_else(|| rule_service.clone()),
            dimensions: overrides.dimensions(),
            predefined_package: match kind {
                ShipmentKind::Letter => overrides.predefined_package().or(rule_package),
                ShipmentKind::Package => None,
            },
        };

        // Step 4: validation.
        let readiness = validate(&classification);

        debug!(
            row_id = %row.row_id,
            kind = %classification.kind,
            weight_oz = %classification.weight_oz,
            machinable = classification.machinable,
            service = %classification.service,
            purchasable = readiness.is_purchasable(),
            overrides = overrides.fields().count(),
            "Row classified"
        );

        EnrichedRow {
            row: row.clone(),
            classification,
            readiness,
            overridden: overrides
                .fields()
                .filter(|f| {
                    !(kind == ShipmentKind::Package && *f == OverrideField::PredefinedPackage)
                })
                .collect(),
        }
    }

    /// Classify every row, consulting the store per row id. Output follows input order.
    pub fn classify_all(&self, rows: &[OrderRow], store: &OverrideStore) -> Vec<EnrichedRow> {
        rows.iter()
            .map(|row| self.classify(row, &store.get(row.row_id)))
            .collect()
    }
}

fn validate(c: &Classification) -> Readiness {
    let mut reasons = Vec::new();

    if c.weight_oz <= Decimal::ZERO {
        reasons.push(NotPurchasableReason::NonPositiveWeight);
    }
    if c.service.trim().is_empty() {
        reasons.push(NotPurchasableReason::MissingService);
    }
    if c.kind == ShipmentKind::Package {
        match c.dimensions {
            None => reasons.push(NotPurchasableReason::MissingDimensions),
            Some(d) if !d.is_positive() => {
                reasons.push(NotPurchasableReason::NonPositiveDimensions)
            }
            Some(_) => {}
        }
    }

    if reasons.is_empty() {
        Readiness::Purchasable
    } else {
        Readiness::NotPurchasable { reasons }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::orders::model::{Address, MarketplaceFormat};
    use crate::rules::model::{Dimensions, Rule, RuleOutcome};
    use crate::rules::overrides::OverrideValue;

    fn make_row(id: usize, item_count: u32, price: Option<Decimal>) -> OrderRow {
        OrderRow {
            row_id: RowId(id),
            recipient: Address {
                name: "Ada Lovelace".into(),
                street1: "1 Main St".into(),
                city: "Riverside".into(),
                region: "CA".into(),
                postal_code: "92504".into(),
                country: "US".into(),
                ..Default::default()
            },
            item_count,
            declared_value: None,
            shipping_price_paid: price,
            marketplace_format: MarketplaceFormat::TcgPlayer,
            sort_key: None,
            order_ref: None,
        }
    }

    /// `[1,3] → (1.0oz, machinable, "First")`, fallback 3oz non-machinable.
    fn simple_engine() -> RulesEngine {
        let rules = RuleSet::new(
            vec![Rule {
                min_items: 1,
                max_items: 3,
                outcome: RuleOutcome {
                    weight_oz: dec!(1.0),
                    machinable: true,
                    service: Some("First".into()),
                    predefined_package: PredefinedPackage::Letter,
                },
            }],
            RuleOutcome {
                weight_oz: dec!(3),
                machinable: false,
                service: None,
                predefined_package: PredefinedPackage::Flat,
            },
        )
        .unwrap();
        RulesEngine::new(
            rules,
            DetectionRule::PriceAbove {
                threshold: dec!(5.00),
            },
            ServiceDefaults::default(),
        )
    }

    #[test]
    fn cheap_shipping_is_letter() {
        let engine = simple_engine();
        let out = engine.classify(&make_row(0, 1, Some(dec!(3.50))), &RowOverrides::default());
        assert_eq!(out.classification.kind, ShipmentKind::Letter);
        assert!(out.readiness.is_purchasable());
    }

    #[test]
    fn expensive_shipping_is_package_needing_dimensions() {
        let engine = simple_engine();
        let out = engine.classify(&make_row(0, 1, Some(dec!(12.00))), &RowOverrides::default());
        assert_eq!(out.classification.kind, ShipmentKind::Package);
        assert_eq!(out.classification.dimensions, None);
        assert_eq!(
            out.readiness,
            Readiness::NotPurchasable {
                reasons: vec![NotPurchasableReason::MissingDimensions]
            }
        );
        assert_eq!(out.classification.service, "GroundAdvantage");
    }

    #[test]
    fn range_match_yields_rule_tuple() {
        let engine = simple_engine();
        let out = engine.classify(&make_row(0, 2, None), &RowOverrides::default());
        assert_eq!(out.classification.weight_oz, dec!(1.0));
        assert!(out.classification.machinable);
        assert_eq!(out.classification.service, "First");
        assert_eq!(
            out.classification.predefined_package,
            Some(PredefinedPackage::Letter)
        );
        assert!(out.overridden.is_empty());
    }

    #[test]
    fn fallback_applies_outside_ranges() {
        let engine = simple_engine();
        let out = engine.classify(&make_row(0, 50, None), &RowOverrides::default());
        assert_eq!(out.classification.weight_oz, dec!(3));
        assert!(!out.classification.machinable);
        assert_eq!(out.classification.service, "First");
        assert_eq!(out.classification.predefined_package, Some(PredefinedPackage::Flat));
    }

    #[test]
    fn overrides_win_regardless_of_rules() {
        let engine = simple_engine();
        let mut store = OverrideStore::new();
        store.set(RowId(0), OverrideValue::WeightOz(dec!(7.25)));
        store.set(RowId(0), OverrideValue::Machinable(false));
        store.set(RowId(0), OverrideValue::Service("Priority".into()));

        let out = engine.classify(&make_row(0, 2, None), &store.get(RowId(0)));
        assert_eq!(out.classification.weight_oz, dec!(7.25));
        assert!(!out.classification.machinable);
        assert_eq!(out.classification.service, "Priority");
        assert_eq!(out.overridden.len(), 3);
    }

    #[test]
    fn kind_override_skips_detection() {
        let engine = simple_engine();
        let mut store = OverrideStore::new();
        store.set(RowId(0), OverrideValue::Kind(ShipmentKind::Letter));
        let out = engine.classify(&make_row(0, 1, Some(dec!(20))), &store.get(RowId(0)));
        assert_eq!(out.classification.kind, ShipmentKind::Letter);
        assert!(out.readiness.is_purchasable());
    }

    #[test]
    fn package_with_dimension_override_is_purchasable() {
        let engine = simple_engine();
        let mut store = OverrideStore::new();
        store.set(
            RowId(0),
            OverrideValue::Dimensions(Dimensions::new(dec!(9), dec!(6), dec!(2))),
        );
        store.set(RowId(0), OverrideValue::WeightOz(dec!(12)));
        let out = engine.classify(&make_row(0, 1, Some(dec!(12.00))), &store.get(RowId(0)));
        assert_eq!(out.classification.kind, ShipmentKind::Package);
        assert!(out.readiness.is_purchasable());
    }

    #[test]
    fn zero_dimension_and_weight_reported() {
        let engine = simple_engine();
        let mut store = OverrideStore::new();
        store.set(
            RowId(0),
            OverrideValue::Dimensions(Dimensions::new(dec!(9), dec!(0), dec!(2))),
        );
        store.set(RowId(0), OverrideValue::WeightOz(dec!(0)));
        let out = engine.classify(&make_row(0, 1, Some(dec!(12.00))), &store.get(RowId(0)));
        assert_eq!(
            out.readiness,
            Readiness::NotPurchasable {
                reasons: vec![
                    NotPurchasableReason::NonPositiveWeight,
                    NotPurchasableReason::NonPositiveDimensions,
                ]
            }
        );
    }

    #[test]
    fn package_rule_promotes_letter() {
        let engine = RulesEngine::from_config(&ShipConfig::default());
        let out = engine.classify(&make_row(0, 120, None), &RowOverrides::default());
        assert_eq!(out.classification.kind, ShipmentKind::Package);
        assert_eq!(out.classification.predefined_package, None);
    }

    #[test]
    fn detected_package_uses_package_service_over_letter_rule() {
        let engine = simple_engine();
        let letter = engine.classify(&make_row(0, 2, Some(dec!(1))), &RowOverrides::default());
        let package = engine.classify(&make_row(1, 2, Some(dec!(12))), &RowOverrides::default());
        assert_eq!(letter.classification.service, "First");
        assert_eq!(package.classification.service, "GroundAdvantage");

        let mut store = OverrideStore::new();
        store.set(RowId(1), OverrideValue::Service("Priority".into()));
        let edited = engine.classify(&make_row(1, 2, Some(dec!(12))), &store.get(RowId(1)));
        assert_eq!(edited.classification.service, "Priority");
    }

    #[test]
    fn package_rule_keeps_its_own_service() {
        let rules = RuleSet::new(
            vec![Rule {
                min_items: 50,
                max_items: 100,
                outcome: RuleOutcome {
                    weight_oz: dec!(8),
                    machinable: true,
                    service: Some("Priority".into()),
                    predefined_package: PredefinedPackage::Package,
                },
            }],
            RuleSet::default().fallback().clone(),
        )
        .unwrap();
        let engine = RulesEngine::new(rules, DetectionRule::default(), ServiceDefaults::default());
        let out = engine.classify(&make_row(0, 60, None), &RowOverrides::default());
        assert_eq!(out.classification.kind, ShipmentKind::Package);
        assert_eq!(out.classification.service, "Priority");
    }

    #[test]
    fn predefined_package_override_ignored_for_packages() {
        let engine = simple_engine();
        let mut store = OverrideStore::new();
        store.set(RowId(0), OverrideValue::PredefinedPackage(PredefinedPackage::Flat));
        store.set(RowId(0), OverrideValue::Machinable(false));

        let package = engine.classify(&make_row(0, 1, Some(dec!(12))), &store.get(RowId(0)));
        assert_eq!(package.classification.predefined_package, None);
        assert_eq!(package.overridden, BTreeSet::from([OverrideField::Machinable]));

        let letter = engine.classify(&make_row(0, 1, Some(dec!(1))), &store.get(RowId(0)));
        assert_eq!(letter.classification.predefined_package, Some(PredefinedPackage::Flat));
        assert!(letter.overridden.contains(&OverrideField::PredefinedPackage));
    }

    #[test]
    fn item_count_detection_signal() {
        let engine = RulesEngine::new(
            RuleSet::default(),
            DetectionRule::ItemCountAbove { threshold: 10 },
            ServiceDefaults::default(),
        );
        let small = engine.classify(&make_row(0, 10, Some(dec!(50))), &RowOverrides::default());
        let big = engine.classify(&make_row(1, 11, None), &RowOverrides::default());
        assert_eq!(small.classification.kind, ShipmentKind::Letter);
        assert_eq!(big.classification.kind, ShipmentKind::Package);
    }

    #[test]
    fn price_in_detection_signal() {
        let engine = RulesEngine::new(
            RuleSet::default(),
            DetectionRule::PriceIn {
                values: vec![dec!(0), dec!(4.99), dec!(9.99)],
            },
            ServiceDefaults::default(),
        );
        let tier = engine.classify(&make_row(0, 2, Some(dec!(4.99))), &RowOverrides::default());
        let other = engine.classify(&make_row(1, 2, Some(dec!(1.31))), &RowOverrides::default());
        let none = engine.classify(&make_row(2, 2, None), &RowOverrides::default());
        assert_eq!(tier.classification.kind, ShipmentKind::Package);
        assert_eq!(other.classification.kind, ShipmentKind::Letter);
        assert_eq!(none.classification.kind, ShipmentKind::Letter);
    }

    #[test]
    fn classification_is_idempotent() {
        let engine = simple_engine();
        let mut store = OverrideStore::new();
        store.set(RowId(3), OverrideValue::Machinable(false));
        let row = make_row(3, 2, Some(dec!(12)));
        let first = engine.classify(&row, &store.get(RowId(3)));
        let second = engine.classify(&row, &store.get(RowId(3)));
        assert_eq!(first, second);
    }

    #[test]
    fn editing_one_row_affects_only_that_row() {
        let engine = simple_engine();
        let rows = vec![make_row(0, 2, None), make_row(1, 2, None), make_row(2, 2, None)];
        let mut store = OverrideStore::new();
        let before = engine.classify_all(&rows, &store);

        store.set(RowId(1), OverrideValue::WeightOz(dec!(4)));
        let after = engine.classify_all(&rows, &store);

        assert_eq!(before[0], after[0]);
        assert_eq!(before[2], after[2]);
        assert_ne!(before[1], after[1]);
        assert_eq!(after[1].classification.weight_oz, dec!(4));
    }
}
