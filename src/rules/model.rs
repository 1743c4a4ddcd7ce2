//! Rule set, detection rule, and classification types.

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::orders::model::OrderRow;

/// Letter vs. package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentKind {
    Letter,
    Package,
}

impl fmt::Display for ShipmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Letter => f.write_str("letter"),
            Self::Package => f.write_str("package"),
        }
    }
}

/// Carrier predefined package names a rule can assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredefinedPackage {
    Letter,
    Flat,
    /// Not a carrier package: promotes the row to `ShipmentKind::Package`.
    Package,
}

impl PredefinedPackage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Letter => "Letter",
            Self::Flat => "Flat",
            Self::Package => "Package",
        }
    }
}

/// Parcel dimensions in inches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
}

impl Dimensions {
    pub fn new(length: Decimal, width: Decimal, height: Decimal) -> Self {
        Self {
            length,
            width,
            height,
        }
    }

    pub fn is_positive(&self) -> bool {
        [self.length, self.width, self.height]
            .iter()
            .all(|d| *d > Decimal::ZERO)
    }
}

/// Defaults a rule assigns to rows whose item count falls in its range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub weight_oz: Decimal,
    pub machinable: bool,
    /// Explicit service; falls back to the configured per-kind default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub predefined_package: PredefinedPackage,
}

/// One inclusive `item_count` range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub min_items: u32,
    pub max_items: u32,
    #[serde(flatten)]
    pub outcome: RuleOutcome,
}

impl Rule {
    pub fn contains(&self, item_count: u32) -> bool {
        (self.min_items..=self.max_items).contains(&item_count)
    }
}

#[derive(Deserialize)]
struct RawRuleSet {
    rules: Vec<Rule>,
    fallback: RuleOutcome,
}

/// Ordered, non-overlapping item-count ranges plus a fallback.
///
/// Always validated: construct through `RuleSet::new` or deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRuleSet")]
pub struct RuleSet {
    rules: Vec<Rule>,
    fallback: RuleOutcome,
}

impl TryFrom<RawRuleSet> for RuleSet {
    type Error = ConfigError;

    fn try_from(raw: RawRuleSet) -> Result<Self, Self::Error> {
        Self::new(raw.rules, raw.fallback)
    }
}

impl RuleSet {
    /// Sort ranges ascending and reject inverted or overlapping ones.
    pub fn new(mut rules: Vec<Rule>, fallback: RuleOutcome) -> Result<Self, ConfigError> {
        rules.sort_by_key(|r| r.min_items);

        for rule in &rules {
            if rule.min_items > rule.max_items {
                return Err(ConfigError::InvalidValue {
                    key: "rules".into(),
                    message: format!(
                        "range [{}, {}] has min above max",
                        rule.min_items, rule.max_items
                    ),
                });
            }
            check_weight(&rule.outcome)?;
        }
        check_weight(&fallback)?;

        for pair in rules.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if b.min_items <= a.max_items {
                return Err(ConfigError::OverlappingRules {
                    first_min: a.min_items,
                    first_max: a.max_items,
                    second_min: b.min_items,
                    second_max: b.max_items,
                });
            }
        }

        Ok(Self { rules, fallback })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn fallback(&self) -> &RuleOutcome {
        &self.fallback
    }

    /// First range containing `item_count` (ascending), else the fallback.
    pub fn lookup(&self, item_count: u32) -> &RuleOutcome {
        self.rules
            .iter()
            .find(|r| r.contains(item_count))
            .map(|r| &r.outcome)
            .unwrap_or(&self.fallback)
    }
}

fn check_weight(outcome: &RuleOutcome) -> Result<(), ConfigError> {
    if outcome.weight_oz <= Decimal::ZERO {
        return Err(ConfigError::InvalidValue {
            key: "rules.weight_oz".into(),
            message: format!("weight must be positive, got {}", outcome.weight_oz),
        });
    }
    Ok(())
}

fn letter(weight_oz: Decimal, machinable: bool, pkg: PredefinedPackage) -> RuleOutcome {
    RuleOutcome {
        weight_oz,
        machinable,
        service: None,
        predefined_package: pkg,
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        let range = |min_items, max_items, outcome| Rule {
            min_items,
            max_items,
            outcome,
        };
        Self {
            rules: vec![
                range(0, 7, letter(dec!(1), true, PredefinedPackage::Letter)),
                range(8, 14, letter(dec!(2), true, PredefinedPackage::Letter)),
                range(15, 36, letter(dec!(3.5), false, PredefinedPackage::Letter)),
                range(37, 80, letter(dec!(6), true, PredefinedPackage::Flat)),
                range(81, 9999, letter(dec!(1), true, PredefinedPackage::Package)),
            ],
            fallback: letter(dec!(1), true, PredefinedPackage::Package),
        }
    }
}

/// The single signal that decides whether a row defaults to a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum DetectionRule {
    /// Shipping paid strictly above `threshold`.
    PriceAbove { threshold: Decimal },
    /// Item count strictly above `threshold`.
    ItemCountAbove { threshold: u32 },
    /// Shipping paid equal to one of `values` (marketplaces that encode
    /// the shipping tier the buyer picked as a fixed price).
    PriceIn { values: Vec<Decimal> },
}

impl Default for DetectionRule {
    fn default() -> Self {
        Self::PriceAbove {
            threshold: dec!(5.00),
        }
    }
}

impl DetectionRule {
    /// Rows lacking the signal (no shipping price) stay letters.
    pub fn is_package(&self, row: &OrderRow) -> bool {
        match self {
            Self::PriceAbove { threshold } => row
                .shipping_price_paid
                .is_some_and(|paid| paid > *threshold),
            Self::ItemCountAbove { threshold } => row.item_count > *threshold,
            Self::PriceIn { values } => row
                .shipping_price_paid
                .is_some_and(|paid| values.iter().any(|v| *v == paid)),
        }
    }
}

/// Derived shipping attributes for one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: ShipmentKind,
    pub weight_oz: Decimal,
    pub machinable: bool,
    pub service: String,
    /// Only ever set by an override.
    pub dimensions: Option<Dimensions>,
    /// Carrier package for letters; `None` for packages.
    pub predefined_package: Option<PredefinedPackage>,
}
