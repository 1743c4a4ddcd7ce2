//! Canonical order row model shared by every marketplace format.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stable identity of a row: its index in the raw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub usize);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marketplace a shipping export came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketplaceFormat {
    TcgPlayer,
    Manapool,
    Unknown,
}

impl MarketplaceFormat {
    pub fn label(&self) -> &'static str {
        match self {
            Self::TcgPlayer => "TCGplayer",
            Self::Manapool => "Manapool",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for MarketplaceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Format selector supplied alongside a raw table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatHint {
    #[default]
    Auto,
    TcgPlayer,
    Manapool,
}

impl std::str::FromStr for FormatHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "tcgplayer" | "tcgp" | "tcg" => Ok(Self::TcgPlayer),
            "manapool" | "mp" => Ok(Self::Manapool),
            other => Err(format!(
                "unknown format '{other}' (expected auto, tcgplayer or manapool)"
            )),
        }
    }
}

/// Structured postal address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub name: String,
    pub company: String,
    pub phone: String,
    pub email: String,
    pub street1: String,
    pub street2: String,
    pub city: String,
    /// State / province.
    pub region: String,
    pub postal_code: String,
    pub country: String,
}

impl Address {
    /// Trimmed, upper-cased region and country; postal code kept as text.
    /// A blank country becomes `default_country`.
    pub fn canonical(&self, default_country: &str) -> Self {
        let country = match self.country.trim() {
            "" => default_country.trim(),
            set => set,
        }
        .to_ascii_uppercase();
        Self {
            name: self.name.trim().to_string(),
            company: self.company.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: self.email.trim().to_string(),
            street1: self.street1.trim().to_string(),
            street2: self.street2.trim().to_string(),
            city: self.city.trim().to_string(),
            region: self.region.trim().to_ascii_uppercase(),
            postal_code: self.postal_code.trim().to_string(),
            country,
        }
    }
}

/// One shipment, normalized from any marketplace export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRow {
    pub row_id: RowId,
    pub recipient: Address,
    pub item_count: u32,
    pub declared_value: Option<Decimal>,
    /// Shipping the buyer paid; used as a package-detection signal.
    pub shipping_price_paid: Option<Decimal>,
    pub marketplace_format: MarketplaceFormat,
    /// Seller label number (Manapool) used for print ordering.
    pub sort_key: Option<String>,
    /// Marketplace order number, when the export carries one.
    pub order_ref: Option<String>,
}
