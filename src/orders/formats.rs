//! Per-marketplace header signatures and column mappings.
//!
//! Each schema is a pure function from a raw record to an `OrderRow`.
//! Header names are compared after `normalize_header`.

use std::collections::BTreeSet;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::NormalizeError;
use crate::orders::model::{Address, MarketplaceFormat, OrderRow, RowId};
use crate::orders::table::RecordView;

const TCG_SIGNATURE: &[&str] = &[
    "firstname",
    "lastname",
    "address1",
    "city",
    "state",
    "postalcode",
    "itemcount",
];

const MANAPOOL_SIGNATURE: &[&str] = &[
    "shippingname",
    "shippingline1",
    "shippingcity",
    "shippingstate",
    "shippingzip",
    "itemcount",
];

const MANAPOOL_SHIPPING_COLUMNS: &[&str] =
    &["shipping", "shippingprice", "shippingtotal", "shippingamount"];

/// A marketplace whose exports we know how to map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    TcgPlayer,
    Manapool,
}

impl Schema {
    pub const ALL: [Schema; 2] = [Schema::TcgPlayer, Schema::Manapool];

    pub fn format(&self) -> MarketplaceFormat {
        match self {
            Self::TcgPlayer => MarketplaceFormat::TcgPlayer,
            Self::Manapool => MarketplaceFormat::Manapool,
        }
    }

    /// Normalized columns an export must contain to be this schema.
    pub fn signature(&self) -> &'static [&'static str] {
        match self {
            Self::TcgPlayer => TCG_SIGNATURE,
            Self::Manapool => MANAPOOL_SIGNATURE,
        }
    }

    /// Exact or superset match of the signature.
    pub fn matches(&self, headers: &BTreeSet<String>) -> bool {
        self.signature().iter().all(|col| headers.contains(*col))
    }

    /// Whether rows are re-ordered by `sort_key` after mapping.
    pub fn sorts_by_label_number(&self) -> bool {
        matches!(self, Self::Manapool)
    }

    /// Map one raw record. Missing address parts yield `IncompleteRow`.
    pub fn map_record(
        &self,
        record: &RecordView<'_>,
        row_id: RowId,
        default_country: &str,
    ) -> Result<OrderRow, NormalizeError> {
        let fields = match self {
            Self::TcgPlayer => tcg_fields(record),
            Self::Manapool => manapool_fields(record),
        };

        let mut missing = Vec::new();
        for (value, name) in [
            (fields.name.as_deref(), "name"),
            (fields.street1, "street1"),
            (fields.city, "city"),
            (fields.region, "region"),
            (fields.postal_code, "postal_code"),
            (fields.item_count, "item_count"),
        ] {
            if value.is_none_or(str::is_empty) {
                missing.push(name);
            }
        }
        if !missing.is_empty() {
            return Err(NormalizeError::IncompleteRow { row_id, missing });
        }

        let raw_count = fields.item_count.unwrap_or_default();
        let item_count = parse_count(raw_count).ok_or_else(|| NormalizeError::InvalidField {
            row_id,
            field: "item_count",
            value: raw_count.to_string(),
        })?;

        let recipient = Address {
            name: fields.name.unwrap_or_default(),
            street1: fields.street1.unwrap_or_default().to_string(),
            street2: fields.street2.unwrap_or_default().to_string(),
            city: fields.city.unwrap_or_default().to_string(),
            region: fields.region.unwrap_or_default().to_string(),
            postal_code: fields.postal_code.unwrap_or_default().to_string(),
            country: fields.country.unwrap_or_default().to_string(),
            ..Default::default()
        }
        .canonical(default_country);

        Ok(OrderRow {
            row_id,
            recipient,
            item_count,
            declared_value: parse_money(row_id, "declared_value", fields.declared_value)?,
            shipping_price_paid: parse_money(row_id, "shipping_price_paid", fields.shipping_paid)?,
            marketplace_format: self.format(),
            sort_key: fields.sort_key.map(str::to_string),
            order_ref: fields.order_ref.map(str::to_string),
        })
    }
}

/// Borrowed cells picked out of one record, before validation.
#[derive(Default)]
struct MappedFields<'a> {
    name: Option<String>,
    street1: Option<&'a str>,
    street2: Option<&'a str>,
    city: Option<&'a str>,
    region: Option<&'a str>,
    postal_code: Option<&'a str>,
    country: Option<&'a str>,
    item_count: Option<&'a str>,
    declared_value: Option<&'a str>,
    shipping_paid: Option<&'a str>,
    sort_key: Option<&'a str>,
    order_ref: Option<&'a str>,
}

fn tcg_fields<'a>(record: &RecordView<'a>) -> MappedFields<'a> {
    let name = match (record.get("firstname"), record.get("lastname")) {
        (None, None) => None,
        (first, last) => Some(
            format!("{} {}", first.unwrap_or_default(), last.unwrap_or_default())
                .trim()
                .to_string(),
        ),
    };
    MappedFields {
        name,
        street1: record.get("address1"),
        street2: record.get("address2"),
        city: record.get("city"),
        region: record.get("state"),
        postal_code: record.get("postalcode"),
        country: record.get("country"),
        item_count: record.get("itemcount"),
        declared_value: record.get("valueofproducts"),
        shipping_paid: record.get("shippingfeepaid"),
        sort_key: None,
        order_ref: record.first_of(&["order#", "ordernumber"]),
    }
}

fn manapool_fields<'a>(record: &RecordView<'a>) -> MappedFields<'a> {
    MappedFields {
        name: record.get("shippingname").map(str::to_string),
        street1: record.get("shippingline1"),
        street2: record.get("shippingline2"),
        city: record.get("shippingcity"),
        region: record.get("shippingstate"),
        postal_code: record.get("shippingzip"),
        country: record.get("shippingcountry"),
        item_count: record.get("itemcount"),
        declared_value: record.get("total"),
        shipping_paid: record.first_of(MANAPOOL_SHIPPING_COLUMNS),
        sort_key: record.get("sellerlabelnumber"),
        order_ref: record.first_of(&["orderid", "id"]),
    }
}

/// Item counts are whole numbers; exports sometimes write them as `"3.0"`.
fn parse_count(raw: &str) -> Option<u32> {
    if let Ok(n) = raw.parse::<u32>() {
        return Some(n);
    }
    let d = Decimal::from_str(raw).ok()?;
    if d.is_sign_negative() || !d.fract().is_zero() {
        return None;
    }
    d.to_u32()
}

/// Parse a money cell such as `"$1,204.50"`. Empty cells are `None`.
pub(crate) fn parse_money(
    row_id: RowId,
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<Decimal>, NormalizeError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '$' | ',' | ' ')).collect();
    if cleaned.is_empty() {
        return Ok(None);
    }
    Decimal::from_str(&cleaned)
        .map(Some)
        .map_err(|_| NormalizeError::InvalidField {
            row_id,
            field,
            value: raw.to_string(),
        })
}
