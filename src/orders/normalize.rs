//! Schema normalizer: detects the marketplace format and maps raw records
//! into canonical order rows.
//!
//! Flow:
//! 1. Resolve the schema (explicit hint, or header-signature detection)
//! 2. Map each record; incomplete rows are collected, never fatal
//! 3. Manapool batches are stably re-ordered by seller label number

use std::cmp::Ordering;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::NormalizeError;
use crate::orders::formats::Schema;
use crate::orders::model::{FormatHint, MarketplaceFormat, OrderRow, RowId};
use crate::orders::table::RawTable;

/// A row that could not be normalized, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIssue {
    pub row_id: RowId,
    pub message: String,
    #[serde(skip)]
    pub error: NormalizeError,
}

impl RowIssue {
    pub fn new(row_id: RowId, error: NormalizeError) -> Self {
        Self {
            row_id,
            message: error.to_string(),
            error,
        }
    }
}

/// Result of normalizing one export.
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub format: MarketplaceFormat,
    /// Rows in processing order (input order, or label-number order for Manapool).
    pub rows: Vec<OrderRow>,
    /// Rows rejected during mapping, in input order.
    pub issues: Vec<RowIssue>,
}

/// Detect the schema from the header set. Exactly one signature must match.
pub fn detect_schema(table: &RawTable) -> Result<Schema, NormalizeError> {
    let headers = table.header_set();
    let matched: Vec<Schema> = Schema::ALL
        .into_iter()
        .filter(|s| s.matches(&headers))
        .collect();

    match matched.as_slice() {
        [schema] => Ok(*schema),
        [] => Err(NormalizeError::UnrecognizedFormat {
            headers: table.headers().to_vec(),
        }),
        many => Err(NormalizeError::AmbiguousFormat {
            candidates: many.iter().map(|s| s.format().label().to_string()).collect(),
        }),
    }
}

/// Normalize a raw table into order rows.
///
/// Only format resolution can fail; per-row problems land in `issues`.
pub fn normalize(
    table: &RawTable,
    hint: FormatHint,
    default_country: &str,
) -> Result<NormalizedBatch, NormalizeError> {
    let schema = match hint {
        FormatHint::Auto => detect_schema(table)?,
        FormatHint::TcgPlayer => Schema::TcgPlayer,
        FormatHint::Manapool => Schema::Manapool,
    };

    info!(
        format = %schema.format(),
        records = table.len(),
        ?hint,
        "Normalizing marketplace export"
    );

    let mut rows = Vec::with_capacity(table.len());
    let mut issues = Vec::new();

    for (idx, record) in table.records().enumerate() {
        let row_id = RowId(idx);
        match schema.map_record(&record, row_id, default_country) {
            Ok(row) => rows.push(row),
            Err(e) => {
                warn!(row_id = %row_id, error = %e, "Row rejected during normalization");
                issues.push(RowIssue::new(row_id, e));
            }
        }
    }

    if schema.sorts_by_label_number() {
        sort_by_label_number(&mut rows);
        debug!(rows = rows.len(), "Sorted rows by seller label number");
    }

    info!(
        format = %schema.format(),
        rows = rows.len(),
        rejected = issues.len(),
        "Normalization complete"
    );

    Ok(NormalizedBatch {
        format: schema.format(),
        rows,
        issues,
    })
}

/// Stable ascending sort by `sort_key`.
///
/// Keys compare numerically when every present key is a number, lexically
/// otherwise. Rows without a key go last.
pub fn sort_by_label_number(rows: &mut [OrderRow]) {
    let numeric: Option<Vec<Option<Decimal>>> = rows
        .iter()
        .map(|r| match r.sort_key.as_deref() {
            None => Some(None),
            Some(k) => Decimal::from_str(k).ok().map(Some),
        })
        .collect();

    match numeric {
        Some(keys) => {
            let mut keyed: Vec<(Option<Decimal>, OrderRow)> =
                keys.into_iter().zip(rows.iter().cloned()).collect();
            keyed.sort_by(|(a, _), (b, _)| missing_last(a.as_ref(), b.as_ref()));
            for (slot, (_, row)) in rows.iter_mut().zip(keyed) {
                *slot = row;
            }
        }
        None => rows.sort_by(|a, b| missing_last(a.sort_key.as_ref(), b.sort_key.as_ref())),
    }
}

fn missing_last<T: Ord>(a: Option<&T>, b: Option<&T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
