//! CSV exports.
//!
//! 1. Batch export: purchasable rows in the carrier portal's bulk-upload
//!    columns, for buying labels outside the app.
//! 2. Fulfillment export: tracking numbers of bought labels keyed by
//!    marketplace order, for marking orders shipped.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ServiceDefaults;
use crate::error::ExportError;
use crate::labels::types::{LabelArtifact, PurchaseReport, ShipmentRequest};
use crate::orders::model::RowId;
use crate::orders::model::Address;
use crate::rules::engine::EnrichedRow;

/// One export line. Column names follow the portal's dotted headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchExportRow {
    #[serde(rename = "to_address.name")]
    pub to_name: String,
    #[serde(rename = "to_address.company")]
    pub to_company: String,
    #[serde(rename = "to_address.phone")]
    pub to_phone: String,
    #[serde(rename = "to_address.email")]
    pub to_email: String,
    #[serde(rename = "to_address.street1")]
    pub to_street1: String,
    #[serde(rename = "to_address.street2")]
    pub to_street2: String,
    #[serde(rename = "to_address.city")]
    pub to_city: String,
    #[serde(rename = "to_address.state")]
    pub to_state: String,
    #[serde(rename = "to_address.zip")]
    pub to_zip: String,
    #[serde(rename = "to_address.country")]
    pub to_country: String,

    #[serde(rename = "from_address.name")]
    pub from_name: String,
    #[serde(rename = "from_address.company")]
    pub from_company: String,
    #[serde(rename = "from_address.phone")]
    pub from_phone: String,
    #[serde(rename = "from_address.email")]
    pub from_email: String,
    #[serde(rename = "from_address.street1")]
    pub from_street1: String,
    #[serde(rename = "from_address.street2")]
    pub from_street2: String,
    #[serde(rename = "from_address.city")]
    pub from_city: String,
    #[serde(rename = "from_address.state")]
    pub from_state: String,
    #[serde(rename = "from_address.zip")]
    pub from_zip: String,
    #[serde(rename = "from_address.country")]
    pub from_country: String,

    #[serde(rename = "parcel.length")]
    pub length: Option<Decimal>,
    #[serde(rename = "parcel.width")]
    pub width: Option<Decimal>,
    #[serde(rename = "parcel.height")]
    pub height: Option<Decimal>,
    #[serde(rename = "parcel.weight")]
    pub weight: Decimal,
    #[serde(rename = "parcel.predefined_package")]
    pub predefined_package: String,

    pub carrier: String,
    pub service: String,
    #[serde(rename = "options.label_format")]
    pub label_format: String,
    #[serde(rename = "options.machinable")]
    pub machinable: bool,
}

impl BatchExportRow {
    pub fn from_request(req: &ShipmentRequest) -> Self {
        let to = &req.to_address;
        let from = &req.from_address;
        let dims = req.dimensions;
        Self {
            to_name: to.name.clone(),
            to_company: to.company.clone(),
            to_phone: to.phone.clone(),
            to_email: to.email.clone(),
            to_street1: to.street1.clone(),
            to_street2: to.street2.clone(),
            to_city: to.city.clone(),
            to_state: to.region.clone(),
            to_zip: to.postal_code.clone(),
            to_country: to.country.clone(),
            from_name: from.name.clone(),
            from_company: from.company.clone(),
            from_phone: from.phone.clone(),
            from_email: from.email.clone(),
            from_street1: from.street1.clone(),
            from_street2: from.street2.clone(),
            from_city: from.city.clone(),
            from_state: from.region.clone(),
            from_zip: from.postal_code.clone(),
            from_country: from.country.clone(),
            length: dims.map(|d| d.length),
            width: dims.map(|d| d.width),
            height: dims.map(|d| d.height),
            weight: req.weight_oz,
            predefined_package: req
                .predefined_package
                .map(|p| p.as_str().to_string())
                .unwrap_or_default(),
            carrier: req.carrier.clone(),
            service: req.service.clone(),
            label_format: req.label_format.clone(),
            machinable: req.machinable,
        }
    }
}

/// Project purchasable rows into export lines, preserving row order.
pub fn project(
    rows: &[EnrichedRow],
    from_address: &Address,
    defaults: &ServiceDefaults,
) -> Vec<BatchExportRow> {
    rows.iter()
        .filter(|r| r.readiness.is_purchasable())
        .map(|r| {
            BatchExportRow::from_request(&ShipmentRequest::from_enriched(
                r,
                from_address,
                defaults,
            ))
        })
        .collect()
}

/// Status written for every fulfillment line.
pub const FULFILLMENT_STATUS: &str = "shipped";

/// One fulfillment upload line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FulfillmentRow {
    #[serde(rename = "mp_order_id")]
    pub order_id: String,
    pub seller_label_number: String,
    pub customer_name: String,
    pub tracking_company: String,
    pub tracking_number: String,
    pub status: String,
}

/// Pair each row that got a label in `report` with its tracking number,
/// preserving row order. Rows with neither an order number nor a seller
/// label number cannot be matched by the marketplace and are left out.
pub fn project_fulfillment(
    rows: &[EnrichedRow],
    report: &PurchaseReport,
    carrier: &str,
) -> Vec<FulfillmentRow> {
    let labels: HashMap<RowId, &LabelArtifact> = report
        .outcomes
        .iter()
        .filter_map(|o| o.outcome.artifact().map(|a| (o.row_id, a)))
        .collect();

    rows.iter()
        .filter_map(|r| {
            let artifact = labels.get(&r.row_id())?;
            let row = &r.row;
            if row.order_ref.is_none() && row.sort_key.is_none() {
                debug!(row_id = %row.row_id, "No order reference, left out of fulfillment");
                return None;
            }
            Some(FulfillmentRow {
                order_id: row.order_ref.clone().unwrap_or_default(),
                seller_label_number: row.sort_key.clone().unwrap_or_default(),
                customer_name: row.recipient.name.clone(),
                tracking_company: carrier.to_string(),
                tracking_number: artifact.tracking_id.clone(),
                status: FULFILLMENT_STATUS.to_string(),
            })
        })
        .collect()
}

/// Write export lines as CSV with a header row.
pub fn write_csv<T: Serialize, W: Write>(rows: &[T], writer: W) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_csv_file<T: Serialize>(rows: &[T], path: &Path) -> Result<(), ExportError> {
    let file = std::fs::File::create(path)?;
    write_csv(rows, file)?;
    info!(path = %path.display(), rows = rows.len(), "Export written");
    Ok(())
}
