//! Request fingerprints: the label cache key.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::labels::types::ShipmentRequest;
use crate::orders::model::Address;
use crate::rules::model::{Dimensions, PredefinedPackage, ShipmentKind};

/// Hex SHA-256 over the purchase-relevant fields of a `ShipmentRequest`.
///
/// The row's position in the export is not part of the key, so a re-export
/// that shifts rows still hits the cache. Rows sharing an order reference
/// and every purchase field are the same shipment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(request: &ShipmentRequest) -> Self {
        let key = FingerprintKey {
            order_ref: request.order_ref.as_deref().map(str::trim),
            to_address: &request.to_address,
            from_address: &request.from_address,
            carrier: request.carrier.trim(),
            service: request.service.trim(),
            label_format: request.label_format.trim(),
            kind: request.kind,
            weight_oz: request.weight_oz.normalize(),
            machinable: request.machinable,
            dimensions: request.dimensions.map(|d| {
                Dimensions::new(d.length.normalize(), d.width.normalize(), d.height.normalize())
            }),
            predefined_package: request.predefined_package,
        };
        // Serializing plain structs of strings and decimals cannot fail.
        let bytes = serde_json::to_vec(&key).unwrap_or_default();
        Self(format!("{:x}", Sha256::digest(&bytes)))
    }

    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Field order here is the hash input order.
#[derive(Serialize)]
struct FingerprintKey<'a> {
    order_ref: Option<&'a str>,
    to_address: &'a Address,
    from_address: &'a Address,
    carrier: &'a str,
    service: &'a str,
    label_format: &'a str,
    kind: ShipmentKind,
    weight_oz: Decimal,
    machinable: bool,
    dimensions: Option<Dimensions>,
    predefined_package: Option<PredefinedPackage>,
}
