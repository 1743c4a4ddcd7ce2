//! Marketplace order exports.
//!
//! Raw CSV records flow through:
//! 1. `RawTable`: named columns, string cells
//! 2. `normalize()`: format detection + per-format column mapping
//! 3. `OrderRow`: one canonical shipment per record

pub mod formats;
pub mod model;
pub mod normalize;
pub mod table;

pub use model::{Address, FormatHint, MarketplaceFormat, OrderRow, RowId};
pub use normalize::{NormalizedBatch, RowIssue, normalize};
pub use table::RawTable;
