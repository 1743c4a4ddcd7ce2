//! Raw tabular input: named columns plus string cells, as read from a CSV export.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;

/// Characters ignored when comparing header names.
static HEADER_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_.()\-]").expect("static regex"));

/// Normalize a header name for comparison: lowercase, no spaces, underscores,
/// dots, parentheses or dashes. `"Item Count"` and `"item_count"` both become `"itemcount"`.
pub fn normalize_header(name: &str) -> String {
    HEADER_NOISE
        .replace_all(name.trim(), "")
        .to_lowercase()
}

/// An ordered sequence of records sharing one header row.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    headers: Vec<String>,
    records: Vec<Vec<String>>,
    index: HashMap<String, usize>,
}

impl RawTable {
    /// Build a table. Records shorter than the header row read as empty cells.
    pub fn new(headers: Vec<String>, records: Vec<Vec<String>>) -> Self {
        let mut index = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            // First occurrence wins for duplicated headers.
            index.entry(normalize_header(header)).or_insert(i);
        }
        Self {
            headers,
            records,
            index,
        }
    }

    /// Read a whole CSV document (first line is the header row).
    pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::None)
            .from_reader(reader);
        let headers = rdr.headers()?.iter().map(str::to_string).collect();
        let mut records = Vec::new();
        for record in rdr.records() {
            records.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self::new(headers, records))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Normalized header names, for signature matching.
    pub fn header_set(&self) -> BTreeSet<String> {
        self.index.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records as column-addressable views.
    pub fn records(&self) -> impl Iterator<Item = RecordView<'_>> {
        self.records.iter().map(move |cells| RecordView {
            table: self,
            cells,
        })
    }
}

/// One record, addressed by normalized column name.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    table: &'a RawTable,
    cells: &'a [String],
}

impl<'a> RecordView<'a> {
    /// Trimmed, non-empty cell value for a normalized column name.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = *self.table.index.get(column)?;
        self.cells
            .get(idx)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// First non-empty cell among several candidate column names.
    pub fn first_of(&self, columns: &[&str]) -> Option<&'a str> {
        columns.iter().find_map(|c| self.get(c))
    }
}
