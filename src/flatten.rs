//! Flattening of report responses into a `headers` + `rows` table.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::types::{PropertyQuota, ReportResponse, Row};

/// Which optional parts of a response to keep.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlattenOptions {
    pub include_quota: bool,
    pub include_row_count: bool,
    pub include_metadata: bool,
}

/// A report as a plain table.
///
/// Every row has one value per header: dimension values first, then
/// metric values, both in requested order. Values are kept as the
/// strings the backend returned.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ReportResult {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<PropertyQuota>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub totals: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maximums: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub minimums: Vec<Vec<String>>,
}

/// Flatten a backend response.
pub fn flatten(response: ReportResponse, options: FlattenOptions) -> ReportResult {
    let headers = response
        .dimension_headers
        .into_iter()
        .map(|h| h.name)
        .chain(response.metric_headers.into_iter().map(|h| h.name))
        .collect();

    ReportResult {
        headers,
        rows: flatten_rows(response.rows),
        row_count: response.row_count.filter(|_| options.include_row_count),
        quota: response.property_quota.filter(|_| options.include_quota),
        metadata: response.metadata.filter(|_| options.include_metadata),
        totals: flatten_rows(response.totals),
        maximums: flatten_rows(response.maximums),
        minimums: flatten_rows(response.minimums),
    }
}

fn flatten_rows(rows: Vec<Row>) -> Vec<Vec<String>> {
    rows.into_iter().map(flatten_row).collect()
}

fn flatten_row(row: Row) -> Vec<String> {
    row.dimension_values
        .into_iter()
        .map(|v| v.value)
        .chain(row.metric_values.into_iter().map(|v| v.value))
        .collect()
}

impl ReportResult {
    /// Offset of the next page, if the backend reported more rows than were
    /// fetched so far starting at `offset`.
    pub fn next_offset(&self, offset: u32) -> Option<u32> {
        let fetched = offset as i64 + self.rows.len() as i64;
        match self.row_count {
            Some(total) if !self.rows.is_empty() && fetched < total => u32::try_from(fetched).ok(),
            _ => None,
        }
    }

    /// Render as tab-separated text, header line first.
    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        for line in std::iter::once(&self.headers).chain(&self.rows) {
            let cells: Vec<String> = line.iter().map(|c| escape_tsv(c)).collect();
            out.push_str(&cells.join("\t"));
            out.push('\n');
        }
        out
    }
}

fn escape_tsv(cell: &str) -> String {
    cell.replace('\\', "\\\\")
        .replace('\t', "\\t")
        .replace('\n', "\\n")
}
