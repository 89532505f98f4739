//! Wire records of the Google Analytics Data API (v1beta), JSON in camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A requested dimension.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Dimension {
    pub name: String,
}

/// A requested metric.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Metric {
    pub name: String,
}

/// Inclusive date range. Dates are `YYYY-MM-DD`, `today`, `yesterday` or `NdaysAgo`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: String,
    pub end_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Window of the last N minutes for real-time reports.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinuteRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_minutes_ago: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_minutes_ago: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricOrderBy {
    pub metric_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionOrderBy {
    pub dimension_name: String,
}

/// Sort key; exactly one of `metric` or `dimension` is set.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderBy {
    #[serde(default)]
    pub desc: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<MetricOrderBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<DimensionOrderBy>,
}

impl OrderBy {
    pub fn metric(name: impl Into<String>, desc: bool) -> Self {
        Self {
            desc,
            metric: Some(MetricOrderBy {
                metric_name: name.into(),
            }),
            dimension: None,
        }
    }

    pub fn dimension(name: impl Into<String>, desc: bool) -> Self {
        Self {
            desc,
            metric: None,
            dimension: Some(DimensionOrderBy {
                dimension_name: name.into(),
            }),
        }
    }
}

/// Aggregate rows the backend can compute alongside the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricAggregation {
    Total,
    Maximum,
    Minimum,
    Count,
}

impl std::str::FromStr for MetricAggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "total" => Ok(MetricAggregation::Total),
            "maximum" | "max" => Ok(MetricAggregation::Maximum),
            "minimum" | "min" => Ok(MetricAggregation::Minimum),
            "count" => Ok(MetricAggregation::Count),
            other => Err(format!("unknown metric aggregation '{}'", other)),
        }
    }
}

/// Body of `properties/{id}:runRealtimeReport`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRealtimeReportRequest {
    /// Resource name, `properties/{id}`; carried in the URL, not the body.
    #[serde(skip)]
    pub property: String,
    pub dimensions: Vec<Dimension>,
    pub metrics: Vec<Metric>,
    pub limit: u32,
    pub return_property_quota: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub minute_ranges: Vec<MinuteRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_bys: Vec<OrderBy>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metric_aggregations: Vec<MetricAggregation>,
}

/// Body of `properties/{id}:runReport`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReportRequest {
    /// Resource name, `properties/{id}`; carried in the URL, not the body.
    #[serde(skip)]
    pub property: String,
    pub dimensions: Vec<Dimension>,
    pub metrics: Vec<Metric>,
    pub date_ranges: Vec<DateRange>,
    pub offset: u32,
    pub limit: u32,
    pub keep_empty_rows: bool,
    pub return_property_quota: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_bys: Vec<OrderBy>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metric_aggregations: Vec<MetricAggregation>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DimensionHeader {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MetricHeader {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DimensionValue {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MetricValue {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    #[serde(default)]
    pub dimension_values: Vec<DimensionValue>,
    #[serde(default)]
    pub metric_values: Vec<MetricValue>,
}

/// Consumed/remaining tokens for one quota bucket.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct QuotaStatus {
    pub consumed: Option<i64>,
    pub remaining: Option<i64>,
}

/// Property quota usage returned when `returnPropertyQuota` is set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyQuota {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_per_day: Option<QuotaStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_per_hour: Option<QuotaStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrent_requests: Option<QuotaStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_errors_per_project_per_hour: Option<QuotaStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub potentially_thresholded_requests_per_hour: Option<QuotaStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_per_project_per_hour: Option<QuotaStatus>,
}

/// Response of both report endpoints. Real-time responses never carry `metadata`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    #[serde(default)]
    pub dimension_headers: Vec<DimensionHeader>,
    #[serde(default)]
    pub metric_headers: Vec<MetricHeader>,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub totals: Vec<Row>,
    #[serde(default)]
    pub maximums: Vec<Row>,
    #[serde(default)]
    pub minimums: Vec<Row>,
    pub row_count: Option<i64>,
    pub metadata: Option<Value>,
    pub property_quota: Option<PropertyQuota>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionMetadata {
    pub api_name: String,
    pub ui_name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricMetadata {
    pub api_name: String,
    pub ui_name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub metric_type: Option<String>,
    pub category: Option<String>,
}

/// Dimensions and metrics available for a property (`properties/{id}/metadata`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Metadata {
    pub name: Option<String>,
    #[serde(default)]
    pub dimensions: Vec<DimensionMetadata>,
    #[serde(default)]
    pub metrics: Vec<MetricMetadata>,
}
