//! Query descriptor with builder, defaults and request construction.

use chrono::NaiveDate;

use crate::api::types::{
    DateRange, Dimension, Metric, MetricAggregation, MinuteRange, OrderBy,
    RunRealtimeReportRequest, RunReportRequest,
};
use crate::error::ApiError;

pub const DEFAULT_ROW_LIMIT: u32 = 10_000;

/// Largest page the Data API returns in one response.
pub const MAX_ROW_LIMIT: u32 = 250_000;

const MAX_DATE_RANGES: usize = 4;
const MAX_MINUTE_RANGES: usize = 2;

/// Caller-side description of one report query.
///
/// Fields that only apply to standard reports (date ranges, offset,
/// keep-empty-rows) are ignored by real-time reports, and minute ranges
/// are ignored by standard reports.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    dimension_names: Vec<String>,
    metric_names: Vec<String>,
    date_ranges: Vec<DateRange>,
    minute_ranges: Vec<MinuteRange>,
    order_bys: Vec<OrderBy>,
    metric_aggregations: Vec<MetricAggregation>,
    row_limit: u32,
    row_offset: u32,
    keep_empty_rows: bool,
    include_quota: bool,
}

impl Default for QueryDescriptor {
    fn default() -> Self {
        Self {
            dimension_names: Vec::new(),
            metric_names: Vec::new(),
            date_ranges: Vec::new(),
            minute_ranges: Vec::new(),
            order_bys: Vec::new(),
            metric_aggregations: Vec::new(),
            row_limit: DEFAULT_ROW_LIMIT,
            row_offset: 0,
            keep_empty_rows: true,
            include_quota: false,
        }
    }
}

impl QueryDescriptor {
    /// Create a query for the given dimension and metric names, in order.
    pub fn new<D, M>(dimensions: D, metrics: M) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            dimension_names: dimensions.into_iter().map(Into::into).collect(),
            metric_names: metrics.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Add a date range (standard reports).
    pub fn date_range(mut self, start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        self.date_ranges.push(DateRange {
            start_date: start_date.into(),
            end_date: end_date.into(),
            name: None,
        });
        self
    }

    /// Add a minute range (real-time reports).
    pub fn minute_range(mut self, start_minutes_ago: u32, end_minutes_ago: u32) -> Self {
        self.minute_ranges.push(MinuteRange {
            name: None,
            start_minutes_ago: Some(start_minutes_ago),
            end_minutes_ago: Some(end_minutes_ago),
        });
        self
    }

    /// Add a sort key.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_bys.push(order);
        self
    }

    /// Request an aggregate row.
    pub fn aggregate(mut self, aggregation: MetricAggregation) -> Self {
        if !self.metric_aggregations.contains(&aggregation) {
            self.metric_aggregations.push(aggregation);
        }
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.row_limit = limit;
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.row_offset = offset;
        self
    }

    pub fn keep_empty_rows(mut self, keep: bool) -> Self {
        self.keep_empty_rows = keep;
        self
    }

    pub fn include_quota(mut self, include: bool) -> Self {
        self.include_quota = include;
        self
    }

    pub fn dimension_names(&self) -> &[String] {
        &self.dimension_names
    }

    pub fn metric_names(&self) -> &[String] {
        &self.metric_names
    }

    pub fn date_ranges(&self) -> &[DateRange] {
        &self.date_ranges
    }

    pub fn row_limit(&self) -> u32 {
        self.row_limit
    }

    pub fn row_offset(&self) -> u32 {
        self.row_offset
    }

    pub fn keeps_empty_rows(&self) -> bool {
        self.keep_empty_rows
    }

    pub fn includes_quota(&self) -> bool {
        self.include_quota
    }

    /// Build the real-time request for `property` (`properties/{id}`).
    pub fn to_realtime_request(&self, property: &str) -> Result<RunRealtimeReportRequest, ApiError> {
        self.validate_common()?;

        if self.minute_ranges.len() > MAX_MINUTE_RANGES {
            return Err(ApiError::InvalidRequest(format!(
                "at most {} minute ranges are allowed, got {}",
                MAX_MINUTE_RANGES,
                self.minute_ranges.len()
            )));
        }
        for range in &self.minute_ranges {
            if let (Some(start), Some(end)) = (range.start_minutes_ago, range.end_minutes_ago) {
                if start < end {
                    return Err(ApiError::InvalidRequest(format!(
                        "minute range starts {} minutes ago, after its end at {} minutes ago",
                        start, end
                    )));
                }
            }
        }

        Ok(RunRealtimeReportRequest {
            property: property.to_string(),
            dimensions: self.dimensions(),
            metrics: self.metrics(),
            limit: self.row_limit,
            return_property_quota: self.include_quota,
            minute_ranges: self.minute_ranges.clone(),
            order_bys: self.order_bys.clone(),
            metric_aggregations: self.metric_aggregations.clone(),
        })
    }

    /// Build the standard report request for `property` (`properties/{id}`).
    pub fn to_report_request(&self, property: &str) -> Result<RunReportRequest, ApiError> {
        self.validate_common()?;

        if self.date_ranges.is_empty() {
            return Err(ApiError::InvalidRequest(
                "a report needs at least one date range".to_string(),
            ));
        }
        if self.date_ranges.len() > MAX_DATE_RANGES {
            return Err(ApiError::InvalidRequest(format!(
                "at most {} date ranges are allowed, got {}",
                MAX_DATE_RANGES,
                self.date_ranges.len()
            )));
        }
        for range in &self.date_ranges {
            validate_date_range(range)?;
        }

        Ok(RunReportRequest {
            property: property.to_string(),
            dimensions: self.dimensions(),
            metrics: self.metrics(),
            date_ranges: self.date_ranges.clone(),
            offset: self.row_offset,
            limit: self.row_limit,
            keep_empty_rows: self.keep_empty_rows,
            return_property_quota: self.include_quota,
            order_bys: self.order_bys.clone(),
            metric_aggregations: self.metric_aggregations.clone(),
        })
    }

    fn validate_common(&self) -> Result<(), ApiError> {
        if self.dimension_names.is_empty() && self.metric_names.is_empty() {
            return Err(ApiError::InvalidRequest(
                "at least one dimension or metric is required".to_string(),
            ));
        }
        if let Some(blank) = self
            .dimension_names
            .iter()
            .chain(&self.metric_names)
            .find(|name| name.trim().is_empty())
        {
            return Err(ApiError::InvalidRequest(format!(
                "blank dimension or metric name '{}'",
                blank
            )));
        }
        if self.row_limit == 0 || self.row_limit > MAX_ROW_LIMIT {
            return Err(ApiError::InvalidRequest(format!(
                "limit must be between 1 and {}, got {}",
                MAX_ROW_LIMIT, self.row_limit
            )));
        }
        for order in &self.order_bys {
            if order.metric.is_some() == order.dimension.is_some() {
                return Err(ApiError::InvalidRequest(
                    "an order by names exactly one metric or dimension".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn dimensions(&self) -> Vec<Dimension> {
        self.dimension_names
            .iter()
            .map(|name| Dimension { name: name.clone() })
            .collect()
    }

    fn metrics(&self) -> Vec<Metric> {
        self.metric_names
            .iter()
            .map(|name| Metric { name: name.clone() })
            .collect()
    }
}

/// Parse one end of a date range. Relative dates yield `None`.
fn parse_date(value: &str) -> Result<Option<NaiveDate>, ApiError> {
    if value == "today" || value == "yesterday" {
        return Ok(None);
    }
    if let Some(days) = value.strip_suffix("daysAgo") {
        if !days.is_empty() && days.chars().all(|c| c.is_ascii_digit()) {
            return Ok(None);
        }
    }
    // chrono accepts unpadded fields; the API does not.
    let padded = value.len() == 10 && value.as_bytes()[4] == b'-' && value.as_bytes()[7] == b'-';
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .filter(|_| padded)
        .map(Some)
        .ok_or_else(|| {
            ApiError::InvalidRequest(format!(
                "invalid date '{}': expected YYYY-MM-DD, today, yesterday or NdaysAgo",
                value
            ))
        })
}

fn validate_date_range(range: &DateRange) -> Result<(), ApiError> {
    let start = parse_date(&range.start_date)?;
    let end = parse_date(&range.end_date)?;
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(ApiError::InvalidRequest(format!(
                "date range starts {} after it ends {}",
                start, end
            )));
        }
    }
    Ok(())
}
