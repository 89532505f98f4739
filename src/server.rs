//! MCP Server exposing GA4 report tools.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, ErrorCode, ErrorData as McpError, Implementation,
        ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    schemars::{self, JsonSchema},
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::types::{MetricAggregation, OrderBy};
use crate::api::{RealtimeReport, Report};
use crate::data_api::DataApiClient;
use crate::debug::DebugLogger;
use crate::error::{ApiError, ReportError};
use crate::query::QueryDescriptor;

/// Report clients for the configured property.
#[derive(Clone)]
pub struct ReportClients {
    pub realtime: RealtimeReport,
    pub report: Report,
    pub data_api: DataApiClient,
}

/// GA4 reporting MCP Server.
#[derive(Clone)]
pub struct Ga4ReportServer {
    clients: ReportClients,
    debug: Arc<DebugLogger>,
    tool_router: ToolRouter<Self>,
}

impl Ga4ReportServer {
    pub fn new(clients: ReportClients, debug: Arc<DebugLogger>) -> Self {
        Self {
            clients,
            debug,
            tool_router: Self::tool_router(),
        }
    }

    /// Log the failure and convert it for the MCP client.
    fn tool_error<E: std::fmt::Display>(&self, tool: &str, e: E) -> McpError {
        self.debug.log_error(tool, &e.to_string());
        to_mcp_error(e)
    }

    /// Log a failed report and convert it for the MCP client.
    fn report_error(&self, tool: &str, e: ReportError) -> McpError {
        let error = report_to_mcp_error(&e);
        self.debug.log_error(tool, &error.message);
        error
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert any error to McpError
fn to_mcp_error<E: std::fmt::Display>(e: E) -> McpError {
    McpError {
        code: ErrorCode::INTERNAL_ERROR,
        message: Cow::from(e.to_string()),
        data: None,
    }
}

/// Rejected queries are the caller's fault; everything else is internal.
fn report_to_mcp_error(e: &ReportError) -> McpError {
    let ReportError::QueryFailed(cause) = e;
    let code = match cause {
        ApiError::InvalidRequest(_) => ErrorCode::INVALID_PARAMS,
        _ => ErrorCode::INTERNAL_ERROR,
    };
    McpError {
        code,
        message: Cow::from(format!("{}: {}", e, cause)),
        data: None,
    }
}

fn invalid_params(message: String) -> McpError {
    McpError {
        code: ErrorCode::INVALID_PARAMS,
        message: Cow::from(message),
        data: None,
    }
}

/// Parse "field", "field asc" or "field desc". Fields listed among
/// `metrics` sort as metrics, anything else as a dimension. Blank input
/// yields `None`.
fn parse_order_by(expr: &str, metrics: &[String]) -> Result<Option<OrderBy>, McpError> {
    let mut parts = expr.split_whitespace();
    let Some(field) = parts.next() else {
        return Ok(None);
    };
    let desc = match parts.next() {
        None => false,
        Some(dir) if dir.eq_ignore_ascii_case("asc") => false,
        Some(dir) if dir.eq_ignore_ascii_case("desc") => true,
        Some(dir) => {
            return Err(invalid_params(format!(
                "invalid sort direction '{}' in '{}': expected asc or desc",
                dir,
                expr.trim()
            )))
        }
    };
    if parts.next().is_some() {
        return Err(invalid_params(format!(
            "invalid sort key '{}': expected \"field [asc|desc]\"",
            expr.trim()
        )));
    }

    if metrics.iter().any(|m| m == field) {
        Ok(Some(OrderBy::metric(field, desc)))
    } else {
        Ok(Some(OrderBy::dimension(field, desc)))
    }
}

/// Apply the options shared by both report tools.
fn apply_common(
    mut query: QueryDescriptor,
    limit: Option<u32>,
    return_property_quota: Option<bool>,
    order_by: Option<String>,
    metric_aggregations: Option<Vec<String>>,
) -> Result<QueryDescriptor, McpError> {
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    if let Some(quota) = return_property_quota {
        query = query.include_quota(quota);
    }
    if let Some(order_by) = order_by {
        let metrics = query.metric_names().to_vec();
        for expr in order_by.split(',') {
            if let Some(order) = parse_order_by(expr, &metrics)? {
                query = query.order_by(order);
            }
        }
    }
    for name in metric_aggregations.unwrap_or_default() {
        let aggregation: MetricAggregation = name.parse().map_err(invalid_params)?;
        query = query.aggregate(aggregation);
    }
    Ok(query)
}

fn build_realtime_query(params: RealtimeReportParams) -> Result<QueryDescriptor, McpError> {
    let mut query = QueryDescriptor::new(params.dimensions, params.metrics);
    for range in params.minute_ranges.unwrap_or_default() {
        query = query.minute_range(range.start_minutes_ago, range.end_minutes_ago);
    }
    apply_common(
        query,
        params.limit,
        params.return_property_quota,
        params.order_by,
        params.metric_aggregations,
    )
}

fn build_report_query(params: ReportParams) -> Result<QueryDescriptor, McpError> {
    let mut query = QueryDescriptor::new(params.dimensions, params.metrics);
    for range in params.date_ranges {
        query = query.date_range(range.start_date, range.end_date);
    }
    if let Some(offset) = params.offset {
        query = query.offset(offset);
    }
    if let Some(keep) = params.keep_empty_rows {
        query = query.keep_empty_rows(keep);
    }
    apply_common(
        query,
        params.limit,
        params.return_property_quota,
        params.order_by,
        params.metric_aggregations,
    )
}

fn pretty_json<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value).map_err(to_mcp_error)?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

// ============================================================================
// Tool Parameter Structs
// ============================================================================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MinuteRangeParam {
    /// Start of the window in minutes ago (e.g. 29)
    pub start_minutes_ago: u32,
    /// End of the window in minutes ago (0 = now)
    pub end_minutes_ago: u32,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DateRangeParam {
    /// Start date: YYYY-MM-DD, today, yesterday or NdaysAgo
    pub start_date: String,
    /// End date: YYYY-MM-DD, today, yesterday or NdaysAgo
    pub end_date: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RealtimeReportParams {
    /// Dimension API names (e.g. country, city, deviceCategory)
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Metric API names (e.g. activeUsers, screenPageViews)
    #[serde(default)]
    pub metrics: Vec<String>,
    /// Maximum number of rows to return (default 10000)
    pub limit: Option<u32>,
    /// Include property quota usage in the result
    pub return_property_quota: Option<bool>,
    /// Up to two minute ranges (default: last 30 minutes)
    pub minute_ranges: Option<Vec<MinuteRangeParam>>,
    /// Comma-separated sort keys, e.g. "activeUsers desc,country"
    pub order_by: Option<String>,
    /// Aggregate rows to add: total, maximum, minimum, count
    pub metric_aggregations: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReportParams {
    /// Dimension API names (e.g. country, pagePath, date)
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Metric API names (e.g. activeUsers, sessions)
    #[serde(default)]
    pub metrics: Vec<String>,
    /// One to four date ranges (required)
    pub date_ranges: Vec<DateRangeParam>,
    /// Row offset for pagination (default 0)
    pub offset: Option<u32>,
    /// Maximum number of rows to return (default 10000)
    pub limit: Option<u32>,
    /// Return rows whose metrics are all zero (default true)
    pub keep_empty_rows: Option<bool>,
    /// Include property quota usage in the result
    pub return_property_quota: Option<bool>,
    /// Comma-separated sort keys, e.g. "sessions desc,date"
    pub order_by: Option<String>,
    /// Aggregate rows to add: total, maximum, minimum, count
    pub metric_aggregations: Option<Vec<String>>,
}

// ============================================================================
// Tool Implementations
// ============================================================================

#[tool_router]
impl Ga4ReportServer {
    #[tool(description = "Run a GA4 real-time report (recent activity, last 30 minutes). Returns {headers, rows} with dimension values first, then metric values.")]
    async fn run_realtime_report(&self, Parameters(params): Parameters<RealtimeReportParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("run_realtime_report", &json!(params));

        let query = build_realtime_query(params)?;
        let result = self.clients.realtime.query_report_with(&query).await
            .map_err(|e| self.report_error("run_realtime_report", e))?;

        let json = serde_json::to_value(&result).map_err(to_mcp_error)?;
        self.debug.log_tool_result("run_realtime_report", &json);

        pretty_json(&json)
    }

    #[tool(description = "Run a GA4 report over date ranges. Returns {headers, rows, row_count, metadata}. Page through large results by repeating the call with offset += rows returned until offset reaches row_count.")]
    async fn run_report(&self, Parameters(params): Parameters<ReportParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("run_report", &json!(params));

        let query = build_report_query(params)?;
        let result = self.clients.report.run_report(&query).await
            .map_err(|e| self.report_error("run_report", e))?;

        let json = serde_json::to_value(&result).map_err(to_mcp_error)?;
        self.debug.log_tool_result("run_report", &json);

        pretty_json(&json)
    }

    #[tool(description = "List the dimensions and metrics (API names) available for the configured GA4 property.")]
    async fn get_metadata(&self) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("get_metadata", &json!({}));

        let property = self.clients.report.property();
        let metadata = self.clients.data_api.get_metadata(&property).await
            .map_err(|e| self.tool_error("get_metadata", e))?;

        let json = json!({
            "dimensions": metadata.dimensions.iter().map(|d| &d.api_name).collect::<Vec<_>>(),
            "metrics": metadata.metrics.iter().map(|m| &m.api_name).collect::<Vec<_>>(),
        });
        self.debug.log_tool_result("get_metadata", &json);

        pretty_json(&json)
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl ServerHandler for Ga4ReportServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "GA4 Report MCP Server - Run Google Analytics 4 real-time and date-ranged \
                reports for the configured property and get them back as flat tables."
                    .to_string(),
            ),
        }
    }
}
