//! The seam between report entry points and whatever executes the requests.

use async_trait::async_trait;

use crate::api::types::{ReportResponse, RunRealtimeReportRequest, RunReportRequest};
use crate::error::ApiError;

/// Executes Data API report requests against a property.
#[async_trait]
pub trait AnalyticsBackend: Send + Sync {
    async fn run_realtime_report(
        &self,
        request: &RunRealtimeReportRequest,
    ) -> Result<ReportResponse, ApiError>;

    async fn run_report(&self, request: &RunReportRequest) -> Result<ReportResponse, ApiError>;
}
