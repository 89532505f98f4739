//! In-memory backend for tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::api::AnalyticsBackend;
use crate::api::types::{
    DimensionHeader, DimensionValue, MetricHeader, MetricValue, ReportResponse, Row,
    RunRealtimeReportRequest, RunReportRequest,
};
use crate::error::ApiError;

#[derive(Default)]
struct MockState {
    response: ReportResponse,
    failure: Option<fn() -> ApiError>,
    calls: usize,
    last_realtime: Option<RunRealtimeReportRequest>,
    last_report: Option<RunReportRequest>,
}

/// Returns a canned response (or error) and records the requests it sees.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn returning(response: ReportResponse) -> Self {
        let backend = Self::default();
        backend.state.lock().unwrap().response = response;
        backend
    }

    pub fn failing(make_error: fn() -> ApiError) -> Self {
        let backend = Self::default();
        backend.state.lock().unwrap().failure = Some(make_error);
        backend
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    pub fn last_realtime_request(&self) -> Option<RunRealtimeReportRequest> {
        self.state.lock().unwrap().last_realtime.clone()
    }

    pub fn last_report_request(&self) -> Option<RunReportRequest> {
        self.state.lock().unwrap().last_report.clone()
    }

    fn respond(&self, state: &mut MockState) -> Result<ReportResponse, ApiError> {
        state.calls += 1;
        match state.failure {
            Some(make_error) => Err(make_error()),
            None => Ok(state.response.clone()),
        }
    }
}

#[async_trait]
impl AnalyticsBackend for MockBackend {
    async fn run_realtime_report(
        &self,
        request: &RunRealtimeReportRequest,
    ) -> Result<ReportResponse, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.last_realtime = Some(request.clone());
        self.respond(&mut state)
    }

    async fn run_report(&self, request: &RunReportRequest) -> Result<ReportResponse, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.last_report = Some(request.clone());
        self.respond(&mut state)
    }
}

pub fn row(dimensions: &[&str], metrics: &[&str]) -> Row {
    Row {
        dimension_values: dimensions
            .iter()
            .map(|v| DimensionValue { value: v.to_string() })
            .collect(),
        metric_values: metrics
            .iter()
            .map(|v| MetricValue { value: v.to_string() })
            .collect(),
    }
}

pub fn response_with_rows(dimensions: &[&str], metrics: &[&str], rows: Vec<Row>) -> ReportResponse {
    ReportResponse {
        dimension_headers: dimensions
            .iter()
            .map(|n| DimensionHeader { name: n.to_string() })
            .collect(),
        metric_headers: metrics
            .iter()
            .map(|n| MetricHeader {
                name: n.to_string(),
                metric_type: None,
            })
            .collect(),
        rows,
        ..Default::default()
    }
}
