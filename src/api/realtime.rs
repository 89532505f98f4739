//! Real-time report over the last 30 minutes of activity.

use crate::api::AnalyticsBackend;
use crate::data_api::DataApiClient;
use crate::error::ReportError;
use crate::flatten::{flatten, FlattenOptions, ReportResult};
use crate::query::QueryDescriptor;

/// Real-time report client for one property.
#[derive(Clone)]
pub struct RealtimeReport<B = DataApiClient> {
    property_id: String,
    backend: B,
}

impl<B: AnalyticsBackend> RealtimeReport<B> {
    pub fn new(property_id: impl Into<String>, backend: B) -> Self {
        Self {
            property_id: property_id.into(),
            backend,
        }
    }

    /// Resource name of the target property.
    pub fn property(&self) -> String {
        format!("properties/{}", self.property_id)
    }

    /// Query with default options (10000 rows, no quota).
    pub async fn query_report<D, M>(
        &self,
        dimensions: D,
        metrics: M,
    ) -> Result<ReportResult, ReportError>
    where
        D: IntoIterator,
        D::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        self.query_report_with(&QueryDescriptor::new(dimensions, metrics))
            .await
    }

    /// Query honoring the limit, quota flag and minute ranges of `query`.
    pub async fn query_report_with(
        &self,
        query: &QueryDescriptor,
    ) -> Result<ReportResult, ReportError> {
        let request = query.to_realtime_request(&self.property())?;
        tracing::debug!(
            property = %request.property,
            dimensions = ?query.dimension_names(),
            metrics = ?query.metric_names(),
            limit = query.row_limit(),
            "Running real-time report"
        );
        let response = self.backend.run_realtime_report(&request).await?;

        Ok(flatten(
            response,
            FlattenOptions {
                include_quota: query.includes_quota(),
                ..Default::default()
            },
        ))
    }
}

impl<B> std::fmt::Debug for RealtimeReport<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeReport")
            .field("property_id", &self.property_id)
            .finish()
    }
}
