//! Standard report over one or more date ranges.

use crate::api::AnalyticsBackend;
use crate::data_api::DataApiClient;
use crate::error::ReportError;
use crate::flatten::{flatten, FlattenOptions, ReportResult};
use crate::query::QueryDescriptor;

/// Standard report client for one property.
///
/// Pagination is left to the caller: when `row_count` exceeds the rows
/// returned, repeat the call with the offset from
/// [`ReportResult::next_offset`].
#[derive(Clone)]
pub struct Report<B = DataApiClient> {
    property_id: String,
    backend: B,
}

impl<B: AnalyticsBackend> Report<B> {
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

    /// Run the report. The result always keeps the backend's row count and
    /// response metadata; quota usage only when `query` asks for it.
    pub async fn run_report(&self, query: &QueryDescriptor) -> Result<ReportResult, ReportError> {
        let request = query.to_report_request(&self.property())?;
        tracing::debug!(
            property = %request.property,
            dimensions = ?query.dimension_names(),
            metrics = ?query.metric_names(),
            date_ranges = query.date_ranges().len(),
            offset = query.row_offset(),
            limit = query.row_limit(),
            keep_empty_rows = query.keeps_empty_rows(),
            "Running report"
        );
        let response = self.backend.run_report(&request).await?;

        Ok(flatten(
            response,
            FlattenOptions {
                include_quota: query.includes_quota(),
                include_row_count: true,
                include_metadata: true,
            },
        ))
    }
}

impl<B> std::fmt::Debug for Report<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Report")
            .field("property_id", &self.property_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{response_with_rows, row, MockBackend};
    use crate::api::types::{PropertyQuota, QuotaStatus};
    use crate::config::Config;
    use crate::error::ApiError;
    use serde_json::json;
    use std::error::Error as _;

    fn january() -> QueryDescriptor {
        QueryDescriptor::new(["country"], ["activeUsers"]).date_range("2023-01-01", "2023-01-31")
    }

    #[tokio::test]
    async fn test_run_report_keeps_row_count_and_metadata() {
        let mut response = response_with_rows(
            &["country"],
            &["activeUsers"],
            vec![row(&["US"], &["1200"]), row(&["DE"], &["310"])],
        );
        response.row_count = Some(87);
        response.metadata = Some(json!({"currencyCode": "EUR"}));
        let backend = MockBackend::returning(response);
        let report = Report::new("307310528", backend.clone());

        let result = report.run_report(&january().offset(0)).await.unwrap();

        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.row_count, Some(87));
        assert_eq!(result.metadata, Some(json!({"currencyCode": "EUR"})));
        assert_eq!(result.next_offset(0), Some(2));

        let request = backend.last_report_request().unwrap();
        assert_eq!(request.property, "properties/307310528");
        assert_eq!(request.date_ranges[0].start_date, "2023-01-01");
        assert_eq!(request.offset, 0);
        assert_eq!(request.limit, 10_000);
        assert!(request.keep_empty_rows);
    }

    #[tokio::test]
    async fn test_quota_not_leaked_when_not_requested() {
        let mut response = response_with_rows(&["country"], &["activeUsers"], vec![]);
        response.property_quota = Some(PropertyQuota {
            tokens_per_hour: Some(QuotaStatus {
                consumed: Some(5),
                remaining: Some(39995),
            }),
            ..Default::default()
        });
        let report = Report::new("1", MockBackend::returning(response));

        let result = report.run_report(&january()).await.unwrap();
        assert!(result.quota.is_none());
        assert!(result.rows.is_empty());
        assert_eq!(result.headers, ["country", "activeUsers"]);

        let result = report.run_report(&january().include_quota(true)).await.unwrap();
        assert!(result.quota.is_some());
    }

    #[tokio::test]
    async fn test_missing_date_range_is_wrapped() {
        let backend = MockBackend::returning(Default::default());
        let report = Report::new("1", backend.clone());

        let query = QueryDescriptor::new(["country"], ["activeUsers"]);
        let err = report.run_report(&query).await.unwrap_err();

        assert!(matches!(err, ReportError::QueryFailed(ApiError::InvalidRequest(_))));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_yields_wrapped_error() {
        // Nothing listens on port 1; the connection is refused.
        let config = Config {
            property_id: "1".to_string(),
            credentials_file: None,
            access_token: Some("test-token".to_string()),
            api_base_url: "http://127.0.0.1:1/v1beta".to_string(),
            debug: false,
            timeout_seconds: 5,
            token_refresh_buffer_seconds: 60,
        };
        let tokens = crate::auth::TokenProvider::new(&config).unwrap();
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        let client = DataApiClient::with_http_client(config.api_base_url(), http, tokens);
        let report = Report::new("1", client);

        let err = report.run_report(&january()).await.unwrap_err();

        let ReportError::QueryFailed(cause) = &err;
        assert!(matches!(cause, ApiError::Request(_)));
        assert!(err.source().is_some());
    }
}
