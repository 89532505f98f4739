//! HTTP client for the Google Analytics Data API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::AnalyticsBackend;
use crate::api::types::{Metadata, ReportResponse, RunRealtimeReportRequest, RunReportRequest};
use crate::auth::TokenProvider;
use crate::config::Config;
use crate::error::ApiError;

/// Google API error response.
#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Data API client; implements [`AnalyticsBackend`] over REST.
#[derive(Clone)]
pub struct DataApiClient {
    base_url: String,
    http_client: Client,
    token_provider: TokenProvider,
}

impl DataApiClient {
    /// Create a new Data API client.
    ///
    /// # Errors
    /// Returns `ApiError::HttpClientInit` if the HTTP client cannot be created.
    pub fn new(config: &Config, token_provider: TokenProvider) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ApiError::HttpClientInit(e.to_string()))?;

        Ok(Self::with_http_client(
            config.api_base_url(),
            http_client,
            token_provider,
        ))
    }

    /// Create a client around an already configured `reqwest::Client`.
    pub(crate) fn with_http_client(
        base_url: &str,
        http_client: Client,
        token_provider: TokenProvider,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            token_provider,
        }
    }

    /// Full URL of a method on a property resource, e.g. `properties/1:runReport`.
    fn method_url(&self, property: &str, method: &str) -> String {
        format!("{}/{}{}", self.base_url, property, method)
    }

    /// Dimensions and metrics available to `property`, including custom definitions.
    pub async fn get_metadata(&self, property: &str) -> Result<Metadata, ApiError> {
        let url = self.method_url(property, "/metadata");
        self.execute_get(&url).await
    }

    /// Execute GET request.
    async fn execute_get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        tracing::debug!(url = %url, "Data API GET request");

        let token = self.token_provider.get_token().await?;

        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Execute POST request.
    async fn execute_post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        tracing::debug!(url = %url, "Data API POST request");

        let token = self.token_provider.get_token().await?;

        let response = self
            .http_client
            .post(url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle HTTP response and parse JSON.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            tracing::debug!(status = %status, bytes = body.len(), "Data API response");
            Ok(serde_json::from_str(&body)?)
        } else {
            tracing::warn!(status = %status, body = %truncate(&body, 500), "Data API error response");
            Err(parse_error_response(status, &body))
        }
    }
}

/// Map an error body to `GoogleError` when it has the standard shape.
fn parse_error_response(status: StatusCode, body: &str) -> ApiError {
    match serde_json::from_str::<GoogleErrorResponse>(body) {
        Ok(parsed) => ApiError::GoogleError {
            status,
            code: parsed
                .error
                .status
                .or_else(|| parsed.error.code.map(|c| c.to_string()))
                .unwrap_or_else(|| status.as_u16().to_string()),
            message: parsed.error.message,
        },
        Err(_) => ApiError::HttpError {
            status,
            body: body.to_string(),
        },
    }
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl AnalyticsBackend for DataApiClient {
    async fn run_realtime_report(
        &self,
        request: &RunRealtimeReportRequest,
    ) -> Result<ReportResponse, ApiError> {
        let url = self.method_url(&request.property, ":runRealtimeReport");
        self.execute_post(&url, request).await
    }

    async fn run_report(&self, request: &RunReportRequest) -> Result<ReportResponse, ApiError> {
        let url = self.method_url(&request.property, ":runReport");
        self.execute_post(&url, request).await
    }
}

impl std::fmt::Debug for DataApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataApiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryDescriptor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve one HTTP exchange with a canned response; yields the raw request.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                    let content_length = head
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&request).to_string()
        });

        (format!("http://{}/v1beta", addr), handle)
    }

    fn client_for(base_url: &str) -> DataApiClient {
        let config = Config {
            property_id: "307310528".to_string(),
            credentials_file: None,
            access_token: Some("test-token".to_string()),
            api_base_url: base_url.to_string(),
            debug: false,
            timeout_seconds: 5,
            token_refresh_buffer_seconds: 60,
        };
        let tokens = TokenProvider::new(&config).unwrap();
        // Loopback only; keep HTTP(S)_PROXY from the environment out of the way.
        let http = Client::builder().no_proxy().build().unwrap();
        DataApiClient::with_http_client(config.api_base_url(), http, tokens)
    }

    #[test]
    fn test_new_uses_configured_base_url() {
        let client = client_for("https://analyticsdata.googleapis.com/v1beta/");
        assert_eq!(
            client.method_url("properties/1", ":runReport"),
            "https://analyticsdata.googleapis.com/v1beta/properties/1:runReport"
        );
    }

    #[tokio::test]
    async fn test_run_report_posts_to_property_method() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"dimensionHeaders":[{"name":"country"}],
                "metricHeaders":[{"name":"activeUsers","type":"TYPE_INTEGER"}],
                "rows":[{"dimensionValues":[{"value":"US"}],"metricValues":[{"value":"42"}]}],
                "rowCount":1,"kind":"analyticsData#runReport"}"#,
        )
        .await;
        let client = client_for(&base_url);

        let request = QueryDescriptor::new(["country"], ["activeUsers"])
            .date_range("7daysAgo", "today")
            .to_report_request("properties/307310528")
            .unwrap();
        let response = client.run_report(&request).await.unwrap();

        assert_eq!(response.row_count, Some(1));
        assert_eq!(response.rows[0].metric_values[0].value, "42");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /v1beta/properties/307310528:runReport HTTP/1.1"));
        let lower = raw.to_lowercase();
        assert!(lower.contains("authorization: bearer test-token"));
        assert!(raw.contains(r#""dateRanges":[{"startDate":"7daysAgo","endDate":"today"}]"#));
    }

    #[tokio::test]
    async fn test_realtime_uses_realtime_method() {
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", r#"{"rowCount":0}"#).await;
        let client = client_for(&base_url);

        let request = QueryDescriptor::new(["city"], ["activeUsers"])
            .to_realtime_request("properties/307310528")
            .unwrap();
        let response = client.run_realtime_report(&request).await.unwrap();
        assert!(response.rows.is_empty());

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /v1beta/properties/307310528:runRealtimeReport HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_google_error_body_is_parsed() {
        let (base_url, _server) = serve_once(
            "HTTP/1.1 400 Bad Request",
            r#"{"error":{"code":400,"message":"Field foo is not a valid dimension.","status":"INVALID_ARGUMENT"}}"#,
        )
        .await;
        let client = client_for(&base_url);

        let request = QueryDescriptor::new(["foo"], ["activeUsers"])
            .to_realtime_request("properties/307310528")
            .unwrap();
        let err = client.run_realtime_report(&request).await.unwrap_err();

        match err {
            ApiError::GoogleError { status, code, message } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(code, "INVALID_ARGUMENT");
                assert!(message.contains("not a valid dimension"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_metadata_lookup() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"name":"properties/307310528/metadata",
                "dimensions":[{"apiName":"city","uiName":"City"}],
                "metrics":[{"apiName":"activeUsers","type":"TYPE_INTEGER"}]}"#,
        )
        .await;
        let client = client_for(&base_url);

        let metadata = client.get_metadata("properties/307310528").await.unwrap();
        assert_eq!(metadata.dimensions[0].api_name, "city");
        assert_eq!(metadata.metrics[0].metric_type.as_deref(), Some("TYPE_INTEGER"));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("GET /v1beta/properties/307310528/metadata HTTP/1.1"));
    }

    #[test]
    fn test_non_google_error_body_kept_raw() {
        let err = parse_error_response(StatusCode::BAD_GATEWAY, "<html>upstream</html>");
        assert!(matches!(
            err,
            ApiError::HttpError { status, ref body }
                if status == StatusCode::BAD_GATEWAY && body.contains("upstream")
        ));
    }

    #[test]
    fn test_error_code_falls_back_to_numeric() {
        let err = parse_error_response(
            StatusCode::FORBIDDEN,
            r#"{"error":{"code":403,"message":"User does not have sufficient permissions"}}"#,
        );
        assert!(matches!(err, ApiError::GoogleError { ref code, .. } if code == "403"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("Zürich", 2), "Zü");
        assert_eq!(truncate("US", 10), "US");
    }
}
