// Fetcher - one GET per call, no retries, no disk writes
// Retry/backoff belongs to whoever drives the stages

use crate::error::FetchError;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default request deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("state-registry/", env!("CARGO_PKG_VERSION"));

/// HTTP fetcher for the source page
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError {
                status: None,
                cause: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Fetcher { client, timeout })
    }

    /// Fetch raw markup from `url`.
    ///
    /// Non-2xx answers and transport failures (DNS, refused connection,
    /// timeout) all come back as `FetchError`.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, timeout_secs = self.timeout.as_secs(), "fetching source");

        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(url, error = %e, "transport error");
            transport_error(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "source returned error status");
            return Err(FetchError {
                status: Some(status.as_u16()),
                cause: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        let body = response.text().await.map_err(transport_error)?;
        info!(url, status = status.as_u16(), bytes = body.len(), "fetched source");

        Ok(body)
    }
}

fn transport_error(e: reqwest::Error) -> FetchError {
    let cause = if e.is_timeout() {
        format!("request timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    };

    FetchError {
        status: e.status().map(|s| s.as_u16()),
        cause,
    }
}

#[cfg(all(test, feature = "server"))]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let base = serve(Router::new().route("/page", get(|| async { "<table></table>" }))).await;
        let fetcher = Fetcher::new(DEFAULT_TIMEOUT).unwrap();

        let body = fetcher.fetch(&format!("{}/page", base)).await.unwrap();

        assert_eq!(body, "<table></table>");
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let base = serve(Router::new().route(
            "/gone",
            get(|| async { (StatusCode::NOT_FOUND, "nope") }),
        ))
        .await;
        let fetcher = Fetcher::new(DEFAULT_TIMEOUT).unwrap();

        let err = fetcher.fetch(&format!("{}/gone", base)).await.unwrap_err();

        assert_eq!(err.status, Some(404));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = Fetcher::new(DEFAULT_TIMEOUT).unwrap();
        let err = fetcher.fetch(&format!("http://{}/", addr)).await.unwrap_err();

        assert_eq!(err.status, None);
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let base = serve(Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        ))
        .await;
        let fetcher = Fetcher::new(Duration::from_millis(200)).unwrap();

        let err = fetcher.fetch(&format!("{}/slow", base)).await.unwrap_err();

        assert_eq!(err.status, None);
        assert!(err.cause.contains("timed out"), "cause was: {}", err.cause);
    }
}
