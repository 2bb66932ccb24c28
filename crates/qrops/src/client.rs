//! Rate-limited HTTP access to the vendor API
//!
//! Every network call in the toolkit goes through [`RateLimitedClient`],
//! which enforces the vendor's stated ceiling of 10 calls per second with a
//! fixed one-second window: once the window's budget is spent, the client
//! sleeps out the remainder and starts a fresh window. Bursts exactly at
//! window boundaries are accepted, matching how the ceiling is specified.
//!
//! The client classifies transport failures but deliberately returns non-2xx
//! responses as-is: expected status codes differ per endpoint (deletion
//! treats both 200 and 204 as success), so classification belongs to the
//! caller. Retries are also the caller's concern.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;

use qrops_core::codes::QrCode;

use crate::error::Error;

pub const API_BASE: &str = "https://api.qr-code-generator.com/v1";
pub const DESIGN_API_BASE: &str = "https://api.qrcg.com/v3/qrcodes";

/// Listing page size; the stop condition below depends on it.
pub const PAGE_SIZE: usize = 100;

/// Ceiling on pages fetched from a single listing, so an endpoint that never
/// shrinks becomes a hard error instead of a silent infinite loop.
pub const MAX_PAGES: usize = 10_000;

/// API configuration for one account
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_key: String,
}

/// HTTP client bound to one account's API key, throttled to a fixed-window
/// call budget.
pub struct RateLimitedClient {
    http: reqwest::Client,
    api_key: String,
    budget: u32,
    window: Duration,
    calls_in_window: u32,
    window_start: Instant,
}

impl RateLimitedClient {
    pub fn new(config: &ApiConfig, budget: u32) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Generic(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            budget: budget.max(1),
            window: Duration::from_secs(1),
            calls_in_window: 0,
            window_start: Instant::now(),
        })
    }

    /// Override the window length. Production code keeps the one-second
    /// default; tests shrink it so throttle behavior is observable quickly.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Take one call slot, sleeping out the current window first if its
    /// budget is already spent.
    async fn acquire(&mut self) {
        if self.calls_in_window >= self.budget {
            let elapsed = self.window_start.elapsed();
            if elapsed < self.window {
                let wait = self.window - elapsed;
                log::debug!("rate budget exhausted, sleeping {wait:?}");
                tokio::time::sleep(wait).await;
            }
            self.calls_in_window = 0;
            self.window_start = Instant::now();
        }
        self.calls_in_window += 1;
    }

    /// Issue a prebuilt request under the rate limit.
    pub async fn send(&mut self, request: RequestBuilder) -> Result<Response, Error> {
        self.acquire().await;
        request
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    /// Issue a v1 request, authenticated with the `access-token` parameter.
    pub async fn execute(
        &mut self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Response, Error> {
        let mut request = self
            .http
            .request(method, url)
            .query(&[("access-token", self.api_key.as_str())]);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request).await
    }

    pub async fn get(&mut self, url: &str) -> Result<Response, Error> {
        self.execute(Method::GET, url, None).await
    }

    pub async fn get_with_query(
        &mut self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Response, Error> {
        let request = self
            .http
            .get(url)
            .query(&[("access-token", self.api_key.as_str())])
            .query(query);
        self.send(request).await
    }

    pub async fn post(&mut self, url: &str, body: &Value) -> Result<Response, Error> {
        self.execute(Method::POST, url, Some(body)).await
    }

    pub async fn put(&mut self, url: &str, body: &Value) -> Result<Response, Error> {
        self.execute(Method::PUT, url, Some(body)).await
    }

    pub async fn delete(&mut self, url: &str) -> Result<Response, Error> {
        self.execute(Method::DELETE, url, None).await
    }

    /// Issue a request against the v3 design endpoint, which authenticates
    /// with an `Authorization: Key` header instead of the query parameter.
    pub async fn execute_design(
        &mut self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Response, Error> {
        let mut request = self
            .http
            .request(method, url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Key {}", self.api_key),
            )
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request).await
    }
}

/// One page of a listing endpoint; implemented over HTTP by the API layer
/// and over fixture data in tests.
#[async_trait]
pub trait PageFetcher {
    async fn fetch_page(&mut self, page: usize) -> Result<Vec<QrCode>, Error>;
}

/// Fetch a complete result set from a page-based listing.
///
/// Pages start at 1 with a fixed size of [`PAGE_SIZE`]; items are appended
/// in API order and fetching stops at the first page that is short or empty.
/// No sorting, no deduplication: ordering and uniqueness are the API's
/// contract. Exceeding [`MAX_PAGES`] is a fatal error, never a truncation.
pub async fn fetch_all(fetcher: &mut impl PageFetcher) -> Result<Vec<QrCode>, Error> {
    let mut codes = Vec::new();

    for page in 1..=MAX_PAGES {
        let page_codes = fetcher.fetch_page(page).await?;
        let fetched = page_codes.len();
        codes.extend(page_codes);

        if fetched < PAGE_SIZE {
            return Ok(codes);
        }
    }

    Err(Error::FatalPrecondition(format!(
        "listing exceeded the {MAX_PAGES}-page ceiling"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(budget: u32, window_ms: u64) -> RateLimitedClient {
        let config = ApiConfig {
            api_key: "test-key".to_string(),
        };
        RateLimitedClient::new(&config, budget)
            .unwrap()
            .with_window(Duration::from_millis(window_ms))
    }

    #[tokio::test]
    async fn test_acquire_blocks_after_budget_exhausted() {
        let mut client = test_client(10, 40);

        // 25 calls at a budget of 10 per window must sit out at least two
        // full windows (after calls 10 and 20).
        let start = Instant::now();
        for _ in 0..25 {
            client.acquire().await;
        }
        let elapsed = start.elapsed();

        assert!(
            elapsed >= Duration::from_millis(80),
            "expected at least two window waits, elapsed {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_acquire_within_budget_does_not_wait() {
        let mut client = test_client(10, 200);

        let start = Instant::now();
        for _ in 0..10 {
            client.acquire().await;
        }

        assert!(start.elapsed() < Duration::from_millis(100));
    }

    struct FixturePages {
        items: Vec<QrCode>,
        pages_fetched: usize,
    }

    impl FixturePages {
        fn with_items(count: u64) -> Self {
            let items = (1..=count)
                .map(|id| QrCode {
                    id,
                    type_id: Some(1),
                    type_name: None,
                    title: Some(format!("QR {id}")),
                    short_code: None,
                    short_url: None,
                    target_url: None,
                    status: None,
                })
                .collect();
            Self {
                items,
                pages_fetched: 0,
            }
        }
    }

    #[async_trait]
    impl PageFetcher for FixturePages {
        async fn fetch_page(&mut self, page: usize) -> Result<Vec<QrCode>, Error> {
            self.pages_fetched += 1;
            let start = (page - 1) * PAGE_SIZE;
            let end = (start + PAGE_SIZE).min(self.items.len());
            if start >= self.items.len() {
                return Ok(Vec::new());
            }
            Ok(self.items[start..end].to_vec())
        }
    }

    #[tokio::test]
    async fn test_fetch_all_short_final_page_stops() {
        let mut pages = FixturePages::with_items(150);

        let codes = fetch_all(&mut pages).await.unwrap();

        assert_eq!(codes.len(), 150);
        assert_eq!(pages.pages_fetched, 2);
        // API order preserved, no duplicates.
        assert_eq!(codes[0].id, 1);
        assert_eq!(codes[149].id, 150);
        let unique: std::collections::HashSet<u64> = codes.iter().map(|c| c.id).collect();
        assert_eq!(unique.len(), 150);
    }

    #[tokio::test]
    async fn test_fetch_all_exact_multiple_probes_empty_page() {
        let mut pages = FixturePages::with_items(200);

        let codes = fetch_all(&mut pages).await.unwrap();

        assert_eq!(codes.len(), 200);
        // Two full pages of data plus the empty page that ends the scan.
        assert_eq!(pages.pages_fetched, 3);
    }

    #[tokio::test]
    async fn test_fetch_all_empty_listing() {
        let mut pages = FixturePages::with_items(0);

        let codes = fetch_all(&mut pages).await.unwrap();

        assert!(codes.is_empty());
        assert_eq!(pages.pages_fetched, 1);
    }

    struct NeverShrinks;

    #[async_trait]
    impl PageFetcher for NeverShrinks {
        async fn fetch_page(&mut self, page: usize) -> Result<Vec<QrCode>, Error> {
            Ok((0..PAGE_SIZE as u64)
                .map(|i| QrCode {
                    id: page as u64 * PAGE_SIZE as u64 + i,
                    type_id: None,
                    type_name: None,
                    title: None,
                    short_code: None,
                    short_url: None,
                    target_url: None,
                    status: None,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_fetch_all_page_ceiling_is_fatal() {
        let err = fetch_all(&mut NeverShrinks).await.unwrap_err();
        assert!(matches!(err, Error::FatalPrecondition(_)));
    }
}
