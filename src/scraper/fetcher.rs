//! HTTP fetcher shared by schedule scrapers
//!
//! Wraps a reqwest client with the plumbing every source needs:
//! - rate limiting with governor
//! - bounded per-request timeout
//! - automatic retry with exponential backoff on transient statuses
//! - User-Agent rotation
//! - GB18030 fallback decoding for legacy Chinese-language sources

use encoding_rs::{GB18030, UTF_8};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::seq::SliceRandom;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT},
    Client, Response,
};
use std::num::NonZeroU32;
use std::time::Duration;

use crate::error::FetchError;

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Rate-limited HTTP fetcher for schedule sources.
pub struct Fetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Maximum number of retry attempts for failed requests
    max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    base_delay_ms: u64,
}

impl Fetcher {
    /// Create a new fetcher with default retry settings.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(requests_per_second: u32) -> Result<Self, FetchError> {
        Self::with_config(requests_per_second, 2, Duration::from_secs(10))
    }

    /// Create a new fetcher with custom configuration.
    ///
    /// # Arguments
    ///
    /// * `requests_per_second` - Maximum number of requests per second
    /// * `max_retries` - Maximum number of retry attempts
    /// * `timeout` - Per-request timeout; a fetch never waits longer
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn with_config(
        requests_per_second: u32,
        max_retries: u32,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_store(true)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            max_retries,
            base_delay_ms: 1000,
        })
    }

    /// Fetch a URL and decode the body to text.
    ///
    /// Waits for the rate limiter, then retries transient failures with
    /// exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns various `FetchError` variants depending on the failure mode
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.rate_limiter.until_ready().await;
        self.fetch_with_retry(url).await
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<String, FetchError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay_ms * 2_u64.pow(attempt - 1);
                tracing::debug!(url = %url, attempt = attempt, delay_ms = delay, "retrying fetch");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self
                .client
                .get(url)
                .headers(self.build_headers())
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return self.decode_response(response).await;
                    } else if Self::should_retry(status.as_u16()) {
                        last_error = Some(FetchError::ServerError(status.as_u16()));
                        continue;
                    } else {
                        return Err(FetchError::ServerError(status.as_u16()));
                    }
                }
                Err(e) => {
                    if e.is_timeout() {
                        last_error = Some(FetchError::Timeout);
                    } else {
                        last_error = Some(FetchError::Http(e));
                    }
                }
            }
        }

        Err(last_error.unwrap_or(FetchError::MaxRetriesExceeded))
    }

    /// Determine if a status code should trigger a retry
    ///
    /// Retry on 429 and transient 5xx; anything else fails immediately.
    fn should_retry(status: u16) -> bool {
        matches!(status, 429 | 500 | 502 | 503 | 504)
    }

    async fn decode_response(&self, response: Response) -> Result<String, FetchError> {
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_default();

        let bytes = response.bytes().await?;
        self.decode_bytes(&bytes, &content_type)
    }

    /// Decode bytes to a UTF-8 string with encoding detection.
    ///
    /// Strategy: honor an explicit charset in the Content-Type header, try
    /// UTF-8, then fall back to GB18030 (which covers GBK/GB2312 labels the
    /// legacy sources actually serve).
    pub fn decode_bytes(&self, bytes: &[u8], content_type: &str) -> Result<String, FetchError> {
        let ct = content_type.to_lowercase();
        if ct.contains("charset=gb") {
            return self.decode_gb18030(bytes);
        }
        if ct.contains("charset=utf-8") {
            return self.decode_utf8(bytes);
        }

        if let Ok(text) = self.decode_utf8(bytes) {
            if !text.starts_with('\u{FFFD}') {
                return Ok(text);
            }
        }

        if let Ok(text) = self.decode_gb18030(bytes) {
            return Ok(text);
        }

        Err(FetchError::Decode(
            "Failed to decode content with UTF-8 or GB18030".to_string(),
        ))
    }

    fn decode_utf8(&self, bytes: &[u8]) -> Result<String, FetchError> {
        let (cow, _encoding, had_errors) = UTF_8.decode(bytes);
        if had_errors {
            return Err(FetchError::Decode("UTF-8 decoding errors".to_string()));
        }
        Ok(cow.into_owned())
    }

    fn decode_gb18030(&self, bytes: &[u8]) -> Result<String, FetchError> {
        let (cow, _encoding, had_errors) = GB18030.decode(bytes);
        if had_errors {
            return Err(FetchError::Decode("GB18030 decoding errors".to_string()));
        }
        Ok(cow.into_owned())
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(USER_AGENT, HeaderValue::from_static(self.random_user_agent()));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/json,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        headers.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate"),
        );

        headers
    }

    fn random_user_agent(&self) -> &'static str {
        let mut rng = rand::thread_rng();
        USER_AGENTS.choose(&mut rng).unwrap_or(&USER_AGENTS[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_creation() {
        assert!(Fetcher::new(10).is_ok());
        assert!(Fetcher::with_config(5, 3, Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_zero_rate_clamps_to_one() {
        // A misconfigured zero rate must not panic; it clamps to 1 rps.
        assert!(Fetcher::new(0).is_ok());
    }

    #[test]
    fn test_should_retry() {
        assert!(Fetcher::should_retry(429));
        assert!(Fetcher::should_retry(500));
        assert!(Fetcher::should_retry(503));
        assert!(!Fetcher::should_retry(400));
        assert!(!Fetcher::should_retry(404));
        assert!(!Fetcher::should_retry(200));
    }

    #[test]
    fn test_decode_utf8() {
        let fetcher = Fetcher::new(10).unwrap();
        let text = "CCTV-1 综合频道";
        let decoded = fetcher.decode_bytes(text.as_bytes(), "text/html; charset=utf-8");
        assert_eq!(decoded.unwrap(), text);
    }

    #[test]
    fn test_decode_gb18030() {
        let fetcher = Fetcher::new(10).unwrap();
        // "新闻联播" in GB18030 encoding
        let gb_bytes: &[u8] = &[0xd0, 0xc2, 0xce, 0xc5, 0xc1, 0xaa, 0xb2, 0xa5];
        let decoded = fetcher.decode_bytes(gb_bytes, "text/html; charset=gb2312");
        assert_eq!(decoded.unwrap(), "新闻联播");
    }

    #[test]
    fn test_decode_gb18030_fallback() {
        let fetcher = Fetcher::new(10).unwrap();
        // Same bytes without a charset label: UTF-8 fails, GB18030 succeeds.
        let gb_bytes: &[u8] = &[0xd0, 0xc2, 0xce, 0xc5, 0xc1, 0xaa, 0xb2, 0xa5];
        let decoded = fetcher.decode_bytes(gb_bytes, "text/html");
        assert_eq!(decoded.unwrap(), "新闻联播");
    }

    #[test]
    fn test_headers_are_complete() {
        let fetcher = Fetcher::new(10).unwrap();
        let headers = fetcher.build_headers();
        assert!(headers.contains_key(USER_AGENT));
        assert!(headers.contains_key(ACCEPT));
        assert!(headers.contains_key(ACCEPT_LANGUAGE));
        assert!(headers.contains_key(ACCEPT_ENCODING));
        assert!(USER_AGENTS.contains(&fetcher.random_user_agent()));
    }

    #[tokio::test]
    async fn test_fetch_against_mock_server() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/epg"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(10).unwrap();
        let body = fetcher.fetch_text(&format!("{}/epg", server.uri())).await;
        assert_eq!(body.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_non_retryable_status_fails_fast() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(10).unwrap();
        let result = fetcher
            .fetch_text(&format!("{}/missing", server.uri()))
            .await;
        assert!(matches!(result, Err(FetchError::ServerError(404))));
    }
}
