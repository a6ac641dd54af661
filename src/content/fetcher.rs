use super::FailureKind;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default timeout for the plain page fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Default response body limit (5MB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0 Safari/537.36";

/// Errors from a plain HTTP fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded its timeout
    #[error("request timed out")]
    Timeout,
    /// Response body exceeded the configured size limit
    #[error("response too large")]
    ResponseTooLarge,
}

impl FetchError {
    /// Classifies the failure for user-facing reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Timeout => FailureKind::Timeout,
            FetchError::HttpStatus(status) => classify_status(*status),
            FetchError::ResponseTooLarge => FailureKind::Protocol,
            FetchError::Network(e) => classify_reqwest(e),
        }
    }
}

/// 401/403/407/429/451 mean the site refused us; anything else is an
/// upstream protocol failure.
fn classify_status(status: u16) -> FailureKind {
    match status {
        401 | 403 | 407 | 429 | 451 => FailureKind::Blocked,
        _ => FailureKind::Protocol,
    }
}

fn classify_reqwest(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        return FailureKind::Timeout;
    }
    if let Some(status) = err.status() {
        return classify_status(status.as_u16());
    }
    if err.is_connect() {
        // reqwest has no typed DNS error; the resolver failure is only
        // visible in the source chain of the connect error.
        if source_chain_mentions(err, &["dns error", "failed to lookup", "no record found"]) {
            return FailureKind::Dns;
        }
        return FailureKind::Protocol;
    }
    if err.is_redirect() {
        return FailureKind::NavigationAborted;
    }
    if err.is_body() || err.is_decode() || err.is_request() {
        return FailureKind::Protocol;
    }
    FailureKind::Unknown
}

fn source_chain_mentions(err: &(dyn std::error::Error + 'static), needles: &[&str]) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        let text = e.to_string().to_lowercase();
        if needles.iter().any(|n| text.contains(n)) {
            return true;
        }
        current = e.source();
    }
    false
}

/// A fetched HTTP response body with the metadata the pipeline needs.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects; relative links on the page resolve against it
    pub final_url: Url,
    /// Lowercased `Content-Type` header, if the server sent one
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedPage {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Whether the declared content type is an RSS/Atom/XML document.
    pub fn is_feed_content_type(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(is_feed_content_type)
    }
}

/// Whether a `Content-Type` value declares an RSS/Atom/XML document.
pub fn is_feed_content_type(content_type: &str) -> bool {
    let ct = content_type.to_lowercase();
    ct.contains("application/rss+xml")
        || ct.contains("application/atom+xml")
        || ct.contains("application/xml")
        || ct.contains("text/xml")
}

/// Plain HTTP GET collaborator with a timeout and a body size limit.
///
/// The client is shared (connection pooling); cloning the fetcher is cheap.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration, max_body_bytes: usize) -> Self {
        Self {
            client,
            timeout,
            max_body_bytes,
        }
    }

    /// Builds the shared HTTP client: browser-like user agent, an
    /// `Accept-Language` header and at most 10 redirects.
    ///
    /// # Errors
    ///
    /// Returns the builder error if TLS initialisation fails or a header
    /// value is not valid.
    pub fn build_client(
        user_agent: &str,
        accept_language: &str,
    ) -> Result<reqwest::Client, reqwest::Error> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(accept_language) {
            headers.insert(ACCEPT_LANGUAGE, value);
        } else {
            tracing::warn!(
                accept_language = %accept_language,
                "Ignoring invalid Accept-Language value"
            );
        }

        reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
    }

    /// Fetches `url` using the fetcher's own timeout.
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.fetch_with(url, None, self.timeout).await
    }

    /// Fetches `url` with an optional `Accept` header and an explicit timeout.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Timeout`] if the response headers do not arrive in time
    /// - [`FetchError::HttpStatus`] for any non-2xx response
    /// - [`FetchError::ResponseTooLarge`] if the body exceeds the limit
    /// - [`FetchError::Network`] for connection, TLS and body errors
    pub async fn fetch_with(
        &self,
        url: &str,
        accept: Option<&str>,
        timeout: Duration,
    ) -> Result<FetchedPage, FetchError> {
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(
                url = %url,
                status = status.as_u16(),
                "Fetch returned non-success status"
            );
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_lowercase);
        let final_url = response.url().clone();

        let body = tokio::time::timeout(timeout, read_limited_bytes(response, self.max_body_bytes))
            .await
            .map_err(|_| FetchError::Timeout)??;

        tracing::debug!(
            url = %url,
            final_url = %final_url,
            bytes = body.len(),
            content_type = content_type.as_deref().unwrap_or(""),
            "Fetched page"
        );

        Ok(FetchedPage {
            final_url,
            content_type,
            body,
        })
    }
}

/// Reads a response body, failing as soon as it grows past `limit`.
async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
