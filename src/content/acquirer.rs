use super::fetcher::HttpFetcher;
use super::render::{RenderError, Renderer};
use super::FailureKind;
use crate::engine::ProgressSink;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Markers of bot-challenge interstitials served instead of the real page.
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "cf-chl-widget",
    "<title>just a moment...</title>",
    "attention required! | cloudflare",
    "captcha-delivery.com",
    "px-captcha",
];

/// Challenge pages are small; a large document that merely mentions a
/// marker is treated as real content.
const CHALLENGE_MAX_BYTES: usize = 64 * 1024;

/// How a page was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquiredVia {
    Render,
    Fetch,
}

/// An acquired page, ready for feed location and extraction.
#[derive(Debug, Clone)]
pub struct Page {
    /// Address the document came from, after redirects for plain fetches.
    /// Relative links resolve against it.
    pub url: Url,
    pub html: String,
    /// Declared content type; only known for plain fetches
    pub content_type: Option<String>,
    pub via: AcquiredVia,
}

/// Both the render and the plain fetch failed.
#[derive(Debug, Error)]
#[error("{kind}: {detail}")]
pub struct AcquisitionError {
    /// Classified cause of the final attempt
    pub kind: FailureKind,
    /// Diagnostic text of the final attempt
    pub detail: String,
    /// Diagnostic text of the render attempt, when one was made
    pub render: Option<String>,
}

/// Orchestrates render-then-fetch page acquisition.
pub struct PageAcquirer {
    renderer: Option<Arc<dyn Renderer>>,
    fetcher: HttpFetcher,
    render_timeout: Duration,
}

impl PageAcquirer {
    pub fn new(
        renderer: Option<Arc<dyn Renderer>>,
        fetcher: HttpFetcher,
        render_timeout: Duration,
    ) -> Self {
        Self {
            renderer,
            fetcher,
            render_timeout,
        }
    }

    pub fn fetcher(&self) -> &HttpFetcher {
        &self.fetcher
    }

    /// Acquires `url`, rendering it when a renderer is configured and falling
    /// back to a plain GET when rendering fails.
    ///
    /// # Errors
    ///
    /// Returns [`AcquisitionError`] classified by the plain fetch failure when
    /// every attempt failed.
    pub async fn acquire(
        &self,
        url: &Url,
        sink: &mut dyn ProgressSink,
    ) -> Result<Page, AcquisitionError> {
        let mut render_failure: Option<RenderError> = None;

        if let Some(renderer) = &self.renderer {
            sink.progress("Rendering the page...");

            // Bound the call even if the renderer ignores its timeout argument
            let rendered =
                tokio::time::timeout(self.render_timeout, renderer.render(url, self.render_timeout))
                    .await
                    .unwrap_or(Err(RenderError::Timeout(self.render_timeout)));

            match rendered {
                Ok(html) if looks_blocked(&html) => {
                    render_failure = Some(RenderError::Blocked);
                }
                Ok(html) => {
                    tracing::debug!(url = %url, bytes = html.len(), "Rendered page");
                    return Ok(Page {
                        url: url.clone(),
                        html,
                        content_type: None,
                        via: AcquiredVia::Render,
                    });
                }
                Err(e) => render_failure = Some(e),
            }

            if let Some(e) = &render_failure {
                tracing::warn!(
                    url = %url,
                    error = %e,
                    kind = %e.kind(),
                    "Render failed, falling back to plain fetch"
                );
            }
            sink.progress("Rendering failed, trying a plain fetch instead...");
        } else {
            sink.progress("Fetching the page...");
        }

        match self.fetcher.fetch(url.as_str()).await {
            Ok(fetched) => Ok(Page {
                url: fetched.final_url.clone(),
                html: fetched.text(),
                content_type: fetched.content_type,
                via: AcquiredVia::Fetch,
            }),
            Err(e) => {
                let kind = e.kind();
                tracing::warn!(url = %url, error = %e, kind = %kind, "Page acquisition failed");
                Err(AcquisitionError {
                    kind,
                    detail: e.to_string(),
                    render: render_failure.map(|e| e.to_string()),
                })
            }
        }
    }
}

/// Whether rendered HTML is a bot-challenge interstitial.
pub fn looks_blocked(html: &str) -> bool {
    if html.len() > CHALLENGE_MAX_BYTES {
        return false;
    }
    let lower = html.to_lowercase();
    CHALLENGE_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::fetcher::{DEFAULT_MAX_BODY_BYTES, DEFAULT_USER_AGENT};
    use crate::engine::VecSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedRenderer {
        result: fn() -> Result<String, RenderError>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Renderer for FixedRenderer {
        async fn render(&self, _url: &Url, _timeout: Duration) -> Result<String, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    struct HangingRenderer;

    #[async_trait::async_trait]
    impl Renderer for HangingRenderer {
        async fn render(&self, _url: &Url, _timeout: Duration) -> Result<String, RenderError> {
            futures::future::pending::<()>().await;
            Ok(String::new())
        }
    }

    fn fetcher() -> HttpFetcher {
        let client = HttpFetcher::build_client(DEFAULT_USER_AGENT, "en").unwrap();
        HttpFetcher::new(client, Duration::from_secs(5), DEFAULT_MAX_BODY_BYTES)
    }

    async fn html_server(body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_rendered_page_is_used() {
        let renderer = Arc::new(FixedRenderer {
            result: || Ok("<html><body>rendered</body></html>".to_string()),
            calls: AtomicUsize::new(0),
        });
        let acquirer = PageAcquirer::new(Some(renderer.clone()), fetcher(), Duration::from_secs(5));
        let url = Url::parse("https://example.com/").unwrap();
        let mut sink = VecSink::default();

        let page = acquirer.acquire(&url, &mut sink).await.unwrap();
        assert_eq!(page.via, AcquiredVia::Render);
        assert!(page.html.contains("rendered"));
        assert!(page.content_type.is_none());
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_render_failure_falls_back_to_fetch() {
        let server = html_server("<html>fetched</html>").await;
        let renderer = Arc::new(FixedRenderer {
            result: || Err(RenderError::Navigation("net::ERR_ABORTED".into())),
            calls: AtomicUsize::new(0),
        });
        let acquirer = PageAcquirer::new(Some(renderer), fetcher(), Duration::from_secs(5));
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let mut sink = VecSink::default();

        let page = acquirer.acquire(&url, &mut sink).await.unwrap();
        assert_eq!(page.via, AcquiredVia::Fetch);
        assert_eq!(page.html, "<html>fetched</html>");
        assert_eq!(page.content_type.as_deref(), Some("text/html"));
        assert!(sink
            .progress_messages()
            .iter()
            .any(|m| m.contains("plain fetch")));
    }

    #[tokio::test]
    async fn test_challenge_page_falls_back_to_fetch() {
        let server = html_server("<html>real</html>").await;
        let renderer = Arc::new(FixedRenderer {
            result: || Ok("<html><title>Just a moment...</title></html>".to_string()),
            calls: AtomicUsize::new(0),
        });
        let acquirer = PageAcquirer::new(Some(renderer), fetcher(), Duration::from_secs(5));
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();

        let page = acquirer
            .acquire(&url, &mut VecSink::default())
            .await
            .unwrap();
        assert_eq!(page.via, AcquiredVia::Fetch);
    }

    #[tokio::test]
    async fn test_hanging_renderer_is_bounded() {
        let server = html_server("<html>fetched</html>").await;
        let acquirer = PageAcquirer::new(
            Some(Arc::new(HangingRenderer)),
            fetcher(),
            Duration::from_millis(50),
        );
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();

        let page = acquirer
            .acquire(&url, &mut VecSink::default())
            .await
            .unwrap();
        assert_eq!(page.via, AcquiredVia::Fetch);
    }

    #[tokio::test]
    async fn test_both_failures_report_fetch_kind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        let renderer = Arc::new(FixedRenderer {
            result: || Err(RenderError::Timeout(Duration::from_secs(45))),
            calls: AtomicUsize::new(0),
        });
        let acquirer = PageAcquirer::new(Some(renderer), fetcher(), Duration::from_secs(5));
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();

        let err = acquirer
            .acquire(&url, &mut VecSink::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Blocked);
        assert!(err.render.as_deref().unwrap_or("").contains("timed out"));
    }

    #[test]
    fn test_looks_blocked() {
        assert!(looks_blocked(
            "<html><head><title>Just a moment...</title></head></html>"
        ));
        assert!(!looks_blocked("<html><body>news</body></html>"));
        let large = format!("<html>{}cf-browser-verification</html>", "x".repeat(70_000));
        assert!(!looks_blocked(&large));
    }
}
