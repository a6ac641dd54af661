//! The feed discovery pipeline.
//!
//! [`FeedEngine::run`] takes a [`FeedRequest`] through every stage in order:
//!
//! 1. URL validation (and the optional private-host guard)
//! 2. Per-URL throttle
//! 3. Result cache lookup (a hit ends the run)
//! 4. Page acquisition (render, then plain fetch)
//! 5. Feed location (the URL itself, then `<link>` tags)
//! 6. Selector extraction, then heuristic extraction
//! 7. RSS synthesis and cache store
//!
//! Progress is reported through a [`ProgressSink`]; [`report`] wraps a run
//! with its terminal events for streaming callers.

mod error;
mod progress;

pub use error::PipelineError;
pub use progress::{
    report, ChannelSink, LogSink, ProgressEvent, ProgressSink, VecSink, SSE_END,
};

use crate::config::Config;
use crate::content::{
    AcquiredVia, AcquisitionError, CommandRenderer, HttpFetcher, Page, PageAcquirer, Renderer,
};
use crate::feed::{
    detect_feed, extract_heuristic, extract_with_selectors, fetch_located_feed, find_feed_link,
    plan_selectors, synthesize, ItemMap,
};
use crate::storage::{FeedCache, RequestGate, ResultCache, ThrottleGuard};
use crate::util::{reject_private_host, validate_url};
use scraper::Html;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// A request to locate or synthesize a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    /// Raw URL as supplied by the caller; also the throttle and cache key
    pub url: String,
    /// Optional caller selector, used as the sole extraction strategy
    pub selector: Option<String>,
}

impl FeedRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            selector: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }
}

/// Where a delivered document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverySource {
    Cache,
    /// The request URL is itself a feed
    DirectFeed,
    /// The page links to a feed, which was fetched and verified
    LocatedFeed,
    /// Built from scraped items
    Synthesized { items: usize },
}

/// A successful pipeline result.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub document: String,
    /// URL of an existing feed, when one was found
    pub feed_url: Option<String>,
    pub source: DeliverySource,
}

/// Pipeline tuning that is not owned by a collaborator.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub block_private_hosts: bool,
    pub max_items: usize,
    pub feed_fetch_timeout: Duration,
    pub fallback_selectors: Vec<String>,
    pub site_selectors: HashMap<String, Vec<String>>,
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            block_private_hosts: config.block_private_hosts,
            max_items: config.max_items,
            feed_fetch_timeout: config.feed_fetch_timeout(),
            fallback_selectors: config.fallback_selectors.clone(),
            site_selectors: config.site_selectors.clone(),
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Runs the discovery pipeline against shared stores and collaborators.
pub struct FeedEngine {
    gate: Arc<dyn RequestGate>,
    cache: Arc<dyn FeedCache>,
    acquirer: PageAcquirer,
    options: EngineOptions,
}

impl FeedEngine {
    pub fn new(
        gate: Arc<dyn RequestGate>,
        cache: Arc<dyn FeedCache>,
        acquirer: PageAcquirer,
        options: EngineOptions,
    ) -> Self {
        Self {
            gate,
            cache,
            acquirer,
            options,
        }
    }

    /// Builds an engine with in-memory stores and the collaborators the
    /// configuration names.
    ///
    /// # Errors
    ///
    /// Returns the HTTP client builder error if TLS initialisation fails.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = HttpFetcher::build_client(&config.user_agent, &config.accept_language)?;
        let fetcher = HttpFetcher::new(client, config.fetch_timeout(), config.max_body_bytes);

        let renderer = config.renderer.as_ref().map(|r| {
            Arc::new(CommandRenderer::new(r.command.clone(), r.args.clone())) as Arc<dyn Renderer>
        });
        let acquirer = PageAcquirer::new(renderer, fetcher, config.render_timeout());

        let gate = Arc::new(ThrottleGuard::new(
            config.throttle_window(),
            config.throttle_capacity,
        ));
        let cache = Arc::new(ResultCache::new(config.cache_ttl(), config.cache_capacity));

        Ok(Self::new(
            gate,
            cache,
            acquirer,
            EngineOptions::from_config(config),
        ))
    }

    /// Locates or synthesizes a feed for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when the URL is invalid, the request is
    /// throttled, the page cannot be acquired, or no articles are found.
    #[tracing::instrument(skip_all, fields(url = %request.url))]
    pub async fn run(
        &self,
        request: &FeedRequest,
        sink: &mut dyn ProgressSink,
    ) -> Result<Delivery, PipelineError> {
        let key = request.url.as_str();
        let url = self.validate(key)?;
        self.gate.check_and_record(key)?;

        if let Some(document) = self.cache.get(key) {
            tracing::debug!("Cache hit");
            sink.progress("Cache hit: returning the stored feed");
            return Ok(Delivery {
                document,
                feed_url: None,
                source: DeliverySource::Cache,
            });
        }

        sink.progress("Loading the page...");
        let page = self.acquirer.acquire(&url, sink).await?;

        if page.via == AcquiredVia::Fetch
            && page
                .content_type
                .as_deref()
                .is_some_and(crate::content::is_feed_content_type)
        {
            tracing::info!("URL is already a feed");
            sink.progress("The URL is already a feed");
            self.cache.put(key, page.html.clone());
            return Ok(Delivery {
                document: page.html,
                feed_url: Some(key.to_owned()),
                source: DeliverySource::DirectFeed,
            });
        }

        sink.progress("Looking for an existing feed...");
        if let Some(feed_url) = find_feed_link(&page.html, &page.url) {
            if let Some(delivery) = self.use_located_feed(key, &feed_url, sink).await {
                return Ok(delivery);
            }
        }

        let selectors = plan_selectors(
            request.selector.as_deref(),
            &page.url,
            &self.options.site_selectors,
            &self.options.fallback_selectors,
        );
        sink.progress("Extracting articles...");
        let (items, tried) = extract_items(&page, &selectors, sink);

        if items.is_empty() {
            tracing::info!(tried = tried.len(), "No articles found");
            return Err(PipelineError::NoArticlesFound { tried });
        }

        let count = items.len().min(self.options.max_items);
        sink.progress(&format!("Found {} articles, generating RSS...", items.len()));
        let document = synthesize(key, &page.url, &items, self.options.max_items)?;
        self.cache.put(key, document.clone());

        tracing::info!(items = count, "Synthesized feed");
        Ok(Delivery {
            document,
            feed_url: None,
            source: DeliverySource::Synthesized { items: count },
        })
    }

    /// Reports the feed URL a page publishes, if any.
    ///
    /// Runs validation and a single plain fetch only: no throttle, cache,
    /// rendering or extraction.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for a bad URL, or
    /// [`PipelineError::Acquisition`] if the fetch fails.
    pub async fn check_feed(&self, raw_url: &str) -> Result<Option<Url>, PipelineError> {
        let url = self.validate(raw_url)?;
        let page = self
            .acquirer
            .fetcher()
            .fetch(url.as_str())
            .await
            .map_err(|e| AcquisitionError {
                kind: e.kind(),
                detail: e.to_string(),
                render: None,
            })?;
        Ok(detect_feed(&page, &url))
    }

    fn validate(&self, raw: &str) -> Result<Url, PipelineError> {
        let url = validate_url(raw)?;
        if self.options.block_private_hosts {
            reject_private_host(&url)?;
        }
        Ok(url)
    }

    /// Fetches a feed referenced by the page. Any failure is reported as
    /// progress and yields `None` so extraction can take over.
    async fn use_located_feed(
        &self,
        key: &str,
        feed_url: &Url,
        sink: &mut dyn ProgressSink,
    ) -> Option<Delivery> {
        sink.progress(&format!("Found a feed link: {feed_url}"));

        if self.options.block_private_hosts {
            if let Err(e) = reject_private_host(feed_url) {
                tracing::warn!(feed_url = %feed_url, error = %e, "Refusing located feed URL");
                sink.progress("The linked feed cannot be fetched, extracting articles instead...");
                return None;
            }
        }

        match fetch_located_feed(
            self.acquirer.fetcher(),
            feed_url,
            self.options.feed_fetch_timeout,
        )
        .await
        {
            Ok(located) => {
                tracing::info!(
                    feed_url = %located.feed_url,
                    title = located.title.as_deref().unwrap_or(""),
                    "Using located feed"
                );
                self.cache.put(key, located.document.clone());
                Some(Delivery {
                    document: located.document,
                    feed_url: Some(located.feed_url.to_string()),
                    source: DeliverySource::LocatedFeed,
                })
            }
            Err(e) => {
                tracing::warn!(feed_url = %feed_url, error = %e, "Located feed unusable");
                sink.progress(
                    "The linked feed could not be loaded, extracting articles instead...",
                );
                None
            }
        }
    }
}

/// Selector extraction, then the heuristic scan when selectors found nothing.
///
/// Kept synchronous: the parsed document is not `Send` and must not live
/// across an await point.
fn extract_items(
    page: &Page,
    selectors: &[String],
    sink: &mut dyn ProgressSink,
) -> (ItemMap, Vec<String>) {
    let document = Html::parse_document(&page.html);
    let extraction = extract_with_selectors(&document, &page.url, selectors);
    if !extraction.items.is_empty() {
        return (extraction.items, extraction.tried);
    }

    sink.progress("No selector matched, scanning all links...");
    (extract_heuristic(&document, &page.url), extraction.tried)
}
