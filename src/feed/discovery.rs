use crate::content::{FetchError, FetchedPage, HttpFetcher};
use crate::util::strip_control_chars;
use scraper::{Html, Selector};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default bound on fetching a feed referenced from a page.
pub const DEFAULT_FEED_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// `Accept` header sent when fetching a located feed.
const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml";

/// `<link>` types recognised as feed references, in priority order.
const FEED_LINK_TYPES: [&str; 2] = ["application/rss+xml", "application/atom+xml"];

/// A feed referenced by a page and verified to parse.
#[derive(Debug, Clone)]
pub struct LocatedFeed {
    /// Absolute URL of the feed
    pub feed_url: Url,
    /// Feed body exactly as served
    pub document: String,
    /// Feed title, when the feed declares one
    pub title: Option<String>,
}

/// Errors that can occur while fetching a located feed.
///
/// These never fail a pipeline run; extraction takes over instead.
#[derive(Debug, Error)]
pub enum LocatedFeedError {
    /// The feed URL could not be fetched
    #[error("failed to fetch located feed: {0}")]
    Fetch(#[from] FetchError),
    /// The response is not RSS or Atom
    #[error("located resource is not an RSS/Atom feed")]
    NotAFeed,
}

/// Finds the first feed `<link>` in an HTML document.
///
/// RSS links take priority over Atom links regardless of document order.
/// The `href` is resolved against `base`; only http(s) results are returned.
pub fn find_feed_link(html: &str, base: &Url) -> Option<Url> {
    let document = Html::parse_document(html);

    FEED_LINK_TYPES.iter().find_map(|feed_type| {
        let selector = Selector::parse(&format!(r#"link[type="{feed_type}"][href]"#)).ok()?;
        document
            .select(&selector)
            .filter_map(|link| link.value().attr("href"))
            .find_map(|href| resolve_url(href, base))
    })
}

/// Resolves a potentially relative URL against a base URL.
///
/// Returns `None` when the reference is empty, cannot be joined, or resolves
/// to anything other than http(s) (e.g. `javascript:` or `mailto:`).
pub fn resolve_url(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let resolved = base.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}

/// Reports the feed a fetched resource represents, if any.
///
/// A feed content type makes the resource itself the feed; otherwise the
/// body is scanned for a feed `<link>`, resolved against the URL reached
/// after redirects.
pub fn detect_feed(page: &FetchedPage, url: &Url) -> Option<Url> {
    if page.is_feed_content_type() {
        return Some(url.clone());
    }
    find_feed_link(&page.text(), &page.final_url)
}

/// Fetches a located feed and verifies that it parses as RSS or Atom.
///
/// # Errors
///
/// - [`LocatedFeedError::Fetch`] if the request fails or times out
/// - [`LocatedFeedError::NotAFeed`] if the body does not parse as a feed
pub async fn fetch_located_feed(
    fetcher: &HttpFetcher,
    feed_url: &Url,
    timeout: Duration,
) -> Result<LocatedFeed, LocatedFeedError> {
    let fetched = fetcher
        .fetch_with(feed_url.as_str(), Some(FEED_ACCEPT), timeout)
        .await?;

    let parsed = feed_rs::parser::parse(fetched.body.as_slice()).map_err(|e| {
        tracing::debug!(feed_url = %feed_url, error = %e, "Located feed failed to parse");
        LocatedFeedError::NotAFeed
    })?;

    let title = parsed
        .title
        .map(|t| strip_control_chars(t.content.trim()).into_owned())
        .filter(|t| !t.is_empty());

    Ok(LocatedFeed {
        feed_url: feed_url.clone(),
        document: fetched.text(),
        title,
    })
}
