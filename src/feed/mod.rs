//! Feed location, article extraction and RSS synthesis.
//!
//! The stages run in a fixed order, each only when the previous one came up
//! empty:
//!
//! - [`discovery`] - find a feed the page already publishes (`<link>` tags or
//!   a feed content type) and verify it parses with `feed-rs`
//! - [`extract`] - scrape article links with an ordered list of CSS selectors
//! - [`heuristic`] - last-resort scan of every anchor for article-like URLs
//! - [`rss`] - write the scraped items as an RSS 2.0 document with `quick-xml`
//!
//! # Example
//!
//! ```
//! use feedscout::feed::{default_selectors, extract_with_selectors, synthesize};
//! use scraper::Html;
//! use url::Url;
//!
//! let page = Url::parse("https://example.com/").unwrap();
//! let html = Html::parse_document(r#"<article><a href="/a">Story A</a></article>"#);
//!
//! let extraction = extract_with_selectors(&html, &page, &default_selectors());
//! assert_eq!(extraction.tried, vec!["article a"]);
//!
//! let xml = synthesize(page.as_str(), &page, &extraction.items, 10).unwrap();
//! assert!(xml.contains("<![CDATA[Story A]]>"));
//! ```

pub mod discovery;
pub mod extract;
pub mod heuristic;
pub mod rss;

pub use discovery::{
    detect_feed, fetch_located_feed, find_feed_link, resolve_url, LocatedFeed, LocatedFeedError,
    DEFAULT_FEED_FETCH_TIMEOUT,
};
pub use extract::{
    default_selectors, default_site_selectors, extract_with_selectors, plan_selectors, Extraction,
    FeedItem, ItemMap, DEFAULT_SELECTORS,
};
pub use heuristic::{extract_heuristic, is_article_href};
pub use rss::{synthesize, SynthesisError, DEFAULT_MAX_ITEMS};
