use super::discovery::resolve_url;
use super::extract::{closest, element_text, FeedItem, ItemMap};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// Minimum anchor text length (in characters) for a heuristic match.
const MIN_TITLE_CHARS: usize = 10;

/// Path fragments that mark a link as article-like on their own.
const ARTICLE_PATH_MARKERS: &[&str] = &["/news/", "/article/", "/202"];

fn date_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"/(20\d{2}|\d{6})/", r"/\d{4}/\d{2}/\d{2}/"]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// Whether an href looks like it points at an article.
pub fn is_article_href(href: &str) -> bool {
    ARTICLE_PATH_MARKERS.iter().any(|m| href.contains(m))
        || date_patterns().iter().any(|re| re.is_match(href))
}

/// Scans every `a[href]` for article-like links.
///
/// Used only when selector extraction found nothing. Accepted anchors have at
/// least ten characters of text and an href matching a date or article path
/// pattern. Descriptions are always empty; the image comes from the anchor
/// itself, else its enclosing `<article>`.
pub fn extract_heuristic(document: &Html, base: &Url) -> ItemMap {
    let mut items = ItemMap::new();
    let (Ok(anchors), Ok(images)) = (Selector::parse("a[href]"), Selector::parse("img[src]"))
    else {
        return items;
    };

    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };

        let title = element_text(anchor);
        if title.chars().count() < MIN_TITLE_CHARS || !is_article_href(href) {
            continue;
        }

        let Some(link) = resolve_url(href, base) else {
            continue;
        };

        let image = first_image(anchor, &images)
            .or_else(|| closest(anchor, "article").and_then(|a| first_image(a, &images)));

        items.insert(FeedItem {
            link,
            title,
            description: String::new(),
            image,
        });
    }

    tracing::debug!(items = items.len(), "Heuristic extraction finished");
    items
}

fn first_image(scope: ElementRef<'_>, images: &Selector) -> Option<String> {
    scope
        .select(images)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty())
        .map(str::to_owned)
}
