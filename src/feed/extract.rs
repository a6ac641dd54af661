use super::discovery::resolve_url;
use crate::util::collapse_whitespace;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use url::Url;

/// Generic selectors tried, in order, when neither the caller nor the site
/// table supplies any.
pub const DEFAULT_SELECTORS: &[&str] = &[
    "article a",
    "h2 a",
    "h3 a",
    ".entry-title a",
    ".post-title a",
    ".headline a",
    ".news-title a",
    ".title a",
    ".card-title a",
    ".story a",
    ".story-link a",
    r#"a[href*="/article/"]"#,
    r#"a[href*="/news/"]"#,
    r#"a[href*="/story/"]"#,
    ".content--summary a",
    "a.headline",
];

/// Built-in per-host selector lists for sites whose markup the generic list
/// misses.
const SITE_SELECTORS: &[(&str, &[&str])] = &[
    (
        "www.huffingtonpost.jp",
        &[".headline a", ".newsList__title a"],
    ),
    ("www3.nhk.or.jp", &[".content--summary a"]),
    ("www.bbc.com", &[".media__title a"]),
    (
        "natgeo.nikkeibp.co.jp",
        &[
            ".article-list a",
            ".article__title a",
            ".articleList a",
            ".article-card a",
        ],
    ),
];

pub fn default_selectors() -> Vec<String> {
    DEFAULT_SELECTORS.iter().map(|s| (*s).to_owned()).collect()
}

pub fn default_site_selectors() -> HashMap<String, Vec<String>> {
    SITE_SELECTORS
        .iter()
        .map(|(host, selectors)| {
            (
                (*host).to_owned(),
                selectors.iter().map(|s| (*s).to_owned()).collect(),
            )
        })
        .collect()
}

/// Chooses the ordered selector list for a page.
///
/// A non-blank caller selector is the sole strategy. Otherwise the site list
/// for the page host applies, falling back to `fallback`.
pub fn plan_selectors(
    custom: Option<&str>,
    page_url: &Url,
    site_selectors: &HashMap<String, Vec<String>>,
    fallback: &[String],
) -> Vec<String> {
    if let Some(custom) = custom.map(str::trim).filter(|s| !s.is_empty()) {
        return vec![custom.to_owned()];
    }

    page_url
        .host_str()
        .and_then(|host| site_selectors.get(host))
        .filter(|list| !list.is_empty())
        .cloned()
        .unwrap_or_else(|| fallback.to_vec())
}

/// An article-like entry scraped from a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// Absolute http(s) link; the item's identity
    pub link: Url,
    pub title: String,
    /// May be empty
    pub description: String,
    /// Raw image reference, resolved against the page URL at synthesis time
    pub image: Option<String>,
}

/// Insertion-ordered, link-deduplicated collection of [`FeedItem`]s.
///
/// The first item inserted for a link wins; later duplicates are ignored.
#[derive(Debug, Clone, Default)]
pub struct ItemMap {
    items: Vec<FeedItem>,
    links: HashSet<String>,
}

impl ItemMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `item` unless its link is already present. Returns whether
    /// the item was inserted.
    pub fn insert(&mut self, item: FeedItem) -> bool {
        if !self.links.insert(item.link.as_str().to_owned()) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn contains(&self, link: &str) -> bool {
        self.links.contains(link)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FeedItem> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a ItemMap {
    type Item = &'a FeedItem;
    type IntoIter = std::slice::Iter<'a, FeedItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Items found by selector extraction together with every selector tried.
#[derive(Debug, Default)]
pub struct Extraction {
    pub items: ItemMap,
    pub tried: Vec<String>,
}

/// Document-wide fallbacks and probe selectors shared by every match.
struct PageContext {
    paragraph: Selector,
    image: Selector,
    meta_description: Option<String>,
    og_image: Option<String>,
}

impl PageContext {
    fn new(document: &Html) -> Option<Self> {
        let meta_description = meta_content(document, r#"meta[name="description"]"#)
            .or_else(|| meta_content(document, r#"meta[property="og:description"]"#));

        Some(Self {
            paragraph: Selector::parse("p").ok()?,
            image: Selector::parse("img[src]").ok()?,
            meta_description,
            og_image: meta_content(document, r#"meta[property="og:image"]"#),
        })
    }

    fn first_paragraph(&self, scope: ElementRef<'_>) -> Option<String> {
        scope
            .select(&self.paragraph)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
    }

    fn first_image(&self, scope: ElementRef<'_>) -> Option<String> {
        scope
            .select(&self.image)
            .filter_map(|img| img.value().attr("src"))
            .map(str::trim)
            .find(|src| !src.is_empty())
            .map(str::to_owned)
    }
}

/// Runs `selectors` in order against the document, stopping after the first
/// selector that yields at least one item.
///
/// Every selector attempted is recorded in [`Extraction::tried`], including
/// ones that fail to parse (those are logged and skipped).
pub fn extract_with_selectors(document: &Html, base: &Url, selectors: &[String]) -> Extraction {
    let mut extraction = Extraction::default();
    let Some(context) = PageContext::new(document) else {
        return extraction;
    };

    for raw in selectors {
        extraction.tried.push(raw.clone());

        let selector = match Selector::parse(raw) {
            Ok(selector) => selector,
            Err(e) => {
                tracing::warn!(selector = %raw, error = ?e, "Skipping invalid selector");
                continue;
            }
        };

        for element in document.select(&selector) {
            if let Some(item) = item_from_element(element, base, &context) {
                extraction.items.insert(item);
            }
        }

        tracing::debug!(selector = %raw, items = extraction.items.len(), "Selector attempted");
        if !extraction.items.is_empty() {
            break;
        }
    }

    extraction
}

fn item_from_element(
    element: ElementRef<'_>,
    base: &Url,
    context: &PageContext,
) -> Option<FeedItem> {
    let href = element
        .value()
        .attr("href")
        .or_else(|| enclosing_anchor_href(element))?
        .trim();
    if !(href.starts_with('/') || href.starts_with("http")) {
        return None;
    }
    let link = resolve_url(href, base)?;

    let title = Some(element_text(element))
        .filter(|t| !t.is_empty())
        .or_else(|| non_blank_attr(element, "aria-label"))
        .or_else(|| non_blank_attr(element, "title"))?;

    let article = closest(element, "article");

    let description = article
        .and_then(|a| context.first_paragraph(a))
        .or_else(|| closest(element, "div").and_then(|d| context.first_paragraph(d)))
        .or_else(|| context.meta_description.clone())
        .unwrap_or_default();

    let image = article
        .and_then(|a| context.first_image(a))
        .or_else(|| context.first_image(element))
        .or_else(|| context.og_image.clone());

    Some(FeedItem {
        link,
        title,
        description,
        image,
    })
}

fn enclosing_anchor_href(element: ElementRef<'_>) -> Option<&str> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .filter(|a| a.value().name() == "a")
        .find_map(|a| a.value().attr("href"))
}

/// Nearest element named `name`, starting with `element` itself.
pub(crate) fn closest<'a>(element: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .find(|e| e.value().name() == name)
}

/// Whitespace-collapsed text content of an element.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    let text: String = element.text().collect();
    collapse_whitespace(&text).into_owned()
}

fn non_blank_attr(element: ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(|v| collapse_whitespace(v).into_owned())
        .filter(|v| !v.is_empty())
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|m| m.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_owned)
}
