//! Page acquisition: rendering, plain HTTP fetching and failure classification.
//!
//! [`PageAcquirer`] renders a page through an optional [`Renderer`] and falls
//! back to [`HttpFetcher`] when rendering fails. Both collaborators classify
//! their failures into a [`FailureKind`] at the boundary, so callers never
//! inspect error message text.

mod acquirer;
mod fetcher;
mod render;

use serde::Serialize;
use std::fmt;

pub use acquirer::{looks_blocked, AcquiredVia, AcquisitionError, Page, PageAcquirer};
pub use fetcher::{
    is_feed_content_type, FetchError, FetchedPage, HttpFetcher, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_MAX_BODY_BYTES, DEFAULT_USER_AGENT,
};
pub use render::{CommandRenderer, RenderError, Renderer, DEFAULT_RENDER_TIMEOUT};

/// Classified cause of a failed page acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Dns,
    NavigationAborted,
    Blocked,
    Protocol,
    Unknown,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Dns => "dns",
            FailureKind::NavigationAborted => "navigation_aborted",
            FailureKind::Blocked => "blocked",
            FailureKind::Protocol => "protocol",
            FailureKind::Unknown => "unknown",
        }
    }

    /// Stable, human-readable explanation shown to callers.
    pub fn user_message(self) -> &'static str {
        match self {
            FailureKind::Timeout => {
                "Connection timed out: the site responded too slowly or dropped the connection"
            }
            FailureKind::Dns => {
                "DNS lookup failed: the domain does not exist or cannot be resolved"
            }
            FailureKind::NavigationAborted => {
                "Page load was aborted: the site may have refused the request"
            }
            FailureKind::Blocked => {
                "Access was blocked: the site may restrict automated access"
            }
            FailureKind::Protocol => "The site returned an invalid or unexpected response",
            FailureKind::Unknown => "Failed to load the page",
        }
    }

    /// HTTP status reported when acquisition fails with this kind.
    pub fn status_code(self) -> u16 {
        match self {
            FailureKind::Timeout => 504,
            FailureKind::NavigationAborted | FailureKind::Blocked => 503,
            FailureKind::Dns | FailureKind::Protocol | FailureKind::Unknown => 502,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
