use crate::content::{AcquisitionError, FailureKind};
use crate::feed::SynthesisError;
use crate::storage::Throttled;
use crate::util::UrlValidationError;
use thiserror::Error;

/// Terminal failure of a pipeline run.
///
/// Fallback stages absorb their own errors; only exhaustion of every
/// strategy (or a gate rejecting the request up front) ends up here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request URL: {0}")]
    Validation(#[from] UrlValidationError),

    #[error(transparent)]
    Throttled(#[from] Throttled),

    #[error("page acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("no articles found after trying {} selectors", tried.len())]
    NoArticlesFound { tried: Vec<String> },

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable message safe to show to callers.
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::Validation(UrlValidationError::PrivateIp(_))
            | PipelineError::Validation(UrlValidationError::Localhost) => {
                "This address cannot be fetched"
            }
            PipelineError::Validation(_) => "Invalid URL: provide an absolute http(s) URL",
            PipelineError::Throttled(_) => {
                "Too many requests for this URL. Please wait a few seconds and try again"
            }
            PipelineError::Acquisition(e) => e.kind.user_message(),
            PipelineError::NoArticlesFound { .. } => "No articles were found on this page",
            PipelineError::Synthesis(_) | PipelineError::Internal(_) => {
                "Failed to generate the RSS feed"
            }
        }
    }

    /// HTTP status reported for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::Validation(_) => 400,
            PipelineError::Throttled(_) => 429,
            PipelineError::Acquisition(e) => e.kind.status_code(),
            PipelineError::NoArticlesFound { .. } => 404,
            PipelineError::Synthesis(_) | PipelineError::Internal(_) => 500,
        }
    }

    /// Short machine-readable classification for diagnostics.
    pub fn error_type(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::Throttled(_) => "throttled",
            PipelineError::Acquisition(e) => match e.kind {
                FailureKind::Timeout => "acquisition_timeout",
                FailureKind::Dns => "acquisition_dns",
                FailureKind::NavigationAborted => "acquisition_navigation_aborted",
                FailureKind::Blocked => "acquisition_blocked",
                FailureKind::Protocol => "acquisition_protocol",
                FailureKind::Unknown => "acquisition_unknown",
            },
            PipelineError::NoArticlesFound { .. } => "no_articles_found",
            PipelineError::Synthesis(_) => "synthesis",
            PipelineError::Internal(_) => "internal",
        }
    }

    /// Selectors attempted before giving up, when extraction ran.
    pub fn tried_selectors(&self) -> Option<&[String]> {
        match self {
            PipelineError::NoArticlesFound { tried } => Some(tried),
            _ => None,
        }
    }
}
