//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **URL validation**: request URL checks and an opt-in SSRF host guard
//! - **Text processing**: whitespace collapsing and XML-safe text cleanup
//!
//! # Examples
//!
//! ```
//! use feedscout::util::{collapse_whitespace, strip_control_chars, validate_url};
//!
//! let url = validate_url("https://example.com/news").unwrap();
//! assert_eq!(url.scheme(), "https");
//!
//! let title = collapse_whitespace("  Top\n story ");
//! assert_eq!(strip_control_chars(&title), "Top story");
//! ```

mod text;
mod url_validator;

pub use text::{collapse_whitespace, strip_control_chars, truncate_chars};
pub use url_validator::{reject_private_host, validate_url, UrlValidationError};
