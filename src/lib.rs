//! feedscout finds the RSS/Atom feed behind a web page, or builds one from
//! the page's article links when none exists.
//!
//! The [`engine`] module runs the pipeline; [`server`] exposes it over HTTP.

pub mod config;
pub mod content;
pub mod engine;
pub mod feed;
pub mod server;
pub mod storage;
pub mod util;

pub use config::Config;
pub use engine::{Delivery, DeliverySource, FeedEngine, FeedRequest, PipelineError};
