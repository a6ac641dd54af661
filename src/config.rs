//! Configuration file parser for ~/.config/feedscout/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde (with `deny_unknown_fields` off), though
//! we log a warning when the file contains potential typos.
use crate::content::{
    DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_BODY_BYTES, DEFAULT_RENDER_TIMEOUT, DEFAULT_USER_AGENT,
};
use crate::feed::{
    default_selectors, default_site_selectors, DEFAULT_FEED_FETCH_TIMEOUT, DEFAULT_MAX_ITEMS,
};
use crate::storage::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, DEFAULT_THROTTLE_CAPACITY, DEFAULT_THROTTLE_WINDOW,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value parsed but is out of range.
    #[error("Invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// External headless browser used to render pages.
///
/// The page URL is appended after `args`; the command must print the
/// rendered DOM to stdout.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RendererConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Top-level service configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server listens on.
    pub bind_address: String,

    /// Externally visible base URL (e.g. `https://feeds.example.com`) used to
    /// build links back to this service. Falls back to the request `Host`
    /// with the scheme from `X-Forwarded-Proto`, else `http`.
    pub public_base_url: Option<String>,

    /// Minimum interval between two accepted requests for the same URL.
    pub throttle_window_ms: u64,

    /// Maximum number of URLs tracked by the throttle.
    pub throttle_capacity: usize,

    /// Lifetime of a cached feed document.
    pub cache_ttl_secs: u64,

    /// Maximum number of cached feed documents.
    pub cache_capacity: usize,

    pub render_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub feed_fetch_timeout_secs: u64,

    /// Upper bound on any fetched response body.
    pub max_body_bytes: usize,

    /// Maximum items in a synthesized feed.
    pub max_items: usize,

    pub user_agent: String,
    pub accept_language: String,

    /// Reject request URLs pointing at localhost or private addresses.
    pub block_private_hosts: bool,

    /// Include raw error details in JSON error responses.
    pub expose_debug: bool,

    /// Selectors tried when no caller or site selector applies.
    pub fallback_selectors: Vec<String>,

    /// Per-host selector lists, keyed on the exact host name.
    pub site_selectors: HashMap<String, Vec<String>>,

    /// Headless browser command; pages are fetched over plain HTTP when unset.
    pub renderer: Option<RendererConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            public_base_url: None,
            throttle_window_ms: DEFAULT_THROTTLE_WINDOW.as_millis() as u64,
            throttle_capacity: DEFAULT_THROTTLE_CAPACITY,
            cache_ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            render_timeout_secs: DEFAULT_RENDER_TIMEOUT.as_secs(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            feed_fetch_timeout_secs: DEFAULT_FEED_FETCH_TIMEOUT.as_secs(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_items: DEFAULT_MAX_ITEMS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            block_private_hosts: true,
            expose_debug: false,
            fallback_selectors: default_selectors(),
            site_selectors: default_site_selectors(),
            renderer: None,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 18] = [
        "bind_address",
        "public_base_url",
        "throttle_window_ms",
        "throttle_capacity",
        "cache_ttl_secs",
        "cache_capacity",
        "render_timeout_secs",
        "fetch_timeout_secs",
        "feed_fetch_timeout_secs",
        "max_body_bytes",
        "max_items",
        "user_agent",
        "accept_language",
        "block_private_hosts",
        "expose_debug",
        "fallback_selectors",
        "site_selectors",
        "renderer",
    ];

    /// Default config location: `$HOME/.config/feedscout/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join(".config").join("feedscout").join("config.toml"))
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            bind_address = %config.bind_address,
            renderer = config.renderer.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Rejects values that would make the pipeline unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("render_timeout_secs", self.render_timeout_secs),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("feed_fetch_timeout_secs", self.feed_fetch_timeout_secs),
            ("max_items", self.max_items as u64),
            ("max_body_bytes", self.max_body_bytes as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if let Some(renderer) = &self.renderer {
            if renderer.command.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key: "renderer",
                    reason: "command must not be empty".to_string(),
                });
            }
        }

        if let Some(base) = &self.public_base_url {
            if url::Url::parse(base).is_err() {
                return Err(ConfigError::Invalid {
                    key: "public_base_url",
                    reason: format!("`{base}` is not an absolute URL"),
                });
            }
        }

        Ok(())
    }

    pub fn throttle_window(&self) -> Duration {
        Duration::from_millis(self.throttle_window_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn feed_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_fetch_timeout_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================
