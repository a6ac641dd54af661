use super::FailureKind;
use crate::util::truncate_chars;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default bound on a single page render.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(45);

/// Errors reported by a render collaborator.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("failed to launch renderer: {0}")]
    Launch(#[source] std::io::Error),
    /// The browser reported a navigation error code (e.g. `net::ERR_ABORTED`)
    #[error("navigation failed: {0}")]
    Navigation(String),
    /// The rendered page is a bot challenge rather than the requested content
    #[error("blocked by the target site")]
    Blocked,
    #[error("renderer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("renderer returned an empty document")]
    Empty,
}

impl RenderError {
    /// Classifies the failure for user-facing reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            RenderError::Timeout(_) => FailureKind::Timeout,
            RenderError::Blocked => FailureKind::Blocked,
            RenderError::Navigation(code) => classify_net_error(code),
            RenderError::Failed { .. } | RenderError::Empty => FailureKind::Protocol,
            RenderError::Launch(_) => FailureKind::Unknown,
        }
    }
}

/// Maps Chromium `net::ERR_*` codes to a failure class.
fn classify_net_error(code: &str) -> FailureKind {
    match code {
        "net::ERR_NAME_NOT_RESOLVED" | "net::ERR_NAME_RESOLUTION_FAILED" => FailureKind::Dns,
        "net::ERR_TIMED_OUT" | "net::ERR_CONNECTION_TIMED_OUT" => FailureKind::Timeout,
        "net::ERR_ABORTED" => FailureKind::NavigationAborted,
        "net::ERR_FAILED" | "net::ERR_BLOCKED_BY_CLIENT" | "net::ERR_BLOCKED_BY_RESPONSE" => {
            FailureKind::Blocked
        }
        _ => FailureKind::Protocol,
    }
}

/// Headless-browser collaborator: returns the rendered HTML of a page.
///
/// Implementations must release any browser session they hold on every exit
/// path, including when the returned future is dropped mid-render.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &Url, timeout: Duration) -> Result<String, RenderError>;
}

/// Renders pages by running an external headless browser that prints the
/// final DOM to stdout, e.g. `chromium --headless=new --dump-dom <url>`.
///
/// The URL is appended as the last argument. The child process is killed
/// when the render future is dropped (timeout or caller cancellation).
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait::async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, url: &Url, timeout: Duration) -> Result<String, RenderError> {
        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RenderError::Launch)?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| RenderError::Timeout(timeout))?
            .map_err(RenderError::Launch)?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if let Some(code) = find_net_error(&stderr) {
            return Err(RenderError::Navigation(code.to_owned()));
        }

        if !output.status.success() {
            return Err(RenderError::Failed {
                status: output.status.to_string(),
                stderr: truncate_chars(stderr.trim(), 500).into_owned(),
            });
        }

        let html = String::from_utf8_lossy(&output.stdout).into_owned();
        if html.trim().is_empty() {
            return Err(RenderError::Empty);
        }
        Ok(html)
    }
}

/// Finds the first `net::ERR_*` code in browser diagnostics.
fn find_net_error(stderr: &str) -> Option<&str> {
    let start = stderr.find("net::ERR_")?;
    let rest = &stderr[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == ':'))
        .unwrap_or(rest.len());
    Some(&rest[..end])
}
