use crate::engine::{FeedRequest, PipelineError, ProgressEvent, SSE_END};
use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Reply;

pub const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

/// JSON body of every error response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody<'a> {
    pub error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried_selectors: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

/// Raw failure details, only sent when the server exposes diagnostics.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub url: String,
    pub timestamp: String,
    pub error_type: &'static str,
    pub error_message: String,
}

#[derive(Debug, Serialize)]
pub struct CheckBody {
    pub rss: Option<String>,
}

/// Payload of the streaming success event.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SuccessEvent<'a> {
    status: &'static str,
    rss_url: &'a str,
}

/// `200` with the feed document.
pub fn feed(document: String) -> Response {
    warp::reply::with_header(document, "content-type", RSS_CONTENT_TYPE).into_response()
}

/// JSON error response with the status the failure maps to.
pub fn error(err: &PipelineError, url: &str, expose_debug: bool) -> Response {
    let debug = expose_debug.then(|| DebugInfo {
        url: url.to_owned(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        error_type: err.error_type(),
        error_message: err.to_string(),
    });
    let body = ErrorBody {
        error: err.user_message(),
        tried_selectors: err.tried_selectors(),
        debug,
    };

    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = warp::reply::with_status(warp::reply::json(&body), status).into_response();

    if let PipelineError::Throttled(throttled) = err {
        let secs = throttled.retry_after.as_secs_f64().ceil().max(1.0) as u64;
        if let Ok(value) = warp::http::HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
    }
    response
}

/// Origin for links back to this service.
///
/// A configured public base URL wins. Otherwise the request `Host` is used
/// with the scheme from `X-Forwarded-Proto` (first hop), defaulting to
/// `http`. With neither, links are root-relative.
pub fn public_origin(
    public_base_url: Option<&str>,
    host: Option<&str>,
    forwarded_proto: Option<&str>,
) -> String {
    if let Some(base) = public_base_url {
        return base.to_owned();
    }
    let Some(host) = host.map(str::trim).filter(|h| !h.is_empty()) else {
        return String::new();
    };
    let scheme = match forwarded_proto
        .and_then(|p| p.split(',').next())
        .map(|p| p.trim().to_ascii_lowercase())
        .as_deref()
    {
        Some("https") => "https",
        _ => "http",
    };
    format!("{scheme}://{host}")
}

/// Link to this service's own generation endpoint for `request`.
///
/// `base` is an absolute origin such as `https://feeds.example.com`; an empty
/// base yields a root-relative link.
pub fn self_link(base: &str, request: &FeedRequest) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("url", &request.url);
    if let Some(selector) = &request.selector {
        query.append_pair("selector", selector);
    }
    format!(
        "{}/api/generate-rss?{}",
        base.trim_end_matches('/'),
        query.finish()
    )
}

/// Text carried by the SSE `data:` field for a progress event.
pub fn sse_data(event: &ProgressEvent, self_link: &str) -> String {
    match event {
        ProgressEvent::Progress(message) => message.clone(),
        ProgressEvent::Success(delivery) => {
            let payload = SuccessEvent {
                status: "success",
                rss_url: delivery.feed_url.as_deref().unwrap_or(self_link),
            };
            serde_json::to_string(&payload)
                .unwrap_or_else(|_| format!(r#"{{"status":"success","rssUrl":"{self_link}"}}"#))
        }
        ProgressEvent::Failure(err) => err.user_message().to_owned(),
        ProgressEvent::End => SSE_END.to_owned(),
    }
}
