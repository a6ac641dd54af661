use super::response;
use super::AppState;
use crate::engine::{report, ChannelSink, FeedRequest, LogSink, PipelineError, ProgressEvent};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use warp::reply::Response;
use warp::Reply;

/// Query string accepted by the feed endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    pub url: Option<String>,
    pub selector: Option<String>,
}

impl FeedQuery {
    /// A missing URL becomes an empty one, which fails validation like any
    /// other malformed URL.
    pub fn into_request(self) -> FeedRequest {
        FeedRequest {
            url: self.url.unwrap_or_default(),
            selector: self.selector.filter(|s| !s.trim().is_empty()),
        }
    }
}

pub fn health() -> &'static str {
    "ok"
}

/// `GET /api/generate-rss`: streams progress as SSE when the client accepts
/// `text/event-stream`, otherwise answers with the feed or a JSON error.
pub async fn generate_rss(
    query: FeedQuery,
    accept: Option<String>,
    host: Option<String>,
    forwarded_proto: Option<String>,
    state: AppState,
) -> Response {
    let request = query.into_request();

    if accept
        .as_deref()
        .is_some_and(|a| a.contains("text/event-stream"))
    {
        let base = response::public_origin(
            state.public_base_url.as_deref(),
            host.as_deref(),
            forwarded_proto.as_deref(),
        );
        return stream_generate(request, base, state);
    }

    match state.engine.run(&request, &mut LogSink).await {
        Ok(delivery) => response::feed(delivery.document),
        Err(e) => {
            tracing::info!(url = %request.url, error = %e, "Feed generation failed");
            response::error(&e, &request.url, state.expose_debug)
        }
    }
}

/// `GET /api/check-rss`: reports a feed the page already publishes.
pub async fn check_rss(query: FeedQuery, state: AppState) -> Response {
    let url = query.url.unwrap_or_default();
    match state.engine.check_feed(&url).await {
        Ok(found) => warp::reply::json(&response::CheckBody {
            rss: found.map(String::from),
        })
        .into_response(),
        Err(e) => response::error(&e, &url, state.expose_debug),
    }
}

/// Aborts the pipeline task once the event stream is dropped (client gone).
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn stream_generate(request: FeedRequest, base: String, state: AppState) -> Response {
    let self_link = response::self_link(&base, &request);

    let (mut sink, rx) = ChannelSink::channel();
    let engine = state.engine.clone();
    let task = tokio::spawn(async move {
        report(&engine, &request, &mut sink).await;
    });

    let events = event_data(rx, AbortOnDrop(task), self_link)
        .map(|data| Ok::<_, Infallible>(warp::sse::Event::default().data(data)));

    warp::sse::reply(warp::sse::keep_alive().stream(events)).into_response()
}

enum StreamState {
    Open,
    /// The channel closed before `End`; a failure was sent, `End` is owed
    Interrupted,
    Done,
}

/// SSE `data:` payloads for the events on `rx`.
///
/// The stream always finishes with the end sentinel, even when the pipeline
/// task dies before reporting.
fn event_data(
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    guard: AbortOnDrop,
    self_link: String,
) -> impl Stream<Item = String> {
    futures::stream::unfold(
        (rx, guard, self_link, StreamState::Open),
        |(mut rx, guard, self_link, state)| async move {
            let (event, next) = match state {
                StreamState::Done => return None,
                StreamState::Interrupted => (ProgressEvent::End, StreamState::Done),
                StreamState::Open => match rx.recv().await {
                    Some(ProgressEvent::End) => (ProgressEvent::End, StreamState::Done),
                    Some(event) => (event, StreamState::Open),
                    None => {
                        tracing::error!("Pipeline task ended without a result");
                        let err = PipelineError::Internal("pipeline task ended early".to_string());
                        (ProgressEvent::Failure(err), StreamState::Interrupted)
                    }
                },
            };
            let data = response::sse_data(&event, &self_link);
            Some((data, (rx, guard, self_link, next)))
        },
    )
}
