use super::{Delivery, FeedEngine, FeedRequest, PipelineError};
use tokio::sync::mpsc;

/// End-of-stream marker sent to streaming clients after the terminal event.
pub const SSE_END: &str = "[SSE-END]";

/// One step of a pipeline run as seen by a caller.
///
/// A run reported through [`report`] produces any number of `Progress`
/// events, then exactly one `Success` or `Failure`, then exactly one `End`.
#[derive(Debug)]
pub enum ProgressEvent {
    Progress(String),
    Success(Delivery),
    Failure(PipelineError),
    End,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Success(_) | ProgressEvent::Failure(_))
    }
}

/// Destination for progress events.
///
/// The pipeline only ever talks to this trait, so the same run can feed a
/// streaming client, a log, or a test.
pub trait ProgressSink: Send {
    fn emit(&mut self, event: ProgressEvent);

    fn progress(&mut self, message: &str) {
        self.emit(ProgressEvent::Progress(message.to_owned()));
    }
}

/// Forwards events over a channel to a streaming transport.
///
/// Events emitted after the receiver is gone are dropped.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// Creates a sink and the receiver that observes it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&mut self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Progress receiver dropped, discarding event");
        }
    }
}

/// Synchronous-mode sink: progress goes to the log and is otherwise discarded.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Progress(message) => tracing::debug!(%message, "Pipeline progress"),
            ProgressEvent::Success(delivery) => {
                tracing::debug!(source = ?delivery.source, "Pipeline succeeded");
            }
            ProgressEvent::Failure(error) => tracing::debug!(%error, "Pipeline failed"),
            ProgressEvent::End => {}
        }
    }
}

/// Collects every event in order.
#[derive(Debug, Default)]
pub struct VecSink {
    events: Vec<ProgressEvent>,
}

impl VecSink {
    pub fn events(&self) -> &[ProgressEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<ProgressEvent> {
        self.events
    }

    pub fn progress_messages(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress(m) => Some(m.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for VecSink {
    fn emit(&mut self, event: ProgressEvent) {
        self.events.push(event);
    }
}

/// Runs the pipeline and reports its outcome to `sink`.
///
/// Emits the run's progress events, then exactly one terminal event, then
/// [`ProgressEvent::End`].
pub async fn report(engine: &FeedEngine, request: &FeedRequest, sink: &mut dyn ProgressSink) {
    let terminal = match engine.run(request, sink).await {
        Ok(delivery) => ProgressEvent::Success(delivery),
        Err(error) => ProgressEvent::Failure(error),
    };
    sink.emit(terminal);
    sink.emit(ProgressEvent::End);
}
