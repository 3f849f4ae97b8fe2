//! Cancellable status subscriptions
//!
//! [`StatusStreamClient::subscribe`] spawns one read loop per job and hands back a
//! [`SubscriptionHandle`]. The loop moves through
//! `Idle → Connecting → Streaming → {Completed, Failed, Errored} → Closed`
//! (or straight to `Closed` on cancellation, connection failure or end of stream).

use super::decoder::FrameDecoder;
use super::frame::{StreamFrame, classify_line};
use crate::error::StreamError;
use crate::types::{JobId, JobPhase, ProgressUpdate};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Raw body chunks of an open status stream
pub type ChunkStream = BoxStream<'static, Result<Bytes, StreamError>>;

/// Opens the byte stream behind a subscription
///
/// Implemented by [`crate::client::ApiClient`] for HTTP; tests supply scripted chunks.
#[async_trait]
pub trait StatusTransport: Send + Sync {
    /// Open the status stream for `job_id`
    ///
    /// A rejected request (non-success status) is a [`StreamError::Connection`].
    async fn open(&self, job_id: &JobId) -> Result<ChunkStream, StreamError>;
}

/// Receives the notifications of one subscription
///
/// Calls are made from the subscription's task, one at a time.
pub trait StatusHandler: Send + 'static {
    /// A progress frame arrived
    fn on_progress(&mut self, update: ProgressUpdate);

    /// The subscription failed; called at most once
    fn on_error(&mut self, error: StreamError);

    /// The read loop ended on its own; called once, last, and never after a cancel
    fn on_closed(&mut self, outcome: SubscriptionOutcome) {
        let _ = outcome;
    }
}

/// [`StatusHandler`] built from two closures, see [`callbacks`]
pub struct Callbacks<P, E> {
    on_progress: P,
    on_error: E,
}

/// Adapt a pair of closures into a [`StatusHandler`]
///
/// ```no_run
/// use bookgen_client::stream::{callbacks, StatusStreamClient};
/// use bookgen_client::{ApiClient, Config, JobId};
/// use std::sync::Arc;
///
/// # async fn example() -> bookgen_client::Result<()> {
/// let api = Arc::new(ApiClient::new(&Config::default())?);
/// let client = StatusStreamClient::new(api);
/// let handle = client.subscribe(
///     JobId::new("job-42"),
///     callbacks(
///         |update| println!("{}%", update.percent()),
///         |error| eprintln!("stream failed: {}", error),
///     ),
/// );
/// handle.cancel();
/// # Ok(())
/// # }
/// ```
pub fn callbacks<P, E>(on_progress: P, on_error: E) -> Callbacks<P, E>
where
    P: FnMut(ProgressUpdate) + Send + 'static,
    E: FnMut(StreamError) + Send + 'static,
{
    Callbacks {
        on_progress,
        on_error,
    }
}

impl<P, E> StatusHandler for Callbacks<P, E>
where
    P: FnMut(ProgressUpdate) + Send + 'static,
    E: FnMut(StreamError) + Send + 'static,
{
    fn on_progress(&mut self, update: ProgressUpdate) {
        (self.on_progress)(update)
    }

    fn on_error(&mut self, error: StreamError) {
        (self.on_error)(error)
    }
}

/// Lifecycle state of a subscription
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Created, task not yet running
    Idle,
    /// Request in flight
    Connecting,
    /// Headers accepted, reading frames
    Streaming,
    /// Terminal "completed" frame processed
    Completed,
    /// Terminal "failed" frame processed
    Failed,
    /// Server sent an error frame
    Errored,
    /// Read loop finished; no more callbacks
    Closed,
}

impl SubscriptionState {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: SubscriptionState) -> bool {
        use SubscriptionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Idle, Closed)
                | (Connecting, Streaming)
                | (Connecting, Closed)
                | (Streaming, Completed)
                | (Streaming, Failed)
                | (Streaming, Errored)
                | (Streaming, Closed)
                | (Completed, Closed)
                | (Failed, Closed)
                | (Errored, Closed)
        )
    }
}

/// How a subscription ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    /// A "completed" frame was processed
    Completed,
    /// A "failed" frame was processed
    Failed,
    /// The server sent an error frame
    Errored,
    /// The stream could not be opened or broke before a terminal frame
    ConnectionFailed,
    /// The server closed the stream without a terminal frame
    EndOfStream,
    /// The caller cancelled
    Cancelled,
}

/// Caller-owned handle of one status subscription
///
/// Dropping the handle cancels the subscription.
pub struct SubscriptionHandle {
    job_id: JobId,
    closed: Arc<AtomicBool>,
    cancel: CancellationToken,
    state: watch::Receiver<SubscriptionState>,
    task: Option<JoinHandle<SubscriptionOutcome>>,
}

impl SubscriptionHandle {
    /// Job this subscription tracks
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Stop the subscription
    ///
    /// Sets the closed flag and aborts the in-flight read. No handler method is
    /// called after this returns.
    pub fn cancel(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(job_id = %self.job_id, "Cancelling status subscription");
        }
        self.cancel.cancel();
    }

    /// Whether the subscription was cancelled or has finished
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Current lifecycle state
    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.clone()
    }

    /// Wait for the read loop to end
    pub async fn finished(mut self) -> SubscriptionOutcome {
        match self.task.take() {
            Some(task) => task.await.unwrap_or_else(|e| {
                warn!(job_id = %self.job_id, error = %e, "Status subscription task ended abnormally");
                SubscriptionOutcome::Cancelled
            }),
            None => SubscriptionOutcome::Cancelled,
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.cancel();
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("job_id", &self.job_id)
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Opens status subscriptions over a [`StatusTransport`]
///
/// The client keeps no record of the subscriptions it opened; callers own the handles.
#[derive(Clone)]
pub struct StatusStreamClient {
    transport: Arc<dyn StatusTransport>,
}

impl StatusStreamClient {
    /// Create a client over the given transport
    pub fn new(transport: Arc<dyn StatusTransport>) -> Self {
        Self { transport }
    }

    /// Start tracking `job_id`, delivering frames to `handler`
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<H: StatusHandler>(&self, job_id: JobId, handler: H) -> SubscriptionHandle {
        let closed = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Idle);

        let read_loop = ReadLoop {
            job_id: job_id.clone(),
            handler,
            closed: closed.clone(),
            cancel: cancel.clone(),
            state: state_tx,
        };
        let task = tokio::spawn(read_loop.run(self.transport.clone()));

        SubscriptionHandle {
            job_id,
            closed,
            cancel,
            state: state_rx,
            task: Some(task),
        }
    }
}

struct ReadLoop<H> {
    job_id: JobId,
    handler: H,
    closed: Arc<AtomicBool>,
    cancel: CancellationToken,
    state: watch::Sender<SubscriptionState>,
}

impl<H: StatusHandler> ReadLoop<H> {
    async fn run(mut self, transport: Arc<dyn StatusTransport>) -> SubscriptionOutcome {
        self.transition(SubscriptionState::Connecting);

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.close(SubscriptionOutcome::Cancelled),
            opened = transport.open(&self.job_id) => opened,
        };
        let mut chunks = match opened {
            Ok(chunks) => chunks,
            Err(e) => {
                if self.is_closed() {
                    return self.close(SubscriptionOutcome::Cancelled);
                }
                warn!(job_id = %self.job_id, error = %e, "Failed to open status stream");
                self.handler.on_error(e);
                return self.close(SubscriptionOutcome::ConnectionFailed);
            }
        };

        self.transition(SubscriptionState::Streaming);
        debug!(job_id = %self.job_id, "Status stream open");

        let mut decoder = FrameDecoder::new();
        loop {
            if self.is_closed() {
                return self.close(SubscriptionOutcome::Cancelled);
            }

            // dropping `chunks` on cancellation aborts the request
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.close(SubscriptionOutcome::Cancelled),
                next = chunks.next() => next,
            };

            if self.is_closed() {
                return self.close(SubscriptionOutcome::Cancelled);
            }

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    warn!(job_id = %self.job_id, error = %e, "Status stream dropped");
                    self.handler.on_error(e);
                    return self.close(SubscriptionOutcome::ConnectionFailed);
                }
                None => {
                    debug!(job_id = %self.job_id, "Status stream ended without a terminal frame");
                    return self.close(SubscriptionOutcome::EndOfStream);
                }
            };

            let mut finished: Option<JobPhase> = None;
            for line in decoder.feed(&chunk) {
                match classify_line(&line) {
                    None | Some(StreamFrame::Noise) => continue,
                    Some(StreamFrame::Error(message)) => {
                        if self.is_closed() {
                            return self.close(SubscriptionOutcome::Cancelled);
                        }
                        warn!(job_id = %self.job_id, error = %message, "Server reported an error");
                        self.handler.on_error(StreamError::ServerReported(message));
                        self.transition(SubscriptionState::Errored);
                        return self.close(SubscriptionOutcome::Errored);
                    }
                    Some(StreamFrame::Progress(update)) => {
                        if self.is_closed() {
                            return self.close(SubscriptionOutcome::Cancelled);
                        }
                        let phase = update.status.phase();
                        self.handler.on_progress(update);
                        // keep draining the lines of this chunk
                        if phase.is_terminal() && finished.is_none() {
                            finished = Some(phase);
                        }
                    }
                }
            }

            if let Some(phase) = finished {
                info!(job_id = %self.job_id, status = ?phase, "Generation finished");
                return if phase == JobPhase::Completed {
                    self.transition(SubscriptionState::Completed);
                    self.close(SubscriptionOutcome::Completed)
                } else {
                    self.transition(SubscriptionState::Failed);
                    self.close(SubscriptionOutcome::Failed)
                };
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn transition(&self, next: SubscriptionState) {
        let current = *self.state.borrow();
        debug_assert!(
            current.can_transition_to(next),
            "invalid subscription transition {:?} -> {:?}",
            current,
            next
        );
        self.state.send_replace(next);
    }

    fn close(&mut self, outcome: SubscriptionOutcome) -> SubscriptionOutcome {
        let cancelled = self.closed.swap(true, Ordering::SeqCst);
        self.transition(SubscriptionState::Closed);
        debug!(job_id = %self.job_id, outcome = ?outcome, "Status subscription closed");
        if !cancelled && outcome != SubscriptionOutcome::Cancelled {
            self.handler.on_closed(outcome);
        }
        outcome
    }
}
