// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::error::StreamError;
use crate::types::{JobId, JobStatus, ProgressUpdate};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
enum Received {
    Progress(ProgressUpdate),
    Error(StreamError),
}

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<Received>>>,
    closings: Arc<Mutex<Vec<SubscriptionOutcome>>>,
}

impl Recorder {
    fn events(&self) -> Vec<Received> {
        self.events.lock().unwrap().clone()
    }

    fn closings(&self) -> Vec<SubscriptionOutcome> {
        self.closings.lock().unwrap().clone()
    }

    fn progress_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Received::Progress(_)))
            .count()
    }

    fn errors(&self) -> Vec<StreamError> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Received::Error(err) => Some(err),
                Received::Progress(_) => None,
            })
            .collect()
    }

    async fn wait_for_len(&self, len: usize) {
        let result = tokio::time::timeout(Duration::from_secs(2), async {
            while self.events().len() < len {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(result.is_ok(), "timed out waiting for {} events", len);
    }
}

impl StatusHandler for Recorder {
    fn on_progress(&mut self, update: ProgressUpdate) {
        self.events.lock().unwrap().push(Received::Progress(update));
    }

    fn on_error(&mut self, error: StreamError) {
        self.events.lock().unwrap().push(Received::Error(error));
    }

    fn on_closed(&mut self, outcome: SubscriptionOutcome) {
        self.closings.lock().unwrap().push(outcome);
    }
}

/// Replays fixed chunks, optionally staying open afterwards
struct ScriptedTransport {
    open_error: Option<StreamError>,
    chunks: Vec<Result<&'static str, StreamError>>,
    hang_after: bool,
}

impl ScriptedTransport {
    fn chunks(chunks: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            open_error: None,
            chunks: chunks.into_iter().map(Ok).collect(),
            hang_after: false,
        })
    }
}

#[async_trait]
impl StatusTransport for ScriptedTransport {
    async fn open(&self, _job_id: &JobId) -> Result<ChunkStream, StreamError> {
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        let items: Vec<Result<Bytes, StreamError>> = self
            .chunks
            .iter()
            .map(|c| c.clone().map(|s| Bytes::from_static(s.as_bytes())))
            .collect();
        let replay = futures::stream::iter(items);
        if self.hang_after {
            Ok(replay.chain(futures::stream::pending()).boxed())
        } else {
            Ok(replay.boxed())
        }
    }
}

/// Chunks are pushed by the test while the subscription runs
struct ChannelTransport {
    rx: Mutex<Option<mpsc::UnboundedReceiver<Result<Bytes, StreamError>>>>,
}

impl ChannelTransport {
    fn new() -> (Arc<Self>, mpsc::UnboundedSender<Result<Bytes, StreamError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                rx: Mutex::new(Some(rx)),
            }),
            tx,
        )
    }
}

#[async_trait]
impl StatusTransport for ChannelTransport {
    async fn open(&self, _job_id: &JobId) -> Result<ChunkStream, StreamError> {
        let rx = self.rx.lock().unwrap().take().expect("opened once");
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

/// Never finishes connecting
struct StalledTransport;

#[async_trait]
impl StatusTransport for StalledTransport {
    async fn open(&self, _job_id: &JobId) -> Result<ChunkStream, StreamError> {
        futures::future::pending().await
    }
}

fn frame(json: &str) -> Bytes {
    Bytes::from(format!("data: {}\n\n", json))
}

fn job() -> JobId {
    JobId::new("job-1")
}

#[tokio::test]
async fn test_chunk_split_mid_json_yields_two_progress_events() {
    let transport = ScriptedTransport::chunks(vec![
        "data: {\"status\":\"running\",\"completed\":0,\"total\":2,\"remaining\":2}\n\n",
        "data: {\"status\":\"running\",\"comp",
        "leted\":1,\"total\":2,\"remaining\":1}\n\n",
    ]);
    let recorder = Recorder::default();
    let handle = StatusStreamClient::new(transport).subscribe(job(), recorder.clone());

    let outcome = handle.finished().await;

    assert_eq!(outcome, SubscriptionOutcome::EndOfStream);
    assert_eq!(recorder.progress_count(), 2);
    assert!(recorder.errors().is_empty());
    match &recorder.events()[1] {
        Received::Progress(update) => assert_eq!(update.completed, 1),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_completed_frame_drains_current_chunk_then_stops() {
    let transport = ScriptedTransport::chunks(vec![
        "data: {\"status\":\"completed\",\"completed\":2,\"total\":2,\"remaining\":0,\"results\":{\"A\":{}}}\n\n\
          data: {\"status\":\"completed\",\"completed\":2,\"total\":2,\"remaining\":0}\n\n",
        "data: {\"status\":\"running\",\"completed\":0,\"total\":2,\"remaining\":2}\n\n",
    ]);
    let recorder = Recorder::default();
    let handle = StatusStreamClient::new(transport).subscribe(job(), recorder.clone());
    let mut state = handle.watch_state();

    let outcome = handle.finished().await;

    assert_eq!(outcome, SubscriptionOutcome::Completed);
    assert_eq!(recorder.progress_count(), 2, "second chunk must not be read");
    assert!(recorder.errors().is_empty());
    state
        .wait_for(|s| *s == SubscriptionState::Closed)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failed_status_is_delivered_as_progress() {
    let transport = ScriptedTransport::chunks(vec![
        "data: {\"status\":\"failed\",\"completed\":1,\"total\":3,\"remaining\":2}\n\n",
    ]);
    let recorder = Recorder::default();
    let outcome = StatusStreamClient::new(transport)
        .subscribe(job(), recorder.clone())
        .finished()
        .await;

    assert_eq!(outcome, SubscriptionOutcome::Failed);
    match recorder.events().as_slice() {
        [Received::Progress(update)] => assert_eq!(update.status, JobStatus::Failed),
        other => panic!("unexpected events {:?}", other),
    }
}

#[tokio::test]
async fn test_error_frame_reported_once_and_stops_reading() {
    let transport = ScriptedTransport::chunks(vec![
        "data: {\"status\":\"running\",\"completed\":0,\"total\":1,\"remaining\":1}\n\n\
          data: {\"error\":\"Job not found\"}\n\n\
          data: {\"error\":\"second\"}\n\n",
        "data: {\"status\":\"running\",\"completed\":1,\"total\":1,\"remaining\":0}\n\n",
    ]);
    let recorder = Recorder::default();
    let outcome = StatusStreamClient::new(transport)
        .subscribe(job(), recorder.clone())
        .finished()
        .await;

    assert_eq!(outcome, SubscriptionOutcome::Errored);
    assert_eq!(recorder.progress_count(), 1);
    assert_eq!(
        recorder.errors(),
        vec![StreamError::ServerReported("Job not found".to_string())]
    );
}

#[tokio::test]
async fn test_malformed_frames_do_not_abort() {
    let transport = ScriptedTransport::chunks(vec![
        ": comment\n\ndata: {not json}\n\ndata: \n\nevent: progress\n",
        "data: {\"status\":\"completed\",\"completed\":1,\"total\":1,\"remaining\":0}\n\n",
    ]);
    let recorder = Recorder::default();
    let outcome = StatusStreamClient::new(transport)
        .subscribe(job(), recorder.clone())
        .finished()
        .await;

    assert_eq!(outcome, SubscriptionOutcome::Completed);
    assert_eq!(recorder.progress_count(), 1);
    assert!(recorder.errors().is_empty());
}

#[tokio::test]
async fn test_open_failure_reported_once() {
    let transport = Arc::new(ScriptedTransport {
        open_error: Some(StreamError::Connection {
            status: Some(401),
            message: "HTTP error! status: 401".to_string(),
        }),
        chunks: vec![],
        hang_after: false,
    });
    let recorder = Recorder::default();
    let outcome = StatusStreamClient::new(transport)
        .subscribe(job(), recorder.clone())
        .finished()
        .await;

    assert_eq!(outcome, SubscriptionOutcome::ConnectionFailed);
    assert_eq!(recorder.events().len(), 1);
    assert!(matches!(
        recorder.errors()[0],
        StreamError::Connection {
            status: Some(401),
            ..
        }
    ));
}

#[tokio::test]
async fn test_drop_before_terminal_reports_connection_error() {
    let transport = Arc::new(ScriptedTransport {
        open_error: None,
        chunks: vec![
            Ok("data: {\"status\":\"running\",\"completed\":0,\"total\":1,\"remaining\":1}\n\n"),
            Err(StreamError::Connection {
                status: None,
                message: "connection reset".to_string(),
            }),
        ],
        hang_after: false,
    });
    let recorder = Recorder::default();
    let outcome = StatusStreamClient::new(transport)
        .subscribe(job(), recorder.clone())
        .finished()
        .await;

    assert_eq!(outcome, SubscriptionOutcome::ConnectionFailed);
    assert_eq!(recorder.progress_count(), 1);
    assert_eq!(recorder.errors().len(), 1);
}

#[tokio::test]
async fn test_cancel_silences_further_callbacks() {
    let (transport, tx) = ChannelTransport::new();
    let recorder = Recorder::default();
    let handle = StatusStreamClient::new(transport).subscribe(job(), recorder.clone());

    tx.send(Ok(frame(r#"{"status":"running","completed":0,"total":3,"remaining":3}"#)))
        .unwrap();
    recorder.wait_for_len(1).await;

    handle.cancel();
    assert!(handle.is_closed());

    // late frames and a late failure are both ignored
    let _ = tx.send(Ok(frame(r#"{"status":"running","completed":1,"total":3,"remaining":2}"#)));
    let _ = tx.send(Err(StreamError::Connection {
        status: None,
        message: "aborted".to_string(),
    }));

    let outcome = handle.finished().await;
    assert_eq!(outcome, SubscriptionOutcome::Cancelled);
    assert_eq!(recorder.events().len(), 1);
    assert!(recorder.closings().is_empty());
}

#[tokio::test]
async fn test_end_of_stream_without_terminal_frame_notifies_close() {
    let (transport, tx) = ChannelTransport::new();
    let recorder = Recorder::default();
    let handle = StatusStreamClient::new(transport).subscribe(job(), recorder.clone());

    tx.send(Ok(frame(r#"{"status":"running","completed":1,"total":4,"remaining":3}"#)))
        .unwrap();
    recorder.wait_for_len(1).await;
    drop(tx);

    let outcome = tokio::time::timeout(Duration::from_secs(2), handle.finished())
        .await
        .expect("closed stream ends the subscription");
    assert_eq!(outcome, SubscriptionOutcome::EndOfStream);
    assert_eq!(recorder.progress_count(), 1);
    assert!(recorder.errors().is_empty());
    assert_eq!(recorder.closings(), vec![SubscriptionOutcome::EndOfStream]);
}

#[tokio::test]
async fn test_cancel_while_connecting() {
    let recorder = Recorder::default();
    let handle = StatusStreamClient::new(Arc::new(StalledTransport)).subscribe(job(), recorder.clone());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.state(), SubscriptionState::Connecting);

    handle.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(2), handle.finished())
        .await
        .expect("cancel must abort the pending connect");

    assert_eq!(outcome, SubscriptionOutcome::Cancelled);
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn test_dropping_handle_aborts_the_stream() {
    let (transport, tx) = ChannelTransport::new();
    let recorder = Recorder::default();
    let handle = StatusStreamClient::new(transport).subscribe(job(), recorder.clone());

    tx.send(Ok(frame(r#"{"status":"pending","completed":0,"total":1,"remaining":1}"#)))
        .unwrap();
    recorder.wait_for_len(1).await;

    drop(handle);

    // the read loop drops the receiver once it observes the cancellation
    tokio::time::timeout(Duration::from_secs(2), tx.closed())
        .await
        .expect("stream should be released after the handle is dropped");
    assert_eq!(recorder.events().len(), 1);
}

#[tokio::test]
async fn test_closure_callbacks() {
    let transport = ScriptedTransport::chunks(vec![
        "data: {\"status\":\"running\",\"completed\":1,\"total\":4,\"remaining\":3}\n\n",
        "data: {\"error\":\"boom\"}\n\n",
    ]);
    let percents = Arc::new(Mutex::new(Vec::new()));
    let messages = Arc::new(Mutex::new(Vec::new()));
    let (p, m) = (percents.clone(), messages.clone());

    let outcome = StatusStreamClient::new(transport)
        .subscribe(
            job(),
            callbacks(
                move |update| p.lock().unwrap().push(update.percent()),
                move |error| m.lock().unwrap().push(error.message().to_string()),
            ),
        )
        .finished()
        .await;

    assert_eq!(outcome, SubscriptionOutcome::Errored);
    assert_eq!(*percents.lock().unwrap(), vec![25]);
    assert_eq!(*messages.lock().unwrap(), vec!["boom".to_string()]);
}

#[tokio::test]
async fn test_stream_left_open_after_terminal_is_not_awaited() {
    let transport = Arc::new(ScriptedTransport {
        open_error: None,
        chunks: vec![Ok(
            "data: {\"status\":\"completed\",\"completed\":1,\"total\":1,\"remaining\":0}\n\n",
        )],
        hang_after: true,
    });
    let recorder = Recorder::default();
    let handle = StatusStreamClient::new(transport).subscribe(job(), recorder.clone());

    let outcome = tokio::time::timeout(Duration::from_secs(2), handle.finished())
        .await
        .expect("terminal frame ends the subscription");
    assert_eq!(outcome, SubscriptionOutcome::Completed);
}

#[test]
fn test_state_machine_transitions() {
    use SubscriptionState::*;
    assert!(Idle.can_transition_to(Connecting));
    assert!(Connecting.can_transition_to(Streaming));
    assert!(Connecting.can_transition_to(Closed));
    assert!(Streaming.can_transition_to(Completed));
    assert!(Errored.can_transition_to(Closed));
    assert!(!Closed.can_transition_to(Streaming));
    assert!(!Completed.can_transition_to(Streaming));
    assert!(!Connecting.can_transition_to(Completed));
}
