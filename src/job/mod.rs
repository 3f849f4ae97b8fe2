//! Generation job lifecycle
//!
//! [`JobCoordinator`] owns the one job a user is currently watching: it submits the
//! selected titles, keeps the latest progress snapshot up to date from the status
//! stream, and gates artifact downloads on completion. Observers can either poll
//! [`JobCoordinator::snapshot`] or listen to [`JobEvent`]s.

use crate::artifact::{ArtifactFetcher, ArtifactSink};
use crate::client::{ApiClient, GenerationStarter};
use crate::config::RetryConfig;
use crate::error::{Error, Result, StreamError};
use crate::stream::{
    StatusHandler, StatusStreamClient, StatusTransport, SubscriptionHandle, SubscriptionOutcome,
};
use crate::titles::TitleStore;
use crate::types::{FileKind, GenerationJob, JobEvent, JobId, JobPhase, JobStatus, ProgressUpdate};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the job event channel; slow receivers see `Lagged`
const EVENT_CHANNEL_CAPACITY: usize = 256;

type SharedJob = Arc<RwLock<Option<GenerationJob>>>;

/// Tracks a single generation job from submission to download
pub struct JobCoordinator {
    starter: Arc<dyn GenerationStarter>,
    streams: StatusStreamClient,
    fetcher: ArtifactFetcher,
    job: SharedJob,
    events: broadcast::Sender<JobEvent>,
    subscription: Mutex<Option<SubscriptionHandle>>,
}

impl JobCoordinator {
    /// Coordinator backed entirely by `api`
    ///
    /// # Errors
    /// [`Error::Config`] when `retry` is invalid.
    pub fn new(api: ApiClient, retry: RetryConfig) -> Result<Self> {
        let shared = Arc::new(api.clone());
        let fetcher = ArtifactFetcher::new(api, retry)?;
        Ok(Self::with_parts(shared.clone(), shared, fetcher))
    }

    /// Coordinator over explicit collaborators
    pub fn with_parts(
        starter: Arc<dyn GenerationStarter>,
        transport: Arc<dyn StatusTransport>,
        fetcher: ArtifactFetcher,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            starter,
            streams: StatusStreamClient::new(transport),
            fetcher,
            job: Arc::new(RwLock::new(None)),
            events,
            subscription: Mutex::new(None),
        }
    }

    /// Receive every [`JobEvent`] emitted from now on
    pub fn events(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Submit the store's selected titles and start tracking the new job
    ///
    /// # Errors
    /// [`Error::InvalidInput`] when nothing is selected or the book title is blank; no
    /// request is made then. Collaborator failures are returned as-is and leave any
    /// currently tracked job untouched.
    pub async fn start_job(
        &self,
        store: &TitleStore,
        book_title: &str,
        table_of_contents: Option<&str>,
    ) -> Result<JobId> {
        if store.selection_count() == 0 {
            return Err(Error::InvalidInput(
                "Please select at least one title".to_string(),
            ));
        }
        let book_title = book_title.trim();
        if book_title.is_empty() {
            return Err(Error::InvalidInput("Book title is required".to_string()));
        }
        let table_of_contents = table_of_contents.map(str::trim).filter(|toc| !toc.is_empty());

        let payload = store.submission_payload();
        let job_id = self
            .starter
            .start_generation(&payload, book_title, table_of_contents, store.languages())
            .await?;

        info!(job_id = %job_id, book_title, selected = store.selection_count(), "Generation job started");
        self.track(job_id.clone(), book_title);
        Ok(job_id)
    }

    /// Track `job_id`, replacing whatever job was tracked before
    ///
    /// The previous subscription is cancelled before the new one opens. Must be called
    /// from within a tokio runtime.
    pub fn track(&self, job_id: JobId, book_title: &str) {
        let mut subscription = lock(&self.subscription);
        if let Some(previous) = subscription.take() {
            debug!(job_id = %previous.job_id(), "Releasing previous status subscription");
            previous.cancel();
        }

        *write(&self.job) = Some(GenerationJob::new(job_id.clone(), book_title));
        let _ = self.events.send(JobEvent::Started {
            job_id: job_id.clone(),
        });

        let handler = JobHandler {
            job_id: job_id.clone(),
            job: self.job.clone(),
            events: self.events.clone(),
        };
        *subscription = Some(self.streams.subscribe(job_id, handler));
    }

    /// Stop tracking and forget the job
    pub fn reset(&self) {
        if let Some(handle) = lock(&self.subscription).take() {
            handle.cancel();
        }
        if let Some(job) = write(&self.job).take() {
            debug!(job_id = %job.job_id, "Generation job reset");
        }
    }

    /// Copy of the tracked job, if any
    pub fn snapshot(&self) -> Option<GenerationJob> {
        read(&self.job).clone()
    }

    /// Id of the tracked job
    pub fn job_id(&self) -> Option<JobId> {
        read(&self.job).as_ref().map(|job| job.job_id.clone())
    }

    /// Rounded completion percentage of the tracked job, 0 without one
    pub fn percent(&self) -> u8 {
        read(&self.job).as_ref().map_or(0, GenerationJob::percent)
    }

    /// Whether the status stream is still expected to deliver updates
    ///
    /// Cleared by a terminal frame, a stream error, or the stream closing early (see
    /// [`JobEvent::StreamEnded`]).
    pub fn is_tracking(&self) -> bool {
        read(&self.job).as_ref().is_some_and(|job| job.tracking)
    }

    /// Download the zip bundle of the completed job into `sink`
    ///
    /// # Errors
    /// [`Error::JobNotReady`] unless the tracked job has completed. Download failures
    /// are also recorded as the job's error.
    pub async fn download_bundle(&self, sink: &dyn ArtifactSink) -> Result<String> {
        let (job_id, book_title) = self.completed_job()?;
        let result = self
            .fetcher
            .download_zip_bundle(&job_id, &book_title, sink)
            .await;
        self.record_download(&job_id, result)
    }

    /// Download one generated file of the completed job into `sink`
    ///
    /// # Errors
    /// Same as [`download_bundle`](Self::download_bundle).
    pub async fn download_file(
        &self,
        item_title: &str,
        kind: FileKind,
        sink: &dyn ArtifactSink,
    ) -> Result<String> {
        let (job_id, book_title) = self.completed_job()?;
        let result = self
            .fetcher
            .download_single_file(&job_id, &book_title, item_title, kind, sink)
            .await;
        self.record_download(&job_id, result)
    }

    fn completed_job(&self) -> Result<(JobId, String)> {
        match read(&self.job).as_ref() {
            Some(job) if job.status == JobPhase::Completed => {
                Ok((job.job_id.clone(), job.book_title.clone()))
            }
            Some(job) => Err(Error::JobNotReady(format!(
                "job {} has not completed (status: {})",
                job.job_id,
                job.status.label()
            ))),
            None => Err(Error::JobNotReady("no job is being tracked".to_string())),
        }
    }

    fn record_download(&self, job_id: &JobId, result: Result<String>) -> Result<String> {
        let error = match result {
            Ok(filename) => return Ok(filename),
            Err(e) => e,
        };

        let message = match &error {
            Error::Download(e) => e.message(),
            other => other.to_string(),
        };
        warn!(job_id = %job_id, error = %message, "Artifact download failed");
        if let Some(job) = write(&self.job).as_mut().filter(|job| &job.job_id == job_id) {
            job.error = Some(message.clone());
        }
        let _ = self.events.send(JobEvent::Errored {
            job_id: job_id.clone(),
            message,
        });
        Err(error)
    }
}

impl std::fmt::Debug for JobCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobCoordinator")
            .field("job", &self.snapshot())
            .finish_non_exhaustive()
    }
}

/// Folds stream notifications into the shared snapshot
struct JobHandler {
    job_id: JobId,
    job: SharedJob,
    events: broadcast::Sender<JobEvent>,
}

impl StatusHandler for JobHandler {
    fn on_progress(&mut self, update: ProgressUpdate) {
        {
            let mut guard = write(&self.job);
            let Some(job) = guard.as_mut().filter(|job| job.job_id == self.job_id) else {
                return;
            };
            job.apply(&update);
        }

        let event = match update.status.phase() {
            JobPhase::Completed => {
                let result_count = match &update.status {
                    JobStatus::Completed { results } => results.len(),
                    _ => 0,
                };
                info!(job_id = %self.job_id, result_count, "Generation completed");
                JobEvent::Completed {
                    job_id: self.job_id.clone(),
                    result_count,
                }
            }
            JobPhase::Failed => {
                warn!(job_id = %self.job_id, "Generation failed");
                JobEvent::Failed {
                    job_id: self.job_id.clone(),
                }
            }
            JobPhase::Pending | JobPhase::Running => JobEvent::Progress {
                job_id: self.job_id.clone(),
                completed: update.completed,
                total: update.total,
            },
        };
        let _ = self.events.send(event);
    }

    fn on_error(&mut self, error: StreamError) {
        let message = error.message().to_string();
        {
            let mut guard = write(&self.job);
            let Some(job) = guard.as_mut().filter(|job| job.job_id == self.job_id) else {
                return;
            };
            job.error = Some(message.clone());
            job.tracking = false;
        }
        let _ = self.events.send(JobEvent::Errored {
            job_id: self.job_id.clone(),
            message,
        });
    }

    fn on_closed(&mut self, outcome: SubscriptionOutcome) {
        {
            let mut guard = write(&self.job);
            let Some(job) = guard
                .as_mut()
                .filter(|job| job.job_id == self.job_id && job.tracking)
            else {
                return;
            };
            job.tracking = false;
        }
        warn!(job_id = %self.job_id, outcome = ?outcome, "Status stream closed before the job finished");
        let _ = self.events.send(JobEvent::StreamEnded {
            job_id: self.job_id.clone(),
        });
    }
}

// A panic while holding one of these locks leaves plain data behind, so poisoning is ignored.
fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
