//! # bookgen-client
//!
//! Client library for a book bonus generation backend.
//!
//! A user picks candidate titles for bonus documents (in one or more languages), submits
//! them as a generation job, watches the job's progress over a server-sent event stream,
//! and finally downloads the generated files.
//!
//! ## Design Philosophy
//!
//! bookgen-client is designed to be:
//! - **Library-first** - No UI, purely a Rust crate for embedding
//! - **Event-driven** - Job progress is pushed to handlers and broadcast as [`JobEvent`]s
//! - **Cancellable** - Every status subscription is an owned handle; dropping it stops the stream
//! - **Sensible defaults** - Works against a local backend with zero configuration
//!
//! ## Quick Start
//!
//! ```no_run
//! use bookgen_client::{ApiClient, Config, JobCoordinator, TitleStore};
//! use bookgen_client::artifact::DirectorySink;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!     let api = ApiClient::new(&config)?;
//!     let languages = vec!["en".to_string(), "es".to_string()];
//!
//!     let mut titles = TitleStore::new();
//!     titles.populate("The Rust Book", None, &languages, &api).await?;
//!     titles.toggle_selection(0);
//!
//!     let jobs = JobCoordinator::new(api, config.download)?;
//!     let mut events = jobs.events();
//!     jobs.start_job(&titles, "The Rust Book", None).await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!         if let bookgen_client::JobEvent::Completed { .. } = event {
//!             jobs.download_bundle(&DirectorySink::new("downloads")).await?;
//!             break;
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Artifact downloads with bounded retry
pub mod artifact;
/// HTTP client and collaborator traits
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Job lifecycle coordination
pub mod job;
/// Retry logic with linear backoff
pub mod retry;
/// Generation status streaming
pub mod stream;
/// Multi-language candidate titles
pub mod titles;
/// Core types
pub mod types;
/// User-facing error messages
pub mod user_message;

// Re-export commonly used types
pub use artifact::{Artifact, ArtifactFetcher, ArtifactSink};
pub use client::{ApiClient, GenerationStarter, HistorySource, TitleGenerator, Translator};
pub use config::{ApiConfig, Backoff, Config, RetryConfig, StreamConfig};
pub use error::{ApiError, DownloadError, Error, Result, StreamError};
pub use job::JobCoordinator;
pub use stream::{FrameDecoder, StatusStreamClient, SubscriptionHandle};
pub use titles::TitleStore;
pub use types::{
    FileKind, GenerationJob, HistoryEntry, JobEvent, JobId, JobPhase, JobStatus, ProgressUpdate,
    TitlesByLanguage,
};
