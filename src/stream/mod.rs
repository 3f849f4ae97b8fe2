//! Live generation-status stream
//!
//! The backend reports job progress as server-sent events: `data: {json}` lines separated
//! by blank lines, delivered in arbitrarily sized chunks. This module turns that byte
//! stream into [`ProgressUpdate`](crate::types::ProgressUpdate) notifications:
//!
//! - [`FrameDecoder`] reassembles lines across chunk boundaries
//! - [`classify_line`] turns a line into a [`StreamFrame`]
//! - [`StatusStreamClient`] runs the cancellable read loop and hands out
//!   [`SubscriptionHandle`]s

mod decoder;
mod frame;
mod subscription;

pub use decoder::FrameDecoder;
pub use frame::{DATA_PREFIX, StreamFrame, classify_line, parse_payload};
pub use subscription::{
    Callbacks, ChunkStream, StatusHandler, StatusStreamClient, StatusTransport,
    SubscriptionHandle, SubscriptionOutcome, SubscriptionState, callbacks,
};

#[cfg(test)]
mod tests;
