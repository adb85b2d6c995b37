//! Event store trait for the ledger journal.
//!
//! The journal is an append-only stream of [`SerializedEvent`]s. The ledger
//! appends exactly one event per accepted mutation and replays the stream on
//! startup, so an operation that reported success survives restarts.
//!
//! Appends carry an expected [`Version`]. A writer that lost track of the
//! stream (another process appended in between) gets
//! [`EventStoreError::ConcurrencyConflict`] instead of silently interleaving.

use crate::event::SerializedEvent;
use crate::stream::{StreamId, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`EventStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventStoreError>> + Send + 'a>>;

/// Errors that can occur during event store operations.
#[derive(Error, Debug)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict: expected version doesn't match current version.
    #[error("Concurrency conflict: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream ID where the conflict occurred.
        stream_id: StreamId,
        /// The version we expected the stream to be at.
        expected: Version,
        /// The actual current version of the stream.
        actual: Version,
    },

    /// Database connection error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// General I/O error.
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Event store abstraction for storing and retrieving event streams.
///
/// # Dyn Compatibility
///
/// Methods return explicit `Pin<Box<dyn Future>>` instead of `async fn` so the
/// store can be injected as `Arc<dyn EventStore>`.
pub trait EventStore: Send + Sync {
    /// Append events to a stream with optimistic concurrency control.
    ///
    /// - `Some(version)`: the stream must currently be at this version
    /// - `None`: append unconditionally
    ///
    /// Returns the new version: a stream at version 5 that receives 3 events
    /// is at version 8 afterwards.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: version mismatch
    /// - `DatabaseError` / `IoError`: the backing storage failed
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Option<Version>,
        events: Vec<SerializedEvent>,
    ) -> StoreFuture<'_, Version>;

    /// Load events from a stream, oldest first.
    ///
    /// `from_version` is inclusive and counts from 0 (the first event). A
    /// stream that was never written is returned as an empty vector.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` / `IoError`: the backing storage failed
    fn load_events(
        &self,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> StoreFuture<'_, Vec<SerializedEvent>>;
}
