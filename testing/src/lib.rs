//! # Machine Ledger Testing
//!
//! Testing utilities and helpers for the machine reservation ledger.
//!
//! This crate provides:
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - [`mocks::FixedClock`] for deterministic timestamps
//! - [`mocks::InMemoryEventStore`] and [`mocks::FailingEventStore`] journals
//!
//! ## Example
//!
//! ```ignore
//! use machine_ledger_testing::{test_clock, InMemoryEventStore};
//!
//! #[tokio::test]
//! async fn books_a_slot() {
//!     let journal = Arc::new(InMemoryEventStore::new());
//!     let ledger = LedgerService::open(config, env, journal).await?;
//!     ledger.add_machine(&operator, "A".into()).await?;
//!     ledger.book(&member, "A".into(), 900, 930, Amount::new(100)).await?;
//! }
//! ```

use chrono::{DateTime, Utc};
use machine_ledger_core::environment::Clock;


/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use machine_ledger_core::event::SerializedEvent;
    use machine_ledger_core::event_store::{EventStore, EventStoreError, StoreFuture};
    use machine_ledger_core::stream::{StreamId, Version};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// ```
    /// use machine_ledger_testing::mocks::FixedClock;
    /// use machine_ledger_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which never happens.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// In-memory event store
    ///
    /// Enforces the same optimistic concurrency rules as a durable store, so
    /// journal behaviour can be tested without a database.
    #[derive(Debug, Default)]
    pub struct InMemoryEventStore {
        streams: Mutex<HashMap<StreamId, Vec<SerializedEvent>>>,
    }

    impl InMemoryEventStore {
        /// Create an empty store
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of events in a stream
        #[must_use]
        pub fn len(&self, stream_id: &StreamId) -> usize {
            self.streams
                .lock()
                .map(|streams| streams.get(stream_id).map_or(0, Vec::len))
                .unwrap_or(0)
        }

        /// Event type names of a stream, oldest first
        #[must_use]
        pub fn event_types(&self, stream_id: &StreamId) -> Vec<String> {
            self.streams
                .lock()
                .map(|streams| {
                    streams
                        .get(stream_id)
                        .map(|events| events.iter().map(|e| e.event_type.clone()).collect())
                        .unwrap_or_default()
                })
                .unwrap_or_default()
        }

        fn append_sync(
            &self,
            stream_id: StreamId,
            expected_version: Option<Version>,
            events: Vec<SerializedEvent>,
        ) -> Result<Version, EventStoreError> {
            let mut streams = self
                .streams
                .lock()
                .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
            let stream = streams.entry(stream_id.clone()).or_default();
            let actual = Version::new(stream.len() as u64);

            if let Some(expected) = expected_version {
                if expected != actual {
                    return Err(EventStoreError::ConcurrencyConflict {
                        stream_id,
                        expected,
                        actual,
                    });
                }
            }

            let appended = events.len() as u64;
            stream.extend(events);
            Ok(actual + appended)
        }

        fn load_sync(
            &self,
            stream_id: &StreamId,
            from_version: Option<Version>,
        ) -> Result<Vec<SerializedEvent>, EventStoreError> {
            let streams = self
                .streams
                .lock()
                .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
            let skip = from_version.map_or(0, Version::value);
            Ok(streams
                .get(stream_id)
                .map(|events| {
                    events
                        .iter()
                        .skip(usize::try_from(skip).unwrap_or(usize::MAX))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    impl EventStore for InMemoryEventStore {
        fn append_events(
            &self,
            stream_id: StreamId,
            expected_version: Option<Version>,
            events: Vec<SerializedEvent>,
        ) -> StoreFuture<'_, Version> {
            let result = self.append_sync(stream_id, expected_version, events);
            Box::pin(async move { result })
        }

        fn load_events(
            &self,
            stream_id: StreamId,
            from_version: Option<Version>,
        ) -> StoreFuture<'_, Vec<SerializedEvent>> {
            let result = self.load_sync(&stream_id, from_version);
            Box::pin(async move { result })
        }
    }

    /// Event store whose appends start failing after a number of successes
    ///
    /// Used to check that a failed commit leaves the ledger untouched.
    #[derive(Debug)]
    pub struct FailingEventStore {
        inner: InMemoryEventStore,
        successes_left: AtomicUsize,
    }

    impl FailingEventStore {
        /// Every append fails
        #[must_use]
        pub fn new() -> Self {
            Self::fail_after(0)
        }

        /// The first `successes` appends go through, the rest fail
        #[must_use]
        pub fn fail_after(successes: usize) -> Self {
            Self {
                inner: InMemoryEventStore::new(),
                successes_left: AtomicUsize::new(successes),
            }
        }

        /// The events that were appended before the failures started
        #[must_use]
        pub const fn inner(&self) -> &InMemoryEventStore {
            &self.inner
        }
    }

    impl Default for FailingEventStore {
        fn default() -> Self {
            Self::new()
        }
    }

    impl EventStore for FailingEventStore {
        fn append_events(
            &self,
            stream_id: StreamId,
            expected_version: Option<Version>,
            events: Vec<SerializedEvent>,
        ) -> StoreFuture<'_, Version> {
            let allowed = self
                .successes_left
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(1))
                .is_ok();
            if allowed {
                self.inner.append_events(stream_id, expected_version, events)
            } else {
                Box::pin(async { Err(EventStoreError::IoError("journal unavailable".to_string())) })
            }
        }

        fn load_events(
            &self,
            stream_id: StreamId,
            from_version: Option<Version>,
        ) -> StoreFuture<'_, Vec<SerializedEvent>> {
            self.inner.load_events(stream_id, from_version)
        }
    }
}

// Re-export commonly used items
pub use mocks::{FailingEventStore, FixedClock, InMemoryEventStore, test_clock};
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::*;
    use machine_ledger_core::event::SerializedEvent;
    use machine_ledger_core::event_store::{EventStore, EventStoreError};
    use machine_ledger_core::stream::{StreamId, Version};

    fn event(name: &str) -> SerializedEvent {
        SerializedEvent::new(name.to_string(), vec![1, 2, 3], None)
    }

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[tokio::test]
    async fn in_memory_store_appends_and_loads_in_order() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new("machine-ledger");

        let v1 = store
            .append_events(stream.clone(), Some(Version::INITIAL), vec![event("A.v1")])
            .await;
        assert!(matches!(v1, Ok(v) if v == Version::new(1)));

        let v3 = store
            .append_events(stream.clone(), Some(Version::new(1)), vec![event("B.v1"), event("C.v1")])
            .await;
        assert!(matches!(v3, Ok(v) if v == Version::new(3)));

        let tail = store.load_events(stream.clone(), Some(Version::new(1))).await;
        let types: Vec<String> = tail
            .map(|events| events.into_iter().map(|e| e.event_type).collect())
            .unwrap_or_default();
        assert_eq!(types, vec!["B.v1", "C.v1"]);
        assert_eq!(store.event_types(&stream), vec!["A.v1", "B.v1", "C.v1"]);
    }

    #[tokio::test]
    async fn in_memory_store_rejects_stale_version() {
        let store = InMemoryEventStore::new();
        let stream = StreamId::new("machine-ledger");
        let _ = store.append_events(stream.clone(), None, vec![event("A.v1")]).await;

        let result = store
            .append_events(stream.clone(), Some(Version::INITIAL), vec![event("B.v1")])
            .await;
        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { actual, .. }) if actual == Version::new(1)
        ));
        assert_eq!(store.len(&stream), 1);
    }

    #[tokio::test]
    async fn failing_store_fails_once_successes_run_out() {
        let store = FailingEventStore::fail_after(1);
        let stream = StreamId::new("machine-ledger");

        assert!(store.append_events(stream.clone(), None, vec![event("A.v1")]).await.is_ok());
        assert!(store.append_events(stream.clone(), None, vec![event("B.v1")]).await.is_err());
        assert_eq!(store.inner().len(&stream), 1);
    }
}
