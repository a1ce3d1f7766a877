use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use lastbasket_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

/// In-memory append-only event store.
///
/// All appends take the single write lock, which makes the optimistic version
/// check atomic with the append itself: that is the property the reservation
/// path relies on.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<AggregateId, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    /// Validate that a batch targets exactly one stream and return its key.
    fn batch_stream(events: &[UncommittedEvent]) -> Result<(AggregateId, &str), EventStoreError> {
        let aggregate_id = events[0].aggregate_id;
        let aggregate_type = events[0].aggregate_type.as_str();

        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        Ok((aggregate_id, aggregate_type))
    }

    /// Check version and type stability against the live stream.
    fn check_stream(
        stream: &[StoredEvent],
        aggregate_type: &str,
        expected_version: ExpectedVersion,
    ) -> Result<(), EventStoreError> {
        let current = Self::current_version(stream);
        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        Ok(())
    }

    fn push_batch(stream: &mut Vec<StoredEvent>, events: Vec<UncommittedEvent>) -> Vec<StoredEvent> {
        let mut next = Self::current_version(stream) + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            committed.push(stored);
        }
        committed
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let (aggregate_id, aggregate_type) = Self::batch_stream(&events)?;
        let aggregate_type = aggregate_type.to_string();

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        let stream = streams.entry(aggregate_id).or_default();
        Self::check_stream(stream, &aggregate_type, expected_version)?;

        Ok(Self::push_batch(stream, events))
    }

    fn append_multi(&self, appends: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        // Empty batches are dropped up front (a clamped release can decide
        // zero events while its paired status change still commits).
        let appends: Vec<StreamAppend> = appends
            .into_iter()
            .filter(|a| !a.events.is_empty())
            .collect();
        if appends.is_empty() {
            return Ok(vec![]);
        }

        let mut keys = Vec::with_capacity(appends.len());
        let mut seen = HashSet::new();
        for a in &appends {
            let (aggregate_id, aggregate_type) = Self::batch_stream(&a.events)?;
            if !seen.insert(aggregate_id) {
                return Err(EventStoreError::InvalidAppend(
                    "multi-append contains duplicate streams".to_string(),
                ));
            }
            keys.push((aggregate_id, aggregate_type.to_string()));
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        // Validate every stream before touching any of them.
        for (a, (aggregate_id, aggregate_type)) in appends.iter().zip(&keys) {
            let stream = streams.get(aggregate_id).map(Vec::as_slice).unwrap_or(&[]);
            Self::check_stream(stream, aggregate_type, a.expected_version)?;
        }

        let mut committed = Vec::new();
        for (a, (aggregate_id, _)) in appends.into_iter().zip(keys) {
            let stream = streams.entry(aggregate_id).or_default();
            committed.extend(Self::push_batch(stream, a.events));
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn uncommitted(aggregate_id: AggregateId, event_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: "basket".to_string(),
            event_type: event_type.to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({}),
        }
    }

    #[test]
    fn append_assigns_monotonic_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let first = store
            .append(vec![uncommitted(id, "basket.created")], ExpectedVersion::Exact(0))
            .unwrap();
        assert_eq!(first[0].sequence_number, 1);

        let second = store
            .append(
                vec![
                    uncommitted(id, "basket.units_reserved"),
                    uncommitted(id, "basket.units_reserved"),
                ],
                ExpectedVersion::Exact(1),
            )
            .unwrap();
        assert_eq!(second[0].sequence_number, 2);
        assert_eq!(second[1].sequence_number, 3);

        assert_eq!(store.load_stream(id).unwrap().len(), 3);
    }

    #[test]
    fn stale_expected_version_is_rejected() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        store
            .append(vec![uncommitted(id, "basket.created")], ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append(vec![uncommitted(id, "basket.rated")], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));

        // The failed append left the stream untouched.
        assert_eq!(store.load_stream(id).unwrap().len(), 1);
    }

    #[test]
    fn multi_append_commits_all_streams_or_none() {
        let store = InMemoryEventStore::new();
        let order = AggregateId::new();
        let basket = AggregateId::new();

        store
            .append(vec![uncommitted(basket, "basket.created")], ExpectedVersion::Exact(0))
            .unwrap();

        // Stale expectation on the basket stream poisons the whole unit.
        let err = store
            .append_multi(vec![
                StreamAppend {
                    expected_version: ExpectedVersion::Exact(0),
                    events: vec![uncommitted(order, "order.cancelled")],
                },
                StreamAppend {
                    expected_version: ExpectedVersion::Exact(0),
                    events: vec![uncommitted(basket, "basket.units_released")],
                },
            ])
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert!(store.load_stream(order).unwrap().is_empty());
        assert_eq!(store.load_stream(basket).unwrap().len(), 1);

        // Correct expectations commit both.
        let committed = store
            .append_multi(vec![
                StreamAppend {
                    expected_version: ExpectedVersion::Exact(0),
                    events: vec![uncommitted(order, "order.cancelled")],
                },
                StreamAppend {
                    expected_version: ExpectedVersion::Exact(1),
                    events: vec![uncommitted(basket, "basket.units_released")],
                },
            ])
            .unwrap();
        assert_eq!(committed.len(), 2);
        assert_eq!(store.load_stream(order).unwrap().len(), 1);
        assert_eq!(store.load_stream(basket).unwrap().len(), 2);
    }

    #[test]
    fn multi_append_skips_empty_batches() {
        let store = InMemoryEventStore::new();
        let order = AggregateId::new();

        let committed = store
            .append_multi(vec![
                StreamAppend {
                    expected_version: ExpectedVersion::Exact(0),
                    events: vec![uncommitted(order, "order.cancelled")],
                },
                StreamAppend {
                    expected_version: ExpectedVersion::Exact(0),
                    events: vec![],
                },
            ])
            .unwrap();
        assert_eq!(committed.len(), 1);
    }

    #[test]
    fn aggregate_type_is_stable_per_stream() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        store
            .append(vec![uncommitted(id, "basket.created")], ExpectedVersion::Exact(0))
            .unwrap();

        let mut foreign = uncommitted(id, "order.created");
        foreign.aggregate_type = "order".to_string();
        let err = store
            .append(vec![foreign], ExpectedVersion::Exact(1))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }
}
