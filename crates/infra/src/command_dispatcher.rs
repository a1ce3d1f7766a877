//! Command execution pipeline.
//!
//! The dispatcher orchestrates the event-sourcing lifecycle for a command:
//!
//! ```text
//! load stream -> rehydrate -> handle (pure) -> append (optimistic) -> publish
//! ```
//!
//! Concurrency is handled at the append: the store checks the expected stream
//! version under its write exclusion, so two racing commands against the same
//! aggregate cannot both commit. `dispatch_retrying` reloads and re-decides on
//! a version race, which is what makes "decrement iff remaining ≥ requested"
//! an atomic decision rather than a read-then-write pair.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use lastbasket_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use lastbasket_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

/// Upper bound on reload-and-retry attempts after a version race. Every lost
/// race means another command committed, so a contended workload still
/// terminates well within this bound.
pub const MAX_DISPATCH_ATTEMPTS: usize = 32;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("optimistic concurrency failure: {0}")]
    Concurrency(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("insufficient inventory: requested {requested}, remaining {remaining}")]
    InsufficientInventory { requested: u32, remaining: u32 },

    #[error("basket unavailable: {0}")]
    BasketUnavailable(String),

    #[error("illegal transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Publication failed after a successful append (at-least-once; the
    /// events are persisted and can be republished).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                DispatchError::Validation(msg)
            }
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::InsufficientInventory { requested, remaining } => {
                DispatchError::InsufficientInventory { requested, remaining }
            }
            DomainError::BasketUnavailable(msg) => DispatchError::BasketUnavailable(msg),
            DomainError::IllegalTransition { from, to } => {
                DispatchError::IllegalTransition { from, to }
            }
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
        }
    }
}

impl DispatchError {
    pub fn is_concurrency(&self) -> bool {
        matches!(self, DispatchError::Concurrency(_))
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and bus so tests run fully in memory and durable
/// backends can be swapped in without touching domain code.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch one command against one aggregate.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: lastbasket_events::Event + Serialize + DeserializeOwned,
    {
        let (append, _) =
            self.decide::<A>(aggregate_id, aggregate_type, command, &make_aggregate)?;
        if append.events.is_empty() {
            return Ok(vec![]);
        }

        let committed = self.store.append(append.events, append.expected_version)?;
        self.publish(&committed)?;
        Ok(committed)
    }

    /// Dispatch with bounded reload-and-retry on optimistic concurrency
    /// failures. Domain errors are never retried.
    pub fn dispatch_retrying<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: lastbasket_events::Event + Serialize + DeserializeOwned,
    {
        let mut last = None;
        for attempt in 1..=MAX_DISPATCH_ATTEMPTS {
            match self.dispatch::<A>(aggregate_id, aggregate_type, command, &make_aggregate) {
                Err(err) if err.is_concurrency() => {
                    debug!(%aggregate_id, attempt, "version race, retrying dispatch");
                    last = Some(err);
                }
                other => return other,
            }
        }
        warn!(%aggregate_id, "dispatch retry budget exhausted");
        Err(last.unwrap_or_else(|| DispatchError::Concurrency("retry budget exhausted".into())))
    }

    /// Dispatch two commands against two aggregates as one atomic unit: both
    /// event batches commit in a single multi-stream append or neither does.
    ///
    /// Used for order creation (order + reservation) and cancellation/refund
    /// (order status + inventory release).
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch_pair<A1, A2>(
        &self,
        first_id: AggregateId,
        first_type: &str,
        first_command: &A1::Command,
        make_first: impl Fn(AggregateId) -> A1,
        second_id: AggregateId,
        second_type: &str,
        second_command: &A2::Command,
        make_second: impl Fn(AggregateId) -> A2,
    ) -> Result<(Vec<StoredEvent>, Vec<StoredEvent>), DispatchError>
    where
        A1: Aggregate<Error = DomainError>,
        A1::Event: lastbasket_events::Event + Serialize + DeserializeOwned,
        A2: Aggregate<Error = DomainError>,
        A2::Event: lastbasket_events::Event + Serialize + DeserializeOwned,
    {
        if first_id == second_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "pair dispatch requires two distinct aggregates".to_string(),
            )));
        }

        let (first_append, _) =
            self.decide::<A1>(first_id, first_type, first_command, &make_first)?;
        let (second_append, _) =
            self.decide::<A2>(second_id, second_type, second_command, &make_second)?;

        let committed = self
            .store
            .append_multi(vec![first_append, second_append])?;
        self.publish(&committed)?;

        let (first_events, second_events) = committed
            .into_iter()
            .partition(|e| e.aggregate_id == first_id);
        Ok((first_events, second_events))
    }

    /// `dispatch_pair` with the same bounded retry loop as `dispatch_retrying`.
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch_pair_retrying<A1, A2>(
        &self,
        first_id: AggregateId,
        first_type: &str,
        first_command: &A1::Command,
        make_first: impl Fn(AggregateId) -> A1,
        second_id: AggregateId,
        second_type: &str,
        second_command: &A2::Command,
        make_second: impl Fn(AggregateId) -> A2,
    ) -> Result<(Vec<StoredEvent>, Vec<StoredEvent>), DispatchError>
    where
        A1: Aggregate<Error = DomainError>,
        A1::Event: lastbasket_events::Event + Serialize + DeserializeOwned,
        A2: Aggregate<Error = DomainError>,
        A2::Event: lastbasket_events::Event + Serialize + DeserializeOwned,
    {
        let mut last = None;
        for attempt in 1..=MAX_DISPATCH_ATTEMPTS {
            match self.dispatch_pair::<A1, A2>(
                first_id,
                first_type,
                first_command,
                &make_first,
                second_id,
                second_type,
                second_command,
                &make_second,
            ) {
                Err(err) if err.is_concurrency() => {
                    debug!(%first_id, %second_id, attempt, "version race, retrying pair dispatch");
                    last = Some(err);
                }
                other => return other,
            }
        }
        warn!(%first_id, %second_id, "pair dispatch retry budget exhausted");
        Err(last.unwrap_or_else(|| DispatchError::Concurrency("retry budget exhausted".into())))
    }

    /// Load, rehydrate, and decide; returns the uncommitted batch with the
    /// version expectation the decision was taken against.
    fn decide<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: &impl Fn(AggregateId) -> A,
    ) -> Result<(StreamAppend, A), DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: lastbasket_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        let decided = aggregate.handle(command).map_err(DispatchError::from)?;
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((
            StreamAppend {
                expected_version: expected,
                events: uncommitted,
            },
            aggregate,
        ))
    }

    fn publish(&self, committed: &[StoredEvent]) -> Result<(), DispatchError> {
        for stored in committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }
        Ok(())
    }
}

/// Load and rehydrate an aggregate's current state straight from the event
/// store.
///
/// Command handlers that need another aggregate's state (the basket behind
/// an order, the order behind a cancellation) use this instead of the
/// read-side projections: projections are fed asynchronously and may not
/// have caught up with a write that is already committed.
pub fn load_aggregate<S, A>(
    store: &S,
    aggregate_id: AggregateId,
    make_aggregate: impl Fn(AggregateId) -> A,
) -> Result<A, DispatchError>
where
    S: EventStore,
    A: Aggregate<Error = DomainError>,
    A::Event: DeserializeOwned,
{
    let history = store.load_stream(aggregate_id)?;
    validate_loaded_stream(aggregate_id, &history)?;
    let mut aggregate = make_aggregate(aggregate_id);
    apply_history::<A>(&mut aggregate, &history)?;
    Ok(aggregate)
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Defense against a buggy backend: right stream, strictly increasing.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
