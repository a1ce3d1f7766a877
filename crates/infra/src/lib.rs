//! Infrastructure: event store, command dispatch, read models, projections,
//! and the expiry sweeper.
//!
//! Domain crates stay pure; everything stateful lives here behind traits so
//! the in-memory implementations used in tests and dev can later be swapped
//! for durable backends.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod sweeper;


pub use command_dispatcher::{
    CommandDispatcher, DispatchError, MAX_DISPATCH_ATTEMPTS, load_aggregate,
};
pub use event_store::{
    EventStore, EventStoreError, InMemoryEventStore, StoredEvent, StreamAppend, UncommittedEvent,
};
pub use projections::{
    BasketDirectoryProjection, OrderBoardProjection, OrderReadModel, ProjectionError,
};
pub use read_model::{InMemoryReadStore, ReadStore};
pub use sweeper::{ExpirySweeper, SweeperHandle};
