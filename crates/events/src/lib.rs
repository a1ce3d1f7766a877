//! Domain event abstractions: the `Event` trait, envelopes, and the pub/sub
//! bus used to fan committed events out to projections and the external
//! notification collaborator.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
