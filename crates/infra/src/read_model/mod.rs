mod store;

pub use store::{InMemoryReadStore, ReadStore};
