//! Geospatial Discovery Service.
//!
//! Read-only queries over projected basket rows. Results are served from the
//! read model without locks and may be momentarily stale; a basket returned
//! here can still fail reservation with `InsufficientInventory` a moment
//! later, which callers treat as routine.

pub mod geo;
pub mod query;
pub mod read_model;

pub use geo::{EARTH_RADIUS_KM, haversine_km, round2};
pub use query::{BasketWithDistance, DiscoveryFilters, NearbyQuery, SortBy, find_nearby, search};
pub use read_model::BasketReadModel;
