//! Basket Inventory Manager.
//!
//! Owns basket records and the atomic reserve/release of remaining quantity.
//! The `Basket` aggregate is pure decision logic; serialization of concurrent
//! reservations happens at the event-store append (see the infra crate).

pub mod basket;
pub mod types;

pub use basket::{
    Basket, BasketCommand, BasketCreated, BasketDeleted, BasketEvent, BasketExpired, BasketId,
    BasketRated, BasketStatusChanged, CreateBasket, DeleteBasket, ExpireBasket, IncrementViews,
    RateBasket, ReleaseUnits, ReservationReceipt, ReserveUnits, SetBasketStatus, UnitsReleased,
    UnitsReserved, ViewsIncremented,
};
pub use types::{BasketStatus, Category, GeoPoint, PickupWindow};

/// Aggregate type identifier used in event streams and envelopes.
pub const BASKET_AGGREGATE_TYPE: &str = "basket";

/// Default basket lifetime when the dealer does not pass an expiry.
pub const DEFAULT_EXPIRY_DAYS: i64 = 7;
