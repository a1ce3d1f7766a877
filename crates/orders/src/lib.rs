//! Order Lifecycle Controller.
//!
//! Orders move through a fixed pickup pipeline
//! (`pending -> confirmed -> preparing -> ready_for_pickup -> picked_up -> completed`)
//! with cancellation and refund branches. Every transition is gated by a
//! central rule table: which target states are reachable from where, and
//! which actor role may drive each edge.

pub mod order;

pub use order::{
    CancellationInfo, CreateOrder, LogMessage, MessageLogged, Order, OrderCancelled,
    OrderCommand, OrderCreated, OrderEvent, OrderId, OrderItem, OrderMessage, OrderRated,
    OrderStatus, OrderStatusChanged, PaymentInfo, PaymentMethod, PriceSnapshot, Pricing,
    RateOrder, Rating, RoleRule, TransitionStatus, transition_rule,
};

/// Aggregate type identifier used in event streams and envelopes.
pub const ORDER_AGGREGATE_TYPE: &str = "order";
