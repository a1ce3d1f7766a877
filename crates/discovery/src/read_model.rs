//! Denormalized basket row maintained by the basket projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lastbasket_baskets::{BasketId, BasketStatus, Category, GeoPoint, PickupWindow};
use lastbasket_core::UserId;

/// One basket as the read side sees it. Disposable: rebuilt from the event
/// stream by replaying the projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketReadModel {
    pub basket_id: BasketId,
    pub dealer_id: UserId,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub price_cents: u64,
    pub original_price_cents: u64,
    pub pickup: Option<PickupWindow>,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub total_quantity: u32,
    pub remaining_quantity: u32,
    pub is_available: bool,
    pub status: BasketStatus,
    pub rating_average: Option<f64>,
    pub rating_count: u32,
    pub views: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl BasketReadModel {
    pub fn coordinates(&self) -> Option<GeoPoint> {
        self.pickup.as_ref().and_then(|p| p.coordinates)
    }

    /// Whether this basket shows up in discovery results at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == BasketStatus::Active
            && self.is_available
            && self.remaining_quantity > 0
            && now < self.expires_at
            && self.coordinates().is_some()
    }
}
