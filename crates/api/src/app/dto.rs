//! Request DTOs for the HTTP surface.
//!
//! Responses are the read models themselves (or small json! literals), so
//! only the inbound shapes live here.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

use lastbasket_baskets::{Category, PickupWindow};

#[derive(Debug, Deserialize)]
pub struct CreateBasketRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    pub price_cents: u64,
    pub original_price_cents: u64,
    pub total_quantity: u32,
    #[serde(default)]
    pub pickup: Option<PickupWindow>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SetBasketStatusRequest {
    pub target: String,
}

#[derive(Debug, Deserialize)]
pub struct RateBasketRequest {
    pub value: u8,
}

#[derive(Debug, Deserialize)]
pub struct BasketListingParams {
    pub dealer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NearbyParams {
    pub lat: f64,
    pub lng: f64,
    pub radius_m: Option<u32>,
    pub category: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub limit: Option<usize>,
    pub sort_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_m: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub basket_id: String,
    pub items: Vec<OrderItemRequest>,
    pub payment: PaymentRequest,
    /// Overrides the basket's pickup window when set (both fields).
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub scheduled_time: Option<NaiveTime>,
}

/// Name and unit price are snapshotted server-side from the basket, so the
/// request only says how many units it wants.
#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub method: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionOrderRequest {
    pub target: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub refund_amount_cents: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RateOrderRequest {
    pub value: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderListingParams {
    pub client_id: Option<String>,
    pub dealer_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_basket_request_accepts_minimal_payload() {
        let req: CreateBasketRequest = serde_json::from_str(
            r#"{
                "name": "surprise bag",
                "category": "bakery",
                "price_cents": 350,
                "original_price_cents": 900,
                "total_quantity": 4
            }"#,
        )
        .unwrap();
        assert_eq!(req.category, Category::Bakery);
        assert!(req.pickup.is_none());
        assert!(req.images.is_empty());
    }

    #[test]
    fn create_order_request_parses_items_and_payment() {
        let req: CreateOrderRequest = serde_json::from_str(
            r#"{
                "basket_id": "0190a8b0-1111-7000-8000-000000000000",
                "items": [{"quantity": 2}],
                "payment": {"method": "card", "transaction_id": "tx-9"}
            }"#,
        )
        .unwrap();
        assert_eq!(req.items.len(), 1);
        assert_eq!(req.items[0].quantity, 2);
        assert_eq!(req.payment.method, "card");
        assert_eq!(req.payment.transaction_id.as_deref(), Some("tx-9"));
        assert!(req.scheduled_date.is_none());
    }
}
