//! Order board projection: denormalized order rows for client and dealer
//! listings.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use lastbasket_core::{ActorRole, AggregateId, UserId};
use lastbasket_events::EventEnvelope;
use lastbasket_orders::{
    CancellationInfo, ORDER_AGGREGATE_TYPE, OrderEvent, OrderId, OrderItem, OrderMessage,
    OrderStatus, PaymentInfo, PriceSnapshot, Pricing, Rating,
};

use crate::read_model::ReadStore;

use super::ProjectionError;

/// One order as the read side sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReadModel {
    pub order_id: OrderId,
    pub order_number: String,
    pub client_id: UserId,
    pub dealer_id: UserId,
    pub basket_id: AggregateId,
    pub items: Vec<OrderItem>,
    pub payment: PaymentInfo,
    pub price_snapshot: PriceSnapshot,
    pub pricing: Pricing,
    pub status: OrderStatus,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub actual_pickup_time: Option<DateTime<Utc>>,
    pub messages: Vec<OrderMessage>,
    pub client_rating: Option<Rating>,
    pub dealer_rating: Option<Rating>,
    pub cancellation: Option<CancellationInfo>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct OrderBoardProjection<S>
where
    S: ReadStore<OrderId, OrderReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> OrderBoardProjection<S>
where
    S: ReadStore<OrderId, OrderReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, order_id: &OrderId) -> Option<OrderReadModel> {
        self.store.get(order_id)
    }

    pub fn by_client(&self, client_id: &UserId) -> Vec<OrderReadModel> {
        self.filtered(|row| row.client_id == *client_id)
    }

    pub fn by_dealer(&self, dealer_id: &UserId) -> Vec<OrderReadModel> {
        self.filtered(|row| row.dealer_id == *dealer_id)
    }

    fn filtered(&self, pred: impl Fn(&OrderReadModel) -> bool) -> Vec<OrderReadModel> {
        let mut rows: Vec<_> = self.store.list().into_iter().filter(pred).collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != ORDER_AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let Ok(mut cursors) = self.cursors.write() else {
            return Ok(());
        };
        let last = *cursors.get(&aggregate_id).unwrap_or(&0);
        if seq <= last {
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: OrderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        self.apply_event(aggregate_id, &event);
        cursors.insert(aggregate_id, seq);
        Ok(())
    }

    fn apply_event(&self, order_id: OrderId, event: &OrderEvent) {
        if let OrderEvent::Created(e) = event {
            self.store.upsert(
                order_id,
                OrderReadModel {
                    order_id: e.order_id,
                    order_number: e.order_number.clone(),
                    client_id: e.client_id,
                    dealer_id: e.dealer_id,
                    basket_id: e.basket_id,
                    items: e.items.clone(),
                    payment: e.payment.clone(),
                    price_snapshot: e.price_snapshot,
                    pricing: e.pricing.clone(),
                    status: OrderStatus::Pending,
                    scheduled_date: e.scheduled_date,
                    scheduled_time: e.scheduled_time,
                    actual_pickup_time: None,
                    messages: Vec::new(),
                    client_rating: None,
                    dealer_rating: None,
                    cancellation: None,
                    created_at: e.occurred_at,
                },
            );
            return;
        }

        let Some(mut row) = self.store.get(&order_id) else {
            return;
        };
        match event {
            OrderEvent::Created(_) => {}
            OrderEvent::StatusChanged(e) => {
                row.status = e.to;
                if e.to == OrderStatus::PickedUp {
                    row.actual_pickup_time = Some(e.occurred_at);
                }
                if let Some(notes) = &e.notes {
                    row.messages.push(OrderMessage {
                        author_role: e.changed_by,
                        body: notes.clone(),
                        at: e.occurred_at,
                    });
                }
            }
            OrderEvent::Cancelled(e) => {
                row.status = e.to;
                row.cancellation = Some(e.cancellation.clone());
                if let Some(notes) = &e.notes {
                    row.messages.push(OrderMessage {
                        author_role: e.cancellation.cancelled_by,
                        body: notes.clone(),
                        at: e.occurred_at,
                    });
                }
            }
            OrderEvent::Rated(e) => {
                let rating = Rating {
                    value: e.value,
                    comment: e.comment.clone(),
                };
                match e.rater_role {
                    ActorRole::Client => row.client_rating = Some(rating),
                    ActorRole::Dealer => row.dealer_rating = Some(rating),
                    ActorRole::System => {}
                }
            }
            OrderEvent::MessageLogged(e) => {
                row.messages.push(OrderMessage {
                    author_role: e.author_role,
                    body: e.body.clone(),
                    at: e.occurred_at,
                });
            }
        }
        self.store.upsert(order_id, row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lastbasket_orders::{OrderCancelled, OrderCreated, OrderStatusChanged, PaymentMethod};
    use std::sync::Arc;
    use uuid::Uuid;

    use crate::read_model::InMemoryReadStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn envelope(order_id: OrderId, seq: u64, event: &OrderEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            order_id,
            ORDER_AGGREGATE_TYPE,
            seq,
            "test",
            serde_json::to_value(event).unwrap(),
        )
    }

    fn created(order_id: OrderId, client: UserId, dealer: UserId) -> OrderEvent {
        let basket = AggregateId::new();
        OrderEvent::Created(OrderCreated {
            order_id,
            order_number: "ORD-20250601-f00d42".into(),
            client_id: client,
            dealer_id: dealer,
            basket_id: basket,
            items: vec![OrderItem {
                basket_id: basket,
                name: "mystery produce box".into(),
                unit_price_cents: 600,
                quantity: 1,
            }],
            payment: PaymentInfo {
                method: PaymentMethod::Cash,
                status: None,
                transaction_id: None,
            },
            price_snapshot: PriceSnapshot {
                basket_price_cents: 600,
                basket_original_price_cents: 1500,
            },
            pricing: Pricing {
                subtotal_cents: 600,
                tax_cents: 60,
                service_fee_cents: 50,
                total_cents: 710,
                currency: "EUR".into(),
            },
            scheduled_date: t0().date_naive(),
            scheduled_time: chrono::NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            occurred_at: t0(),
        })
    }

    fn projection() -> OrderBoardProjection<Arc<InMemoryReadStore<OrderId, OrderReadModel>>> {
        OrderBoardProjection::new(Arc::new(InMemoryReadStore::new()))
    }

    #[test]
    fn listings_are_scoped_to_the_requesting_party() {
        let projection = projection();
        let client = UserId::new();
        let dealer = UserId::new();
        let order_a = OrderId::new();
        let order_b = OrderId::new();

        projection
            .apply_envelope(&envelope(order_a, 1, &created(order_a, client, dealer)))
            .unwrap();
        projection
            .apply_envelope(&envelope(order_b, 1, &created(order_b, UserId::new(), dealer)))
            .unwrap();

        assert_eq!(projection.by_client(&client).len(), 1);
        assert_eq!(projection.by_dealer(&dealer).len(), 2);
    }

    #[test]
    fn status_and_cancellation_flow_into_the_row() {
        let projection = projection();
        let client = UserId::new();
        let dealer = UserId::new();
        let order_id = OrderId::new();

        projection
            .apply_envelope(&envelope(order_id, 1, &created(order_id, client, dealer)))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                order_id,
                2,
                &OrderEvent::StatusChanged(OrderStatusChanged {
                    from: OrderStatus::Pending,
                    to: OrderStatus::Confirmed,
                    changed_by: ActorRole::Dealer,
                    notes: Some("see you at six".into()),
                    occurred_at: t0(),
                }),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                order_id,
                3,
                &OrderEvent::Cancelled(OrderCancelled {
                    from: OrderStatus::Confirmed,
                    to: OrderStatus::Cancelled,
                    cancellation: CancellationInfo {
                        reason: "client no-show".into(),
                        cancelled_by: ActorRole::Dealer,
                        refund_amount_cents: Some(710),
                    },
                    notes: None,
                    occurred_at: t0(),
                }),
            ))
            .unwrap();

        let row = projection.get(&order_id).unwrap();
        assert_eq!(row.status, OrderStatus::Cancelled);
        assert_eq!(row.messages.len(), 1);
        assert_eq!(row.cancellation.as_ref().unwrap().reason, "client no-show");
    }

    #[test]
    fn duplicate_deliveries_do_not_double_apply() {
        let projection = projection();
        let order_id = OrderId::new();
        let env = envelope(order_id, 1, &created(order_id, UserId::new(), UserId::new()));

        projection.apply_envelope(&env).unwrap();
        projection.apply_envelope(&env).unwrap();

        assert_eq!(projection.by_dealer(&projection.get(&order_id).unwrap().dealer_id).len(), 1);
    }
}
