//! Basket directory projection: the read model behind discovery and the
//! basket read endpoints.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use lastbasket_baskets::{BASKET_AGGREGATE_TYPE, BasketEvent, BasketId, BasketStatus};
use lastbasket_core::AggregateId;
use lastbasket_core::UserId;
use lastbasket_discovery::BasketReadModel;
use lastbasket_events::EventEnvelope;

use crate::read_model::ReadStore;

use super::ProjectionError;

/// Maintains one `BasketReadModel` row per live basket.
///
/// Consumes published envelopes; idempotent for at-least-once delivery
/// (replays at or below the per-aggregate cursor are ignored). Rows are
/// disposable and rebuildable from the event stream.
#[derive(Debug)]
pub struct BasketDirectoryProjection<S>
where
    S: ReadStore<BasketId, BasketReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> BasketDirectoryProjection<S>
where
    S: ReadStore<BasketId, BasketReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, basket_id: &BasketId) -> Option<BasketReadModel> {
        self.store.get(basket_id)
    }

    pub fn list(&self) -> Vec<BasketReadModel> {
        self.store.list()
    }

    pub fn by_dealer(&self, dealer_id: &UserId) -> Vec<BasketReadModel> {
        self.store
            .list()
            .into_iter()
            .filter(|row| row.dealer_id == *dealer_id)
            .collect()
    }

    /// Apply a published envelope. Envelopes for other aggregate types are
    /// ignored so the projection can share a bus subscription.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != BASKET_AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let Ok(mut cursors) = self.cursors.write() else {
            return Ok(());
        };
        let last = *cursors.get(&aggregate_id).unwrap_or(&0);
        if seq <= last {
            // Duplicate or replay; safe to ignore.
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: BasketEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        self.apply_event(aggregate_id, &event);
        cursors.insert(aggregate_id, seq);
        Ok(())
    }

    fn apply_event(&self, basket_id: BasketId, event: &BasketEvent) {
        match event {
            BasketEvent::Created(e) => {
                self.store.upsert(
                    basket_id,
                    BasketReadModel {
                        basket_id: e.basket_id,
                        dealer_id: e.dealer_id,
                        name: e.name.clone(),
                        description: e.description.clone(),
                        category: e.category,
                        price_cents: e.price_cents,
                        original_price_cents: e.original_price_cents,
                        pickup: e.pickup.clone(),
                        images: e.images.clone(),
                        tags: e.tags.clone(),
                        total_quantity: e.total_quantity,
                        remaining_quantity: e.total_quantity,
                        is_available: false,
                        status: BasketStatus::Draft,
                        rating_average: None,
                        rating_count: 0,
                        views: 0,
                        created_at: e.occurred_at,
                        expires_at: e.expires_at,
                    },
                );
            }
            BasketEvent::Deleted(_) => {
                self.store.remove(&basket_id);
            }
            other => {
                let Some(mut row) = self.store.get(&basket_id) else {
                    return;
                };
                match other {
                    BasketEvent::StatusChanged(e) => {
                        row.status = e.to;
                        row.is_available =
                            e.to == BasketStatus::Active && row.remaining_quantity > 0;
                    }
                    BasketEvent::UnitsReserved(e) => {
                        row.remaining_quantity = e.remaining_after;
                        if e.remaining_after == 0 {
                            row.status = BasketStatus::SoldOut;
                            row.is_available = false;
                        }
                    }
                    BasketEvent::UnitsReleased(e) => {
                        row.remaining_quantity = e.remaining_after.min(row.total_quantity);
                        if row.status == BasketStatus::SoldOut && row.remaining_quantity > 0 {
                            row.status = BasketStatus::Active;
                            row.is_available = true;
                        }
                    }
                    BasketEvent::ViewsIncremented(_) => {
                        row.views += 1;
                    }
                    BasketEvent::Rated(e) => {
                        let count = row.rating_count;
                        let sum = row.rating_average.unwrap_or(0.0) * f64::from(count);
                        row.rating_count = count + 1;
                        row.rating_average =
                            Some((sum + f64::from(e.value)) / f64::from(count + 1));
                    }
                    BasketEvent::Expired(_) => {
                        row.status = BasketStatus::Expired;
                        row.is_available = false;
                    }
                    // Handled by the outer match.
                    BasketEvent::Created(_) | BasketEvent::Deleted(_) => {}
                }
                self.store.upsert(basket_id, row);
            }
        }
    }

    /// Rebuild from scratch by replaying envelopes in stream order.
    pub fn rebuild(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }
        self.store.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use lastbasket_baskets::{
        BasketCreated, BasketRated, Category, UnitsReserved, ViewsIncremented,
    };
    use std::sync::Arc;
    use uuid::Uuid;

    use crate::read_model::InMemoryReadStore;

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn envelope(basket_id: BasketId, seq: u64, event: &BasketEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            basket_id,
            BASKET_AGGREGATE_TYPE,
            seq,
            "test",
            serde_json::to_value(event).unwrap(),
        )
    }

    fn created(basket_id: BasketId) -> BasketEvent {
        BasketEvent::Created(BasketCreated {
            basket_id,
            dealer_id: UserId::new(),
            name: "leftover lunch box".into(),
            description: String::new(),
            category: Category::Meals,
            price_cents: 350,
            original_price_cents: 900,
            total_quantity: 4,
            pickup: None,
            images: vec![],
            tags: vec![],
            expires_at: t0() + Duration::days(7),
            occurred_at: t0(),
        })
    }

    fn projection() -> BasketDirectoryProjection<Arc<InMemoryReadStore<BasketId, BasketReadModel>>>
    {
        BasketDirectoryProjection::new(Arc::new(InMemoryReadStore::new()))
    }

    #[test]
    fn creation_then_reservation_updates_the_row() {
        let projection = projection();
        let id = BasketId::new();

        projection.apply_envelope(&envelope(id, 1, &created(id))).unwrap();
        projection
            .apply_envelope(&envelope(
                id,
                2,
                &BasketEvent::UnitsReserved(UnitsReserved {
                    quantity: 4,
                    remaining_after: 0,
                    occurred_at: t0(),
                }),
            ))
            .unwrap();

        let row = projection.get(&id).unwrap();
        assert_eq!(row.remaining_quantity, 0);
        assert_eq!(row.status, BasketStatus::SoldOut);
        assert!(!row.is_available);
    }

    #[test]
    fn replayed_envelopes_are_ignored() {
        let projection = projection();
        let id = BasketId::new();

        projection.apply_envelope(&envelope(id, 1, &created(id))).unwrap();
        let views = envelope(
            id,
            2,
            &BasketEvent::ViewsIncremented(ViewsIncremented { occurred_at: t0() }),
        );
        projection.apply_envelope(&views).unwrap();
        projection.apply_envelope(&views).unwrap(); // duplicate delivery

        assert_eq!(projection.get(&id).unwrap().views, 1);
    }

    #[test]
    fn gaps_in_the_stream_are_rejected() {
        let projection = projection();
        let id = BasketId::new();

        projection.apply_envelope(&envelope(id, 1, &created(id))).unwrap();
        let err = projection
            .apply_envelope(&envelope(
                id,
                3,
                &BasketEvent::ViewsIncremented(ViewsIncremented { occurred_at: t0() }),
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::NonMonotonicSequence { last: 1, found: 3 }
        ));
    }

    #[test]
    fn ratings_average_incrementally() {
        let projection = projection();
        let id = BasketId::new();

        projection.apply_envelope(&envelope(id, 1, &created(id))).unwrap();
        for (seq, value) in [(2u64, 5u8), (3, 4), (4, 3)] {
            projection
                .apply_envelope(&envelope(
                    id,
                    seq,
                    &BasketEvent::Rated(BasketRated {
                        value,
                        occurred_at: t0(),
                    }),
                ))
                .unwrap();
        }

        let row = projection.get(&id).unwrap();
        assert_eq!(row.rating_count, 3);
        assert!((row.rating_average.unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn deletion_removes_the_row_and_rebuild_restores_state() {
        let projection = projection();
        let id = BasketId::new();
        let create_env = envelope(id, 1, &created(id));

        projection.apply_envelope(&create_env).unwrap();
        projection
            .apply_envelope(&envelope(
                id,
                2,
                &BasketEvent::Deleted(lastbasket_baskets::BasketDeleted { occurred_at: t0() }),
            ))
            .unwrap();
        assert!(projection.get(&id).is_none());

        projection.rebuild(vec![create_env]).unwrap();
        assert!(projection.get(&id).is_some());
    }
}
