//! Shared application services: event store, bus, dispatcher, projections,
//! the expiry sweeper, and the realtime broadcast channel.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;

use lastbasket_baskets::{BASKET_AGGREGATE_TYPE, BasketId};
use lastbasket_discovery::BasketReadModel;
use lastbasket_events::{EventBus, EventEnvelope, InMemoryEventBus};
use lastbasket_infra::{
    BasketDirectoryProjection, CommandDispatcher, ExpirySweeper, InMemoryEventStore,
    InMemoryReadStore, OrderBoardProjection, OrderReadModel, SweeperHandle,
};
use lastbasket_orders::{ORDER_AGGREGATE_TYPE, OrderId};

pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;
pub type BasketDirectory =
    BasketDirectoryProjection<Arc<InMemoryReadStore<BasketId, BasketReadModel>>>;
pub type OrderBoard = OrderBoardProjection<Arc<InMemoryReadStore<OrderId, OrderReadModel>>>;

/// One realtime notification: a topic plus the payload consumers render.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeMessage {
    pub topic: &'static str,
    pub payload: JsonValue,
}

pub struct AppServices {
    pub dispatcher: Arc<Dispatcher>,
    pub baskets: Arc<BasketDirectory>,
    pub orders: Arc<OrderBoard>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    // Keeps the sweep thread's shutdown channel alive for the process lifetime.
    _sweeper: SweeperHandle,
}

impl AppServices {
    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }
}

/// Wire up the in-memory infrastructure and start the background consumers.
///
/// Must run inside a tokio runtime (the bus subscriber is a blocking task).
pub fn build_services(sweep_interval: Duration) -> Arc<AppServices> {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    let baskets: Arc<BasketDirectory> =
        Arc::new(BasketDirectoryProjection::new(Arc::new(InMemoryReadStore::new())));
    let orders: Arc<OrderBoard> =
        Arc::new(OrderBoardProjection::new(Arc::new(InMemoryReadStore::new())));

    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    // Background subscriber: bus -> projections -> realtime fan-out.
    {
        let sub = bus.subscribe();
        let baskets = baskets.clone();
        let orders = orders.clone();
        let realtime_tx = realtime_tx.clone();
        tokio::task::spawn_blocking(move || {
            loop {
                match sub.recv() {
                    Ok(env) => {
                        if let Err(e) = baskets.apply_envelope(&env) {
                            tracing::warn!("basket projection apply failed: {e}");
                            continue;
                        }
                        if let Err(e) = orders.apply_envelope(&env) {
                            tracing::warn!("order projection apply failed: {e}");
                            continue;
                        }
                        if let Some(message) = realtime_message(&env, &baskets, &orders) {
                            // Lossy; no backpressure on the command path.
                            let _ = realtime_tx.send(message);
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }

    let dispatcher: Arc<Dispatcher> = Arc::new(CommandDispatcher::new(store, bus));
    let sweeper = ExpirySweeper::new(dispatcher.clone(), baskets.clone()).spawn(sweep_interval);

    Arc::new(AppServices {
        dispatcher,
        baskets,
        orders,
        realtime_tx,
        _sweeper: sweeper,
    })
}

/// Map a committed envelope to its notification topic and payload.
///
/// Update topics carry the full refreshed read model; deletion carries the
/// id only (the row is already gone).
fn realtime_message(
    env: &EventEnvelope<JsonValue>,
    baskets: &BasketDirectory,
    orders: &OrderBoard,
) -> Option<RealtimeMessage> {
    if env.aggregate_type() == BASKET_AGGREGATE_TYPE {
        let topic = match env.event_type() {
            "basket.created" => "basket_created",
            "basket.deleted" => "basket_deleted",
            "basket.status_changed" | "basket.expired" => "basket_status_updated",
            _ => "basket_updated",
        };
        let payload = if topic == "basket_deleted" {
            serde_json::json!({ "id": env.aggregate_id().to_string() })
        } else {
            serde_json::to_value(baskets.get(&env.aggregate_id())?).ok()?
        };
        return Some(RealtimeMessage { topic, payload });
    }

    if env.aggregate_type() == ORDER_AGGREGATE_TYPE {
        let topic = match env.event_type() {
            "order.created" => "order_created",
            "order.status_changed" | "order.cancelled" => "order_status_updated",
            _ => "order_updated",
        };
        let payload = serde_json::to_value(orders.get(&env.aggregate_id())?).ok()?;
        return Some(RealtimeMessage { topic, payload });
    }

    None
}
