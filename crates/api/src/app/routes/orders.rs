use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};

use lastbasket_baskets::{
    BASKET_AGGREGATE_TYPE, Basket, BasketCommand, BasketEvent, ReleaseUnits, ReservationReceipt,
    ReserveUnits,
};
use lastbasket_core::{AggregateId, UserId};
use lastbasket_infra::{StoredEvent, load_aggregate};
use lastbasket_orders::{
    CreateOrder, ORDER_AGGREGATE_TYPE, Order, OrderCommand, OrderId, OrderItem, OrderStatus,
    PaymentInfo, PaymentMethod, PriceSnapshot, RateOrder, TransitionStatus,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::config::Config;
use crate::context::Principal;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/transition", post(transition_order))
        .route("/:id/rate", post(rate_order))
}

async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(config): Extension<Arc<Config>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    if !principal.is_client() {
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "unauthorized",
            "only clients can place orders",
        );
    }

    let basket_id: AggregateId = match body.basket_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid basket id"),
    };
    // Rehydrate from the event store, not the projection: the read side is
    // fed asynchronously and may not have seen a just-created basket yet.
    let basket = match load_aggregate(services.dispatcher.store(), basket_id, Basket::empty) {
        Ok(b) => b,
        Err(e) => return errors::dispatch_error_to_response(e),
    };
    if !basket.is_created() || basket.is_deleted() {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "basket not found");
    }
    let Some(dealer_id) = basket.dealer_id().copied() else {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "basket not found");
    };

    if body.items.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "order must contain at least one item",
        );
    }

    let payment_method: PaymentMethod = match body.payment.method.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    // Collection window: request override, else the basket's pickup window.
    let (scheduled_date, scheduled_time) =
        match (body.scheduled_date, body.scheduled_time, basket.pickup()) {
            (Some(date), Some(time), _) => (date, time),
            (None, None, Some(pickup)) => (pickup.date, pickup.time),
            (None, None, None) => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    "basket has no pickup window; scheduled_date and scheduled_time are required",
                );
            }
            _ => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    "scheduled_date and scheduled_time must be provided together",
                );
            }
        };

    // Name and unit price are snapshotted from the live basket row; later
    // dealer edits never reprice an existing order.
    let items: Vec<OrderItem> = body
        .items
        .iter()
        .map(|item| OrderItem {
            basket_id,
            name: basket.name().to_string(),
            unit_price_cents: basket.price_cents(),
            quantity: item.quantity,
        })
        .collect();
    let quantity: u32 = items.iter().map(|i| i.quantity).sum();

    let order_id = OrderId::new();
    let now = Utc::now();
    let order_number = generate_order_number(order_id, now);

    let create = OrderCommand::Create(CreateOrder {
        order_id,
        order_number: order_number.clone(),
        client_id: principal.actor_id(),
        dealer_id,
        basket_id,
        items,
        payment: PaymentInfo {
            method: payment_method,
            status: body.payment.status,
            transaction_id: body.payment.transaction_id,
        },
        price_snapshot: PriceSnapshot {
            basket_price_cents: basket.price_cents(),
            basket_original_price_cents: basket.original_price_cents(),
        },
        tax_rate_bps: config.tax_rate_bps,
        service_fee_cents: config.service_fee_cents,
        currency: config.currency.clone(),
        scheduled_date,
        scheduled_time,
        occurred_at: now,
    });
    let reserve = BasketCommand::Reserve(ReserveUnits { quantity, occurred_at: now });

    // Order creation and its reservation commit together or not at all.
    let (order_events, basket_events) = match services.dispatcher.dispatch_pair_retrying(
        order_id,
        ORDER_AGGREGATE_TYPE,
        &create,
        Order::empty,
        basket_id,
        BASKET_AGGREGATE_TYPE,
        &reserve,
        Basket::empty,
    ) {
        Ok(v) => v,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": order_id.to_string(),
            "order_number": order_number,
            "status": OrderStatus::Pending.as_str(),
            "reservation": reservation_receipt(basket_id, &basket_events),
            "events_committed": order_events.len(),
        })),
    )
        .into_response()
}

/// Pull the reservation out of the committed basket events so the caller
/// sees how many units are left without a second read.
fn reservation_receipt(
    basket_id: AggregateId,
    basket_events: &[StoredEvent],
) -> Option<ReservationReceipt> {
    basket_events.iter().find_map(|stored| {
        match serde_json::from_value::<BasketEvent>(stored.payload.clone()) {
            Ok(BasketEvent::UnitsReserved(e)) => Some(ReservationReceipt {
                basket_id,
                quantity: e.quantity,
                remaining_after: e.remaining_after,
            }),
            _ => None,
        }
    })
}

async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"),
    };

    match services.orders.get(&order_id) {
        Some(row) => (StatusCode::OK, Json(row)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "order not found"),
    }
}

async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::OrderListingParams>,
) -> axum::response::Response {
    match (params.client_id, params.dealer_id) {
        (Some(raw), None) => {
            let client_id: UserId = match raw.parse() {
                Ok(v) => v,
                Err(_) => {
                    return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid client id");
                }
            };
            (StatusCode::OK, Json(services.orders.by_client(&client_id))).into_response()
        }
        (None, Some(raw)) => {
            let dealer_id: UserId = match raw.parse() {
                Ok(v) => v,
                Err(_) => {
                    return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid dealer id");
                }
            };
            (StatusCode::OK, Json(services.orders.by_dealer(&dealer_id))).into_response()
        }
        _ => errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "exactly one of client_id or dealer_id is required",
        ),
    }
}

async fn transition_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<dto::TransitionOrderRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"),
    };
    let target: OrderStatus = match body.target.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let now = Utc::now();
    let cmd = OrderCommand::Transition(TransitionStatus {
        actor_id: principal.actor_id(),
        actor_role: principal.role(),
        target,
        notes: body.notes,
        reason: body.reason,
        refund_amount_cents: body.refund_amount_cents,
        occurred_at: now,
    });

    let committed = if matches!(target, OrderStatus::Cancelled | OrderStatus::Refunded) {
        // The status write and the inventory release commit atomically;
        // if the transition is illegal nothing is released. The order is
        // rehydrated from the store so a cancel right after create never
        // 404s on a lagging projection.
        let order = match load_aggregate(services.dispatcher.store(), order_id, Order::empty) {
            Ok(o) => o,
            Err(e) => return errors::dispatch_error_to_response(e),
        };
        let Some(basket_id) = order.basket_id().copied() else {
            return errors::json_error(StatusCode::NOT_FOUND, "not_found", "order not found");
        };
        let release = BasketCommand::Release(ReleaseUnits {
            quantity: order.reserved_quantity(),
            occurred_at: now,
        });

        match services.dispatcher.dispatch_pair_retrying(
            order_id,
            ORDER_AGGREGATE_TYPE,
            &cmd,
            Order::empty,
            basket_id,
            BASKET_AGGREGATE_TYPE,
            &release,
            Basket::empty,
        ) {
            Ok((order_events, _basket_events)) => order_events,
            Err(e) => return errors::dispatch_error_to_response(e),
        }
    } else {
        match services.dispatcher.dispatch_retrying(
            order_id,
            ORDER_AGGREGATE_TYPE,
            &cmd,
            Order::empty,
        ) {
            Ok(c) => c,
            Err(e) => return errors::dispatch_error_to_response(e),
        }
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": order_id.to_string(),
            "status": target.as_str(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

async fn rate_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<dto::RateOrderRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"),
    };

    let cmd = OrderCommand::Rate(RateOrder {
        actor_id: principal.actor_id(),
        actor_role: principal.role(),
        value: body.value,
        comment: body.comment,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatcher.dispatch_retrying(
        order_id,
        ORDER_AGGREGATE_TYPE,
        &cmd,
        Order::empty,
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": order_id.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

/// Human-readable order number: date plus the tail of the order's uuid.
fn generate_order_number(order_id: OrderId, at: DateTime<Utc>) -> String {
    let hex = order_id.as_uuid().simple().to_string();
    format!(
        "ORD-{}-{}",
        at.format("%Y%m%d"),
        hex[hex.len() - 6..].to_uppercase()
    )
}
