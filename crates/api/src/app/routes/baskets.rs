use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use lastbasket_baskets::{
    BASKET_AGGREGATE_TYPE, Basket, BasketCommand, BasketId, BasketStatus, CreateBasket,
    DeleteBasket, IncrementViews, RateBasket, SetBasketStatus,
};
use lastbasket_core::UserId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::Principal;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_basket).get(list_baskets))
        .route("/:id", get(get_basket).delete(delete_basket))
        .route("/:id/status", post(set_status))
        .route("/:id/view", post(increment_views))
        .route("/:id/rate", post(rate_basket))
}

async fn create_basket(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<dto::CreateBasketRequest>,
) -> axum::response::Response {
    if !principal.is_dealer() {
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "unauthorized",
            "only dealers can list baskets",
        );
    }

    let basket_id = BasketId::new();
    let cmd = BasketCommand::Create(CreateBasket {
        basket_id,
        dealer_id: principal.actor_id(),
        name: body.name,
        description: body.description,
        category: body.category,
        price_cents: body.price_cents,
        original_price_cents: body.original_price_cents,
        total_quantity: body.total_quantity,
        pickup: body.pickup,
        images: body.images,
        tags: body.tags,
        expires_at: body.expires_at,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatcher.dispatch(
        basket_id,
        BASKET_AGGREGATE_TYPE,
        &cmd,
        Basket::empty,
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": basket_id.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

async fn get_basket(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let basket_id: BasketId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid basket id"),
    };

    match services.baskets.get(&basket_id) {
        Some(row) => (StatusCode::OK, Json(row)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "basket not found"),
    }
}

async fn list_baskets(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::BasketListingParams>,
) -> axum::response::Response {
    let Some(raw) = params.dealer_id else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "dealer_id query parameter is required",
        );
    };
    let dealer_id: UserId = match raw.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid dealer id"),
    };

    (StatusCode::OK, Json(services.baskets.by_dealer(&dealer_id))).into_response()
}

async fn set_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetBasketStatusRequest>,
) -> axum::response::Response {
    let basket_id: BasketId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid basket id"),
    };
    let status: BasketStatus = match body.target.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let cmd = BasketCommand::SetStatus(SetBasketStatus {
        actor_id: principal.actor_id(),
        actor_role: principal.role(),
        status,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatcher.dispatch_retrying(
        basket_id,
        BASKET_AGGREGATE_TYPE,
        &cmd,
        Basket::empty,
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": basket_id.to_string(),
            "status": status.as_str(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

async fn increment_views(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let basket_id: BasketId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid basket id"),
    };

    let cmd = BasketCommand::IncrementViews(IncrementViews { occurred_at: Utc::now() });

    // Popular baskets see contended appends; retry through the races.
    let committed = match services.dispatcher.dispatch_retrying(
        basket_id,
        BASKET_AGGREGATE_TYPE,
        &cmd,
        Basket::empty,
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": basket_id.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

async fn rate_basket(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::RateBasketRequest>,
) -> axum::response::Response {
    let basket_id: BasketId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid basket id"),
    };

    let cmd = BasketCommand::Rate(RateBasket {
        value: body.value,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatcher.dispatch_retrying(
        basket_id,
        BASKET_AGGREGATE_TYPE,
        &cmd,
        Basket::empty,
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": basket_id.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

async fn delete_basket(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let basket_id: BasketId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid basket id"),
    };

    let cmd = BasketCommand::Delete(DeleteBasket {
        actor_id: principal.actor_id(),
        actor_role: principal.role(),
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatcher.dispatch(
        basket_id,
        BASKET_AGGREGATE_TYPE,
        &cmd,
        Basket::empty,
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": basket_id.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}
