use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;

use lastbasket_baskets::{Category, GeoPoint};
use lastbasket_discovery::{DiscoveryFilters, NearbyQuery, SortBy, find_nearby, search};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/nearby", get(nearby))
        .route("/search", get(search_baskets))
}

async fn nearby(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::NearbyParams>,
) -> axum::response::Response {
    let query = match build_query(&params) {
        Ok(q) => q,
        Err(resp) => return resp,
    };

    let rows = services.baskets.list();
    let hits = find_nearby(&rows, &query, Utc::now());

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "count": hits.len(),
            "results": hits,
        })),
    )
        .into_response()
}

fn build_query(params: &dto::NearbyParams) -> Result<NearbyQuery, axum::response::Response> {
    let origin =
        GeoPoint::new(params.lat, params.lng).map_err(errors::domain_error_to_response)?;
    let mut query = NearbyQuery::new(origin).map_err(errors::domain_error_to_response)?;

    if let Some(radius_m) = params.radius_m {
        query = query
            .with_radius_m(radius_m)
            .map_err(errors::domain_error_to_response)?;
    }
    if let Some(limit) = params.limit {
        query = query
            .with_limit(limit)
            .map_err(errors::domain_error_to_response)?;
    }
    if let Some(raw) = &params.sort_by {
        let sort_by: SortBy = raw.parse().map_err(errors::domain_error_to_response)?;
        query = query.with_sort(sort_by);
    }

    let mut filters = DiscoveryFilters {
        min_price_cents: params.min_price,
        max_price_cents: params.max_price,
        ..DiscoveryFilters::default()
    };
    if let Some(raw) = &params.category {
        let category: Category = raw.parse().map_err(errors::domain_error_to_response)?;
        filters.category = Some(category);
    }

    Ok(query.with_filters(filters))
}

async fn search_baskets(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::SearchParams>,
) -> axum::response::Response {
    let origin = match (params.lat, params.lng) {
        (Some(lat), Some(lng)) => match GeoPoint::new(lat, lng) {
            Ok(point) => Some(point),
            Err(e) => return errors::domain_error_to_response(e),
        },
        (None, None) => None,
        _ => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                "lat and lng must be provided together",
            );
        }
    };

    let rows = services.baskets.list();
    let hits = match search(&rows, &params.q, origin, params.radius_m, Utc::now()) {
        Ok(hits) => hits,
        Err(e) => return errors::domain_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "count": hits.len(),
            "results": hits,
        })),
    )
        .into_response()
}
