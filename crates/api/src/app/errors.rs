//! Dispatch/domain error to HTTP response mapping.

use axum::{Json, http::StatusCode, response::IntoResponse};

use lastbasket_core::DomainError;
use lastbasket_infra::DispatchError;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::Unauthorized => {
            json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized")
        }
        DispatchError::InsufficientInventory { requested, remaining } => json_error(
            StatusCode::CONFLICT,
            "insufficient_inventory",
            format!("requested {requested}, remaining {remaining}"),
        ),
        DispatchError::BasketUnavailable(msg) => {
            json_error(StatusCode::CONFLICT, "basket_unavailable", msg)
        }
        DispatchError::IllegalTransition { from, to } => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "illegal_transition",
            format!("{from} -> {to}"),
        ),
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e:?}"),
        ),
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

/// For validation done in handlers before any dispatch (query parsing,
/// geo bounds).
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    dispatch_error_to_response(DispatchError::from(err))
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        Json(serde_json::json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_map_to_the_documented_status_codes() {
        let cases = vec![
            (
                DispatchError::Validation("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (DispatchError::NotFound, StatusCode::NOT_FOUND),
            (DispatchError::Unauthorized, StatusCode::FORBIDDEN),
            (
                DispatchError::InsufficientInventory { requested: 3, remaining: 1 },
                StatusCode::CONFLICT,
            ),
            (
                DispatchError::BasketUnavailable("basket is paused".into()),
                StatusCode::CONFLICT,
            ),
            (
                DispatchError::IllegalTransition {
                    from: "pending".into(),
                    to: "picked_up".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                DispatchError::Concurrency("version race".into()),
                StatusCode::CONFLICT,
            ),
            (
                DispatchError::Deserialize("broken payload".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                DispatchError::Publish("bus down".into()),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(dispatch_error_to_response(err).status(), expected);
        }
    }

    #[test]
    fn domain_errors_take_the_same_path() {
        assert_eq!(
            domain_error_to_response(DomainError::validation("nope")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            domain_error_to_response(DomainError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            domain_error_to_response(DomainError::conflict("busy")).status(),
            StatusCode::CONFLICT
        );
    }
}
