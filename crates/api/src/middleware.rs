use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use lastbasket_core::{ActorRole, UserId};

use crate::context::Principal;

/// Headers the external auth collaborator sets on every request it forwards.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

pub async fn principal_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let principal = extract_principal(req.headers())?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

fn extract_principal(headers: &HeaderMap) -> Result<Principal, StatusCode> {
    let actor_id: UserId = header_str(headers, ACTOR_ID_HEADER)?
        .parse()
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let role: ActorRole = header_str(headers, ACTOR_ROLE_HEADER)?
        .parse()
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    Ok(Principal::new(actor_id, role))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, StatusCode> {
    headers
        .get(name)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_str()
        .map_err(|_| StatusCode::UNAUTHORIZED)
}
