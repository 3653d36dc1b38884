use axum::Json;
use axum::response::IntoResponse;
use keyward_auth::AccessAuth;
use serde_json::json;

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Echoes the validated token context.
///
/// The smallest resource route there is: it exists so relying services can
/// check that their tokens and DPoP proofs are accepted.
pub async fn whoami(AccessAuth(ctx): AccessAuth) -> impl IntoResponse {
    Json(json!({
        "sub": ctx.subject(),
        "client_id": ctx.client_id(),
        "scope": ctx.claims.scope,
        "token_type": ctx.token_type.as_str(),
    }))
}
