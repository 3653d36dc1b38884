//! CSRF state issuance endpoint.
//!
//! `POST /state` returns a fresh `state` bound to the caller's browser
//! session. The session is taken from the `session_id` form parameter, or
//! from the session cookie when the form does not name one.
//!
//! ```json
//! { "state": "Q2sJ0n...", "expires_in": 600 }
//! ```

use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

use super::AuthState;

/// Form parameters for `POST /state`.
#[derive(Debug, Default, Deserialize)]
pub struct StateRequest {
    /// Session identifier the state is bound to.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Response body of `POST /state`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StateResponse {
    /// The state value to send with the authorization request.
    pub state: String,

    /// Seconds until the state stops being accepted.
    pub expires_in: u64,
}

/// Handles state issuance.
pub async fn state_handler(
    State(state): State<AuthState>,
    jar: CookieJar,
    form: Result<Form<StateRequest>, FormRejection>,
) -> Response {
    let form_session = form.ok().and_then(|Form(request)| request.session_id);
    let session_id = form_session
        .filter(|s| !s.is_empty())
        .or_else(|| {
            jar.get(&state.config.authorize.session_cookie)
                .map(|cookie| cookie.value().to_string())
        })
        .filter(|s| !s.is_empty());

    let Some(session_id) = session_id else {
        return AuthError::invalid_request("a session is required to issue a state")
            .into_response();
    };

    match state.states.generate(&session_id).await {
        Ok(value) => (
            [("Cache-Control", "no-store")],
            Json(StateResponse {
                state: value,
                expires_in: state.states.lifetime().as_secs(),
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
