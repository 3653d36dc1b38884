//! Authorization endpoint handler.
//!
//! # Flow
//!
//! ```text
//! GET /authorize?response_type=code&client_id=...&redirect_uri=...&state=...
//!     ├─► Unknown client / unregistered redirect_uri → local error page (400)
//!     ├─► Any later failure → 302 to redirect_uri with error + state
//!     └─► Success → 302 to redirect_uri with code + state
//! ```
//!
//! The authenticated subject comes from the header configured in
//! `authorize.subject_header`, set by the login front end in front of this
//! server. The browser session the `state` is bound to comes from the
//! `authorize.session_cookie` cookie.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::CookieJar;

use crate::oauth::authorize::{AuthorizationErrorCode, AuthorizationRequest, AuthorizeRejection};

use super::AuthState;
use super::error_page::render_error_page;

/// Handles `GET /authorize`.
pub async fn authorize_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    jar: CookieJar,
    query: Result<Query<AuthorizationRequest>, QueryRejection>,
) -> Response {
    let Ok(Query(request)) = query else {
        return local_error(
            AuthorizationErrorCode::InvalidRequest,
            "The authorization request is malformed",
        );
    };

    let subject = headers
        .get(state.config.authorize.subject_header.as_str())
        .and_then(|h| h.to_str().ok());
    let session_id = jar
        .get(&state.config.authorize.session_cookie)
        .map(|cookie| cookie.value().to_string());

    match state
        .authorization
        .authorize(&request, subject, session_id.as_deref())
        .await
    {
        Ok(grant) => match grant.location() {
            Ok(location) => found(&location),
            Err(e) => {
                tracing::error!(error = %e, "Registered redirect_uri does not parse");
                local_error(
                    AuthorizationErrorCode::ServerError,
                    "The registered redirect URI is invalid",
                )
            }
        },
        Err(AuthorizeRejection::Local { error, description }) => local_error(error, &description),
        Err(AuthorizeRejection::Redirect {
            redirect_uri,
            error,
        }) => {
            tracing::debug!(
                client_id = ?request.client_id,
                error = %error.error.as_str(),
                "Authorization request rejected"
            );
            match error.to_redirect_url(&redirect_uri) {
                Ok(location) => found(&location),
                Err(_) => local_error(
                    error.error,
                    error.error_description.as_deref().unwrap_or_default(),
                ),
            }
        }
    }
}

/// A 302 redirect that is never cached.
fn found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, location),
            (header::CACHE_CONTROL, "no-store"),
        ],
    )
        .into_response()
}

/// Renders the local error page.
fn local_error(error: AuthorizationErrorCode, description: &str) -> Response {
    let status = if error == AuthorizationErrorCode::ServerError {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Html(render_error_page(error.as_str(), description))).into_response()
}
