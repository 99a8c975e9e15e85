//! Authentication middleware that verifies bearer tokens.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{
    AppState, Error,
    auth::{AuthError, IdentityResolver},
};

/// The state needed for the auth middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Verifies bearer tokens.
    pub identity: Arc<IdentityResolver>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            identity: state.identity.clone(),
        }
    }
}

/// Middleware function that checks for a valid bearer token.
///
/// The caller's [Claims](crate::auth::Claims) are placed into the request and
/// the request executed normally if the token is valid, otherwise a 401 JSON
/// error is returned.
///
/// **Note**: Route handlers can use the function argument
/// `Extension(claims): Extension<Claims>` to receive the claims.
pub async fn auth_guard(State(state): State<AuthState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    let token = match TypedHeader::<Authorization<Bearer>>::from_request_parts(&mut parts, &state)
        .await
    {
        Ok(TypedHeader(Authorization(bearer))) => bearer.token().to_owned(),
        Err(_) => return Error::Unauthorized(AuthError::MissingToken).into_response(),
    };

    let claims = match state.identity.resolve(&token).await {
        Ok(claims) => claims,
        Err(error) => {
            tracing::warn!("Rejected bearer token for {}: {error}", parts.uri.path());
            return Error::Unauthorized(error).into_response();
        }
    };

    parts.extensions.insert(claims);
    next.run(Request::from_parts(parts, body)).await
}
