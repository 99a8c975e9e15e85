//! Defines the endpoints for creating a family and for joining one.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State, rejection::JsonRejection},
};
use rusqlite::Connection;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::{
    AppState, Error,
    auth::Claims,
    config::InvitePolicy,
    db::lock,
    family::generate_invite_code,
    membership::core::{Membership, Registration, join, register},
};

/// The state needed to register or join a family.
#[derive(Debug, Clone)]
pub struct MembershipState {
    /// The database connection for managing accounts and families.
    pub db_connection: Arc<Mutex<Connection>>,
    /// What happens to an invite code once someone joins with it.
    pub invite_policy: InvitePolicy,
}

impl FromRef<AppState> for MembershipState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            invite_policy: state.settings.invite_policy,
        }
    }
}

/// A route handler that creates a new family and an account for the caller.
///
/// The response holds the invite code, which is not shown again.
pub async fn register_endpoint(
    State(state): State<MembershipState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Registration>, Error> {
    let invite_code = generate_invite_code(&mut rand::thread_rng());
    let connection = lock(&state.db_connection)?;

    let registration = register(&claims, &invite_code, OffsetDateTime::now_utc(), &connection)
        .inspect_err(|error| tracing::warn!("Could not register {}: {error}", claims.subject_id))?;

    Ok(Json(registration))
}

/// The request body for joining a family.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// The invite code shared by a member of the family.
    #[serde(default)]
    pub invite_code: Option<String>,
}

/// A route handler that creates an account for the caller in the family with
/// the given invite code.
pub async fn join_endpoint(
    State(state): State<MembershipState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<JoinRequest>, JsonRejection>,
) -> Result<Json<Membership>, Error> {
    let Json(request) = body?;
    let invite_code = request.invite_code.unwrap_or_default();

    let connection = lock(&state.db_connection)?;

    let membership = join(
        &claims,
        &invite_code,
        state.invite_policy,
        OffsetDateTime::now_utc(),
        &connection,
    )
    .inspect_err(|error| {
        tracing::warn!("Could not join family for {}: {error}", claims.subject_id)
    })?;

    Ok(Json(membership))
}
