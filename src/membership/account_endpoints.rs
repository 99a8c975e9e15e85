//! Endpoints for looking up accounts.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Query, State, rejection::QueryRejection},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    account::Account,
    auth::Claims,
    db::lock,
    membership::core::{MembershipStatus, resolve_or_fail, status},
};

/// The state needed to look up accounts.
#[derive(Debug, Clone)]
pub struct AccountState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for AccountState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The response body for the current account.
#[derive(Debug, Serialize)]
pub struct CurrentAccount {
    pub user: Account,
}

/// A route handler that returns the caller's account.
pub async fn get_current_account(
    State(state): State<AccountState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<CurrentAccount>, Error> {
    let connection = lock(&state.db_connection)?;
    let user = resolve_or_fail(&claims.subject_id, &connection)?;

    Ok(Json(CurrentAccount { user }))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub email: Option<String>,
}

/// A route handler that reports whether an email address is registered.
pub async fn get_membership_status(
    State(state): State<AccountState>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Json<MembershipStatus>, Error> {
    let Query(query) = query?;
    let email = query.email.ok_or(Error::MissingField("Email"))?;

    let connection = lock(&state.db_connection)?;

    Ok(Json(status(&email, &connection)?))
}
