//! Defines the endpoint that reports the caller's family balances.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    auth::Claims,
    db::lock,
    ledger::{FamilySummary, summarize},
    membership::resolve_family_member,
    savings_goal::{GoalSort, get_savings_goals},
    transaction::get_transactions_for_family,
};

/// The state needed to summarise a family's ledger.
#[derive(Debug, Clone)]
pub struct SummaryState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for SummaryState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler that returns the shared balance, the caller's private
/// balance and the family's total savings.
pub async fn get_family_summary(
    State(state): State<SummaryState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<FamilySummary>, Error> {
    let (member, transactions, goals) = {
        let connection = lock(&state.db_connection)?;
        let member = resolve_family_member(&claims.subject_id, &connection)?;
        let transactions = get_transactions_for_family(member.family_id, &connection)?;
        let goals = get_savings_goals(member.family_id, GoalSort::Created, &connection)?;

        (member, transactions, goals)
    };

    Ok(Json(summarize(&transactions, &goals, member.account.id)?))
}
