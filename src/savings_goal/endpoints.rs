//! Route handlers for listing and creating savings goals.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{
        FromRef, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    AppState, Error,
    auth::Claims,
    db::lock,
    membership::resolve_family_member,
    money::Money,
    savings_goal::core::{GoalSort, SavingsGoal, create_savings_goal, get_savings_goals},
};

/// The state needed to list or create savings goals.
#[derive(Debug, Clone)]
pub struct SavingsGoalState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for SavingsGoalState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A savings goal as sent to the client, with its progress percentage.
#[derive(Debug, Serialize)]
pub struct SavingsGoalResponse {
    #[serde(flatten)]
    pub goal: SavingsGoal,
    pub progress: u8,
}

impl From<SavingsGoal> for SavingsGoalResponse {
    fn from(goal: SavingsGoal) -> Self {
        Self {
            progress: goal.progress(),
            goal,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GoalListQuery {
    #[serde(default)]
    pub sort: GoalSort,
}

/// A route handler that lists the caller's family's savings goals.
pub async fn get_savings_goals_endpoint(
    State(state): State<SavingsGoalState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<GoalListQuery>, QueryRejection>,
) -> Result<Json<Vec<SavingsGoalResponse>>, Error> {
    let Query(query) = query?;

    let connection = lock(&state.db_connection)?;
    let member = resolve_family_member(&claims.subject_id, &connection)?;

    let goals = get_savings_goals(member.family_id, query.sort, &connection)?
        .into_iter()
        .map(SavingsGoalResponse::from)
        .collect();

    Ok(Json(goals))
}

/// The request body for creating a savings goal.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsGoalRequest {
    pub name: Option<String>,
    /// The amount to save, as a JSON number or string.
    pub target_amount: Option<Money>,
}

/// A route handler that creates a savings goal for the caller's family.
pub async fn create_savings_goal_endpoint(
    State(state): State<SavingsGoalState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<SavingsGoalRequest>, JsonRejection>,
) -> Result<Json<SavingsGoalResponse>, Error> {
    let Json(request) = body?;

    // An empty name or a zero target counts as missing.
    let name = request.name.filter(|name| !name.is_empty());
    let target_amount = request.target_amount.filter(|amount| *amount != Money::ZERO);
    let (Some(name), Some(target_amount)) = (name, target_amount) else {
        return Err(Error::MissingFields);
    };

    let connection = lock(&state.db_connection)?;
    let member = resolve_family_member(&claims.subject_id, &connection)?;

    let goal = create_savings_goal(
        member.family_id,
        &name,
        target_amount,
        OffsetDateTime::now_utc(),
        &connection,
    )?;

    Ok(Json(goal.into()))
}
