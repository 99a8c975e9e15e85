//! Defines the savings goal model, progress calculation and database queries.

use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    database_id::{FamilyId, SavingsGoalId},
    money::Money,
};

// ============================================================================
// MODELS
// ============================================================================

/// Whether a goal is still being saved towards.
///
/// Advisory only, nothing changes it automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Active,
    Achieved,
}

impl GoalStatus {
    fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Achieved => "achieved",
        }
    }
}

impl ToSql for GoalStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for GoalStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "active" => Ok(GoalStatus::Active),
            "achieved" => Ok(GoalStatus::Achieved),
            other => Err(FromSqlError::Other(
                format!("invalid goal status \"{other}\"").into(),
            )),
        }
    }
}

/// A family's named savings target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsGoal {
    /// The ID of the goal.
    pub id: SavingsGoalId,
    /// The family saving towards the goal.
    pub family_id: FamilyId,
    /// What the family is saving for, e.g. "Holiday".
    pub name: String,
    /// How much the family wants to save. Always positive.
    pub target_amount: Money,
    /// How much has been saved so far.
    pub current_amount: Money,
    /// Whether the goal is still active.
    pub status: GoalStatus,
    /// When the goal was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the goal was last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl SavingsGoal {
    /// The goal's progress as a whole percentage between 0 and 100.
    pub fn progress(&self) -> u8 {
        progress_percentage(self.current_amount, self.target_amount)
    }
}

/// How far `current` is towards `target`, as a percentage rounded half away
/// from zero and clamped to `0..=100`.
///
/// A non-positive target gives zero.
pub fn progress_percentage(current: Money, target: Money) -> u8 {
    if !target.is_positive() {
        return 0;
    }

    let percentage = current
        .as_decimal()
        .checked_div(target.as_decimal())
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);

    percentage.to_u8().unwrap_or(0)
}

/// The order to list a family's goals in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalSort {
    /// Oldest first.
    #[default]
    Created,
    /// Alphabetically, ignoring case.
    Name,
    /// Closest to completion first.
    Progress,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create a new savings goal for `family_id` with nothing saved yet.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if `name` is blank, or `target_amount` is not positive
///   or is above [MAX_AMOUNT_UNITS](crate::money::MAX_AMOUNT_UNITS),
/// - [Error::SqlError] if there is some other SQL error, e.g. an unknown family.
pub fn create_savings_goal(
    family_id: FamilyId,
    name: &str,
    target_amount: Money,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<SavingsGoal, Error> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("Goal name cannot be empty".to_owned()));
    }

    if !target_amount.is_positive() {
        return Err(Error::InvalidInput(
            "Target amount must be greater than zero".to_owned(),
        ));
    }

    target_amount.check_limit()?;

    let goal = SavingsGoal {
        id: SavingsGoalId::new(),
        family_id,
        name: name.to_owned(),
        target_amount,
        current_amount: Money::ZERO,
        status: GoalStatus::Active,
        created_at: now,
        updated_at: now,
    };

    connection.execute(
        "INSERT INTO savings_goal
            (id, family_id, name, target_amount, current_amount, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        (
            &goal.id,
            &goal.family_id,
            &goal.name,
            &goal.target_amount,
            &goal.current_amount,
            &goal.status,
            &goal.created_at,
            &goal.updated_at,
        ),
    )?;

    Ok(goal)
}

/// Get the savings goals for `family_id` in the order given by `sort`.
///
/// # Errors
/// Returns [Error::SqlError] if an SQL related error occurred.
pub fn get_savings_goals(
    family_id: FamilyId,
    sort: GoalSort,
    connection: &Connection,
) -> Result<Vec<SavingsGoal>, Error> {
    let order_by = match sort {
        GoalSort::Name => "name COLLATE NOCASE, rowid",
        GoalSort::Created | GoalSort::Progress => "created_at, rowid",
    };

    let mut goals = connection
        .prepare(&format!(
            "SELECT id, family_id, name, target_amount, current_amount, status, created_at, updated_at
             FROM savings_goal WHERE family_id = :family_id
             ORDER BY {order_by}"
        ))?
        .query_map(&[(":family_id", &family_id)], map_savings_goal_row)?
        .collect::<Result<Vec<_>, _>>()?;

    if sort == GoalSort::Progress {
        // Stable, so equal progress keeps creation order.
        goals.sort_by_key(|goal| std::cmp::Reverse(goal.progress()));
    }

    Ok(goals)
}

/// Create the savings goal table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_savings_goal_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS savings_goal (
                id TEXT PRIMARY KEY,
                family_id TEXT NOT NULL REFERENCES family(id),
                name TEXT NOT NULL,
                target_amount TEXT NOT NULL,
                current_amount TEXT NOT NULL DEFAULT '0.00',
                status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'achieved')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

/// Map a database row to a [SavingsGoal].
///
/// # Errors
/// Returns a [rusqlite::Error] if a column is missing or holds an unexpected value.
pub fn map_savings_goal_row(row: &Row) -> Result<SavingsGoal, rusqlite::Error> {
    Ok(SavingsGoal {
        id: row.get(0)?,
        family_id: row.get(1)?,
        name: row.get(2)?,
        target_amount: row.get(3)?,
        current_amount: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use rusqlite::Connection;
    use time::{Duration, macros::datetime};

    use crate::{
        Error,
        database_id::FamilyId,
        money::Money,
        savings_goal::core::{
            GoalSort, GoalStatus, create_savings_goal, get_savings_goals, progress_percentage,
        },
        test_utils::{get_test_connection, insert_member},
    };

    fn family(conn: &Connection) -> FamilyId {
        insert_member(conn, "sub-1", "ani@example.com", None)
            .family_id
            .unwrap()
    }

    fn set_current_amount(conn: &Connection, name: &str, amount: Money) {
        conn.execute(
            "UPDATE savings_goal SET current_amount = ?1 WHERE name = ?2",
            (&amount, name),
        )
        .unwrap();
    }

    #[test]
    fn quarter_of_target_is_25_percent() {
        assert_eq!(
            progress_percentage(dec!(250000).into(), dec!(1000000).into()),
            25
        );
    }

    #[test]
    fn progress_rounds_half_away_from_zero() {
        assert_eq!(progress_percentage(dec!(1).into(), dec!(8).into()), 13);
        assert_eq!(progress_percentage(dec!(1).into(), dec!(3).into()), 33);
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(progress_percentage(dec!(300).into(), dec!(100).into()), 100);
        assert_eq!(progress_percentage(dec!(-5).into(), dec!(100).into()), 0);
        assert_eq!(progress_percentage(dec!(5).into(), Money::ZERO), 0);
    }

    #[test]
    fn create_starts_active_with_nothing_saved() {
        let conn = get_test_connection();
        let family_id = family(&conn);
        let now = datetime!(2025-03-01 09:30:00 UTC);

        let goal =
            create_savings_goal(family_id, "  Holiday ", dec!(5000).into(), now, &conn).unwrap();

        assert_eq!(goal.name, "Holiday");
        assert_eq!(goal.current_amount, Money::ZERO);
        assert_eq!(goal.status, GoalStatus::Active);
        assert_eq!(
            get_savings_goals(family_id, GoalSort::Created, &conn).unwrap(),
            vec![goal]
        );
    }

    #[test]
    fn create_rejects_blank_name_and_out_of_range_target() {
        let conn = get_test_connection();
        let family_id = family(&conn);
        let now = datetime!(2025-03-01 09:30:00 UTC);

        let blank = create_savings_goal(family_id, "   ", dec!(10).into(), now, &conn);
        let zero = create_savings_goal(family_id, "Car", Money::ZERO, now, &conn);
        let negative = create_savings_goal(family_id, "Car", dec!(-10).into(), now, &conn);
        let too_large = create_savings_goal(
            family_id,
            "Car",
            dec!(50000000000000000000000000000).into(),
            now,
            &conn,
        );

        assert!(matches!(blank, Err(Error::InvalidInput(_))));
        assert!(matches!(zero, Err(Error::InvalidInput(_))));
        assert!(matches!(negative, Err(Error::InvalidInput(_))));
        assert!(matches!(too_large, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn sorts_goals() {
        let conn = get_test_connection();
        let family_id = family(&conn);
        let now = datetime!(2025-03-01 09:30:00 UTC);
        for (offset, name) in ["car", "Boat", "Anniversary"].into_iter().enumerate() {
            create_savings_goal(
                family_id,
                name,
                dec!(100).into(),
                now + Duration::minutes(offset as i64),
                &conn,
            )
            .unwrap();
        }
        set_current_amount(&conn, "Boat", dec!(50).into());
        set_current_amount(&conn, "Anniversary", dec!(80).into());

        let names = |sort| -> Vec<String> {
            get_savings_goals(family_id, sort, &conn)
                .unwrap()
                .into_iter()
                .map(|goal| goal.name)
                .collect()
        };

        assert_eq!(names(GoalSort::Created), ["car", "Boat", "Anniversary"]);
        assert_eq!(names(GoalSort::Name), ["Anniversary", "Boat", "car"]);
        assert_eq!(names(GoalSort::Progress), ["Anniversary", "Boat", "car"]);
    }

    #[test]
    fn lists_only_own_family_goals() {
        let conn = get_test_connection();
        let family_id = family(&conn);
        let other = insert_member(&conn, "sub-2", "bob@example.com", None)
            .family_id
            .unwrap();
        let now = datetime!(2025-03-01 09:30:00 UTC);
        create_savings_goal(other, "Not mine", dec!(100).into(), now, &conn).unwrap();

        assert_eq!(
            get_savings_goals(family_id, GoalSort::Created, &conn).unwrap(),
            vec![]
        );
    }
}
