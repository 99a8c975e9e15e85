//! Agreements between family members, e.g. about a big expense.
//!
//! Agreements are stored but there is no endpoint for them yet.

use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::{
    Error,
    database_id::{AccountId, AgreementId, FamilyId},
};

/// What an agreement is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementType {
    /// How income is split between the shared and private pots.
    Allocation,
    /// A purchase large enough to need everyone's approval.
    BigExpense,
    /// Starting or changing a savings goal.
    SavingsGoal,
}

/// Where an agreement is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementStatus {
    /// Waiting for another member to respond.
    #[default]
    Pending,
    /// Confirmed by another member.
    Agreed,
    /// Turned down by another member.
    Rejected,
}

impl AgreementType {
    fn as_str(&self) -> &'static str {
        match self {
            AgreementType::Allocation => "allocation",
            AgreementType::BigExpense => "big_expense",
            AgreementType::SavingsGoal => "savings_goal",
        }
    }
}

impl AgreementStatus {
    fn as_str(&self) -> &'static str {
        match self {
            AgreementStatus::Pending => "pending",
            AgreementStatus::Agreed => "agreed",
            AgreementStatus::Rejected => "rejected",
        }
    }
}

impl ToSql for AgreementType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AgreementType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "allocation" => Ok(AgreementType::Allocation),
            "big_expense" => Ok(AgreementType::BigExpense),
            "savings_goal" => Ok(AgreementType::SavingsGoal),
            other => Err(FromSqlError::Other(
                format!("invalid agreement type \"{other}\"").into(),
            )),
        }
    }
}

impl ToSql for AgreementStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AgreementStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "pending" => Ok(AgreementStatus::Pending),
            "agreed" => Ok(AgreementStatus::Agreed),
            "rejected" => Ok(AgreementStatus::Rejected),
            other => Err(FromSqlError::Other(
                format!("invalid agreement status \"{other}\"").into(),
            )),
        }
    }
}

/// A proposal by one family member that another confirms or rejects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Agreement {
    /// The ID of the agreement.
    pub id: AgreementId,
    /// The family the agreement belongs to.
    pub family_id: FamilyId,
    /// What the agreement is about.
    #[serde(rename = "type")]
    pub agreement_type: AgreementType,
    /// Whether the agreement is pending, agreed or rejected.
    pub status: AgreementStatus,
    /// The member who proposed the agreement.
    pub created_by: AccountId,
    /// The member who agreed to or rejected it.
    pub confirmed_by: Option<AccountId>,
    /// Free-form details, e.g. the amount of a big expense.
    pub metadata: Option<Value>,
    /// When the agreement was proposed.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the agreement last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Create a pending agreement proposed by `created_by`.
///
/// # Errors
/// Returns [Error::SqlError] if an SQL related error occurred, e.g. an unknown family.
pub fn create_agreement(
    family_id: FamilyId,
    agreement_type: AgreementType,
    created_by: AccountId,
    metadata: Option<Value>,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Agreement, Error> {
    let agreement = Agreement {
        id: AgreementId::new(),
        family_id,
        agreement_type,
        status: AgreementStatus::Pending,
        created_by,
        confirmed_by: None,
        metadata,
        created_at: now,
        updated_at: now,
    };

    let metadata = agreement.metadata.as_ref().map(Value::to_string);

    connection.execute(
        "INSERT INTO agreement
            (id, family_id, type, status, created_by, confirmed_by, metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        (
            &agreement.id,
            &agreement.family_id,
            &agreement.agreement_type,
            &agreement.status,
            &agreement.created_by,
            &agreement.confirmed_by,
            &metadata,
            &agreement.created_at,
            &agreement.updated_at,
        ),
    )?;

    Ok(agreement)
}

/// Get the agreements for `family_id`, oldest first.
///
/// # Errors
/// Returns [Error::SqlError] if an SQL related error occurred.
pub fn get_agreements_for_family(
    family_id: FamilyId,
    connection: &Connection,
) -> Result<Vec<Agreement>, Error> {
    connection
        .prepare(
            "SELECT id, family_id, type, status, created_by, confirmed_by, metadata, created_at, updated_at
             FROM agreement WHERE family_id = :family_id
             ORDER BY created_at, rowid",
        )?
        .query_map(&[(":family_id", &family_id)], map_agreement_row)?
        .map(|maybe_agreement| maybe_agreement.map_err(Error::from))
        .collect()
}

/// Create the agreement table.
///
/// # Errors
/// Returns an error if the SQL query failed.
pub fn create_agreement_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS agreement (
                id TEXT PRIMARY KEY,
                family_id TEXT NOT NULL REFERENCES family(id),
                type TEXT NOT NULL CHECK (type IN ('allocation', 'big_expense', 'savings_goal')),
                status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'agreed', 'rejected')),
                created_by TEXT NOT NULL REFERENCES account(id),
                confirmed_by TEXT REFERENCES account(id),
                metadata TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

fn map_agreement_row(row: &Row) -> Result<Agreement, rusqlite::Error> {
    let metadata = row
        .get::<_, Option<String>>(6)?
        .map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })?;

    Ok(Agreement {
        id: row.get(0)?,
        family_id: row.get(1)?,
        agreement_type: row.get(2)?,
        status: row.get(3)?,
        created_by: row.get(4)?,
        confirmed_by: row.get(5)?,
        metadata,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
