//! Families (households), the unit that shares a ledger, and their invite codes.

use rand::{Rng, distributions::Uniform};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::{Error, database_id::FamilyId};

/// The number of characters in an invite code.
pub const INVITE_CODE_LENGTH: usize = 6;

/// How long an invite code stays valid after the family is created.
pub const INVITE_CODE_LIFETIME: Duration = Duration::days(7);

const INVITE_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// ============================================================================
// MODELS
// ============================================================================

/// A household whose members share a ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Family {
    /// The ID of the family.
    pub id: FamilyId,
    /// The display name, e.g. "Ani's Family".
    pub name: String,
    /// The code other people use to join the family.
    ///
    /// `None` once a single-use code has been consumed.
    pub invite_code: Option<String>,
    /// When `invite_code` stops being accepted.
    #[serde(with = "time::serde::rfc3339::option")]
    pub invite_expiry: Option<OffsetDateTime>,
    /// When the family was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the family was last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Family {
    /// Whether the invite code has expired at `now`.
    ///
    /// A family without an expiry never expires.
    pub fn invite_expired(&self, now: OffsetDateTime) -> bool {
        self.invite_expiry.is_some_and(|expiry| expiry < now)
    }
}

/// The name given to a family created by `member_name`.
pub fn family_name_for(member_name: &str) -> String {
    format!("{member_name}'s Family")
}

/// Generate a random invite code of [INVITE_CODE_LENGTH] uppercase letters and digits.
pub fn generate_invite_code(rng: &mut impl Rng) -> String {
    let index = Uniform::from(0..INVITE_CODE_ALPHABET.len());

    (0..INVITE_CODE_LENGTH)
        .map(|_| INVITE_CODE_ALPHABET[rng.sample(index)] as char)
        .collect()
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create and insert a new family into the database.
///
/// # Errors
/// Returns:
/// - [Error::DuplicateInviteCode] if another family already has `invite_code`,
/// - [Error::SqlError] if an SQL related error occurred.
pub fn create_family(
    name: &str,
    invite_code: &str,
    invite_expiry: OffsetDateTime,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Family, Error> {
    let family = Family {
        id: FamilyId::new(),
        name: name.to_owned(),
        invite_code: Some(invite_code.to_owned()),
        invite_expiry: Some(invite_expiry),
        created_at: now,
        updated_at: now,
    };

    connection.execute(
        "INSERT INTO family (id, name, invite_code, invite_expiry, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (
            &family.id,
            &family.name,
            &family.invite_code,
            &family.invite_expiry,
            &family.created_at,
            &family.updated_at,
        ),
    )?;

    Ok(family)
}

/// Get the family with `id`.
///
/// # Errors
/// Returns [Error::NotFound] if no family has `id`, or [Error::SqlError] on an SQL error.
pub fn get_family(id: FamilyId, connection: &Connection) -> Result<Family, Error> {
    connection
        .prepare(
            "SELECT id, name, invite_code, invite_expiry, created_at, updated_at
             FROM family WHERE id = :id",
        )?
        .query_row(&[(":id", &id)], map_family_row)
        .map_err(|error| error.into())
}

/// Get the family that currently has `invite_code`, if any.
///
/// # Errors
/// Returns [Error::SqlError] if an SQL related error occurred.
pub fn find_family_by_invite_code(
    invite_code: &str,
    connection: &Connection,
) -> Result<Option<Family>, Error> {
    connection
        .prepare(
            "SELECT id, name, invite_code, invite_expiry, created_at, updated_at
             FROM family WHERE invite_code = :invite_code",
        )?
        .query_row(&[(":invite_code", invite_code)], map_family_row)
        .optional()
        .map_err(|error| error.into())
}

/// Remove the invite code from the family with `id` so nobody else can join with it.
///
/// # Errors
/// Returns [Error::NotFound] if no family has `id`, or [Error::SqlError] on an SQL error.
pub fn clear_invite_code(
    id: FamilyId,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE family SET invite_code = NULL, invite_expiry = NULL, updated_at = ?1
         WHERE id = ?2",
        (&now, &id),
    )?;

    match rows_affected {
        0 => Err(Error::NotFound),
        _ => Ok(()),
    }
}

/// Create the family table.
///
/// # Errors
/// Returns an error if the SQL query failed.
pub fn create_family_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS family (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                invite_code TEXT UNIQUE,
                invite_expiry TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

/// Map a database row to a [Family].
///
/// # Errors
/// Returns an error if a column is missing or holds an unexpected type.
pub fn map_family_row(row: &Row) -> Result<Family, rusqlite::Error> {
    Ok(Family {
        id: row.get(0)?,
        name: row.get(1)?,
        invite_code: row.get(2)?,
        invite_expiry: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================
