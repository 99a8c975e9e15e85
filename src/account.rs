//! Accounts map an identity provider subject to a member of a family.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    Error,
    database_id::{AccountId, FamilyId},
};

/// An internal user record linked to an external identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// The ID of the account.
    pub id: AccountId,
    /// The identity provider's subject for this user. Never changes once set.
    pub subject_id: String,
    /// The name shown to other family members.
    pub name: String,
    /// The user's email address, unique across accounts.
    pub email: String,
    /// A link to the user's profile picture.
    pub avatar_url: Option<String>,
    /// The family the user belongs to, if any.
    pub family_id: Option<FamilyId>,
    /// When the account was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the account was last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The data needed to create an [Account].
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub subject_id: String,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub family_id: Option<FamilyId>,
}

/// Create and insert a new account into the database.
///
/// # Errors
/// Returns:
/// - [Error::AlreadyRegistered] if an account already exists for the subject,
/// - [Error::DuplicateEmail] if another account uses the email address,
/// - [Error::SqlError] for any other SQL error, e.g. an unknown family ID.
pub fn create_account(
    new_account: NewAccount,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Account, Error> {
    let account = Account {
        id: AccountId::new(),
        subject_id: new_account.subject_id,
        name: new_account.name,
        email: new_account.email,
        avatar_url: new_account.avatar_url,
        family_id: new_account.family_id,
        created_at: now,
        updated_at: now,
    };

    connection.execute(
        "INSERT INTO account (id, subject_id, name, email, avatar_url, family_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        (
            &account.id,
            &account.subject_id,
            &account.name,
            &account.email,
            &account.avatar_url,
            &account.family_id,
            &account.created_at,
            &account.updated_at,
        ),
    )?;

    Ok(account)
}

/// Get the account registered for the identity provider subject `subject_id`.
///
/// # Errors
/// Returns [Error::AccountNotFound] if the subject never registered, or
/// [Error::SqlError] on an SQL error.
pub fn get_account_by_subject_id(
    subject_id: &str,
    connection: &Connection,
) -> Result<Account, Error> {
    find_account_by_subject_id(subject_id, connection)?.ok_or(Error::AccountNotFound)
}

/// Get the account registered for `subject_id`, if there is one.
///
/// # Errors
/// Returns [Error::SqlError] if an SQL related error occurred.
pub fn find_account_by_subject_id(
    subject_id: &str,
    connection: &Connection,
) -> Result<Option<Account>, Error> {
    connection
        .prepare(
            "SELECT id, subject_id, name, email, avatar_url, family_id, created_at, updated_at
             FROM account WHERE subject_id = :subject_id",
        )?
        .query_row(&[(":subject_id", subject_id)], map_account_row)
        .optional()
        .map_err(|error| error.into())
}

/// Get the account with the email address `email`, if there is one.
///
/// # Errors
/// Returns [Error::SqlError] if an SQL related error occurred.
pub fn find_account_by_email(
    email: &str,
    connection: &Connection,
) -> Result<Option<Account>, Error> {
    connection
        .prepare(
            "SELECT id, subject_id, name, email, avatar_url, family_id, created_at, updated_at
             FROM account WHERE email = :email",
        )?
        .query_row(&[(":email", email)], map_account_row)
        .optional()
        .map_err(|error| error.into())
}

/// Get the number of accounts in the database.
///
/// # Errors
/// Returns [Error::SqlError] if an SQL related error occurred.
pub fn count_accounts(connection: &Connection) -> Result<i64, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM account;", [], |row| row.get(0))
        .map_err(|error| error.into())
}

/// Create the account table.
///
/// # Errors
/// Returns an error if the SQL query failed.
pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS account (
                id TEXT PRIMARY KEY,
                subject_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                avatar_url TEXT,
                family_id TEXT REFERENCES family(id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

/// Map a database row to an [Account].
///
/// # Errors
/// Returns an error if a column is missing or holds an unexpected type.
pub fn map_account_row(row: &Row) -> Result<Account, rusqlite::Error> {
    Ok(Account {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        avatar_url: row.get(4)?,
        family_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod account_tests {
    use rusqlite::Connection;
    use time::macros::datetime;

    use crate::{
        Error,
        account::{
            NewAccount, count_accounts, create_account, find_account_by_email,
            get_account_by_subject_id,
        },
        database_id::FamilyId,
        db::initialize,
    };

    fn get_db_connection() -> Connection {
        let conn =
            Connection::open_in_memory().expect("Could not create in-memory SQLite database");
        initialize(&conn).expect("Could not initialize database");

        conn
    }

    fn new_account(subject_id: &str, email: &str) -> NewAccount {
        NewAccount {
            subject_id: subject_id.to_owned(),
            name: "Ani".to_owned(),
            email: email.to_owned(),
            avatar_url: None,
            family_id: None,
        }
    }

    #[test]
    fn create_and_get_account() {
        let conn = get_db_connection();
        let now = datetime!(2025-03-01 09:30:00 UTC);

        let account = create_account(new_account("sub-1", "ani@example.com"), now, &conn).unwrap();
        let got = get_account_by_subject_id("sub-1", &conn).unwrap();

        assert_eq!(got, account);
    }

    #[test]
    fn get_unregistered_subject_fails() {
        let conn = get_db_connection();

        assert_eq!(
            get_account_by_subject_id("nobody", &conn),
            Err(Error::AccountNotFound)
        );
    }

    #[test]
    fn same_subject_twice_is_already_registered() {
        let conn = get_db_connection();
        let now = datetime!(2025-03-01 09:30:00 UTC);
        create_account(new_account("sub-1", "ani@example.com"), now, &conn).unwrap();

        let result = create_account(new_account("sub-1", "other@example.com"), now, &conn);

        assert_eq!(result, Err(Error::AlreadyRegistered));
    }

    #[test]
    fn same_email_twice_is_duplicate_email() {
        let conn = get_db_connection();
        let now = datetime!(2025-03-01 09:30:00 UTC);
        create_account(new_account("sub-1", "ani@example.com"), now, &conn).unwrap();

        let result = create_account(new_account("sub-2", "ani@example.com"), now, &conn);

        assert_eq!(result, Err(Error::DuplicateEmail));
    }

    #[test]
    fn unknown_family_is_rejected() {
        let conn = get_db_connection();
        let mut account = new_account("sub-1", "ani@example.com");
        account.family_id = Some(FamilyId::new());

        let result = create_account(account, datetime!(2025-03-01 09:30:00 UTC), &conn);

        assert!(matches!(result, Err(Error::SqlError(_))));
    }

    #[test]
    fn finds_account_by_email() {
        let conn = get_db_connection();
        let now = datetime!(2025-03-01 09:30:00 UTC);
        let account = create_account(new_account("sub-1", "ani@example.com"), now, &conn).unwrap();

        assert_eq!(
            find_account_by_email("ani@example.com", &conn).unwrap(),
            Some(account)
        );
        assert_eq!(find_account_by_email("bob@example.com", &conn).unwrap(), None);
    }

    #[test]
    fn returns_correct_count() {
        let conn = get_db_connection();

        let count = count_accounts(&conn).expect("Could not get account count");
        assert_eq!(0, count, "Want zero accounts before insertion, got {count}");

        create_account(
            new_account("sub-1", "ani@example.com"),
            datetime!(2025-03-01 09:30:00 UTC),
            &conn,
        )
        .unwrap();

        let count = count_accounts(&conn).expect("Could not get account count");
        assert_eq!(1, count, "Want one account after insertion, got {count}");
    }
}
