//! Opens the application database and creates the tables for the domain models.

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use rusqlite::{Connection, TransactionBehavior};

use crate::{
    Error,
    account::create_account_table, agreement::create_agreement_table,
    family::create_family_table, savings_goal::create_savings_goal_table,
    transaction::create_transaction_table,
};

/// How long a statement waits on a locked database before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Open the SQLite database at `path`, creating the file if needed.
///
/// # Errors
/// Returns an error if the database cannot be opened or configured.
pub fn open(path: impl AsRef<Path>) -> Result<Connection, rusqlite::Error> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;

    Ok(connection)
}

/// Acquire the shared database connection.
///
/// # Errors
/// Returns [Error::DatabaseLockError] if the lock is poisoned.
pub fn lock(db_connection: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, Error> {
    db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })
}

/// Enable foreign keys and create the tables for all the domain models.
///
/// Tables are created with `IF NOT EXISTS`, so this is safe to call on an
/// existing database.
///
/// # Errors
/// Returns an error if any of the tables could not be created.
pub fn initialize(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.pragma_update(None, "foreign_keys", "ON")?;

    let transaction =
        rusqlite::Transaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_family_table(&transaction)?;
    create_account_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_savings_goal_table(&transaction)?;
    create_agreement_table(&transaction)?;

    transaction.commit()
}
