//! Defines the core data models and database queries for transactions.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

use crate::{
    Error,
    database_id::{AccountId, FamilyId, TransactionId},
    money::Money,
};

// ============================================================================
// MODELS
// ============================================================================

/// What kind of event a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Money was earned.
    Income,
    /// Money was spent.
    Expense,
    /// A contribution with an agreed monetary value, e.g. housework.
    NonFinancial,
}

/// Whose money a transaction moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundSource {
    /// The family's shared pot.
    Family,
    /// The recording member's own money.
    Private,
    /// The family's savings.
    Savings,
}

/// The error returned when parsing an unknown enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field} \"{value}\"")]
pub struct ParseVariantError {
    field: &'static str,
    value: String,
}

macro_rules! text_enum {
    ($name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// The name used for this value in JSON and in the database.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseVariantError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseVariantError {
                        field: $field,
                        value: other.to_owned(),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|error| FromSqlError::Other(Box::new(error)))
            }
        }
    };
}

text_enum!(TransactionType, "type", {
    Income => "income",
    Expense => "expense",
    NonFinancial => "non_financial",
});

text_enum!(FundSource, "fund source", {
    Family => "family",
    Private => "private",
    Savings => "savings",
});

/// An income, expense or non-financial contribution recorded by a family member.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The family whose ledger the transaction belongs to.
    pub family_id: FamilyId,
    /// The account that recorded the transaction.
    pub user_id: AccountId,
    /// The unsigned amount. The direction comes from `transaction_type`.
    pub amount: Money,
    /// Where the money came from or went to, e.g. "Salary".
    pub source: Option<String>,
    /// Whether this is income, an expense or a non-financial contribution.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Whose money the transaction moves.
    pub fund_source: FundSource,
    /// A free-form category, e.g. "Groceries".
    pub category: String,
    /// A text description of what the transaction was for.
    pub description: Option<String>,
    /// When the transaction happened.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// When the transaction was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(
        amount: Money,
        transaction_type: TransactionType,
        fund_source: FundSource,
        category: &str,
    ) -> TransactionBuilder {
        TransactionBuilder {
            amount,
            transaction_type,
            fund_source,
            category: category.to_owned(),
            source: None,
            description: None,
            date: None,
        }
    }

    /// The amount with the sign implied by the transaction type.
    ///
    /// Expenses are negative, income and non-financial contributions positive.
    pub fn signed_amount(&self) -> Money {
        match self.transaction_type {
            TransactionType::Income | TransactionType::NonFinancial => self.amount,
            TransactionType::Expense => -self.amount,
        }
    }
}

/// A builder for creating [Transaction] instances.
///
/// The required fields are given to [Transaction::build]; the optional ones
/// default to `None` and the date defaults to the time of insertion.
///
/// # Examples
///
/// ```ignore
/// use rust_decimal_macros::dec;
///
/// use crate::transaction::{FundSource, Transaction, TransactionType};
///
/// let builder = Transaction::build(
///         dec!(45.99).into(),
///         TransactionType::Expense,
///         FundSource::Family,
///         "Groceries",
///     )
///     .description(Some("Weekly shop".to_owned()));
/// ```
#[derive(Debug, PartialEq, Clone)]
pub struct TransactionBuilder {
    /// The unsigned amount of the transaction.
    pub amount: Money,
    pub transaction_type: TransactionType,
    pub fund_source: FundSource,
    pub category: String,
    pub source: Option<String>,
    pub description: Option<String>,
    /// When the transaction happened, `None` for "now".
    pub date: Option<OffsetDateTime>,
}

impl TransactionBuilder {
    /// Set where the money came from or went to.
    pub fn source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    /// Set the description for the transaction.
    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Set when the transaction happened.
    pub fn date(mut self, date: Option<OffsetDateTime>) -> Self {
        self.date = date;
        self
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create a new transaction in the database for `user_id` in `family_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if the amount is negative or above
///   [MAX_AMOUNT_UNITS](crate::money::MAX_AMOUNT_UNITS),
///   or the date is after `now`,
/// - [Error::SqlError] if there is some other SQL error, e.g. an unknown family.
///
/// Dates are stored in UTC so that they sort chronologically.
pub fn create_transaction(
    builder: TransactionBuilder,
    family_id: FamilyId,
    user_id: AccountId,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Transaction, Error> {
    if builder.amount.is_negative() {
        return Err(Error::InvalidInput(
            "Amount must not be negative, use the transaction type to record money spent"
                .to_owned(),
        ));
    }

    builder.amount.check_limit()?;

    let date = builder.date.unwrap_or(now).to_offset(UtcOffset::UTC);

    if date > now {
        return Err(Error::InvalidInput(
            "Transaction date cannot be in the future".to_owned(),
        ));
    }

    let transaction = Transaction {
        id: TransactionId::new(),
        family_id,
        user_id,
        amount: builder.amount,
        source: builder.source,
        transaction_type: builder.transaction_type,
        fund_source: builder.fund_source,
        category: builder.category,
        description: builder.description,
        date,
        created_at: now.to_offset(UtcOffset::UTC),
    };

    connection.execute(
        "INSERT INTO \"transaction\"
            (id, family_id, user_id, amount, source, type, fund_source, category, description, date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        (
            &transaction.id,
            &transaction.family_id,
            &transaction.user_id,
            &transaction.amount,
            &transaction.source,
            &transaction.transaction_type,
            &transaction.fund_source,
            &transaction.category,
            &transaction.description,
            &transaction.date,
            &transaction.created_at,
        ),
    )?;

    Ok(transaction)
}

/// Get all of the transactions for `family_id`, most recent first.
///
/// # Errors
/// Returns [Error::SqlError] if an SQL related error occurred.
pub fn get_transactions_for_family(
    family_id: FamilyId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, family_id, user_id, amount, source, type, fund_source, category, description, date, created_at
             FROM \"transaction\" WHERE family_id = :family_id
             ORDER BY date DESC, rowid DESC",
        )?
        .query_map(&[(":family_id", &family_id)], map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id TEXT PRIMARY KEY,
                family_id TEXT NOT NULL REFERENCES family(id),
                user_id TEXT NOT NULL REFERENCES account(id),
                amount TEXT NOT NULL,
                source TEXT,
                type TEXT NOT NULL CHECK (type IN ('income', 'expense', 'non_financial')),
                fund_source TEXT NOT NULL CHECK (fund_source IN ('family', 'private', 'savings')),
                category TEXT NOT NULL,
                description TEXT,
                date TEXT NOT NULL,
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    // Improve performance of the per-family listing.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_family_date ON \"transaction\"(family_id, date)",
        (),
    )?;

    Ok(())
}

/// Map a database row to a [Transaction].
///
/// # Errors
/// Returns a [rusqlite::Error] if a column is missing or holds an unexpected value.
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        family_id: row.get(1)?,
        user_id: row.get(2)?,
        amount: row.get(3)?,
        source: row.get(4)?,
        transaction_type: row.get(5)?,
        fund_source: row.get(6)?,
        category: row.get(7)?,
        description: row.get(8)?,
        date: row.get(9)?,
        created_at: row.get(10)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================
