//! Database ID type definitions.
//!
//! Every entity is keyed by an opaque UUID that is stored as TEXT and
//! serialized as a plain string.

use std::{fmt::Display, str::FromStr};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! database_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0.to_string()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;

                text.parse()
                    .map_err(|error| FromSqlError::Other(Box::new(error)))
            }
        }
    };
}

database_id!(
    /// The ID of a family (household).
    FamilyId
);
database_id!(
    /// The ID of an account, i.e. an internal user record.
    AccountId
);
database_id!(
    /// The ID of a transaction.
    TransactionId
);
database_id!(
    /// The ID of a savings goal.
    SavingsGoalId
);
database_id!(
    /// The ID of an agreement.
    AgreementId
);
