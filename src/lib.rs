//! Family Ledger is a REST API for tracking a household's shared and private
//! finances.
//!
//! Members of a family sign in through an external identity provider, record
//! income, expenses and non-financial contributions, and track savings goals.
//! The API reports three balances per caller: the family's shared balance, the
//! caller's private balance and the family's total savings.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde::Serialize;
use tokio::signal;

mod account;
mod agreement;
mod app_state;
pub mod auth;
pub mod config;
mod database_id;
mod db;
mod endpoints;
mod family;
mod health;
mod ledger;
mod logging;
mod membership;
mod money;
mod routing;
mod savings_goal;
mod transaction;

#[cfg(test)]
mod test_utils;

pub use account::{Account, get_account_by_subject_id};
pub use agreement::{
    Agreement, AgreementStatus, AgreementType, create_agreement, get_agreements_for_family,
};
pub use app_state::{AppSettings, AppState};
pub use database_id::{AccountId, AgreementId, FamilyId, SavingsGoalId, TransactionId};
pub use db::{initialize as initialize_db, open as open_db};
pub use family::Family;
pub use ledger::{FamilySummary, summarize};
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use money::Money;
pub use routing::build_router;
pub use savings_goal::{GoalStatus, SavingsGoal};
pub use transaction::{FundSource, Transaction, TransactionType};

use crate::auth::AuthError;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
        },
    }

    handle.graceful_shutdown(Some(Duration::from_secs(1)));
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The bearer token was missing, malformed, expired or could not be verified.
    #[error("{0}")]
    Unauthorized(#[from] AuthError),

    /// One or more required fields were missing from the request body.
    #[error("Missing required fields")]
    MissingFields,

    /// A single named field was missing from the request.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A field was present but its value is not acceptable.
    #[error("{0}")]
    InvalidInput(String),

    /// No family has the given invite code.
    #[error("Invalid invite code")]
    InvalidInviteCode,

    /// The family's invite code has expired.
    #[error("Invite code expired")]
    InviteCodeExpired,

    /// An account already exists for the caller's identity.
    #[error("User already registered")]
    AlreadyRegistered,

    /// Another account already uses the caller's email address.
    #[error("the email address is already registered to another account")]
    DuplicateEmail,

    /// The generated invite code collided with an existing one.
    ///
    /// Collisions are rare enough that the client is simply asked to try again.
    #[error("the generated invite code is already in use, please try again")]
    DuplicateInviteCode,

    /// The caller's identity has no account.
    #[error("User not found")]
    AccountNotFound,

    /// The caller has no account or the account has no family yet.
    #[error("User or family not found")]
    FamilyNotFound,

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// A service the request depends on could not be reached.
    #[error("an upstream service failed: {0}")]
    UpstreamFailure(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// A running total no longer fits in a [Money] value.
    #[error("the amounts are too large to total")]
    AmountOverflow,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                if desc.ends_with("account.subject_id") {
                    Error::AlreadyRegistered
                } else if desc.ends_with("account.email") {
                    Error::DuplicateEmail
                } else if desc.ends_with("family.invite_code") {
                    Error::DuplicateInviteCode
                } else {
                    tracing::error!("an unhandled UNIQUE constraint failure: {desc}");
                    Error::SqlError(value)
                }
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::InvalidInput(rejection.body_text())
    }
}

/// The JSON body sent to the client when a request fails.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::MissingFields
            | Error::MissingField(_)
            | Error::InvalidInput(_)
            | Error::InvalidInviteCode
            | Error::InviteCodeExpired
            | Error::AlreadyRegistered => StatusCode::BAD_REQUEST,
            Error::DuplicateEmail | Error::DuplicateInviteCode => StatusCode::CONFLICT,
            Error::AccountNotFound | Error::FamilyNotFound | Error::NotFound => {
                StatusCode::NOT_FOUND
            }
            Error::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            Error::SqlError(_) | Error::DatabaseLockError | Error::AmountOverflow => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> Option<String> {
        match self {
            Error::Unauthorized(error) => Some(error.code().to_owned()),
            Error::AlreadyRegistered | Error::DuplicateEmail | Error::DuplicateInviteCode => {
                Some("conflict".to_owned())
            }
            Error::SqlError(rusqlite::Error::SqliteFailure(sql_error, _)) => {
                Some(format!("sqlite_{}", sql_error.extended_code))
            }
            _ => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        let message = match &self {
            // Internal details are only intended for the server logs.
            Error::SqlError(_) | Error::DatabaseLockError => {
                tracing::error!("An unexpected error occurred: {}", self);
                "An unexpected database error occurred, check the server logs for more details."
                    .to_owned()
            }
            error => error.to_string(),
        };

        (
            status,
            Json(ErrorBody {
                error: message,
                code,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod error_tests {
    use axum::{http::StatusCode, response::IntoResponse};
    use rusqlite::Connection;

    use crate::{Error, auth::AuthError};

    #[test]
    fn unique_violation_on_email_is_a_conflict() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE account (email TEXT UNIQUE)", ())
            .unwrap();
        conn.execute("INSERT INTO account (email) VALUES ('a@b.c')", ())
            .unwrap();

        let error: Error = conn
            .execute("INSERT INTO account (email) VALUES ('a@b.c')", ())
            .unwrap_err()
            .into();

        assert_eq!(error, Error::DuplicateEmail);
    }

    #[test]
    fn no_rows_is_not_found() {
        let error: Error = rusqlite::Error::QueryReturnedNoRows.into();

        assert_eq!(error, Error::NotFound);
    }

    #[test]
    fn maps_to_status_codes() {
        let cases = [
            (Error::Unauthorized(AuthError::Expired), StatusCode::UNAUTHORIZED),
            (Error::MissingFields, StatusCode::BAD_REQUEST),
            (Error::InviteCodeExpired, StatusCode::BAD_REQUEST),
            (Error::AlreadyRegistered, StatusCode::BAD_REQUEST),
            (Error::DuplicateInviteCode, StatusCode::CONFLICT),
            (Error::FamilyNotFound, StatusCode::NOT_FOUND),
            (Error::DatabaseLockError, StatusCode::INTERNAL_SERVER_ERROR),
            (Error::AmountOverflow, StatusCode::INTERNAL_SERVER_ERROR),
            (Error::Unauthorized(AuthError::MissingEmail), StatusCode::UNAUTHORIZED),
        ];

        for (error, want) in cases {
            let got = error.into_response().status();
            assert_eq!(got, want);
        }
    }
}
