//! Defines the endpoints for recording and listing a family's transactions.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State, rejection::JsonRejection},
};
use rusqlite::Connection;
use serde::Deserialize;
use time::{
    Date, OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339,
    macros::format_description,
};

use crate::{
    AppState, Error,
    auth::Claims,
    db::lock,
    membership::resolve_family_member,
    money::Money,
    transaction::core::{
        FundSource, Transaction, TransactionBuilder, TransactionType, create_transaction,
        get_transactions_for_family,
    },
};

/// The state needed to get or create a transaction.
#[derive(Debug, Clone)]
pub struct TransactionState {
    /// The database connection for managing transactions.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for TransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The request body for recording a transaction.
///
/// Every field is optional here so that a missing field is reported as
/// "Missing required fields" rather than a deserialization error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// The unsigned amount, as a JSON number or string.
    pub amount: Option<Money>,
    pub source: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    pub fund_source: Option<String>,
    /// When the transaction happened, RFC 3339 or a plain date. Defaults to now.
    pub date: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn parse_date(text: &str) -> Result<OffsetDateTime, Error> {
    if let Ok(date_time) = OffsetDateTime::parse(text, &Rfc3339) {
        return Ok(date_time.to_offset(UtcOffset::UTC));
    }

    Date::parse(text, format_description!("[year]-[month]-[day]"))
        .map(|date| date.midnight().assume_utc())
        .map_err(|_| Error::InvalidInput(format!("invalid date \"{text}\"")))
}

impl TryFrom<TransactionRequest> for TransactionBuilder {
    type Error = Error;

    fn try_from(request: TransactionRequest) -> Result<Self, Self::Error> {
        // A zero amount counts as missing.
        let amount = request.amount.filter(|amount| *amount != Money::ZERO);
        let category = non_empty(request.category);
        let transaction_type = non_empty(request.transaction_type);
        let fund_source = non_empty(request.fund_source);

        let (Some(amount), Some(category), Some(transaction_type), Some(fund_source)) =
            (amount, category, transaction_type, fund_source)
        else {
            return Err(Error::MissingFields);
        };

        let amount = amount.check_limit()?;

        let transaction_type = transaction_type
            .parse::<TransactionType>()
            .map_err(|error| Error::InvalidInput(error.to_string()))?;
        let fund_source = fund_source
            .parse::<FundSource>()
            .map_err(|error| Error::InvalidInput(error.to_string()))?;
        let date = non_empty(request.date)
            .map(|text| parse_date(&text))
            .transpose()?;

        Ok(
            Transaction::build(amount, transaction_type, fund_source, &category)
                .source(non_empty(request.source))
                .description(non_empty(request.description))
                .date(date),
        )
    }
}

/// A route handler for recording a new transaction in the caller's family.
pub async fn create_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<Json<Transaction>, Error> {
    let Json(request) = body?;
    let builder = TransactionBuilder::try_from(request)?;

    let connection = lock(&state.db_connection)?;
    let member = resolve_family_member(&claims.subject_id, &connection)?;

    let transaction = create_transaction(
        builder,
        member.family_id,
        member.account.id,
        OffsetDateTime::now_utc(),
        &connection,
    )?;

    tracing::debug!(
        "Recorded transaction {} for family {}",
        transaction.id,
        transaction.family_id
    );

    Ok(Json(transaction))
}

/// A route handler that lists the caller's family's transactions, most recent first.
pub async fn get_transactions_endpoint(
    State(state): State<TransactionState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Transaction>>, Error> {
    let connection = lock(&state.db_connection)?;
    let member = resolve_family_member(&claims.subject_id, &connection)?;

    Ok(Json(get_transactions_for_family(
        member.family_id,
        &connection,
    )?))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Extension, Json, extract::State, http::StatusCode};
    use rust_decimal_macros::dec;
    use serde_json::{Value, json};
    use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};

    use crate::{
        AppSettings, Error, endpoints,
        auth::Claims,
        money::Money,
        test_utils::{
            bearer_token, get_test_connection, get_test_server, get_test_state, insert_member,
        },
        transaction::{
            core::{FundSource, TransactionBuilder, TransactionType},
            create_endpoint::{TransactionRequest, TransactionState, create_transaction_endpoint},
        },
    };

    fn request(body: Value) -> TransactionRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn builds_from_complete_request() {
        let builder = TransactionBuilder::try_from(request(json!({
            "amount": "50000",
            "category": "Food",
            "type": "expense",
            "fundSource": "family",
            "description": "",
            "date": "2025-01-15",
        })))
        .unwrap();

        assert_eq!(builder.amount, Money::from(dec!(50000)));
        assert_eq!(builder.transaction_type, TransactionType::Expense);
        assert_eq!(builder.fund_source, FundSource::Family);
        assert_eq!(builder.description, None);
        assert_eq!(
            builder.date,
            Some(time::macros::datetime!(2025-01-15 00:00 UTC))
        );
    }

    #[test]
    fn missing_or_zero_fields_are_missing() {
        let bodies = [
            json!({ "category": "Food", "type": "expense", "fundSource": "family" }),
            json!({ "amount": 0, "category": "Food", "type": "expense", "fundSource": "family" }),
            json!({ "amount": 10, "category": "", "type": "expense", "fundSource": "family" }),
            json!({ "amount": 10, "category": "Food", "fundSource": "family" }),
            json!({ "amount": 10, "category": "Food", "type": "expense" }),
        ];

        for body in bodies {
            let result = TransactionBuilder::try_from(request(body.clone()));
            assert_eq!(result, Err(Error::MissingFields), "for body {body}");
        }
    }

    #[test]
    fn amount_over_limit_is_invalid() {
        let result = TransactionBuilder::try_from(request(json!({
            "amount": "1000000000000000.01",
            "category": "Food",
            "type": "income",
            "fundSource": "family",
        })));

        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn offset_date_is_converted_to_utc() {
        let builder = TransactionBuilder::try_from(request(json!({
            "amount": 1, "category": "Food", "type": "income", "fundSource": "family",
            "date": "2025-03-01T10:00:00+07:00",
        })))
        .unwrap();

        assert_eq!(
            builder.date,
            Some(time::macros::datetime!(2025-03-01 03:00 UTC))
        );
    }

    #[test]
    fn unknown_type_is_invalid() {
        let result = TransactionBuilder::try_from(request(json!({
            "amount": 10, "category": "Food", "type": "refund", "fundSource": "family",
        })));

        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn create_without_family_is_not_found() {
        let state = TransactionState {
            db_connection: Arc::new(Mutex::new(get_test_connection())),
        };
        let claims = Claims {
            subject_id: "sub-1".to_owned(),
            email: Some("ani@example.com".to_owned()),
            display_name: None,
            avatar_url: None,
        };

        let result = create_transaction_endpoint(
            State(state),
            Extension(claims),
            Ok(Json(request(json!({
                "amount": 10, "category": "Food", "type": "expense", "fundSource": "family",
            })))),
        )
        .await;

        assert_eq!(result.err(), Some(Error::FamilyNotFound));
    }

    #[tokio::test]
    async fn create_then_list_round_trip() {
        let state = get_test_state(AppSettings::default());
        insert_member(
            &state.db_connection.lock().unwrap(),
            "sub-1",
            "ani@example.com",
            None,
        );
        let server = get_test_server(state);
        let token = bearer_token("sub-1", "ani@example.com", None);

        let created = server
            .post(endpoints::TRANSACTIONS)
            .authorization_bearer(token.clone())
            .json(&json!({
                "amount": 50000,
                "category": "Food",
                "type": "expense",
                "fundSource": "family",
            }))
            .await;
        created.assert_status_ok();
        let created = created.json::<Value>();

        let listed = server
            .get(endpoints::TRANSACTIONS)
            .authorization_bearer(token)
            .await
            .json::<Value>();

        assert_eq!(created["amount"], "50000.00");
        assert_eq!(created["type"], "expense");
        assert_eq!(created["fundSource"], "family");
        assert_eq!(listed, json!([created]));
    }

    #[tokio::test]
    async fn lists_most_recent_first() {
        let state = get_test_state(AppSettings::default());
        insert_member(
            &state.db_connection.lock().unwrap(),
            "sub-1",
            "ani@example.com",
            None,
        );
        let server = get_test_server(state);
        let token = bearer_token("sub-1", "ani@example.com", None);
        let now = OffsetDateTime::now_utc();

        for (category, days_ago) in [("Old", 10), ("New", 1), ("Middle", 5)] {
            server
                .post(endpoints::TRANSACTIONS)
                .authorization_bearer(token.clone())
                .json(&json!({
                    "amount": 1,
                    "category": category,
                    "type": "income",
                    "fundSource": "family",
                    "date": (now - Duration::days(days_ago)).format(&Rfc3339).unwrap(),
                }))
                .await
                .assert_status_ok();
        }

        let listed = server
            .get(endpoints::TRANSACTIONS)
            .authorization_bearer(token)
            .await
            .json::<Vec<Value>>();

        let categories: Vec<&str> = listed
            .iter()
            .map(|transaction| transaction["category"].as_str().unwrap())
            .collect();
        assert_eq!(categories, ["New", "Middle", "Old"]);
    }

    #[tokio::test]
    async fn lists_by_instant_across_offsets() {
        let state = get_test_state(AppSettings::default());
        insert_member(
            &state.db_connection.lock().unwrap(),
            "sub-1",
            "ani@example.com",
            None,
        );
        let server = get_test_server(state);
        let token = bearer_token("sub-1", "ani@example.com", None);

        for (category, date) in [
            ("Jakarta", "2025-03-01T10:00:00+07:00"),
            ("London", "2025-03-01T05:00:00Z"),
        ] {
            server
                .post(endpoints::TRANSACTIONS)
                .authorization_bearer(token.clone())
                .json(&json!({
                    "amount": 1,
                    "category": category,
                    "type": "income",
                    "fundSource": "family",
                    "date": date,
                }))
                .await
                .assert_status_ok();
        }

        let listed = server
            .get(endpoints::TRANSACTIONS)
            .authorization_bearer(token)
            .await
            .json::<Vec<Value>>();

        assert_eq!(listed[0]["category"], "London");
        assert_eq!(listed[1]["category"], "Jakarta");
        assert_eq!(listed[1]["date"], "2025-03-01T03:00:00Z");
    }

    #[tokio::test]
    async fn future_date_is_bad_request() {
        let state = get_test_state(AppSettings::default());
        insert_member(
            &state.db_connection.lock().unwrap(),
            "sub-1",
            "ani@example.com",
            None,
        );
        let server = get_test_server(state);
        let tomorrow = OffsetDateTime::now_utc() + Duration::days(1);

        let response = server
            .post(endpoints::TRANSACTIONS)
            .authorization_bearer(bearer_token("sub-1", "ani@example.com", None))
            .json(&json!({
                "amount": 1,
                "category": "Salary",
                "type": "income",
                "fundSource": "family",
                "date": tomorrow.format(&Rfc3339).unwrap(),
            }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_fields_is_bad_request() {
        let state = get_test_state(AppSettings::default());
        let server = get_test_server(state);

        let response = server
            .post(endpoints::TRANSACTIONS)
            .authorization_bearer(bearer_token("sub-1", "ani@example.com", None))
            .json(&json!({ "amount": 10 }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["error"], "Missing required fields");
    }
}
