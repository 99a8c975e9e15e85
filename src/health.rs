//! Route handlers that report on the server itself: the banner, the health
//! check and the key set diagnostics.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::{
    AppState,
    auth::KeySetStatus,
    config::{DatabaseProvider, RuntimeMode},
    db::lock,
};

/// The text served at the root path.
pub const BANNER: &str = "Family Ledger API is running";

/// A route handler that returns a plain text banner.
pub async fn get_root() -> &'static str {
    BANNER
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum Presence {
    Configured,
    Missing,
}

impl From<bool> for Presence {
    fn from(is_configured: bool) -> Self {
        if is_configured {
            Presence::Configured
        } else {
            Presence::Missing
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentReport {
    database_provider: DatabaseProvider,
    identity_provider_url: Presence,
    identity_provider_anon_key: Presence,
    key_set: Option<KeySetStatus>,
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    database: &'static str,
    provider: DatabaseProvider,
    mode: RuntimeMode,
    env: EnvironmentReport,
}

/// A route handler that checks the database can be queried and reports how
/// the server is configured.
///
/// Responds with 500 if the database cannot be queried.
pub async fn get_health(State(state): State<AppState>) -> Response {
    let settings = &state.settings;

    let database_check = lock(&state.db_connection).and_then(|connection| {
        connection
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(Into::into)
    });

    if let Err(error) = database_check {
        tracing::error!("Health check failed: {error}");

        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "database": "disconnected",
                "provider": settings.database_provider,
                "message": error.to_string(),
            })),
        )
            .into_response();
    }

    let key_set = match state.identity.key_set() {
        Some(cache) => Some(cache.status().await),
        None => None,
    };

    Json(HealthReport {
        status: "ok",
        database: "connected",
        provider: settings.database_provider,
        mode: settings.mode,
        env: EnvironmentReport {
            database_provider: settings.database_provider,
            identity_provider_url: settings.identity_provider_configured.into(),
            identity_provider_anon_key: settings.anon_key_configured.into(),
            key_set,
        },
    })
    .into_response()
}

/// A route handler that fetches the verification key set (if not already
/// cached) and reports what was fetched.
///
/// Only routed in development mode. Responds with 500 if key set
/// verification is not configured or the keys could not be fetched.
pub async fn get_debug_key_set(State(state): State<AppState>) -> Response {
    let Some(cache) = state.identity.key_set() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Key set verification is not configured" })),
        )
            .into_response();
    };

    // A failed fetch is reported through the status below.
    let _ = cache.get().await;

    match cache.status().await {
        KeySetStatus::Available { keys, sample } => Json(json!({
            "jwksUrl": cache.location(),
            "keys": keys,
            "sample": sample,
        }))
        .into_response(),
        KeySetStatus::Unavailable { error } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "jwksUrl": cache.location(),
                "error": error,
            })),
        )
            .into_response(),
        KeySetStatus::NotFetched => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "jwksUrl": cache.location(),
                "error": "Key set has not been fetched",
            })),
        )
            .into_response(),
    }
}
