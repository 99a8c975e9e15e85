//! Application router configuration with protected and unprotected route definitions.

use std::time::Duration;

use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{
    AppState, Error,
    auth::auth_guard,
    config::RuntimeMode,
    endpoints,
    health::{get_debug_key_set, get_health, get_root},
    ledger::get_family_summary,
    logging::logging_middleware,
    membership::{get_current_account, get_membership_status, join_endpoint, register_endpoint},
    savings_goal::{create_savings_goal_endpoint, get_savings_goals_endpoint},
    transaction::{create_transaction_endpoint, get_transactions_endpoint},
};

/// How long browsers may cache the result of a CORS preflight request.
const CORS_MAX_AGE: Duration = Duration::from_secs(600);

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let mut unprotected_routes = Router::new()
        .route(endpoints::ROOT, get(get_root))
        .route(endpoints::HEALTH, get(get_health))
        .route(endpoints::AUTH_STATUS, get(get_membership_status));

    if state.settings.mode == RuntimeMode::Development {
        unprotected_routes =
            unprotected_routes.route(endpoints::DEBUG_KEY_SET, get(get_debug_key_set));
    }

    let protected_routes = Router::new()
        .route(endpoints::REGISTER, post(register_endpoint))
        .route(endpoints::JOIN, post(join_endpoint))
        .route(endpoints::ME, get(get_current_account))
        .route(endpoints::FAMILY_SUMMARY, get(get_family_summary))
        .route(
            endpoints::SAVINGS_GOALS,
            get(get_savings_goals_endpoint).post(create_savings_goal_endpoint),
        )
        .route(
            endpoints::TRANSACTIONS,
            get(get_transactions_endpoint).post(create_transaction_endpoint),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    let cors = build_cors_layer(&state.settings.allowed_origins);

    protected_routes
        .merge(unprotected_routes)
        .fallback(get_404_not_found)
        .layer(middleware::from_fn(logging_middleware))
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(origin) => Some(origin),
            Err(error) => {
                tracing::warn!("Ignoring invalid allowed origin {origin:?}: {error}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(CORS_MAX_AGE)
}

async fn get_404_not_found() -> Response {
    Error::NotFound.into_response()
}
