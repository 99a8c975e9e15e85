#![allow(missing_docs)]

use async_trait::async_trait;
use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_test::TestServer;
use jsonwebtoken::{EncodingKey, Header, encode, jwk::JwkSet};
use rusqlite::Connection;
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::{
    AppSettings, AppState,
    account::{Account, NewAccount, create_account},
    auth::{IdentityResolver, KeySetFetcher, SharedSecretStrategy},
    build_router,
    database_id::FamilyId,
    db::initialize,
    family::{INVITE_CODE_LIFETIME, create_family, generate_invite_code},
};

pub(crate) const TEST_JWT_SECRET: &str = "family-ledger-test-secret";

/// The raw secret behind the `oct` key in [test_key_set].
pub(crate) const TEST_KEY_SET_SECRET: &str = "household-ledger-jwks-test-key-01";

#[track_caller]
pub(crate) fn sign_token(secret: &str, claims: Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("could not sign test token")
}

#[track_caller]
pub(crate) fn sign_token_with_kid(secret: &str, kid: &str, claims: Value) -> String {
    let header = Header {
        kid: Some(kid.to_owned()),
        ..Header::default()
    };

    encode(&header, &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .expect("could not sign test token")
}

/// A key set with a single HS256 key, "test-key", for [TEST_KEY_SET_SECRET].
pub(crate) fn test_key_set() -> JwkSet {
    serde_json::from_value(json!({
        "keys": [{
            "kty": "oct",
            "kid": "test-key",
            "alg": "HS256",
            "k": "aG91c2Vob2xkLWxlZGdlci1qd2tzLXRlc3Qta2V5LTAx",
        }]
    }))
    .expect("could not parse test key set")
}

/// A key set fetcher that always returns the same outcome.
pub(crate) struct StaticKeySetFetcher(pub Result<JwkSet, String>);

#[async_trait]
impl KeySetFetcher for StaticKeySetFetcher {
    async fn fetch(&self) -> Result<JwkSet, String> {
        self.0.clone()
    }

    fn location(&self) -> &str {
        "test://keys"
    }
}

/// The anon key that [spawn_identity_provider] expects.
pub(crate) const TEST_ANON_KEY: &str = "test-anon-key";

async fn get_provider_user(headers: HeaderMap) -> Response {
    let has_anon_key = headers
        .get("apikey")
        .is_some_and(|anon_key| anon_key == TEST_ANON_KEY);
    let has_bearer = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("Bearer "));

    if !(has_anon_key && has_bearer) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    Json(json!({
        "id": "provider-user",
        "email": "ani@example.com",
        "user_metadata": { "full_name": "Ani Tane" },
    }))
    .into_response()
}

/// Serve a stand-in identity provider on a local port and return its base URL.
///
/// Only `/auth/v1/user` is served, so key set fetches fail with 404. The user
/// endpoint answers 401 unless the request carries [TEST_ANON_KEY].
pub(crate) async fn spawn_identity_provider() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("could not bind test identity provider");
    let addr = listener
        .local_addr()
        .expect("could not get test identity provider address");
    let app = Router::new().route("/auth/v1/user", get(get_provider_user));

    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("test identity provider failed");
    });

    format!("http://{addr}")
}

/// A token for `subject_id` that the test server accepts for the next hour.
pub(crate) fn bearer_token(subject_id: &str, email: &str, name: Option<&str>) -> String {
    sign_token(
        TEST_JWT_SECRET,
        json!({
            "sub": subject_id,
            "email": email,
            "aud": "authenticated",
            "exp": OffsetDateTime::now_utc().unix_timestamp() + 3600,
            "user_metadata": { "full_name": name },
        }),
    )
}

pub(crate) fn get_test_connection() -> Connection {
    let conn = Connection::open_in_memory().expect("could not open in-memory database");
    initialize(&conn).expect("could not initialize database");
    conn
}

/// Insert an account for `subject_id`, in `family_id` or else a new family.
#[track_caller]
pub(crate) fn insert_member(
    conn: &Connection,
    subject_id: &str,
    email: &str,
    family_id: Option<FamilyId>,
) -> Account {
    let now = OffsetDateTime::now_utc();

    let family_id = family_id.unwrap_or_else(|| {
        create_family(
            &format!("{subject_id}'s Family"),
            &generate_invite_code(&mut rand::thread_rng()),
            now + INVITE_CODE_LIFETIME,
            now,
            conn,
        )
        .expect("could not create test family")
        .id
    });

    create_account(
        NewAccount {
            subject_id: subject_id.to_owned(),
            name: subject_id.to_owned(),
            email: email.to_owned(),
            avatar_url: None,
            family_id: Some(family_id),
        },
        now,
        conn,
    )
    .expect("could not create test account")
}

pub(crate) fn get_test_state(settings: AppSettings) -> AppState {
    AppState::new(
        Connection::open_in_memory().expect("could not open in-memory database"),
        IdentityResolver::new().with_strategy(SharedSecretStrategy::new(TEST_JWT_SECRET)),
        settings,
    )
    .expect("could not create test state")
}

pub(crate) fn get_test_server(state: AppState) -> TestServer {
    TestServer::try_new(build_router(state)).expect("could not create test server")
}
