//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::{
    Error,
    auth::IdentityResolver,
    config::{Config, DatabaseProvider, InvitePolicy, RuntimeMode},
    db::initialize,
};

/// The origins allowed by default, i.e. the web client in local development.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:3001"];

/// The settings that handlers read at request time.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSettings {
    /// Development mode enables the debug endpoints.
    pub mode: RuntimeMode,
    /// What happens to an invite code once someone joins with it.
    pub invite_policy: InvitePolicy,
    /// Which database target the server was started with.
    pub database_provider: DatabaseProvider,
    /// Whether an identity provider URL is configured.
    pub identity_provider_configured: bool,
    /// Whether the identity provider's anon key is configured.
    pub anon_key_configured: bool,
    /// The origins allowed to call the API from a browser.
    pub allowed_origins: Vec<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::Production,
            invite_policy: InvitePolicy::default(),
            database_provider: DatabaseProvider::Local,
            identity_provider_configured: false,
            anon_key_configured: false,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.map(str::to_owned).to_vec(),
        }
    }
}

impl From<&Config> for AppSettings {
    fn from(config: &Config) -> Self {
        Self {
            mode: config.mode,
            invite_policy: config.invite_policy,
            database_provider: config.database_provider,
            identity_provider_configured: config.identity_provider_url.is_some(),
            anon_key_configured: config.identity_provider_anon_key.is_some(),
            allowed_origins: config.allowed_origins.clone(),
        }
    }
}

/// The state of the REST server.
#[derive(Clone)]
pub struct AppState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,

    /// Verifies the bearer tokens on protected routes.
    pub identity: Arc<IdentityResolver>,

    /// The settings the server was started with.
    pub settings: AppSettings,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(
        db_connection: Connection,
        identity: IdentityResolver,
        settings: AppSettings,
    ) -> Result<Self, Error> {
        initialize(&db_connection)?;

        Ok(Self {
            db_connection: Arc::new(Mutex::new(db_connection)),
            identity: Arc::new(identity),
            settings,
        })
    }
}
