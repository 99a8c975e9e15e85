//! Server configuration read from command line flags and the environment.

use std::{fmt::Display, path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};
use serde::Serialize;

use crate::auth::IdentitySettings;

/// Whether the server runs for local development or for real users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// Enables the insecure unverified-token fallback and the debug endpoints.
    Development,
    Production,
}

impl Display for RuntimeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeMode::Development => write!(f, "development"),
            RuntimeMode::Production => write!(f, "production"),
        }
    }
}

/// Which database target to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseProvider {
    /// A database on the local machine.
    Local,
    /// A database managed by the hosting provider.
    Hosted,
}

impl Display for DatabaseProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseProvider::Local => write!(f, "local"),
            DatabaseProvider::Hosted => write!(f, "hosted"),
        }
    }
}

/// What happens to a family's invite code once someone joins with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum InvitePolicy {
    /// The code stays valid for further joins until it expires.
    #[default]
    Reusable,
    /// The code is cleared by the first successful join.
    SingleUse,
}

/// The configuration for the family ledger server.
#[derive(Parser, Debug, Clone)]
#[command(version, about = "The REST API server for the family ledger.", long_about = None)]
pub struct Config {
    /// The port to serve the API from.
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Which database target to use.
    #[arg(long, env = "DATABASE_PROVIDER", value_enum, default_value_t = DatabaseProvider::Local)]
    pub database_provider: DatabaseProvider,

    /// File path to the local SQLite database.
    #[arg(long, env = "DATABASE_URL", default_value = "family_ledger.db")]
    pub database_url: PathBuf,

    /// File path to the hosted SQLite database, used when the provider is `hosted`.
    #[arg(long, env = "HOSTED_DATABASE_URL")]
    pub hosted_database_url: Option<PathBuf>,

    /// The identity provider's base URL, e.g. "https://abc.supabase.co".
    #[arg(long, env = "SUPABASE_URL")]
    pub identity_provider_url: Option<String>,

    /// The identity provider's public anon key.
    #[arg(long, env = "SUPABASE_ANON_KEY")]
    pub identity_provider_anon_key: Option<String>,

    /// A secret shared with the identity provider for HS256 signed tokens.
    #[arg(long, env = "SUPABASE_JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// The runtime mode.
    #[arg(long, env = "APP_ENV", value_enum, default_value_t = RuntimeMode::Production)]
    pub mode: RuntimeMode,

    /// Whether invite codes stay valid after someone joins with them.
    #[arg(long, env = "INVITE_POLICY", value_enum, default_value_t = InvitePolicy::Reusable)]
    pub invite_policy: InvitePolicy,

    /// How many hours a fetched verification key set is cached.
    #[arg(long, env = "KEY_SET_REFRESH_HOURS", default_value_t = 12)]
    pub key_set_refresh_hours: u64,

    /// The origins allowed to call the API from a browser.
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000,http://localhost:3001"
    )]
    pub allowed_origins: Vec<String>,

    /// File path for the debug log.
    #[arg(long, env = "LOG_PATH", default_value = "debug.log")]
    pub log_path: PathBuf,
}

/// Errors in an otherwise well-formed configuration.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    /// The hosted provider was selected without a hosted database.
    #[error("HOSTED_DATABASE_URL must be set when DATABASE_PROVIDER is \"hosted\"")]
    MissingHostedDatabase,
}

impl Config {
    /// The database file to open for the selected provider.
    ///
    /// # Errors
    /// Returns [ConfigError::MissingHostedDatabase] if the hosted provider is
    /// selected but no hosted database is configured.
    pub fn database_path(&self) -> Result<&PathBuf, ConfigError> {
        match self.database_provider {
            DatabaseProvider::Local => Ok(&self.database_url),
            DatabaseProvider::Hosted => self
                .hosted_database_url
                .as_ref()
                .ok_or(ConfigError::MissingHostedDatabase),
        }
    }

    /// The identity provider settings.
    pub fn identity_settings(&self) -> IdentitySettings {
        IdentitySettings {
            provider_url: self.identity_provider_url.clone(),
            anon_key: self.identity_provider_anon_key.clone(),
            jwt_secret: self.jwt_secret.clone(),
            mode: self.mode,
            key_set_refresh_interval: Duration::from_secs(self.key_set_refresh_hours * 60 * 60),
        }
    }
}
