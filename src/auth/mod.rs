//! Authentication delegated to an external identity provider.
//!
//! Bearer tokens are verified by an [IdentityResolver] and the resulting
//! [Claims] are placed in the request extensions by [auth_guard].

mod key_set;
mod middleware;
mod resolver;
mod strategy;
mod token;

pub use key_set::{
    DEFAULT_REFRESH_INTERVAL, HttpKeySetFetcher, KeySetCache, KeySetFetcher, KeySetStatus,
    KeySummary, key_set_url,
};
pub use middleware::{AuthState, auth_guard};
pub use resolver::{IdentityResolver, IdentitySettings};
pub use strategy::{
    IntrospectionStrategy, KeySetStrategy, SharedSecretStrategy, UnverifiedStrategy,
    VerificationStrategy,
};
pub use token::{Audience, Claims, DEFAULT_AUDIENCE, TokenPayload, UnverifiedToken, UserMetadata};

/// The reasons a bearer token can be rejected.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    /// The request has no `Authorization: Bearer` header.
    #[error("Unauthorized - No token provided")]
    MissingToken,

    /// The token is not a structurally valid JWT.
    #[error("Invalid JWT format")]
    Malformed,

    /// The token's `exp` claim has passed.
    #[error("Token expired")]
    Expired,

    /// No verification strategy accepted the token.
    #[error("Unauthorized - Invalid token")]
    InvalidToken,

    /// The verified claims have no subject.
    #[error("token has no subject")]
    MissingSubject,

    /// The verified claims have no email address, which registration requires.
    #[error("Invalid authentication")]
    MissingEmail,

    /// The token names a signing key that is not in the published key set.
    #[error("the signing key is not in the published key set")]
    UnknownSigningKey,

    /// The published key set could not be fetched.
    #[error("the verification key set is unavailable: {0}")]
    KeySetUnavailable(String),

    /// The identity provider could not be reached or sent an unreadable reply.
    #[error("the identity provider could not be reached: {0}")]
    ProviderUnreachable(String),
}

impl AuthError {
    /// A stable, machine readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::Malformed => "malformed_token",
            AuthError::Expired => "expired",
            AuthError::MissingEmail => "missing_email",
            _ => "invalid_token",
        }
    }
}
