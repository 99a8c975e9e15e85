//! Defines the bearer token payload issued by the identity provider and the
//! claims extracted from it.

use jsonwebtoken::{DecodingKey, Header, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::auth::AuthError;

/// The audience the identity provider puts in tokens for signed in users.
pub const DEFAULT_AUDIENCE: &str = "authenticated";

/// The identity attributes of the caller, taken from a verified credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    /// The identity provider's stable ID for the user.
    pub subject_id: String,
    /// The user's email address, if the provider shared it.
    pub email: Option<String>,
    /// The user's display name.
    pub display_name: Option<String>,
    /// The URL of the user's avatar image.
    pub avatar_url: Option<String>,
}

impl Claims {
    /// Build claims from a subject ID and the provider's profile fields.
    ///
    /// # Errors
    /// Returns [AuthError::MissingSubject] if `subject_id` is empty.
    pub fn from_profile(
        subject_id: Option<String>,
        email: Option<String>,
        user_metadata: UserMetadata,
    ) -> Result<Self, AuthError> {
        let subject_id = subject_id
            .filter(|subject_id| !subject_id.is_empty())
            .ok_or(AuthError::MissingSubject)?;

        Ok(Self {
            subject_id,
            email: non_empty(email).or(non_empty(user_metadata.email)),
            display_name: non_empty(user_metadata.full_name).or(non_empty(user_metadata.name)),
            avatar_url: non_empty(user_metadata.avatar_url).or(non_empty(user_metadata.picture)),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Profile fields the identity provider attaches to a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub picture: Option<String>,
}

/// The `aud` claim, which may be a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

/// The claim set of a token issued by the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub sub: Option<String>,
    pub email: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_metadata: UserMetadata,
    pub exp: Option<i64>,
    pub iss: Option<String>,
    pub aud: Option<Audience>,
}

fn null_as_default<'de, D>(deserializer: D) -> Result<UserMetadata, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<UserMetadata>::deserialize(deserializer)?.unwrap_or_default())
}

impl TokenPayload {
    /// The audiences to expect when verifying the token signature.
    ///
    /// Falls back to [DEFAULT_AUDIENCE] when the token carries no `aud` claim.
    pub fn expected_audiences(&self) -> Vec<String> {
        match &self.aud {
            Some(Audience::One(audience)) => vec![audience.clone()],
            Some(Audience::Many(audiences)) if !audiences.is_empty() => audiences.clone(),
            _ => vec![DEFAULT_AUDIENCE.to_owned()],
        }
    }
}

impl TryFrom<TokenPayload> for Claims {
    type Error = AuthError;

    fn try_from(payload: TokenPayload) -> Result<Self, Self::Error> {
        Claims::from_profile(payload.sub, payload.email, payload.user_metadata)
    }
}

/// A token whose header and payload have been decoded but whose signature has
/// not been checked.
#[derive(Debug, Clone)]
pub struct UnverifiedToken {
    pub header: Header,
    pub payload: TokenPayload,
}

impl UnverifiedToken {
    /// Decode `token` without verifying its signature.
    ///
    /// # Errors
    /// Returns [AuthError::Malformed] if `token` is not a structurally valid JWT.
    pub fn decode(token: &str) -> Result<Self, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::Malformed)?;

        let mut validation = Validation::new(header.alg);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let payload = decode::<TokenPayload>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|_| AuthError::Malformed)?
            .claims;

        Ok(Self { header, payload })
    }

    /// Fail with [AuthError::Expired] if the `exp` claim lies before `now`.
    ///
    /// Tokens without an `exp` claim pass this check; signature verification
    /// decides whether they are acceptable.
    pub fn check_expiry(&self, now: OffsetDateTime) -> Result<(), AuthError> {
        match self.payload.exp {
            Some(expiry) if expiry < now.unix_timestamp() => Err(AuthError::Expired),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::{Duration, OffsetDateTime};

    use crate::{
        auth::{AuthError, Claims, UnverifiedToken},
        test_utils::sign_token,
    };

    #[test]
    fn decodes_unverified_claims() {
        let token = sign_token(
            "some-other-secret",
            json!({
                "sub": "user-1",
                "email": "ani@example.com",
                "exp": OffsetDateTime::now_utc().unix_timestamp() + 60,
                "user_metadata": { "full_name": "Ani", "picture": "https://example.com/a.png" },
            }),
        );

        let unverified = UnverifiedToken::decode(&token).unwrap();
        let claims = Claims::try_from(unverified.payload).unwrap();

        assert_eq!(
            claims,
            Claims {
                subject_id: "user-1".to_owned(),
                email: Some("ani@example.com".to_owned()),
                display_name: Some("Ani".to_owned()),
                avatar_url: Some("https://example.com/a.png".to_owned()),
            }
        );
    }

    #[test]
    fn falls_back_to_metadata_email_and_name() {
        let token = sign_token(
            "secret",
            json!({
                "sub": "user-2",
                "user_metadata": { "email": "budi@example.com", "name": "Budi" },
            }),
        );

        let claims = Claims::try_from(UnverifiedToken::decode(&token).unwrap().payload).unwrap();

        assert_eq!(claims.email.as_deref(), Some("budi@example.com"));
        assert_eq!(claims.display_name.as_deref(), Some("Budi"));
        assert_eq!(claims.avatar_url, None);
    }

    #[test]
    fn null_user_metadata_is_accepted() {
        let token = sign_token("secret", json!({ "sub": "user-3", "user_metadata": null }));

        let unverified = UnverifiedToken::decode(&token).unwrap();

        assert_eq!(unverified.payload.sub.as_deref(), Some("user-3"));
    }

    #[test]
    fn rejects_garbage() {
        let result = UnverifiedToken::decode("definitely.not.ajwt");

        assert!(matches!(result, Err(AuthError::Malformed)));
    }

    #[test]
    fn missing_subject_is_rejected() {
        let token = sign_token("secret", json!({ "email": "a@b.c" }));

        let result = Claims::try_from(UnverifiedToken::decode(&token).unwrap().payload);

        assert_eq!(result, Err(AuthError::MissingSubject));
    }

    #[test]
    fn expiry_in_the_past_fails() {
        let now = OffsetDateTime::now_utc();
        let token = sign_token(
            "secret",
            json!({ "sub": "user-1", "exp": (now - Duration::seconds(1)).unix_timestamp() }),
        );

        let unverified = UnverifiedToken::decode(&token).unwrap();

        assert_eq!(unverified.check_expiry(now), Err(AuthError::Expired));
    }

    #[test]
    fn token_without_expiry_passes_expiry_check() {
        let token = sign_token("secret", json!({ "sub": "user-1" }));

        let unverified = UnverifiedToken::decode(&token).unwrap();

        assert_eq!(unverified.check_expiry(OffsetDateTime::now_utc()), Ok(()));
    }
}
