//! Maps verified identities to accounts and families.

use rusqlite::Connection;
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    Error,
    account::{
        Account, NewAccount, create_account, find_account_by_email, find_account_by_subject_id,
    },
    auth::{AuthError, Claims},
    config::InvitePolicy,
    database_id::FamilyId,
    family::{
        Family, INVITE_CODE_LIFETIME, clear_invite_code, create_family, family_name_for,
        find_family_by_invite_code, get_family,
    },
};

/// The name used when the identity has neither a name nor a usable email address.
pub const FALLBACK_DISPLAY_NAME: &str = "User";

/// An account that belongs to a family.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyMember {
    pub account: Account,
    pub family_id: FamilyId,
}

/// The records created when the first member of a family registers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(rename = "user")]
    pub account: Account,
    pub family: Family,
    /// The plaintext invite code. Only ever returned here.
    pub invite_code: String,
}

/// The records created when someone joins an existing family.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Membership {
    #[serde(rename = "user")]
    pub account: Account,
    pub family: Family,
}

/// Whether an email address belongs to a registered account.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipStatus {
    pub registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_family: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Account>,
}

/// The name to show for a new account: the identity's name, else the local
/// part of its email address, else [FALLBACK_DISPLAY_NAME].
pub fn display_name(claims: &Claims) -> String {
    claims
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .or_else(|| {
            claims
                .email
                .as_deref()
                .and_then(|email| email.split('@').next())
                .filter(|local_part| !local_part.is_empty())
        })
        .unwrap_or(FALLBACK_DISPLAY_NAME)
        .to_owned()
}

/// Get the account for `subject_id`.
///
/// # Errors
/// Returns [Error::AccountNotFound] if the subject never registered.
pub fn resolve_or_fail(subject_id: &str, connection: &Connection) -> Result<Account, Error> {
    find_account_by_subject_id(subject_id, connection)?.ok_or(Error::AccountNotFound)
}

/// Get the account for `subject_id` together with its family.
///
/// # Errors
/// Returns [Error::FamilyNotFound] if the subject never registered or has no family.
pub fn resolve_family_member(
    subject_id: &str,
    connection: &Connection,
) -> Result<FamilyMember, Error> {
    let account =
        find_account_by_subject_id(subject_id, connection)?.ok_or(Error::FamilyNotFound)?;

    match account.family_id {
        Some(family_id) => Ok(FamilyMember { account, family_id }),
        None => Err(Error::FamilyNotFound),
    }
}

fn new_account_for(claims: &Claims, family_id: FamilyId) -> Result<NewAccount, Error> {
    let email = claims
        .email
        .clone()
        .ok_or(Error::Unauthorized(AuthError::MissingEmail))?;

    Ok(NewAccount {
        subject_id: claims.subject_id.clone(),
        name: display_name(claims),
        email,
        avatar_url: claims.avatar_url.clone(),
        family_id: Some(family_id),
    })
}

fn ensure_not_registered(subject_id: &str, connection: &Connection) -> Result<(), Error> {
    match find_account_by_subject_id(subject_id, connection)? {
        Some(_) => Err(Error::AlreadyRegistered),
        None => Ok(()),
    }
}

/// Create a new family for the caller along with their account.
///
/// The family and the account are written in one database transaction, so a
/// failure leaves neither behind.
///
/// # Errors
/// Returns:
/// - [Error::Unauthorized] if the claims have no email address,
/// - [Error::AlreadyRegistered] if the caller already has an account,
/// - [Error::DuplicateEmail] or [Error::DuplicateInviteCode] on a conflict,
/// - [Error::SqlError] for any other SQL error.
pub fn register(
    claims: &Claims,
    invite_code: &str,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Registration, Error> {
    if claims.email.is_none() {
        return Err(AuthError::MissingEmail.into());
    }

    ensure_not_registered(&claims.subject_id, connection)?;

    let transaction = connection.unchecked_transaction()?;

    let family = create_family(
        &family_name_for(&display_name(claims)),
        invite_code,
        now + INVITE_CODE_LIFETIME,
        now,
        &transaction,
    )?;
    let account = create_account(new_account_for(claims, family.id)?, now, &transaction)?;

    transaction.commit()?;

    tracing::info!("Registered account {} with new family {}", account.id, family.id);

    Ok(Registration {
        account,
        family,
        invite_code: invite_code.to_owned(),
    })
}

/// Create an account for the caller in the family that owns `invite_code`.
///
/// Under [InvitePolicy::SingleUse] the code is cleared in the same database
/// transaction that creates the account.
///
/// # Errors
/// Returns:
/// - [Error::Unauthorized] if the claims have no email address,
/// - [Error::MissingField] if `invite_code` is blank,
/// - [Error::AlreadyRegistered] if the caller already has an account,
/// - [Error::InvalidInviteCode] if no family has the code,
/// - [Error::InviteCodeExpired] if the code expired before `now`,
/// - [Error::SqlError] for any other SQL error.
pub fn join(
    claims: &Claims,
    invite_code: &str,
    policy: InvitePolicy,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Membership, Error> {
    if claims.email.is_none() {
        return Err(AuthError::MissingEmail.into());
    }

    let invite_code = invite_code.trim().to_uppercase();
    if invite_code.is_empty() {
        return Err(Error::MissingField("Invite code"));
    }

    ensure_not_registered(&claims.subject_id, connection)?;

    let family = find_family_by_invite_code(&invite_code, connection)?
        .ok_or(Error::InvalidInviteCode)?;

    if family.invite_expired(now) {
        return Err(Error::InviteCodeExpired);
    }

    let transaction = connection.unchecked_transaction()?;

    let account = create_account(new_account_for(claims, family.id)?, now, &transaction)?;

    let family = match policy {
        InvitePolicy::Reusable => family,
        InvitePolicy::SingleUse => {
            clear_invite_code(family.id, now, &transaction)?;
            get_family(family.id, &transaction)?
        }
    };

    transaction.commit()?;

    tracing::info!("Account {} joined family {}", account.id, family.id);

    Ok(Membership { account, family })
}

/// Look up whether `email` is registered and whether it has a family.
///
/// # Errors
/// Returns [Error::MissingField] if `email` is blank, or [Error::SqlError] on an SQL error.
pub fn status(email: &str, connection: &Connection) -> Result<MembershipStatus, Error> {
    let email = email.trim();
    if email.is_empty() {
        return Err(Error::MissingField("Email"));
    }

    let status = match find_account_by_email(email, connection)? {
        Some(account) => MembershipStatus {
            registered: true,
            has_family: Some(account.family_id.is_some()),
            user: Some(account),
        },
        None => MembershipStatus {
            registered: false,
            has_family: None,
            user: None,
        },
    };

    Ok(status)
}
