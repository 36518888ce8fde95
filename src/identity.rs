use log::{debug, error};

use crate::backend::{FindError, UserLookup};
use crate::token::{self, SigningKey, TokenError};
use crate::user::{User, UserId};

pub const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("no credential presented")]
    TokenAbsent,
    #[error("credential malformed")]
    TokenMalformed,
    #[error("credential expired")]
    TokenExpired,
    #[error("credential signature invalid")]
    TokenSignatureInvalid,
    #[error("credential names no known user")]
    IdentityNotFound,
    #[error("user store unavailable")]
    StoreFailure,
}

impl From<TokenError> for IdentityError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Missing => IdentityError::TokenAbsent,
            TokenError::Malformed | TokenError::ClaimMissing => IdentityError::TokenMalformed,
            TokenError::SignatureInvalid => IdentityError::TokenSignatureInvalid,
            TokenError::Expired => IdentityError::TokenExpired,
        }
    }
}

/// Cookie value to bare token. Tolerates a missing "Bearer " prefix, and the
/// surrounding quotes some cookie writers add to values containing a space.
pub fn strip_bearer(value: &str) -> &str {
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);

    value.strip_prefix(BEARER_PREFIX).unwrap_or(value)
}

pub async fn identify<L>(
    cookie: Option<&str>,
    key: &SigningKey,
    users: &L,
) -> Result<User, IdentityError>
where
    L: UserLookup + ?Sized,
{
    let value = cookie.ok_or(IdentityError::TokenAbsent)?;
    let claims = token::decode(key, strip_bearer(value))?;

    let id: UserId = claims.subject.parse().map_err(|_| {
        debug!("non-numeric token subject");
        IdentityError::TokenMalformed
    })?;

    users.user_by_id(id).await.map_err(|e| match e {
        FindError::NotFound => IdentityError::IdentityNotFound,
        FindError::Internal => {
            error!("couldn't look up user {id}");
            IdentityError::StoreFailure
        }
    })
}

/// Every failure means "anonymous".
pub async fn resolve<L>(cookie: Option<&str>, key: &SigningKey, users: &L) -> Option<User>
where
    L: UserLookup + ?Sized,
{
    match identify(cookie, key, users).await {
        Ok(user) => Some(user),
        Err(IdentityError::TokenAbsent) => None,
        Err(e) => {
            debug!("anonymous request: {e}");
            None
        }
    }
}
