use log::info;
use warp::http::StatusCode;

use crate::backend::UserLookup;
use crate::identity;
use crate::token::SigningKey;
use crate::user::{Role, User};

/// The minimum a route requires of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Authenticated,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("not authenticated")]
    Unauthorized,
    #[error("admin access required")]
    Forbidden,
}

impl From<AccessError> for StatusCode {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::Unauthorized => StatusCode::UNAUTHORIZED,
            AccessError::Forbidden => StatusCode::FORBIDDEN,
        }
    }
}

/// The role checked is the one on the freshly loaded user, not the snapshot in
/// the token, so a role change bites on the next request.
pub async fn require<L>(
    level: Level,
    cookie: Option<&str>,
    key: &SigningKey,
    users: &L,
) -> Result<User, AccessError>
where
    L: UserLookup + ?Sized,
{
    let user = identity::resolve(cookie, key, users)
        .await
        .ok_or(AccessError::Unauthorized)?;

    match (level, user.role) {
        (Level::Authenticated, _) | (Level::Admin, Role::Admin) => Ok(user),
        (Level::Admin, Role::User) => {
            info!("{} refused admin access", user.username);
            Err(AccessError::Forbidden)
        }
    }
}

pub async fn require_authenticated<L>(
    cookie: Option<&str>,
    key: &SigningKey,
    users: &L,
) -> Result<User, AccessError>
where
    L: UserLookup + ?Sized,
{
    require(Level::Authenticated, cookie, key, users).await
}

pub async fn require_admin<L>(
    cookie: Option<&str>,
    key: &SigningKey,
    users: &L,
) -> Result<User, AccessError>
where
    L: UserLookup + ?Sized,
{
    require(Level::Admin, cookie, key, users).await
}

#[cfg(test)]
mod test {
    use super::*;

    use ::time::Duration;

    use crate::identity::BEARER_PREFIX;
    use crate::mock::MockUsers;
    use crate::token::issue;
    use crate::token::test::test_key;

    fn cookie_for(id: &str, role: Role) -> String {
        let token = issue(&test_key(), id, role, Duration::days(1)).unwrap();
        format!("{BEARER_PREFIX}{token}")
    }

    fn users() -> MockUsers {
        MockUsers::with(&[(1, "root", Role::Admin), (2, "alice", Role::User)])
    }

    #[tokio::test]
    async fn anonymous_is_unauthorized() {
        let users = users();
        let key = test_key();

        assert_eq!(
            require_authenticated(None, &key, &users).await.unwrap_err(),
            AccessError::Unauthorized
        );
        assert_eq!(
            require_admin(None, &key, &users).await.unwrap_err(),
            AccessError::Unauthorized
        );
        assert_eq!(
            require_admin(Some("Bearer junk"), &key, &users).await.unwrap_err(),
            AccessError::Unauthorized
        );
        assert_eq!(
            require_admin(Some(&cookie_for("3", Role::Admin)), &key, &users)
                .await
                .unwrap_err(),
            AccessError::Unauthorized
        );
    }

    #[tokio::test]
    async fn plain_user_is_forbidden_from_admin() {
        let users = users();
        let key = test_key();
        let cookie = cookie_for("2", Role::User);

        let user = require_authenticated(Some(&cookie), &key, &users).await.unwrap();
        assert_eq!(user.username, "alice");

        assert_eq!(
            require_admin(Some(&cookie), &key, &users).await.unwrap_err(),
            AccessError::Forbidden
        );
    }

    #[tokio::test]
    async fn admin_passes_both_levels() {
        let users = users();
        let key = test_key();
        let cookie = cookie_for("1", Role::Admin);

        assert_eq!(require_admin(Some(&cookie), &key, &users).await.unwrap().id, 1);
        assert_eq!(
            require(Level::Authenticated, Some(&cookie), &key, &users)
                .await
                .unwrap()
                .id,
            1
        );
    }

    #[tokio::test]
    async fn stored_role_beats_token_role() {
        let users = users();
        let key = test_key();

        // token claims admin, store says user
        let promoted_claim = cookie_for("2", Role::Admin);
        assert_eq!(
            require_admin(Some(&promoted_claim), &key, &users).await.unwrap_err(),
            AccessError::Forbidden
        );

        // role changed after issuance, token untouched
        let cookie = cookie_for("2", Role::User);
        users.set_role(2, Role::Admin);
        assert!(require_admin(Some(&cookie), &key, &users).await.is_ok());

        users.set_role(2, Role::User);
        assert_eq!(
            require_admin(Some(&cookie), &key, &users).await.unwrap_err(),
            AccessError::Forbidden
        );
    }

    #[test]
    fn statuses() {
        assert_eq!(StatusCode::from(AccessError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(StatusCode::from(AccessError::Forbidden), StatusCode::FORBIDDEN);
    }
}
