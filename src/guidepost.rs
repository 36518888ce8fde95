use std::result;

use log::{debug, error, info, warn};
use warp::http;

use crate::backend::{Backend, CreateError, FindError};
use crate::guard::{self, AccessError, Level};
use crate::identity;
use crate::password::HashPool;
use crate::time::Timestamp;
use crate::token::{self, SigningKey};
use crate::user::{valid_username, NewUser, Role, User, UserId};

pub const GENERAL_LANDING: &str = "/";
pub const ADMIN_LANDING: &str = "/admin/dashboard";

pub struct GuidePost {
    backend: Backend,
    key: SigningKey,
    hashing: HashPool,
    session: SessionConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub ttl: ::time::Duration,
    /// Mark the cookie `Secure`; set when served over https.
    pub secure: bool,
}

#[derive(Copy, Clone, Debug)]
pub enum Error {
    Internal,
    Unauthorized,
    Forbidden,
}

pub type Result<T> = result::Result<T, Error>;

impl Into<http::StatusCode> for Error {
    fn into(self) -> http::StatusCode {
        match self {
            Self::Internal => http::StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => http::StatusCode::UNAUTHORIZED,
            Self::Forbidden => http::StatusCode::FORBIDDEN,
        }
    }
}

impl From<AccessError> for Error {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::Unauthorized => Self::Unauthorized,
            AccessError::Forbidden => Self::Forbidden,
        }
    }
}

impl warp::reject::Reject for Error {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    /// Unknown username and wrong password look the same from outside.
    #[error("invalid username or password")]
    CredentialInvalid,
    #[error("authentication error")]
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("Username already exists")]
    UsernameTaken,
    #[error("Usernames may only contain letters, digits, '.', '_' and '-'")]
    InvalidUsername,
    #[error("That email address can't be used")]
    InvalidEmail,
    #[error("A password is required")]
    MissingPassword,
    #[error("Registration failed. Please try again.")]
    Internal,
}

pub struct LoggedIn {
    pub user: User,
    pub token: String,
}

impl LoggedIn {
    pub fn landing(&self) -> &'static str {
        landing_for(self.user.role)
    }
}

pub fn landing_for(role: Role) -> &'static str {
    match role {
        Role::Admin => ADMIN_LANDING,
        Role::User => GENERAL_LANDING,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminOutcome {
    Done,
    RefusedSelf,
    NotFound,
}

impl GuidePost {
    pub fn new(
        backend: Backend,
        key: SigningKey,
        hashing: HashPool,
        session: SessionConfig,
    ) -> Self {
        Self {
            backend,
            key,
            hashing,
            session,
        }
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> result::Result<LoggedIn, LoginError> {
        info!("login attempt for {username}");

        let user = self.backend.find_user(username).await.map_err(|e| match e {
            FindError::NotFound => {
                info!("{username} login: no such user");
                LoginError::CredentialInvalid
            }
            FindError::Internal => {
                error!("couldn't load user {username}");
                LoginError::Internal
            }
        })?;

        if !self
            .hashing
            .verify(password.to_string(), user.pwhash.clone())
            .await
        {
            info!("{username} login: wrong password");
            return Err(LoginError::CredentialInvalid);
        }

        let token = token::issue(&self.key, &user.id.to_string(), user.role, self.session.ttl)
            .map_err(|e| {
                error!("couldn't issue token for {username}: {e}");
                LoginError::Internal
            })?;

        info!("{username} login: ok, role {}", user.role);
        Ok(LoggedIn { user, token })
    }

    /// Creates a plain user; never logs them in.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> result::Result<User, RegisterError> {
        info!("registration attempt for {username}");

        if !valid_username(username) {
            return Err(RegisterError::InvalidUsername);
        }
        let email = email.trim();
        if email.contains(char::is_control) {
            return Err(RegisterError::InvalidEmail);
        }
        if password.is_empty() {
            return Err(RegisterError::MissingPassword);
        }

        // cheap check before paying for a hash; create_user re-checks
        match self.backend.find_user(username).await {
            Ok(_) => {
                info!("{username} registration: username taken");
                return Err(RegisterError::UsernameTaken);
            }
            Err(FindError::NotFound) => {}
            Err(FindError::Internal) => return Err(RegisterError::Internal),
        }

        let pwhash = self.hashing.hash(password.to_string()).await.map_err(|e| {
            error!("couldn't hash password for {username}: {e}");
            RegisterError::Internal
        })?;

        let created_at = Timestamp::now().map_err(|()| RegisterError::Internal)?;
        let email = Some(email).filter(|e| !e.is_empty()).map(Into::into);

        let user = self
            .backend
            .create_user(NewUser {
                username: username.into(),
                pwhash,
                email,
                role: Role::User,
                created_at,
            })
            .await
            .map_err(|e| match e {
                CreateError::UsernameTaken => {
                    info!("{username} registration: username taken");
                    RegisterError::UsernameTaken
                }
                CreateError::Internal => RegisterError::Internal,
            })?;

        info!("{username} registered as user {}", user.id);
        Ok(user)
    }

    pub async fn resolve(&self, cookie: Option<&str>) -> Option<User> {
        identity::resolve(cookie, &self.key, &self.backend).await
    }

    pub async fn require(&self, level: Level, cookie: Option<&str>) -> Result<User> {
        let user = match level {
            Level::Authenticated => {
                guard::require_authenticated(cookie, &self.key, &self.backend).await
            }
            Level::Admin => guard::require_admin(cookie, &self.key, &self.backend).await,
        };

        user.map_err(Into::into)
    }

    pub async fn users(&self) -> Result<Vec<User>> {
        self.backend.all_users().await.map_err(|()| Error::Internal)
    }

    /// A role change takes effect on the target's next request; their token
    /// is left alone.
    pub async fn toggle_role(&self, admin: &User, target: UserId) -> Result<AdminOutcome> {
        if admin.id == target {
            warn!("{} tried to change their own role", admin.username);
            return Ok(AdminOutcome::RefusedSelf);
        }

        let user = match self.backend.find_user_by_id(target).await {
            Ok(user) => user,
            Err(FindError::NotFound) => return Ok(AdminOutcome::NotFound),
            Err(FindError::Internal) => return Err(Error::Internal),
        };
        let role = user.role.toggled();

        match self.backend.set_role(target, role).await {
            Ok(()) => {
                info!("{} set {}'s role to {role}", admin.username, user.username);
                Ok(AdminOutcome::Done)
            }
            Err(FindError::NotFound) => Ok(AdminOutcome::NotFound),
            Err(FindError::Internal) => Err(Error::Internal),
        }
    }

    pub async fn delete_user(&self, admin: &User, target: UserId) -> Result<AdminOutcome> {
        if admin.id == target {
            warn!("{} tried to delete themselves", admin.username);
            return Ok(AdminOutcome::RefusedSelf);
        }

        match self.backend.delete_user(target).await {
            Ok(()) => {
                info!("{} deleted user {target}", admin.username);
                Ok(AdminOutcome::Done)
            }
            Err(FindError::NotFound) => {
                debug!("delete: no user {target}");
                Ok(AdminOutcome::NotFound)
            }
            Err(FindError::Internal) => Err(Error::Internal),
        }
    }

    pub async fn store_healthy(&self) -> bool {
        self.backend.healthy().await
    }
}
