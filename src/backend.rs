use async_trait::async_trait;

use crate::user::{User, UserId};

#[derive(Debug)]
pub enum FindError {
    NotFound,
    Internal,
}

#[derive(Debug)]
pub enum CreateError {
    UsernameTaken,
    Internal,
}

/// Read-only user access, all that identity resolution needs of a store.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn user_by_id(&self, id: UserId) -> Result<User, FindError>;
}

#[async_trait]
impl UserLookup for Backend {
    async fn user_by_id(&self, id: UserId) -> Result<User, FindError> {
        self.find_user_by_id(id).await
    }
}

#[cfg(feature = "backend-sql")]
mod backend_sql;
#[cfg(feature = "backend-sql")]
pub use backend_sql::*;

#[cfg(not(feature = "backend-sql"))]
mod backend_file;
#[cfg(not(feature = "backend-sql"))]
pub use backend_file::*;
