use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::{FindError, UserLookup};
use crate::time::Timestamp;
use crate::user::{Role, User, UserId};

/// In-memory user lookup for exercising identity and guard logic.
pub struct MockUsers {
    users: Mutex<HashMap<UserId, User>>,
    fail: bool,
}

impl MockUsers {
    pub fn with(users: &[(UserId, &str, Role)]) -> Self {
        let users = users
            .iter()
            .map(|&(id, username, role)| {
                let user = User {
                    id,
                    username: username.into(),
                    pwhash: String::new(),
                    email: None,
                    role,
                    created_at: Timestamp::from_i64(1),
                };
                (id, user)
            })
            .collect();

        Self {
            users: Mutex::new(users),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            fail: true,
        }
    }

    pub fn set_role(&self, id: UserId, role: Role) {
        if let Some(user) = self.users.lock().unwrap().get_mut(&id) {
            user.role = role;
        }
    }
}

#[async_trait]
impl UserLookup for MockUsers {
    async fn user_by_id(&self, id: UserId) -> Result<User, FindError> {
        if self.fail {
            return Err(FindError::Internal);
        }

        self.users
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(FindError::NotFound)
    }
}
