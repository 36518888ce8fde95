use std::path::{Path, PathBuf};

use log::{error, info};
use sqlx::{migrate::MigrateDatabase, query, query_as, Pool, Sqlite, SqlitePool};

use crate::backend::{CreateError, FindError};
use crate::user::{NewUser, Role, User, UserId};

type Result<T> = std::result::Result<T, ()>;

// SQLITE_CONSTRAINT_UNIQUE
const UNIQUE_VIOLATION: &str = "2067";

const USER_COLUMNS: &str = "id, username, password, email, role, created_at";

pub struct Backend(pub Pool<Sqlite>);

fn into_sql(path: &Path) -> PathBuf {
    path.join("guidepost.sqlite")
}

pub async fn init(url: &str) {
    match Sqlite::create_database(url).await {
        Ok(()) => {
            info!("Created {}", url);
        }
        Err(e) => {
            let sqlx::Error::Database(db_err) = e else {
                panic!("error creating database: {e}");
            };

            panic!("sql db error: {db_err:?}");
        }
    }
}

impl Backend {
    pub async fn new(data_dir: &Path) -> Self {
        let url = format!(
            "sqlite://{}",
            into_sql(data_dir).to_str().expect("non utf-8 data")
        );

        if !Sqlite::database_exists(&url).await.unwrap_or(false) {
            init(&url).await;
        }
        info!("Using {}", &url);

        let pool = SqlitePool::connect(&url).await.expect("db connection");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migration");

        Self(pool)
    }

    pub async fn healthy(&self) -> bool {
        query("SELECT 1")
            .execute(&self.0)
            .await
            .map_err(|e| {
                error!("health check: {e}");
            })
            .is_ok()
    }
}

fn find_error(e: sqlx::Error) -> FindError {
    if matches!(e, sqlx::Error::RowNotFound) {
        FindError::NotFound
    } else {
        error!("user query: {e:?}");
        FindError::Internal
    }
}

impl Backend {
    pub async fn find_user(&self, username: &str) -> std::result::Result<User, FindError> {
        query_as::<_, User>(&format!(
            "
            SELECT {USER_COLUMNS}
            FROM users
            WHERE username = ?
            "
        ))
        .bind(username)
        .fetch_one(&self.0)
        .await
        .map_err(find_error)
    }

    pub async fn find_user_by_id(&self, id: UserId) -> std::result::Result<User, FindError> {
        query_as::<_, User>(&format!(
            "
            SELECT {USER_COLUMNS}
            FROM users
            WHERE id = ?
            "
        ))
        .bind(id)
        .fetch_one(&self.0)
        .await
        .map_err(find_error)
    }

    pub async fn create_user(&self, new: NewUser) -> std::result::Result<User, CreateError> {
        let NewUser {
            username,
            pwhash,
            email,
            role,
            created_at,
        } = new;

        let done = query(
            "
            INSERT INTO users
            (username, password, email, role, created_at)
            VALUES
            (?, ?, ?, ?, ?)
            ",
        )
        .bind(&username)
        .bind(&pwhash)
        .bind(&email)
        .bind(role)
        .bind(created_at)
        .execute(&self.0)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db)
                if db.code().as_deref() == Some(UNIQUE_VIOLATION)
                    || db.message().contains("UNIQUE") =>
            {
                CreateError::UsernameTaken
            }
            e => {
                error!("insert user {username}: {e:?}");
                CreateError::Internal
            }
        })?;

        Ok(User {
            id: done.last_insert_rowid(),
            username,
            pwhash,
            email,
            role,
            created_at,
        })
    }

    /// Newest first.
    pub async fn all_users(&self) -> Result<Vec<User>> {
        query_as::<_, User>(&format!(
            "
            SELECT {USER_COLUMNS}
            FROM users
            ORDER BY created_at DESC, id DESC
            "
        ))
        .fetch_all(&self.0)
        .await
        .map_err(|e| {
            error!("error selecting users: {e:?}");
        })
    }

    pub async fn set_role(&self, id: UserId, role: Role) -> std::result::Result<(), FindError> {
        let done = query(
            "
            UPDATE users
            SET role = ?
            WHERE id = ?
            ",
        )
        .bind(role)
        .bind(id)
        .execute(&self.0)
        .await
        .map_err(find_error)?;

        match done.rows_affected() {
            0 => Err(FindError::NotFound),
            _ => Ok(()),
        }
    }

    pub async fn delete_user(&self, id: UserId) -> std::result::Result<(), FindError> {
        let done = query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.0)
            .await
            .map_err(find_error)?;

        match done.rows_affected() {
            0 => Err(FindError::NotFound),
            _ => Ok(()),
        }
    }
}
