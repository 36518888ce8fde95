use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use tokio::sync::Mutex;

use crate::backend::{CreateError, FindError};
use crate::user::{valid_username, NewUser, Role, User, UserId};

mod kv;
use kv::KeyValues;

/// Users live at `<root>/users/<username>/creds.txt`. `<root>/ids/<id>` names
/// the user holding an id, and `<root>/next_id` is the next id to hand out.
/// Ids only ever grow, so a deleted user's id is never reissued.
pub struct Backend {
    root: PathBuf,
    writes: Mutex<()>,
}

macro_rules! path {
    ($root: expr, $($components: expr),*) => {
        {
            let mut p = $root.clone();
            path!(@internal, p, $($components),*);
            p
        }
    };
    (@internal, $p:expr, $next:expr, $($rest: expr),*) => {
        $p.push($next);
        path!(@internal, $p, $($rest),*);
    };
    (@internal, $p:expr, $next:expr) => {
        $p.push($next);
    };
}

impl Backend {
    pub async fn new(data_dir: &Path) -> Self {
        let root = data_dir.to_path_buf();
        let users = path!(root, "users");

        fs::create_dir_all(&users).expect("create users directory");
        fs::create_dir_all(path!(root, "ids")).expect("create ids directory");
        info!("Using {}", users.display());

        Self {
            root,
            writes: Mutex::new(()),
        }
    }

    pub async fn healthy(&self) -> bool {
        path!(self.root, "users").is_dir() && path!(self.root, "ids").is_dir()
    }
}

impl Backend {
    fn read(&self, path: PathBuf) -> Result<KeyValues, FindError> {
        let file = File::open(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                return FindError::NotFound;
            }
            error!("open \"{path:?}\": {e:?}");
            FindError::Internal
        })?;

        kv::read(file)
    }

    /// Replaces `path` atomically with `contents`.
    fn replace(
        &self,
        path: PathBuf,
        contents: impl FnOnce(File) -> io::Result<()>,
    ) -> io::Result<()> {
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;

        if let Err(e) = contents(file) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(tmp, path)
    }

    fn read_user(&self, username: &str) -> Result<User, FindError> {
        let path = path!(self.root, "users", username, "creds.txt");
        let kv = self.read(path)?;

        from_kv(username, &kv).ok_or_else(|| {
            error!("corrupt record for \"{username}\"");
            FindError::Internal
        })
    }

    fn write_user(&self, user: &User) -> io::Result<()> {
        let kv = to_kv(user);
        let dir = path!(self.root, "users", &user.username);
        fs::create_dir_all(&dir)?;
        self.replace(path!(dir, "creds.txt"), |file| kv::write(file, &kv))
    }

    fn username_for(&self, id: UserId) -> Result<String, FindError> {
        let path = path!(self.root, "ids", id.to_string());

        let username = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                return FindError::NotFound;
            }
            error!("read \"{path:?}\": {e:?}");
            FindError::Internal
        })?;
        let username = username.trim();

        if !valid_username(username) {
            error!("corrupt id entry {id}");
            return Err(FindError::Internal);
        }
        Ok(username.into())
    }

    fn write_index(&self, user: &User) -> io::Result<()> {
        let path = path!(self.root, "ids", user.id.to_string());
        self.replace(path, |mut file| writeln!(file, "{}", user.username))
    }

    /// Callers hold `writes`.
    fn next_id(&self) -> Result<UserId, ()> {
        let path = path!(self.root, "next_id");

        match fs::read_to_string(&path) {
            Ok(s) => s.trim().parse().map_err(|e| {
                error!("corrupt next_id: {e}");
            }),
            // a fresh store, or one written before ids were tracked
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let highest = self.scan()?.iter().map(|u| u.id).max().unwrap_or(0);
                Ok(highest + 1)
            }
            Err(e) => {
                error!("read next_id: {e:?}");
                Err(())
            }
        }
    }

    fn set_next_id(&self, id: UserId) -> io::Result<()> {
        self.replace(path!(self.root, "next_id"), |mut file| writeln!(file, "{id}"))
    }

    /// Every readable record. A record that can't be read is logged and left
    /// out, so one bad file never hides the rest.
    fn scan(&self) -> Result<Vec<User>, ()> {
        let path = path!(self.root, "users");
        let mut users = vec![];

        let emap = |e: &dyn std::fmt::Debug| {
            error!("error listing users: {e:?}");
        };

        for ent in fs::read_dir(path).map_err(|e| emap(&e))? {
            let ent = ent.map_err(|e| emap(&e))?;

            let fname = match ent.file_name().into_string() {
                Ok(x) => x,
                Err(e) => {
                    warn!("couldn't convert path into string: {e:?}");
                    continue;
                }
            };

            match self.read_user(&fname) {
                Ok(u) => users.push(u),
                // half-created or deleted underneath us
                Err(FindError::NotFound) => continue,
                Err(FindError::Internal) => {
                    warn!("skipping unreadable user \"{fname}\"");
                    continue;
                }
            }
        }

        Ok(users)
    }
}

fn from_kv(username: &str, kv: &KeyValues) -> Option<User> {
    Some(User {
        id: kv.get("id")?.parse().ok()?,
        username: username.into(),
        pwhash: kv.get("pwhash")?.clone(),
        email: kv.get("email").filter(|e| !e.is_empty()).cloned(),
        role: kv.get("role")?.parse().ok()?,
        created_at: kv.get("created_at")?.parse().ok()?,
    })
}

fn to_kv(user: &User) -> KeyValues {
    let mut kv = KeyValues::new();
    kv.insert("id".into(), user.id.to_string());
    kv.insert("pwhash".into(), user.pwhash.clone());
    kv.insert("email".into(), user.email.clone().unwrap_or_default());
    kv.insert("role".into(), user.role.as_str().into());
    kv.insert("created_at".into(), user.created_at.as_i64().to_string());
    kv
}

impl Backend {
    pub async fn find_user(&self, username: &str) -> Result<User, FindError> {
        if !valid_username(username) {
            return Err(FindError::NotFound);
        }
        self.read_user(username)
    }

    pub async fn find_user_by_id(&self, id: UserId) -> Result<User, FindError> {
        let username = self.username_for(id)?;
        let user = self.read_user(&username)?;

        // an index entry left behind by an interrupted delete
        if user.id != id {
            warn!("stale id entry {id} for \"{username}\"");
            return Err(FindError::NotFound);
        }
        Ok(user)
    }

    pub async fn create_user(&self, new: NewUser) -> Result<User, CreateError> {
        let _guard = self.writes.lock().await;

        if !valid_username(&new.username) {
            error!("refusing to store username {:?}", new.username);
            return Err(CreateError::Internal);
        }
        if path!(self.root, "users", &new.username).exists() {
            return Err(CreateError::UsernameTaken);
        }

        let id = self.next_id().map_err(|()| CreateError::Internal)?;
        let NewUser {
            username,
            pwhash,
            email,
            role,
            created_at,
        } = new;
        let user = User {
            id,
            username,
            pwhash,
            email,
            role,
            created_at,
        };

        // claim the id first: a failure below burns it rather than reissuing it
        self.set_next_id(id + 1).map_err(|e| {
            error!("write next_id: {e:?}");
            CreateError::Internal
        })?;

        if let Err(e) = self.write_user(&user) {
            error!("write \"{}\": {e:?}", user.username);
            let _ = fs::remove_dir_all(path!(self.root, "users", &user.username));
            return Err(CreateError::Internal);
        }
        self.write_index(&user).map_err(|e| {
            error!("index \"{}\": {e:?}", user.username);
            CreateError::Internal
        })?;

        Ok(user)
    }

    /// Newest first.
    pub async fn all_users(&self) -> Result<Vec<User>, ()> {
        let mut users = self.scan()?;
        users.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(users)
    }

    pub async fn set_role(&self, id: UserId, role: Role) -> Result<(), FindError> {
        let _guard = self.writes.lock().await;

        let mut user = self.find_user_by_id(id).await?;
        user.role = role;

        self.write_user(&user).map_err(|e| {
            error!("write \"{}\": {e:?}", user.username);
            FindError::Internal
        })
    }

    pub async fn delete_user(&self, id: UserId) -> Result<(), FindError> {
        let _guard = self.writes.lock().await;

        let user = self.find_user_by_id(id).await?;

        let index = path!(self.root, "ids", id.to_string());
        fs::remove_file(&index).map_err(|e| {
            error!("remove \"{index:?}\": {e:?}");
            FindError::Internal
        })?;

        let dir = path!(self.root, "users", &user.username);
        fs::remove_dir_all(&dir).map_err(|e| {
            error!("remove \"{dir:?}\": {e:?}");
            FindError::Internal
        })
    }
}
