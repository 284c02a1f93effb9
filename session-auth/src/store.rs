//! User records keyed by id, with a unique username index.
//!
//! ## Users file format
//!
//! When a users file is configured the whole table is kept on disk as TOML
//! and rewritten after each insert:
//!
//! ```toml
//! [[users]]
//! id = 1
//! username = "ash"
//! password_hash = "$argon2id$v=19$..."
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

pub type UserId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username {0} is already taken")]
    UsernameTaken(String),
    #[error("failed to read users file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid users file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("users file {path} is inconsistent: {reason}")]
    Corrupt { path: String, reason: String },
    #[error("user ids are exhausted")]
    IdsExhausted,
    #[error("failed to encode users table: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("failed to write users file {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Default)]
struct UserTable {
    by_id: BTreeMap<UserId, User>,
    by_username: HashMap<String, UserId>,
    next_id: UserId,
}

impl UserTable {
    fn from_users(users: Vec<User>, path: &Path) -> Result<Self, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            path: path.display().to_string(),
            reason,
        };

        let mut table = Self::default();
        for user in users {
            if user.username.trim().is_empty() {
                return Err(corrupt(format!("user {} has an empty username", user.id)));
            }
            if table.by_username.contains_key(&user.username) {
                return Err(corrupt(format!("duplicate username {}", user.username)));
            }
            if table.by_id.contains_key(&user.id) {
                return Err(corrupt(format!("duplicate id {}", user.id)));
            }
            table.by_username.insert(user.username.clone(), user.id);
            table.by_id.insert(user.id, user);
        }
        let last_id = table.by_id.keys().next_back().copied().unwrap_or(0);
        table.next_id = last_id
            .checked_add(1)
            .ok_or_else(|| corrupt(format!("id {last_id} leaves no room for new users")))?;
        Ok(table)
    }

    fn to_file(&self) -> UsersFile {
        UsersFile {
            users: self.by_id.values().cloned().collect(),
        }
    }
}

/// Credential store shared by all request handlers.
///
/// A single write lock covers the uniqueness check, the insert and the file
/// write, so concurrent signups for one username cannot both succeed.
#[derive(Debug, Clone)]
pub struct UserStore {
    table: Arc<RwLock<UserTable>>,
    path: Option<PathBuf>,
}

impl UserStore {
    pub fn in_memory() -> Self {
        Self {
            table: Arc::new(RwLock::new(UserTable {
                next_id: 1,
                ..UserTable::default()
            })),
            path: None,
        }
    }

    /// Open a file-backed store. A missing file starts an empty table that is
    /// created on the first insert.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let users = match std::fs::read_to_string(path) {
            Ok(raw) => {
                let parsed: UsersFile =
                    toml::from_str(&raw).map_err(|source| StoreError::Parse {
                        path: path.display().to_string(),
                        source,
                    })?;
                parsed.users
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => {
                return Err(StoreError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let table = UserTable::from_users(users, path)?;
        Ok(Self {
            table: Arc::new(RwLock::new(table)),
            path: Some(path.to_path_buf()),
        })
    }

    pub async fn create(
        &self,
        username: String,
        password_hash: String,
    ) -> Result<User, StoreError> {
        let mut table = self.table.write().await;
        if table.by_username.contains_key(&username) {
            return Err(StoreError::UsernameTaken(username));
        }

        let id = table.next_id;
        let next_id = id.checked_add(1).ok_or(StoreError::IdsExhausted)?;
        let user = User {
            id,
            username,
            password_hash,
        };
        table.next_id = next_id;
        table.by_username.insert(user.username.clone(), user.id);
        table.by_id.insert(user.id, user.clone());

        if let Some(path) = &self.path {
            if let Err(err) = persist(path, &table).await {
                table.by_id.remove(&user.id);
                table.by_username.remove(&user.username);
                table.next_id = id;
                return Err(err);
            }
        }

        debug!(user_id = user.id, username = %user.username, "user stored");
        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> Option<User> {
        let table = self.table.read().await;
        let id = table.by_username.get(username)?;
        table.by_id.get(id).cloned()
    }

    pub async fn find_by_id(&self, id: UserId) -> Option<User> {
        self.table.read().await.by_id.get(&id).cloned()
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.table.read().await.by_username.contains_key(username)
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.by_id.len()
    }
}

async fn persist(path: &Path, table: &UserTable) -> Result<(), StoreError> {
    let content = toml::to_string_pretty(&table.to_file())?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| StoreError::Write {
                path: path.display().to_string(),
                source,
            })?;
    }

    // Write a sibling file first so a crash never leaves a truncated table.
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = match tokio::fs::write(&tmp, content).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(err) => Err(err),
    };
    if let Err(source) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::Write {
            path: path.display().to_string(),
            source,
        });
    }
    Ok(())
}
