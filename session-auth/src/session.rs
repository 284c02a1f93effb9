use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use dashmap::DashMap;
use rand_core::{OsRng, RngCore};
use thiserror::Error;

use crate::store::UserId;

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session ttl {0:?} is too large to compute an expiry")]
    TtlOverflow(Duration),
}

#[derive(Debug, Clone, Copy)]
struct Session {
    user_id: UserId,
    expires_at: Instant,
}

/// Session token -> bound user id. Expired entries are dropped on lookup and
/// by [`SessionStore::purge_expired`].
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<DashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn create(&self, user_id: UserId) -> Result<String, SessionError> {
        let expires_at = Instant::now()
            .checked_add(self.ttl)
            .ok_or(SessionError::TtlOverflow(self.ttl))?;
        let token = new_token();
        self.inner.insert(
            token.clone(),
            Session {
                user_id,
                expires_at,
            },
        );
        Ok(token)
    }

    pub fn get(&self, token: &str) -> Option<UserId> {
        let entry = self.inner.get(token)?;
        if entry.expires_at > Instant::now() {
            Some(entry.user_id)
        } else {
            drop(entry);
            self.inner.remove(token);
            None
        }
    }

    pub fn remove(&self, token: &str) -> bool {
        self.inner.remove(token).is_some()
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, session| session.expires_at > now);
        before.saturating_sub(self.inner.len())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

fn new_token() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}
