use std::time::Duration;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use crate::session::SessionStore;
use crate::store::UserStore;

/// How the session cookie is named, signed and scoped.
#[derive(Clone)]
pub struct CookieSettings {
    pub key: Key,
    pub name: String,
    pub secure: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub users: UserStore,
    pub sessions: SessionStore,
    pub cookies: CookieSettings,
    pub login_on_signup: bool,
}

impl AppState {
    pub fn session_ttl(&self) -> Duration {
        self.sessions.ttl()
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookies.key.clone()
    }
}
