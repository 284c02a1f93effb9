//! Request-scoped session context.
//!
//! Every auth handler takes a [`RequestSession`] instead of reaching into
//! shared state for "the current user". It carries the signed cookie jar the
//! request arrived with, and handlers hand back the updated jar so the
//! `Set-Cookie` header travels with their response.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::SignedCookieJar;
use tracing::debug;

use crate::session::SessionError;
use crate::store::UserId;

use super::error::ApiError;
use super::state::AppState;

pub struct RequestSession {
    jar: SignedCookieJar,
    token: Option<String>,
    user_id: Option<UserId>,
}

impl RequestSession {
    /// User bound to a live session, if any.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// Bind a fresh token to `user_id`. Any token the request carried is
    /// revoked first, so re-login replaces rather than accumulates sessions.
    pub fn establish(
        self,
        state: &AppState,
        user_id: UserId,
    ) -> Result<SignedCookieJar, ApiError> {
        let ttl = state.session_ttl();
        let max_age = time::Duration::try_from(ttl)
            .map_err(|_| ApiError::from(SessionError::TtlOverflow(ttl)))?;
        let token = state.sessions.create(user_id)?;
        if let Some(old) = &self.token {
            state.sessions.remove(old);
        }

        let cookie = Cookie::build((state.cookies.name.clone(), token))
            .path("/")
            .http_only(true)
            .secure(state.cookies.secure)
            .same_site(SameSite::Lax)
            .max_age(max_age);
        Ok(self.jar.add(cookie))
    }

    /// Drop the session (if any) and tell the client to forget the cookie.
    pub fn clear(self, state: &AppState) -> SignedCookieJar {
        if let Some(token) = &self.token {
            if state.sessions.remove(token) {
                debug!(user_id = ?self.user_id, "session revoked");
            }
        }
        let removal = Cookie::build((state.cookies.name.clone(), ""))
            .path("/")
            .http_only(true)
            .secure(state.cookies.secure)
            .same_site(SameSite::Lax);
        self.jar.remove(removal)
    }
}

impl FromRequestParts<AppState> for RequestSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = SignedCookieJar::from_request_parts(parts, state).await?;
        // Cookies with a bad signature are filtered out by the jar.
        let token = jar
            .get(&state.cookies.name)
            .map(|cookie| cookie.value().to_owned())
            .filter(|value| !value.is_empty());
        let user_id = token.as_deref().and_then(|t| state.sessions.get(t));

        Ok(Self {
            jar,
            token,
            user_id,
        })
    }
}
