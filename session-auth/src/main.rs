//! # session-auth
//!
//! Minimal cookie-session authentication service.
//!
//! Users sign up with a username and password, log in to receive a signed
//! session cookie, check who they are, and log out again.
//!
//! ## Architecture
//!
//! - **Store**: user records with a unique username, optionally persisted to a TOML file
//! - **Password**: Argon2id hashing, run on the blocking pool
//! - **Session**: server-side table of random tokens bound to user ids, with expiry
//! - **HTTP**: Axum router; the token travels in an HMAC-signed cookie

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

mod config;
mod http;
mod password;
mod session;
mod store;

use std::time::Duration;

use anyhow::Context;
use axum::serve;
use axum_extra::extract::cookie::Key;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, Cli, SECRET_KEY_ENV};
use crate::http::{router, AppState, CookieSettings};
use crate::session::SessionStore;
use crate::store::UserStore;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging().context("failed to initialize logging")?;

    let cli = Cli::parse();
    let config = AppConfig::from_cli(cli).context("failed to load configuration")?;
    info!(
        bind = %config.bind,
        users_file = ?config.users_file.as_ref().map(|path| path.display().to_string()),
        session_ttl = %humantime::format_duration(config.session_ttl),
        cookie_name = %config.cookie_name,
        secure_cookie = config.secure_cookie,
        login_on_signup = config.login_on_signup,
        "configuration loaded"
    );

    let key = match &config.secret_key {
        Some(secret) => Key::try_from(secret.as_bytes()).context("invalid cookie secret key")?,
        None => {
            warn!(
                env = SECRET_KEY_ENV,
                "no secret key configured; using a random key, sessions will not survive restart"
            );
            Key::generate()
        }
    };

    let users = match &config.users_file {
        Some(path) => UserStore::open(path)
            .with_context(|| format!("failed to open users file {}", path.display()))?,
        None => {
            info!("no users file configured; accounts are kept in memory only");
            UserStore::in_memory()
        }
    };
    info!(users = users.len().await, "credential store ready");

    let sessions = SessionStore::new(config.session_ttl);
    spawn_session_reaper(sessions.clone(), SESSION_PURGE_INTERVAL);

    let state = AppState {
        users,
        sessions,
        cookies: CookieSettings {
            key,
            name: config.cookie_name,
            secure: config.secure_cookie,
        },
        login_on_signup: config.login_on_signup,
    };

    let app = router(state);
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    let shutdown = tokio::signal::ctrl_c();
    info!(bind = %config.bind, "session-auth listening");

    serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = shutdown.await;
            info!("shutting down gracefully");
        })
        .await
        .context("server exited with error")
}

/// Initialize tracing subscriber with `RUST_LOG` env filter (default: `info`).
fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

/// Spawns a background task that drops expired sessions at the given interval.
fn spawn_session_reaper(sessions: SessionStore, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;
            let removed = sessions.purge_expired();
            if removed > 0 {
                debug!(removed, remaining = sessions.len(), "expired sessions purged");
            }
        }
    });
}
