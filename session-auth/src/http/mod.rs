//! HTTP layer: Axum router, auth handlers and the signed session cookie.
//!
//! Endpoints: `POST /signup`, `POST /login`, `DELETE /logout`,
//! `GET /check_session` and `GET /health`.

mod context;
mod error;
mod handlers;
mod responses;
mod state;


pub use handlers::router;
pub use state::{AppState, CookieSettings};
