use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::HeaderName;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::password::{hash_in_background, verify_in_background};

use super::context::RequestSession;
use super::error::ApiError;
use super::responses::{Credentials, CredentialsRequest, HealthResponse, UserResponse};
use super::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", delete(logout))
        .route("/check_session", get(check_session))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            MakeRequestUuid,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        users: state.users.len().await,
        sessions: state.sessions.len(),
    })
}

async fn signup(
    State(state): State<AppState>,
    session: RequestSession,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let credentials = Credentials::try_from(request)?;

    // Skip the hash for an obvious duplicate; the store still has the final say.
    if state.users.contains(&credentials.username).await {
        warn!(username = %credentials.username, "signup rejected: username taken");
        return Err(ApiError::Conflict);
    }

    let password_hash = hash_in_background(credentials.password).await?;
    let user = state
        .users
        .create(credentials.username, password_hash)
        .await?;
    info!(user_id = user.id, username = %user.username, "user signed up");

    let body = Json(UserResponse::from(&user));
    if state.login_on_signup {
        let jar = session.establish(&state, user.id)?;
        info!(user_id = user.id, "session established on signup");
        return Ok((StatusCode::CREATED, jar, body).into_response());
    }
    Ok((StatusCode::CREATED, body).into_response())
}

async fn login(
    State(state): State<AppState>,
    session: RequestSession,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let credentials = Credentials::try_from(request)?;

    let user = state.users.find_by_username(&credentials.username).await;
    let stored_hash = user.as_ref().map(|user| user.password_hash.clone());
    let verified = verify_in_background(credentials.password, stored_hash).await?;

    let user = match user {
        Some(user) if verified => user,
        _ => {
            warn!(username = %credentials.username, "login failed");
            return Err(ApiError::InvalidCredentials);
        }
    };

    let previous = session.user_id();
    let jar = session.establish(&state, user.id)?;
    info!(
        user_id = user.id,
        username = %user.username,
        replaced_user_id = ?previous,
        "user logged in"
    );

    Ok((StatusCode::OK, jar, Json(UserResponse::from(&user))).into_response())
}

async fn logout(State(state): State<AppState>, session: RequestSession) -> Response {
    if let Some(user_id) = session.user_id() {
        info!(user_id, "user logged out");
    } else {
        debug!("logout without active session");
    }
    let jar = session.clear(&state);
    (StatusCode::NO_CONTENT, jar).into_response()
}

async fn check_session(State(state): State<AppState>, session: RequestSession) -> Response {
    let Some(user_id) = session.user_id() else {
        debug!("session check: anonymous");
        return StatusCode::NO_CONTENT.into_response();
    };

    match state.users.find_by_id(user_id).await {
        Some(user) => {
            debug!(user_id, "session check: authenticated");
            (StatusCode::OK, Json(UserResponse::from(&user))).into_response()
        }
        None => {
            warn!(user_id, "session bound to missing user; clearing");
            let jar = session.clear(&state);
            (StatusCode::NO_CONTENT, jar).into_response()
        }
    }
}
