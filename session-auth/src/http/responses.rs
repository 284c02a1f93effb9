use serde::{Deserialize, Serialize};

use crate::store::{User, UserId};

use super::error::ApiError;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub users: usize,
    pub sessions: usize,
}

/// Public view of a user. The password hash never leaves the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl TryFrom<CredentialsRequest> for Credentials {
    type Error = ApiError;

    fn try_from(request: CredentialsRequest) -> Result<Self, Self::Error> {
        let username = request
            .username
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::Validation(String::from("username is required")))?;
        let password = request
            .password
            .filter(|password| !password.is_empty())
            .ok_or_else(|| ApiError::Validation(String::from("password is required")))?;

        Ok(Self { username, password })
    }
}
