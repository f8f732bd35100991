//! Caller identity.
//!
//! Tokens are verified upstream; the gateway forwards the authenticated user
//! id and role as headers and this service trusts them as given.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub is_admin: bool,
}

/// An `AuthUser` whose role is `admin`.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub AuthUser);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = header(parts, USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Authorization required".to_string()))?;
        let user_id = Uuid::parse_str(raw)
            .map_err(|_| AppError::Validation("Invalid user ID".to_string()))?;
        let is_admin = header(parts, USER_ROLE_HEADER)
            .is_some_and(|role| role.eq_ignore_ascii_case("admin"));

        Ok(Self { user_id, is_admin })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(Self(user))
    }
}
