//! Request gates.
//!
//! * [`AuthUser`]: bearer token verified by the identity provider.
//! * [`Authorized<R>`]: verified token *and* the caller's stored role equals
//!   `R::ROLE` ([`AdminUser`], [`MemberUser`]).
//!
//! Handlers opt in by taking the extractor as an argument.

mod extract;

pub use extract::{DocumentId, QueryParams, ValidatedJson};

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::models::{normalize_email, Role, User};
use crate::store::Record;
use crate::AppState;

const UNAUTHORIZED: &str = "Unauthorized access";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl AuthUser {
    pub fn is(&self, email: &str) -> bool {
        self.email.eq_ignore_ascii_case(email)
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

// Bearer token extractor
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized(UNAUTHORIZED))?;
        let identity = state.identity.verify(token).await?;

        Ok(AuthUser {
            uid: identity.uid,
            email: normalize_email(&identity.email),
            name: identity.name,
            picture: identity.picture,
        })
    }
}

/// Role a route demands, as a type.
pub trait RequiredRole {
    const ROLE: Role;
}

pub struct Admin;
pub struct Member;

impl RequiredRole for Admin {
    const ROLE: Role = Role::Admin;
}

impl RequiredRole for Member {
    const ROLE: Role = Role::Member;
}

pub struct Authorized<R> {
    pub user: AuthUser,
    pub profile: Record<User>,
    _role: PhantomData<fn() -> R>,
}

pub type AdminUser = Authorized<Admin>;
pub type MemberUser = Authorized<Member>;

/// Looks up the caller's stored role and demands an exact match.
pub async fn require_role(state: &AppState, user: &AuthUser, role: Role) -> AppResult<Record<User>> {
    let profile = User::find_by_email(state.store.as_ref(), &user.email)
        .await?
        .ok_or_else(|| {
            warn!("No stored profile for {}, {} role required", user.email, role);
            AppError::forbidden("Forbidden access")
        })?;

    if profile.data.role != role {
        warn!(
            "{} has role {} but {} is required",
            user.email, profile.data.role, role
        );
        return Err(AppError::forbidden("Forbidden access"));
    }
    Ok(profile)
}

pub async fn is_admin(state: &AppState, user: &AuthUser) -> AppResult<bool> {
    let profile = User::find_by_email(state.store.as_ref(), &user.email).await?;
    Ok(profile.is_some_and(|p| p.data.role == Role::Admin))
}

impl<R> FromRequestParts<Arc<AppState>> for Authorized<R>
where
    R: RequiredRole,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        let profile = require_role(state, &user, R::ROLE).await?;
        Ok(Authorized {
            user,
            profile,
            _role: PhantomData,
        })
    }
}
