use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{created, deleted, empty_as_none, patch_document, updated};
use crate::error::{AppError, AppResult};
use crate::middleware::{require_role, AdminUser, AuthUser, DocumentId, QueryParams, ValidatedJson};
use crate::models::{normalize_email, GoogleSignIn, NewUser, Role, RoleChange, User, UserPatch};
use crate::store::{to_document, Collection, DocumentStoreExt, Filter, Record, Update};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/google", post(sign_in))
        .route("/users/me", get(current_user))
        .route("/users/member", get(list_members))
        .route("/users/reject-member/{email}", patch(change_member_role))
        // PATCH addresses a user by email, DELETE by id
        .route("/users/{user}", patch(update_user).delete(delete_user))
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    email: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MemberQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    search: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInStamp {
    last_sign_in: DateTime<Utc>,
}

// Written only when the sign-in creates the user
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FirstSignIn {
    created_at: DateTime<Utc>,
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
}

fn user_filter(query: UserQuery) -> Filter {
    match (query.name, query.email) {
        (Some(name), _) => Filter::contains("name", name),
        (None, Some(email)) => Filter::eq("email", normalize_email(&email)),
        (None, None) => Filter::All,
    }
}

fn member_filter(search: Option<String>) -> Filter {
    let members = Filter::eq("role", Role::Member.as_str());
    match search {
        Some(search) => members.and(Filter::contains("name", search)),
        None => members,
    }
}

// POST /users
async fn create_user(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<NewUser>,
) -> AppResult<impl IntoResponse> {
    let new_user = req.into_user(Utc::now());
    let outcome = state.store.insert_record(Collection::Users, &new_user).await?;

    info!("User {} created by {}", new_user.email, user.email);
    Ok(created(outcome))
}

// POST /users/google
async fn sign_in(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<GoogleSignIn>,
) -> AppResult<impl IntoResponse> {
    if !user.is(&req.email) {
        warn!("{} tried to sign in as {}", user.email, req.email);
        return Err(AppError::forbidden("Email does not match the signed-in account"));
    }

    let now = Utc::now();
    let update = Update::set(to_document(&SignInStamp { last_sign_in: now })?);
    let on_insert = to_document(&FirstSignIn {
        created_at: now,
        role: Role::User,
        name: req.name.or(user.name.clone()),
        image: req.image.or(user.picture.clone()),
    })?;

    let outcome = state
        .store
        .upsert_one(Collection::Users, &Filter::eq("email", user.email.as_str()), &update, on_insert)
        .await?;

    match outcome.upserted_id {
        Some(id) => info!("First sign-in of {}, user {} created", user.email, id),
        None => info!("{} signed in", user.email),
    }
    Ok(Json(outcome))
}

// GET /users/me
async fn current_user(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<Record<User>>> {
    let profile = User::find_by_email(state.store.as_ref(), &user.email)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(profile))
}

// GET /users?email&name
async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    QueryParams(query): QueryParams<UserQuery>,
) -> AppResult<Json<Vec<Record<User>>>> {
    let users = state
        .store
        .find_records(Collection::Users, &user_filter(query))
        .await?;
    Ok(Json(users))
}

// GET /users/member?search
async fn list_members(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    QueryParams(query): QueryParams<MemberQuery>,
) -> AppResult<Json<Vec<Record<User>>>> {
    let members = state
        .store
        .find_records(Collection::Users, &member_filter(query.search))
        .await?;
    Ok(Json(members))
}

// PATCH /users/reject-member/{email}
async fn change_member_role(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(email): Path<String>,
    ValidatedJson(req): ValidatedJson<RoleChange>,
) -> AppResult<impl IntoResponse> {
    let email = normalize_email(&email);
    let mut update = Update::set(patch_document(&UserPatch {
        role: Some(req.role),
        ..Default::default()
    })?);
    if req.remove_member_at {
        update = update.with_unset("memberAt");
    }

    let outcome = state
        .store
        .update_one(Collection::Users, &Filter::eq("email", email.as_str()), &update)
        .await?;
    info!("{} set role of {} to {}", admin.user.email, email, req.role);
    updated(outcome, "User")
}

// PATCH /users/{email}
async fn update_user(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(email): Path<String>,
    ValidatedJson(req): ValidatedJson<UserPatch>,
) -> AppResult<impl IntoResponse> {
    let email = normalize_email(&email);
    let set = patch_document(&req)?;

    // Users may edit their own name and picture; anything else takes an admin
    let self_service = user.is(&email) && req.role.is_none() && req.member_at.is_none();
    if !self_service {
        require_role(&state, &user, Role::Admin).await?;
    }

    let outcome = state
        .store
        .update_one(Collection::Users, &Filter::eq("email", email.as_str()), &Update::set(set))
        .await?;
    info!("User {} updated by {}", email, user.email);
    updated(outcome, "User")
}

// DELETE /users/{id}
async fn delete_user(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    DocumentId(id): DocumentId,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .store
        .delete_one(Collection::Users, &Filter::Id(id))
        .await?;
    info!("User {} deleted by {}", id, admin.user.email);
    deleted(outcome, "User")
}
