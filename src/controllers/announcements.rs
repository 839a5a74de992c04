use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::{created, deleted, patch_document, updated};
use crate::error::AppResult;
use crate::middleware::{AdminUser, AuthUser, DocumentId, ValidatedJson};
use crate::models::{Announcement, AnnouncementPatch, NewAnnouncement};
use crate::store::{Collection, DocumentStoreExt, Filter, Record, Update};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/announcements", get(list_announcements).post(create_announcement))
        .route(
            "/announcements/{id}",
            patch(update_announcement).delete(delete_announcement),
        )
}

// GET /announcements
async fn list_announcements(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> AppResult<Json<Vec<Record<Announcement>>>> {
    let announcements = state
        .store
        .find_records(Collection::Announcements, &Filter::All)
        .await?;
    Ok(Json(announcements))
}

// POST /announcements
async fn create_announcement(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    ValidatedJson(req): ValidatedJson<NewAnnouncement>,
) -> AppResult<impl IntoResponse> {
    let announcement = req.into_announcement(admin.user.email.clone(), Utc::now());
    let outcome = state
        .store
        .insert_record(Collection::Announcements, &announcement)
        .await?;

    info!("Announcement {} posted by {}", outcome.inserted_id, admin.user.email);
    Ok(created(outcome))
}

// PATCH /announcements/{id}
async fn update_announcement(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    DocumentId(id): DocumentId,
    ValidatedJson(req): ValidatedJson<AnnouncementPatch>,
) -> AppResult<impl IntoResponse> {
    let set = patch_document(&req)?;
    let outcome = state
        .store
        .update_one(Collection::Announcements, &Filter::Id(id), &Update::set(set))
        .await?;
    info!("Announcement {} edited by {}", id, admin.user.email);
    updated(outcome, "Announcement")
}

// DELETE /announcements/{id}
async fn delete_announcement(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    DocumentId(id): DocumentId,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .store
        .delete_one(Collection::Announcements, &Filter::Id(id))
        .await?;
    info!("Announcement {} removed by {}", id, admin.user.email);
    deleted(outcome, "Announcement")
}
