use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tracing::info;

use super::{created, deleted, patch_document, updated};
use crate::error::{AppError, AppResult};
use crate::middleware::{AdminUser, DocumentId, ValidatedJson};
use crate::models::{Court, CourtPatch};
use crate::store::{Collection, DocumentStoreExt, Filter, Record, Update};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/courts", get(list_courts).post(create_court))
        .route(
            "/courts/{id}",
            get(get_court).patch(update_court).delete(delete_court),
        )
}

// GET /courts
async fn list_courts(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Record<Court>>>> {
    let courts = state.store.find_records(Collection::Courts, &Filter::All).await?;
    Ok(Json(courts))
}

// GET /courts/{id}
async fn get_court(
    State(state): State<Arc<AppState>>,
    DocumentId(id): DocumentId,
) -> AppResult<Json<Record<Court>>> {
    let court = state
        .store
        .find_record::<Court>(Collection::Courts, &Filter::Id(id))
        .await?
        .ok_or_else(|| AppError::not_found("Court not found"))?;
    Ok(Json(court))
}

// POST /courts
async fn create_court(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    ValidatedJson(court): ValidatedJson<Court>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.store.insert_record(Collection::Courts, &court).await?;
    info!("Court {} ({}) added by {}", court.name, outcome.inserted_id, admin.user.email);
    Ok(created(outcome))
}

// PATCH /courts/{id}
async fn update_court(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    DocumentId(id): DocumentId,
    ValidatedJson(req): ValidatedJson<CourtPatch>,
) -> AppResult<impl IntoResponse> {
    let set = patch_document(&req)?;
    let outcome = state
        .store
        .update_one(Collection::Courts, &Filter::Id(id), &Update::set(set))
        .await?;
    info!("Court {} updated by {}", id, admin.user.email);
    updated(outcome, "Court")
}

// DELETE /courts/{id}
async fn delete_court(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    DocumentId(id): DocumentId,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .store
        .delete_one(Collection::Courts, &Filter::Id(id))
        .await?;
    info!("Court {} deleted by {}", id, admin.user.email);
    deleted(outcome, "Court")
}
