pub mod admin;
pub mod announcements;
pub mod bookings;
pub mod coupons;
pub mod courts;
pub mod users;

use axum::{http::StatusCode, response::IntoResponse, Json, Router};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::store::{to_document, DeleteOutcome, Document, InsertOutcome, UpdateOutcome};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(admin::routes())
        .merge(bookings::routes())
        .merge(users::routes())
        .merge(announcements::routes())
        .merge(coupons::routes())
        .merge(courts::routes())
}

/* ---------- helpers ---------- */

/// `?field=` and absent both mean "no filter".
pub(crate) fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(de::Error::custom),
    }
}

/// Serializes a partial update, refusing one that changes nothing.
pub(crate) fn patch_document<T: Serialize>(patch: &T) -> AppResult<Document> {
    let doc = to_document(patch)?;
    if doc.is_empty() {
        return Err(AppError::bad_request("Nothing to update"));
    }
    Ok(doc)
}

pub(crate) fn created(outcome: InsertOutcome) -> impl IntoResponse {
    (StatusCode::CREATED, Json(outcome))
}

pub(crate) fn updated(outcome: UpdateOutcome, what: &str) -> AppResult<Json<UpdateOutcome>> {
    if outcome.matched_count == 0 {
        return Err(AppError::not_found(format!("{what} not found")));
    }
    Ok(Json(outcome))
}

pub(crate) fn deleted(outcome: DeleteOutcome, what: &str) -> AppResult<Json<DeleteOutcome>> {
    if outcome.deleted_count == 0 {
        return Err(AppError::not_found(format!("{what} not found")));
    }
    Ok(Json(outcome))
}
