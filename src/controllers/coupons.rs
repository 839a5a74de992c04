use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use super::{created, deleted, patch_document, updated};
use crate::error::{AppError, AppResult};
use crate::middleware::{AdminUser, AuthUser, DocumentId, ValidatedJson};
use crate::models::coupon::normalize_code;
use crate::models::{ApplyCoupon, Coupon, CouponPatch, CouponQuote, NewCoupon};
use crate::store::{Collection, DocumentStoreExt, Filter, Record, StoreError, Update};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/coupons", get(list_coupons).post(create_coupon))
        .route("/coupons/apply", post(apply_coupon))
        .route("/coupons/{id}", patch(update_coupon).delete(delete_coupon))
}

// GET /coupons
async fn list_coupons(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Record<Coupon>>>> {
    let coupons = state.store.find_records(Collection::Coupons, &Filter::All).await?;
    Ok(Json(coupons))
}

// POST /coupons
async fn create_coupon(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    ValidatedJson(req): ValidatedJson<NewCoupon>,
) -> AppResult<impl IntoResponse> {
    let coupon = req.into_coupon();
    let outcome = state
        .store
        .insert_record(Collection::Coupons, &coupon)
        .await
        .map_err(|e| match e {
            StoreError::Duplicate(_) => AppError::Conflict(format!("Coupon {} already exists", coupon.code)),
            other => other.into(),
        })?;

    info!("Coupon {} ({}% off) created by {}", coupon.code, coupon.discount, admin.user.email);
    Ok(created(outcome))
}

// POST /coupons/apply
async fn apply_coupon(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<ApplyCoupon>,
) -> AppResult<Json<CouponQuote>> {
    let code = normalize_code(&req.code);
    let coupon = state
        .store
        .find_record::<Coupon>(Collection::Coupons, &Filter::eq("code", code.as_str()))
        .await?
        .ok_or_else(|| AppError::not_found(format!("Coupon {code} not found")))?;

    if coupon.data.is_expired(Utc::now()) {
        return Err(AppError::bad_request(format!("Coupon {code} has expired")));
    }

    let quote = coupon.data.quote(req.price);
    debug!(
        "{} applied {}: {} -> {}",
        user.email, quote.code, quote.original_price, quote.final_price
    );
    Ok(Json(quote))
}

// PATCH /coupons/{id}
async fn update_coupon(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    DocumentId(id): DocumentId,
    ValidatedJson(req): ValidatedJson<CouponPatch>,
) -> AppResult<impl IntoResponse> {
    let set = patch_document(&req)?;
    let outcome = state
        .store
        .update_one(Collection::Coupons, &Filter::Id(id), &Update::set(set))
        .await?;
    info!("Coupon {} updated by {}", id, admin.user.email);
    updated(outcome, "Coupon")
}

// DELETE /coupons/{id}
async fn delete_coupon(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    DocumentId(id): DocumentId,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .store
        .delete_one(Collection::Coupons, &Filter::Id(id))
        .await?;
    info!("Coupon {} deleted by {}", id, admin.user.email);
    deleted(outcome, "Coupon")
}
