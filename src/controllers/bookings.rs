use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{created, deleted, empty_as_none, patch_document, updated};
use crate::error::{AppError, AppResult};
use crate::middleware::{
    is_admin, AdminUser, AuthUser, DocumentId, MemberUser, QueryParams, ValidatedJson,
};
use crate::models::coupon::normalize_code;
use crate::models::{
    normalize_email, ApproveBooking, Booking, BookingPatch, BookingStatus, NewBooking, PaymentState,
};
use crate::store::{Collection, DocumentStoreExt, Filter, Record, Update};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/booking", get(list_bookings).post(create_booking))
        .route("/booking/approved", get(approved_bookings))
        .route("/booking/confirmed", get(confirmed_bookings))
        .route("/booking/pending", get(bookings_by_status))
        .route("/booking/manage-confirmed", get(manage_confirmed))
        .route("/booking/approve/{id}", patch(approve_booking))
        .route(
            "/booking/{id}",
            get(get_booking).patch(update_booking).delete(delete_booking),
        )
}

/* ---------- helpers ---------- */

#[derive(Debug, Deserialize)]
struct BookingQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    email: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    status: Option<BookingStatus>,
}

#[derive(Debug, Deserialize)]
struct EmailQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    status: Option<BookingStatus>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    query: Option<String>,
}

/// Resolves the `requestBy` a listing may cover. Admins may ask for anyone
/// (or everyone); other callers only ever see their own bookings.
fn scope_email(requested: Option<String>, caller: &AuthUser, admin: bool) -> AppResult<Option<String>> {
    match requested {
        Some(email) if caller.is(&email) => Ok(Some(caller.email.clone())),
        Some(email) if admin => Ok(Some(normalize_email(&email))),
        Some(_) => Err(AppError::forbidden("Forbidden access")),
        None if admin => Ok(None),
        None => Ok(Some(caller.email.clone())),
    }
}

fn listing_filter(request_by: Option<String>, status: Option<BookingStatus>) -> Filter {
    let mut filter = Filter::All;
    if let Some(email) = request_by {
        filter = filter.and(Filter::eq("requestBy", email));
    }
    if let Some(status) = status {
        filter = filter.and(Filter::eq("status", status.as_str()));
    }
    filter
}

fn manage_confirmed_filter(query: Option<String>) -> Filter {
    let filter = Filter::eq("payment", PaymentState::Paid.as_str())
        .and(Filter::eq("status", BookingStatus::Confirmed.as_str()));
    match query {
        Some(needle) => filter.and(Filter::Or(vec![
            Filter::contains("courtName", needle.clone()),
            Filter::contains("bookingId", needle.clone()),
            Filter::contains("requestBy", needle),
        ])),
        None => filter,
    }
}

async fn find_booking(state: &AppState, id: Uuid) -> AppResult<Record<Booking>> {
    state
        .store
        .find_record::<Booking>(Collection::Bookings, &Filter::Id(id))
        .await?
        .ok_or_else(|| AppError::not_found("Booking not found"))
}

/// The booking, provided the caller owns it or is an admin.
async fn owned_booking(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<(Record<Booking>, bool)> {
    let booking = find_booking(state, id).await?;
    let admin = is_admin(state, user).await?;
    if !admin && !user.is(&booking.data.request_by) {
        tracing::warn!("{} tried to access booking {} of {}", user.email, id, booking.data.request_by);
        return Err(AppError::forbidden("Forbidden access"));
    }
    Ok((booking, admin))
}

/// Changes a booking owner may make without an admin. Prices are admin-only
/// and an owner can only cancel, or confirm once an admin has approved.
fn check_owner_patch(current: BookingStatus, req: &BookingPatch) -> AppResult<()> {
    if req.price.is_some() {
        return Err(AppError::forbidden("Only an admin can change the price"));
    }
    match req.status {
        None | Some(BookingStatus::Cancelled) => Ok(()),
        Some(BookingStatus::Confirmed) if current == BookingStatus::Approved => Ok(()),
        Some(BookingStatus::Confirmed) => Err(AppError::forbidden(
            "Booking must be approved before it can be confirmed",
        )),
        Some(status) if status.is_admin_decision() => Err(AppError::forbidden(
            "Only an admin can approve or reject a booking",
        )),
        Some(_) => Err(AppError::forbidden("A booking can only be cancelled or confirmed")),
    }
}

/* ---------- BOOKINGS ---------- */

// POST /booking
async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<NewBooking>,
) -> AppResult<impl IntoResponse> {
    let booking = req.into_booking(user.email.clone(), Utc::now());
    let outcome = state.store.insert_record(Collection::Bookings, &booking).await?;

    info!(
        "Booking {} requested by {} for {} on {}",
        outcome.inserted_id, user.email, booking.court_name, booking.date
    );
    Ok(created(outcome))
}

// GET /booking?email&status
async fn list_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    QueryParams(query): QueryParams<BookingQuery>,
) -> AppResult<Json<Vec<Record<Booking>>>> {
    let admin = is_admin(&state, &user).await?;
    let request_by = scope_email(query.email, &user, admin)?;

    let bookings = state
        .store
        .find_records(Collection::Bookings, &listing_filter(request_by, query.status))
        .await?;
    Ok(Json(bookings))
}

// GET /booking/approved?email
async fn approved_bookings(
    State(state): State<Arc<AppState>>,
    member: MemberUser,
    QueryParams(query): QueryParams<EmailQuery>,
) -> AppResult<Json<Vec<Record<Booking>>>> {
    bookings_of_member(&state, &member.user, query.email, BookingStatus::Approved).await
}

// GET /booking/confirmed?email
async fn confirmed_bookings(
    State(state): State<Arc<AppState>>,
    member: MemberUser,
    QueryParams(query): QueryParams<EmailQuery>,
) -> AppResult<Json<Vec<Record<Booking>>>> {
    bookings_of_member(&state, &member.user, query.email, BookingStatus::Confirmed).await
}

async fn bookings_of_member(
    state: &AppState,
    user: &AuthUser,
    email: Option<String>,
    status: BookingStatus,
) -> AppResult<Json<Vec<Record<Booking>>>> {
    let request_by = scope_email(email, user, false)?;
    let bookings = state
        .store
        .find_records(Collection::Bookings, &listing_filter(request_by, Some(status)))
        .await?;
    Ok(Json(bookings))
}

// GET /booking/pending?status
async fn bookings_by_status(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    QueryParams(query): QueryParams<StatusQuery>,
) -> AppResult<Json<Vec<Record<Booking>>>> {
    let status = query.status.unwrap_or(BookingStatus::Pending);
    let bookings = state
        .store
        .find_records(Collection::Bookings, &listing_filter(None, Some(status)))
        .await?;
    Ok(Json(bookings))
}

// GET /booking/manage-confirmed?query
async fn manage_confirmed(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    QueryParams(query): QueryParams<SearchQuery>,
) -> AppResult<Json<Vec<Record<Booking>>>> {
    let bookings = state
        .store
        .find_records(Collection::Bookings, &manage_confirmed_filter(query.query))
        .await?;
    Ok(Json(bookings))
}

// GET /booking/{id}
async fn get_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    DocumentId(id): DocumentId,
) -> AppResult<Json<Record<Booking>>> {
    let (booking, _) = owned_booking(&state, &user, id).await?;
    Ok(Json(booking))
}

// PATCH /booking/{id}
async fn update_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    DocumentId(id): DocumentId,
    ValidatedJson(mut req): ValidatedJson<BookingPatch>,
) -> AppResult<impl IntoResponse> {
    if req.payment == Some(PaymentState::Paid) && req.paid_at.is_none() {
        req.paid_at = Some(Utc::now());
    }
    req.coupon = req.coupon.as_deref().map(normalize_code);
    let set = patch_document(&req)?;

    let (booking, admin) = owned_booking(&state, &user, id).await?;
    if !admin {
        check_owner_patch(booking.data.status, &req)?;
    }

    let outcome = state
        .store
        .update_one(Collection::Bookings, &Filter::Id(id), &Update::set(set))
        .await?;
    info!("Booking {} updated by {}", id, user.email);
    updated(outcome, "Booking")
}

// PATCH /booking/approve/{id}
async fn approve_booking(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    DocumentId(id): DocumentId,
    ValidatedJson(req): ValidatedJson<ApproveBooking>,
) -> AppResult<impl IntoResponse> {
    if !req.status.is_admin_decision() {
        return Err(AppError::bad_request("Status must be approved or rejected"));
    }
    let set = patch_document(&BookingPatch {
        status: Some(req.status),
        ..Default::default()
    })?;

    let outcome = state
        .store
        .update_one(Collection::Bookings, &Filter::Id(id), &Update::set(set))
        .await?;
    info!("Booking {} {} by {}", id, req.status.as_str(), admin.user.email);
    updated(outcome, "Booking")
}

// DELETE /booking/{id}
async fn delete_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    DocumentId(id): DocumentId,
) -> AppResult<impl IntoResponse> {
    owned_booking(&state, &user, id).await?;

    let outcome = state
        .store
        .delete_one(Collection::Bookings, &Filter::Id(id))
        .await?;
    info!("Booking {} deleted by {}", id, user.email);
    deleted(outcome, "Booking")
}
