use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::error::AppResult;
use crate::middleware::AdminUser;
use crate::models::{Role, User};
use crate::store::{Collection, Filter};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/admin/overview", get(overview))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub admin_info: AdminInfo,
    pub stats: Stats,
}

#[derive(Debug, Default, Serialize)]
pub struct AdminInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl From<User> for AdminInfo {
    fn from(user: User) -> Self {
        AdminInfo {
            name: user.name,
            email: Some(user.email),
            image: user.image,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_courts: u64,
    pub total_users: u64,
    pub total_members: u64,
}

// GET /admin/overview
async fn overview(State(state): State<Arc<AppState>>, admin: AdminUser) -> AppResult<Json<Overview>> {
    let store = state.store.as_ref();
    let members = Filter::eq("role", Role::Member.as_str());
    let (total_courts, total_users, total_members) = tokio::try_join!(
        store.count(Collection::Courts, &Filter::All),
        store.count(Collection::Users, &Filter::All),
        store.count(Collection::Users, &members),
    )?;

    Ok(Json(Overview {
        admin_info: admin.profile.data.into(),
        stats: Stats {
            total_courts,
            total_users,
            total_members,
        },
    }))
}
