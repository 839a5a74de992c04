use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate, Utc};
use fake::{faker::internet::en::SafeEmail, Fake};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use sports_club::{
    app,
    config::CorsConfig,
    models::{Booking, BookingStatus, Coupon, PaymentState, Role, User},
    services::identity::{IdentityError, TokenVerifier, VerifiedIdentity},
    store::{Collection, DocumentStoreExt, MemoryDocumentStore},
    AppState,
};

const ADMIN: &str = "admin@club.test";
const MEMBER: &str = "jo@club.test";
const PLAYER: &str = "pat@club.test";
const NEWCOMER: &str = "newbie@club.test";

/// Accepts a fixed set of tokens instead of asking the identity provider.
struct StaticVerifier {
    tokens: HashMap<String, VerifiedIdentity>,
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| IdentityError::Invalid("unknown test token".into()))
    }
}

fn identity(email: &str) -> VerifiedIdentity {
    VerifiedIdentity {
        uid: format!("uid-{email}"),
        email: email.to_string(),
        name: None,
        picture: None,
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemoryDocumentStore>,
    stranger: String,
}

impl TestApp {
    async fn new() -> Self {
        let store = Arc::new(MemoryDocumentStore::new());
        seed_user(&store, ADMIN, "Club Admin", Role::Admin).await;
        seed_user(&store, MEMBER, "Jo Member", Role::Member).await;
        seed_user(&store, PLAYER, "Pat Player", Role::User).await;

        // Verified by the provider but never signed in here
        let stranger: String = SafeEmail().fake();

        let tokens = [
            ("admin-token", ADMIN),
            ("member-token", MEMBER),
            ("player-token", PLAYER),
            ("newbie-token", NEWCOMER),
            ("stranger-token", stranger.as_str()),
        ]
        .into_iter()
        .map(|(token, email)| (token.to_string(), identity(email)))
        .collect();

        let state = Arc::new(AppState::new(store.clone(), Arc::new(StaticVerifier { tokens })));
        TestApp {
            router: app(state, &CorsConfig::default()),
            store,
            stranger,
        }
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    async fn patch(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PATCH, uri, Some(token), Some(body)).await
    }

    async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, Some(token), None).await
    }

    async fn book(&self, token: &str, court: &str) -> String {
        let (status, body) = self
            .post(
                "/booking",
                token,
                json!({
                    "courtName": court,
                    "courtType": "clay",
                    "date": "2024-06-01",
                    "slots": ["08:00-09:00", "09:00-10:00"],
                    "price": 30.0
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["insertedId"].as_str().unwrap().to_string()
    }

    async fn seed_booking(&self, request_by: &str, court: &str, status: BookingStatus, payment: PaymentState) -> Uuid {
        let booking = Booking {
            request_by: request_by.to_string(),
            user_name: None,
            court_id: None,
            court_name: court.to_string(),
            court_type: None,
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            slots: vec!["18:00-19:00".to_string()],
            price: 20.0,
            status,
            payment,
            booking_id: Some(format!("pi_{}", court.replace(' ', "_").to_lowercase())),
            coupon: None,
            created_at: Utc::now(),
            paid_at: None,
        };
        self.store
            .insert_record(Collection::Bookings, &booking)
            .await
            .unwrap()
            .inserted_id
    }
}

async fn seed_user(store: &MemoryDocumentStore, email: &str, name: &str, role: Role) -> Uuid {
    let user = User {
        email: email.to_string(),
        name: Some(name.to_string()),
        image: None,
        role,
        created_at: Some(Utc::now()),
        last_sign_in: None,
        member_at: (role == Role::Member).then(Utc::now),
    };
    store
        .insert_record(Collection::Users, &user)
        .await
        .unwrap()
        .inserted_id
}

fn emails(list: &Value) -> Vec<&str> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|doc| doc["requestBy"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn banner_and_health_are_public() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("running"));

    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));
}

#[tokio::test]
async fn requests_without_a_valid_token_are_unauthorized() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/booking", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"success": false, "error": "Unauthorized access"}));

    let (status, _) = app.get("/booking", Some("forged-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/admin/overview", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_role_is_forbidden() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/booking/pending", Some("player-token")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], json!(false));

    let (status, _) = app.get("/admin/overview", Some("member-token")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Role checks are exact: an admin is not a member
    let (status, _) = app.get("/booking/approved", Some("admin-token")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // No stored profile at all
    let (status, _) = app.get("/users", Some("stranger-token")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn booking_round_trip() {
    let app = TestApp::new().await;
    let id = app.book("player-token", "Court 1").await;

    let (status, booking) = app.get(&format!("/booking/{id}"), Some("player-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["id"], json!(id));
    assert_eq!(booking["requestBy"], json!(PLAYER));
    assert_eq!(booking["courtName"], json!("Court 1"));
    assert_eq!(booking["courtType"], json!("clay"));
    assert_eq!(booking["date"], json!("2024-06-01"));
    assert_eq!(booking["slots"], json!(["08:00-09:00", "09:00-10:00"]));
    assert_eq!(booking["price"], json!(30.0));
    assert_eq!(booking["status"], json!("pending"));
    assert_eq!(booking["payment"], json!("unpaid"));

    let (status, body) = app.delete(&format!("/booking/{id}"), "player-token").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"deletedCount": 1}));

    let (status, _) = app.get(&format!("/booking/{id}"), Some("player-token")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, list) = app.get("/booking", Some("player-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!([]));

    let (status, _) = app.delete(&format!("/booking/{id}"), "player-token").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_booking_is_rejected() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post(
            "/booking",
            "player-token",
            json!({"courtName": "Court 1", "date": "2024-06-01", "slots": [], "price": 30.0}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));

    let (status, _) = app.get("/booking/not-a-uuid", Some("player-token")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patch_merges_only_given_fields() {
    let app = TestApp::new().await;
    let id = app.book("player-token", "Court 2").await;

    let (status, outcome) = app
        .patch(
            &format!("/booking/{id}"),
            "player-token",
            json!({"payment": "paid", "bookingId": "pi_123", "coupon": "summer"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome, json!({"matchedCount": 1, "modifiedCount": 1}));

    let (_, booking) = app.get(&format!("/booking/{id}"), Some("player-token")).await;
    assert_eq!(booking["payment"], json!("paid"));
    assert_eq!(booking["bookingId"], json!("pi_123"));
    assert_eq!(booking["coupon"], json!("SUMMER"));
    assert!(booking["paidAt"].is_string());
    assert_eq!(booking["courtName"], json!("Court 2"));
    assert_eq!(booking["status"], json!("pending"));
    assert_eq!(booking["slots"], json!(["08:00-09:00", "09:00-10:00"]));

    let (status, _) = app.patch(&format!("/booking/{id}"), "player-token", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = Uuid::new_v4();
    let (status, _) = app
        .patch(&format!("/booking/{missing}"), "admin-token", json!({"payment": "paid"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_the_owner_or_an_admin_may_touch_a_booking() {
    let app = TestApp::new().await;
    let id = app.book("player-token", "Court 3").await;
    let uri = format!("/booking/{id}");

    let (status, _) = app.get(&uri, Some("member-token")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.patch(&uri, "stranger-token", json!({"payment": "paid"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.delete(&uri, "member-token").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, booking) = app.get(&uri, Some("admin-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["requestBy"], json!(PLAYER));
}

#[tokio::test]
async fn approval_is_reserved_for_admins() {
    let app = TestApp::new().await;
    let id = app.book("player-token", "Court 4").await;

    let (status, _) = app
        .patch(&format!("/booking/{id}"), "player-token", json!({"status": "approved"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .patch(&format!("/booking/approve/{id}"), "player-token", json!({"status": "approved"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .patch(&format!("/booking/approve/{id}"), "admin-token", json!({"status": "cancelled"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, outcome) = app
        .patch(&format!("/booking/approve/{id}"), "admin-token", json!({"status": "approved"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["modifiedCount"], json!(1));

    // Owners may still cancel their own booking
    let (status, _) = app
        .patch(&format!("/booking/{id}"), "player-token", json!({"status": "cancelled"}))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn owners_confirm_only_approved_bookings() {
    let app = TestApp::new().await;
    let id = app.book("player-token", "Court 6").await;
    let uri = format!("/booking/{id}");

    let (status, _) = app
        .patch(
            &uri,
            "player-token",
            json!({"status": "confirmed", "payment": "paid", "price": 0.0, "bookingId": "pi_fake"}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .patch(&uri, "player-token", json!({"status": "confirmed", "payment": "paid"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], json!("Booking must be approved before it can be confirmed"));

    let (status, _) = app.patch(&uri, "player-token", json!({"status": "pending"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.patch(&uri, "player-token", json!({"price": 0.0})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], json!("Only an admin can change the price"));

    let (_, unchanged) = app.get(&uri, Some("player-token")).await;
    assert_eq!(unchanged["status"], json!("pending"));
    assert_eq!(unchanged["payment"], json!("unpaid"));
    assert_eq!(unchanged["price"], json!(30.0));

    let (status, _) = app.patch(&uri, "admin-token", json!({"price": 25.0})).await;
    assert_eq!(status, StatusCode::OK);

    app.patch(&format!("/booking/approve/{id}"), "admin-token", json!({"status": "approved"}))
        .await;
    let (status, _) = app
        .patch(
            &uri,
            "player-token",
            json!({"status": "confirmed", "payment": "paid", "bookingId": "pi_456"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, confirmed) = app.get(&uri, Some("player-token")).await;
    assert_eq!(confirmed["status"], json!("confirmed"));
    assert_eq!(confirmed["payment"], json!("paid"));
    assert_eq!(confirmed["price"], json!(25.0));
}

#[tokio::test]
async fn booking_listings_are_scoped_and_filtered() {
    let app = TestApp::new().await;
    let first = app.book("player-token", "Court 1").await;
    app.book("player-token", "Court 2").await;
    app.book("member-token", "Court 5").await;
    app.patch(&format!("/booking/approve/{first}"), "admin-token", json!({"status": "approved"}))
        .await;

    let (status, mine) = app.get("/booking", Some("player-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(emails(&mine), vec![PLAYER, PLAYER]);

    let (_, approved) = app.get("/booking?status=approved", Some("player-token")).await;
    assert_eq!(approved.as_array().unwrap().len(), 1);
    assert_eq!(approved[0]["id"], json!(first));

    let (_, blank) = app.get("/booking?status=&email=", Some("player-token")).await;
    assert_eq!(blank.as_array().unwrap().len(), 2);

    let (status, _) = app
        .get(&format!("/booking?email={MEMBER}"), Some("player-token"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/booking?status=lost", Some("player-token")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, everyone) = app.get("/booking", Some("admin-token")).await;
    assert_eq!(everyone.as_array().unwrap().len(), 3);

    let (_, theirs) = app
        .get(&format!("/booking?email={MEMBER}"), Some("admin-token"))
        .await;
    assert_eq!(emails(&theirs), vec![MEMBER]);

    let (_, pending) = app.get("/booking/pending", Some("admin-token")).await;
    assert_eq!(pending.as_array().unwrap().len(), 2);

    let (_, approved) = app.get("/booking/pending?status=approved", Some("admin-token")).await;
    assert_eq!(approved.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn members_see_their_approved_and_confirmed_bookings() {
    let app = TestApp::new().await;
    app.seed_booking(MEMBER, "Court 1", BookingStatus::Approved, PaymentState::Unpaid)
        .await;
    app.seed_booking(MEMBER, "Court 2", BookingStatus::Confirmed, PaymentState::Paid)
        .await;
    app.seed_booking(MEMBER, "Court 3", BookingStatus::Pending, PaymentState::Unpaid)
        .await;
    app.seed_booking(PLAYER, "Court 4", BookingStatus::Approved, PaymentState::Unpaid)
        .await;

    let (status, approved) = app.get("/booking/approved", Some("member-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved.as_array().unwrap().len(), 1);
    assert_eq!(approved[0]["courtName"], json!("Court 1"));

    let (_, confirmed) = app
        .get(&format!("/booking/confirmed?email={MEMBER}"), Some("member-token"))
        .await;
    assert_eq!(confirmed.as_array().unwrap().len(), 1);
    assert_eq!(confirmed[0]["courtName"], json!("Court 2"));

    let (status, _) = app
        .get(&format!("/booking/approved?email={PLAYER}"), Some("member-token"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn manage_confirmed_searches_paid_confirmed_bookings() {
    let app = TestApp::new().await;
    let target = app
        .seed_booking(PLAYER, "Centre Court", BookingStatus::Confirmed, PaymentState::Paid)
        .await;
    app.seed_booking(MEMBER, "Side Court", BookingStatus::Confirmed, PaymentState::Paid)
        .await;
    app.seed_booking(PLAYER, "Centre Court", BookingStatus::Confirmed, PaymentState::Unpaid)
        .await;
    app.seed_booking(PLAYER, "Centre Court", BookingStatus::Approved, PaymentState::Paid)
        .await;

    let (status, all) = app.get("/booking/manage-confirmed", Some("admin-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, by_court) = app
        .get("/booking/manage-confirmed?query=centre", Some("admin-token"))
        .await;
    assert_eq!(by_court.as_array().unwrap().len(), 1);
    assert_eq!(by_court[0]["id"], json!(target.to_string()));

    let (_, by_reference) = app
        .get("/booking/manage-confirmed?query=PI_SIDE", Some("admin-token"))
        .await;
    assert_eq!(emails(&by_reference), vec![MEMBER]);

    let (_, by_email) = app
        .get("/booking/manage-confirmed?query=pat%40club", Some("admin-token"))
        .await;
    assert_eq!(emails(&by_email), vec![PLAYER]);
}

#[tokio::test]
async fn google_sign_in_upserts_by_email() {
    let app = TestApp::new().await;

    let (status, _) = app.get("/users/me", Some("newbie-token")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let body = json!({"email": NEWCOMER, "name": "New Bie"});
    let (status, first) = app.post("/users/google", "newbie-token", body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["matchedCount"], json!(0));
    assert!(first["upsertedId"].is_string());

    let (_, me) = app.get("/users/me", Some("newbie-token")).await;
    assert_eq!(me["id"], first["upsertedId"]);
    assert_eq!(me["email"], json!(NEWCOMER));
    assert_eq!(me["name"], json!("New Bie"));
    assert_eq!(me["role"], json!("user"));
    assert!(me["createdAt"].is_string());
    let first_sign_in = me["lastSignIn"].clone();
    assert!(first_sign_in.is_string());

    let (status, second) = app.post("/users/google", "newbie-token", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["matchedCount"], json!(1));
    assert!(second.get("upsertedId").is_none());

    let (_, users) = app
        .get(&format!("/users?email={NEWCOMER}"), Some("admin-token"))
        .await;
    assert_eq!(users.as_array().unwrap().len(), 1);
    assert_eq!(users[0]["createdAt"], me["createdAt"]);

    let (status, _) = app
        .post("/users/google", "newbie-token", json!({"email": PLAYER}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn users_can_be_created_once() {
    let app = TestApp::new().await;
    let email = app.stranger.clone();

    let (status, created) = app
        .post("/users", "stranger-token", json!({"email": email, "name": "Sam Stranger"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["insertedId"].is_string());

    let (status, _) = app.post("/users", "stranger-token", json!({"email": email})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app.post("/users", "stranger-token", json!({"email": "nope"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, me) = app.get("/users/me", Some("stranger-token")).await;
    assert_eq!(me["role"], json!("user"));
}

#[tokio::test]
async fn emails_are_matched_regardless_of_case() {
    let app = TestApp::new().await;

    let (status, _) = app
        .post("/users", "admin-token", json!({"email": "Newbie@Club.test", "name": "New Bie"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, outcome) = app
        .post("/users/google", "newbie-token", json!({"email": NEWCOMER}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["matchedCount"], json!(1));
    assert!(outcome.get("upsertedId").is_none());

    let (_, users) = app
        .get("/users?email=NEWBIE@club.test", Some("admin-token"))
        .await;
    assert_eq!(users.as_array().unwrap().len(), 1);
    assert_eq!(users[0]["email"], json!(NEWCOMER));
    assert_eq!(users[0]["name"], json!("New Bie"));

    let (status, _) = app
        .patch("/users/Pat@club.test", "player-token", json!({"name": "Patricia"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, me) = app.get("/users/me", Some("player-token")).await;
    assert_eq!(me["name"], json!("Patricia"));

    let (status, _) = app
        .patch(
            "/users/reject-member/JO@CLUB.TEST",
            "admin-token",
            json!({"role": "user"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admins_search_users_and_members() {
    let app = TestApp::new().await;

    let (status, all) = app.get("/users", Some("admin-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 3);

    // name wins over email
    let (_, by_name) = app
        .get(&format!("/users?name=PAT&email={ADMIN}"), Some("admin-token"))
        .await;
    assert_eq!(by_name.as_array().unwrap().len(), 1);
    assert_eq!(by_name[0]["email"], json!(PLAYER));

    let (_, members) = app.get("/users/member", Some("admin-token")).await;
    assert_eq!(members.as_array().unwrap().len(), 1);
    assert_eq!(members[0]["email"], json!(MEMBER));

    let (_, none) = app.get("/users/member?search=pat", Some("admin-token")).await;
    assert_eq!(none, json!([]));
}

#[tokio::test]
async fn profile_updates_respect_ownership() {
    let app = TestApp::new().await;

    let (status, outcome) = app
        .patch(&format!("/users/{PLAYER}"), "player-token", json!({"name": "Patricia"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["modifiedCount"], json!(1));

    let (status, _) = app
        .patch(&format!("/users/{PLAYER}"), "player-token", json!({"role": "admin"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .patch(&format!("/users/{MEMBER}"), "player-token", json!({"name": "Someone"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .patch(&format!("/users/{PLAYER}"), "admin-token", json!({"role": "member"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, me) = app.get("/users/me", Some("player-token")).await;
    assert_eq!(me["name"], json!("Patricia"));
    assert_eq!(me["role"], json!("member"));
    assert_eq!(me["email"], json!(PLAYER));
}

#[tokio::test]
async fn rejecting_a_member_can_clear_the_membership_date() {
    let app = TestApp::new().await;

    let (_, before) = app.get("/users/me", Some("member-token")).await;
    assert!(before["memberAt"].is_string());

    let (status, _) = app
        .patch(
            &format!("/users/reject-member/{MEMBER}"),
            "admin-token",
            json!({"role": "user", "removeMemberAt": true}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, after) = app.get("/users/me", Some("member-token")).await;
    assert_eq!(after["role"], json!("user"));
    assert!(after.get("memberAt").is_none());
    assert_eq!(after["name"], json!("Jo Member"));

    // The demoted member lost access to member routes
    let (status, _) = app.get("/booking/approved", Some("member-token")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admins_delete_users_by_id() {
    let app = TestApp::new().await;
    let (_, me) = app.get("/users/me", Some("player-token")).await;
    let id = me["id"].as_str().unwrap().to_string();

    let (status, _) = app.delete(&format!("/users/{id}"), "player-token").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.delete(&format!("/users/{id}"), "admin-token").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"deletedCount": 1}));

    let (status, _) = app.get("/users/me", Some("player-token")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn announcements_are_posted_by_admins() {
    let app = TestApp::new().await;
    let body = json!({"title": "Courts closed", "description": "Resurfacing on Monday"});

    let (status, _) = app.post("/announcements", "player-token", body.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = app.post("/announcements", "admin-token", body).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["insertedId"].as_str().unwrap().to_string();

    let (status, list) = app.get("/announcements", Some("player-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["title"], json!("Courts closed"));
    assert_eq!(list[0]["postedBy"], json!(ADMIN));

    let (status, _) = app
        .patch(&format!("/announcements/{id}"), "admin-token", json!({"title": "Courts open"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = app.get("/announcements", Some("player-token")).await;
    assert_eq!(list[0]["title"], json!("Courts open"));
    assert_eq!(list[0]["description"], json!("Resurfacing on Monday"));

    let (status, _) = app.delete(&format!("/announcements/{id}"), "admin-token").await;
    assert_eq!(status, StatusCode::OK);
    let (_, list) = app.get("/announcements", Some("player-token")).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn coupons_are_created_and_applied() {
    let app = TestApp::new().await;

    let (status, _) = app
        .post("/coupons", "admin-token", json!({"code": " summer ", "discount": 10}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .post("/coupons", "admin-token", json!({"code": "SUMMER", "discount": 20}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("Coupon SUMMER already exists"));

    let (status, list) = app.get("/coupons", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["code"], json!("SUMMER"));

    let (status, quote) = app
        .post("/coupons/apply", "player-token", json!({"code": "Summer", "price": 50.0}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        quote,
        json!({"code": "SUMMER", "discount": 10.0, "originalPrice": 50.0, "finalPrice": 45.0})
    );

    let (status, _) = app
        .post("/coupons/apply", "player-token", json!({"code": "WINTER", "price": 50.0}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post("/coupons", "player-token", json!({"code": "FREE", "discount": 100}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post("/coupons", "admin-token", json!({"code": "  ", "discount": 10}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn expired_coupons_are_refused() {
    let app = TestApp::new().await;
    let expired = Coupon {
        code: "SPRING".to_string(),
        discount: 25.0,
        description: None,
        expires_at: Some(Utc::now() - Duration::days(1)),
    };
    let id = app
        .store
        .insert_record(Collection::Coupons, &expired)
        .await
        .unwrap()
        .inserted_id;

    let (status, body) = app
        .post("/coupons/apply", "player-token", json!({"code": "spring", "price": 40.0}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Coupon SPRING has expired"));

    let later = Utc::now() + Duration::days(30);
    let (status, _) = app
        .patch(&format!("/coupons/{id}"), "admin-token", json!({"expiresAt": later}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, quote) = app
        .post("/coupons/apply", "player-token", json!({"code": "spring", "price": 40.0}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["finalPrice"], json!(30.0));

    let (status, _) = app.delete(&format!("/coupons/{id}"), "admin-token").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn courts_crud() {
    let app = TestApp::new().await;
    let court = json!({
        "name": "Court 1",
        "courtType": "clay",
        "price": 12.5,
        "slots": ["08:00-09:00"],
        "facilities": ["lights"]
    });

    let (status, _) = app.post("/courts", "member-token", court.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = app.post("/courts", "admin-token", court).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["insertedId"].as_str().unwrap().to_string();
    let uri = format!("/courts/{id}");

    let (status, stored) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        stored,
        json!({
            "id": id,
            "name": "Court 1",
            "courtType": "clay",
            "price": 12.5,
            "slots": ["08:00-09:00"],
            "facilities": ["lights"]
        })
    );

    let (status, _) = app.patch(&uri, "admin-token", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, outcome) = app.patch(&uri, "admin-token", json!({"price": 15.0})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome, json!({"matchedCount": 1, "modifiedCount": 1}));

    let (_, list) = app.get("/courts", None).await;
    assert_eq!(list[0]["price"], json!(15.0));
    assert_eq!(list[0]["name"], json!("Court 1"));

    let (status, _) = app.delete(&uri, "admin-token").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.delete(&uri, "admin-token").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get("/courts/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn overview_reports_admin_and_totals() {
    let app = TestApp::new().await;
    app.post("/courts", "admin-token", json!({"name": "Court 1", "price": 10.0}))
        .await;
    app.post("/courts", "admin-token", json!({"name": "Court 2", "price": 10.0}))
        .await;

    let (status, overview) = app.get("/admin/overview", Some("admin-token")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        overview,
        json!({
            "adminInfo": {"name": "Club Admin", "email": ADMIN},
            "stats": {"totalCourts": 2, "totalUsers": 3, "totalMembers": 1}
        })
    );
}
