//! End-to-end account flows over HTTP against the in-process store

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Instant;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};
use tower::ServiceExt;
use usermod_api::{
    auth::{AuthPolicy, PasswordVault},
    routes::{create_router, users::FORGOT_PASSWORD_MIN_RESPONSE},
    AppState, AuthConfig, TokenDelivery,
};
use time::OffsetDateTime;
use usermod_shared::{
    MemoryStore, OperationToken, StoreError, TokenPurpose, TokenStore, User, UserPatch, UserStore,
};
use uuid::Uuid;

const SECRET: &str = "integration-secret-at-least-32-characters";

/// Captures delivered tokens instead of sending them anywhere
#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<OperationToken>>,
}

impl Outbox {
    fn latest(&self, user_id: Uuid, purpose: TokenPurpose) -> Option<Uuid> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|t| t.user_id == user_id && t.purpose == purpose)
            .map(|t| t.id)
    }
}

#[async_trait]
impl TokenDelivery for Outbox {
    async fn deliver(&self, _user: &User, token: &OperationToken) {
        self.sent.lock().unwrap().push(token.clone());
    }
}

fn outage() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

/// User store whose next password write fails once armed
struct FlakyUsers {
    inner: Arc<MemoryStore>,
    fail_password_write: AtomicBool,
}

#[async_trait]
impl UserStore for FlakyUsers {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.inner.insert_user(user).await
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_id(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_email(email).await
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &[u8]) -> Result<(), StoreError> {
        if self.fail_password_write.swap(false, Ordering::SeqCst) {
            return Err(outage());
        }
        self.inner.update_password_hash(id, password_hash).await
    }

    async fn set_activated(&self, id: Uuid, activated: bool) -> Result<(), StoreError> {
        self.inner.set_activated(id, activated).await
    }

    async fn soft_delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.soft_delete_user(id).await
    }

    async fn apply_user_patch(&self, id: Uuid, patch: &UserPatch) -> Result<User, StoreError> {
        self.inner.apply_user_patch(id, patch).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// Token store whose next insert fails once armed
struct FlakyTokens {
    inner: Arc<MemoryStore>,
    fail_insert: AtomicBool,
}

#[async_trait]
impl TokenStore for FlakyTokens {
    async fn insert_token(&self, token: &OperationToken) -> Result<(), StoreError> {
        if self.fail_insert.swap(false, Ordering::SeqCst) {
            return Err(outage());
        }
        self.inner.insert_token(token).await
    }

    async fn find_token(&self, id: Uuid) -> Result<Option<OperationToken>, StoreError> {
        self.inner.find_token(id).await
    }

    async fn mark_token_used(
        &self,
        id: Uuid,
        purpose: TokenPurpose,
        expected_user: Option<Uuid>,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, StoreError> {
        self.inner.mark_token_used(id, purpose, expected_user, now).await
    }

    async fn release_token(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.release_token(id).await
    }
}

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    outbox: Arc<Outbox>,
}

fn harness_with(require_activation: bool) -> Harness {
    let store = Arc::new(MemoryStore::new());
    harness_over(store.clone(), store.clone(), store, require_activation)
}

fn harness_over(
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
    store: Arc<MemoryStore>,
    require_activation: bool,
) -> Harness {
    let outbox = Arc::new(Outbox::default());
    let auth = AuthConfig {
        jwt_secret: SECRET.to_string(),
        policy: AuthPolicy { require_activation },
        ..Default::default()
    };
    // Cheap Argon2 parameters keep the suite fast
    let vault = PasswordVault::new(argon2::Params::new(1024, 1, 1, None).unwrap());
    let state = AppState::new(users, tokens, &auth, vault).with_delivery(outbox.clone());

    Harness {
        app: create_router(state),
        store,
        outbox,
    }
}

fn harness() -> Harness {
    harness_with(true)
}

fn basic(email: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", email, password)))
}

impl Harness {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn register(&self, email: &str, password: &str) -> Uuid {
        let (status, body) = self
            .call(
                "POST",
                "/user",
                None,
                Some(json!({ "name": "Alice", "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().parse().unwrap()
    }

    async fn activate(&self, user_id: Uuid) {
        let token = self.outbox.latest(user_id, TokenPurpose::Activation).unwrap();
        let (status, _) = self
            .call("GET", &format!("/user/activate?token={token}"), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_register_activate_and_fetch_profile() {
    let h = harness();
    let user_id = h.register("alice@example.com", "iamapassword").await;
    let auth = basic("alice@example.com", "iamapassword");

    // Not activated yet: right password still refused
    let (status, body) = h.call("GET", "/user", Some(&auth), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");

    h.activate(user_id).await;

    let (status, body) = h.call("GET", "/user", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], user_id.to_string());
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["name"], "Alice");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn test_activation_token_is_single_use() {
    let h = harness();
    let user_id = h.register("alice@example.com", "iamapassword").await;
    let token = h.outbox.latest(user_id, TokenPurpose::Activation).unwrap();
    let uri = format!("/user/activate?token={token}");

    let (first, _) = h.call("GET", &uri, None, None).await;
    let (second, body) = h.call("GET", &uri, None, None).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_activation_rejects_bad_tokens() {
    let h = harness();

    let (status, _) = h.call("GET", "/user/activate", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .call("GET", &format!("/user/activate?token={}", Uuid::new_v4()), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h
        .call("GET", "/user/activate?token=not-a-uuid", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let h = harness();
    h.register("alice@example.com", "iamapassword").await;

    let (status, body) = h
        .call(
            "POST",
            "/user",
            None,
            Some(json!({ "email": "ALICE@example.com", "password": "anotherpassword" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "EMAIL_EXISTS");
}

#[tokio::test]
async fn test_registration_validates_input() {
    let h = harness();

    let (status, _) = h
        .call(
            "POST",
            "/user",
            None,
            Some(json!({ "email": "alice@example.com", "password": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .call(
            "POST",
            "/user",
            None,
            Some(json!({ "email": "not-an-email", "password": "iamapassword" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_basic_auth_challenge_versus_refusal() {
    let h = harness();
    let user_id = h.register("alice@example.com", "iamapassword").await;
    h.activate(user_id).await;

    let response = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/user").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

    let (wrong, wrong_body) = h
        .call("GET", "/user", Some(&basic("alice@example.com", "nottheone")), None)
        .await;
    let (unknown, unknown_body) = h
        .call("GET", "/user", Some(&basic("bob@example.com", "iamapassword")), None)
        .await;
    assert_eq!(wrong, StatusCode::FORBIDDEN);
    assert_eq!(unknown, StatusCode::FORBIDDEN);
    assert_eq!(wrong_body, unknown_body);
}

#[tokio::test]
async fn test_login_without_activation_when_policy_allows() {
    let h = harness_with(false);
    h.register("alice@example.com", "iamapassword").await;

    let (status, _) = h
        .call("GET", "/user", Some(&basic("alice@example.com", "iamapassword")), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_patch_profile_merges_fields() {
    let h = harness();
    let user_id = h.register("alice@example.com", "iamapassword").await;
    h.activate(user_id).await;
    let auth = basic("alice@example.com", "iamapassword");

    let (status, body) = h
        .call("PATCH", "/user", Some(&auth), Some(json!({ "phone": "+15550100" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phone"], "+15550100");
    assert_eq!(body["name"], "Alice");

    let (status, body) = h
        .call(
            "PATCH",
            "/user",
            Some(&auth),
            Some(json!({ "name": "Alice Liddell", "phone": null })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Alice Liddell");
    assert_eq!(body["phone"], Value::Null);
    assert_eq!(body["email"], "alice@example.com");
}

#[tokio::test]
async fn test_change_password_switches_credentials() {
    let h = harness();
    let user_id = h.register("alice@example.com", "iamapassword").await;
    h.activate(user_id).await;

    let (status, _) = h
        .call(
            "POST",
            "/change_password",
            Some(&basic("alice@example.com", "iamapassword")),
            Some(json!({ "newPassword": "brandnewpassword" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (old, _) = h
        .call("GET", "/user", Some(&basic("alice@example.com", "iamapassword")), None)
        .await;
    let (new, _) = h
        .call("GET", "/user", Some(&basic("alice@example.com", "brandnewpassword")), None)
        .await;
    assert_eq!(old, StatusCode::FORBIDDEN);
    assert_eq!(new, StatusCode::OK);
}

#[tokio::test]
async fn test_forgot_and_reset_password() {
    let h = harness();
    let user_id = h.register("alice@example.com", "iamapassword").await;
    h.activate(user_id).await;

    // Unknown addresses get the same answer and no token
    let (status, unknown_body) = h
        .call("POST", "/user/forgot_password?email=nobody@example.com", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h
        .call("POST", "/user/forgot_password?email=alice@example.com", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, unknown_body);

    let token = h.outbox.latest(user_id, TokenPurpose::PasswordReset).unwrap();

    // An activation token cannot stand in for a reset token
    let activation = h.outbox.latest(user_id, TokenPurpose::Activation).unwrap();
    let (status, _) = h
        .call(
            "POST",
            "/user/reset_password",
            None,
            Some(json!({ "user_id": user_id, "token": activation, "password": "resetpassword" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Someone else's id with the right token fails too
    let (status, _) = h
        .call(
            "POST",
            "/user/reset_password",
            None,
            Some(json!({ "user_id": Uuid::new_v4(), "token": token, "password": "resetpassword" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h
        .call(
            "POST",
            "/user/reset_password",
            None,
            Some(json!({ "user_id": user_id, "token": token, "password": "resetpassword" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h
        .call("GET", "/user", Some(&basic("alice@example.com", "resetpassword")), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // Spent
    let (status, _) = h
        .call(
            "POST",
            "/user/reset_password",
            None,
            Some(json!({ "user_id": user_id, "token": token, "password": "yetanotherpassword" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_forgot_password_skips_inactive_accounts() {
    let h = harness();
    let user_id = h.register("alice@example.com", "iamapassword").await;

    let (status, _) = h
        .call("POST", "/user/forgot_password?email=alice@example.com", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.outbox.latest(user_id, TokenPurpose::PasswordReset).is_none());
}

#[tokio::test]
async fn test_delete_is_soft() {
    let h = harness();
    let user_id = h.register("alice@example.com", "iamapassword").await;
    h.activate(user_id).await;
    let auth = basic("alice@example.com", "iamapassword");

    let (status, _) = h.call("DELETE", "/user", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h.call("GET", "/user", Some(&auth), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let record = h.store.user_record(user_id).await.unwrap();
    assert!(record.is_deleted);

    // The address is free again
    h.register("alice@example.com", "iamapassword").await;
}

#[tokio::test]
async fn test_bearer_token_round_trip() {
    let h = harness();
    let user_id = h.register("alice@example.com", "iamapassword").await;
    h.activate(user_id).await;

    let (status, body) = h
        .call("POST", "/auth/token", Some(&basic("alice@example.com", "iamapassword")), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 15 * 60);
    let access_token = body["access_token"].as_str().unwrap().to_string();

    let (status, body) = h
        .call("GET", "/auth/me", Some(&format!("Bearer {access_token}")), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user_id.to_string());
    assert_eq!(body["email"], "alice@example.com");

    let (status, _) = h
        .call("GET", "/auth/me", Some("Bearer not.a.token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Basic credentials are not accepted where a bearer token is required
    let (status, _) = h
        .call("GET", "/auth/me", Some(&basic("alice@example.com", "iamapassword")), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_endpoints() {
    let h = harness();

    let (status, body) = h.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = h.call("GET", "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = h.call("GET", "/health/live", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_forgot_password_takes_the_same_minimum_time_for_unknown_addresses() {
    let h = harness();

    let start = Instant::now();
    let (status, _) = h
        .call("POST", "/user/forgot_password?email=nobody@example.com", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(start.elapsed() >= FORGOT_PASSWORD_MIN_RESPONSE);
}

#[tokio::test]
async fn test_failed_activation_token_does_not_lock_out_the_address() {
    let store = Arc::new(MemoryStore::new());
    let tokens = Arc::new(FlakyTokens {
        inner: store.clone(),
        fail_insert: AtomicBool::new(true),
    });
    let h = harness_over(store.clone(), tokens, store.clone(), true);

    let (status, _) = h
        .call(
            "POST",
            "/user",
            None,
            Some(json!({ "email": "alice@example.com", "password": "iamapassword" })),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // The half-created account does not hold the address
    let user_id = h.register("alice@example.com", "iamapassword").await;
    h.activate(user_id).await;

    let (status, _) = h
        .call("GET", "/user", Some(&basic("alice@example.com", "iamapassword")), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_failed_password_write_keeps_reset_token_usable() {
    let store = Arc::new(MemoryStore::new());
    let users = Arc::new(FlakyUsers {
        inner: store.clone(),
        fail_password_write: AtomicBool::new(false),
    });
    let h = harness_over(users.clone(), store.clone(), store.clone(), true);

    let user_id = h.register("alice@example.com", "iamapassword").await;
    h.activate(user_id).await;
    h.call("POST", "/user/forgot_password?email=alice@example.com", None, None)
        .await;
    let token = h.outbox.latest(user_id, TokenPurpose::PasswordReset).unwrap();
    let reset = json!({ "user_id": user_id, "token": token, "password": "resetpassword" });

    users.fail_password_write.store(true, Ordering::SeqCst);
    let (status, _) = h
        .call("POST", "/user/reset_password", None, Some(reset.clone()))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // Old password still in place, token still redeemable
    let (status, _) = h
        .call("GET", "/user", Some(&basic("alice@example.com", "iamapassword")), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h.call("POST", "/user/reset_password", None, Some(reset)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = h
        .call("GET", "/user", Some(&basic("alice@example.com", "resetpassword")), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}
