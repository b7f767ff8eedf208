//! Admin API for pool and order management
//!
//! Operator-facing endpoints for stocking the account pool, creating orders,
//! and driving the approve/release lifecycle. Intended for a private
//! listener; when an admin token is configured every route additionally
//! requires `Authorization: Bearer <token>`.
//!
//! Endpoints:
//! - GET    /admin/accounts               — list accounts (no credentials)
//! - POST   /admin/accounts               — add an account to the pool
//! - GET    /admin/accounts/{id}          — full record including credentials
//! - DELETE /admin/accounts/{id}          — remove (refused while slots in use)
//! - GET    /admin/availability/{service_id} — allocation candidates, least-used first
//! - GET    /admin/pool                   — pool health summary
//! - POST   /admin/orders                 — register an order awaiting approval
//! - GET    /admin/orders/{id}            — order with current binding
//! - POST   /admin/orders/{id}/approve    — approve payment, allocate a slot
//! - POST   /admin/orders/{id}/release    — free the order's slot

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use common::Secret;
use slot_pool::{AccountCredentials, AccountRecord, Allocator, Error, Order};

use crate::approval::{self, FulfillError};

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    allocator: Arc<Allocator>,
    auth_token: Option<Arc<Secret<String>>>,
}

impl AdminState {
    pub fn new(allocator: Arc<Allocator>, auth_token: Option<Secret<String>>) -> Self {
        Self {
            allocator,
            auth_token: auth_token.map(Arc::new),
        }
    }
}

/// Build the admin axum router with all management endpoints.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/accounts", get(list_accounts).post(create_account))
        .route(
            "/admin/accounts/{id}",
            get(account_detail).delete(delete_account),
        )
        .route("/admin/availability/{service_id}", get(availability))
        .route("/admin/pool", get(pool_status))
        .route("/admin/orders", post(create_order))
        .route("/admin/orders/{id}", get(order_detail))
        .route("/admin/orders/{id}/approve", post(approve_order))
        .route("/admin/orders/{id}/release", post(release_order))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

/// Bearer-token check applied to every admin route.
///
/// No token configured means the API is open; the config layer logs that
/// tradeoff at startup.
async fn require_auth(
    State(state): State<AdminState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(token) = &state.auth_token else {
        return next.run(request).await;
    };

    let expected = format!("Bearer {}", token.expose());
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if presented == Some(expected.as_str()) {
        next.run(request).await
    } else {
        warn!(path = %request.uri().path(), "admin request rejected: bad or missing bearer token");
        json(
            StatusCode::UNAUTHORIZED,
            serde_json::json!({ "error": "missing or invalid bearer token" }),
        )
        .into_response()
    }
}

/// JSON response in the shape every handler returns.
fn json(
    status: StatusCode,
    body: serde_json::Value,
) -> (StatusCode, [(axum::http::HeaderName, &'static str); 1], String) {
    (status, [(CONTENT_TYPE, "application/json")], body.to_string())
}

/// GET /admin/accounts — list all pool accounts.
///
/// Returns summaries only. Credentials never appear in list responses; use
/// the detail endpoint for a single record.
async fn list_accounts(State(state): State<AdminState>) -> impl IntoResponse {
    let accounts = state.allocator.accounts().summaries().await;
    json(
        StatusCode::OK,
        serde_json::json!({ "accounts": accounts }),
    )
}

/// Request body for account creation.
#[derive(Deserialize)]
struct CreateAccountRequest {
    service_id: String,
    email: String,
    password: String,
    #[serde(default)]
    backup_email: Option<String>,
    #[serde(default)]
    profile_name: Option<String>,
    #[serde(default)]
    profile_pin: Option<String>,
    max_slots: u32,
    /// When the underlying subscription lapses, unix millis.
    subscription_expires_at: u64,
}

/// POST /admin/accounts — add a purchased subscription account to the pool.
async fn create_account(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<CreateAccountRequest>,
) -> impl IntoResponse {
    let id = format!("acct-{}", Uuid::new_v4());
    let record = AccountRecord::new(
        &id,
        &body.service_id,
        AccountCredentials {
            email: body.email,
            password: body.password,
            backup_email: body.backup_email,
            profile_name: body.profile_name,
            profile_pin: body.profile_pin,
        },
        body.max_slots,
        body.subscription_expires_at,
    );

    match state.allocator.accounts().insert(record).await {
        Ok(()) => {
            info!(account_id = id, service_id = body.service_id, "account added to pool");
            json(
                StatusCode::CREATED,
                serde_json::json!({ "account_id": id, "status": "added" }),
            )
        }
        Err(e @ Error::InvalidRecord(_)) => {
            json(StatusCode::BAD_REQUEST, serde_json::json!({ "error": e.to_string() }))
        }
        Err(e) => {
            warn!(account_id = id, error = %e, "account insert failed");
            json(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": e.to_string() }),
            )
        }
    }
}

/// GET /admin/accounts/{id} — full record, credentials included.
///
/// The one read endpoint that exposes credentials; it exists for operators
/// verifying pool stock against the upstream subscription.
async fn account_detail(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.allocator.accounts().get(&id).await {
        Some(record) => json(
            StatusCode::OK,
            serde_json::to_value(&record).unwrap_or_default(),
        ),
        None => json(
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": format!("account not found: {id}") }),
        ),
    }
}

/// DELETE /admin/accounts/{id} — remove an account from the pool.
///
/// Refused while orders still hold slots; release them first. Deleting an
/// absent account succeeds (idempotent).
async fn delete_account(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.allocator.accounts().remove(&id).await {
        Ok(Some(_)) => {
            info!(account_id = id, "account removed from pool");
            json(
                StatusCode::OK,
                serde_json::json!({ "account_id": id, "status": "removed" }),
            )
        }
        Ok(None) => json(
            StatusCode::OK,
            serde_json::json!({ "account_id": id, "status": "not_present" }),
        ),
        Err(e @ Error::AccountInUse { .. }) => {
            json(StatusCode::CONFLICT, serde_json::json!({ "error": e.to_string() }))
        }
        Err(e) => {
            warn!(account_id = id, error = %e, "account removal failed");
            json(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": e.to_string() }),
            )
        }
    }
}

/// GET /admin/availability/{service_id} — allocation candidates for a service.
async fn availability(
    State(state): State<AdminState>,
    Path(service_id): Path<String>,
) -> impl IntoResponse {
    let candidates = state.allocator.find_available(&service_id).await;
    json(
        StatusCode::OK,
        serde_json::json!({ "service_id": service_id, "candidates": candidates }),
    )
}

/// GET /admin/pool — pool health summary (same shape as the health endpoint).
async fn pool_status(State(state): State<AdminState>) -> impl IntoResponse {
    let now_millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let health = state.allocator.accounts().health(now_millis).await;
    json(StatusCode::OK, health)
}

/// Request body for order registration.
#[derive(Deserialize)]
struct CreateOrderRequest {
    order_no: String,
    service_id: String,
    /// When the customer's grant should end, unix millis.
    #[serde(default)]
    expires_at: Option<u64>,
}

/// POST /admin/orders — register a pending order awaiting payment approval.
async fn create_order(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<CreateOrderRequest>,
) -> impl IntoResponse {
    if body.order_no.is_empty() || body.service_id.is_empty() {
        return json(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "order_no and service_id must be non-empty" }),
        );
    }

    let id = format!("order-{}", Uuid::new_v4());
    let order = Order::new(&id, &body.order_no, &body.service_id, body.expires_at);

    match state.allocator.orders().insert(order).await {
        Ok(()) => {
            info!(order_id = id, order_no = body.order_no, "order registered");
            json(
                StatusCode::CREATED,
                serde_json::json!({ "order_id": id, "status": "pending" }),
            )
        }
        Err(e) => {
            warn!(order_id = id, error = %e, "order insert failed");
            json(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": e.to_string() }),
            )
        }
    }
}

/// GET /admin/orders/{id} — order with its current binding, if any.
async fn order_detail(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.allocator.orders().get(&id).await {
        Some(order) => json(
            StatusCode::OK,
            serde_json::to_value(&order).unwrap_or_default(),
        ),
        None => json(
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": format!("order not found: {id}") }),
        ),
    }
}

/// Request body for order approval.
#[derive(Deserialize)]
struct ApproveOrderRequest {
    /// Identifier of the verified payment. Required; payment verification
    /// itself happens upstream of this API.
    payment_reference: String,
    #[serde(default)]
    profile_name: Option<String>,
    #[serde(default)]
    profile_pin: Option<String>,
}

/// POST /admin/orders/{id}/approve — approve payment and allocate a slot.
///
/// Returns the binding, credential snapshot included, for delivery to the
/// customer.
async fn approve_order(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    axum::Json(body): axum::Json<ApproveOrderRequest>,
) -> impl IntoResponse {
    if body.payment_reference.trim().is_empty() {
        return json(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "payment_reference must be non-empty" }),
        );
    }

    match approval::fulfill_order(
        &state.allocator,
        &id,
        &body.payment_reference,
        body.profile_name,
        body.profile_pin,
    )
    .await
    {
        Ok(binding) => json(
            StatusCode::OK,
            serde_json::to_value(&binding).unwrap_or_default(),
        ),
        Err(e) => {
            let status = match &e {
                FulfillError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                FulfillError::OrderAlreadyBound { .. }
                | FulfillError::OrderNotBindable { .. } => StatusCode::CONFLICT,
                FulfillError::NoCapacity { .. } => StatusCode::SERVICE_UNAVAILABLE,
                FulfillError::Assign(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            json(status, serde_json::json!({ "error": e.to_string() }))
        }
    }
}

/// POST /admin/orders/{id}/release — free the slot bound to an order.
///
/// The account is derived from the order's binding; an order with no
/// binding has nothing to release.
async fn release_order(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(order) = state.allocator.orders().get(&id).await else {
        return json(
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": format!("order not found: {id}") }),
        );
    };

    let Some(access) = order.access_info else {
        return json(
            StatusCode::CONFLICT,
            serde_json::json!({ "error": format!("order {id} has no bound slot") }),
        );
    };

    match state.allocator.release(&access.account_id, &id).await {
        Ok(outcome) => json(
            StatusCode::OK,
            serde_json::json!({
                "order_id": id,
                "account_id": access.account_id,
                "status": match outcome {
                    slot_pool::ReleaseOutcome::Released => "released",
                    slot_pool::ReleaseOutcome::AlreadyReleased => "already_released",
                },
            }),
        ),
        Err(e) => {
            warn!(order_id = id, error = %e, "release failed");
            json(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": e.to_string() }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use slot_pool::{AccountStore, OrderStore};
    use tower::ServiceExt;

    async fn test_allocator(dir: &std::path::Path) -> Arc<Allocator> {
        let accounts = Arc::new(AccountStore::load(dir.join("accounts.json")).await.unwrap());
        let orders = Arc::new(OrderStore::load(dir.join("orders.json")).await.unwrap());
        Arc::new(Allocator::new(accounts, orders))
    }

    fn open_router(allocator: Arc<Allocator>) -> Router {
        build_admin_router(AdminState::new(allocator, None))
    }

    /// Expiration far in the future (year 2100).
    fn future_expiry() -> u64 {
        4_102_444_800_000
    }

    fn account_body(max_slots: u32) -> serde_json::Value {
        serde_json::json!({
            "service_id": "svc",
            "email": "pool@example.com",
            "password": "hunter2",
            "profile_name": "P1",
            "max_slots": max_slots,
            "subscription_expires_at": future_expiry(),
        })
    }

    async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn create_test_order(app: &Router) -> String {
        let (status, body) = post_json(
            app,
            "/admin/orders",
            serde_json::json!({ "order_no": "20260825-0001", "service_id": "svc" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["order_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn created_account_appears_in_listing_without_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let app = open_router(test_allocator(dir.path()).await);

        let (status, created) = post_json(&app, "/admin/accounts", account_body(4)).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["account_id"].as_str().unwrap();
        assert!(id.starts_with("acct-"));

        let (status, listing) = get_json(&app, "/admin/accounts").await;
        assert_eq!(status, StatusCode::OK);
        let accounts = listing["accounts"].as_array().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0]["id"], id);
        assert_eq!(accounts[0]["status"], "available");
        // Credentials never appear in listings
        assert!(accounts[0].get("credentials").is_none());
        assert!(!listing.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn account_detail_includes_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let app = open_router(test_allocator(dir.path()).await);

        let (_, created) = post_json(&app, "/admin/accounts", account_body(4)).await;
        let id = created["account_id"].as_str().unwrap();

        let (status, detail) = get_json(&app, &format!("/admin/accounts/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["credentials"]["email"], "pool@example.com");
        assert_eq!(detail["credentials"]["password"], "hunter2");
        assert_eq!(detail["slots"]["max_slots"], 4);
    }

    #[tokio::test]
    async fn invalid_account_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = open_router(test_allocator(dir.path()).await);

        // Zero slots fails record validation
        let (status, body) = post_json(&app, "/admin/accounts", account_body(0)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("max_slots"));
    }

    #[tokio::test]
    async fn approve_allocates_and_returns_binding() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = test_allocator(dir.path()).await;
        let app = open_router(allocator.clone());

        let (_, created) = post_json(&app, "/admin/accounts", account_body(2)).await;
        let account_id = created["account_id"].as_str().unwrap().to_string();
        let order_id = create_test_order(&app).await;

        let (status, binding) = post_json(
            &app,
            &format!("/admin/orders/{order_id}/approve"),
            serde_json::json!({ "payment_reference": "pay-123" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(binding["account_id"], account_id);
        assert_eq!(binding["slot_number"], 1);
        assert_eq!(binding["email"], "pool@example.com");
        assert_eq!(binding["password"], "hunter2");
        assert_eq!(binding["profile_name"], "P1");

        // Slot consumed
        let account = allocator.accounts().get(&account_id).await.unwrap();
        assert_eq!(account.slots.used_slots, 1);
    }

    #[tokio::test]
    async fn approve_requires_payment_reference() {
        let dir = tempfile::tempdir().unwrap();
        let app = open_router(test_allocator(dir.path()).await);
        let order_id = create_test_order(&app).await;

        let (status, body) = post_json(
            &app,
            &format!("/admin/orders/{order_id}/approve"),
            serde_json::json!({ "payment_reference": "  " }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("payment_reference"));
    }

    #[tokio::test]
    async fn second_approve_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let app = open_router(test_allocator(dir.path()).await);

        post_json(&app, "/admin/accounts", account_body(2)).await;
        let order_id = create_test_order(&app).await;

        let approve_body = serde_json::json!({ "payment_reference": "pay-123" });
        let (status, _) = post_json(
            &app,
            &format!("/admin/orders/{order_id}/approve"),
            approve_body.clone(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = post_json(
            &app,
            &format!("/admin/orders/{order_id}/approve"),
            approve_body,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already bound"));
    }

    #[tokio::test]
    async fn approve_with_empty_pool_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let app = open_router(test_allocator(dir.path()).await);
        let order_id = create_test_order(&app).await;

        let (status, body) = post_json(
            &app,
            &format!("/admin/orders/{order_id}/approve"),
            serde_json::json!({ "payment_reference": "pay-123" }),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("no capacity"));
    }

    #[tokio::test]
    async fn approve_missing_order_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = open_router(test_allocator(dir.path()).await);

        let (status, _) = post_json(
            &app,
            "/admin/orders/order-ghost/approve",
            serde_json::json!({ "payment_reference": "pay-123" }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn release_frees_slot_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = test_allocator(dir.path()).await;
        let app = open_router(allocator.clone());

        let (_, created) = post_json(&app, "/admin/accounts", account_body(2)).await;
        let account_id = created["account_id"].as_str().unwrap().to_string();
        let order_id = create_test_order(&app).await;
        post_json(
            &app,
            &format!("/admin/orders/{order_id}/approve"),
            serde_json::json!({ "payment_reference": "pay-123" }),
        )
        .await;

        let (status, body) =
            post_json(&app, &format!("/admin/orders/{order_id}/release"), serde_json::Value::Null)
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "released");

        let account = allocator.accounts().get(&account_id).await.unwrap();
        assert_eq!(account.slots.used_slots, 0);

        // The binding is gone, so a second release reports the conflict
        let (status, _) =
            post_json(&app, &format!("/admin/orders/{order_id}/release"), serde_json::Value::Null)
                .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn release_unbound_order_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let app = open_router(test_allocator(dir.path()).await);
        let order_id = create_test_order(&app).await;

        let (status, body) =
            post_json(&app, &format!("/admin/orders/{order_id}/release"), serde_json::Value::Null)
                .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("no bound slot"));
    }

    #[tokio::test]
    async fn delete_account_refused_while_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let app = open_router(test_allocator(dir.path()).await);

        let (_, created) = post_json(&app, "/admin/accounts", account_body(2)).await;
        let account_id = created["account_id"].as_str().unwrap().to_string();
        let order_id = create_test_order(&app).await;
        post_json(
            &app,
            &format!("/admin/orders/{order_id}/approve"),
            serde_json::json!({ "payment_reference": "pay-123" }),
        )
        .await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/admin/accounts/{account_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // After release, removal goes through
        post_json(&app, &format!("/admin/orders/{order_id}/release"), serde_json::Value::Null)
            .await;
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/admin/accounts/{account_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn delete_nonexistent_account_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let app = open_router(test_allocator(dir.path()).await);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/admin/accounts/acct-does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn availability_lists_candidates_least_used_first() {
        let dir = tempfile::tempdir().unwrap();
        let app = open_router(test_allocator(dir.path()).await);

        post_json(&app, "/admin/accounts", account_body(2)).await;
        post_json(&app, "/admin/accounts", account_body(2)).await;
        let order_id = create_test_order(&app).await;
        post_json(
            &app,
            &format!("/admin/orders/{order_id}/approve"),
            serde_json::json!({ "payment_reference": "pay-123" }),
        )
        .await;

        let (status, body) = get_json(&app, "/admin/availability/svc").await;
        assert_eq!(status, StatusCode::OK);
        let candidates = body["candidates"].as_array().unwrap();
        assert_eq!(candidates.len(), 2);
        // The untouched account sorts ahead of the one holding a slot
        assert_eq!(candidates[0]["used_slots"], 0);
        assert_eq!(candidates[1]["used_slots"], 1);

        // Unknown service yields an empty candidate list
        let (status, body) = get_json(&app, "/admin/availability/other-svc").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["candidates"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pool_status_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let app = open_router(test_allocator(dir.path()).await);

        let (status, body) = get_json(&app, "/admin/pool").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accounts_total"], 0);

        post_json(&app, "/admin/accounts", account_body(3)).await;
        let (_, body) = get_json(&app, "/admin/pool").await;
        assert_eq!(body["accounts_total"], 1);
        assert_eq!(body["slots_total"], 3);
    }

    #[tokio::test]
    async fn order_detail_shows_binding_after_approval() {
        let dir = tempfile::tempdir().unwrap();
        let app = open_router(test_allocator(dir.path()).await);

        post_json(&app, "/admin/accounts", account_body(2)).await;
        let order_id = create_test_order(&app).await;

        let (status, body) = get_json(&app, &format!("/admin/orders/{order_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "pending");
        assert!(body.get("access_info").is_none());

        post_json(
            &app,
            &format!("/admin/orders/{order_id}/approve"),
            serde_json::json!({ "payment_reference": "pay-123" }),
        )
        .await;

        let (_, body) = get_json(&app, &format!("/admin/orders/{order_id}")).await;
        assert_eq!(body["status"], "active");
        assert_eq!(body["access_info"]["slot_number"], 1);

        let (status, _) = get_json(&app, "/admin/orders/order-ghost").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bearer_auth_guards_every_route() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = test_allocator(dir.path()).await;
        let app = build_admin_router(AdminState::new(
            allocator,
            Some(Secret::new("sekrit".to_string())),
        ));

        // No header
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/admin/accounts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Wrong token
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/admin/pool")
                    .header("authorization", "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Correct token
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/admin/accounts")
                    .header("authorization", "Bearer sekrit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unconfigured_token_leaves_api_open() {
        let dir = tempfile::tempdir().unwrap();
        let app = open_router(test_allocator(dir.path()).await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/admin/accounts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
