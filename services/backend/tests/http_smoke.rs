mod common;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use common::read_json;
use dataflex_backend::api::types::FeatureFlags;
use dataflex_backend::app::{AppState, build_router};
use dataflex_backend::auth::codes::ADMIN_AGENT_CODE;
use dataflex_backend::catalog::Catalog;
use dataflex_backend::lifecycle::DEFAULT_COMPLETION_NOTE;
use dataflex_backend::model::{
    Order, OrderChange, OrderStatus, OrderStatusUpdate, Role, User, UserPatchRequest,
};
use dataflex_backend::store::{
    BundleStore, ChangeSet, Snapshot, StoreConfig, StoreError, StoreResult,
    memory::InMemoryStore,
};
use dataflex_common::ids::{OrderId, UserId};
use http_helpers::{authed_json_request, authed_request, json_request};
use std::sync::Arc;
use tower::ServiceExt;

const ADMIN_TOKEN: &str = "admin-secret";

/// Build a router over a fresh in-memory store with a seeded admin account.
async fn app() -> axum::Router {
    let store = InMemoryStore::new(StoreConfig {
        changes_limit: 100,
        change_retention_max_rows: Some(100),
    });
    let now = Utc::now();
    let admin = store
        .create_user(User {
            id: UserId::new(),
            name: "DataFlex Admin".to_string(),
            email: "admin@dataflex.example".to_string(),
            role: Role::Admin,
            phone: None,
            agent_code: ADMIN_AGENT_CODE.to_string(),
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("seed admin");
    let state = AppState {
        service_name: "dataflex-backend".to_string(),
        api_version: "v1".to_string(),
        features: FeatureFlags {
            durable_storage: false,
            order_change_feed: true,
            analytics: true,
        },
        store: Arc::new(store),
        catalog: Arc::new(Catalog::load(None)),
        admin_token: Some(ADMIN_TOKEN.to_string()),
        admin_user_id: admin.id,
    };
    build_router(state)
}

/// Register an agent over HTTP and return the response body (includes the
/// agent code used as the bearer credential).
async fn register_agent(app: &axum::Router, name: &str, email: &str) -> serde_json::Value {
    let request = json_request(
        "POST",
        "/v1/agents",
        serde_json::json!({ "name": name, "email": email, "phone": "0244000111" }),
    );
    let response = app.clone().oneshot(request).await.expect("register");
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

/// Place an order with the given bearer credential and return the body.
async fn place_order(app: &axum::Router, token: &str, product_id: &str) -> serde_json::Value {
    let request = authed_json_request(
        "POST",
        "/v1/orders",
        token,
        serde_json::json!({ "product_id": product_id }),
    );
    let response = app.clone().oneshot(request).await.expect("order");
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

#[tokio::test]
async fn product_catalog_smoke() {
    let app = app().await;

    let list = Request::builder()
        .uri("/v1/products")
        .body(Body::empty())
        .expect("list");
    let response = app.clone().oneshot(list).await.expect("list");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    let items = payload["items"].as_array().expect("items");
    assert!(items.len() >= 2);
    assert!(items.iter().any(|p| p["id"] == "mtn-1gb"));

    let get = Request::builder()
        .uri("/v1/products/mtn-1gb")
        .body(Body::empty())
        .expect("get");
    let response = app.clone().oneshot(get).await.expect("get");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["name"], "MTN - 1GB");
    assert_eq!(payload["price"], "6.00");
    assert_eq!(payload["category"], "MTN Data Bundles");

    let missing = Request::builder()
        .uri("/v1/products/mtn-999gb")
        .body(Body::empty())
        .expect("missing");
    let response = app.clone().oneshot(missing).await.expect("missing");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json(response).await;
    assert_eq!(payload["code"], "not_found");

    let malformed = Request::builder()
        .uri("/v1/products/MTN-1GB")
        .body(Body::empty())
        .expect("malformed");
    let response = app.clone().oneshot(malformed).await.expect("malformed");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json(response).await;
    assert_eq!(payload["code"], "validation_error");
}

#[tokio::test]
async fn registration_enforces_unique_email() {
    let app = app().await;

    let agent = register_agent(&app, "Amara Mensah", "amara@example.com").await;
    assert_eq!(agent["role"], "agent");
    assert_eq!(agent["agent_code"].as_str().expect("code").len(), 6);
    assert_eq!(agent["phone"], "0244000111");

    let duplicate = json_request(
        "POST",
        "/v1/agents",
        serde_json::json!({ "name": "Impostor", "email": "AMARA@Example.com" }),
    );
    let response = app.clone().oneshot(duplicate).await.expect("duplicate");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json(response).await;
    assert_eq!(payload["code"], "already_exists");

    let invalid = json_request(
        "POST",
        "/v1/agents",
        serde_json::json!({ "name": "No Email", "email": "not-an-email" }),
    );
    let response = app.clone().oneshot(invalid).await.expect("invalid");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json(response).await;
    assert_eq!(payload["code"], "validation_error");
}

#[tokio::test]
async fn admin_routes_enforce_the_guard() {
    let app = app().await;
    let agent = register_agent(&app, "Amara Mensah", "amara@example.com").await;
    let agent_code = agent["agent_code"].as_str().expect("code");

    let anonymous = Request::builder()
        .uri("/v1/agents")
        .body(Body::empty())
        .expect("anonymous");
    let response = app.clone().oneshot(anonymous).await.expect("anonymous");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = read_json(response).await;
    assert_eq!(payload["code"], "unauthorized");

    let response = app
        .clone()
        .oneshot(authed_request("GET", "/v1/agents", agent_code))
        .await
        .expect("agent token");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let payload = read_json(response).await;
    assert_eq!(payload["code"], "forbidden");

    let response = app
        .clone()
        .oneshot(authed_request("GET", "/v1/agents", "ZZZZZZ"))
        .await
        .expect("unknown token");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(authed_request("GET", "/v1/agents", ADMIN_TOKEN))
        .await
        .expect("admin");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    let items = payload["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["user"]["name"], "Amara Mensah");
    assert_eq!(items[0]["order_count"], 0);
}

#[tokio::test]
async fn order_placement_snapshots_catalog_fields() {
    let app = app().await;
    let agent = register_agent(&app, "Amara Mensah", "amara@example.com").await;
    let agent_code = agent["agent_code"].as_str().expect("code");

    let order = place_order(&app, agent_code, "mtn-1gb").await;
    assert_eq!(order["status"], "pending");
    assert_eq!(order["price"], "6.00");
    assert_eq!(order["product_name"], "MTN - 1GB");
    assert_eq!(order["user_name"], "Amara Mensah");
    assert_eq!(order["user_id"], agent["id"]);

    let unknown = authed_json_request(
        "POST",
        "/v1/orders",
        agent_code,
        serde_json::json!({ "product_id": "mtn-999gb" }),
    );
    let response = app.clone().oneshot(unknown).await.expect("unknown");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let listed = app
        .clone()
        .oneshot(authed_request("GET", "/v1/orders", ADMIN_TOKEN))
        .await
        .expect("list");
    assert_eq!(listed.status(), StatusCode::OK);
    let payload = read_json(listed).await;
    assert_eq!(payload["items"].as_array().expect("items").len(), 1);

    let filtered = app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/v1/orders?status=completed",
            ADMIN_TOKEN,
        ))
        .await
        .expect("filter");
    let payload = read_json(filtered).await;
    assert!(payload["items"].as_array().expect("items").is_empty());

    let bad_filter = app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/v1/orders?status=delivered",
            ADMIN_TOKEN,
        ))
        .await
        .expect("bad filter");
    assert_eq!(bad_filter.status(), StatusCode::BAD_REQUEST);

    let forbidden = app
        .clone()
        .oneshot(authed_request("GET", "/v1/orders", agent_code))
        .await
        .expect("forbidden");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn lifecycle_transitions_over_http() {
    let app = app().await;
    let agent = register_agent(&app, "Amara Mensah", "amara@example.com").await;
    let agent_code = agent["agent_code"].as_str().expect("code");
    let order = place_order(&app, agent_code, "mtn-1gb").await;
    let order_id = order["id"].as_str().expect("id");
    let status_uri = format!("/v1/orders/{order_id}/status");

    let processing = authed_json_request(
        "PATCH",
        &status_uri,
        ADMIN_TOKEN,
        serde_json::json!({ "status": "processing", "processing_note": "verifying payment" }),
    );
    let response = app.clone().oneshot(processing).await.expect("processing");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["status"], "processing");
    assert_eq!(payload["processing_note"], "verifying payment");

    let completed = authed_json_request(
        "PATCH",
        &status_uri,
        ADMIN_TOKEN,
        serde_json::json!({ "status": "completed" }),
    );
    let response = app.clone().oneshot(completed).await.expect("completed");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["status"], "completed");
    assert_eq!(payload["processing_note"], DEFAULT_COMPLETION_NOTE);

    // Terminal: every further transition is rejected, including a repeat.
    for next in ["pending", "processing", "completed", "cancelled"] {
        let again = authed_json_request(
            "PATCH",
            &status_uri,
            ADMIN_TOKEN,
            serde_json::json!({ "status": next }),
        );
        let response = app.clone().oneshot(again).await.expect("terminal");
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let payload = read_json(response).await;
        assert_eq!(payload["code"], "invalid_transition");
    }

    let missing = authed_json_request(
        "PATCH",
        &format!("/v1/orders/{}/status", OrderId::new()),
        ADMIN_TOKEN,
        serde_json::json!({ "status": "processing" }),
    );
    let response = app.clone().oneshot(missing).await.expect("missing");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let malformed = authed_json_request(
        "PATCH",
        "/v1/orders/not-a-uuid/status",
        ADMIN_TOKEN,
        serde_json::json!({ "status": "processing" }),
    );
    let response = app.clone().oneshot(malformed).await.expect("malformed");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let agent_attempt = authed_json_request(
        "PATCH",
        &status_uri,
        agent_code,
        serde_json::json!({ "status": "cancelled" }),
    );
    let response = app.clone().oneshot(agent_attempt).await.expect("agent");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn stale_expected_status_is_a_conflict() {
    let app = app().await;
    let agent = register_agent(&app, "Amara Mensah", "amara@example.com").await;
    let agent_code = agent["agent_code"].as_str().expect("code");
    let order = place_order(&app, agent_code, "mtn-1gb").await;
    let status_uri = format!("/v1/orders/{}/status", order["id"].as_str().expect("id"));

    let stale = authed_json_request(
        "PATCH",
        &status_uri,
        ADMIN_TOKEN,
        serde_json::json!({ "status": "completed", "expected_status": "processing" }),
    );
    let response = app.clone().oneshot(stale).await.expect("stale");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json(response).await;
    assert_eq!(payload["code"], "conflict");

    let fresh = authed_json_request(
        "PATCH",
        &status_uri,
        ADMIN_TOKEN,
        serde_json::json!({ "status": "processing", "expected_status": "pending" }),
    );
    let response = app.clone().oneshot(fresh).await.expect("fresh");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn profile_updates_respect_immutable_fields() {
    let app = app().await;
    let amara = register_agent(&app, "Amara Mensah", "amara@example.com").await;
    let amara_code = amara["agent_code"].as_str().expect("code");
    let amara_id = amara["id"].as_str().expect("id");
    let kofi = register_agent(&app, "Kofi Boateng", "kofi@example.com").await;
    let kofi_code = kofi["agent_code"].as_str().expect("code");

    let patch = authed_json_request(
        "PATCH",
        &format!("/v1/agents/{amara_id}"),
        amara_code,
        serde_json::json!({ "name": "Amara A. Mensah", "phone": "0209988776" }),
    );
    let response = app.clone().oneshot(patch).await.expect("patch");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["name"], "Amara A. Mensah");
    assert_eq!(payload["phone"], "0209988776");

    let email_change = authed_json_request(
        "PATCH",
        &format!("/v1/agents/{amara_id}"),
        amara_code,
        serde_json::json!({ "email": "new@example.com" }),
    );
    let response = app.clone().oneshot(email_change).await.expect("email");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json(response).await;
    assert_eq!(payload["code"], "immutable_field");

    // Another agent cannot read or edit someone else's profile.
    let foreign = app
        .clone()
        .oneshot(authed_request(
            "GET",
            &format!("/v1/agents/{amara_id}"),
            kofi_code,
        ))
        .await
        .expect("foreign");
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

    // The admin can.
    let admin_view = app
        .clone()
        .oneshot(authed_request(
            "GET",
            &format!("/v1/agents/{amara_id}"),
            ADMIN_TOKEN,
        ))
        .await
        .expect("admin view");
    assert_eq!(admin_view.status(), StatusCode::OK);
}

#[tokio::test]
async fn deleting_an_agent_cascades_to_their_orders() {
    let app = app().await;
    let amara = register_agent(&app, "Amara Mensah", "amara@example.com").await;
    let amara_code = amara["agent_code"].as_str().expect("code");
    let amara_id = amara["id"].as_str().expect("id");
    let kofi = register_agent(&app, "Kofi Boateng", "kofi@example.com").await;
    let kofi_code = kofi["agent_code"].as_str().expect("code");

    place_order(&app, amara_code, "mtn-1gb").await;
    place_order(&app, amara_code, "mtn-2gb").await;
    let kept = place_order(&app, kofi_code, "vodafone-2gb").await;

    let delete = app
        .clone()
        .oneshot(authed_request(
            "DELETE",
            &format!("/v1/agents/{amara_id}"),
            ADMIN_TOKEN,
        ))
        .await
        .expect("delete");
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);

    let listed = app
        .clone()
        .oneshot(authed_request("GET", "/v1/orders", ADMIN_TOKEN))
        .await
        .expect("list");
    let payload = read_json(listed).await;
    let items = payload["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], kept["id"]);

    // The deleted agent's credential no longer resolves.
    let login = app
        .clone()
        .oneshot(authed_request("GET", "/v1/stats", amara_code))
        .await
        .expect("login");
    assert_eq!(login.status(), StatusCode::UNAUTHORIZED);

    let missing = app
        .clone()
        .oneshot(authed_request(
            "DELETE",
            &format!("/v1/agents/{amara_id}"),
            ADMIN_TOKEN,
        ))
        .await
        .expect("repeat delete");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn clearing_orders_preserves_accounts() {
    let app = app().await;
    let agent = register_agent(&app, "Amara Mensah", "amara@example.com").await;
    let agent_code = agent["agent_code"].as_str().expect("code");
    place_order(&app, agent_code, "mtn-1gb").await;
    place_order(&app, agent_code, "mtn-2gb").await;

    let clear = app
        .clone()
        .oneshot(authed_request("DELETE", "/v1/orders", ADMIN_TOKEN))
        .await
        .expect("clear");
    assert_eq!(clear.status(), StatusCode::OK);
    let payload = read_json(clear).await;
    assert_eq!(payload["deleted"], 2);

    let again = app
        .clone()
        .oneshot(authed_request("DELETE", "/v1/orders", ADMIN_TOKEN))
        .await
        .expect("again");
    let payload = read_json(again).await;
    assert_eq!(payload["deleted"], 0);

    // Accounts survive and the credential still works.
    let stats = app
        .clone()
        .oneshot(authed_request("GET", "/v1/stats", agent_code))
        .await
        .expect("stats");
    assert_eq!(stats.status(), StatusCode::OK);
}

#[tokio::test]
async fn stats_are_scoped_by_role() {
    let app = app().await;
    let amara = register_agent(&app, "Amara Mensah", "amara@example.com").await;
    let amara_code = amara["agent_code"].as_str().expect("code");
    let kofi = register_agent(&app, "Kofi Boateng", "kofi@example.com").await;
    let kofi_code = kofi["agent_code"].as_str().expect("code");

    place_order(&app, amara_code, "mtn-1gb").await; // 6.00
    let cancelled = place_order(&app, amara_code, "mtn-2gb").await; // 11.00, cancelled below
    place_order(&app, kofi_code, "vodafone-2gb").await; // 10.00

    let cancel = authed_json_request(
        "PATCH",
        &format!("/v1/orders/{}/status", cancelled["id"].as_str().expect("id")),
        ADMIN_TOKEN,
        serde_json::json!({ "status": "cancelled" }),
    );
    let response = app.clone().oneshot(cancel).await.expect("cancel");
    assert_eq!(response.status(), StatusCode::OK);

    // Agent view: own orders only, cancelled excluded from revenue.
    let mine = app
        .clone()
        .oneshot(authed_request("GET", "/v1/stats", amara_code))
        .await
        .expect("mine");
    let payload = read_json(mine).await;
    assert_eq!(payload["total_orders"], 2);
    assert_eq!(payload["cancelled_orders"], 1);
    assert_eq!(payload["total_revenue"], "6.00");

    // Admin view: everything.
    let all = app
        .clone()
        .oneshot(authed_request("GET", "/v1/stats", ADMIN_TOKEN))
        .await
        .expect("all");
    let payload = read_json(all).await;
    assert_eq!(payload["total_orders"], 3);
    assert_eq!(payload["total_revenue"], "16.00");

    // Admin scoped to one agent.
    let scoped = app
        .clone()
        .oneshot(authed_request(
            "GET",
            &format!("/v1/stats?user_id={}", kofi["id"].as_str().expect("id")),
            ADMIN_TOKEN,
        ))
        .await
        .expect("scoped");
    let payload = read_json(scoped).await;
    assert_eq!(payload["total_orders"], 1);
    assert_eq!(payload["total_revenue"], "10.00");
}

#[tokio::test]
async fn analytics_report_covers_every_section() {
    let app = app().await;
    let amara = register_agent(&app, "Amara Mensah", "amara@example.com").await;
    let amara_code = amara["agent_code"].as_str().expect("code");
    let kofi = register_agent(&app, "Kofi Boateng", "kofi@example.com").await;
    let kofi_code = kofi["agent_code"].as_str().expect("code");
    place_order(&app, amara_code, "mtn-1gb").await;
    place_order(&app, amara_code, "mtn-2gb").await;
    place_order(&app, kofi_code, "vodafone-2gb").await;

    let forbidden = app
        .clone()
        .oneshot(authed_request("GET", "/v1/analytics", amara_code))
        .await
        .expect("forbidden");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let report = app
        .clone()
        .oneshot(authed_request("GET", "/v1/analytics?limit=1", ADMIN_TOKEN))
        .await
        .expect("report");
    assert_eq!(report.status(), StatusCode::OK);
    let payload = read_json(report).await;
    assert_eq!(payload["summary"]["total_orders"], 3);
    assert_eq!(payload["summary"]["pending_orders"], 3);
    assert_eq!(payload["summary"]["total_revenue"], "27.00");

    let by_status = payload["by_status"].as_array().expect("by_status");
    assert_eq!(by_status.len(), 1);
    assert_eq!(by_status[0]["status"], "pending");
    assert_eq!(by_status[0]["percentage"], 100.0);

    let top = payload["top_agents"].as_array().expect("top_agents");
    assert_eq!(top.len(), 1);
    assert_eq!(top[0]["name"], "Amara Mensah");
    assert_eq!(top[0]["order_count"], 2);

    assert_eq!(payload["daily_orders"].as_array().expect("daily").len(), 7);
    let today = payload["daily_orders"][6].clone();
    assert_eq!(today["count"], 3);

    let activity = payload["recent_activity"].as_array().expect("activity");
    assert_eq!(activity.len(), 3);
    let description = activity[0]["description"].as_str().expect("description");
    assert!(description.starts_with("Order "));
}

#[tokio::test]
async fn snapshot_and_changes_are_scoped_per_agent() {
    let app = app().await;
    let amara = register_agent(&app, "Amara Mensah", "amara@example.com").await;
    let amara_code = amara["agent_code"].as_str().expect("code");
    let kofi = register_agent(&app, "Kofi Boateng", "kofi@example.com").await;
    let kofi_code = kofi["agent_code"].as_str().expect("code");
    let mine = place_order(&app, amara_code, "mtn-1gb").await;
    place_order(&app, kofi_code, "vodafone-2gb").await;

    let admin_snapshot = app
        .clone()
        .oneshot(authed_request("GET", "/v1/orders/snapshot", ADMIN_TOKEN))
        .await
        .expect("admin snapshot");
    assert_eq!(admin_snapshot.status(), StatusCode::OK);
    let payload = read_json(admin_snapshot).await;
    assert_eq!(payload["items"].as_array().expect("items").len(), 2);
    let checkpoint = payload["next_seq"].as_u64().expect("next_seq");
    assert_eq!(checkpoint, 2);

    let agent_snapshot = app
        .clone()
        .oneshot(authed_request("GET", "/v1/orders/snapshot", amara_code))
        .await
        .expect("agent snapshot");
    let payload = read_json(agent_snapshot).await;
    let items = payload["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], mine["id"]);

    let agent_changes = app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/v1/orders/changes?since=0",
            amara_code,
        ))
        .await
        .expect("agent changes");
    let payload = read_json(agent_changes).await;
    let items = payload["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["op"], "created");
    assert_eq!(items[0]["order_id"], mine["id"]);

    // Resuming from the snapshot checkpoint shows only later changes.
    let cancel = authed_json_request(
        "PATCH",
        &format!("/v1/orders/{}/status", mine["id"].as_str().expect("id")),
        ADMIN_TOKEN,
        serde_json::json!({ "status": "cancelled" }),
    );
    app.clone().oneshot(cancel).await.expect("cancel");
    let resumed = app
        .clone()
        .oneshot(authed_request(
            "GET",
            &format!("/v1/orders/changes?since={checkpoint}"),
            ADMIN_TOKEN,
        ))
        .await
        .expect("resumed");
    let payload = read_json(resumed).await;
    let items = payload["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["op"], "updated");
}

#[tokio::test]
async fn system_endpoints_and_docs() {
    let app = app().await;

    let info = Request::builder()
        .uri("/v1/system/info")
        .body(Body::empty())
        .expect("info");
    let response = app.clone().oneshot(info).await.expect("info");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["service"], "dataflex-backend");
    assert_eq!(payload["api_version"], "v1");
    assert_eq!(payload["features"]["order_change_feed"], true);

    let health = Request::builder()
        .uri("/v1/system/health")
        .body(Body::empty())
        .expect("health");
    let response = app.clone().oneshot(health).await.expect("health");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["status"], "ok");

    let openapi = Request::builder()
        .uri("/v1/openapi.json")
        .body(Body::empty())
        .expect("openapi");
    let response = app.clone().oneshot(openapi).await.expect("openapi");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["info"]["title"], "dataflex-backend");
}

/// Store that fails every call, for exercising 500 mapping.
struct FailingStore;

fn boom<T>() -> StoreResult<T> {
    Err(StoreError::Unexpected(anyhow::anyhow!("boom")))
}

#[async_trait]
impl BundleStore for FailingStore {
    async fn create_user(&self, _user: User) -> StoreResult<User> {
        boom()
    }
    async fn get_user(&self, _user_id: &UserId) -> StoreResult<User> {
        boom()
    }
    async fn find_user_by_email(&self, _email: &str) -> StoreResult<Option<User>> {
        boom()
    }
    async fn find_user_by_agent_code(&self, _agent_code: &str) -> StoreResult<Option<User>> {
        boom()
    }
    async fn list_agents(&self) -> StoreResult<Vec<User>> {
        boom()
    }
    async fn update_profile(
        &self,
        _user_id: &UserId,
        _patch: UserPatchRequest,
    ) -> StoreResult<User> {
        boom()
    }
    async fn delete_user(&self, _user_id: &UserId) -> StoreResult<()> {
        boom()
    }
    async fn create_order(&self, _order: Order) -> StoreResult<Order> {
        boom()
    }
    async fn list_orders(
        &self,
        _user_id: Option<&UserId>,
        _status: Option<OrderStatus>,
    ) -> StoreResult<Vec<Order>> {
        boom()
    }
    async fn update_order_status(
        &self,
        _order_id: &OrderId,
        _update: OrderStatusUpdate,
    ) -> StoreResult<Order> {
        boom()
    }
    async fn delete_all_orders(&self) -> StoreResult<u64> {
        boom()
    }
    async fn delete_orders_for_user(&self, _user_id: &UserId) -> StoreResult<u64> {
        boom()
    }
    async fn orders_snapshot(&self) -> StoreResult<Snapshot<Order>> {
        boom()
    }
    async fn order_changes(&self, _since: u64) -> StoreResult<ChangeSet<OrderChange>> {
        boom()
    }
    async fn health_check(&self) -> StoreResult<()> {
        boom()
    }
    fn is_durable(&self) -> bool {
        false
    }
    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

#[tokio::test]
async fn storage_failures_map_to_internal_errors() {
    let state = AppState {
        service_name: "dataflex-backend".to_string(),
        api_version: "v1".to_string(),
        features: FeatureFlags {
            durable_storage: false,
            order_change_feed: true,
            analytics: true,
        },
        store: Arc::new(FailingStore),
        catalog: Arc::new(Catalog::load(None)),
        admin_token: Some(ADMIN_TOKEN.to_string()),
        admin_user_id: UserId::new(),
    };
    let app = build_router(state);

    let health = Request::builder()
        .uri("/v1/system/health")
        .body(Body::empty())
        .expect("health");
    let response = app.clone().oneshot(health).await.expect("health");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json(response).await;
    assert_eq!(payload["code"], "internal");

    // The admin token resolves without touching the store, so the failure
    // surfaces from the order listing itself.
    let orders = app
        .clone()
        .oneshot(authed_request("GET", "/v1/orders", ADMIN_TOKEN))
        .await
        .expect("orders");
    assert_eq!(orders.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // An agent credential cannot even be resolved.
    let agent = app
        .clone()
        .oneshot(authed_request("GET", "/v1/stats", "AB12CD"))
        .await
        .expect("agent");
    assert_eq!(agent.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
