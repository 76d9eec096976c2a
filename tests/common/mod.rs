//! In-process mock of the ticketing API
//!
//! Implements just enough of the real API for the harness to be exercised
//! end to end: events, ticket types, carts with a per-order quantity limit,
//! checkout, a ticket listing, and weak ETags with `If-None-Match` → 304 on
//! the event listing.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use conformance::common::config::Config;
use conformance::fixture::Orchestrator;
use conformance::http::HttpClient;
use conformance::Environment;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Largest quantity a single cart line may hold
pub const MAX_ITEM_QUANTITY: u64 = 50;

pub const ORG_MEMBER_TOKEN: &str = "org-member-token";
pub const BOX_OFFICE_TOKEN: &str = "box-office-token";
pub const USER_TOKEN: &str = "user-token";

#[derive(Default)]
struct Store {
    events: BTreeMap<String, Value>,
    ticket_types: HashMap<String, Value>,
    carts: HashMap<String, Value>,
    current_cart: HashMap<String, String>,
    orders: Vec<Value>,
    hits: HashMap<String, usize>,
}

/// Handle to a running mock server
#[derive(Clone, Default)]
pub struct MockApi {
    store: Arc<Mutex<Store>>,
}

impl MockApi {
    fn hit(&self, route: &str) {
        *self.store.lock().hits.entry(route.to_string()).or_default() += 1;
    }

    /// Requests received for a route, e.g. `"POST /events"`
    pub fn hits(&self, route: &str) -> usize {
        self.store.lock().hits.get(route).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.store.lock().hits.values().sum()
    }

    pub fn event(&self, id: &str) -> Option<Value> {
        self.store.lock().events.get(id).cloned()
    }

    pub fn event_count(&self) -> usize {
        self.store.lock().events.len()
    }

    pub fn order_count(&self) -> usize {
        self.store.lock().orders.len()
    }

    /// Insert an event directly, bypassing HTTP
    pub fn seed_event(&self, name: &str, status: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.store.lock().events.insert(
            id.clone(),
            json!({ "id": id, "name": name, "status": status, "override_status": null }),
        );
        id
    }

    /// Insert a ticket type directly, bypassing HTTP
    pub fn seed_ticket_type(&self, event_id: &str, price_in_cents: u64) -> String {
        let id = Uuid::new_v4().to_string();
        self.store.lock().ticket_types.insert(
            id.clone(),
            json!({
                "id": id,
                "event_id": event_id,
                "name": "General Admission",
                "start_date": "2017-11-21T00:00:00",
                "price_in_cents": price_in_cents
            }),
        );
        id
    }
}

/// Bind the mock on an ephemeral port and serve it in the background
pub async fn spawn() -> (MockApi, String) {
    let api = MockApi::default();
    let app = Router::new()
        .route("/events", post(create_event).get(list_events))
        .route(
            "/events/{id}",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/events/{id}/publish", post(publish_event))
        .route("/events/{id}/ticket_types", post(create_ticket_type))
        .route(
            "/events/{event_id}/ticket_types/{ticket_type_id}",
            patch(update_ticket_type),
        )
        .route("/cart", post(fill_cart))
        .route("/cart/checkout", post(checkout))
        .route("/tickets", get(list_tickets))
        .route("/slow", get(slow))
        .route("/unstable", get(unstable))
        .with_state(api.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (api, format!("http://{}", addr))
}

/// Raw HTTP server that drops its first `drops` connections unanswered
///
/// Later connections get `200 {"ok": true}`. Returns the number of
/// connections accepted so far and the base URL.
pub async fn spawn_flaky(drops: usize) -> (Arc<AtomicUsize>, String) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < drops {
                drop(stream);
                continue;
            }
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let body = r#"{"ok":true}"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    (accepted, format!("http://{}", addr))
}

/// Client, orchestrator and seeded environment pointed at a mock
pub fn harness(base_url: &str) -> (Arc<Orchestrator>, Environment) {
    let config = Config::parse(&format!(
        r#"
[server]
base_url = "{base_url}"
request_timeout_secs = 5

[tokens]
org_member = "{ORG_MEMBER_TOKEN}"
org_boxoffice = "{BOX_OFFICE_TOKEN}"
user = "{USER_TOKEN}"

[variables]
organization_id = "org-1"
venue_id = "venue-1"
"#
    ))
    .unwrap();

    let env = Environment::new();
    config.seed(&env).unwrap();
    let client = HttpClient::from_config(&config).unwrap();
    (Arc::new(Orchestrator::with_builtin(client)), env)
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}

fn weak_etag(payload: &Value) -> String {
    let digest = Sha256::digest(payload.to_string().as_bytes());
    format!("W/\"{:x}\"", digest)
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            if key != "id" {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

async fn create_event(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    api.hit("POST /events");
    if bearer(&headers) != Some(ORG_MEMBER_TOKEN) {
        return unauthorized();
    }
    let id = Uuid::new_v4().to_string();
    let mut event = json!({ "id": id, "status": "Draft", "override_status": null });
    merge(&mut event, &body);
    api.store.lock().events.insert(id, event.clone());
    (StatusCode::CREATED, Json(event)).into_response()
}

async fn list_events(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    api.hit("GET /events");
    let status = query.get("status").cloned();
    let page: u64 = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(0);

    let data: Vec<Value> = api
        .store
        .lock()
        .events
        .values()
        .filter(|e| status.as_deref().map_or(true, |s| e["status"] == s))
        .cloned()
        .collect();
    let total = data.len();
    let payload = json!({
        "data": data,
        "paging": { "page": page, "limit": 100, "total": total, "query": query }
    });

    let etag = weak_etag(&payload);
    let cached = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == etag);
    if cached {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }
    (StatusCode::OK, [(header::ETAG, etag)], Json(payload)).into_response()
}

async fn get_event(State(api): State<MockApi>, Path(id): Path<String>) -> Response {
    api.hit("GET /events/{id}");
    match api.event(&id) {
        Some(event) => Json(event).into_response(),
        None => not_found(),
    }
}

async fn update_event(
    State(api): State<MockApi>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    api.hit("PUT /events/{id}");
    if bearer(&headers) != Some(ORG_MEMBER_TOKEN) {
        return unauthorized();
    }
    let mut store = api.store.lock();
    match store.events.get_mut(&id) {
        Some(event) => {
            merge(event, &body);
            Json(event.clone()).into_response()
        }
        None => not_found(),
    }
}

async fn delete_event(
    State(api): State<MockApi>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    api.hit("DELETE /events/{id}");
    if bearer(&headers) != Some(ORG_MEMBER_TOKEN) {
        return unauthorized();
    }
    match api.store.lock().events.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(),
    }
}

async fn publish_event(
    State(api): State<MockApi>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    api.hit("POST /events/{id}/publish");
    if bearer(&headers) != Some(ORG_MEMBER_TOKEN) {
        return unauthorized();
    }
    let mut store = api.store.lock();
    match store.events.get_mut(&id) {
        Some(event) => {
            event["status"] = json!("Published");
            Json(event.clone()).into_response()
        }
        None => not_found(),
    }
}

async fn create_ticket_type(
    State(api): State<MockApi>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    api.hit("POST /events/{id}/ticket_types");
    if bearer(&headers) != Some(ORG_MEMBER_TOKEN) {
        return unauthorized();
    }
    if api.event(&event_id).is_none() {
        return not_found();
    }
    let id = Uuid::new_v4().to_string();
    let price = body
        .pointer("/ticket_pricing/0/price_in_cents")
        .cloned()
        .unwrap_or(json!(0));
    let mut ticket_type = json!({ "id": id, "event_id": event_id, "price_in_cents": price });
    merge(&mut ticket_type, &body);
    api.store.lock().ticket_types.insert(id, ticket_type.clone());
    (StatusCode::CREATED, Json(ticket_type)).into_response()
}

async fn update_ticket_type(
    State(api): State<MockApi>,
    Path((event_id, ticket_type_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    api.hit("PATCH /events/{id}/ticket_types/{id}");
    if bearer(&headers) != Some(ORG_MEMBER_TOKEN) {
        return unauthorized();
    }
    let mut store = api.store.lock();
    match store.ticket_types.get_mut(&ticket_type_id) {
        Some(ticket_type) if ticket_type["event_id"] == event_id.as_str() => {
            merge(ticket_type, &body);
            Json(ticket_type.clone()).into_response()
        }
        _ => not_found(),
    }
}

async fn fill_cart(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    api.hit("POST /cart");
    let Some(token) = bearer(&headers).map(str::to_string) else {
        return unauthorized();
    };

    let items = body["items"].as_array().cloned().unwrap_or_default();
    let mut store = api.store.lock();
    let mut total = 0;
    for item in &items {
        let quantity = item["quantity"].as_u64().unwrap_or(0);
        if quantity > MAX_ITEM_QUANTITY {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": "Quantity exceeds the limit for a single order" })),
            )
                .into_response();
        }
        let Some(ticket_type) = item["ticket_type_id"]
            .as_str()
            .and_then(|id| store.ticket_types.get(id))
        else {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": "Unknown ticket type" })),
            )
                .into_response();
        };
        total += quantity * ticket_type["price_in_cents"].as_u64().unwrap_or(0);
    }

    let id = Uuid::new_v4().to_string();
    let cart = json!({ "id": id, "items": items, "total_in_cents": total });
    store.carts.insert(id.clone(), cart.clone());
    store.current_cart.insert(token, id);
    Json(cart).into_response()
}

async fn checkout(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    api.hit("POST /cart/checkout");
    let Some(token) = bearer(&headers).map(str::to_string) else {
        return unauthorized();
    };

    let mut store = api.store.lock();
    let Some(cart) = store
        .current_cart
        .remove(&token)
        .and_then(|id| store.carts.get(&id).cloned())
    else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "Cart is empty" })),
        )
            .into_response();
    };
    if body["amount"] != cart["total_in_cents"] {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "Amount does not match cart total" })),
        )
            .into_response();
    }

    let order = json!({
        "id": Uuid::new_v4().to_string(),
        "cart_id": cart["id"],
        "status": "Paid",
        "owner": token,
        "items": cart["items"],
    });
    store.orders.push(order.clone());
    Json(order).into_response()
}

async fn list_tickets(State(api): State<MockApi>, headers: HeaderMap) -> Response {
    api.hit("GET /tickets");
    let Some(token) = bearer(&headers) else {
        return unauthorized();
    };

    let store = api.store.lock();
    let mut data = Vec::new();
    for order in store.orders.iter().filter(|o| o["owner"] == token) {
        for item in order["items"].as_array().into_iter().flatten() {
            let ticket_type_id = item["ticket_type_id"].as_str().unwrap_or_default();
            let event = store
                .ticket_types
                .get(ticket_type_id)
                .and_then(|t| t["event_id"].as_str())
                .and_then(|id| store.events.get(id))
                .cloned()
                .unwrap_or(Value::Null);
            let quantity = item["quantity"].as_u64().unwrap_or(0);
            let tickets: Vec<Value> = (0..quantity)
                .map(|_| {
                    json!({
                        "id": Uuid::new_v4().to_string(),
                        "order_id": order["id"],
                        "collectible_id": ticket_type_id,
                    })
                })
                .collect();
            data.push(json!([event, tickets]));
        }
    }
    Json(json!({ "data": data })).into_response()
}

async fn slow(State(api): State<MockApi>) -> Response {
    api.hit("GET /slow");
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({ "done": true })).into_response()
}

async fn unstable(State(api): State<MockApi>) -> Response {
    api.hit("GET /unstable");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal error" })),
    )
        .into_response()
}
