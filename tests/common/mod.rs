// Mock ERP + search backend for integration tests
// One axum server: `/1/indexes/:index/query` answers like Algolia, every other
// path answers like the ERP from canned replies. All ERP calls are recorded.
#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use shop_invader::config::{AppConfig, Site};

pub const ERP_BASE_PATH: &str = "/shopinvader";
pub const ERP_API_KEY: &str = "42";

// ============================================================================
// Mock Data Structures
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    /// Path below the ERP base path (`customer`, `guest/register`, ...)
    pub path: String,
    pub headers: HeaderMap,
    /// JSON body, or the query string as an object
    pub params: Value,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn param_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .params
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[derive(Debug, Default)]
pub struct MockErpState {
    pub requests: Vec<RecordedRequest>,
    /// `"POST customer"` -> reply
    pub replies: HashMap<String, (StatusCode, Value)>,
    /// Physical index name -> records
    pub search_records: HashMap<String, Vec<Value>>,
    pub search_queries: Vec<(String, Value)>,
}

impl MockErpState {
    pub fn reply(&mut self, method: Method, path: &str, status: StatusCode, body: Value) {
        self.replies
            .insert(format!("{} {}", method, path), (status, body));
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests
            .iter()
            .filter(|request| request.path == path)
            .cloned()
            .collect()
    }
}

pub type SharedState = Arc<RwLock<MockErpState>>;

// ============================================================================
// Mock Endpoints
// ============================================================================

async fn erp_endpoint(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let path = uri
        .path()
        .trim_start_matches(ERP_BASE_PATH)
        .trim_start_matches('/')
        .to_string();

    let params = if body.is_empty() {
        let query: Map<String, Value> =
            url::form_urlencoded::parse(uri.query().unwrap_or_default().as_bytes())
                .into_owned()
                .map(|(key, value)| (key, Value::String(value)))
                .collect();
        Value::Object(query)
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };

    let mut state = state.write().await;
    let key = format!("{} {}", method, path);

    state.requests.push(RecordedRequest {
        method,
        path,
        headers,
        params,
    });

    match state.replies.get(&key) {
        Some((status, body)) => (*status, Json(body.clone())),
        None => (StatusCode::NOT_FOUND, Json(json!({"message": "unknown endpoint"}))),
    }
}

async fn search_endpoint(
    State(state): State<SharedState>,
    Path(index): Path<String>,
    Json(query): Json<Value>,
) -> Json<Value> {
    let mut state = state.write().await;
    state.search_queries.push((index.clone(), query.clone()));

    let wanted = query
        .get("filters")
        .and_then(Value::as_str)
        .and_then(|filters| filters.split('"').nth(1))
        .map(str::to_string);

    let hits: Vec<Value> = state
        .search_records
        .get(&index)
        .map(|records| {
            records
                .iter()
                .filter(|record| match &wanted {
                    Some(url_key) => record.get("url_key").and_then(Value::as_str) == Some(url_key),
                    None => true,
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    Json(json!({
        "hits": hits,
        "nbHits": hits.len(),
        "page": 0,
        "nbPages": 1,
        "hitsPerPage": query.get("hitsPerPage").cloned().unwrap_or(json!(20)),
    }))
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn create_mock_server(state: SharedState) -> Router {
    Router::new()
        .route("/1/indexes/:index/query", post(search_endpoint))
        .fallback(erp_endpoint)
        .with_state(state)
}

/// Start the mock on a random port; returns its base URL
pub async fn start_mock_server() -> (String, SharedState) {
    let state: SharedState = Arc::new(RwLock::new(MockErpState::default()));
    let app = create_mock_server(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{}", addr), state)
}

/// Base URL of a port nothing listens on
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn site_json(base_url: &str) -> Value {
    json!({
        "handle": "shop",
        "domains": ["shop.example.com"],
        "default_locale": "en",
        "locales": ["en", "fr"],
        "edge_side_includes": true,
        "metafields": {
            "erp": {
                "api_url": format!("{}{}", base_url, ERP_BASE_PATH),
                "api_key": ERP_API_KEY,
                "default_role": "default"
            },
            "algolia": {
                "application_id": "42",
                "api_key": "42",
                "indices": [
                    {"name": "product", "index": "shop_product", "template_handle": "product"},
                    {"name": "category", "index": "shop_category", "template_handle": "category"}
                ]
            }
        },
        "content_types": [
            {"name": "customers", "slug": "customers", "fields": ["email", "name", "role"]},
            {"name": "newsletter", "slug": "newsletter", "fields": ["email"]}
        ]
    })
}

pub fn site(base_url: &str) -> Site {
    serde_json::from_value(site_json(base_url)).unwrap()
}

pub fn config(base_url: &str) -> AppConfig {
    AppConfig {
        erp_timeout: Duration::from_secs(2),
        algolia_host: Some(base_url.to_string()),
        ..AppConfig::default()
    }
}
