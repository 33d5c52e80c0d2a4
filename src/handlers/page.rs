use axum::{extract::Extension, Json};
use serde_json::{json, Value};

use crate::models::request_context::SharedContext;

/// Fallback page: the resolved rendering context as JSON
pub async fn render_page(Extension(shared): Extension<SharedContext>) -> Json<Value> {
    let ctx = shared.lock().await;

    Json(json!({
        "site": ctx.site.handle,
        "locale": ctx.locale,
        "path": ctx.path,
        "page": ctx.page,
        "authenticated": ctx.authenticated_entry.is_some(),
        "assigns": ctx.liquid_assigns,
    }))
}
