// Snippet Page Middleware
// Serves `/snippet/{name}` as a bare HTML fragment. Edge caches resolve the
// `<esi:include>` elements emitted by `esi_include` against this endpoint.

use axum::{
    extract::{Extension, Request, State},
    http::Method,
    middleware::Next,
    response::{Html, IntoResponse, Response},
};

use crate::middleware::error_handling::Result;
use crate::models::request_context::SharedContext;
use crate::AppState;

pub const SNIPPET_PATH_PREFIX: &str = "/snippet/";

pub async fn snippet_page_middleware(
    State(state): State<AppState>,
    Extension(shared): Extension<SharedContext>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let ctx = shared.lock().await;

    let name = ctx
        .path
        .strip_prefix(SNIPPET_PATH_PREFIX)
        .filter(|name| !name.is_empty() && ctx.method == Method::GET)
        .map(str::to_string);

    let Some(name) = name else {
        drop(ctx);
        return Ok(next.run(request).await);
    };

    let html = state.templates.render_snippet(&name, &ctx)?;

    tracing::debug!(request_id = %ctx.request_id, snippet = %name, locale = %ctx.locale, "Snippet rendered");

    Ok(Html(html).into_response())
}
