// Renderer Middleware
// GET requests whose page handle has a liquid template are rendered here with
// the request's assigns (`store`, `store_maintenance`, resolved records).
// Anything else falls through to the host router.

use axum::{
    extract::{Extension, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};

use crate::middleware::error_handling::{AppError, Result};
use crate::models::request_context::{RequestContext, SharedContext};
use crate::AppState;

/// Handle of the home page template
pub const INDEX_HANDLE: &str = "index";

/// Template handle for a request: the templatized page, else the path itself
pub fn page_handle(ctx: &RequestContext) -> String {
    if let Some(page) = &ctx.page {
        return page.clone();
    }

    match ctx.path.trim_matches('/') {
        "" => INDEX_HANDLE.to_string(),
        path => path.to_string(),
    }
}

/// Render the request's page template with `status`, `None` when the site has none
pub fn render(state: &AppState, ctx: &RequestContext, status: StatusCode) -> Option<Result<Response>> {
    let handle = page_handle(ctx);
    let html = state.templates.render_page(&handle, ctx)?;

    Some(html.map_err(AppError::from).map(|html| {
        tracing::debug!(
            request_id = %ctx.request_id,
            page = %handle,
            status = status.as_u16(),
            "Page rendered"
        );
        (status, Html(html)).into_response()
    }))
}

pub async fn renderer_middleware(
    State(state): State<AppState>,
    Extension(shared): Extension<SharedContext>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let ctx = shared.lock().await;

    if ctx.method == Method::GET {
        if let Some(response) = render(&state, &ctx, StatusCode::OK) {
            return response;
        }
    }

    drop(ctx);
    Ok(next.run(request).await)
}
