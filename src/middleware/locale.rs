// Locale Middleware
// Strips a known locale prefix (`/fr/...`) from the path, records the locale on
// the request context and rewrites the URI so inner routers see the bare path.

use axum::{
    extract::{Extension, Request},
    http::Uri,
    middleware::Next,
    response::Response,
};

use crate::config::Site;
use crate::models::request_context::SharedContext;

pub const LOCALE_ASSIGN: &str = "locale";

/// `Some((locale, remaining_path))` when the first segment is a site locale
pub fn split_locale(site: &Site, path: &str) -> Option<(String, String)> {
    let trimmed = path.trim_start_matches('/');
    let (first, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));

    if first.is_empty() || !site.is_locale(first) {
        return None;
    }

    Some((first.to_string(), format!("/{}", rest)))
}

pub async fn locale_middleware(
    Extension(shared): Extension<SharedContext>,
    mut request: Request,
    next: Next,
) -> Response {
    {
        let mut ctx = shared.lock().await;

        if let Some((locale, path)) = split_locale(&ctx.site, &ctx.path) {
            let rewritten = match request.uri().query() {
                Some(query) => format!("{}?{}", path, query),
                None => path.clone(),
            };
            match rewritten.parse::<Uri>() {
                Ok(uri) => *request.uri_mut() = uri,
                Err(e) => tracing::warn!(request_id = %ctx.request_id, "Could not rewrite localized URI: {}", e),
            }

            ctx.locale = locale;
            ctx.path = path;
        }

        let locale = ctx.locale.clone();
        ctx.assign(LOCALE_ASSIGN, locale);
    }

    next.run(request).await
}
