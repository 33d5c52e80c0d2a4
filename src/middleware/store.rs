// ============================================================================
// Store Middleware - request context, params and session
// ============================================================================
//
// Outermost storefront layer. Builds the `RequestContext` every inner layer
// works on and, once the inner service answered, persists the session and
// turns pending cookie changes into `Set-Cookie` headers.
//
// Request:  `X-Request-ID: <uuid>` (optional, kept when valid)
// Response: `X-Request-ID: <uuid>` (always returned)
//
// ============================================================================

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use url::form_urlencoded;
use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};
use crate::models::params::ParamsBag;
use crate::models::request_context::{ClientInfo, RequestContext, SharedContext};
use crate::services::session_store::SESSION_COOKIE;
use crate::utils::log_sanitizer::sanitize_for_log;
use crate::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Session keys identifying the signed-in entry
pub const AUTH_ENTRY_TYPE: &str = "authenticated_entry_type";
pub const AUTH_ENTRY_ID: &str = "authenticated_entry_id";

/// Liquid assign exposing the store-owned session values
pub const STORE_ASSIGN: &str = "store";

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub async fn store_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let (mut parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AppError::BadRequest(format!("Unreadable request body: {}", e)))?;

    let site = state.sites.find(header_str(&parts.headers, header::HOST));
    let jar = CookieJar::from_headers(&parts.headers);
    let session = state
        .sessions
        .load(jar.get(SESSION_COOKIE).map(|cookie| cookie.value()));
    let params = collect_params(&parts, &bytes)?;

    let mut ctx = RequestContext::new(site, parts.method.clone(), parts.uri.path())
        .with_params(params)
        .with_session(session)
        .with_client(client_info(&parts));

    if let Some(id) = header_str(&parts.headers, REQUEST_ID_HEADER).and_then(|s| Uuid::parse_str(s).ok()) {
        ctx.request_id = id;
    }

    restore_authenticated_entry(&state, &mut ctx).await;

    let store = ctx.session.store_values();
    ctx.assign(STORE_ASSIGN, Value::Object(store));

    let request_id = ctx.request_id;
    tracing::info!(
        request_id = %request_id,
        site = %ctx.site.handle,
        method = %ctx.method,
        path = %sanitize_for_log(&ctx.path),
        "→ Storefront request"
    );

    let shared = SharedContext::new(ctx);
    parts.extensions.insert(shared.clone());

    let mut response = next.run(Request::from_parts(parts, Body::from(bytes))).await;

    let ctx = shared.lock().await;
    state.sessions.save(&ctx.session);

    let headers = response.headers_mut();
    for cookie in &ctx.cookies {
        append_cookie(headers, cookie);
    }
    if ctx.session.is_fresh() && !ctx.session.is_empty() {
        append_cookie(headers, &session_cookie(ctx.session.id(), state.config.secure_cookies));
    }
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    tracing::info!(
        request_id = %request_id,
        status = %response.status(),
        cookies = ctx.cookies.len(),
        "← Storefront response"
    );

    Ok(response)
}

// ============================================================================
// Helper Functions
// ============================================================================

fn header_str<K: header::AsHeaderName>(headers: &HeaderMap, name: K) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Query string first, then a form or JSON body on top
fn collect_params(parts: &Parts, body: &Bytes) -> Result<ParamsBag> {
    let query = ParamsBag::from_pairs(
        form_urlencoded::parse(parts.uri.query().unwrap_or_default().as_bytes()).into_owned(),
    );

    if body.is_empty() {
        return Ok(query);
    }

    let content_type = header_str(&parts.headers, header::CONTENT_TYPE).unwrap_or_default();

    let from_body = if content_type.starts_with("application/x-www-form-urlencoded") {
        ParamsBag::from_pairs(form_urlencoded::parse(body).into_owned())
    } else if content_type.starts_with("application/json") {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => ParamsBag::from_map(map),
            Ok(_) => return Err(AppError::BadRequest("JSON body must be an object".to_string())),
            Err(_) => return Err(AppError::BadRequest("Invalid JSON body".to_string())),
        }
    } else {
        ParamsBag::new()
    };

    Ok(query.merge(&from_body))
}

fn client_info(parts: &Parts) -> ClientInfo {
    let forwarded = header_str(&parts.headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok());
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    ClientInfo {
        ip: forwarded.or(peer),
        host: header_str(&parts.headers, header::HOST).map(str::to_string),
        origin: header_str(&parts.headers, header::ORIGIN).map(str::to_string),
        user_agent: header_str(&parts.headers, header::USER_AGENT).map(str::to_string),
    }
}

async fn restore_authenticated_entry(state: &AppState, ctx: &mut RequestContext) {
    let slug = ctx.session.get(AUTH_ENTRY_TYPE).and_then(Value::as_str).map(str::to_string);
    let id = ctx.session.get(AUTH_ENTRY_ID).and_then(Value::as_str).map(str::to_string);

    let (Some(slug), Some(id)) = (slug, id) else {
        return;
    };

    match state.services.content_entries().find(&slug, &id).await {
        Ok(Some(entry)) => ctx.authenticated_entry = Some(entry),
        Ok(None) => {
            ctx.session.remove(AUTH_ENTRY_TYPE);
            ctx.session.remove(AUTH_ENTRY_ID);
        }
        Err(e) => {
            tracing::warn!(request_id = %ctx.request_id, "Could not restore signed-in entry: {}", e);
        }
    }
}

fn session_cookie(id: Uuid, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn append_cookie(headers: &mut HeaderMap, cookie: &Cookie<'_>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(cookie = %cookie.name(), "Skipping unencodable cookie: {}", e),
    }
}
