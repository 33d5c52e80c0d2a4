use axum::http::Method;
use axum_extra::extract::cookie::Cookie;
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::config::Site;
use crate::models::content_entry::ContentEntry;
use crate::models::params::ParamsBag;

/// Session keys owned by the store; their cookie name is the key without the prefix
pub const STORE_PREFIX: &str = "store_";

/// Liquid assign raised when the ERP is unreachable
pub const MAINTENANCE_ASSIGN: &str = "store_maintenance";

#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<IpAddr>,
    pub host: Option<String>,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    values: Map<String, Value>,
    fresh: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            values: Map::new(),
            fresh: true,
        }
    }

    pub fn restore(id: Uuid, values: Map<String, Value>) -> Self {
        Self {
            id,
            values,
            fresh: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True when the session was created by this request
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Store-owned values keyed without their `store_` prefix
    pub fn store_values(&self) -> Map<String, Value> {
        self.values
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(STORE_PREFIX)
                    .map(|name| (name.to_string(), value.clone()))
            })
            .collect()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-request state shared by every extension in the pipeline
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub site: Arc<Site>,
    pub method: Method,
    /// Request path with any locale prefix removed
    pub path: String,
    pub locale: String,
    pub params: ParamsBag,
    pub session: Session,
    /// Cookies to emit on the response
    pub cookies: Vec<Cookie<'static>>,
    pub liquid_assigns: Map<String, Value>,
    pub authenticated_entry: Option<ContentEntry>,
    /// Template handle resolved for this request, if any
    pub page: Option<String>,
    pub client: ClientInfo,
}

impl RequestContext {
    pub fn new(site: Arc<Site>, method: Method, path: impl Into<String>) -> Self {
        let locale = site.default_locale.clone();
        Self {
            request_id: Uuid::new_v4(),
            site,
            method,
            path: path.into(),
            locale,
            params: ParamsBag::new(),
            session: Session::new(),
            cookies: Vec::new(),
            liquid_assigns: Map::new(),
            authenticated_entry: None,
            page: None,
            client: ClientInfo::default(),
        }
    }

    pub fn with_params(mut self, params: ParamsBag) -> Self {
        self.params = params;
        self
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    pub fn assign(&mut self, key: &str, value: impl Into<Value>) {
        self.liquid_assigns.insert(key.to_string(), value.into());
    }

    pub fn set_cookie(&mut self, cookie: Cookie<'static>) {
        self.cookies.retain(|existing| existing.name() != cookie.name());
        self.cookies.push(cookie);
    }

    /// Queue an expiring cookie: empty value, `max_age = 0`
    pub fn expire_cookie(&mut self, name: &str) {
        self.set_cookie(
            Cookie::build((name.to_string(), ""))
                .path("/")
                .max_age(time::Duration::ZERO)
                .build(),
        );
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie<'static>> {
        self.cookies.iter().find(|cookie| cookie.name() == name)
    }

    pub fn is_maintenance(&self) -> bool {
        self.liquid_assigns
            .get(MAINTENANCE_ASSIGN)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn customer_email(&self) -> Option<&str> {
        self.authenticated_entry.as_ref().and_then(|entry| entry.email())
    }
}

/// Handle to the request context carried in request extensions
#[derive(Debug, Clone)]
pub struct SharedContext(Arc<Mutex<RequestContext>>);

impl SharedContext {
    pub fn new(ctx: RequestContext) -> Self {
        Self(Arc::new(Mutex::new(ctx)))
    }

    pub async fn lock(&self) -> MutexGuard<'_, RequestContext> {
        self.0.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn site() -> Arc<Site> {
        Arc::new(serde_json::from_value(json!({"handle": "shop", "default_locale": "fr"})).unwrap())
    }

    #[test]
    fn test_new_context_uses_site_default_locale() {
        let ctx = RequestContext::new(site(), Method::GET, "/");
        assert_eq!(ctx.locale, "fr");
        assert!(!ctx.is_maintenance());
    }

    #[test]
    fn test_store_values_strip_prefix() {
        let mut session = Session::new();
        session.insert("store_cart", json!({"id": 7}));
        session.insert("erp_token", json!("t"));

        let store = session.store_values();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("cart"), Some(&json!({"id": 7})));
    }

    #[test]
    fn test_expire_cookie_replaces_pending_cookie() {
        let mut ctx = RequestContext::new(site(), Method::GET, "/");
        ctx.set_cookie(Cookie::new("cart", "{}"));
        ctx.expire_cookie("cart");

        assert_eq!(ctx.cookies.len(), 1);
        let cookie = ctx.cookie("cart").unwrap();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }

    #[tokio::test]
    async fn test_shared_context_visible_to_clones() {
        let shared = SharedContext::new(RequestContext::new(site(), Method::GET, "/"));
        let other = shared.clone();

        shared.lock().await.assign(MAINTENANCE_ASSIGN, true);
        assert!(other.lock().await.is_maintenance());
    }
}
