// ERP Service
// Request-scoped wrapper around the ERP client: derives the caller identity from the
// request context and applies the session/cookie side channel returned by the ERP.

use axum_extra::extract::cookie::Cookie;
use reqwest::Method;
use serde_json::Value;
use std::time::Instant;

use crate::config::ErpSettings;
use crate::middleware::metrics;
use crate::models::params::ParamsBag;
use crate::models::request_context::{RequestContext, STORE_PREFIX};
use crate::services::erp::erp_client::{ClientContext, ErpClient, ErpRecord, Result};
use crate::services::locale::erp_locale;

/// Response key whose entries are mirrored into `store_*` session keys and cookies
const STORE_CACHE_KEY: &str = "store_cache";

/// Response key whose entries are kept server side as `erp_*` session keys
const SET_SESSION_KEY: &str = "set_session";
const ERP_SESSION_PREFIX: &str = "erp_";

pub struct ErpService {
    client: ErpClient,
    settings: ErpSettings,
}

impl ErpService {
    pub fn new(client: ErpClient, settings: ErpSettings) -> Self {
        Self { client, settings }
    }

    pub fn default_role(&self) -> Option<&str> {
        self.settings.default_role.as_deref()
    }

    pub fn client_context(ctx: &RequestContext) -> ClientContext {
        let cart_id = ctx
            .session
            .get("store_cart")
            .and_then(|cart| cart.get("id"))
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        ClientContext {
            request_id: Some(ctx.request_id.to_string()),
            locale: Some(
                erp_locale(&ctx.locale)
                    .map(str::to_string)
                    .unwrap_or_else(|| ctx.locale.clone()),
            ),
            partner_email: ctx.customer_email().map(str::to_string),
            cart_id,
            origin: ctx.client.origin.clone().or_else(|| ctx.client.host.clone()),
            forwarded_for: ctx.client.ip.map(|ip| ip.to_string()),
            user_agent: ctx.client.user_agent.clone(),
        }
    }

    pub async fn call(
        &self,
        ctx: &mut RequestContext,
        method: Method,
        path: &str,
        params: &ParamsBag,
    ) -> Result<ErpRecord> {
        let client_ctx = Self::client_context(ctx);
        let started = Instant::now();

        let result = self.client.call(method, path, params, &client_ctx).await;

        let outcome = match &result {
            Ok(record) if record.is_error() => "application",
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::record_erp_call(outcome, started.elapsed());

        let mut record = result?;
        apply_side_channel(ctx, &mut record);
        Ok(record)
    }

    /// Refresh the customer cached in session. Only meaningful once an
    /// entry is authenticated; returns `None` otherwise.
    pub async fn initialize_customer(&self, ctx: &mut RequestContext) -> Result<Option<ErpRecord>> {
        if ctx.authenticated_entry.is_none() {
            return Ok(None);
        }

        let record = self
            .call(ctx, Method::GET, "customer", &ParamsBag::new())
            .await?;

        if record.is_error() {
            tracing::warn!(
                request_id = %ctx.request_id,
                "ERP refused to initialize customer: {:?}",
                record.error()
            );
            return Ok(Some(record));
        }

        store_value(ctx, "customer", Value::Object(record.fields().clone()));
        Ok(Some(record))
    }
}

/// Write a store-owned value: session `store_{name}` plus cookie `{name}`
pub fn store_value(ctx: &mut RequestContext, name: &str, value: Value) {
    let cookie_value = match &value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    ctx.session.insert(format!("{}{}", STORE_PREFIX, name), value);
    ctx.set_cookie(
        Cookie::build((name.to_string(), cookie_value))
            .path("/")
            .build(),
    );
}

fn apply_side_channel(ctx: &mut RequestContext, record: &mut ErpRecord) {
    if let Some(Value::Object(cache)) = record.remove(STORE_CACHE_KEY) {
        for (name, value) in cache {
            store_value(ctx, &name, value);
        }
    }

    if let Some(Value::Object(values)) = record.remove(SET_SESSION_KEY) {
        for (name, value) in values {
            ctx.session.insert(format!("{}{}", ERP_SESSION_PREFIX, name), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Site;
    use crate::models::content_entry::{ContentEntry, ContentType};
    use axum::http::Method as HttpMethod;
    use serde_json::{json, Map};
    use std::sync::Arc;

    fn ctx() -> RequestContext {
        let site: Site = serde_json::from_value(json!({"handle": "shop", "default_locale": "fr"})).unwrap();
        RequestContext::new(Arc::new(site), HttpMethod::GET, "/")
    }

    #[test]
    fn test_client_context_from_request() {
        let mut ctx = ctx();
        ctx.session.insert("store_cart", json!({"id": 12}));
        ctx.client.host = Some("shop.example.com".to_string());

        let mut fields = Map::new();
        fields.insert("email".to_string(), json!("a@x.com"));
        ctx.authenticated_entry = Some(ContentEntry::new(
            ContentType::new("customers", "customers", &["email"]),
            fields,
        ));

        let client_ctx = ErpService::client_context(&ctx);
        assert_eq!(client_ctx.locale.as_deref(), Some("fr_FR"));
        assert_eq!(client_ctx.cart_id.as_deref(), Some("12"));
        assert_eq!(client_ctx.partner_email.as_deref(), Some("a@x.com"));
        assert_eq!(client_ctx.origin.as_deref(), Some("shop.example.com"));
    }

    #[test]
    fn test_side_channel_is_applied_and_removed() {
        let mut ctx = ctx();
        let mut record = ErpRecord::from_map(
            json!({
                "data": {"id": 1},
                "store_cache": {"cart": {"id": 3}},
                "set_session": {"token": "abc"}
            })
            .as_object()
            .cloned()
            .unwrap(),
        );

        apply_side_channel(&mut ctx, &mut record);

        assert!(!record.contains("store_cache"));
        assert!(!record.contains("set_session"));
        assert_eq!(ctx.session.get("store_cart"), Some(&json!({"id": 3})));
        assert_eq!(ctx.session.get("erp_token"), Some(&json!("abc")));
        assert_eq!(ctx.cookie("cart").unwrap().value(), r#"{"id":3}"#);
    }
}
