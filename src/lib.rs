pub mod config;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod templates;
pub mod utils;

use axum::{middleware::from_fn, middleware::from_fn_with_state, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use config::{AppConfig, SiteRegistry};
use events::{AuthLifecycle, ErpCustomerSubscriber};
use services::{ContentEntryService, ServiceRegistry, SessionStore};
use templates::TemplateLibrary;

/// Shared application state handed to every middleware and handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sites: Arc<SiteRegistry>,
    pub sessions: Arc<SessionStore>,
    pub services: ServiceRegistry,
    pub templates: Arc<TemplateLibrary>,
    pub hooks: Arc<dyn AuthLifecycle>,
}

impl AppState {
    /// Default wiring: ERP customer hooks, sessions expiring after `session_ttl`
    pub fn new(
        config: AppConfig,
        sites: SiteRegistry,
        content_entries: Arc<dyn ContentEntryService>,
        templates: TemplateLibrary,
    ) -> Result<Self, reqwest::Error> {
        let services = ServiceRegistry::new(content_entries, &config)?;
        let hooks = Arc::new(ErpCustomerSubscriber::new(services.clone()));

        Ok(Self {
            sessions: Arc::new(SessionStore::with_ttl(config.session_ttl)),
            config: Arc::new(config),
            sites: Arc::new(sites),
            services,
            templates: Arc::new(templates),
            hooks,
        })
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn AuthLifecycle>) -> Self {
        self.hooks = hooks;
        self
    }
}

/// Insert the storefront pipeline in front of a host router.
///
/// Outer to inner: store, locale, ERP proxy, snippet page, templatized page,
/// page renderer, then the host router.
pub fn setup(host: Router, state: AppState) -> Router {
    use middleware::{erp_proxy, locale, renderer, snippet, store, templatized_page};

    Router::new()
        .fallback_service(host)
        .layer(from_fn_with_state(state.clone(), renderer::renderer_middleware))
        .layer(from_fn_with_state(state.clone(), templatized_page::templatized_page_middleware))
        .layer(from_fn_with_state(state.clone(), snippet::snippet_page_middleware))
        .layer(from_fn_with_state(state.clone(), erp_proxy::erp_proxy_middleware))
        .layer(from_fn(locale::locale_middleware))
        .layer(from_fn_with_state(state, store::store_middleware))
}

/// Complete application: storefront pipeline, host adapter, metrics and tracing
pub fn create_app(state: AppState) -> Router {
    setup(handlers::router(state.clone()), state)
        .route("/metrics", get(middleware::metrics::metrics_handler))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::TemplateSources;
    use crate::models::request_context::SharedContext;
    use crate::services::InMemoryContentEntryService;
    use axum::{
        body::{to_bytes, Body},
        extract::Extension,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn state() -> AppState {
        let sites = SiteRegistry::from_json(
            r#"[{"handle": "shop", "default_locale": "en", "locales": ["en", "fr"]}]"#,
        )
        .unwrap();
        let templates = TemplateSources::new()
            .with_snippet("hello", "hi {{ locale }}")
            .with_page("contact", "<p>{{ locale }} contact</p>")
            .compile()
            .unwrap();

        AppState::new(
            AppConfig::default(),
            sites,
            Arc::new(InMemoryContentEntryService::new()),
            templates,
        )
        .unwrap()
    }

    async fn where_am_i(Extension(shared): Extension<SharedContext>) -> String {
        let ctx = shared.lock().await;
        format!("{} {}", ctx.locale, ctx.path)
    }

    async fn body_text(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_setup_wraps_custom_host_router() {
        let host = Router::new().route("/about", get(where_am_i));
        let app = setup(host, state());

        let (status, body) = body_text(app.clone(), "/fr/about").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "fr /about");

        let (_, body) = body_text(app.clone(), "/about").await;
        assert_eq!(body, "en /about");

        let (status, body) = body_text(app.clone(), "/fr/snippet/hello").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "hi fr");

        // page templates answer before the host router
        let (status, body) = body_text(app, "/fr/contact").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<p>fr contact</p>");
    }
}
