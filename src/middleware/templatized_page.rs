// Templatized Page Middleware
// GET paths are looked up as `url_key` in every search index that declares a
// `template_handle`. A hit selects that template for the request and exposes
// the record under the index name (`{{ product.name }}`).

use axum::{
    extract::{Extension, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};

use crate::models::request_context::SharedContext;
use crate::AppState;

/// Paths owned by the host adapter; never treated as record url keys
const RESERVED_PREFIXES: [&str; 2] = ["/account/", "/invader/"];

/// `url_key` for a storefront path, `None` for the home page and reserved paths
pub fn url_key(path: &str) -> Option<&str> {
    if RESERVED_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return None;
    }

    let key = path.trim_matches('/');
    (!key.is_empty()).then_some(key)
}

pub async fn templatized_page_middleware(
    State(state): State<AppState>,
    Extension(shared): Extension<SharedContext>,
    request: Request,
    next: Next,
) -> Response {
    {
        let mut ctx = shared.lock().await;

        let key = url_key(&ctx.path)
            .filter(|_| ctx.method == Method::GET && ctx.page.is_none())
            .map(str::to_string);

        if let Some(key) = key {
            let services = state.services.build_instance(&ctx);

            if let Some(algolia) = services.algolia() {
                for index in algolia.templatized_indices() {
                    match algolia.find_by_key(&index.name, &key).await {
                        Ok(Some(record)) => {
                            tracing::info!(
                                request_id = %ctx.request_id,
                                index = %index.name,
                                url_key = %key,
                                "Templatized page resolved"
                            );
                            ctx.page = index.template_handle.clone();
                            ctx.assign(&index.name, record);
                            break;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(
                                request_id = %ctx.request_id,
                                index = %index.name,
                                "Search lookup failed: {}",
                                e
                            );
                        }
                    }
                }
            }
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_key() {
        assert_eq!(url_key("/red-shoe"), Some("red-shoe"));
        assert_eq!(url_key("/shoes/red-shoe/"), Some("shoes/red-shoe"));
        assert_eq!(url_key("/"), None);
        assert_eq!(url_key("/account/sign_in"), None);
        assert_eq!(url_key("/invader/cart"), None);
    }
}
