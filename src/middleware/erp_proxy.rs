// ============================================================================
// ERP Proxy Middleware
// ============================================================================
//
// `/invader/{path}` is forwarded to the site's ERP with the request method and
// params. `auth_*` and `invader_*` params never leave the storefront.
//
// - `invader_success_url` / `invader_error_url`: answer with a 302 instead of
//   the JSON record (forms posting straight to the ERP)
// - ERP maintenance: `store_maintenance` is raised and the call answers 503
//
// ============================================================================

use axum::{
    extract::{Extension, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::middleware::error_handling::{AppError, Result};
use crate::middleware::metrics;
use crate::models::params::{ParamsBag, PROXY_PREFIX};
use crate::models::request_context::{SharedContext, MAINTENANCE_ASSIGN};
use crate::services::erp::{ErpError, ErpRecord};
use crate::utils::log_sanitizer::sanitize_for_log;
use crate::utils::redirect;
use crate::AppState;

pub const PROXY_PATH_PREFIX: &str = "/invader/";

const SUCCESS_URL_PARAM: &str = "invader_success_url";
const ERROR_URL_PARAM: &str = "invader_error_url";

/// Params forwarded to the ERP
pub fn forwarded_params(params: &ParamsBag) -> ParamsBag {
    params.without_internal_keys().without_prefix(PROXY_PREFIX)
}

/// Status for an `error`-bearing record: its `code` when it is an HTTP error status
fn error_status(record: &ErpRecord) -> StatusCode {
    record
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .filter(|status| status.is_client_error() || status.is_server_error())
        .unwrap_or(StatusCode::BAD_REQUEST)
}

pub async fn erp_proxy_middleware(
    State(state): State<AppState>,
    Extension(shared): Extension<SharedContext>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let mut ctx = shared.lock().await;

    let erp_path = ctx
        .path
        .strip_prefix(PROXY_PATH_PREFIX)
        .filter(|rest| !rest.is_empty())
        .map(str::to_string);

    let Some(erp_path) = erp_path else {
        // the inner layers lock the context too
        drop(ctx);
        return Ok(next.run(request).await);
    };

    let services = state.services.build_instance(&ctx);
    let erp = services
        .erp()?
        .ok_or_else(|| AppError::NotFound("ERP is not configured for this site".to_string()))?;

    let params = forwarded_params(&ctx.params);
    let success_url = ctx.params.get_str(SUCCESS_URL_PARAM).map(str::to_string);
    let error_url = ctx.params.get_str(ERROR_URL_PARAM).map(str::to_string);
    let method = ctx.method.clone();

    tracing::info!(
        request_id = %ctx.request_id,
        method = %method,
        erp_path = %sanitize_for_log(&erp_path),
        "Proxying call to ERP"
    );

    match erp.call(&mut ctx, method, &erp_path, &params).await {
        Ok(record) if record.is_error() => {
            tracing::warn!(
                request_id = %ctx.request_id,
                erp_path = %sanitize_for_log(&erp_path),
                "ERP answered with an error: {:?}",
                record.error()
            );
            if let Some(response) = error_url.as_deref().and_then(redirect::found) {
                return Ok(response);
            }
            Ok((error_status(&record), Json(record)).into_response())
        }
        Ok(record) => {
            if let Some(response) = success_url.as_deref().and_then(redirect::found) {
                return Ok(response);
            }
            Ok(Json(record).into_response())
        }
        Err(ErpError::Maintenance(reason)) => {
            metrics::record_erp_maintenance("proxy");
            ctx.assign(MAINTENANCE_ASSIGN, true);
            if let Some(response) = error_url.as_deref().and_then(redirect::found) {
                return Ok(response);
            }
            Err(ErpError::Maintenance(reason).into())
        }
        Err(other) => Err(other.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_forwarded_params() {
        let params = ParamsBag::from_pairs(vec![
            ("auth_action", "x"),
            ("invader_success_url", "/ok"),
            ("invader_error_url", "/ko"),
            ("item_id", "12"),
        ]);

        let forwarded = forwarded_params(&params);
        let keys: Vec<&String> = forwarded.keys().collect();
        assert_eq!(keys, vec!["item_id"]);
    }

    #[test]
    fn test_error_status() {
        let record = |value: Value| ErpRecord::from_map(value.as_object().cloned().unwrap());

        assert_eq!(error_status(&record(json!({"error": true, "code": 404}))), StatusCode::NOT_FOUND);
        assert_eq!(error_status(&record(json!({"error": true, "code": 200}))), StatusCode::BAD_REQUEST);
        assert_eq!(error_status(&record(json!({"error": "nope"}))), StatusCode::BAD_REQUEST);
    }
}
