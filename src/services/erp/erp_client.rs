// ERP Remote API Client
// Authenticated JSON calls against the per-site ERP endpoint
// Distinguishes success, application-level errors and maintenance (ERP unreachable)

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::ErpSettings;
use crate::models::params::ParamsBag;
use crate::utils::log_sanitizer::params_for_log;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum ErpError {
    #[error("ERP under maintenance: {0}")]
    Maintenance(String),

    #[error("ERP application error ({code:?}): {message}")]
    Application {
        code: Option<u16>,
        message: String,
        payload: Map<String, Value>,
    },

    #[error("ERP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid ERP response: {0}")]
    InvalidResponse(String),

    #[error("Invalid ERP configuration: {0}")]
    Config(String),
}

impl ErpError {
    pub fn is_maintenance(&self) -> bool {
        matches!(self, ErpError::Maintenance(_))
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ErpError::Maintenance(_) => "maintenance",
            ErpError::Application { .. } => "application",
            ErpError::Transport(_) => "transport",
            ErpError::InvalidResponse(_) => "invalid_response",
            ErpError::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, ErpError>;

// ============================================================================
// Data Models
// ============================================================================

/// Field mapping returned by the ERP; carries an `error` key on business failures
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ErpRecord(Map<String, Value>);

impl ErpRecord {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn error(&self) -> Option<&Value> {
        self.0.get("error")
    }

    pub fn is_error(&self) -> bool {
        self.0.contains_key("error")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Turn an `error`-bearing record into `ErpError::Application`
    pub fn into_result(self) -> Result<ErpRecord> {
        if !self.is_error() {
            return Ok(self);
        }

        let code = self
            .0
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok());
        let message = match (self.0.get("error"), self.0.get("message")) {
            (Some(Value::String(error)), _) => error.clone(),
            (_, Some(Value::String(message))) => message.clone(),
            _ => "ERP reported an error".to_string(),
        };

        Err(ErpError::Application {
            code,
            message,
            payload: self.0,
        })
    }
}

/// Identifying context the ERP uses to correlate anonymous and authenticated calls
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub request_id: Option<String>,
    pub locale: Option<String>,
    pub partner_email: Option<String>,
    pub cart_id: Option<String>,
    pub origin: Option<String>,
    pub forwarded_for: Option<String>,
    pub user_agent: Option<String>,
}

// ============================================================================
// ERP Client
// ============================================================================

pub struct ErpClient {
    base_url: Url,
    api_key: String,
    timeout: Duration,
    http_client: Client,
}

impl ErpClient {
    pub fn new(settings: &ErpSettings, http_client: Client, timeout: Duration) -> Result<Self> {
        let mut raw = settings.api_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }

        let base_url = Url::parse(&raw)
            .map_err(|e| ErpError::Config(format!("api_url '{}': {}", settings.api_url, e)))?;

        if settings.api_key.is_empty() {
            return Err(ErpError::Config("api_key is required".to_string()));
        }

        Ok(Self {
            base_url,
            api_key: settings.api_key.clone(),
            timeout,
            http_client,
        })
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ErpError::Config(format!("invalid ERP path '{}': {}", path, e)))
    }

    /// Issue one call. Network failures and gateway statuses surface as
    /// `ErpError::Maintenance`; business failures come back as an `ErpRecord`
    /// carrying `error`.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        params: &ParamsBag,
        ctx: &ClientContext,
    ) -> Result<ErpRecord> {
        let url = self.endpoint(path)?;

        tracing::debug!(method = %method, url = %url, params = %params_for_log(params), "ERP call");

        let request = self
            .http_client
            .request(method.clone(), url)
            .timeout(self.timeout);

        let request = if method == Method::GET || method == Method::DELETE {
            request.query(&params.to_query_pairs())
        } else {
            request.json(params)
        };

        let response = self
            .apply_headers(request, ctx)
            .send()
            .await
            .map_err(classify_send_error)?;

        self.parse_response(response).await
    }

    // ========================================================================
    // Helper Methods
    // ========================================================================

    fn apply_headers(&self, mut request: RequestBuilder, ctx: &ClientContext) -> RequestBuilder {
        request = request
            .header("API-KEY", self.api_key.as_str())
            .header("Accept", "application/json");

        let optional = [
            ("ACCEPT-LANGUAGE", &ctx.locale),
            ("PARTNER-EMAIL", &ctx.partner_email),
            ("SESS-CART-ID", &ctx.cart_id),
            ("Origin", &ctx.origin),
            ("X-Forwarded-For", &ctx.forwarded_for),
            ("User-Agent", &ctx.user_agent),
            ("X-Request-ID", &ctx.request_id),
        ];

        for (name, value) in optional {
            if let Some(value) = value {
                request = request.header(name, value.as_str());
            }
        }

        request
    }

    async fn parse_response(&self, response: Response) -> Result<ErpRecord> {
        let status = response.status();

        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Err(ErpError::Maintenance(format!("ERP answered {}", status)));
        }

        let body = response.text().await?;

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(ErpRecord::default());
            }
            return match serde_json::from_str::<Value>(&body) {
                Ok(Value::Object(map)) => Ok(ErpRecord(map)),
                Ok(other) => Err(ErpError::InvalidResponse(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                ))),
                Err(e) => Err(ErpError::InvalidResponse(e.to_string())),
            };
        }

        Ok(error_record(status, &body))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn classify_send_error(error: reqwest::Error) -> ErpError {
    if error.is_connect() || error.is_timeout() {
        ErpError::Maintenance(error.to_string())
    } else {
        ErpError::Transport(error)
    }
}

/// Normalise a non-success answer into an `error`-bearing record
fn error_record(status: StatusCode, body: &str) -> ErpRecord {
    if let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(body) {
        map.entry("error").or_insert(Value::Bool(true));
        map.entry("code").or_insert(json!(status.as_u16()));
        return ErpRecord(map);
    }

    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("ERP error").to_string()
    } else {
        body.trim().to_string()
    };

    let mut map = Map::new();
    map.insert("error".to_string(), Value::Bool(true));
    map.insert("code".to_string(), json!(status.as_u16()));
    map.insert("message".to_string(), Value::String(message));
    ErpRecord(map)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(api_url: &str) -> ErpSettings {
        ErpSettings {
            api_url: api_url.to_string(),
            api_key: "42".to_string(),
            default_role: None,
        }
    }

    #[test]
    fn test_endpoint_join_keeps_base_path() {
        let client = ErpClient::new(
            &settings("http://models.example.com/shopinvader"),
            Client::new(),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(
            client.endpoint("guest/register").unwrap().as_str(),
            "http://models.example.com/shopinvader/guest/register"
        );
        assert_eq!(
            client.endpoint("/customer").unwrap().as_str(),
            "http://models.example.com/shopinvader/customer"
        );
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let result = ErpClient::new(&settings("::nope"), Client::new(), Duration::from_secs(1));
        assert!(matches!(result, Err(ErpError::Config(_))));
    }

    #[test]
    fn test_error_record_from_json_body() {
        let record = error_record(StatusCode::BAD_REQUEST, r#"{"message": "duplicate"}"#);
        assert_eq!(record.error(), Some(&Value::Bool(true)));
        assert_eq!(record.get("code"), Some(&json!(400)));
        assert_eq!(record.get("message"), Some(&json!("duplicate")));
    }

    #[test]
    fn test_error_record_from_text_body() {
        let record = error_record(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(record.is_error());
        assert_eq!(record.get("message"), Some(&json!("Internal Server Error")));
    }

    #[test]
    fn test_into_result() {
        let ok = ErpRecord::from_map(json!({"role": "vip"}).as_object().cloned().unwrap());
        assert!(ok.into_result().is_ok());

        let failed = ErpRecord::from_map(
            json!({"error": "duplicate", "code": 409}).as_object().cloned().unwrap(),
        );
        match failed.into_result() {
            Err(ErpError::Application { code, message, .. }) => {
                assert_eq!(code, Some(409));
                assert_eq!(message, "duplicate");
            }
            other => panic!("expected application error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_kind() {
        assert!(ErpError::Maintenance("down".to_string()).is_maintenance());
        assert_eq!(ErpError::Config("x".to_string()).kind(), "config");
    }
}
