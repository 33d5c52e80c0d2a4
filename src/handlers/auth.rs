// Account Handlers
// Host side of storefront authentication: local entries are created and
// checked here, then the lifecycle hooks run against the same request context.

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use uuid::Uuid;
use validator::Validate;

use crate::middleware::error_handling::{AppError, Result};
use crate::middleware::renderer;
use crate::middleware::store::{AUTH_ENTRY_ID, AUTH_ENTRY_TYPE};
use crate::models::content_entry::{ContentEntry, ContentType, CUSTOMERS};
use crate::models::params::ParamsBag;
use crate::models::request_context::{RequestContext, SharedContext};
use crate::utils::log_sanitizer::mask_email;
use crate::utils::redirect;
use crate::AppState;

/// Entry field holding the bcrypt hash; never rendered
pub const PASSWORD_HASH_FIELD: &str = "encrypted_password";

/// Entry field holding a pending password reset token; never rendered
pub const RESET_TOKEN_FIELD: &str = "reset_password_token";

const CONTENT_TYPE_PARAM: &str = "auth_content_type";
const CALLBACK_PARAM: &str = "auth_callback";

/// Liquid assign describing the submitted entry after a failed signup
pub const AUTH_ENTRY_ASSIGN: &str = "auth_entry";

/// Lower than `bcrypt::DEFAULT_COST`; storefront accounts are re-hashed on reset
const PASSWORD_COST: u32 = 10;

#[derive(Debug, Validate)]
pub struct CredentialsForm {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, max = 128))]
    pub password: String,
}

impl CredentialsForm {
    /// Reads `auth_entry[email]` / `auth_entry[<password field>]`, falling
    /// back to top-level params
    pub fn from_params(params: &ParamsBag) -> Self {
        Self {
            email: params.entry_str("email").unwrap_or_default().trim().to_string(),
            password: password_param(params).to_string(),
        }
    }
}

#[derive(Debug, Validate)]
pub struct ResetPasswordForm {
    #[validate(length(min = 1))]
    pub token: String,
    #[validate(length(min = 6, max = 128))]
    pub password: String,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn password_param(params: &ParamsBag) -> &str {
    params.entry_str(params.password_field()).unwrap_or_default()
}

fn content_type(ctx: &RequestContext) -> Result<ContentType> {
    let slug = ctx.params.get_str(CONTENT_TYPE_PARAM).unwrap_or(CUSTOMERS);
    ctx.site
        .content_type(slug)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Unknown content type: {}", slug)))
}

/// Declared fields submitted with the form, plus the email
fn entry_fields(params: &ParamsBag, content_type: &ContentType, email: &str) -> Map<String, Value> {
    let mut fields: Map<String, Value> = content_type
        .fields
        .iter()
        .filter(|field| !matches!(field.as_str(), PASSWORD_HASH_FIELD | RESET_TOKEN_FIELD))
        .filter_map(|field| params.entry_value(field).map(|value| (field.clone(), value.clone())))
        .collect();

    fields.insert("email".to_string(), Value::String(email.to_string()));
    fields
}

/// Entry as JSON without credential fields
pub fn public_entry(entry: &ContentEntry) -> Value {
    let mut fields = entry.fields.clone();
    fields.remove(PASSWORD_HASH_FIELD);
    fields.remove(RESET_TOKEN_FIELD);

    json!({
        "_id": entry.id,
        "content_type": entry.content_type.slug,
        "fields": fields,
    })
}

fn sign_in_session(ctx: &mut RequestContext, entry: &ContentEntry) {
    ctx.session.insert(AUTH_ENTRY_TYPE, Value::String(entry.content_type.slug.clone()));
    ctx.session.insert(AUTH_ENTRY_ID, Value::String(entry.id.clone()));
    ctx.authenticated_entry = Some(entry.clone());
}

/// `auth_callback` redirect when present and local, JSON otherwise
fn respond(ctx: &RequestContext, status: StatusCode, body: Value) -> Response {
    ctx.params
        .get_str(CALLBACK_PARAM)
        .and_then(redirect::found)
        .unwrap_or_else(|| (status, Json(body)).into_response())
}

fn find_by_email_value(email: &str) -> Value {
    Value::String(email.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn register(
    State(state): State<AppState>,
    Extension(shared): Extension<SharedContext>,
) -> Result<Response> {
    let mut ctx = shared.lock().await;
    let content_type = content_type(&ctx)?;

    let form = CredentialsForm::from_params(&ctx.params);
    form.validate()?;

    let entries = state.services.content_entries();
    let email = find_by_email_value(&form.email);

    if entries.find_by(&content_type.slug, "email", &email).await?.is_some() {
        tracing::info!(
            request_id = %ctx.request_id,
            email = %mask_email(&form.email),
            "Signup refused, email already registered"
        );
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "errors": { "email": ["is already taken"] } })),
        )
            .into_response());
    }

    let mut fields = entry_fields(&ctx.params, &content_type, &form.email);
    fields.insert(
        PASSWORD_HASH_FIELD.to_string(),
        Value::String(bcrypt::hash(&form.password, PASSWORD_COST)?),
    );

    let mut entry = entries.create(&content_type, fields).await?;
    tracing::info!(
        request_id = %ctx.request_id,
        entry_id = %entry.id,
        email = %mask_email(&form.email),
        "Entry signed up"
    );

    let outcome = state.hooks.on_signed_up(&mut ctx, &mut entry).await?;

    if !entry.is_valid() {
        // the form page, when the site has one, is rendered again with the errors
        let fields = public_entry(&entry)["fields"].clone();
        ctx.assign(AUTH_ENTRY_ASSIGN, json!({ "errors": entry.errors, "fields": fields }));
        if let Some(page) = renderer::render(&state, &ctx, StatusCode::UNPROCESSABLE_ENTITY) {
            return page;
        }

        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "errors": entry.errors,
                "store_maintenance": ctx.is_maintenance(),
            })),
        )
            .into_response());
    }

    sign_in_session(&mut ctx, &entry);

    Ok(respond(
        &ctx,
        StatusCode::CREATED,
        json!({ "entry": public_entry(&entry), "outcome": outcome.label() }),
    ))
}

pub async fn sign_in(
    State(state): State<AppState>,
    Extension(shared): Extension<SharedContext>,
) -> Result<Response> {
    let mut ctx = shared.lock().await;
    let content_type = content_type(&ctx)?;

    let form = CredentialsForm::from_params(&ctx.params);
    form.validate()?;

    let entry = state
        .services
        .content_entries()
        .find_by(&content_type.slug, "email", &find_by_email_value(&form.email))
        .await?;

    let entry = match entry {
        Some(entry) => entry,
        None => {
            tracing::info!(request_id = %ctx.request_id, email = %mask_email(&form.email), "Sign in for unknown entry");
            return Err(AppError::Unauthorized);
        }
    };

    let hash = entry.get(PASSWORD_HASH_FIELD).and_then(Value::as_str).unwrap_or_default();
    if hash.is_empty() || !bcrypt::verify(&form.password, hash)? {
        tracing::info!(request_id = %ctx.request_id, entry_id = %entry.id, "Sign in refused");
        return Err(AppError::Unauthorized);
    }

    sign_in_session(&mut ctx, &entry);
    state.hooks.on_signed_in(&mut ctx, &entry).await?;

    tracing::info!(request_id = %ctx.request_id, entry_id = %entry.id, "Entry signed in");

    let store = ctx.session.store_values();
    Ok(respond(
        &ctx,
        StatusCode::OK,
        json!({ "entry": public_entry(&entry), "store": store }),
    ))
}

/// Issue a reset token. Answers the same way whether the email is known or not.
pub async fn forgot_password(
    State(state): State<AppState>,
    Extension(shared): Extension<SharedContext>,
) -> Result<Response> {
    let ctx = shared.lock().await;
    let content_type = content_type(&ctx)?;
    let email = ctx.params.entry_str("email").unwrap_or_default().trim().to_string();

    let entries = state.services.content_entries();
    if let Some(mut entry) = entries
        .find_by(&content_type.slug, "email", &find_by_email_value(&email))
        .await?
    {
        let mut values = Map::new();
        values.insert(
            RESET_TOKEN_FIELD.to_string(),
            Value::String(Uuid::new_v4().simple().to_string()),
        );
        entries.update_decorated_entry(&mut entry, values).await?;

        tracing::info!(request_id = %ctx.request_id, entry_id = %entry.id, "Password reset token issued");
    } else {
        tracing::info!(request_id = %ctx.request_id, email = %mask_email(&email), "Password reset for unknown entry");
    }

    Ok(respond(&ctx, StatusCode::ACCEPTED, json!({ "status": "sent" })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Extension(shared): Extension<SharedContext>,
) -> Result<Response> {
    let mut ctx = shared.lock().await;
    let content_type = content_type(&ctx)?;

    let form = ResetPasswordForm {
        token: ctx.params.get_str(RESET_TOKEN_FIELD).unwrap_or_default().to_string(),
        password: password_param(&ctx.params).to_string(),
    };
    form.validate()?;

    let entries = state.services.content_entries();
    let mut entry = entries
        .find_by(&content_type.slug, RESET_TOKEN_FIELD, &Value::String(form.token.clone()))
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired reset token".to_string()))?;

    let mut values = Map::new();
    values.insert(
        PASSWORD_HASH_FIELD.to_string(),
        Value::String(bcrypt::hash(&form.password, PASSWORD_COST)?),
    );
    values.insert(RESET_TOKEN_FIELD.to_string(), Value::Null);
    entries.update_decorated_entry(&mut entry, values).await?;

    sign_in_session(&mut ctx, &entry);
    state.hooks.on_password_reset(&mut ctx, &entry).await?;

    tracing::info!(request_id = %ctx.request_id, entry_id = %entry.id, "Password reset");

    Ok(respond(&ctx, StatusCode::OK, json!({ "entry": public_entry(&entry) })))
}

pub async fn sign_out(
    State(state): State<AppState>,
    Extension(shared): Extension<SharedContext>,
) -> Result<Response> {
    let mut ctx = shared.lock().await;
    let callback = ctx.params.get_str(CALLBACK_PARAM).map(str::to_string);

    state.hooks.on_signed_out(&mut ctx).await?;

    tracing::info!(request_id = %ctx.request_id, "Entry signed out");

    Ok(callback
        .as_deref()
        .and_then(redirect::found)
        .unwrap_or_else(|| Json(json!({ "signed_out": true })).into_response()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_form_validation() {
        let params = ParamsBag::from_pairs(vec![("email", " ann@example.com "), ("password", "secret1")]);
        let form = CredentialsForm::from_params(&params);
        assert_eq!(form.email, "ann@example.com");
        assert!(form.validate().is_ok());

        let params = ParamsBag::from_pairs(vec![("email", "nope"), ("password", "123")]);
        let errors = CredentialsForm::from_params(&params).validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn test_custom_password_field() {
        let params = ParamsBag::from_pairs(vec![
            ("auth_password_field", "passphrase"),
            ("passphrase", "open sesame"),
        ]);
        assert_eq!(password_param(&params), "open sesame");
    }

    #[test]
    fn test_credentials_from_auth_entry() {
        let params = ParamsBag::from_pairs(vec![
            ("auth_entry[email]", "ann@example.com"),
            ("auth_entry[password]", "secret1"),
        ]);
        let form = CredentialsForm::from_params(&params);
        assert_eq!(form.email, "ann@example.com");
        assert_eq!(form.password, "secret1");
    }

    #[test]
    fn test_entry_fields_keep_declared_fields_only() {
        let content_type = ContentType::new(
            "customers",
            "customers",
            &["email", "name", PASSWORD_HASH_FIELD],
        );
        let params = ParamsBag::from_pairs(vec![
            ("name", "Ann"),
            ("password", "secret1"),
            (PASSWORD_HASH_FIELD, "forged"),
            ("auth_action", "sign_up"),
        ]);

        let fields = entry_fields(&params, &content_type, "ann@example.com");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("name"), Some(&json!("Ann")));
        assert_eq!(fields.get("email"), Some(&json!("ann@example.com")));
    }

    #[test]
    fn test_public_entry_hides_credentials() {
        let mut fields = Map::new();
        fields.insert("email".to_string(), json!("ann@example.com"));
        fields.insert(PASSWORD_HASH_FIELD.to_string(), json!("$2b$..."));
        let entry = ContentEntry::new(ContentType::new("customers", "customers", &[]), fields);

        let view = public_entry(&entry);
        assert!(view["fields"].get(PASSWORD_HASH_FIELD).is_none());
        assert_eq!(view["fields"]["email"], "ann@example.com");
    }
}
