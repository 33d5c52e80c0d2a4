// Customer Lifecycle
// Keeps local customer entries and ERP customers in step across signup, login,
// password reset and sign-out. There is no transaction spanning the content
// store and the ERP, so a failed signup is compensated by deleting the entry.

use reqwest::Method;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::Site;
use crate::middleware::metrics;
use crate::models::content_entry::ContentEntry;
use crate::models::params::{ParamsBag, GUEST_SIGNUP_MARKER};
use crate::models::request_context::{RequestContext, MAINTENANCE_ASSIGN, STORE_PREFIX};
use crate::services::content_entry_service::ContentEntryError;
use crate::services::erp::erp_client::{ErpError, ErpRecord};
use crate::services::Services;
use crate::utils::log_sanitizer::mask_email;

pub const CUSTOMER_PATH: &str = "customer";
pub const GUEST_REGISTER_PATH: &str = "guest/register";

/// Field error attached to an entry whose creation was compensated
pub const ROLLBACK_FIELD: &str = "error";
pub const ROLLBACK_MESSAGE: &str = "Fail to create";

/// Only these keys reach the ERP on a guest registration
const GUEST_FIELDS: [&str; 2] = ["external_id", "email"];

// ============================================================================
// Error & Outcome Types
// ============================================================================

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error(transparent)]
    Erp(#[from] ErpError),

    #[error(transparent)]
    ContentEntry(#[from] ContentEntryError),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

#[derive(Debug, Clone, PartialEq)]
pub enum RollbackReason {
    Maintenance,
    /// The ERP answered with an `error` value
    Application(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignupOutcome {
    /// Site without ERP or entry that is not a customer
    Skipped,
    Committed { updated: Vec<String> },
    RolledBack(RollbackReason),
}

impl SignupOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SignupOutcome::Skipped => "skipped",
            SignupOutcome::Committed { .. } => "committed",
            SignupOutcome::RolledBack(RollbackReason::Maintenance) => "rolled_back_maintenance",
            SignupOutcome::RolledBack(RollbackReason::Application(_)) => "rolled_back_application",
        }
    }

    pub fn is_rolled_back(&self) -> bool {
        matches!(self, SignupOutcome::RolledBack(_))
    }
}

// ============================================================================
// Gate & Pure Helpers
// ============================================================================

/// ERP customer logic applies only to `customers` entries on ERP-enabled sites
pub fn is_erp_customer(site: &Site, entry: &ContentEntry) -> bool {
    site.has_erp() && entry.content_type.is_customers()
}

/// Request params plus the entry identity. Every `auth_*` key (the nested
/// `auth_entry` fields included) and the password fields are removed.
pub fn signup_params(params: &ParamsBag, entry: &ContentEntry) -> ParamsBag {
    let password_field = params.password_field();
    let confirmation = format!("{}_confirmation", password_field);

    params
        .without(&[password_field, confirmation.as_str()])
        .with("external_id", entry.id.clone())
        .with(
            "email",
            entry.email().map(|e| Value::String(e.to_string())).unwrap_or(Value::Null),
        )
        .without_internal_keys()
}

/// Fields to write back locally: present on both sides with differing values.
/// A missing remote `role` is filled from the site default first.
pub fn reconcile(
    local: &Map<String, Value>,
    remote: &ErpRecord,
    default_role: Option<&str>,
) -> Map<String, Value> {
    let mut remote = remote.fields().clone();

    if !remote.contains_key("role") {
        if let Some(role) = default_role {
            remote.insert("role".to_string(), Value::String(role.to_string()));
        }
    }

    remote
        .into_iter()
        .filter(|(key, value)| local.get(key).is_some_and(|current| current != value))
        .collect()
}

/// Expire every store-owned cookie and drop the session.
/// Returns the expired cookie names.
pub fn teardown_on_signout(ctx: &mut RequestContext) -> Vec<String> {
    let mut expired = Vec::new();

    for key in ctx.session.keys() {
        if let Some(name) = key.strip_prefix(STORE_PREFIX) {
            ctx.expire_cookie(name);
            expired.push(name.to_string());
        }
    }

    ctx.session.clear();
    ctx.authenticated_entry = None;

    tracing::info!(
        request_id = %ctx.request_id,
        cookies = expired.len(),
        "Store session torn down on sign out"
    );

    expired
}

// ============================================================================
// Lifecycle Orchestration
// ============================================================================

pub struct CustomerLifecycle<'a> {
    services: &'a Services,
}

impl<'a> CustomerLifecycle<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self { services }
    }

    /// Create the ERP customer for a freshly signed-up entry.
    ///
    /// pending -> committed: ERP accepted; differing shared fields written back.
    /// pending -> rolled_back: maintenance or ERP `error`; the entry is deleted
    /// and marked invalid before this returns.
    /// Any other ERP failure deletes the entry too, then propagates.
    pub async fn register_on_signup(
        &self,
        ctx: &mut RequestContext,
        entry: &mut ContentEntry,
    ) -> Result<SignupOutcome> {
        if !is_erp_customer(&ctx.site, entry) {
            return Ok(SignupOutcome::Skipped);
        }
        let erp = match self.services.erp()? {
            Some(erp) => erp,
            None => return Ok(SignupOutcome::Skipped),
        };

        let params = signup_params(&ctx.params, entry);
        let (path, payload) = if ctx.params.contains(GUEST_SIGNUP_MARKER) {
            (GUEST_REGISTER_PATH, params.only(&GUEST_FIELDS))
        } else {
            (CUSTOMER_PATH, params)
        };

        tracing::info!(
            request_id = %ctx.request_id,
            entry_id = %entry.id,
            email = %mask_email(entry.email().unwrap_or_default()),
            path,
            "Registering customer in ERP"
        );

        let outcome = match erp.call(ctx, Method::POST, path, &payload).await {
            Err(ErpError::Maintenance(reason)) => {
                tracing::warn!(request_id = %ctx.request_id, "ERP maintenance during signup: {}", reason);
                metrics::record_erp_maintenance("signup");
                ctx.assign(MAINTENANCE_ASSIGN, true);
                SignupOutcome::RolledBack(RollbackReason::Maintenance)
            }
            Err(other) => {
                tracing::error!(request_id = %ctx.request_id, "ERP signup call failed: {}", other);
                self.rollback(entry).await?;
                metrics::record_signup_outcome("failed");
                return Err(other.into());
            }
            Ok(record) if record.is_error() => {
                let error = record.error().cloned().unwrap_or(Value::Null);
                tracing::warn!(request_id = %ctx.request_id, "ERP rejected signup: {}", error);
                SignupOutcome::RolledBack(RollbackReason::Application(error))
            }
            Ok(record) => {
                let delta = reconcile(&entry.to_hash(), &record, erp.default_role());
                let updated: Vec<String> = delta.keys().cloned().collect();

                if !delta.is_empty() {
                    self.services
                        .content_entry()
                        .update_decorated_entry(entry, delta)
                        .await?;
                }

                SignupOutcome::Committed { updated }
            }
        };

        if outcome.is_rolled_back() {
            self.rollback(entry).await?;
        }

        tracing::info!(
            request_id = %ctx.request_id,
            entry_id = %entry.id,
            outcome = outcome.label(),
            "Customer signup settled"
        );
        metrics::record_signup_outcome(outcome.label());

        Ok(outcome)
    }

    /// Mark the entry authenticated and refresh the ERP customer. Best effort:
    /// maintenance never blocks the login. Returns whether the ERP was reached.
    pub async fn initialize_on_login(
        &self,
        ctx: &mut RequestContext,
        entry: &ContentEntry,
    ) -> Result<bool> {
        self.initialize(ctx, entry, "sign_in").await
    }

    pub async fn initialize_on_reset(
        &self,
        ctx: &mut RequestContext,
        entry: &ContentEntry,
    ) -> Result<bool> {
        self.initialize(ctx, entry, "reset_password").await
    }

    async fn initialize(
        &self,
        ctx: &mut RequestContext,
        entry: &ContentEntry,
        operation: &'static str,
    ) -> Result<bool> {
        if !is_erp_customer(&ctx.site, entry) {
            return Ok(false);
        }

        ctx.authenticated_entry = Some(entry.clone());

        let erp = match self.services.erp()? {
            Some(erp) => erp,
            None => return Ok(false),
        };

        match erp.initialize_customer(ctx).await {
            Ok(_) => Ok(true),
            Err(ErpError::Maintenance(reason)) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    operation,
                    "ERP maintenance, customer not initialized: {}",
                    reason
                );
                metrics::record_erp_maintenance(operation);
                Ok(false)
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn rollback(&self, entry: &mut ContentEntry) -> Result<()> {
        entry.errors.add(ROLLBACK_FIELD, ROLLBACK_MESSAGE);

        let deleted = self
            .services
            .content_entry()
            .delete(entry.content_type_slug(), &entry.id)
            .await?;

        tracing::info!(entry_id = %entry.id, deleted, "Signup compensated");
        Ok(())
    }
}
