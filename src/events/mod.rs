// Authentication Lifecycle Hooks
// The host adapter calls these after its own auth step succeeded. The ERP
// subscriber keeps the ERP customer in step with the local entry.

use async_trait::async_trait;

use crate::models::content_entry::ContentEntry;
use crate::models::request_context::RequestContext;
use crate::services::erp::customer_lifecycle::{
    teardown_on_signout, CustomerLifecycle, Result, SignupOutcome,
};
use crate::services::ServiceRegistry;

#[async_trait]
pub trait AuthLifecycle: Send + Sync {
    /// A new entry was created. Implementations may invalidate and delete it.
    async fn on_signed_up(
        &self,
        ctx: &mut RequestContext,
        entry: &mut ContentEntry,
    ) -> Result<SignupOutcome>;

    async fn on_signed_in(&self, ctx: &mut RequestContext, entry: &ContentEntry) -> Result<()>;

    async fn on_password_reset(&self, ctx: &mut RequestContext, entry: &ContentEntry) -> Result<()>;

    async fn on_signed_out(&self, ctx: &mut RequestContext) -> Result<()>;
}

/// Registers, initializes and tears down ERP customers
#[derive(Clone)]
pub struct ErpCustomerSubscriber {
    services: ServiceRegistry,
}

impl ErpCustomerSubscriber {
    pub fn new(services: ServiceRegistry) -> Self {
        Self { services }
    }
}

#[async_trait]
impl AuthLifecycle for ErpCustomerSubscriber {
    async fn on_signed_up(
        &self,
        ctx: &mut RequestContext,
        entry: &mut ContentEntry,
    ) -> Result<SignupOutcome> {
        let services = self.services.build_instance(ctx);
        CustomerLifecycle::new(&services)
            .register_on_signup(ctx, entry)
            .await
    }

    async fn on_signed_in(&self, ctx: &mut RequestContext, entry: &ContentEntry) -> Result<()> {
        let services = self.services.build_instance(ctx);
        CustomerLifecycle::new(&services)
            .initialize_on_login(ctx, entry)
            .await?;
        Ok(())
    }

    async fn on_password_reset(&self, ctx: &mut RequestContext, entry: &ContentEntry) -> Result<()> {
        let services = self.services.build_instance(ctx);
        CustomerLifecycle::new(&services)
            .initialize_on_reset(ctx, entry)
            .await?;
        Ok(())
    }

    async fn on_signed_out(&self, ctx: &mut RequestContext) -> Result<()> {
        teardown_on_signout(ctx);
        Ok(())
    }
}
