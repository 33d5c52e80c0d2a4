// ERP Integration Module
// Exports the remote API client, the request-scoped ERP service and the customer lifecycle

pub mod erp_client;
pub mod erp_service;
pub mod customer_lifecycle;

pub use erp_client::{ClientContext, ErpClient, ErpError, ErpRecord};
pub use erp_service::ErpService;
pub use customer_lifecycle::{
    CustomerLifecycle,
    LifecycleError,
    RollbackReason,
    SignupOutcome,
    teardown_on_signout,
};
