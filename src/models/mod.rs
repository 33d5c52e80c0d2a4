pub mod content_entry;
pub mod params;
pub mod request_context;

pub use content_entry::{ContentEntry, ContentType, EntryErrors, CUSTOMERS};
pub use params::ParamsBag;
pub use request_context::{ClientInfo, RequestContext, Session, SharedContext, MAINTENANCE_ASSIGN, STORE_PREFIX};
