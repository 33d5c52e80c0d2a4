pub mod erp_proxy;
pub mod error_handling;
pub mod locale;
pub mod metrics;
pub mod renderer;
pub mod snippet;
pub mod store;
pub mod templatized_page;

pub use error_handling::*;
