pub mod log_sanitizer;
pub mod redirect;

pub use log_sanitizer::*;
