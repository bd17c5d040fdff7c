pub mod constants;
mod errors;
mod timeout;

pub use errors::ConfigError;
pub use timeout::validate_navigation_timeout;
