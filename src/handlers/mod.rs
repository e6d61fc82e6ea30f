mod health;
mod identity;

pub use health::{health_check, service_status};
pub use identity::{not_found, whoami};
