mod health;
mod whoami;

pub use health::{HealthResponse, health_check};
pub use whoami::whoami;
