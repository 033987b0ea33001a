//! Configuration, paths, and logging setup for the outpost daemon.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, DEFAULT_BUS_URL, DEFAULT_LOG_LEVEL, DEFAULT_TENANT_ID};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
