pub mod config;
pub mod types;

pub use config::{LogFormat, PoolConfig, parse_duration};
pub use types::*;
