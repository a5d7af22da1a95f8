pub mod config;
pub mod error;

pub use config::{FiqConfig, LogConfig, QueryConfig};
pub use error::{FiqError, FiqResult};
