pub mod cli;
pub mod formatter;

pub use cli::Cli;
pub use formatter::{Formatter, OutputFormat};

use fiquela_common::{FiqConfig, FiqError};
use fiquela_query::QueryError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    /// 默认输入文件,FROM 中的定位符可以覆盖
    pub file: Option<PathBuf>,
    pub format: String,
    pub color: bool,
    pub fiq: FiqConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file: None,
            format: "table".to_string(),
            color: true,
            fiq: FiqConfig::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Config error: {0}")]
    Config(#[from] FiqError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CliResult<T> = Result<T, CliError>;

/// # Brief
/// 安装日志订阅者,输出到 stderr
///
/// # Arguments
/// * `level` - RUST_LOG 未设置时使用的级别
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}
