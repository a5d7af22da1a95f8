//! 错误类型定义模块
//!
//! 定义 fiquela 的公共错误类型 FiqError 和 Result 别名。

use thiserror::Error;

/// fiquela 公共错误类型
///
/// 数据源适配器与配置加载共用的错误。
#[derive(Error, Debug)]
pub enum FiqError {
    /// I/O 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(String),

    /// JSON 解码错误
    #[error("JSON error: {0}")]
    Json(String),

    /// 数据源错误(文件缺失、格式损坏等)
    #[error("Source error: {0}")]
    Source(String),
}

/// fiquela Result 类型别名
pub type FiqResult<T> = Result<T, FiqError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = FiqError::Config("bad key".to_string());
        assert_eq!(err.to_string(), "Config error: bad key");

        let err = FiqError::Source("missing file".to_string());
        assert_eq!(err.to_string(), "Source error: missing file");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: FiqError = io.into();
        assert!(err.to_string().starts_with("IO error"));
    }
}
