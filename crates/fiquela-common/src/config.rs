//! 配置模块
//!
//! 查询引擎与命令行工具的配置项:
//! - 查询配置(条件分组模式、SHUFFLE 随机种子)
//! - 日志配置(日志级别)
//!
//! 支持从 TOML 文件加载配置。

use crate::error::{FiqError, FiqResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 主配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FiqConfig {
    /// 查询配置
    #[serde(default)]
    pub query: QueryConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 查询配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// AND/OR 切换时是否自动加括号分组 (默认: true)
    #[serde(default = "default_grouping")]
    pub grouping: bool,

    /// SHUFFLE 排序使用的随机种子;为空时每次执行结果不同
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
}

fn default_grouping() -> bool { true }

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            grouping: default_grouping(),
            shuffle_seed: None,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别 (默认: warn)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "warn".to_string() }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl FiqConfig {
    /// # Brief
    /// 从 TOML 文件加载配置
    ///
    /// # Arguments
    /// * `path` - 配置文件路径
    ///
    /// # Returns
    /// 解析后的配置实例
    pub fn from_file(path: &Path) -> FiqResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| FiqError::Config(format!("Failed to read config: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// # Brief
    /// 从 TOML 字符串解析配置
    ///
    /// # Arguments
    /// * `content` - TOML 文本
    pub fn from_toml_str(content: &str) -> FiqResult<Self> {
        toml::from_str(content)
            .map_err(|e| FiqError::Config(format!("Failed to parse config: {}", e)))
    }

    /// # Brief
    /// 将配置序列化为 TOML 字符串
    ///
    /// # Returns
    /// TOML 格式的配置字符串
    pub fn to_toml(&self) -> FiqResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| FiqError::Config(format!("Failed to serialize config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = FiqConfig::default();
        assert!(config.query.grouping);
        assert_eq!(config.query.shuffle_seed, None);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn test_partial_toml() {
        let config = FiqConfig::from_toml_str("[query]\nshuffle_seed = 7\n").unwrap();
        assert!(config.query.grouping);
        assert_eq!(config.query.shuffle_seed, Some(7));
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn test_invalid_toml() {
        let err = FiqConfig::from_toml_str("[query\ngrouping = ").unwrap_err();
        assert!(matches!(err, FiqError::Config(_)));
    }

    #[test]
    fn test_file_round_trip() {
        let mut config = FiqConfig::default();
        config.query.grouping = false;
        config.log.level = "debug".to_string();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml().unwrap().as_bytes()).unwrap();

        let loaded = FiqConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let err = FiqConfig::from_file(Path::new("/nonexistent/fiquela.toml")).unwrap_err();
        assert!(matches!(err, FiqError::Config(_)));
    }
}
