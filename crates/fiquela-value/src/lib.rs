//! # fiquela-value
//!
//! 查询引擎的数据模型:
//!
//! - **Value**: null / 布尔 / 整数 / 浮点 / 字符串 / 数组 / 记录
//! - **Record**: 保持插入顺序的字符串键映射
//! - **FieldPath**: 点分隔字段路径,支持反引号转义与 `[]` 迭代标记
//! - **比较**: 宽松相等、严格相等、排序比较与自然排序
//!
//! ```rust,ignore
//! use fiquela_value::{record, Resolution};
//!
//! let row = record! { "id": 1, "user": { "name": "miku" } };
//! let name = row.lookup("user.name", Resolution::Lenient).unwrap();
//! ```

pub mod compare;
pub mod path;
pub mod record;
pub mod value;

pub use compare::Number;
pub use path::{FieldPath, Resolution, Segment};
pub use record::Record;
pub use value::Value;

use thiserror::Error;

/// 数据模型操作的错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    /// 严格解析模式下字段不存在
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// 字段路径语法错误
    #[error("Invalid field path: {0}")]
    InvalidPath(String),

    /// 期望记录类型
    #[error("Expected a record, found {0}")]
    NotARecord(&'static str),

    /// JSON 解码错误
    #[error("JSON error: {0}")]
    Json(String),
}

/// 数据模型操作的 Result 类型别名
pub type ValueResult<T> = Result<T, ValueError>;
