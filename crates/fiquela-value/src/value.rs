//! 值类型定义模块
//!
//! 定义查询引擎读取与输出的全部数据类型。
//! 使用 `CompactString` 优化短字符串的内存占用。

use crate::record::Record;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 记录中的值
///
/// 外部数据源产生的每个值都会映射为以下类型之一。
///
/// # 示例
///
/// ```rust,ignore
/// use fiquela_value::Value;
///
/// let value = Value::from("hello");
/// assert_eq!(value.type_name(), "string");
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// 空值
    #[default]
    Null,
    /// 布尔值
    Boolean(bool),
    /// 64位有符号整数
    Int(i64),
    /// 64位浮点数
    Float(f64),
    /// UTF-8 字符串
    String(CompactString),
    /// 值数组
    Array(Vec<Value>),
    /// 嵌套记录
    Record(Record),
}

impl Value {
    /// 获取值的类型名称
    ///
    /// # Brief
    /// 返回值的类型名称字符串
    ///
    /// # Returns
    /// 类型名称的静态字符串引用
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Record(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// 尝试获取 f64 值
    ///
    /// # Brief
    /// 整数与浮点数都转换为 f64;字符串不做转换(见 `as_number`)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(rec) => Some(rec),
            _ => None,
        }
    }

    /// 获取值的纯文本形式
    ///
    /// # Brief
    /// 字符串返回原文(不带引号),其他类型使用 Display 形式。
    /// 用于字符串函数、自然排序和表格输出。
    pub fn to_text(&self) -> String {
        match self {
            Value::String(s) => s.to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// 真值判断
    ///
    /// # Brief
    /// null、false、0、0.0、空字符串、"0" 和空数组为假,其余为真
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !(s.is_empty() || s.as_str() == "0"),
            Value::Array(arr) => !arr.is_empty(),
            Value::Record(_) => true,
        }
    }

    /// 转换为 serde_json 值
    pub fn to_json_value(&self) -> serde_json::Value {
        self.clone().into()
    }
}

/// 浮点数的规范文本形式,整数值保留 `.0` 以便重新解析时仍为浮点数
pub(crate) fn format_float(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.1}", n)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", format_float(*n)),
            Value::String(s) => {
                write!(f, "\"")?;
                for c in s.chars() {
                    match c {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "\"")
            }
            Value::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Record(rec) => write!(f, "{}", rec),
        }
    }
}

// ============================================================================
// From 特征实现
// ============================================================================

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        i64::try_from(v)
            .map(Value::Int)
            .unwrap_or(Value::Float(v as f64))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(CompactString::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(CompactString::from(v))
    }
}

impl From<CompactString> for Value {
    fn from(v: CompactString) -> Self {
        Value::String(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// JSON 互转支持
// ============================================================================

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(CompactString::from(s)),
            serde_json::Value::Array(arr) => Value::Array(arr.into_iter().map(Into::into).collect()),
            serde_json::Value::Object(obj) => {
                Value::Record(obj.into_iter().map(|(k, v)| (CompactString::from(k), Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(b),
            Value::Int(n) => serde_json::Value::Number(n.into()),
            Value::Float(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(arr) => serde_json::Value::Array(arr.into_iter().map(Into::into).collect()),
            Value::Record(rec) => rec.into(),
        }
    }
}

/// 构造 Value 的便捷宏
///
/// 负数需要加括号: `value!((-1))`。
///
/// # 示例
///
/// ```rust,ignore
/// use fiquela_value::value;
///
/// let null = value!(null);
/// let number = value!(42);
/// let array = value!([1, 2, 3]);
/// let rec = value!({ "name": "test", "tags": ["a", "b"] });
/// ```
#[macro_export]
macro_rules! value {
    (null) => {
        $crate::Value::Null
    };
    (true) => {
        $crate::Value::Boolean(true)
    };
    (false) => {
        $crate::Value::Boolean(false)
    };
    ([ $($elem:tt),* $(,)? ]) => {
        $crate::Value::Array(vec![ $($crate::value!($elem)),* ])
    };
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::Value::Record($crate::record! { $($key : $value),* })
    };
    ($e:expr) => {
        $crate::Value::from($e)
    };
}
