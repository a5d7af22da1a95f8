//! 记录结构模块
//!
//! 提供 Record API:数据源产生的每一行以及查询输出的每一行都是一个 Record。
//! 使用 `IndexMap` 保持字段插入顺序。

use crate::path::{FieldPath, Resolution};
use crate::value::Value;
use crate::{ValueError, ValueResult};
use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 有序的字符串键记录
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<CompactString, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: IndexMap::with_capacity(capacity),
        }
    }

    /// 插入字段
    ///
    /// # Brief
    /// 插入或覆盖一个字段;覆盖时保留原有位置
    ///
    /// # Arguments
    /// * `key` - 字段名
    /// * `value` - 字段值
    pub fn insert(&mut self, key: impl Into<CompactString>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 合并另一个记录
    ///
    /// # Brief
    /// 将另一个记录的所有字段合并到当前记录中,同名字段被覆盖
    ///
    /// # Arguments
    /// * `other` - 要合并的记录
    pub fn merge(&mut self, other: Record) {
        for (k, v) in other.fields {
            self.fields.insert(k, v);
        }
    }

    /// 生成同结构的空值记录
    ///
    /// # Brief
    /// 保留全部键,值全部置为 Null。用于外连接未命中一侧的填充。
    pub fn null_filled(&self) -> Record {
        self.fields
            .keys()
            .map(|k| (k.clone(), Value::Null))
            .collect()
    }

    /// 按字段路径取值
    ///
    /// # Brief
    /// 顶层存在完全相同的键时直接返回(投影后的行可能含有 `a.b` 这样的键),
    /// 否则解析路径并逐段下钻
    ///
    /// # Arguments
    /// * `path` - 字段路径文本
    /// * `mode` - 缺失字段的处理方式
    ///
    /// # Returns
    /// 解析到的值;宽松模式下缺失为 Null,严格模式下缺失为 FieldNotFound
    pub fn lookup(&self, path: &str, mode: Resolution) -> ValueResult<Value> {
        if let Some(value) = self.fields.get(path) {
            return Ok(value.clone());
        }
        let parsed = FieldPath::parse(path)?;
        self.lookup_path(&parsed, mode)
    }

    /// 按已解析的字段路径取值
    pub fn lookup_path(&self, path: &FieldPath, mode: Resolution) -> ValueResult<Value> {
        if let Some(value) = self.fields.get(path.as_str()) {
            return Ok(value.clone());
        }
        path.resolve(self, mode)
    }

    pub fn into_inner(self) -> IndexMap<CompactString, Value> {
        self.fields
    }

    /// 从 JSON 字符串创建记录
    ///
    /// # Brief
    /// 解析 JSON 字符串,顶层必须是对象
    pub fn from_json(json: &str) -> ValueResult<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ValueError::Json(e.to_string()))?;
        match Value::from(value) {
            Value::Record(rec) => Ok(rec),
            other => Err(ValueError::NotARecord(other.type_name())),
        }
    }

    /// 转换为紧凑的 JSON 字符串
    pub fn to_json(&self) -> String {
        let json_value: serde_json::Value = self.clone().into();
        json_value.to_string()
    }

    /// 转换为带缩进的 JSON 字符串
    pub fn to_json_pretty(&self) -> String {
        let json_value: serde_json::Value = self.clone().into();
        serde_json::to_string_pretty(&json_value).unwrap_or_default()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "\"{}\": {}", k, v)?;
        }
        write!(f, "}}")
    }
}

impl From<IndexMap<CompactString, Value>> for Record {
    fn from(fields: IndexMap<CompactString, Value>) -> Self {
        Self { fields }
    }
}

impl From<Record> for serde_json::Value {
    fn from(rec: Record) -> Self {
        let mut map = serde_json::Map::with_capacity(rec.len());
        for (k, v) in rec.fields {
            map.insert(k.to_string(), v.into());
        }
        serde_json::Value::Object(map)
    }
}

impl<K: Into<CompactString>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (CompactString, Value);
    type IntoIter = indexmap::map::IntoIter<CompactString, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// 构造 Record 的便捷宏
///
/// # 示例
///
/// ```rust,ignore
/// use fiquela_value::record;
///
/// let empty = record!();
/// let rec = record! {
///     "name": "test",
///     "value": 123
/// };
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($key:tt : $value:tt),* $(,)?) => {
        {
            let mut rec = $crate::Record::new();
            $(
                rec.insert($key, $crate::value!($value));
            )*
            rec
        }
    };
}
