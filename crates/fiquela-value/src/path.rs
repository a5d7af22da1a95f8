//! 字段路径模块
//!
//! 路径语法:
//! - `a.b.c` 逐段下钻
//! - `` `a.b`.c `` 反引号内的点按字面处理
//! - `items[].name` 对数组的每个元素继续解析,返回结果数组
//! - `items.0` 纯数字段对数组按下标取值

use crate::record::Record;
use crate::value::Value;
use crate::{ValueError, ValueResult};
use compact_str::CompactString;
use std::fmt;

/// 缺失字段的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// 缺失字段报错
    Strict,
    /// 缺失字段返回 Null
    Lenient,
}

/// 路径段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// 键名(在数组上为数字下标)
    Key(CompactString),
    /// 迭代标记 `[]`
    Each,
}

/// 已解析的字段路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    /// # Brief
    /// 解析字段路径文本
    ///
    /// # Arguments
    /// * `text` - 路径文本,如 "user.`first.name`" 或 "items[].price"
    ///
    /// # Returns
    /// 解析后的路径;空段、未闭合的反引号、`[]` 后跟非 `.` 字符时返回 InvalidPath
    pub fn parse(text: &str) -> ValueResult<Self> {
        let invalid = || ValueError::InvalidPath(text.to_string());
        if text.is_empty() {
            return Err(invalid());
        }

        let mut segments = Vec::new();
        let mut chars = text.chars().peekable();
        loop {
            let mut name = String::new();
            let mut quoted = false;
            if chars.peek() == Some(&'`') {
                quoted = true;
                chars.next();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '`' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(invalid());
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c == '.' || c == '[' {
                        break;
                    }
                    name.push(c);
                    chars.next();
                }
            }

            // 迭代标记前允许空名,表示对当前值本身迭代
            let marker = chars.peek() == Some(&'[');
            if name.is_empty() && !quoted && !(marker && !segments.is_empty()) {
                return Err(invalid());
            }
            if !name.is_empty() || quoted {
                segments.push(Segment::Key(CompactString::from(name)));
            }

            if marker {
                chars.next();
                if chars.next() != Some(']') {
                    return Err(invalid());
                }
                segments.push(Segment::Each);
            }

            match chars.next() {
                None => break,
                Some('.') => {
                    if chars.peek().is_none() {
                        return Err(invalid());
                    }
                }
                Some(_) => return Err(invalid()),
            }
        }

        Ok(Self {
            raw: text.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// 路径是否包含迭代标记
    pub fn has_iteration(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Each))
    }

    /// # Brief
    /// 在记录上解析路径
    ///
    /// # Arguments
    /// * `record` - 起始记录
    /// * `mode` - 缺失字段的处理方式
    pub fn resolve(&self, record: &Record, mode: Resolution) -> ValueResult<Value> {
        let Some((first, rest)) = self.segments.split_first() else {
            return Ok(Value::Null);
        };
        let start = match first {
            Segment::Key(key) => match record.get(key) {
                Some(v) => v,
                None => return self.missing(mode),
            },
            Segment::Each => return self.missing(mode),
        };
        self.walk(start, rest, mode)
    }

    fn walk(&self, current: &Value, rest: &[Segment], mode: Resolution) -> ValueResult<Value> {
        let Some((segment, tail)) = rest.split_first() else {
            return Ok(current.clone());
        };
        match segment {
            Segment::Key(key) => {
                let next = match current {
                    Value::Record(rec) => rec.get(key),
                    Value::Array(arr) => key.parse::<usize>().ok().and_then(|i| arr.get(i)),
                    _ => None,
                };
                match next {
                    Some(v) => self.walk(v, tail, mode),
                    None => self.missing(mode),
                }
            }
            Segment::Each => match current {
                Value::Array(arr) => {
                    let mut out = Vec::with_capacity(arr.len());
                    for item in arr {
                        out.push(self.walk(item, tail, mode)?);
                    }
                    Ok(Value::Array(out))
                }
                _ => self.missing(mode),
            },
        }
    }

    fn missing(&self, mode: Resolution) -> ValueResult<Value> {
        match mode {
            Resolution::Lenient => Ok(Value::Null),
            Resolution::Strict => Err(ValueError::FieldNotFound(self.raw.clone())),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl std::str::FromStr for FieldPath {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
