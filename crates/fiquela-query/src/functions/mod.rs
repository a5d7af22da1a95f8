//! 函数库模块
//!
//! 所有函数由封闭的 `FunctionKind` 枚举表示,名称表在解析期查找一次。
//! 两种调用形式:
//! - 行函数 `invoke_row(原始记录, 已构建的行)`
//! - 聚合函数 `invoke_aggregate(分组内全部原始记录)`,
//!   以及等价的增量形式 `Accumulator::new / accumulate / finalize`

mod aggregate;
mod scalar;

pub use aggregate::Accumulator;

use crate::{QueryError, QueryResult};
use fiquela_value::{FieldPath, Record, Resolution, Value};
use std::fmt;

/// 函数种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    GroupConcat,
    Upper,
    Lower,
    Length,
    Trim,
    Reverse,
    Concat,
    ConcatWs,
    Substring,
    Replace,
    Explode,
    Implode,
    Round,
    Floor,
    Ceil,
    Abs,
    Mod,
    Coalesce,
    IfNull,
    Sha256,
    Now,
    DateFormat,
    Uuid,
}

impl FunctionKind {
    pub const ALL: &'static [FunctionKind] = &[
        FunctionKind::Count,
        FunctionKind::Sum,
        FunctionKind::Avg,
        FunctionKind::Min,
        FunctionKind::Max,
        FunctionKind::GroupConcat,
        FunctionKind::Upper,
        FunctionKind::Lower,
        FunctionKind::Length,
        FunctionKind::Trim,
        FunctionKind::Reverse,
        FunctionKind::Concat,
        FunctionKind::ConcatWs,
        FunctionKind::Substring,
        FunctionKind::Replace,
        FunctionKind::Explode,
        FunctionKind::Implode,
        FunctionKind::Round,
        FunctionKind::Floor,
        FunctionKind::Ceil,
        FunctionKind::Abs,
        FunctionKind::Mod,
        FunctionKind::Coalesce,
        FunctionKind::IfNull,
        FunctionKind::Sha256,
        FunctionKind::Now,
        FunctionKind::DateFormat,
        FunctionKind::Uuid,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FunctionKind::Count => "COUNT",
            FunctionKind::Sum => "SUM",
            FunctionKind::Avg => "AVG",
            FunctionKind::Min => "MIN",
            FunctionKind::Max => "MAX",
            FunctionKind::GroupConcat => "GROUP_CONCAT",
            FunctionKind::Upper => "UPPER",
            FunctionKind::Lower => "LOWER",
            FunctionKind::Length => "LENGTH",
            FunctionKind::Trim => "TRIM",
            FunctionKind::Reverse => "REVERSE",
            FunctionKind::Concat => "CONCAT",
            FunctionKind::ConcatWs => "CONCAT_WS",
            FunctionKind::Substring => "SUBSTRING",
            FunctionKind::Replace => "REPLACE",
            FunctionKind::Explode => "EXPLODE",
            FunctionKind::Implode => "IMPLODE",
            FunctionKind::Round => "ROUND",
            FunctionKind::Floor => "FLOOR",
            FunctionKind::Ceil => "CEIL",
            FunctionKind::Abs => "ABS",
            FunctionKind::Mod => "MOD",
            FunctionKind::Coalesce => "COALESCE",
            FunctionKind::IfNull => "IF_NULL",
            FunctionKind::Sha256 => "SHA256",
            FunctionKind::Now => "NOW",
            FunctionKind::DateFormat => "DATE_FORMAT",
            FunctionKind::Uuid => "UUID",
        }
    }

    /// # Brief
    /// 按名称查找函数(大小写不敏感)
    ///
    /// # Arguments
    /// * `name` - 函数名
    ///
    /// # Returns
    /// 未注册的名称返回 None
    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            FunctionKind::Count
                | FunctionKind::Sum
                | FunctionKind::Avg
                | FunctionKind::Min
                | FunctionKind::Max
                | FunctionKind::GroupConcat
        )
    }

    /// 参数个数范围 (最少, 最多),None 表示不限
    fn arity(&self) -> (usize, Option<usize>) {
        match self {
            FunctionKind::Count => (0, Some(1)),
            FunctionKind::Sum | FunctionKind::Avg | FunctionKind::Min | FunctionKind::Max => {
                (1, Some(1))
            }
            FunctionKind::GroupConcat => (1, Some(2)),
            FunctionKind::Upper
            | FunctionKind::Lower
            | FunctionKind::Length
            | FunctionKind::Trim
            | FunctionKind::Reverse => (1, Some(1)),
            FunctionKind::Concat => (1, None),
            FunctionKind::ConcatWs => (2, None),
            FunctionKind::Substring => (2, Some(3)),
            FunctionKind::Replace => (3, Some(3)),
            FunctionKind::Explode | FunctionKind::Implode => (1, Some(2)),
            FunctionKind::Round => (1, Some(2)),
            FunctionKind::Floor | FunctionKind::Ceil | FunctionKind::Abs => (1, Some(1)),
            FunctionKind::Mod => (2, Some(2)),
            FunctionKind::Coalesce => (1, None),
            FunctionKind::IfNull => (2, Some(2)),
            FunctionKind::Sha256 => (1, Some(1)),
            FunctionKind::Now => (0, Some(1)),
            FunctionKind::DateFormat => (2, Some(2)),
            FunctionKind::Uuid => (0, Some(0)),
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 函数参数
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArg {
    /// 字段引用
    Field(FieldPath),
    /// 字面量
    Literal(Value),
    /// 嵌套调用
    Call(Box<FunctionCall>),
    /// `*`
    Star,
}

impl FunctionArg {
    /// 字段参数的便捷构造
    pub fn field(path: &str) -> QueryResult<Self> {
        Ok(FunctionArg::Field(FieldPath::parse(path)?))
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        FunctionArg::Literal(value.into())
    }
}

impl fmt::Display for FunctionArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionArg::Field(path) => write!(f, "{}", path),
            FunctionArg::Literal(value) => write!(f, "{}", value),
            FunctionArg::Call(call) => write!(f, "{}", call),
            FunctionArg::Star => write!(f, "*"),
        }
    }
}

/// 函数调用
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    kind: FunctionKind,
    args: Vec<FunctionArg>,
}

impl FunctionCall {
    /// # Brief
    /// 创建函数调用并校验参数
    ///
    /// # Arguments
    /// * `kind` - 函数种类
    /// * `args` - 参数列表
    ///
    /// # Returns
    /// 参数个数不符、`*` 用在 COUNT 之外、聚合函数嵌套时返回 Build 错误
    pub fn new(kind: FunctionKind, args: Vec<FunctionArg>) -> QueryResult<Self> {
        let (min, max) = kind.arity();
        if args.len() < min || max.map(|m| args.len() > m).unwrap_or(false) {
            let expected = match max {
                Some(m) if m == min => format!("{}", min),
                Some(m) => format!("{} to {}", min, m),
                None => format!("at least {}", min),
            };
            return Err(QueryError::Build(format!(
                "{} expects {} argument(s), got {}",
                kind,
                expected,
                args.len()
            )));
        }
        for arg in &args {
            match arg {
                FunctionArg::Star if kind != FunctionKind::Count => {
                    return Err(QueryError::Build(format!("{} does not accept *", kind)));
                }
                FunctionArg::Call(inner) if inner.kind.is_aggregate() => {
                    return Err(QueryError::Build(format!(
                        "Aggregate {} cannot be nested inside {}",
                        inner.kind, kind
                    )));
                }
                FunctionArg::Call(_) if kind.is_aggregate() => {
                    return Err(QueryError::Build(format!(
                        "Aggregate {} only accepts field arguments",
                        kind
                    )));
                }
                _ => {}
            }
        }
        Ok(Self { kind, args })
    }

    /// 按名称创建,未注册的名称返回 UnknownFunction
    pub fn by_name(name: &str, args: Vec<FunctionArg>) -> QueryResult<Self> {
        let kind = FunctionKind::lookup(name)
            .ok_or_else(|| QueryError::UnknownFunction(name.to_string()))?;
        Self::new(kind, args)
    }

    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    pub fn args(&self) -> &[FunctionArg] {
        &self.args
    }

    pub fn is_aggregate(&self) -> bool {
        self.kind.is_aggregate()
    }

    /// # Brief
    /// 行函数调用
    ///
    /// # Arguments
    /// * `raw` - 原始记录
    /// * `row` - 已构建的输出行,字段参数优先从这里解析
    pub fn invoke_row(&self, raw: &Record, row: &Record) -> QueryResult<Value> {
        if self.kind.is_aggregate() {
            return self.invoke_aggregate(std::slice::from_ref(raw));
        }
        let mut values = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            values.push(resolve_arg(arg, raw, row)?);
        }
        scalar::invoke(self.kind, values)
    }

    /// # Brief
    /// 聚合函数调用
    ///
    /// # Arguments
    /// * `rows` - 分组内的全部原始记录
    pub fn invoke_aggregate(&self, rows: &[Record]) -> QueryResult<Value> {
        aggregate::invoke(self, rows)
    }

    /// 创建增量聚合器
    pub fn accumulator(&self) -> Accumulator {
        Accumulator::new(self)
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

fn resolve_arg(arg: &FunctionArg, raw: &Record, row: &Record) -> QueryResult<Value> {
    match arg {
        FunctionArg::Field(path) => match row.lookup_path(path, Resolution::Strict) {
            Ok(value) => Ok(value),
            Err(_) => Ok(raw.lookup_path(path, Resolution::Lenient)?),
        },
        FunctionArg::Literal(value) => Ok(value.clone()),
        FunctionArg::Call(call) => call.invoke_row(raw, row),
        FunctionArg::Star => Ok(Value::Record(raw.clone())),
    }
}
