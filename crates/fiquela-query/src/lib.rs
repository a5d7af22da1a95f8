//! fiquela 查询模块
//!
//! 本模块实现类 SQL 查询引擎:
//! - 词法分析和语法解析
//! - 条件树(AND/OR/XOR 分组)
//! - 查询构建器(流式 API 与 DSL 解析共用)
//! - 标量函数与聚合函数
//! - 固定顺序的执行计划与流式执行器
//! - 流式结果与物化结果
//!
//! 支持的语法:
//! `SELECT [DISTINCT] ... FROM ... [JOIN ...] WHERE ... GROUP BY ... HAVING ... ORDER BY ... LIMIT ... OFFSET ...`

pub mod builder;
pub mod condition;
pub mod executor;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod planner;
pub mod result;
pub mod source;
pub mod state;

pub use builder::Query;
pub use condition::{ConditionGroup, ConditionNode, LogicalOperator, Operator, Predicate};
pub use functions::{Accumulator, FunctionArg, FunctionCall, FunctionKind};
pub use parser::Parser;
pub use planner::{PlanNode, QueryPlan};
pub use result::{MaterializedResult, Nth, Results, StreamResult};
pub use source::{JsonFileSource, Locator, MemorySource, RecordSource, RecordStream};
pub use state::{Direction, JoinKind, JoinSpec, OrderKey, QueryState, SelectedField};

use fiquela_common::FiqError;
use fiquela_value::ValueError;
use thiserror::Error;

/// 查询错误类型
///
/// 定义查询处理过程中可能出现的所有错误。
#[derive(Error, Debug)]
pub enum QueryError {
    /// 解析错误(带位置信息)
    #[error("Parse error at {position}: {message}")]
    Parse { position: usize, message: String },

    /// 未注册的函数名
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// 构建器调用顺序或参数不合法
    #[error("Build error: {0}")]
    Build(String),

    /// 严格解析模式下字段不存在
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// 数值函数收到非数值
    #[error("Value is not numeric: {0}")]
    NotNumeric(String),

    /// 除零
    #[error("Division by zero")]
    DivisionByZero,

    /// 类型错误
    #[error("Type error: {0}")]
    TypeError(String),

    /// 无效操作符
    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    /// 执行错误
    #[error("Execution error: {0}")]
    Execution(String),

    /// 数据源错误
    #[error("Source error: {0}")]
    Source(#[from] FiqError),
}

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// DSL 文本不合法,执行前抛出
    Parse,
    /// 流式 API 调用不合法,在出错的调用处抛出
    Build,
    /// 迭代过程中在触发的行上抛出
    Evaluation,
    /// 数据源无法读取或内容损坏
    Source,
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Parse { .. } | QueryError::UnknownFunction(_) => ErrorKind::Parse,
            QueryError::Build(_) => ErrorKind::Build,
            QueryError::Source(_) => ErrorKind::Source,
            QueryError::FieldNotFound(_)
            | QueryError::NotNumeric(_)
            | QueryError::DivisionByZero
            | QueryError::TypeError(_)
            | QueryError::InvalidOperator(_)
            | QueryError::Execution(_) => ErrorKind::Evaluation,
        }
    }

    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        QueryError::Parse {
            position,
            message: message.into(),
        }
    }
}

impl From<ValueError> for QueryError {
    fn from(err: ValueError) -> Self {
        match err {
            ValueError::FieldNotFound(path) => QueryError::FieldNotFound(path),
            ValueError::InvalidPath(path) => QueryError::Build(format!("Invalid field path: {}", path)),
            ValueError::NotARecord(found) => QueryError::TypeError(format!("Expected a record, found {}", found)),
            ValueError::Json(msg) => QueryError::Source(FiqError::Json(msg)),
        }
    }
}

/// 查询结果类型
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(QueryError::parse(3, "x").kind(), ErrorKind::Parse);
        assert_eq!(QueryError::UnknownFunction("FOO".into()).kind(), ErrorKind::Parse);
        assert_eq!(QueryError::Build("x".into()).kind(), ErrorKind::Build);
        assert_eq!(QueryError::DivisionByZero.kind(), ErrorKind::Evaluation);
        assert_eq!(
            QueryError::Source(FiqError::Source("gone".into())).kind(),
            ErrorKind::Source
        );
    }

    #[test]
    fn test_value_error_conversion() {
        let err: QueryError = ValueError::FieldNotFound("total".into()).into();
        assert!(matches!(err, QueryError::FieldNotFound(ref p) if p == "total"));
        assert_eq!(err.to_string(), "Field not found: total");
    }
}
