//! 查询状态模块
//!
//! `QueryState` 是构建器完成后的不可变快照,由计划器和执行器消费。
//! `Display` 输出规范化的 DSL 文本,可以被解析器重新解析。

use crate::condition::{ConditionGroup, Operator};
use crate::functions::FunctionCall;
use crate::source::Locator;
use compact_str::CompactString;
use fiquela_common::QueryConfig;
use fiquela_value::FieldPath;
use std::fmt;

/// 投影字段
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedField {
    name: CompactString,
    origin: String,
    path: Option<FieldPath>,
    is_alias: bool,
    function: Option<FunctionCall>,
}

impl SelectedField {
    /// 直接引用字段,输出名即字段路径原文
    pub fn field(path: FieldPath) -> Self {
        Self {
            name: CompactString::from(path.as_str()),
            origin: path.as_str().to_string(),
            path: Some(path),
            is_alias: false,
            function: None,
        }
    }

    /// 函数字段,未起别名时输出名为调用的文本形式
    pub fn call(call: FunctionCall) -> Self {
        let origin = call.to_string();
        Self {
            name: CompactString::from(origin.as_str()),
            origin,
            path: None,
            is_alias: false,
            function: Some(call),
        }
    }

    pub(crate) fn set_alias(&mut self, alias: &str) {
        self.name = CompactString::from(alias);
        self.is_alias = true;
    }

    /// 输出行中的键名
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// 非函数字段的源路径
    pub fn path(&self) -> Option<&FieldPath> {
        self.path.as_ref()
    }

    pub fn is_alias(&self) -> bool {
        self.is_alias
    }

    pub fn function(&self) -> Option<&FunctionCall> {
        self.function.as_ref()
    }

    pub fn is_aggregate(&self) -> bool {
        self.function.as_ref().map(|f| f.is_aggregate()).unwrap_or(false)
    }
}

impl fmt::Display for SelectedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.origin)?;
        if self.is_alias {
            write!(f, " AS {}", self.name)?;
        }
        Ok(())
    }
}

/// 连接类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    /// 左侧未匹配时是否补空输出
    pub fn keeps_unmatched_left(&self) -> bool {
        matches!(self, JoinKind::Left | JoinKind::Full)
    }

    /// 右侧未匹配时是否补空输出
    pub fn keeps_unmatched_right(&self) -> bool {
        matches!(self, JoinKind::Right | JoinKind::Full)
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "INNER"),
            JoinKind::Left => write!(f, "LEFT"),
            JoinKind::Right => write!(f, "RIGHT"),
            JoinKind::Full => write!(f, "FULL"),
        }
    }
}

/// 连接规格
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub right: Box<QueryState>,
    pub alias: Option<String>,
    pub left_key: FieldPath,
    pub operator: Operator,
    pub right_key: FieldPath,
}

impl JoinSpec {
    /// 等值连接走哈希,其余操作符退化为嵌套循环
    pub fn is_equi(&self) -> bool {
        self.operator.is_equality()
    }
}

impl fmt::Display for JoinSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} JOIN ({})", self.kind, self.right)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", alias)?;
        }
        write!(f, " ON {} {} {}", self.left_key, self.operator, self.right_key)
    }
}

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
    /// 自然排序,数字段按数值比较
    Natural,
    /// 随机打乱
    Shuffle,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => write!(f, "ASC"),
            Direction::Desc => write!(f, "DESC"),
            Direction::Natural => write!(f, "NATSORT"),
            Direction::Shuffle => write!(f, "SHUFFLE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub field: FieldPath,
    pub direction: Direction,
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.direction)
    }
}

/// 查询状态快照
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryState {
    /// `SELECT *`:输出原始记录,`fields` 中的条目追加在其后
    pub select_all: bool,
    pub fields: Vec<SelectedField>,
    pub distinct: bool,
    /// None 表示整个数据源
    pub locator: Option<Locator>,
    pub joins: Vec<JoinSpec>,
    pub where_: ConditionGroup,
    pub having: ConditionGroup,
    pub group_by: Vec<FieldPath>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub config: QueryConfig,
}

impl QueryState {
    /// 是否包含聚合:存在 GROUP BY 或任一投影字段使用聚合函数
    pub fn has_aggregation(&self) -> bool {
        !self.group_by.is_empty() || self.fields.iter().any(|f| f.is_aggregate())
    }

    pub fn field_by_name(&self, name: &str) -> Option<&SelectedField> {
        self.fields.iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT")?;
        if self.distinct {
            write!(f, " DISTINCT")?;
        }
        let mut first = true;
        if self.select_all || self.fields.is_empty() {
            write!(f, " *")?;
            first = false;
        }
        for field in &self.fields {
            write!(f, "{}{}", if first { " " } else { ", " }, field)?;
            first = false;
        }

        if let Some(locator) = &self.locator {
            write!(f, " FROM {}", locator)?;
        }
        for join in &self.joins {
            write!(f, " {}", join)?;
        }
        if !self.where_.is_empty() {
            write!(f, " WHERE {}", self.where_)?;
        }
        if !self.having.is_empty() {
            write!(f, " HAVING {}", self.having)?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            for (i, path) in self.group_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", path)?;
            }
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            for (i, key) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", key)?;
            }
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {}", offset)?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{ConditionNode, LogicalOperator, Predicate};
    use crate::functions::{FunctionArg, FunctionKind};

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_state_is_send_sync() {
        assert_send_sync::<QueryState>();
    }

    #[test]
    fn test_render_clause_order() {
        let mut state = QueryState::default();
        state.fields.push(SelectedField::field(FieldPath::parse("name").unwrap()));
        let mut count = SelectedField::call(
            FunctionCall::new(FunctionKind::Count, vec![FunctionArg::field("id").unwrap()]).unwrap(),
        );
        count.set_alias("c");
        state.fields.push(count);
        state.locator = Some(Locator::parse("users"));
        state.where_.push(
            LogicalOperator::And,
            ConditionNode::Predicate(Predicate::parse("age", Operator::GreaterThan, 18).unwrap()),
        );
        state.group_by.push(FieldPath::parse("name").unwrap());
        state.order_by.push(OrderKey {
            field: FieldPath::parse("c").unwrap(),
            direction: Direction::Desc,
        });
        state.limit = Some(10);
        state.offset = Some(5);

        assert_eq!(
            state.to_string(),
            "SELECT name, COUNT(id) AS c FROM users WHERE age > 18 GROUP BY name ORDER BY c DESC OFFSET 5 LIMIT 10"
        );
        assert!(state.has_aggregation());
    }

    #[test]
    fn test_render_select_all() {
        let state = QueryState::default();
        assert_eq!(state.to_string(), "SELECT *");
        assert!(!state.has_aggregation());
    }
}
