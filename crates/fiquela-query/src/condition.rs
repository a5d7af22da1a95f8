//! 条件树模块
//!
//! WHERE / HAVING 共用的条件模型:
//! - 简单谓词 `字段 操作符 操作数`
//! - 分组 `[(逻辑操作符, 子节点)]`,第一个子节点的逻辑操作符在求值时被忽略
//!
//! 求值采用无短路的从左到右三值折叠:累加器初始为"未设置",
//! 与第一个结果合并时直接取该结果,之后按各子节点的逻辑操作符合并。

use crate::{QueryError, QueryResult};
use fiquela_value::{FieldPath, Record, Resolution, Value};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

/// 逻辑操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
    Xor,
}

impl LogicalOperator {
    /// # Brief
    /// 三值折叠的一步
    ///
    /// # Arguments
    /// * `acc` - 当前累加器,None 表示尚未设置
    /// * `value` - 当前子节点的结果
    pub fn fold(self, acc: Option<bool>, value: bool) -> bool {
        match acc {
            None => value,
            Some(a) => match self {
                LogicalOperator::And => a && value,
                LogicalOperator::Or => a || value,
                LogicalOperator::Xor => a ^ value,
            },
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOperator::And => write!(f, "AND"),
            LogicalOperator::Or => write!(f, "OR"),
            LogicalOperator::Xor => write!(f, "XOR"),
        }
    }
}

/// 比较操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=` 宽松相等
    Equal,
    /// `==` 严格相等
    EqualStrict,
    /// `!=` / `<>`
    NotEqual,
    /// `!==`
    NotEqualStrict,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    In,
    NotIn,
    Like,
    NotLike,
    Is,
    IsNot,
    Contains,
    StartsWith,
    EndsWith,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::EqualStrict => "==",
            Operator::NotEqual => "!=",
            Operator::NotEqualStrict => "!==",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
            Operator::Contains => "CONTAINS",
            Operator::StartsWith => "STARTS_WITH",
            Operator::EndsWith => "ENDS_WITH",
        }
    }

    /// # Brief
    /// 按符号查找操作符(大小写不敏感,多词操作符之间允许任意空白)
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let normalized = symbol.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        let op = match normalized.as_str() {
            "=" => Operator::Equal,
            "==" => Operator::EqualStrict,
            "!=" | "<>" => Operator::NotEqual,
            "!==" => Operator::NotEqualStrict,
            "<" => Operator::LessThan,
            "<=" => Operator::LessThanOrEqual,
            ">" => Operator::GreaterThan,
            ">=" => Operator::GreaterThanOrEqual,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            "LIKE" => Operator::Like,
            "NOT LIKE" => Operator::NotLike,
            "IS" => Operator::Is,
            "IS NOT" => Operator::IsNot,
            "CONTAINS" => Operator::Contains,
            "STARTS_WITH" => Operator::StartsWith,
            "ENDS_WITH" => Operator::EndsWith,
            _ => return None,
        };
        Some(op)
    }

    /// 是否可用哈希连接(等值比较)
    pub fn is_equality(&self) -> bool {
        matches!(self, Operator::Equal | Operator::EqualStrict)
    }

    /// # Brief
    /// 对左值和操作数应用比较
    ///
    /// # Arguments
    /// * `left` - 记录中解析出的值
    /// * `right` - 操作数
    ///
    /// # Returns
    /// 比较结果;LIKE 系列请使用 `Predicate`,此处会临时编译模式
    pub fn apply(&self, left: &Value, right: &Value) -> QueryResult<bool> {
        let result = match self {
            Operator::Equal => left.loose_eq(right),
            Operator::EqualStrict => left.strict_eq(right),
            Operator::NotEqual => !left.loose_eq(right),
            Operator::NotEqualStrict => !left.strict_eq(right),
            Operator::LessThan => left.compare(right) == Some(Ordering::Less),
            Operator::LessThanOrEqual => {
                matches!(left.compare(right), Some(Ordering::Less | Ordering::Equal))
            }
            Operator::GreaterThan => left.compare(right) == Some(Ordering::Greater),
            Operator::GreaterThanOrEqual => {
                matches!(left.compare(right), Some(Ordering::Greater | Ordering::Equal))
            }
            Operator::In => in_list(left, right),
            Operator::NotIn => !in_list(left, right),
            Operator::Like => like_regex(right)?.is_match_value(left),
            Operator::NotLike => !like_regex(right)?.is_match_value(left),
            Operator::Is => is_match(left, right),
            Operator::IsNot => !is_match(left, right),
            Operator::Contains => match left {
                Value::Null => false,
                Value::Array(items) => items.iter().any(|v| v.loose_eq(right)),
                other => other.to_text().contains(&right.to_text()),
            },
            Operator::StartsWith => {
                !left.is_null() && left.to_text().starts_with(&right.to_text())
            }
            Operator::EndsWith => !left.is_null() && left.to_text().ends_with(&right.to_text()),
        };
        Ok(result)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

fn in_list(left: &Value, list: &Value) -> bool {
    match list {
        Value::Array(items) => items.iter().any(|v| left.loose_eq(v)),
        single => left.loose_eq(single),
    }
}

/// IS: 类型名按类型判断,其余按严格相等
fn is_match(left: &Value, right: &Value) -> bool {
    if let Value::String(name) = right {
        let by_type = match name.to_ascii_uppercase().as_str() {
            "NUMBER" | "NUMERIC" => Some(matches!(left, Value::Int(_) | Value::Float(_))),
            "INT" | "INTEGER" => Some(matches!(left, Value::Int(_))),
            "FLOAT" | "DOUBLE" => Some(matches!(left, Value::Float(_))),
            "STRING" => Some(matches!(left, Value::String(_))),
            "ARRAY" | "LIST" => Some(matches!(left, Value::Array(_))),
            "OBJECT" | "RECORD" => Some(matches!(left, Value::Record(_))),
            "BOOLEAN" | "BOOL" => Some(matches!(left, Value::Boolean(_))),
            _ => None,
        };
        if let Some(result) = by_type {
            return result;
        }
    }
    left.strict_eq(right)
}

/// 编译后的 LIKE 模式
#[derive(Debug, Clone)]
pub struct LikePattern(Regex);

impl LikePattern {
    /// # Brief
    /// 将 SQL LIKE 模式编译为正则:`%` 匹配任意串,`_` 匹配单个字符,区分大小写
    pub fn new(pattern: &str) -> QueryResult<Self> {
        let mut regex = String::with_capacity(pattern.len() + 8);
        regex.push_str("(?s)^");
        let mut buf = [0u8; 4];
        for c in pattern.chars() {
            match c {
                '%' => regex.push_str(".*"),
                '_' => regex.push('.'),
                c => regex.push_str(&regex::escape(c.encode_utf8(&mut buf))),
            }
        }
        regex.push('$');
        Regex::new(&regex)
            .map(LikePattern)
            .map_err(|e| QueryError::InvalidOperator(format!("Invalid pattern: {}", e)))
    }

    fn is_match_value(&self, value: &Value) -> bool {
        match value {
            Value::Null => false,
            other => self.0.is_match(&other.to_text()),
        }
    }
}

fn like_regex(operand: &Value) -> QueryResult<LikePattern> {
    LikePattern::new(&operand.to_text())
}

/// 简单谓词 `字段 操作符 操作数`
#[derive(Debug, Clone)]
pub struct Predicate {
    field: FieldPath,
    operator: Operator,
    operand: Value,
    like: Option<LikePattern>,
}

impl Predicate {
    /// # Brief
    /// 创建谓词;LIKE 模式在此处预编译
    ///
    /// # Arguments
    /// * `field` - 字段路径
    /// * `operator` - 比较操作符
    /// * `operand` - 操作数,IN / NOT IN 为数组
    pub fn new(field: FieldPath, operator: Operator, operand: Value) -> QueryResult<Self> {
        let like = match operator {
            Operator::Like | Operator::NotLike => Some(LikePattern::new(&operand.to_text())?),
            _ => None,
        };
        Ok(Self {
            field,
            operator,
            operand,
            like,
        })
    }

    /// 从字段文本创建谓词
    pub fn parse(field: &str, operator: Operator, operand: impl Into<Value>) -> QueryResult<Self> {
        Self::new(FieldPath::parse(field)?, operator, operand.into())
    }

    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn operand(&self) -> &Value {
        &self.operand
    }

    /// # Brief
    /// 对记录求值
    ///
    /// # Arguments
    /// * `record` - 当前行
    /// * `mode` - 字段解析模式;过滤阶段宽松,HAVING 阶段严格
    pub fn evaluate(&self, record: &Record, mode: Resolution) -> QueryResult<bool> {
        let value = record.lookup_path(&self.field, mode)?;
        match (&self.like, self.operator) {
            (Some(pattern), Operator::Like) => Ok(pattern.is_match_value(&value)),
            (Some(pattern), Operator::NotLike) => Ok(!pattern.is_match_value(&value)),
            _ => self.operator.apply(&value, &self.operand),
        }
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field && self.operator == other.operator && self.operand == other.operand
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.field, self.operator)?;
        match (&self.operand, self.operator) {
            (Value::Array(items), Operator::In | Operator::NotIn) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            (operand, _) => write!(f, "{}", operand),
        }
    }
}

/// 条件节点
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    Predicate(Predicate),
    Group(ConditionGroup),
}

impl ConditionNode {
    pub fn evaluate(&self, record: &Record, mode: Resolution) -> QueryResult<bool> {
        match self {
            ConditionNode::Predicate(p) => p.evaluate(record, mode),
            ConditionNode::Group(g) => g.evaluate(record, mode),
        }
    }
}

impl fmt::Display for ConditionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionNode::Predicate(p) => write!(f, "{}", p),
            ConditionNode::Group(g) => write!(f, "({})", g),
        }
    }
}

/// 条件分组
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionGroup {
    children: Vec<(LogicalOperator, ConditionNode)>,
}

impl ConditionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: LogicalOperator, node: ConditionNode) {
        self.children.push((op, node));
    }

    pub fn children(&self) -> &[(LogicalOperator, ConditionNode)] {
        &self.children
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// # Brief
    /// 对记录求值;空条件树恒为 true
    ///
    /// # Arguments
    /// * `record` - 当前行
    /// * `mode` - 字段解析模式
    ///
    /// # Returns
    /// 按从左到右三值折叠的结果;任一子节点出错则整体出错
    pub fn evaluate(&self, record: &Record, mode: Resolution) -> QueryResult<bool> {
        let mut acc: Option<bool> = None;
        for (op, node) in &self.children {
            let value = node.evaluate(record, mode)?;
            acc = Some(op.fold(acc, value));
        }
        Ok(acc.unwrap_or(true))
    }
}

/// 根节点不加括号,子分组加括号
impl fmt::Display for ConditionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (op, node)) in self.children.iter().enumerate() {
            if i > 0 {
                write!(f, " {} ", op)?;
            }
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Frame {
    op: LogicalOperator,
    children: Vec<(LogicalOperator, ConditionNode)>,
    run: Vec<(LogicalOperator, ConditionNode)>,
}

impl Frame {
    fn new(op: LogicalOperator) -> Self {
        Self {
            op,
            children: Vec::new(),
            run: Vec::new(),
        }
    }

    /// 将当前累积段落入 children:单个节点直接挂载,多个节点包成分组并以首节点的逻辑操作符标记
    fn flush(&mut self) {
        let mut run = std::mem::take(&mut self.run);
        match run.len() {
            0 => {}
            1 => self.children.append(&mut run),
            _ => {
                let tag = run[0].0;
                self.children
                    .push((tag, ConditionNode::Group(ConditionGroup { children: run })));
            }
        }
    }

    fn finish(mut self) -> ConditionGroup {
        self.flush();
        if self.children.len() == 1 {
            if let ConditionNode::Group(_) = &self.children[0].1 {
                if let Some((_, ConditionNode::Group(inner))) = self.children.pop() {
                    return inner;
                }
            }
        }
        ConditionGroup {
            children: self.children,
        }
    }
}

/// 条件树构建器
///
/// 分组模式(默认开启)下,遇到 OR / XOR 时把之前累积的 AND 段落入树中,
/// 多于一个节点的段会包成带括号的分组,从而得到 `a OR (b AND c)` 的结构;
/// 关闭分组模式时所有节点平铺为一条链。
#[derive(Debug, Clone)]
pub(crate) struct ConditionBuilder {
    grouping: bool,
    frames: Vec<Frame>,
}

impl ConditionBuilder {
    pub(crate) fn new(grouping: bool) -> Self {
        Self {
            grouping,
            frames: vec![Frame::new(LogicalOperator::And)],
        }
    }

    pub(crate) fn set_grouping(&mut self, grouping: bool) {
        self.grouping = grouping;
    }

    fn top(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub(crate) fn push(&mut self, op: LogicalOperator, node: ConditionNode) {
        let grouping = self.grouping;
        let frame = self.top();
        if !grouping {
            frame.children.push((op, node));
            return;
        }
        if !frame.run.is_empty() && op != LogicalOperator::And {
            frame.flush();
        }
        frame.run.push((op, node));
    }

    pub(crate) fn open_group(&mut self, op: LogicalOperator) {
        self.frames.push(Frame::new(op));
    }

    pub(crate) fn close_group(&mut self) -> QueryResult<()> {
        if self.frames.len() <= 1 {
            return Err(QueryError::Build("end_group() without an open group".to_string()));
        }
        if let Some(frame) = self.frames.pop() {
            let op = frame.op;
            let group = frame.finish();
            if !group.is_empty() {
                self.push(op, ConditionNode::Group(group));
            }
        }
        Ok(())
    }

    pub(crate) fn open_groups(&self) -> usize {
        self.frames.len() - 1
    }

    /// # Brief
    /// 生成当前条件树的快照,不影响后续追加
    pub(crate) fn snapshot(&self) -> QueryResult<ConditionGroup> {
        if self.open_groups() > 0 {
            return Err(QueryError::Build(format!(
                "{} condition group(s) not closed",
                self.open_groups()
            )));
        }
        let root = &self.frames[0];
        let frame = Frame {
            op: root.op,
            children: root.children.clone(),
            run: root.run.clone(),
        };
        Ok(frame.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiquela_value::{record, value};
    use proptest::prelude::*;

    fn pred(field: &str, op: Operator, operand: Value) -> ConditionNode {
        ConditionNode::Predicate(Predicate::parse(field, op, operand).unwrap())
    }

    #[test]
    fn test_empty_tree_is_true() {
        let rec = record! { "a": 1 };
        assert!(ConditionGroup::new().evaluate(&rec, Resolution::Strict).unwrap());
    }

    #[test]
    fn test_operators() {
        let rec = record! { "n": 5, "s": "Hello World", "tags": ["x", "y"], "none": null };
        let check = |field: &str, op: Operator, v: Value| {
            Predicate::parse(field, op, v).unwrap().evaluate(&rec, Resolution::Lenient).unwrap()
        };

        assert!(check("n", Operator::Equal, value!("5")));
        assert!(!check("n", Operator::EqualStrict, value!("5")));
        assert!(check("n", Operator::NotEqualStrict, value!("5")));
        assert!(check("n", Operator::GreaterThanOrEqual, value!(5)));
        assert!(!check("none", Operator::LessThan, value!(1)));
        assert!(!check("none", Operator::GreaterThanOrEqual, value!(1)));
        assert!(check("n", Operator::In, value!([1, 5])));
        assert!(check("n", Operator::NotIn, value!([1, 2])));
        assert!(check("s", Operator::Like, value!("Hello%")));
        assert!(!check("s", Operator::Like, value!("hello%")));
        assert!(check("s", Operator::Like, value!("H_llo W%d")));
        assert!(check("s", Operator::NotLike, value!("%xyz%")));
        assert!(check("s", Operator::Contains, value!("o W")));
        assert!(check("tags", Operator::Contains, value!("y")));
        assert!(check("s", Operator::StartsWith, value!("Hell")));
        assert!(check("s", Operator::EndsWith, value!("World")));
        assert!(check("none", Operator::Is, value!(null)));
        assert!(check("missing", Operator::Is, value!(null)));
        assert!(check("n", Operator::Is, value!("NUMBER")));
        assert!(check("n", Operator::IsNot, value!("string")));
        assert!(check("tags", Operator::Is, value!("array")));
    }

    #[test]
    fn test_like_escapes_regex_metacharacters() {
        let rec = record! { "file": "a.b(c)" };
        let p = Predicate::parse("file", Operator::Like, "a.b(%)").unwrap();
        assert!(p.evaluate(&rec, Resolution::Lenient).unwrap());
        let p = Predicate::parse("file", Operator::Like, "a?b%").unwrap();
        assert!(!p.evaluate(&rec, Resolution::Lenient).unwrap());
    }

    #[test]
    fn test_strict_resolution_errors() {
        let rec = record! { "a": 1 };
        let p = Predicate::parse("total", Operator::GreaterThan, 1).unwrap();
        assert!(matches!(
            p.evaluate(&rec, Resolution::Strict),
            Err(QueryError::FieldNotFound(ref f)) if f == "total"
        ));
        assert!(!p.evaluate(&rec, Resolution::Lenient).unwrap());
    }

    #[test]
    fn test_xor_chain_folds_left_to_right() {
        let rec = record! { "a": 1, "b": 1, "c": 1 };
        let mut group = ConditionGroup::new();
        group.push(LogicalOperator::And, pred("a", Operator::Equal, value!(1)));
        group.push(LogicalOperator::Xor, pred("b", Operator::Equal, value!(1)));
        group.push(LogicalOperator::Xor, pred("c", Operator::Equal, value!(1)));
        // (true ^ true) ^ true
        assert!(group.evaluate(&rec, Resolution::Lenient).unwrap());
    }

    #[test]
    fn test_grouping_flush_on_or() {
        let mut b = ConditionBuilder::new(true);
        b.push(LogicalOperator::And, pred("a", Operator::Equal, value!(1)));
        b.push(LogicalOperator::Or, pred("b", Operator::Equal, value!(2)));
        b.push(LogicalOperator::And, pred("c", Operator::Equal, value!(3)));
        let tree = b.snapshot().unwrap();
        assert_eq!(tree.to_string(), "a = 1 OR (b = 2 AND c = 3)");

        let mut b = ConditionBuilder::new(true);
        b.push(LogicalOperator::And, pred("a", Operator::Equal, value!(1)));
        b.push(LogicalOperator::And, pred("b", Operator::Equal, value!(2)));
        b.push(LogicalOperator::Or, pred("c", Operator::Equal, value!(3)));
        assert_eq!(b.snapshot().unwrap().to_string(), "(a = 1 AND b = 2) OR c = 3");
    }

    #[test]
    fn test_grouping_plain_chains_stay_flat() {
        let mut b = ConditionBuilder::new(true);
        b.push(LogicalOperator::And, pred("a", Operator::Equal, value!(1)));
        b.push(LogicalOperator::And, pred("b", Operator::Equal, value!(2)));
        let tree = b.snapshot().unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.to_string(), "a = 1 AND b = 2");
    }

    #[test]
    fn test_grouping_disabled_is_flat() {
        let mut b = ConditionBuilder::new(false);
        b.push(LogicalOperator::And, pred("a", Operator::Equal, value!(1)));
        b.push(LogicalOperator::Or, pred("b", Operator::Equal, value!(2)));
        b.push(LogicalOperator::And, pred("c", Operator::Equal, value!(3)));
        let tree = b.snapshot().unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.to_string(), "a = 1 OR b = 2 AND c = 3");

        // ((a OR b) AND c) with a = 1 matching and c not matching
        let rec = record! { "a": 1, "b": 0, "c": 0 };
        assert!(!tree.evaluate(&rec, Resolution::Lenient).unwrap());
    }

    #[test]
    fn test_explicit_groups() {
        let mut b = ConditionBuilder::new(true);
        b.push(LogicalOperator::And, pred("a", Operator::Equal, value!(1)));
        b.open_group(LogicalOperator::And);
        b.push(LogicalOperator::And, pred("b", Operator::Equal, value!(2)));
        b.push(LogicalOperator::Or, pred("c", Operator::Equal, value!(3)));
        assert!(b.snapshot().is_err());
        b.close_group().unwrap();
        assert_eq!(b.snapshot().unwrap().to_string(), "a = 1 AND (b = 2 OR c = 3)");
        assert!(b.close_group().is_err());
    }

    proptest! {
        #[test]
        fn prop_in_and_not_in_are_complementary(
            n in -5i64..5,
            list in proptest::collection::vec(-5i64..5, 0..6),
        ) {
            let rec = record! { "n": n };
            let operand = Value::from(list);
            let inside = Predicate::parse("n", Operator::In, operand.clone()).unwrap()
                .evaluate(&rec, Resolution::Lenient).unwrap();
            let outside = Predicate::parse("n", Operator::NotIn, operand).unwrap()
                .evaluate(&rec, Resolution::Lenient).unwrap();
            prop_assert_ne!(inside, outside);
        }

        #[test]
        fn prop_empty_tree_accepts_any_record(key in "[a-z]{1,8}", n in any::<i64>()) {
            let mut rec = Record::new();
            rec.insert(key, n);
            prop_assert!(ConditionGroup::new().evaluate(&rec, Resolution::Strict).unwrap());
        }
    }
}
