//! 查询构建器模块
//!
//! 流式 API 与 DSL 解析器共用同一个 `Query`,每个子句对应一个修改方法。
//!
//! # 示例
//!
//! ```rust,ignore
//! use fiquela_query::{MemorySource, Operator, Query};
//!
//! let mut query = Query::new();
//! query
//!     .select("id, name")?
//!     .from("users")
//!     .where_("age", Operator::GreaterThanOrEqual, 18)?
//!     .or("vip", Operator::Equal, true)?
//!     .order_by("name")?
//!     .limit(10);
//! let rows = query.execute(&source)?.fetch_all(None)?;
//! ```

use crate::condition::{ConditionBuilder, ConditionNode, LogicalOperator, Operator, Predicate};
use crate::executor;
use crate::functions::{FunctionArg, FunctionCall, FunctionKind};
use crate::parser::Parser;
use crate::planner::QueryPlan;
use crate::result::{MaterializedResult, Results, StreamResult};
use crate::source::{Locator, RecordSource};
use crate::state::{Direction, JoinKind, JoinSpec, OrderKey, QueryState, SelectedField};
use crate::{QueryError, QueryResult};
use fiquela_common::QueryConfig;
use fiquela_value::{FieldPath, Value};
use std::fmt;
use tracing::debug;

/// 条件追加到 WHERE 还是 HAVING
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConditionContext {
    Where,
    Having,
}

/// 已注册但尚未绑定 ON 的连接
#[derive(Debug, Clone)]
struct PendingJoin {
    kind: JoinKind,
    right: QueryState,
    alias: Option<String>,
}

fn build_error(message: impl Into<String>) -> QueryError {
    QueryError::Build(message.into())
}

/// 查询构建器
#[derive(Debug, Clone)]
pub struct Query {
    config: QueryConfig,
    select_all: bool,
    fields: Vec<SelectedField>,
    /// 最后一次 select 产生的字段是否还能起别名
    aliasable: bool,
    distinct: bool,
    locator: Option<Locator>,
    joins: Vec<JoinSpec>,
    pending_join: Option<PendingJoin>,
    where_: ConditionBuilder,
    having: ConditionBuilder,
    context: ConditionContext,
    group_by: Vec<FieldPath>,
    order_by: Vec<OrderKey>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Default for Query {
    fn default() -> Self {
        Self::with_config(&QueryConfig::default())
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &QueryConfig) -> Self {
        Self {
            config: config.clone(),
            select_all: false,
            fields: Vec::new(),
            aliasable: false,
            distinct: false,
            locator: None,
            joins: Vec::new(),
            pending_join: None,
            where_: ConditionBuilder::new(config.grouping),
            having: ConditionBuilder::new(config.grouping),
            context: ConditionContext::Where,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// 从 DSL 文本构建
    pub fn parse(text: &str) -> QueryResult<Self> {
        Parser::parse(text)
    }

    /// 开关分组模式,只影响之后追加的条件
    pub fn grouping(&mut self, enabled: bool) -> &mut Self {
        self.config.grouping = enabled;
        self.where_.set_grouping(enabled);
        self.having.set_grouping(enabled);
        self
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    // ========== 投影 ==========

    /// # Brief
    /// 追加投影字段,逗号分隔
    ///
    /// # Arguments
    /// * `fields` - 如 `"id, user.name"`;`*` 等价于 `select_all()`
    ///
    /// # Returns
    /// 字段路径不合法或输出名重复时返回 Build 错误
    pub fn select(&mut self, fields: &str) -> QueryResult<&mut Self> {
        for field in fields.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            if field == "*" {
                self.select_all();
                continue;
            }
            self.check_join_alias(field)?;
            let path = FieldPath::parse(field)?;
            self.add_field(SelectedField::field(path))?;
        }
        Ok(self)
    }

    /// `SELECT *`:清空已选字段,输出原始记录
    pub fn select_all(&mut self) -> &mut Self {
        self.fields.clear();
        self.select_all = true;
        self.aliasable = false;
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.distinct = true;
        self
    }

    /// 追加函数字段
    pub fn select_function(&mut self, call: FunctionCall) -> QueryResult<&mut Self> {
        self.add_field(SelectedField::call(call))?;
        Ok(self)
    }

    fn add_field(&mut self, field: SelectedField) -> QueryResult<()> {
        if self.fields.iter().any(|f| f.name() == field.name()) {
            return Err(build_error(format!("Field {} is already selected", field.name())));
        }
        debug!(field = field.name(), "select");
        self.fields.push(field);
        self.aliasable = true;
        Ok(())
    }

    /// # Brief
    /// 为最后一次选择的字段起别名(DSL 中的 `AS`)
    ///
    /// # Returns
    /// 别名为空、没有待命名字段、字段已有别名、别名与已有字段冲突时返回 Build 错误
    pub fn alias(&mut self, name: &str) -> QueryResult<&mut Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(build_error("Alias cannot be empty"));
        }
        let last = match self.fields.last() {
            Some(last) if self.aliasable => last,
            Some(last) if last.is_alias() => {
                return Err(build_error(format!("Field {} is already aliased", last.origin())))
            }
            _ => return Err(build_error("alias() must follow select()")),
        };
        if last.name() != name && self.fields.iter().any(|f| f.name() == name) {
            return Err(build_error(format!("Alias {} collides with a selected field", name)));
        }
        if let Some(last) = self.fields.last_mut() {
            last.set_alias(name);
        }
        self.aliasable = false;
        Ok(self)
    }

    fn select_call(&mut self, kind: FunctionKind, args: Vec<FunctionArg>) -> QueryResult<&mut Self> {
        self.select_function(FunctionCall::new(kind, args)?)
    }

    /// `COUNT(field)`,`"*"` 统计行数
    pub fn count(&mut self, field: &str) -> QueryResult<&mut Self> {
        let arg = if field.trim() == "*" {
            FunctionArg::Star
        } else {
            FunctionArg::field(field)?
        };
        self.select_call(FunctionKind::Count, vec![arg])
    }

    pub fn sum(&mut self, field: &str) -> QueryResult<&mut Self> {
        self.select_call(FunctionKind::Sum, vec![FunctionArg::field(field)?])
    }

    pub fn avg(&mut self, field: &str) -> QueryResult<&mut Self> {
        self.select_call(FunctionKind::Avg, vec![FunctionArg::field(field)?])
    }

    pub fn min(&mut self, field: &str) -> QueryResult<&mut Self> {
        self.select_call(FunctionKind::Min, vec![FunctionArg::field(field)?])
    }

    pub fn max(&mut self, field: &str) -> QueryResult<&mut Self> {
        self.select_call(FunctionKind::Max, vec![FunctionArg::field(field)?])
    }

    pub fn group_concat(&mut self, field: &str, separator: &str) -> QueryResult<&mut Self> {
        self.select_call(
            FunctionKind::GroupConcat,
            vec![FunctionArg::field(field)?, FunctionArg::literal(separator)],
        )
    }

    pub fn upper(&mut self, field: &str) -> QueryResult<&mut Self> {
        self.select_call(FunctionKind::Upper, vec![FunctionArg::field(field)?])
    }

    pub fn lower(&mut self, field: &str) -> QueryResult<&mut Self> {
        self.select_call(FunctionKind::Lower, vec![FunctionArg::field(field)?])
    }

    pub fn concat(&mut self, fields: &[&str]) -> QueryResult<&mut Self> {
        let args = fields
            .iter()
            .map(|f| FunctionArg::field(f))
            .collect::<QueryResult<Vec<_>>>()?;
        self.select_call(FunctionKind::Concat, args)
    }

    pub fn round(&mut self, field: &str, precision: i64) -> QueryResult<&mut Self> {
        self.select_call(
            FunctionKind::Round,
            vec![FunctionArg::field(field)?, FunctionArg::literal(precision)],
        )
    }

    pub fn coalesce(&mut self, fields: &[&str]) -> QueryResult<&mut Self> {
        let args = fields
            .iter()
            .map(|f| FunctionArg::field(f))
            .collect::<QueryResult<Vec<_>>>()?;
        self.select_call(FunctionKind::Coalesce, args)
    }

    // ========== 数据源 ==========

    /// `FROM` 定位符,见 `Locator::parse`
    pub fn from(&mut self, locator: &str) -> &mut Self {
        let locator = Locator::parse(locator);
        self.locator = if locator.is_all() { None } else { Some(locator) };
        self
    }

    // ========== 条件 ==========

    fn conditions(&mut self) -> &mut ConditionBuilder {
        match self.context {
            ConditionContext::Where => &mut self.where_,
            ConditionContext::Having => &mut self.having,
        }
    }

    pub(crate) fn set_context(&mut self, context: ConditionContext) {
        self.context = context;
    }

    pub(crate) fn push_predicate(&mut self, op: LogicalOperator, predicate: Predicate) -> QueryResult<()> {
        self.check_join_alias(predicate.field().as_str())?;
        self.conditions().push(op, ConditionNode::Predicate(predicate));
        Ok(())
    }

    pub(crate) fn open_group(&mut self, op: LogicalOperator) {
        self.conditions().open_group(op);
    }

    pub(crate) fn close_group(&mut self) -> QueryResult<()> {
        self.conditions().close_group()
    }

    fn condition(
        &mut self,
        op: LogicalOperator,
        field: &str,
        operator: Operator,
        value: Value,
    ) -> QueryResult<&mut Self> {
        let predicate = Predicate::parse(field, operator, value)?;
        self.push_predicate(op, predicate)?;
        Ok(self)
    }

    /// # Brief
    /// 开始 WHERE 条件,之后的 and / or / xor 追加到 WHERE
    ///
    /// # Arguments
    /// * `field` - 字段路径
    /// * `operator` - 比较操作符
    /// * `value` - 操作数,IN / NOT IN 传数组
    pub fn where_(
        &mut self,
        field: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> QueryResult<&mut Self> {
        self.context = ConditionContext::Where;
        self.condition(LogicalOperator::And, field, operator, value.into())
    }

    /// 开始 HAVING 条件,之后的 and / or / xor 追加到 HAVING
    pub fn having(
        &mut self,
        field: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> QueryResult<&mut Self> {
        self.context = ConditionContext::Having;
        self.condition(LogicalOperator::And, field, operator, value.into())
    }

    pub fn and(&mut self, field: &str, operator: Operator, value: impl Into<Value>) -> QueryResult<&mut Self> {
        self.condition(LogicalOperator::And, field, operator, value.into())
    }

    pub fn or(&mut self, field: &str, operator: Operator, value: impl Into<Value>) -> QueryResult<&mut Self> {
        self.condition(LogicalOperator::Or, field, operator, value.into())
    }

    pub fn xor(&mut self, field: &str, operator: Operator, value: impl Into<Value>) -> QueryResult<&mut Self> {
        self.condition(LogicalOperator::Xor, field, operator, value.into())
    }

    /// 打开以 AND 连接的括号分组
    pub fn and_group(&mut self) -> &mut Self {
        self.open_group(LogicalOperator::And);
        self
    }

    pub fn or_group(&mut self) -> &mut Self {
        self.open_group(LogicalOperator::Or);
        self
    }

    pub fn xor_group(&mut self) -> &mut Self {
        self.open_group(LogicalOperator::Xor);
        self
    }

    pub fn end_group(&mut self) -> QueryResult<&mut Self> {
        self.close_group()?;
        Ok(self)
    }

    // ========== 连接 ==========

    /// # Brief
    /// 注册连接,必须紧接着调用 `on()`
    ///
    /// # Arguments
    /// * `kind` - 连接类型
    /// * `right` - 右侧查询,针对同一数据源执行
    /// * `alias` - 右侧记录嵌套在该键下;为 None 时右侧字段直接合并进左侧行,同名覆盖
    pub fn join(&mut self, kind: JoinKind, right: &Query, alias: Option<&str>) -> QueryResult<&mut Self> {
        if let Some(pending) = &self.pending_join {
            return Err(build_error(format!(
                "{} JOIN registered without on()",
                pending.kind
            )));
        }
        let alias = match alias.map(str::trim) {
            Some("") => return Err(build_error("Join alias cannot be empty")),
            other => other.map(str::to_string),
        };
        self.pending_join = Some(PendingJoin {
            kind,
            right: right.build()?,
            alias,
        });
        Ok(self)
    }

    pub fn inner_join(&mut self, right: &Query, alias: Option<&str>) -> QueryResult<&mut Self> {
        self.join(JoinKind::Inner, right, alias)
    }

    pub fn left_join(&mut self, right: &Query, alias: Option<&str>) -> QueryResult<&mut Self> {
        self.join(JoinKind::Left, right, alias)
    }

    pub fn right_join(&mut self, right: &Query, alias: Option<&str>) -> QueryResult<&mut Self> {
        self.join(JoinKind::Right, right, alias)
    }

    pub fn full_join(&mut self, right: &Query, alias: Option<&str>) -> QueryResult<&mut Self> {
        self.join(JoinKind::Full, right, alias)
    }

    /// # Brief
    /// 绑定连接条件 `left_key op right_key`
    ///
    /// # Returns
    /// 没有待绑定的连接时返回 Build 错误
    pub fn on(&mut self, left_key: &str, operator: Operator, right_key: &str) -> QueryResult<&mut Self> {
        let pending = self
            .pending_join
            .take()
            .ok_or_else(|| build_error("on() without a pending join"))?;
        let spec = JoinSpec {
            kind: pending.kind,
            right: Box::new(pending.right),
            alias: pending.alias,
            left_key: FieldPath::parse(left_key)?,
            operator,
            right_key: FieldPath::parse(right_key)?,
        };
        debug!(join = %spec.kind, alias = ?spec.alias, "join bound");
        self.joins.push(spec);
        Ok(self)
    }

    /// 连接别名在 ON 绑定前不可引用
    fn check_join_alias(&self, field: &str) -> QueryResult<()> {
        if let Some(PendingJoin { alias: Some(alias), .. }) = &self.pending_join {
            let referenced = field == alias
                || field
                    .strip_prefix(alias.as_str())
                    .map(|rest| rest.starts_with('.') || rest.starts_with("[]"))
                    .unwrap_or(false);
            if referenced {
                return Err(build_error(format!(
                    "Join alias {} referenced before on()",
                    alias
                )));
            }
        }
        Ok(())
    }

    // ========== 分组、排序、分页 ==========

    pub fn group_by(&mut self, fields: &str) -> QueryResult<&mut Self> {
        for field in fields.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            self.check_join_alias(field)?;
            self.group_by.push(FieldPath::parse(field)?);
        }
        Ok(self)
    }

    /// 追加升序排序键
    pub fn order_by(&mut self, field: &str) -> QueryResult<&mut Self> {
        self.order_by_dir(field, Direction::Asc)
    }

    pub fn order_by_dir(&mut self, field: &str, direction: Direction) -> QueryResult<&mut Self> {
        self.check_join_alias(field)?;
        self.order_by.push(OrderKey {
            field: FieldPath::parse(field)?,
            direction,
        });
        Ok(self)
    }

    fn set_direction(&mut self, direction: Direction) -> QueryResult<&mut Self> {
        match self.order_by.last_mut() {
            Some(key) => {
                key.direction = direction;
                Ok(self)
            }
            None => Err(build_error(format!("{} without order_by()", direction))),
        }
    }

    pub fn asc(&mut self) -> QueryResult<&mut Self> {
        self.set_direction(Direction::Asc)
    }

    pub fn desc(&mut self) -> QueryResult<&mut Self> {
        self.set_direction(Direction::Desc)
    }

    pub fn natural(&mut self) -> QueryResult<&mut Self> {
        self.set_direction(Direction::Natural)
    }

    pub fn shuffle(&mut self) -> QueryResult<&mut Self> {
        self.set_direction(Direction::Shuffle)
    }

    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: usize) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// # Brief
    /// 按页取数,页码从 1 开始
    ///
    /// # Arguments
    /// * `page` - 页码
    /// * `per_page` - 每页行数
    pub fn page(&mut self, page: usize, per_page: usize) -> QueryResult<&mut Self> {
        if page == 0 {
            return Err(build_error("Page numbers start at 1"));
        }
        self.offset = Some((page - 1).saturating_mul(per_page));
        self.limit = Some(per_page);
        Ok(self)
    }

    // ========== 完成 ==========

    /// # Brief
    /// 生成不可变快照
    ///
    /// # Returns
    /// 存在未绑定 ON 的连接或未闭合的条件分组时返回 Build 错误
    pub fn build(&self) -> QueryResult<QueryState> {
        if let Some(pending) = &self.pending_join {
            return Err(build_error(format!(
                "{} JOIN registered without on()",
                pending.kind
            )));
        }
        Ok(QueryState {
            select_all: self.select_all,
            fields: self.fields.clone(),
            distinct: self.distinct,
            locator: self.locator.clone(),
            joins: self.joins.clone(),
            where_: self.where_.snapshot()?,
            having: self.having.snapshot()?,
            group_by: self.group_by.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit,
            offset: self.offset,
            config: self.config.clone(),
        })
    }

    /// 规范化的 DSL 文本
    pub fn test(&self) -> QueryResult<String> {
        Ok(self.build()?.to_string())
    }

    /// 执行计划文本
    pub fn explain(&self) -> QueryResult<String> {
        Ok(QueryPlan::from_state(&self.build()?).to_string())
    }

    /// # Brief
    /// 针对数据源执行查询
    ///
    /// # Arguments
    /// * `source` - 记录来源
    ///
    /// # Returns
    /// 含连接或排序时返回物化结果,否则返回流式结果
    pub fn execute<'s>(&self, source: &'s dyn RecordSource) -> QueryResult<Results<'s>> {
        let state = self.build()?;
        let plan = QueryPlan::from_state(&state);
        let materialize = plan.requires_materialization();
        debug!(query = %state, materialize, "execute");
        let stream = executor::run(plan, source)?;
        let seed = state.config.shuffle_seed;
        if materialize {
            Ok(Results::Materialized(
                MaterializedResult::collect(stream)?.with_seed(seed),
            ))
        } else {
            Ok(Results::Stream(StreamResult::new(stream).with_seed(seed)))
        }
    }
}

/// 不完整的查询(未闭合的分组、缺少 ON 的连接)渲染为错误说明
impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.build() {
            Ok(state) => write!(f, "{}", state),
            Err(e) => write!(f, "<incomplete query: {}>", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySource;
    use fiquela_value::{record, value};

    #[test]
    fn test_alias_rules() {
        let mut q = Query::new();
        assert!(q.alias("x").is_err());
        q.select("a, b").unwrap().alias("bee").unwrap();
        assert!(matches!(q.alias("again"), Err(QueryError::Build(_))));
        q.select("c").unwrap();
        assert!(q.alias("a").is_err());
        assert!(q.alias("").is_err());
        q.alias("c").unwrap();
        assert_eq!(q.test().unwrap(), "SELECT a, b AS bee, c AS c");
    }

    #[test]
    fn test_duplicate_field() {
        let mut q = Query::new();
        assert!(q.select("a, a").is_err());
    }

    #[test]
    fn test_select_all_clears_fields() {
        let mut q = Query::new();
        q.select("a, b").unwrap().select_all();
        assert_eq!(q.test().unwrap(), "SELECT *");
    }

    #[test]
    fn test_grouping_mode() {
        let mut q = Query::new();
        q.select("name")
            .unwrap()
            .where_("a", Operator::Equal, 1)
            .unwrap()
            .or("b", Operator::Equal, 2)
            .unwrap()
            .and("c", Operator::Equal, 3)
            .unwrap();
        assert_eq!(q.test().unwrap(), "SELECT name WHERE a = 1 OR (b = 2 AND c = 3)");

        let mut flat = Query::new();
        flat.grouping(false)
            .where_("a", Operator::Equal, 1)
            .unwrap()
            .or("b", Operator::Equal, 2)
            .unwrap()
            .and("c", Operator::Equal, 3)
            .unwrap();
        assert_eq!(flat.test().unwrap(), "SELECT * WHERE a = 1 OR b = 2 AND c = 3");
    }

    #[test]
    fn test_explicit_groups() {
        let mut q = Query::new();
        q.where_("a", Operator::Equal, 1)
            .unwrap()
            .or_group()
            .where_("b", Operator::Equal, 2)
            .unwrap()
            .and("c", Operator::LessThan, 3)
            .unwrap()
            .end_group()
            .unwrap();
        assert_eq!(q.test().unwrap(), "SELECT * WHERE a = 1 OR (b = 2 AND c < 3)");

        let mut open = Query::new();
        open.and_group();
        assert!(open.build().is_err());
        assert!(Query::new().end_group().is_err());
    }

    #[test]
    fn test_join_requires_on() {
        let mut right = Query::new();
        right.from("orders");
        let mut q = Query::new();
        assert!(q.on("id", Operator::Equal, "uid").is_err());

        q.left_join(&right, Some("o")).unwrap();
        assert!(q.build().is_err());
        assert!(q.where_("o.total", Operator::GreaterThan, 1).is_err());
        assert!(q.inner_join(&right, Some("p")).is_err());

        q.on("id", Operator::Equal, "o.uid").unwrap();
        assert_eq!(
            q.test().unwrap(),
            "SELECT * LEFT JOIN (SELECT * FROM orders) AS o ON id = o.uid"
        );
    }

    #[test]
    fn test_join_alias_is_optional() {
        let mut right = Query::new();
        right.from("orders");

        let mut q = Query::new();
        assert!(q.left_join(&right, Some("  ")).is_err());

        q.left_join(&right, None).unwrap();
        q.where_("total", Operator::GreaterThan, 1).unwrap();
        q.on("id", Operator::Equal, "uid").unwrap();
        let state = q.build().unwrap();
        assert_eq!(state.joins[0].alias, None);
        assert_eq!(
            q.test().unwrap(),
            "SELECT * LEFT JOIN (SELECT * FROM orders) ON id = uid WHERE total > 1"
        );
    }

    #[test]
    fn test_order_and_paging() {
        let mut q = Query::new();
        assert!(q.desc().is_err());
        q.order_by("price").unwrap().desc().unwrap().order_by("name").unwrap();
        q.page(3, 10).unwrap();
        assert!(q.page(0, 10).is_err());
        assert_eq!(
            q.test().unwrap(),
            "SELECT * ORDER BY price DESC, name ASC OFFSET 20 LIMIT 10"
        );
    }

    #[test]
    fn test_shorthands() {
        let mut q = Query::new();
        q.select("dept")
            .unwrap()
            .count("*")
            .unwrap()
            .alias("n")
            .unwrap()
            .avg("salary")
            .unwrap()
            .group_by("dept")
            .unwrap();
        assert_eq!(q.test().unwrap(), "SELECT dept, COUNT(*) AS n, AVG(salary) GROUP BY dept");
        assert_eq!(q.to_string(), q.test().unwrap());
    }

    #[test]
    fn test_execute_streaming() {
        let source = MemorySource::new(vec![
            record! { "id": 1, "price": 100 },
            record! { "id": 2, "price": 200 },
        ]);
        let mut q = Query::new();
        q.select("id").unwrap().where_("price", Operator::GreaterThan, 150).unwrap();
        let results = q.execute(&source).unwrap();
        assert!(matches!(results, Results::Stream(_)));
        assert_eq!(results.fetch_all(None).unwrap(), vec![record! { "id": 2 }]);

        let mut in_list = Query::new();
        in_list.where_("id", Operator::In, value!([1, 3])).unwrap();
        assert_eq!(in_list.execute(&source).unwrap().count().unwrap(), 1);
    }

    #[test]
    fn test_execute_carries_shuffle_seed() {
        let source = MemorySource::new((0..30).map(|i| record! { "id": i }).collect());
        let q = Query::with_config(&fiquela_common::QueryConfig {
            shuffle_seed: Some(11),
            ..Default::default()
        });
        let shuffled = || {
            q.execute(&source)
                .unwrap()
                .freeze()
                .unwrap()
                .sorted("id", Direction::Shuffle)
                .unwrap()
                .into_rows()
        };
        let first = shuffled();
        assert_eq!(first.len(), 30);
        assert_eq!(first, shuffled());
    }
}
