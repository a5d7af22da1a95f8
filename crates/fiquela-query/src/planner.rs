//! 执行计划模块
//!
//! 按固定顺序把查询状态展开为计划树,不做代价估算也不调整顺序:
//! Scan → Join → Filter → Project / HashAggregate → Having → Distinct → Sort → Paginate
//!
//! 只有实际存在的阶段才会出现在计划中。

use crate::condition::ConditionGroup;
use crate::source::Locator;
use crate::state::{JoinSpec, OrderKey, QueryState, SelectedField};
use fiquela_value::FieldPath;
use std::fmt;

/// 执行计划节点
#[derive(Debug, Clone)]
pub enum PlanNode {
    /// 扫描数据源,None 表示整个数据源
    Scan { locator: Option<Locator> },
    /// 等值连接:右侧物化为哈希表后逐行探测
    HashJoin { input: Box<PlanNode>, join: JoinSpec },
    /// 非等值连接:右侧物化后逐对比较
    NestedLoopJoin { input: Box<PlanNode>, join: JoinSpec },
    /// WHERE 过滤,字段宽松解析
    Filter {
        input: Box<PlanNode>,
        condition: ConditionGroup,
    },
    /// 逐行投影
    Project {
        input: Box<PlanNode>,
        select_all: bool,
        fields: Vec<SelectedField>,
    },
    /// 哈希分组聚合,阻塞到输入耗尽
    HashAggregate {
        input: Box<PlanNode>,
        select_all: bool,
        fields: Vec<SelectedField>,
        group_by: Vec<FieldPath>,
    },
    /// HAVING 过滤,字段严格解析
    Having {
        input: Box<PlanNode>,
        condition: ConditionGroup,
    },
    Distinct { input: Box<PlanNode> },
    /// 排序,阻塞到输入耗尽
    Sort {
        input: Box<PlanNode>,
        keys: Vec<OrderKey>,
        seed: Option<u64>,
    },
    Paginate {
        input: Box<PlanNode>,
        offset: usize,
        limit: Option<usize>,
    },
}

impl PlanNode {
    pub fn input(&self) -> Option<&PlanNode> {
        match self {
            PlanNode::Scan { .. } => None,
            PlanNode::HashJoin { input, .. }
            | PlanNode::NestedLoopJoin { input, .. }
            | PlanNode::Filter { input, .. }
            | PlanNode::Project { input, .. }
            | PlanNode::HashAggregate { input, .. }
            | PlanNode::Having { input, .. }
            | PlanNode::Distinct { input }
            | PlanNode::Sort { input, .. }
            | PlanNode::Paginate { input, .. } => Some(input),
        }
    }

    /// 节点名称,用于 EXPLAIN 与测试
    pub fn name(&self) -> &'static str {
        match self {
            PlanNode::Scan { .. } => "Scan",
            PlanNode::HashJoin { .. } => "HashJoin",
            PlanNode::NestedLoopJoin { .. } => "NestedLoopJoin",
            PlanNode::Filter { .. } => "Filter",
            PlanNode::Project { .. } => "Project",
            PlanNode::HashAggregate { .. } => "HashAggregate",
            PlanNode::Having { .. } => "Having",
            PlanNode::Distinct { .. } => "Distinct",
            PlanNode::Sort { .. } => "Sort",
            PlanNode::Paginate { .. } => "Paginate",
        }
    }

    fn format(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let prefix = "  ".repeat(indent);
        match self {
            PlanNode::Scan { locator } => match locator {
                Some(locator) => writeln!(f, "{}Scan({})", prefix, locator)?,
                None => writeln!(f, "{}Scan(*)", prefix)?,
            },
            PlanNode::HashJoin { join, .. } | PlanNode::NestedLoopJoin { join, .. } => {
                write!(
                    f,
                    "{}{}({}, {} {} {}",
                    prefix,
                    self.name(),
                    join.kind,
                    join.left_key,
                    join.operator,
                    join.right_key
                )?;
                if let Some(alias) = &join.alias {
                    write!(f, ", alias={}", alias)?;
                }
                writeln!(f, ")")?;
                writeln!(f, "{}  Build:", prefix)?;
                QueryPlan::from_state(&join.right).root.format(f, indent + 2)?;
            }
            PlanNode::Filter { condition, .. } | PlanNode::Having { condition, .. } => {
                writeln!(f, "{}{}({})", prefix, self.name(), condition)?;
            }
            PlanNode::Project {
                select_all, fields, ..
            } => {
                writeln!(f, "{}Project({})", prefix, field_list(*select_all, fields))?;
            }
            PlanNode::HashAggregate {
                select_all,
                fields,
                group_by,
                ..
            } => {
                let keys: Vec<String> = group_by.iter().map(|p| p.to_string()).collect();
                writeln!(
                    f,
                    "{}HashAggregate({}; group by [{}])",
                    prefix,
                    field_list(*select_all, fields),
                    keys.join(", ")
                )?;
            }
            PlanNode::Distinct { .. } => writeln!(f, "{}Distinct", prefix)?,
            PlanNode::Sort { keys, .. } => {
                let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                writeln!(f, "{}Sort({})", prefix, keys.join(", "))?;
            }
            PlanNode::Paginate { offset, limit, .. } => match limit {
                Some(limit) => writeln!(f, "{}Paginate(offset={}, limit={})", prefix, offset, limit)?,
                None => writeln!(f, "{}Paginate(offset={})", prefix, offset)?,
            },
        }
        match self.input() {
            Some(input) => input.format(f, indent + 1),
            None => Ok(()),
        }
    }
}

fn field_list(select_all: bool, fields: &[SelectedField]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(fields.len() + 1);
    if select_all || fields.is_empty() {
        parts.push("*".to_string());
    }
    parts.extend(fields.iter().map(|f| f.to_string()));
    parts.join(", ")
}

/// 查询执行计划
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub root: PlanNode,
}

impl QueryPlan {
    /// # Brief
    /// 按固定顺序生成计划
    ///
    /// # Arguments
    /// * `state` - 查询状态快照
    pub fn from_state(state: &QueryState) -> Self {
        let mut node = PlanNode::Scan {
            locator: state.locator.clone(),
        };

        for join in &state.joins {
            node = if join.is_equi() {
                PlanNode::HashJoin {
                    input: Box::new(node),
                    join: join.clone(),
                }
            } else {
                PlanNode::NestedLoopJoin {
                    input: Box::new(node),
                    join: join.clone(),
                }
            };
        }

        if !state.where_.is_empty() {
            node = PlanNode::Filter {
                input: Box::new(node),
                condition: state.where_.clone(),
            };
        }

        node = if state.has_aggregation() {
            PlanNode::HashAggregate {
                input: Box::new(node),
                select_all: state.select_all,
                fields: state.fields.clone(),
                group_by: state.group_by.clone(),
            }
        } else {
            PlanNode::Project {
                input: Box::new(node),
                select_all: state.select_all,
                fields: state.fields.clone(),
            }
        };

        if !state.having.is_empty() {
            node = PlanNode::Having {
                input: Box::new(node),
                condition: state.having.clone(),
            };
        }

        if state.distinct {
            node = PlanNode::Distinct {
                input: Box::new(node),
            };
        }

        if !state.order_by.is_empty() {
            node = PlanNode::Sort {
                input: Box::new(node),
                keys: state.order_by.clone(),
                seed: state.config.shuffle_seed,
            };
        }

        if state.offset.is_some() || state.limit.is_some() {
            node = PlanNode::Paginate {
                input: Box::new(node),
                offset: state.offset.unwrap_or(0),
                limit: state.limit,
            };
        }

        tracing::debug!(root = node.name(), "plan built");
        Self { root: node }
    }

    /// 从根到扫描的阶段名称
    pub fn stages(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut node = Some(&self.root);
        while let Some(n) = node {
            names.push(n.name());
            node = n.input();
        }
        names
    }

    /// 连接或排序需要先看到全部输入
    pub fn requires_materialization(&self) -> bool {
        self.stages()
            .iter()
            .any(|s| matches!(*s, "HashJoin" | "NestedLoopJoin" | "Sort"))
    }

    pub fn has_aggregation(&self) -> bool {
        self.stages().contains(&"HashAggregate")
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.format(f, 0)
    }
}
