//! 执行器模块
//!
//! 把计划树展开为迭代器链。大部分阶段是惰性的逐行变换,
//! 以下阶段会阻塞并在内存中缓存全部输入,内存占用与输入规模成正比:
//! - 连接:右侧查询结果全部物化并建立哈希表
//! - 分组聚合:所有分组保存到输入耗尽
//! - 排序:需要看到全部行才能输出第一行
//!
//! 逐行求值出错时,错误作为序列中的一项返回,不跳过也不重试。

use crate::condition::{ConditionGroup, Operator};
use crate::functions::Accumulator;
use crate::planner::{PlanNode, QueryPlan};
use crate::source::{RecordSource, RecordStream};
use crate::state::{Direction, JoinKind, JoinSpec, OrderKey, SelectedField};
use crate::QueryResult;
use fiquela_value::{FieldPath, Record, Resolution, Segment, Value};
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, trace};

/// # Brief
/// 执行计划
///
/// # Arguments
/// * `plan` - 查询计划
/// * `source` - 记录来源,连接的右侧查询也从这里读取
///
/// # Returns
/// 输出记录的惰性序列;数据源无法打开或连接右侧物化失败时直接返回错误
pub fn run<'s>(plan: QueryPlan, source: &'s dyn RecordSource) -> QueryResult<RecordStream<'s>> {
    build(plan.root, source)
}

fn build<'s>(node: PlanNode, source: &'s dyn RecordSource) -> QueryResult<RecordStream<'s>> {
    let stream: RecordStream<'s> = match node {
        PlanNode::Scan { locator } => {
            let locator = locator.unwrap_or_default();
            debug!(source = %source.describe(), locator = %locator, "scan");
            source.records(&locator)?
        }
        PlanNode::HashJoin { input, join } => {
            let left = build(*input, source)?;
            Box::new(JoinStream::new(left, JoinProbe::new(join, source, true)?))
        }
        PlanNode::NestedLoopJoin { input, join } => {
            let left = build(*input, source)?;
            Box::new(JoinStream::new(left, JoinProbe::new(join, source, false)?))
        }
        PlanNode::Filter { input, condition } => {
            filter(build(*input, source)?, condition, Resolution::Lenient)
        }
        PlanNode::Having { input, condition } => {
            filter(build(*input, source)?, condition, Resolution::Strict)
        }
        PlanNode::Project {
            input,
            select_all,
            fields,
        } => {
            let input = build(*input, source)?;
            Box::new(input.map(move |item| item.and_then(|raw| project(&raw, select_all, &fields))))
        }
        PlanNode::HashAggregate {
            input,
            select_all,
            fields,
            group_by,
        } => {
            let input = build(*input, source)?;
            blocking(move || aggregate(input, select_all, &fields, &group_by))
        }
        PlanNode::Distinct { input } => {
            let input = build(*input, source)?;
            let mut seen = HashSet::new();
            Box::new(input.filter(move |item| match item {
                Ok(row) => seen.insert(row.to_json()),
                Err(_) => true,
            }))
        }
        PlanNode::Sort { input, keys, seed } => {
            let input = build(*input, source)?;
            blocking(move || sort(input, &keys, seed))
        }
        PlanNode::Paginate {
            input,
            offset,
            limit,
        } => Box::new(Paginate {
            inner: build(*input, source)?,
            skip: offset,
            remaining: limit,
        }),
    };
    Ok(stream)
}

/// 阻塞阶段:第一次拉取时才计算全部结果
fn blocking<'s>(compute: impl FnOnce() -> QueryResult<Vec<Record>> + 's) -> RecordStream<'s> {
    Box::new(std::iter::once_with(compute).flat_map(
        |result| -> Box<dyn Iterator<Item = QueryResult<Record>>> {
            match result {
                Ok(rows) => Box::new(rows.into_iter().map(Ok)),
                Err(e) => Box::new(std::iter::once(Err(e))),
            }
        },
    ))
}

fn filter<'s>(input: RecordStream<'s>, condition: ConditionGroup, mode: Resolution) -> RecordStream<'s> {
    Box::new(input.filter_map(move |item| match item {
        Ok(row) => match condition.evaluate(&row, mode) {
            Ok(true) => Some(Ok(row)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        },
        Err(e) => Some(Err(e)),
    }))
}

// ========== 投影 ==========

/// # Brief
/// 计算一行的投影
///
/// 字段按选择顺序计算,函数参数可以引用前面已计算的别名
fn project(raw: &Record, select_all: bool, fields: &[SelectedField]) -> QueryResult<Record> {
    let mut row = if select_all {
        raw.clone()
    } else {
        Record::with_capacity(fields.len())
    };
    for field in fields {
        let value = field_value(field, raw, &row)?;
        row.insert(field.name(), value);
    }
    Ok(row)
}

fn field_value(field: &SelectedField, raw: &Record, row: &Record) -> QueryResult<Value> {
    match (field.function(), field.path()) {
        (Some(call), _) => call.invoke_row(raw, row),
        (None, Some(path)) => Ok(raw.lookup_path(path, Resolution::Lenient)?),
        (None, None) => Ok(Value::Null),
    }
}

// ========== 分组聚合 ==========

/// 分组键的一部分,NULL 用哨兵表示以便归为同一组
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart {
    Null,
    Value(String),
}

struct Bucket {
    first: Record,
    accumulators: Vec<Option<Accumulator>>,
}

impl Bucket {
    fn new(first: Record, fields: &[SelectedField]) -> Self {
        let accumulators = fields
            .iter()
            .map(|f| match f.function() {
                Some(call) if call.is_aggregate() => Some(call.accumulator()),
                _ => None,
            })
            .collect();
        Self { first, accumulators }
    }

    fn accumulate(&mut self, raw: &Record) -> QueryResult<()> {
        for acc in self.accumulators.iter_mut().flatten() {
            acc.accumulate(raw)?;
        }
        Ok(())
    }

    /// 以组内第一行为代表做投影,再用聚合结果覆盖聚合字段
    fn emit(self, select_all: bool, fields: &[SelectedField]) -> QueryResult<Record> {
        let mut row = if select_all {
            self.first.clone()
        } else {
            Record::with_capacity(fields.len())
        };
        for (field, acc) in fields.iter().zip(self.accumulators) {
            let value = match acc {
                Some(acc) => acc.finalize(),
                None => field_value(field, &self.first, &row)?,
            };
            row.insert(field.name(), value);
        }
        Ok(row)
    }
}

/// GROUP BY 引用非函数别名时改用其源字段
fn group_paths(group_by: &[FieldPath], fields: &[SelectedField]) -> Vec<FieldPath> {
    group_by
        .iter()
        .map(|path| {
            fields
                .iter()
                .find(|f| f.is_alias() && f.name() == path.as_str())
                .and_then(|f| f.path())
                .unwrap_or(path)
                .clone()
        })
        .collect()
}

fn group_key(raw: &Record, paths: &[FieldPath]) -> QueryResult<Vec<KeyPart>> {
    paths
        .iter()
        .map(|path| {
            let value = raw.lookup_path(path, Resolution::Lenient)?;
            Ok(match value {
                Value::Null => KeyPart::Null,
                other => KeyPart::Value(other.to_json_value().to_string()),
            })
        })
        .collect()
}

fn aggregate(
    input: RecordStream<'_>,
    select_all: bool,
    fields: &[SelectedField],
    group_by: &[FieldPath],
) -> QueryResult<Vec<Record>> {
    let paths = group_paths(group_by, fields);
    let mut buckets: IndexMap<Vec<KeyPart>, Bucket> = IndexMap::new();
    for item in input {
        let raw = item?;
        let key = group_key(&raw, &paths)?;
        buckets
            .entry(key)
            .or_insert_with(|| Bucket::new(raw.clone(), fields))
            .accumulate(&raw)?;
    }

    // 没有 GROUP BY 时空输入也输出一行
    if buckets.is_empty() && group_by.is_empty() {
        buckets.insert(Vec::new(), Bucket::new(Record::new(), fields));
    }
    debug!(groups = buckets.len(), "aggregated");

    buckets
        .into_values()
        .map(|bucket| bucket.emit(select_all, fields))
        .collect()
}

// ========== 排序 ==========

fn sort(input: RecordStream<'_>, keys: &[OrderKey], seed: Option<u64>) -> QueryResult<Vec<Record>> {
    let mut rows = Vec::new();
    for item in input {
        let row = item?;
        let values = keys
            .iter()
            .map(|k| row.lookup_path(&k.field, Resolution::Lenient))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push((values, row));
    }

    if keys.iter().any(|k| k.direction == Direction::Shuffle) {
        match seed {
            Some(seed) => rows.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => rows.shuffle(&mut rand::thread_rng()),
        }
    }

    // 稳定排序,逐键比较;SHUFFLE 键视为相等,保留打乱后的顺序
    rows.sort_by(|(a, _), (b, _)| {
        for (i, key) in keys.iter().enumerate() {
            let ordering = match key.direction {
                Direction::Asc => a[i].sort_cmp(&b[i]),
                Direction::Desc => b[i].sort_cmp(&a[i]),
                Direction::Natural => a[i].natural_cmp(&b[i]),
                Direction::Shuffle => std::cmp::Ordering::Equal,
            };
            if ordering.is_ne() {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
    debug!(rows = rows.len(), "sorted");
    Ok(rows.into_iter().map(|(_, row)| row).collect())
}

// ========== 分页 ==========

/// OFFSET / LIMIT:错误项直接透传,不计入跳过或输出的行数;达到上限后不再拉取上游
struct Paginate<'s> {
    inner: RecordStream<'s>,
    skip: usize,
    remaining: Option<usize>,
}

impl Iterator for Paginate<'_> {
    type Item = QueryResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        loop {
            match self.inner.next()? {
                Err(e) => return Some(Err(e)),
                Ok(_) if self.skip > 0 => self.skip -= 1,
                Ok(row) => {
                    if let Some(n) = self.remaining.as_mut() {
                        *n -= 1;
                    }
                    return Some(Ok(row));
                }
            }
        }
    }
}

// ========== 连接 ==========

/// 哈希键:数值(含数字字符串)统一按浮点表示,字符串原样;其余值不建索引
fn join_key(value: &Value) -> Option<String> {
    match value.as_number() {
        Some(n) => {
            // -0.0 与 0 宽松相等,键也必须相同
            let f = n.as_f64();
            let f = if f == 0.0 { 0.0 } else { f };
            Some(format!("n:{}", f))
        }
        None => match value {
            Value::String(s) => Some(format!("s:{}", s)),
            _ => None,
        },
    }
}

fn flip(operator: Operator) -> Operator {
    match operator {
        Operator::LessThan => Operator::GreaterThan,
        Operator::LessThanOrEqual => Operator::GreaterThanOrEqual,
        Operator::GreaterThan => Operator::LessThan,
        Operator::GreaterThanOrEqual => Operator::LessThanOrEqual,
        other => other,
    }
}

/// 去掉 `alias.` 前缀
fn strip_alias(path: &FieldPath, alias: Option<&str>) -> Option<FieldPath> {
    let alias = alias?;
    match path.segments() {
        [Segment::Key(first), rest @ ..] if first.as_str() == alias && !rest.is_empty() => {
            let rest = path.as_str().get(alias.len() + 1..)?;
            FieldPath::parse(rest).ok()
        }
        _ => None,
    }
}

/// 物化后的连接右侧
struct JoinProbe {
    kind: JoinKind,
    alias: Option<String>,
    left_key: FieldPath,
    operator: Operator,
    right: Vec<Record>,
    right_values: Vec<Value>,
    index: Option<HashMap<String, Vec<usize>>>,
    unkeyed: Vec<usize>,
    matched: Vec<bool>,
    /// 左侧未命中时填充的右侧值
    right_template: Value,
}

impl JoinProbe {
    /// # Brief
    /// 执行右侧查询并建立索引
    ///
    /// # Arguments
    /// * `join` - 连接规格
    /// * `source` - 记录来源
    /// * `hashed` - 等值连接建立哈希索引,否则逐对比较
    fn new(join: JoinSpec, source: &dyn RecordSource, hashed: bool) -> QueryResult<Self> {
        let right = run(QueryPlan::from_state(&join.right), source)?.collect::<QueryResult<Vec<_>>>()?;

        let alias = join.alias.as_deref();
        let (left_key, right_key, operator) = match strip_alias(&join.right_key, alias) {
            Some(right_key) => (join.left_key.clone(), right_key, join.operator),
            None => match strip_alias(&join.left_key, alias) {
                Some(right_key) => (join.right_key.clone(), right_key, flip(join.operator)),
                None => (join.left_key.clone(), join.right_key.clone(), join.operator),
            },
        };

        let right_values = right
            .iter()
            .map(|row| row.lookup_path(&right_key, Resolution::Lenient))
            .collect::<Result<Vec<_>, _>>()?;

        let mut unkeyed = Vec::new();
        let index = if hashed {
            let mut index: HashMap<String, Vec<usize>> = HashMap::new();
            for (i, value) in right_values.iter().enumerate() {
                match join_key(value) {
                    Some(key) => index.entry(key).or_default().push(i),
                    None => unkeyed.push(i),
                }
            }
            Some(index)
        } else {
            None
        };

        let right_template = right
            .first()
            .map(|row| Value::Record(row.null_filled()))
            .unwrap_or(Value::Null);

        debug!(
            kind = %join.kind,
            rows = right.len(),
            hashed,
            "join build side materialized"
        );

        Ok(Self {
            kind: join.kind,
            alias: join.alias,
            left_key,
            operator,
            matched: vec![false; right.len()],
            right,
            right_values,
            index,
            unkeyed,
            right_template,
        })
    }

    fn attach(&self, left: &Record, right: Value) -> Record {
        let mut row = left.clone();
        match (&self.alias, right) {
            (Some(alias), right) => row.insert(alias.as_str(), right),
            (None, Value::Record(right)) => row.merge(right),
            (None, _) => {}
        }
        row
    }

    fn candidates(&self, left_value: &Value) -> Vec<usize> {
        match (&self.index, join_key(left_value)) {
            (Some(index), Some(key)) => {
                let mut found = index.get(&key).cloned().unwrap_or_default();
                found.extend_from_slice(&self.unkeyed);
                found.sort_unstable();
                found
            }
            _ => (0..self.right.len()).collect(),
        }
    }

    /// 探测一行左侧记录,返回所有匹配的合并行
    fn probe(&mut self, left: &Record) -> QueryResult<Vec<Record>> {
        let left_value = left.lookup_path(&self.left_key, Resolution::Lenient)?;
        let mut out = Vec::new();
        for i in self.candidates(&left_value) {
            if self.operator.apply(&left_value, &self.right_values[i])? {
                self.matched[i] = true;
                out.push(self.attach(left, Value::Record(self.right[i].clone())));
            }
        }
        if out.is_empty() && self.kind.keeps_unmatched_left() {
            out.push(self.attach(left, self.right_template.clone()));
        }
        trace!(matches = out.len(), "probe");
        Ok(out)
    }

    /// RIGHT / FULL:输出未被任何左侧行命中的右侧行
    fn unmatched_right(&self, left_template: &Record) -> Vec<Record> {
        self.right
            .iter()
            .zip(&self.matched)
            .filter(|(_, matched)| !**matched)
            .map(|(row, _)| self.attach(left_template, Value::Record(row.clone())))
            .collect()
    }
}

struct JoinStream<'s> {
    left: RecordStream<'s>,
    probe: JoinProbe,
    pending: VecDeque<Record>,
    left_template: Option<Record>,
    left_done: bool,
}

impl<'s> JoinStream<'s> {
    fn new(left: RecordStream<'s>, probe: JoinProbe) -> Self {
        Self {
            left,
            probe,
            pending: VecDeque::new(),
            left_template: None,
            left_done: false,
        }
    }
}

impl Iterator for JoinStream<'_> {
    type Item = QueryResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Some(Ok(row));
            }
            if self.left_done {
                return None;
            }
            match self.left.next() {
                Some(Ok(left)) => {
                    if self.left_template.is_none() {
                        self.left_template = Some(left.null_filled());
                    }
                    match self.probe.probe(&left) {
                        Ok(rows) => self.pending.extend(rows),
                        Err(e) => return Some(Err(e)),
                    }
                }
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.left_done = true;
                    if self.probe.kind.keeps_unmatched_right() {
                        let template = self.left_template.take().unwrap_or_default();
                        let rows = self.probe.unmatched_right(&template);
                        self.pending.extend(rows);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::{Query, QueryError};
    use fiquela_value::{record, value};

    fn rows(source: &MemorySource, text: &str) -> QueryResult<Vec<Record>> {
        let state = Query::parse(text)?.build()?;
        run(QueryPlan::from_state(&state), source)?.collect()
    }

    fn products() -> MemorySource {
        MemorySource::new(vec![
            record! { "id": 1, "price": 100, "name": "b", "tag": "x" },
            record! { "id": 2, "price": 200, "name": "a", "tag": null },
            record! { "id": 3, "price": 300, "name": "c", "tag": "x" },
            record! { "id": 4, "price": 200, "name": "d", "tag": null },
        ])
    }

    #[test]
    fn test_filter_project() {
        let out = rows(&products(), "SELECT id, UPPER(name) AS n WHERE price > 100 AND price < 300").unwrap();
        assert_eq!(
            out,
            vec![record! { "id": 2, "n": "A" }, record! { "id": 4, "n": "D" }]
        );
    }

    #[test]
    fn test_project_references_earlier_alias() {
        let out = rows(&products(), "SELECT name AS n, CONCAT(n, '!') AS shout LIMIT 1").unwrap();
        assert_eq!(out, vec![record! { "n": "b", "shout": "b!" }]);
    }

    #[test]
    fn test_missing_field_projects_null() {
        let out = rows(&products(), "SELECT id, nope LIMIT 1").unwrap();
        assert_eq!(out, vec![record! { "id": 1, "nope": null }]);
    }

    #[test]
    fn test_group_null_key() {
        let out = rows(&products(), "SELECT tag, COUNT(*) AS n, SUM(price) AS total GROUP BY tag").unwrap();
        assert_eq!(
            out,
            vec![
                record! { "tag": "x", "n": 2, "total": 400 },
                record! { "tag": null, "n": 2, "total": 400 },
            ]
        );
    }

    #[test]
    fn test_group_by_alias() {
        let out = rows(&products(), "SELECT price AS p, COUNT(id) AS c GROUP BY p").unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[1], record! { "p": 200, "c": 2 });
    }

    #[test]
    fn test_aggregate_over_empty_input() {
        let out = rows(&products(), "SELECT COUNT(*) AS n, AVG(price) AS a WHERE price > 1000").unwrap();
        assert_eq!(out, vec![record! { "n": 0, "a": null }]);
        let grouped = rows(&products(), "SELECT tag, COUNT(*) AS n WHERE price > 1000 GROUP BY tag").unwrap();
        assert!(grouped.is_empty());
    }

    #[test]
    fn test_having_strict() {
        let out = rows(&products(), "SELECT tag, COUNT(*) AS n GROUP BY tag HAVING n > 1").unwrap();
        assert_eq!(out.len(), 2);
        let err = rows(&products(), "SELECT tag, COUNT(*) AS n GROUP BY tag HAVING total > 1").unwrap_err();
        assert!(matches!(err, QueryError::FieldNotFound(ref f) if f == "total"));
    }

    #[test]
    fn test_not_numeric_aggregate() {
        let err = rows(&products(), "SELECT SUM(name) AS s").unwrap_err();
        assert!(matches!(err, QueryError::NotNumeric(_)));
    }

    #[test]
    fn test_multi_key_sort_is_stable() {
        let out = rows(&products(), "SELECT id, price, name ORDER BY price DESC, name ASC").unwrap();
        let ids: Vec<_> = out.iter().map(|r| r.get("id").cloned().unwrap()).collect();
        assert_eq!(ids, vec![value!(3), value!(2), value!(4), value!(1)]);
    }

    #[test]
    fn test_natural_sort() {
        let source = MemorySource::new(vec![
            record! { "f": "file10" },
            record! { "f": "File2" },
            record! { "f": "file1" },
        ]);
        let out = rows(&source, "SELECT f ORDER BY f NATSORT").unwrap();
        let names: Vec<_> = out.iter().map(|r| r.get("f").cloned().unwrap()).collect();
        assert_eq!(names, vec![value!("file1"), value!("File2"), value!("file10")]);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let source = MemorySource::new((0..20).map(|i| record! { "i": i }).collect());
        let run_once = || {
            let mut q = Query::with_config(&fiquela_common::QueryConfig {
                shuffle_seed: Some(7),
                ..Default::default()
            });
            q.order_by_dir("i", Direction::Shuffle).unwrap();
            run(QueryPlan::from_state(&q.build().unwrap()), &source)
                .unwrap()
                .collect::<QueryResult<Vec<_>>>()
                .unwrap()
        };
        let a = run_once();
        assert_eq!(a, run_once());
        assert_eq!(a.len(), 20);
    }

    #[test]
    fn test_distinct() {
        let out = rows(&products(), "SELECT DISTINCT price ORDER BY price").unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_offset_limit() {
        let out = rows(&products(), "SELECT id OFFSET 1 LIMIT 2").unwrap();
        assert_eq!(out, vec![record! { "id": 2 }, record! { "id": 3 }]);
        let past_end = rows(&products(), "SELECT id OFFSET 10").unwrap();
        assert!(past_end.is_empty());
    }

    #[test]
    fn test_paginate_passes_errors_through() {
        let inner: RecordStream<'static> = Box::new(
            vec![
                Ok(record! { "a": 1 }),
                Err(QueryError::DivisionByZero),
                Ok(record! { "a": 2 }),
                Ok(record! { "a": 3 }),
            ]
            .into_iter(),
        );
        let items: Vec<_> = Paginate {
            inner,
            skip: 1,
            remaining: Some(1),
        }
        .collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_err());
        assert_eq!(items[1].as_ref().unwrap(), &record! { "a": 2 });
    }

    fn shop() -> MemorySource {
        MemorySource::from_value(value!({
            "users": [{ "id": 1, "name": "miku" }, { "id": 2, "name": "rin" }, { "id": 3, "name": "len" }],
            "orders": [{ "uid": 1, "total": 50 }, { "uid": 1, "total": 70 }, { "uid": 9, "total": 5 }]
        }))
    }

    #[test]
    fn test_inner_join_multiple_matches() {
        let out = rows(
            &shop(),
            "SELECT name, o.total AS total FROM users INNER JOIN (SELECT * FROM orders) AS o ON id = o.uid",
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                record! { "name": "miku", "total": 50 },
                record! { "name": "miku", "total": 70 },
            ]
        );
    }

    #[test]
    fn test_right_and_full_join() {
        let right = rows(
            &shop(),
            "SELECT * FROM users RIGHT JOIN (SELECT * FROM orders) AS o ON id = uid",
        )
        .unwrap();
        assert_eq!(right.len(), 3);
        assert_eq!(
            right[2],
            record! { "id": null, "name": null, "o": { "uid": 9, "total": 5 } }
        );

        let full = rows(
            &shop(),
            "SELECT * FROM users FULL JOIN (SELECT * FROM orders) AS o ON id = uid",
        )
        .unwrap();
        assert_eq!(full.len(), 5);
        assert_eq!(full[2], record! { "id": 2, "name": "rin", "o": { "uid": null, "total": null } });
    }

    #[test]
    fn test_non_equi_join() {
        let out = rows(
            &shop(),
            "SELECT name, o.total AS t FROM users JOIN (SELECT * FROM orders) AS o ON id > o.uid",
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                record! { "name": "rin", "t": 50 },
                record! { "name": "rin", "t": 70 },
                record! { "name": "len", "t": 50 },
                record! { "name": "len", "t": 70 },
            ]
        );
    }

    #[test]
    fn test_join_key_loose_match() {
        let source = MemorySource::from_value(value!({
            "a": [{ "k": "1" }],
            "b": [{ "k": 1.0, "v": true }]
        }));
        let out = rows(&source, "SELECT b.v AS v FROM a JOIN (SELECT * FROM b) AS b ON k = b.k").unwrap();
        assert_eq!(out, vec![record! { "v": true }]);
    }

    #[test]
    fn test_unaliased_join_merges_right_fields() {
        let source = MemorySource::from_value(value!({
            "users": [{ "id": 1, "name": "a" }, { "id": 2, "name": "b" }],
            "orders": [{ "uid": 1, "total": 50 }]
        }));
        let out = rows(
            &source,
            "SELECT * FROM users LEFT JOIN (SELECT * FROM orders) ON id = uid",
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                record! { "id": 1, "name": "a", "uid": 1, "total": 50 },
                record! { "id": 2, "name": "b", "uid": null, "total": null },
            ]
        );
    }

    #[test]
    fn test_join_key_negative_zero() {
        let source = MemorySource::from_value(value!({
            "a": [{ "k": 0 }],
            "b": [{ "k": (-0.0), "v": true }]
        }));
        let hashed = rows(&source, "SELECT b.v AS v FROM a JOIN (SELECT * FROM b) AS b ON k = b.k").unwrap();
        let nested = rows(&source, "SELECT b.v AS v FROM a JOIN (SELECT * FROM b) AS b ON k >= b.k").unwrap();
        assert_eq!(hashed, vec![record! { "v": true }]);
        assert_eq!(hashed, nested);
        assert_eq!(join_key(&value!(0)), join_key(&value!((-0.0))));
        assert_eq!(join_key(&value!("-0")), join_key(&value!(0.0)));
    }

    #[test]
    fn test_sort_mixed_numeric_strings_ignores_input_order() {
        let forward = MemorySource::new(vec![
            record! { "v": "3" },
            record! { "v": "100" },
            record! { "v": "2x" },
        ]);
        let backward = MemorySource::new(vec![
            record! { "v": "2x" },
            record! { "v": "100" },
            record! { "v": "3" },
        ]);
        let expected = vec![record! { "v": "3" }, record! { "v": "100" }, record! { "v": "2x" }];
        assert_eq!(rows(&forward, "SELECT v ORDER BY v ASC").unwrap(), expected);
        assert_eq!(rows(&backward, "SELECT v ORDER BY v ASC").unwrap(), expected);
    }
}
