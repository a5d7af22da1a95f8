//! 结果模块
//!
//! 查询输出的对外句柄,分两种:
//! - `StreamResult`:惰性、单次遍历,所有操作都会消耗自身
//! - `MaterializedResult`:一次性缓存全部输出,可反复读取、重新排序

use crate::functions::{FunctionArg, FunctionCall, FunctionKind};
use crate::source::RecordStream;
use crate::state::Direction;
use crate::{QueryError, QueryResult};
use fiquela_value::{FieldPath, Record, Resolution, Value};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::borrow::Borrow;

/// 按下标取行的方式,下标从 0 开始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nth {
    /// 下标 0, n, 2n, ...
    Every(usize),
    /// 下标 0, 2, 4, ...
    Even,
    /// 下标 1, 3, 5, ...
    Odd,
}

impl Nth {
    /// (起始下标, 步长)
    fn stride(self) -> QueryResult<(usize, usize)> {
        match self {
            Nth::Every(0) => Err(QueryError::Execution("fetch_nth step must be positive".into())),
            Nth::Every(n) => Ok((0, n)),
            Nth::Even => Ok((0, 2)),
            Nth::Odd => Ok((1, 2)),
        }
    }
}

fn reduce<R: Borrow<Record>>(
    rows: impl Iterator<Item = QueryResult<R>>,
    kind: FunctionKind,
    field: &str,
) -> QueryResult<Value> {
    let mut acc = FunctionCall::new(kind, vec![FunctionArg::field(field)?])?.accumulator();
    for row in rows {
        acc.accumulate(row?.borrow())?;
    }
    Ok(acc.finalize())
}

fn nth<R>(rows: impl Iterator<Item = QueryResult<R>>, which: Nth) -> QueryResult<Vec<R>> {
    let (start, step) = which.stride()?;
    let mut out = Vec::new();
    for (i, row) in rows.enumerate() {
        let row = row?;
        if i >= start && (i - start) % step == 0 {
            out.push(row);
        }
    }
    Ok(out)
}

/// 流式结果
pub struct StreamResult<'s> {
    stream: RecordStream<'s>,
    seed: Option<u64>,
}

impl<'s> StreamResult<'s> {
    pub fn new(stream: RecordStream<'s>) -> Self {
        Self { stream, seed: None }
    }

    /// 冻结后的 `sorted(.., Shuffle)` 使用的随机种子
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// # Brief
    /// 取出全部行
    ///
    /// # Arguments
    /// * `limit` - 最多取出的行数,None 表示不限
    pub fn fetch_all(self, limit: Option<usize>) -> QueryResult<Vec<Record>> {
        match limit {
            Some(n) => self.stream.take(n).collect(),
            None => self.stream.collect(),
        }
    }

    pub fn fetch_one(mut self) -> QueryResult<Option<Record>> {
        self.stream.next().transpose()
    }

    pub fn fetch_nth(self, which: Nth) -> QueryResult<Vec<Record>> {
        nth(self.stream, which)
    }

    /// 只拉取第一行
    pub fn exists(mut self) -> QueryResult<bool> {
        Ok(self.stream.next().transpose()?.is_some())
    }

    pub fn count(self) -> QueryResult<usize> {
        let mut n = 0;
        for row in self.stream {
            row?;
            n += 1;
        }
        Ok(n)
    }

    pub fn sum(self, field: &str) -> QueryResult<Value> {
        reduce(self.stream, FunctionKind::Sum, field)
    }

    pub fn avg(self, field: &str) -> QueryResult<Value> {
        reduce(self.stream, FunctionKind::Avg, field)
    }

    pub fn min(self, field: &str) -> QueryResult<Value> {
        reduce(self.stream, FunctionKind::Min, field)
    }

    pub fn max(self, field: &str) -> QueryResult<Value> {
        reduce(self.stream, FunctionKind::Max, field)
    }

    /// 把剩余输出复制到缓存中
    pub fn freeze(self) -> QueryResult<MaterializedResult> {
        Ok(MaterializedResult::collect(self.stream)?.with_seed(self.seed))
    }
}

impl Iterator for StreamResult<'_> {
    type Item = QueryResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.next()
    }
}

/// 物化结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializedResult {
    rows: Vec<Record>,
    seed: Option<u64>,
}

impl MaterializedResult {
    /// # Brief
    /// 遍历整个序列并缓存
    ///
    /// # Returns
    /// 遇到第一个错误即返回该错误
    pub fn collect(stream: RecordStream<'_>) -> QueryResult<Self> {
        let rows = stream.collect::<QueryResult<Vec<_>>>()?;
        tracing::debug!(rows = rows.len(), "materialized");
        Ok(Self { rows, seed: None })
    }

    pub fn from_rows(rows: Vec<Record>) -> Self {
        Self { rows, seed: None }
    }

    /// 设置 `sorted(.., Shuffle)` 的随机种子,None 时每次打乱结果不同
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn fetch_all(&self, limit: Option<usize>) -> Vec<Record> {
        let n = limit.unwrap_or(self.rows.len());
        self.rows.iter().take(n).cloned().collect()
    }

    pub fn fetch_one(&self) -> Option<Record> {
        self.rows.first().cloned()
    }

    pub fn fetch_nth(&self, which: Nth) -> QueryResult<Vec<Record>> {
        nth(self.rows.iter().cloned().map(Ok), which)
    }

    pub fn exists(&self) -> bool {
        !self.rows.is_empty()
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn sum(&self, field: &str) -> QueryResult<Value> {
        reduce(self.rows.iter().map(Ok), FunctionKind::Sum, field)
    }

    pub fn avg(&self, field: &str) -> QueryResult<Value> {
        reduce(self.rows.iter().map(Ok), FunctionKind::Avg, field)
    }

    pub fn min(&self, field: &str) -> QueryResult<Value> {
        reduce(self.rows.iter().map(Ok), FunctionKind::Min, field)
    }

    pub fn max(&self, field: &str) -> QueryResult<Value> {
        reduce(self.rows.iter().map(Ok), FunctionKind::Max, field)
    }

    /// # Brief
    /// 返回按字段重新排序后的副本,原结果不变
    ///
    /// # Arguments
    /// * `field` - 排序字段,缺失时按 NULL 处理
    /// * `direction` - 排序方向
    pub fn sorted(&self, field: &str, direction: Direction) -> QueryResult<Self> {
        let path = FieldPath::parse(field)?;
        let mut keyed = self
            .rows
            .iter()
            .map(|row| -> QueryResult<(Value, Record)> {
                Ok((row.lookup_path(&path, Resolution::Lenient)?, row.clone()))
            })
            .collect::<QueryResult<Vec<_>>>()?;
        match direction {
            Direction::Asc => keyed.sort_by(|(a, _), (b, _)| a.sort_cmp(b)),
            Direction::Desc => keyed.sort_by(|(a, _), (b, _)| b.sort_cmp(a)),
            Direction::Natural => keyed.sort_by(|(a, _), (b, _)| a.natural_cmp(b)),
            Direction::Shuffle => match self.seed {
                Some(seed) => keyed.shuffle(&mut StdRng::seed_from_u64(seed)),
                None => keyed.shuffle(&mut rand::thread_rng()),
            },
        }
        Ok(Self {
            rows: keyed.into_iter().map(|(_, row)| row).collect(),
            seed: self.seed,
        })
    }
}

impl IntoIterator for MaterializedResult {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a MaterializedResult {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// 查询结果
///
/// 计划中含连接或排序时为物化结果,否则为流式结果
pub enum Results<'s> {
    Stream(StreamResult<'s>),
    Materialized(MaterializedResult),
}

impl<'s> Results<'s> {
    pub fn is_materialized(&self) -> bool {
        matches!(self, Results::Materialized(_))
    }

    pub fn fetch_all(self, limit: Option<usize>) -> QueryResult<Vec<Record>> {
        match self {
            Results::Stream(s) => s.fetch_all(limit),
            Results::Materialized(m) => Ok(m.fetch_all(limit)),
        }
    }

    pub fn fetch_one(self) -> QueryResult<Option<Record>> {
        match self {
            Results::Stream(s) => s.fetch_one(),
            Results::Materialized(m) => Ok(m.fetch_one()),
        }
    }

    pub fn fetch_nth(self, which: Nth) -> QueryResult<Vec<Record>> {
        match self {
            Results::Stream(s) => s.fetch_nth(which),
            Results::Materialized(m) => m.fetch_nth(which),
        }
    }

    pub fn exists(self) -> QueryResult<bool> {
        match self {
            Results::Stream(s) => s.exists(),
            Results::Materialized(m) => Ok(m.exists()),
        }
    }

    pub fn count(self) -> QueryResult<usize> {
        match self {
            Results::Stream(s) => s.count(),
            Results::Materialized(m) => Ok(m.count()),
        }
    }

    pub fn sum(self, field: &str) -> QueryResult<Value> {
        match self {
            Results::Stream(s) => s.sum(field),
            Results::Materialized(m) => m.sum(field),
        }
    }

    pub fn avg(self, field: &str) -> QueryResult<Value> {
        match self {
            Results::Stream(s) => s.avg(field),
            Results::Materialized(m) => m.avg(field),
        }
    }

    pub fn min(self, field: &str) -> QueryResult<Value> {
        match self {
            Results::Stream(s) => s.min(field),
            Results::Materialized(m) => m.min(field),
        }
    }

    pub fn max(self, field: &str) -> QueryResult<Value> {
        match self {
            Results::Stream(s) => s.max(field),
            Results::Materialized(m) => m.max(field),
        }
    }

    pub fn freeze(self) -> QueryResult<MaterializedResult> {
        match self {
            Results::Stream(s) => s.freeze(),
            Results::Materialized(m) => Ok(m),
        }
    }
}

impl<'s> IntoIterator for Results<'s> {
    type Item = QueryResult<Record>;
    type IntoIter = Box<dyn Iterator<Item = QueryResult<Record>> + 's>;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            Results::Stream(s) => Box::new(s),
            Results::Materialized(m) => Box::new(m.into_iter().map(Ok)),
        }
    }
}
