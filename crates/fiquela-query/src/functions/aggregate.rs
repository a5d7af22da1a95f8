use super::{FunctionArg, FunctionCall, FunctionKind};
use crate::{QueryError, QueryResult};
use fiquela_value::{FieldPath, Number, Record, Resolution, Value};
use std::cmp::Ordering;

const DEFAULT_SEPARATOR: &str = ",";

/// 聚合函数的输入
#[derive(Debug, Clone)]
enum Input {
    /// COUNT(*) / COUNT()
    Rows,
    Field(FieldPath),
}

impl Input {
    fn of(call: &FunctionCall) -> Self {
        match call.args.first() {
            Some(FunctionArg::Field(path)) => Input::Field(path.clone()),
            _ => Input::Rows,
        }
    }

    fn value(&self, row: &Record) -> QueryResult<Value> {
        match self {
            Input::Rows => Ok(Value::Boolean(true)),
            Input::Field(path) => Ok(row.lookup_path(path, Resolution::Lenient)?),
        }
    }
}

fn separator(call: &FunctionCall) -> String {
    match call.args.get(1) {
        Some(FunctionArg::Literal(v)) => v.to_text(),
        _ => DEFAULT_SEPARATOR.to_string(),
    }
}

fn numeric(kind: FunctionKind, value: &Value) -> QueryResult<Option<Number>> {
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_number()
        .map(Some)
        .ok_or_else(|| QueryError::NotNumeric(format!("{} in {}", value, kind)))
}

#[derive(Debug, Clone)]
enum State {
    Count(i64),
    Sum { int: i64, float: f64, integral: bool },
    Avg { sum: f64, n: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
    Concat(Vec<String>),
}

/// 增量聚合器
///
/// `finalize` 的结果与对同一批记录调用 `invoke_aggregate` 相同。
#[derive(Debug, Clone)]
pub struct Accumulator {
    kind: FunctionKind,
    input: Input,
    separator: String,
    state: State,
}

impl Accumulator {
    /// # Brief
    /// 初始化聚合器
    ///
    /// # Arguments
    /// * `call` - 聚合函数调用,非聚合函数按 COUNT 处理
    pub fn new(call: &FunctionCall) -> Self {
        let state = match call.kind {
            FunctionKind::Sum => State::Sum {
                int: 0,
                float: 0.0,
                integral: true,
            },
            FunctionKind::Avg => State::Avg { sum: 0.0, n: 0 },
            FunctionKind::Min => State::Min(None),
            FunctionKind::Max => State::Max(None),
            FunctionKind::GroupConcat => State::Concat(Vec::new()),
            _ => State::Count(0),
        };
        Self {
            kind: call.kind,
            input: Input::of(call),
            separator: separator(call),
            state,
        }
    }

    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    /// # Brief
    /// 累加一行原始记录
    ///
    /// # Returns
    /// 数值聚合遇到非数值时返回 NotNumeric
    pub fn accumulate(&mut self, row: &Record) -> QueryResult<()> {
        let value = self.input.value(row)?;
        let kind = self.kind;
        match &mut self.state {
            State::Count(n) => {
                if !value.is_null() {
                    *n += 1;
                }
            }
            State::Sum {
                int,
                float,
                integral,
            } => {
                if let Some(number) = numeric(kind, &value)? {
                    *float += number.as_f64();
                    match number {
                        Number::Int(i) if *integral => match int.checked_add(i) {
                            Some(sum) => *int = sum,
                            None => *integral = false,
                        },
                        Number::Int(_) => {}
                        Number::Float(_) => *integral = false,
                    }
                }
            }
            State::Avg { sum, n } => {
                if let Some(number) = numeric(kind, &value)? {
                    *sum += number.as_f64();
                    *n += 1;
                }
            }
            State::Min(current) => {
                if !value.is_null() {
                    let replace = match current {
                        Some(c) => value.sort_cmp(c) == Ordering::Less,
                        None => true,
                    };
                    if replace {
                        *current = Some(value);
                    }
                }
            }
            State::Max(current) => {
                if !value.is_null() {
                    let replace = match current {
                        Some(c) => value.sort_cmp(c) != Ordering::Less,
                        None => true,
                    };
                    if replace {
                        *current = Some(value);
                    }
                }
            }
            State::Concat(parts) => {
                if !value.is_null() {
                    parts.push(value.to_text());
                }
            }
        }
        Ok(())
    }

    /// 输出聚合结果
    pub fn finalize(self) -> Value {
        match self.state {
            State::Count(n) => Value::Int(n),
            State::Sum {
                int,
                float,
                integral,
            } => {
                if integral {
                    Value::Int(int)
                } else {
                    Value::Float(float)
                }
            }
            State::Avg { sum, n } => {
                if n == 0 {
                    Value::Null
                } else {
                    Value::Float(sum / n as f64)
                }
            }
            State::Min(v) | State::Max(v) => v.unwrap_or(Value::Null),
            State::Concat(parts) => Value::from(parts.join(&self.separator)),
        }
    }
}

/// 对整批记录求聚合值
pub(super) fn invoke(call: &FunctionCall, rows: &[Record]) -> QueryResult<Value> {
    let input = Input::of(call);
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        values.push(input.value(row)?);
    }
    let present = || values.iter().filter(|v| !v.is_null());

    let result = match call.kind {
        FunctionKind::Count => Value::Int(present().count() as i64),
        FunctionKind::Sum => {
            let mut numbers = Vec::with_capacity(values.len());
            for v in &values {
                if let Some(n) = numeric(call.kind, v)? {
                    numbers.push(n);
                }
            }
            let exact = numbers.iter().try_fold(0i64, |acc, n| match n {
                Number::Int(i) => acc.checked_add(*i),
                Number::Float(_) => None,
            });
            match exact {
                Some(sum) => Value::Int(sum),
                None => Value::Float(numbers.iter().map(|n| n.as_f64()).sum()),
            }
        }
        FunctionKind::Avg => {
            let mut sum = 0.0;
            let mut n = 0u64;
            for v in &values {
                if let Some(number) = numeric(call.kind, v)? {
                    sum += number.as_f64();
                    n += 1;
                }
            }
            if n == 0 {
                Value::Null
            } else {
                Value::Float(sum / n as f64)
            }
        }
        FunctionKind::Min => present().min_by(|a, b| a.sort_cmp(b)).cloned().unwrap_or(Value::Null),
        FunctionKind::Max => present().max_by(|a, b| a.sort_cmp(b)).cloned().unwrap_or(Value::Null),
        FunctionKind::GroupConcat => {
            let parts: Vec<String> = present().map(|v| v.to_text()).collect();
            Value::from(parts.join(&separator(call)))
        }
        other => {
            return Err(QueryError::Execution(format!("{} is not an aggregate function", other)));
        }
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiquela_value::{record, value};
    use proptest::prelude::*;

    fn call(kind: FunctionKind, field: &str) -> FunctionCall {
        FunctionCall::new(kind, vec![FunctionArg::field(field).unwrap()]).unwrap()
    }

    fn rows() -> Vec<Record> {
        vec![
            record! { "price": 100, "name": "b" },
            record! { "price": "200", "name": "a" },
            record! { "price": null, "name": "c" },
        ]
    }

    fn incremental(call: &FunctionCall, rows: &[Record]) -> QueryResult<Value> {
        let mut acc = call.accumulator();
        for row in rows {
            acc.accumulate(row)?;
        }
        Ok(acc.finalize())
    }

    #[test]
    fn test_basic_aggregates() {
        let rows = rows();
        assert_eq!(call(FunctionKind::Count, "price").invoke_aggregate(&rows).unwrap(), value!(2));
        assert_eq!(
            FunctionCall::new(FunctionKind::Count, vec![FunctionArg::Star])
                .unwrap()
                .invoke_aggregate(&rows)
                .unwrap(),
            value!(3)
        );
        assert_eq!(call(FunctionKind::Sum, "price").invoke_aggregate(&rows).unwrap(), value!(300));
        assert_eq!(call(FunctionKind::Avg, "price").invoke_aggregate(&rows).unwrap(), value!(150.0));
        assert_eq!(call(FunctionKind::Min, "name").invoke_aggregate(&rows).unwrap(), value!("a"));
        assert_eq!(call(FunctionKind::Max, "price").invoke_aggregate(&rows).unwrap(), value!("200"));
        assert_eq!(
            call(FunctionKind::GroupConcat, "name").invoke_aggregate(&rows).unwrap(),
            value!("b,a,c")
        );
    }

    #[test]
    fn test_empty_input() {
        let empty: Vec<Record> = vec![];
        assert_eq!(call(FunctionKind::Count, "x").invoke_aggregate(&empty).unwrap(), value!(0));
        assert_eq!(call(FunctionKind::Sum, "x").invoke_aggregate(&empty).unwrap(), value!(0));
        assert_eq!(call(FunctionKind::Avg, "x").invoke_aggregate(&empty).unwrap(), Value::Null);
        assert_eq!(call(FunctionKind::Min, "x").invoke_aggregate(&empty).unwrap(), Value::Null);
        assert_eq!(call(FunctionKind::Max, "x").invoke_aggregate(&empty).unwrap(), Value::Null);
    }

    #[test]
    fn test_sum_mixed_is_float() {
        let rows = vec![record! { "x": 1 }, record! { "x": 2.5 }];
        assert_eq!(call(FunctionKind::Sum, "x").invoke_aggregate(&rows).unwrap(), value!(3.5));
    }

    #[test]
    fn test_not_numeric() {
        let rows = vec![record! { "x": 1 }, record! { "x": "abc" }];
        let sum = call(FunctionKind::Sum, "x");
        assert!(matches!(sum.invoke_aggregate(&rows), Err(QueryError::NotNumeric(_))));
        assert!(matches!(incremental(&sum, &rows), Err(QueryError::NotNumeric(_))));
    }

    #[test]
    fn test_group_concat_separator() {
        let rows = vec![record! { "t": "x" }, record! { "t": "y" }];
        let c = FunctionCall::new(
            FunctionKind::GroupConcat,
            vec![FunctionArg::field("t").unwrap(), FunctionArg::literal(" | ")],
        )
        .unwrap();
        assert_eq!(incremental(&c, &rows).unwrap(), value!("x | y"));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            (-1000i64..1000).prop_map(Value::Int),
            (-1000i64..1000).prop_map(|n| Value::Float(n as f64 / 4.0)),
            (-1000i64..1000).prop_map(|n| Value::from(n.to_string())),
        ]
    }

    proptest! {
        #[test]
        fn prop_incremental_matches_bulk(values in proptest::collection::vec(arb_value(), 0..20)) {
            let rows: Vec<Record> = values
                .into_iter()
                .map(|v| {
                    let mut r = Record::new();
                    r.insert("x", v);
                    r
                })
                .collect();
            for kind in [
                FunctionKind::Count,
                FunctionKind::Sum,
                FunctionKind::Avg,
                FunctionKind::Min,
                FunctionKind::Max,
                FunctionKind::GroupConcat,
            ] {
                let c = call(kind, "x");
                let bulk = c.invoke_aggregate(&rows).unwrap();
                let inc = incremental(&c, &rows).unwrap();
                prop_assert_eq!(bulk, inc, "{} differs", kind);
            }
        }
    }
}
