use super::FunctionKind;
use crate::{QueryError, QueryResult};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use fiquela_value::{Number, Value};
use sha2::{Digest, Sha256};
use std::fmt::Write;

const DEFAULT_SEPARATOR: &str = ",";

pub(super) fn invoke(kind: FunctionKind, args: Vec<Value>) -> QueryResult<Value> {
    let mut args = args.into_iter();

    match kind {
        FunctionKind::Upper => Ok(map_text(take(&mut args), |s| s.to_uppercase())),
        FunctionKind::Lower => Ok(map_text(take(&mut args), |s| s.to_lowercase())),
        FunctionKind::Trim => Ok(map_text(take(&mut args), |s| s.trim().to_string())),
        FunctionKind::Reverse => Ok(map_text(take(&mut args), |s| s.chars().rev().collect())),
        FunctionKind::Length => Ok(match take(&mut args) {
            Value::Null => Value::Null,
            Value::Array(items) => Value::from(items.len()),
            Value::Record(rec) => Value::from(rec.len()),
            other => Value::from(other.to_text().chars().count()),
        }),
        FunctionKind::Concat => Ok(Value::from(
            args.map(|v| v.to_text()).collect::<String>(),
        )),
        FunctionKind::ConcatWs => {
            let separator = take(&mut args).to_text();
            let parts: Vec<String> = args.filter(|v| !v.is_null()).map(|v| v.to_text()).collect();
            Ok(Value::from(parts.join(&separator)))
        }
        FunctionKind::Substring => {
            let text = take(&mut args);
            let start = take(&mut args);
            let length = take(&mut args);
            if text.is_null() {
                return Ok(Value::Null);
            }
            let chars: Vec<char> = text.to_text().chars().collect();
            let start = int_arg(kind, &start)?;
            let begin = if start < 0 {
                chars.len().saturating_sub(start.unsigned_abs() as usize)
            } else {
                (start as usize).min(chars.len())
            };
            let end = if length.is_null() {
                chars.len()
            } else {
                let length = int_arg(kind, &length)?;
                if length < 0 {
                    chars.len().saturating_sub(length.unsigned_abs() as usize).max(begin)
                } else {
                    begin.saturating_add(length as usize).min(chars.len())
                }
            };
            Ok(Value::from(chars[begin..end].iter().collect::<String>()))
        }
        FunctionKind::Replace => {
            let text = take(&mut args);
            let search = take(&mut args).to_text();
            let replacement = take(&mut args).to_text();
            if text.is_null() {
                return Ok(Value::Null);
            }
            if search.is_empty() {
                return Ok(Value::from(text.to_text()));
            }
            Ok(Value::from(text.to_text().replace(&search, &replacement)))
        }
        FunctionKind::Explode => {
            let text = take(&mut args);
            let separator = separator_arg(take(&mut args));
            if text.is_null() {
                return Ok(Value::Null);
            }
            Ok(Value::Array(
                text.to_text()
                    .split(separator.as_str())
                    .map(Value::from)
                    .collect(),
            ))
        }
        FunctionKind::Implode => {
            let list = take(&mut args);
            let separator = separator_arg(take(&mut args));
            match list {
                Value::Null => Ok(Value::Null),
                Value::Array(items) => Ok(Value::from(
                    items.iter().map(|v| v.to_text()).collect::<Vec<_>>().join(&separator),
                )),
                other => Ok(Value::from(other.to_text())),
            }
        }
        FunctionKind::Round => {
            let value = take(&mut args);
            let precision = take(&mut args);
            let Some(n) = number_arg(kind, &value)? else {
                return Ok(Value::Null);
            };
            let precision = if precision.is_null() { 0 } else { int_arg(kind, &precision)? };
            let factor = 10f64.powi(precision.clamp(-15, 15) as i32);
            Ok(Value::Float((n.as_f64() * factor).round() / factor))
        }
        FunctionKind::Floor => Ok(match number_arg(kind, &take(&mut args))? {
            None => Value::Null,
            Some(Number::Int(i)) => Value::Int(i),
            Some(Number::Float(f)) => float_to_int(f.floor()),
        }),
        FunctionKind::Ceil => Ok(match number_arg(kind, &take(&mut args))? {
            None => Value::Null,
            Some(Number::Int(i)) => Value::Int(i),
            Some(Number::Float(f)) => float_to_int(f.ceil()),
        }),
        FunctionKind::Abs => Ok(match number_arg(kind, &take(&mut args))? {
            None => Value::Null,
            Some(Number::Int(i)) => i
                .checked_abs()
                .map(Value::Int)
                .unwrap_or(Value::Float((i as f64).abs())),
            Some(Number::Float(f)) => Value::Float(f.abs()),
        }),
        FunctionKind::Mod => {
            let a = take(&mut args);
            let b = take(&mut args);
            match (number_arg(kind, &a)?, number_arg(kind, &b)?) {
                (None, _) | (_, None) => Ok(Value::Null),
                (Some(Number::Int(x)), Some(Number::Int(y))) => {
                    if y == 0 {
                        return Err(QueryError::DivisionByZero);
                    }
                    Ok(Value::Int(x.wrapping_rem(y)))
                }
                (Some(x), Some(y)) => {
                    if y.as_f64() == 0.0 {
                        return Err(QueryError::DivisionByZero);
                    }
                    Ok(Value::Float(x.as_f64() % y.as_f64()))
                }
            }
        }
        FunctionKind::Coalesce => Ok(args.find(|v| !v.is_null()).unwrap_or(Value::Null)),
        FunctionKind::IfNull => {
            let value = take(&mut args);
            let fallback = take(&mut args);
            Ok(if value.is_null() { fallback } else { value })
        }
        FunctionKind::Sha256 => {
            let value = take(&mut args);
            if value.is_null() {
                return Ok(Value::Null);
            }
            let digest = Sha256::digest(value.to_text().as_bytes());
            let mut hex = String::with_capacity(64);
            for byte in digest {
                let _ = write!(hex, "{:02x}", byte);
            }
            Ok(Value::from(hex))
        }
        FunctionKind::Now => {
            let format = take(&mut args);
            let now = Utc::now();
            if format.is_null() {
                Ok(Value::from(now.to_rfc3339()))
            } else {
                format_datetime(&now, &format.to_text()).map(Value::from)
            }
        }
        FunctionKind::DateFormat => {
            let value = take(&mut args);
            let format = take(&mut args).to_text();
            match parse_datetime(&value)? {
                Some(dt) => format_datetime(&dt, &format).map(Value::from),
                None => Ok(Value::Null),
            }
        }
        FunctionKind::Uuid => Ok(Value::from(uuid::Uuid::new_v4().to_string())),
        other => Err(QueryError::Execution(format!(
            "{} is an aggregate function and needs a group",
            other
        ))),
    }
}

fn take(args: &mut impl Iterator<Item = Value>) -> Value {
    args.next().unwrap_or(Value::Null)
}

fn map_text(value: Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::Null => Value::Null,
        other => Value::from(f(&other.to_text())),
    }
}

fn separator_arg(value: Value) -> String {
    match value {
        Value::Null => DEFAULT_SEPARATOR.to_string(),
        other => other.to_text(),
    }
}

fn number_arg(kind: FunctionKind, value: &Value) -> QueryResult<Option<Number>> {
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_number()
        .map(Some)
        .ok_or_else(|| QueryError::NotNumeric(format!("{} in {}", value, kind)))
}

fn int_arg(kind: FunctionKind, value: &Value) -> QueryResult<i64> {
    match number_arg(kind, value)? {
        Some(Number::Int(i)) => Ok(i),
        Some(Number::Float(f)) if f.fract() == 0.0 => Ok(f as i64),
        _ => Err(QueryError::TypeError(format!("{} expects an integer, got {}", kind, value))),
    }
}

fn float_to_int(f: f64) -> Value {
    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Value::Int(f as i64)
    } else {
        Value::Float(f)
    }
}

fn parse_datetime(value: &Value) -> QueryResult<Option<DateTime<Utc>>> {
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Int(ts) => Utc.timestamp_opt(*ts, 0).single(),
        Value::Float(ts) => Utc.timestamp_opt(ts.trunc() as i64, 0).single(),
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                        .ok()
                        .map(|dt| dt.and_utc())
                })
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(|dt| dt.and_utc())
                })
                .or_else(|| s.parse::<i64>().ok().and_then(|ts| Utc.timestamp_opt(ts, 0).single()))
        }
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| QueryError::TypeError(format!("Cannot interpret {} as a date", value)))
}

fn format_datetime(dt: &DateTime<Utc>, format: &str) -> QueryResult<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(QueryError::TypeError(format!("Invalid date format: {}", format)));
    }
    let mut out = String::new();
    write!(out, "{}", dt.format_with_items(items.into_iter()))
        .map_err(|_| QueryError::TypeError(format!("Invalid date format: {}", format)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiquela_value::value;

    fn call(kind: FunctionKind, args: Vec<Value>) -> QueryResult<Value> {
        invoke(kind, args)
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call(FunctionKind::Upper, vec![value!("miku")]).unwrap(), value!("MIKU"));
        assert_eq!(call(FunctionKind::Lower, vec![value!("MiKu")]).unwrap(), value!("miku"));
        assert_eq!(call(FunctionKind::Trim, vec![value!("  x ")]).unwrap(), value!("x"));
        assert_eq!(call(FunctionKind::Reverse, vec![value!("abc")]).unwrap(), value!("cba"));
        assert_eq!(call(FunctionKind::Length, vec![value!("日本")]).unwrap(), value!(2));
        assert_eq!(call(FunctionKind::Length, vec![value!([1, 2, 3])]).unwrap(), value!(3));
        assert_eq!(call(FunctionKind::Upper, vec![Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn test_concat() {
        assert_eq!(
            call(FunctionKind::Concat, vec![value!("a"), Value::Null, value!(1)]).unwrap(),
            value!("a1")
        );
        assert_eq!(
            call(FunctionKind::ConcatWs, vec![value!("-"), value!("a"), Value::Null, value!("b")]).unwrap(),
            value!("a-b")
        );
    }

    #[test]
    fn test_substring() {
        let s = value!("hatsune");
        assert_eq!(call(FunctionKind::Substring, vec![s.clone(), value!(0), value!(3)]).unwrap(), value!("hat"));
        assert_eq!(call(FunctionKind::Substring, vec![s.clone(), value!(3)]).unwrap(), value!("sune"));
        assert_eq!(call(FunctionKind::Substring, vec![s.clone(), value!((-3))]).unwrap(), value!("une"));
        assert_eq!(call(FunctionKind::Substring, vec![s, value!(10)]).unwrap(), value!(""));
    }

    #[test]
    fn test_replace_explode_implode() {
        assert_eq!(
            call(FunctionKind::Replace, vec![value!("a-b-c"), value!("-"), value!("+")]).unwrap(),
            value!("a+b+c")
        );
        assert_eq!(
            call(FunctionKind::Explode, vec![value!("a,b")]).unwrap(),
            value!(["a", "b"])
        );
        assert_eq!(
            call(FunctionKind::Implode, vec![value!(["a", "b"]), value!("|")]).unwrap(),
            value!("a|b")
        );
    }

    #[test]
    fn test_math() {
        assert_eq!(call(FunctionKind::Round, vec![value!(2.346), value!(2)]).unwrap(), value!(2.35));
        assert_eq!(call(FunctionKind::Round, vec![value!("2.5")]).unwrap(), value!(3.0));
        assert_eq!(call(FunctionKind::Floor, vec![value!(2.7)]).unwrap(), value!(2));
        assert_eq!(call(FunctionKind::Ceil, vec![value!(2.1)]).unwrap(), value!(3));
        assert_eq!(call(FunctionKind::Abs, vec![value!((-4))]).unwrap(), value!(4));
        assert_eq!(call(FunctionKind::Mod, vec![value!(7), value!(3)]).unwrap(), value!(1));
        assert!(matches!(
            call(FunctionKind::Mod, vec![value!(7), value!(0)]),
            Err(QueryError::DivisionByZero)
        ));
        assert!(matches!(
            call(FunctionKind::Abs, vec![value!("abc")]),
            Err(QueryError::NotNumeric(_))
        ));
        assert_eq!(call(FunctionKind::Floor, vec![Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn test_null_handling() {
        assert_eq!(
            call(FunctionKind::Coalesce, vec![Value::Null, value!("x"), value!("y")]).unwrap(),
            value!("x")
        );
        assert_eq!(call(FunctionKind::Coalesce, vec![Value::Null]).unwrap(), Value::Null);
        assert_eq!(call(FunctionKind::IfNull, vec![Value::Null, value!(0)]).unwrap(), value!(0));
        assert_eq!(call(FunctionKind::IfNull, vec![value!(5), value!(0)]).unwrap(), value!(5));
    }

    #[test]
    fn test_sha256() {
        assert_eq!(
            call(FunctionKind::Sha256, vec![value!("abc")]).unwrap(),
            value!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn test_dates() {
        assert_eq!(
            call(FunctionKind::DateFormat, vec![value!(0), value!("%Y-%m-%d")]).unwrap(),
            value!("1970-01-01")
        );
        assert_eq!(
            call(FunctionKind::DateFormat, vec![value!("2024-03-09 10:11:12"), value!("%d/%m/%Y %H:%M")]).unwrap(),
            value!("09/03/2024 10:11")
        );
        assert!(matches!(
            call(FunctionKind::DateFormat, vec![value!("yesterday"), value!("%Y")]),
            Err(QueryError::TypeError(_))
        ));
        let now = call(FunctionKind::Now, vec![]).unwrap();
        assert!(DateTime::parse_from_rfc3339(now.as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_uuid_is_unique() {
        let a = call(FunctionKind::Uuid, vec![]).unwrap();
        let b = call(FunctionKind::Uuid, vec![]).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str().unwrap().len(), 36);
    }

    #[test]
    fn test_aggregate_kind_rejected() {
        assert!(matches!(call(FunctionKind::Sum, vec![value!(1)]), Err(QueryError::Execution(_))));
    }
}
