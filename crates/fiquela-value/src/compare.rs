//! 值比较模块
//!
//! - `loose_eq`: 宽松相等(数字字符串与数字相等,null 与 false/"" 相等)
//! - `strict_eq`: 类型与值都相同
//! - `compare`: 条件判断用的偏序比较,涉及 null 或无法比较时返回 None
//! - `sort_cmp`: ORDER BY 使用的全序比较,null 排在最前
//! - `natural_cmp`: 忽略大小写、按数字段数值比较的自然排序

use crate::value::Value;
use std::cmp::Ordering;

/// 数值视图
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(n) => n,
        }
    }

    pub fn is_int(self) -> bool {
        matches!(self, Number::Int(_))
    }

    fn cmp_num(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(i) => Value::Int(i),
            Number::Float(f) => Value::Float(f),
        }
    }
}

/// 解析数字字符串: `-?\d+(\.\d+)?([eE][+-]?\d+)?`,允许首尾空白
pub fn parse_numeric(text: &str) -> Option<Number> {
    let s = text.trim();
    let body = s.strip_prefix('-').unwrap_or(s);
    let (mantissa, exponent) = match body.find(|c: char| c == 'e' || c == 'E') {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };
    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (mantissa, None),
    };

    let all_digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) {
        return None;
    }
    if let Some(frac) = frac_part {
        if !all_digits(frac) {
            return None;
        }
    }
    if let Some(exp) = exponent {
        let digits = exp.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(exp);
        if !all_digits(digits) {
            return None;
        }
    }

    if frac_part.is_none() && exponent.is_none() {
        if let Ok(n) = s.parse::<i64>() {
            return Some(Number::Int(n));
        }
    }
    s.parse::<f64>().ok().map(Number::Float)
}

impl Value {
    /// # Brief
    /// 数值视图:整数、浮点数以及数字字符串可转换,布尔值与其他类型不可转换
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Int(n) => Some(Number::Int(*n)),
            Value::Float(n) => Some(Number::Float(*n)),
            Value::String(s) => parse_numeric(s),
            _ => None,
        }
    }

    /// # Brief
    /// 宽松相等,对应 `=` 运算符
    ///
    /// # Arguments
    /// * `other` - 比较对象
    ///
    /// # Returns
    /// 两个可数值化的值按数值比较;null 等于 null、false 与 "";
    /// 布尔值按真值比较;数组与记录逐元素宽松比较
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, v) | (v, Value::Null) => {
                matches!(v, Value::Boolean(false)) || matches!(v, Value::String(s) if s.is_empty())
            }
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Boolean(b), v) | (v, Value::Boolean(b)) => *b == v.truthy(),
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Record(a), Value::Record(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map(|w| v.loose_eq(w)).unwrap_or(false))
            }
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x.cmp_num(y) == Some(Ordering::Equal),
                _ => match (a, b) {
                    (Value::String(x), Value::String(y)) => x == y,
                    _ => false,
                },
            },
        }
    }

    /// 严格相等,对应 `==` 运算符: 类型与值都必须相同
    pub fn strict_eq(&self, other: &Value) -> bool {
        self == other
    }

    /// # Brief
    /// 条件判断用的比较
    ///
    /// # Returns
    /// 可数值化的值按数值比较,两个字符串按字典序,布尔值 false < true;
    /// 任一侧为 null 或类型无法比较时返回 None
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x.cmp_num(y),
                _ => match (a, b) {
                    (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
                    _ => None,
                },
            },
        }
    }

    /// # Brief
    /// ORDER BY 使用的全序比较
    ///
    /// # Returns
    /// 先按类型等级(null < 布尔 < 数字 < 字符串 < 数组 < 记录),
    /// 等级相同时按 `compare` 的结果。数字字符串与数字同级,
    /// 不会和普通字符串按字典序比较
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        let rank = self.sort_rank().cmp(&other.sort_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        if let Some(ord) = self.compare(other) {
            return ord;
        }
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Array(a), Value::Array(b)) => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.sort_cmp(y))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Value::Record(a), Value::Record(b)) => a.len().cmp(&b.len()),
            _ => Ordering::Equal,
        }
    }

    fn sort_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::String(s) if parse_numeric(s).is_some() => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Record(_) => 5,
        }
    }

    /// 自然排序比较: "file2" < "file10",忽略大小写
    pub fn natural_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (a, b) => natural_cmp_str(&a.to_text(), &b.to_text()),
        }
    }
}

/// 自然排序的字符串比较
pub fn natural_cmp_str(a: &str, b: &str) -> Ordering {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let mut x = a.chars().peekable();
    let mut y = b.chars().peekable();

    loop {
        match (x.peek().copied(), y.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(c1), Some(c2)) if c1.is_ascii_digit() && c2.is_ascii_digit() => {
                let run1 = take_digits(&mut x);
                let run2 = take_digits(&mut y);
                let t1 = run1.trim_start_matches('0');
                let t2 = run2.trim_start_matches('0');
                let ord = t1
                    .len()
                    .cmp(&t2.len())
                    .then_with(|| t1.cmp(t2))
                    .then_with(|| run1.len().cmp(&run2.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(c1), Some(c2)) => {
                if c1 != c2 {
                    return c1.cmp(&c2);
                }
                x.next();
                y.next();
            }
        }
    }
}

fn take_digits(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(&c) = it.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        it.next();
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value;
    use proptest::prelude::*;

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric("42"), Some(Number::Int(42)));
        assert_eq!(parse_numeric(" -7 "), Some(Number::Int(-7)));
        assert_eq!(parse_numeric("1.5"), Some(Number::Float(1.5)));
        assert_eq!(parse_numeric("2e3"), Some(Number::Float(2000.0)));
        assert_eq!(parse_numeric("1,5"), None);
        assert_eq!(parse_numeric("1."), None);
        assert_eq!(parse_numeric(".5"), None);
        assert_eq!(parse_numeric("abc"), None);
        assert_eq!(parse_numeric(""), None);
        assert_eq!(
            parse_numeric("99999999999999999999"),
            Some(Number::Float(99999999999999999999.0))
        );
    }

    #[test]
    fn test_loose_eq() {
        assert!(value!(1).loose_eq(&value!("1")));
        assert!(value!(1).loose_eq(&value!(1.0)));
        assert!(value!("1.0").loose_eq(&value!("1")));
        assert!(value!(null).loose_eq(&value!(null)));
        assert!(value!(null).loose_eq(&value!(false)));
        assert!(value!(null).loose_eq(&value!("")));
        assert!(!value!(null).loose_eq(&value!(0)));
        assert!(value!(true).loose_eq(&value!("yes")));
        assert!(!value!("a").loose_eq(&value!("A")));
        assert!(value!([1, "2"]).loose_eq(&value!(["1", 2])));
    }

    #[test]
    fn test_strict_eq() {
        assert!(value!(1).strict_eq(&value!(1)));
        assert!(!value!(1).strict_eq(&value!("1")));
        assert!(!value!(1).strict_eq(&value!(1.0)));
    }

    #[test]
    fn test_compare() {
        assert_eq!(value!(100).compare(&value!(200)), Some(Ordering::Less));
        assert_eq!(value!("300").compare(&value!(200)), Some(Ordering::Greater));
        assert_eq!(value!("abc").compare(&value!("abd")), Some(Ordering::Less));
        assert_eq!(value!(null).compare(&value!(1)), None);
        assert_eq!(value!("abc").compare(&value!(1)), None);
    }

    #[test]
    fn test_sort_cmp_nulls_first() {
        let mut values = vec![value!("b"), value!(2), value!(null), value!(true), value!(1.5)];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(values, vec![value!(null), value!(true), value!(1.5), value!(2), value!("b")]);
    }

    #[test]
    fn test_sort_cmp_numeric_strings_before_text() {
        assert_eq!(value!("3").sort_cmp(&value!("100")), Ordering::Less);
        assert_eq!(value!("100").sort_cmp(&value!("2x")), Ordering::Less);
        assert_eq!(value!("3").sort_cmp(&value!("2x")), Ordering::Less);

        let mut forward = vec![value!("3"), value!("100"), value!("2x")];
        let mut backward = vec![value!("2x"), value!("100"), value!("3")];
        forward.sort_by(|a, b| a.sort_cmp(b));
        backward.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(forward, vec![value!("3"), value!("100"), value!("2x")]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp_str("file2", "file10"), Ordering::Less);
        assert_eq!(natural_cmp_str("File10", "file9"), Ordering::Greater);
        assert_eq!(natural_cmp_str("a", "A"), Ordering::Equal);
        assert_eq!(natural_cmp_str("x01", "x1"), Ordering::Greater);
        assert_eq!(value!(null).natural_cmp(&value!("a")), Ordering::Less);
    }

    proptest! {
        #[test]
        fn prop_int_strings_loose_equal(n in any::<i64>()) {
            prop_assert!(Value::Int(n).loose_eq(&Value::from(n.to_string())));
        }

        #[test]
        fn prop_sort_cmp_transitive_over_strings(
            a in "[a-z0-9]{0,4}",
            b in "[a-z0-9]{0,4}",
            c in "[a-z0-9]{0,4}",
        ) {
            let (x, y, z) = (Value::from(a), Value::from(b), Value::from(c));
            prop_assert_eq!(x.sort_cmp(&y), y.sort_cmp(&x).reverse());
            if x.sort_cmp(&y) != Ordering::Greater && y.sort_cmp(&z) != Ordering::Greater {
                prop_assert_ne!(x.sort_cmp(&z), Ordering::Greater);
            }
        }

        #[test]
        fn prop_sort_cmp_antisymmetric(a in any::<i64>(), b in "[a-z0-9]{0,6}") {
            let x = Value::Int(a);
            let y = Value::from(b);
            prop_assert_eq!(x.sort_cmp(&y), y.sort_cmp(&x).reverse());
        }
    }
}
