//! 数据源模块
//!
//! 执行器只依赖 `RecordSource` 契约:按定位符返回惰性的记录序列。
//! 这里提供两个内置实现:
//! - `MemorySource`: 内存中的命名数据集
//! - `JsonFileSource`: `.json` 文档或逐行读取的 `.ndjson` / `.jsonl` 文件

use crate::{QueryError, QueryResult};
use fiquela_common::FiqError;
use fiquela_value::{FieldPath, Record, Resolution, Value, ValueError};
use indexmap::IndexMap;
use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 惰性记录序列
pub type RecordStream<'a> = Box<dyn Iterator<Item = QueryResult<Record>> + 'a>;

/// 记录来源
pub trait RecordSource {
    /// # Brief
    /// 按定位符打开记录序列
    ///
    /// # Arguments
    /// * `locator` - FROM 子句中的定位符
    ///
    /// # Returns
    /// 惰性记录序列;数据源不存在或内容损坏时返回 Source 错误
    fn records(&self, locator: &Locator) -> QueryResult<RecordStream<'_>>;

    /// 用于调试输出的简短描述,如 `[json](users.json)`
    fn describe(&self) -> String;
}

/// 数据源定位符 `[format](path).query.path`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Locator {
    pub format: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
}

impl Locator {
    /// # Brief
    /// 解析定位符文本
    ///
    /// # Arguments
    /// * `text` - `*`、`data.items` 或 `[json](file.json).data.items`
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() || text == "*" {
            return Self::default();
        }
        let mut rest = text;
        let mut locator = Self::default();

        if let Some(after) = rest.strip_prefix('[') {
            if let Some(end) = after.find(']') {
                locator.format = non_empty(&after[..end]);
                rest = &after[end + 1..];
            }
        }
        if let Some(after) = rest.strip_prefix('(') {
            if let Some(end) = after.find(')') {
                locator.path = non_empty(&after[..end]);
                rest = &after[end + 1..];
            }
        }
        let query = rest.strip_prefix('.').unwrap_or(rest);
        locator.query = non_empty(query);
        locator
    }

    /// 是否指向整个数据源
    pub fn is_all(&self) -> bool {
        self.format.is_none() && self.path.is_none() && self.query.is_none()
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return write!(f, "*");
        }
        let bracketed = self.format.is_some() || self.path.is_some();
        if bracketed {
            write!(f, "[{}]", self.format.as_deref().unwrap_or(""))?;
            if let Some(path) = &self.path {
                write!(f, "({})", path)?;
            }
        }
        if let Some(query) = &self.query {
            if bracketed {
                write!(f, ".")?;
            }
            write!(f, "{}", query)?;
        }
        Ok(())
    }
}

fn source_error(message: impl Into<String>) -> QueryError {
    QueryError::Source(FiqError::Source(message.into()))
}

/// 按查询路径下钻到目标值
fn navigate<'a>(value: Cow<'a, Value>, query: Option<&str>) -> QueryResult<Cow<'a, Value>> {
    let Some(query) = query else {
        return Ok(value);
    };
    let path = FieldPath::parse(query)?;
    match &*value {
        Value::Record(record) => match record.lookup_path(&path, Resolution::Strict) {
            Ok(found) => Ok(Cow::Owned(found)),
            Err(ValueError::FieldNotFound(_)) => {
                Err(source_error(format!("Query path not found: {}", query)))
            }
            Err(e) => Err(e.into()),
        },
        other => Err(source_error(format!(
            "Cannot apply query path {} to {}",
            query,
            other.type_name()
        ))),
    }
}

fn element(value: &Value) -> QueryResult<Record> {
    match value {
        Value::Record(record) => Ok(record.clone()),
        other => Err(source_error(format!("Expected a record, found {}", other.type_name()))),
    }
}

/// 数组逐个产出元素,记录产出自身,null 为空序列
fn stream<'a>(value: Cow<'a, Value>) -> QueryResult<RecordStream<'a>> {
    match value {
        Cow::Borrowed(Value::Array(items)) => Ok(Box::new(items.iter().map(element))),
        Cow::Owned(Value::Array(items)) => Ok(Box::new(items.into_iter().map(|v| element(&v)))),
        Cow::Borrowed(Value::Record(record)) => Ok(Box::new(std::iter::once(Ok(record.clone())))),
        Cow::Owned(Value::Record(record)) => Ok(Box::new(std::iter::once(Ok(record)))),
        Cow::Borrowed(Value::Null) | Cow::Owned(Value::Null) => Ok(Box::new(std::iter::empty())),
        other => Err(source_error(format!(
            "Expected a list of records, found {}",
            other.type_name()
        ))),
    }
}

/// 内存数据源
///
/// 定位符的 path 部分选择命名数据集,未给出时使用默认数据集。
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    default: Value,
    datasets: IndexMap<String, Value>,
}

impl MemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        Self::from_value(Value::Array(records.into_iter().map(Value::Record).collect()))
    }

    pub fn from_value(value: impl Into<Value>) -> Self {
        Self {
            default: value.into(),
            datasets: IndexMap::new(),
        }
    }

    /// 注册命名数据集,通过 `[](name)` 访问
    pub fn with_dataset(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.datasets.insert(name.into(), value.into());
        self
    }
}

impl RecordSource for MemorySource {
    fn records(&self, locator: &Locator) -> QueryResult<RecordStream<'_>> {
        let dataset = match &locator.path {
            Some(name) => self
                .datasets
                .get(name)
                .ok_or_else(|| source_error(format!("Unknown dataset: {}", name)))?,
            None => &self.default,
        };
        debug!(locator = %locator, "opening memory source");
        stream(navigate(Cow::Borrowed(dataset), locator.query.as_deref())?)
    }

    fn describe(&self) -> String {
        "[memory]".to_string()
    }
}

/// JSON 文件数据源
#[derive(Debug, Clone, Default)]
pub struct JsonFileSource {
    path: Option<PathBuf>,
}

impl JsonFileSource {
    /// 默认文件;定位符中的 path 优先
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// 不带默认文件,完全由定位符决定
    pub fn unbound() -> Self {
        Self { path: None }
    }

    fn resolve(&self, locator: &Locator) -> QueryResult<(PathBuf, String)> {
        let path = match (&locator.path, &self.path) {
            (Some(p), _) => PathBuf::from(p),
            (None, Some(p)) => p.clone(),
            (None, None) => return Err(source_error("No input file given")),
        };
        let format = locator
            .format
            .clone()
            .or_else(|| path.extension().and_then(|e| e.to_str()).map(|e| e.to_string()))
            .unwrap_or_else(|| "json".to_string())
            .to_ascii_lowercase();
        Ok((path, format))
    }
}

fn parse_json(text: &str) -> QueryResult<Value> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(Value::from)
        .map_err(|e| QueryError::Source(FiqError::Json(e.to_string())))
}

impl RecordSource for JsonFileSource {
    fn records(&self, locator: &Locator) -> QueryResult<RecordStream<'_>> {
        let (path, format) = self.resolve(locator)?;
        debug!(path = %path.display(), format = %format, "opening json source");
        match format.as_str() {
            "json" => {
                let text = std::fs::read_to_string(&path).map_err(FiqError::from)?;
                let value = parse_json(&text)?;
                stream(navigate(Cow::Owned(value), locator.query.as_deref())?)
            }
            "ndjson" | "jsonl" => {
                let file = File::open(&path).map_err(FiqError::from)?;
                let query = locator.query.clone();
                let lines = BufReader::new(file).lines().filter(|line| match line {
                    Ok(l) => !l.trim().is_empty(),
                    Err(_) => true,
                });
                Ok(Box::new(lines.flat_map(move |line| -> RecordStream<'static> {
                    let records = line
                        .map_err(|e| QueryError::Source(FiqError::from(e)))
                        .and_then(|l| parse_json(&l))
                        .and_then(|v| navigate(Cow::Owned(v), query.as_deref()).map(Cow::into_owned))
                        .and_then(|v| stream(Cow::Owned(v)));
                    match records {
                        Ok(records) => records,
                        Err(e) => Box::new(std::iter::once(Err(e))),
                    }
                })))
            }
            other => Err(source_error(format!("Unsupported format: {}", other))),
        }
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("[json]({})", path.display()),
            None => "[json]".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiquela_value::{record, value};
    use std::io::Write;

    fn collect(stream: RecordStream<'_>) -> Vec<Record> {
        stream.collect::<QueryResult<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_locator_parse() {
        assert!(Locator::parse("*").is_all());
        assert!(Locator::parse("").is_all());

        let loc = Locator::parse("[json](data/users.json).data.items");
        assert_eq!(loc.format.as_deref(), Some("json"));
        assert_eq!(loc.path.as_deref(), Some("data/users.json"));
        assert_eq!(loc.query.as_deref(), Some("data.items"));
        assert_eq!(loc.to_string(), "[json](data/users.json).data.items");

        let plain = Locator::parse("orders");
        assert_eq!(plain.query.as_deref(), Some("orders"));
        assert_eq!(plain.to_string(), "orders");

        let no_format = Locator::parse("[](other)");
        assert_eq!(no_format.format, None);
        assert_eq!(no_format.to_string(), "[](other)");
    }

    #[test]
    fn test_memory_source() {
        let source = MemorySource::from_value(value!({
            "users": [{ "id": 1 }, { "id": 2 }],
            "meta": { "v": 1 }
        }))
        .with_dataset("extra", value!([{ "x": true }]));

        let users = collect(source.records(&Locator::parse("users")).unwrap());
        assert_eq!(users, vec![record! { "id": 1 }, record! { "id": 2 }]);

        let meta = collect(source.records(&Locator::parse("meta")).unwrap());
        assert_eq!(meta, vec![record! { "v": 1 }]);

        let extra = collect(source.records(&Locator::parse("[](extra)")).unwrap());
        assert_eq!(extra.len(), 1);

        assert!(matches!(
            source.records(&Locator::parse("missing")),
            Err(QueryError::Source(_))
        ));
        assert!(source.records(&Locator::parse("[](nope)")).is_err());
    }

    #[test]
    fn test_non_record_elements() {
        let source = MemorySource::from_value(value!([1, 2]));
        let items: Vec<_> = source.records(&Locator::default()).unwrap().collect();
        assert!(items.iter().all(|r| r.is_err()));
    }

    #[test]
    fn test_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"data": {{"items": [{{"a": 1}}, {{"a": 2}}]}}}}"#).unwrap();
        let source = JsonFileSource::new(file.path());
        let rows = collect(source.records(&Locator::parse("data.items")).unwrap());
        assert_eq!(rows, vec![record! { "a": 1 }, record! { "a": 2 }]);
        assert!(source.describe().starts_with("[json]("));
    }

    #[test]
    fn test_ndjson_file() {
        let mut file = tempfile::Builder::new().suffix(".ndjson").tempfile().unwrap();
        writeln!(file, r#"{{"a": 1}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"a": 2}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        let source = JsonFileSource::new(file.path());
        let items: Vec<_> = source.records(&Locator::default()).unwrap().collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap(), &record! { "a": 1 });
        assert!(items[2].is_err());
    }

    #[test]
    fn test_missing_file() {
        let source = JsonFileSource::new("/definitely/not/here.json");
        let err = source.records(&Locator::default()).err().unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::Source);
    }

    #[test]
    fn test_malformed_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{{ broken").unwrap();
        let source = JsonFileSource::new(file.path());
        assert!(matches!(
            source.records(&Locator::default()),
            Err(QueryError::Source(FiqError::Json(_)))
        ));
    }
}
