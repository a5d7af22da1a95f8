use colored::Colorize;
use fiquela_value::{Record, Value};
use std::fmt::Write;

pub struct Formatter {
    format: OutputFormat,
    color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Line,
}

impl Formatter {
    pub fn new(format: &str, color: bool) -> Self {
        let format = match format.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "jsonpretty" | "json-pretty" => OutputFormat::JsonPretty,
            "csv" => OutputFormat::Csv,
            "line" => OutputFormat::Line,
            _ => OutputFormat::Table,
        };

        Self { format, color }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// 把结果行渲染为完整的输出文本
    pub fn render(&self, rows: &[Record]) -> String {
        match self.format {
            OutputFormat::Json => self.render_json(rows, false),
            OutputFormat::JsonPretty => self.render_json(rows, true),
            _ if rows.is_empty() => {
                let msg = "No records found.";
                if self.color {
                    format!("{}\n", msg.dimmed())
                } else {
                    format!("{}\n", msg)
                }
            }
            OutputFormat::Table => self.render_table(rows),
            OutputFormat::Csv => self.render_csv(rows),
            OutputFormat::Line => self.render_line(rows),
        }
    }

    fn render_table(&self, rows: &[Record]) -> String {
        let columns = columns(rows);
        let cells: Vec<Vec<String>> = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|col| row.get(col).map(format_value).unwrap_or_default())
                    .collect()
            })
            .collect();

        let mut out = simple_table(&columns, &cells, self.color);
        let footer = format!("{} row(s)", rows.len());
        if self.color {
            let _ = writeln!(out, "{}", footer.dimmed());
        } else {
            let _ = writeln!(out, "{}", footer);
        }
        out
    }

    fn render_json(&self, rows: &[Record], pretty: bool) -> String {
        let values: Vec<serde_json::Value> = rows.iter().cloned().map(Into::into).collect();
        let output = if pretty {
            serde_json::to_string_pretty(&values)
        } else {
            serde_json::to_string(&values)
        };
        output.map(|json| json + "\n").unwrap_or_default()
    }

    fn render_csv(&self, rows: &[Record]) -> String {
        let columns = columns(rows);
        let mut out = String::new();
        let header: Vec<String> = columns.iter().map(|c| csv_escape(c)).collect();
        let _ = writeln!(out, "{}", header.join(","));

        for row in rows {
            let line: Vec<String> = columns
                .iter()
                .map(|col| {
                    row.get(col)
                        .map(|v| csv_escape(&format_value(v)))
                        .unwrap_or_default()
                })
                .collect();
            let _ = writeln!(out, "{}", line.join(","));
        }
        out
    }

    fn render_line(&self, rows: &[Record]) -> String {
        let mut out = String::new();
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                let _ = writeln!(out, "{}", "-".repeat(40));
            }
            for (key, value) in row.iter() {
                let key = if self.color {
                    key.cyan().to_string()
                } else {
                    key.to_string()
                };
                let _ = writeln!(out, "{}: {}", key, format_value(value));
            }
        }
        out
    }
}

/// 所有行出现过的列,按首次出现的顺序
fn columns(rows: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.to_string());
            }
        }
    }
    columns
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Record(rec) => {
            let items: Vec<String> = rec
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", items.join(", "))
        }
        other => other.to_text(),
    }
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn simple_table(headers: &[String], rows: &[Vec<String>], color: bool) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| "-".repeat(*w + 2))
        .collect::<Vec<_>>()
        .join("+");

    // 先补齐宽度再着色,颜色控制符不计入列宽
    let header_row: String = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let cell = pad(h, widths[i]);
            if color {
                format!(" {} ", cell.cyan().bold())
            } else {
                format!(" {} ", cell)
            }
        })
        .collect::<Vec<_>>()
        .join("|");

    let mut out = String::new();
    let _ = writeln!(out, "+{}+", separator);
    let _ = writeln!(out, "|{}|", header_row);
    let _ = writeln!(out, "+{}+", separator);

    for row in rows {
        let row_str: String = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!(" {} ", pad(cell, widths.get(i).copied().unwrap_or(0))))
            .collect::<Vec<_>>()
            .join("|");
        let _ = writeln!(out, "|{}|", row_str);
    }

    let _ = writeln!(out, "+{}+", separator);
    out
}

fn pad(s: &str, width: usize) -> String {
    let len = s.chars().count();
    format!("{}{}", s, " ".repeat(width.saturating_sub(len)))
}
