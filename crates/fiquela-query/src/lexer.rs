//! 词法分析模块
//!
//! 分两步完成:
//! 1. logos 切分基础词法单元(关键字、比较符号、引号字符串、数字、字段路径、数据源定位符)
//! 2. 组装:标识符后紧跟 `(` 时,按括号配对截取整段参数,合并为一个函数调用单元

use logos::Logos;
use std::fmt;
use std::ops::Range;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[token("SELECT", ignore(ascii_case))]
    Select,
    #[token("DISTINCT", ignore(ascii_case))]
    Distinct,
    #[token("AS", ignore(ascii_case))]
    As,
    #[token("FROM", ignore(ascii_case))]
    From,
    #[token("INNER", ignore(ascii_case))]
    Inner,
    #[token("LEFT", ignore(ascii_case))]
    Left,
    #[token("RIGHT", ignore(ascii_case))]
    Right,
    #[token("FULL", ignore(ascii_case))]
    Full,
    #[token("OUTER", ignore(ascii_case))]
    Outer,
    #[token("JOIN", ignore(ascii_case))]
    Join,
    #[token("ON", ignore(ascii_case))]
    On,
    #[token("WHERE", ignore(ascii_case))]
    Where,
    #[token("HAVING", ignore(ascii_case))]
    Having,
    #[token("GROUP", ignore(ascii_case))]
    Group,
    #[token("ORDER", ignore(ascii_case))]
    Order,
    #[token("BY", ignore(ascii_case))]
    By,
    #[token("ASC", ignore(ascii_case))]
    Asc,
    #[token("DESC", ignore(ascii_case))]
    Desc,
    #[token("NATSORT", ignore(ascii_case))]
    Natsort,
    #[token("SHUFFLE", ignore(ascii_case))]
    Shuffle,
    #[token("LIMIT", ignore(ascii_case))]
    Limit,
    #[token("OFFSET", ignore(ascii_case))]
    Offset,

    #[token("AND", ignore(ascii_case))]
    And,
    #[token("OR", ignore(ascii_case))]
    Or,
    #[token("XOR", ignore(ascii_case))]
    Xor,
    #[token("NOT", ignore(ascii_case))]
    Not,
    #[token("IN", ignore(ascii_case))]
    In,
    #[token("LIKE", ignore(ascii_case))]
    Like,
    #[token("IS", ignore(ascii_case))]
    Is,
    #[token("CONTAINS", ignore(ascii_case))]
    Contains,
    #[token("STARTS_WITH", ignore(ascii_case))]
    StartsWith,
    #[token("ENDS_WITH", ignore(ascii_case))]
    EndsWith,

    #[token("=")]
    Eq,
    #[token("==")]
    EqStrict,
    #[token("!=")]
    Ne,
    #[token("<>")]
    Ne2,
    #[token("!==")]
    NeStrict,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token("*")]
    Star,

    /// 引号字符串,保留引号
    #[regex(r#""([^"\\]|\\.)*""#, |lex| lex.slice().to_string())]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| lex.slice().to_string())]
    Quoted(String),

    /// 未闭合的引号字符串,一直延伸到输入结束
    #[regex(r#""([^"\\]|\\.)*"#, |lex| lex.slice().to_string())]
    #[regex(r#"'([^'\\]|\\.)*"#, |lex| lex.slice().to_string())]
    Unterminated(String),

    /// 数字,保留原文
    #[regex(r"-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().to_string())]
    Number(String),

    /// 字段路径: `a.b`, `` `a.b`.c ``, `items[].price`, `items.0`
    #[regex(
        r"(`[^`]*`|[A-Za-z_$@][A-Za-z0-9_$@]*)(\[\])?(\.(`[^`]*`|[A-Za-z0-9_$@]+)(\[\])?)*",
        |lex| lex.slice().to_string()
    )]
    Path(String),

    /// 数据源定位符: `[json](file.json).data.items`
    #[regex(
        r"\[[A-Za-z0-9_\-]*\](\([^)]*\))?(\.(`[^`]*`|[A-Za-z0-9_$@]+))*",
        |lex| lex.slice().to_string()
    )]
    Locator(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Quoted(s)
            | Token::Unterminated(s)
            | Token::Number(s)
            | Token::Path(s)
            | Token::Locator(s) => write!(f, "{}", s),
            Token::Eq => write!(f, "="),
            Token::EqStrict => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::Ne2 => write!(f, "<>"),
            Token::NeStrict => write!(f, "!=="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Star => write!(f, "*"),
            other => write!(f, "{}", format!("{:?}", other).to_uppercase()),
        }
    }
}

/// 组装后的词法单元
#[derive(Debug, Clone, PartialEq)]
pub enum Lexeme {
    /// 基础词法单元
    Token(Token),
    /// 函数调用 `NAME(arg, ...)`,参数保留原文
    Function { name: String, args: Vec<String> },
    /// 无法识别的字符
    Unknown(String),
}

impl fmt::Display for Lexeme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lexeme::Token(t) => write!(f, "{}", t),
            Lexeme::Function { name, args } => write!(f, "{}({})", name, args.join(", ")),
            Lexeme::Unknown(s) => write!(f, "{}", s),
        }
    }
}

pub type Spanned = (Lexeme, Range<usize>);

pub struct Lexer;

impl Lexer {
    /// # Brief
    /// 将 DSL 文本切分为词法单元序列
    ///
    /// # Arguments
    /// * `input` - DSL 文本
    ///
    /// # Returns
    /// 带字节区间的词法单元;不会失败,非法字符以 Unknown 返回
    pub fn tokenize(input: &str) -> Vec<Spanned> {
        let raw: Vec<(Lexeme, Range<usize>)> = Token::lexer(input)
            .spanned()
            .map(|(result, span)| match result {
                Ok(token) => (Lexeme::Token(token), span),
                Err(()) => (Lexeme::Unknown(input[span.clone()].to_string()), span),
            })
            .collect();

        let mut out = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            let (lexeme, span) = &raw[i];
            if let (Lexeme::Token(Token::Path(name)), Some((Lexeme::Token(Token::LParen), paren))) =
                (lexeme, raw.get(i + 1))
            {
                if is_identifier(name) && span.end == paren.start {
                    if let Some(close) = find_closing_paren(input, paren.start) {
                        let args = split_arguments(&input[paren.start + 1..close]);
                        out.push((
                            Lexeme::Function {
                                name: name.clone(),
                                args,
                            },
                            span.start..close + 1,
                        ));
                        i += 1;
                        while i < raw.len() && raw[i].1.start <= close {
                            i += 1;
                        }
                        continue;
                    }
                }
            }
            out.push((lexeme.clone(), span.clone()));
            i += 1;
        }

        tracing::trace!(count = out.len(), "tokenized query");
        out
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// 从 `open` 处的左括号开始查找配对的右括号,跳过引号内的内容
fn find_closing_paren(input: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (offset, c) in input[open..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// 按顶层逗号切分参数,括号与引号内的逗号不切分
fn split_arguments(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in text.chars() {
        if let Some(q) = quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    args.push(current.trim().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexemes(input: &str) -> Vec<Lexeme> {
        Lexer::tokenize(input).into_iter().map(|(l, _)| l).collect()
    }

    #[test]
    fn test_basic_tokens() {
        let tokens = lexemes("select id, price FROM * where price >= 100");
        assert_eq!(tokens.len(), 10);
        assert_eq!(tokens[0], Lexeme::Token(Token::Select));
        assert_eq!(tokens[1], Lexeme::Token(Token::Path("id".into())));
        assert_eq!(tokens[2], Lexeme::Token(Token::Comma));
        assert_eq!(tokens[5], Lexeme::Token(Token::Star));
        assert_eq!(tokens[8], Lexeme::Token(Token::Ge));
        assert_eq!(tokens[9], Lexeme::Token(Token::Number("100".into())));
    }

    #[test]
    fn test_quoted_strings_keep_quotes() {
        let tokens = lexemes(r#"name = "a, b" OR name = 'it\'s'"#);
        assert_eq!(tokens[2], Lexeme::Token(Token::Quoted("\"a, b\"".into())));
        assert_eq!(tokens[6], Lexeme::Token(Token::Quoted(r"'it\'s'".into())));
    }

    #[test]
    fn test_unterminated_string_runs_to_end() {
        let tokens = lexemes(r#"name = "open ended AND x = 1"#);
        assert_eq!(tokens.len(), 3);
        assert_eq!(
            tokens[2],
            Lexeme::Token(Token::Unterminated("\"open ended AND x = 1".into()))
        );
    }

    #[test]
    fn test_function_call_is_atomic() {
        let tokens = lexemes("SELECT CONCAT_WS(\", \", first, UPPER(last)) AS full");
        assert_eq!(tokens.len(), 4);
        assert_eq!(
            tokens[1],
            Lexeme::Function {
                name: "CONCAT_WS".into(),
                args: vec!["\", \"".into(), "first".into(), "UPPER(last)".into()],
            }
        );
        assert_eq!(tokens[2], Lexeme::Token(Token::As));
    }

    #[test]
    fn test_function_requires_adjacent_paren() {
        let tokens = lexemes("id IN (1, 2)");
        assert_eq!(tokens[1], Lexeme::Token(Token::In));
        assert_eq!(tokens[2], Lexeme::Token(Token::LParen));

        let tokens = lexemes("COUNT()");
        assert_eq!(
            tokens[0],
            Lexeme::Function {
                name: "COUNT".into(),
                args: vec![],
            }
        );
    }

    #[test]
    fn test_logical_words_without_spaces() {
        let tokens = lexemes("(a=1)OR(b=2)");
        assert!(tokens.contains(&Lexeme::Token(Token::Or)));
        let tokens = lexemes("a = 1AND b = 2");
        assert_eq!(tokens[2], Lexeme::Token(Token::Number("1".into())));
        assert_eq!(tokens[3], Lexeme::Token(Token::And));
    }

    #[test]
    fn test_keyword_prefix_is_path() {
        let tokens = lexemes("order.id ordering");
        assert_eq!(tokens[0], Lexeme::Token(Token::Path("order.id".into())));
        assert_eq!(tokens[1], Lexeme::Token(Token::Path("ordering".into())));
    }

    #[test]
    fn test_locator_token() {
        let tokens = lexemes("FROM [json](data/users.json).data.items WHERE");
        assert_eq!(
            tokens[1],
            Lexeme::Token(Token::Locator("[json](data/users.json).data.items".into()))
        );
    }

    #[test]
    fn test_paths_and_operators() {
        let tokens = lexemes("items[].price !== `a.b`.c");
        assert_eq!(tokens[0], Lexeme::Token(Token::Path("items[].price".into())));
        assert_eq!(tokens[1], Lexeme::Token(Token::NeStrict));
        assert_eq!(tokens[2], Lexeme::Token(Token::Path("`a.b`.c".into())));
    }

    #[test]
    fn test_unknown_character() {
        let tokens = lexemes("a = 1 ; b");
        assert!(matches!(tokens[3], Lexeme::Unknown(ref s) if s == ";"));
    }
}
