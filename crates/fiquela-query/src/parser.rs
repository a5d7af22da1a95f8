//! DSL 解析器模块
//!
//! 递归下降解析,直接驱动 `Query` 构建器,与流式 API 得到相同的状态。
//!
//! 子句必须按规范顺序出现:
//! `SELECT` → `FROM` → `JOIN`* → `WHERE` → `GROUP BY` / `HAVING` → `ORDER BY` → `LIMIT` / `OFFSET`

use crate::builder::{ConditionContext, Query};
use crate::condition::{LogicalOperator, Operator, Predicate};
use crate::functions::{FunctionArg, FunctionCall};
use crate::lexer::{Lexeme, Lexer, Spanned, Token};
use crate::state::{Direction, JoinKind};
use crate::{QueryError, QueryResult};
use fiquela_value::compare::parse_numeric;
use fiquela_value::{FieldPath, Value};
use tracing::debug;

/// 子句及其在规范顺序中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Select,
    From,
    Join,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Offset,
}

impl Clause {
    fn rank(self) -> u8 {
        match self {
            Clause::Select => 0,
            Clause::From => 1,
            Clause::Join => 2,
            Clause::Where => 3,
            Clause::GroupBy | Clause::Having => 4,
            Clause::OrderBy => 5,
            Clause::Limit | Clause::Offset => 6,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Clause::Select => "SELECT",
            Clause::From => "FROM",
            Clause::Join => "JOIN",
            Clause::Where => "WHERE",
            Clause::GroupBy => "GROUP BY",
            Clause::Having => "HAVING",
            Clause::OrderBy => "ORDER BY",
            Clause::Limit => "LIMIT",
            Clause::Offset => "OFFSET",
        }
    }
}

/// DSL 解析器
pub struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            tokens: Lexer::tokenize(input),
            pos: 0,
        }
    }

    /// # Brief
    /// 解析 DSL 文本为新的查询
    ///
    /// # Arguments
    /// * `input` - DSL 文本
    ///
    /// # Returns
    /// 语法错误返回带位置的 Parse 错误,未注册的函数返回 UnknownFunction
    pub fn parse(input: &str) -> QueryResult<Query> {
        let mut query = Query::new();
        Self::parse_into(input, &mut query)?;
        Ok(query)
    }

    /// # Brief
    /// 解析 DSL 文本并写入已有的查询构建器
    ///
    /// # Arguments
    /// * `input` - DSL 文本
    /// * `query` - 目标构建器,沿用其配置
    pub fn parse_into(input: &str, query: &mut Query) -> QueryResult<()> {
        let mut parser = Parser::new(input);
        parser.parse_query(query, false)?;
        debug!(query = input, "parsed");
        Ok(())
    }

    // ========== 词法单元游标 ==========

    fn peek(&self) -> Option<&Lexeme> {
        self.tokens.get(self.pos).map(|(l, _)| l)
    }

    fn peek_token(&self) -> Option<&Token> {
        match self.peek() {
            Some(Lexeme::Token(t)) => Some(t),
            _ => None,
        }
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.start)
            .unwrap_or(self.input.len())
    }

    fn advance(&mut self) -> Option<Spanned> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn skip_if(&mut self, token: &Token) -> bool {
        if self.peek_token() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> QueryError {
        match self.tokens.get(self.pos) {
            Some((Lexeme::Token(Token::Unterminated(s)), span)) => {
                QueryError::parse(span.start, format!("Unterminated string {}", s))
            }
            Some((lexeme, span)) => QueryError::parse(
                span.start,
                format!("Unexpected token '{}', expected {}", lexeme, expected),
            ),
            None => QueryError::parse(
                self.input.len(),
                format!("Unexpected end of input, expected {}", expected),
            ),
        }
    }

    fn expect(&mut self, token: Token) -> QueryResult<()> {
        if self.skip_if(&token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", token)))
        }
    }

    fn expect_path(&mut self, what: &str) -> QueryResult<String> {
        match self.peek_token() {
            Some(Token::Path(p)) => {
                let p = p.clone();
                self.pos += 1;
                Ok(p)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// 构建器返回的 Build 错误转为带位置的 Parse 错误
    fn at(position: usize) -> impl Fn(QueryError) -> QueryError {
        move |err| match err {
            QueryError::Build(message) => QueryError::parse(position, message),
            other => other,
        }
    }

    // ========== 子句 ==========

    fn parse_query(&mut self, query: &mut Query, nested: bool) -> QueryResult<()> {
        let mut last: Option<Clause> = None;
        let mut seen: Vec<Clause> = Vec::new();

        while let Some(lexeme) = self.peek() {
            let clause = match lexeme {
                Lexeme::Token(Token::Select) => Clause::Select,
                Lexeme::Token(Token::From) => Clause::From,
                Lexeme::Token(
                    Token::Inner | Token::Left | Token::Right | Token::Full | Token::Join,
                ) => Clause::Join,
                Lexeme::Token(Token::Where) => Clause::Where,
                Lexeme::Token(Token::Group) => Clause::GroupBy,
                Lexeme::Token(Token::Having) => Clause::Having,
                Lexeme::Token(Token::Order) => Clause::OrderBy,
                Lexeme::Token(Token::Limit) => Clause::Limit,
                Lexeme::Token(Token::Offset) => Clause::Offset,
                Lexeme::Token(Token::RParen) if nested => break,
                _ => return Err(self.unexpected("a clause keyword")),
            };

            let position = self.position();
            if clause != Clause::Join && seen.contains(&clause) {
                return Err(QueryError::parse(
                    position,
                    format!("Duplicate {} clause", clause.name()),
                ));
            }
            if let Some(prev) = last {
                if clause.rank() < prev.rank() {
                    return Err(QueryError::parse(
                        position,
                        format!("{} clause cannot follow {}", clause.name(), prev.name()),
                    ));
                }
            }
            seen.push(clause);
            last = Some(clause);

            match clause {
                Clause::Select => self.parse_select(query)?,
                Clause::From => self.parse_from(query)?,
                Clause::Join => self.parse_join(query)?,
                Clause::Where => {
                    self.pos += 1;
                    query.set_context(ConditionContext::Where);
                    self.parse_condition(query)?;
                }
                Clause::Having => {
                    self.pos += 1;
                    query.set_context(ConditionContext::Having);
                    self.parse_condition(query)?;
                }
                Clause::GroupBy => self.parse_group_by(query)?,
                Clause::OrderBy => self.parse_order_by(query)?,
                Clause::Limit => {
                    self.pos += 1;
                    let n = self.parse_count("LIMIT")?;
                    query.limit(n);
                }
                Clause::Offset => {
                    self.pos += 1;
                    let n = self.parse_count("OFFSET")?;
                    query.offset(n);
                }
            }
        }
        Ok(())
    }

    fn parse_select(&mut self, query: &mut Query) -> QueryResult<()> {
        self.pos += 1;
        if self.skip_if(&Token::Distinct) {
            query.distinct();
        }
        loop {
            let position = self.position();
            match self.peek().cloned() {
                Some(Lexeme::Token(Token::Star)) => {
                    self.pos += 1;
                    query.select_all();
                }
                Some(Lexeme::Token(Token::Path(path))) => {
                    self.pos += 1;
                    query.select(&path).map_err(Self::at(position))?;
                }
                Some(Lexeme::Function { name, args }) => {
                    self.pos += 1;
                    let call = self.build_call(&name, &args, position)?;
                    query.select_function(call).map_err(Self::at(position))?;
                }
                _ => return Err(self.unexpected("a field or function")),
            }
            if self.skip_if(&Token::As) {
                let position = self.position();
                let alias = self.parse_name("an alias")?;
                query.alias(&alias).map_err(Self::at(position))?;
            }
            if !self.skip_if(&Token::Comma) {
                break;
            }
        }
        Ok(())
    }

    /// 别名:标识符或引号字符串
    fn parse_name(&mut self, what: &str) -> QueryResult<String> {
        match self.peek_token() {
            Some(Token::Path(p)) => {
                let p = p.clone();
                self.pos += 1;
                Ok(p)
            }
            Some(Token::Quoted(q)) => {
                let q = unquote(q);
                self.pos += 1;
                Ok(q)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn parse_from(&mut self, query: &mut Query) -> QueryResult<()> {
        self.pos += 1;
        let locator = match self.peek_token() {
            Some(Token::Locator(l)) | Some(Token::Path(l)) => l.clone(),
            Some(Token::Quoted(q)) => unquote(q),
            Some(Token::Star) => "*".to_string(),
            Some(Token::LParen) => return self.parse_path_locator(query),
            _ => return Err(self.unexpected("a source locator")),
        };
        self.pos += 1;
        query.from(&locator);
        Ok(())
    }

    /// 省略格式的定位符 `(file.json).data.items`
    ///
    /// 左括号与条件分组共用词法单元,这里直接按原文截取到右括号
    /// 及其后紧跟的 `.段` 为止,再跳过被覆盖的词法单元
    fn parse_path_locator(&mut self, query: &mut Query) -> QueryResult<()> {
        let start = self.position();
        let close = match self.input[start..].find(')') {
            Some(offset) => start + offset,
            None => return Err(self.unexpected("a closing ')' in the source locator")),
        };
        let end = locator_query_end(self.input, close + 1);
        let text = &self.input[start..end];
        while self.pos < self.tokens.len() && self.tokens[self.pos].1.start < end {
            self.pos += 1;
        }
        query.from(text);
        Ok(())
    }

    fn parse_join(&mut self, query: &mut Query) -> QueryResult<()> {
        let position = self.position();
        let kind = match self.advance() {
            Some((Lexeme::Token(Token::Join), _)) => JoinKind::Inner,
            Some((Lexeme::Token(token), _)) => {
                let kind = match token {
                    Token::Inner => JoinKind::Inner,
                    Token::Left => JoinKind::Left,
                    Token::Right => JoinKind::Right,
                    _ => JoinKind::Full,
                };
                if kind != JoinKind::Inner {
                    self.skip_if(&Token::Outer);
                }
                self.expect(Token::Join)?;
                kind
            }
            _ => return Err(self.unexpected("JOIN")),
        };

        self.expect(Token::LParen)?;
        let mut right = Query::with_config(query.config());
        self.parse_query(&mut right, true)?;
        self.expect(Token::RParen)?;
        let alias = if self.skip_if(&Token::As) {
            Some(self.parse_name("a join alias")?)
        } else {
            None
        };
        self.expect(Token::On)?;
        let left_key = self.expect_path("a join key")?;
        let operator = self.parse_operator()?;
        let right_key = self.expect_path("a join key")?;

        query
            .join(kind, &right, alias.as_deref())
            .and_then(|q| q.on(&left_key, operator, &right_key))
            .map_err(Self::at(position))?;
        Ok(())
    }

    fn parse_group_by(&mut self, query: &mut Query) -> QueryResult<()> {
        self.pos += 1;
        self.expect(Token::By)?;
        loop {
            let position = self.position();
            let path = self.expect_path("a field")?;
            query.group_by(&path).map_err(Self::at(position))?;
            if !self.skip_if(&Token::Comma) {
                break;
            }
        }
        Ok(())
    }

    fn parse_order_by(&mut self, query: &mut Query) -> QueryResult<()> {
        self.pos += 1;
        self.expect(Token::By)?;
        loop {
            let position = self.position();
            let path = self.expect_path("a field")?;
            let direction = match self.peek_token() {
                Some(Token::Asc) => Some(Direction::Asc),
                Some(Token::Desc) => Some(Direction::Desc),
                Some(Token::Natsort) => Some(Direction::Natural),
                Some(Token::Shuffle) => Some(Direction::Shuffle),
                _ => None,
            };
            if direction.is_some() {
                self.pos += 1;
            }
            query
                .order_by_dir(&path, direction.unwrap_or_default())
                .map_err(Self::at(position))?;
            if !self.skip_if(&Token::Comma) {
                break;
            }
        }
        Ok(())
    }

    fn parse_count(&mut self, clause: &str) -> QueryResult<usize> {
        let position = self.position();
        match self.peek_token() {
            Some(Token::Number(n)) => {
                let n = n.parse::<usize>().map_err(|_| {
                    QueryError::parse(position, format!("{} expects a non-negative integer", clause))
                })?;
                self.pos += 1;
                Ok(n)
            }
            _ => Err(self.unexpected(&format!("a number after {}", clause))),
        }
    }

    // ========== 条件 ==========

    /// `term ((AND|OR|XOR) term)*`,第一个谓词以 AND 挂载
    fn parse_condition(&mut self, query: &mut Query) -> QueryResult<()> {
        let mut op = LogicalOperator::And;
        loop {
            self.parse_term(query, op)?;
            op = match self.peek_token() {
                Some(Token::And) => LogicalOperator::And,
                Some(Token::Or) => LogicalOperator::Or,
                Some(Token::Xor) => LogicalOperator::Xor,
                _ => break,
            };
            self.pos += 1;
        }
        Ok(())
    }

    fn parse_term(&mut self, query: &mut Query, op: LogicalOperator) -> QueryResult<()> {
        let position = self.position();
        if self.skip_if(&Token::LParen) {
            query.open_group(op);
            self.parse_condition(query)?;
            self.expect(Token::RParen)?;
            return query.close_group().map_err(Self::at(position));
        }

        let field = self.expect_path("a field")?;
        let operator = self.parse_operator()?;
        let operand = match operator {
            Operator::In | Operator::NotIn => self.parse_list()?,
            _ => self.parse_literal()?,
        };
        let predicate = Predicate::new(
            FieldPath::parse(&field).map_err(|e| Self::at(position)(e.into()))?,
            operator,
            operand,
        )?;
        query.push_predicate(op, predicate).map_err(Self::at(position))
    }

    /// 比较操作符;`IS NOT`、`NOT IN`、`NOT LIKE` 通过向前看并回退识别
    fn parse_operator(&mut self) -> QueryResult<Operator> {
        let start = self.pos;
        let operator = match self.advance() {
            Some((Lexeme::Token(token), _)) => match token {
                Token::Eq => Some(Operator::Equal),
                Token::EqStrict => Some(Operator::EqualStrict),
                Token::Ne | Token::Ne2 => Some(Operator::NotEqual),
                Token::NeStrict => Some(Operator::NotEqualStrict),
                Token::Lt => Some(Operator::LessThan),
                Token::Le => Some(Operator::LessThanOrEqual),
                Token::Gt => Some(Operator::GreaterThan),
                Token::Ge => Some(Operator::GreaterThanOrEqual),
                Token::In => Some(Operator::In),
                Token::Like => Some(Operator::Like),
                Token::Contains => Some(Operator::Contains),
                Token::StartsWith => Some(Operator::StartsWith),
                Token::EndsWith => Some(Operator::EndsWith),
                Token::Is => {
                    if self.skip_if(&Token::Not) {
                        Some(Operator::IsNot)
                    } else {
                        Some(Operator::Is)
                    }
                }
                Token::Not => {
                    if self.skip_if(&Token::In) {
                        Some(Operator::NotIn)
                    } else if self.skip_if(&Token::Like) {
                        Some(Operator::NotLike)
                    } else {
                        None
                    }
                }
                _ => None,
            },
            _ => None,
        };
        match operator {
            Some(op) => Ok(op),
            None => {
                self.pos = start;
                Err(self.unexpected("a comparison operator"))
            }
        }
    }

    fn parse_literal(&mut self) -> QueryResult<Value> {
        let value = match self.peek_token() {
            Some(Token::Quoted(q)) => Value::from(unquote(q)),
            Some(Token::Number(n)) | Some(Token::Path(n)) => sniff(n),
            _ => return Err(self.unexpected("a value")),
        };
        self.pos += 1;
        Ok(value)
    }

    /// `(a, b, ...)`;单个值也接受
    fn parse_list(&mut self) -> QueryResult<Value> {
        if !self.skip_if(&Token::LParen) {
            return Ok(Value::Array(vec![self.parse_literal()?]));
        }
        let mut items = Vec::new();
        if self.skip_if(&Token::RParen) {
            return Ok(Value::Array(items));
        }
        loop {
            items.push(self.parse_literal()?);
            if !self.skip_if(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(Value::Array(items))
    }

    // ========== 函数 ==========

    /// # Brief
    /// 由函数调用词法单元构建 FunctionCall
    ///
    /// # Arguments
    /// * `name` - 函数名
    /// * `args` - 参数原文,逐个重新切分
    /// * `position` - 错误位置
    fn build_call(&self, name: &str, args: &[String], position: usize) -> QueryResult<FunctionCall> {
        let mut parsed = Vec::with_capacity(args.len());
        for arg in args {
            let mut lexemes = Lexer::tokenize(arg).into_iter().map(|(l, _)| l);
            let (first, rest) = (lexemes.next(), lexemes.next());
            if rest.is_some() {
                return Err(QueryError::parse(
                    position,
                    format!("Invalid argument '{}' in {}()", arg, name),
                ));
            }
            let parsed_arg = match first {
                Some(Lexeme::Function { name: inner, args }) => {
                    FunctionArg::Call(Box::new(self.build_call(&inner, &args, position)?))
                }
                Some(Lexeme::Token(Token::Star)) => FunctionArg::Star,
                Some(Lexeme::Token(Token::Quoted(q))) => FunctionArg::Literal(Value::from(unquote(&q))),
                Some(Lexeme::Token(Token::Number(n))) => FunctionArg::Literal(sniff(&n)),
                Some(Lexeme::Token(Token::Path(p))) => match sniff(&p) {
                    Value::String(_) => FunctionArg::Field(
                        FieldPath::parse(&p).map_err(|e| Self::at(position)(e.into()))?,
                    ),
                    typed => FunctionArg::Literal(typed),
                },
                _ => {
                    return Err(QueryError::parse(
                        position,
                        format!("Invalid argument '{}' in {}()", arg, name),
                    ))
                }
            };
            parsed.push(parsed_arg);
        }
        FunctionCall::by_name(name, parsed).map_err(Self::at(position))
    }
}

/// # Brief
/// 字面量类型推断
///
/// `NULL` / `TRUE` / `FALSE` 不区分大小写转为对应类型,
/// 形如数字的文本转为整数或浮点数,其余保持字符串。小数逗号不视为数字。
/// 从 `from` 开始连续的 `.段` 结束位置,段为标识符字符或反引号包裹的名字
fn locator_query_end(input: &str, from: usize) -> usize {
    let bytes = input.as_bytes();
    let mut end = from;
    while bytes.get(end) == Some(&b'.') {
        let mut next = end + 1;
        if bytes.get(next) == Some(&b'`') {
            match input[next + 1..].find('`') {
                Some(offset) => next += offset + 2,
                None => break,
            }
        } else {
            while bytes
                .get(next)
                .map_or(false, |b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'@'))
            {
                next += 1;
            }
        }
        if next == end + 1 {
            break;
        }
        end = next;
    }
    end
}

pub(crate) fn sniff(text: &str) -> Value {
    if text.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if text.eq_ignore_ascii_case("true") {
        return Value::Boolean(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return Value::Boolean(false);
    }
    if text.trim() == text {
        if let Some(n) = parse_numeric(text) {
            return n.into();
        }
    }
    Value::from(text)
}

/// 去掉首尾引号并还原 `\"`、`\'`、`\\`
pub(crate) fn unquote(text: &str) -> String {
    let mut chars = text.chars();
    let inner = match chars.next() {
        Some(q @ ('"' | '\'')) => {
            let rest = chars.as_str();
            rest.strip_suffix(q).unwrap_or(rest)
        }
        _ => text,
    };
    let mut out = String::with_capacity(inner.len());
    let mut iter = inner.chars();
    while let Some(c) = iter.next() {
        if c == '\\' {
            match iter.next() {
                Some(e @ ('"' | '\'' | '\\')) => out.push(e),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
