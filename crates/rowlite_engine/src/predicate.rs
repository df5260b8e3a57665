//! The clause mini-language used by queries, updates and deletes.
//!
//! A clause is a backend-native predicate string with positional `?`
//! parameters, optionally followed by an ordering and limit tail:
//!
//! ```text
//! age > ? AND (name LIKE ? OR name IS NULL) ORDER BY age DESC LIMIT 10 OFFSET 2
//! ```
//!
//! Supported comparisons: `=`, `!=`, `<>`, `<`, `<=`, `>`, `>=`, `LIKE`
//! (with `%` and `_` wildcards), `IS [NOT] NULL` and `[NOT] IN (...)`.
//! Terms combine with `AND`/`OR` (AND binds tighter) and parentheses.
//! Operands are parameters, numeric literals, quoted strings or `NULL`.
//! The tail accepts `ORDER BY col [ASC|DESC], ...` and either
//! `LIMIT n [OFFSET m]` or `LIMIT m, n`. An empty clause matches every row.
//!
//! This is deliberately not a SQL parser: it covers exactly the clause
//! surface the persistence layer emits.

use crate::error::{EngineError, EngineResult};
use crate::row::ColumnMap;
use crate::value::Value;
use std::cmp::Ordering;

/// A parsed clause: optional filter expression, ordering keys and limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    filter: Option<Expr>,
    order: Vec<OrderKey>,
    limit: Option<Limit>,
    params: usize,
}

/// One `ORDER BY` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    /// Column to sort by.
    pub column: String,
    /// Descending when set; ascending otherwise.
    pub descending: bool,
}

impl OrderKey {
    /// Compares two rows under this key.
    ///
    /// Nulls sort before every other value; incomparable non-null pairs
    /// keep their relative order.
    pub fn compare(&self, a: &ColumnMap, b: &ColumnMap) -> Ordering {
        let va = a.get(&self.column).unwrap_or(&Value::Null);
        let vb = b.get(&self.column).unwrap_or(&Value::Null);
        let ord = match (va.is_null(), vb.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => va.loose_cmp(vb).unwrap_or(Ordering::Equal),
        };
        if self.descending {
            ord.reverse()
        } else {
            ord
        }
    }
}

/// A `LIMIT n [OFFSET m]` tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    /// Maximum number of rows to return.
    pub count: usize,
    /// Rows to skip before returning.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Compare {
        column: String,
        op: CompareOp,
        operand: Operand,
    },
    IsNull {
        column: String,
        negated: bool,
    },
    InList {
        column: String,
        operands: Vec<Operand>,
        negated: bool,
    },
    Like {
        column: String,
        operand: Operand,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Param(usize),
    Literal(Value),
}

impl Predicate {
    /// A predicate matching every row.
    #[must_use]
    pub fn all() -> Self {
        Self {
            filter: None,
            order: Vec::new(),
            limit: None,
            params: 0,
        }
    }

    /// Parses a clause string.
    ///
    /// `None` or a blank clause matches every row.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Parse`] when the clause is not in the
    /// supported grammar.
    pub fn parse(clause: Option<&str>) -> EngineResult<Self> {
        let text = clause.unwrap_or("").trim();
        if text.is_empty() {
            return Ok(Self::all());
        }
        let tokens = tokenize(text)?;
        Parser::new(tokens).parse()
    }

    /// Number of positional parameters the clause declares.
    pub fn param_count(&self) -> usize {
        self.params
    }

    /// Validates the bound argument count against the declared parameters.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ArgumentCount`] on a mismatch.
    pub fn check_args(&self, args: &[Value]) -> EngineResult<()> {
        if args.len() != self.params {
            return Err(EngineError::ArgumentCount {
                expected: self.params,
                actual: args.len(),
            });
        }
        Ok(())
    }

    /// The `ORDER BY` keys, in declaration order.
    pub fn order_keys(&self) -> &[OrderKey] {
        &self.order
    }

    /// The `LIMIT` tail, if present.
    pub fn limit(&self) -> Option<Limit> {
        self.limit
    }

    /// Checks whether the clause carries an ordering or limit tail.
    ///
    /// Update and delete statements reject tails.
    pub fn has_tail(&self) -> bool {
        !self.order.is_empty() || self.limit.is_some()
    }

    /// Evaluates the filter against one row.
    ///
    /// Missing columns read as null. Comparisons involving null are never
    /// matches.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ArgumentCount`] if a parameter has no bound
    /// argument.
    pub fn matches(&self, row: &ColumnMap, args: &[Value]) -> EngineResult<bool> {
        match &self.filter {
            None => Ok(true),
            Some(expr) => expr.eval(row, args),
        }
    }
}

impl Expr {
    fn eval(&self, row: &ColumnMap, args: &[Value]) -> EngineResult<bool> {
        match self {
            Expr::Compare {
                column,
                op,
                operand,
            } => {
                let cell = row.get(column).unwrap_or(&Value::Null);
                let target = resolve(operand, args)?;
                let ord = cell.loose_cmp(target);
                Ok(match op {
                    CompareOp::Eq => ord == Some(Ordering::Equal),
                    CompareOp::Ne => matches!(ord, Some(o) if o != Ordering::Equal),
                    CompareOp::Lt => ord == Some(Ordering::Less),
                    CompareOp::Le => {
                        matches!(ord, Some(Ordering::Less | Ordering::Equal))
                    }
                    CompareOp::Gt => ord == Some(Ordering::Greater),
                    CompareOp::Ge => {
                        matches!(ord, Some(Ordering::Greater | Ordering::Equal))
                    }
                })
            }
            Expr::IsNull { column, negated } => {
                let is_null = row.get(column).map_or(true, Value::is_null);
                Ok(is_null != *negated)
            }
            Expr::InList {
                column,
                operands,
                negated,
            } => {
                let cell = row.get(column).unwrap_or(&Value::Null);
                if cell.is_null() {
                    // NULL IN (...) is never a match, negated or not.
                    return Ok(false);
                }
                let mut found = false;
                for operand in operands {
                    if cell.loose_eq(resolve(operand, args)?) {
                        found = true;
                        break;
                    }
                }
                Ok(found != *negated)
            }
            Expr::Like { column, operand } => {
                let cell = row.get(column).unwrap_or(&Value::Null);
                let (Some(text), Some(pattern)) =
                    (cell.coerce_string(), resolve(operand, args)?.coerce_string())
                else {
                    return Ok(false);
                };
                Ok(like_match(&text, &pattern))
            }
            Expr::And(a, b) => Ok(a.eval(row, args)? && b.eval(row, args)?),
            Expr::Or(a, b) => Ok(a.eval(row, args)? || b.eval(row, args)?),
        }
    }
}

fn resolve<'a>(operand: &'a Operand, args: &'a [Value]) -> EngineResult<&'a Value> {
    match operand {
        Operand::Literal(v) => Ok(v),
        Operand::Param(index) => args.get(*index).ok_or(EngineError::ArgumentCount {
            expected: index + 1,
            actual: args.len(),
        }),
    }
}

/// `LIKE` pattern matching: `%` matches any run, `_` one character,
/// ASCII case-insensitive.
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    like_inner(&text, &pattern)
}

fn like_inner(text: &[char], pattern: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('%') => (0..=text.len()).any(|skip| like_inner(&text[skip..], &pattern[1..])),
        Some('_') => !text.is_empty() && like_inner(&text[1..], &pattern[1..]),
        Some(c) => text.first() == Some(c) && like_inner(&text[1..], &pattern[1..]),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str(String),
    Param,
    LParen,
    RParen,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Minus,
}

fn tokenize(text: &str) -> EngineResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '?' => {
                chars.next();
                tokens.push(Token::Param);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '=' => {
                chars.next();
                // Accept both = and ==.
                if chars.peek() == Some(&'=') {
                    chars.next();
                }
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(EngineError::parse("expected '=' after '!'"));
                }
                tokens.push(Token::Ne);
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some('=') => {
                        chars.next();
                        tokens.push(Token::Le);
                    }
                    Some('>') => {
                        chars.next();
                        tokens.push(Token::Ne);
                    }
                    _ => tokens.push(Token::Lt),
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '\'' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => {
                            // '' is an escaped quote.
                            if chars.peek() == Some(&'\'') {
                                chars.next();
                                s.push('\'');
                            } else {
                                break;
                            }
                        }
                        Some(c) => s.push(c),
                        None => {
                            return Err(EngineError::parse("unterminated string literal"));
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            '0'..='9' => {
                let mut n = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        n.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(EngineError::parse(format!(
                    "unexpected character '{other}' in clause"
                )));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    params: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            params: 0,
        }
    }

    fn parse(mut self) -> EngineResult<Predicate> {
        let filter = if self.peek_keyword("ORDER") || self.peek_keyword("LIMIT") {
            None
        } else {
            Some(self.parse_or()?)
        };

        let mut order = Vec::new();
        if self.take_keyword("ORDER") {
            if !self.take_keyword("BY") {
                return Err(EngineError::parse("expected BY after ORDER"));
            }
            loop {
                let column = self.expect_ident("ORDER BY column")?;
                let descending = if self.take_keyword("DESC") {
                    true
                } else {
                    self.take_keyword("ASC");
                    false
                };
                order.push(OrderKey { column, descending });
                if !self.take(&Token::Comma) {
                    break;
                }
            }
        }

        let mut limit = None;
        if self.take_keyword("LIMIT") {
            let first = self.expect_count("LIMIT")?;
            limit = Some(if self.take_keyword("OFFSET") {
                Limit {
                    count: first,
                    offset: self.expect_count("OFFSET")?,
                }
            } else if self.take(&Token::Comma) {
                // LIMIT offset, count form.
                Limit {
                    count: self.expect_count("LIMIT")?,
                    offset: first,
                }
            } else {
                Limit {
                    count: first,
                    offset: 0,
                }
            });
        }

        if self.pos != self.tokens.len() {
            return Err(EngineError::parse(format!(
                "unexpected trailing input at token {}",
                self.pos
            )));
        }

        Ok(Predicate {
            filter,
            order,
            limit,
            params: self.params,
        })
    }

    fn parse_or(&mut self) -> EngineResult<Expr> {
        let mut left = self.parse_and()?;
        while self.take_keyword("OR") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> EngineResult<Expr> {
        let mut left = self.parse_unit()?;
        while self.take_keyword("AND") {
            let right = self.parse_unit()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unit(&mut self) -> EngineResult<Expr> {
        if self.take(&Token::LParen) {
            let expr = self.parse_or()?;
            if !self.take(&Token::RParen) {
                return Err(EngineError::parse("expected closing parenthesis"));
            }
            return Ok(expr);
        }

        let column = self.expect_ident("column name")?;

        if let Some(op) = self.take_compare_op() {
            let operand = self.parse_operand()?;
            return Ok(Expr::Compare {
                column,
                op,
                operand,
            });
        }
        if self.take_keyword("IS") {
            let negated = self.take_keyword("NOT");
            if !self.take_keyword("NULL") {
                return Err(EngineError::parse("expected NULL after IS"));
            }
            return Ok(Expr::IsNull { column, negated });
        }
        if self.take_keyword("LIKE") {
            let operand = self.parse_operand()?;
            return Ok(Expr::Like { column, operand });
        }
        let negated = self.take_keyword("NOT");
        if self.take_keyword("IN") {
            return self.parse_in_list(column, negated);
        }

        Err(EngineError::parse(format!(
            "expected comparison after column '{column}'"
        )))
    }

    fn parse_in_list(&mut self, column: String, negated: bool) -> EngineResult<Expr> {
        if !self.take(&Token::LParen) {
            return Err(EngineError::parse("expected '(' after IN"));
        }
        let mut operands = Vec::new();
        loop {
            operands.push(self.parse_operand()?);
            if self.take(&Token::Comma) {
                continue;
            }
            if self.take(&Token::RParen) {
                break;
            }
            return Err(EngineError::parse("expected ',' or ')' in IN list"));
        }
        Ok(Expr::InList {
            column,
            operands,
            negated,
        })
    }

    fn parse_operand(&mut self) -> EngineResult<Operand> {
        if self.take(&Token::Param) {
            let index = self.params;
            self.params += 1;
            return Ok(Operand::Param(index));
        }
        let negative = self.take(&Token::Minus);
        match self.next() {
            Some(Token::Number(raw)) => Ok(Operand::Literal(parse_number(&raw, negative)?)),
            Some(Token::Str(s)) if !negative => Ok(Operand::Literal(Value::Text(s))),
            Some(Token::Ident(k)) if !negative && k.eq_ignore_ascii_case("NULL") => {
                Ok(Operand::Literal(Value::Null))
            }
            _ => Err(EngineError::parse("expected parameter or literal operand")),
        }
    }

    fn take_compare_op(&mut self) -> Option<CompareOp> {
        let op = match self.tokens.get(self.pos)? {
            Token::Eq => CompareOp::Eq,
            Token::Ne => CompareOp::Ne,
            Token::Lt => CompareOp::Lt,
            Token::Le => CompareOp::Le,
            Token::Gt => CompareOp::Gt,
            Token::Ge => CompareOp::Ge,
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn expect_ident(&mut self, what: &str) -> EngineResult<String> {
        match self.next() {
            Some(Token::Ident(s)) => Ok(s),
            _ => Err(EngineError::parse(format!("expected {what}"))),
        }
    }

    fn expect_count(&mut self, what: &str) -> EngineResult<usize> {
        match self.next() {
            Some(Token::Number(raw)) => raw
                .parse::<usize>()
                .map_err(|_| EngineError::parse(format!("invalid {what} count '{raw}'"))),
            _ => Err(EngineError::parse(format!("expected number after {what}"))),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(
            self.tokens.get(self.pos),
            Some(Token::Ident(s)) if s.eq_ignore_ascii_case(keyword)
        )
    }

    fn take_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn take(&mut self, token: &Token) -> bool {
        if self.tokens.get(self.pos) == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }
}

fn parse_number(raw: &str, negative: bool) -> EngineResult<Value> {
    if raw.contains('.') {
        let f: f64 = raw
            .parse()
            .map_err(|_| EngineError::parse(format!("invalid number '{raw}'")))?;
        Ok(Value::Real(if negative { -f } else { f }))
    } else {
        let n: i64 = raw
            .parse()
            .map_err(|_| EngineError::parse(format!("invalid number '{raw}'")))?;
        Ok(Value::Integer(if negative { -n } else { n }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row(pairs: &[(&str, Value)]) -> ColumnMap {
        pairs.iter().cloned().collect()
    }

    fn matches(clause: &str, row: &ColumnMap, args: &[Value]) -> bool {
        Predicate::parse(Some(clause))
            .unwrap()
            .matches(row, args)
            .unwrap()
    }

    #[test]
    fn empty_clause_matches_all() {
        let p = Predicate::parse(None).unwrap();
        assert!(p.matches(&ColumnMap::new(), &[]).unwrap());
        let p = Predicate::parse(Some("   ")).unwrap();
        assert_eq!(p.param_count(), 0);
        assert!(p.matches(&ColumnMap::new(), &[]).unwrap());
    }

    #[test]
    fn parameter_comparison() {
        let r = row(&[("age", Value::Integer(30))]);
        assert!(matches("age = ?", &r, &[Value::Integer(30)]));
        assert!(matches("age = ?", &r, &[Value::Text("30".into())]));
        assert!(!matches("age = ?", &r, &[Value::Integer(31)]));
        assert!(matches("age >= ?", &r, &[Value::Integer(30)]));
        assert!(matches("age < ?", &r, &[Value::Integer(40)]));
        assert!(matches("age != ?", &r, &[Value::Integer(29)]));
        assert!(matches("age <> ?", &r, &[Value::Integer(29)]));
    }

    #[test]
    fn literal_operands() {
        let r = row(&[("age", Value::Integer(30)), ("name", Value::Text("Ann".into()))]);
        assert!(matches("age = 30", &r, &[]));
        assert!(matches("age > 29.5", &r, &[]));
        assert!(matches("age = -30 OR age = 30", &r, &[]));
        assert!(matches("name = 'Ann'", &r, &[]));
        assert!(matches("name = 'An''n' OR name = 'Ann'", &r, &[]));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let r = row(&[("a", Value::Integer(1)), ("b", Value::Integer(0))]);
        // a=1 OR (b=1 AND a=0): true because of the OR's left side.
        assert!(matches("a = 1 OR b = 1 AND a = 0", &r, &[]));
        // (a=1 OR b=1) AND a=0: false.
        assert!(!matches("(a = 1 OR b = 1) AND a = 0", &r, &[]));
    }

    #[test]
    fn null_semantics() {
        let r = row(&[("x", Value::Null)]);
        assert!(!matches("x = ?", &r, &[Value::Null]));
        assert!(!matches("x != ?", &r, &[Value::Integer(1)]));
        assert!(matches("x IS NULL", &r, &[]));
        assert!(!matches("x IS NOT NULL", &r, &[]));
        // Missing columns read as null.
        assert!(matches("ghost IS NULL", &r, &[]));
    }

    #[test]
    fn in_list() {
        let r = row(&[("id", Value::Integer(2))]);
        assert!(matches("id IN (?, ?, ?)", &r, &[1.into(), 2.into(), 3.into()]));
        assert!(!matches("id IN (?, ?)", &r, &[4.into(), 5.into()]));
        assert!(matches("id NOT IN (?, ?)", &r, &[4.into(), 5.into()]));
        assert!(matches("id IN (1, 2)", &r, &[]));

        let null_row = row(&[("id", Value::Null)]);
        assert!(!matches("id IN (1, 2)", &null_row, &[]));
        assert!(!matches("id NOT IN (1, 2)", &null_row, &[]));
    }

    #[test]
    fn like_patterns() {
        let r = row(&[("name", Value::Text("Annette".into()))]);
        assert!(matches("name LIKE ?", &r, &["Ann%".into()]));
        assert!(matches("name LIKE ?", &r, &["ann%".into()]));
        assert!(matches("name LIKE ?", &r, &["%ette".into()]));
        assert!(matches("name LIKE ?", &r, &["A_nette".into()]));
        assert!(!matches("name LIKE ?", &r, &["Ann".into()]));
        assert!(matches("name LIKE 'a%e'", &r, &[]));
    }

    #[test]
    fn order_and_limit_tail() {
        let p = Predicate::parse(Some("age > ? ORDER BY age DESC, name LIMIT 5 OFFSET 2"))
            .unwrap();
        assert_eq!(p.param_count(), 1);
        assert!(p.has_tail());
        assert_eq!(p.order_keys().len(), 2);
        assert!(p.order_keys()[0].descending);
        assert!(!p.order_keys()[1].descending);
        assert_eq!(p.limit(), Some(Limit { count: 5, offset: 2 }));

        // Tail-only clause and the comma limit form.
        let p = Predicate::parse(Some("ORDER BY id LIMIT 2, 3")).unwrap();
        assert!(p.matches(&ColumnMap::new(), &[]).unwrap());
        assert_eq!(p.limit(), Some(Limit { count: 3, offset: 2 }));
    }

    #[test]
    fn order_key_comparison() {
        let key = OrderKey {
            column: "age".into(),
            descending: false,
        };
        let young = row(&[("age", Value::Integer(10))]);
        let old = row(&[("age", Value::Integer(90))]);
        let unset = row(&[("age", Value::Null)]);
        assert_eq!(key.compare(&young, &old), Ordering::Less);
        assert_eq!(key.compare(&unset, &young), Ordering::Less);

        let desc = OrderKey {
            column: "age".into(),
            descending: true,
        };
        assert_eq!(desc.compare(&young, &old), Ordering::Greater);
    }

    #[test]
    fn argument_count_checking() {
        let p = Predicate::parse(Some("a = ? AND b = ?")).unwrap();
        assert_eq!(p.param_count(), 2);
        assert!(p.check_args(&[1.into(), 2.into()]).is_ok());
        assert!(matches!(
            p.check_args(&[1.into()]),
            Err(EngineError::ArgumentCount {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn parse_errors() {
        for clause in [
            "age ==",
            "age !",
            "= 1",
            "name = 'unterminated",
            "age = 1 garbage garbage",
            "id IN ()",
            "id IN (1",
            "x IS 1",
            "ORDER age",
            "LIMIT x",
            "a = 1 @ b = 2",
        ] {
            assert!(
                Predicate::parse(Some(clause)).is_err(),
                "expected parse failure for {clause:?}"
            );
        }
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let r = row(&[("x", Value::Integer(1))]);
        assert!(matches("x = 1 and x is not null", &r, &[]));
        let p = Predicate::parse(Some("order by x desc limit 1")).unwrap();
        assert!(p.order_keys()[0].descending);
    }

    proptest! {
        #[test]
        fn integer_equality_matches_eval(cell in any::<i64>(), bound in any::<i64>()) {
            let r = row(&[("v", Value::Integer(cell))]);
            let p = Predicate::parse(Some("v = ?")).unwrap();
            let matched = p.matches(&r, &[Value::Integer(bound)]).unwrap();
            prop_assert_eq!(matched, cell == bound);
        }

        #[test]
        fn comparison_operators_agree_with_ord(cell in -1000i64..1000, bound in -1000i64..1000) {
            let r = row(&[("v", Value::Integer(cell))]);
            let cases = [
                ("v < ?", cell < bound),
                ("v <= ?", cell <= bound),
                ("v > ?", cell > bound),
                ("v >= ?", cell >= bound),
                ("v != ?", cell != bound),
            ];
            for (clause, expected) in cases {
                let p = Predicate::parse(Some(clause)).unwrap();
                prop_assert_eq!(p.matches(&r, &[Value::Integer(bound)]).unwrap(), expected);
            }
        }
    }
}
