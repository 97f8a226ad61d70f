/// SQL parser: converts the token stream into the query IR.
/// Hand-written recursive descent over a flat token vector.
use crate::aggregate::{AggKind, AggSpec};
use crate::filter::{FilterChain, FilterNode, LogicalOp};
use crate::operator::Cond;
use crate::query::Query;
use crate::sort::Sort;
use crate::sql::lexer::Token;
use crate::value::Value;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        if self.pos < self.tokens.len() {
            let token = self.tokens[self.pos].clone();
            self.pos += 1;
            Some(token)
        } else {
            None
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        match self.advance() {
            Some(ref t) if t == expected => Ok(()),
            Some(t) => Err(format!("expected {expected:?}, got {t:?}")),
            None => Err(format!("expected {expected:?}, got end of input")),
        }
    }

    /// Field position accepts bare identifiers and quoted identifiers
    /// (single-quoted, case preserved, used for dotted access).
    fn expect_field(&mut self) -> Result<String, String> {
        match self.advance() {
            Some(Token::Ident(s)) => Ok(s),
            Some(Token::StringLit(s)) => Ok(s),
            Some(t) => Err(format!("expected field name, got {t:?}")),
            None => Err("expected field name, got end of input".into()),
        }
    }

    pub fn parse(&mut self) -> Result<Query, String> {
        self.expect(&Token::Select)?;
        let projection = self.parse_projection()?;
        self.expect(&Token::From)?;
        let namespace = match self.advance() {
            Some(Token::Ident(s)) => s,
            Some(t) => Err(format!("expected namespace, got {t:?}"))?,
            None => Err("expected namespace, got end of input".to_string())?,
        };

        let mut query = Query::new(namespace);
        apply_projection(&mut query, projection);

        if self.peek() == Some(&Token::Where) {
            self.advance();
            query.filter = Some(self.parse_where()?);
        }

        if self.peek() == Some(&Token::Order) {
            self.advance();
            self.expect(&Token::By)?;
            query.sort = self.parse_order_by()?;
        }

        if self.peek() == Some(&Token::Limit) {
            self.advance();
            query.limit = Some(self.expect_count()?);
        }

        if self.peek() == Some(&Token::Offset) {
            self.advance();
            query.offset = Some(self.expect_count()?);
        }

        // Optional trailing semicolon
        if self.peek() == Some(&Token::Semicolon) {
            self.advance();
        }

        match self.peek() {
            None => Ok(query),
            Some(t) => Err(format!("unexpected trailing token {t:?}")),
        }
    }

    // ── Projection ──────────────────────────────────────────────

    fn parse_projection(&mut self) -> Result<Vec<SelectItem>, String> {
        let mut items = Vec::new();
        loop {
            items.push(self.parse_select_item()?);
            if self.peek() == Some(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(items)
    }

    fn parse_select_item(&mut self) -> Result<SelectItem, String> {
        match self.advance() {
            Some(Token::Star) => Ok(SelectItem::All),
            Some(Token::Count) => {
                self.expect(&Token::LParen)?;
                self.expect(&Token::Star)?;
                self.expect(&Token::RParen)?;
                Ok(SelectItem::CountAll)
            }
            Some(Token::Distinct) => {
                self.expect(&Token::LParen)?;
                let field = self.expect_field()?;
                self.expect(&Token::RParen)?;
                Ok(SelectItem::Distinct(field))
            }
            Some(Token::Ident(name)) => {
                // Aggregation call or a plain column.
                if self.peek() == Some(&Token::LParen) {
                    let kind = AggKind::parse(&name)
                        .ok_or_else(|| format!("unknown function {name:?}"))?;
                    self.advance();
                    let field = self.expect_field()?;
                    self.expect(&Token::RParen)?;
                    Ok(SelectItem::Agg(AggSpec { field, kind }))
                } else {
                    Ok(SelectItem::Column(name))
                }
            }
            Some(t) => Err(format!("unexpected token in select list: {t:?}")),
            None => Err("unexpected end of input in select list".into()),
        }
    }

    // ── WHERE ───────────────────────────────────────────────────

    /// Conditions join left to right: OR binds a condition to its immediate
    /// left sibling inside the surrounding AND chain, matching the fluent
    /// builder's `.or()` semantics.
    fn parse_where(&mut self) -> Result<FilterNode, String> {
        let mut chain = FilterChain::new();
        let first = self.parse_operand()?;
        chain.push(LogicalOp::And, first);

        loop {
            let op = match self.peek() {
                Some(Token::And) => LogicalOp::And,
                Some(Token::Or) => LogicalOp::Or,
                _ => break,
            };
            self.advance();
            let node = self.parse_operand()?;
            chain.push(op, node);
        }

        chain
            .into_tree()
            .ok_or_else(|| "empty WHERE clause".to_string())
    }

    /// One operand of an AND/OR chain: an optionally negated condition or
    /// parenthesized sub-expression.
    fn parse_operand(&mut self) -> Result<FilterNode, String> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.parse_operand()?;
            return Ok(FilterNode::Not(Box::new(inner)));
        }

        if self.peek() == Some(&Token::LParen) {
            self.advance();
            let inner = self.parse_where()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }

        self.parse_condition()
    }

    fn parse_condition(&mut self) -> Result<FilterNode, String> {
        let field = self.expect_field()?;

        match self.advance() {
            Some(Token::Eq) => Ok(FilterNode::condition(field, Cond::Eq, self.parse_literal()?)),
            Some(Token::Lt) => Ok(FilterNode::condition(field, Cond::Lt, self.parse_literal()?)),
            Some(Token::Le) => Ok(FilterNode::condition(field, Cond::Le, self.parse_literal()?)),
            Some(Token::Gt) => Ok(FilterNode::condition(field, Cond::Gt, self.parse_literal()?)),
            Some(Token::Ge) => Ok(FilterNode::condition(field, Cond::Ge, self.parse_literal()?)),
            Some(Token::In) => {
                let items = self.parse_literal_list()?;
                Ok(FilterNode::condition(field, Cond::Set, Value::Tuple(items)))
            }
            Some(Token::Range) => {
                let items = self.parse_literal_list()?;
                if items.len() != 2 {
                    return Err(format!(
                        "RANGE takes exactly two bounds, got {}",
                        items.len()
                    ));
                }
                Ok(FilterNode::condition(
                    field,
                    Cond::Range,
                    Value::Tuple(items),
                ))
            }
            Some(t) => Err(format!("expected comparison operator, got {t:?}")),
            None => Err("expected comparison operator, got end of input".into()),
        }
    }

    fn parse_literal_list(&mut self) -> Result<Vec<Value>, String> {
        self.expect(&Token::LParen)?;
        let mut items = Vec::new();
        loop {
            items.push(self.parse_literal()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                Some(t) => return Err(format!("expected ',' or ')', got {t:?}")),
                None => return Err("unterminated literal list".into()),
            }
        }
        Ok(items)
    }

    fn parse_literal(&mut self) -> Result<Value, String> {
        match self.advance() {
            Some(Token::Integer(i)) => Ok(Value::Int64(i)),
            Some(Token::Float(f)) => Ok(Value::Double(f)),
            Some(Token::Minus) => match self.advance() {
                Some(Token::Integer(i)) => Ok(Value::Int64(-i)),
                Some(Token::Float(f)) => Ok(Value::Double(-f)),
                other => Err(format!("expected number after '-', got {other:?}")),
            },
            Some(Token::StringLit(s)) => Ok(Value::String(s)),
            Some(Token::True) => Ok(Value::Bool(true)),
            Some(Token::False) => Ok(Value::Bool(false)),
            Some(Token::Null) => Ok(Value::Null),
            Some(t) => Err(format!("expected literal, got {t:?}")),
            None => Err("expected literal, got end of input".into()),
        }
    }

    // ── ORDER BY / LIMIT / OFFSET ───────────────────────────────

    fn parse_order_by(&mut self) -> Result<Vec<Sort>, String> {
        let mut sorts = Vec::new();
        loop {
            let field = self.expect_field()?;
            let desc = match self.peek() {
                Some(Token::Asc) => {
                    self.advance();
                    false
                }
                Some(Token::Desc) => {
                    self.advance();
                    true
                }
                _ => false,
            };
            sorts.push(Sort { field, desc });
            if self.peek() == Some(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(sorts)
    }

    fn expect_count(&mut self) -> Result<usize, String> {
        match self.advance() {
            Some(Token::Integer(i)) if i >= 0 => Ok(i as usize),
            Some(t) => Err(format!("expected non-negative integer, got {t:?}")),
            None => Err("expected integer, got end of input".into()),
        }
    }
}

enum SelectItem {
    All,
    CountAll,
    Column(String),
    Distinct(String),
    Agg(AggSpec),
}

fn apply_projection(query: &mut Query, items: Vec<SelectItem>) {
    for item in items {
        match item {
            SelectItem::All => {}
            // `count(*)` asks for the match total and no rows.
            SelectItem::CountAll => {
                query.req_total = true;
                query.limit = Some(0);
            }
            // The IR carries no column projection; named columns are
            // accepted and the full payload is returned.
            SelectItem::Column(_) => {}
            SelectItem::Distinct(field) => query.distinct.push(field),
            SelectItem::Agg(spec) => query.aggregations.push(spec),
        }
    }
}
