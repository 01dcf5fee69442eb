//! Parser that consumes the lexer and builds expression trees.
//
//  Grammar (informal, lowest precedence first):
//
//      expr        ::= or_expr [ 'if' or_expr 'else' expr ]
//      or_expr     ::= and_expr ( 'or' and_expr )*
//      and_expr    ::= not_expr ( 'and' not_expr )*
//      not_expr    ::= 'not' not_expr | comparison
//      comparison  ::= arith ( comp_op arith )*
//      arith       ::= term ( ('+' | '-') term )*
//      term        ::= factor ( ('*' | '/' | '//' | '%') factor )*
//      factor      ::= ('-' | '+') factor | power
//      power       ::= postfix [ '**' factor ]
//      postfix     ::= atom ( '.' IDENT | '[' subscript ']' | '(' args ')' )*
//      atom        ::= INT | FLOAT | STR+ | IDENT | '(' ... ')' | '[' ... ']' | '{' ... '}'
//
//  Names always come out as `NameScope::Global`; the compiler fixes the
//  scope once it knows every name the template binds.

use super::ast::*;
use super::lexer::{LexError, Lexer, Spanned, Token};

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "else", "None", "True", "False",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Char offset into the parsed text.
    pub offset: usize,
    pub message: String,
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        Self {
            offset: e.offset,
            message: e.message,
        }
    }
}

type ParseResult<T> = Result<T, ParseError>;

/// A whole string as one expression (a bare `a, b` is a tuple).
pub fn parse_expression(src: &str) -> ParseResult<Expr> {
    let mut p = Parser::new(src)?;
    let expr = p.parse_expr_list()?;
    p.expect_end()?;
    Ok(expr)
}

/// `target = expr` or a bare expression statement.
pub fn parse_statement(src: &str) -> ParseResult<Stmt> {
    let mut p = Parser::new(src)?;
    let start = p.offset();
    let first = p.parse_expr_list()?;
    if p.eat(&Token::Assign) {
        let target = to_target(first, start)?;
        let value = p.parse_expr_list()?;
        p.expect_end()?;
        return Ok(Stmt::Assign(target, value));
    }
    p.expect_end()?;
    Ok(Stmt::Expr(first))
}

/// The `targets in iterable` part of a `for` header.
pub fn parse_for_header(src: &str) -> ParseResult<(Target, Expr)> {
    let mut p = Parser::new(src)?;
    let start = p.offset();
    let mut targets = vec![p.parse_postfix()?];
    let mut trailing_comma = false;
    while p.eat(&Token::Comma) {
        if p.is_keyword("in") {
            trailing_comma = true;
            break;
        }
        targets.push(p.parse_postfix()?);
    }
    let target = if targets.len() == 1 && !trailing_comma {
        targets.pop().map(|t| to_target(t, start)).transpose()?
    } else {
        Some(to_target(Expr::TupleLit(targets), start)?)
    };
    if !p.is_keyword("in") {
        return Err(p.error_here("expected 'in' in for loop"));
    }
    p.advance();
    let iter = p.parse_expr_list()?;
    p.expect_end()?;
    target
        .map(|t| (t, iter))
        .ok_or_else(|| ParseError {
            offset: start,
            message: "missing loop target".into(),
        })
}

/// The parameter list of `def with`, parentheses included.
pub fn parse_params(src: &str) -> ParseResult<Params> {
    let mut p = Parser::new(src)?;
    p.expect(&Token::LParen, "'(' after 'def with'")?;
    let mut params = Params::default();
    while !p.eat(&Token::RParen) {
        let offset = p.offset();
        if p.eat(&Token::DoubleStar) {
            params.extra = Some(p.expect_name()?);
        } else if p.eat(&Token::Star) {
            if params.extra.is_some() {
                return Err(p.error_at(offset, "*parameter after **parameter"));
            }
            params.rest = Some(p.expect_name()?);
        } else {
            let name = p.expect_name()?;
            if params.rest.is_some() || params.extra.is_some() {
                return Err(p.error_at(offset, "parameter after *parameter"));
            }
            let default = if p.eat(&Token::Assign) {
                Some(p.parse_expr()?)
            } else {
                None
            };
            let after_default = params.positional.last().is_some_and(|prev| prev.default.is_some());
            if default.is_none() && after_default {
                return Err(p.error_at(offset, "non-default parameter follows default parameter"));
            }
            if params.names().any(|n| n == name) {
                return Err(p.error_at(offset, format!("duplicate parameter '{name}'")));
            }
            params.positional.push(Param { name, default });
        }
        if !p.eat(&Token::Comma) {
            p.expect(&Token::RParen, "',' or ')' in parameter list")?;
            break;
        }
    }
    p.expect_end()?;
    Ok(params)
}

fn to_target(expr: Expr, offset: usize) -> ParseResult<Target> {
    match expr {
        Expr::Name(name, _) => Ok(Target::Name(name)),
        Expr::TupleLit(items) | Expr::ListLit(items) => Ok(Target::Tuple(
            items
                .into_iter()
                .map(|e| to_target(e, offset))
                .collect::<ParseResult<_>>()?,
        )),
        Expr::Index(base, key) => Ok(Target::Index(*base, *key)),
        _ => Err(ParseError {
            offset,
            message: "cannot assign to expression".into(),
        }),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn new(src: &str) -> ParseResult<Self> {
        let tokens = Lexer::new(src).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tokens, pos: 0 })
    }

    fn peek(&self) -> &Token {
        // the lexer always ends with Eof
        self.tokens
            .get(self.pos)
            .map_or(&Token::Eof, |s| &s.token)
    }

    fn peek_at(&self, n: usize) -> &Token {
        self.tokens
            .get(self.pos + n)
            .map_or(&Token::Eof, |s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or(self.tokens.last())
            .map_or(0, |s| s.offset)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Ident(id) if id == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            offset,
            message: message.into(),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.offset(), message)
    }

    fn unexpected(&self) -> ParseError {
        match self.peek() {
            Token::Eof => self.error_here("unexpected end of expression"),
            token => self.error_here(format!("unexpected token {token:?}")),
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> ParseResult<()> {
        if self.eat(token) {
            Ok(())
        } else if self.peek() == &Token::Eof {
            Err(self.error_here(format!("expected {what}, found end of expression")))
        } else {
            Err(self.error_here(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn expect_name(&mut self) -> ParseResult<String> {
        match self.peek().clone() {
            Token::Ident(name) if !KEYWORDS.contains(&name.as_str()) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here("expected a name")),
        }
    }

    fn expect_end(&self) -> ParseResult<()> {
        match self.peek() {
            Token::Eof => Ok(()),
            _ => Err(self.unexpected()),
        }
    }

    /// Tokens that can never start an expression; used to stop a
    /// comma-separated list before a closing bracket or `=`.
    fn at_list_end(&self) -> bool {
        matches!(
            self.peek(),
            Token::Eof
                | Token::RParen
                | Token::RBracket
                | Token::RBrace
                | Token::Assign
                | Token::Colon
        )
    }

    fn parse_expr_list(&mut self) -> ParseResult<Expr> {
        let first = self.parse_expr()?;
        if self.peek() != &Token::Comma {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.at_list_end() {
                break;
            }
            items.push(self.parse_expr()?);
        }
        Ok(Expr::TupleLit(items))
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        let body = self.parse_or()?;
        if self.eat_keyword("if") {
            let test = self.parse_or()?;
            if !self.eat_keyword("else") {
                return Err(self.error_here("expected 'else' in conditional expression"));
            }
            let orelse = self.parse_expr()?;
            return Ok(Expr::Conditional {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let first = self.parse_and()?;
        if !self.is_keyword("or") {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat_keyword("or") {
            operands.push(self.parse_and()?);
        }
        Ok(Expr::BoolOp(BoolOp::Or, operands))
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let first = self.parse_not()?;
        if !self.is_keyword("and") {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat_keyword("and") {
            operands.push(self.parse_not()?);
        }
        Ok(Expr::BoolOp(BoolOp::And, operands))
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.eat_keyword("not") {
            let operand = self.parse_not()?;
            return Ok(Expr::UnaryOp(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        let op = match self.peek() {
            Token::EqEq => CompareOp::Eq,
            Token::NotEq => CompareOp::NotEq,
            Token::Lt => CompareOp::Lt,
            Token::LtE => CompareOp::LtE,
            Token::Gt => CompareOp::Gt,
            Token::GtE => CompareOp::GtE,
            Token::Ident(kw) if kw == "in" => CompareOp::In,
            Token::Ident(kw) if kw == "is" => {
                if matches!(self.peek_at(1), Token::Ident(n) if n == "not") {
                    self.advance();
                    CompareOp::IsNot
                } else {
                    CompareOp::Is
                }
            }
            Token::Ident(kw)
                if kw == "not" && matches!(self.peek_at(1), Token::Ident(n) if n == "in") =>
            {
                self.advance();
                CompareOp::NotIn
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let left = self.parse_arith()?;
        let mut chain = Vec::new();
        while let Some(op) = self.compare_op() {
            chain.push((op, self.parse_arith()?));
        }
        if chain.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), chain))
        }
    }

    fn parse_arith(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::BinaryOp(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::DoubleSlash => BinaryOp::FloorDiv,
                Token::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::BinaryOp(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.parse_factor()?;
        // fold `-1` into a literal
        match (op, operand) {
            (UnaryOp::Neg, Expr::Literal(Const::Int(i))) => Ok(Expr::Literal(Const::Int(-i))),
            (UnaryOp::Neg, Expr::Literal(Const::Float(f))) => Ok(Expr::Literal(Const::Float(-f))),
            (op, operand) => Ok(Expr::UnaryOp(op, Box::new(operand))),
        }
    }

    fn parse_power(&mut self) -> ParseResult<Expr> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::DoubleStar) {
            // right associative, binds tighter than unary minus on its left
            let exponent = self.parse_factor()?;
            return Ok(Expr::BinaryOp(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let name = match self.advance() {
                        Token::Ident(name) => name,
                        _ => return Err(self.error_at(self.offset(), "expected attribute name after '.'")),
                    };
                    expr = Expr::Attribute(Box::new(expr), name);
                }
                Token::LBracket => {
                    self.advance();
                    expr = self.parse_subscript(expr)?;
                }
                Token::LParen => {
                    self.advance();
                    expr = self.parse_call(expr)?;
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_subscript(&mut self, base: Expr) -> ParseResult<Expr> {
        let start = match self.peek() {
            Token::Colon => None,
            _ => Some(Box::new(self.parse_expr()?)),
        };
        if !self.eat(&Token::Colon) {
            self.expect(&Token::RBracket, "']'")?;
            let key = start.ok_or_else(|| self.error_here("empty subscript"))?;
            return Ok(Expr::Index(Box::new(base), key));
        }
        let stop = match self.peek() {
            Token::Colon | Token::RBracket => None,
            _ => Some(Box::new(self.parse_expr()?)),
        };
        let step = if self.eat(&Token::Colon) {
            match self.peek() {
                Token::RBracket => None,
                _ => Some(Box::new(self.parse_expr()?)),
            }
        } else {
            None
        };
        self.expect(&Token::RBracket, "']'")?;
        Ok(Expr::Slice {
            base: Box::new(base),
            start,
            stop,
            step,
        })
    }

    fn parse_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.eat(&Token::RParen) {
            let offset = self.offset();
            let is_keyword_arg = matches!(self.peek(), Token::Ident(_))
                && self.peek_at(1) == &Token::Assign;
            if is_keyword_arg {
                let name = self.expect_name()?;
                self.advance();
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(self.error_at(offset, format!("keyword argument repeated: {name}")));
                }
                kwargs.push((name, self.parse_expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error_at(offset, "positional argument follows keyword argument"));
                }
                args.push(self.parse_expr()?);
            }
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RParen, "',' or ')' in call")?;
                break;
            }
        }
        Ok(Expr::Call {
            callee: Box::new(callee),
            args,
            kwargs,
        })
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let offset = self.offset();
        match self.advance() {
            Token::Int(i) => Ok(Expr::Literal(Const::Int(i))),
            Token::Float(f) => Ok(Expr::Literal(Const::Float(f))),
            Token::Str(mut s) => {
                while let Token::Str(next) = self.peek() {
                    s.push_str(next);
                    self.advance();
                }
                Ok(Expr::Literal(Const::Str(s)))
            }
            Token::Ident(id) if id == "None" => Ok(Expr::Literal(Const::None)),
            Token::Ident(id) if id == "True" => Ok(Expr::Literal(Const::Bool(true))),
            Token::Ident(id) if id == "False" => Ok(Expr::Literal(Const::Bool(false))),
            Token::Ident(id) if KEYWORDS.contains(&id.as_str()) => {
                Err(self.error_at(offset, format!("unexpected keyword '{id}'")))
            }
            Token::Ident(id) => Ok(Expr::Name(id, NameScope::Global)),
            Token::LParen => {
                if self.eat(&Token::RParen) {
                    return Ok(Expr::TupleLit(Vec::new()));
                }
                let inner = self.parse_expr_list()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                while !self.eat(&Token::RBracket) {
                    items.push(self.parse_expr()?);
                    if !self.eat(&Token::Comma) {
                        self.expect(&Token::RBracket, "',' or ']' in list")?;
                        break;
                    }
                }
                Ok(Expr::ListLit(items))
            }
            Token::LBrace => {
                let mut entries = Vec::new();
                while !self.eat(&Token::RBrace) {
                    let key = self.parse_expr()?;
                    self.expect(&Token::Colon, "':' in dict literal")?;
                    let value = self.parse_expr()?;
                    entries.push((key, value));
                    if !self.eat(&Token::Comma) {
                        self.expect(&Token::RBrace, "',' or '}' in dict literal")?;
                        break;
                    }
                }
                Ok(Expr::DictLit(entries))
            }
            Token::Eof => Err(self.error_at(offset, "unexpected end of expression")),
            token => Err(self.error_at(offset, format!("unexpected token {token:?}"))),
        }
    }
}
