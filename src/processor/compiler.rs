//! Statement compiler: classified lines in, [`Program`] out.
//!
//! Blocks are delimited by indentation exactly like the template author
//! wrote them. After the tree is built every name read is tagged as local
//! or global, so the executor never has to guess at render time.

use super::ast::*;
use super::expr_parser::{self, ParseError};
use super::inline::segment_line;
use super::lines::{Fragment, Inline, Keyword, Line, LineKind, Source};
use crate::error::SyntaxError;
use std::collections::BTreeSet;

pub fn compile_source(source: &Source) -> Result<Program, SyntaxError> {
    let mut compiler = Compiler {
        lines: &source.lines,
        pos: 0,
        params: None,
        seen_directive: false,
        locals: BTreeSet::new(),
    };
    let mut body = compiler.block(0, true)?;

    let params = compiler.params.unwrap_or_default();
    let mut locals = compiler.locals;
    locals.extend(params.names().map(str::to_string));
    for stmt in &mut body {
        resolve_stmt(stmt, &locals);
    }

    Ok(Program {
        params,
        body,
        locals,
        trailing_newline: source.trailing_newline,
    })
}

struct Compiler<'a> {
    lines: &'a [Line],
    pos: usize,
    params: Option<Params>,
    seen_directive: bool,
    /// Names bound by assignments and loop targets.
    locals: BTreeSet<String>,
}

fn fragment_error(line: usize, column: usize, err: ParseError) -> SyntaxError {
    SyntaxError::new(line, column + err.offset, err.message)
}

fn parse_fragment<T>(
    line: &Line,
    frag: &Fragment,
    parse: impl Fn(&str) -> Result<T, ParseError>,
) -> Result<T, SyntaxError> {
    parse(&frag.text).map_err(|e| fragment_error(line.number, frag.column, e))
}

fn text_line(number: usize, text: &str, column: usize, newline: bool) -> Result<Stmt, SyntaxError> {
    let segments = segment_line(text).map_err(|e| fragment_error(number, column, e))?;
    Ok(Stmt::Line { segments, newline })
}

impl<'a> Compiler<'a> {
    fn error(&self, line: &Line, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(line.number, line.indent + 1, message)
    }

    /// Indentation of the next non-blank line, if any.
    fn next_indent(&self) -> Option<usize> {
        self.lines[self.pos..]
            .iter()
            .find(|l| !l.is_blank())
            .map(|l| l.indent)
    }

    /// Statements of one block whose lines are indented at least `strip`.
    fn block(&mut self, strip: usize, top_level: bool) -> Result<Vec<Stmt>, SyntaxError> {
        let lines = self.lines;
        let mut body = Vec::new();
        while let Some(line) = lines.get(self.pos) {
            if line.is_blank() {
                // blank lines stay with the block only if it goes on after them
                if !top_level && self.next_indent().is_none_or(|indent| indent < strip) {
                    break;
                }
            } else if line.indent < strip {
                break;
            }
            self.pos += 1;

            match &line.kind {
                LineKind::Text { raw, newline } => {
                    let text: String = raw.chars().skip(strip).collect();
                    body.push(text_line(line.number, &text, strip + 1, *newline)?);
                }
                LineKind::Statement(frag) => {
                    self.seen_directive = true;
                    let stmt = parse_fragment(line, frag, expr_parser::parse_statement)?;
                    if let Stmt::Assign(target, _) = &stmt {
                        target.collect_names(&mut self.locals);
                    }
                    body.push(stmt);
                }
                LineKind::Directive {
                    keyword,
                    head,
                    inline,
                } => self.directive(line, *keyword, head, inline.as_ref(), top_level, &mut body)?,
            }
        }
        Ok(body)
    }

    fn directive(
        &mut self,
        line: &Line,
        keyword: Keyword,
        head: &Fragment,
        inline: Option<&Inline>,
        top_level: bool,
        body: &mut Vec<Stmt>,
    ) -> Result<(), SyntaxError> {
        if keyword == Keyword::DefWith {
            if self.params.is_some() {
                return Err(self.error(line, "duplicate 'def with'"));
            }
            if !top_level || self.seen_directive {
                return Err(self.error(line, "'def with' must be the first directive"));
            }
            self.seen_directive = true;
            self.params = Some(parse_fragment(line, head, expr_parser::parse_params)?);
            return Ok(());
        }
        self.seen_directive = true;

        match keyword {
            Keyword::If => {
                let test = parse_fragment(line, head, expr_parser::parse_expression)?;
                let branch = self.block_body(line, keyword, inline)?;
                body.push(Stmt::If(vec![(Some(test), branch)]));
            }
            Keyword::Elif | Keyword::Else => {
                let test = match keyword {
                    Keyword::Elif => Some(parse_fragment(line, head, expr_parser::parse_expression)?),
                    _ if head.text.trim().is_empty() => None,
                    _ => {
                        return Err(SyntaxError::new(
                            line.number,
                            head.column,
                            "unexpected text after 'else'",
                        ));
                    }
                };
                let open = matches!(
                    body.last(),
                    Some(Stmt::If(branches)) if branches.last().is_some_and(|(c, _)| c.is_some())
                );
                if !open {
                    return Err(self.error(
                        line,
                        format!("'{}' without a matching 'if'", keyword.as_str()),
                    ));
                }
                let branch = self.block_body(line, keyword, inline)?;
                if let Some(Stmt::If(branches)) = body.last_mut() {
                    branches.push((test, branch));
                }
            }
            Keyword::For => {
                let (target, iter) = parse_fragment(line, head, expr_parser::parse_for_header)?;
                target.collect_names(&mut self.locals);
                let loop_body = self.block_body(line, keyword, inline)?;
                body.push(Stmt::For {
                    target,
                    iter,
                    body: loop_body,
                });
            }
            Keyword::While => {
                let test = parse_fragment(line, head, expr_parser::parse_expression)?;
                let loop_body = self.block_body(line, keyword, inline)?;
                body.push(Stmt::While {
                    test,
                    body: loop_body,
                });
            }
            Keyword::Var => body.push(self.var(line, head)?),
            Keyword::DefWith => {}
        }
        Ok(())
    }

    /// The body of a block header: either its inline text or the indented
    /// lines after it.
    fn block_body(
        &mut self,
        header: &Line,
        keyword: Keyword,
        inline: Option<&Inline>,
    ) -> Result<Vec<Stmt>, SyntaxError> {
        if let Some(inline) = inline {
            return Ok(vec![text_line(
                header.number,
                &inline.text.text,
                inline.text.column,
                inline.newline,
            )?]);
        }

        let strip = match self.next_indent() {
            Some(indent) if indent > header.indent => indent,
            _ => {
                return Err(SyntaxError::new(
                    header.number + 1,
                    1,
                    format!("expected an indented block after '{}'", keyword.as_str()),
                ));
            }
        };
        let body = self.block(strip, false)?;

        if let Some(next) = self.lines[self.pos..].iter().find(|l| !l.is_blank()) {
            if next.indent > header.indent && next.indent < strip {
                return Err(self.error(next, "unindent does not match any outer indentation level"));
            }
        }
        Ok(body)
    }

    fn var(&mut self, line: &Line, head: &Fragment) -> Result<Stmt, SyntaxError> {
        let trimmed = head.text.trim_start();
        let name_column = head.column + head.text.chars().count() - trimmed.chars().count();
        let name: String = trimmed
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(SyntaxError::new(line.number, name_column, "expected a name after 'var'"));
        }
        let rest = trimmed[name.len()..].trim_start();
        let rest_column = head.column + head.text.chars().count() - rest.chars().count();

        if let Some(text) = rest.strip_prefix(':') {
            if text.trim().is_empty() && self.next_indent().is_some_and(|i| i > line.indent) {
                return Err(self.error(line, "the block form of 'var' is not supported"));
            }
            let text = text.strip_prefix(' ').unwrap_or(text);
            let column = rest_column + rest.chars().count() - text.chars().count();
            let segments = segment_line(text).map_err(|e| fragment_error(line.number, column, e))?;
            return Ok(Stmt::Var(name, VarValue::Text(segments)));
        }
        if let Some(src) = rest.strip_prefix('=') {
            let expr = expr_parser::parse_expression(src)
                .map_err(|e| fragment_error(line.number, rest_column + 1, e))?;
            return Ok(Stmt::Var(name, VarValue::Expr(expr)));
        }
        Err(SyntaxError::new(
            line.number,
            rest_column,
            format!("expected ':' or '=' after 'var {name}'"),
        ))
    }
}

// ── Scope resolution ────────────────────────────────────────────────

fn resolve_stmt(stmt: &mut Stmt, locals: &BTreeSet<String>) {
    match stmt {
        Stmt::Line { segments, .. } => resolve_segments(segments, locals),
        Stmt::Assign(target, value) => {
            resolve_target(target, locals);
            resolve_expr(value, locals);
        }
        Stmt::Expr(expr) => resolve_expr(expr, locals),
        Stmt::If(branches) => {
            for (test, body) in branches {
                if let Some(test) = test {
                    resolve_expr(test, locals);
                }
                body.iter_mut().for_each(|s| resolve_stmt(s, locals));
            }
        }
        Stmt::For { target, iter, body } => {
            resolve_target(target, locals);
            resolve_expr(iter, locals);
            body.iter_mut().for_each(|s| resolve_stmt(s, locals));
        }
        Stmt::While { test, body } => {
            resolve_expr(test, locals);
            body.iter_mut().for_each(|s| resolve_stmt(s, locals));
        }
        Stmt::Var(_, VarValue::Text(segments)) => resolve_segments(segments, locals),
        Stmt::Var(_, VarValue::Expr(expr)) => resolve_expr(expr, locals),
    }
}

fn resolve_segments(segments: &mut [Segment], locals: &BTreeSet<String>) {
    for segment in segments {
        if let Segment::Emit { expr, .. } = segment {
            resolve_expr(expr, locals);
        }
    }
}

fn resolve_target(target: &mut Target, locals: &BTreeSet<String>) {
    match target {
        Target::Name(_) => {}
        Target::Tuple(items) => items.iter_mut().for_each(|t| resolve_target(t, locals)),
        Target::Index(base, key) => {
            resolve_expr(base, locals);
            resolve_expr(key, locals);
        }
    }
}

fn resolve_expr(expr: &mut Expr, locals: &BTreeSet<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Name(name, scope) => {
            if locals.contains(name.as_str()) {
                *scope = NameScope::Local;
            }
        }
        Expr::Attribute(base, _) => resolve_expr(base, locals),
        Expr::Index(base, key) => {
            resolve_expr(base, locals);
            resolve_expr(key, locals);
        }
        Expr::Slice {
            base,
            start,
            stop,
            step,
        } => {
            resolve_expr(base, locals);
            for bound in [start, stop, step].into_iter().flatten() {
                resolve_expr(bound, locals);
            }
        }
        Expr::Call {
            callee,
            args,
            kwargs,
        } => {
            resolve_expr(callee, locals);
            args.iter_mut().for_each(|a| resolve_expr(a, locals));
            kwargs.iter_mut().for_each(|(_, v)| resolve_expr(v, locals));
        }
        Expr::BinaryOp(_, left, right) => {
            resolve_expr(left, locals);
            resolve_expr(right, locals);
        }
        Expr::UnaryOp(_, operand) => resolve_expr(operand, locals),
        Expr::BoolOp(_, operands) | Expr::ListLit(operands) | Expr::TupleLit(operands) => {
            operands.iter_mut().for_each(|e| resolve_expr(e, locals));
        }
        Expr::Compare(left, chain) => {
            resolve_expr(left, locals);
            chain.iter_mut().for_each(|(_, e)| resolve_expr(e, locals));
        }
        Expr::Conditional { test, body, orelse } => {
            resolve_expr(test, locals);
            resolve_expr(body, locals);
            resolve_expr(orelse, locals);
        }
        Expr::DictLit(entries) => {
            for (k, v) in entries {
                resolve_expr(k, locals);
                resolve_expr(v, locals);
            }
        }
    }
}
