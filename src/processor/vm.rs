//! Executor: walks a compiled [`Program`] and renders it.
//!
//! One [`Machine`] exists per render. It owns the local variables, the
//! stack of active loop contexts, the output buffer and the `var`
//! namespace; the program itself is only borrowed, so the same program can
//! be rendered any number of times.

use super::ast::*;
use crate::error::RenderError;
use crate::model::{Key, Kwargs, LoopContext, Namespace, Value, escape_html, methods, ops};
use std::rc::Rc;

/// What a successful render produces.
#[derive(Debug, Clone)]
pub struct Output {
    pub text: String,
    /// Names set with `$var`.
    pub vars: Namespace,
}

/// Bind the call arguments, run every statement and return the output.
///
/// Arguments are matched before anything runs, and any error discards the
/// buffered output.
pub fn execute(
    program: &Program,
    globals: &Namespace,
    builtins: &Namespace,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Output, RenderError> {
    let locals = bind_arguments(&program.params, globals, builtins, args, kwargs)?;
    let mut machine = Machine::new(globals, builtins, locals);
    machine.run(&program.body)?;
    Ok(Output {
        text: machine.out,
        vars: machine.vars,
    })
}

fn bind_arguments(
    params: &Params,
    globals: &Namespace,
    builtins: &Namespace,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Namespace, RenderError> {
    let mut locals = Namespace::new();
    let positional = params.positional.len();

    if args.len() > positional && params.rest.is_none() {
        return Err(RenderError::Argument(format!(
            "template takes {positional} positional arguments but {} were given",
            args.len()
        )));
    }
    for (param, value) in params.positional.iter().zip(args) {
        locals.insert(param.name.clone(), value.clone());
    }
    if let Some(rest) = &params.rest {
        let extra = args.get(positional..).unwrap_or_default();
        locals.insert(rest.clone(), Value::tuple(extra.to_vec()));
    }

    let mut extra = Vec::new();
    for (name, value) in kwargs {
        let is_param = params.positional.iter().any(|p| p.name == *name);
        if is_param {
            if locals.contains_key(name) {
                return Err(RenderError::Argument(format!(
                    "template got multiple values for argument '{name}'"
                )));
            }
            locals.insert(name.clone(), value.clone());
        } else if params.extra.is_some() {
            if extra.iter().any(|(k, _)| *k == Key::from(name.as_str())) {
                return Err(RenderError::Argument(format!(
                    "template got multiple values for keyword argument '{name}'"
                )));
            }
            extra.push((Key::from(name.as_str()), value.clone()));
        } else {
            return Err(RenderError::Argument(format!(
                "template got an unexpected keyword argument '{name}'"
            )));
        }
    }
    if let Some(name) = &params.extra {
        locals.insert(name.clone(), Value::dict(extra));
    }

    let mut missing = Vec::new();
    let mut defaults = Machine::new(globals, builtins, Namespace::new());
    for param in &params.positional {
        if locals.contains_key(&param.name) {
            continue;
        }
        match &param.default {
            Some(default) => {
                let value = defaults.eval(default)?;
                locals.insert(param.name.clone(), value);
            }
            None => missing.push(format!("'{}'", param.name)),
        }
    }
    if !missing.is_empty() {
        return Err(RenderError::Argument(format!(
            "template missing required arguments: {}",
            missing.join(", ")
        )));
    }
    Ok(locals)
}

fn constant(value: &Const) -> Value {
    match value {
        Const::None => Value::None,
        Const::Bool(b) => Value::Bool(*b),
        Const::Int(i) => Value::Int(*i),
        Const::Float(f) => Value::Float(*f),
        Const::Str(s) => Value::str(s),
    }
}

pub struct Machine<'a> {
    globals: &'a Namespace,
    builtins: &'a Namespace,
    locals: Namespace,
    loops: Vec<Rc<LoopContext>>,
    out: String,
    vars: Namespace,
}

impl<'a> Machine<'a> {
    pub fn new(globals: &'a Namespace, builtins: &'a Namespace, locals: Namespace) -> Self {
        Self {
            globals,
            builtins,
            locals,
            loops: Vec::new(),
            out: String::new(),
            vars: Namespace::new(),
        }
    }

    // ── Statements ────────────────────────────────────────────────────

    pub fn run(&mut self, body: &[Stmt]) -> Result<(), RenderError> {
        body.iter().try_for_each(|stmt| self.exec(stmt))
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<(), RenderError> {
        match stmt {
            Stmt::Line { segments, newline } => {
                let text = self.render_segments(segments)?;
                self.out.push_str(&text);
                if *newline {
                    self.out.push('\n');
                }
            }
            Stmt::Assign(target, expr) => {
                let value = self.eval(expr)?;
                self.assign(target, value)?;
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
            Stmt::If(branches) => {
                for (test, body) in branches {
                    let taken = match test {
                        Some(test) => self.eval(test)?.is_truthy(),
                        None => true,
                    };
                    if taken {
                        return self.run(body);
                    }
                }
            }
            Stmt::For { target, iter, body } => {
                let items = ops::iterate(&self.eval(iter)?)?;
                let ctx = self.enter_loop(Some(items.len()));
                for (index0, item) in items.into_iter().enumerate() {
                    ctx.set_index0(index0);
                    self.assign(target, item)?;
                    self.run(body)?;
                }
                self.loops.pop();
            }
            Stmt::While { test, body } => {
                let ctx = self.enter_loop(None);
                let mut index0 = 0;
                while self.eval(test)?.is_truthy() {
                    ctx.set_index0(index0);
                    self.run(body)?;
                    index0 += 1;
                }
                self.loops.pop();
            }
            Stmt::Var(name, VarValue::Text(segments)) => {
                let text = self.render_segments(segments)?;
                self.vars.insert(name.clone(), Value::str(text));
            }
            Stmt::Var(name, VarValue::Expr(expr)) => {
                let value = self.eval(expr)?;
                self.vars.insert(name.clone(), value);
            }
        }
        Ok(())
    }

    fn enter_loop(&mut self, length: Option<usize>) -> Rc<LoopContext> {
        let ctx = Rc::new(LoopContext::new(length, self.loops.last().cloned()));
        self.loops.push(ctx.clone());
        ctx
    }

    fn render_segments(&mut self, segments: &[Segment]) -> Result<String, RenderError> {
        let mut text = String::new();
        for segment in segments {
            match segment {
                Segment::Text(literal) => text.push_str(literal),
                Segment::Emit { expr, escape } => {
                    let value = self.eval(expr)?.to_emit();
                    if *escape {
                        text.push_str(&escape_html(&value));
                    } else {
                        text.push_str(&value);
                    }
                }
            }
        }
        Ok(text)
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<(), RenderError> {
        match target {
            Target::Name(name) => {
                self.locals.insert(name.clone(), value);
            }
            Target::Tuple(targets) => {
                let items = ops::iterate(&value)?;
                if items.len() != targets.len() {
                    return Err(RenderError::type_error(
                        "unpack",
                        format!(
                            "expected {} values to unpack, got {}",
                            targets.len(),
                            items.len()
                        ),
                    ));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
            }
            Target::Index(base, key) => {
                let base = self.eval(base)?;
                let key = self.eval(key)?;
                ops::set_item(&base, &key, value)?;
            }
        }
        Ok(())
    }

    // ── Expressions ───────────────────────────────────────────────────

    fn lookup(&self, name: &str, scope: NameScope) -> Result<Value, RenderError> {
        if scope == NameScope::Local {
            return self
                .locals
                .get(name)
                .cloned()
                .ok_or_else(|| RenderError::UnboundLocal(name.to_string()));
        }
        if name == "loop" {
            if let Some(ctx) = self.loops.last() {
                return Ok(Value::Loop(ctx.clone()));
            }
        }
        self.globals
            .get(name)
            .or_else(|| self.builtins.get(name))
            .cloned()
            .ok_or_else(|| RenderError::UnboundName(name.to_string()))
    }

    fn slice_bound(&mut self, bound: Option<&Expr>) -> Result<Option<i64>, RenderError> {
        let Some(expr) = bound else {
            return Ok(None);
        };
        match self.eval(expr)? {
            Value::None => Ok(None),
            value => value.as_int().map(Some).ok_or_else(|| {
                RenderError::type_error(
                    "slice",
                    format!(
                        "slice indices must be integers or None, not {}",
                        value.type_name()
                    ),
                )
            }),
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, RenderError> {
        match expr {
            Expr::Literal(value) => Ok(constant(value)),
            Expr::Name(name, scope) => self.lookup(name, *scope),
            Expr::Attribute(base, name) => methods::get_attr(&self.eval(base)?, name),
            Expr::Index(base, key) => {
                let base = self.eval(base)?;
                let key = self.eval(key)?;
                ops::get_item(&base, &key)
            }
            Expr::Slice {
                base,
                start,
                stop,
                step,
            } => {
                let base = self.eval(base)?;
                let start = self.slice_bound(start.as_deref())?;
                let stop = self.slice_bound(stop.as_deref())?;
                let step = self.slice_bound(step.as_deref())?;
                ops::slice(&base, start, stop, step)
            }
            Expr::Call {
                callee,
                args,
                kwargs,
            } => {
                let callee = self.eval(callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let kwargs = kwargs
                    .iter()
                    .map(|(name, arg)| Ok((name.clone(), self.eval(arg)?)))
                    .collect::<Result<Vec<_>, RenderError>>()?;
                ops::call(&callee, &args, &kwargs)
            }
            Expr::BinaryOp(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                ops::binary(*op, &left, &right)
            }
            Expr::UnaryOp(op, operand) => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => ops::negate(&value),
                    UnaryOp::Pos => ops::positive(&value),
                }
            }
            Expr::BoolOp(op, operands) => {
                let mut last = Value::None;
                for operand in operands {
                    last = self.eval(operand)?;
                    let decided = match op {
                        BoolOp::And => !last.is_truthy(),
                        BoolOp::Or => last.is_truthy(),
                    };
                    if decided {
                        break;
                    }
                }
                Ok(last)
            }
            Expr::Compare(left, chain) => {
                let mut left = self.eval(left)?;
                for (op, right) in chain {
                    let right = self.eval(right)?;
                    if !ops::compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::Conditional { test, body, orelse } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::ListLit(items) => Ok(Value::list(self.eval_all(items)?)),
            Expr::TupleLit(items) => Ok(Value::tuple(self.eval_all(items)?)),
            Expr::DictLit(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = Key::from_value(&self.eval(key)?)?;
                    pairs.push((key, self.eval(value)?));
                }
                Ok(Value::dict(pairs))
            }
        }
    }

    fn eval_all(&mut self, items: &[Expr]) -> Result<Vec<Value>, RenderError> {
        items.iter().map(|item| self.eval(item)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builtins::default_builtins;
    use crate::processor::compile;

    fn render_with(
        src: &str,
        globals: &Namespace,
        args: &[Value],
        kwargs: &Kwargs,
    ) -> Result<Output, RenderError> {
        let program = compile(src).unwrap();
        execute(&program, globals, &default_builtins(), args, kwargs)
    }

    fn render(src: &str) -> Result<String, RenderError> {
        render_with(src, &Namespace::new(), &[], &[]).map(|o| o.text)
    }

    #[test]
    fn test_statements() {
        let test_cases = vec![
            ("hello\n", "hello\n"),
            ("$if 0: a\n$else: b\n", "b\n"),
            ("$if 0: a\n", ""),
            ("$for x in [1, 2]: <$x>\n", "<1>\n<2>\n"),
            ("$for x in []: never\n", ""),
            ("$ a, b = 1, 2\n$a$b\n", "12\n"),
            ("$ d = {}\n$ d['k'] = 'v'\n$d['k']\n", "v\n"),
            ("$ items = []\n$ items.append(1)\n$len(items)\n", "1\n"),
            ("$ n = 3\n$while n:\n    $ n = n - 1\n", ""),
            ("$(1 if 0 else 2) $(0 or 'x') $(1 and 0)\n", "2 x 0\n"),
            ("$ s = '<b>'\n$:s $s\n", "<b> &lt;b&gt;\n"),
            ("$None|\n", "|\n"),
        ];

        for (src, expected) in test_cases {
            assert_eq!(render(src), Ok(expected.to_string()), "{src:?}");
        }
    }

    #[test]
    fn test_while_loop_metadata() {
        let src = "$ n = 0\n$while n < 3:\n    $ n = n + 1\n    $loop.index $loop.parity $loop.length\n";
        assert_eq!(render(src), Ok("1 odd \n2 even \n3 odd \n".to_string()));
    }

    #[test]
    fn test_loop_metadata_first_last() {
        let src = "$for x in 'abc': $loop.first $loop.last $loop.revindex\n";
        assert_eq!(
            render(src),
            Ok("True False 3\nFalse False 2\nFalse True 1\n".to_string())
        );
    }

    #[test]
    fn test_scoping_errors() {
        assert_eq!(render("$x\n"), Err(RenderError::UnboundName("x".into())));
        assert_eq!(
            render("$x\n$ x = 1\n"),
            Err(RenderError::UnboundLocal("x".into()))
        );
        assert_eq!(
            render("$loop.index\n"),
            Err(RenderError::UnboundName("loop".into()))
        );
    }

    #[test]
    fn test_argument_binding() {
        let src = "$def with (a, b=a_default, *rest, **extra)\n$a $b $rest $extra\n";
        let mut globals = Namespace::new();
        globals.insert("a_default".into(), Value::Int(7));

        let out = render_with(src, &globals, &[1.into()], &[]).unwrap();
        assert_eq!(out.text, "1 7 () {}\n");

        let out = render_with(
            src,
            &globals,
            &[1.into(), 2.into(), 3.into()],
            &[("z".into(), "q".into())],
        )
        .unwrap();
        assert_eq!(out.text, "1 2 (3,) {&#39;z&#39;: &#39;q&#39;}\n");
    }

    #[test]
    fn test_argument_errors() {
        let src = "$def with (a, b=0)\n$a\n";
        let globals = Namespace::new();
        let test_cases: Vec<(Vec<Value>, Vec<(String, Value)>, &str)> = vec![
            (vec![], vec![], "missing required arguments: 'a'"),
            (vec![1.into(), 2.into(), 3.into()], vec![], "positional"),
            (vec![1.into()], vec![("a".into(), 1.into())], "multiple values"),
            (vec![1.into()], vec![("c".into(), 1.into())], "unexpected keyword"),
        ];

        for (args, kwargs, needle) in test_cases {
            match render_with(src, &globals, &args, &kwargs) {
                Err(RenderError::Argument(message)) => {
                    assert!(message.contains(needle), "{message}")
                }
                other => panic!("expected argument error for {needle}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_render_errors_are_typed() {
        assert!(matches!(
            render("$for a, b in [1]: x\n"),
            Err(RenderError::Type { .. })
        ));
        assert!(matches!(render("$(1 / 0)\n"), Err(RenderError::Arithmetic(_))));
        assert!(matches!(render("$([1][5])\n"), Err(RenderError::Lookup(_))));
        assert!(matches!(render("$ f = 1\n$f(2)\n"), Err(RenderError::Type { .. })));
    }

    #[test]
    fn test_var_results() {
        let out = render_with("$var title: Hi <$(1 + 1)>\n$var n = [1]\nbody\n", &Namespace::new(), &[], &[])
            .unwrap();
        assert_eq!(out.text, "body\n");
        assert_eq!(out.vars.get("title"), Some(&Value::str("Hi <2>")));
        assert_eq!(out.vars.get("n"), Some(&Value::list(vec![Value::Int(1)])));
    }
}
