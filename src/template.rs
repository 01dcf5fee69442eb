//! Component 5 – the public face of the engine.
//!
//! A [`Template`] pairs a compiled [`Program`] with the globals and builtins
//! it renders against. Calling it binds the arguments, runs the program and
//! hands back a [`Rendered`] value: its `Display` is the text, and indexing
//! it by name gives the `$var` bindings.

use crate::error::{RenderError, SyntaxError, TemplateError};
use crate::model::builtins::default_builtins;
use crate::model::{Kwargs, Namespace, Value};
use crate::processor::{self, Program, vm};
use indexmap::IndexMap;
use log::{debug, trace};
use std::collections::HashMap;
use std::fmt;
use std::ops::Index;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone)]
pub struct Template {
    program: Arc<Program>,
    globals: Namespace,
    builtins: Namespace,
}

impl Template {
    /// Compile `source` with no globals and the default builtins.
    pub fn new(source: &str) -> Result<Self, SyntaxError> {
        Ok(Self::from_program(Arc::new(processor::compile(source)?)))
    }

    /// Compile through `cache`, reusing the program of an identical source.
    pub fn cached(cache: &ProgramCache, source: &str) -> Result<Self, SyntaxError> {
        Ok(Self::from_program(cache.get_or_compile(source)?))
    }

    pub fn from_program(program: Arc<Program>) -> Self {
        Self {
            program,
            globals: Namespace::new(),
            builtins: default_builtins(),
        }
    }

    pub fn with_globals(mut self, globals: Namespace) -> Self {
        self.globals = globals;
        self
    }

    pub fn with_global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    /// Replace the builtins; an empty namespace disables them all.
    pub fn with_builtins(mut self, builtins: Namespace) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn without_builtins(self) -> Self {
        self.with_builtins(Namespace::new())
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn globals(&self) -> &Namespace {
        &self.globals
    }

    /// Render with positional arguments only.
    pub fn render(&self, args: &[Value]) -> Result<Rendered, RenderError> {
        self.call(args, &[])
    }

    pub fn call(&self, args: &[Value], kwargs: &Kwargs) -> Result<Rendered, RenderError> {
        let mut output = vm::execute(&self.program, &self.globals, &self.builtins, args, kwargs)?;
        if !self.program.trailing_newline && output.text.ends_with('\n') {
            output.text.pop();
        }
        debug!(
            "rendered template: {} bytes, {} vars",
            output.text.len(),
            output.vars.len()
        );
        Ok(Rendered {
            text: output.text,
            vars: output.vars,
        })
    }
}

/// Result of one render.
#[derive(Debug, Clone)]
pub struct Rendered {
    text: String,
    vars: Namespace,
}

impl Rendered {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// A `$var` binding.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn vars(&self) -> &Namespace {
        &self.vars
    }
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Index<&str> for Rendered {
    type Output = Value;

    /// Panics when no `$var` of that name was set, like a map lookup.
    fn index(&self, name: &str) -> &Value {
        &self.vars[name]
    }
}

impl PartialEq<&str> for Rendered {
    fn eq(&self, other: &&str) -> bool {
        self.text == *other
    }
}

// ── Program cache ────────────────────────────────────────────────────

/// Compiled programs keyed by their exact source text.
///
/// Safe to share between threads; programs are handed out as `Arc`s.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: RwLock<HashMap<String, Arc<Program>>>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(&self, source: &str) -> Result<Arc<Program>, SyntaxError> {
        let hit = self
            .programs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .cloned();
        if let Some(program) = hit {
            trace!("program cache hit ({} bytes of source)", source.len());
            return Ok(program);
        }

        trace!("program cache miss ({} bytes of source)", source.len());
        let program = Arc::new(processor::compile(source)?);
        let mut programs = self.programs.write().unwrap_or_else(PoisonError::into_inner);
        // another thread may have compiled the same source meanwhile
        Ok(programs.entry(source.to_string()).or_insert(program).clone())
    }

    pub fn len(&self) -> usize {
        self.programs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.programs.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

// ── Named registry ───────────────────────────────────────────────────

/// A set of named templates sharing one globals namespace and one cache.
///
/// Sources are compiled when they are added, so a broken template is
/// reported at registration rather than at first render.
#[derive(Debug)]
pub struct Templates {
    cache: Arc<ProgramCache>,
    programs: IndexMap<String, Arc<Program>>,
    globals: Namespace,
    builtins: Namespace,
}

impl Default for Templates {
    fn default() -> Self {
        Self::new()
    }
}

impl Templates {
    pub fn new() -> Self {
        Self::with_cache(Arc::new(ProgramCache::new()))
    }

    pub fn with_cache(cache: Arc<ProgramCache>) -> Self {
        Self {
            cache,
            programs: IndexMap::new(),
            globals: Namespace::new(),
            builtins: default_builtins(),
        }
    }

    pub fn with_globals(mut self, globals: Namespace) -> Self {
        self.globals = globals;
        self
    }

    pub fn with_builtins(mut self, builtins: Namespace) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn globals_mut(&mut self) -> &mut Namespace {
        &mut self.globals
    }

    /// Add or replace the template called `name`.
    pub fn insert(&mut self, name: impl Into<String>, source: &str) -> Result<(), SyntaxError> {
        let name = name.into();
        let program = self.cache.get_or_compile(source)?;
        debug!("registered template '{name}'");
        self.programs.insert(name, program);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Template> {
        self.programs.get(name).map(|program| {
            Template::from_program(program.clone())
                .with_globals(self.globals.clone())
                .with_builtins(self.builtins.clone())
        })
    }

    pub fn render(&self, name: &str, args: &[Value]) -> Result<Rendered, TemplateError> {
        self.call(name, args, &[])
    }

    pub fn call(&self, name: &str, args: &[Value], kwargs: &Kwargs) -> Result<Rendered, TemplateError> {
        let template = self
            .get(name)
            .ok_or_else(|| RenderError::Lookup(format!("no template named '{name}'")))?;
        Ok(template.call(args, kwargs)?)
    }
}
