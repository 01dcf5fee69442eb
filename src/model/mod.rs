//! Runtime data model shared by the executor, the builtins and host code.
//!
//! A [`Value`] is a closed set of variants. Host values that need their own
//! behaviour plug in through the [`Object`] capability trait; the executor
//! asks for a capability right before using it and reports a
//! [`RenderError::Type`] naming the operation when it is missing.

pub mod builtins;
pub mod looping;
pub mod methods;
pub mod object;
pub mod ops;

pub use looping::LoopContext;
pub use object::{Function, Object, Record};

use crate::error::RenderError;
use indexmap::IndexMap;
use serde::ser::{Error as _, Serialize, Serializer};
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Name → value mapping used for globals, builtins and `var` results.
pub type Namespace = IndexMap<String, Value>;

/// Keyword arguments in call order.
pub type Kwargs = [(String, Value)];

pub type DictMap = IndexMap<Key, Value>;

/// Hashable subset of [`Value`], used as dict keys.
///
/// `True` and `1` are the same key; the variant first inserted is the one
/// the dict keeps.
#[derive(Debug, Clone)]
pub enum Key {
    None,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
}

impl Key {
    pub fn from_value(value: &Value) -> Result<Key, RenderError> {
        match value {
            Value::None => Ok(Key::None),
            Value::Bool(b) => Ok(Key::Bool(*b)),
            Value::Int(i) => Ok(Key::Int(*i)),
            // 2^63 itself does not fit, hence the strict upper bound
            Value::Float(f) if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 => {
                Ok(Key::Int(*f as i64))
            }
            Value::Str(s) => Ok(Key::Str(s.clone())),
            other => Err(RenderError::type_error(
                "hash",
                format!("unhashable type: '{}'", other.type_name()),
            )),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::None => Value::None,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl Key {
    fn as_int(&self) -> Option<i64> {
        match self {
            Key::Bool(b) => Some(*b as i64),
            Key::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::None, Key::None) => true,
            (Key::Str(a), Key::Str(b)) => a == b,
            (a, b) => matches!((a.as_int(), b.as_int()), (Some(x), Some(y)) if x == y),
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Key::None => 0u8.hash(state),
            Key::Str(s) => s.hash(state),
            Key::Bool(b) => (*b as i64).hash(state),
            Key::Int(i) => i.hash(state),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.into())
    }
}

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    /// Shared and mutable: `items.pop()` is visible to every holder.
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    /// Insertion ordered.
    Dict(Rc<RefCell<DictMap>>),
    Function(Function),
    Object(Rc<dyn Object>),
    Loop(Rc<LoopContext>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(s.as_ref().into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(items.into())
    }

    pub fn dict(entries: impl IntoIterator<Item = (Key, Value)>) -> Value {
        Value::Dict(Rc::new(RefCell::new(entries.into_iter().collect())))
    }

    pub fn function<F>(name: &str, f: F) -> Value
    where
        F: Fn(&[Value], &Kwargs) -> Result<Value, RenderError> + 'static,
    {
        Value::Function(Function::new(name, f))
    }

    pub fn object(obj: impl Object + 'static) -> Value {
        Value::Object(Rc::new(obj))
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Object(obj) => obj.type_name(),
            Value::Loop(_) => "loop",
        }
    }

    /// Falsy: `None`, `False`, zero, and empty strings or collections.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(map) => !map.borrow().is_empty(),
            Value::Function(_) | Value::Object(_) | Value::Loop(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Text appended to the output by an emit. `None` contributes nothing.
    pub fn to_emit(&self) -> String {
        match self {
            Value::None => String::new(),
            other => other.to_string(),
        }
    }

    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, &mut Vec::new());
        out
    }

    /// Identity of a shared mutable container, the only values that can
    /// contain themselves.
    fn container_id(&self) -> Option<usize> {
        match self {
            Value::List(items) => Some(Rc::as_ptr(items) as *const () as usize),
            Value::Dict(map) => Some(Rc::as_ptr(map) as *const () as usize),
            _ => None,
        }
    }

    /// `open` holds the containers currently being written; meeting one of
    /// them again prints `[...]` or `{...}`.
    fn write_repr(&self, out: &mut String, open: &mut Vec<usize>) {
        if let Some(id) = self.container_id() {
            if open.contains(&id) {
                out.push_str(if matches!(self, Value::List(_)) { "[...]" } else { "{...}" });
                return;
            }
            open.push(id);
        }
        self.write_repr_inner(out, open);
        if self.container_id().is_some() {
            open.pop();
        }
    }

    fn write_repr_inner(&self, out: &mut String, open: &mut Vec<usize>) {
        match self {
            Value::Str(s) => {
                out.push('\'');
                for c in s.chars() {
                    match c {
                        '\'' => out.push_str("\\'"),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        c => out.push(c),
                    }
                }
                out.push('\'');
            }
            Value::List(items) => {
                out.push('[');
                write_items(out, &items.borrow(), open);
                out.push(']');
            }
            Value::Tuple(items) => {
                out.push('(');
                write_items(out, items, open);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Value::Dict(map) => {
                out.push('{');
                for (i, (k, v)) in map.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.to_value().write_repr(out, open);
                    out.push_str(": ");
                    v.write_repr(out, open);
                }
                out.push('}');
            }
            other => out.push_str(&other.to_string()),
        }
    }
}

fn write_items(out: &mut String, items: &[Value], open: &mut Vec<usize>) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out, open);
    }
}

pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".into()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".into() } else { "-inf".into() }
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// The canonical `str()` of a value.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => f.write_str(s),
            Value::List(_) | Value::Tuple(_) | Value::Dict(_) => f.write_str(&self.repr()),
            Value::Function(func) => write!(f, "<function {}>", func.name()),
            Value::Object(obj) => f.write_str(&obj.to_text()),
            Value::Loop(ctx) => write!(f, "<loop index={}>", ctx.index()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Loop(a), Value::Loop(b)) => Rc::ptr_eq(a, b),
            (a, b) => match (ops::as_number(a), ops::as_number(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

/// HTML-escapes the characters that are unsafe in markup and attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

// ─────────────────────────────────────────────────────
// Conversions from host values
// ─────────────────────────────────────────────────────

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::None, Into::into)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::object(record)
    }
}

/// Values serialize the way they would read back from JSON; callables and
/// host objects serialize as their text form. A container that contains
/// itself is an error.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let open = RefCell::new(Vec::new());
        Acyclic { value: self, open: &open }.serialize(serializer)
    }
}

struct Acyclic<'a> {
    value: &'a Value,
    open: &'a RefCell<Vec<usize>>,
}

impl Acyclic<'_> {
    fn child<'b>(&'b self, value: &'b Value) -> Acyclic<'b> {
        Acyclic { value, open: self.open }
    }
}

impl Serialize for Acyclic<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let id = self.value.container_id();
        if let Some(id) = id {
            if self.open.borrow().contains(&id) {
                return Err(S::Error::custom("circular reference"));
            }
            self.open.borrow_mut().push(id);
        }
        let result = match self.value {
            Value::None => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => {
                serializer.collect_seq(items.borrow().iter().map(|item| self.child(item)))
            }
            Value::Tuple(items) => serializer.collect_seq(items.iter().map(|item| self.child(item))),
            Value::Dict(map) => serializer.collect_map(
                map.borrow()
                    .iter()
                    .map(|(k, v)| (k.to_value().to_string(), self.child(v))),
            ),
            other => serializer.serialize_str(&other.to_string()),
        };
        if id.is_some() {
            self.open.borrow_mut().pop();
        }
        result
    }
}
