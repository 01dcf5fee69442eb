//! Callables and host objects.

use super::{Kwargs, Value};
use crate::error::RenderError;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

type NativeFn = dyn Fn(&[Value], &Kwargs) -> Result<Value, RenderError>;

/// A native callable: builtins, bound methods and host closures.
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    call: Rc<NativeFn>,
}

impl Function {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&[Value], &Kwargs) -> Result<Value, RenderError> + 'static,
    {
        Self {
            name: name.into(),
            call: Rc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
        (self.call)(args, kwargs)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.call, &other.call)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name)
    }
}

/// Capability surface for host values.
///
/// Every capability is optional: returning `None` means "this value cannot
/// do that", and the executor turns it into a type error naming the
/// operation.
pub trait Object: fmt::Debug {
    fn type_name(&self) -> &str;

    fn get_attr(&self, _name: &str) -> Option<Value> {
        None
    }

    fn get_item(&self, _key: &Value) -> Option<Result<Value, RenderError>> {
        None
    }

    fn iter(&self) -> Option<Vec<Value>> {
        None
    }

    fn call(&self, _args: &[Value], _kwargs: &Kwargs) -> Option<Result<Value, RenderError>> {
        None
    }

    fn to_text(&self) -> String {
        format!("<{} object>", self.type_name())
    }
}

/// A named-field value, attribute and position addressable.
#[derive(Debug, Clone)]
pub struct Record {
    name: String,
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }
}

impl Object for Record {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    fn get_item(&self, key: &Value) -> Option<Result<Value, RenderError>> {
        let Value::Int(i) = key else {
            return Some(Err(RenderError::type_error(
                "index",
                format!("{} indices must be integers", self.name),
            )));
        };
        let len = self.fields.len() as i64;
        let pos = if *i < 0 { *i + len } else { *i };
        Some(
            usize::try_from(pos)
                .ok()
                .and_then(|p| self.fields.get_index(p))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| RenderError::Lookup(format!("{} index out of range", self.name))),
        )
    }

    fn iter(&self) -> Option<Vec<Value>> {
        Some(self.fields.values().cloned().collect())
    }

    fn to_text(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={}", v.repr()))
            .collect();
        format!("{}({})", self.name, fields.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_capabilities() {
        let record = Record::new("_").with("b", vec![Value::Int(1)]);

        assert_eq!(record.get_attr("b"), Some(Value::list(vec![Value::Int(1)])));
        assert_eq!(record.get_attr("c"), None);
        assert_eq!(record.to_text(), "_(b=[1])");
        assert!(matches!(
            record.get_item(&Value::Int(5)),
            Some(Err(RenderError::Lookup(_)))
        ));
        assert!(record.call(&[], &[]).is_none());
    }

    #[test]
    fn test_function_call() {
        let f = Function::new("echo", |args, _| Ok(args[0].clone()));
        assert_eq!(f.call(&[Value::str("x")], &[]), Ok(Value::str("x")));
        assert_eq!(f.name(), "echo");
        assert!(f.ptr_eq(&f.clone()));
    }
}
