//! Attribute lookup, including the methods of the built-in value types.
//!
//! A method lookup returns a [`Value::Function`] bound to its receiver, so
//! `$name.upper()` is an attribute lookup followed by an ordinary call.

use super::{Key, Kwargs, Value, ops};
use crate::error::RenderError;

pub fn get_attr(value: &Value, name: &str) -> Result<Value, RenderError> {
    let found = match value {
        Value::Str(_) => str_method(value, name),
        Value::List(_) => list_method(value, name),
        Value::Dict(map) => dict_method(value, name).or_else(|| map.borrow().get(&Key::from(name)).cloned()),
        Value::Object(obj) => obj.get_attr(name),
        Value::Loop(ctx) => ctx.get_attr(name),
        _ => None,
    };
    found.ok_or_else(|| {
        RenderError::Lookup(format!(
            "'{}' object has no attribute '{name}'",
            value.type_name()
        ))
    })
}

fn arity(method: &str, args: &[Value], min: usize, max: usize) -> Result<(), RenderError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(RenderError::Argument(format!(
            "{method}() takes {expected} arguments ({} given)",
            args.len()
        )));
    }
    Ok(())
}

fn no_kwargs(method: &str, kwargs: &Kwargs) -> Result<(), RenderError> {
    match kwargs.first() {
        Some((key, _)) => Err(RenderError::Argument(format!(
            "{method}() got an unexpected keyword argument '{key}'"
        ))),
        None => Ok(()),
    }
}

fn str_arg<'a>(method: &str, value: &'a Value) -> Result<&'a str, RenderError> {
    value.as_str().ok_or_else(|| {
        RenderError::type_error(
            method,
            format!("argument must be str, not {}", value.type_name()),
        )
    })
}

fn bind<F>(receiver: &Value, method: &'static str, f: F) -> Option<Value>
where
    F: Fn(&Value, &[Value]) -> Result<Value, RenderError> + 'static,
{
    let receiver = receiver.clone();
    Some(Value::function(method, move |args, kwargs| {
        no_kwargs(method, kwargs)?;
        f(&receiver, args)
    }))
}

fn receiver_str(receiver: &Value) -> &str {
    receiver.as_str().unwrap_or_default()
}

fn str_method(receiver: &Value, name: &str) -> Option<Value> {
    let strip_chars = |args: &[Value]| -> Result<Option<Vec<char>>, RenderError> {
        match args.first() {
            None | Some(Value::None) => Ok(None),
            Some(chars) => Ok(Some(str_arg("strip", chars)?.chars().collect())),
        }
    };
    match name {
        "upper" => bind(receiver, "upper", |s, args| {
            arity("upper", args, 0, 0)?;
            Ok(Value::str(receiver_str(s).to_uppercase()))
        }),
        "lower" => bind(receiver, "lower", |s, args| {
            arity("lower", args, 0, 0)?;
            Ok(Value::str(receiver_str(s).to_lowercase()))
        }),
        "strip" => bind(receiver, "strip", move |s, args| {
            arity("strip", args, 0, 1)?;
            let s = receiver_str(s);
            Ok(Value::str(match strip_chars(args)? {
                Some(chars) => s.trim_matches(chars.as_slice()),
                None => s.trim(),
            }))
        }),
        "lstrip" => bind(receiver, "lstrip", move |s, args| {
            arity("lstrip", args, 0, 1)?;
            let s = receiver_str(s);
            Ok(Value::str(match strip_chars(args)? {
                Some(chars) => s.trim_start_matches(chars.as_slice()),
                None => s.trim_start(),
            }))
        }),
        "rstrip" => bind(receiver, "rstrip", move |s, args| {
            arity("rstrip", args, 0, 1)?;
            let s = receiver_str(s);
            Ok(Value::str(match strip_chars(args)? {
                Some(chars) => s.trim_end_matches(chars.as_slice()),
                None => s.trim_end(),
            }))
        }),
        "title" => bind(receiver, "title", |s, args| {
            arity("title", args, 0, 0)?;
            let mut out = String::new();
            let mut prev_alpha = false;
            for c in receiver_str(s).chars() {
                if prev_alpha {
                    out.extend(c.to_lowercase());
                } else {
                    out.extend(c.to_uppercase());
                }
                prev_alpha = c.is_alphabetic();
            }
            Ok(Value::str(out))
        }),
        "capitalize" => bind(receiver, "capitalize", |s, args| {
            arity("capitalize", args, 0, 0)?;
            let mut chars = receiver_str(s).chars();
            Ok(Value::str(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }))
        }),
        "startswith" => bind(receiver, "startswith", |s, args| {
            arity("startswith", args, 1, 1)?;
            Ok(receiver_str(s).starts_with(str_arg("startswith", &args[0])?).into())
        }),
        "endswith" => bind(receiver, "endswith", |s, args| {
            arity("endswith", args, 1, 1)?;
            Ok(receiver_str(s).ends_with(str_arg("endswith", &args[0])?).into())
        }),
        "replace" => bind(receiver, "replace", |s, args| {
            arity("replace", args, 2, 2)?;
            let from = str_arg("replace", &args[0])?;
            let to = str_arg("replace", &args[1])?;
            Ok(Value::str(receiver_str(s).replace(from, to)))
        }),
        "split" => bind(receiver, "split", |s, args| {
            arity("split", args, 0, 1)?;
            let s = receiver_str(s);
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::None) => s.split_whitespace().map(Value::str).collect(),
                Some(sep) => s.split(str_arg("split", sep)?).map(Value::str).collect(),
            };
            Ok(Value::list(parts))
        }),
        "join" => bind(receiver, "join", |s, args| {
            arity("join", args, 1, 1)?;
            let parts = ops::iterate(&args[0])?
                .iter()
                .map(|item| str_arg("join", item).map(str::to_owned))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::str(parts.join(receiver_str(s))))
        }),
        "count" => bind(receiver, "count", |s, args| {
            arity("count", args, 1, 1)?;
            let needle = str_arg("count", &args[0])?;
            Ok(Value::from(receiver_str(s).matches(needle).count()))
        }),
        "find" => bind(receiver, "find", |s, args| {
            arity("find", args, 1, 1)?;
            let s = receiver_str(s);
            let needle = str_arg("find", &args[0])?;
            Ok(match s.find(needle) {
                Some(byte) => Value::from(s[..byte].chars().count()),
                None => Value::Int(-1),
            })
        }),
        "isdigit" => bind(receiver, "isdigit", |s, args| {
            arity("isdigit", args, 0, 0)?;
            let s = receiver_str(s);
            Ok((!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())).into())
        }),
        _ => None,
    }
}

fn with_list<T>(receiver: &Value, f: impl FnOnce(&mut Vec<Value>) -> T) -> T {
    match receiver {
        Value::List(items) => f(&mut items.borrow_mut()),
        _ => f(&mut Vec::new()),
    }
}

/// Snapshot for read-only methods: comparing an item may need to borrow
/// the receiver itself, e.g. `a.count(a)`.
fn list_items(receiver: &Value) -> Vec<Value> {
    match receiver {
        Value::List(items) => items.borrow().clone(),
        _ => Vec::new(),
    }
}

fn list_method(receiver: &Value, name: &str) -> Option<Value> {
    match name {
        "append" => bind(receiver, "append", |list, args| {
            arity("append", args, 1, 1)?;
            with_list(list, |items| items.push(args[0].clone()));
            Ok(Value::None)
        }),
        "extend" => bind(receiver, "extend", |list, args| {
            arity("extend", args, 1, 1)?;
            let more = ops::iterate(&args[0])?;
            with_list(list, |items| items.extend(more));
            Ok(Value::None)
        }),
        "insert" => bind(receiver, "insert", |list, args| {
            arity("insert", args, 2, 2)?;
            let index = args[0].as_int().ok_or_else(|| {
                RenderError::type_error("insert", "index must be an integer")
            })?;
            with_list(list, |items| {
                let len = items.len() as i64;
                let pos = if index < 0 { (index + len).max(0) } else { index.min(len) };
                items.insert(pos as usize, args[1].clone());
            });
            Ok(Value::None)
        }),
        "pop" => bind(receiver, "pop", |list, args| {
            arity("pop", args, 0, 1)?;
            let index = match args.first() {
                Some(v) => Some(v.as_int().ok_or_else(|| {
                    RenderError::type_error("pop", "index must be an integer")
                })?),
                None => None,
            };
            with_list(list, |items| {
                if items.is_empty() {
                    return Err(RenderError::Lookup("pop from empty list".into()));
                }
                let len = items.len() as i64;
                let pos = index.map_or(len - 1, |i| if i < 0 { i + len } else { i });
                if !(0..len).contains(&pos) {
                    return Err(RenderError::Lookup("pop index out of range".into()));
                }
                Ok(items.remove(pos as usize))
            })
        }),
        "index" => bind(receiver, "index", |list, args| {
            arity("index", args, 1, 1)?;
            list_items(list)
                .iter()
                .position(|item| *item == args[0])
                .map(Value::from)
                .ok_or_else(|| RenderError::Lookup(format!("{} is not in list", args[0].repr())))
        }),
        "count" => bind(receiver, "count", |list, args| {
            arity("count", args, 1, 1)?;
            let items = list_items(list);
            Ok(Value::from(items.iter().filter(|item| **item == args[0]).count()))
        }),
        "reverse" => bind(receiver, "reverse", |list, args| {
            arity("reverse", args, 0, 0)?;
            with_list(list, |items| items.reverse());
            Ok(Value::None)
        }),
        "copy" => bind(receiver, "copy", |list, args| {
            arity("copy", args, 0, 0)?;
            Ok(Value::list(with_list(list, |items| items.clone())))
        }),
        _ => None,
    }
}

fn with_dict<T>(receiver: &Value, f: impl FnOnce(&mut super::DictMap) -> T) -> T {
    match receiver {
        Value::Dict(map) => f(&mut map.borrow_mut()),
        _ => f(&mut super::DictMap::new()),
    }
}

fn dict_method(receiver: &Value, name: &str) -> Option<Value> {
    match name {
        "items" => bind(receiver, "items", |dict, args| {
            arity("items", args, 0, 0)?;
            Ok(Value::list(with_dict(dict, |map| {
                map.iter()
                    .map(|(k, v)| Value::tuple(vec![k.to_value(), v.clone()]))
                    .collect()
            })))
        }),
        "keys" => bind(receiver, "keys", |dict, args| {
            arity("keys", args, 0, 0)?;
            Ok(Value::list(with_dict(dict, |map| map.keys().map(Key::to_value).collect())))
        }),
        "values" => bind(receiver, "values", |dict, args| {
            arity("values", args, 0, 0)?;
            Ok(Value::list(with_dict(dict, |map| map.values().cloned().collect())))
        }),
        "get" => bind(receiver, "get", |dict, args| {
            arity("get", args, 1, 2)?;
            let key = Key::from_value(&args[0])?;
            let default = args.get(1).cloned().unwrap_or(Value::None);
            Ok(with_dict(dict, |map| map.get(&key).cloned()).unwrap_or(default))
        }),
        "pop" => bind(receiver, "pop", |dict, args| {
            arity("pop", args, 1, 2)?;
            let key = Key::from_value(&args[0])?;
            match (with_dict(dict, |map| map.shift_remove(&key)), args.get(1)) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(RenderError::Lookup(format!("key {} not found", args[0].repr()))),
            }
        }),
        "setdefault" => bind(receiver, "setdefault", |dict, args| {
            arity("setdefault", args, 1, 2)?;
            let key = Key::from_value(&args[0])?;
            let default = args.get(1).cloned().unwrap_or(Value::None);
            Ok(with_dict(dict, |map| map.entry(key).or_insert(default).clone()))
        }),
        "update" => bind(receiver, "update", |dict, args| {
            arity("update", args, 1, 1)?;
            let Value::Dict(other) = &args[0] else {
                return Err(RenderError::type_error("update", "argument must be a dict"));
            };
            let entries: Vec<(Key, Value)> =
                other.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            with_dict(dict, |map| map.extend(entries));
            Ok(Value::None)
        }),
        "copy" => bind(receiver, "copy", |dict, args| {
            arity("copy", args, 0, 0)?;
            Ok(Value::dict(with_dict(dict, |map| map.clone())))
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_method(receiver: &Value, name: &str, args: &[Value]) -> Result<Value, RenderError> {
        ops::call(&get_attr(receiver, name)?, args, &[])
    }

    #[test]
    fn test_str_methods() {
        let s = Value::str("  hello World ");
        let test_cases = vec![
            ("upper", vec![], Value::str("  HELLO WORLD ")),
            ("strip", vec![], Value::str("hello World")),
            ("title", vec![], Value::str("  Hello World ")),
            ("startswith", vec![Value::str("  h")], Value::Bool(true)),
            ("replace", vec![Value::str("l"), Value::str("L")], Value::str("  heLLo WorLd ")),
            ("find", vec![Value::str("o")], Value::Int(6)),
            (
                "split",
                vec![],
                Value::list(vec![Value::str("hello"), Value::str("World")]),
            ),
        ];

        for (method, args, expected) in test_cases {
            assert_eq!(call_method(&s, method, &args), Ok(expected), "str.{method}");
        }
    }

    #[test]
    fn test_list_pop_mutates_shared_list() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let alias = list.clone();
        assert_eq!(call_method(&list, "pop", &[]), Ok(Value::Int(2)));
        assert_eq!(alias, Value::list(vec![Value::Int(1)]));
        call_method(&list, "pop", &[]).unwrap();
        assert!(matches!(call_method(&list, "pop", &[]), Err(RenderError::Lookup(_))));
    }

    #[test]
    fn test_dict_methods_and_key_attributes() {
        let dict = Value::dict(vec![(Key::from("a"), Value::Int(1)), (Key::Int(2), Value::Int(3))]);

        assert_eq!(
            call_method(&dict, "items", &[]),
            Ok(Value::list(vec![
                Value::tuple(vec![Value::str("a"), Value::Int(1)]),
                Value::tuple(vec![Value::Int(2), Value::Int(3)]),
            ]))
        );
        assert_eq!(call_method(&dict, "get", &[Value::str("x"), Value::Int(0)]), Ok(Value::Int(0)));
        assert_eq!(get_attr(&dict, "a"), Ok(Value::Int(1)));
        assert!(matches!(get_attr(&dict, "zzz"), Err(RenderError::Lookup(_))));
    }

    #[test]
    fn test_method_arity() {
        let err = call_method(&Value::str("x"), "upper", &[Value::Int(1)]).unwrap_err();
        assert!(matches!(err, RenderError::Argument(_)));
    }

    #[test]
    fn test_list_searched_for_itself() {
        let list = Value::list(vec![Value::list(vec![Value::Int(1)])]);
        assert!(matches!(call_method(&list, "index", &[list.clone()]), Err(RenderError::Lookup(_))));
        assert_eq!(call_method(&list, "count", &[list.clone()]), Ok(Value::Int(0)));

        call_method(&list, "append", &[list.clone()]).unwrap();
        assert_eq!(call_method(&list, "index", &[list.clone()]), Ok(Value::Int(1)));
        assert_eq!(call_method(&list, "count", &[list.clone()]), Ok(Value::Int(1)));
        assert_eq!(list.repr(), "[[1], [...]]");
    }
}
