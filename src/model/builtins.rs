//! The curated builtins every template sees unless the host replaces them.

use super::{Key, Kwargs, Namespace, Value, format_float, ops};
use crate::error::RenderError;
use std::cmp::Ordering;

type Builtin = fn(&[Value], &Kwargs) -> Result<Value, RenderError>;

/// Table order is the order names appear in the namespace.
const BUILTINS: &[(&str, Builtin)] = &[
    ("range", range),
    ("len", len),
    ("min", min),
    ("max", max),
    ("abs", abs),
    ("sum", sum),
    ("round", round),
    ("str", to_str),
    ("int", to_int),
    ("float", to_float),
    ("bool", to_bool),
    ("list", list),
    ("tuple", tuple),
    ("dict", dict),
    ("sorted", sorted),
    ("reversed", reversed),
    ("enumerate", enumerate),
    ("zip", zip),
    ("any", any),
    ("all", all),
    ("repr", repr),
];

pub fn default_builtins() -> Namespace {
    BUILTINS
        .iter()
        .map(|(name, f)| (name.to_string(), Value::function(name, *f)))
        .collect()
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), RenderError> {
    if args.len() < min || args.len() > max {
        return Err(RenderError::Argument(format!(
            "{name}() takes {} arguments ({} given)",
            if min == max { min.to_string() } else { format!("{min} to {max}") },
            args.len()
        )));
    }
    Ok(())
}

fn no_kwargs(name: &str, kwargs: &Kwargs) -> Result<(), RenderError> {
    match kwargs.first() {
        Some((key, _)) => Err(RenderError::Argument(format!(
            "{name}() got an unexpected keyword argument '{key}'"
        ))),
        None => Ok(()),
    }
}

fn int_arg(name: &str, value: &Value) -> Result<i64, RenderError> {
    value.as_int().ok_or_else(|| {
        RenderError::type_error(
            name,
            format!("'{}' object cannot be interpreted as an integer", value.type_name()),
        )
    })
}

fn number_arg(name: &str, value: &Value) -> Result<f64, RenderError> {
    ops::as_number(value).ok_or_else(|| {
        RenderError::type_error(name, format!("expected a number, got '{}'", value.type_name()))
    })
}

fn range(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("range", kwargs)?;
    arity("range", args, 1, 3)?;
    let ints = args
        .iter()
        .map(|a| int_arg("range", a))
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => unreachable!("arity checked"),
    };
    if step == 0 {
        return Err(RenderError::Argument("range() arg 3 must not be zero".into()));
    }
    // widened so that no intermediate can overflow
    let (start, stop, step) = (start as i128, stop as i128, step as i128);
    let count = if step > 0 && start < stop {
        (stop - start + step - 1) / step
    } else if step < 0 && start > stop {
        (start - stop - step - 1) / -step
    } else {
        0
    };
    if count > ops::MAX_LEN as i128 {
        return Err(ops::too_large("range()"));
    }
    let items = (0..count)
        .map(|k| Value::Int((start + k * step) as i64))
        .collect();
    Ok(Value::list(items))
}

fn len(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("len", kwargs)?;
    arity("len", args, 1, 1)?;
    ops::length(&args[0]).map(Value::from)
}

fn extreme(name: &str, args: &[Value], wanted: Ordering) -> Result<Value, RenderError> {
    let items = match args {
        [] => return Err(RenderError::Argument(format!("{name} expected at least 1 argument, got 0"))),
        [single] => ops::iterate(single)?,
        many => many.to_vec(),
    };
    let mut best: Option<Value> = None;
    for item in items {
        best = Some(match best {
            None => item,
            Some(current) => {
                let ordering = ops::order(&item, &current).ok_or_else(|| {
                    RenderError::type_error(
                        name,
                        format!(
                            "cannot compare '{}' and '{}'",
                            item.type_name(),
                            current.type_name()
                        ),
                    )
                })?;
                if ordering == wanted { item } else { current }
            }
        });
    }
    best.ok_or_else(|| RenderError::Argument(format!("{name}() arg is an empty sequence")))
}

fn min(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("min", kwargs)?;
    extreme("min", args, Ordering::Less)
}

fn max(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("max", kwargs)?;
    extreme("max", args, Ordering::Greater)
}

fn abs(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("abs", kwargs)?;
    arity("abs", args, 1, 1)?;
    match &args[0] {
        Value::Int(i) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| RenderError::Arithmetic("integer overflow".into())),
        other => Ok(Value::Float(number_arg("abs", other)?.abs())),
    }
}

fn sum(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("sum", kwargs)?;
    arity("sum", args, 1, 2)?;
    let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
    for item in ops::iterate(&args[0])? {
        total = ops::binary(crate::processor::ast::BinaryOp::Add, &total, &item)?;
    }
    Ok(total)
}

fn round(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("round", kwargs)?;
    arity("round", args, 1, 2)?;
    let x = number_arg("round", &args[0])?;
    match args.get(1) {
        None | Some(Value::None) => {
            let rounded = x.round_ties_even();
            if rounded.is_nan() {
                return Err(RenderError::Arithmetic("cannot convert float NaN to integer".into()));
            }
            // i64::MAX as f64 rounds up to 2^63, which is already out of range
            if rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
                return Err(RenderError::Arithmetic("cannot convert float to integer: out of range".into()));
            }
            Ok(Value::Int(rounded as i64))
        }
        Some(digits) => {
            // past these no f64 digit changes
            let digits = int_arg("round", digits)?.clamp(-400, 400) as i32;
            if digits > 308 || !x.is_finite() {
                return Ok(Value::Float(x));
            }
            let factor = 10f64.powi(digits);
            if factor == 0.0 {
                return Ok(Value::Float(0.0));
            }
            Ok(Value::Float((x * factor).round_ties_even() / factor))
        }
    }
}

fn to_str(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("str", kwargs)?;
    arity("str", args, 0, 1)?;
    Ok(Value::str(args.first().map(Value::to_string).unwrap_or_default()))
}

fn to_int(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("int", kwargs)?;
    arity("int", args, 0, 1)?;
    match args.first() {
        None => Ok(Value::Int(0)),
        Some(Value::Int(i)) => Ok(Value::Int(*i)),
        Some(Value::Bool(b)) => Ok(Value::Int(*b as i64)),
        Some(Value::Float(f)) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        Some(Value::Str(s)) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            RenderError::Argument(format!("invalid literal for int() with base 10: {}", Value::Str(s.clone()).repr()))
        }),
        Some(other) => Err(RenderError::type_error(
            "int",
            format!("int() argument must be a string or a number, not '{}'", other.type_name()),
        )),
    }
}

fn to_float(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("float", kwargs)?;
    arity("float", args, 0, 1)?;
    match args.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(s)) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            RenderError::Argument(format!("could not convert string to float: {}", Value::Str(s.clone()).repr()))
        }),
        Some(other) => Ok(Value::Float(number_arg("float", other)?)),
    }
}

fn to_bool(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("bool", kwargs)?;
    arity("bool", args, 0, 1)?;
    Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
}

fn list(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("list", kwargs)?;
    arity("list", args, 0, 1)?;
    match args.first() {
        None => Ok(Value::list(Vec::new())),
        Some(items) => Ok(Value::list(ops::iterate(items)?)),
    }
}

fn tuple(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("tuple", kwargs)?;
    arity("tuple", args, 0, 1)?;
    match args.first() {
        None => Ok(Value::tuple(Vec::new())),
        Some(items) => Ok(Value::tuple(ops::iterate(items)?)),
    }
}

/// `dict(pairs)` and/or `dict(key=value, ...)`.
fn dict(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    arity("dict", args, 0, 1)?;
    let mut entries = Vec::new();
    if let Some(source) = args.first() {
        let pairs = match source {
            Value::Dict(map) => map
                .borrow()
                .iter()
                .map(|(k, v)| Value::tuple(vec![k.to_value(), v.clone()]))
                .collect(),
            other => ops::iterate(other)?,
        };
        for pair in pairs {
            match ops::iterate(&pair)?.as_slice() {
                [k, v] => entries.push((Key::from_value(k)?, v.clone())),
                _ => {
                    return Err(RenderError::Argument(
                        "dictionary update sequence element has wrong length".into(),
                    ));
                }
            }
        }
    }
    for (k, v) in kwargs {
        entries.push((Key::from(k.as_str()), v.clone()));
    }
    Ok(Value::dict(entries))
}

fn sorted(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    arity("sorted", args, 1, 1)?;
    let mut reverse = false;
    for (key, value) in kwargs {
        match key.as_str() {
            "reverse" => reverse = value.is_truthy(),
            other => {
                return Err(RenderError::Argument(format!(
                    "sorted() got an unexpected keyword argument '{other}'"
                )));
            }
        }
    }
    let mut items = merge_sort(ops::iterate(&args[0])?)?;
    if reverse {
        items.reverse();
    }
    Ok(Value::list(items))
}

/// Stable merge sort that reports the first incomparable pair instead of
/// guessing an order for it.
fn merge_sort(mut items: Vec<Value>) -> Result<Vec<Value>, RenderError> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = merge_sort(items.split_off(items.len() / 2))?;
    let left = merge_sort(items)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut right = right.into_iter().peekable();
    for item in left {
        while let Some(next) = right.peek() {
            if sort_order(next, &item)? == Ordering::Less {
                out.extend(right.next());
            } else {
                break;
            }
        }
        out.push(item);
    }
    out.extend(right);
    Ok(out)
}

fn sort_order(a: &Value, b: &Value) -> Result<Ordering, RenderError> {
    match ops::order(a, b) {
        Some(ordering) => Ok(ordering),
        // NaN sorts like Python's: never less than anything
        None if ops::as_number(a).is_some() && ops::as_number(b).is_some() => Ok(Ordering::Equal),
        None => Err(RenderError::type_error(
            "sorted",
            format!("cannot compare '{}' and '{}'", a.type_name(), b.type_name()),
        )),
    }
}

fn reversed(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("reversed", kwargs)?;
    arity("reversed", args, 1, 1)?;
    let mut items = ops::iterate(&args[0])?;
    items.reverse();
    Ok(Value::list(items))
}

fn enumerate(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    arity("enumerate", args, 1, 2)?;
    let mut start = match args.get(1) {
        Some(v) => int_arg("enumerate", v)?,
        None => 0,
    };
    for (key, value) in kwargs {
        match key.as_str() {
            "start" => start = int_arg("enumerate", value)?,
            other => {
                return Err(RenderError::Argument(format!(
                    "enumerate() got an unexpected keyword argument '{other}'"
                )));
            }
        }
    }
    let items = ops::iterate(&args[0])?
        .into_iter()
        .zip(start..)
        .map(|(item, i)| Value::tuple(vec![Value::Int(i), item]))
        .collect();
    Ok(Value::list(items))
}

fn zip(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("zip", kwargs)?;
    let columns = args
        .iter()
        .map(ops::iterate)
        .collect::<Result<Vec<_>, _>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    let items = (0..rows)
        .map(|row| Value::tuple(columns.iter().map(|col| col[row].clone()).collect()))
        .collect();
    Ok(Value::list(items))
}

fn any(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("any", kwargs)?;
    arity("any", args, 1, 1)?;
    Ok(Value::Bool(ops::iterate(&args[0])?.iter().any(Value::is_truthy)))
}

fn all(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("all", kwargs)?;
    arity("all", args, 1, 1)?;
    Ok(Value::Bool(ops::iterate(&args[0])?.iter().all(Value::is_truthy)))
}

fn repr(args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    no_kwargs("repr", kwargs)?;
    arity("repr", args, 1, 1)?;
    Ok(Value::str(match &args[0] {
        Value::Float(f) => format_float(*f),
        other => other.repr(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value, RenderError> {
        let builtins = default_builtins();
        ops::call(&builtins[name], args, &[])
    }

    fn ints(items: &[i64]) -> Value {
        Value::list(items.iter().map(|i| Value::Int(*i)).collect())
    }

    #[test]
    fn test_builtin_results() {
        let test_cases = vec![
            ("range", vec![Value::Int(3)], ints(&[0, 1, 2])),
            ("range", vec![Value::Int(5), Value::Int(0), Value::Int(-2)], ints(&[5, 3, 1])),
            ("min", vec![Value::Int(1), Value::Int(2)], Value::Int(1)),
            ("max", vec![ints(&[3, 9, 4])], Value::Int(9)),
            ("len", vec![Value::str("\u{203d}x")], Value::Int(2)),
            ("sum", vec![ints(&[1, 2, 3])], Value::Int(6)),
            ("abs", vec![Value::Int(-4)], Value::Int(4)),
            ("round", vec![Value::Float(2.5)], Value::Int(2)),
            ("str", vec![Value::Float(1.0)], Value::str("1.0")),
            ("int", vec![Value::str(" 42 ")], Value::Int(42)),
            ("bool", vec![ints(&[])], Value::Bool(false)),
            ("sorted", vec![ints(&[3, 1, 2])], ints(&[1, 2, 3])),
            ("reversed", vec![ints(&[1, 2])], ints(&[2, 1])),
            ("repr", vec![Value::str("a")], Value::str("'a'")),
            (
                "enumerate",
                vec![Value::list(vec![Value::str("a")])],
                Value::list(vec![Value::tuple(vec![Value::Int(0), Value::str("a")])]),
            ),
            (
                "zip",
                vec![ints(&[1, 2]), ints(&[3])],
                Value::list(vec![Value::tuple(vec![Value::Int(1), Value::Int(3)])]),
            ),
        ];

        for (name, args, expected) in test_cases {
            assert_eq!(call(name, &args), Ok(expected), "{name}({args:?})");
        }
    }

    #[test]
    fn test_builtin_errors() {
        assert!(matches!(call("min", &[]), Err(RenderError::Argument(_))));
        assert!(matches!(call("len", &[Value::Int(1)]), Err(RenderError::Type { .. })));
        assert!(matches!(
            call("sorted", &[Value::list(vec![Value::Int(1), Value::str("a")])]),
            Err(RenderError::Type { .. })
        ));
        assert!(matches!(call("range", &[Value::Int(1), Value::Int(2), Value::Int(0)]), Err(RenderError::Argument(_))));
    }

    #[test]
    fn test_sorted_reverse_keyword() {
        let builtins = default_builtins();
        let result = ops::call(
            &builtins["sorted"],
            &[ints(&[1, 3, 2])],
            &[("reverse".to_string(), Value::Bool(true))],
        );
        assert_eq!(result, Ok(ints(&[3, 2, 1])));
    }

    #[test]
    fn test_dict_from_pairs_and_keywords() {
        let builtins = default_builtins();
        let pairs = Value::list(vec![Value::tuple(vec![Value::str("a"), Value::Int(1)])]);
        let result = ops::call(&builtins["dict"], &[pairs], &[("b".to_string(), Value::Int(2))]);
        assert_eq!(
            result,
            Ok(Value::dict(vec![(Key::from("a"), Value::Int(1)), (Key::from("b"), Value::Int(2))]))
        );
    }

    #[test]
    fn test_range_at_the_integer_limits() {
        let test_cases = vec![
            (vec![i64::MAX - 1, i64::MAX, 5], ints(&[i64::MAX - 1])),
            (vec![i64::MIN, i64::MIN + 3, 2], ints(&[i64::MIN, i64::MIN + 2])),
            (vec![i64::MAX, i64::MIN, i64::MIN], ints(&[i64::MAX, -1])),
            (vec![i64::MAX, 0, i64::MAX], ints(&[])),
        ];

        for (args, expected) in test_cases {
            let args: Vec<Value> = args.into_iter().map(Value::Int).collect();
            assert_eq!(call("range", &args), Ok(expected), "{args:?}");
        }

        let too_long = vec![
            vec![Value::Int(1_000_000_000_000)],
            vec![Value::Int(i64::MIN), Value::Int(i64::MAX)],
        ];
        for args in too_long {
            assert!(matches!(call("range", &args), Err(RenderError::Arithmetic(_))), "{args:?}");
        }
    }

    #[test]
    fn test_round_rejects_non_finite() {
        for x in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e300] {
            assert!(matches!(call("round", &[Value::Float(x)]), Err(RenderError::Arithmetic(_))), "{x}");
        }
        assert_eq!(call("round", &[Value::Float(2.5)]), Ok(Value::Int(2)));
        assert_eq!(call("round", &[Value::Float(-1e18)]), Ok(Value::Int(-1_000_000_000_000_000_000)));
        assert_eq!(call("round", &[Value::Float(1.25), Value::Int(i64::MAX)]), Ok(Value::Float(1.25)));
        assert_eq!(call("round", &[Value::Float(1.25), Value::Int(i64::MIN)]), Ok(Value::Float(0.0)));
    }

    #[test]
    fn test_sorted_reports_incomparable_items() {
        let mixed = vec![
            Value::list(vec![ints(&[1]), Value::str("a"), ints(&[0])]),
            Value::list(vec![
                Value::list(vec![Value::Int(1), Value::str("a")]),
                ints(&[0]),
                ints(&[1, 2]),
            ]),
        ];
        for items in mixed {
            assert!(matches!(call("sorted", &[items.clone()]), Err(RenderError::Type { .. })), "{items:?}");
        }

        let with_nan = Value::list(vec![Value::Int(2), Value::Float(f64::NAN), Value::Int(1)]);
        match call("sorted", &[with_nan]) {
            Ok(Value::List(items)) => assert_eq!(items.borrow().len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }
}
