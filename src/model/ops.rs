//! Operator semantics: arithmetic, comparison, membership, indexing,
//! slicing, iteration and invocation.

use super::{Key, Kwargs, Value};
use crate::error::RenderError;
use crate::processor::ast::{BinaryOp, CompareOp};
use std::cmp::Ordering;

pub fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Bool(b) => Some(*b as i64 as f64),
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn unsupported(op: &str, left: &Value, right: &Value) -> RenderError {
    RenderError::type_error(
        op,
        format!(
            "unsupported operand types: '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ),
    )
}

fn overflow() -> RenderError {
    RenderError::Arithmetic("integer overflow".into())
}

/// Largest string (in bytes) or list (in items) an operation may build.
pub const MAX_LEN: usize = 1 << 24;

pub(crate) fn too_large(what: &str) -> RenderError {
    RenderError::Arithmetic(format!("{what} is too large"))
}

fn division_by_zero() -> RenderError {
    RenderError::Arithmetic("division by zero".into())
}

pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RenderError> {
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => arith(op, left, right, i64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => mul(left, right),
        BinaryOp::Div => {
            let (a, b) = floats(op, left, right)?;
            if b == 0.0 {
                return Err(division_by_zero());
            }
            Ok(Value::Float(a / b))
        }
        BinaryOp::FloorDiv => {
            if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
                if b == 0 {
                    return Err(division_by_zero());
                }
                let q = a.checked_div(b).ok_or_else(overflow)?;
                let q = if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q };
                return Ok(Value::Int(q));
            }
            let (a, b) = floats(op, left, right)?;
            if b == 0.0 {
                return Err(division_by_zero());
            }
            Ok(Value::Float((a / b).floor()))
        }
        BinaryOp::Mod => {
            if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
                if b == 0 {
                    return Err(division_by_zero());
                }
                let r = a.checked_rem(b).ok_or_else(overflow)?;
                let r = if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r };
                return Ok(Value::Int(r));
            }
            let (a, b) = floats(op, left, right)?;
            if b == 0.0 {
                return Err(division_by_zero());
            }
            Ok(Value::Float(a - b * (a / b).floor()))
        }
        BinaryOp::Pow => {
            if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
                if b >= 0 {
                    let exp = u32::try_from(b).map_err(|_| overflow())?;
                    return a.checked_pow(exp).map(Value::Int).ok_or_else(overflow);
                }
            }
            let (a, b) = floats(op, left, right)?;
            Ok(Value::Float(a.powf(b)))
        }
    }
}

fn floats(op: BinaryOp, left: &Value, right: &Value) -> Result<(f64, f64), RenderError> {
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(unsupported(op.symbol(), left, right)),
    }
}

fn arith(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, RenderError> {
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return int_op(a, b).map(Value::Int).ok_or_else(overflow);
    }
    let (a, b) = floats(op, left, right)?;
    Ok(Value::Float(float_op(a, b)))
}

fn add(left: &Value, right: &Value) -> Result<Value, RenderError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()))
        }
        _ => arith(BinaryOp::Add, left, right, i64::checked_add, |a, b| a + b),
    }
}

fn mul(left: &Value, right: &Value) -> Result<Value, RenderError> {
    match (left, right) {
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
            let count = repeat_count(s.len(), *n)?;
            Ok(Value::str(s.repeat(count)))
        }
        (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
            let items = items.borrow();
            let count = repeat_count(items.len(), *n)?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::list(out))
        }
        _ => arith(BinaryOp::Mul, left, right, i64::checked_mul, |a, b| a * b),
    }
}

/// How many copies `seq * n` makes; zero when the result is empty.
fn repeat_count(len: usize, n: i64) -> Result<usize, RenderError> {
    let n = usize::try_from(n).unwrap_or(0);
    match len.checked_mul(n) {
        Some(0) => Ok(0),
        Some(total) if total <= MAX_LEN => Ok(n),
        _ => Err(too_large("repeated sequence")),
    }
}

pub fn negate(value: &Value) -> Result<Value, RenderError> {
    match value {
        Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        Value::Bool(b) => Ok(Value::Int(-(*b as i64))),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(RenderError::type_error(
            "-",
            format!("bad operand type for unary -: '{}'", other.type_name()),
        )),
    }
}

pub fn positive(value: &Value) -> Result<Value, RenderError> {
    match value {
        Value::Int(_) | Value::Float(_) => Ok(value.clone()),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        other => Err(RenderError::type_error(
            "+",
            format!("bad operand type for unary +: '{}'", other.type_name()),
        )),
    }
}

// ─────────────────────────────────────────────────────
// Comparison
// ─────────────────────────────────────────────────────

pub fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, RenderError> {
    match op {
        CompareOp::Eq => Ok(left == right),
        CompareOp::NotEq => Ok(left != right),
        CompareOp::In => contains(right, left),
        CompareOp::NotIn => contains(right, left).map(|found| !found),
        CompareOp::Is => Ok(identical(left, right)),
        CompareOp::IsNot => Ok(!identical(left, right)),
        CompareOp::Lt | CompareOp::LtE | CompareOp::Gt | CompareOp::GtE => {
            let ordering = order(left, right).ok_or_else(|| {
                RenderError::type_error(
                    op.symbol(),
                    format!(
                        "'{}' not supported between instances of '{}' and '{}'",
                        op.symbol(),
                        left.type_name(),
                        right.type_name()
                    ),
                )
            })?;
            Ok(match op {
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::LtE => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => std::rc::Rc::ptr_eq(a, b) || a == b,
        (Value::List(a), Value::List(b)) => std::rc::Rc::ptr_eq(a, b),
        (Value::Dict(a), Value::Dict(b)) => std::rc::Rc::ptr_eq(a, b),
        (Value::Tuple(a), Value::Tuple(b)) => std::rc::Rc::ptr_eq(a, b),
        (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
        (Value::Object(a), Value::Object(b)) => std::rc::Rc::ptr_eq(a, b),
        (Value::Loop(a), Value::Loop(b)) => std::rc::Rc::ptr_eq(a, b),
        _ => false,
    }
}

/// Total order where one exists: numbers, strings, and sequences of
/// comparable items.
pub fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::List(a), Value::List(b)) => order_seq(&a.borrow(), &b.borrow()),
        (Value::Tuple(a), Value::Tuple(b)) => order_seq(a, b),
        _ => as_number(left)?.partial_cmp(&as_number(right)?),
    }
}

fn order_seq(a: &[Value], b: &[Value]) -> Option<Ordering> {
    for (x, y) in a.iter().zip(b.iter()) {
        if x != y {
            return order(x, y);
        }
    }
    Some(a.len().cmp(&b.len()))
}

pub fn contains(container: &Value, item: &Value) -> Result<bool, RenderError> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(&**needle)),
            other => Err(RenderError::type_error(
                "in",
                format!("'in <string>' requires string as left operand, not {}", other.type_name()),
            )),
        },
        Value::Dict(map) => Ok(map.borrow().contains_key(&Key::from_value(item)?)),
        other => Ok(iterate(other)
            .map_err(|_| {
                RenderError::type_error(
                    "in",
                    format!("argument of type '{}' is not iterable", other.type_name()),
                )
            })?
            .contains(item)),
    }
}

// ─────────────────────────────────────────────────────
// Containers
// ─────────────────────────────────────────────────────

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let pos = if index < 0 { index + len } else { index };
    (0..len).contains(&pos).then_some(pos as usize)
}

pub fn get_item(base: &Value, key: &Value) -> Result<Value, RenderError> {
    let int_key = |what: &str| {
        key.as_int().ok_or_else(|| {
            RenderError::type_error(
                "index",
                format!("{what} indices must be integers, not {}", key.type_name()),
            )
        })
    };
    match base {
        Value::List(items) => {
            let items = items.borrow();
            normalize_index(int_key("list")?, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| RenderError::Lookup("list index out of range".into()))
        }
        Value::Tuple(items) => normalize_index(int_key("tuple")?, items.len())
            .map(|i| items[i].clone())
            .ok_or_else(|| RenderError::Lookup("tuple index out of range".into())),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            normalize_index(int_key("string")?, chars.len())
                .map(|i| Value::str(chars[i].to_string()))
                .ok_or_else(|| RenderError::Lookup("string index out of range".into()))
        }
        Value::Dict(map) => map
            .borrow()
            .get(&Key::from_value(key)?)
            .cloned()
            .ok_or_else(|| RenderError::Lookup(format!("key {} not found", key.repr()))),
        Value::Object(obj) => obj.get_item(key).unwrap_or_else(|| Err(not_subscriptable(base))),
        other => Err(not_subscriptable(other)),
    }
}

/// `base[key] = value` for lists and dicts.
pub fn set_item(base: &Value, key: &Value, value: Value) -> Result<(), RenderError> {
    match base {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let index = key.as_int().ok_or_else(|| {
                RenderError::type_error(
                    "index",
                    format!("list indices must be integers, not {}", key.type_name()),
                )
            })?;
            let slot = normalize_index(index, items.len())
                .ok_or_else(|| RenderError::Lookup("list assignment index out of range".into()))?;
            items[slot] = value;
            Ok(())
        }
        Value::Dict(map) => {
            map.borrow_mut().insert(Key::from_value(key)?, value);
            Ok(())
        }
        other => Err(RenderError::type_error(
            "index",
            format!("'{}' object does not support item assignment", other.type_name()),
        )),
    }
}

fn not_subscriptable(value: &Value) -> RenderError {
    RenderError::type_error(
        "index",
        format!("'{}' object is not subscriptable", value.type_name()),
    )
}

/// Python slice semantics with clamped bounds.
pub fn slice(
    base: &Value,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Result<Value, RenderError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(RenderError::Lookup("slice step cannot be zero".into()));
    }
    let pick = |len: usize| -> Vec<usize> {
        let len = len as i64;
        let clamp = |v: i64, lo: i64, hi: i64| {
            let v = if v < 0 { v + len } else { v };
            v.clamp(lo, hi)
        };
        let mut out = Vec::new();
        if step > 0 {
            let mut i = start.map_or(0, |s| clamp(s, 0, len));
            let end = stop.map_or(len, |s| clamp(s, 0, len));
            while i < end {
                out.push(i as usize);
                match i.checked_add(step) {
                    Some(next) => i = next,
                    None => break,
                }
            }
        } else {
            let mut i = start.map_or(len - 1, |s| clamp(s, -1, len - 1));
            let end = stop.map_or(-1, |s| clamp(s, -1, len - 1));
            while i > end {
                out.push(i as usize);
                match i.checked_add(step) {
                    Some(next) => i = next,
                    None => break,
                }
            }
        }
        out
    };
    match base {
        Value::List(items) => {
            let items = items.borrow();
            Ok(Value::list(pick(items.len()).into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => Ok(Value::tuple(
            pick(items.len()).into_iter().map(|i| items[i].clone()).collect(),
        )),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::str(pick(chars.len()).into_iter().map(|i| chars[i]).collect::<String>()))
        }
        other => Err(RenderError::type_error(
            "slice",
            format!("'{}' object cannot be sliced", other.type_name()),
        )),
    }
}

/// Snapshot of the items a value yields when iterated.
pub fn iterate(value: &Value) -> Result<Vec<Value>, RenderError> {
    match value {
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Tuple(items) => Ok(items.to_vec()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
        Value::Dict(map) => Ok(map.borrow().keys().map(Key::to_value).collect()),
        Value::Object(obj) => obj.iter().ok_or_else(|| not_iterable(value)),
        other => Err(not_iterable(other)),
    }
}

fn not_iterable(value: &Value) -> RenderError {
    RenderError::type_error(
        "iterate",
        format!("'{}' object is not iterable", value.type_name()),
    )
}

pub fn length(value: &Value) -> Result<usize, RenderError> {
    match value {
        Value::Str(s) => Ok(s.chars().count()),
        Value::List(items) => Ok(items.borrow().len()),
        Value::Tuple(items) => Ok(items.len()),
        Value::Dict(map) => Ok(map.borrow().len()),
        Value::Object(obj) => obj.iter().map(|items| items.len()).ok_or_else(|| {
            RenderError::type_error("len", format!("object of type '{}' has no len()", obj.type_name()))
        }),
        other => Err(RenderError::type_error(
            "len",
            format!("object of type '{}' has no len()", other.type_name()),
        )),
    }
}

pub fn call(callee: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value, RenderError> {
    match callee {
        Value::Function(f) => f.call(args, kwargs),
        Value::Object(obj) => obj
            .call(args, kwargs)
            .unwrap_or_else(|| Err(not_callable(callee))),
        other => Err(not_callable(other)),
    }
}

fn not_callable(value: &Value) -> RenderError {
    RenderError::type_error(
        "call",
        format!("'{}' object is not callable", value.type_name()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(items: &[i64]) -> Value {
        Value::list(items.iter().map(|i| Value::Int(*i)).collect())
    }

    #[test]
    fn test_binary_ops() {
        let test_cases = vec![
            (BinaryOp::Add, Value::Int(2), Value::Int(3), Value::Int(5)),
            (BinaryOp::Add, Value::str("a"), Value::str("b"), Value::str("ab")),
            (BinaryOp::Add, ints(&[1]), ints(&[2]), ints(&[1, 2])),
            (BinaryOp::Sub, Value::Int(2), Value::Float(0.5), Value::Float(1.5)),
            (BinaryOp::Mul, Value::str("ab"), Value::Int(2), Value::str("abab")),
            (BinaryOp::Div, Value::Int(7), Value::Int(2), Value::Float(3.5)),
            (BinaryOp::FloorDiv, Value::Int(-7), Value::Int(2), Value::Int(-4)),
            (BinaryOp::Mod, Value::Int(-7), Value::Int(3), Value::Int(2)),
            (BinaryOp::Pow, Value::Int(2), Value::Int(10), Value::Int(1024)),
        ];

        for (op, left, right, expected) in test_cases {
            assert_eq!(binary(op, &left, &right), Ok(expected), "{left:?} {op:?} {right:?}");
        }
    }

    #[test]
    fn test_arithmetic_errors() {
        assert_eq!(
            binary(BinaryOp::Div, &Value::Int(1), &Value::Int(0)),
            Err(RenderError::Arithmetic("division by zero".into()))
        );
        assert!(matches!(
            binary(BinaryOp::Add, &Value::Int(1), &Value::str("a")),
            Err(RenderError::Type { .. })
        ));
        assert!(matches!(
            binary(BinaryOp::Add, &Value::Int(i64::MAX), &Value::Int(1)),
            Err(RenderError::Arithmetic(_))
        ));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(compare(CompareOp::Lt, &Value::Int(0), &Value::Int(1)), Ok(true));
        assert_eq!(compare(CompareOp::GtE, &Value::str("b"), &Value::str("a")), Ok(true));
        assert_eq!(compare(CompareOp::In, &Value::Int(2), &ints(&[1, 2])), Ok(true));
        assert_eq!(compare(CompareOp::NotIn, &Value::str("z"), &Value::str("abc")), Ok(true));
        assert_eq!(compare(CompareOp::Is, &Value::None, &Value::None), Ok(true));
        assert!(compare(CompareOp::Lt, &Value::Int(0), &Value::str("a")).is_err());
    }

    #[test]
    fn test_indexing_and_slicing() {
        let list = ints(&[0, 1, 2, 3, 4]);
        assert_eq!(get_item(&list, &Value::Int(-1)), Ok(Value::Int(4)));
        assert!(matches!(get_item(&list, &Value::Int(5)), Err(RenderError::Lookup(_))));
        assert_eq!(slice(&list, Some(1), Some(3), None), Ok(ints(&[1, 2])));
        assert_eq!(slice(&list, None, None, Some(-2)), Ok(ints(&[4, 2, 0])));
        assert_eq!(slice(&Value::str("hello"), Some(-3), None, None), Ok(Value::str("llo")));
        assert!(matches!(
            get_item(&Value::Int(1), &Value::Int(0)),
            Err(RenderError::Type { .. })
        ));
    }

    #[test]
    fn test_item_assignment() {
        let list = ints(&[1, 2]);
        set_item(&list, &Value::Int(-1), Value::Int(9)).unwrap();
        assert_eq!(list, ints(&[1, 9]));

        let dict = Value::dict([]);
        set_item(&dict, &Value::str("k"), Value::Int(1)).unwrap();
        assert_eq!(get_item(&dict, &Value::str("k")), Ok(Value::Int(1)));

        assert!(set_item(&Value::tuple(vec![]), &Value::Int(0), Value::None).is_err());
    }

    #[test]
    fn test_call_requires_callable() {
        let err = call(&Value::Int(1), &[], &[]).unwrap_err();
        assert_eq!(
            err,
            RenderError::type_error("call", "'int' object is not callable")
        );
    }

    #[test]
    fn test_slice_with_extreme_bounds() {
        let list = ints(&[1, 2, 3]);
        let test_cases = vec![
            (Some(2), None, Some(i64::MAX), ints(&[3])),
            (Some(0), None, Some(i64::MAX), ints(&[1])),
            (None, None, Some(i64::MIN), ints(&[3])),
            (Some(i64::MIN), Some(i64::MAX), None, ints(&[1, 2, 3])),
            (Some(i64::MAX), Some(i64::MIN), Some(-1), ints(&[3, 2, 1])),
        ];

        for (start, stop, step, expected) in test_cases {
            assert_eq!(slice(&list, start, stop, step), Ok(expected), "{start:?}:{stop:?}:{step:?}");
        }
    }

    #[test]
    fn test_repetition_limits() {
        let test_cases = vec![
            (ints(&[1, 2]), Value::Int(i64::MAX)),
            (Value::str("ab"), Value::Int(i64::MAX)),
            (Value::Int(i64::MAX), Value::str("x")),
            (ints(&[0]), Value::Int(MAX_LEN as i64 + 1)),
        ];

        for (left, right) in test_cases {
            assert!(
                matches!(binary(BinaryOp::Mul, &left, &right), Err(RenderError::Arithmetic(_))),
                "{left:?} * {right:?}"
            );
        }
        assert_eq!(binary(BinaryOp::Mul, &ints(&[]), &Value::Int(i64::MAX)), Ok(ints(&[])));
        assert_eq!(binary(BinaryOp::Mul, &Value::str("ab"), &Value::Int(-3)), Ok(Value::str("")));
    }
}
