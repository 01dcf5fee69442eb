//! Splits one text line into literal text and inline emits.
//
//  Forms recognised after a `$`:
//
//      $$            literal `$`
//      $# ...        comment, drops the rest of the line
//      $name.a[0]()  name chain: `.ident`, `[..]` and `(..)` groups
//      $(expr)       bracketed expression
//      ${expr}       bracketed expression
//      $:form        any of the three forms above, emitted without escaping
//
//  A `$` followed by anything else stays in the text.

use super::ast::Segment;
use super::expr_parser::{ParseError, parse_expression};

/// Segments of `line`. Error offsets are char offsets into `line`.
pub fn segment_line(line: &str) -> Result<Vec<Segment>, ParseError> {
    let chars: Vec<char> = line.chars().collect();
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '$' {
            text.push(chars[i]);
            i += 1;
            continue;
        }
        match chars.get(i + 1) {
            Some('$') => {
                text.push('$');
                i += 2;
            }
            Some('#') => break,
            Some(':') => match emit_form(&chars, i + 2)? {
                Some((expr_range, end)) => {
                    flush(&mut text, &mut segments);
                    segments.push(emit(&chars, expr_range, false)?);
                    i = end;
                }
                None => {
                    text.push_str("$:");
                    i += 2;
                }
            },
            _ => match emit_form(&chars, i + 1)? {
                Some((expr_range, end)) => {
                    flush(&mut text, &mut segments);
                    segments.push(emit(&chars, expr_range, true)?);
                    i = end;
                }
                None => {
                    text.push('$');
                    i += 1;
                }
            },
        }
    }
    flush(&mut text, &mut segments);
    Ok(segments)
}

fn flush(text: &mut String, segments: &mut Vec<Segment>) {
    if !text.is_empty() {
        segments.push(Segment::Text(std::mem::take(text)));
    }
}

fn emit(chars: &[char], (start, end): (usize, usize), escape: bool) -> Result<Segment, ParseError> {
    let src: String = chars[start..end].iter().collect();
    let expr = parse_expression(&src).map_err(|e| ParseError {
        offset: start + e.offset,
        message: e.message,
    })?;
    Ok(Segment::Emit { expr, escape })
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Recognise an emit form starting at `start`.
///
/// Returns the char range of the expression text and the index just past
/// the whole form.
fn emit_form(chars: &[char], start: usize) -> Result<Option<((usize, usize), usize)>, ParseError> {
    match chars.get(start) {
        Some('(') | Some('{') => {
            let close = closing_bracket(chars, start)?;
            Ok(Some(((start + 1, close), close + 1)))
        }
        Some(&c) if is_ident_start(c) => {
            let mut end = start + 1;
            loop {
                while chars.get(end).copied().is_some_and(is_ident_char) {
                    end += 1;
                }
                match chars.get(end) {
                    Some('.') if chars.get(end + 1).copied().is_some_and(is_ident_start) => {
                        end += 2;
                    }
                    Some('[') | Some('(') => {
                        // groups may follow each other: `f(x)[0](y)`
                        end = closing_bracket(chars, end)? + 1;
                        while matches!(chars.get(end), Some('[') | Some('(')) {
                            end = closing_bracket(chars, end)? + 1;
                        }
                        if !matches!(chars.get(end), Some('.')) {
                            break;
                        }
                    }
                    _ => break,
                }
            }
            Ok(Some(((start, end), end)))
        }
        _ => Ok(None),
    }
}

/// Index of the bracket that closes the one at `open`, skipping quoted
/// strings and nested groups.
fn closing_bracket(chars: &[char], open: usize) -> Result<usize, ParseError> {
    let mut stack = Vec::new();
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '(' => stack.push(')'),
            '[' => stack.push(']'),
            '{' => stack.push('}'),
            c @ (')' | ']' | '}') => {
                if stack.pop() != Some(c) {
                    return Err(ParseError {
                        offset: i,
                        message: format!("unbalanced '{c}'"),
                    });
                }
                if stack.is_empty() {
                    return Ok(i);
                }
            }
            quote @ ('\'' | '"') => {
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(ParseError {
                        offset: i.min(chars.len()),
                        message: "unterminated string literal".into(),
                    });
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(ParseError {
        offset: open,
        message: format!("unbalanced '{}'", chars[open]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ast::{Const, Expr, NameScope};

    fn text(s: &str) -> Segment {
        Segment::Text(s.into())
    }

    fn name(n: &str, escape: bool) -> Segment {
        Segment::Emit {
            expr: Expr::Name(n.into(), NameScope::Global),
            escape,
        }
    }

    #[test]
    fn test_plain_and_escaped_text() {
        let test_cases = vec![
            ("hello", vec![text("hello")]),
            ("$$money", vec![text("$money")]),
            ("costs $5", vec![text("costs $5")]),
            ("a $ b", vec![text("a $ b")]),
            ("trailing $", vec![text("trailing $")]),
            ("hello$# comment", vec![text("hello")]),
            ("$# only a comment", vec![]),
            ("", vec![]),
        ];

        for (src, expected) in test_cases {
            assert_eq!(segment_line(src), Ok(expected), "{src}");
        }
    }

    #[test]
    fn test_emit_forms() {
        assert_eq!(
            segment_line("$a $:a"),
            Ok(vec![name("a", true), text(" "), name("a", false)])
        );
        assert_eq!(
            segment_line("keep $(limit)ing."),
            Ok(vec![text("keep "), name("limit", true), text("ing.")])
        );
        assert_eq!(
            segment_line("Hello $name."),
            Ok(vec![text("Hello "), name("name", true), text(".")])
        );
        assert_eq!(
            segment_line("${1}"),
            Ok(vec![Segment::Emit {
                expr: Expr::Literal(Const::Int(1)),
                escape: true
            }])
        );
    }

    #[test]
    fn test_name_chains() {
        let test_cases = vec![
            ("$a.b[0]!", "a.b[0]"),
            ("$x.upper() ok", "x.upper()"),
            ("$list(a.keys())[0]", "list(a.keys())[0]"),
            ("$loop.parent.parity, x", "loop.parent.parity"),
            ("$d['a)'].get(1).real", "d['a)'].get(1).real"),
        ];

        for (src, chain) in test_cases {
            let segments = segment_line(src).unwrap();
            let expected = parse_expression(chain).unwrap();
            match &segments[0] {
                Segment::Emit { expr, .. } => assert_eq!(expr, &expected, "{src}"),
                other => panic!("{src}: expected emit, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_unbalanced_brackets() {
        let err = segment_line("x $(1 + 2").unwrap_err();
        assert_eq!(err.offset, 3);

        let err = segment_line("$f(1]").unwrap_err();
        assert_eq!(err.offset, 4);

        let err = segment_line("$(1 +)").unwrap_err();
        assert_eq!(err.offset, 5);
    }
}
