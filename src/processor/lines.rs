//! Line classifier: turns raw source into logical lines.
//!
//! Each physical line is either a text line or a directive line. Directive
//! lines ending in `\` are joined with the next physical line; text lines
//! ending in `\` simply lose their newline. Block structure is left to the
//! compiler, which only needs the indentation recorded here.

use crate::error::SyntaxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Elif,
    Else,
    For,
    While,
    DefWith,
    Var,
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::For => "for",
            Keyword::While => "while",
            Keyword::DefWith => "def with",
            Keyword::Var => "var",
        }
    }

    /// Keywords whose header ends in `:` and owns a body.
    pub fn opens_block(self) -> bool {
        matches!(
            self,
            Keyword::If | Keyword::Elif | Keyword::Else | Keyword::For | Keyword::While
        )
    }
}

/// Text with the 1-based column it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub text: String,
    pub column: usize,
}

/// One-line body written after `: ` on a block header.
#[derive(Debug, Clone, PartialEq)]
pub struct Inline {
    pub text: Fragment,
    pub newline: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    /// The whole physical line, indentation included.
    Text { raw: String, newline: bool },
    /// For block keywords `head` is the part before the `:`; `inline` is the
    /// one-line body after `: `, if any.
    Directive {
        keyword: Keyword,
        head: Fragment,
        inline: Option<Inline>,
    },
    /// `$ stmt`
    Statement(Fragment),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// 1-based number of the first physical line.
    pub number: usize,
    pub indent: usize,
    pub kind: LineKind,
}

impl Line {
    pub fn is_blank(&self) -> bool {
        matches!(&self.kind, LineKind::Text { raw, .. } if raw.trim().is_empty())
    }

    fn text(number: usize, raw: &str) -> Line {
        let (raw, newline) = match raw.strip_suffix('\\') {
            Some(stripped) => (stripped, false),
            None => (raw, true),
        };
        Line {
            number,
            indent: indentation(raw),
            kind: LineKind::Text {
                raw: raw.to_string(),
                newline,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub lines: Vec<Line>,
    pub trailing_newline: bool,
}

fn strip_bom(source: &str) -> &str {
    source
        .strip_prefix('\u{feff}')
        // the UTF-8 BOM bytes read as Latin-1
        .or_else(|| source.strip_prefix("\u{ef}\u{bb}\u{bf}"))
        .unwrap_or(source)
}

fn indentation(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

pub fn classify(source: &str) -> Result<Source, SyntaxError> {
    let source = strip_bom(source);
    let trailing_newline = source.ends_with('\n');
    let body = source.strip_suffix('\n').unwrap_or(source);

    let physical: Vec<&str> = if source.is_empty() {
        Vec::new()
    } else {
        body.split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .collect()
    };

    let mut lines = Vec::new();
    let mut idx = 0;
    while idx < physical.len() {
        let number = idx + 1;
        let mut joined = physical[idx].to_string();
        idx += 1;
        loop {
            let line = classify_line(number, &joined);
            // a header that does not parse yet may still be completed by
            // the next physical line
            let continues = joined.ends_with('\\')
                && !matches!(
                    &line,
                    Ok(Line {
                        kind: LineKind::Text { .. } | LineKind::Directive { inline: Some(_), .. },
                        ..
                    })
                );
            if !continues {
                lines.push(line?);
                break;
            }
            match physical.get(idx) {
                Some(next) => {
                    joined.pop();
                    joined.push_str(next);
                    idx += 1;
                }
                None => {
                    return Err(SyntaxError::new(
                        number,
                        joined.chars().count(),
                        "unterminated line continuation",
                    ));
                }
            }
        }
    }

    Ok(Source {
        lines,
        trailing_newline,
    })
}

fn leading_word(s: &str) -> &str {
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map_or(s.len(), |(i, _)| i);
    &s[..end]
}

fn classify_line(number: usize, raw: &str) -> Result<Line, SyntaxError> {
    let indent = indentation(raw);
    let content: String = raw.chars().skip(indent).collect();
    let Some(rest) = content.strip_prefix('$') else {
        return Ok(Line::text(number, raw));
    };
    // column just after the `$`
    let base = indent + 2;

    if rest.starts_with(char::is_whitespace) {
        let src = rest.trim_end_matches('\\').trim();
        if src.is_empty() {
            return Ok(Line::text(number, raw));
        }
        let column = base + (rest.chars().count() - rest.trim_start().chars().count());
        return Ok(Line {
            number,
            indent,
            kind: LineKind::Statement(Fragment {
                text: src.to_string(),
                column,
            }),
        });
    }

    let word = leading_word(rest);
    let keyword = match word {
        "if" => Keyword::If,
        "elif" => Keyword::Elif,
        "else" => Keyword::Else,
        "for" => Keyword::For,
        "while" => Keyword::While,
        "var" => Keyword::Var,
        "def" => Keyword::DefWith,
        _ => return Ok(Line::text(number, raw)),
    };
    let mut after = &rest[word.len()..];
    let mut column = base + word.chars().count();

    if keyword == Keyword::DefWith {
        let trimmed = after.trim_start();
        if leading_word(trimmed) != "with" {
            return Err(SyntaxError::new(number, base, "expected 'def with'"));
        }
        column += after.chars().count() - trimmed.chars().count() + "with".len();
        after = &trimmed["with".len()..];
    }

    if !keyword.opens_block() {
        return Ok(Line {
            number,
            indent,
            kind: LineKind::Directive {
                keyword,
                head: Fragment {
                    text: after.to_string(),
                    column,
                },
                inline: None,
            },
        });
    }

    // with unbalanced brackets fall back to a trailing `:` so the
    // expression parser reports the real problem
    let trailing_colon = || {
        let trimmed = after.trim_end();
        trimmed.ends_with(':').then(|| trimmed.len() - 1)
    };
    let Some(colon) = top_level_colon(after).or_else(trailing_colon) else {
        return Err(SyntaxError::new(
            number,
            column + after.chars().count(),
            format!("expected ':' after '{}' header", keyword.as_str()),
        ));
    };
    let head = &after[..colon];
    let remainder = &after[colon + 1..];
    let inline = if remainder.trim().is_empty() || remainder.trim_start().starts_with("$#") {
        None
    } else {
        let body = remainder.strip_prefix(' ').unwrap_or(remainder);
        let body_column = column + after[..colon + 1].chars().count() + remainder.chars().count()
            - body.chars().count();
        let (body, newline) = match body.strip_suffix('\\') {
            Some(stripped) => (stripped, false),
            None => (body, true),
        };
        Some(Inline {
            text: Fragment {
                text: body.to_string(),
                column: body_column,
            },
            newline,
        })
    };

    Ok(Line {
        number,
        indent,
        kind: LineKind::Directive {
            keyword,
            head: Fragment {
                text: head.to_string(),
                column,
            },
            inline,
        },
    })
}

/// Byte index of the first `:` outside brackets and string literals.
fn top_level_colon(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}
