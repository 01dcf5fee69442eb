//! Output side of the CLI: rendered text and `$var` bindings.

use crate::template::Rendered;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Write the rendered text to `path`, or to stdout when there is none.
pub fn emit_text(rendered: &Rendered, path: Option<&Path>) -> io::Result<()> {
    match path {
        Some(path) => fs::write(path, rendered.as_str()),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(rendered.as_str().as_bytes())?;
            stdout.flush()
        }
    }
}

/// Write the `$var` namespace as a pretty JSON object.
pub fn emit_vars(rendered: &Rendered, path: &Path) -> io::Result<()> {
    let json = vars_json(rendered)?;
    fs::write(path, json)
}

pub fn vars_json(rendered: &Rendered) -> io::Result<String> {
    serde_json::to_string_pretty(rendered.vars()).map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Template;

    #[test]
    fn test_vars_json() {
        let rendered = Template::new("$var title: Home\n$var tags = ['a', 'b']\n")
            .unwrap()
            .render(&[])
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&vars_json(&rendered).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"title": "Home", "tags": ["a", "b"]}));
    }
}
