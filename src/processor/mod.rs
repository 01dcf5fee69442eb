//! Component 3 – the functional core.
//!
//! Source text goes through the stages in order:
//! line classification, expression parsing, statement compilation and,
//! at render time, execution.
pub mod ast;
pub mod compiler;
pub mod expr_parser;
pub mod inline;
pub mod lexer;
pub mod lines;
pub mod vm;

pub use ast::Program;

use crate::error::SyntaxError;
use log::debug;

/// Compile one template source into an immutable [`Program`].
pub fn compile(source: &str) -> Result<Program, SyntaxError> {
    let lines = lines::classify(source)?;
    let program = compiler::compile_source(&lines)?;
    debug!(
        "compiled template: {} lines, {} top-level statements, {} parameters",
        lines.lines.len(),
        program.body.len(),
        program.params.positional.len()
    );
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_pipeline() {
        let program = compile("$def with (a=0)\n$a\n").unwrap();
        assert_eq!(program.params.positional.len(), 1);
        assert_eq!(program.body.len(), 1);
        assert!(program.trailing_newline);
        assert!(program.locals.contains("a"));
    }

    #[test]
    fn test_program_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Program>();
    }
}
