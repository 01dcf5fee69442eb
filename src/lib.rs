//! `mm`: a line-oriented template language with `$` directives.
//!
//! ```text
//! $def with (items)
//! $for item in items:
//!     $loop.index. $item
//! ```

pub mod cli;
pub mod error;
pub mod model;
pub mod parser;
pub mod processor;
pub mod template;
pub mod writer;

pub use error::{RenderError, SyntaxError, TemplateError};
pub use model::{Function, Key, Kwargs, Namespace, Object, Record, Value};
pub use processor::{Program, compile};
pub use template::{ProgramCache, Rendered, Template, Templates};

use anyhow::Context;
use clap::Parser;

pub fn run() -> anyhow::Result<()> {
    env_logger::init();
    let args = cli::Cli::parse();

    // 1. ── Load ───────────────────────────────────────────────────────
    let source = std::fs::read_to_string(&args.template)
        .with_context(|| format!("Reading {}", args.template.display()))?;
    let context = match &args.context {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Reading {}", path.display()))?;
            parser::load_context(&json)
                .with_context(|| format!("Parsing render context {}", path.display()))?
        }
        None => parser::RenderContext::default(),
    };

    // 2. ── Compile & render ───────────────────────────────────────────
    let mut template = Template::new(&source)
        .with_context(|| format!("Compiling {}", args.template.display()))?
        .with_globals(context.globals);
    if args.no_builtins {
        template = template.without_builtins();
    }
    let rendered = template
        .call(&context.args, &context.kwargs)
        .with_context(|| format!("Rendering {}", args.template.display()))?;

    // 3. ── Write outputs ──────────────────────────────────────────────
    writer::emit_text(&rendered, args.output.as_deref()).with_context(|| "Writing rendered text")?;
    if let Some(path) = &args.vars {
        writer::emit_vars(&rendered, path)
            .with_context(|| format!("Writing vars to {}", path.display()))?;
    }

    Ok(())
}
