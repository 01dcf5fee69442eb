use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Render an mm template")]
pub struct Cli {
    /// Template source file
    pub template: PathBuf,
    /// JSON render context: {"globals": {..}, "args": [..], "kwargs": {..}}
    #[arg(short, long)]
    pub context: Option<PathBuf>,
    /// Write the rendered text here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Write the `$var` bindings here as JSON
    #[arg(long)]
    pub vars: Option<PathBuf>,
    /// Render with no builtins at all
    #[arg(long)]
    pub no_builtins: bool,
}
