use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use pyrobotc_core::escape::DEFAULT_MAX_LINE_LENGTH;
use pyrobotc_core::{
    CompilationOutput, CompilerOptions, Frontend, JsonFrontend, PythonFrontend, RenderOptions,
    compile_program,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const OUTPUT_DIR: &str = "output";
const OUTPUT_EXTENSION: &str = "c";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FrontendKind {
    /// Parse sources with a Python interpreter.
    Python,
    /// Sources already hold a JSON syntax tree.
    Json,
}

/// Translate annotated Python into RobotC.
#[derive(Parser, Debug)]
#[command(name = "pyrobotc", version, about, long_about = None)]
struct Cli {
    /// Entry source file.
    input: PathBuf,

    #[arg(long, value_name = "DIR", help = "Where to write .c files (defaults to output/ next to the input)")]
    output_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "python")]
    frontend: FrontendKind,

    #[arg(long, value_name = "PROGRAM", default_value = "python3", help = "Interpreter used by the python front-end")]
    python: String,

    #[arg(long, default_value_t = 2)]
    indent_width: usize,

    #[arg(long, help = "Put opening braces on their own line")]
    next_line_braces: bool,

    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LENGTH, help = "Column at which string literals are wrapped")]
    max_line_length: usize,

    #[arg(long, help = "Fail when any statement had to be skipped")]
    strict: bool,

    #[arg(short, long, help = "Log every compiled unit")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    execute(cli)
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "pyrobotc=debug,pyrobotc_core=debug"
    } else {
        "pyrobotc=info,pyrobotc_core=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    let options = CompilerOptions {
        render: RenderOptions {
            same_line_braces: !cli.next_line_braces,
            max_line_length: cli.max_line_length,
            ..RenderOptions::default()
        }
        .with_indent_width(cli.indent_width),
        tool_dir: None,
    };
    let frontend: Box<dyn Frontend> = match cli.frontend {
        FrontendKind::Python => Box::new(PythonFrontend::new(cli.python.clone())),
        FrontendKind::Json => Box::new(JsonFrontend),
    };

    let output_dir = match &cli.output_dir {
        Some(dir) => dir.clone(),
        None => default_output_dir(&cli.input)?,
    };

    match compile_program(&cli.input, frontend, options) {
        Ok(output) => {
            write_units(&output, &output_dir)?;
            if cli.strict && !output.is_complete() {
                bail!(
                    "{} statement(s) were skipped; output is incomplete",
                    output.diagnostics.iter().filter(|d| d.is_error()).count()
                );
            }
            Ok(())
        }
        Err(failure) => {
            write_units(&failure.partial, &output_dir)?;
            Err(failure).with_context(|| format!("failed to translate {}", cli.input.display()))
        }
    }
}

fn default_output_dir(input: &Path) -> Result<PathBuf> {
    let input = std::path::absolute(input)
        .with_context(|| format!("failed to resolve input path {}", input.display()))?;
    let base = input.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(base.join(OUTPUT_DIR))
}

fn write_units(output: &CompilationOutput, output_dir: &Path) -> Result<()> {
    let dirs: Vec<&Path> = output
        .units
        .keys()
        .chain(output.partial.keys())
        .filter_map(|path| path.parent())
        .collect();
    let root = common_prefix(&dirs);
    for (path, text) in output.units.iter().chain(&output.partial) {
        let relative = path.strip_prefix(&root).unwrap_or(path);
        let target = output_dir.join(relative).with_extension(OUTPUT_EXTENSION);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        fs::write(&target, text)
            .with_context(|| format!("failed to write output file {}", target.display()))?;
        debug!(source = %path.display(), target = %target.display(), "wrote unit");
    }
    for path in output.partial.keys() {
        warn!(source = %path.display(), "unit written only up to the failing statement");
    }
    if !output.units.is_empty() {
        info!(units = output.units.len(), dir = %output_dir.display(), "translation written");
    }
    Ok(())
}

/// Longest leading run of components shared by every path.
fn common_prefix(paths: &[&Path]) -> PathBuf {
    let Some((first, rest)) = paths.split_first() else {
        return PathBuf::new();
    };
    let mut shared: Vec<Component> = first.components().collect();
    for path in rest {
        let matching = shared
            .iter()
            .zip(path.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        shared.truncate(matching);
    }
    shared.iter().collect()
}
