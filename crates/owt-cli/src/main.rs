use clap::{Parser, Subcommand};
use owt_codegen::{output_file_name, BasicChecker, CompileOptions, RuntimeMode, Severity, TypeChecker};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "owt")]
#[command(about = "owt component compiler")]
#[command(version)]
struct Cli {
    /// Log compiler progress (also enabled by OWT_DEBUG=1)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile an .owt file to JavaScript, a source map and CSS
    Build {
        /// Input .owt file
        path: String,

        /// Output directory (defaults to the input's directory)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Embed the runtime instead of importing it from "owt"
        #[arg(long)]
        standalone: bool,
    },

    /// Check an .owt file for errors without generating output
    Check {
        /// Input .owt file
        path: String,
    },

    /// Print the parsed AST as JSON
    Ast {
        /// Input .owt file
        path: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let debug = cli.debug || env_debug(std::env::var("OWT_DEBUG").ok().as_deref());
    init_tracing(debug);

    match cli.command {
        Command::Build {
            path,
            out_dir,
            standalone,
        } => cmd_build(&path, out_dir.as_deref(), standalone, debug),
        Command::Check { path } => cmd_check(&path),
        Command::Ast { path } => cmd_ast(&path),
    }
}

fn env_debug(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1)
}

/// Source text of an `.owt` input.
fn read_source(path: &Path) -> Result<String, String> {
    if path.extension().and_then(|e| e.to_str()) != Some("owt") {
        tracing::warn!(path = %path.display(), "input does not have the .owt extension");
    }
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => format!("file not found: {}", path.display()),
        _ => format!("cannot read {}: {e}", path.display()),
    })
}

/// File name of `path` as it should appear in source maps.
fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Where `build` writes the script, its source map and the stylesheet.
struct OutputPaths {
    js: PathBuf,
    map: PathBuf,
    css: PathBuf,
}

impl OutputPaths {
    fn new(input: &Path, out_dir: Option<&Path>) -> Self {
        let dir = match out_dir {
            Some(dir) => dir.to_path_buf(),
            None => input.parent().unwrap_or(Path::new(".")).to_path_buf(),
        };
        let js = dir.join(output_file_name(&display_name(input)));
        OutputPaths {
            map: js.with_extension("js.map"),
            css: js.with_extension("css"),
            js,
        }
    }
}

fn write_file(path: &Path, contents: &str) {
    if let Err(e) = std::fs::write(path, contents) {
        fail(format_args!("cannot write {}: {e}", path.display()));
    }
}

fn cmd_build(path: &str, out_dir: Option<&Path>, standalone: bool, debug: bool) {
    let input = Path::new(path);
    let source = read_source(input).unwrap_or_else(|e| fail(e));
    let file_name = display_name(input);

    let options = CompileOptions {
        debug,
        runtime: if standalone {
            RuntimeMode::Inline
        } else {
            RuntimeMode::default()
        },
        ..Default::default()
    };

    let output = owt_codegen::compile_checked(&source, &file_name, &options, &BasicChecker)
        .unwrap_or_else(|e| fail(e));
    let map_json = output
        .map
        .to_json()
        .unwrap_or_else(|e| fail(format_args!("cannot serialize source map: {e}")));

    let paths = OutputPaths::new(input, out_dir);
    if let Some(dir) = paths.js.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            fail(format_args!("cannot create {}: {e}", dir.display()));
        }
    }

    let mut code = output.code;
    code.push_str(&format!("//# sourceMappingURL={}\n", display_name(&paths.map)));
    write_file(&paths.js, &code);
    write_file(&paths.map, &map_json);
    if !output.css.is_empty() {
        write_file(&paths.css, &output.css);
    }

    tracing::debug!(js = %paths.js.display(), "build finished");
    eprintln!("Built: {}", paths.js.display());
}

fn cmd_check(path: &str) {
    let input = Path::new(path);
    let source = read_source(input).unwrap_or_else(|e| fail(e));
    let file_name = display_name(input);

    let diagnostics = BasicChecker.check(&source, &file_name);
    for d in &diagnostics {
        eprintln!("{}", d.render(&file_name));
    }

    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        std::process::exit(1);
    }
    eprintln!("OK: {path}");
}

fn cmd_ast(path: &str) {
    let source = read_source(Path::new(path)).unwrap_or_else(|e| fail(e));
    let program = owt_parser::Parser::parse(&source).unwrap_or_else(|e| fail(e));
    match serde_json::to_string_pretty(&program) {
        Ok(json) => println!("{json}"),
        Err(e) => fail(format_args!("cannot serialize AST: {e}")),
    }
}
