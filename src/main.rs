use clap::{Parser, Subcommand};
use oneview_compiler::{CompileError, CompilerConfig, Pipeline, view_function_name};
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "oneview")]
#[command(about = "OneView - compile directive templates to JavaScript view modules")]
struct Cli {
    /// Config file (defaults to ./oneview.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Record structural problems as warnings instead of failing
    #[arg(long, global = true)]
    lenient: bool,

    /// Debug logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a template file or a directory of templates
    Compile {
        /// Template file or directory
        #[arg(required_unless_present = "stdin")]
        path: Option<PathBuf>,

        /// Read one template from stdin
        #[arg(long)]
        stdin: bool,

        /// View path of the stdin template, e.g. `web.home`
        #[arg(long, requires = "stdin")]
        view: Option<String>,

        /// Print the view definition and diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match CompilerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprint!("{}", e.render_color("", ""));
            return ExitCode::FAILURE;
        }
    };
    if cli.lenient {
        config.strict = false;
    }
    init_logging(cli.verbose || config.verbose);

    let Commands::Compile { path, stdin, view, json } = cli.command;
    let pipeline = Pipeline::new(config.compile_options());

    if stdin {
        let view = view.unwrap_or_else(|| format!("{}.stdin", config.default_scope));
        compile_stdin(&pipeline, &view, json)
    } else if let Some(path) = path {
        compile_path(&pipeline, &config, &path)
    } else {
        eprintln!("Error: provide a file/directory or use --stdin");
        ExitCode::FAILURE
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn compile_stdin(pipeline: &Pipeline, view: &str, json_output: bool) -> ExitCode {
    let mut source = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut source) {
        eprintln!("Error: failed to read stdin: {}", e);
        return ExitCode::FAILURE;
    }

    match pipeline.compile(&source, view) {
        Ok(result) => {
            if json_output {
                let value = serde_json::json!({
                    "definition": result.definition,
                    "diagnostics": result.diagnostics,
                });
                println!("{}", value);
            } else {
                report_warnings(&result.diagnostics, &source, "<stdin>");
                print!("{}", result.code);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            print_error(&e, &source, "<stdin>");
            ExitCode::FAILURE
        }
    }
}

fn compile_path(pipeline: &Pipeline, config: &CompilerConfig, path: &Path) -> ExitCode {
    let start = Instant::now();
    let base = if path.is_dir() { path } else { path.parent().unwrap_or(Path::new(".")) };

    let files: Vec<PathBuf> = if path.is_file() {
        if !config.is_template(path) {
            eprintln!("Error: {} is not a {} file", path.display(), config.extension);
            return ExitCode::FAILURE;
        }
        vec![path.to_path_buf()]
    } else if path.is_dir() {
        WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && config.is_template(e.path()))
            .map(|e| e.into_path())
            .collect()
    } else {
        eprintln!("Error: {} does not exist", path.display());
        return ExitCode::FAILURE;
    };

    if files.is_empty() {
        eprintln!("No {} files found in {}", config.extension, path.display());
        return ExitCode::FAILURE;
    }

    let mut compiled = 0;
    let mut failed = 0;
    for file in &files {
        let view = config.view_path(file, base);
        match compile_file(pipeline, config, file, &view) {
            Ok(output) => {
                compiled += 1;
                print_generated(&output.display().to_string());
            }
            Err(()) => failed += 1,
        }
    }

    print_summary(compiled, start.elapsed());
    if failed > 0 { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

/// Compile one template into `<output_dir>/<Name>.js`. Errors are printed here.
fn compile_file(pipeline: &Pipeline, config: &CompilerConfig, file: &Path, view: &str) -> Result<PathBuf, ()> {
    let filename = file.display().to_string();
    let source = fs::read_to_string(file)
        .map_err(|source| print_error(&CompileError::Io { path: filename.clone(), source }, "", &filename))?;

    let result = pipeline.compile(&source, view).map_err(|e| print_error(&e, &source, &filename))?;
    report_warnings(&result.diagnostics, &source, &filename);

    let output = config.output_dir.join(format!("{}.js", view_function_name(view)));
    let written = fs::create_dir_all(&config.output_dir).and_then(|_| fs::write(&output, &result.code));
    written.map_err(|source| {
        print_error(&CompileError::Io { path: output.display().to_string(), source }, "", &filename)
    })?;
    Ok(output)
}

fn report_warnings(diagnostics: &[oneview_compiler::Diagnostic], source: &str, filename: &str) {
    let is_tty = io::stderr().is_terminal();
    for diag in diagnostics {
        if is_tty {
            eprint!("{}", diag.render_color(source, filename));
        } else {
            eprint!("{}", diag.render(source, filename));
        }
    }
}

fn print_error(error: &CompileError, source: &str, filename: &str) {
    if io::stderr().is_terminal() {
        eprint!("{}", error.render_color(source, filename));
    } else {
        eprint!("{}", error.render(source, filename));
    }
}

fn print_generated(path: &str) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("  \x1b[32m✓\x1b[0m {}", path);
    } else {
        eprintln!("  ✓ {}", path);
    }
}

fn print_summary(count: usize, elapsed: std::time::Duration) {
    let is_tty = io::stderr().is_terminal();
    let time_str = format_duration(elapsed);
    let files_word = if count == 1 { "file" } else { "files" };

    if is_tty {
        eprintln!("\n\x1b[1m✨ Compiled {} {} in {}\x1b[0m", count, files_word, time_str);
    } else {
        eprintln!("\n✨ Compiled {} {} in {}", count, files_word, time_str);
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let micros = d.as_micros();
    if micros < 1000 {
        format!("{}μs", micros)
    } else if micros < 1_000_000 {
        format!("{:.1}ms", micros as f64 / 1000.0)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}
