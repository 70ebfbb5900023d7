///
/// nabi CLI - The nabi binding generator command-line interface
///
/// Provides commands for working with binding surfaces:
/// - nabi generate <surface> [-o out.rs]: Emit the Rust binding module
/// - nabi check <surface>: Validate without emitting, listing each entry point's ABI shape
/// - nabi symbols <surface> [--json]: Print the native symbol table
/// - nabi probe <surface> <library>: Report which symbols a library exports
///

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use nabi_runtime::{NativeLibrary, ResolutionReport};
use nabic::{analyze_source, codegen, generate_file, render_error, BindingSurface, DiagnosticReporter, GenerateError};
use tracing::Level;

#[derive(Parser)]
#[command(name = "nabi")]
#[command(author, version, about = "Native binding generator", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the Rust binding module for a surface
    Generate {
        /// The surface file
        surface: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a surface without generating code
    Check {
        /// The surface file
        surface: PathBuf,
    },

    /// Print the native symbol table of a surface
    Symbols {
        /// The surface file
        surface: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check which of a surface's symbols a shared library exports
    Probe {
        /// The surface file
        surface: PathBuf,

        /// Path to the shared library
        library: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(level)
        .init();

    match cli.command {
        Commands::Generate { surface, output } => {
            generate_bindings(&surface, output.as_deref());
        }
        Commands::Check { surface } => {
            check_surface(&surface);
        }
        Commands::Symbols { surface, json } => {
            print_symbols(&surface, json);
        }
        Commands::Probe { surface, library } => {
            probe_library(&surface, &library);
        }
    }
}

fn load_surface(file: &Path) -> BindingSurface {
    let source_text = match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file: {}", e);
            std::process::exit(1);
        }
    };

    let file_name = file.display().to_string();
    match analyze_source(&file_name, &source_text) {
        Ok(surface) => surface,
        Err(GenerateError::Invalid { errors, .. }) => {
            let reporter = DiagnosticReporter::new(&file_name, &source_text);
            reporter.report_errors(&errors);
            eprintln!("{}: {} error(s)", file_name, errors.len());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn generate_bindings(file: &Path, output: Option<&Path>) {
    let Some(output) = output else {
        let surface = load_surface(file);
        print!("{}", codegen::generate(&surface));
        return;
    };

    match generate_file(file, output) {
        Ok(true) => println!("Wrote {}", output.display()),
        Ok(false) => println!("{} is up to date", output.display()),
        Err(e) => {
            eprintln!("{}", render_error(&e));
            std::process::exit(1);
        }
    }
}

fn check_surface(file: &Path) {
    let surface = load_surface(file);
    println!(
        "{}: ok ({} methods, {} required, {} optional)",
        surface.name,
        surface.methods.len(),
        surface.symbols.required().count(),
        surface.symbols.optional().count()
    );
    for method in &surface.methods {
        println!("  {} {}", method.symbol, method.shape());
    }
}

fn print_symbols(file: &Path, json: bool) {
    let surface = load_surface(file);
    if json {
        match surface.symbols.to_json() {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing symbols: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        print!("{}", surface.symbols.render());
    }
}

fn probe_library(file: &Path, library: &Path) {
    let surface = load_surface(file);
    let native = match NativeLibrary::open(library) {
        Ok(native) => native,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let report = ResolutionReport::probe(&native, &surface.required_symbols(), &surface.optional_symbols());
    print!("{}", report);

    if !report.is_loadable() {
        let missing = report.missing().filter(|entry| !entry.optional).count();
        eprintln!("{} required symbol(s) missing", missing);
        std::process::exit(1);
    }
}
