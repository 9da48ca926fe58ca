//! Command-line driver for the TinyCompiled compiler: `compile`, `build`
//! and `run`. This crate is the "external collaborator" named by the
//! compiler core's contract — it shells out to `nasm` and `ld`, it does
//! not reimplement them.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tcc", version, about = "TinyCompiled compiler driver")]
struct Cli {
    /// Enable debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Pass `debug: true` through to the compiler core, dumping the token
    /// stream and syntax tree at debug level without changing the emitted
    /// assembly.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile TC source to NASM assembly text.
    Compile {
        input: std::path::PathBuf,
        output: Option<std::path::PathBuf>,
    },
    /// Compile and assemble/link into a native ELF executable.
    Build {
        input: std::path::PathBuf,
        output: std::path::PathBuf,
    },
    /// Compile, build and immediately execute the result.
    Run {
        input: std::path::PathBuf,
        #[arg(long)]
        output: Option<std::path::PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Compile { input, output } => commands::compile::run(&input, output.as_deref(), cli.debug),
        Commands::Build { input, output } => commands::build::run(&input, &output, cli.debug),
        Commands::Run { input, output } => commands::run::run(&input, output.as_deref(), cli.debug),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
