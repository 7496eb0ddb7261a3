//! The `tinycopoos` command-line compiler (spec.md §6): read a single
//! source file, compile it, and write the resulting C to standard output.
//!
//! Grounded on the teacher's `check` subcommand shape (load → parse →
//! report-and-exit on failure) rather than its full multi-subcommand
//! `main.rs`, since this tool has exactly one job and no subcommands of
//! its own.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use tinycopoos_compiler::diagnostics_printer::DiagnosticsPrinter;

#[derive(Parser)]
#[command(name = "tinycopoos", about = "Compile a TinyCoPoOS source file to plain C")]
struct Args {
    /// Path to the `.tc` source file to compile.
    source: PathBuf,

    /// Force ANSI color in diagnostic output even when stdout isn't a tty.
    #[arg(long)]
    color: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let source = match std::fs::read(&args.source) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("error: couldn't read {}: {err}", args.source.display());
            return ExitCode::FAILURE;
        }
    };

    match tinycopoos_compiler::compile(&source) {
        Ok(compiled) => {
            for warning in compiled.warnings.iter() {
                eprintln!("warning: {}:{}:{}: {}", args.source.display(), warning.line, warning.column, warning.message);
            }
            print!("{}", compiled.source);
            ExitCode::SUCCESS
        }
        Err(tinycopoos_compiler::Error::Parse(report)) => {
            let text = String::from_utf8_lossy(&source);
            let printer = DiagnosticsPrinter::new(&report)
                .source(&text)
                .path(&args.source.to_string_lossy())
                .colored(args.color);
            print!("{}", printer.render());
            ExitCode::FAILURE
        }
    }
}
