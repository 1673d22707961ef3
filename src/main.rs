//! Prism CLI
//!
//! Interactive REPL and batch runner for the Prism language.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};

use prism::codegen::{IrGenerator, PrototypeRegistry};
use prism::error::CompilerResult;
use prism::parser::ast::Item;
use prism::parser::{OperatorTable, Parser};
use prism::session::{Reply, Session};

/// Prism language driver.
#[derive(ClapParser, Debug)]
#[command(name = "prism")]
#[command(about = "Prism language REPL and batch runner", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging (generated IR units, statement handling).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive session (the default).
    Repl,

    /// Evaluate a source file statement by statement.
    Run {
        /// Source file to evaluate
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Parse and generate IR for a source file without executing it.
    Check {
        /// Source file to check
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command.unwrap_or(Commands::Repl) {
        Commands::Repl => repl_command(),
        Commands::Run { file } => run_command(file),
        Commands::Check { file } => check_command(file),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("prism=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("prism=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Interactive loop: buffer input until a `;`, evaluate the complete
/// statements, keep any trailing partial statement for the next line.
fn repl_command() -> Result<()> {
    let mut session = Session::new();
    let mut buffer = String::new();

    print!("ready> ");
    io::stdout().flush()?;

    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read input")?;
        buffer.push_str(&line);
        buffer.push('\n');

        if let Some(pos) = buffer.rfind(';') {
            let chunk: String = buffer.drain(..=pos).collect();
            for result in session.eval(&chunk) {
                report(result);
            }
        }

        print!("ready> ");
        io::stdout().flush()?;
    }
    println!();

    Ok(())
}

/// Evaluate a whole file. Failed statements are reported and skipped, and
/// the run exits nonzero if any failed.
fn run_command(file: PathBuf) -> Result<()> {
    let source = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut session = Session::new();
    let mut failed = 0usize;
    for result in session.eval(&source) {
        if !report(result) {
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} statement(s) failed");
    }
    Ok(())
}

/// Parse and generate IR without handing anything to a backend.
fn check_command(file: PathBuf) -> Result<()> {
    let source = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut ops = OperatorTable::new();
    let mut registry = PrototypeRegistry::new();
    let mut parser = Parser::new(&source, &mut ops);
    let mut statements = 0usize;
    let mut failed = 0usize;

    loop {
        match parser.parse_statement() {
            Ok(None) => break,
            Ok(Some(parsed)) => {
                statements += 1;
                let result = match &parsed.item {
                    Item::Definition(func) | Item::TopLevel(func) => {
                        IrGenerator::new(&mut registry)
                            .generate_function(func, "check")
                            .map(|_| ())
                    }
                    Item::Extern(proto) => IrGenerator::new(&mut registry).declare_extern(proto),
                };
                if let Err(err) = result {
                    if let Some(displaced) = parsed.displaced_op {
                        parser.operator_table_mut().restore(displaced);
                    }
                    eprintln!("error: {err}");
                    failed += 1;
                }
            }
            Err(err) => {
                statements += 1;
                failed += 1;
                eprintln!("error: {err}");
                parser.synchronize();
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {statements} statement(s) failed");
    }
    println!("{statements} statement(s) OK");
    Ok(())
}

/// Print one statement result; returns whether it succeeded.
fn report(result: CompilerResult<Reply>) -> bool {
    match result {
        Ok(Reply::Value(value)) => println!("Evaluated to {value}"),
        Ok(Reply::Defined { name }) => println!("Read function definition: {name}"),
        Ok(Reply::Declared { name }) => println!("Read extern: {name}"),
        Err(err) => {
            eprintln!("error: {err}");
            return false;
        }
    }
    true
}
