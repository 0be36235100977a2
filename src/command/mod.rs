//! Command surface for lifecycle applications
//!
//! Binaries parse [`Cli`] and hand the chosen [`Command`] to [`run`]:
//!
//! ```rust,ignore
//! use bootstage::command::{self, Cli};
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let app = build_app();
//!     command::run(&app, Cli::parse().command).await
//! }
//! ```

use crate::lifecycle::{exit_code, shutdown_signal, Application, Owner, StageRegistry};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::io::Write;
use std::process::ExitCode;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

#[derive(Debug, Parser)]
#[command(about = "Run and inspect application lifecycle stages", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Start a console
    #[command(alias = "c")]
    Console,
    /// Start a server
    #[command(alias = "s")]
    Server,
    /// Print initializers in order
    Initializers,
}

/// Run a command against an application
pub async fn run(app: &Application, command: Command) -> ExitCode {
    match command {
        Command::Console => {
            console(app, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
        }
        Command::Server => server(app, shutdown_signal()).await,
        Command::Initializers => {
            let mut out = std::io::stdout().lock();
            match print_initializers(app.stages(), &mut out) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!("Could not print initializers: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// Start every stage, serve until `stop` resolves, then shut down
///
/// A failed start is unwound with `shutdown` and reported as failure.
pub async fn server<F>(app: &Application, stop: F) -> ExitCode
where
    F: Future<Output = ()>,
{
    if let Err(e) = app.start().await {
        tracing::error!("Could not start the application: {}", e);
        if let Err(e) = app.shutdown().await {
            tracing::error!("Could not shutdown cleanly: {}", e);
        }
        return ExitCode::FAILURE;
    }

    tracing::info!("Started");
    stop.await;

    let outcome = app.shutdown().await;
    if let Err(e) = &outcome {
        tracing::error!("Could not shutdown cleanly: {}", e);
    }
    exit_code(&outcome)
}

/// Initialize the application and read commands until `exit` or end of input
pub async fn console<R, W>(app: &Application, input: R, mut output: W) -> ExitCode
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Err(e) = app.initialize().await {
        tracing::error!("Error initializing: {}", e);
        if let Err(e) = app.shutdown().await {
            tracing::error!("Could not shutdown cleanly: {}", e);
        }
        tracing::info!("Shutdown");
        return ExitCode::FAILURE;
    }

    if let Err(e) = repl(app, input, &mut output).await {
        tracing::error!("Console I/O failed: {}", e);
    }

    let outcome = app.shutdown().await;
    if let Err(e) = &outcome {
        tracing::error!("Could not shutdown cleanly: {}", e);
    }
    exit_code(&outcome)
}

async fn repl<R, W>(app: &Application, input: R, output: &mut W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let environment = app
        .config()
        .get_str("environment")
        .unwrap_or_else(|| "development".to_string());
    let prompt = format!("{}:{}> ", app.name(), environment);
    let mut lines = input.lines();

    loop {
        output.write_all(prompt.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match evaluate(app, line.trim()) {
            Reply::Exit => break,
            Reply::Nothing => {}
            Reply::Text(text) => {
                output.write_all(text.as_bytes()).await?;
                output.write_all(b"\n").await?;
            }
        }
    }

    output.write_all(b"\n").await?;
    output.flush().await
}

enum Reply {
    Exit,
    Nothing,
    Text(String),
}

fn evaluate(app: &Application, line: &str) -> Reply {
    let (command, argument) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "" => Reply::Nothing,
        "exit" | "quit" => Reply::Exit,
        "help" => Reply::Text(
            [
                "stages        stages that have run, with completion times",
                "config [key]  show configuration, optionally at a dotted key",
                "exit          shut down and leave the console",
            ]
            .join("\n"),
        ),
        "stages" => Reply::Text(
            app.lifecycle()
                .history()
                .iter()
                .map(|record| format!("{:<20}{}", record.stage, record.completed_at.to_rfc3339()))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        "config" => {
            let value = if argument.is_empty() {
                Some(app.config().to_value())
            } else {
                app.config().get(argument)
            };
            match value {
                Some(value) => Reply::Text(
                    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
                ),
                None => Reply::Text(format!("{} is not set", argument)),
            }
        }
        other => Reply::Text(format!("Unknown command: {} (try `help`)", other)),
    }
}

/// Print every stage's initializers in load order
///
/// Setup stages are listed under `UP:` in stage order, teardown stages under
/// `DOWN:` in reverse stage order.
pub fn print_initializers<C, W>(stages: &StageRegistry<C>, out: &mut W) -> crate::Result<()>
where
    C: Owner,
    W: Write,
{
    writeln!(out, "UP:")?;
    for name in stages.order() {
        writeln!(out, "  {}", name)?;
        for init in stages.up(name)?.load_order()? {
            writeln!(out, "    {:<50}{}", init.name(), init.location())?;
        }
    }

    write!(out, "\n\n")?;
    writeln!(out, "DOWN:")?;
    for name in stages.order().iter().rev() {
        writeln!(out, "  {}", name)?;
        for init in stages.down(name)?.load_order()? {
            writeln!(out, "    {:<50}{}", init.name(), init.location())?;
        }
    }
    Ok(())
}
