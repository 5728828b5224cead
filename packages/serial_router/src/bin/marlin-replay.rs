//! Replay recorded printer output against the state machine.
//!
//! Reads firmware output line by line from a file (or stdin), routes each
//! line and prints every state transition with its attribution. Useful for
//! debugging pattern or attribution changes against captured sessions.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use printer_state::{
    CommandId, ExpectedChange, PrinterState, StateManager, StateNotification, TransitionSource,
};
use serial_router::{SerialRouter, register_state_handlers};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "marlin-replay")]
#[command(about = "Replay recorded printer output and show every state transition")]
struct Cli {
    /// File with one firmware output line per row; stdin when omitted
    input: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Push an expectation before replaying, e.g. --expect FINISHED:CONNECT:42
    #[arg(long, value_name = "STATE:SOURCE[:COMMAND]")]
    expect: Option<String>,
}

#[derive(ValueEnum, Clone, Debug)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();

    let manager = Arc::new(StateManager::new());
    let router = SerialRouter::new();
    register_state_handlers(&router, Arc::clone(&manager));
    let mut rx = manager.subscribe();

    if let Some(spec) = &cli.expect {
        manager.expect_change(parse_expectation(spec)?);
    }

    let reader: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut matched = 0usize;
    let mut total = 0usize;
    for line in reader.lines() {
        let line = line.context("reading input line")?;
        total += 1;
        if router.feed(&line) {
            matched += 1;
        }
        report(&mut rx, &cli.format)?;
    }

    info!(
        "{} of {} lines matched a pattern; final state {:?}",
        matched,
        total,
        manager.state()
    );
    Ok(())
}

/// Print the notifications buffered since the last line was fed.
fn report(rx: &mut broadcast::Receiver<StateNotification>, format: &OutputFormat) -> Result<()> {
    while let Ok(notification) = rx.try_recv() {
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&notification)?),
            OutputFormat::Text => {
                if let StateNotification::Changed {
                    from,
                    to,
                    command_id,
                    source,
                } = notification
                {
                    let source = source
                        .map(|s| format!("{:?}", s))
                        .unwrap_or_else(|| "unattributed".to_string());
                    let command = command_id
                        .map(|id| format!(" [{}]", id))
                        .unwrap_or_default();
                    println!("{:?} -> {:?} via {}{}", from, to, source, command);
                }
            }
        }
    }
    Ok(())
}

/// Parse `STATE:SOURCE[:COMMAND]`, e.g. `FINISHED:CONNECT:42`.
fn parse_expectation(spec: &str) -> Result<ExpectedChange> {
    let mut parts = spec.split(':');
    let state = parse_state(parts.next().unwrap_or_default())?;
    let source = match parts.next() {
        Some(raw) => parse_source(raw)?,
        None => bail!("expectation {:?} is missing a source", spec),
    };

    let mut change = ExpectedChange::new().to_state(state, source);
    if let Some(raw) = parts.next() {
        let id: u32 = raw
            .parse()
            .with_context(|| format!("bad command id {:?}", raw))?;
        change = change.command(CommandId(id));
    }
    Ok(change)
}

fn parse_state(raw: &str) -> Result<PrinterState> {
    Ok(match raw.to_ascii_uppercase().as_str() {
        "READY" => PrinterState::Ready,
        "BUSY" => PrinterState::Busy,
        "PRINTING" => PrinterState::Printing,
        "PAUSED" => PrinterState::Paused,
        "FINISHED" => PrinterState::Finished,
        "ATTENTION" => PrinterState::Attention,
        "ERROR" => PrinterState::Error,
        other => bail!("unknown state {:?}", other),
    })
}

fn parse_source(raw: &str) -> Result<TransitionSource> {
    Ok(match raw.to_ascii_uppercase().as_str() {
        "USER" => TransitionSource::User,
        "FIRMWARE" => TransitionSource::Firmware,
        "HARDWARE" => TransitionSource::Hardware,
        "CONNECT" => TransitionSource::Connect,
        "SERIAL" => TransitionSource::Serial,
        "UI" => TransitionSource::Ui,
        other => bail!("unknown source {:?}", other),
    })
}
