//! Command-line interface for the RuleBench harness.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rulebench_core::Metadata;
use rulebench_pipeline::{HarnessConfig, IngressPayload, NullSink, Pipeline};
use serde::Deserialize;
use tracing::warn;

/// RuleBench - test harness for rule-engine scripts.
#[derive(Parser, Debug)]
#[command(name = "rulebench")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run messages through the pipeline, printing one PipelineRun report
    /// per input line.
    Run {
        /// Harness configuration file (scripts + routes).
        #[arg(short, long)]
        config: PathBuf,
        /// JSON-lines input file; reads stdin when omitted.
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Validate a configuration without running any messages.
    Check {
        /// Harness configuration file.
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// One inbound message, as a JSON line.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundRecord {
    msg_type: String,
    route_id: String,
    #[serde(default)]
    metadata: Metadata,
    /// Key-value payload.
    #[serde(default)]
    payload: Option<serde_json::Map<String, serde_json::Value>>,
    /// Raw byte payload, hex-encoded. Mutually exclusive with `payload`.
    #[serde(default)]
    payload_hex: Option<String>,
}

impl InboundRecord {
    fn ingress(&self) -> Result<IngressPayload> {
        match (&self.payload, &self.payload_hex) {
            (Some(fields), None) => Ok(IngressPayload::Fields(fields.clone())),
            (None, Some(hex_str)) => {
                let bytes = hex::decode(hex_str.trim())
                    .with_context(|| format!("invalid payloadHex: {}", hex_str))?;
                Ok(IngressPayload::Bytes(bytes))
            }
            (Some(_), Some(_)) => bail!("record has both payload and payloadHex"),
            (None, None) => bail!("record has neither payload nor payloadHex"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Run { config, input } => run(config, input).await,
        Command::Check { config } => check(config),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(config_path: PathBuf, input: Option<PathBuf>) -> Result<()> {
    let config = HarnessConfig::from_path(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let (_registry, pipeline) = config.build(Arc::new(NullSink))?;

    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(&path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Err(e) = process_line(&pipeline, &line).await {
            warn!(line = line_no + 1, error = %e, "skipping message");
        }
    }
    Ok(())
}

async fn process_line(pipeline: &Pipeline, line: &str) -> Result<()> {
    let record: InboundRecord = serde_json::from_str(line).context("parsing input record")?;
    let payload = record.ingress()?;

    let run = pipeline
        .submit(&record.msg_type, payload, record.metadata, &record.route_id)
        .await?;
    println!("{}", serde_json::to_string(&run)?);
    Ok(())
}

fn check(config_path: PathBuf) -> Result<()> {
    let config = HarnessConfig::from_path(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    println!(
        "configuration OK: {} scripts, {} routes",
        config.scripts.len(),
        config.routes.len()
    );
    Ok(())
}
