//! `s3-envelope` — command-line entry point.
//!
//! Startup sequence:
//! 1. Parse arguments.
//! 2. Initialise telemetry (JSON logs on stderr, optional OTLP export).
//! 3. Build the [`EncryptionClient`]: KMS + S3 from environment configuration,
//!    or an in-process key provider and store with `--local` (`demo` only).
//! 4. Run the subcommand.

use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use s3_envelope::config::Config;
use s3_envelope::keys::LocalKeyProvider;
use s3_envelope::store::MemoryObjectStore;
use s3_envelope::{telemetry, ContentAlgorithm, EncryptionClient, EnvelopeError};
use tracing::{info, warn};

const LOCAL_MASTER_KEY_ID: &str = "local/demo";

#[derive(Debug, Parser)]
#[command(name = "s3-envelope", version, about = "Client-side envelope encryption for S3 objects")]
struct Cli {
    /// Run `demo` against an in-process key provider and object store instead
    /// of KMS and S3. Nothing outlives the process, so `put` and `get` reject it.
    #[arg(long, global = true)]
    local: bool,

    /// Content algorithm for new objects (overrides CONTENT_ALGORITHM).
    #[arg(long, global = true)]
    algorithm: Option<ContentAlgorithm>,

    /// Tracing log level.
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// OTLP endpoint to export spans to.
    #[arg(long, global = true, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Encrypt VALUE and upload it as KEY.
    Put { key: String, value: String },
    /// Download KEY, decrypt it and write the plaintext to stdout.
    Get { key: String },
    /// Put `go.txt`, read it back, then show that a missing object is reported.
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init_telemetry(cli.otlp_endpoint.as_deref(), &cli.log_level)?;
    info!(version = env!("CARGO_PKG_VERSION"), local = cli.local, "s3-envelope starting");

    let result = run(&cli).await;
    telemetry::shutdown_telemetry();
    result
}

async fn run(cli: &Cli) -> Result<()> {
    if cli.local && !matches!(cli.command, Command::Demo) {
        anyhow::bail!("--local keeps objects in memory and only supports `demo`");
    }
    let client = build_client(cli).await?;

    match &cli.command {
        Command::Put { key, value } => {
            client
                .put(key, value.as_bytes())
                .await
                .with_context(|| format!("failed to put {key}"))?;
            info!(object_key = %key, "put complete");
        }
        Command::Get { key } => {
            let plaintext = client
                .get(key)
                .await
                .with_context(|| format!("failed to get {key}"))?;
            write_stdout(&plaintext)?;
        }
        Command::Demo => demo(&client).await?,
    }
    Ok(())
}

async fn build_client(cli: &Cli) -> Result<EncryptionClient> {
    let client = if cli.local {
        EncryptionClient::new(
            LOCAL_MASTER_KEY_ID,
            Arc::new(LocalKeyProvider::new().with_master_key(LOCAL_MASTER_KEY_ID)),
            Arc::new(MemoryObjectStore::new()),
        )
    } else {
        let cfg = Config::from_env().context("configuration invalid")?;
        info!(bucket = %cfg.s3_bucket, "using S3 and KMS");
        EncryptionClient::from_config(&cfg).await
    };

    Ok(match cli.algorithm {
        Some(algorithm) => client.with_algorithm(algorithm),
        None => client,
    })
}

async fn demo(client: &EncryptionClient) -> Result<()> {
    client
        .put("go.txt", b"hello from go!")
        .await
        .context("failed to put go.txt")?;

    let plaintext = client.get("go.txt").await.context("failed to get go.txt")?;
    write_stdout(&plaintext)?;

    match client.get("missing.txt").await {
        Err(EnvelopeError::NotFound(key)) => warn!(object_key = %key, "object not found"),
        Err(e) => return Err(e).context("failed to get missing.txt"),
        Ok(_) => warn!("missing.txt unexpectedly exists"),
    }
    Ok(())
}

fn write_stdout(bytes: &[u8]) -> Result<()> {
    let mut out = std::io::stdout().lock();
    out.write_all(bytes)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
