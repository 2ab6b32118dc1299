//! athena-query: run one `select` through a transient CTAS table and print
//! the result.
//!
//! Staged files and the transient table are removed before the process
//! exits, whether the query succeeded, failed or was interrupted with
//! Ctrl-C.

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use ctas_athena::{run_query_until, AthenaClients, LifecycleSettings, QueryRequest};
use ctas_core::Config;

// ── CLI ─────────────────────────────────────────────────────────────

/// Run a select query on Athena and load the result into memory.
#[derive(Parser, Debug)]
#[command(name = "athena-query", version, about)]
struct Cli {
    /// The select statement to run.
    sql: String,

    /// Staging bucket (name only, no s3://). Defaults to the profile's
    /// ATHENA_STAGING_BUCKET.
    #[arg(long)]
    bucket: Option<String>,

    /// Query timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// AWS region of the Glue catalog.
    #[arg(long)]
    region: Option<String>,

    /// Delay between status polls in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Config profile (prefix for environment variables).
    #[arg(long, env = "CTAS_PROFILE", default_value = "")]
    profile: String,
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => warn!("Interrupted, cancelling query and cleaning up"),
        Err(e) => {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await
        }
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env may set RUST_LOG, so it is loaded before the subscriber.
    ctas_core::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::for_profile(&cli.profile);
    if let Some(region) = cli.region {
        config.aws.region = region;
    }
    if let Some(secs) = cli.timeout_secs {
        config.query.timeout_seconds = secs;
    }
    if let Some(ms) = cli.poll_interval_ms {
        config.query.poll_interval_ms = ms;
    }
    config.log_summary();

    let bucket = cli
        .bucket
        .or_else(|| config.query.staging_bucket.clone())
        .context("no staging bucket: pass --bucket or set ATHENA_STAGING_BUCKET")?;

    let request = QueryRequest::new(
        cli.sql,
        bucket,
        config.query.timeout(),
        config.aws.region.clone(),
    )?;

    let clients = AthenaClients::connect(&config).await;
    let settings = LifecycleSettings::from_config(&config.query);

    let table = run_query_until(request, &clients, &settings, interrupted())
        .await
        .context("athena query failed")?;

    info!(
        query_id = %table.metadata.query_id,
        rows = table.row_count(),
        "Query complete"
    );
    println!("{table}");

    Ok(())
}
