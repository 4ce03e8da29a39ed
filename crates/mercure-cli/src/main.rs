use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mercure_client::{OAuthCredentialLease, france_travail_connector};
use mercure_core::config::{ConnectorConfig, FetchOptions};
use mercure_core::offer::JobOffer;
use mercure_core::report::TracingReporter;
use mercure_core::traits::CredentialSource;

#[derive(Parser)]
#[command(name = "mercure", version, about = "Resilient job-offer ingester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ingestion pass and print the normalized offers
    Fetch {
        /// Maximum number of offers to ingest
        #[arg(short, long)]
        max_results: Option<usize>,

        /// Records per page (capped at the upstream limit of 150)
        #[arg(long)]
        page_size: Option<usize>,

        /// API client identifier
        #[arg(long, env = "MERCURE_CLIENT_ID")]
        client_id: String,

        /// API client secret
        #[arg(long, env = "MERCURE_CLIENT_SECRET", hide_env_values = true)]
        client_secret: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Maximum attempts per page fetch
        #[arg(long)]
        max_retries: Option<u32>,

        /// Disable the circuit breaker
        #[arg(long, default_value_t = false)]
        no_circuit_breaker: bool,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Verify that the configured credentials can be exchanged for a token
    AuthCheck {
        /// API client identifier
        #[arg(long, env = "MERCURE_CLIENT_ID")]
        client_id: String,

        /// API client secret
        #[arg(long, env = "MERCURE_CLIENT_SECRET", hide_env_values = true)]
        client_secret: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("mercure_core=info".parse()?)
                .add_directive("mercure_client=info".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            max_results,
            page_size,
            client_id,
            client_secret,
            format,
            max_retries,
            no_circuit_breaker,
            timeout_secs,
        } => {
            let mut config =
                ConnectorConfig::default().with_circuit_breaker_enabled(!no_circuit_breaker);
            if let Some(attempts) = max_retries {
                config = config.with_max_retry_attempts(attempts);
            }
            if let Some(secs) = timeout_secs {
                config = config.with_request_timeout(Duration::from_secs(secs));
            }

            cmd_fetch(
                &client_id,
                &client_secret,
                config,
                max_results,
                page_size,
                format,
            )
            .await?;
        }
        Commands::AuthCheck {
            client_id,
            client_secret,
        } => {
            cmd_auth_check(&client_id, &client_secret).await?;
        }
    }

    Ok(())
}

async fn cmd_fetch(
    client_id: &str,
    client_secret: &str,
    config: ConnectorConfig,
    max_results: Option<usize>,
    page_size: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let connector = france_travail_connector(client_id, client_secret, config)
        .context("Failed to construct connector")?;

    let mut options = FetchOptions::default();
    if let Some(max) = max_results {
        options = options.with_max_results(max);
    }
    if let Some(size) = page_size {
        options = options.with_page_size(size);
    }

    // Ctrl-C cancels the run cooperatively; whatever was already
    // ingested is still printed.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing current page");
            signal_token.cancel();
        }
    });

    let offers = connector
        .fetch_jobs_with(options, &cancel, &TracingReporter)
        .await;

    match format {
        OutputFormat::Json => print_json(&offers)?,
        OutputFormat::Csv => print_csv(&offers)?,
    }

    tracing::info!(count = offers.len(), "Done");
    Ok(())
}

async fn cmd_auth_check(client_id: &str, client_secret: &str) -> Result<()> {
    let lease =
        OAuthCredentialLease::new(client_id, client_secret).context("Invalid credentials")?;
    let token = lease
        .ensure_token()
        .await
        .context("Credential exchange failed")?;

    // Deliberately not printing the token itself.
    println!(
        "Credential exchange succeeded ({}-character token).",
        token.len()
    );
    Ok(())
}

fn print_json(offers: &[JobOffer]) -> Result<()> {
    let rendered = serde_json::to_string_pretty(offers)?;
    println!("{rendered}");
    Ok(())
}

fn print_csv(offers: &[JobOffer]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record([
        "external_id",
        "title",
        "company",
        "location",
        "region_id",
        "technologies",
        "salary_min_k",
        "salary_max_k",
        "posted_at",
        "source_url",
    ])?;

    for offer in offers {
        let technologies: Vec<&str> = offer.technologies.iter().map(String::as_str).collect();
        let technologies = technologies.join("|");
        let region = offer.region_id.map(|r| r.to_string()).unwrap_or_default();
        let salary_min = offer.salary_min_k.map(|s| s.to_string()).unwrap_or_default();
        let salary_max = offer.salary_max_k.map(|s| s.to_string()).unwrap_or_default();
        let posted_at = offer.posted_at.to_rfc3339();

        writer.write_record([
            offer.external_id.as_str(),
            offer.title.as_str(),
            offer.company.as_str(),
            offer.location.as_str(),
            region.as_str(),
            technologies.as_str(),
            salary_min.as_str(),
            salary_max.as_str(),
            posted_at.as_str(),
            offer.source_url.as_deref().unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
