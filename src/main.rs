use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use claim_risk_engine::db::{self, PgClaimStore};
use claim_risk_engine::models::ProviderFilter;
use claim_risk_engine::{ClaimStore, InMemoryStore, RiskEngine, ScoringConfig, SweepRequest};

#[derive(Parser)]
#[command(name = "claim-risk")]
#[command(about = "Fraud-risk scoring for provider claim histories", long_about = None)]
struct Cli {
    /// Provider CSV; use with --claims instead of DATABASE_URL
    #[arg(long, global = true, requires = "claims")]
    providers: Option<PathBuf>,
    /// Claim CSV; use with --providers instead of DATABASE_URL
    #[arg(long, global = true, requires = "providers")]
    claims: Option<PathBuf>,
    /// Last day of the dataset (defaults to today)
    #[arg(long, global = true)]
    as_of: Option<NaiveDate>,
    /// JSON scoring configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one provider
    Analyze {
        #[arg(long)]
        provider: Uuid,
        #[arg(long, default_value_t = 90)]
        window_days: u32,
        #[arg(long)]
        json: bool,
    },
    /// Compare one provider's billing to its facility-type/state cohort
    Peers {
        #[arg(long)]
        provider: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Rank a provider population by composite risk
    Sweep {
        #[arg(long = "facility-type")]
        facility_types: Vec<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        min_score: f64,
        #[arg(long, default_value_t = 25)]
        limit: usize,
        #[arg(long)]
        window_days: Option<u32>,
        #[arg(long)]
        deadline_secs: Option<u64>,
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn open_store(cli: &Cli, as_of: NaiveDate) -> anyhow::Result<Arc<dyn ClaimStore>> {
    if let (Some(providers), Some(claims)) = (&cli.providers, &cli.claims) {
        let store = InMemoryStore::from_csv(providers, claims, as_of).with_context(|| {
            format!(
                "failed to load {} and {}",
                providers.display(),
                claims.display()
            )
        })?;
        tracing::info!(
            providers = store.provider_count(),
            claims = store.claim_count(),
            %as_of,
            "loaded claim files"
        );
        return Ok(Arc::new(store));
    }

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set when --providers/--claims are not given")?;
    let pool = db::connect(&database_url, 5)
        .await
        .context("failed to connect to Postgres")?;
    Ok(Arc::new(PgClaimStore::new(pool, as_of)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = ScoringConfig::load(cli.config.as_deref()).context("invalid scoring config")?;
    let as_of = cli.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let store = open_store(&cli, as_of).await?;
    let engine = RiskEngine::new(store, config);

    match cli.command {
        Commands::Analyze {
            provider,
            window_days,
            json,
        } => {
            let analysis = engine.analyze(provider, window_days).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
                return Ok(());
            }

            println!(
                "Provider {} scored {:.1} ({}) across {} findings over {} days{}",
                analysis.provider_id,
                analysis.composite_score,
                analysis.severity,
                analysis.total_findings,
                analysis.window_days,
                if analysis.partial { " [partial]" } else { "" }
            );
            for module in analysis.modules.values() {
                println!(
                    "- {}: {:.1} ({})",
                    module.module, module.risk_score, module.risk_level
                );
                for finding in &module.findings {
                    println!("    {:?}: {}", finding.severity, finding.description);
                }
            }
        }
        Commands::Peers { provider, json } => {
            let comparison = engine.compare_to_peers(provider).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&comparison)?);
                return Ok(());
            }

            match comparison.z_score {
                Some(z) => println!(
                    "Provider {} z-score {:.2} against {} peers (mean {:.2}, stddev {:.2}){}",
                    comparison.provider_id,
                    z,
                    comparison.cohort.n,
                    comparison.cohort.mean,
                    comparison.cohort.stddev,
                    if comparison.outlier { " OUTLIER" } else { "" }
                ),
                None => println!(
                    "Provider {} is not comparable: {}",
                    comparison.provider_id,
                    comparison.reason.as_deref().unwrap_or("unknown reason")
                ),
            }
        }
        Commands::Sweep {
            facility_types,
            state,
            min_score,
            limit,
            window_days,
            deadline_secs,
            json,
        } => {
            let mut request = SweepRequest::new(
                ProviderFilter {
                    facility_types,
                    state,
                },
                min_score,
                limit,
            );
            if let Some(days) = window_days {
                request = request.with_window(days);
            }
            if let Some(secs) = deadline_secs {
                request = request
                    .with_deadline(tokio::time::Instant::now() + Duration::from_secs(secs));
            }

            let result = engine.sweep(request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            if result.entries.is_empty() {
                println!("No providers at or above score {:.1}.", result.min_score);
            } else {
                println!("Top providers by composite risk:");
                for entry in &result.entries {
                    println!(
                        "- {} (NPI {}, {}, {}) score {:.1} {} across {} findings{}",
                        entry.provider.name,
                        entry.provider.npi,
                        entry.provider.facility_type,
                        entry.provider.state,
                        entry.composite_score,
                        entry.severity,
                        entry.total_findings,
                        if entry.partial { " [partial]" } else { "" }
                    );
                }
            }
            if result.deadline_exceeded {
                println!(
                    "Deadline reached: {} of {} providers were not scored.",
                    result.providers_skipped, result.providers_considered
                );
            }
            for failure in &result.failures {
                println!("Could not score {}: {}", failure.provider_id, failure.reason);
            }
        }
    }

    Ok(())
}
