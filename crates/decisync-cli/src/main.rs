use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use decisync_client::{DecisionClient, DecisionTypeFilter};
use decisync_core::{DecisionType, SyncRunSummary};
use decisync_storage::{DecisionStore, PgDecisionStore};
use decisync_sync::{build_scheduler, RunError, SyncConfig, SyncOptions, SyncPipeline};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "decisync")]
#[command(about = "Sync, classify and store appeal decisions")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync pass
    Sync(SyncArgs),
    /// Probe the decision service
    Health,
    /// Apply database migrations
    Migrate,
    /// Show the last recorded sync status
    Status,
    /// Run sync passes on the configured cron schedule
    Schedule(SyncArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TypeArg {
    Ama,
    Legacy,
    All,
}

#[derive(Debug, Clone, Args)]
struct SyncArgs {
    #[arg(long, default_value = decisync_sync::DEFAULT_QUERY)]
    query: String,
    #[arg(long)]
    start_year: Option<i32>,
    #[arg(long)]
    end_year: Option<i32>,
    #[arg(long, value_enum, default_value_t = TypeArg::All)]
    decision_type: TypeArg,
    #[arg(long, default_value_t = decisync_sync::DEFAULT_MAX_DECISIONS)]
    max_decisions: usize,
    #[arg(long)]
    skip_existing: bool,
    #[arg(long)]
    no_outcomes: bool,
    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

impl Default for SyncArgs {
    fn default() -> Self {
        Self {
            query: decisync_sync::DEFAULT_QUERY.to_string(),
            start_year: None,
            end_year: None,
            decision_type: TypeArg::All,
            max_decisions: decisync_sync::DEFAULT_MAX_DECISIONS,
            skip_existing: false,
            no_outcomes: false,
            json: false,
        }
    }
}

impl SyncArgs {
    fn options(&self) -> SyncOptions {
        let decision_type = match self.decision_type {
            TypeArg::Ama => DecisionTypeFilter::Only(DecisionType::Ama),
            TypeArg::Legacy => DecisionTypeFilter::Only(DecisionType::Legacy),
            TypeArg::All => DecisionTypeFilter::All,
        };
        SyncOptions {
            query: self.query.clone(),
            start_year: self.start_year,
            end_year: self.end_year,
            decision_type,
            max_decisions: self.max_decisions,
            skip_existing: self.skip_existing,
            extract_outcomes: !self.no_outcomes,
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "decisync=info,decisync_sync=info,decisync_client=warn".into());
    let registry = tracing_subscriber::registry().with(env_filter);
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_summary(summary: &SyncRunSummary, as_json: bool) -> Result<()> {
    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(summary).context("encoding summary")?
        );
        return Ok(());
    }
    println!(
        "sync complete: total={} synced={} skipped={} errors={} duration_ms={}",
        summary.total,
        summary.synced,
        summary.skipped,
        summary.errors.len(),
        summary.duration_ms.unwrap_or_default()
    );
    for error in &summary.errors {
        println!("  {} ({}): {}", error.citation_number, error.decision_id, error.message);
    }
    Ok(())
}

async fn connect_store(config: &SyncConfig) -> Result<PgDecisionStore> {
    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set for this command")?;
    Ok(PgDecisionStore::connect(url).await?)
}

async fn run_sync(config: &SyncConfig, args: &SyncArgs) -> Result<ExitCode> {
    let pipeline = SyncPipeline::from_config(config).await?;
    match pipeline.run(&args.options()).await {
        Ok(summary) => {
            print_summary(&summary, args.json)?;
            Ok(if summary.has_errors() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            })
        }
        Err(RunError { summary, source }) => {
            print_summary(&summary, args.json)?;
            Err(anyhow::Error::new(source).context("sync run aborted"))
        }
    }
}

async fn run_schedule(config: &SyncConfig, args: &SyncArgs) -> Result<ExitCode> {
    if !config.scheduler_enabled {
        anyhow::bail!("scheduler disabled; set DECISYNC_SCHEDULER_ENABLED=true");
    }
    let pipeline = Arc::new(SyncPipeline::from_config(config).await?);
    let mut sched = build_scheduler(pipeline, &config.sync_cron, args.options()).await?;
    sched.start().await.context("starting scheduler")?;
    info!(cron = %config.sync_cron, "scheduler running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command.unwrap_or_else(|| Commands::Sync(SyncArgs::default())) {
        Commands::Sync(args) => run_sync(&config, &args).await,
        Commands::Health => {
            let client = DecisionClient::new(config.client_config())?;
            if client.health_check().await {
                println!("decision service reachable at {}", config.decision_api_url);
                Ok(ExitCode::SUCCESS)
            } else {
                println!("decision service unreachable at {}", config.decision_api_url);
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Migrate => {
            connect_store(&config).await?.migrate().await?;
            println!("migrations applied");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            let store = connect_store(&config).await?;
            match store.sync_metadata().await? {
                Some(meta) => {
                    println!(
                        "last sync: {} status={} synced={}",
                        meta.last_sync_at.to_rfc3339(),
                        meta.status.as_str(),
                        meta.total_synced
                    );
                    if let Some(summary) = meta.error_summary {
                        println!("  {summary}");
                    }
                    println!("stored decisions: {}", store.count_decisions().await?);
                }
                None => println!("no sync has completed yet"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Schedule(args) => run_schedule(&config, &args).await,
    }
}
