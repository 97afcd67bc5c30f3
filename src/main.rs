//! GDC CRM automation runner.
//!
//! Command-line entry point for the webhook automations. Each subcommand
//! loads configuration, wires the delivery stack it needs and exits; the
//! scheduler (cron, systemd timer) decides how often `run` is invoked.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gdc_automations::{
    AutomationHealth, AutomationService, Config, DailySummaryOutcome, JsonLeadSource, LeadSource,
    RunReport, RunSelection,
};
use gdc_core::{
    AuditSink, Clock, ConsistencyMetrics, LeadId, LogAuditSink, MulticastAuditSink, RealClock,
    Storage,
};
use gdc_delivery::{PostgresRunLedger, RunLedger, WebhookDispatcher};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "GDC CRM webhook automations", long_about = None)]
struct Cli {
    /// Log output format.
    #[arg(
        long,
        global = true,
        env = "GDC_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run scheduled automations. Without flags both jobs run.
    Run {
        /// Send overdue lead notifications.
        #[arg(long)]
        overdue: bool,
        /// Send the daily summary.
        #[arg(long)]
        daily_summary: bool,
        /// CRM snapshot exported as JSON.
        #[arg(long, env = "GDC_SNAPSHOT")]
        snapshot: PathBuf,
    },
    /// Announce a newly created lead.
    LeadCreated {
        /// CRM snapshot containing the lead.
        #[arg(long, env = "GDC_SNAPSHOT")]
        snapshot: PathBuf,
        /// Identifier of the new lead.
        #[arg(long)]
        lead_id: Uuid,
    },
    /// Print recent automation activity as JSON.
    Health,
    /// Print consistency metrics for a CRM snapshot as JSON.
    Metrics {
        /// CRM snapshot exported as JSON.
        #[arg(long, env = "GDC_SNAPSHOT")]
        snapshot: PathBuf,
    },
    /// Apply database migrations.
    Migrate,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    init_tracing(&config.rust_log, cli.log_format)?;
    info!(
        database_url = %config.database_url_masked(),
        webhook_base_url = %config.webhook_base_url,
        retry_max = config.automations_retry_max,
        enabled = config.automations_enabled,
        "Configuration loaded"
    );
    if !config.has_secret() {
        warn!("GDC_WEBHOOK_SECRET is not set; deliveries will be recorded as failed");
    }

    match cli.command {
        Command::Run { overdue, daily_summary, snapshot } => {
            run(&config, RunSelection { overdue, daily_summary }, snapshot).await
        },
        Command::LeadCreated { snapshot, lead_id } => {
            lead_created(&config, snapshot, LeadId::from(lead_id)).await
        },
        Command::Health => health(&config).await,
        Command::Metrics { snapshot } => metrics(snapshot).await,
        Command::Migrate => {
            let storage = connect(&config).await?;
            storage.migrate().await.context("Failed to apply migrations")?;
            println!("Migrations applied.");
            Ok(())
        },
    }
}

/// Initializes tracing; `RUST_LOG` wins over the configured filter.
fn init_tracing(default_filter: &str, format: LogFormat) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("Invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => {
            registry.with(fmt::layer().with_target(true).with_writer(std::io::stderr)).init();
        },
        LogFormat::Json => {
            registry
                .with(fmt::layer().json().with_current_span(true).with_writer(std::io::stderr))
                .init();
        },
    }

    Ok(())
}

async fn run(config: &Config, selection: RunSelection, snapshot: PathBuf) -> Result<()> {
    if !config.automations_enabled {
        println!("Automations disabled.");
        return Ok(());
    }

    let leads = JsonLeadSource::new(snapshot).snapshot().await?.leads;
    let service = service(config).await?;

    match service.run(selection, &leads).await? {
        RunReport::Disabled => println!("Automations disabled."),
        RunReport::Completed { overdue, daily_summary } => {
            if let Some(report) = overdue {
                println!("Overdue notifications sent: {}", report.sent);
            }
            match daily_summary {
                Some(DailySummaryOutcome::AlreadySent) => {
                    println!("Daily summary already sent today.");
                },
                Some(DailySummaryOutcome::Disabled) => println!("Automations disabled."),
                Some(DailySummaryOutcome::Sent { run }) if run.success => {
                    println!("Daily summary sent.");
                },
                Some(DailySummaryOutcome::Sent { run }) => println!(
                    "Daily summary failed after {} attempt(s): {}",
                    run.attempts,
                    run.error_message.as_deref().unwrap_or("unknown error")
                ),
                None => {},
            }
        },
    }

    Ok(())
}

async fn lead_created(config: &Config, snapshot: PathBuf, lead_id: LeadId) -> Result<()> {
    let crm = JsonLeadSource::new(snapshot).snapshot().await?;
    let lead = crm
        .lead(lead_id)
        .with_context(|| format!("Lead {lead_id} not found in snapshot"))?;

    let service = service(config).await?;
    match service.notify_lead_created(lead).await? {
        None => println!("Automations disabled."),
        Some(run) => println!("{}", serde_json::to_string_pretty(&run)?),
    }

    Ok(())
}

async fn health(config: &Config) -> Result<()> {
    let storage = connect(config).await?;
    storage.health_check().await.context("Database health check failed")?;

    let ledger = PostgresRunLedger::new(Arc::new(storage));
    let report = AutomationHealth::collect(&ledger, RealClock::new().now_utc()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

async fn metrics(snapshot: PathBuf) -> Result<()> {
    let crm = JsonLeadSource::new(snapshot).snapshot().await?;
    let metrics = ConsistencyMetrics::compute(&crm, RealClock::new().now_utc());
    println!("{}", serde_json::to_string_pretty(&metrics)?);

    Ok(())
}

/// Wires the production delivery stack behind the trigger service.
async fn service(config: &Config) -> Result<AutomationService> {
    let storage = Arc::new(connect(config).await?);
    let ledger: Arc<dyn RunLedger> = Arc::new(PostgresRunLedger::new(storage.clone()));

    let mut audit = MulticastAuditSink::new();
    audit.add_sink(storage.audit_events.clone());
    audit.add_sink(Arc::new(LogAuditSink));
    let audit: Arc<dyn AuditSink> = Arc::new(audit);

    let dispatcher = WebhookDispatcher::new(
        config.to_dispatch_config(),
        ledger,
        audit,
        Arc::new(RealClock::new()),
    )?;

    Ok(AutomationService::new(Arc::new(dispatcher), config.automation_settings()))
}

/// Connects to PostgreSQL, retrying while the database comes up.
async fn connect(config: &Config) -> Result<Storage> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => return Ok(Storage::new(pool)),
            Err(e) if retries < MAX_RETRIES => {
                retries += 1;
                warn!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    error = %e,
                    "Database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to connect to database after retries");
            },
        }
    }
}
