use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};

use hazmon_service::alert::Notifier;
use hazmon_service::alert::bulletin::situation_report;
use hazmon_service::alert::sms::AfricasTalkingGateway;
use hazmon_service::analysis::scoring::{FallbackScorer, GenerativeScorer, RiskScorer};
use hazmon_service::cache::ResultCache;
use hazmon_service::config::Config;
use hazmon_service::dev_mode::DevMode;
use hazmon_service::generate::TextGenerator;
use hazmon_service::ingest::{FeedSet, http_client};
use hazmon_service::logging::{DataSource, init_logging};
use hazmon_service::model::IncidentStatus;
use hazmon_service::regions::{REGION_REGISTRY, find_region, seed_registry};
use hazmon_service::scheduler::{Reconciler, Scheduler, TriggerOutcome};
use hazmon_service::store::{InMemoryStore, PgStore, Store, collect_stats};
use hazmon_service::verify::{print_summary, verify_feeds};

/// Regions sampled by `--verify`: one per climate zone.
const VERIFY_SAMPLE: &[&str] = &["Turkana", "Nairobi", "Mombasa", "Kisumu", "Wajir"];

#[derive(Parser)]
#[command(name = "hazmon", about = "Regional hazard monitoring service", version)]
struct Cli {
    /// Path to config TOML file (defaults are used when it does not exist)
    #[arg(long, default_value = "./hazmon.toml")]
    config: PathBuf,

    /// Run one reconciliation pass and exit
    #[arg(long)]
    once: bool,

    /// Check the configured feeds, print a JSON report and exit
    #[arg(long)]
    verify: bool,

    /// Print a markdown situation report for the active incidents and exit
    #[arg(long)]
    sitrep: bool,

    /// Text the bilingual alert for an incident to its region's responders and exit
    #[arg(long, value_name = "INCIDENT_ID")]
    notify: Option<i64>,

    /// Print the 72-hour flood and drought outlook as JSON and exit
    #[arg(long)]
    outlook: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    config.apply_env(|key| std::env::var(key).ok());
    init_logging(&config.logging)?;

    info!(
        source = %DataSource::System,
        config = %cli.config.display(),
        dev_mode = config.dev_mode,
        "hazmon starting"
    );

    let feeds = if config.dev_mode {
        info!(
            source = %DataSource::System,
            drift_deg = config.dev_drift_deg,
            "dev mode: using fixture feeds"
        );
        DevMode::with_drift(config.dev_drift_deg).feeds()
    } else {
        FeedSet::live(&config.feeds)?
    };

    if cli.verify {
        let samples: Vec<_> = VERIFY_SAMPLE.iter().filter_map(|n| find_region(n).copied()).collect();
        let report = verify_feeds(&feeds, &samples).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        print_summary(&report);
        return Ok(());
    }

    let store: Arc<dyn Store> = match (&config.database_url, config.dev_mode) {
        (Some(url), false) => Arc::new(PgStore::connect(url).await?),
        (None, false) => {
            warn!(source = %DataSource::Database, "DATABASE_URL not set, records will not survive a restart");
            Arc::new(InMemoryStore::new())
        }
        (_, true) => Arc::new(InMemoryStore::new()),
    };

    let seeded = seed_registry(store.as_ref()).await?;
    info!(
        source = %DataSource::Database,
        seeded,
        registry = REGION_REGISTRY.len(),
        "region registry seeded"
    );

    let generator = Arc::new(TextGenerator::new(config.generator.clone())?);

    if cli.sitrep {
        let stats = collect_stats(store.as_ref()).await?;
        let incidents = store.list_incidents(Some(IncidentStatus::Active)).await?;
        let report = situation_report(generator.as_ref(), &stats, &incidents, Utc::now()).await?;
        println!("{}", report);
        return Ok(());
    }

    if let Some(incident_id) = cli.notify {
        let cache = ResultCache::new(store.clone());
        let gateway = AfricasTalkingGateway::new(http_client(config.feeds.timeout())?, config.sms.clone());
        let notifier = Notifier {
            store: store.as_ref(),
            generator: generator.as_ref(),
            cache: &cache,
            gateway: &gateway,
        };
        let notification = notifier.notify_incident(incident_id).await?;
        println!("{}", serde_json::to_string_pretty(&notification)?);
        return Ok(());
    }

    let fallback = FallbackScorer::new(config.scoring.max_jitter, config.scoring.jitter_seed);
    let scorer: Arc<dyn RiskScorer> = Arc::new(GenerativeScorer::new(
        generator.clone(),
        fallback,
        config.scoring.generation,
    ));

    let reconciler = Arc::new(Reconciler::new(
        store,
        feeds,
        scorer,
        config.scheduler.clone(),
        config.thresholds.clone(),
    ));

    if cli.outlook {
        let outlooks = reconciler.outlook().await?;
        println!("{}", serde_json::to_string_pretty(&outlooks)?);
        return Ok(());
    }

    let scheduler = Scheduler::new(reconciler, config.scheduler.interval());

    if cli.once {
        return match scheduler.trigger().await {
            TriggerOutcome::Completed(summary) => {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                Ok(())
            }
            TriggerOutcome::Skipped => Ok(()),
            TriggerOutcome::Panicked(msg) => Err(msg.into()),
        };
    }

    let handle = scheduler.spawn();
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(source = %DataSource::System, "shutdown requested"),
        Err(e) => error!(source = %DataSource::System, "failed to listen for ctrl-c: {}", e),
    }
    handle.shutdown().await;
    Ok(())
}
