use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trendscan::config::Config;
use trendscan::services::{
    load_universe, DataIngestor, PriceCache, ResultStore, RuleEngine, ScanOrchestrator,
};
use trendscan::sources::YahooFinanceClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trendscan=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    std::fs::create_dir_all(&config.data_dir)?;

    let cache = Arc::new(PriceCache::new(config.cache_db_path())?);
    let store = Arc::new(ResultStore::new(&config.data_dir)?);
    let source = Arc::new(YahooFinanceClient::new());
    let ingestor = Arc::new(DataIngestor::new(
        source,
        cache,
        config.ingest.clone(),
    ));
    let rules = RuleEngine::new(config.strategy.clone());
    let orchestrator = ScanOrchestrator::new(
        ingestor,
        rules,
        store,
        config.scan.clone(),
        config.strategy.chart_tail_days,
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("scan") => run_scan(&config, orchestrator).await,
        Some("analyze") => {
            let Some(symbol) = args.get(1) else {
                eprintln!("Usage: trendscan analyze <SYMBOL> [--force]");
                std::process::exit(2);
            };
            let force = args.iter().any(|a| a == "--force");
            run_analyze(orchestrator, symbol, force).await
        }
        Some(other) => {
            eprintln!("Unknown command '{other}'. Usage: trendscan [scan | analyze <SYMBOL> [--force]]");
            std::process::exit(2);
        }
    }
}

async fn run_scan(
    config: &Config,
    orchestrator: Arc<ScanOrchestrator<YahooFinanceClient>>,
) -> anyhow::Result<()> {
    let universe = load_universe(config.symbols_file.as_deref());
    info!("Starting scan over {} symbols", universe.len());

    // Operator signal: let in-flight symbols finish, dispatch no more.
    {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, aborting after in-flight symbols");
                orchestrator.abort();
            }
        });
    }

    let summary = orchestrator.run_scan(&universe).await?;
    println!(
        "Scan {:?}: {} scanned, {} signals, {} candidates, {} failed ({:.1}s)",
        summary.state,
        summary.total_scanned,
        summary.signals.len(),
        summary.candidates.len(),
        summary.failed.len(),
        summary.performance.duration_seconds
    );
    Ok(())
}

async fn run_analyze(
    orchestrator: Arc<ScanOrchestrator<YahooFinanceClient>>,
    symbol: &str,
    force: bool,
) -> anyhow::Result<()> {
    match orchestrator.analyze(symbol, force).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(trendscan::AppError::NotFound(msg)) => {
            error!("{}", msg);
            eprintln!("No stored analysis for '{symbol}'. Re-run with --force to analyze now.");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
