use std::env;
use std::path::PathBuf;

/// Ingestion configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Years of history fetched on a cold (first-time) fetch.
    pub lookback_years: i64,
    /// Retry attempts for a transient upstream failure.
    pub fetch_retries: u32,
    /// Base backoff between retries (ms); doubles per attempt.
    pub fetch_backoff_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            lookback_years: 10,
            fetch_retries: 3,
            fetch_backoff_ms: 500,
        }
    }
}

/// Strategy parameters for the rule pipeline.
///
/// The scoring and proximity constants are tunables; only the monotonicity
/// of the score in each component is a hard contract.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// How many indicator-complete daily bars back to look for setups.
    pub setup_lookback_days: usize,
    /// Forward search window (trading days) for a gap after a setup.
    pub fvg_search_days: usize,
    /// Breakout confirmation threshold above resistance (fraction).
    pub breakout_threshold: f64,
    /// Max distance of a gap's center from a moving average (fraction).
    pub ma_proximity_pct: f64,
    /// Daily bars included in the chart series tail.
    pub chart_tail_days: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            setup_lookback_days: 60,
            fvg_search_days: 30,
            breakout_threshold: 0.001,
            ma_proximity_pct: 0.10,
            chart_tail_days: 180,
        }
    }
}

/// Orchestration configuration.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Maximum concurrent per-symbol work units.
    pub concurrency: usize,
    /// Symbols dispatched per batch.
    pub batch_size: usize,
    /// Hard cooldown between batches (ms), for upstream rate limits.
    pub batch_cooldown_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            batch_size: 20,
            batch_cooldown_ms: 100,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the cache database and result documents.
    pub data_dir: PathBuf,
    /// Optional symbols file (one symbol per line) defining the universe.
    pub symbols_file: Option<PathBuf>,
    pub ingest: IngestConfig,
    pub strategy: StrategyConfig,
    pub scan: ScanConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            symbols_file: None,
            ingest: IngestConfig::default(),
            strategy: StrategyConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Self {
            data_dir: env::var("TRENDSCAN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            symbols_file: env::var("SYMBOLS_FILE").ok().map(PathBuf::from),
            ingest: IngestConfig {
                lookback_years: env_parse("LOOKBACK_YEARS", defaults.ingest.lookback_years),
                fetch_retries: env_parse("FETCH_RETRIES", defaults.ingest.fetch_retries),
                fetch_backoff_ms: env_parse("FETCH_BACKOFF_MS", defaults.ingest.fetch_backoff_ms),
            },
            strategy: StrategyConfig {
                setup_lookback_days: env_parse(
                    "SETUP_LOOKBACK_DAYS",
                    defaults.strategy.setup_lookback_days,
                ),
                fvg_search_days: env_parse("FVG_SEARCH_DAYS", defaults.strategy.fvg_search_days),
                breakout_threshold: env_parse(
                    "BREAKOUT_THRESHOLD",
                    defaults.strategy.breakout_threshold,
                ),
                ma_proximity_pct: env_parse("FVG_MA_PROXIMITY", defaults.strategy.ma_proximity_pct),
                chart_tail_days: env_parse("CHART_TAIL_DAYS", defaults.strategy.chart_tail_days),
            },
            scan: ScanConfig {
                concurrency: env_parse("SCAN_CONCURRENCY", defaults.scan.concurrency),
                batch_size: env_parse("SCAN_BATCH_SIZE", defaults.scan.batch_size),
                batch_cooldown_ms: env_parse("SCAN_COOLDOWN_MS", defaults.scan.batch_cooldown_ms),
            },
        }
    }

    /// Path of the price cache database under the data directory.
    pub fn cache_db_path(&self) -> PathBuf {
        self.data_dir.join("price_cache.db")
    }
}

/// Parse an environment variable, falling back to a default.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
