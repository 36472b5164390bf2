//! Durable scan-result documents.
//!
//! One JSON document per symbol under `symbols/`, one per scan run under
//! `daily/`, and a `daily/latest.json` alias. The alias is republished by
//! writing to a temporary file and renaming it into place, so readers
//! never observe a half-written summary.

use crate::error::{AppError, Result};
use crate::types::{DailySummary, ScanResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File-backed store for per-symbol results and daily summaries.
pub struct ResultStore {
    symbols_dir: PathBuf,
    daily_dir: PathBuf,
}

impl ResultStore {
    /// Create a result store rooted at `base_dir`, creating the layout if
    /// needed.
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base = base_dir.as_ref();
        let symbols_dir = base.join("symbols");
        let daily_dir = base.join("daily");
        fs::create_dir_all(&symbols_dir).map_err(storage_err)?;
        fs::create_dir_all(&daily_dir).map_err(storage_err)?;
        debug!("Result store initialized at {}", base.display());
        Ok(Self {
            symbols_dir,
            daily_dir,
        })
    }

    fn symbol_path(&self, symbol: &str) -> PathBuf {
        // Sanitize for the filesystem; share classes like BRK.B appear.
        let safe = symbol.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.symbols_dir.join(format!("{}.json", safe.to_uppercase()))
    }

    /// Persist a per-symbol result, replacing the previous run's document.
    pub fn save_result(&self, result: &ScanResult) -> Result<()> {
        let path = self.symbol_path(&result.symbol);
        let json = serde_json::to_string_pretty(result)?;
        fs::write(&path, json).map_err(storage_err)?;
        debug!("Saved analysis for '{}'", result.symbol);
        Ok(())
    }

    /// Load the stored result for a symbol, if any.
    pub fn load_result(&self, symbol: &str) -> Result<Option<ScanResult>> {
        let path = self.symbol_path(symbol);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_err(e)),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Persist a daily summary and republish the `latest` alias. The alias
    /// only moves after the dated document has been fully written.
    pub fn save_daily_summary(&self, summary: &DailySummary) -> Result<()> {
        let json = serde_json::to_string_pretty(summary)?;

        let dated = self.daily_dir.join(format!("{}.json", summary.scan_date));
        fs::write(&dated, &json).map_err(storage_err)?;

        let tmp = self.daily_dir.join("latest.json.tmp");
        let latest = self.daily_dir.join("latest.json");
        fs::write(&tmp, &json).map_err(storage_err)?;
        fs::rename(&tmp, &latest).map_err(storage_err)?;

        info!("Saved daily summary for {}", summary.scan_date);
        Ok(())
    }

    /// Load the summary the `latest` alias points at, if any.
    pub fn load_latest_summary(&self) -> Result<Option<DailySummary>> {
        let path = self.daily_dir.join("latest.json");
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_err(e)),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }
}

fn storage_err(e: std::io::Error) -> AppError {
    AppError::Storage(e.to_string())
}
