//! Scan universe loading.
//!
//! The universe comes from a symbols file (one symbol per line, `#`
//! comments allowed); without one, a small built-in list keeps the
//! scanner usable.

use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Fallback universe used when no symbols file is configured or readable.
const FALLBACK_SYMBOLS: &[&str] = &["AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA"];

/// Load the symbol universe: uppercased, deduplicated, sorted.
pub fn load_universe(symbols_file: Option<&Path>) -> Vec<String> {
    if let Some(path) = symbols_file {
        match fs::read_to_string(path) {
            Ok(content) => {
                let mut symbols: Vec<String> = content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_uppercase)
                    .collect();
                symbols.sort();
                symbols.dedup();
                if !symbols.is_empty() {
                    info!("Loaded {} symbols from {}", symbols.len(), path.display());
                    return symbols;
                }
                warn!("Symbols file {} is empty, using fallback list", path.display());
            }
            Err(e) => {
                warn!(
                    "Failed to read symbols file {}: {}, using fallback list",
                    path.display(),
                    e
                );
            }
        }
    }

    FALLBACK_SYMBOLS.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_fallback_without_file() {
        let symbols = load_universe(None);
        assert!(symbols.contains(&"AAPL".to_string()));
    }

    #[test]
    fn test_fallback_on_unreadable_file() {
        let symbols = load_universe(Some(Path::new("/nonexistent/symbols.txt")));
        assert_eq!(symbols.len(), FALLBACK_SYMBOLS.len());
    }

    #[test]
    fn test_file_parsing_dedups_and_uppercases() {
        let path = PathBuf::from(std::env::temp_dir())
            .join(format!("trendscan_universe_{}.txt", std::process::id()));
        fs::write(&path, "# watchlist\naapl\nMSFT\n\nmsft\n").unwrap();

        let symbols = load_universe(Some(&path));
        assert_eq!(symbols, vec!["AAPL".to_string(), "MSFT".to_string()]);

        let _ = fs::remove_file(path);
    }
}
