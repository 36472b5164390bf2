//! SQLite persistence for per-symbol price history.
//!
//! Stores daily and weekly OHLCV bars with their precomputed moving
//! averages, plus one metadata row per symbol recording how much history
//! is cached. Metadata is recomputed inside the same transaction as every
//! bar write, so the two can never diverge through this API; if an
//! external writer pollutes them anyway, reads trigger a rebuild instead
//! of failing.

use crate::error::{AppError, Result};
use crate::types::{Frequency, IndicatorBar, SymbolMetadata};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Transaction};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

const DATE_FMT: &str = "%Y-%m-%d";

/// Durable, incrementally-updatable store of per-symbol bars.
pub struct PriceCache {
    conn: Mutex<Connection>,
}

impl PriceCache {
    /// Open (or create) the cache database at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        info!("Price cache initialized");
        Ok(cache)
    }

    /// Create an in-memory cache (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        debug!("In-memory price cache initialized");
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS daily_prices (
                symbol TEXT NOT NULL,
                date TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume INTEGER NOT NULL,
                sma200 REAL,
                ema200 REAL,
                PRIMARY KEY (symbol, date)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS weekly_prices (
                symbol TEXT NOT NULL,
                date TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume INTEGER NOT NULL,
                sma200 REAL,
                PRIMARY KEY (symbol, date)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS symbol_metadata (
                symbol TEXT PRIMARY KEY,
                first_date TEXT NOT NULL,
                last_date TEXT NOT NULL,
                last_updated INTEGER NOT NULL,
                daily_count INTEGER NOT NULL,
                weekly_count INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_daily_symbol_date
             ON daily_prices(symbol, date DESC)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_weekly_symbol_date
             ON weekly_prices(symbol, date DESC)",
            [],
        )?;

        Ok(())
    }

    /// Upsert bars for a symbol at one frequency. Idempotent per
    /// (symbol, date) key: a later write for the same key replaces the
    /// earlier one. Metadata moves in the same transaction as the bars.
    pub fn upsert(&self, symbol: &str, frequency: Frequency, points: &[IndicatorBar]) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let sql = match frequency {
            Frequency::Daily => {
                "INSERT OR REPLACE INTO daily_prices
                 (symbol, date, open, high, low, close, volume, sma200, ema200)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            }
            Frequency::Weekly => {
                "INSERT OR REPLACE INTO weekly_prices
                 (symbol, date, open, high, low, close, volume, sma200)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            }
        };

        {
            let mut stmt = tx.prepare(sql)?;
            for p in points {
                let date = p.date.format(DATE_FMT).to_string();
                match frequency {
                    Frequency::Daily => {
                        stmt.execute(params![
                            symbol, date, p.open, p.high, p.low, p.close, p.volume, p.sma200,
                            p.ema200,
                        ])?;
                    }
                    Frequency::Weekly => {
                        stmt.execute(params![
                            symbol, date, p.open, p.high, p.low, p.close, p.volume, p.sma200,
                        ])?;
                    }
                }
            }
        }

        write_metadata(&tx, symbol)?;
        tx.commit()?;

        debug!("Upserted {} {} bars for {}", points.len(), frequency, symbol);
        Ok(points.len())
    }

    /// Read bars for a symbol ordered by date ascending. `from`/`to` are
    /// inclusive bounds; None leaves that side open.
    pub fn get_range(
        &self,
        symbol: &str,
        frequency: Frequency,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<IndicatorBar>> {
        let conn = self.conn.lock().unwrap();

        let (select, has_ema) = match frequency {
            Frequency::Daily => (
                "SELECT date, open, high, low, close, volume, sma200, ema200
                 FROM daily_prices
                 WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
                true,
            ),
            Frequency::Weekly => (
                "SELECT date, open, high, low, close, volume, sma200
                 FROM weekly_prices
                 WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
                false,
            ),
        };

        let from = from.map(|d| d.format(DATE_FMT).to_string());
        let to = to.map(|d| d.format(DATE_FMT).to_string());

        let mut stmt = conn.prepare(select)?;
        let rows = stmt.query_map(
            params![
                symbol,
                from.as_deref().unwrap_or("0000-01-01"),
                to.as_deref().unwrap_or("9999-12-31"),
            ],
            |row| {
                let date_str: String = row.get(0)?;
                Ok((
                    date_str,
                    IndicatorBar {
                        date: NaiveDate::MIN, // replaced after parsing
                        open: row.get(1)?,
                        high: row.get(2)?,
                        low: row.get(3)?,
                        close: row.get(4)?,
                        volume: row.get(5)?,
                        sma200: row.get(6)?,
                        ema200: if has_ema { row.get(7)? } else { None },
                    },
                ))
            },
        )?;

        let mut points: Vec<IndicatorBar> = Vec::new();
        for row in rows {
            let (date_str, mut point) = row?;
            point.date = NaiveDate::parse_from_str(&date_str, DATE_FMT).map_err(|e| {
                AppError::DataIntegrity(format!("bad date '{date_str}' for {symbol}: {e}"))
            })?;
            // Last-write-wins dedup; the primary key should already
            // guarantee uniqueness.
            match points.last_mut() {
                Some(last) if last.date == point.date => *last = point,
                _ => points.push(point),
            }
        }

        Ok(points)
    }

    /// Freshness metadata for a symbol, or None if it was never ingested.
    /// A divergence between the metadata row and the bar tables triggers a
    /// rebuild rather than an error.
    pub fn get_metadata(&self, symbol: &str) -> Result<Option<SymbolMetadata>> {
        let stored = {
            let conn = self.conn.lock().unwrap();
            read_metadata(&conn, symbol)?
        };

        let Some(meta) = stored else {
            return Ok(None);
        };

        let (daily_count, last_date) = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT COUNT(*), MAX(date) FROM daily_prices WHERE symbol = ?1",
                params![symbol],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?)),
            )?
        };

        let diverged = daily_count != meta.daily_count
            || last_date.as_deref() != Some(meta.last_date.format(DATE_FMT).to_string().as_str());
        if diverged {
            warn!("Metadata for {} diverged from bar tables, rebuilding", symbol);
            return self.rebuild_metadata(symbol);
        }

        Ok(Some(meta))
    }

    /// Recompute the metadata row from the bar tables.
    pub fn rebuild_metadata(&self, symbol: &str) -> Result<Option<SymbolMetadata>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        write_metadata(&tx, symbol)?;
        tx.commit()?;
        read_metadata(&conn, symbol)
    }
}

/// Recompute and write the metadata row for a symbol inside an open
/// transaction. Removes the row if the symbol has no daily bars left.
fn write_metadata(tx: &Transaction<'_>, symbol: &str) -> Result<()> {
    let (daily_count, first_date, last_date): (i64, Option<String>, Option<String>) = tx
        .query_row(
            "SELECT COUNT(*), MIN(date), MAX(date) FROM daily_prices WHERE symbol = ?1",
            params![symbol],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
    let weekly_count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM weekly_prices WHERE symbol = ?1",
        params![symbol],
        |row| row.get(0),
    )?;

    let (Some(first_date), Some(last_date)) = (first_date, last_date) else {
        tx.execute(
            "DELETE FROM symbol_metadata WHERE symbol = ?1",
            params![symbol],
        )?;
        return Ok(());
    };

    let now = chrono::Utc::now().timestamp_millis();
    tx.execute(
        "INSERT OR REPLACE INTO symbol_metadata
         (symbol, first_date, last_date, last_updated, daily_count, weekly_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![symbol, first_date, last_date, now, daily_count, weekly_count],
    )?;

    Ok(())
}

fn read_metadata(conn: &Connection, symbol: &str) -> Result<Option<SymbolMetadata>> {
    let result = conn.query_row(
        "SELECT symbol, first_date, last_date, last_updated, daily_count, weekly_count
         FROM symbol_metadata WHERE symbol = ?1",
        params![symbol],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        },
    );

    let (symbol, first, last, last_updated, daily_count, weekly_count) = match result {
        Ok(row) => row,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let parse = |s: &str| {
        NaiveDate::parse_from_str(s, DATE_FMT)
            .map_err(|e| AppError::DataIntegrity(format!("bad metadata date '{s}': {e}")))
    };

    Ok(Some(SymbolMetadata {
        symbol,
        first_date: parse(&first)?,
        last_date: parse(&last)?,
        last_updated,
        daily_count,
        weekly_count,
    }))
}
