//! 200-period moving-average calculation.
//!
//! Pure functions over bar slices. SMA200 is the trailing arithmetic mean
//! of the last 200 closes; EMA200 uses the standard smoothing constant
//! 2/(200+1), seeded by the SMA200 of the first 200 bars. Recomputing over
//! an identical bar sequence always yields bit-identical values, which is
//! what allows the ingestor to recompute only the tail after an
//! incremental fetch.

use crate::types::{Bar, IndicatorBar};

/// Moving-average window length in bars.
pub const MA_PERIOD: usize = 200;

/// EMA smoothing constant: 2 / (period + 1).
const EMA_K: f64 = 2.0 / (MA_PERIOD as f64 + 1.0);

/// Trailing SMA ending at index `i` of `closes`, or None before the window
/// is full. Each window is summed fresh; a rolling accumulator would drift.
fn sma_at(closes: &[f64], i: usize) -> Option<f64> {
    if i + 1 < MA_PERIOD {
        return None;
    }
    let window = &closes[i + 1 - MA_PERIOD..=i];
    Some(window.iter().sum::<f64>() / MA_PERIOD as f64)
}

/// Annotate bars starting at global index `prior.len()`, seeding the EMA
/// recurrence from the last prior value. `prior` must hold the annotated
/// points strictly preceding `bars`.
fn annotate_from(prior: &[IndicatorBar], bars: &[Bar], with_ema: bool) -> Vec<IndicatorBar> {
    let mut closes: Vec<f64> = Vec::with_capacity(prior.len() + bars.len());
    closes.extend(prior.iter().map(|p| p.close));
    closes.extend(bars.iter().map(|b| b.close));

    let mut ema_state = prior.last().and_then(|p| p.ema200);
    let mut out = Vec::with_capacity(bars.len());

    for (offset, bar) in bars.iter().enumerate() {
        let i = prior.len() + offset;
        let sma = sma_at(&closes, i);

        let ema = if !with_ema {
            None
        } else if i + 1 < MA_PERIOD {
            None
        } else if i + 1 == MA_PERIOD {
            // First defined EMA is the SMA of the first 200 bars.
            sma
        } else {
            let prev = ema_state
                .expect("ema seed must exist once the window has been full");
            Some(prev + EMA_K * (closes[i] - prev))
        };

        if ema.is_some() {
            ema_state = ema;
        }
        out.push(IndicatorBar::from_bar(bar, sma, ema));
    }

    out
}

/// Annotate a full daily bar sequence with sma200 and ema200.
pub fn annotate_daily(bars: &[Bar]) -> Vec<IndicatorBar> {
    annotate_from(&[], bars, true)
}

/// Annotate only a new daily tail, seeded from already-annotated history.
///
/// `prior` must be the annotated points strictly before `bars[0]`. Returns
/// the full annotated series (prior followed by the new tail). Agrees
/// exactly with [`annotate_daily`] over the concatenated bars; falls back
/// to a full recompute if the prior slice lacks a usable EMA seed.
pub fn annotate_daily_tail(prior: &[IndicatorBar], bars: &[Bar]) -> Vec<IndicatorBar> {
    if prior.len() >= MA_PERIOD && prior.last().is_some_and(|p| p.ema200.is_none()) {
        // Inconsistent prior annotation; recompute everything.
        let mut all: Vec<Bar> = prior.iter().map(IndicatorBar::bar).collect();
        all.extend_from_slice(bars);
        return annotate_daily(&all);
    }

    let mut out = prior.to_vec();
    out.extend(annotate_from(prior, bars, true));
    out
}

/// Annotate a full weekly bar sequence with sma200 (no EMA at weekly
/// resolution).
pub fn annotate_weekly(bars: &[Bar]) -> Vec<IndicatorBar> {
    annotate_from(&[], bars, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bars_with_closes(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                date: start + chrono::Duration::days(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000,
            })
            .collect()
    }

    #[test]
    fn test_undefined_before_200_bars() {
        let bars = bars_with_closes(&vec![10.0; 199]);
        let annotated = annotate_daily(&bars);
        assert!(annotated.iter().all(|p| p.sma200.is_none()));
        assert!(annotated.iter().all(|p| p.ema200.is_none()));
    }

    #[test]
    fn test_defined_exactly_at_200_bars() {
        let bars = bars_with_closes(&vec![10.0; 200]);
        let annotated = annotate_daily(&bars);
        assert!(annotated[198].sma200.is_none());
        assert_eq!(annotated[199].sma200, Some(10.0));
        // EMA seed equals the first SMA
        assert_eq!(annotated[199].ema200, Some(10.0));
    }

    #[test]
    fn test_sma_is_trailing_mean() {
        let mut closes = vec![10.0; 199];
        closes.push(30.0);
        let annotated = annotate_daily(&bars_with_closes(&closes));
        let expected = (199.0 * 10.0 + 30.0) / 200.0;
        assert_eq!(annotated[199].sma200, Some(expected));
    }

    #[test]
    fn test_ema_recurrence_after_seed() {
        let mut closes = vec![10.0; 200];
        closes.push(12.0);
        let annotated = annotate_daily(&bars_with_closes(&closes));
        let k = 2.0 / 201.0;
        let expected = 10.0 + k * (12.0 - 10.0);
        assert_eq!(annotated[200].ema200, Some(expected));
    }

    #[test]
    fn test_incremental_matches_full_exactly() {
        // Irregular closes so every window differs.
        let closes: Vec<f64> = (0..260)
            .map(|i| 50.0 + ((i * 37) % 17) as f64 * 0.7 - ((i * 11) % 5) as f64)
            .collect();
        let bars = bars_with_closes(&closes);

        let full = annotate_daily(&bars);

        for split in [1, 150, 199, 200, 230, 259] {
            let prior = annotate_daily(&bars[..split]);
            let incremental = annotate_daily_tail(&prior, &bars[split..]);
            assert_eq!(incremental, full, "split at {split} diverged");
        }
    }

    #[test]
    fn test_weekly_has_no_ema() {
        let bars = bars_with_closes(&vec![10.0; 210]);
        let annotated = annotate_weekly(&bars);
        assert!(annotated.iter().all(|p| p.ema200.is_none()));
        assert_eq!(annotated[199].sma200, Some(10.0));
    }

    #[test]
    fn test_tail_with_inconsistent_prior_recomputes() {
        let bars = bars_with_closes(&vec![10.0; 220]);
        // Strip the EMA annotation to simulate a polluted prior slice.
        let mut prior = annotate_daily(&bars[..210]);
        for p in prior.iter_mut() {
            p.ema200 = None;
        }
        let result = annotate_daily_tail(&prior, &bars[210..]);
        let full = annotate_daily(&bars);
        assert_eq!(result, full);
    }
}
