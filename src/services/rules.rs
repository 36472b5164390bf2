//! The four-stage rule pipeline.
//!
//! Stateless and pure: each evaluation is a function of the symbol's
//! annotated daily and weekly history alone. The stages run in order
//! (trend gate, setup detection, gap detection, breakout confirmation)
//! and later stages only run while earlier ones still have candidates.
//! Histories shorter than the indicator window produce an empty analysis,
//! not an error.

use crate::config::StrategyConfig;
use crate::types::{
    BreakoutSignal, Candle, FairValueGap, FvgStatus, IndicatorBar, Setup, SymbolAnalysis,
    TrendCheck,
};

/// Stateless evaluator for the four-stage strategy.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    config: StrategyConfig,
}

impl RuleEngine {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    /// Evaluate the full pipeline over one symbol's history.
    pub fn evaluate(&self, daily: &[IndicatorBar], weekly: &[IndicatorBar]) -> SymbolAnalysis {
        let trend_check = self.trend_check(daily, weekly);
        if !trend_check.passed {
            return SymbolAnalysis::gated(trend_check);
        }

        let setups = self.find_setups(daily);
        if setups.is_empty() {
            return SymbolAnalysis::gated(trend_check);
        }

        let mut fvgs = Vec::new();
        let mut signals = Vec::new();
        for setup in &setups {
            if let Some(mut fvg) = self.detect_fvg(daily, setup) {
                if let Some(signal) = self.confirm_breakout(daily, setup, &mut fvg) {
                    signals.push(signal);
                }
                fvgs.push(fvg);
            }
        }

        SymbolAnalysis {
            trend_check,
            setups,
            fvgs,
            signals,
        }
    }

    /// Rule 1: the latest close must sit above the weekly SMA200 and above
    /// at least one of the daily moving averages. Applied first to bound
    /// the cost of the remaining stages.
    fn trend_check(&self, daily: &[IndicatorBar], weekly: &[IndicatorBar]) -> TrendCheck {
        let Some(latest) = daily.last() else {
            return TrendCheck::default();
        };

        let weekly_sma200 = weekly
            .last()
            .and_then(|w| w.sma200)
            .is_some_and(|v| latest.close > v);
        let daily_sma200 = latest.sma200.is_some_and(|v| latest.close > v);
        let daily_ema200 = latest.ema200.is_some_and(|v| latest.close > v);

        TrendCheck {
            passed: weekly_sma200 && (daily_sma200 || daily_ema200),
            weekly_sma200,
            daily_sma200,
            daily_ema200,
        }
    }

    /// Rule 2: a bar is a setup iff both its open and close lie inside the
    /// band between the two daily moving averages. All setups in the
    /// lookback window are retained; a later gap may reference an older
    /// setup.
    fn find_setups(&self, daily: &[IndicatorBar]) -> Vec<Setup> {
        let defined: Vec<&IndicatorBar> = daily
            .iter()
            .filter(|p| p.sma200.is_some() && p.ema200.is_some())
            .collect();
        let start = defined.len().saturating_sub(self.config.setup_lookback_days);

        defined[start..]
            .iter()
            .filter_map(|p| {
                let (zone_lower, zone_upper) = p.ma_band()?;
                let inside = |v: f64| zone_lower <= v && v <= zone_upper;
                if !(inside(p.open) && inside(p.close)) {
                    return None;
                }
                Some(Setup {
                    id: Setup::make_id(p.date),
                    date: p.date,
                    zone_upper,
                    zone_lower,
                    sma200: p.sma200?,
                    ema200: p.ema200?,
                    candle: Candle {
                        open: p.open,
                        high: p.high,
                        low: p.low,
                        close: p.close,
                    },
                })
            })
            .collect()
    }

    /// Rule 3: the first 3-bar gap within the search window after a setup
    /// whose center lies within tolerance of either moving average at
    /// formation time.
    fn detect_fvg(&self, daily: &[IndicatorBar], setup: &Setup) -> Option<FairValueGap> {
        let setup_idx = daily.iter().position(|p| p.date == setup.date)?;
        let last = daily.len() - 1;
        let end = (setup_idx + self.config.fvg_search_days).min(last);

        for i in setup_idx + 2..=end {
            let c1 = &daily[i - 2];
            let c3 = &daily[i];
            if c3.low <= c1.high {
                continue;
            }

            let Some(distance) = ma_distance(c3, c1.high, c3.low) else {
                continue;
            };
            if distance > self.config.ma_proximity_pct {
                continue;
            }

            let gap = c3.low - c1.high;
            return Some(FairValueGap {
                id: FairValueGap::make_id(c3.date, i),
                setup_id: setup.id.clone(),
                formation_date: c3.date,
                upper_bound: c3.low,
                lower_bound: c1.high,
                gap_size: gap,
                gap_percentage: gap / c1.high * 100.0,
                ma_distance_pct: distance,
                status: FvgStatus::Active,
            });
        }

        None
    }

    /// Rule 4: walk forward from the formation bar, checking the two exits
    /// in order on every bar. A low below the gap's lower bound violates
    /// the thesis; a close beyond resistance by the threshold consumes the
    /// gap and emits a signal dated to the consuming bar. First hit wins,
    /// so a status is stable under recomputation as history grows.
    /// Resistance is the highest high strictly between the setup and the
    /// formation bar, falling back to the setup bar's own high when that
    /// span is empty.
    fn confirm_breakout(
        &self,
        daily: &[IndicatorBar],
        setup: &Setup,
        fvg: &mut FairValueGap,
    ) -> Option<BreakoutSignal> {
        let setup_idx = daily.iter().position(|p| p.date == setup.date)?;
        let fvg_idx = daily.iter().position(|p| p.date == fvg.formation_date)?;

        let span = &daily[setup_idx + 1..fvg_idx];
        let resistance = if span.is_empty() {
            daily[setup_idx].high
        } else {
            span.iter().map(|p| p.high).fold(f64::MIN, f64::max)
        };

        // The formation bar is included: its own low sits above the lower
        // bound by construction, but its close may already break out.
        for bar in &daily[fvg_idx..] {
            if bar.low < fvg.lower_bound {
                fvg.status = FvgStatus::Violated;
                return None;
            }
            if bar.close > resistance * (1.0 + self.config.breakout_threshold) {
                fvg.status = FvgStatus::Consumed;
                let breakout_percentage = (bar.close / resistance - 1.0) * 100.0;
                let score = self.score(setup, fvg, Some(breakout_percentage));
                return Some(BreakoutSignal {
                    id: BreakoutSignal::make_id(bar.date),
                    setup_id: setup.id.clone(),
                    fvg_id: fvg.id.clone(),
                    signal_date: bar.date,
                    breakout_price: bar.close,
                    resistance_price: resistance,
                    breakout_percentage,
                    score,
                });
            }
        }

        None
    }

    /// Score a setup/gap pair (and optionally its breakout) on a 0-100
    /// scale. The weights are tunables; each term is monotonic in its
    /// component: a tighter zone, a larger gap, a closer moving average
    /// and a stronger breakout never lower the score.
    pub fn score(&self, setup: &Setup, fvg: &FairValueGap, breakout_pct: Option<f64>) -> u8 {
        // Zone tightness, max 30.
        let zone_width_pct = (setup.zone_upper - setup.zone_lower) / setup.candle.close;
        let zone_term = (30.0 - zone_width_pct * 2000.0).max(0.0);

        // Gap size, max 40 (saturates at a 0.8% gap).
        let gap_term = (fvg.gap_percentage * 50.0).min(40.0);

        // MA proximity, max 15, linear from the tolerance edge inward.
        let tolerance = self.config.ma_proximity_pct.max(f64::EPSILON);
        let proximity_term = 15.0 * (1.0 - (fvg.ma_distance_pct / tolerance).min(1.0));

        // Breakout strength, max 30 (saturates at a 1.5% breakout).
        let breakout_term = breakout_pct.map_or(0.0, |pct| (pct * 20.0).min(30.0).max(0.0));

        (zone_term + gap_term + proximity_term + breakout_term).min(100.0) as u8
    }
}

/// Distance of the gap center to the nearest defined moving average on the
/// formation bar, as a fraction of that average. None when neither MA is
/// defined.
fn ma_distance(formation: &IndicatorBar, lower_bound: f64, upper_bound: f64) -> Option<f64> {
    let center = (lower_bound + upper_bound) / 2.0;
    [formation.sma200, formation.ema200]
        .into_iter()
        .flatten()
        .map(|ma| (center - ma).abs() / ma)
        .min_by(|a, b| a.total_cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn date(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(i as i64)
    }

    fn point(i: usize, open: f64, high: f64, low: f64, close: f64) -> IndicatorBar {
        IndicatorBar {
            date: date(i),
            open,
            high,
            low,
            close,
            volume: 1_000,
            sma200: None,
            ema200: None,
        }
    }

    /// A weekly series whose SMA200 sits below every realistic close.
    fn bullish_weekly() -> Vec<IndicatorBar> {
        let mut p = point(0, 90.0, 90.0, 90.0, 90.0);
        p.sma200 = Some(90.0);
        vec![p]
    }

    fn engine() -> RuleEngine {
        RuleEngine::new(StrategyConfig::default())
    }

    #[test]
    fn test_short_history_yields_empty_analysis() {
        let daily: Vec<IndicatorBar> = (0..50)
            .map(|i| point(i, 100.0, 101.0, 99.0, 100.0))
            .collect();
        let analysis = engine().evaluate(&daily, &bullish_weekly());
        assert!(!analysis.trend_check.passed);
        assert!(analysis.setups.is_empty());
        assert!(analysis.fvgs.is_empty());
        assert!(analysis.signals.is_empty());
    }

    #[test]
    fn test_trend_gate_requires_weekly_and_one_daily_ma() {
        let mut latest = point(0, 100.0, 101.0, 99.0, 100.5);
        latest.sma200 = Some(100.0);
        latest.ema200 = Some(101.0); // above close
        let daily = vec![latest];

        let check = engine().trend_check(&daily, &bullish_weekly());
        assert!(check.passed);
        assert!(check.weekly_sma200);
        assert!(check.daily_sma200);
        assert!(!check.daily_ema200);

        // No weekly SMA defined: gate fails regardless of the daily MAs.
        let check = engine().trend_check(&daily, &[]);
        assert!(!check.passed);
    }

    #[test]
    fn test_setup_requires_open_and_close_in_band() {
        let mut inside = point(0, 100.1, 100.6, 99.8, 100.3);
        inside.sma200 = Some(100.0);
        inside.ema200 = Some(100.4);

        let mut open_outside = inside.clone();
        open_outside.date = date(1);
        open_outside.open = 100.9;

        let setups = engine().find_setups(&[inside, open_outside]);
        assert_eq!(setups.len(), 1);
        assert_eq!(setups[0].date, date(0));
        assert_eq!(setups[0].zone_lower, 100.0);
        assert_eq!(setups[0].zone_upper, 100.4);
    }

    #[test]
    fn test_setup_lookback_bounds_candidates() {
        let mut engine = engine();
        engine.config.setup_lookback_days = 5;

        // Ten identical in-band bars; only the last five may qualify.
        let daily: Vec<IndicatorBar> = (0..10)
            .map(|i| {
                let mut p = point(i, 100.1, 100.6, 99.8, 100.3);
                p.sma200 = Some(100.0);
                p.ema200 = Some(100.4);
                p
            })
            .collect();

        let setups = engine.find_setups(&daily);
        assert_eq!(setups.len(), 5);
        assert_eq!(setups[0].date, date(5));
    }

    #[test]
    fn test_score_monotonic_in_breakout_strength() {
        let engine = engine();
        let setup = Setup {
            id: "setup_20230101".into(),
            date: date(0),
            zone_upper: 100.4,
            zone_lower: 100.0,
            sma200: 100.0,
            ema200: 100.4,
            candle: Candle {
                open: 100.1,
                high: 100.6,
                low: 99.8,
                close: 100.3,
            },
        };
        let fvg = FairValueGap {
            id: "fvg_20230110_9".into(),
            setup_id: setup.id.clone(),
            formation_date: date(9),
            upper_bound: 101.0,
            lower_bound: 100.7,
            gap_size: 0.3,
            gap_percentage: 0.3,
            ma_distance_pct: 0.01,
            status: FvgStatus::Active,
        };

        let mut last = 0;
        for step in 0..40 {
            let pct = step as f64 * 0.05;
            let score = engine.score(&setup, &fvg, Some(pct));
            assert!(score >= last, "score dropped at breakout {pct}%");
            last = score;
        }
        assert!(last <= 100);
    }

    #[test]
    fn test_score_monotonic_in_ma_proximity() {
        let engine = engine();
        let setup = Setup {
            id: "setup_20230101".into(),
            date: date(0),
            zone_upper: 100.4,
            zone_lower: 100.0,
            sma200: 100.0,
            ema200: 100.4,
            candle: Candle {
                open: 100.1,
                high: 100.6,
                low: 99.8,
                close: 100.3,
            },
        };
        let mut fvg = FairValueGap {
            id: "fvg_20230110_9".into(),
            setup_id: setup.id.clone(),
            formation_date: date(9),
            upper_bound: 101.0,
            lower_bound: 100.7,
            gap_size: 0.3,
            gap_percentage: 0.3,
            ma_distance_pct: 0.10,
            status: FvgStatus::Active,
        };

        // Tightening proximity must never lower the score.
        let mut last = 0;
        for step in 0..=10 {
            fvg.ma_distance_pct = 0.10 - step as f64 * 0.01;
            let score = engine.score(&setup, &fvg, None);
            assert!(score >= last, "score dropped at distance {}", fvg.ma_distance_pct);
            last = score;
        }
    }
}
