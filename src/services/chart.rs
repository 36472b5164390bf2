//! Chart-ready series assembly.
//!
//! Flattens a symbol's annotated history and analysis into the candle /
//! line / zone / marker series consumed by the presentation layer.

use crate::types::{
    CandlePoint, ChartData, EventMarker, IndicatorBar, LinePoint, SymbolAnalysis, ZoneKind,
    ZoneOverlay,
};

/// Build the chart payload over the last `tail_days` daily bars.
pub fn build_chart_data(
    daily: &[IndicatorBar],
    weekly: &[IndicatorBar],
    analysis: &SymbolAnalysis,
    tail_days: usize,
) -> ChartData {
    let tail = &daily[daily.len().saturating_sub(tail_days)..];
    let Some(last_date) = tail.last().map(|p| p.date) else {
        return ChartData::default();
    };

    let candles = tail
        .iter()
        .map(|p| CandlePoint {
            time: p.date,
            open: p.open,
            high: p.high,
            low: p.low,
            close: p.close,
        })
        .collect();

    let line = |f: fn(&IndicatorBar) -> Option<f64>| -> Vec<LinePoint> {
        tail.iter()
            .filter_map(|p| f(p).map(|value| LinePoint { time: p.date, value }))
            .collect()
    };
    let sma200 = line(|p| p.sma200);
    let ema200 = line(|p| p.ema200);

    // Weekly SMA forward-filled onto the daily timeline.
    let mut weekly_sma200 = Vec::with_capacity(tail.len());
    let mut w = 0usize;
    let mut current: Option<f64> = None;
    for p in tail {
        while w < weekly.len() && weekly[w].date <= p.date {
            if let Some(v) = weekly[w].sma200 {
                current = Some(v);
            }
            w += 1;
        }
        if let Some(value) = current {
            weekly_sma200.push(LinePoint {
                time: p.date,
                value,
            });
        }
    }

    let mut zones: Vec<ZoneOverlay> = analysis
        .setups
        .iter()
        .map(|s| ZoneOverlay {
            kind: ZoneKind::Setup,
            id: s.id.clone(),
            start_time: s.date,
            end_time: last_date,
            top_value: s.zone_upper,
            bottom_value: s.zone_lower,
        })
        .collect();
    zones.extend(analysis.fvgs.iter().map(|f| ZoneOverlay {
        kind: ZoneKind::Fvg,
        id: f.id.clone(),
        start_time: f.formation_date,
        end_time: last_date,
        top_value: f.upper_bound,
        bottom_value: f.lower_bound,
    }));

    let markers = analysis
        .signals
        .iter()
        .map(|s| EventMarker {
            time: s.signal_date,
            id: s.id.clone(),
            label: "B".to_string(),
        })
        .collect();

    ChartData {
        candles,
        sma200,
        ema200,
        weekly_sma200,
        zones,
        markers,
    }
}
