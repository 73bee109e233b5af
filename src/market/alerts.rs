/// Volume-spike alert derivation over consecutive candles

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::core::{AlertStage, CoinData, VolumeAlert};
use crate::util::format::parse_volume;

/// Derives alerts from a market snapshot and keeps the deduplicated,
/// capped ring buffer of the most recent ones, newest first.
pub struct AlertEvaluator {
    threshold_percent: f64,
    capacity: usize,
    alerts: Vec<VolumeAlert>,
}

impl AlertEvaluator {
    pub fn new(threshold_percent: f64, capacity: usize) -> Self {
        Self {
            threshold_percent,
            capacity,
            alerts: Vec::new(),
        }
    }

    pub fn alerts(&self) -> &[VolumeAlert] {
        &self.alerts
    }

    /// Folds a fresh snapshot into the buffer. Returns how many new alerts
    /// were raised.
    pub fn ingest(&mut self, snapshot: &[CoinData], now: DateTime<Utc>) -> usize {
        let fresh = evaluate(snapshot, &self.alerts, self.threshold_percent, now);
        let raised = fresh.len();
        if raised > 0 {
            for alert in &fresh {
                info!(
                    symbol = %alert.symbol,
                    timeframe = %alert.timeframe,
                    stage = alert.stage.label(),
                    volume_change = format!("{:.2}", alert.volume_change),
                    "Volume alert raised"
                );
            }
        }

        let mut merged = fresh;
        merged.append(&mut self.alerts);
        merged.truncate(self.capacity);
        self.alerts = merged;
        raised
    }
}

/// Exact-match dedup signature: symbol, timeframe, stage and the two deltas
/// rounded to two decimals.
fn signature(
    symbol: &str,
    timeframe: &str,
    stage: AlertStage,
    volume_change: f64,
    price_change: f64,
) -> String {
    format!(
        "{}|{}|{}|{:.2}|{:.2}",
        symbol,
        timeframe,
        stage.label(),
        volume_change,
        price_change
    )
}

/// Pure evaluation pass: per symbol and timeframe, compare the current
/// candle's volume against the previous and the previous against the one
/// before it; any increase above the threshold becomes an alert unless its
/// signature already exists in the batch or the current buffer.
pub fn evaluate(
    snapshot: &[CoinData],
    existing: &[VolumeAlert],
    threshold_percent: f64,
    now: DateTime<Utc>,
) -> Vec<VolumeAlert> {
    let mut seen: HashSet<String> = existing
        .iter()
        .map(|a| {
            signature(
                &a.symbol,
                a.timeframe.label(),
                a.stage,
                a.volume_change,
                a.price_change,
            )
        })
        .collect();

    let mut fresh = Vec::new();
    for coin in snapshot {
        for (timeframe, data) in &coin.klines {
            let pairs = [
                (AlertStage::Current, &data.volume, &data.prev_volume, data.change),
                (
                    AlertStage::Prev,
                    &data.prev_volume,
                    &data.prev_prev_volume,
                    data.prev_change,
                ),
            ];

            for (stage, current, previous, price_change) in pairs {
                let current_volume = parse_volume(current);
                let previous_volume = parse_volume(previous);
                if previous_volume <= 0.0 {
                    continue;
                }

                let volume_change = (current_volume - previous_volume) / previous_volume * 100.0;
                if volume_change <= threshold_percent {
                    continue;
                }

                let sig = signature(
                    &coin.symbol,
                    timeframe.label(),
                    stage,
                    volume_change,
                    price_change,
                );
                if !seen.insert(sig) {
                    continue;
                }

                fresh.push(VolumeAlert {
                    id: format!(
                        "{}-{}-{}-{}",
                        coin.symbol,
                        timeframe.label(),
                        stage.label(),
                        now.timestamp_millis()
                    ),
                    symbol: coin.symbol.clone(),
                    timeframe: *timeframe,
                    stage,
                    volume_change,
                    price_change,
                    timestamp: now,
                });
            }
        }
    }
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{KlineData, Timeframe};

    fn kline(volume: &str, prev_volume: &str, prev_prev_volume: &str) -> KlineData {
        KlineData {
            change: 1.5,
            volume: volume.to_string(),
            prev_change: -0.5,
            prev_volume: prev_volume.to_string(),
            prev_prev_change: 0.0,
            prev_prev_volume: prev_prev_volume.to_string(),
        }
    }

    fn snapshot(symbol: &str, data: KlineData) -> Vec<CoinData> {
        vec![CoinData {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            price: "100.00".to_string(),
            klines: vec![(Timeframe::M15, data)],
        }]
    }

    #[test]
    fn spike_above_threshold_raises_alert() {
        // 1.0K -> 1.6K is +60% on the current stage only.
        let snap = snapshot("BTC", kline("1.6K", "1.0K", "1.0K"));
        let fresh = evaluate(&snap, &[], 50.0, Utc::now());

        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].symbol, "BTC");
        assert_eq!(fresh[0].stage, AlertStage::Current);
        assert!((fresh[0].volume_change - 60.0).abs() < 1e-9);
        assert!((fresh[0].price_change - 1.5).abs() < 1e-9);
    }

    #[test]
    fn both_stages_are_checked() {
        // prev vs prev-prev is +100%, current vs prev is +60%.
        let snap = snapshot("SOL", kline("3.2K", "2.0K", "1.0K"));
        let fresh = evaluate(&snap, &[], 50.0, Utc::now());

        let stages: Vec<AlertStage> = fresh.iter().map(|a| a.stage).collect();
        assert_eq!(stages, vec![AlertStage::Current, AlertStage::Prev]);
    }

    #[test]
    fn decrease_never_alerts() {
        let snap = snapshot("ETH", kline("1.0K", "4.0K", "4.0K"));
        assert!(evaluate(&snap, &[], 50.0, Utc::now()).is_empty());
    }

    #[test]
    fn identical_tuples_dedup_across_runs() {
        let snap = snapshot("BTC", kline("1.6K", "1.0K", "1.0K"));
        let mut evaluator = AlertEvaluator::new(50.0, 5);

        assert_eq!(evaluator.ingest(&snap, Utc::now()), 1);
        // A second run over the same data produces the same signature and
        // must not duplicate the buffered alert.
        assert_eq!(evaluator.ingest(&snap, Utc::now()), 0);
        assert_eq!(evaluator.alerts().len(), 1);
    }

    #[test]
    fn buffer_keeps_five_newest() {
        let mut evaluator = AlertEvaluator::new(50.0, 5);
        for i in 0..8 {
            let symbol = format!("SYM{}", i);
            let snap = snapshot(&symbol, kline("1.6K", "1.0K", "1.0K"));
            evaluator.ingest(&snap, Utc::now());
        }

        assert_eq!(evaluator.alerts().len(), 5);
        // Newest first: the most recent symbol leads the buffer.
        assert_eq!(evaluator.alerts()[0].symbol, "SYM7");
        assert_eq!(evaluator.alerts()[4].symbol, "SYM3");
    }

    #[test]
    fn zero_previous_volume_is_skipped() {
        let snap = snapshot("NEW", kline("1.6K", "0.000", "0.000"));
        assert!(evaluate(&snap, &[], 50.0, Utc::now()).is_empty());
    }
}
