/// Exchange REST client producing normalized per-symbol market snapshots

use std::time::Duration;

use futures_util::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::MarketConfig;
use crate::core::{CoinData, KlineData, ServiceError, Timeframe};
use crate::util::format::{format_volume, percent_change};

#[derive(Debug, Deserialize)]
struct TickerPrice {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

pub struct MarketDataClient {
    client: Client,
    base_url: String,
    quote_asset: String,
}

impl MarketDataClient {
    pub fn new(config: &MarketConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .expect("Failed to create market data HTTP client"),
            base_url: config.base_url.clone(),
            quote_asset: config.quote_asset.clone(),
        }
    }

    /// Fetches price plus three-candle kline data per timeframe for one symbol.
    pub async fn fetch_symbol(&self, symbol: &str) -> Result<CoinData, ServiceError> {
        let pair = format!("{}{}", symbol, self.quote_asset);
        let price = self.fetch_price(&pair).await?;

        let mut klines = Vec::with_capacity(Timeframe::ALL.len());
        for timeframe in Timeframe::ALL {
            klines.push((timeframe, self.fetch_klines(&pair, timeframe).await?));
        }

        Ok(CoinData {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            price,
            klines,
        })
    }

    /// Best-effort refresh across all configured symbols: failures are
    /// isolated per symbol and the whole refresh fails only when nothing
    /// succeeded.
    pub async fn fetch_all(&self, symbols: &[String]) -> Result<Vec<CoinData>, ServiceError> {
        let results = join_all(symbols.iter().map(|symbol| self.fetch_symbol(symbol))).await;
        let labeled = symbols.iter().cloned().zip(results).collect();
        collect_successes(labeled)
    }

    async fn fetch_price(&self, pair: &str) -> Result<String, ServiceError> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, pair);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::NetworkFailure(format!(
                "price endpoint returned {} for {}",
                response.status(),
                pair
            )));
        }

        let ticker: TickerPrice = response.json().await?;
        let price: f64 = ticker
            .price
            .parse()
            .map_err(|_| ServiceError::NoDataFound(format!("unparseable price for {}", pair)))?;
        Ok(format!("{:.2}", price))
    }

    async fn fetch_klines(
        &self,
        pair: &str,
        timeframe: Timeframe,
    ) -> Result<KlineData, ServiceError> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit=3",
            self.base_url,
            pair,
            timeframe.interval()
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::NetworkFailure(format!(
                "klines endpoint returned {} for {} {}",
                response.status(),
                pair,
                timeframe
            )));
        }

        let rows: Vec<Vec<Value>> = response.json().await?;
        debug!(pair = %pair, timeframe = %timeframe, candles = rows.len(), "Fetched klines");
        kline_from_rows(&rows)
            .ok_or_else(|| ServiceError::NoDataFound(format!("insufficient candles for {} {}", pair, timeframe)))
    }
}

/// Builds [`KlineData`] from raw exchange kline rows (oldest first; open at
/// index 1, close at 4, volume at 5). Needs the three most recent candles.
pub fn kline_from_rows(rows: &[Vec<Value>]) -> Option<KlineData> {
    if rows.len() < 3 {
        return None;
    }
    let candles: Vec<(f64, String)> = rows[rows.len() - 3..]
        .iter()
        .map(|row| {
            let open = number_at(row, 1)?;
            let close = number_at(row, 4)?;
            let volume = number_at(row, 5)?;
            Some((percent_change(open, close), format_volume(volume)))
        })
        .collect::<Option<Vec<_>>>()?;

    let (prev_prev, prev, current) = (&candles[0], &candles[1], &candles[2]);
    Some(KlineData {
        change: current.0,
        volume: current.1.clone(),
        prev_change: prev.0,
        prev_volume: prev.1.clone(),
        prev_prev_change: prev_prev.0,
        prev_prev_volume: prev_prev.1.clone(),
    })
}

/// Exchange kline rows carry numbers as strings; tolerate both shapes.
fn number_at(row: &[Value], index: usize) -> Option<f64> {
    let value = row.get(index)?;
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| value.as_f64())
}

/// The best-effort join: keep every success, log and drop every failure,
/// error out only when nothing survived.
pub fn collect_successes(
    results: Vec<(String, Result<CoinData, ServiceError>)>,
) -> Result<Vec<CoinData>, ServiceError> {
    let mut data = Vec::new();
    for (symbol, result) in results {
        match result {
            Ok(coin) => data.push(coin),
            Err(e) => warn!(symbol = %symbol, error = %e, "Symbol fetch failed, dropping from batch"),
        }
    }
    if data.is_empty() {
        return Err(ServiceError::NoDataFound(
            "no symbol data could be fetched".to_string(),
        ));
    }
    Ok(data)
}
