/// Service configuration structures

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub rpc: RpcConfig,
    pub market: MarketConfig,
    pub monitor: MonitorConfig,
    pub store: StoreConfig,
}

/// Endpoints of the RPC/WebSocket provider and its enrichment APIs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// WebSocket endpoint used for account subscriptions.
    pub websocket_url: String,
    /// HTTP JSON-RPC endpoint used for signature queries.
    pub rpc_url: String,
    /// Transactions-lookup endpoint resolving signatures to parsed details.
    pub transactions_url: String,
    /// Base URL for per-address token balance lookups.
    pub balances_url: String,
    /// Token-list endpoint backing the symbol directory.
    pub token_list_url: String,
    /// Provider API key, appended as a query parameter when present.
    pub api_key: Option<String>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            websocket_url: "wss://api.mainnet-beta.solana.com/".to_string(),
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            transactions_url: "https://api.helius.xyz/v0/transactions".to_string(),
            balances_url: "https://api.helius.xyz/v0/addresses".to_string(),
            token_list_url: "https://token.jup.ag/strict".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Exchange REST base URL.
    pub base_url: String,
    /// Quote asset appended to each symbol for exchange requests.
    pub quote_asset: String,
    /// Symbols to poll each refresh cycle.
    pub symbols: Vec<String>,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Volume increase (percent) between consecutive candles that raises an alert.
    pub volume_alert_threshold_percent: f64,
    /// Alert ring buffer size, newest first.
    pub max_alerts: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            quote_asset: "USDT".to_string(),
            symbols: [
                "BTC", "ETH", "SOL", "DOGE", "SUI", "BONK", "UNI", "APT", "NEAR", "ATOM",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            poll_interval_secs: 300,
            request_timeout_secs: 15,
            volume_alert_threshold_percent: 50.0,
            max_alerts: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Hard cap on how long one subscription stays open before it is
    /// force-closed.
    pub monitoring_timeout_secs: u64,
    pub connect_timeout_ms: u64,
    /// Bounded set of already-processed transaction signatures.
    pub max_processed_signatures: usize,
    /// Notification ring buffer size, newest first.
    pub max_notifications: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            monitoring_timeout_secs: 4 * 60 * 60,
            connect_timeout_ms: 30_000,
            max_processed_signatures: 100,
            max_notifications: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: String,
    /// Token balances are treated as stale this long after their refresh.
    pub balance_ttl_secs: i64,
    /// The symbol directory is refreshed wholesale once it is older than this.
    pub directory_ttl_secs: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: "data/meerkat.db".to_string(),
            balance_ttl_secs: 10 * 60,
            directory_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads the config file when present, otherwise falls back to defaults.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Config not loaded, using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_section() {
        let config = Config::default();
        assert_eq!(config.monitor.monitoring_timeout_secs, 14_400);
        assert_eq!(config.monitor.max_processed_signatures, 100);
        assert_eq!(config.market.symbols.len(), 10);
        assert_eq!(config.market.max_alerts, 5);
        assert_eq!(config.store.balance_ttl_secs, 600);
    }

    #[test]
    fn partial_toml_merges_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [market]
            symbols = ["BTC", "ETH"]
            poll_interval_secs = 60

            [rpc]
            websocket_url = "wss://example.test/"
            "#,
        )
        .unwrap();

        assert_eq!(config.market.symbols, vec!["BTC", "ETH"]);
        assert_eq!(config.market.poll_interval_secs, 60);
        assert_eq!(config.rpc.websocket_url, "wss://example.test/");
        // Untouched sections keep their defaults.
        assert_eq!(config.monitor.max_notifications, 10);
        assert_eq!(config.market.quote_asset, "USDT");
    }
}
