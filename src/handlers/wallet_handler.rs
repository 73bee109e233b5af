/// Wallet service facade
///
/// Ties the persistent store, the balance lookup API and the wallet monitor
/// together: add/remove/note operations, balance refresh and startup restore.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{RpcConfig, StoreConfig};
use crate::core::{validate_address, ServiceError, TokenBalance, WalletRecord};
use crate::monitor::WalletMonitor;
use crate::store::WalletStore;
use crate::util::format::{abbreviate_address, format_token_amount};

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;
const API_TIMEOUT_SECS: u64 = 30;

/// Raw per-address balances payload from the provider.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancesResponse {
    #[serde(default)]
    pub tokens: Vec<RawTokenBalance>,
    #[serde(default)]
    pub native_balance: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTokenBalance {
    #[serde(default)]
    pub mint: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub decimals: u32,
    #[serde(default)]
    pub value_usd: Option<f64>,
}

struct BalanceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl BalanceClient {
    fn new(config: &RpcConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(API_TIMEOUT_SECS))
                .build()
                .expect("Failed to create balances HTTP client"),
            base_url: config.balances_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    async fn fetch(&self, address: &str) -> Result<BalancesResponse, ServiceError> {
        let mut url = format!("{}/{}/balances", self.base_url, address);
        if let Some(key) = &self.api_key {
            url = format!("{}?api-key={}", url, key);
        }

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::NetworkFailure(format!(
                "balances endpoint returned {} for {}",
                response.status(),
                address
            )));
        }
        Ok(response.json().await?)
    }
}

/// Converts a raw balances payload into store rows: scaled amounts, symbols
/// labeled via the directory, zero-amount dust dropped.
pub fn balances_from_response(
    address: &str,
    response: &BalancesResponse,
    now_millis: i64,
    lookup: &(dyn Fn(&str) -> Option<String> + Sync),
) -> Vec<TokenBalance> {
    let mut rows = Vec::new();

    if response.native_balance > 0 {
        rows.push(TokenBalance {
            owner_address: address.to_string(),
            symbol: "SOL".to_string(),
            amount: format_token_amount(response.native_balance as f64 / LAMPORTS_PER_SOL),
            value: "0.00".to_string(),
            timestamp: now_millis,
        });
    }

    for token in &response.tokens {
        let scale = 10f64.powi(token.decimals as i32);
        let amount = token.amount / scale;
        if amount <= 0.0 {
            continue;
        }

        let symbol = lookup(&token.mint).unwrap_or_else(|| abbreviate_address(&token.mint));
        let value = token
            .value_usd
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "0.00".to_string());

        rows.push(TokenBalance {
            owner_address: address.to_string(),
            symbol,
            amount: format_token_amount(amount),
            value,
            timestamp: now_millis,
        });
    }

    rows
}

pub struct WalletService {
    store: WalletStore,
    monitor: Arc<WalletMonitor>,
    balances: BalanceClient,
    balance_ttl_secs: i64,
}

impl WalletService {
    pub fn new(
        store: WalletStore,
        monitor: Arc<WalletMonitor>,
        rpc: &RpcConfig,
        store_config: &StoreConfig,
    ) -> Self {
        Self {
            store,
            monitor,
            balances: BalanceClient::new(rpc),
            balance_ttl_secs: store_config.balance_ttl_secs,
        }
    }

    /// Validates, checks for duplicates, persists, then starts monitoring.
    /// A failed open leaves the wallet saved and idle; monitoring can be
    /// toggled on manually later.
    pub async fn add_wallet(&self, address: &str) -> Result<WalletRecord, ServiceError> {
        validate_address(address)?;
        if self.store.wallet_exists(address)? {
            return Err(ServiceError::DuplicateWallet(address.to_string()));
        }

        let record = WalletRecord {
            address: address.to_string(),
            note: None,
            created_at: Utc::now(),
        };
        self.store.upsert_wallet(&record)?;
        info!(address = %address, "Wallet added");

        if let Err(e) = self.monitor.open(address).await {
            warn!(address = %address, error = %e, "Monitoring not started for new wallet");
        }
        Ok(record)
    }

    /// Closes any open subscription, then deletes the wallet and its
    /// cached balances.
    pub async fn remove_wallet(&self, address: &str) -> Result<(), ServiceError> {
        self.monitor.close(address).await;
        self.store.delete_wallet(address)?;
        info!(address = %address, "Wallet removed");
        Ok(())
    }

    pub fn update_note(&self, address: &str, note: Option<&str>) -> Result<(), ServiceError> {
        self.store.update_note(address, note)
    }

    pub fn list_wallets(&self) -> Result<Vec<WalletRecord>, ServiceError> {
        self.store.list_wallets()
    }

    /// Cached balances still within the freshness window.
    pub fn cached_balances(&self, address: &str) -> Result<Vec<TokenBalance>, ServiceError> {
        self.store
            .fresh_balances(address, Utc::now().timestamp_millis(), self.balance_ttl_secs)
    }

    /// Fetches current token balances and replaces the cached set for the
    /// address transactionally.
    pub async fn refresh_balances(&self, address: &str) -> Result<Vec<TokenBalance>, ServiceError> {
        if !self.store.wallet_exists(address)? {
            return Err(ServiceError::NoDataFound(format!(
                "wallet {} is not tracked",
                address
            )));
        }

        let response = self.balances.fetch(address).await?;
        let store = self.store.clone();
        let lookup = move |mint: &str| store.token_by_mint(mint).ok().flatten().map(|t| t.symbol);
        let rows =
            balances_from_response(address, &response, Utc::now().timestamp_millis(), &lookup);

        self.store.replace_balances(address, &rows)?;
        info!(address = %address, tokens = rows.len(), "Token balances refreshed");
        Ok(rows)
    }

    pub async fn toggle_monitoring(&self, address: &str) -> Result<bool, ServiceError> {
        self.monitor.toggle(address).await
    }

    /// Startup restore: loads saved wallets and opens a subscription for
    /// each. Returns how many subscriptions came up.
    pub async fn restore(&self) -> Result<usize, ServiceError> {
        let wallets = self.store.list_wallets()?;
        let mut opened = 0;
        for wallet in &wallets {
            match self.monitor.open(&wallet.address).await {
                Ok(()) => opened += 1,
                Err(e) => {
                    warn!(address = %wallet.address, error = %e, "Could not restore monitoring")
                }
            }
        }
        info!(
            wallets = wallets.len(),
            opened = opened,
            "Saved wallets restored"
        );
        Ok(opened)
    }
}
