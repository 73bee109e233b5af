/// Token-list client backing the symbol directory

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::core::{ServiceError, TokenInfo};
use crate::store::WalletStore;

const API_TIMEOUT_SECS: u64 = 30;

/// One entry of the provider token list.
#[derive(Debug, Deserialize)]
struct TokenListEntry {
    address: String,
    symbol: String,
    name: String,
    decimals: u8,
}

/// Fetches the external token list used to label balance changes.
pub struct TokenListClient {
    client: Client,
    endpoint: String,
}

impl TokenListClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(API_TIMEOUT_SECS))
                .build()
                .expect("Failed to create token list HTTP client"),
            endpoint: endpoint.to_string(),
        }
    }

    pub async fn fetch(&self) -> Result<Vec<TokenInfo>, ServiceError> {
        let response = self.client.get(&self.endpoint).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::NetworkFailure(format!(
                "token list endpoint returned {}",
                response.status()
            )));
        }

        let entries: Vec<TokenListEntry> = response.json().await?;
        if entries.is_empty() {
            return Err(ServiceError::NoDataFound(
                "token list endpoint returned an empty list".to_string(),
            ));
        }

        Ok(entries
            .into_iter()
            .map(|entry| TokenInfo {
                mint: entry.address,
                symbol: entry.symbol,
                name: entry.name,
                decimals: entry.decimals,
            })
            .collect())
    }

    /// Refreshes the directory wholesale when the local copy is absent or
    /// older than the TTL. A failed fetch keeps the existing copy in place.
    pub async fn ensure_fresh(
        &self,
        store: &WalletStore,
        ttl_secs: i64,
    ) -> Result<(), ServiceError> {
        let now = Utc::now().timestamp_millis();
        if !store.directory_needs_refresh(now, ttl_secs)? {
            return Ok(());
        }

        match self.fetch().await {
            Ok(tokens) => {
                let count = tokens.len();
                store.replace_directory(&tokens, now)?;
                info!(tokens = count, "Token directory refreshed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Token directory refresh failed, keeping current copy");
                Err(e)
            }
        }
    }
}
