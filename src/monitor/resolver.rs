/// Resolution of account-change events into transfer notifications

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RpcConfig;
use crate::core::{Notification, NotificationKind, ServiceError, TokenAmount};
use crate::monitor::signatures::SignatureCache;
use crate::monitor::socket::JsonRpcRequest;
use crate::util::format::{abbreviate_address, format_token_amount};

/// Known swap-router program ids. A transaction touching either one is a
/// two-leg swap whose balance deltas span two transactions.
pub const SWAP_ROUTER_PROGRAM_IDS: [&str; 2] = [
    "JUP4Fb2cqiRUcaTHdrPC8h2gNsA2ETXiPDD33WcGuJB",
    "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
];

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;
const API_TIMEOUT_SECS: u64 = 30;

/// Parsed transaction detail from the transactions-lookup endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetail {
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub instructions: Vec<InstructionInfo>,
    #[serde(default)]
    pub account_data: Vec<AccountData>,
    #[serde(default)]
    pub source_address: Option<String>,
    #[serde(default)]
    pub destination_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionInfo {
    #[serde(default)]
    pub program_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    #[serde(default)]
    pub account: String,
    /// Lamport delta for the account; negative means SOL left it.
    #[serde(default)]
    pub native_balance_change: i64,
    #[serde(default)]
    pub token_balance_changes: Vec<TokenBalanceChange>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalanceChange {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub mint: String,
    pub raw_token_amount: RawTokenAmount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTokenAmount {
    /// Signed decimal string in raw units.
    pub token_amount: String,
    #[serde(default)]
    pub decimals: Option<u32>,
}

/// Classification outcome of the first resolved transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferClass {
    /// Plain transfer; one transaction tells the whole story.
    Direct,
    /// Swap-router leg; the follow-up transaction completes the picture.
    SwapLeg,
}

/// First pipeline stage: does the transaction touch a known swap router?
pub fn classify(detail: &TransactionDetail) -> TransferClass {
    let is_swap = detail
        .instructions
        .iter()
        .any(|instruction| SWAP_ROUTER_PROGRAM_IDS.contains(&instruction.program_id.as_str()));
    if is_swap {
        TransferClass::SwapLeg
    } else {
        TransferClass::Direct
    }
}

/// What a set of transaction details amounts to, once the balance deltas
/// have been walked.
#[derive(Debug, Clone)]
pub struct TransferSummary {
    pub kind: NotificationKind,
    pub from_address: String,
    pub to_address: String,
    pub from_token: Option<TokenAmount>,
    pub to_token: Option<TokenAmount>,
}

/// Second pipeline stage: walk every account's token-balance changes
/// (negative raw delta ⇒ sender token, positive ⇒ receiver token) and
/// native lamport deltas (negative ⇒ SOL sent, positive ⇒ SOL received).
/// The first hit on each side wins. When nothing parses the summary is
/// kept with kind `unknown` rather than suppressed.
pub fn derive_transfer(
    details: &[TransactionDetail],
    lookup: &(dyn Fn(&str) -> Option<String> + Sync),
) -> TransferSummary {
    let mut from_token: Option<TokenAmount> = None;
    let mut to_token: Option<TokenAmount> = None;

    for detail in details {
        for account in &detail.account_data {
            for change in &account.token_balance_changes {
                let raw: f64 = change
                    .raw_token_amount
                    .token_amount
                    .parse()
                    .unwrap_or(0.0);
                if raw == 0.0 {
                    continue;
                }

                let scale = 10f64.powi(change.raw_token_amount.decimals.unwrap_or(0) as i32);
                let amount = (raw / scale).abs();
                let symbol = change
                    .symbol
                    .clone()
                    .filter(|s| !s.is_empty())
                    .or_else(|| lookup(&change.mint))
                    .unwrap_or_else(|| abbreviate_address(&change.mint));
                let token = TokenAmount {
                    symbol,
                    amount: format_token_amount(amount),
                };

                if raw < 0.0 {
                    from_token.get_or_insert(token);
                } else {
                    to_token.get_or_insert(token);
                }
            }

            let lamports = account.native_balance_change;
            if lamports != 0 {
                let token = TokenAmount {
                    symbol: "SOL".to_string(),
                    amount: format_token_amount(lamports.abs() as f64 / LAMPORTS_PER_SOL),
                };
                if lamports < 0 {
                    from_token.get_or_insert(token);
                } else {
                    to_token.get_or_insert(token);
                }
            }
        }
    }

    let first = details.first();
    let from_address = first
        .and_then(|d| d.source_address.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let to_address = first
        .and_then(|d| d.destination_address.clone())
        .unwrap_or_else(|| "Unknown".to_string());

    let kind = if from_token.is_some() || to_token.is_some() {
        NotificationKind::Transfer
    } else {
        NotificationKind::Unknown
    };

    TransferSummary {
        kind,
        from_address,
        to_address,
        from_token,
        to_token,
    }
}

/// HTTP side of the pipeline: signature queries against the JSON-RPC
/// endpoint plus the transactions-lookup endpoint.
pub struct TransferResolver {
    client: Client,
    rpc_url: String,
    transactions_url: String,
    api_key: Option<String>,
}

impl TransferResolver {
    pub fn new(config: &RpcConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(API_TIMEOUT_SECS))
                .build()
                .expect("Failed to create resolver HTTP client"),
            rpc_url: config.rpc_url.clone(),
            transactions_url: config.transactions_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Most recent transaction signatures for an address, newest first.
    pub async fn latest_signatures(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<String>, ServiceError> {
        let request = JsonRpcRequest::signatures_for_address(address, limit);
        let response = self.client.post(&self.rpc_url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::NetworkFailure(format!(
                "signature query returned {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        let signatures: Vec<String> = body["result"]
            .as_array()
            .ok_or_else(|| {
                ServiceError::NoDataFound(format!("signature query for {} had no result", address))
            })?
            .iter()
            .filter_map(|entry| entry["signature"].as_str().map(String::from))
            .collect();

        if signatures.is_empty() {
            return Err(ServiceError::NoDataFound(format!(
                "no recent signatures for {}",
                address
            )));
        }
        Ok(signatures)
    }

    /// Full parsed details for a batch of signatures.
    pub async fn transaction_details(
        &self,
        signatures: &[String],
    ) -> Result<Vec<TransactionDetail>, ServiceError> {
        let url = match &self.api_key {
            Some(key) => format!("{}?api-key={}", self.transactions_url, key),
            None => self.transactions_url.clone(),
        };
        let body = serde_json::json!({ "transactions": signatures });

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::NetworkFailure(format!(
                "transaction lookup returned {}",
                response.status()
            )));
        }

        let details: Vec<TransactionDetail> = response.json().await?;
        if details.is_empty() {
            return Err(ServiceError::NoDataFound(
                "transaction lookup returned nothing".to_string(),
            ));
        }
        Ok(details)
    }

    /// Turns one account-change push into at most one notification.
    ///
    /// Returns `Ok(None)` when the underlying signature was already
    /// processed — the dedup gate against repeated pushes for the same
    /// change.
    pub async fn resolve(
        &self,
        address: &str,
        cache: &SignatureCache,
        lookup: &(dyn Fn(&str) -> Option<String> + Sync),
    ) -> Result<Option<Notification>, ServiceError> {
        let signatures = self.latest_signatures(address, 1).await?;
        let signature = signatures[0].clone();

        if !cache.insert(&signature) {
            debug!(address = %address, signature = %signature, "Signature already processed");
            return Ok(None);
        }

        let mut details = self
            .transaction_details(std::slice::from_ref(&signature))
            .await?;

        if classify(&details[0]) == TransferClass::SwapLeg {
            // Swap legs settle across two transactions; pull the follow-up
            // signature and merge its deltas before deriving the summary.
            match self.latest_signatures(address, 2).await {
                Ok(recent) => {
                    if let Some(next) = recent.iter().find(|s| **s != signature) {
                        match self.transaction_details(std::slice::from_ref(next)).await {
                            Ok(more) => details.extend(more),
                            Err(e) => {
                                warn!(address = %address, error = %e, "Swap follow-up lookup failed")
                            }
                        }
                    }
                }
                Err(e) => warn!(address = %address, error = %e, "Swap follow-up query failed"),
            }
        }

        let summary = derive_transfer(&details, lookup);
        Ok(Some(Notification {
            id: signature,
            wallet_address: address.to_string(),
            kind: summary.kind,
            from_address: summary.from_address,
            to_address: summary.to_address,
            from_token: summary.from_token,
            to_token: summary.to_token,
            timestamp: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail_from_json(json: serde_json::Value) -> TransactionDetail {
        serde_json::from_value(json).unwrap()
    }

    fn no_lookup(_mint: &str) -> Option<String> {
        None
    }

    #[test]
    fn direct_transfer_splits_sender_and_receiver() {
        let detail = detail_from_json(serde_json::json!({
            "signature": "sig-1",
            "instructions": [{ "programId": "11111111111111111111111111111111" }],
            "sourceAddress": "sender-wallet",
            "destinationAddress": "receiver-wallet",
            "accountData": [
                {
                    "account": "sender-wallet",
                    "nativeBalanceChange": -5000,
                    "tokenBalanceChanges": [{
                        "mint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                        "symbol": "USDC",
                        "rawTokenAmount": { "tokenAmount": "-2500000", "decimals": 6 }
                    }]
                },
                {
                    "account": "receiver-wallet",
                    "nativeBalanceChange": 0,
                    "tokenBalanceChanges": [{
                        "mint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                        "symbol": "USDC",
                        "rawTokenAmount": { "tokenAmount": "2500000", "decimals": 6 }
                    }]
                }
            ]
        }));

        assert_eq!(classify(&detail), TransferClass::Direct);

        let summary = derive_transfer(&[detail], &no_lookup);
        assert_eq!(summary.kind, NotificationKind::Transfer);
        assert_eq!(summary.from_address, "sender-wallet");
        assert_eq!(summary.to_address, "receiver-wallet");

        let from = summary.from_token.unwrap();
        assert_eq!(from.symbol, "USDC");
        assert_eq!(from.amount, "2.50");
        let to = summary.to_token.unwrap();
        assert_eq!(to.symbol, "USDC");
    }

    #[test]
    fn native_sol_transfer() {
        let detail = detail_from_json(serde_json::json!({
            "accountData": [
                { "account": "a", "nativeBalanceChange": -1500000000_i64, "tokenBalanceChanges": [] },
                { "account": "b", "nativeBalanceChange": 1500000000_i64, "tokenBalanceChanges": [] }
            ]
        }));

        let summary = derive_transfer(&[detail], &no_lookup);
        let from = summary.from_token.unwrap();
        assert_eq!(from.symbol, "SOL");
        assert_eq!(from.amount, "1.50");
        assert_eq!(summary.to_token.unwrap().symbol, "SOL");
    }

    #[test]
    fn tiny_amounts_keep_nine_decimals() {
        let detail = detail_from_json(serde_json::json!({
            "accountData": [{
                "account": "a",
                "nativeBalanceChange": -500000_i64,
                "tokenBalanceChanges": []
            }]
        }));

        let summary = derive_transfer(&[detail], &no_lookup);
        assert_eq!(summary.from_token.unwrap().amount, "0.000500000");
    }

    #[test]
    fn swap_router_id_flags_swap_leg() {
        for router in SWAP_ROUTER_PROGRAM_IDS {
            let detail = detail_from_json(serde_json::json!({
                "instructions": [
                    { "programId": "ComputeBudget111111111111111111111111111111" },
                    { "programId": router }
                ],
                "accountData": []
            }));
            assert_eq!(classify(&detail), TransferClass::SwapLeg);
        }
    }

    #[test]
    fn swap_legs_merge_across_transactions() {
        let sell_leg = detail_from_json(serde_json::json!({
            "accountData": [{
                "account": "trader",
                "nativeBalanceChange": 0,
                "tokenBalanceChanges": [{
                    "mint": "So11111111111111111111111111111111111111112",
                    "symbol": "SOL",
                    "rawTokenAmount": { "tokenAmount": "-2000000000", "decimals": 9 }
                }]
            }]
        }));
        let buy_leg = detail_from_json(serde_json::json!({
            "accountData": [{
                "account": "trader",
                "nativeBalanceChange": 0,
                "tokenBalanceChanges": [{
                    "mint": "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN",
                    "symbol": "JUP",
                    "rawTokenAmount": { "tokenAmount": "150000000", "decimals": 6 }
                }]
            }]
        }));

        let summary = derive_transfer(&[sell_leg, buy_leg], &no_lookup);
        assert_eq!(summary.from_token.unwrap().symbol, "SOL");
        let to = summary.to_token.unwrap();
        assert_eq!(to.symbol, "JUP");
        assert_eq!(to.amount, "150.00");
    }

    #[test]
    fn directory_labels_unnamed_mints() {
        let detail = detail_from_json(serde_json::json!({
            "accountData": [{
                "account": "a",
                "nativeBalanceChange": 0,
                "tokenBalanceChanges": [{
                    "mint": "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263",
                    "rawTokenAmount": { "tokenAmount": "-100000", "decimals": 5 }
                }]
            }]
        }));

        let lookup = |mint: &str| {
            (mint == "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263").then(|| "BONK".to_string())
        };
        let summary = derive_transfer(&[detail], &lookup);
        assert_eq!(summary.from_token.unwrap().symbol, "BONK");
    }

    #[test]
    fn empty_deltas_become_unknown_notification() {
        let detail = detail_from_json(serde_json::json!({
            "signature": "sig-x",
            "accountData": []
        }));

        let summary = derive_transfer(&[detail], &no_lookup);
        assert_eq!(summary.kind, NotificationKind::Unknown);
        assert!(summary.from_token.is_none());
        assert!(summary.to_token.is_none());
        assert_eq!(summary.from_address, "Unknown");
    }
}
