use thiserror::Error;

/// Error taxonomy shared by the store, market fetcher and wallet monitor.
///
/// User-facing surfaces reduce these to their short display messages; full
/// detail is logged at the point of failure only.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Address fails basic length/base58 validation. Rejected before any
    /// network call is made.
    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),

    /// HTTP or WebSocket transport failed.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The remote answered but the payload was empty or insufficient.
    #[error("no data found: {0}")]
    NoDataFound(String),

    /// Wallet is already tracked. Rejected before any network call is made.
    #[error("wallet already tracked: {0}")]
    DuplicateWallet(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::NetworkFailure(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ServiceError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ServiceError::NetworkFailure(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::NoDataFound(err.to_string())
    }
}

/// Basic address validation: length plus base58 alphabet. Runs before a
/// wallet is persisted or any network call is made.
pub fn validate_address(address: &str) -> Result<(), ServiceError> {
    if address.len() < 32 || address.len() > 44 {
        return Err(ServiceError::InvalidAddress(address.to_string()));
    }
    bs58::decode(address)
        .into_vec()
        .map_err(|_| ServiceError::InvalidAddress(address.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_addresses() {
        assert!(matches!(
            validate_address("abc"),
            Err(ServiceError::InvalidAddress(_))
        ));
    }

    #[test]
    fn rejects_non_base58() {
        // 0, O, I and l are outside the base58 alphabet.
        assert!(matches!(
            validate_address("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl"),
            Err(ServiceError::InvalidAddress(_))
        ));
    }

    #[test]
    fn accepts_wellformed_address() {
        assert!(validate_address("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v").is_ok());
    }
}
