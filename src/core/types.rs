use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked wallet as persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub address: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Cached token balance for a wallet, superseded wholesale on each refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub owner_address: String,
    pub symbol: String,
    /// Human-readable amount, already scaled by the mint's decimals.
    pub amount: String,
    /// USD value as a display string.
    pub value: String,
    /// Unix millis at refresh time; entries are stale 10 minutes later.
    pub timestamp: i64,
}

/// One row of the token-symbol directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

/// Connection state for a monitored address.
///
/// `Connecting` covers the window between `open()` being invoked and the
/// first subscribe acknowledgement coming back over the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    Idle,
    Connecting,
    Monitoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Transfer,
    Unknown,
}

/// One leg of a resolved transfer: what moved and how much.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub symbol: String,
    pub amount: String,
}

/// A resolved wallet-activity notification. Ephemeral, ring-buffered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub wallet_address: String,
    pub kind: NotificationKind,
    pub from_address: String,
    pub to_address: String,
    pub from_token: Option<TokenAmount>,
    pub to_token: Option<TokenAmount>,
    pub timestamp: DateTime<Utc>,
}

/// Candle timeframes the dashboard tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M15,
    H4,
    H24,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::M15, Timeframe::H4, Timeframe::H24];

    /// Label used in display and alert signatures.
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H4 => "4h",
            Timeframe::H24 => "24h",
        }
    }

    /// Interval string the exchange klines endpoint expects.
    pub fn interval(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H4 => "4h",
            Timeframe::H24 => "1d",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Change/volume for the three most recent candles of one timeframe.
#[derive(Debug, Clone, PartialEq)]
pub struct KlineData {
    pub change: f64,
    pub volume: String,
    pub prev_change: f64,
    pub prev_volume: String,
    pub prev_prev_change: f64,
    pub prev_prev_volume: String,
}

/// Normalized per-symbol market snapshot.
#[derive(Debug, Clone)]
pub struct CoinData {
    pub symbol: String,
    pub name: String,
    pub price: String,
    pub klines: Vec<(Timeframe, KlineData)>,
}

/// Which candle pair a volume alert was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStage {
    /// Current candle vs previous.
    Current,
    /// Previous candle vs the one before it.
    Prev,
}

impl AlertStage {
    pub fn label(&self) -> &'static str {
        match self {
            AlertStage::Current => "current",
            AlertStage::Prev => "prev",
        }
    }
}

/// A volume-spike alert derived from consecutive candles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeAlert {
    pub id: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub stage: AlertStage,
    pub volume_change: f64,
    pub price_change: f64,
    pub timestamp: DateTime<Utc>,
}
