pub mod alerts;
pub mod client;

pub use alerts::AlertEvaluator;
pub use client::MarketDataClient;
