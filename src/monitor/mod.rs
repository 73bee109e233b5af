pub mod notifications;
pub mod resolver;
pub mod signatures;
pub mod socket;

pub use notifications::NotificationLog;
pub use resolver::{TransferResolver, SWAP_ROUTER_PROGRAM_IDS};
pub use signatures::SignatureCache;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{MonitorConfig, RpcConfig};
use crate::core::{MonitorStatus, Notification, ServiceError};
use crate::monitor::socket::{classify_message, InboundMessage, JsonRpcRequest};
use crate::store::WalletStore;

/// Per-address registry of live connection tasks and their statuses.
///
/// The connection task, its 4-hour deadline and the socket all live inside
/// one tokio task, so removing the handle tears all of them down together —
/// no timer can outlive its connection.
pub struct ConnectionRegistry {
    connections: DashMap<String, JoinHandle<()>>,
    statuses: DashMap<String, MonitorStatus>,
}

impl ConnectionRegistry {
    fn new() -> Self {
        Self {
            connections: DashMap::new(),
            statuses: DashMap::new(),
        }
    }

    pub fn has(&self, address: &str) -> bool {
        self.connections.contains_key(address)
    }

    pub fn status(&self, address: &str) -> MonitorStatus {
        self.statuses
            .get(address)
            .map(|entry| *entry)
            .unwrap_or(MonitorStatus::Idle)
    }

    pub fn status_map(&self) -> HashMap<String, MonitorStatus> {
        self.statuses
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn monitoring_count(&self) -> usize {
        self.statuses
            .iter()
            .filter(|entry| *entry.value() == MonitorStatus::Monitoring)
            .count()
    }

    fn set_status(&self, address: &str, status: MonitorStatus) {
        self.statuses.insert(address.to_string(), status);
    }

    /// Marks a connection gone: handle dropped, status back to idle.
    fn finish(&self, address: &str) {
        self.connections.remove(address);
        self.set_status(address, MonitorStatus::Idle);
    }
}

/// State shared by every connection task.
struct MonitorContext {
    registry: ConnectionRegistry,
    signatures: SignatureCache,
    log: NotificationLog,
    resolver: TransferResolver,
    store: WalletStore,
}

/// Maintains one account subscription per monitored wallet address and
/// turns raw account-change pushes into structured, deduplicated transfer
/// notifications.
pub struct WalletMonitor {
    websocket_url: String,
    connect_timeout: Duration,
    monitoring_timeout: Duration,
    ctx: Arc<MonitorContext>,
    /// Pending-toggle guard keyed by address: duplicate toggle requests are
    /// ignored while one is in flight.
    pending: DashMap<String, ()>,
}

impl WalletMonitor {
    pub fn new(rpc: &RpcConfig, config: &MonitorConfig, store: WalletStore) -> Self {
        Self {
            websocket_url: rpc.websocket_url.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            monitoring_timeout: Duration::from_secs(config.monitoring_timeout_secs),
            ctx: Arc::new(MonitorContext {
                registry: ConnectionRegistry::new(),
                signatures: SignatureCache::new(config.max_processed_signatures),
                log: NotificationLog::new(config.max_notifications),
                resolver: TransferResolver::new(rpc),
                store,
            }),
            pending: DashMap::new(),
        }
    }

    /// Opens a subscription for the address. Idempotent: while a connection
    /// for the address is pending or live, another call is a no-op.
    ///
    /// Network failures reject the attempt and leave the address idle; the
    /// caller may retry manually. There is no automatic reconnect.
    pub async fn open(&self, address: &str) -> Result<(), ServiceError> {
        {
            let mut status = self
                .ctx
                .registry
                .statuses
                .entry(address.to_string())
                .or_insert(MonitorStatus::Idle);
            if *status != MonitorStatus::Idle {
                debug!(address = %address, "Connection already open or pending");
                return Ok(());
            }
            *status = MonitorStatus::Connecting;
        }

        match self.connect_and_subscribe(address).await {
            Ok(task) => {
                self.ctx
                    .registry
                    .connections
                    .insert(address.to_string(), task);
                Ok(())
            }
            Err(e) => {
                self.ctx.registry.set_status(address, MonitorStatus::Idle);
                error!(address = %address, error = %e, "Failed to open subscription");
                Err(e)
            }
        }
    }

    async fn connect_and_subscribe(&self, address: &str) -> Result<JoinHandle<()>, ServiceError> {
        let url = Url::parse(&self.websocket_url)
            .map_err(|e| ServiceError::NetworkFailure(format!("bad websocket url: {}", e)))?;

        let (ws_stream, response) = timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ServiceError::NetworkFailure("connection timeout".to_string()))??;
        info!(address = %address, status = %response.status(), "WebSocket connected");

        let (mut sink, stream) = ws_stream.split();

        let subscribe = JsonRpcRequest::account_subscribe(address);
        let payload = serde_json::to_string(&subscribe)
            .map_err(|e| ServiceError::NetworkFailure(format!("subscribe encoding: {}", e)))?;
        sink.send(Message::Text(payload)).await?;
        debug!(address = %address, "Subscribe request sent");

        Ok(tokio::spawn(run_connection(
            address.to_string(),
            stream,
            sink,
            self.monitoring_timeout,
            self.ctx.clone(),
        )))
    }

    /// Closes the subscription: aborts the connection task (which owns the
    /// socket and the monitoring deadline) and resets status. No-op when
    /// the address is not open.
    pub async fn close(&self, address: &str) {
        if let Some((_, task)) = self.ctx.registry.connections.remove(address) {
            task.abort();
            self.ctx.registry.set_status(address, MonitorStatus::Idle);
            info!(address = %address, "Monitoring stopped");
        } else {
            self.ctx.registry.set_status(address, MonitorStatus::Idle);
        }
    }

    /// Close if open, open otherwise. Returns whether the address is
    /// monitored after the toggle. Concurrent toggles for the same address
    /// are ignored while one is in flight.
    pub async fn toggle(&self, address: &str) -> Result<bool, ServiceError> {
        if self.pending.insert(address.to_string(), ()).is_some() {
            debug!(address = %address, "Toggle already in flight, ignoring");
            return Ok(self.status(address) == MonitorStatus::Monitoring);
        }

        let result = if self.ctx.registry.has(address) {
            self.close(address).await;
            Ok(false)
        } else {
            self.open(address).await.map(|_| true)
        };

        self.pending.remove(address);
        result
    }

    pub fn status(&self, address: &str) -> MonitorStatus {
        self.ctx.registry.status(address)
    }

    pub fn status_map(&self) -> HashMap<String, MonitorStatus> {
        self.ctx.registry.status_map()
    }

    pub fn monitoring_count(&self) -> usize {
        self.ctx.registry.monitoring_count()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.ctx.log.snapshot()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Notification> {
        self.ctx.log.subscribe()
    }

    /// Tears down every open connection and timer. Used on shutdown so no
    /// socket or deadline outlives the service.
    pub async fn shutdown(&self) {
        let addresses: Vec<String> = self
            .ctx
            .registry
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for address in &addresses {
            self.close(address).await;
        }
        info!(connections = addresses.len(), "Wallet monitor shut down");
    }
}

/// One connection's lifetime: reads socket messages until the remote closes,
/// an error occurs, or the monitoring deadline fires. Generic over the
/// socket halves so the lifecycle is testable without a network.
async fn run_connection<S, K>(
    address: String,
    mut stream: S,
    mut sink: K,
    monitoring_timeout: Duration,
    ctx: Arc<MonitorContext>,
) where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    K: Sink<Message> + Unpin,
{
    let deadline = sleep(monitoring_timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!(address = %address, "Monitoring time limit reached, closing connection");
                let _ = sink.close().await;
                break;
            }
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        handle_message(&address, &text, &ctx).await;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(address = %address, frame = ?frame, "Connection closed by remote");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(address = %address, error = %e, "Socket receive error");
                        break;
                    }
                    None => {
                        info!(address = %address, "Socket stream ended");
                        break;
                    }
                }
            }
        }
    }

    ctx.registry.finish(&address);
}

/// Handles one inbound text frame. Malformed or unexpected shapes are
/// logged and dropped; they never take the connection down.
async fn handle_message(address: &str, text: &str, ctx: &MonitorContext) {
    match classify_message(text) {
        Err(e) => {
            warn!(address = %address, error = %e, "Dropping malformed socket message");
        }
        Ok(InboundMessage::SubscribeAck) => {
            if ctx.registry.status(address) == MonitorStatus::Connecting {
                ctx.registry.set_status(address, MonitorStatus::Monitoring);
                info!(address = %address, "Subscription acknowledged, monitoring live");
            }
        }
        Ok(InboundMessage::RpcError(detail)) => {
            warn!(address = %address, detail = %detail, "RPC error on subscription socket");
        }
        Ok(InboundMessage::Other) => {}
        Ok(InboundMessage::AccountChange) => {
            debug!(address = %address, "Account change received");
            let store = ctx.store.clone();
            let lookup =
                move |mint: &str| store.token_by_mint(mint).ok().flatten().map(|t| t.symbol);

            match ctx.resolver.resolve(address, &ctx.signatures, &lookup).await {
                Ok(Some(notification)) => {
                    // The resolution awaited network calls; if the connection
                    // was closed meanwhile, this result no longer has an owner.
                    if ctx.registry.status(address) == MonitorStatus::Idle {
                        debug!(address = %address, "Connection closed mid-resolution, dropping result");
                        return;
                    }
                    info!(
                        address = %address,
                        id = %notification.id,
                        kind = ?notification.kind,
                        "Wallet activity notification"
                    );
                    ctx.log.push(notification);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(address = %address, error = %e, "Account change resolution failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{sink, stream};

    fn test_monitor(dir: &tempfile::TempDir) -> WalletMonitor {
        let path = dir.path().join("monitor.db");
        let store = WalletStore::new(path.to_str().unwrap()).unwrap();
        WalletMonitor::new(&RpcConfig::default(), &MonitorConfig::default(), store)
    }

    fn pending_socket() -> (
        impl Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
        impl Sink<Message> + Unpin,
    ) {
        (
            stream::pending::<Result<Message, tokio_tungstenite::tungstenite::Error>>(),
            sink::drain::<Message>(),
        )
    }

    #[tokio::test]
    async fn open_is_noop_while_pending() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = test_monitor(&dir);

        // First open still connecting: a second open must return without
        // dialing out (the endpoint is unreachable from tests, so an actual
        // dial would fail instead of returning Ok).
        monitor
            .ctx
            .registry
            .set_status("addr", MonitorStatus::Connecting);
        monitor.open("addr").await.unwrap();
        assert_eq!(monitor.status("addr"), MonitorStatus::Connecting);
    }

    #[tokio::test]
    async fn open_is_noop_while_live() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = test_monitor(&dir);

        let (stream, sink) = pending_socket();
        let task = tokio::spawn(run_connection(
            "addr".to_string(),
            stream,
            sink,
            Duration::from_secs(3600),
            monitor.ctx.clone(),
        ));
        monitor
            .ctx
            .registry
            .connections
            .insert("addr".to_string(), task);
        monitor
            .ctx
            .registry
            .set_status("addr", MonitorStatus::Monitoring);

        monitor.open("addr").await.unwrap();
        assert_eq!(monitor.ctx.registry.connections.len(), 1);
        assert_eq!(monitor.status("addr"), MonitorStatus::Monitoring);

        monitor.close("addr").await;
    }

    #[tokio::test]
    async fn close_is_noop_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = test_monitor(&dir);

        monitor.close("never-opened").await;
        assert_eq!(monitor.status("never-opened"), MonitorStatus::Idle);
    }

    #[tokio::test]
    async fn close_tears_down_live_connection() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = test_monitor(&dir);

        let (stream, sink) = pending_socket();
        let task = tokio::spawn(run_connection(
            "addr".to_string(),
            stream,
            sink,
            Duration::from_secs(3600),
            monitor.ctx.clone(),
        ));
        monitor
            .ctx
            .registry
            .connections
            .insert("addr".to_string(), task);
        monitor
            .ctx
            .registry
            .set_status("addr", MonitorStatus::Monitoring);

        monitor.close("addr").await;
        assert!(!monitor.ctx.registry.has("addr"));
        assert_eq!(monitor.status("addr"), MonitorStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn monitoring_deadline_forces_close() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = test_monitor(&dir);

        let (stream, sink) = pending_socket();
        let task = tokio::spawn(run_connection(
            "addr".to_string(),
            stream,
            sink,
            Duration::from_secs(4 * 60 * 60),
            monitor.ctx.clone(),
        ));
        monitor
            .ctx
            .registry
            .connections
            .insert("addr".to_string(), task);
        monitor
            .ctx
            .registry
            .set_status("addr", MonitorStatus::Monitoring);

        // Paused-clock sleep auto-advances past the 4-hour deadline.
        tokio::time::sleep(Duration::from_secs(4 * 60 * 60 + 60)).await;
        for _ in 0..50 {
            if !monitor.ctx.registry.has("addr") {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(!monitor.ctx.registry.has("addr"));
        assert_eq!(monitor.status("addr"), MonitorStatus::Idle);
    }

    #[tokio::test]
    async fn ack_flips_connecting_to_monitoring() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = test_monitor(&dir);
        monitor
            .ctx
            .registry
            .set_status("addr", MonitorStatus::Connecting);

        handle_message("addr", r#"{"jsonrpc":"2.0","id":1,"result":42}"#, &monitor.ctx).await;
        assert_eq!(monitor.status("addr"), MonitorStatus::Monitoring);

        // Later acknowledgements change nothing.
        handle_message("addr", r#"{"jsonrpc":"2.0","id":1,"result":43}"#, &monitor.ctx).await;
        assert_eq!(monitor.status("addr"), MonitorStatus::Monitoring);
    }

    #[tokio::test]
    async fn malformed_message_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = test_monitor(&dir);
        monitor
            .ctx
            .registry
            .set_status("addr", MonitorStatus::Monitoring);

        handle_message("addr", "garbage {", &monitor.ctx).await;
        assert_eq!(monitor.status("addr"), MonitorStatus::Monitoring);
        assert!(monitor.notifications().is_empty());
    }

    #[tokio::test]
    async fn toggle_guard_ignores_reentry() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = test_monitor(&dir);

        monitor.pending.insert("addr".to_string(), ());
        // With a toggle supposedly in flight, this call must not dial out or
        // change any state.
        let monitoring = monitor.toggle("addr").await.unwrap();
        assert!(!monitoring);
        assert_eq!(monitor.status("addr"), MonitorStatus::Idle);
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = test_monitor(&dir);

        for address in ["addr-1", "addr-2"] {
            let (stream, sink) = pending_socket();
            let task = tokio::spawn(run_connection(
                address.to_string(),
                stream,
                sink,
                Duration::from_secs(3600),
                monitor.ctx.clone(),
            ));
            monitor
                .ctx
                .registry
                .connections
                .insert(address.to_string(), task);
            monitor
                .ctx
                .registry
                .set_status(address, MonitorStatus::Monitoring);
        }
        assert_eq!(monitor.monitoring_count(), 2);

        monitor.shutdown().await;
        assert_eq!(monitor.monitoring_count(), 0);
        assert!(monitor.ctx.registry.connections.is_empty());
    }
}
