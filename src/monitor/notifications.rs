use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::debug;

use crate::core::Notification;

/// Capped ring buffer of the most recent notifications, newest first,
/// fanned out to live subscribers over a broadcast channel.
pub struct NotificationLog {
    capacity: usize,
    entries: Mutex<VecDeque<Notification>>,
    tx: broadcast::Sender<Notification>,
}

impl NotificationLog {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::new()),
            tx,
        }
    }

    /// Prepends a notification and truncates to capacity. Subscribers that
    /// lag or disconnect never block the push.
    pub fn push(&self, notification: Notification) {
        {
            let mut entries = self.entries.lock().unwrap();
            entries.push_front(notification.clone());
            entries.truncate(self.capacity);
        }

        match self.tx.send(notification) {
            Ok(receivers) => debug!(receivers, "Notification published"),
            Err(_) => debug!("Notification buffered with no live subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Current buffer contents, newest first.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NotificationKind;
    use chrono::Utc;

    fn notification(id: usize) -> Notification {
        Notification {
            id: format!("sig-{}", id),
            wallet_address: "wallet".to_string(),
            kind: NotificationKind::Transfer,
            from_address: "from".to_string(),
            to_address: "to".to_string(),
            from_token: None,
            to_token: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn keeps_ten_newest_in_order() {
        let log = NotificationLog::new(10);
        for i in 0..25 {
            log.push(notification(i));
        }

        let entries = log.snapshot();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[0].id, "sig-24");
        assert_eq!(entries[9].id, "sig-15");
    }

    #[tokio::test]
    async fn subscribers_receive_pushes() {
        let log = NotificationLog::new(10);
        let mut rx = log.subscribe();

        log.push(notification(1));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, "sig-1");
    }
}
