use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use common::{ExchangeClient, OcoPair, OrderUpdate};

/// Watches the order-update stream for a synthetic OCO pair and cancels the
/// sibling leg once either leg reaches a terminal status.
///
/// Updates are not de-duplicated: a repeated terminal event for the same leg
/// re-issues the cancel, which the venue rejects harmlessly once the sibling
/// is gone. Cancel failures are retried under a bounded fixed-delay policy
/// and then dropped; nothing is ever surfaced to a caller.
pub struct OcoWatcher {
    pair: OcoPair,
    client: Arc<dyn ExchangeClient>,
    updates: broadcast::Receiver<OrderUpdate>,
    shutdown: watch::Receiver<bool>,
    max_retries: u32,
    retry_delay: Duration,
}

impl OcoWatcher {
    const DEFAULT_MAX_RETRIES: u32 = 2;
    const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

    pub fn new(
        pair: OcoPair,
        client: Arc<dyn ExchangeClient>,
        updates: broadcast::Receiver<OrderUpdate>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pair,
            client,
            updates,
            shutdown,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
        }
    }

    /// Override the retry budget for failed cancel calls.
    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Run until shut down or until the update channel closes. Every
    /// failure becomes a log entry; this task never returns an error.
    /// Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!(
            symbol = %self.pair.symbol,
            take_profit_id = self.pair.take_profit_id,
            stop_loss_id = self.pair.stop_loss_id,
            "OCO watcher running"
        );

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("OCO watcher stopped");
                        return;
                    }
                }
                update = self.updates.recv() => match update {
                    Ok(update) => self.handle(update).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "OCO watcher lagged behind the update stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("order update channel closed, OCO watcher exiting");
                        return;
                    }
                },
            }
        }
    }

    async fn handle(&self, update: OrderUpdate) {
        if !update.status.is_terminal() {
            return;
        }
        let Some(sibling) = self.pair.sibling_of(update.order_id) else {
            return;
        };

        info!(
            order_id = update.order_id,
            status = %update.status,
            sibling,
            "OCO leg reached terminal status, cancelling sibling"
        );
        self.cancel_with_retry(sibling).await;
    }

    async fn cancel_with_retry(&self, order_id: i64) {
        let mut attempt = 0;
        loop {
            match self.client.cancel_order(&self.pair.symbol, order_id).await {
                Ok(ack) => {
                    info!(order_id, status = %ack.status, "sibling cancel accepted");
                    return;
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(order_id, attempt, error = %e, "cancel failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    error!(order_id, error = %e, "cancel failed, giving up");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::OrderStatus;
    use paper::PaperClient;

    fn pair() -> OcoPair {
        OcoPair {
            symbol: "BTCUSDT".into(),
            take_profit_id: 100,
            stop_loss_id: 200,
        }
    }

    fn update(order_id: i64, status: OrderStatus) -> OrderUpdate {
        OrderUpdate {
            symbol: "BTCUSDT".into(),
            order_id,
            status,
            timestamp: Utc::now(),
        }
    }

    fn spawn_watcher(
        client: Arc<PaperClient>,
    ) -> (
        broadcast::Sender<OrderUpdate>,
        watch::Sender<bool>,
        tokio::task::JoinHandle<()>,
    ) {
        let (update_tx, update_rx) = broadcast::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watcher = OcoWatcher::new(pair(), client, update_rx, shutdown_rx)
            .with_retry_policy(2, Duration::from_millis(1));
        let handle = tokio::spawn(watcher.run());
        (update_tx, shutdown_tx, handle)
    }

    #[tokio::test]
    async fn terminal_event_cancels_sibling_exactly_once() {
        let client = Arc::new(PaperClient::new());
        let (update_tx, shutdown_tx, handle) = spawn_watcher(client.clone());

        update_tx.send(update(100, OrderStatus::Filled)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(client.cancel_calls().await, vec![200]);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_terminal_event_reissues_cancel() {
        let client = Arc::new(PaperClient::new());
        let (update_tx, shutdown_tx, handle) = spawn_watcher(client.clone());

        update_tx.send(update(100, OrderStatus::Filled)).unwrap();
        update_tx.send(update(100, OrderStatus::Filled)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // No de-duplication: both events issue a cancel for the sibling.
        assert_eq!(client.cancel_calls().await, vec![200, 200]);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stop_loss_leg_cancels_take_profit() {
        let client = Arc::new(PaperClient::new());
        let (update_tx, shutdown_tx, handle) = spawn_watcher(client.clone());

        update_tx.send(update(200, OrderStatus::Canceled)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(client.cancel_calls().await, vec![100]);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn non_terminal_and_foreign_events_are_ignored() {
        let client = Arc::new(PaperClient::new());
        let (update_tx, shutdown_tx, handle) = spawn_watcher(client.clone());

        update_tx.send(update(100, OrderStatus::New)).unwrap();
        update_tx
            .send(update(100, OrderStatus::PartiallyFilled))
            .unwrap();
        update_tx.send(update(999, OrderStatus::Filled)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(client.cancel_calls().await.is_empty());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn transient_cancel_failure_is_retried() {
        let client = Arc::new(PaperClient::new());
        client.fail_next_cancels(1);
        let (update_tx, shutdown_tx, handle) = spawn_watcher(client.clone());

        update_tx.send(update(100, OrderStatus::Filled)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // First attempt fails, bounded retry succeeds on the second.
        assert_eq!(client.cancel_calls().await, vec![200, 200]);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancel_gives_up_after_retry_budget() {
        let client = Arc::new(PaperClient::new());
        client.fail_next_cancels(10);
        let (update_tx, shutdown_tx, handle) = spawn_watcher(client.clone());

        update_tx.send(update(100, OrderStatus::Filled)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Initial attempt plus two retries, then the failure is dropped.
        assert_eq!(client.cancel_calls().await.len(), 3);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
