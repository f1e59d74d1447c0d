//! Inbound loop: long-polls the messenger and dispatches each update.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::broadcast::error::TransportError;
use crate::broadcast::router::CommandRouter;
use crate::broadcast::traits::{InboundUpdate, Messenger};

#[derive(Clone)]
pub struct Poller {
    messenger: Arc<dyn Messenger>,
    router: Arc<CommandRouter>,
    retry_delay: Duration,
}

impl Poller {
    pub fn new(messenger: Arc<dyn Messenger>, router: Arc<CommandRouter>, retry_delay: Duration) -> Self {
        Self {
            messenger,
            router,
            retry_delay,
        }
    }

    /// Poll once and route every update in order. Returns how many updates
    /// were received.
    ///
    /// The messenger has already acknowledged the batch, so an update whose
    /// routing panics is dropped; the rest of the batch is still routed.
    pub async fn poll_once(&self) -> Result<usize, TransportError> {
        let updates = self.messenger.poll_updates().await?;
        let count = updates.len();
        let router = self.router.clone();
        route_each(updates, move |update| {
            let router = router.clone();
            async move {
                let routed = router.handle(update, Utc::now()).await;
                debug!("Routed update: {:?}", routed);
            }
        })
        .await;
        Ok(count)
    }

    /// Poll forever. A failed or panicking iteration is logged and retried
    /// after `retry_delay`.
    pub async fn run(self) {
        info!("Polling for updates");
        loop {
            let this = self.clone();
            match tokio::spawn(async move { this.poll_once().await }).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    error!("Error in bot polling: {}", e);
                    sleep(self.retry_delay).await;
                }
                Err(e) => {
                    error!("Unexpected error in bot polling: {}", e);
                    sleep(self.retry_delay).await;
                }
            }
        }
    }
}

/// Route updates one by one, each in its own task. Returns how many were
/// routed without panicking.
async fn route_each<F, Fut>(updates: Vec<InboundUpdate>, route: F) -> usize
where
    F: Fn(InboundUpdate) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut routed = 0;
    for update in updates {
        let chat_id = update.chat_id;
        match tokio::spawn(route(update)).await {
            Ok(()) => routed += 1,
            Err(e) => error!("Dropped update from chat {}: {}", chat_id.0, e),
        }
    }
    routed
}
