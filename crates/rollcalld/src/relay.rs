//! Relay trigger dispatch.
//!
//! Recording attendance fires a physical relay on a remote microcontroller.
//! The call is strictly best-effort: delivered through a bounded queue to a
//! background task so a slow or unreachable endpoint can never stall frame
//! processing, failures are logged and never retried, and the dispatcher
//! touches none of the loop's session state.

use std::time::Duration;

use tokio::sync::mpsc;

const QUEUE_DEPTH: usize = 8;

/// Handle held by the recognition loop. Never blocks.
#[derive(Clone)]
pub struct RelayTrigger {
    tx: mpsc::Sender<()>,
}

impl RelayTrigger {
    /// Ask the dispatcher to fire the relay. If the queue is full or the
    /// dispatcher is gone, the trigger is dropped with a warning.
    pub fn fire(&self) {
        if self.tx.try_send(()).is_err() {
            tracing::warn!("relay trigger dropped (queue full or dispatcher gone)");
        }
    }

    /// A trigger wired to nothing. Stands in for an unreachable dispatcher.
    #[cfg(test)]
    pub fn disconnected() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self { tx }
    }
}

/// Spawn the dispatcher task. Each queued trigger becomes one HTTP GET with
/// a bounded timeout; the response is logged and never acted upon further.
pub fn spawn(url: String, timeout: Duration) -> RelayTrigger {
    let (tx, mut rx) = mpsc::channel::<()>(QUEUE_DEPTH);

    tokio::spawn(async move {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .new_agent();

        while rx.recv().await.is_some() {
            let agent = agent.clone();
            let url = url.clone();
            let result = tokio::task::spawn_blocking(move || agent.get(&url).call()).await;
            match result {
                Ok(Ok(response)) => {
                    let status = response.status();
                    if status.is_success() {
                        tracing::info!(status = status.as_u16(), "relay trigger delivered");
                    } else {
                        tracing::warn!(status = status.as_u16(), "relay endpoint returned an error");
                    }
                }
                Ok(Err(e)) => tracing::warn!(error = %e, "relay trigger failed"),
                Err(e) => tracing::warn!(error = %e, "relay dispatch task panicked"),
            }
        }
    });

    RelayTrigger { tx }
}
