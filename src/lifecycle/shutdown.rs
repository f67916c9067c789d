//! Stop signalling for background tasks.

use tokio::sync::watch;

/// Owner side of a stop signal.
///
/// Backed by a `watch` channel, so a listener created after the signal
/// fired still observes it.
#[derive(Debug)]
pub struct StopSignal {
    tx: watch::Sender<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Create a listener for a background task.
    pub fn listener(&self) -> StopListener {
        StopListener { rx: self.tx.subscribe() }
    }

    /// Ask every listener to stop. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Number of listeners still alive (tasks not yet exited).
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Task side of a stop signal.
#[derive(Debug, Clone)]
pub struct StopListener {
    rx: watch::Receiver<bool>,
}

impl StopListener {
    /// Resolve once stop has been requested (or the signal was dropped).
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }
}
