use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::outbox::Outbox;
use super::worker::reconciliation_loop;

/// Owns the background reconciliation task.
pub struct ReconciliationController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl ReconciliationController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, outbox: Arc<Outbox>, interval: Duration) -> Result<()> {
        if self.handle.is_some() {
            bail!("reconciliation already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(reconciliation_loop(outbox, interval, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancels the loop and waits for it to exit. A record already being
    /// delivered finishes first; the rest of the backlog waits for the next run.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("reconciliation task failed to join")?;
            info!("reconciliation stopped");
        }
        Ok(())
    }
}

impl Default for ReconciliationController {
    fn default() -> Self {
        Self::new()
    }
}
