//! Outbound delivery channels for notifications.
//!
//! - [`email`]: SMTP email for immediate notifications and digests.
//! - [`realtime`]: the room-based push transport seam.
//!
//! Channel failures are [`DeliveryError`]s. They are isolated from the call
//! that produced them: [`BackgroundTasks::spawn_isolated`] logs them and
//! nothing propagates them further.

pub mod email;
pub mod realtime;

use std::future::Future;

use tokio_util::task::TaskTracker;

use coursecast_db::StoreError;

use self::email::EmailError;

/// A real-time push or email send that did not go through.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Email(#[from] EmailError),

    #[error("Realtime delivery failed: {0}")]
    Realtime(String),

    #[error("No email recipient on record for the user")]
    RecipientMissing,

    #[error("Recipient lookup failed: {0}")]
    Directory(#[from] StoreError),
}

/// Tracks fire-and-forget channel work so shutdown and tests can wait for
/// it without the request path ever awaiting it.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` in the background. An error is logged with the channel
    /// name and then dropped.
    pub fn spawn_isolated<F>(&self, channel: &'static str, task: F)
    where
        F: Future<Output = Result<(), DeliveryError>> + Send + 'static,
    {
        self.tracker.spawn(async move {
            if let Err(e) = task.await {
                tracing::warn!(channel, error = %e, "Channel delivery failed");
            }
        });
    }

    /// Number of tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every task spawned so far has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
