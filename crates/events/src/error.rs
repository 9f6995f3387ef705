use coursecast_core::error::CoreError;
use coursecast_db::StoreError;

/// Error returned by the notification services.
///
/// Channel failures (realtime push, email) never show up here; they are
/// logged by the background-task helper instead.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

pub type NotificationResult<T> = Result<T, NotificationError>;
