use thiserror::Error;

/// Failure taxonomy for a synchronization run.
///
/// Only `RemoteNotFound` and `Transient` abort a run once it has started;
/// everything else is either rejected up front (`LocalNotFound`,
/// `InProgress`) or absorbed at the point it happens.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No such student in our own store. Surfaced to the caller immediately.
    #[error("student {0} not found")]
    LocalNotFound(i64),

    /// The judge reports the handle does not exist. Disables further
    /// notifications for the student; not retried automatically.
    #[error("codeforces user '{0}' not found")]
    RemoteNotFound(String),

    /// Timeout, 5xx or other transport-level failure. Surfaced to the
    /// caller; retried on the next scheduled or manual run, never within
    /// the same run.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// Another sync for the same student currently holds the advisory lock.
    #[error("sync already in progress for student {0}")]
    InProgress(i64),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}
