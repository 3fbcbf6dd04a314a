use thiserror::Error;

/// Startup and wiring failures. Request-path errors have their own enums.
#[derive(Error, Debug)]
pub enum CharforgeError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Unknown storage backend '{0}' (expected postgres or memory)")]
    UnknownBackend(String),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Generation client error: {0}")]
    Generation(#[from] crate::generation::GenerationError),

    #[error("Notifier error: {0}")]
    Notify(#[from] crate::notify::NotifyError),
}
