pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod ipc;
pub mod models;
pub mod notify;
pub mod prompts;
pub mod store;

pub use config::CharforgeConfig;
pub use error::CharforgeError;
pub use generation::{
    GeminiClientConfig, GeminiGenerationClient, GenerationError, TextGenerationClient,
};
pub use models::{ProfileSummary, Speaker, Turn, WorldviewRecord};
pub use notify::{
    notifier_from_config, Delivery, LogNotifier, Notifier, NotifyError, WebhookNotifier,
};
pub use store::{ProfileStore, StoreError, Stores, WorldviewStore};
