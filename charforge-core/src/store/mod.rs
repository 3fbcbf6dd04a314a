//! Keyed storage for worldview presets and saved profiles.
//!
//! Two backends: `postgres` for deployments and `memory` for development
//! and tests. Callers only see the traits.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{DatabaseConfig, StorageConfig};
use crate::error::CharforgeError;
use crate::models::worldview::DEFAULT_PRESETS;
use crate::models::ProfileSummary;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("record already exists")]
    AlreadyExists,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait WorldviewStore: Send + Sync {
    /// Description of the named worldview.
    async fn get(&self, name: &str) -> Result<String, StoreError>;

    /// All worldview names in creation order.
    async fn list(&self) -> Result<Vec<String>, StoreError>;

    async fn put(&self, name: &str, description: &str) -> Result<(), StoreError>;

    async fn update(&self, name: &str, description: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// The owner's profiles in save order.
    async fn list(&self, owner: &str) -> Result<Vec<ProfileSummary>, StoreError>;

    async fn get(&self, owner: &str, character_name: &str) -> Result<String, StoreError>;

    async fn put(
        &self,
        owner: &str,
        character_name: &str,
        profile_text: &str,
        worldview_name: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Replace the text and worldview tag of an existing profile.
    async fn update(
        &self,
        owner: &str,
        character_name: &str,
        profile_text: &str,
        worldview_name: Option<&str>,
    ) -> Result<(), StoreError>;
}

/// Both stores behind one backend choice.
#[derive(Clone)]
pub struct Stores {
    pub worldviews: Arc<dyn WorldviewStore>,
    pub profiles: Arc<dyn ProfileStore>,
}

impl Stores {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            worldviews: store.clone(),
            profiles: store,
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            worldviews: store.clone(),
            profiles: store,
        }
    }
}

/// Open the configured backend. For postgres this connects, creates the
/// tables if missing and returns the pool alongside the stores.
pub async fn open_stores(
    config: &StorageConfig,
    database: &DatabaseConfig,
) -> Result<(Stores, Option<sqlx::PgPool>), CharforgeError> {
    match config.backend.as_str() {
        "memory" => {
            tracing::warn!("Using in-memory storage; worldviews and profiles are lost on exit");
            Ok((Stores::memory(), None))
        }
        "postgres" => {
            let pool = crate::db::create_pool(database).await?;
            crate::db::initialize_schema(&pool).await?;
            tracing::info!("Connected to postgres storage");
            Ok((Stores::postgres(pool.clone()), Some(pool)))
        }
        other => Err(CharforgeError::UnknownBackend(other.to_string())),
    }
}

/// Insert the placeholder presets when no worldview exists yet.
/// Returns how many were inserted.
pub async fn seed_default_worldviews(store: &dyn WorldviewStore) -> Result<usize, StoreError> {
    if !store.list().await?.is_empty() {
        return Ok(0);
    }

    let mut inserted = 0;
    for (name, description) in DEFAULT_PRESETS {
        match store.put(name, description).await {
            Ok(()) => inserted += 1,
            // another process seeded concurrently
            Err(StoreError::AlreadyExists) => {}
            Err(e) => return Err(e),
        }
    }

    tracing::info!("Seeded {} default worldview presets", inserted);
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_only_fills_empty_table() {
        let store = MemoryStore::new();

        assert_eq!(seed_default_worldviews(&store).await.unwrap(), 3);
        assert_eq!(seed_default_worldviews(&store).await.unwrap(), 0);

        let names = WorldviewStore::list(&store).await.unwrap();
        assert_eq!(names, vec!["세계관1", "세계관2", "세계관3"]);
    }

    #[tokio::test]
    async fn test_open_stores_rejects_unknown_backend() {
        let storage = StorageConfig {
            backend: "sqlite".to_string(),
        };
        let database = DatabaseConfig {
            url: "postgresql://localhost/unused".to_string(),
            max_connections: 1,
        };

        match open_stores(&storage, &database).await {
            Err(CharforgeError::UnknownBackend(name)) => assert_eq!(name, "sqlite"),
            Err(e) => panic!("Expected UnknownBackend, got {}", e),
            Ok(_) => panic!("Expected UnknownBackend, got stores"),
        }
    }

    #[tokio::test]
    async fn test_open_memory_stores_has_no_pool() {
        let storage = StorageConfig {
            backend: "memory".to_string(),
        };
        let database = DatabaseConfig {
            url: "postgresql://localhost/unused".to_string(),
            max_connections: 1,
        };

        let (stores, pool) = open_stores(&storage, &database).await.unwrap();
        assert!(pool.is_none());
        assert!(stores.worldviews.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seed_skips_when_admin_already_created_one() {
        let store = MemoryStore::new();
        WorldviewStore::put(&store, "사이버펑크", "네온 도시").await.unwrap();

        assert_eq!(seed_default_worldviews(&store).await.unwrap(), 0);
        assert_eq!(WorldviewStore::list(&store).await.unwrap().len(), 1);
    }
}
