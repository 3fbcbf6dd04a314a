use async_trait::async_trait;
use chrono::Utc;
use std::sync::RwLock;

use super::{ProfileStore, StoreError, WorldviewStore};
use crate::models::{ProfileRecord, ProfileSummary, WorldviewRecord};

/// In-process store. Vectors keep insertion order so listings match the
/// `ORDER BY id` of the postgres backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    worldviews: RwLock<Vec<WorldviewRecord>>,
    profiles: RwLock<Vec<ProfileRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorldviewStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<String, StoreError> {
        let worldviews = self.worldviews.read().unwrap_or_else(|e| e.into_inner());
        worldviews
            .iter()
            .find(|w| w.name == name)
            .map(|w| w.description.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let worldviews = self.worldviews.read().unwrap_or_else(|e| e.into_inner());
        Ok(worldviews.iter().map(|w| w.name.clone()).collect())
    }

    async fn put(&self, name: &str, description: &str) -> Result<(), StoreError> {
        let mut worldviews = self.worldviews.write().unwrap_or_else(|e| e.into_inner());
        if worldviews.iter().any(|w| w.name == name) {
            return Err(StoreError::AlreadyExists);
        }
        worldviews.push(WorldviewRecord {
            name: name.to_string(),
            description: description.to_string(),
        });
        Ok(())
    }

    async fn update(&self, name: &str, description: &str) -> Result<(), StoreError> {
        let mut worldviews = self.worldviews.write().unwrap_or_else(|e| e.into_inner());
        let record = worldviews
            .iter_mut()
            .find(|w| w.name == name)
            .ok_or(StoreError::NotFound)?;
        record.description = description.to_string();
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn list(&self, owner: &str) -> Result<Vec<ProfileSummary>, StoreError> {
        let profiles = self.profiles.read().unwrap_or_else(|e| e.into_inner());
        Ok(profiles
            .iter()
            .filter(|p| p.owner == owner)
            .map(|p| ProfileSummary {
                character_name: p.character_name.clone(),
                worldview_name: p.worldview_name.clone(),
            })
            .collect())
    }

    async fn get(&self, owner: &str, character_name: &str) -> Result<String, StoreError> {
        let profiles = self.profiles.read().unwrap_or_else(|e| e.into_inner());
        profiles
            .iter()
            .find(|p| p.owner == owner && p.character_name == character_name)
            .map(|p| p.profile_text.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn put(
        &self,
        owner: &str,
        character_name: &str,
        profile_text: &str,
        worldview_name: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut profiles = self.profiles.write().unwrap_or_else(|e| e.into_inner());
        if profiles
            .iter()
            .any(|p| p.owner == owner && p.character_name == character_name)
        {
            return Err(StoreError::AlreadyExists);
        }
        let now = Utc::now();
        profiles.push(ProfileRecord {
            owner: owner.to_string(),
            character_name: character_name.to_string(),
            profile_text: profile_text.to_string(),
            worldview_name: worldview_name.map(str::to_string),
            created_at: now,
            updated_at: now,
        });
        Ok(())
    }

    async fn update(
        &self,
        owner: &str,
        character_name: &str,
        profile_text: &str,
        worldview_name: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut profiles = self.profiles.write().unwrap_or_else(|e| e.into_inner());
        let record = profiles
            .iter_mut()
            .find(|p| p.owner == owner && p.character_name == character_name)
            .ok_or(StoreError::NotFound)?;
        record.profile_text = profile_text.to_string();
        record.worldview_name = worldview_name.map(str::to_string);
        record.updated_at = Utc::now();
        Ok(())
    }
}
