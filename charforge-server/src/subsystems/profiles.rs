//! Finalized profiles waiting for a name, and the save/list/load steps.
//!
//! A profile sits in `PendingProfiles` between `generate` and the user
//! naming it. A newer finalize replaces it; a successful save consumes it.

use std::sync::Arc;

use charforge_core::{ProfileStore, ProfileSummary, StoreError};
use dashmap::DashMap;
use thiserror::Error;

use super::engine::FinalizedProfile;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("no finalized profile waiting to be saved")]
    NoPendingProfile,

    #[error("name is empty or longer than 50 characters")]
    InvalidName,

    #[error("profile '{0}' already exists")]
    DuplicateProfileName(String),

    #[error("profile '{0}' not found")]
    ProfileNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
}

impl ProfileError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProfileError::NoPendingProfile => "no_pending_profile",
            ProfileError::InvalidName => "invalid_name",
            ProfileError::DuplicateProfileName(_) => "duplicate_profile_name",
            ProfileError::ProfileNotFound(_) => "profile_not_found",
            ProfileError::Storage(_) => "storage",
        }
    }
}

/// Longest character or worldview name accepted, in characters.
pub const MAX_NAME_CHARS: usize = 50;

/// Trimmed name, or `None` if it is blank or too long.
pub fn clean_name(raw: &str) -> Option<&str> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
        return None;
    }
    Some(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Overwritten,
}

#[derive(Debug, Default)]
pub struct PendingProfiles {
    by_owner: DashMap<String, FinalizedProfile>,
}

impl PendingProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, owner: &str, profile: FinalizedProfile) {
        self.by_owner.insert(owner.to_string(), profile);
    }

    pub fn get(&self, owner: &str) -> Option<FinalizedProfile> {
        self.by_owner.get(owner).map(|p| p.value().clone())
    }

    /// Drop the pending profile only if it is still `expected`, so a save
    /// racing a newer finalize does not discard the newer one.
    fn consume(&self, owner: &str, expected: &FinalizedProfile) {
        self.by_owner.remove_if(owner, |_, p| p == expected);
    }
}

pub struct ProfileLibrary {
    store: Arc<dyn ProfileStore>,
    pending: Arc<PendingProfiles>,
}

impl ProfileLibrary {
    pub fn new(store: Arc<dyn ProfileStore>, pending: Arc<PendingProfiles>) -> Self {
        Self { store, pending }
    }

    pub fn pending(&self) -> &Arc<PendingProfiles> {
        &self.pending
    }

    /// Save the owner's pending profile under `character_name`.
    ///
    /// Without `overwrite` an existing name is rejected and the pending
    /// profile is kept; with it the existing record must be there.
    pub async fn save(
        &self,
        owner: &str,
        character_name: &str,
        overwrite: bool,
    ) -> Result<SaveOutcome, ProfileError> {
        let name = clean_name(character_name).ok_or(ProfileError::InvalidName)?;
        let profile = self
            .pending
            .get(owner)
            .ok_or(ProfileError::NoPendingProfile)?;

        let outcome = if overwrite {
            match self
                .store
                .update(owner, name, &profile.profile_text, Some(&profile.worldview_name))
                .await
            {
                Ok(()) => SaveOutcome::Overwritten,
                Err(StoreError::NotFound) => {
                    return Err(ProfileError::ProfileNotFound(name.to_string()))
                }
                Err(e) => return Err(ProfileError::Storage(e)),
            }
        } else {
            match self
                .store
                .put(owner, name, &profile.profile_text, Some(&profile.worldview_name))
                .await
            {
                Ok(()) => SaveOutcome::Created,
                Err(StoreError::AlreadyExists) => {
                    tracing::debug!(owner = owner, character = name, "Duplicate profile name");
                    return Err(ProfileError::DuplicateProfileName(name.to_string()));
                }
                Err(e) => return Err(ProfileError::Storage(e)),
            }
        };

        self.pending.consume(owner, &profile);
        tracing::info!(
            owner = owner,
            character = name,
            overwrite = overwrite,
            "Profile saved"
        );
        Ok(outcome)
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<ProfileSummary>, ProfileError> {
        self.store.list(owner).await.map_err(ProfileError::Storage)
    }

    pub async fn load(&self, owner: &str, character_name: &str) -> Result<String, ProfileError> {
        let name = character_name.trim();
        match self.store.get(owner, name).await {
            Ok(text) => Ok(text),
            Err(StoreError::NotFound) => Err(ProfileError::ProfileNotFound(name.to_string())),
            Err(e) => Err(ProfileError::Storage(e)),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
