//! Session engine: the conversation lifecycle
//!
//! start → continue* → finalize | quit
//!
//! The engine never holds registry access across an await. Each generation
//! call works on a copy of the transcript; the result is appended only if the
//! session it was generated for is still the owner's current session.

use std::sync::Arc;

use charforge_core::prompts::{
    system_instruction, PromptPhase, FALLBACK_WORLDVIEW_DESCRIPTION, FINALIZE_DIRECTIVE,
    SEED_ASSISTANT_TURN,
};
use charforge_core::{
    Delivery, GenerationError, Notifier, Speaker, StoreError, TextGenerationClient, Turn,
    WorldviewStore,
};
use thiserror::Error;

use super::registry::{Session, SessionRegistry};
use crate::replies;

// ============================================================================
// PUBLIC API
// ============================================================================

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unknown worldview '{name}'")]
    UnknownWorldview { name: String, valid: Vec<String> },

    #[error("a session is already active")]
    SessionConflict,

    #[error("no active session")]
    NoActiveSession,

    #[error("message is empty")]
    EmptyMessage,

    #[error("nothing to build a profile from yet")]
    TranscriptEmpty,

    #[error("generation failed: {0}")]
    GenerationFailed(#[source] GenerationError),

    #[error("owner is unreachable")]
    DeliveryUnreachable,

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl EngineError {
    /// Machine-readable kind reported to the gateway.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::UnknownWorldview { .. } => "unknown_worldview",
            EngineError::SessionConflict => "session_conflict",
            EngineError::NoActiveSession => "no_active_session",
            EngineError::EmptyMessage => "empty_message",
            EngineError::TranscriptEmpty => "transcript_empty",
            EngineError::GenerationFailed(_) => "generation_failed",
            EngineError::DeliveryUnreachable => "delivery_unreachable",
            EngineError::Storage(_) => "storage",
        }
    }
}

/// Output of a successful finalize, handed to the save step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedProfile {
    pub profile_text: String,
    pub worldview_name: String,
}

pub struct SessionEngine {
    registry: Arc<SessionRegistry>,
    worldviews: Arc<dyn WorldviewStore>,
    generator: Arc<dyn TextGenerationClient>,
    notifier: Arc<dyn Notifier>,
}

impl SessionEngine {
    pub fn new(
        registry: Arc<SessionRegistry>,
        worldviews: Arc<dyn WorldviewStore>,
        generator: Arc<dyn TextGenerationClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            worldviews,
            generator,
            notifier,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn has_session(&self, owner: &str) -> bool {
        self.registry.contains(owner)
    }

    /// Open a session for `owner` on `worldview_name` and tell the owner
    /// over their private channel. A session whose owner cannot be told is
    /// rolled back.
    pub async fn start_session(
        &self,
        owner: &str,
        worldview_name: &str,
    ) -> Result<Session, EngineError> {
        match self.worldviews.get(worldview_name).await {
            Ok(_) => {}
            Err(StoreError::NotFound) => {
                let valid = self.worldviews.list().await?;
                tracing::info!(owner = owner, worldview = worldview_name, "Unknown worldview");
                return Err(EngineError::UnknownWorldview {
                    name: worldview_name.to_string(),
                    valid,
                });
            }
            Err(e) => return Err(e.into()),
        }

        let session = self
            .registry
            .try_create(owner, worldview_name)
            .map_err(|_| {
                tracing::info!(owner = owner, "Start rejected: session already active");
                EngineError::SessionConflict
            })?;

        let notice = replies::session_started_notice(worldview_name);
        let delivered = match self.notifier.notify(owner, &notice).await {
            Ok(Delivery::Delivered) => true,
            Ok(Delivery::Unreachable) => false,
            Err(e) => {
                tracing::warn!(owner = owner, error = %e, "Start notice failed");
                false
            }
        };

        if !delivered {
            self.registry.remove_if(owner, session.id);
            tracing::info!(
                owner = owner,
                session_id = %session.id,
                "Owner unreachable, session rolled back"
            );
            return Err(EngineError::DeliveryUnreachable);
        }

        tracing::info!(
            owner = owner,
            session_id = %session.id,
            worldview = worldview_name,
            "Session started"
        );
        Ok(session)
    }

    /// Record the user's message and return the assistant's reply.
    /// A failed generation leaves the session as it was after the user turn.
    pub async fn continue_conversation(
        &self,
        owner: &str,
        user_text: &str,
    ) -> Result<String, EngineError> {
        if user_text.trim().is_empty() {
            return Err(EngineError::EmptyMessage);
        }

        let session = self
            .registry
            .append_user_turn(owner, user_text)
            .map_err(|_| EngineError::NoActiveSession)?;

        let instruction = self
            .instruction_for(PromptPhase::Conversation, &session)
            .await?;
        let request = with_seed(&session.transcript);

        let reply = self
            .generator
            .generate(&instruction, &request)
            .await
            .map_err(|e| {
                tracing::warn!(
                    owner = owner,
                    session_id = %session.id,
                    backend = self.generator.name(),
                    error = %e,
                    "Generation failed, session kept"
                );
                EngineError::GenerationFailed(e)
            })?;

        self.registry
            .append_assistant_turn(owner, session.id, &reply)
            .map_err(|_| {
                tracing::info!(
                    owner = owner,
                    session_id = %session.id,
                    "Session ended during generation, reply discarded"
                );
                EngineError::NoActiveSession
            })?;

        Ok(reply)
    }

    /// Produce the completed profile and end the session.
    /// On failure the session stays so the user can retry.
    pub async fn finalize(&self, owner: &str) -> Result<FinalizedProfile, EngineError> {
        let session = self
            .registry
            .get(owner)
            .ok_or(EngineError::NoActiveSession)?;

        if !session
            .transcript
            .iter()
            .any(|t| t.speaker == Speaker::User)
        {
            return Err(EngineError::TranscriptEmpty);
        }

        let instruction = self.instruction_for(PromptPhase::Finalize, &session).await?;
        let mut request = with_seed(&session.transcript);
        request.push(Turn::user(FINALIZE_DIRECTIVE));

        let profile_text = self
            .generator
            .generate(&instruction, &request)
            .await
            .map_err(|e| {
                tracing::warn!(
                    owner = owner,
                    session_id = %session.id,
                    error = %e,
                    "Finalize generation failed, session kept"
                );
                EngineError::GenerationFailed(e)
            })?;

        if self.registry.remove_if(owner, session.id).is_none() {
            tracing::info!(
                owner = owner,
                session_id = %session.id,
                "Session ended during finalize, profile discarded"
            );
            return Err(EngineError::NoActiveSession);
        }

        tracing::info!(
            owner = owner,
            session_id = %session.id,
            turns = session.transcript.len(),
            "Session finalized"
        );
        Ok(FinalizedProfile {
            profile_text,
            worldview_name: session.worldview_name,
        })
    }

    /// Drop the owner's session if there is one. Returns whether one existed.
    pub fn quit(&self, owner: &str) -> bool {
        match self.registry.remove(owner) {
            Some(session) => {
                tracing::info!(owner = owner, session_id = %session.id, "Session quit");
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // INTERNAL HELPERS
    // ========================================================================

    /// Build the system instruction from the worldview text as it is in the
    /// store right now.
    async fn instruction_for(
        &self,
        phase: PromptPhase,
        session: &Session,
    ) -> Result<String, EngineError> {
        let description = match self.worldviews.get(&session.worldview_name).await {
            Ok(d) => d,
            Err(StoreError::NotFound) => {
                tracing::warn!(
                    session_id = %session.id,
                    worldview = %session.worldview_name,
                    "Worldview no longer exists, using generic description"
                );
                FALLBACK_WORLDVIEW_DESCRIPTION.to_string()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(system_instruction(phase, &description))
    }
}

/// Transcript as sent to the backend: the seed turn, then the session's turns.
fn with_seed(transcript: &[Turn]) -> Vec<Turn> {
    let mut request = Vec::with_capacity(transcript.len() + 2);
    request.push(Turn::assistant(SEED_ASSISTANT_TURN));
    request.extend_from_slice(transcript);
    request
}

// ============================================================================
// TESTS
// ============================================================================
