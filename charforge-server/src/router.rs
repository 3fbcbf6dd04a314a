//! Inbound event dispatch
//!
//! Maps every gateway event to one engine, profile or worldview call and
//! renders the user-facing reply. Shared by the IPC socket and `POST /events`.

use std::sync::Arc;

use charforge_core::ipc::{CharforgeRequest, CharforgeResponse};
use charforge_core::{CharforgeConfig, Notifier, StoreError, Stores, TextGenerationClient};
use serde_json::json;
use sqlx::PgPool;

use crate::replies;
use crate::subsystems::engine::{EngineError, SessionEngine};
use crate::subsystems::profiles::{
    clean_name, PendingProfiles, ProfileError, ProfileLibrary, SaveOutcome,
};
use crate::subsystems::registry::SessionRegistry;

/// Everything a request handler can reach.
pub struct AppState {
    pub engine: Arc<SessionEngine>,
    pub profiles: Arc<ProfileLibrary>,
    pub stores: Stores,
    /// Present only with the postgres backend.
    pub pool: Option<PgPool>,
    pub config: CharforgeConfig,
}

impl AppState {
    pub fn new(
        config: CharforgeConfig,
        stores: Stores,
        pool: Option<PgPool>,
        generator: Arc<dyn TextGenerationClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let engine = Arc::new(SessionEngine::new(
            registry,
            stores.worldviews.clone(),
            generator,
            notifier,
        ));
        let profiles = Arc::new(ProfileLibrary::new(
            stores.profiles.clone(),
            Arc::new(PendingProfiles::new()),
        ));
        Self {
            engine,
            profiles,
            stores,
            pool,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.engine.registry()
    }
}

pub async fn handle_request(request: CharforgeRequest, state: &AppState) -> CharforgeResponse {
    match request {
        CharforgeRequest::Ping => CharforgeResponse::pong(),
        CharforgeRequest::Health => handle_health(state).await,

        // ---- worldview admin ----
        CharforgeRequest::ListWorldviews => match state.stores.worldviews.list().await {
            Ok(names) => {
                let reply = if names.is_empty() {
                    replies::NO_WORLDVIEWS.to_string()
                } else {
                    replies::worldview_list(&names)
                };
                CharforgeResponse::ok(json!({
                    "worldviews": names,
                    "reply": reply,
                    "ephemeral": true,
                }))
            }
            Err(e) => storage_failure("list_worldviews", e),
        },
        CharforgeRequest::ViewWorldview { name } => {
            match state.stores.worldviews.get(&name).await {
                Ok(description) => CharforgeResponse::ok(json!({
                    "name": name,
                    "description": description,
                    "reply": format!("📖 {}\n\n{}", name, description),
                    "ephemeral": true,
                })),
                Err(StoreError::NotFound) => CharforgeResponse::rejected(
                    "worldview_not_found",
                    replies::worldview_not_found(&name),
                ),
                Err(e) => storage_failure("view_worldview", e),
            }
        }
        CharforgeRequest::CreateWorldview { name, description } => {
            let Some(name) = clean_name(&name) else {
                return CharforgeResponse::rejected("invalid_name", replies::INVALID_NAME);
            };
            match state.stores.worldviews.put(name, &description).await {
                Ok(()) => {
                    tracing::info!(worldview = %name, "Worldview created");
                    reply_ok(replies::worldview_created(name), true)
                }
                Err(StoreError::AlreadyExists) => CharforgeResponse::rejected(
                    "worldview_exists",
                    replies::worldview_exists(name),
                ),
                Err(e) => storage_failure("create_worldview", e),
            }
        }
        CharforgeRequest::EditWorldview { name, description } => {
            let Some(name) = clean_name(&name) else {
                return CharforgeResponse::rejected("invalid_name", replies::INVALID_NAME);
            };
            match state.stores.worldviews.update(name, &description).await {
                Ok(()) => {
                    tracing::info!(worldview = %name, "Worldview edited");
                    reply_ok(replies::worldview_edited(name), true)
                }
                Err(StoreError::NotFound) => CharforgeResponse::rejected(
                    "worldview_not_found",
                    replies::worldview_not_found(name),
                ),
                Err(e) => storage_failure("edit_worldview", e),
            }
        }

        // ---- conversation ----
        CharforgeRequest::Start { owner, worldview } => {
            match state.engine.start_session(&owner, &worldview).await {
                Ok(session) => CharforgeResponse::ok(json!({
                    "reply": replies::SESSION_STARTED,
                    "ephemeral": true,
                    "session_id": session.id,
                })),
                Err(e) => engine_failure(&owner, e),
            }
        }
        CharforgeRequest::Message {
            owner,
            text,
            private_channel,
        } => {
            if !should_route_message(state, &owner, &text, private_channel) {
                return CharforgeResponse::ok(json!({ "ignored": true }));
            }
            match state.engine.continue_conversation(&owner, &text).await {
                Ok(reply) => reply_ok(reply, false),
                Err(e) => engine_failure(&owner, e),
            }
        }
        CharforgeRequest::Generate { owner } => match state.engine.finalize(&owner).await {
            Ok(profile) => {
                let data = json!({
                    "title": replies::PROFILE_GENERATED_TITLE,
                    "profile": profile.profile_text,
                    "worldview": profile.worldview_name,
                    "reply": replies::PROFILE_GENERATED,
                    "save_prompt": true,
                    "ephemeral": false,
                });
                state.profiles.pending().set(&owner, profile);
                CharforgeResponse::ok(data)
            }
            Err(e) => engine_failure(&owner, e),
        },
        CharforgeRequest::Quit { owner } => {
            let ended = state.engine.quit(&owner);
            let reply = if ended {
                replies::QUIT_DONE
            } else {
                replies::QUIT_NOTHING
            };
            CharforgeResponse::ok(json!({
                "ended": ended,
                "reply": reply,
                "ephemeral": true,
            }))
        }

        // ---- profiles ----
        CharforgeRequest::SaveProfile {
            owner,
            character_name,
            overwrite,
        } => match state
            .profiles
            .save(&owner, &character_name, overwrite)
            .await
        {
            Ok(outcome) => {
                let name = character_name.trim();
                let reply = match outcome {
                    SaveOutcome::Created => replies::profile_saved(name),
                    SaveOutcome::Overwritten => replies::profile_overwritten(name),
                };
                reply_ok(reply, true)
            }
            Err(e) => profile_failure(&owner, e),
        },
        CharforgeRequest::ListProfiles { owner } => match state.profiles.list(&owner).await {
            Ok(profiles) => {
                let reply = if profiles.is_empty() {
                    replies::NO_PROFILES.to_string()
                } else {
                    replies::profile_list(&profiles)
                };
                CharforgeResponse::ok(json!({
                    "profiles": profiles,
                    "reply": reply,
                    "ephemeral": true,
                }))
            }
            Err(e) => profile_failure(&owner, e),
        },
        CharforgeRequest::LoadProfile {
            owner,
            character_name,
        } => match state.profiles.load(&owner, &character_name).await {
            Ok(text) => CharforgeResponse::ok(json!({
                "character_name": character_name.trim(),
                "profile": text,
                "reply": text,
                "ephemeral": true,
            })),
            Err(e) => profile_failure(&owner, e),
        },
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

async fn handle_health(state: &AppState) -> CharforgeResponse {
    let postgresql = match &state.pool {
        Some(pool) => match charforge_core::db::health_check(pool).await {
            Ok(v) => Some(v),
            Err(e) => return CharforgeResponse::err(format!("DB Health Check failed: {}", e)),
        },
        None => None,
    };
    CharforgeResponse::ok(json!({
        "status": "healthy",
        "storage": state.config.storage.backend,
        "postgresql": postgresql,
        "active_sessions": state.registry().len(),
    }))
}

/// Free text goes to the engine only from the private channel, only when it
/// is not a command, and only for owners with a live session.
fn should_route_message(state: &AppState, owner: &str, text: &str, private_channel: bool) -> bool {
    private_channel && !text.starts_with('/') && state.engine.has_session(owner)
}

fn reply_ok(reply: impl Into<String>, ephemeral: bool) -> CharforgeResponse {
    CharforgeResponse::ok(json!({
        "reply": reply.into(),
        "ephemeral": ephemeral,
    }))
}

fn engine_failure(owner: &str, err: EngineError) -> CharforgeResponse {
    let reply = match &err {
        EngineError::UnknownWorldview { name, valid } => replies::unknown_worldview(name, valid),
        EngineError::SessionConflict => replies::SESSION_CONFLICT.to_string(),
        EngineError::NoActiveSession => replies::NO_ACTIVE_SESSION.to_string(),
        EngineError::EmptyMessage => replies::EMPTY_MESSAGE.to_string(),
        EngineError::TranscriptEmpty => replies::TRANSCRIPT_EMPTY.to_string(),
        EngineError::GenerationFailed(_) => replies::GENERATION_FAILED.to_string(),
        EngineError::DeliveryUnreachable => replies::DELIVERY_UNREACHABLE.to_string(),
        EngineError::Storage(e) => {
            tracing::error!(owner = owner, error = %e, "Store failure in session engine");
            replies::STORAGE_FAILED.to_string()
        }
    };
    CharforgeResponse::rejected(err.kind(), reply)
}

fn profile_failure(owner: &str, err: ProfileError) -> CharforgeResponse {
    let reply = match &err {
        ProfileError::NoPendingProfile => replies::NO_PENDING_PROFILE.to_string(),
        ProfileError::InvalidName => replies::INVALID_NAME.to_string(),
        ProfileError::DuplicateProfileName(name) => replies::duplicate_profile(name),
        ProfileError::ProfileNotFound(name) => replies::profile_not_found(name),
        ProfileError::Storage(e) => {
            tracing::error!(owner = owner, error = %e, "Profile store failure");
            replies::STORAGE_FAILED.to_string()
        }
    };
    CharforgeResponse::rejected(err.kind(), reply)
}

fn storage_failure(action: &str, err: StoreError) -> CharforgeResponse {
    tracing::error!(action = action, error = %err, "Worldview store failure");
    CharforgeResponse::rejected("storage", replies::STORAGE_FAILED)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{NotifyOutcome, RecordingNotifier, ScriptedGenerator};

    async fn state() -> (AppState, Arc<ScriptedGenerator>, Arc<RecordingNotifier>) {
        let stores = Stores::memory();
        charforge_core::store::seed_default_worldviews(stores.worldviews.as_ref())
            .await
            .unwrap();
        let generator = Arc::new(ScriptedGenerator::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let config = test_config();
        let state = AppState::new(config, stores, None, generator.clone(), notifier.clone());
        (state, generator, notifier)
    }

    fn test_config() -> CharforgeConfig {
        CharforgeConfig::from_toml_str(
            r#"
            [service]
            socket_path = "/tmp/charforge-test.sock"
            log_level = "debug"

            [database]
            url = "postgresql://localhost/unused"
            max_connections = 1

            [storage]
            backend = "memory"

            [generation]
            model = "gemini-test"
            max_retries = 0
            retry_delay_ms = 1
            timeout_seconds = 5

            [gateway]
            notify_url = "http://127.0.0.1:9/notify"
            timeout_seconds = 1
            "#,
        )
        .unwrap()
    }

    fn msg(owner: &str, text: &str) -> CharforgeRequest {
        CharforgeRequest::Message {
            owner: owner.to_string(),
            text: text.to_string(),
            private_channel: true,
        }
    }

    fn start(owner: &str, worldview: &str) -> CharforgeRequest {
        CharforgeRequest::Start {
            owner: owner.to_string(),
            worldview: worldview.to_string(),
        }
    }

    fn reply_of(resp: &CharforgeResponse) -> String {
        resp.data.as_ref().unwrap()["reply"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_ping() {
        let (state, _, _) = state().await;
        assert!(handle_request(CharforgeRequest::Ping, &state).await.is_ok());
    }

    #[tokio::test]
    async fn test_health_without_database() {
        let (state, _, _) = state().await;
        let resp = handle_request(CharforgeRequest::Health, &state).await;
        let data = resp.data.unwrap();
        assert_eq!(data["storage"], "memory");
        assert_eq!(data["active_sessions"], 0);
        assert!(data["postgresql"].is_null());
    }

    #[tokio::test]
    async fn test_full_session_then_save() {
        let (state, generator, _) = state().await;

        let resp = handle_request(start("u", "세계관1"), &state).await;
        assert!(resp.is_ok());
        assert_eq!(reply_of(&resp), replies::SESSION_STARTED);

        generator.push_ok("알겠습니다...");
        let resp = handle_request(msg("u", "나는 용사다"), &state).await;
        assert_eq!(reply_of(&resp), "알겠습니다...");

        generator.push_ok("P");
        let resp = handle_request(
            CharforgeRequest::Generate {
                owner: "u".to_string(),
            },
            &state,
        )
        .await;
        let data = resp.data.unwrap();
        assert_eq!(data["profile"], "P");
        assert_eq!(data["worldview"], "세계관1");
        assert_eq!(data["save_prompt"], true);
        assert!(!state.engine.has_session("u"));

        let resp = handle_request(
            CharforgeRequest::SaveProfile {
                owner: "u".to_string(),
                character_name: "아린".to_string(),
                overwrite: false,
            },
            &state,
        )
        .await;
        assert!(resp.is_ok());
        assert_eq!(reply_of(&resp), replies::profile_saved("아린"));

        let resp = handle_request(
            CharforgeRequest::LoadProfile {
                owner: "u".to_string(),
                character_name: "아린".to_string(),
            },
            &state,
        )
        .await;
        assert_eq!(resp.data.unwrap()["profile"], "P");
    }

    #[tokio::test]
    async fn test_message_routing_rules() {
        let (state, generator, _) = state().await;

        // no session: ignored, not an error
        let resp = handle_request(msg("u", "hello"), &state).await;
        assert_eq!(resp.data.unwrap()["ignored"], true);

        handle_request(start("u", "세계관1"), &state).await;

        let public = CharforgeRequest::Message {
            owner: "u".to_string(),
            text: "hello".to_string(),
            private_channel: false,
        };
        assert_eq!(
            handle_request(public, &state).await.data.unwrap()["ignored"],
            true
        );
        assert_eq!(
            handle_request(msg("u", "/generate"), &state).await.data.unwrap()["ignored"],
            true
        );
        assert!(generator.calls().is_empty());
        assert!(state.registry().get("u").unwrap().transcript.is_empty());

        let resp = handle_request(msg("u", "hello"), &state).await;
        assert!(resp.data.unwrap().get("ignored").is_none());
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_start_errors_carry_kind_and_reply() {
        let (state, _, notifier) = state().await;

        let resp = handle_request(start("u", "없음"), &state).await;
        assert_eq!(resp.error.as_deref(), Some("unknown_worldview"));
        assert!(reply_of(&resp).contains("세계관1, 세계관2, 세계관3"));

        handle_request(start("u", "세계관1"), &state).await;
        let resp = handle_request(start("u", "세계관2"), &state).await;
        assert_eq!(resp.error.as_deref(), Some("session_conflict"));
        assert_eq!(resp.data.unwrap()["ephemeral"], true);

        notifier.set_outcome(NotifyOutcome::Unreachable);
        let resp = handle_request(start("u2", "세계관1"), &state).await;
        assert_eq!(resp.error.as_deref(), Some("delivery_unreachable"));
        assert!(!state.engine.has_session("u2"));
    }

    #[tokio::test]
    async fn test_generate_without_session() {
        let (state, _, _) = state().await;
        let resp = handle_request(
            CharforgeRequest::Generate {
                owner: "u".to_string(),
            },
            &state,
        )
        .await;
        assert_eq!(resp.error.as_deref(), Some("no_active_session"));
        assert_eq!(reply_of(&resp), replies::NO_ACTIVE_SESSION);
    }

    #[tokio::test]
    async fn test_quit_replies() {
        let (state, _, _) = state().await;
        let quit = || CharforgeRequest::Quit {
            owner: "u".to_string(),
        };

        let resp = handle_request(quit(), &state).await;
        assert_eq!(resp.data.unwrap()["ended"], false);

        handle_request(start("u", "세계관1"), &state).await;
        let resp = handle_request(quit(), &state).await;
        assert_eq!(resp.data.as_ref().unwrap()["ended"], true);
        assert_eq!(reply_of(&resp), replies::QUIT_DONE);
        assert!(state.registry().get("u").is_none());
    }

    #[tokio::test]
    async fn test_save_duplicate_then_overwrite() {
        let (state, _, _) = state().await;
        let save = |overwrite| CharforgeRequest::SaveProfile {
            owner: "u".to_string(),
            character_name: "아린".to_string(),
            overwrite,
        };
        let generate = || CharforgeRequest::Generate {
            owner: "u".to_string(),
        };

        let resp = handle_request(save(false), &state).await;
        assert_eq!(resp.error.as_deref(), Some("no_pending_profile"));

        handle_request(start("u", "세계관1"), &state).await;
        handle_request(msg("u", "q"), &state).await;
        handle_request(generate(), &state).await;
        assert!(handle_request(save(false), &state).await.is_ok());

        handle_request(start("u", "세계관1"), &state).await;
        handle_request(msg("u", "q2"), &state).await;
        handle_request(generate(), &state).await;
        let resp = handle_request(save(false), &state).await;
        assert_eq!(resp.error.as_deref(), Some("duplicate_profile_name"));
        assert_eq!(reply_of(&resp), replies::duplicate_profile("아린"));

        // second pending profile collides with the first save
        assert!(state.profiles.pending().get("u").is_some());
        let resp = handle_request(save(true), &state).await;
        assert!(resp.is_ok());
        assert_eq!(reply_of(&resp), replies::profile_overwritten("아린"));
    }

    #[tokio::test]
    async fn test_list_profiles_empty_and_filled() {
        let (state, _, _) = state().await;
        let list = || CharforgeRequest::ListProfiles {
            owner: "u".to_string(),
        };

        let resp = handle_request(list(), &state).await;
        assert_eq!(reply_of(&resp), replies::NO_PROFILES);

        state
            .stores
            .profiles
            .put("u", "아린", "P", Some("세계관2"))
            .await
            .unwrap();
        let resp = handle_request(list(), &state).await;
        let data = resp.data.unwrap();
        assert_eq!(data["profiles"][0]["character_name"], "아린");
        assert!(data["reply"].as_str().unwrap().contains("아린 (세계관: 세계관2)"));
    }

    #[tokio::test]
    async fn test_load_missing_profile() {
        let (state, _, _) = state().await;
        let resp = handle_request(
            CharforgeRequest::LoadProfile {
                owner: "u".to_string(),
                character_name: "없음".to_string(),
            },
            &state,
        )
        .await;
        assert_eq!(resp.error.as_deref(), Some("profile_not_found"));
    }

    #[tokio::test]
    async fn test_worldview_admin() {
        let (state, _, _) = state().await;

        let resp = handle_request(
            CharforgeRequest::CreateWorldview {
                name: "새세계".to_string(),
                description: "바다 위의 도시".to_string(),
            },
            &state,
        )
        .await;
        assert!(resp.is_ok());

        let resp = handle_request(
            CharforgeRequest::CreateWorldview {
                name: "새세계".to_string(),
                description: "중복".to_string(),
            },
            &state,
        )
        .await;
        assert_eq!(resp.error.as_deref(), Some("worldview_exists"));

        let resp = handle_request(
            CharforgeRequest::EditWorldview {
                name: "새세계".to_string(),
                description: "하늘 위의 도시".to_string(),
            },
            &state,
        )
        .await;
        assert!(resp.is_ok());

        let resp = handle_request(
            CharforgeRequest::ViewWorldview {
                name: "새세계".to_string(),
            },
            &state,
        )
        .await;
        assert_eq!(resp.data.unwrap()["description"], "하늘 위의 도시");

        let resp = handle_request(
            CharforgeRequest::EditWorldview {
                name: "없음".to_string(),
                description: "x".to_string(),
            },
            &state,
        )
        .await;
        assert_eq!(resp.error.as_deref(), Some("worldview_not_found"));

        let resp = handle_request(CharforgeRequest::ListWorldviews, &state).await;
        let names = resp.data.unwrap()["worldviews"].clone();
        assert_eq!(names, json!(["세계관1", "세계관2", "세계관3", "새세계"]));
    }

    #[tokio::test]
    async fn test_worldview_names_are_trimmed_and_validated() {
        let (state, _, _) = state().await;

        let resp = handle_request(
            CharforgeRequest::EditWorldview {
                name: " 세계관1 ".to_string(),
                description: "수정됨".to_string(),
            },
            &state,
        )
        .await;
        assert!(resp.is_ok());
        assert_eq!(
            state.stores.worldviews.get("세계관1").await.unwrap(),
            "수정됨"
        );

        for name in ["   ".to_string(), "가".repeat(51)] {
            let resp = handle_request(
                CharforgeRequest::CreateWorldview {
                    name,
                    description: "x".to_string(),
                },
                &state,
            )
            .await;
            assert_eq!(resp.error.as_deref(), Some("invalid_name"));
            assert_eq!(resp.data.unwrap()["reply"], replies::INVALID_NAME);
        }
    }

    #[tokio::test]
    async fn test_blank_character_name_gets_name_reply() {
        let (state, _, _) = state().await;
        state.profiles.pending().set(
            "u",
            crate::subsystems::engine::FinalizedProfile {
                profile_text: "P".to_string(),
                worldview_name: "세계관1".to_string(),
            },
        );

        let resp = handle_request(
            CharforgeRequest::SaveProfile {
                owner: "u".to_string(),
                character_name: " ".to_string(),
                overwrite: false,
            },
            &state,
        )
        .await;
        assert_eq!(resp.error.as_deref(), Some("invalid_name"));
        assert_eq!(resp.data.unwrap()["reply"], replies::INVALID_NAME);
    }
}
