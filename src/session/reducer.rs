//! Event reducer: folds one [`SessionEvent`] into [`SessionState`].
//!
//! `apply` never fails. Payloads that make no sense for the current state
//! (an empty chunk, an unknown status string, a publisher regression) leave
//! the state untouched. Side effects the caller must perform are returned
//! as [`Effect`]s rather than executed here.

use std::time::Duration;

use super::events::{
    AssetCompleted, AssetError, AssetGenerating, AssetSessionComplete, AssetSessionStart,
    GameCode, PublishSuccess, SessionEvent,
};
use super::parse::{classify_content_type, extract_command_text, parse_suggestions, COMPLETION_BULLETS};
use super::state::{
    AssetProgress, AssetRecord, GenerationStatus, PublishErrorKind, PublishStatus, SessionState,
    StatusDisplay, StatusPhase,
};

/// Delay before refreshing the asset list after a session finishes, so the
/// backend has finished persisting the last files.
pub const ASSET_REFRESH_DELAY: Duration = Duration::from_millis(1500);

/// Work requested by the reducer that happens outside the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Re-fetch the asset list for a session after `delay`.
    RefreshAssets {
        session_id: Option<String>,
        delay: Duration,
    },
}

/// Apply one event to the state.
pub fn apply(state: &mut SessionState, event: SessionEvent) -> Vec<Effect> {
    // Classify the operation before any type-specific logic
    if let Some(operation) = event.operation_class() {
        state.operation_type = operation;
    }

    match event {
        SessionEvent::Status(status) => {
            handle_status(state, &status);
            vec![]
        }
        SessionEvent::Chunk(text) => {
            state.transcript.push_str(&text);
            vec![]
        }
        SessionEvent::CodeChunk(chunk) => {
            handle_code_chunk(state, chunk);
            vec![]
        }
        SessionEvent::Command(command) => {
            let tip = extract_command_text(&command);
            if !tip.is_empty() {
                state.status.tip = tip;
            }
            vec![]
        }
        SessionEvent::Explanation(text) => {
            state.status = StatusDisplay::enter(StatusPhase::Outlining);
            append_section(&mut state.transcript, &text);
            vec![]
        }
        SessionEvent::Features(text) => {
            append_section(&mut state.transcript, &text);
            vec![]
        }
        SessionEvent::Suggestions(text) => {
            state.suggestions = parse_suggestions(&text);
            state.status = StatusDisplay::enter(StatusPhase::Suggesting);
            vec![]
        }
        SessionEvent::Code(code) => {
            handle_code(state, code);
            vec![]
        }
        SessionEvent::Error(message) => {
            handle_error(state, message);
            vec![]
        }
        SessionEvent::PublishStatus(status) => {
            handle_publish_status(state, &status);
            vec![]
        }
        SessionEvent::PublishSuccess(success) => {
            handle_publish_success(state, success);
            vec![]
        }
        SessionEvent::PublishError(kind) => {
            handle_publish_error(state, kind);
            vec![]
        }
        SessionEvent::PublishMessage(text) => {
            state.publisher.message = Some(text.clone());
            append_section(&mut state.transcript, &text);
            vec![]
        }
        SessionEvent::AssetSessionStart(start) => {
            handle_asset_session_start(state, start);
            vec![]
        }
        SessionEvent::AssetGenerating(generating) => {
            handle_asset_generating(state, generating);
            vec![]
        }
        SessionEvent::AssetCompleted(completed) => {
            handle_asset_completed(state, completed);
            vec![]
        }
        SessionEvent::AssetSessionComplete(complete) => handle_asset_session_complete(state, complete),
        SessionEvent::AssetError(error) => {
            handle_asset_error(state, error);
            vec![]
        }
        SessionEvent::StreamComplete => vec![Effect::RefreshAssets {
            session_id: state.assets.session_id.clone(),
            delay: ASSET_REFRESH_DELAY,
        }],
    }
}

fn handle_status(state: &mut SessionState, status: &str) {
    let Some(next) = GenerationStatus::parse(status) else {
        tracing::debug!("Ignoring unknown status '{}'", status);
        return;
    };

    let phase = match next {
        GenerationStatus::Thinking => StatusPhase::Thinking,
        GenerationStatus::Generating => StatusPhase::Generating,
        // Terminal statuses only arrive through their own events
        _ => {
            tracing::debug!("Ignoring non-progress status '{}'", status);
            return;
        }
    };

    let current = state.generation_status;
    if current.is_in_progress() {
        // Within a cycle the status only moves forward
        if next.rank() < current.rank() {
            tracing::debug!("Ignoring status regression {:?} -> {:?}", current, next);
            return;
        }
    } else {
        // idle, completed or error: this status opens a new cycle
        state.last_error = None;
    }

    state.generation_status = next;
    state.is_generating = true;
    state.status = StatusDisplay::enter(phase);
}

fn handle_code_chunk(state: &mut SessionState, chunk: String) {
    if chunk.is_empty() {
        return;
    }

    let stream = &mut state.code_stream;
    if !stream.is_streaming {
        // First chunk of a new streaming session
        stream.content.clear();
        stream.is_streaming = true;
    }
    stream.content_type = classify_content_type(&chunk);
    stream.content.push_str(&chunk);

    if state.status.phase != StatusPhase::Previewing {
        state.status = StatusDisplay::enter(StatusPhase::Previewing);
    }
}

fn handle_code(state: &mut SessionState, code: GameCode) {
    state.code = Some(code);
    state.generation_status = GenerationStatus::Completed;
    state.is_generating = false;
    state.code_stream.is_streaming = false;
    state.status = StatusDisplay {
        phase: StatusPhase::Completed,
        tip: StatusPhase::Completed.default_tip().to_string(),
        bullets: COMPLETION_BULLETS.iter().map(|b| b.to_string()).collect(),
    };
}

fn handle_error(state: &mut SessionState, message: String) {
    state.code = None;
    state.generation_status = GenerationStatus::Error;
    state.is_generating = false;
    state.code_stream.is_streaming = false;
    state.suggestions.clear();
    state.status = StatusDisplay {
        phase: StatusPhase::Idle,
        tip: message.clone(),
        bullets: Vec::new(),
    };
    state.last_error = Some(message);
}

fn handle_publish_status(state: &mut SessionState, status: &str) {
    let Some(next) = PublishStatus::parse_progress(status) else {
        tracing::debug!("Ignoring unknown publish status '{}'", status);
        return;
    };

    let publisher = &mut state.publisher;
    if next == PublishStatus::Validating {
        // A new publish attempt starts from a clean slate
        publisher.live_url = None;
        publisher.site_name = None;
        publisher.error = None;
        publisher.error_kind = None;
        publisher.message = None;
    } else if !publisher.status.is_in_flight() || next.rank() <= publisher.status.rank() {
        tracing::debug!(
            "Ignoring publish status {:?} while {:?}",
            next,
            publisher.status
        );
        return;
    }

    publisher.status = next;
    publisher.is_publishing = true;
}

fn handle_publish_success(state: &mut SessionState, success: PublishSuccess) {
    let publisher = &mut state.publisher;
    publisher.status = PublishStatus::Published;
    publisher.is_publishing = false;
    publisher.error = None;
    publisher.error_kind = None;
    publisher.live_url = non_empty(success.live_url);
    publisher.site_name = non_empty(success.site_name);
    publisher.message = non_empty(success.message);
}

fn handle_publish_error(state: &mut SessionState, kind: String) {
    let publisher = &mut state.publisher;
    let classified = PublishErrorKind::classify(&kind);
    publisher.status = PublishStatus::Error;
    publisher.is_publishing = false;
    publisher.message = Some(classified.guidance().to_string());
    publisher.error_kind = Some(classified);
    publisher.error = Some(kind);
}

fn handle_asset_session_start(state: &mut SessionState, start: AssetSessionStart) {
    let assets = &mut state.assets;
    assets.is_generating = true;
    assets.error = None;
    assets.progress = AssetProgress {
        requested: start.total_assets,
        generated: 0,
        current_step: "Starting asset generation".to_string(),
    };
    if assets.session_id.is_none() {
        assets.session_id = start.session_id.and_then(non_empty);
    }
}

fn handle_asset_generating(state: &mut SessionState, generating: AssetGenerating) {
    let step = match (generating.category.is_empty(), generating.status.is_empty()) {
        (true, true) => return,
        (false, true) => generating.category,
        (true, false) => generating.status,
        (false, false) => format!("{}: {}", generating.category, generating.status),
    };
    state.assets.progress.current_step = step;
}

fn handle_asset_completed(state: &mut SessionState, completed: AssetCompleted) {
    if completed.filename.is_empty() {
        tracing::debug!("Ignoring asset_completed without filename");
        return;
    }

    if state.assets.session_id.is_none() {
        state.assets.session_id = completed.session_id.and_then(non_empty);
    }

    let preview_url = state
        .preview_url_for(&completed.filename)
        .unwrap_or_else(|| completed.storage_url.clone());

    state.assets.items.push(AssetRecord {
        filename: completed.filename,
        category: completed.category,
        storage_url: completed.storage_url,
        preview_url,
        size_bytes: completed.size_bytes,
        created_at: completed.created_at,
        status: "completed".to_string(),
    });
    state.assets.progress.generated += 1;
}

fn handle_asset_session_complete(
    state: &mut SessionState,
    complete: AssetSessionComplete,
) -> Vec<Effect> {
    let assets = &mut state.assets;
    assets.is_generating = false;
    assets.progress.current_step = if complete.fallback_mode.unwrap_or(false) {
        "Completed in fallback mode".to_string()
    } else if complete.status.is_empty() {
        "Completed".to_string()
    } else {
        complete.status
    };
    if complete.total_requested > 0 {
        assets.progress.requested = complete.total_requested;
    }

    vec![Effect::RefreshAssets {
        session_id: assets.session_id.clone(),
        delay: ASSET_REFRESH_DELAY,
    }]
}

fn handle_asset_error(state: &mut SessionState, error: AssetError) {
    let message = match error.category {
        Some(category) if !category.is_empty() => format!("{}: {}", category, error.error),
        _ => error.error,
    };
    state.assets.error = Some(message);
    if error.critical {
        state.assets.is_generating = false;
    }
}

fn append_section(transcript: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !transcript.is_empty() && !transcript.ends_with('\n') {
        transcript.push('\n');
    }
    transcript.push_str(text);
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::parse::DEFAULT_SUGGESTIONS;
    use crate::session::state::{ContentType, OperationType};

    fn apply_all(state: &mut SessionState, events: Vec<SessionEvent>) -> Vec<Effect> {
        events
            .into_iter()
            .flat_map(|event| apply(state, event))
            .collect()
    }

    fn completed(filename: &str) -> SessionEvent {
        SessionEvent::AssetCompleted(AssetCompleted {
            category: "sprite".into(),
            filename: filename.into(),
            storage_url: format!("gs://bucket/{}", filename),
            size_bytes: 1024,
            ..Default::default()
        })
    }

    // =========================================================================
    // Generation cycle
    // =========================================================================

    mod generation {
        use super::*;

        #[test]
        fn test_end_to_end_snake_scenario() {
            let mut state = SessionState::new();
            apply_all(
                &mut state,
                vec![
                    SessionEvent::Status("thinking".into()),
                    SessionEvent::Explanation("Building snake".into()),
                    SessionEvent::CodeChunk("<html>".into()),
                    SessionEvent::CodeChunk("</html>".into()),
                    SessionEvent::Code(GameCode {
                        html: "<html></html>".into(),
                        css: String::new(),
                        js: String::new(),
                    }),
                ],
            );

            assert_eq!(state.code.as_ref().unwrap().html, "<html></html>");
            assert_eq!(state.generation_status, GenerationStatus::Completed);
            assert_eq!(state.code_stream.content, "<html></html>");
            assert!(!state.code_stream.is_streaming);
            assert!(!state.is_generating);
            assert_eq!(state.status.phase, StatusPhase::Completed);
            assert_eq!(state.status.bullets.len(), COMPLETION_BULLETS.len());
        }

        #[test]
        fn test_code_event_completes_from_any_phase() {
            for prior in [
                vec![],
                vec![SessionEvent::Status("thinking".into())],
                vec![SessionEvent::Status("generating".into())],
                vec![SessionEvent::CodeChunk("<div>".into())],
                vec![SessionEvent::Error("boom".into())],
            ] {
                let mut state = SessionState::new();
                apply_all(&mut state, prior);
                apply(&mut state, SessionEvent::Code(GameCode::default()));
                assert_eq!(state.generation_status, GenerationStatus::Completed);
                assert!(!state.code_stream.is_streaming);
                assert!(!state.is_generating);
            }
        }

        #[test]
        fn test_status_progression() {
            let mut state = SessionState::new();
            apply(&mut state, SessionEvent::Status("thinking".into()));
            assert_eq!(state.generation_status, GenerationStatus::Thinking);
            assert_eq!(state.status.phase, StatusPhase::Thinking);
            assert!(state.is_generating);

            apply(&mut state, SessionEvent::Status("generating".into()));
            assert_eq!(state.generation_status, GenerationStatus::Generating);
            assert_eq!(state.status.phase, StatusPhase::Generating);
        }

        #[test]
        fn test_status_regression_is_ignored() {
            let mut state = SessionState::new();
            apply(&mut state, SessionEvent::Status("generating".into()));
            apply(&mut state, SessionEvent::Status("thinking".into()));
            assert_eq!(state.generation_status, GenerationStatus::Generating);
        }

        #[test]
        fn test_status_after_completion_starts_new_cycle() {
            let mut state = SessionState::new();
            apply(&mut state, SessionEvent::Code(GameCode::default()));
            apply(&mut state, SessionEvent::Status("thinking".into()));
            assert_eq!(state.generation_status, GenerationStatus::Thinking);
        }

        #[test]
        fn test_unknown_status_is_noop() {
            let mut state = SessionState::new();
            let before = state.clone();
            apply(&mut state, SessionEvent::Status("dreaming".into()));
            // Only the operation classification changes
            assert_eq!(state.generation_status, before.generation_status);
            assert_eq!(state.status, before.status);
        }

        #[test]
        fn test_command_sets_tip() {
            let mut state = SessionState::new();
            apply(
                &mut state,
                SessionEvent::Command("<generateCSS>Adding cyberpunk styling...</generateCSS>".into()),
            );
            assert_eq!(state.status.tip, "Adding cyberpunk styling...");
        }

        #[test]
        fn test_chunks_go_to_transcript() {
            let mut state = SessionState::new();
            apply(&mut state, SessionEvent::Chunk("Hello".into()));
            apply(&mut state, SessionEvent::Chunk(" world".into()));
            assert_eq!(state.transcript, "Hello world");
        }

        #[test]
        fn test_explanation_enters_outlining() {
            let mut state = SessionState::new();
            apply(&mut state, SessionEvent::Explanation("Plan".into()));
            assert_eq!(state.status.phase, StatusPhase::Outlining);
            assert!(state.transcript.contains("Plan"));
        }
    }

    // =========================================================================
    // Code stream
    // =========================================================================

    mod code_stream {
        use super::*;
        use proptest::prelude::*;

        #[test]
        fn test_chunk_after_code_starts_fresh() {
            let mut state = SessionState::new();
            apply_all(
                &mut state,
                vec![
                    SessionEvent::CodeChunk("old".into()),
                    SessionEvent::Code(GameCode::default()),
                    SessionEvent::CodeChunk("new".into()),
                ],
            );
            assert_eq!(state.code_stream.content, "new");
            assert!(state.code_stream.is_streaming);
        }

        #[test]
        fn test_unrelated_events_do_not_reset_stream() {
            let mut state = SessionState::new();
            apply_all(
                &mut state,
                vec![
                    SessionEvent::CodeChunk("a".into()),
                    SessionEvent::Chunk("chatter".into()),
                    SessionEvent::AssetCompleted(AssetCompleted {
                        filename: "x.png".into(),
                        ..Default::default()
                    }),
                    SessionEvent::CodeChunk("b".into()),
                ],
            );
            assert_eq!(state.code_stream.content, "ab");
        }

        #[test]
        fn test_empty_chunk_is_noop() {
            let mut state = SessionState::new();
            apply(&mut state, SessionEvent::CodeChunk(String::new()));
            assert!(!state.code_stream.is_streaming);
            assert!(state.code_stream.content.is_empty());
        }

        #[test]
        fn test_content_type_follows_latest_chunk() {
            let mut state = SessionState::new();
            apply(&mut state, SessionEvent::CodeChunk("<style>".into()));
            assert_eq!(state.code_stream.content_type, ContentType::Css);
            apply(&mut state, SessionEvent::CodeChunk("function f() {}".into()));
            assert_eq!(state.code_stream.content_type, ContentType::Js);
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_chunks_concatenate_in_order(chunks in prop::collection::vec(".{0,12}", 0..20)) {
                let mut state = SessionState::new();
                for chunk in &chunks {
                    apply(&mut state, SessionEvent::CodeChunk(chunk.clone()));
                }
                prop_assert_eq!(state.code_stream.content, chunks.concat());
            }
        }
    }

    // =========================================================================
    // Errors and suggestions
    // =========================================================================

    mod errors_and_suggestions {
        use super::*;

        #[test]
        fn test_error_resets_code_and_suggestions() {
            let mut state = SessionState::new();
            apply_all(
                &mut state,
                vec![
                    SessionEvent::Code(GameCode {
                        html: "<p>".into(),
                        ..Default::default()
                    }),
                    SessionEvent::Suggestions("- Add sound".into()),
                    SessionEvent::Error("Sorry, something broke".into()),
                ],
            );
            assert!(state.code.is_none());
            assert!(state.suggestions.is_empty());
            assert_eq!(state.generation_status, GenerationStatus::Error);
            assert!(state.status.bullets.is_empty());
            assert_eq!(state.last_error.as_deref(), Some("Sorry, something broke"));
        }

        #[test]
        fn test_suggestions_parsed() {
            let mut state = SessionState::new();
            apply(
                &mut state,
                SessionEvent::Suggestions("- Add sound\n- Add color\n".into()),
            );
            assert_eq!(
                state.suggestions,
                vec!["Add sound".to_string(), "Add color".to_string()]
            );
            assert_eq!(state.status.phase, StatusPhase::Suggesting);
        }

        #[test]
        fn test_suggestions_default_when_unparseable() {
            let mut state = SessionState::new();
            apply(&mut state, SessionEvent::Suggestions("nothing here".into()));
            assert_eq!(state.suggestions.len(), DEFAULT_SUGGESTIONS.len());
        }

        #[test]
        fn test_suggestions_survive_new_operation() {
            let mut state = SessionState::new();
            apply(&mut state, SessionEvent::Suggestions("- Add sound".into()));
            state.begin_cycle();
            apply_all(
                &mut state,
                vec![
                    SessionEvent::Status("thinking".into()),
                    SessionEvent::PublishStatus("validating".into()),
                ],
            );
            assert_eq!(state.suggestions, vec!["Add sound".to_string()]);
        }
    }

    // =========================================================================
    // Operation type classification
    // =========================================================================

    mod operation_type {
        use super::*;

        #[test]
        fn test_publish_status_overrides_game_creation() {
            let mut state = SessionState::new();
            apply(&mut state, SessionEvent::Code(GameCode::default()));
            assert_eq!(state.operation_type, OperationType::GameCreation);
            apply(&mut state, SessionEvent::PublishStatus("validating".into()));
            assert_eq!(state.operation_type, OperationType::Publishing);
        }

        #[test]
        fn test_asset_event_leaves_operation_unchanged() {
            let mut state = SessionState::new();
            apply(&mut state, SessionEvent::PublishMessage("hi".into()));
            apply(&mut state, completed("a.png"));
            assert_eq!(state.operation_type, OperationType::Publishing);

            apply(&mut state, SessionEvent::Status("thinking".into()));
            apply(&mut state, SessionEvent::AssetError(AssetError::default()));
            assert_eq!(state.operation_type, OperationType::GameCreation);
        }

        #[test]
        fn test_agent_panel_tracks_state() {
            let mut state = SessionState::new();
            apply(&mut state, SessionEvent::PublishStatus("deploying".into()));
            let panel = state.agents();
            // deploying without validating is ignored, publisher stays idle
            assert_eq!(
                panel.get(crate::session::agents::PUBLISHER).unwrap().status,
                crate::session::agents::AgentStatus::Idle
            );
        }
    }

    // =========================================================================
    // Publisher
    // =========================================================================

    mod publisher {
        use super::*;

        #[test]
        fn test_full_progression() {
            let mut state = SessionState::new();
            apply_all(
                &mut state,
                vec![
                    SessionEvent::PublishStatus("validating".into()),
                    SessionEvent::PublishStatus("preparing".into()),
                    SessionEvent::PublishStatus("deploying".into()),
                ],
            );
            assert_eq!(state.publisher.status, PublishStatus::Deploying);
            assert!(state.publisher.is_publishing);

            apply(
                &mut state,
                SessionEvent::PublishSuccess(PublishSuccess {
                    live_url: "https://snake-ab12.web.app".into(),
                    site_name: "snake-ab12".into(),
                    message: "Live!".into(),
                }),
            );
            assert_eq!(state.publisher.status, PublishStatus::Published);
            assert!(!state.publisher.is_publishing);
            assert_eq!(
                state.publisher.live_url.as_deref(),
                Some("https://snake-ab12.web.app")
            );
        }

        #[test]
        fn test_regression_is_ignored() {
            let mut state = SessionState::new();
            apply_all(
                &mut state,
                vec![
                    SessionEvent::PublishStatus("validating".into()),
                    SessionEvent::PublishStatus("deploying".into()),
                    SessionEvent::PublishStatus("preparing".into()),
                ],
            );
            assert_eq!(state.publisher.status, PublishStatus::Deploying);
        }

        #[test]
        fn test_error_reachable_from_any_status() {
            for progress in [
                vec![],
                vec!["validating"],
                vec!["validating", "preparing"],
                vec!["validating", "preparing", "deploying"],
            ] {
                let mut state = SessionState::new();
                for status in progress {
                    apply(&mut state, SessionEvent::PublishStatus(status.into()));
                }
                apply(&mut state, SessionEvent::PublishError("deployment_failed".into()));
                assert_eq!(state.publisher.status, PublishStatus::Error);
                assert!(!state.publisher.is_publishing);
                assert_eq!(
                    state.publisher.error_kind,
                    Some(PublishErrorKind::DeploymentFailed)
                );
            }
        }

        #[test]
        fn test_validating_restarts_after_error() {
            let mut state = SessionState::new();
            apply_all(
                &mut state,
                vec![
                    SessionEvent::PublishError("no_game".into()),
                    SessionEvent::PublishStatus("validating".into()),
                ],
            );
            assert_eq!(state.publisher.status, PublishStatus::Validating);
            assert!(state.publisher.error.is_none());
        }
    }

    // =========================================================================
    // Assets
    // =========================================================================

    mod assets {
        use super::*;

        #[test]
        fn test_three_completions_accumulate_in_order() {
            let mut state = SessionState::new();
            apply(
                &mut state,
                SessionEvent::AssetSessionStart(AssetSessionStart {
                    total_assets: 3,
                    ..Default::default()
                }),
            );
            apply_all(
                &mut state,
                vec![completed("a.png"), completed("b.png"), completed("c.png")],
            );

            assert_eq!(state.assets.items.len(), 3);
            assert_eq!(state.assets.progress.generated, 3);
            let names: Vec<&str> = state
                .assets
                .items
                .iter()
                .map(|item| item.filename.as_str())
                .collect();
            assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
        }

        #[test]
        fn test_session_id_first_wins() {
            let mut state = SessionState::new();
            apply(
                &mut state,
                SessionEvent::AssetSessionStart(AssetSessionStart {
                    session_id: Some("first".into()),
                    ..Default::default()
                }),
            );
            apply(
                &mut state,
                SessionEvent::AssetSessionStart(AssetSessionStart {
                    session_id: Some("second".into()),
                    ..Default::default()
                }),
            );
            assert_eq!(state.assets.session_id.as_deref(), Some("first"));
        }

        #[test]
        fn test_preview_url_derived_from_base() {
            let mut state = SessionState::with_asset_base_url("http://localhost:8000");
            apply(
                &mut state,
                SessionEvent::AssetSessionStart(AssetSessionStart {
                    session_id: Some("s1".into()),
                    ..Default::default()
                }),
            );
            apply(&mut state, completed("hero.png"));
            assert_eq!(
                state.assets.items[0].preview_url,
                "http://localhost:8000/assets/s1/hero.png/preview"
            );
        }

        #[test]
        fn test_session_complete_requests_refresh() {
            let mut state = SessionState::new();
            apply(
                &mut state,
                SessionEvent::AssetSessionStart(AssetSessionStart {
                    session_id: Some("s1".into()),
                    ..Default::default()
                }),
            );
            let effects = apply(
                &mut state,
                SessionEvent::AssetSessionComplete(AssetSessionComplete {
                    total_generated: 3,
                    total_requested: 3,
                    status: "success".into(),
                    fallback_mode: None,
                }),
            );
            assert!(!state.assets.is_generating);
            assert_eq!(
                effects,
                vec![Effect::RefreshAssets {
                    session_id: Some("s1".into()),
                    delay: ASSET_REFRESH_DELAY,
                }]
            );
        }

        #[test]
        fn test_stream_complete_requests_refresh() {
            let mut state = SessionState::new();
            let effects = apply(&mut state, SessionEvent::StreamComplete);
            assert_eq!(effects.len(), 1);
        }

        #[test]
        fn test_non_critical_error_keeps_generating() {
            let mut state = SessionState::new();
            apply(
                &mut state,
                SessionEvent::AssetSessionStart(AssetSessionStart::default()),
            );
            apply(
                &mut state,
                SessionEvent::AssetError(AssetError {
                    error: "timeout".into(),
                    category: Some("asset_2".into()),
                    critical: false,
                }),
            );
            assert!(state.assets.is_generating);
            assert_eq!(state.assets.error.as_deref(), Some("asset_2: timeout"));

            apply(
                &mut state,
                SessionEvent::AssetError(AssetError {
                    error: "HF_TOKEN missing".into(),
                    category: None,
                    critical: true,
                }),
            );
            assert!(!state.assets.is_generating);
        }

        #[test]
        fn test_generating_updates_current_step() {
            let mut state = SessionState::new();
            apply(
                &mut state,
                SessionEvent::AssetGenerating(AssetGenerating {
                    category: "asset_1".into(),
                    status: "rendering".into(),
                }),
            );
            assert_eq!(state.assets.progress.current_step, "asset_1: rendering");
        }
    }
}
