//! Session state tree.
//!
//! Partitioned by concern: generation (code, status, code stream,
//! suggestions), publisher, assets. The agent panel is not stored here; it is
//! projected from the state on demand via [`SessionState::agents`].

use serde::{Deserialize, Serialize};

use super::agents::{derive_agent_panel, AgentPanel};
use super::events::GameCode;

/// Overall generation status of the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    Idle,
    Thinking,
    Generating,
    Completed,
    Error,
}

impl GenerationStatus {
    /// Position within a cycle. Errors sit outside the ordering.
    pub fn rank(self) -> Option<u8> {
        match self {
            GenerationStatus::Idle => Some(0),
            GenerationStatus::Thinking => Some(1),
            GenerationStatus::Generating => Some(2),
            GenerationStatus::Completed => Some(3),
            GenerationStatus::Error => None,
        }
    }

    /// Whether a cycle is currently running.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            GenerationStatus::Thinking | GenerationStatus::Generating
        )
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "idle" => Some(GenerationStatus::Idle),
            "thinking" => Some(GenerationStatus::Thinking),
            "generating" => Some(GenerationStatus::Generating),
            "completed" => Some(GenerationStatus::Completed),
            "error" => Some(GenerationStatus::Error),
            _ => None,
        }
    }
}

/// Display phase for the status panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPhase {
    #[default]
    Idle,
    Analyzing,
    Thinking,
    Outlining,
    Generating,
    Previewing,
    Completed,
    Suggesting,
}

impl StatusPhase {
    /// Default tip shown when entering the phase.
    pub fn default_tip(self) -> &'static str {
        match self {
            StatusPhase::Idle => "",
            StatusPhase::Analyzing => "Analyzing your request...",
            StatusPhase::Thinking => "Thinking through the game design...",
            StatusPhase::Outlining => "Outlining the game structure...",
            StatusPhase::Generating => "Writing the game code...",
            StatusPhase::Previewing => "Streaming code into the preview...",
            StatusPhase::Completed => "Your game is ready to play!",
            StatusPhase::Suggesting => "Preparing ideas for your next iteration...",
        }
    }
}

/// Advisory status display. Last event wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDisplay {
    pub phase: StatusPhase,
    pub tip: String,
    pub bullets: Vec<String>,
}

impl StatusDisplay {
    pub fn enter(phase: StatusPhase) -> Self {
        Self {
            phase,
            tip: phase.default_tip().to_string(),
            bullets: Vec::new(),
        }
    }
}

/// Coarse content-type tag for streamed code. Display metadata only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Html,
    Css,
    Js,
}

/// Accumulator for streamed code chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeStream {
    pub content: String,
    pub content_type: ContentType,
    pub is_streaming: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    #[default]
    Idle,
    Validating,
    Preparing,
    Deploying,
    Published,
    Error,
}

impl PublishStatus {
    /// Position in the validating -> preparing -> deploying -> published line.
    pub fn rank(self) -> u8 {
        match self {
            PublishStatus::Idle | PublishStatus::Error => 0,
            PublishStatus::Validating => 1,
            PublishStatus::Preparing => 2,
            PublishStatus::Deploying => 3,
            PublishStatus::Published => 4,
        }
    }

    /// Parse a `publish_status` payload. Only the in-flight values are valid.
    pub fn parse_progress(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "validating" => Some(PublishStatus::Validating),
            "preparing" => Some(PublishStatus::Preparing),
            "deploying" => Some(PublishStatus::Deploying),
            _ => None,
        }
    }

    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            PublishStatus::Validating | PublishStatus::Preparing | PublishStatus::Deploying
        )
    }
}

/// Category of a publish failure, used to pick guidance text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishErrorKind {
    NoGame,
    DeploymentFailed,
    Unexpected,
}

impl PublishErrorKind {
    pub fn classify(kind: &str) -> Self {
        let normalized = kind.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        if normalized.contains("no_game") || normalized.contains("no_current_game") {
            PublishErrorKind::NoGame
        } else if normalized.contains("deploy") {
            PublishErrorKind::DeploymentFailed
        } else {
            PublishErrorKind::Unexpected
        }
    }

    pub fn guidance(self) -> &'static str {
        match self {
            PublishErrorKind::NoGame => {
                "There is no game to publish yet. Create a game first, then ask me to publish it."
            }
            PublishErrorKind::DeploymentFailed => {
                "Deployment failed. Check the hosting configuration and try publishing again."
            }
            PublishErrorKind::Unexpected => {
                "Something went wrong while publishing. Please try again in a moment."
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherState {
    pub status: PublishStatus,
    pub is_publishing: bool,
    pub live_url: Option<String>,
    pub site_name: Option<String>,
    pub message: Option<String>,
    /// Raw error kind from the backend
    pub error: Option<String>,
    pub error_kind: Option<PublishErrorKind>,
}

/// Which UI surface is live. Derived from the most recent event type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    #[default]
    Idle,
    GameCreation,
    Publishing,
}

/// One generated image asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetRecord {
    pub filename: String,
    pub category: String,
    #[serde(alias = "storage_url")]
    pub storage_url: String,
    #[serde(alias = "preview_url")]
    pub preview_url: String,
    #[serde(alias = "size_bytes")]
    pub size_bytes: u64,
    #[serde(alias = "created_at")]
    pub created_at: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetProgress {
    pub requested: u32,
    pub generated: u32,
    pub current_step: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsState {
    pub items: Vec<AssetRecord>,
    pub is_generating: bool,
    pub progress: AssetProgress,
    pub error: Option<String>,
    /// First session identifier seen in an asset event
    pub session_id: Option<String>,
}

/// The full session state. Mutated only through [`super::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub code: Option<GameCode>,
    pub generation_status: GenerationStatus,
    pub is_generating: bool,
    pub status: StatusDisplay,
    pub code_stream: CodeStream,
    pub suggestions: Vec<String>,
    pub publisher: PublisherState,
    pub operation_type: OperationType,
    pub assets: AssetsState,
    /// Conversational display text
    pub transcript: String,
    pub last_error: Option<String>,
    /// Base URL used to derive asset preview URLs
    pub asset_base_url: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for a client that knows where asset previews are served.
    pub fn with_asset_base_url(base_url: impl Into<String>) -> Self {
        Self {
            asset_base_url: Some(base_url.into().trim_end_matches('/').to_string()),
            ..Self::default()
        }
    }

    /// Mark the start of a new user request.
    ///
    /// Suggestions survive: they are replaced only by a new `suggestions`
    /// event.
    pub fn begin_cycle(&mut self) {
        self.generation_status = GenerationStatus::Idle;
        self.last_error = None;
        self.status = StatusDisplay::enter(StatusPhase::Analyzing);
    }

    /// Drop everything and return to defaults.
    pub fn clear(&mut self) {
        *self = Self {
            asset_base_url: self.asset_base_url.take(),
            ..Self::default()
        };
    }

    /// Abort the in-flight cycle. Same wholesale reset as [`Self::clear`].
    pub fn cancel(&mut self) {
        self.clear();
    }

    /// Append refreshed asset records that are not yet known.
    pub fn merge_refreshed_assets(&mut self, records: Vec<AssetRecord>) -> usize {
        let mut added = 0;
        for record in records {
            let known = self
                .assets
                .items
                .iter()
                .any(|existing| existing.filename == record.filename);
            if !known {
                self.assets.items.push(record);
                added += 1;
            }
        }
        added
    }

    /// Preview URL for an asset, if enough is known to derive it.
    pub fn preview_url_for(&self, filename: &str) -> Option<String> {
        let base = self.asset_base_url.as_deref()?;
        let session_id = self.assets.session_id.as_deref()?;
        Some(asset_preview_url(base, session_id, filename))
    }

    /// Project the agent panel from the current state.
    pub fn agents(&self) -> AgentPanel {
        derive_agent_panel(
            self.operation_type,
            self.status.phase,
            self.publisher.status,
        )
    }
}

/// `<base>/assets/{session_id}/{filename}/preview`
pub fn asset_preview_url(base: &str, session_id: &str, filename: &str) -> String {
    format!(
        "{}/assets/{}/{}/preview",
        base.trim_end_matches('/'),
        session_id,
        filename
    )
}
