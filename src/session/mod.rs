//! Session event reducer.
//!
//! A game session is driven by a stream of server-pushed events. Each event
//! is folded into a single [`SessionState`] by [`apply`]:
//!
//! ```text
//! transport ──► SessionEvent ──► SessionStore::dispatch ──► apply ──► SessionState
//!                                                             │
//!                                                             └──► Vec<Effect>
//! ```
//!
//! The agent panel is a projection of the state ([`SessionState::agents`]),
//! never stored.

pub mod agents;
pub mod events;
pub mod parse;
pub mod reducer;
pub mod state;
pub mod store;

pub use agents::{derive_agent_panel, AgentPanel, AgentRecord, AgentStatus};
pub use events::{
    AssetCompleted, AssetError, AssetGenerating, AssetSessionComplete, AssetSessionStart,
    EventDecodeError, GameCode, PublishSuccess, SessionEvent,
};
pub use reducer::{apply, Effect, ASSET_REFRESH_DELAY};
pub use state::{
    asset_preview_url, AssetRecord, AssetsState, ContentType, GenerationStatus, OperationType,
    PublishErrorKind, PublishStatus, SessionState, StatusPhase,
};
pub use store::SessionStore;
