//! Client side of the game service: SSE decoding and the request loop.

pub mod client;
pub mod sse;

pub use client::{
    decode_events, run_generation, AssetListResponse, Conversation, EventStream, GameClient,
    GenerateRequest, RunOutcome, DEFAULT_USER_ID,
};
pub use sse::{SseDecoder, SseFrame, SseStream, DONE_MARKER};
