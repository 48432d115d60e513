//! Serialized application point for session events.
//!
//! Events from the transport, user actions (`begin_cycle`, `clear`,
//! `cancel`) and refreshed asset lists all mutate the state through the
//! same lock, so one event is fully applied before the next is looked at.

use parking_lot::Mutex;

use super::events::SessionEvent;
use super::reducer::{apply, Effect};
use super::state::{AssetRecord, SessionState};

#[derive(Debug, Default)]
pub struct SessionStore {
    state: Mutex<SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SessionState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Apply one event and return the effects it requested.
    pub fn dispatch(&self, event: SessionEvent) -> Vec<Effect> {
        let name = event.name();
        let effects = apply(&mut self.state.lock(), event);
        tracing::trace!("Applied '{}' event ({} effects)", name, effects.len());
        effects
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Read a value out of the state without cloning all of it.
    pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.state.lock())
    }

    pub fn begin_cycle(&self) {
        self.state.lock().begin_cycle();
    }

    pub fn clear(&self) {
        self.state.lock().clear();
    }

    pub fn cancel(&self) {
        tracing::debug!("Cancelling in-flight session cycle");
        self.state.lock().cancel();
    }

    pub fn merge_refreshed_assets(&self, records: Vec<AssetRecord>) -> usize {
        self.state.lock().merge_refreshed_assets(records)
    }
}
