//! Session event callbacks for the UI layer.

use crate::card::error::SessionError;
use crate::card::session::SessionId;

/// Receives session events. Every method defaults to a no-op.
pub trait SessionDelegate: Send + Sync {
    fn session_started(&self, _session: SessionId) {}

    fn tag_connected(&self, _session: SessionId) {}

    fn tag_lost(&self, _session: SessionId) {}

    /// The card asked to wait; `remaining_ms` counts down across repeated calls.
    fn security_delay(&self, _session: SessionId, _remaining_ms: u64) {}

    fn wrong_card(&self, _session: SessionId, _expected: &str, _actual: &str) {}

    fn session_stopped(&self, _session: SessionId, _error: Option<&SessionError>) {}
}

/// Delegate that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDelegate;

impl SessionDelegate for LoggingDelegate {
    fn session_started(&self, session: SessionId) {
        tracing::debug!(session_id = %session, "Hold the card to the reader");
    }

    fn tag_connected(&self, session: SessionId) {
        tracing::debug!(session_id = %session, "Card connected");
    }

    fn tag_lost(&self, session: SessionId) {
        tracing::debug!(session_id = %session, "Card lost");
    }

    fn security_delay(&self, session: SessionId, remaining_ms: u64) {
        tracing::info!(session_id = %session, remaining_ms, "Security delay");
    }

    fn wrong_card(&self, session: SessionId, expected: &str, actual: &str) {
        tracing::info!(session_id = %session, expected, actual, "Wrong card presented");
    }

    fn session_stopped(&self, session: SessionId, error: Option<&SessionError>) {
        match error {
            Some(SessionError::UserCancelled) | None => {
                tracing::debug!(session_id = %session, "Card session stopped")
            }
            Some(e) => tracing::debug!(session_id = %session, error = %e, "Card session stopped with error"),
        }
    }
}
