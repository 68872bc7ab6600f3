//! Transport seam between a session and the physical reader.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::card::error::SessionError;

/// Presence of a tag in the reader's field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TagState {
    #[default]
    Absent,
    Present {
        uid: Vec<u8>,
    },
}

/// A byte-level card transport.
///
/// `transmit` returns `SessionError::TagLost` when the tag leaves the field
/// mid-exchange and `SessionError::UserCancelled` when the user dismisses
/// the reader.
#[async_trait]
pub trait CardReader: Send + Sync {
    async fn is_available(&self) -> bool;

    /// Readers that need the reduced command set.
    fn prefers_legacy_mode(&self) -> bool {
        false
    }

    fn tag_state(&self) -> watch::Receiver<TagState>;

    async fn start_polling(&self, message: Option<String>) -> Result<(), SessionError>;

    async fn restart_polling(&self) -> Result<(), SessionError>;

    async fn transmit(&self, apdu: Vec<u8>) -> Result<Vec<u8>, SessionError>;

    async fn stop(&self, message: Option<String>);
}
