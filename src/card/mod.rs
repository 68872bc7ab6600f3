//! Hardware card session engine.
//!
//! # Data Flow
//! ```text
//! CardSdk::start_session(runnable)      (one session system-wide)
//!     → CardSession::start
//!         ├─ reader.is_available / start_polling
//!         ├─ preflight ReadCommand (wrong-card loop)
//!         └─ runnable.run(session)
//!               → session.send(command)  (one APDU in flight)
//!                   → TLV payload → crypto::seal → reader.transmit
//!                   ← status word: NeedPause / NeedEncryption / done
//!     → reader.stop, delegate.session_stopped
//! ```
//!
//! # Security Constraints
//! - PINs are held as SHA-256 hashes and zeroized on drop
//! - The session key is dropped whenever the tag leaves the field
//! - Never log APDU payloads

pub mod apdu;
pub mod commands;
pub mod crypto;
pub mod delegate;
pub mod environment;
pub mod error;
pub mod reader;
pub mod sdk;
pub mod session;
pub mod signer;
pub mod tlv;

pub use apdu::{CommandApdu, EncryptionMode, Instruction, ResponseApdu, StatusWord};
pub use delegate::{LoggingDelegate, SessionDelegate};
pub use environment::{Card, CardStatus, SessionEnvironment, SettingsMask};
pub use error::{SessionError, SessionResult};
pub use reader::{CardReader, TagState};
pub use sdk::CardSdk;
pub use session::{CardSession, CardSessionRunnable, SessionId, SessionOutcome, SessionState};
pub use signer::CardSigner;
