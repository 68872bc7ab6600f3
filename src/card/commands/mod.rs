//! Typed card commands.
//!
//! # Data Flow
//! ```text
//! Command::pre_check(card)      ← card from the preflight read
//!     → Command::serialize(env) → CommandApdu (TLV payload)
//!     → CardSession::transceive (encryption, pauses, tag loss)
//!     → status success ? Command::deserialize : Command::map_error
//! ```
//!
//! Every `Command` is also a `CardSessionRunnable` that sends itself once.
//! Multi-APDU flows (extra data, scan) are runnables built from commands.

mod issuer_data;
mod issuer_extra_data;
mod read;
mod sign;
mod wallet;

use async_trait::async_trait;

pub use issuer_data::{ReadIssuerDataCommand, ReadIssuerDataResponse, WriteIssuerDataCommand, WriteIssuerDataResponse};
pub use issuer_extra_data::{
    ReadIssuerExtraDataResponse, ReadIssuerExtraDataTask, WriteIssuerExtraDataTask, EXTRA_DATA_CHUNK_SIZE,
    MAX_EXTRA_DATA_SIZE,
};
pub use read::{ReadCommand, ScanTask};
pub use sign::{SignCommand, SignResponse, MAX_HASHES_PER_COMMAND};
pub use wallet::{CreateWalletCommand, CreateWalletResponse, PurgeWalletCommand, PurgeWalletResponse};

use crate::card::apdu::{CommandApdu, Instruction, ResponseApdu, StatusWord};
use crate::card::environment::{Card, SessionEnvironment};
use crate::card::error::{SessionError, SessionResult};
use crate::card::session::{CardSession, CardSessionRunnable};
use crate::card::tlv::{TlvBuilder, TlvTag};

/// One APDU exchange with typed request and response.
pub trait Command: Send + Sync {
    type Response: Send;

    fn instruction(&self) -> Instruction;

    fn requires_preflight_read(&self) -> bool {
        true
    }

    /// Rejects the command locally before anything is sent.
    fn pre_check(&self, _card: &Card) -> SessionResult<()> {
        Ok(())
    }

    fn serialize(&self, env: &SessionEnvironment) -> SessionResult<CommandApdu>;

    fn deserialize(&self, env: &SessionEnvironment, response: ResponseApdu) -> SessionResult<Self::Response>;

    fn map_error(&self, _card: Option<&Card>, status: StatusWord) -> SessionError {
        match status {
            StatusWord::InvalidParams => SessionError::AccessCodeRequired,
            other => SessionError::Card(other),
        }
    }
}

#[async_trait]
impl<C: Command> CardSessionRunnable for C {
    type Response = <C as Command>::Response;

    fn requires_preflight_read(&self) -> bool {
        Command::requires_preflight_read(self)
    }

    async fn run(&self, session: &CardSession) -> SessionResult<Self::Response> {
        session.send(self).await
    }
}

/// Payload prefix most commands share: access code and card id.
fn authorized_payload(env: &SessionEnvironment) -> SessionResult<TlvBuilder> {
    let card = env.card()?;
    let mut tlv = TlvBuilder::new();
    tlv.append(TlvTag::Pin, env.pin1.as_slice())?
        .append_hex(TlvTag::CardId, &card.card_id)?;
    Ok(tlv)
}

/// As `authorized_payload`, plus the passcode.
fn authorized_payload_with_pin2(env: &SessionEnvironment) -> SessionResult<TlvBuilder> {
    let card = env.card()?;
    let mut tlv = TlvBuilder::new();
    tlv.append(TlvTag::Pin, env.pin1.as_slice())?
        .append(TlvTag::Pin2, env.pin2.as_slice())?
        .append_hex(TlvTag::CardId, &card.card_id)?;
    if let Some(cvc) = &env.cvc {
        tlv.append_str(TlvTag::Cvc, cvc)?;
    }
    Ok(tlv)
}
