use async_trait::async_trait;

use crate::card::apdu::{CommandApdu, Instruction, ResponseApdu};
use crate::card::commands::Command;
use crate::card::environment::{Card, SessionEnvironment};
use crate::card::error::{SessionError, SessionResult};
use crate::card::session::{CardSession, CardSessionRunnable};
use crate::card::tlv::{TlvBuilder, TlvDecoder, TlvTag};

/// Reads card identity and wallet state.
///
/// Linked terminals attach their public key so the card can skip the
/// passcode delay for later signing.
#[derive(Debug, Default, Clone)]
pub struct ReadCommand;

impl ReadCommand {
    pub fn new() -> Self {
        Self
    }
}

impl Command for ReadCommand {
    type Response = Card;

    fn instruction(&self) -> Instruction {
        Instruction::Read
    }

    fn requires_preflight_read(&self) -> bool {
        false
    }

    fn serialize(&self, env: &SessionEnvironment) -> SessionResult<CommandApdu> {
        let mut tlv = TlvBuilder::new();
        tlv.append(TlvTag::Pin, env.pin1.as_slice())?;
        if let Some(keys) = env.terminal_keys.as_ref() {
            tlv.append(TlvTag::TerminalPublicKey, keys.public_key())?;
        }
        Ok(CommandApdu::new(self.instruction(), tlv.finish()))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: ResponseApdu) -> SessionResult<Card> {
        Card::decode(&TlvDecoder::new(&response.data)?)
    }
}

/// Returns the card found by the preflight read.
#[derive(Debug, Default, Clone)]
pub struct ScanTask;

#[async_trait]
impl CardSessionRunnable for ScanTask {
    type Response = Card;

    async fn run(&self, session: &CardSession) -> SessionResult<Card> {
        session.card().await.ok_or(SessionError::MissingPreflightRead)
    }
}
