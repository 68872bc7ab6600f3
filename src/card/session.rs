//! Card session state machine.
//!
//! # State Transitions
//! ```text
//! Inactive ──start()──► Active            (reader available)
//!          └──────────► Stopped(Failed)   (UnsupportedDevice)
//! Active ──tag present──► TagConnected ──APDU──► CommandInFlight
//! CommandInFlight ──NeedEncryption──► EncryptionNegotiating ──► CommandInFlight
//!                 ──NeedPause───────► SecurityDelay ──replay──► CommandInFlight
//!                 ──response────────► TagConnected
//! any ──stop() / tag not back in time / fatal error──► Stopped
//! ```
//!
//! Encryption escalates `None → Fast → Strong` on each `NeedEncryption`;
//! a refusal at `Strong` is fatal.
//!
//! # Design Decisions
//! - One APDU in flight per session: a second `send` fails with `Busy`
//!   before touching the reader
//! - The environment is only reachable through the session's own lock
//! - Tag presence is read lazily under that lock, so a tag loss can never
//!   race a response being decoded

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex as AsyncMutex};
use uuid::Uuid;

use crate::card::apdu::{CommandApdu, EncryptionMode, Instruction, ResponseApdu, StatusWord};
use crate::card::commands::{Command, ReadCommand};
use crate::card::crypto::{self, EphemeralExchange};
use crate::card::delegate::SessionDelegate;
use crate::card::environment::{Card, SessionEnvironment};
use crate::card::error::{SessionError, SessionResult};
use crate::card::reader::{CardReader, TagState};
use crate::card::tlv::{TlvBuilder, TlvDecoder, TlvTag};
use crate::config::schema::CardConfig;
use crate::observability::metrics;

/// Unique identifier for a session, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0.simple())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Success,
    Failed(SessionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    /// Running, no tag in the field.
    Active,
    TagConnected,
    EncryptionNegotiating,
    CommandInFlight,
    SecurityDelay,
    Stopped(SessionOutcome),
}

/// Work executed inside a started session.
#[async_trait]
pub trait CardSessionRunnable: Send + Sync {
    type Response: Send;

    /// Whether the card must be read before `run`.
    fn requires_preflight_read(&self) -> bool {
        true
    }

    async fn run(&self, session: &CardSession) -> SessionResult<Self::Response>;
}

/// Holds a flag for as long as it lives.
pub(crate) struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One card interaction, from `start` until it stops.
pub struct CardSession {
    id: SessionId,
    reader: Arc<dyn CardReader>,
    delegate: Arc<dyn SessionDelegate>,
    config: CardConfig,
    expected_card_id: Option<String>,
    initial_message: Option<String>,
    state: Mutex<SessionState>,
    started: AtomicBool,
    in_flight: AtomicBool,
    environment: AsyncMutex<SessionEnvironment>,
    tag_rx: AsyncMutex<watch::Receiver<TagState>>,
    cancel_tx: watch::Sender<bool>,
}

impl CardSession {
    pub fn new(
        reader: Arc<dyn CardReader>,
        delegate: Arc<dyn SessionDelegate>,
        config: CardConfig,
        expected_card_id: Option<String>,
    ) -> Self {
        let legacy_mode = config.legacy_mode.unwrap_or_else(|| reader.prefers_legacy_mode());
        let environment = SessionEnvironment::new(&config, legacy_mode);
        let tag_rx = reader.tag_state();
        let (cancel_tx, _) = watch::channel(false);
        Self {
            id: SessionId::new(),
            reader,
            delegate,
            config,
            expected_card_id,
            initial_message: None,
            state: Mutex::new(SessionState::Inactive),
            started: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            environment: AsyncMutex::new(environment),
            tag_rx: AsyncMutex::new(tag_rx),
            cancel_tx,
        }
    }

    /// Message shown by the reader while polling.
    pub fn with_initial_message(mut self, message: impl Into<String>) -> Self {
        self.initial_message = Some(message.into());
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            tracing::trace!(session_id = %self.id, from = ?*state, to = ?next, "Session state");
            *state = next;
        }
    }

    /// Card read during preflight, if any.
    pub async fn card(&self) -> Option<Card> {
        self.environment.lock().await.card.clone()
    }

    /// Override the access code before commands are sent.
    pub async fn set_pin1(&self, pin: &str) {
        self.environment.lock().await.set_pin1(pin);
    }

    /// Override the passcode before commands are sent.
    pub async fn set_pin2(&self, pin: &str) {
        self.environment.lock().await.set_pin2(pin);
    }

    /// Cancels a running session; it stops with `UserCancelled`.
    pub fn stop(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Runs `runnable` inside this session and stops it afterwards.
    ///
    /// A session runs at most once.
    pub async fn start<R>(&self, runnable: &R) -> SessionResult<R::Response>
    where
        R: CardSessionRunnable + ?Sized,
    {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(match self.state() {
                SessionState::Stopped(_) => SessionError::NotActive,
                _ => SessionError::Busy,
            });
        }

        if !self.reader.is_available().await {
            let error = SessionError::UnsupportedDevice;
            self.finish(Some(&error)).await;
            return Err(error);
        }

        self.set_state(SessionState::Active);
        tracing::info!(session_id = %self.id, expected_card = ?self.expected_card_id, "Card session started");
        metrics::record_session_event("started");
        self.delegate.session_started(self.id);

        let result = tokio::select! {
            result = self.run(runnable) => result,
            _ = cancelled(self.cancel_tx.subscribe()) => Err(SessionError::UserCancelled),
        };

        self.finish(result.as_ref().err()).await;
        result
    }

    async fn run<R>(&self, runnable: &R) -> SessionResult<R::Response>
    where
        R: CardSessionRunnable + ?Sized,
    {
        self.reader.start_polling(self.initial_message.clone()).await?;
        if runnable.requires_preflight_read() {
            self.preflight_read().await?;
        }
        runnable.run(self).await
    }

    async fn finish(&self, error: Option<&SessionError>) {
        let outcome = match error {
            Some(e) => SessionOutcome::Failed(e.clone()),
            None => SessionOutcome::Success,
        };
        self.set_state(SessionState::Stopped(outcome));

        match error {
            None => {
                tracing::info!(session_id = %self.id, "Card session finished");
                metrics::record_session_event("finished");
            }
            Some(SessionError::UserCancelled) => {
                tracing::debug!(session_id = %self.id, "Card session cancelled");
                metrics::record_session_event("cancelled");
            }
            Some(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Card session failed");
                metrics::record_session_event("failed");
            }
        }

        self.environment.lock().await.clear_key();
        self.reader.stop(error.map(ToString::to_string)).await;
        self.delegate.session_stopped(self.id, error);
    }

    /// Reads the card, looping while the wrong card is presented.
    async fn preflight_read(&self) -> SessionResult<()> {
        loop {
            let card = self.send(&ReadCommand::new()).await?;

            if let Some(expected) = &self.expected_card_id {
                if !expected.eq_ignore_ascii_case(&card.card_id) {
                    tracing::info!(
                        session_id = %self.id,
                        expected = %expected,
                        actual = %card.card_id,
                        "Wrong card, polling again"
                    );
                    metrics::record_session_event("wrong_card");
                    self.delegate.wrong_card(self.id, expected, &card.card_id);
                    tokio::time::sleep(Duration::from_millis(self.config.wrong_card_retry_delay_ms)).await;
                    self.reader.restart_polling().await?;
                    let mut env = self.environment.lock().await;
                    env.clear_key();
                    env.card = None;
                    continue;
                }
            }

            self.environment.lock().await.card = Some(card);
            return Ok(());
        }
    }

    /// Sends one command and decodes its response.
    pub async fn send<C>(&self, command: &C) -> SessionResult<C::Response>
    where
        C: Command + ?Sized,
    {
        let _in_flight = FlagGuard::acquire(&self.in_flight).ok_or(SessionError::Busy)?;
        if matches!(self.state(), SessionState::Inactive | SessionState::Stopped(_)) {
            return Err(SessionError::NotActive);
        }

        let mut env = self.environment.lock().await;
        if let Some(card) = env.card.as_ref() {
            command.pre_check(card)?;
        }
        let apdu = command.serialize(&env)?;
        let response = self.transceive(&mut env, apdu).await?;

        if !response.status.is_success() {
            return Err(command.map_error(env.card.as_ref(), response.status));
        }
        command.deserialize(&env, response)
    }

    async fn transceive(&self, env: &mut SessionEnvironment, apdu: CommandApdu) -> SessionResult<ResponseApdu> {
        loop {
            self.ensure_tag_connected(env).await?;

            if env.encryption_mode != EncryptionMode::None && env.encryption_key.is_none() {
                self.set_state(SessionState::EncryptionNegotiating);
                match self.establish_encryption(env).await {
                    Ok(()) => {}
                    Err(SessionError::TagLost) => {
                        env.clear_key();
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            let mut wire = apdu.clone();
            wire.p1 = env.encryption_mode;
            if let Some(key) = env.encryption_key.as_ref() {
                if !wire.data.is_empty() {
                    wire.data = crypto::seal(key.as_slice(), &wire.data)?;
                }
            }

            self.set_state(SessionState::CommandInFlight);
            let response = match self.exchange(&wire).await {
                Ok(response) => response,
                Err(SessionError::TagLost) => {
                    tracing::debug!(session_id = %self.id, ins = apdu.ins.name(), "Tag lost mid-command");
                    env.clear_key();
                    continue;
                }
                Err(e) => return Err(e),
            };

            match response.status {
                StatusWord::NeedPause => {
                    let decoder = TlvDecoder::new(&response.data)?;
                    let remaining_ms = decoder.optional_uint(TlvTag::Pause)?.unwrap_or(0) * 10;
                    let saved_to_flash = decoder.flag(TlvTag::Flash);

                    self.set_state(SessionState::SecurityDelay);
                    self.delegate.security_delay(self.id, remaining_ms);
                    if saved_to_flash {
                        tracing::debug!(session_id = %self.id, "Security delay saved to flash, polling again");
                        self.reader.restart_polling().await?;
                        env.clear_key();
                    }
                }
                StatusWord::NeedEncryption => {
                    let next = match env.encryption_mode {
                        EncryptionMode::None if self.config.allow_fast_encryption => EncryptionMode::Fast,
                        EncryptionMode::None | EncryptionMode::Fast => EncryptionMode::Strong,
                        EncryptionMode::Strong => return Err(SessionError::FailedToEstablishEncryption),
                    };
                    tracing::debug!(session_id = %self.id, from = ?env.encryption_mode, to = ?next, "Escalating encryption");
                    env.encryption_mode = next;
                    env.clear_key();
                }
                status => {
                    let data = match env.encryption_key.as_ref() {
                        Some(key) if !response.data.is_empty() => crypto::open(key.as_slice(), &response.data)?,
                        _ => response.data,
                    };
                    self.set_state(SessionState::TagConnected);
                    return Ok(ResponseApdu::new(data, status));
                }
            }
        }
    }

    async fn exchange(&self, apdu: &CommandApdu) -> SessionResult<ResponseApdu> {
        let raw = self.reader.transmit(apdu.to_bytes()?).await?;
        let response = ResponseApdu::from_bytes(&raw)?;
        metrics::record_apdu_round_trip(apdu.ins.name(), response.status.as_u16());
        Ok(response)
    }

    /// Waits for a tag. The first wait is unbounded; after a loss the tag
    /// must come back within the reconnect timeout.
    async fn ensure_tag_connected(&self, env: &mut SessionEnvironment) -> SessionResult<()> {
        let mut tag_rx = self.tag_rx.lock().await;
        loop {
            let current = tag_rx.borrow_and_update().clone();
            match current {
                TagState::Present { uid } => {
                    if env.tag_uid.as_deref() != Some(uid.as_slice()) {
                        env.clear_key();
                        env.tag_uid = Some(uid);
                        env.tag_seen = true;
                        self.set_state(SessionState::TagConnected);
                        self.delegate.tag_connected(self.id);
                    }
                    return Ok(());
                }
                TagState::Absent => {
                    if env.tag_uid.take().is_some() {
                        env.clear_key();
                        self.set_state(SessionState::Active);
                        self.delegate.tag_lost(self.id);
                    }

                    let changed = if env.tag_seen {
                        let timeout = Duration::from_millis(self.config.tag_reconnect_timeout_ms);
                        tokio::time::timeout(timeout, tag_rx.changed())
                            .await
                            .map_err(|_| SessionError::TagLost)?
                    } else {
                        tag_rx.changed().await
                    };
                    changed.map_err(|_| SessionError::Reader("tag state stream closed".to_string()))?;
                }
            }
        }
    }

    /// Negotiates a session key for the current mode.
    async fn establish_encryption(&self, env: &mut SessionEnvironment) -> SessionResult<()> {
        let uid = env.tag_uid.clone().unwrap_or_default();
        let mode = env.encryption_mode;

        let (terminal_half, exchange) = match mode {
            EncryptionMode::Strong => {
                let exchange = EphemeralExchange::new();
                (exchange.public_key().to_vec(), Some(exchange))
            }
            _ => (crypto::random_nonce().to_vec(), None),
        };

        let data = TlvBuilder::new().append(TlvTag::SessionKeyA, &terminal_half)?.finish();
        let apdu = CommandApdu {
            ins: Instruction::OpenSession,
            p1: mode,
            data,
        };
        let response = self.exchange(&apdu).await?;
        if !response.status.is_success() {
            tracing::warn!(session_id = %self.id, mode = ?mode, status = %response.status, "Card refused session key");
            return Err(SessionError::FailedToEstablishEncryption);
        }

        let decoder = TlvDecoder::new(&response.data).map_err(|_| SessionError::FailedToEstablishEncryption)?;
        let card_half = decoder
            .bytes(TlvTag::SessionKeyB)
            .map_err(|_| SessionError::FailedToEstablishEncryption)?;

        let key = match exchange {
            Some(exchange) => {
                let shared = exchange.shared_secret(&card_half)?;
                crypto::derive_strong_key(&shared, &uid, &terminal_half, &card_half)?
            }
            None => crypto::derive_fast_key(env.pin1.as_slice(), &uid, &terminal_half, &card_half)?,
        };
        env.encryption_key = Some(key);
        tracing::debug!(session_id = %self.id, mode = ?mode, "Session key established");
        Ok(())
    }
}

async fn cancelled(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl fmt::Debug for CardSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("expected_card_id", &self.expected_card_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_display() {
        let id = SessionId::new();
        let text = id.to_string();
        assert!(text.starts_with("session-"));
        assert_eq!(text.len(), "session-".len() + 32);
        assert_ne!(id, SessionId::new());
    }

    #[test]
    fn test_flag_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = FlagGuard::acquire(&flag).unwrap();
        assert!(FlagGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(FlagGuard::acquire(&flag).is_some());
    }
}
