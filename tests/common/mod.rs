//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use cardwallet_core::card::crypto::{self, EphemeralExchange};
use cardwallet_core::card::tlv::{TlvBuilder, TlvDecoder, TlvTag};
use cardwallet_core::card::{
    CardReader, CommandApdu, EncryptionMode, Instruction, ResponseApdu, SessionDelegate, SessionError, SessionId,
    StatusWord, TagState,
};
use cardwallet_core::config::schema::{CardConfig, CoreConfig};
use cardwallet_core::transaction::{EllipticCurve, SignerError, TransactionSigner, WalletPublicKey};

// ---------------------------------------------------------------------------
// HTTP backends
// ---------------------------------------------------------------------------

/// What a mock backend saw.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Value,
}

impl RecordedRequest {
    /// JSON-RPC method name, if the body carries one.
    pub fn rpc_method(&self) -> &str {
        self.body.get("method").and_then(Value::as_str).unwrap_or_default()
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = serde_json::from_slice(&buf[header_end..]).unwrap_or(Value::Null);
    Some(RecordedRequest { method, path, body })
}

/// Start a programmable mock backend that answers each request with `f(request)`.
///
/// Binds an ephemeral port and returns the bound address.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some(request) = read_request(&mut socket).await else {
                            return;
                        };
                        let (status, body) = f(request).await;
                        let status_text = match status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn url(addr: SocketAddr) -> String {
    format!("http://{addr}")
}

/// Config pointing each chain family at the given provider URLs.
pub fn test_config(cosmos: &[String], solana: &[String], xrp: &[String]) -> CoreConfig {
    let mut config = CoreConfig::default();
    config.network.request_timeout_secs = 2;
    config.cosmos.providers = cosmos.to_vec();
    config.solana.providers = solana.to_vec();
    config.xrp.providers = xrp.to_vec();
    config
}

// ---------------------------------------------------------------------------
// Local signers
// ---------------------------------------------------------------------------

/// Signs with in-memory keys, secp256k1 over prehashes and ed25519 over messages.
pub struct LocalSigner {
    secp: SigningKey,
    ed: ed25519_dalek::SigningKey,
    pub calls: AtomicUsize,
}

impl LocalSigner {
    pub fn new() -> Self {
        Self {
            secp: SigningKey::from_slice(&[0x11; 32]).unwrap(),
            ed: ed25519_dalek::SigningKey::from_bytes(&[0x22; 32]),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn secp256k1_key(&self) -> WalletPublicKey {
        WalletPublicKey::new(
            self.secp.verifying_key().to_encoded_point(true).as_bytes().to_vec(),
            EllipticCurve::Secp256k1,
        )
    }

    pub fn ed25519_key(&self) -> WalletPublicKey {
        WalletPublicKey::new(self.ed.verifying_key().to_bytes().to_vec(), EllipticCurve::Ed25519)
    }
}

#[async_trait]
impl TransactionSigner for LocalSigner {
    async fn sign(&self, hash: &[u8], public_key: &WalletPublicKey) -> Result<Vec<u8>, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match public_key.curve {
            EllipticCurve::Secp256k1 => {
                let signature: k256::ecdsa::Signature = self
                    .secp
                    .sign_prehash(hash)
                    .map_err(|e| SignerError::Failed(e.to_string()))?;
                Ok(signature.to_bytes().to_vec())
            }
            EllipticCurve::Ed25519 => Ok(ed25519_dalek::Signer::sign(&self.ed, hash).to_bytes().to_vec()),
        }
    }
}

// ---------------------------------------------------------------------------
// Card emulator
// ---------------------------------------------------------------------------

pub const PIN1: &str = "000000";
pub const PIN2: &str = "000";
const CHUNK: usize = 512;

/// One card the emulator can present.
#[derive(Clone)]
pub struct EmulatedCard {
    pub card_id: Vec<u8>,
    pub uid: Vec<u8>,
    pub status: u8,
    pub settings_mask: u32,
    pub wallet: Option<SigningKey>,
    pub remaining_signatures: u32,
    pub issuer_public_key: Option<Vec<u8>>,
    pub issuer_data: Vec<u8>,
    pub issuer_data_signature: Vec<u8>,
    pub issuer_data_counter: Option<u32>,
    pub extra_data: Vec<u8>,
    pub extra_data_signature: Vec<u8>,
    pub extra_data_counter: Option<u32>,
    /// Return signatures with S in the high half, as secure elements may.
    pub high_s: bool,
    extra_buffer: Vec<u8>,
}

impl EmulatedCard {
    pub fn new(card_id: &str, uid: &[u8]) -> Self {
        Self {
            card_id: hex::decode(card_id).unwrap(),
            uid: uid.to_vec(),
            status: 1,
            settings_mask: 0,
            wallet: None,
            remaining_signatures: 100,
            issuer_public_key: None,
            issuer_data: Vec::new(),
            issuer_data_signature: Vec::new(),
            issuer_data_counter: None,
            extra_data: Vec::new(),
            extra_data_signature: Vec::new(),
            extra_data_counter: None,
            high_s: false,
            extra_buffer: Vec::new(),
        }
    }

    pub fn loaded(card_id: &str, uid: &[u8]) -> Self {
        let mut card = Self::new(card_id, uid);
        card.status = 2;
        card.wallet = Some(SigningKey::from_slice(&[0x11; 32]).unwrap());
        card
    }

    pub fn card_id_hex(&self) -> String {
        hex::encode_upper(&self.card_id)
    }

    pub fn wallet_public_key(&self) -> Option<Vec<u8>> {
        self.wallet
            .as_ref()
            .map(|key| key.verifying_key().to_encoded_point(true).as_bytes().to_vec())
    }
}

/// Behaviour knobs for the emulator.
#[derive(Debug, Clone, Default)]
pub struct EmulatorScript {
    pub unavailable: bool,
    pub cancel_on_polling: bool,
    /// Minimum P1 the card accepts; 4 refuses every mode.
    pub required_mode: u8,
    /// `(centiseconds, saved_to_flash)` returned to successive sign commands.
    pub pauses: VecDeque<(u16, bool)>,
    pub transmit_delay: Duration,
    /// Drop the tag on the first sign, returning after `Some(delay)` or never.
    pub drop_tag_on_sign: Option<Option<Duration>>,
}

struct EmulatorState {
    cards: VecDeque<EmulatedCard>,
    script: EmulatorScript,
    session_key: Option<crypto::SessionKey>,
    session_mode: EncryptionMode,
}

/// In-process card and reader.
pub struct CardEmulator {
    state: Mutex<EmulatorState>,
    tag_tx: watch::Sender<TagState>,
    pub transmits: AtomicUsize,
    pub restarts: AtomicUsize,
    pub instructions: Mutex<Vec<Instruction>>,
    pub raw_commands: Mutex<Vec<Vec<u8>>>,
    pub negotiated_modes: Mutex<Vec<EncryptionMode>>,
}

impl CardEmulator {
    pub fn new(cards: Vec<EmulatedCard>, script: EmulatorScript) -> Arc<Self> {
        let (tag_tx, _) = watch::channel(TagState::Absent);
        Arc::new(Self {
            state: Mutex::new(EmulatorState {
                cards: cards.into(),
                script,
                session_key: None,
                session_mode: EncryptionMode::None,
            }),
            tag_tx,
            transmits: AtomicUsize::new(0),
            restarts: AtomicUsize::new(0),
            instructions: Mutex::new(Vec::new()),
            raw_commands: Mutex::new(Vec::new()),
            negotiated_modes: Mutex::new(Vec::new()),
        })
    }

    pub fn card(&self) -> EmulatedCard {
        self.state.lock().unwrap().cards[0].clone()
    }

    pub fn instructions(&self) -> Vec<Instruction> {
        self.instructions.lock().unwrap().clone()
    }

    fn present_front(&self) {
        let uid = self.state.lock().unwrap().cards[0].uid.clone();
        self.tag_tx.send_replace(TagState::Present { uid });
    }

    fn respond(&self, apdu: CommandApdu) -> Result<ResponseApdu, SessionError> {
        let mut state = self.state.lock().unwrap();

        if apdu.ins == Instruction::OpenSession {
            let uid = state.cards[0].uid.clone();
            let pin1 = crypto::sha256(PIN1.as_bytes());
            let a = TlvDecoder::new(&apdu.data)?.bytes(TlvTag::SessionKeyA)?;
            let (b, key) = match apdu.p1 {
                EncryptionMode::Strong => {
                    let exchange = EphemeralExchange::new();
                    let shared = exchange.shared_secret(&a)?;
                    let b = exchange.public_key().to_vec();
                    let key = crypto::derive_strong_key(&shared, &uid, &a, &b)?;
                    (b, key)
                }
                _ => {
                    let b = crypto::random_nonce().to_vec();
                    let key = crypto::derive_fast_key(&pin1, &uid, &a, &b)?;
                    (b, key)
                }
            };
            state.session_key = Some(key);
            state.session_mode = apdu.p1;
            self.negotiated_modes.lock().unwrap().push(apdu.p1);
            let data = TlvBuilder::new().append(TlvTag::SessionKeyB, &b)?.finish();
            return Ok(ResponseApdu::new(data, StatusWord::ProcessCompleted));
        }

        if (apdu.p1 as u8) < state.script.required_mode {
            return Ok(ResponseApdu::new(Vec::new(), StatusWord::NeedEncryption));
        }

        let key = if apdu.p1 == EncryptionMode::None {
            None
        } else {
            match (&state.session_key, state.session_mode == apdu.p1) {
                (Some(key), true) => Some(key.clone()),
                _ => return Ok(ResponseApdu::new(Vec::new(), StatusWord::NeedEncryption)),
            }
        };
        let data = match &key {
            Some(key) if !apdu.data.is_empty() => crypto::open(key.as_slice(), &apdu.data)?,
            _ => apdu.data.clone(),
        };

        if apdu.ins == Instruction::Sign {
            if let Some((centiseconds, flash)) = state.script.pauses.pop_front() {
                let mut tlv = TlvBuilder::new();
                tlv.append_u16(TlvTag::Pause, centiseconds)?;
                if flash {
                    tlv.append(TlvTag::Flash, &[])?;
                }
                return Ok(ResponseApdu::new(tlv.finish(), StatusWord::NeedPause));
            }
        }

        let card = &mut state.cards[0];
        let (out, status) = handle(card, apdu.ins, &TlvDecoder::new(&data)?)?;
        let out = match &key {
            Some(key) if !out.is_empty() => crypto::seal(key.as_slice(), &out)?,
            _ => out,
        };
        Ok(ResponseApdu::new(out, status))
    }
}

fn handle(card: &mut EmulatedCard, ins: Instruction, request: &TlvDecoder) -> Result<(Vec<u8>, StatusWord), SessionError> {
    if request.bytes(TlvTag::Pin)? != crypto::sha256(PIN1.as_bytes()) {
        return Ok((Vec::new(), StatusWord::InvalidParams));
    }
    let mut tlv = TlvBuilder::new();
    tlv.append(TlvTag::CardId, &card.card_id)?;

    match ins {
        Instruction::Read => {
            tlv.append_str(TlvTag::ManufacturerName, "EMULATOR")?
                .append_u8(TlvTag::Status, card.status)?
                .append_str(TlvTag::CurveId, "secp256k1")?
                .append_u32(TlvTag::SettingsMask, card.settings_mask)?;
            if let Some(key) = card.wallet_public_key() {
                tlv.append(TlvTag::WalletPublicKey, &key)?
                    .append_u32(TlvTag::WalletRemainingSignatures, card.remaining_signatures)?;
            }
            if let Some(key) = &card.issuer_public_key {
                tlv.append(TlvTag::IssuerDataPublicKey, key)?;
            }
        }
        Instruction::Sign => {
            let Some(wallet) = card.wallet.as_ref() else {
                return Ok((Vec::new(), StatusWord::InvalidState));
            };
            let size = request.uint(TlvTag::TransactionOutHashSize)? as usize;
            let joined = request.bytes(TlvTag::TransactionOutHash)?;
            let mut signatures = Vec::new();
            for hash in joined.chunks(size) {
                let signature: k256::ecdsa::Signature = wallet
                    .sign_prehash(hash)
                    .map_err(|e| SessionError::Reader(e.to_string()))?;
                let signature = if card.high_s {
                    let (r, s) = signature.split_scalars();
                    k256::ecdsa::Signature::from_scalars(r.to_bytes(), (-*s).to_bytes()).unwrap()
                } else {
                    signature
                };
                signatures.extend_from_slice(&signature.to_bytes());
            }
            card.remaining_signatures -= (joined.len() / size) as u32;
            tlv.append(TlvTag::Signature, &signatures)?
                .append_u32(TlvTag::WalletRemainingSignatures, card.remaining_signatures)?;
        }
        Instruction::CreateWallet => {
            if card.status != 1 {
                return Ok((Vec::new(), StatusWord::InvalidState));
            }
            card.wallet = Some(SigningKey::from_slice(&[0x55; 32]).unwrap());
            card.status = 2;
            tlv.append_u8(TlvTag::Status, card.status)?
                .append(TlvTag::WalletPublicKey, &card.wallet_public_key().unwrap_or_default())?;
        }
        Instruction::PurgeWallet => {
            card.wallet = None;
            card.status = 3;
            tlv.append_u8(TlvTag::Status, card.status)?;
        }
        Instruction::ReadIssuerData => {
            tlv.append(TlvTag::IssuerData, &card.issuer_data)?
                .append(TlvTag::IssuerDataSignature, &card.issuer_data_signature)?;
            if let Some(counter) = card.issuer_data_counter {
                tlv.append_u32(TlvTag::IssuerDataCounter, counter)?;
            }
        }
        Instruction::WriteIssuerData => {
            card.issuer_data = request.bytes(TlvTag::IssuerData)?;
            card.issuer_data_signature = request.bytes(TlvTag::IssuerDataSignature)?;
            card.issuer_data_counter = request.optional_uint(TlvTag::IssuerDataCounter)?.map(|c| c as u32);
        }
        Instruction::ReadIssuerExtraData => {
            let offset = request.uint(TlvTag::Offset)? as usize;
            if offset == 0 {
                tlv.append_u32(TlvTag::Size, card.extra_data.len() as u32)?;
            }
            let end = (offset + CHUNK).min(card.extra_data.len());
            tlv.append(TlvTag::IssuerData, &card.extra_data[offset.min(end)..end])?;
            if end == card.extra_data.len() {
                tlv.append(TlvTag::IssuerDataSignature, &card.extra_data_signature)?;
                if let Some(counter) = card.extra_data_counter {
                    tlv.append_u32(TlvTag::IssuerDataCounter, counter)?;
                }
            }
        }
        Instruction::WriteIssuerExtraData => match request.uint(TlvTag::Mode)? {
            1 => {
                let size = request.uint(TlvTag::Size)? as usize;
                card.extra_buffer = vec![0; size];
                card.extra_data_counter = request.optional_uint(TlvTag::IssuerDataCounter)?.map(|c| c as u32);
            }
            2 => {
                let offset = request.uint(TlvTag::Offset)? as usize;
                let part = request.bytes(TlvTag::IssuerData)?;
                card.extra_buffer[offset..offset + part.len()].copy_from_slice(&part);
            }
            _ => {
                card.extra_data = std::mem::take(&mut card.extra_buffer);
                card.extra_data_signature = request.bytes(TlvTag::IssuerDataSignature)?;
            }
        },
        Instruction::OpenSession => unreachable!("handled before dispatch"),
    }
    Ok((tlv.finish(), StatusWord::ProcessCompleted))
}

#[async_trait]
impl CardReader for CardEmulator {
    async fn is_available(&self) -> bool {
        !self.state.lock().unwrap().script.unavailable
    }

    fn tag_state(&self) -> watch::Receiver<TagState> {
        self.tag_tx.subscribe()
    }

    async fn start_polling(&self, _message: Option<String>) -> Result<(), SessionError> {
        if self.state.lock().unwrap().script.cancel_on_polling {
            return Err(SessionError::UserCancelled);
        }
        self.present_front();
        Ok(())
    }

    async fn restart_polling(&self) -> Result<(), SessionError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        self.tag_tx.send_replace(TagState::Absent);
        {
            let mut state = self.state.lock().unwrap();
            if state.cards.len() > 1 {
                state.cards.pop_front();
            }
            state.session_key = None;
        }
        self.present_front();
        Ok(())
    }

    async fn transmit(&self, apdu: Vec<u8>) -> Result<Vec<u8>, SessionError> {
        let delay = self.state.lock().unwrap().script.transmit_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.transmits.fetch_add(1, Ordering::SeqCst);
        self.raw_commands.lock().unwrap().push(apdu.clone());

        let command = CommandApdu::from_bytes(&apdu)?;
        self.instructions.lock().unwrap().push(command.ins);

        if command.ins == Instruction::Sign {
            let dropped = self.state.lock().unwrap().script.drop_tag_on_sign.take();
            if let Some(comeback) = dropped {
                self.state.lock().unwrap().session_key = None;
                self.tag_tx.send_replace(TagState::Absent);
                if let Some(delay) = comeback {
                    let uid = self.state.lock().unwrap().cards[0].uid.clone();
                    let tag_tx = self.tag_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        tag_tx.send_replace(TagState::Present { uid });
                    });
                }
                return Err(SessionError::TagLost);
            }
        }

        Ok(self.respond(command)?.to_bytes())
    }

    async fn stop(&self, _message: Option<String>) {
        self.tag_tx.send_replace(TagState::Absent);
    }
}

// ---------------------------------------------------------------------------
// Delegate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Started,
    TagConnected,
    TagLost,
    SecurityDelay(u64),
    WrongCard { expected: String, actual: String },
    Stopped(Option<SessionError>),
}

/// Records every delegate callback.
#[derive(Default)]
pub struct RecordingDelegate {
    pub events: Mutex<Vec<SessionEvent>>,
}

impl RecordingDelegate {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: SessionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl SessionDelegate for RecordingDelegate {
    fn session_started(&self, _session: SessionId) {
        self.push(SessionEvent::Started);
    }

    fn tag_connected(&self, _session: SessionId) {
        self.push(SessionEvent::TagConnected);
    }

    fn tag_lost(&self, _session: SessionId) {
        self.push(SessionEvent::TagLost);
    }

    fn security_delay(&self, _session: SessionId, remaining_ms: u64) {
        self.push(SessionEvent::SecurityDelay(remaining_ms));
    }

    fn wrong_card(&self, _session: SessionId, expected: &str, actual: &str) {
        self.push(SessionEvent::WrongCard {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }

    fn session_stopped(&self, _session: SessionId, error: Option<&SessionError>) {
        self.push(SessionEvent::Stopped(error.cloned()));
    }
}

/// Card settings with short delays for tests.
pub fn card_config() -> CardConfig {
    CardConfig {
        wrong_card_retry_delay_ms: 10,
        tag_reconnect_timeout_ms: 500,
        linked_terminal: false,
        ..CardConfig::default()
    }
}
