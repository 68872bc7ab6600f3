//! Entry point for card operations.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::card::commands::{
    CreateWalletCommand, CreateWalletResponse, PurgeWalletCommand, PurgeWalletResponse, ReadIssuerDataCommand,
    ReadIssuerDataResponse, ReadIssuerExtraDataResponse, ReadIssuerExtraDataTask, ScanTask, SignCommand,
    SignResponse, WriteIssuerDataCommand, WriteIssuerDataResponse, WriteIssuerExtraDataTask,
};
use crate::card::delegate::SessionDelegate;
use crate::card::environment::Card;
use crate::card::error::{SessionError, SessionResult};
use crate::card::reader::CardReader;
use crate::card::session::{CardSession, CardSessionRunnable, FlagGuard};
use crate::config::schema::CardConfig;

/// Runs one card session at a time over a shared reader.
pub struct CardSdk {
    reader: Arc<dyn CardReader>,
    delegate: Arc<dyn SessionDelegate>,
    config: CardConfig,
    active: AtomicBool,
}

impl CardSdk {
    pub fn new(reader: Arc<dyn CardReader>, delegate: Arc<dyn SessionDelegate>, config: CardConfig) -> Self {
        Self {
            reader,
            delegate,
            config,
            active: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CardConfig {
        &self.config
    }

    /// Starts a session for `runnable`. Fails with `Busy` while another
    /// session is running.
    pub async fn start_session<R>(&self, runnable: &R, card_id: Option<&str>) -> SessionResult<R::Response>
    where
        R: CardSessionRunnable + ?Sized,
    {
        let _active = FlagGuard::acquire(&self.active).ok_or(SessionError::Busy)?;
        let session = CardSession::new(
            self.reader.clone(),
            self.delegate.clone(),
            self.config.clone(),
            card_id.map(str::to_string),
        );
        session.start(runnable).await
    }

    pub async fn scan(&self) -> SessionResult<Card> {
        self.start_session(&ScanTask, None).await
    }

    pub async fn sign(&self, hashes: Vec<Vec<u8>>, card_id: Option<&str>) -> SessionResult<SignResponse> {
        let command = SignCommand::new(hashes)?;
        self.start_session(&command, card_id).await
    }

    pub async fn create_wallet(&self, card_id: Option<&str>) -> SessionResult<CreateWalletResponse> {
        self.start_session(&CreateWalletCommand::new(), card_id).await
    }

    pub async fn purge_wallet(&self, card_id: Option<&str>) -> SessionResult<PurgeWalletResponse> {
        self.start_session(&PurgeWalletCommand::new(), card_id).await
    }

    pub async fn read_issuer_data(
        &self,
        card_id: Option<&str>,
        issuer_public_key: Option<Vec<u8>>,
    ) -> SessionResult<ReadIssuerDataResponse> {
        self.start_session(&ReadIssuerDataCommand::new(issuer_public_key), card_id)
            .await
    }

    pub async fn write_issuer_data(
        &self,
        card_id: Option<&str>,
        issuer_data: Vec<u8>,
        issuer_data_signature: Vec<u8>,
        issuer_data_counter: Option<u32>,
        issuer_public_key: Option<Vec<u8>>,
    ) -> SessionResult<WriteIssuerDataResponse> {
        let command = WriteIssuerDataCommand::new(
            issuer_data,
            issuer_data_signature,
            issuer_data_counter,
            issuer_public_key,
        );
        self.start_session(&command, card_id).await
    }

    pub async fn read_issuer_extra_data(
        &self,
        card_id: Option<&str>,
        issuer_public_key: Option<Vec<u8>>,
    ) -> SessionResult<ReadIssuerExtraDataResponse> {
        self.start_session(&ReadIssuerExtraDataTask::new(issuer_public_key), card_id)
            .await
    }

    /// Returns the id of the card written to.
    pub async fn write_issuer_extra_data(
        &self,
        card_id: Option<&str>,
        task: WriteIssuerExtraDataTask,
    ) -> SessionResult<String> {
        self.start_session(&task, card_id).await
    }
}

impl std::fmt::Debug for CardSdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardSdk").field("config", &self.config).finish()
    }
}
