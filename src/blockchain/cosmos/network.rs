//! Cosmos SDK REST (LCD) service.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::network::http::json_field;
use crate::network::{
    ChainErrorKind, Endpoint, HostProvider, HttpReply, JsonHttpClient, MultiProvider, NetworkError,
    NetworkResult,
};
use crate::pending::{reconcile, PendingTransactionStore, ReconcileReport, TransactionLookup};

/// gRPC status `NotFound` as reported by the REST gateway.
const GRPC_NOT_FOUND: i64 = 5;

/// Account fields a transfer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CosmosAccount {
    pub account_number: u64,
    pub sequence: u64,
}

/// Result of a full account sync.
#[derive(Debug, Clone)]
pub struct CosmosAccountInfo {
    pub account: CosmosAccount,
    /// Smallest-unit balances keyed by denomination.
    pub balances: HashMap<String, u64>,
    pub reconciled: ReconcileReport,
}

/// One LCD endpoint.
#[derive(Debug)]
pub struct CosmosRestProvider {
    endpoint: Endpoint,
    http: JsonHttpClient,
}

impl HostProvider for CosmosRestProvider {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl CosmosRestProvider {
    pub fn new(endpoint: Endpoint, http: JsonHttpClient) -> Self {
        Self { endpoint, http }
    }

    fn url(&self, path: &str) -> NetworkResult<url::Url> {
        self.endpoint
            .url(path)
            .map_err(|e| NetworkError::Transport(format!("bad URL for {path}: {e}")))
    }

    pub async fn account(&self, address: &str) -> NetworkResult<CosmosAccount> {
        let reply = self.http.get(self.url(&format!("cosmos/auth/v1beta1/accounts/{address}"))?).await?;
        let body = decode_envelope(reply, ChainErrorKind::AccountNotFound)?;

        // Vesting accounts nest the base account.
        let account = body
            .pointer("/account/base_vesting_account/base_account")
            .or_else(|| body.pointer("/account/base_account"))
            .or_else(|| body.get("account"))
            .ok_or_else(|| NetworkError::Decode("missing account".into()))?;

        Ok(CosmosAccount {
            account_number: json_field::u64(account, "/account_number")?,
            sequence: json_field::u64(account, "/sequence").unwrap_or(0),
        })
    }

    pub async fn balances(&self, address: &str) -> NetworkResult<HashMap<String, u64>> {
        let reply = self.http.get(self.url(&format!("cosmos/bank/v1beta1/balances/{address}"))?).await?;
        let body = decode_envelope(reply, ChainErrorKind::AccountNotFound)?;

        let entries = body
            .get("balances")
            .and_then(Value::as_array)
            .ok_or_else(|| NetworkError::Decode("missing balances".into()))?;
        entries
            .iter()
            .map(|entry| {
                let denom = json_field::str(entry, "/denom")?.to_string();
                let amount = json_field::u64(entry, "/amount")?;
                Ok((denom, amount))
            })
            .collect()
    }

    /// Gas used by a dummy-signed transaction.
    pub async fn simulate(&self, tx_bytes: &str) -> NetworkResult<u64> {
        let reply = self
            .http
            .post(self.url("cosmos/tx/v1beta1/simulate")?, &json!({ "tx_bytes": tx_bytes }))
            .await?;
        let body = decode_envelope(reply, ChainErrorKind::Other)?;
        json_field::u64(&body, "/gas_info/gas_used")
    }

    /// Broadcast a prepared request body, returning the transaction hash.
    pub async fn broadcast(&self, payload: &Value) -> NetworkResult<String> {
        let reply = self.http.post(self.url("cosmos/tx/v1beta1/txs")?, payload).await?;
        let body = decode_envelope(reply, ChainErrorKind::Other)?;

        let response = body
            .get("tx_response")
            .ok_or_else(|| NetworkError::Decode("missing tx_response".into()))?;
        let code = response.get("code").and_then(Value::as_i64).unwrap_or(0);
        if code != 0 {
            let log = response.get("raw_log").and_then(Value::as_str).unwrap_or_default();
            return Err(NetworkError::chain(classify_abci_code(code), Some(code), log));
        }
        Ok(json_field::str(response, "/txhash")?.to_string())
    }

    pub async fn transaction_height(&self, hash: &str) -> NetworkResult<Option<u64>> {
        let reply = self.http.get(self.url(&format!("cosmos/tx/v1beta1/txs/{hash}"))?).await?;
        let body = decode_envelope(reply, ChainErrorKind::TransactionNotFound)?;
        Ok(json_field::u64(&body, "/tx_response/height").ok())
    }
}

#[async_trait]
impl TransactionLookup for CosmosRestProvider {
    async fn confirmation(&self, hash: &str) -> NetworkResult<Option<u64>> {
        self.transaction_height(hash).await
    }
}

/// Re-classify `{code, message}` error bodies from the gRPC gateway.
fn decode_envelope(reply: HttpReply, not_found: ChainErrorKind) -> NetworkResult<Value> {
    let code = reply.body.get("code").and_then(Value::as_i64);
    match code {
        Some(code) if code != 0 => {
            let message = reply
                .body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let kind = if code == GRPC_NOT_FOUND || message.contains("not found") {
                not_found
            } else {
                classify_message(&message)
            };
            Err(NetworkError::chain(kind, Some(code), message))
        }
        _ if reply.is_success() => Ok(reply.body),
        _ => Err(NetworkError::Http {
            status: reply.status,
            body: reply.body.to_string(),
        }),
    }
}

/// Cosmos SDK ABCI codes from `tx_response.code`.
fn classify_abci_code(code: i64) -> ChainErrorKind {
    match code {
        5 => ChainErrorKind::InsufficientFunds,
        13 => ChainErrorKind::InsufficientFee,
        32 => ChainErrorKind::SequenceMismatch,
        _ => ChainErrorKind::Rejected,
    }
}

fn classify_message(message: &str) -> ChainErrorKind {
    if message.contains("insufficient fee") {
        ChainErrorKind::InsufficientFee
    } else if message.contains("insufficient funds") {
        ChainErrorKind::InsufficientFunds
    } else if message.contains("account sequence mismatch") {
        ChainErrorKind::SequenceMismatch
    } else {
        ChainErrorKind::Other
    }
}

/// Cosmos network service over an ordered set of LCD providers.
#[derive(Debug)]
pub struct CosmosNetworkService {
    providers: MultiProvider<CosmosRestProvider>,
}

impl CosmosNetworkService {
    pub fn new(providers: MultiProvider<CosmosRestProvider>) -> Self {
        Self { providers }
    }

    pub fn current_host(&self) -> String {
        self.providers.current_host()
    }

    /// Account, balances and pending confirmations from one provider.
    pub async fn account_info(
        &self,
        address: &str,
        pending: &PendingTransactionStore,
    ) -> NetworkResult<CosmosAccountInfo> {
        self.providers
            .execute(|provider| async move {
                let (account, balances, reconciled) = tokio::try_join!(
                    provider.account(address),
                    provider.balances(address),
                    reconcile(pending, provider.as_ref()),
                )?;
                Ok(CosmosAccountInfo {
                    account,
                    balances,
                    reconciled,
                })
            })
            .await
    }

    pub async fn estimate_gas(&self, tx_bytes: &str) -> NetworkResult<u64> {
        self.providers
            .execute(|provider| async move { provider.simulate(tx_bytes).await })
            .await
    }

    pub async fn send(&self, payload: &[u8]) -> NetworkResult<String> {
        let payload: Value = serde_json::from_slice(payload)?;
        let payload = &payload;
        self.providers
            .execute(|provider| async move { provider.broadcast(payload).await })
            .await
    }
}
