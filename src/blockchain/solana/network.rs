//! Solana JSON-RPC service.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::blockchain::solana::builder::TokenProgram;
use crate::network::http::json_field;
use crate::network::{
    ChainErrorKind, Endpoint, HostProvider, HttpReply, JsonHttpClient, MultiProvider, NetworkError,
    NetworkResult,
};
use crate::pending::{reconcile, PendingTransactionStore, ReconcileReport, TransactionLookup};

/// Node is behind or cannot serve the slot yet.
const RPC_NODE_UNHEALTHY: i64 = -32005;
const RPC_INTERNAL_ERROR: i64 = -32603;
/// Preflight simulation failed.
const RPC_SEND_SIMULATION_FAILED: i64 = -32002;

/// The owner's token accounts under every token program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolanaTokenAccounts {
    /// Balances in smallest units keyed by mint.
    pub balances: HashMap<String, u64>,
    /// Account size in bytes keyed by mint.
    pub spaces: HashMap<String, u64>,
    /// Owning program keyed by mint.
    pub programs: HashMap<String, TokenProgram>,
}

impl SolanaTokenAccounts {
    fn merge(&mut self, other: SolanaTokenAccounts) {
        for (mint, amount) in other.balances {
            *self.balances.entry(mint).or_insert(0) += amount;
        }
        self.spaces.extend(other.spaces);
        self.programs.extend(other.programs);
    }
}

/// Result of a full account sync.
#[derive(Debug, Clone)]
pub struct SolanaAccountInfo {
    pub lamports: u64,
    pub tokens: SolanaTokenAccounts,
    pub reconciled: ReconcileReport,
}

/// One JSON-RPC endpoint.
#[derive(Debug)]
pub struct SolanaRpcProvider {
    endpoint: Endpoint,
    http: JsonHttpClient,
}

impl HostProvider for SolanaRpcProvider {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl SolanaRpcProvider {
    pub fn new(endpoint: Endpoint, http: JsonHttpClient) -> Self {
        Self { endpoint, http }
    }

    async fn call(&self, method: &str, params: Value) -> NetworkResult<Value> {
        let url = self
            .endpoint
            .url("")
            .map_err(|e| NetworkError::Transport(format!("bad URL: {e}")))?;
        let reply = self.http.json_rpc(url, method, params).await?;
        decode_rpc_envelope(reply)
    }

    pub async fn balance(&self, address: &str) -> NetworkResult<u64> {
        let result = self
            .call("getBalance", json!([address, {"commitment": "confirmed"}]))
            .await?;
        json_field::u64(&result, "/value")
    }

    /// Token accounts the owner holds under `program`, summed per mint.
    async fn token_accounts_of(&self, owner: &str, program: TokenProgram) -> NetworkResult<SolanaTokenAccounts> {
        let result = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner,
                    {"programId": program.id()},
                    {"encoding": "jsonParsed", "commitment": "confirmed"}
                ]),
            )
            .await?;

        let accounts = result
            .get("value")
            .and_then(Value::as_array)
            .ok_or_else(|| NetworkError::Decode("missing token accounts".into()))?;

        let mut tokens = SolanaTokenAccounts::default();
        for account in accounts {
            let info = account
                .pointer("/account/data/parsed/info")
                .ok_or_else(|| NetworkError::Decode("token account is not parsed".into()))?;
            let mint = json_field::str(info, "/mint")?.to_string();
            let amount = json_field::u64(info, "/tokenAmount/amount")?;
            let space = json_field::u64(account, "/account/space").unwrap_or_else(|_| program.base_account_space());
            *tokens.balances.entry(mint.clone()).or_insert(0) += amount;
            tokens.spaces.insert(mint.clone(), space);
            tokens.programs.insert(mint, program);
        }
        Ok(tokens)
    }

    /// Token accounts under both the SPL Token and Token-2022 programs.
    pub async fn token_accounts(&self, owner: &str) -> NetworkResult<SolanaTokenAccounts> {
        let (mut tokens, token_2022) = tokio::try_join!(
            self.token_accounts_of(owner, TokenProgram::Spl),
            self.token_accounts_of(owner, TokenProgram::Token2022),
        )?;
        tokens.merge(token_2022);
        Ok(tokens)
    }

    /// The token program that owns `mint`.
    pub async fn token_program(&self, mint: &str) -> NetworkResult<TokenProgram> {
        let result = self
            .call("getAccountInfo", json!([mint, {"encoding": "base64"}]))
            .await?;
        let value = result.get("value").filter(|v| !v.is_null()).ok_or_else(|| {
            NetworkError::chain(ChainErrorKind::AccountNotFound, None, format!("mint {mint} not found"))
        })?;
        let owner = json_field::str(value, "/owner")?;
        TokenProgram::from_owner(owner).ok_or_else(|| {
            NetworkError::chain(
                ChainErrorKind::Other,
                None,
                format!("mint {mint} is owned by {owner}, not a token program"),
            )
        })
    }

    pub async fn account_exists(&self, address: &str) -> NetworkResult<bool> {
        let result = self
            .call("getAccountInfo", json!([address, {"encoding": "base64"}]))
            .await?;
        Ok(!result.get("value").map_or(true, Value::is_null))
    }

    pub async fn latest_blockhash(&self) -> NetworkResult<String> {
        let result = self
            .call("getLatestBlockhash", json!([{"commitment": "finalized"}]))
            .await?;
        Ok(json_field::str(&result, "/value/blockhash")?.to_string())
    }

    /// Lamports the network charges for a base64 message.
    pub async fn fee_for_message(&self, message: &str) -> NetworkResult<u64> {
        let result = self
            .call("getFeeForMessage", json!([message, {"commitment": "processed"}]))
            .await?;
        // A null value means the blockhash already expired on this node.
        json_field::u64(&result, "/value").map_err(|_| {
            NetworkError::chain(ChainErrorKind::NodeUnavailable, None, "fee unavailable for message")
        })
    }

    pub async fn minimum_balance_for_rent_exemption(&self, space: u64) -> NetworkResult<u64> {
        let result = self.call("getMinimumBalanceForRentExemption", json!([space])).await?;
        result
            .as_u64()
            .ok_or_else(|| NetworkError::Decode("rent exemption is not an integer".into()))
    }

    pub async fn send_transaction(&self, transaction: &str) -> NetworkResult<String> {
        let result = self
            .call(
                "sendTransaction",
                json!([transaction, {"encoding": "base64", "preflightCommitment": "confirmed"}]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| NetworkError::Decode("signature is not a string".into()))
    }

    /// Slot of a confirmed or finalized signature.
    pub async fn signature_slot(&self, signature: &str) -> NetworkResult<Option<u64>> {
        let result = self
            .call(
                "getSignatureStatuses",
                json!([[signature], {"searchTransactionHistory": true}]),
            )
            .await?;
        let status = result.pointer("/value/0").filter(|v| !v.is_null());
        let Some(status) = status else {
            return Ok(None);
        };
        let confirmed = matches!(
            status.get("confirmationStatus").and_then(Value::as_str),
            Some("confirmed" | "finalized")
        );
        if !confirmed {
            return Ok(None);
        }
        Ok(json_field::u64(status, "/slot").ok())
    }
}

#[async_trait]
impl TransactionLookup for SolanaRpcProvider {
    async fn confirmation(&self, hash: &str) -> NetworkResult<Option<u64>> {
        self.signature_slot(hash).await
    }
}

/// Unwrap a JSON-RPC 2.0 envelope into its `result`.
fn decode_rpc_envelope(reply: HttpReply) -> NetworkResult<Value> {
    if let Some(error) = reply.body.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let kind = classify_rpc_error(code, &message);
        return Err(NetworkError::chain(kind, code, message));
    }
    if !reply.is_success() {
        return Err(NetworkError::Http {
            status: reply.status,
            body: reply.body.to_string(),
        });
    }
    reply
        .body
        .get("result")
        .cloned()
        .ok_or_else(|| NetworkError::Decode("missing result".into()))
}

fn classify_rpc_error(code: Option<i64>, message: &str) -> ChainErrorKind {
    match code {
        Some(RPC_NODE_UNHEALTHY | RPC_INTERNAL_ERROR) => ChainErrorKind::NodeUnavailable,
        _ if message.contains("insufficient funds") || message.contains("insufficient lamports") => {
            ChainErrorKind::InsufficientFunds
        }
        _ if message.contains("Blockhash not found") => ChainErrorKind::SequenceMismatch,
        Some(RPC_SEND_SIMULATION_FAILED) => ChainErrorKind::Rejected,
        _ => ChainErrorKind::Other,
    }
}

/// Solana network service over an ordered set of RPC providers.
#[derive(Debug)]
pub struct SolanaNetworkService {
    providers: MultiProvider<SolanaRpcProvider>,
}

impl SolanaNetworkService {
    pub fn new(providers: MultiProvider<SolanaRpcProvider>) -> Self {
        Self { providers }
    }

    pub fn current_host(&self) -> String {
        self.providers.current_host()
    }

    /// Balance, token balances and pending confirmations from one provider.
    pub async fn account_info(
        &self,
        address: &str,
        pending: &PendingTransactionStore,
    ) -> NetworkResult<SolanaAccountInfo> {
        self.providers
            .execute(|provider| async move {
                let (lamports, tokens, reconciled) = tokio::try_join!(
                    provider.balance(address),
                    provider.token_accounts(address),
                    reconcile(pending, provider.as_ref()),
                )?;
                Ok(SolanaAccountInfo {
                    lamports,
                    tokens,
                    reconciled,
                })
            })
            .await
    }

    pub async fn account_exists(&self, account: &str) -> NetworkResult<bool> {
        self.providers
            .execute(|provider| async move { provider.account_exists(account).await })
            .await
    }

    pub async fn token_program(&self, mint: &str) -> NetworkResult<TokenProgram> {
        self.providers
            .execute(|provider| async move { provider.token_program(mint).await })
            .await
    }

    pub async fn latest_blockhash(&self) -> NetworkResult<String> {
        self.providers
            .execute(|provider| async move { provider.latest_blockhash().await })
            .await
    }

    pub async fn fee_for_message(&self, message: &str) -> NetworkResult<u64> {
        self.providers
            .execute(|provider| async move { provider.fee_for_message(message).await })
            .await
    }

    pub async fn minimum_balance_for_rent_exemption(&self, space: u64) -> NetworkResult<u64> {
        self.providers
            .execute(|provider| async move { provider.minimum_balance_for_rent_exemption(space).await })
            .await
    }

    pub async fn send(&self, transaction: &str) -> NetworkResult<String> {
        self.providers
            .execute(|provider| async move { provider.send_transaction(transaction).await })
            .await
    }
}
