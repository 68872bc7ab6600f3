//! rippled JSON-RPC service.

use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::network::http::json_field;
use crate::network::{
    ChainErrorKind, Endpoint, HostProvider, HttpReply, JsonHttpClient, MultiProvider, NetworkError,
    NetworkResult,
};
use crate::pending::{reconcile, PendingTransactionStore, ReconcileReport, TransactionLookup};

/// Account root fields a payment needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XrpAccount {
    pub balance_drops: u64,
    pub sequence: u32,
    pub owner_count: u64,
    pub ledger_current_index: u32,
}

/// One trust line held by the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustLine {
    /// The counterparty (issuer) address.
    pub issuer: String,
    pub currency: String,
    pub balance: Decimal,
    /// Whether this side of the line has rippling disabled.
    pub no_ripple: bool,
}

/// Account reserve in drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveSettings {
    pub base_drops: u64,
    pub increment_drops: u64,
}

impl ReserveSettings {
    /// Reserve locked by an account owning `owner_count` objects.
    pub fn for_owner_count(&self, owner_count: u64) -> u64 {
        self.base_drops
            .saturating_add(self.increment_drops.saturating_mul(owner_count))
    }
}

/// Fee levels quoted by the `fee` method, in drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub minimum: u64,
    pub open_ledger: u64,
    pub median: u64,
}

impl FeeQuote {
    pub fn tiers(&self) -> [u64; 3] {
        [self.minimum, self.open_ledger, self.median]
    }
}

/// Result of a full account sync.
#[derive(Debug, Clone)]
pub struct XrpAccountInfo {
    pub account: XrpAccount,
    pub lines: Vec<TrustLine>,
    pub reserve: ReserveSettings,
    pub reconciled: ReconcileReport,
}

/// One rippled endpoint.
#[derive(Debug)]
pub struct XrpRpcProvider {
    endpoint: Endpoint,
    http: JsonHttpClient,
}

impl HostProvider for XrpRpcProvider {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl XrpRpcProvider {
    pub fn new(endpoint: Endpoint, http: JsonHttpClient) -> Self {
        Self { endpoint, http }
    }

    async fn call(&self, method: &str, params: Value, not_found: ChainErrorKind) -> NetworkResult<Value> {
        let url = self
            .endpoint
            .url("")
            .map_err(|e| NetworkError::Transport(format!("bad URL: {e}")))?;
        let reply = self
            .http
            .post(url, &json!({ "method": method, "params": [params] }))
            .await?;
        decode_result(reply, not_found)
    }

    pub async fn account_info(&self, address: &str) -> NetworkResult<XrpAccount> {
        let result = self
            .call(
                "account_info",
                json!({"account": address, "ledger_index": "current", "strict": true}),
                ChainErrorKind::AccountNotFound,
            )
            .await?;
        let data = result
            .get("account_data")
            .ok_or_else(|| NetworkError::Decode("missing account_data".into()))?;
        Ok(XrpAccount {
            balance_drops: json_field::u64(data, "/Balance")?,
            sequence: to_u32(json_field::u64(data, "/Sequence")?)?,
            owner_count: json_field::u64(data, "/OwnerCount").unwrap_or(0),
            ledger_current_index: to_u32(json_field::u64(&result, "/ledger_current_index")?)?,
        })
    }

    pub async fn account_lines(&self, address: &str) -> NetworkResult<Vec<TrustLine>> {
        let result = self
            .call(
                "account_lines",
                json!({"account": address, "ledger_index": "validated"}),
                ChainErrorKind::AccountNotFound,
            )
            .await?;
        let lines = result
            .get("lines")
            .and_then(Value::as_array)
            .ok_or_else(|| NetworkError::Decode("missing lines".into()))?;
        lines
            .iter()
            .map(|line| {
                Ok(TrustLine {
                    issuer: json_field::str(line, "/account")?.to_string(),
                    currency: json_field::str(line, "/currency")?.to_string(),
                    balance: parse_decimal(json_field::str(line, "/balance")?)?,
                    no_ripple: line.get("no_ripple").and_then(Value::as_bool).unwrap_or(false),
                })
            })
            .collect()
    }

    pub async fn reserve(&self) -> NetworkResult<ReserveSettings> {
        let result = self.call("server_state", json!({}), ChainErrorKind::Other).await?;
        let ledger = result
            .pointer("/state/validated_ledger")
            .ok_or_else(|| NetworkError::Decode("missing validated_ledger".into()))?;
        Ok(ReserveSettings {
            base_drops: json_field::u64(ledger, "/reserve_base")?,
            increment_drops: json_field::u64(ledger, "/reserve_inc")?,
        })
    }

    pub async fn fee(&self) -> NetworkResult<FeeQuote> {
        let result = self.call("fee", json!({}), ChainErrorKind::Other).await?;
        let drops = result
            .get("drops")
            .ok_or_else(|| NetworkError::Decode("missing drops".into()))?;
        Ok(FeeQuote {
            minimum: json_field::u64(drops, "/minimum_fee")?,
            open_ledger: json_field::u64(drops, "/open_ledger_fee")?,
            median: json_field::u64(drops, "/median_fee")?,
        })
    }

    /// Submit a signed blob; queued transactions count as accepted.
    pub async fn submit(&self, blob: &str) -> NetworkResult<()> {
        let result = self
            .call("submit", json!({"tx_blob": blob}), ChainErrorKind::Other)
            .await?;
        let engine_result = json_field::str(&result, "/engine_result")?;
        if matches!(engine_result, "tesSUCCESS" | "terQUEUED") {
            return Ok(());
        }
        let message = result
            .get("engine_result_message")
            .and_then(Value::as_str)
            .unwrap_or(engine_result);
        let code = result.get("engine_result_code").and_then(Value::as_i64);
        Err(NetworkError::chain(classify_engine_result(engine_result), code, message))
    }

    /// Ledger index of a validated transaction.
    pub async fn transaction_ledger(&self, hash: &str) -> NetworkResult<Option<u64>> {
        let result = self
            .call(
                "tx",
                json!({"transaction": hash, "binary": false}),
                ChainErrorKind::TransactionNotFound,
            )
            .await?;
        if !result.get("validated").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(None);
        }
        Ok(json_field::u64(&result, "/ledger_index").ok())
    }
}

#[async_trait]
impl TransactionLookup for XrpRpcProvider {
    async fn confirmation(&self, hash: &str) -> NetworkResult<Option<u64>> {
        self.transaction_ledger(hash).await
    }
}

fn to_u32(value: u64) -> NetworkResult<u32> {
    u32::try_from(value).map_err(|_| NetworkError::Decode(format!("{value} exceeds u32")))
}

fn parse_decimal(value: &str) -> NetworkResult<Decimal> {
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .map_err(|e| NetworkError::Decode(format!("bad decimal {value}: {e}")))
}

/// Unwrap `result`, re-classifying `status: error` bodies.
fn decode_result(reply: HttpReply, not_found: ChainErrorKind) -> NetworkResult<Value> {
    let Some(result) = reply.body.get("result") else {
        return Err(if reply.is_success() {
            NetworkError::Decode("missing result".into())
        } else {
            NetworkError::Http {
                status: reply.status,
                body: reply.body.to_string(),
            }
        });
    };

    if result.get("status").and_then(Value::as_str) == Some("error") {
        let error = result.get("error").and_then(Value::as_str).unwrap_or("unknown");
        let message = result
            .get("error_message")
            .and_then(Value::as_str)
            .unwrap_or(error)
            .to_string();
        let code = result.get("error_code").and_then(Value::as_i64);
        let kind = match error {
            "actNotFound" | "txnNotFound" => not_found,
            "tooBusy" | "noNetwork" | "noCurrent" | "noClosed" | "amendmentBlocked" => {
                ChainErrorKind::NodeUnavailable
            }
            _ => ChainErrorKind::Other,
        };
        return Err(NetworkError::chain(kind, code, message));
    }
    Ok(result.clone())
}

fn classify_engine_result(engine_result: &str) -> ChainErrorKind {
    match engine_result {
        "telINSUF_FEE_P" => ChainErrorKind::InsufficientFee,
        "tefPAST_SEQ" | "terPRE_SEQ" => ChainErrorKind::SequenceMismatch,
        "tecUNFUNDED_PAYMENT" | "tecUNFUNDED" | "terINSUF_FEE_B" => ChainErrorKind::InsufficientFunds,
        "tecNO_DST" | "tecNO_DST_INSUF_XRP" => ChainErrorKind::AccountNotFound,
        other if other.starts_with("tec") || other.starts_with("tef") || other.starts_with("tem") => {
            ChainErrorKind::Rejected
        }
        _ => ChainErrorKind::Other,
    }
}

/// XRP network service over an ordered set of rippled providers.
#[derive(Debug)]
pub struct XrpNetworkService {
    providers: MultiProvider<XrpRpcProvider>,
}

impl XrpNetworkService {
    pub fn new(providers: MultiProvider<XrpRpcProvider>) -> Self {
        Self { providers }
    }

    pub fn current_host(&self) -> String {
        self.providers.current_host()
    }

    /// Account root, trust lines, reserve and pending confirmations from one provider.
    pub async fn account_info(
        &self,
        address: &str,
        pending: &PendingTransactionStore,
    ) -> NetworkResult<XrpAccountInfo> {
        self.providers
            .execute(|provider| async move {
                let (account, lines, reserve, reconciled) = tokio::try_join!(
                    provider.account_info(address),
                    provider.account_lines(address),
                    provider.reserve(),
                    reconcile(pending, provider.as_ref()),
                )?;
                Ok(XrpAccountInfo {
                    account,
                    lines,
                    reserve,
                    reconciled,
                })
            })
            .await
    }

    pub async fn fee(&self) -> NetworkResult<FeeQuote> {
        self.providers
            .execute(|provider| async move { provider.fee().await })
            .await
    }

    pub async fn submit(&self, blob: &str) -> NetworkResult<()> {
        self.providers
            .execute(|provider| async move { provider.submit(blob).await })
            .await
    }
}
