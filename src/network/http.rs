//! JSON over HTTP with deadlines.
//!
//! # Responsibilities
//! - Issue REST GET/POST and JSON-RPC calls with a per-request timeout
//! - Turn transport failures into retryable `NetworkError`s
//! - Hand the decoded JSON body and status back so chain services can
//!   re-classify errors embedded in successful HTTP responses

use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::timeout;
use url::Url;

use crate::network::error::{NetworkError, NetworkResult};

/// A decoded HTTP reply.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Value,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Thin reqwest wrapper shared by every chain service.
#[derive(Debug, Clone)]
pub struct JsonHttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl JsonHttpClient {
    pub fn new(request_timeout: Duration) -> NetworkResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            timeout: request_timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn get(&self, url: Url) -> NetworkResult<HttpReply> {
        self.send(self.client.get(url)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> NetworkResult<HttpReply> {
        self.send(self.client.post(url).json(body)).await
    }

    /// POST a JSON-RPC 2.0 request and return the raw envelope.
    pub async fn json_rpc(&self, url: Url, method: &str, params: Value) -> NetworkResult<HttpReply> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        self.post(url, &body).await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> NetworkResult<HttpReply> {
        let response = timeout(self.timeout, request.send())
            .await
            .map_err(|_| NetworkError::Timeout(self.timeout))??;

        let status = response.status().as_u16();
        let bytes = timeout(self.timeout, response.bytes())
            .await
            .map_err(|_| NetworkError::Timeout(self.timeout))??;

        if status >= 500 || status == 429 {
            return Err(NetworkError::Http {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(e) if (200..300).contains(&status) => return Err(e.into()),
                Err(_) => {
                    return Err(NetworkError::Http {
                        status,
                        body: String::from_utf8_lossy(&bytes).into_owned(),
                    })
                }
            }
        };

        Ok(HttpReply { status, body })
    }
}

/// Helpers for pulling typed fields out of loosely shaped JSON.
pub(crate) mod json_field {
    use serde_json::Value;

    use crate::network::error::{NetworkError, NetworkResult};

    pub fn str<'a>(value: &'a Value, pointer: &str) -> NetworkResult<&'a str> {
        value
            .pointer(pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| NetworkError::Decode(format!("missing string at {pointer}")))
    }

    /// A u64 encoded either as a JSON number or a decimal string.
    pub fn u64(value: &Value, pointer: &str) -> NetworkResult<u64> {
        match value.pointer(pointer) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| NetworkError::Decode(format!("missing integer at {pointer}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_field_accepts_strings_and_numbers() {
        let value = json!({"a": {"n": 5, "s": "1037", "bad": "x"}});
        assert_eq!(json_field::u64(&value, "/a/n").unwrap(), 5);
        assert_eq!(json_field::u64(&value, "/a/s").unwrap(), 1037);
        assert!(json_field::u64(&value, "/a/bad").is_err());
        assert_eq!(json_field::str(&value, "/a/s").unwrap(), "1037");
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        let client = JsonHttpClient::new(Duration::from_secs(2)).unwrap();
        let err = client
            .get(Url::parse("http://127.0.0.1:1/").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "{err}");
    }
}
