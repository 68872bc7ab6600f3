//! Ordered provider fallback.
//!
//! # Responsibilities
//! - Run one logical operation against the current provider
//! - Advance to the next provider on transport-class failures only
//! - Remember the working provider for later operations on this instance

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::time::sleep;

use crate::network::endpoint::Endpoint;
use crate::network::error::{NetworkError, NetworkResult};
use crate::observability::metrics;
use crate::resilience::BackoffPolicy;

/// Something a `MultiProvider` can fall back across.
pub trait HostProvider: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    fn host(&self) -> &str {
        self.endpoint().host()
    }
}

/// An ordered list of equivalent providers with a sticky current index.
pub struct MultiProvider<P> {
    name: String,
    providers: Vec<Arc<P>>,
    current: AtomicUsize,
    backoff: BackoffPolicy,
}

impl<P: HostProvider> MultiProvider<P> {
    /// Create a multi-provider. `name` labels logs and metrics.
    pub fn new(name: impl Into<String>, providers: Vec<P>, backoff: BackoffPolicy) -> NetworkResult<Self> {
        if providers.is_empty() {
            return Err(NetworkError::NoProviders);
        }
        Ok(Self {
            name: name.into(),
            providers: providers.into_iter().map(Arc::new).collect(),
            current: AtomicUsize::new(0),
            backoff,
        })
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Acquire) % self.providers.len()
    }

    pub fn current_provider(&self) -> Arc<P> {
        self.providers[self.current_index()].clone()
    }

    /// Host of the provider the next operation will start on.
    pub fn current_host(&self) -> String {
        self.current_provider().host().to_string()
    }

    /// Run `request` against providers in order, starting at the current one.
    ///
    /// Retryable failures advance to the next provider, wrapping, for at most
    /// one attempt per provider. Chain-protocol errors return immediately.
    /// Dropping the returned future stops any further fallback.
    pub async fn execute<T, F, Fut>(&self, mut request: F) -> NetworkResult<T>
    where
        F: FnMut(Arc<P>) -> Fut,
        Fut: Future<Output = NetworkResult<T>>,
    {
        let attempts = self.providers.len();
        let mut last_error = None;

        for attempt in 0..attempts {
            let delay = self.backoff.delay_for(attempt as u32);
            if !delay.is_zero() {
                sleep(delay).await;
            }

            let index = self.current_index();
            let provider = self.providers[index].clone();
            metrics::record_provider_request(&self.name, provider.host());

            match request(provider.clone()).await {
                Ok(value) => {
                    provider.endpoint().mark_success();
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        chain = %self.name,
                        provider_idx = index,
                        host = %provider.host(),
                        error = %e,
                        "Provider error, trying next provider"
                    );
                    provider.endpoint().mark_failure();
                    self.advance_from(index);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(NetworkError::AllProvidersExhausted {
            attempts,
            last: Box::new(last_error.unwrap_or(NetworkError::NoProviders)),
        })
    }

    /// Move past `index` unless a concurrent operation already did.
    fn advance_from(&self, index: usize) {
        let next = (index + 1) % self.providers.len();
        if self
            .current
            .compare_exchange(index, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            metrics::record_provider_fallback(&self.name, self.providers[index].host());
        }
    }
}

impl<P> std::fmt::Debug for MultiProvider<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiProvider")
            .field("name", &self.name)
            .field("providers", &self.providers.len())
            .field("current", &self.current.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::error::ChainErrorKind;
    use std::sync::atomic::AtomicUsize;

    struct StubProvider {
        endpoint: Endpoint,
    }

    impl StubProvider {
        fn new(url: &str) -> Self {
            Self {
                endpoint: Endpoint::new(url, 1, 1).unwrap(),
            }
        }
    }

    impl HostProvider for StubProvider {
        fn endpoint(&self) -> &Endpoint {
            &self.endpoint
        }
    }

    fn three() -> MultiProvider<StubProvider> {
        MultiProvider::new(
            "test",
            vec![
                StubProvider::new("http://a.test"),
                StubProvider::new("http://b.test"),
                StubProvider::new("http://c.test"),
            ],
            BackoffPolicy::NONE,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_falls_back_and_sticks() {
        let multi = three();
        let result = multi
            .execute(|p| async move {
                if p.host() == "c.test" {
                    Ok(p.host().to_string())
                } else {
                    Err(NetworkError::Transport("refused".into()))
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "c.test");
        assert_eq!(multi.current_host(), "c.test");
        assert!(!multi.providers[0].endpoint().is_healthy());

        // The next operation starts on the provider that worked.
        let calls = AtomicUsize::new(0);
        let host = multi
            .execute(|p| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, NetworkError>(p.host().to_string()) }
            })
            .await
            .unwrap();
        assert_eq!(host, "c.test");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_after_one_pass() {
        let multi = three();
        let calls = AtomicUsize::new(0);
        let err = multi
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(NetworkError::Timeout(std::time::Duration::from_secs(1))) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, NetworkError::AllProvidersExhausted { attempts: 3, .. }));
        // wrapped all the way around
        assert_eq!(multi.current_index(), 0);
    }

    #[tokio::test]
    async fn test_chain_errors_do_not_fall_back() {
        let multi = three();
        let calls = AtomicUsize::new(0);
        let err = multi
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(NetworkError::chain(ChainErrorKind::InsufficientFee, Some(13), "fee")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.chain_kind(), Some(ChainErrorKind::InsufficientFee));
        assert_eq!(multi.current_host(), "a.test");
    }

    #[test]
    fn test_empty_is_rejected() {
        let result = MultiProvider::<StubProvider>::new("none", vec![], BackoffPolicy::NONE);
        assert!(matches!(result, Err(NetworkError::NoProviders)));
    }
}
