//! Network services and wallet managers wired from configuration.

use std::time::Duration;

use crate::blockchain::cosmos::{CosmosNetworkService, CosmosRestProvider, CosmosWalletManager};
use crate::blockchain::manager::WalletManager;
use crate::blockchain::solana::{SolanaNetworkService, SolanaRpcProvider, SolanaWalletManager};
use crate::blockchain::xrp::{XrpNetworkService, XrpRpcProvider, XrpWalletManager};
use crate::chain::{Chain, ChainDescriptor, CosmosChain, SolanaChain, Token, XrpChain};
use crate::config::schema::{CoreConfig, ProvidersConfig};
use crate::error::WalletError;
use crate::transaction::WalletPublicKey;
use crate::network::{Endpoint, HostProvider, JsonHttpClient, MultiProvider, NetworkError, NetworkResult};

/// Build a `MultiProvider` over `providers.providers`, in order.
pub fn build_multi_provider<P, F>(
    name: &str,
    providers: &ProvidersConfig,
    config: &CoreConfig,
    make: F,
) -> NetworkResult<MultiProvider<P>>
where
    P: HostProvider,
    F: Fn(Endpoint, JsonHttpClient) -> P,
{
    let http = JsonHttpClient::new(Duration::from_secs(config.network.request_timeout_secs))?;
    let endpoints = providers
        .providers
        .iter()
        .map(|raw| {
            let endpoint = Endpoint::new(
                raw,
                config.network.healthy_threshold,
                config.network.unhealthy_threshold,
            )
            .map_err(|e| NetworkError::Transport(format!("invalid provider URL {raw}: {e}")))?;
            Ok(make(endpoint, http.clone()))
        })
        .collect::<NetworkResult<Vec<_>>>()?;

    tracing::debug!(chain = name, providers = endpoints.len(), "Providers configured");
    MultiProvider::new(name, endpoints, config.resilience.backoff())
}

pub fn cosmos_service(name: &str, config: &CoreConfig) -> NetworkResult<CosmosNetworkService> {
    build_multi_provider(name, &config.cosmos, config, CosmosRestProvider::new).map(CosmosNetworkService::new)
}

pub fn solana_service(name: &str, config: &CoreConfig) -> NetworkResult<SolanaNetworkService> {
    build_multi_provider(name, &config.solana, config, SolanaRpcProvider::new).map(SolanaNetworkService::new)
}

pub fn xrp_service(name: &str, config: &CoreConfig) -> NetworkResult<XrpNetworkService> {
    build_multi_provider(name, &config.xrp, config, XrpRpcProvider::new).map(XrpNetworkService::new)
}

pub fn cosmos_manager(
    chain: CosmosChain,
    address: impl Into<String>,
    public_key: WalletPublicKey,
    tokens: Vec<Token>,
    config: &CoreConfig,
) -> Result<CosmosWalletManager, WalletError> {
    let network = cosmos_service(chain.display_name(), config)?;
    Ok(CosmosWalletManager::new(chain, address, public_key, tokens, network)?
        .with_pending_ttl(config.cosmos.pending_ttl()))
}

pub fn solana_manager(
    chain: SolanaChain,
    address: impl Into<String>,
    public_key: WalletPublicKey,
    tokens: Vec<Token>,
    config: &CoreConfig,
) -> Result<SolanaWalletManager, WalletError> {
    let network = solana_service(chain.display_name(), config)?;
    Ok(SolanaWalletManager::new(chain, address, public_key, tokens, network)?
        .with_pending_ttl(config.solana.pending_ttl()))
}

pub fn xrp_manager(
    address: impl Into<String>,
    public_key: WalletPublicKey,
    tokens: Vec<Token>,
    config: &CoreConfig,
) -> Result<XrpWalletManager, WalletError> {
    let network = xrp_service(XrpChain.display_name(), config)?;
    Ok(XrpWalletManager::new(address, public_key, tokens, network)?.with_pending_ttl(config.xrp.pending_ttl()))
}

/// Build the manager for `chain` with the providers and pending ttl of its family.
pub fn wallet_manager(
    chain: Chain,
    address: impl Into<String>,
    public_key: WalletPublicKey,
    tokens: Vec<Token>,
    config: &CoreConfig,
) -> Result<WalletManager, WalletError> {
    Ok(match chain {
        Chain::Cosmos(chain) => WalletManager::Cosmos(cosmos_manager(chain, address, public_key, tokens, config)?),
        Chain::Solana(chain) => WalletManager::Solana(solana_manager(chain, address, public_key, tokens, config)?),
        Chain::Xrp(_) => WalletManager::Xrp(xrp_manager(address, public_key, tokens, config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_provider_list_rejected() {
        let config = CoreConfig::default();
        assert!(matches!(cosmos_service("Cosmos", &config), Err(NetworkError::NoProviders)));
    }

    #[test]
    fn test_providers_keep_order() {
        let mut config = CoreConfig::default();
        config.xrp.providers = vec![
            "https://s1.ripple.com:51234".to_string(),
            "https://xrplcluster.com".to_string(),
        ];
        let service = xrp_service("XRP", &config).unwrap();
        assert_eq!(service.current_host(), "s1.ripple.com:51234");
    }

    #[test]
    fn test_wallet_manager_for_chain() {
        let mut config = CoreConfig::default();
        config.solana.providers = vec!["https://api.mainnet-beta.solana.com".to_string()];
        let key = WalletPublicKey::new(vec![7; 32], crate::transaction::EllipticCurve::Ed25519);
        let chain = Chain::Solana(SolanaChain { testnet: false });

        let manager = wallet_manager(chain, bs58::encode([7u8; 32]).into_string(), key.clone(), vec![], &config)
            .unwrap();
        assert_eq!(manager.chain(), chain);
        assert_eq!(manager.current_host(), "api.mainnet-beta.solana.com");

        let err = wallet_manager(Chain::Xrp(XrpChain), "rAddress", key, vec![], &config).unwrap_err();
        assert!(matches!(err, WalletError::Network(NetworkError::NoProviders)));
    }
}
