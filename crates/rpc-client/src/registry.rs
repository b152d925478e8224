//! Per-chain client registry.

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{
    bundler::BundlerClient, error::RpcError, paymaster::PaymasterClient, public::PublicClient,
    simulation::SimulationRpcClient,
};

/// Remote endpoints serving one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEndpoints {
    /// Only needed for user operations; raw EIP-7702 transactions go to `rpc_url`.
    #[serde(default)]
    pub bundler_url: Option<Url>,
    /// Node JSON-RPC endpoint.
    pub rpc_url: Url,
    /// ERC-7677 paymaster service.
    #[serde(default)]
    pub paymaster_url: Option<Url>,
    /// Simulation endpoint used for pre-flight checks.
    #[serde(default)]
    pub simulation_url: Option<Url>,
    /// Vendor simulation method, defaults to `tenderly_simulateTransaction`.
    #[serde(default)]
    pub simulation_method: Option<String>,
}

/// Endpoints per chain id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Endpoints keyed by chain id.
    pub chains: HashMap<u64, ChainEndpoints>,
}

impl RegistryConfig {
    /// Adds or replaces the endpoints of `chain_id`.
    pub fn with_chain(mut self, chain_id: u64, endpoints: ChainEndpoints) -> Self {
        self.chains.insert(chain_id, endpoints);
        self
    }
}

/// Memoized clients, built on first use and shared for the life of the registry.
///
/// Clients hold no per-call state, so handing the same instance to concurrent operations is
/// safe. Paymaster clients are keyed by chain and bearer token.
#[derive(Debug)]
pub struct ClientRegistry {
    config: RegistryConfig,
    http: reqwest::Client,
    bundlers: DashMap<u64, Arc<BundlerClient>>,
    public: DashMap<u64, Arc<PublicClient>>,
    simulators: DashMap<u64, Arc<SimulationRpcClient>>,
    paymasters: DashMap<(u64, String), Arc<PaymasterClient>>,
}

impl ClientRegistry {
    /// Registry with a default HTTP client.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_http(config, reqwest::Client::new())
    }

    /// Registry sharing `http` across all clients.
    pub fn with_http(config: RegistryConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            bundlers: DashMap::new(),
            public: DashMap::new(),
            simulators: DashMap::new(),
            paymasters: DashMap::new(),
        }
    }

    /// Endpoints of `chain_id`.
    pub fn endpoints(&self, chain_id: u64) -> Result<&ChainEndpoints, RpcError> {
        self.config.chains.get(&chain_id).ok_or(RpcError::UnknownChain(chain_id))
    }

    /// Fails with [`RpcError::NotConfigured`] when the chain has no bundler endpoint.
    pub fn bundler(&self, chain_id: u64) -> Result<Arc<BundlerClient>, RpcError> {
        if let Some(client) = self.bundlers.get(&chain_id) {
            return Ok(Arc::clone(client.value()));
        }
        let endpoints = self.endpoints(chain_id)?;
        let url = endpoints.bundler_url.clone().ok_or_else(|| {
            RpcError::NotConfigured(format!("no bundler endpoint for chain {chain_id}"))
        })?;
        debug!(chain_id, %url, "created bundler client");
        let client = Arc::new(BundlerClient::new(self.http.clone(), url));
        Ok(Arc::clone(self.bundlers.entry(chain_id).or_insert(client).value()))
    }

    /// Node client of `chain_id`.
    pub fn public(&self, chain_id: u64) -> Result<Arc<PublicClient>, RpcError> {
        if let Some(client) = self.public.get(&chain_id) {
            return Ok(Arc::clone(client.value()));
        }
        let endpoints = self.endpoints(chain_id)?;
        let client = Arc::new(PublicClient::new(endpoints.rpc_url.clone()));
        debug!(chain_id, url = %endpoints.rpc_url, "created public client");
        Ok(Arc::clone(self.public.entry(chain_id).or_insert(client).value()))
    }

    /// Fails with [`RpcError::NotConfigured`] when the chain has no simulation endpoint.
    pub fn simulation(&self, chain_id: u64) -> Result<Arc<SimulationRpcClient>, RpcError> {
        if let Some(client) = self.simulators.get(&chain_id) {
            return Ok(Arc::clone(client.value()));
        }
        let endpoints = self.endpoints(chain_id)?;
        let url = endpoints.simulation_url.clone().ok_or_else(|| {
            RpcError::NotConfigured(format!("no simulation endpoint for chain {chain_id}"))
        })?;
        let client = Arc::new(SimulationRpcClient::new(
            self.http.clone(),
            url,
            endpoints.simulation_method.clone(),
        ));
        Ok(Arc::clone(self.simulators.entry(chain_id).or_insert(client).value()))
    }

    /// Paymaster client authenticated with `token`. A blank token is rejected without
    /// touching the network.
    pub fn paymaster(&self, chain_id: u64, token: &str) -> Result<Arc<PaymasterClient>, RpcError> {
        let key = (chain_id, token.trim().to_string());
        if let Some(client) = self.paymasters.get(&key) {
            return Ok(Arc::clone(client.value()));
        }
        let endpoints = self.endpoints(chain_id)?;
        let url = endpoints.paymaster_url.clone().ok_or_else(|| {
            RpcError::NotConfigured(format!("no paymaster endpoint for chain {chain_id}"))
        })?;
        let client = Arc::new(PaymasterClient::new(self.http.clone(), url, &key.1)?);
        debug!(chain_id, "created paymaster client");
        Ok(Arc::clone(self.paymasters.entry(key).or_insert(client).value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ClientRegistry {
        let endpoints = ChainEndpoints {
            bundler_url: Some("http://localhost:4337".parse().unwrap()),
            rpc_url: "http://localhost:8545".parse().unwrap(),
            paymaster_url: Some("http://localhost:7677".parse().unwrap()),
            simulation_url: None,
            simulation_method: None,
        };
        ClientRegistry::new(RegistryConfig::default().with_chain(84532, endpoints))
    }

    #[test]
    fn memoizes_per_chain() {
        let registry = registry();
        let first = registry.bundler(84532).unwrap();
        let second = registry.bundler(84532).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&registry.public(84532).unwrap(), &registry.public(84532).unwrap()));
        assert!(matches!(registry.bundler(1), Err(RpcError::UnknownChain(1))));
    }

    #[test]
    fn paymasters_keyed_by_token() {
        let registry = registry();
        let a = registry.paymaster(84532, "a").unwrap();
        let b = registry.paymaster(84532, "b").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &registry.paymaster(84532, "a").unwrap()));
        assert!(matches!(registry.paymaster(84532, ""), Err(RpcError::Unauthorized(_))));
    }

    #[test]
    fn missing_optional_endpoints_are_not_configured() {
        assert!(registry().simulation(84532).unwrap_err().is_not_configured());

        let endpoints = ChainEndpoints {
            bundler_url: None,
            rpc_url: "http://localhost:8545".parse().unwrap(),
            paymaster_url: None,
            simulation_url: None,
            simulation_method: None,
        };
        let registry = ClientRegistry::new(RegistryConfig::default().with_chain(1, endpoints));
        assert!(registry.bundler(1).unwrap_err().is_not_configured());
        assert!(registry.public(1).is_ok());
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_client() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.bundler(84532).unwrap() })
            })
            .collect();
        let mut clients = Vec::new();
        for handle in handles {
            clients.push(handle.await.unwrap());
        }
        assert!(clients.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }
}
