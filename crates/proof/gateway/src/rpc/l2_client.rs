//! L2 RPC client implementation.

use std::time::Duration;

use alloy::providers::{Provider, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::transports::http::{Http, reqwest::Client};
use alloy_eips::{BlockId, BlockNumberOrTag};
use alloy_primitives::{Address, B256, U64};
use alloy_rpc_types_eth::EIP1186AccountProofResponse;
use async_trait::async_trait;
use backon::Retryable;
use url::Url;

use super::{
    error::{RpcError, RpcResult},
    traits::L2Client,
    types::{BlockRef, LineaProofResponse},
};
use crate::config::RetryConfig;
use crate::constants::DEFAULT_RPC_TIMEOUT;

/// Configuration for the L2 client.
#[derive(Debug, Clone)]
pub struct L2ClientConfig {
    /// RPC endpoint URL.
    pub endpoint: Url,
    /// Request timeout.
    pub timeout: Duration,
    /// Retry configuration.
    pub retry_config: RetryConfig,
}

impl L2ClientConfig {
    /// Creates a new L2 client configuration with defaults.
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_RPC_TIMEOUT,
            retry_config: RetryConfig::default(),
        }
    }

    /// Sets the request timeout.
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    pub const fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }
}

/// L2 RPC client implementation using Alloy.
pub struct L2ClientImpl {
    /// The underlying HTTP provider.
    provider: RootProvider,
    /// Retry configuration.
    retry_config: RetryConfig,
}

impl std::fmt::Debug for L2ClientImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("L2ClientImpl").field("retry_config", &self.retry_config).finish_non_exhaustive()
    }
}

impl L2ClientImpl {
    /// Creates a new L2 client from the given configuration.
    pub fn new(config: L2ClientConfig) -> RpcResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RpcError::Connection(format!("Failed to build HTTP client: {e}")))?;

        let http = Http::with_client(client, config.endpoint);
        let rpc_client = RpcClient::new(http, false);

        // Read-only, so no fillers.
        let provider = RootProvider::new(rpc_client);

        Ok(Self { provider, retry_config: config.retry_config })
    }

    /// Returns a reference to the underlying provider.
    pub const fn provider(&self) -> &RootProvider {
        &self.provider
    }
}

#[async_trait]
impl L2Client for L2ClientImpl {
    async fn get_proof(
        &self,
        address: Address,
        keys: Vec<B256>,
        block_number: u64,
    ) -> RpcResult<EIP1186AccountProofResponse> {
        let backoff = self.retry_config.to_backoff_builder();

        (|| async {
            self.provider
                .get_proof(address, keys.clone())
                .block_id(BlockId::number(block_number))
                .await
                .map_err(RpcError::from)
        })
        .retry(backoff)
        .when(|e| e.is_retryable())
        .notify(|err, dur| {
            tracing::debug!(error = %err, delay = ?dur, "Retrying L2Client::get_proof");
        })
        .await
    }

    async fn linea_get_proof(
        &self,
        address: Address,
        keys: Vec<B256>,
        block_number: u64,
    ) -> RpcResult<LineaProofResponse> {
        let backoff = self.retry_config.to_backoff_builder();

        (|| async {
            self.provider
                .raw_request::<_, LineaProofResponse>(
                    "linea_getProof".into(),
                    (address, keys.clone(), U64::from(block_number)),
                )
                .await
                .map_err(RpcError::from)
        })
        .retry(backoff)
        .when(|e| e.is_retryable())
        .notify(|err, dur| {
            tracing::debug!(error = %err, delay = ?dur, "Retrying L2Client::linea_get_proof");
        })
        .await
    }

    async fn block_ref(&self, number: Option<u64>) -> RpcResult<BlockRef> {
        let block_id: BlockId = number.map_or(BlockNumberOrTag::Latest, BlockNumberOrTag::Number).into();

        let backoff = self.retry_config.to_backoff_builder();

        let block = (|| async { self.provider.get_block(block_id).await.map_err(RpcError::from) })
            .retry(backoff)
            .when(|e| e.is_retryable())
            .notify(|err, dur| {
                tracing::debug!(error = %err, delay = ?dur, "Retrying L2Client::block_ref");
            })
            .await?
            .ok_or_else(|| RpcError::BlockNotFound(format!("Block not found for {block_id:?}")))?;

        Ok(BlockRef::from(&block.header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_client_config_defaults() {
        let config = L2ClientConfig::new(Url::parse("http://localhost:8545").unwrap());
        assert_eq!(config.timeout, DEFAULT_RPC_TIMEOUT);
        assert_eq!(config.retry_config, RetryConfig::default());
    }

    #[test]
    fn test_l2_client_config_builder() {
        let config = L2ClientConfig::new(Url::parse("http://localhost:8545").unwrap())
            .with_timeout(Duration::from_secs(60))
            .with_retry_config(RetryConfig::disabled());

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.retry_config.max_attempts, 0);
    }

    #[test]
    fn test_l2_client_builds_without_network() {
        let config = L2ClientConfig::new(Url::parse("http://localhost:8545").unwrap());
        assert!(L2ClientImpl::new(config).is_ok());
    }
}
