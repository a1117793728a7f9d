use super::ChainError;
use crate::connector::ContractBinder;
use crate::error::RegistryError;
use crate::knowledge::{KnowledgeRecord, RegistryContract};
use ethers::abi::{ParamType, Token};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use ethers::utils::id;
use std::sync::Arc;
use std::time::Duration;

pub const TOTAL_RECORDS_SIGNATURE: &str = "getTotalRecords()";
pub const GET_RECORD_SIGNATURE: &str = "getRecord(uint256)";

/// Registry contract read through `eth_call` on one provider.
pub struct RpcRegistry {
    provider: Provider<Http>,
    endpoint: String,
    address: String,
    contract: Address,
}

impl RpcRegistry {
    pub fn new(provider: Provider<Http>, endpoint: impl Into<String>, address: &str) -> Result<Self, ChainError> {
        let contract = address
            .parse::<Address>()
            .map_err(|e| ChainError::decode(format!("invalid contract address {:?}: {}", address, e)))?;
        Ok(Self {
            provider,
            endpoint: endpoint.into(),
            address: address.to_string(),
            contract,
        })
    }

    async fn call(&self, signature: &str, args: &[Token]) -> Result<Bytes, ChainError> {
        let mut data = id(signature).to_vec();
        data.extend(ethers::abi::encode(args));
        let tx: TypedTransaction = TransactionRequest::new().to(self.contract).data(data).into();
        Ok(self.provider.call(&tx, None).await?)
    }
}

#[async_trait::async_trait]
impl RegistryContract for RpcRegistry {
    fn address(&self) -> &str {
        &self.address
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn total_records(&self) -> Result<u64, ChainError> {
        let out = self.call(TOTAL_RECORDS_SIGNATURE, &[]).await?;
        let total = ethers::abi::decode(&[ParamType::Uint(256)], &out)?
            .pop()
            .and_then(Token::into_uint)
            .ok_or_else(|| ChainError::decode("getTotalRecords returned no uint"))?;
        if total > U256::from(u64::MAX) {
            return Err(ChainError::decode(format!("record count {} exceeds 64 bits", total)));
        }
        Ok(total.as_u64())
    }

    async fn get_record(&self, index: u64) -> Result<KnowledgeRecord, ChainError> {
        let out = self
            .call(GET_RECORD_SIGNATURE, &[Token::Uint(U256::from(index))])
            .await?;
        KnowledgeRecord::from_abi(&out)
    }
}

/// Binds to the first endpoint answering `eth_chainId` within the probe timeout.
pub struct RpcBinder {
    endpoints: Vec<String>,
    probe_timeout: Duration,
}

impl RpcBinder {
    pub fn new(endpoints: Vec<String>, probe_timeout: Duration) -> Self {
        Self {
            endpoints,
            probe_timeout,
        }
    }
}

#[async_trait::async_trait]
impl ContractBinder for RpcBinder {
    async fn bind(&self, address: &str) -> Result<Arc<dyn RegistryContract>, RegistryError> {
        for endpoint in &self.endpoints {
            let provider = match Provider::<Http>::try_from(endpoint.as_str()) {
                Ok(provider) => provider,
                Err(e) => {
                    tracing::warn!(target: "tkb::connector", endpoint = %endpoint, error = %e, "Invalid node endpoint");
                    continue;
                }
            };
            match tokio::time::timeout(self.probe_timeout, provider.get_chainid()).await {
                Ok(Ok(chain_id)) => {
                    tracing::debug!(target: "tkb::connector", endpoint = %endpoint, %chain_id, "Node is live");
                    let registry = RpcRegistry::new(provider, endpoint.as_str(), address)
                        .map_err(|e| RegistryError::UpstreamUnavailable(e.to_string()))?;
                    return Ok(Arc::new(registry));
                }
                Ok(Err(e)) => {
                    tracing::debug!(target: "tkb::connector", endpoint = %endpoint, error = %e, "Node probe failed");
                }
                Err(_) => {
                    tracing::debug!(target: "tkb::connector", endpoint = %endpoint, "Node probe timed out");
                }
            }
        }
        Err(RegistryError::NodeUnavailable {
            endpoints: self.endpoints.clone(),
        })
    }
}
