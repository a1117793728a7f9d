//! tkb-core: traditional knowledge registry core (configuration, chain client,
//! connection lifecycle and record aggregation).
//!
//! The gateway and the dev proxy depend on this crate only through the
//! re-exports below.

mod chain;
mod connector;
mod error;
mod knowledge;
mod shared;

// Shared
pub use shared::{DeploySettings, DevProxyConfig, RetrySettings, TkbConfig, DEFAULT_CONTRACT_NAME};

// Errors
pub use error::RegistryError;

// Chain access (ethers provider binding of the registry contract)
pub use chain::{ChainError, RpcBinder, RpcRegistry, GET_RECORD_SIGNATURE, TOTAL_RECORDS_SIGNATURE};

// Connection lifecycle
pub use connector::{
    CommandDeployer, ConnectionManager, ConnectionSnapshot, ConnectionState, ContractBinder, DeployOutcome, Deployer,
    DeploymentDescriptor, Reconnector, RetryPolicy,
};

// Records
pub use knowledge::{
    collect_records, format_timestamp, BatchSummary, KnowledgeRecord, NormalizeError, RecordAggregator, RecordBatch,
    RecordView, RegistryContract, VerificationStatus,
};

pub use ethers::types::U256;
