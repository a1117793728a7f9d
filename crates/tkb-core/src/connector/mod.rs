//! Connection lifecycle for the registry contract.
//!
//! `ConnectionManager` owns the contract handle and is injected into request
//! handlers; `Reconnector` drives it from `disconnected` to `connected` with a
//! fixed-delay policy, deploying on demand when enabled.

mod deploy;
mod descriptor;
mod retry;

pub use deploy::{CommandDeployer, DeployOutcome, Deployer};
pub use descriptor::DeploymentDescriptor;
pub use retry::{Reconnector, RetryPolicy};

use crate::error::RegistryError;
use crate::knowledge::RegistryContract;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Binds a contract address to a reachable node.
#[async_trait::async_trait]
pub trait ContractBinder: Send + Sync {
    async fn bind(&self, address: &str) -> Result<Arc<dyn RegistryContract>, RegistryError>;
}

/// Point-in-time view of the connector for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub address: Option<String>,
    pub endpoint: Option<String>,
    pub attempts: u64,
    pub last_error: Option<String>,
}

pub struct ConnectionManager {
    descriptor_path: PathBuf,
    contract_name: String,
    binder: Arc<dyn ContractBinder>,
    state: watch::Sender<ConnectionState>,
    handle: RwLock<Option<Arc<dyn RegistryContract>>>,
    last_error: RwLock<Option<String>>,
    attempts: AtomicU64,
}

impl ConnectionManager {
    pub fn new(
        descriptor_path: impl Into<PathBuf>,
        contract_name: impl Into<String>,
        binder: Arc<dyn ContractBinder>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            descriptor_path: descriptor_path.into(),
            contract_name: contract_name.into(),
            binder,
            state,
            handle: RwLock::new(None),
            last_error: RwLock::new(None),
            attempts: AtomicU64::new(0),
        }
    }

    /// One connect attempt: read the descriptor, bind it to the first live node,
    /// and store the handle. A failed attempt keeps any previously bound handle.
    pub async fn try_connect(&self) -> Result<Arc<dyn RegistryContract>, RegistryError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(ConnectionState::Connecting);
        tracing::debug!(target: "tkb::connector", attempt, "Connecting to registry");

        match self.bind_from_descriptor().await {
            Ok(contract) => {
                tracing::info!(
                    target: "tkb::connector",
                    attempt,
                    address = contract.address(),
                    endpoint = contract.endpoint(),
                    "Registry contract connected"
                );
                if let Ok(mut handle) = self.handle.write() {
                    *handle = Some(Arc::clone(&contract));
                }
                if let Ok(mut last) = self.last_error.write() {
                    *last = None;
                }
                self.state.send_replace(ConnectionState::Connected);
                Ok(contract)
            }
            Err(e) => {
                if let Ok(mut last) = self.last_error.write() {
                    *last = Some(e.to_string());
                }
                let fallback = if self.current_handle().is_some() {
                    ConnectionState::Connected
                } else {
                    ConnectionState::Disconnected
                };
                self.state.send_replace(fallback);
                Err(e)
            }
        }
    }

    async fn bind_from_descriptor(&self) -> Result<Arc<dyn RegistryContract>, RegistryError> {
        let descriptor = DeploymentDescriptor::load(&self.descriptor_path, &self.contract_name)?;
        tracing::debug!(target: "tkb::connector", address = %descriptor.address, "Descriptor resolved");
        self.binder.bind(&descriptor.address).await
    }

    /// Points the descriptor at the address a deploy announced, unless it already
    /// names that address. Returns whether the file was written.
    pub fn record_deployment(&self, outcome: &DeployOutcome) -> Result<bool, RegistryError> {
        let Some(address) = outcome.announced_address.as_deref() else {
            return Ok(false);
        };
        let current = DeploymentDescriptor::load(&self.descriptor_path, &self.contract_name).ok();
        if current.is_some_and(|d| d.address.eq_ignore_ascii_case(address)) {
            return Ok(false);
        }

        let descriptor = DeploymentDescriptor {
            contract_name: self.contract_name.clone(),
            address: address.to_string(),
        };
        descriptor
            .store(&self.descriptor_path)
            .map_err(|e| RegistryError::ConfigurationMissing {
                path: self.descriptor_path.clone(),
                reason: format!("could not write descriptor: {}", e),
                absent: false,
            })?;
        tracing::info!(
            target: "tkb::connector",
            address,
            path = %self.descriptor_path.display(),
            "Descriptor written from deploy announcement"
        );
        Ok(true)
    }

    pub fn current_handle(&self) -> Option<Arc<dyn RegistryContract>> {
        self.handle.read().ok().and_then(|h| h.clone())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observes state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().ok().and_then(|e| e.clone())
    }

    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor_path
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let handle = self.current_handle();
        ConnectionSnapshot {
            state: self.state(),
            address: handle.as_ref().map(|h| h.address().to_string()),
            endpoint: handle.as_ref().map(|h| h.endpoint().to_string()),
            attempts: self.attempts(),
            last_error: self.last_error(),
        }
    }
}
