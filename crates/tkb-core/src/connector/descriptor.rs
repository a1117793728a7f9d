//! Deployment descriptor: the JSON file recording where the registry was deployed.

use crate::error::RegistryError;
use serde_json::{json, Map, Value};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentDescriptor {
    pub contract_name: String,
    pub address: String,
}

impl DeploymentDescriptor {
    /// Reads the descriptor at `path`. Accepts `contracts.<name>.address`,
    /// `registryAddress` and flat `address` layouts, in that order.
    pub fn load(path: &Path, contract_name: &str) -> Result<Self, RegistryError> {
        let missing = |reason: String, absent: bool| RegistryError::ConfigurationMissing {
            path: path.to_path_buf(),
            reason,
            absent,
        };

        let raw = std::fs::read_to_string(path).map_err(|e| {
            let absent = e.kind() == std::io::ErrorKind::NotFound;
            missing(e.to_string(), absent)
        })?;
        let doc: Value = serde_json::from_str(&raw).map_err(|e| missing(format!("invalid JSON: {}", e), false))?;
        let address = Self::address_in(&doc, contract_name)
            .ok_or_else(|| missing(format!("no address for {}", contract_name), false))?;
        if !is_address(address) {
            return Err(missing(format!("{:?} is not a contract address", address), false));
        }

        Ok(Self {
            contract_name: contract_name.to_string(),
            address: address.to_string(),
        })
    }

    /// Writes the `contracts.<name>.address` layout, creating parent directories.
    pub fn store(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut contracts = Map::new();
        contracts.insert(self.contract_name.clone(), json!({ "address": self.address }));
        let body = serde_json::to_string_pretty(&json!({ "contracts": contracts }))?;
        std::fs::write(path, body)
    }

    fn address_in<'a>(doc: &'a Value, contract_name: &str) -> Option<&'a str> {
        doc.get("contracts")
            .and_then(|c| c.get(contract_name))
            .and_then(|c| c.get("address"))
            .and_then(Value::as_str)
            .or_else(|| doc.get("registryAddress").and_then(Value::as_str))
            .or_else(|| doc.get("address").and_then(Value::as_str))
    }
}

/// `0x` followed by 40 hex digits.
pub(crate) fn is_address(s: &str) -> bool {
    s.strip_prefix("0x")
        .map(|digits| digits.len() == 40 && digits.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}
