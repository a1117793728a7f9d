//! Error taxonomy of the connection lifecycle and the record read path.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Descriptor file absent, unreadable, or without a usable address.
    /// `absent` is set only when the file does not exist at all.
    #[error("deployment descriptor unusable at {}: {reason}", .path.display())]
    ConfigurationMissing {
        path: PathBuf,
        reason: String,
        absent: bool,
    },

    #[error("no reachable node (tried {})", .endpoints.join(", "))]
    NodeUnavailable { endpoints: Vec<String> },

    #[error("deployment failed ({})", exit_label(.code))]
    DeploymentFailed { code: Option<i32> },

    #[error("a deployment is already running")]
    DeploymentInProgress,

    #[error("registry contract is not connected yet")]
    NotReady,

    #[error("upstream chain read failed: {0}")]
    UpstreamUnavailable(String),

    #[error("record {index} is not accessible: {reason}")]
    RecordAccessDenied { index: u64, reason: String },
}

impl RegistryError {
    /// True when the descriptor file does not exist, which makes an auto-deploy worthwhile.
    pub fn is_descriptor_absent(&self) -> bool {
        matches!(self, RegistryError::ConfigurationMissing { absent: true, .. })
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code".to_string(),
    }
}
