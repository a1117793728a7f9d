//! Registry contract access through an ethers HTTP provider.

mod registry;

pub use registry::{RpcBinder, RpcRegistry, GET_RECORD_SIGNATURE, TOTAL_RECORDS_SIGNATURE};

use ethers::abi::ParamType;
use ethers::providers::{ProviderError, RpcError};
use ethers::utils::{hex, id};
use serde_json::Value;
use thiserror::Error;

/// Standard revert payload emitted by `require(cond, "reason")`.
const ERROR_STRING_SIGNATURE: &str = "Error(string)";

/// Revert reasons (lower-cased) that mean the caller may not read a record.
const ACCESS_DENIED_MARKERS: [&str; 6] = [
    "access denied",
    "not accessible",
    "not authorized",
    "unauthorized",
    "permission",
    "no access",
];

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(#[source] ProviderError),

    /// JSON-RPC error object. `reason` is the decoded `Error(string)` revert reason, if any.
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        reason: Option<String>,
    },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl ChainError {
    pub fn decode(msg: impl Into<String>) -> Self {
        ChainError::Decode(msg.into())
    }

    /// True for contract reverts that signal a permission failure on the requested record.
    pub fn is_access_denied(&self) -> bool {
        match self {
            ChainError::Rpc { message, reason, .. } => {
                let message = message.to_ascii_lowercase();
                let reason = reason.as_deref().unwrap_or("").to_ascii_lowercase();
                ACCESS_DENIED_MARKERS
                    .iter()
                    .any(|marker| reason.contains(marker) || message.contains(marker))
            }
            _ => false,
        }
    }
}

/// Node error responses become `Rpc`; everything else stays a transport failure.
impl From<ProviderError> for ChainError {
    fn from(err: ProviderError) -> Self {
        if let Some(rpc) = err.as_error_response() {
            return ChainError::Rpc {
                code: rpc.code,
                message: rpc.message.clone(),
                reason: rpc.data.as_ref().and_then(revert_reason),
            };
        }
        ChainError::Transport(err)
    }
}

impl From<ethers::abi::Error> for ChainError {
    fn from(err: ethers::abi::Error) -> Self {
        ChainError::Decode(err.to_string())
    }
}

/// Reason string of `Error(string)` revert data. Depending on the node the data
/// sits directly in `error.data` or under `error.data.data`.
fn revert_reason(data: &Value) -> Option<String> {
    let raw = match data {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => obj.get("data")?.as_str()?,
        _ => return None,
    };
    let bytes = hex::decode(raw.trim_start_matches("0x")).ok()?;
    let payload = bytes.strip_prefix(id(ERROR_STRING_SIGNATURE).as_slice())?;
    ethers::abi::decode(&[ParamType::String], payload)
        .ok()?
        .pop()?
        .into_string()
}
