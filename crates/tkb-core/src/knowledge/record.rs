//! Knowledge records as stored by the registry contract, and their normalized JSON form.

use crate::chain::ChainError;
use chrono::{DateTime, SecondsFormat};
use ethers::abi::{ParamType, Token};
use ethers::types::U256;
use serde::{Deserialize, Serialize, Serializer};

/// Review progress of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationStatus {
    Pending = 0,
    Verified = 1,
    Validated = 2,
}

impl VerificationStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Pending),
            1 => Some(Self::Verified),
            2 => Some(Self::Validated),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Serialized as the on-chain small integer.
impl Serialize for VerificationStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

/// Record as returned by `getRecord(uint256)`, field order matching the return tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeRecord {
    pub id: U256,
    pub scientific_name: String,
    pub common_name: String,
    pub habitat: String,
    pub usage_description: String,
    pub preparation_method: String,
    /// Content-addressed reference to the off-chain record body.
    pub ipfs_hash: String,
    pub image_hash: String,
    pub document_hash: String,
    pub community_id: String,
    /// Contact address of the community.
    pub community_lead: String,
    pub contributor: String,
    /// Epoch seconds.
    pub created_at: u64,
    pub updated_at: u64,
    pub status: VerificationStatus,
    pub access_permission: bool,
    pub validator_id: String,
}

impl KnowledgeRecord {
    /// Decodes the ABI return data of `getRecord(uint256)`.
    pub fn from_abi(data: &[u8]) -> Result<Self, ChainError> {
        let tuple = ethers::abi::decode(&[record_tuple()], data)?
            .pop()
            .and_then(Token::into_tuple)
            .ok_or_else(|| ChainError::decode("getRecord returned no tuple"))?;
        let mut t = Fields(tuple.into_iter());
        Ok(Self {
            id: t.uint()?,
            scientific_name: t.string()?,
            common_name: t.string()?,
            habitat: t.string()?,
            usage_description: t.string()?,
            preparation_method: t.string()?,
            ipfs_hash: t.string()?,
            image_hash: t.string()?,
            document_hash: t.string()?,
            community_id: t.string()?,
            community_lead: t.address()?,
            contributor: t.address()?,
            created_at: t.u64()?,
            updated_at: t.u64()?,
            status: t.status()?,
            access_permission: t.boolean()?,
            validator_id: t.string()?,
        })
    }

    /// Display form served to clients. Fails only when a timestamp has no calendar date.
    pub fn normalize(&self) -> Result<RecordView, NormalizeError> {
        Ok(RecordView {
            id: self.id.to_string(),
            scientific_name: self.scientific_name.clone(),
            common_name: self.common_name.clone(),
            habitat: self.habitat.clone(),
            usage_description: self.usage_description.clone(),
            preparation_method: self.preparation_method.clone(),
            ipfs_hash: self.ipfs_hash.clone(),
            image_hash: self.image_hash.clone(),
            document_hash: self.document_hash.clone(),
            community_id: self.community_id.clone(),
            community_lead: self.community_lead.clone(),
            contributor: self.contributor.clone(),
            created_at: format_timestamp(self.created_at).ok_or(NormalizeError::Timestamp(self.created_at))?,
            updated_at: format_timestamp(self.updated_at).ok_or(NormalizeError::Timestamp(self.updated_at))?,
            status: self.status.as_u8(),
            access_permission: self.access_permission,
            validator_id: self.validator_id.clone(),
        })
    }
}

/// Return tuple of `getRecord(uint256)`, in field order.
fn record_tuple() -> ParamType {
    let mut fields = vec![ParamType::Uint(256)];
    fields.extend(std::iter::repeat(ParamType::String).take(9));
    fields.extend([
        ParamType::Address,
        ParamType::Address,
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Uint(8),
        ParamType::Bool,
        ParamType::String,
    ]);
    ParamType::Tuple(fields)
}

/// Typed reads over decoded tuple fields.
struct Fields(std::vec::IntoIter<Token>);

impl Fields {
    fn next(&mut self) -> Result<Token, ChainError> {
        self.0.next().ok_or_else(|| ChainError::decode("record tuple too short"))
    }

    fn uint(&mut self) -> Result<U256, ChainError> {
        self.next()?.into_uint().ok_or_else(|| ChainError::decode("expected uint"))
    }

    fn u64(&mut self) -> Result<u64, ChainError> {
        let value = self.uint()?;
        if value > U256::from(u64::MAX) {
            return Err(ChainError::decode(format!("value {} exceeds 64 bits", value)));
        }
        Ok(value.as_u64())
    }

    fn status(&mut self) -> Result<VerificationStatus, ChainError> {
        let raw = self.u64()?;
        u8::try_from(raw)
            .ok()
            .and_then(VerificationStatus::from_u8)
            .ok_or_else(|| ChainError::decode(format!("unknown verification status {}", raw)))
    }

    fn boolean(&mut self) -> Result<bool, ChainError> {
        self.next()?.into_bool().ok_or_else(|| ChainError::decode("expected bool"))
    }

    /// Lower-case `0x` hex.
    fn address(&mut self) -> Result<String, ChainError> {
        let address = self.next()?.into_address().ok_or_else(|| ChainError::decode("expected address"))?;
        Ok(format!("{:#x}", address))
    }

    fn string(&mut self) -> Result<String, ChainError> {
        self.next()?.into_string().ok_or_else(|| ChainError::decode("expected string"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("timestamp {0} has no calendar date")]
    Timestamp(u64),
}

/// Normalized record served by `GET /api/knowledge`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordView {
    pub id: String,
    pub scientific_name: String,
    pub common_name: String,
    pub habitat: String,
    pub usage_description: String,
    pub preparation_method: String,
    pub ipfs_hash: String,
    pub image_hash: String,
    pub document_hash: String,
    pub community_id: String,
    pub community_lead: String,
    pub contributor: String,
    pub created_at: String,
    pub updated_at: String,
    pub status: u8,
    pub access_permission: bool,
    pub validator_id: String,
}

/// Epoch seconds as an RFC 3339 UTC date with millisecond precision (`1970-01-01T00:00:00.000Z`).
pub fn format_timestamp(secs: u64) -> Option<String> {
    let secs = i64::try_from(secs).ok()?;
    DateTime::from_timestamp(secs, 0).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}
