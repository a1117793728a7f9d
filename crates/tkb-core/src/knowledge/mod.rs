//! Knowledge registry: record model, contract seam and the aggregated read path.

mod aggregator;
mod record;

pub use aggregator::{collect_records, BatchSummary, RecordAggregator, RecordBatch};
pub use record::{format_timestamp, KnowledgeRecord, NormalizeError, RecordView, VerificationStatus};

#[cfg(test)]
pub(crate) use record::tests::{encode_record, record_tokens};

use crate::chain::ChainError;

/// Read-only binding to a deployed registry contract.
#[async_trait::async_trait]
pub trait RegistryContract: Send + Sync {
    /// Address the binding calls into.
    fn address(&self) -> &str;

    /// Node endpoint serving the binding.
    fn endpoint(&self) -> &str;

    /// `getTotalRecords()`.
    async fn total_records(&self) -> Result<u64, ChainError>;

    /// `getRecord(index)`; indices run from `0` to `total_records() - 1`.
    async fn get_record(&self, index: u64) -> Result<KnowledgeRecord, ChainError>;
}
