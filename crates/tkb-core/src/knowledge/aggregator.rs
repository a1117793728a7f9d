use super::{RecordView, RegistryContract};
use crate::connector::ConnectionManager;
use crate::error::RegistryError;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Counts of the last aggregation, kept for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// `getTotalRecords()` at read time.
    pub total: u64,
    pub returned: u64,
    /// Indices skipped because the caller may not read them.
    pub denied: u64,
    /// Indices skipped for any other reason (reverts, malformed data, transport).
    pub failed: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    /// Successfully normalized records in index order.
    pub records: Vec<RecordView>,
    pub total: u64,
    pub denied: u64,
    pub failed: u64,
}

impl RecordBatch {
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            total: self.total,
            returned: self.records.len() as u64,
            denied: self.denied,
            failed: self.failed,
        }
    }
}

/// Reads every record from `contract`, skipping the indices that fail.
///
/// Only a failing total-count read fails the batch. `concurrency` bounds the
/// reads in flight; output stays in index order either way.
pub async fn collect_records(
    contract: &dyn RegistryContract,
    concurrency: usize,
) -> Result<RecordBatch, RegistryError> {
    let total = contract
        .total_records()
        .await
        .map_err(|e| RegistryError::UpstreamUnavailable(e.to_string()))?;

    let mut batch = RecordBatch {
        total,
        ..RecordBatch::default()
    };
    if total == 0 {
        return Ok(batch);
    }

    let mut reads = stream::iter(0..total)
        .map(|index| async move { (index, contract.get_record(index).await) })
        .buffered(concurrency.max(1));

    let mut seen_ids: HashSet<String> = HashSet::new();
    while let Some((index, outcome)) = reads.next().await {
        let record = match outcome {
            Ok(record) => record,
            Err(e) if e.is_access_denied() => {
                let skipped = RegistryError::RecordAccessDenied {
                    index,
                    reason: e.to_string(),
                };
                tracing::debug!(target: "tkb::records", index, "Skipping record: {}", skipped);
                batch.denied += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(target: "tkb::records", index, error = %e, "Skipping unreadable record");
                batch.failed += 1;
                continue;
            }
        };

        let view = match record.normalize() {
            Ok(view) => view,
            Err(e) => {
                tracing::warn!(target: "tkb::records", index, error = %e, "Skipping record that cannot be normalized");
                batch.failed += 1;
                continue;
            }
        };

        if !seen_ids.insert(view.id.clone()) {
            tracing::warn!(target: "tkb::records", index, id = %view.id, "Skipping record with duplicate id");
            batch.failed += 1;
            continue;
        }
        batch.records.push(view);
    }

    Ok(batch)
}

/// Read path behind `GET /api/knowledge`. Never connects or deploys on its own.
pub struct RecordAggregator {
    connection: Arc<ConnectionManager>,
    concurrency: usize,
    last_summary: RwLock<Option<BatchSummary>>,
}

impl RecordAggregator {
    pub fn new(connection: Arc<ConnectionManager>, concurrency: usize) -> Self {
        Self {
            connection,
            concurrency: concurrency.max(1),
            last_summary: RwLock::new(None),
        }
    }

    /// Fresh read of all accessible records. `NotReady` until the connector holds a handle.
    pub async fn list_records(&self) -> Result<RecordBatch, RegistryError> {
        let contract = self.connection.current_handle().ok_or(RegistryError::NotReady)?;
        let batch = collect_records(contract.as_ref(), self.concurrency).await?;
        let summary = batch.summary();
        tracing::info!(
            target: "tkb::records",
            total = summary.total,
            returned = summary.returned,
            denied = summary.denied,
            failed = summary.failed,
            "Records aggregated"
        );
        if let Ok(mut last) = self.last_summary.write() {
            *last = Some(summary);
        }
        Ok(batch)
    }

    pub fn last_summary(&self) -> Option<BatchSummary> {
        self.last_summary.read().ok().and_then(|s| *s)
    }
}
