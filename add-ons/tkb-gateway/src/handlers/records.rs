use super::ApiError;
use crate::AppState;
use axum::extract::State;
use axum::Json;
use tkb_core::RecordView;

/// GET /api/knowledge – fresh read of every accessible record, in index order.
pub(crate) async fn list_knowledge(State(state): State<AppState>) -> Result<Json<Vec<RecordView>>, ApiError> {
    match state.records.list_records().await {
        Ok(batch) => Ok(Json(batch.records)),
        Err(e) => {
            tracing::warn!(target: "tkb::records", error = %e, "Knowledge listing failed");
            Err(e.into())
        }
    }
}
