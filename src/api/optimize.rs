use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::{
    api::{error::ApiError, response::ApiResponse},
    controller::AppState,
    domain::DataSetId,
    optimizer::RunOutcome,
    progress::CollectingProgress,
};

/// Result of one solve request: how the run ended plus every progress line it emitted.
#[derive(Debug, Serialize)]
pub struct OptimizeResponse {
    pub outcome: RunOutcome,
    pub messages: Vec<String>,
}

/// POST /api/v1/datasets/:data_set/optimize
///
/// Concurrent requests for the same data set queue behind the run lock. The run
/// is detached from the request: a disconnect or request timeout does not
/// release the lock while the solver is still working, and the result is still
/// stored. A server shutdown cancels the pending solve.
pub async fn optimize(
    State(state): State<AppState>,
    Path(data_set): Path<DataSetId>,
) -> Result<Json<ApiResponse<OptimizeResponse>>, ApiError> {
    let start = Instant::now();
    let progress = Arc::new(CollectingProgress::new());

    let run = {
        let runner = state.runner.clone();
        let progress = progress.clone();
        let cancel = state.shutdown.child_token();
        tokio::spawn(async move { runner.run(&data_set, progress.as_ref(), cancel).await })
    };
    let outcome = run
        .await
        .map_err(|e| ApiError::OptimizationError(format!("optimisation task failed: {e}")))??;

    let response = OptimizeResponse {
        outcome,
        messages: progress.messages(),
    };

    Ok(Json(
        ApiResponse::success(response).with_duration(start.elapsed().as_millis() as u64),
    ))
}
