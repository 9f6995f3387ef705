//! Operator endpoints: manual trigger runs and delivery statistics.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use coursecast_core::scheduling::TriggerJob;
use coursecast_db::store::DigestStats;

use crate::error::AppResult;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TriggerRunResponse {
    pub job: &'static str,
    pub dispatched: usize,
}

/// POST /api/v1/admin/notifications/triggers/{job}/run
pub async fn run_trigger(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(job): Path<String>,
) -> AppResult<Json<DataResponse<TriggerRunResponse>>> {
    let job: TriggerJob = job.parse()?;
    let dispatched = state.core.triggers.run_job_now(job).await?;
    tracing::info!(
        admin_id = %admin.user_id,
        job = %job,
        dispatched,
        "Trigger job run manually"
    );
    Ok(Json(DataResponse::new(TriggerRunResponse {
        job: job.as_str(),
        dispatched,
    })))
}

/// GET /api/v1/admin/notifications/digest-stats
pub async fn digest_stats(
    RequireAdmin(_): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<DigestStats>>> {
    let stats = state.core.digests.stats().await?;
    Ok(Json(DataResponse::new(stats)))
}
