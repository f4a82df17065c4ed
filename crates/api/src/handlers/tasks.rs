use axum::{
    extract::{rejection::FormRejection, State},
    Form, Json,
};

use harvester_dispatcher::ResultReport;

use crate::auth::AuthenticatedWorker;
use crate::error::{ApiError, ApiResult};
use crate::response::StatusMessage;
use crate::routes::AppState;

/// 认领一批任务，队列暂停时返回空列表
pub async fn claim_tasks(
    State(state): State<AppState>,
    worker: AuthenticatedWorker,
) -> ApiResult<Json<Vec<String>>> {
    let urls = state.issuer.claim(&worker.worker_id).await?;
    Ok(Json(urls))
}

/// 提交单个任务的结果
pub async fn submit_result(
    State(state): State<AppState>,
    worker: AuthenticatedWorker,
    form: Result<Form<ResultReport>, FormRejection>,
) -> ApiResult<Json<StatusMessage>> {
    let Form(report) = form.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    state.intake.submit(&worker.worker_id, report).await?;

    Ok(Json(StatusMessage::new(
        "success",
        "Result processed successfully",
    )))
}
