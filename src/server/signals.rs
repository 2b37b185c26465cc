//! Signal endpoints: new revisions, unlocks and plan reviews.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};
use uuid::Uuid;

use super::AppState;
use crate::deploy::{DispatchError, NewRevisionSignal, UnlockSignal};
use crate::engine::SignalError;
use crate::terraform::PlanReviewSignal;
use crate::types::DeploymentId;

/// A signal that could not be delivered.
#[derive(Debug)]
pub struct ApiError(pub DispatchError);

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DispatchError::UnknownRoot { .. } => StatusCode::NOT_FOUND,
            DispatchError::Signal(SignalError::NotFound(_)) => StatusCode::NOT_FOUND,
            DispatchError::Signal(SignalError::Closed(_)) => StatusCode::CONFLICT,
            DispatchError::ChannelClosed(_) | DispatchError::ShuttingDown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        if status.is_server_error() {
            warn!(error = %self.0, "signal not delivered");
        }
        (status, self.0.to_string()).into_response()
    }
}

pub async fn new_revision_handler(
    State(app_state): State<AppState>,
    Path((owner, repo, root)): Path<(String, String, String)>,
    Json(signal): Json<NewRevisionSignal>,
) -> Result<(StatusCode, &'static str), ApiError> {
    info!(
        %owner, %repo, %root,
        revision = %signal.revision,
        trigger = ?signal.trigger,
        rerun = signal.rerun,
        "new revision requested"
    );
    app_state
        .signals()
        .new_revision(&owner, &repo, &root, signal)
        .await?;
    Ok((StatusCode::ACCEPTED, "Accepted"))
}

pub async fn unlock_handler(
    State(app_state): State<AppState>,
    Path((owner, repo, root)): Path<(String, String, String)>,
    Json(signal): Json<UnlockSignal>,
) -> Result<(StatusCode, &'static str), ApiError> {
    info!(%owner, %repo, %root, user = %signal.user, "unlock requested");
    app_state
        .signals()
        .unlock(&owner, &repo, &root, signal)
        .await?;
    Ok((StatusCode::ACCEPTED, "Accepted"))
}

pub async fn plan_review_handler(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(signal): Json<PlanReviewSignal>,
) -> Result<(StatusCode, &'static str), ApiError> {
    app_state
        .signals()
        .plan_review(DeploymentId::new(id), signal)
        .await?;
    Ok((StatusCode::ACCEPTED, "Accepted"))
}
