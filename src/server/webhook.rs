//! Webhook endpoint.
//!
//! Accepts GitHub `check_run` deliveries, verifies their signature and turns
//! requested actions into deploy signals. Other deliveries are acknowledged
//! and dropped.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use super::signals::ApiError;
use crate::deploy::DispatchError;
use crate::webhooks::{ActionSignal, ParseError, parse_webhook, verify_signature};

const HEADER_EVENT: &str = "x-github-event";
const HEADER_DELIVERY: &str = "x-github-delivery";
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] ParseError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match self {
            WebhookError::Dispatch(err) => return ApiError(err).into_response(),
            WebhookError::MissingHeader(_) | WebhookError::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
        };
        (status, self.to_string()).into_response()
    }
}

pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let event_type = get_header(&headers, HEADER_EVENT)?;
    let signature_header = get_header(&headers, HEADER_SIGNATURE)?;
    let delivery_id = get_header(&headers, HEADER_DELIVERY).unwrap_or_default();

    debug!(%delivery_id, %event_type, "received webhook");

    // Nothing is parsed before the signature checks out.
    if !verify_signature(&body, &signature_header, app_state.webhook_secret()) {
        warn!(%delivery_id, "invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    let Some(event) = parse_webhook(&event_type, &body)? else {
        debug!(%delivery_id, %event_type, "ignoring webhook");
        return Ok((StatusCode::ACCEPTED, "Ignored"));
    };

    info!(
        %delivery_id,
        repo = %event.repo,
        check_run_id = %event.check_run_id,
        action = event.action.as_str(),
        user = %event.user,
        "check run action requested"
    );

    match event.into_signal() {
        ActionSignal::PlanReview {
            deployment_id,
            signal,
        } => {
            app_state
                .signals()
                .plan_review(deployment_id, signal)
                .await?
        }
        ActionSignal::Unlock { repo, root, signal } => {
            app_state
                .signals()
                .unlock(&repo.owner, &repo.name, &root, signal)
                .await?
        }
    }
    Ok((StatusCode::ACCEPTED, "Accepted"))
}

fn get_header(headers: &HeaderMap, name: &'static str) -> Result<String, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or(WebhookError::MissingHeader(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_header_present() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_EVENT, "check_run".parse().unwrap());

        assert_eq!(get_header(&headers, HEADER_EVENT).unwrap(), "check_run");
    }

    #[test]
    fn get_header_missing() {
        assert!(matches!(
            get_header(&HeaderMap::new(), HEADER_SIGNATURE),
            Err(WebhookError::MissingHeader(HEADER_SIGNATURE))
        ));
    }

    #[test]
    fn dispatch_failures_use_signal_statuses() {
        let response = WebhookError::Dispatch(DispatchError::ShuttingDown).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = WebhookError::InvalidSignature.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
