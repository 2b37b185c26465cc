//! HTTP surface of the deploy service.
//!
//! # Endpoints
//!
//! - `GET /health` - 200 while accepting signals, 503 once shutting down
//! - `POST /api/v1/repos/{owner}/{repo}/roots/{root}/revisions` - queue a revision
//! - `POST /api/v1/repos/{owner}/{repo}/roots/{root}/unlock` - unlock merge deploys
//! - `POST /api/v1/deployments/{id}/review` - approve or reject a waiting plan
//! - `POST /webhook` - GitHub check run button presses

use std::sync::Arc;

use async_trait::async_trait;

use crate::activities::{CheckRunClient, CommitComparer, DeploymentStore};
use crate::deploy::{DispatchError, Dispatcher, NewRevisionSignal, UnlockSignal};
use crate::terraform::{PlanReviewSignal, WorkflowRunner};
use crate::types::DeploymentId;

pub mod health;
pub mod signals;
pub mod webhook;

pub use health::health_handler;
pub use signals::{ApiError, new_revision_handler, plan_review_handler, unlock_handler};
pub use webhook::{WebhookError, webhook_handler};

/// Where the handlers deliver signals.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn new_revision(
        &self,
        owner: &str,
        repo: &str,
        root: &str,
        signal: NewRevisionSignal,
    ) -> Result<(), DispatchError>;

    async fn unlock(
        &self,
        owner: &str,
        repo: &str,
        root: &str,
        signal: UnlockSignal,
    ) -> Result<(), DispatchError>;

    async fn plan_review(
        &self,
        deployment_id: DeploymentId,
        signal: PlanReviewSignal,
    ) -> Result<(), DispatchError>;

    fn is_shutting_down(&self) -> bool;
}

#[async_trait]
impl<G, S, R> SignalSink for Dispatcher<G, S, R>
where
    G: CommitComparer + CheckRunClient + 'static,
    S: DeploymentStore + 'static,
    R: WorkflowRunner + 'static,
{
    async fn new_revision(
        &self,
        owner: &str,
        repo: &str,
        root: &str,
        signal: NewRevisionSignal,
    ) -> Result<(), DispatchError> {
        Dispatcher::new_revision(self, owner, repo, root, signal).await
    }

    async fn unlock(
        &self,
        owner: &str,
        repo: &str,
        root: &str,
        signal: UnlockSignal,
    ) -> Result<(), DispatchError> {
        Dispatcher::unlock(self, owner, repo, root, signal).await
    }

    async fn plan_review(
        &self,
        deployment_id: DeploymentId,
        signal: PlanReviewSignal,
    ) -> Result<(), DispatchError> {
        Dispatcher::plan_review(self, deployment_id, signal).await
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown_token().is_cancelled()
    }
}

/// Shared application state, passed to handlers via axum's `State`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    signals: Arc<dyn SignalSink>,
    webhook_secret: Vec<u8>,
}

impl AppState {
    pub fn new(signals: Arc<dyn SignalSink>, webhook_secret: impl Into<Vec<u8>>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                signals,
                webhook_secret: webhook_secret.into(),
            }),
        }
    }

    pub fn signals(&self) -> &dyn SignalSink {
        self.inner.signals.as_ref()
    }

    pub fn webhook_secret(&self) -> &[u8] {
        &self.inner.webhook_secret
    }
}

pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler))
        .route(
            "/api/v1/repos/{owner}/{repo}/roots/{root}/revisions",
            post(new_revision_handler),
        )
        .route(
            "/api/v1/repos/{owner}/{repo}/roots/{root}/unlock",
            post(unlock_handler),
        )
        .route("/api/v1/deployments/{id}/review", post(plan_review_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
