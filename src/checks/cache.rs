//! Check run lifecycle cache.
//!
//! Maps `deployment id + title` to the GitHub check run created for it, so
//! repeated updates for the same logical check (queued, action required,
//! complete) all target one check run. Once GitHub reports a run as
//! completed its entry is evicted; the next update for that key starts a
//! fresh check run instead of reopening a closed one.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::model::{CheckRunRequest, CheckRunResponse};
use crate::activities::{ActivityError, CheckRunClient};
use crate::engine::{RetryConfig, retry_activity};
use crate::types::{CheckRunId, DeploymentId};

const KEY_DELIMITER: &str = "||";

fn cache_key(deployment_id: DeploymentId, title: &str) -> String {
    format!("{deployment_id}{KEY_DELIMITER}{title}")
}

pub struct CheckRunCache<C> {
    client: Arc<C>,
    retry: RetryConfig,
    ids: HashMap<String, CheckRunId>,
}

impl<C: CheckRunClient> CheckRunCache<C> {
    pub fn new(client: Arc<C>) -> Self {
        CheckRunCache {
            client,
            retry: RetryConfig::DEFAULT,
            ids: HashMap::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Records a check run created elsewhere, e.g. the queued check run made
    /// when the revision was accepted.
    pub fn seed(&mut self, deployment_id: DeploymentId, title: &str, id: CheckRunId) {
        self.ids.insert(cache_key(deployment_id, title), id);
    }

    #[cfg(test)]
    fn get(&self, deployment_id: DeploymentId, title: &str) -> Option<CheckRunId> {
        self.ids.get(&cache_key(deployment_id, title)).copied()
    }

    /// Updates the cached check run for this key, or creates one on a miss.
    pub async fn create_or_update(
        &mut self,
        deployment_id: DeploymentId,
        request: CheckRunRequest,
    ) -> Result<CheckRunId, ActivityError> {
        let key = cache_key(deployment_id, &request.title);
        let client = &*self.client;

        let response: CheckRunResponse = match self.ids.get(&key).copied() {
            Some(id) => {
                let update = request.into_update(id);
                retry_activity(self.retry, move || client.update_check_run(update.clone())).await?
            }
            None => {
                let create = request.into_create();
                let response =
                    retry_activity(self.retry, move || client.create_check_run(create.clone())).await?;
                self.ids.insert(key.clone(), response.id);
                response
            }
        };

        if response.status.is_completed() {
            debug!(check_run_id = %response.id, key = %key, "check run completed, evicting");
            self.ids.remove(&key);
        }
        Ok(response.id)
    }
}
