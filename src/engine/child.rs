//! Child workflow execution.
//!
//! A child runs on its own task so it keeps making progress while the parent
//! handles the child's state signals. The parent always awaits the handle to
//! completion; dropping a [`ChildHandle`] does not cancel the child.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;

#[derive(Debug, thiserror::Error)]
pub enum ChildError {
    #[error("child workflow {id} panicked")]
    Panicked { id: String },

    #[error("child workflow {id} was aborted")]
    Aborted { id: String },
}

/// Completion future of a spawned child workflow.
pub struct ChildHandle<T> {
    id: String,
    task: JoinHandle<T>,
}

impl<T> ChildHandle<T> {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl<T> Future for ChildHandle<T> {
    type Output = Result<T, ChildError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id.clone();
        Pin::new(&mut self.task)
            .poll(cx)
            .map(|res| res.map_err(|e: JoinError| classify(id, e)))
    }
}

fn classify(id: String, e: JoinError) -> ChildError {
    if e.is_panic() {
        ChildError::Panicked { id }
    } else {
        ChildError::Aborted { id }
    }
}

/// Spawns `workflow` as the child identified by `id`.
pub fn spawn_child<T, F>(id: impl Into<String>, workflow: F) -> ChildHandle<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let id = id.into();
    let span = tracing::info_span!("child_workflow", workflow_id = %id);
    ChildHandle {
        task: tokio::spawn(workflow.instrument(span)),
        id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_resolves_to_child_output() {
        let handle = spawn_child("job-1", async { 7 });
        assert_eq!(handle.id(), "job-1");
        assert_eq!(handle.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn panicking_child_is_reported() {
        let handle = spawn_child("job-2", async {
            panic!("boom");
        });
        let err: ChildError = handle.await.map(|()| ()).unwrap_err();
        assert!(matches!(err, ChildError::Panicked { ref id } if id == "job-2"));
    }
}
