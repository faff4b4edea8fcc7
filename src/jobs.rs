//! Background queue for page refresh jobs.
//!
//! Content edits enqueue a [`RefreshJob`]; a dispatcher task drains the
//! channel and runs each job on its own task, so jobs are unordered
//! relative to each other and to search traffic. The queue is unbounded and
//! nothing is retried.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::refresh::IndexRefreshWorkflow;
use crate::store::ConfigStore;

/// One page to recrawl.
#[derive(Debug, Clone)]
pub struct RefreshJob {
    pub path: String,
    /// Who triggered the refresh, for the log.
    pub user: String,
    pub queued_at: DateTime<Utc>,
}

/// Executes refresh jobs. [`IndexRefreshWorkflow`] is the production
/// handler.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// `true` when the backend accepted the job.
    async fn run(&self, job: &RefreshJob) -> bool;
}

#[async_trait]
impl JobHandler for IndexRefreshWorkflow {
    async fn run(&self, job: &RefreshJob) -> bool {
        self.refresh_content(std::slice::from_ref(&job.path)).await
    }
}

pub struct RefreshQueue {
    store: Arc<ConfigStore>,
    sender: Option<mpsc::UnboundedSender<RefreshJob>>,
}

impl RefreshQueue {
    /// Starts the dispatcher. Outside a tokio runtime the queue is created
    /// disabled and every enqueue is refused.
    pub fn start(store: Arc<ConfigStore>, handler: Arc<dyn JobHandler>) -> Self {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!("no tokio runtime; refresh queue disabled");
            return Self {
                store,
                sender: None,
            };
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<RefreshJob>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let accepted = handler.run(&job).await;
                    tracing::info!(
                        user = %job.user,
                        path = %job.path,
                        queued_at = %job.queued_at,
                        accepted,
                        "refresh job finished"
                    );
                });
            }
            tracing::debug!("refresh queue closed");
        });

        Self {
            store,
            sender: Some(tx),
        }
    }

    /// Queues a refresh of `path`. Returns `false` without queueing when
    /// recrawl is disabled or the dispatcher is gone.
    pub fn enqueue(&self, path: impl Into<String>, user: impl Into<String>) -> bool {
        if !self.store.snapshot().config.recrawl.enabled {
            return false;
        }
        let Some(sender) = &self.sender else {
            return false;
        };
        let job = RefreshJob {
            path: path.into(),
            user: user.into(),
            queued_at: Utc::now(),
        };
        tracing::debug!(path = %job.path, user = %job.user, "refresh job queued");
        sender.send(job).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::time::Duration;

    struct Recorder(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl JobHandler for Recorder {
        async fn run(&self, job: &RefreshJob) -> bool {
            let _ = self.0.send(job.path.clone());
            true
        }
    }

    fn store(enabled: bool) -> Arc<ConfigStore> {
        let mut config = Config::default();
        config.recrawl.enabled = enabled;
        Arc::new(ConfigStore::new(config))
    }

    #[tokio::test]
    async fn test_enqueue_runs_handler() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = RefreshQueue::start(store(true), Arc::new(Recorder(tx)));

        assert!(queue.enqueue("/en/news/1", "editor"));
        let path = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(path.as_deref(), Some("/en/news/1"));
    }

    #[tokio::test]
    async fn test_enqueue_refused_when_recrawl_disabled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = RefreshQueue::start(store(false), Arc::new(Recorder(tx)));

        assert!(!queue.enqueue("/en/news/1", "editor"));
        drop(queue);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_queue_disabled_outside_runtime() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let queue = RefreshQueue::start(store(true), Arc::new(Recorder(tx)));
        assert!(!queue.enqueue("/a", "editor"));
    }
}
