use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use super::deliver::Deliverer;
use super::error::{HookError, QueueError};
use super::event::HookEventType;
use super::model::{HookTask, Webhook};
use super::payload::{Payloader, User};
use super::queue::{HookQueue, QueueHandler};
use super::store::{HookTaskStore, ListWebhookOptions, WebhookStore};

/// Repository an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepoRef {
    pub id: i64,
    pub owner_id: i64,
}

/// Scope of an event, used only to resolve which webhooks receive it.
#[derive(Debug, Clone, Default)]
pub struct EventSource {
    pub repository: Option<RepoRef>,
    pub owner: Option<User>,
}

impl EventSource {
    pub fn for_owner(owner: User) -> Self {
        Self {
            repository: None,
            owner: Some(owner),
        }
    }

    /// Explicit owner wins over the repository's owner.
    fn owner_id(&self) -> Option<i64> {
        self.owner
            .as_ref()
            .map(|o| o.id)
            .or_else(|| self.repository.map(|r| r.owner_id))
    }
}

pub struct WebhookService {
    hooks: Arc<dyn WebhookStore>,
    tasks: Arc<dyn HookTaskStore>,
    queue: Arc<dyn HookQueue>,
    deliverer: Deliverer,
    disabled: bool,
    task_retention_days: u32,
}

impl WebhookService {
    pub fn new(
        hooks: Arc<dyn WebhookStore>,
        tasks: Arc<dyn HookTaskStore>,
        queue: Arc<dyn HookQueue>,
        deliverer: Deliverer,
        disabled: bool,
        task_retention_days: u32,
    ) -> Self {
        Self {
            hooks,
            tasks,
            queue,
            deliverer,
            disabled,
            task_retention_days,
        }
    }

    /// Persist and enqueue one task for `hook` if it subscribes to `event`.
    #[tracing::instrument(skip(self, hook, payload), fields(hook_id = hook.id, %event), err)]
    pub async fn prepare_webhook<P: Payloader + ?Sized + Sync>(
        &self,
        hook: &Webhook,
        event: HookEventType,
        payload: &P,
    ) -> Result<(), HookError> {
        if self.disabled || !hook.has_event(event) {
            return Ok(());
        }

        let content = payload.json_payload().map_err(|e| HookError::Other(e.into()))?;
        let task = self
            .tasks
            .create(HookTask::new(hook.id, event, content))
            .await?;

        self.enqueue(task.id).await
    }

    /// Fan `payload` out to every active webhook in scope of `source` plus
    /// every active system webhook. Stops at the first failure; tasks
    /// already enqueued for earlier webhooks stay queued.
    #[tracing::instrument(skip(self, source, payload), fields(%event), err)]
    pub async fn prepare_webhooks<P: Payloader + ?Sized + Sync>(
        &self,
        source: &EventSource,
        event: HookEventType,
        payload: &P,
    ) -> Result<(), HookError> {
        if self.disabled {
            return Ok(());
        }

        let mut candidates = Vec::new();
        if let Some(repo) = source.repository {
            candidates.extend(
                self.hooks
                    .list(ListWebhookOptions {
                        repo_id: repo.id,
                        owner_id: 0,
                        is_active: Some(true),
                    })
                    .await?,
            );
        }
        if let Some(owner_id) = source.owner_id() {
            candidates.extend(
                self.hooks
                    .list(ListWebhookOptions {
                        repo_id: 0,
                        owner_id,
                        is_active: Some(true),
                    })
                    .await?,
            );
        }
        candidates.extend(self.hooks.get_system_webhooks(Some(true)).await?);

        for hook in &candidates {
            self.prepare_webhook(hook, event, payload).await?;
        }
        Ok(())
    }

    /// Queue an existing task of `hook` for another delivery attempt.
    #[tracing::instrument(skip(self, hook), fields(hook_id = hook.id), err)]
    pub async fn replay_hook_task(&self, hook: &Webhook, uuid: &str) -> Result<(), HookError> {
        let task = self.tasks.request_replay(hook.id, uuid).await?;
        self.enqueue(task.id).await
    }

    /// Re-push every undelivered task. Run once at startup.
    pub async fn requeue_pending(&self) -> Result<usize, HookError> {
        let ids = self.tasks.find_pending_ids().await?;
        for id in &ids {
            self.enqueue(*id).await?;
        }
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "requeued pending hook tasks");
        }
        Ok(ids.len())
    }

    /// Delete delivered tasks past the retention window.
    pub async fn cleanup_hook_tasks(&self) -> Result<u64, HookError> {
        if self.task_retention_days == 0 {
            return Ok(0);
        }
        let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(self.task_retention_days));
        let removed = self.tasks.cleanup_delivered(cutoff).await?;
        if removed > 0 {
            tracing::info!(removed, "cleaned up delivered hook tasks");
        }
        Ok(removed)
    }

    async fn enqueue(&self, task_id: i64) -> Result<(), HookError> {
        match self.queue.push(task_id).await {
            Ok(()) | Err(QueueError::AlreadyInQueue) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_one(&self, id: i64) {
        let mut task = match self.tasks.get_by_id(id).await {
            Ok(task) => task,
            Err(e) if e.is_not_exist() => {
                tracing::warn!(task_id = id, "hook task no longer exists");
                return;
            }
            Err(e) => {
                tracing::error!(task_id = id, error = %e, "failed to load hook task");
                return;
            }
        };

        if !task.is_pending() {
            tracing::trace!(task_id = id, "hook task already delivered");
            return;
        }

        if let Err(e) = self.deliverer.deliver(&mut task).await {
            tracing::error!(task_id = id, error = %e, "hook task delivery error");
        }
    }
}

#[async_trait]
impl QueueHandler for WebhookService {
    async fn handle(&self, items: Vec<i64>) {
        for id in items {
            self.handle_one(id).await;
        }
    }
}

/// Periodically purge old delivered tasks until shutdown.
pub async fn run_cleanup(
    service: Arc<WebhookService>,
    interval: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    tracing::info!("hook task cleanup started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("hook task cleanup shutting down");
                break;
            }
            () = tokio::time::sleep(interval) => {
                if let Err(e) = service.cleanup_hook_tasks().await {
                    tracing::error!(error = %e, "error cleaning up hook tasks");
                }
            }
        }
    }
}
