//! In-process stores for tests and `FORGE_STORAGE=memory`.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::error::HookError;
use super::event::HookStatus;
use super::model::{HookTask, Webhook};
use super::store::{HookTaskStore, ListWebhookOptions, WebhookStore, page_offset};

#[derive(Default)]
pub struct MemoryWebhookStore {
    next_id: AtomicI64,
    hooks: DashMap<i64, Webhook>,
}

impl MemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_id(mut hooks: Vec<Webhook>) -> Vec<Webhook> {
    hooks.sort_by_key(|h| h.id);
    hooks
}

#[async_trait]
impl WebhookStore for MemoryWebhookStore {
    async fn create(&self, mut hook: Webhook) -> Result<Webhook, HookError> {
        hook.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        hook.created_at = now;
        hook.updated_at = now;
        self.hooks.insert(hook.id, hook.clone());
        Ok(hook)
    }

    async fn get_by_id(&self, id: i64) -> Result<Webhook, HookError> {
        self.hooks
            .get(&id)
            .map(|h| h.clone())
            .ok_or(HookError::WebhookNotExist { id })
    }

    async fn list(&self, opts: ListWebhookOptions) -> Result<Vec<Webhook>, HookError> {
        let hooks = self
            .hooks
            .iter()
            .filter(|h| opts.matches(h.value()))
            .map(|h| h.value().clone())
            .collect();
        Ok(sorted_by_id(hooks))
    }

    async fn get_system_webhooks(&self, is_active: Option<bool>) -> Result<Vec<Webhook>, HookError> {
        let hooks = self
            .hooks
            .iter()
            .filter(|h| h.is_system_webhook && is_active.is_none_or(|a| h.is_active == a))
            .map(|h| h.value().clone())
            .collect();
        Ok(sorted_by_id(hooks))
    }

    async fn update(&self, hook: &Webhook) -> Result<(), HookError> {
        let mut entry = self
            .hooks
            .get_mut(&hook.id)
            .ok_or(HookError::WebhookNotExist { id: hook.id })?;
        let created_at = entry.created_at;
        *entry = hook.clone();
        entry.created_at = created_at;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn update_last_status(&self, id: i64, status: HookStatus) -> Result<(), HookError> {
        let mut entry = self
            .hooks
            .get_mut(&id)
            .ok_or(HookError::WebhookNotExist { id })?;
        entry.last_status = status;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), HookError> {
        self.hooks
            .remove(&id)
            .map(|_| ())
            .ok_or(HookError::WebhookNotExist { id })
    }
}

#[derive(Default)]
pub struct MemoryHookTaskStore {
    next_id: AtomicI64,
    tasks: DashMap<i64, HookTask>,
}

impl MemoryHookTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_by_uuid(&self, hook_id: i64, uuid: &str) -> Option<i64> {
        self.tasks
            .iter()
            .find(|t| t.hook_id == hook_id && t.uuid == uuid)
            .map(|t| t.id)
    }
}

#[async_trait]
impl HookTaskStore for MemoryHookTaskStore {
    async fn create(&self, mut task: HookTask) -> Result<HookTask, HookError> {
        task.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_by_id(&self, id: i64) -> Result<HookTask, HookError> {
        self.tasks
            .get(&id)
            .map(|t| t.clone())
            .ok_or(HookError::HookTaskNotExist { id })
    }

    async fn get_by_uuid(&self, hook_id: i64, uuid: &str) -> Result<HookTask, HookError> {
        self.find_by_uuid(hook_id, uuid)
            .and_then(|id| self.tasks.get(&id).map(|t| t.clone()))
            .ok_or_else(|| HookError::HookTaskUuidNotExist {
                hook_id,
                uuid: uuid.to_owned(),
            })
    }

    async fn request_replay(&self, hook_id: i64, uuid: &str) -> Result<HookTask, HookError> {
        let not_exist = || HookError::HookTaskUuidNotExist {
            hook_id,
            uuid: uuid.to_owned(),
        };
        let id = self.find_by_uuid(hook_id, uuid).ok_or_else(not_exist)?;
        let mut entry = self.tasks.get_mut(&id).ok_or_else(not_exist)?;
        entry.replay_requested = true;
        Ok(entry.clone())
    }

    async fn mark_delivered(&self, id: i64) -> Result<bool, HookError> {
        let Some(mut entry) = self.tasks.get_mut(&id) else {
            return Ok(false);
        };
        if !entry.is_pending() {
            return Ok(false);
        }
        entry.is_delivered = true;
        entry.replay_requested = false;
        Ok(true)
    }

    async fn update(&self, task: &HookTask) -> Result<(), HookError> {
        let mut entry = self
            .tasks
            .get_mut(&task.id)
            .ok_or(HookError::HookTaskNotExist { id: task.id })?;
        entry.is_delivered = task.is_delivered;
        entry.is_succeed = task.is_succeed;
        entry.delivered = task.delivered;
        entry.request_info.clone_from(&task.request_info);
        entry.response_info.clone_from(&task.response_info);
        Ok(())
    }

    async fn list_by_hook(
        &self,
        hook_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<HookTask>, HookError> {
        let mut tasks: Vec<HookTask> = self
            .tasks
            .iter()
            .filter(|t| t.hook_id == hook_id)
            .map(|t| t.value().clone())
            .collect();
        tasks.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(tasks
            .into_iter()
            .skip(page_offset(page, page_size))
            .take(page_size as usize)
            .collect())
    }

    async fn find_pending_ids(&self) -> Result<Vec<i64>, HookError> {
        let mut ids: Vec<i64> = self
            .tasks
            .iter()
            .filter(|t| t.is_pending())
            .map(|t| t.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn cleanup_delivered(&self, older_than: DateTime<Utc>) -> Result<u64, HookError> {
        let cutoff = older_than.timestamp_nanos_opt().unwrap_or(i64::MAX);
        let before = self.tasks.len();
        self.tasks
            .retain(|_, t| !(t.is_delivered && !t.replay_requested && t.delivered < cutoff));
        Ok((before - self.tasks.len()) as u64)
    }
}
