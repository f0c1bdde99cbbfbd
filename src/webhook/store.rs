use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::HookError;
use super::event::HookStatus;
use super::model::{HookTask, Webhook};

/// Filter for scoped (non-system) webhooks. Exactly the given `repo_id` and
/// `owner_id` match; zero means "not scoped to one".
#[derive(Debug, Clone, Copy, Default)]
pub struct ListWebhookOptions {
    pub repo_id: i64,
    pub owner_id: i64,
    pub is_active: Option<bool>,
}

impl ListWebhookOptions {
    pub fn matches(&self, hook: &Webhook) -> bool {
        !hook.is_system_webhook
            && hook.repo_id == self.repo_id
            && hook.owner_id == self.owner_id
            && self.is_active.is_none_or(|active| hook.is_active == active)
    }
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Insert a new webhook; the returned value carries the assigned id.
    async fn create(&self, hook: Webhook) -> Result<Webhook, HookError>;

    async fn get_by_id(&self, id: i64) -> Result<Webhook, HookError>;

    async fn list(&self, opts: ListWebhookOptions) -> Result<Vec<Webhook>, HookError>;

    async fn get_system_webhooks(&self, is_active: Option<bool>) -> Result<Vec<Webhook>, HookError>;

    async fn update(&self, hook: &Webhook) -> Result<(), HookError>;

    async fn update_last_status(&self, id: i64, status: HookStatus) -> Result<(), HookError>;

    async fn delete(&self, id: i64) -> Result<(), HookError>;
}

#[async_trait]
pub trait HookTaskStore: Send + Sync {
    async fn create(&self, task: HookTask) -> Result<HookTask, HookError>;

    async fn get_by_id(&self, id: i64) -> Result<HookTask, HookError>;

    async fn get_by_uuid(&self, hook_id: i64, uuid: &str) -> Result<HookTask, HookError>;

    /// Flag an existing task for another attempt and return it.
    async fn request_replay(&self, hook_id: i64, uuid: &str) -> Result<HookTask, HookError>;

    /// Atomically claim a pending task for delivery. Returns `false` when the
    /// task is gone or was already claimed.
    async fn mark_delivered(&self, id: i64) -> Result<bool, HookError>;

    /// Persist the delivery outcome fields. The payload is never rewritten.
    async fn update(&self, task: &HookTask) -> Result<(), HookError>;

    /// Tasks of one webhook, newest first. `page` starts at 1.
    async fn list_by_hook(
        &self,
        hook_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<HookTask>, HookError>;

    async fn find_pending_ids(&self) -> Result<Vec<i64>, HookError>;

    /// Delete delivered tasks whose attempt finished before `older_than`.
    async fn cleanup_delivered(&self, older_than: DateTime<Utc>) -> Result<u64, HookError>;
}

pub(crate) fn page_offset(page: u32, page_size: u32) -> usize {
    (page.max(1) as usize - 1) * page_size as usize
}
