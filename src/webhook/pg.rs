//! Postgres-backed stores and queue. Schema lives in `migrations/`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use tokio::sync::Notify;

use super::error::{HookError, QueueError};
use super::event::{HookContentType, HookEvent, HookEventType, HookStatus};
use super::model::{HookRequest, HookResponse, HookTask, Webhook};
use super::queue::HookQueue;
use super::store::{HookTaskStore, ListWebhookOptions, WebhookStore};

const WEBHOOK_COLUMNS: &str = "id, repo_id, owner_id, is_system_webhook, url, http_method, \
     content_type, secret, events, is_active, hook_type, meta, last_status, \
     header_authorization_encrypted, created_at, updated_at";

const TASK_COLUMNS: &str = "id, hook_id, uuid, payload_content, event_type, payload_version, \
     is_delivered, replay_requested, is_succeed, delivered, request_content, response_content";

#[derive(sqlx::FromRow)]
struct WebhookRow {
    id: i64,
    repo_id: i64,
    owner_id: i64,
    is_system_webhook: bool,
    url: String,
    http_method: String,
    content_type: String,
    secret: String,
    events: Json<HookEvent>,
    is_active: bool,
    hook_type: String,
    meta: String,
    last_status: String,
    header_authorization_encrypted: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WebhookRow> for Webhook {
    fn from(r: WebhookRow) -> Self {
        Self {
            id: r.id,
            repo_id: r.repo_id,
            owner_id: r.owner_id,
            is_system_webhook: r.is_system_webhook,
            url: r.url,
            http_method: r.http_method,
            content_type: HookContentType::parse(&r.content_type).unwrap_or_default(),
            secret: r.secret,
            events: r.events.0,
            is_active: r.is_active,
            hook_type: r.hook_type,
            meta: r.meta,
            last_status: HookStatus::parse(&r.last_status),
            header_authorization_encrypted: r.header_authorization_encrypted,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    hook_id: i64,
    uuid: String,
    payload_content: String,
    event_type: String,
    payload_version: i32,
    is_delivered: bool,
    replay_requested: bool,
    is_succeed: bool,
    delivered: i64,
    request_content: Option<Json<HookRequest>>,
    response_content: Option<Json<HookResponse>>,
}

impl TryFrom<TaskRow> for HookTask {
    type Error = HookError;

    fn try_from(r: TaskRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            hook_id: r.hook_id,
            uuid: r.uuid,
            payload_content: r.payload_content,
            event_type: r.event_type.parse::<HookEventType>()?,
            payload_version: r.payload_version,
            is_delivered: r.is_delivered,
            replay_requested: r.replay_requested,
            is_succeed: r.is_succeed,
            delivered: r.delivered,
            request_info: r.request_content.map(|j| j.0),
            response_info: r.response_content.map(|j| j.0),
        })
    }
}

fn collect_tasks(rows: Vec<TaskRow>) -> Result<Vec<HookTask>, HookError> {
    rows.into_iter().map(HookTask::try_from).collect()
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

pub struct PgWebhookStore {
    pool: PgPool,
}

impl PgWebhookStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookStore for PgWebhookStore {
    #[tracing::instrument(skip(self, hook), fields(hook_type = %hook.hook_type), err)]
    async fn create(&self, hook: Webhook) -> Result<Webhook, HookError> {
        let sql = format!(
            "INSERT INTO webhook (repo_id, owner_id, is_system_webhook, url, http_method, \
                content_type, secret, events, is_active, hook_type, meta, last_status, \
                header_authorization_encrypted) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {WEBHOOK_COLUMNS}"
        );
        let row: WebhookRow = sqlx::query_as(&sql)
            .bind(hook.repo_id)
            .bind(hook.owner_id)
            .bind(hook.is_system_webhook)
            .bind(&hook.url)
            .bind(&hook.http_method)
            .bind(hook.content_type.name())
            .bind(&hook.secret)
            .bind(Json(hook.events))
            .bind(hook.is_active)
            .bind(&hook.hook_type)
            .bind(&hook.meta)
            .bind(hook.last_status.as_str())
            .bind(&hook.header_authorization_encrypted)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn get_by_id(&self, id: i64) -> Result<Webhook, HookError> {
        let sql = format!("SELECT {WEBHOOK_COLUMNS} FROM webhook WHERE id = $1");
        sqlx::query_as::<_, WebhookRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Webhook::from)
            .ok_or(HookError::WebhookNotExist { id })
    }

    async fn list(&self, opts: ListWebhookOptions) -> Result<Vec<Webhook>, HookError> {
        let sql = format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhook \
             WHERE NOT is_system_webhook AND repo_id = $1 AND owner_id = $2 \
               AND ($3::BOOLEAN IS NULL OR is_active = $3) \
             ORDER BY id"
        );
        let rows: Vec<WebhookRow> = sqlx::query_as(&sql)
            .bind(opts.repo_id)
            .bind(opts.owner_id)
            .bind(opts.is_active)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Webhook::from).collect())
    }

    async fn get_system_webhooks(&self, is_active: Option<bool>) -> Result<Vec<Webhook>, HookError> {
        let sql = format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhook \
             WHERE is_system_webhook AND ($1::BOOLEAN IS NULL OR is_active = $1) \
             ORDER BY id"
        );
        let rows: Vec<WebhookRow> = sqlx::query_as(&sql)
            .bind(is_active)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Webhook::from).collect())
    }

    #[tracing::instrument(skip(self, hook), fields(hook_id = hook.id), err)]
    async fn update(&self, hook: &Webhook) -> Result<(), HookError> {
        let result = sqlx::query(
            "UPDATE webhook SET url = $2, http_method = $3, content_type = $4, secret = $5, \
                events = $6, is_active = $7, meta = $8, header_authorization_encrypted = $9, \
                is_system_webhook = $10, updated_at = now() \
             WHERE id = $1",
        )
        .bind(hook.id)
        .bind(&hook.url)
        .bind(&hook.http_method)
        .bind(hook.content_type.name())
        .bind(&hook.secret)
        .bind(Json(hook.events))
        .bind(hook.is_active)
        .bind(&hook.meta)
        .bind(&hook.header_authorization_encrypted)
        .bind(hook.is_system_webhook)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HookError::WebhookNotExist { id: hook.id });
        }
        Ok(())
    }

    async fn update_last_status(&self, id: i64, status: HookStatus) -> Result<(), HookError> {
        sqlx::query("UPDATE webhook SET last_status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), err)]
    async fn delete(&self, id: i64) -> Result<(), HookError> {
        let result = sqlx::query("DELETE FROM webhook WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(HookError::WebhookNotExist { id });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hook tasks
// ---------------------------------------------------------------------------

pub struct PgHookTaskStore {
    pool: PgPool,
}

impl PgHookTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HookTaskStore for PgHookTaskStore {
    #[tracing::instrument(skip(self, task), fields(hook_id = task.hook_id), err)]
    async fn create(&self, task: HookTask) -> Result<HookTask, HookError> {
        let sql = format!(
            "INSERT INTO hook_task (hook_id, uuid, payload_content, event_type, payload_version) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {TASK_COLUMNS}"
        );
        let row: TaskRow = sqlx::query_as(&sql)
            .bind(task.hook_id)
            .bind(&task.uuid)
            .bind(&task.payload_content)
            .bind(task.event_type.as_str())
            .bind(task.payload_version)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn get_by_id(&self, id: i64) -> Result<HookTask, HookError> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM hook_task WHERE id = $1");
        sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(HookError::HookTaskNotExist { id })?
            .try_into()
    }

    async fn get_by_uuid(&self, hook_id: i64, uuid: &str) -> Result<HookTask, HookError> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM hook_task WHERE hook_id = $1 AND uuid = $2");
        sqlx::query_as::<_, TaskRow>(&sql)
            .bind(hook_id)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| HookError::HookTaskUuidNotExist {
                hook_id,
                uuid: uuid.to_owned(),
            })?
            .try_into()
    }

    #[tracing::instrument(skip(self), err)]
    async fn request_replay(&self, hook_id: i64, uuid: &str) -> Result<HookTask, HookError> {
        let sql = format!(
            "UPDATE hook_task SET replay_requested = true \
             WHERE hook_id = $1 AND uuid = $2 \
             RETURNING {TASK_COLUMNS}"
        );
        sqlx::query_as::<_, TaskRow>(&sql)
            .bind(hook_id)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| HookError::HookTaskUuidNotExist {
                hook_id,
                uuid: uuid.to_owned(),
            })?
            .try_into()
    }

    async fn mark_delivered(&self, id: i64) -> Result<bool, HookError> {
        let result = sqlx::query(
            "UPDATE hook_task SET is_delivered = true, replay_requested = false \
             WHERE id = $1 AND (is_delivered = false OR replay_requested = true)",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update(&self, task: &HookTask) -> Result<(), HookError> {
        sqlx::query(
            "UPDATE hook_task SET is_delivered = $2, is_succeed = $3, delivered = $4, \
                request_content = $5, response_content = $6 \
             WHERE id = $1",
        )
        .bind(task.id)
        .bind(task.is_delivered)
        .bind(task.is_succeed)
        .bind(task.delivered)
        .bind(task.request_info.as_ref().map(Json))
        .bind(task.response_info.as_ref().map(Json))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_hook(
        &self,
        hook_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<HookTask>, HookError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM hook_task WHERE hook_id = $1 \
             ORDER BY id DESC LIMIT $2 OFFSET $3"
        );
        let offset = i64::from(page.max(1) - 1) * i64::from(page_size);
        let rows: Vec<TaskRow> = sqlx::query_as(&sql)
            .bind(hook_id)
            .bind(i64::from(page_size))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        collect_tasks(rows)
    }

    async fn find_pending_ids(&self) -> Result<Vec<i64>, HookError> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM hook_task \
             WHERE is_delivered = false OR replay_requested = true \
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    #[tracing::instrument(skip(self), err)]
    async fn cleanup_delivered(&self, older_than: DateTime<Utc>) -> Result<u64, HookError> {
        let cutoff = older_than.timestamp_nanos_opt().unwrap_or(i64::MAX);
        let result = sqlx::query(
            "DELETE FROM hook_task \
             WHERE is_delivered = true AND replay_requested = false AND delivered < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Table-backed FIFO. Entries survive restarts; pops use `SKIP LOCKED` so
/// concurrent consumers never receive the same row.
pub struct PgQueue {
    pool: PgPool,
    poll_interval: Duration,
    pushed: Notify,
}

impl PgQueue {
    pub fn new(pool: PgPool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
            pushed: Notify::new(),
        }
    }
}

#[async_trait]
impl HookQueue for PgQueue {
    async fn push(&self, task_id: i64) -> Result<(), QueueError> {
        let result = sqlx::query(
            "INSERT INTO hook_queue (task_id) VALUES ($1) ON CONFLICT (task_id) DO NOTHING",
        )
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::AlreadyInQueue);
        }
        self.pushed.notify_one();
        Ok(())
    }

    async fn pop_batch(&self, limit: usize) -> Result<Vec<i64>, QueueError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let ids = sqlx::query_scalar(
            "DELETE FROM hook_queue WHERE id IN ( \
                SELECT id FROM hook_queue ORDER BY id LIMIT $1 FOR UPDATE SKIP LOCKED \
             ) RETURNING task_id",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn wait_for_items(&self) {
        tokio::select! {
            () = self.pushed.notified() => {}
            () = tokio::time::sleep(self.poll_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::event::hook_type;

    // Requires a live database: run with `cargo test -- --ignored`.

    #[ignore]
    #[sqlx::test(migrations = "./migrations")]
    async fn webhook_crud_roundtrip(pool: PgPool) {
        let store = PgWebhookStore::new(pool);
        let mut hook = Webhook::new(hook_type::SLACK, "https://hooks.slack.com/x");
        hook.repo_id = 3;
        hook.is_active = true;
        hook.events.send_everything = true;

        let created = store.create(hook).await.unwrap();
        let fetched = store.get_by_id(created.id).await.unwrap();
        assert_eq!(fetched.url, "https://hooks.slack.com/x");
        assert!(fetched.events.send_everything);

        let listed = store
            .list(ListWebhookOptions {
                repo_id: 3,
                owner_id: 0,
                is_active: Some(true),
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        store.delete(created.id).await.unwrap();
        assert!(store.get_by_id(created.id).await.unwrap_err().is_not_exist());
    }

    #[ignore]
    #[sqlx::test(migrations = "./migrations")]
    async fn task_claim_and_replay(pool: PgPool) {
        let store = PgHookTaskStore::new(pool);
        let task = store
            .create(HookTask::new(1, HookEventType::Package, "{}".into()))
            .await
            .unwrap();

        assert!(store.mark_delivered(task.id).await.unwrap());
        assert!(!store.mark_delivered(task.id).await.unwrap());

        store.request_replay(1, &task.uuid).await.unwrap();
        assert_eq!(store.find_pending_ids().await.unwrap(), vec![task.id]);
        assert!(store.mark_delivered(task.id).await.unwrap());

        let err = store.request_replay(2, &task.uuid).await.unwrap_err();
        assert!(matches!(err, HookError::HookTaskUuidNotExist { .. }));
    }

    #[ignore]
    #[sqlx::test(migrations = "./migrations")]
    async fn queue_dedups_and_pops_fifo(pool: PgPool) {
        let queue = PgQueue::new(pool, Duration::from_millis(10));
        queue.push(5).await.unwrap();
        queue.push(6).await.unwrap();
        assert!(matches!(queue.push(5).await, Err(QueueError::AlreadyInQueue)));

        assert_eq!(queue.pop_batch(10).await.unwrap(), vec![5, 6]);
        assert!(queue.pop_batch(10).await.unwrap().is_empty());
        queue.push(5).await.unwrap();
    }
}
