pub mod pool;

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::secrets;
use crate::webhook::convert::RequesterRegistry;
use crate::webhook::deliver::Deliverer;
use crate::webhook::hook::HookManager;
use crate::webhook::memory::{MemoryHookTaskStore, MemoryWebhookStore};
use crate::webhook::notifier::{NotifierRegistry, WebhookNotifier};
use crate::webhook::pg::{PgHookTaskStore, PgQueue, PgWebhookStore};
use crate::webhook::queue::{HookQueue, MemoryQueue};
use crate::webhook::service::WebhookService;
use crate::webhook::store::{HookTaskStore, WebhookStore};

/// Storage for webhooks, hook tasks and the delivery queue.
#[derive(Clone)]
pub struct Backends {
    pub hooks: Arc<dyn WebhookStore>,
    pub tasks: Arc<dyn HookTaskStore>,
    pub queue: Arc<dyn HookQueue>,
}

impl Backends {
    pub fn memory() -> Self {
        Self {
            hooks: Arc::new(MemoryWebhookStore::new()),
            tasks: Arc::new(MemoryHookTaskStore::new()),
            queue: Arc::new(MemoryQueue::new()),
        }
    }

    pub fn postgres(pool: &PgPool, config: &Config) -> Self {
        Self {
            hooks: Arc::new(PgWebhookStore::new(pool.clone())),
            tasks: Arc::new(PgHookTaskStore::new(pool.clone())),
            queue: Arc::new(PgQueue::new(pool.clone(), config.poll_interval)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hooks: Arc<dyn WebhookStore>,
    pub tasks: Arc<dyn HookTaskStore>,
    pub queue: Arc<dyn HookQueue>,
    pub service: Arc<WebhookService>,
    pub manager: Arc<HookManager>,
    pub notifiers: Arc<NotifierRegistry>,
}

impl AppState {
    /// Wire the pipeline on top of `backends`. The notifier registry is
    /// complete once this returns.
    pub fn new(config: Config, backends: Backends) -> anyhow::Result<Self> {
        let master_key = secrets::resolve_master_key(config.master_key.as_deref())?;
        let registry = Arc::new(RequesterRegistry::with_defaults(&config.app_url));

        let deliverer = Deliverer::new(
            &config,
            registry.clone(),
            backends.hooks.clone(),
            backends.tasks.clone(),
            master_key,
        )?;
        let service = Arc::new(WebhookService::new(
            backends.hooks.clone(),
            backends.tasks.clone(),
            backends.queue.clone(),
            deliverer,
            config.disable_webhooks,
            config.task_retention_days,
        ));
        let manager = Arc::new(HookManager::new(
            backends.hooks.clone(),
            registry,
            master_key,
            config.allow_private_hosts,
        ));

        let mut notifiers = NotifierRegistry::new();
        notifiers.register(Arc::new(WebhookNotifier::new(service.clone(), &config.app_url)));

        Ok(Self {
            config: Arc::new(config),
            hooks: backends.hooks,
            tasks: backends.tasks,
            queue: backends.queue,
            service,
            manager,
            notifiers: Arc::new(notifiers),
        })
    }
}
