use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Method;

use crate::config::Config;

use super::convert::{OutboundRequest, RequesterRegistry};
use super::error::HookError;
use super::event::HookStatus;
use super::model::{HookRequest, HookResponse, HookTask, PAYLOAD_VERSION, Webhook, now_nanos};
use super::store::{HookTaskStore, WebhookStore};

/// Response bodies are recorded up to this many bytes.
pub const MAX_RESPONSE_BODY: usize = 64 * 1024;

const MASKED: &str = "******";

/// Sends hook tasks and records the outcome on the task and its webhook.
pub struct Deliverer {
    client: reqwest::Client,
    registry: Arc<RequesterRegistry>,
    hooks: Arc<dyn WebhookStore>,
    tasks: Arc<dyn HookTaskStore>,
    master_key: [u8; 32],
    disabled: bool,
}

impl Deliverer {
    pub fn new(
        config: &Config,
        registry: Arc<RequesterRegistry>,
        hooks: Arc<dyn WebhookStore>,
        tasks: Arc<dyn HookTaskStore>,
        master_key: [u8; 32],
    ) -> Result<Self, HookError> {
        let client = reqwest::Client::builder()
            .timeout(config.deliver_timeout)
            .danger_accept_invalid_certs(config.skip_tls_verify)
            .user_agent(concat!("forge-webhooks/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HookError::Other(e.into()))?;

        Ok(Self {
            client,
            registry,
            hooks,
            tasks,
            master_key,
            disabled: config.disable_webhooks,
        })
    }

    /// Deliver one task. The task is claimed first; if another worker already
    /// claimed it (or it was delivered and no replay is pending) nothing is
    /// sent. Every claimed attempt is persisted, including failures to build
    /// the request. A task whose webhook is gone is claimed and recorded as
    /// failed so it leaves the pending set and ages out with retention.
    #[tracing::instrument(skip(self, task), fields(task_id = task.id, hook_id = task.hook_id), err)]
    pub async fn deliver(&self, task: &mut HookTask) -> Result<(), HookError> {
        let hook = match self.hooks.get_by_id(task.hook_id).await {
            Ok(hook) => Some(hook),
            Err(e) if e.is_not_exist() => None,
            Err(e) => return Err(e),
        };

        if !self.tasks.mark_delivered(task.id).await? {
            tracing::trace!("hook task already delivered");
            return Ok(());
        }

        task.is_delivered = true;
        task.replay_requested = false;
        task.is_succeed = false;
        task.request_info = None;
        task.response_info = None;

        let Some(hook) = hook else {
            let missing = HookError::WebhookNotExist { id: task.hook_id };
            task.response_info = Some(delivery_error(&missing));
            task.delivered = now_nanos();
            self.tasks.update(task).await?;
            return Err(missing);
        };

        let outcome = self.attempt(&hook, task).await;
        task.delivered = now_nanos();

        self.tasks.update(task).await?;
        let status = if task.is_succeed {
            HookStatus::Succeed
        } else {
            HookStatus::Fail
        };
        self.hooks.update_last_status(hook.id, status).await?;

        match &outcome {
            Ok(()) if task.is_succeed => tracing::debug!(url = %hook.url, "hook task delivered"),
            Ok(()) => tracing::warn!(
                url = %hook.url,
                status = task.response_info.as_ref().map(|r| r.status),
                "hook task delivery failed"
            ),
            Err(_) => {}
        }
        outcome
    }

    async fn attempt(&self, hook: &Webhook, task: &mut HookTask) -> Result<(), HookError> {
        if self.disabled {
            return Err(HookError::Other(anyhow::anyhow!(
                "webhook delivery is disabled"
            )));
        }
        if !hook.is_active {
            tracing::debug!("webhook is inactive, not sending");
            return Ok(());
        }
        if task.payload_version < PAYLOAD_VERSION {
            tracing::warn!(
                payload_version = task.payload_version,
                "hook task payload version is no longer supported"
            );
            return Ok(());
        }

        let mut req = self.registry.new_request(hook, task)?;
        let authorization = hook.header_authorization(&self.master_key)?;
        task.request_info = Some(recorded_request(&req, !authorization.is_empty()));
        if !authorization.is_empty() {
            req.headers.insert("Authorization".into(), authorization);
        }

        let response = self.send(req).await;
        task.is_succeed = (200..300).contains(&response.status);
        task.response_info = Some(response);
        Ok(())
    }

    async fn send(&self, req: OutboundRequest) -> HookResponse {
        let method = match Method::from_bytes(req.method.as_bytes()) {
            Ok(m) => m,
            Err(e) => return delivery_error(&e),
        };

        let mut builder = self.client.request(method, &req.url);
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if !req.body.is_empty() {
            builder = builder.body(req.body);
        }

        let mut resp = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => return delivery_error(&e),
        };

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in resp.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_owned())
                .and_modify(|v| {
                    v.push_str(", ");
                    v.push_str(&value);
                })
                .or_insert(value);
        }
        let status = resp.status().as_u16();

        let mut body = Vec::new();
        loop {
            match resp.chunk().await {
                Ok(Some(chunk)) => {
                    let room = MAX_RESPONSE_BODY - body.len();
                    body.extend_from_slice(&chunk[..chunk.len().min(room)]);
                    if body.len() >= MAX_RESPONSE_BODY {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read hook response body");
                    break;
                }
            }
        }

        HookResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        }
    }
}

fn recorded_request(req: &OutboundRequest, with_authorization: bool) -> HookRequest {
    let mut headers = req.headers.clone();
    if with_authorization {
        headers.insert("Authorization".into(), MASKED.into());
    }
    HookRequest {
        url: req.url.clone(),
        http_method: req.method.clone(),
        headers,
        body: req.body.clone(),
    }
}

fn delivery_error(e: &dyn std::fmt::Display) -> HookResponse {
    HookResponse {
        status: 0,
        headers: BTreeMap::new(),
        body: format!("Delivery: {e}"),
    }
}
