//! Provider payload conversion and request building.
//!
//! Each provider implements [`PayloadConvertor`] for the canonical event types
//! and exposes a [`HookRequester`] that turns a stored task into an
//! [`OutboundRequest`]. Requesters are looked up by webhook type through the
//! [`RequesterRegistry`]; adding a provider means registering one more.

pub mod discord;
pub mod general;
pub mod generic;
pub mod msteams;
pub mod slack;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::error::HookError;
use super::event::{HookEventType, hook_type};
use super::model::{HookTask, Webhook};
use super::payload::PackagePayload;
use super::sign;

/// HTTP request produced by a requester, sent by the deliverer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl OutboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Maps canonical payloads into one provider's wire schema. Implementations
/// are pure.
pub trait PayloadConvertor {
    type Output: Serialize;

    fn package(&self, p: &PackagePayload) -> Result<Self::Output, HookError>;
}

/// Decode the stored canonical payload for `event` and convert it.
pub fn new_payload<C: PayloadConvertor>(
    convertor: &C,
    data: &str,
    event: HookEventType,
) -> Result<C::Output, HookError> {
    match event {
        HookEventType::Package => {
            let p: PackagePayload = serde_json::from_str(data).map_err(HookError::InvalidPayload)?;
            convertor.package(&p)
        }
        other => Err(HookError::UnsupportedEvent(other.to_string())),
    }
}

/// Build a JSON POST whose body is the converted payload, indented two
/// spaces. The signature covers exactly these body bytes. The stored
/// `http_method` is ignored; chat providers only accept POST.
pub fn new_json_request<C: PayloadConvertor>(
    convertor: &C,
    hook: &Webhook,
    task: &HookTask,
    with_default_headers: bool,
) -> Result<OutboundRequest, HookError> {
    let payload = new_payload(convertor, &task.payload_content, task.event_type)?;
    let body = serde_json::to_string_pretty(&payload).map_err(|e| HookError::Other(e.into()))?;

    let mut req = OutboundRequest {
        method: "POST".to_owned(),
        url: hook.url.clone(),
        headers: BTreeMap::new(),
        body,
    };
    req.headers
        .insert("Content-Type".into(), "application/json".into());

    if with_default_headers {
        sign::add_default_headers(&mut req.headers, hook.secret.as_bytes(), task, req.body.as_bytes());
    }
    Ok(req)
}

/// Decode provider metadata. An empty blob yields the default.
pub fn parse_meta<T: DeserializeOwned + Default>(meta: &str) -> Result<T, HookError> {
    if meta.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(meta).map_err(HookError::InvalidMeta)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub trait HookRequester: Send + Sync {
    fn new_request(&self, hook: &Webhook, task: &HookTask) -> Result<OutboundRequest, HookError>;
}

/// Provider type to request builder. Built once at startup and read-only
/// afterwards.
#[derive(Default)]
pub struct RequesterRegistry {
    requesters: HashMap<String, Box<dyn HookRequester>>,
}

impl RequesterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider. `app_url` must end in `/`.
    pub fn with_defaults(app_url: &str) -> Self {
        let mut registry = Self::new();
        registry.register(hook_type::GENERIC, generic::GenericRequester);
        registry.register(hook_type::SLACK, slack::SlackRequester::new(app_url));
        registry.register(hook_type::DISCORD, discord::DiscordRequester::new(app_url));
        registry.register(hook_type::MSTEAMS, msteams::MsTeamsRequester);
        registry
    }

    pub fn register(&mut self, hook_type: &str, requester: impl HookRequester + 'static) {
        self.requesters
            .insert(hook_type.to_owned(), Box::new(requester));
    }

    pub fn get(&self, hook_type: &str) -> Option<&dyn HookRequester> {
        self.requesters.get(hook_type).map(|r| &**r)
    }

    pub fn is_valid_hook_task_type(&self, hook_type: &str) -> bool {
        self.requesters.contains_key(hook_type)
    }

    pub fn new_request(&self, hook: &Webhook, task: &HookTask) -> Result<OutboundRequest, HookError> {
        let requester = self
            .get(&hook.hook_type)
            .ok_or_else(|| HookError::UnknownHookType(hook.hook_type.clone()))?;
        requester.new_request(hook, task)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::webhook::payload::{PackageAction, Payloader, fixtures};

    pub fn package_task(hook_id: i64) -> HookTask {
        let content = fixtures::package_payload(PackageAction::Created)
            .json_payload()
            .unwrap();
        HookTask::new(hook_id, HookEventType::Package, content)
    }

    pub fn hook(hook_type: &str, url: &str, meta: &str) -> Webhook {
        let mut hook = Webhook::new(hook_type, url);
        hook.id = 1;
        hook.meta = meta.to_owned();
        hook.is_active = true;
        hook
    }
}
