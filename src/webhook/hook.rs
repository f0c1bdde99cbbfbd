//! Registration rules and the public API projection of webhooks.

use std::collections::HashMap;
use std::sync::Arc;

use crate::validation;

use super::convert::RequesterRegistry;
use super::convert::discord::{DiscordMeta, get_discord_hook};
use super::convert::slack::{SlackMeta, get_slack_hook, is_valid_slack_channel};
use super::error::HookError;
use super::event::{HookContentType, HookEvent, HookEvents, hook_type};
use super::model::Webhook;
use super::payload::{CreateHookOption, EditHookOption, Hook};
use super::store::WebhookStore;

/// Project a webhook to its API form. `link` is the settings page of the
/// scope the hook belongs to. Fails if the stored authorization header
/// cannot be decrypted.
pub fn to_hook(link: &str, hook: &Webhook, master_key: &[u8; 32]) -> Result<Hook, HookError> {
    let mut config = HashMap::from([
        ("url".to_owned(), hook.url.clone()),
        ("content_type".to_owned(), hook.content_type.name().to_owned()),
        ("http_method".to_owned(), hook.http_method.clone()),
    ]);
    match hook.hook_type.as_str() {
        hook_type::SLACK => {
            let s = get_slack_hook(hook);
            config.insert("channel".into(), s.channel);
            config.insert("username".into(), s.username);
            config.insert("icon_url".into(), s.icon_url);
            config.insert("color".into(), s.color);
        }
        hook_type::DISCORD => {
            let d = get_discord_hook(hook);
            config.insert("username".into(), d.username);
            config.insert("icon_url".into(), d.icon_url);
        }
        _ => {}
    }

    let authorization_header = hook.header_authorization(master_key)?;

    Ok(Hook {
        id: hook.id,
        hook_type: hook.hook_type.clone(),
        url: format!("{}/settings/hooks/{}", link.trim_end_matches('/'), hook.id),
        config,
        events: hook.event_names(),
        authorization_header,
        active: hook.is_active,
        is_system_webhook: hook.is_system_webhook,
        last_status: hook.last_status.as_str().to_owned(),
        updated_at: hook.updated_at,
        created_at: hook.created_at,
    })
}

/// Reject a create request before anything is stored.
pub fn check_create_hook_option(
    registry: &RequesterRegistry,
    form: &CreateHookOption,
) -> Result<(), HookError> {
    if !registry.is_valid_hook_task_type(&form.hook_type) {
        return Err(HookError::UnknownHookType(form.hook_type.clone()));
    }
    for name in ["url", "content_type"] {
        if !form.config.contains_key(name) {
            return Err(HookError::Validation(format!("missing config option: {name}")));
        }
    }
    content_type(&form.config["content_type"])?;
    Ok(())
}

fn content_type(name: &str) -> Result<HookContentType, HookError> {
    HookContentType::parse(name).ok_or_else(|| HookError::Validation("invalid content type".into()))
}

/// Configured HTTP method. Only generic hooks may use anything but POST;
/// chat providers always receive a JSON POST.
fn http_method(kind: &str, config: &HashMap<String, String>) -> Result<Option<String>, HookError> {
    let Some(method) = config.get("http_method") else {
        return Ok(None);
    };
    let method = method.trim().to_uppercase();
    match method.as_str() {
        "" => Ok(None),
        "POST" => Ok(Some(method)),
        "GET" | "PUT" if kind == hook_type::GENERIC => Ok(Some(method)),
        _ => Err(HookError::InvalidHttpMethod(method)),
    }
}

/// Overlay the Slack keys present in `config` on `base`. The channel is
/// validated only when supplied.
fn slack_meta(mut base: SlackMeta, config: &HashMap<String, String>) -> Result<String, HookError> {
    if let Some(channel) = config.get("channel") {
        let channel = channel.trim();
        if !is_valid_slack_channel(channel) {
            return Err(HookError::Validation("invalid slack channel name".into()));
        }
        channel.clone_into(&mut base.channel);
    }
    for (key, field) in [
        ("username", &mut base.username),
        ("icon_url", &mut base.icon_url),
        ("color", &mut base.color),
    ] {
        if let Some(value) = config.get(key) {
            field.clone_from(value);
        }
    }
    serde_json::to_string(&base).map_err(|e| HookError::Other(e.into()))
}

/// Overlay the Discord keys present in `config` on `base`.
fn discord_meta(mut base: DiscordMeta, config: &HashMap<String, String>) -> Result<String, HookError> {
    for (key, field) in [("username", &mut base.username), ("icon_url", &mut base.icon_url)] {
        if let Some(value) = config.get(key) {
            field.clone_from(value);
        }
    }
    serde_json::to_string(&base).map_err(|e| HookError::Other(e.into()))
}

/// Subscription built from an API event list. Names that are not known
/// event types are ignored, so `["push"]` subscribes to nothing.
fn chosen_events(events: &[String]) -> HookEvent {
    HookEvent {
        send_everything: false,
        choose_events: true,
        events: HookEvents::from_names(events),
    }
}

/// Applies registration rules and persists webhooks.
pub struct HookManager {
    store: Arc<dyn WebhookStore>,
    registry: Arc<RequesterRegistry>,
    master_key: [u8; 32],
    allow_private_hosts: bool,
}

impl HookManager {
    pub fn new(
        store: Arc<dyn WebhookStore>,
        registry: Arc<RequesterRegistry>,
        master_key: [u8; 32],
        allow_private_hosts: bool,
    ) -> Self {
        Self {
            store,
            registry,
            master_key,
            allow_private_hosts,
        }
    }

    pub fn to_hook(&self, link: &str, hook: &Webhook) -> Result<Hook, HookError> {
        to_hook(link, hook, &self.master_key)
    }

    /// Validate `form` and create a webhook scoped to `owner_id`/`repo_id`.
    /// Both zero creates a system webhook.
    #[tracing::instrument(skip(self, form), fields(hook_type = %form.hook_type), err)]
    pub async fn add_hook(
        &self,
        form: CreateHookOption,
        owner_id: i64,
        repo_id: i64,
    ) -> Result<Webhook, HookError> {
        check_create_hook_option(&self.registry, &form)?;

        let url = form.config["url"].clone();
        validation::check_target_url(&url, self.allow_private_hosts)?;

        let is_system_webhook = match form.config.get("is_system_webhook").map(String::as_str) {
            None | Some("") => false,
            Some(v) => v
                .parse::<bool>()
                .map_err(|_| HookError::Validation("invalid is_system_webhook value".into()))?,
        };

        let unscoped = owner_id == 0 && repo_id == 0;
        if is_system_webhook && !unscoped {
            return Err(HookError::Validation(
                "system webhooks cannot belong to an owner or repository".into(),
            ));
        }

        let mut hook = Webhook::new(&form.hook_type, &url);
        hook.owner_id = owner_id;
        hook.repo_id = repo_id;
        hook.is_system_webhook = unscoped;
        hook.content_type = content_type(&form.config["content_type"])?;
        hook.secret = form.config.get("secret").cloned().unwrap_or_default();
        if let Some(method) = http_method(&form.hook_type, &form.config)? {
            hook.http_method = method;
        }
        hook.events = chosen_events(&form.events);
        hook.is_active = form.active;
        hook.set_header_authorization(&form.authorization_header, &self.master_key)?;

        match form.hook_type.as_str() {
            hook_type::SLACK => {
                if !form.config.contains_key("channel") {
                    return Err(HookError::Validation("missing config option: channel".into()));
                }
                hook.meta = slack_meta(SlackMeta::default(), &form.config)?;
            }
            hook_type::DISCORD => hook.meta = discord_meta(DiscordMeta::default(), &form.config)?,
            _ => {}
        }

        let hook = self.store.create(hook).await?;
        tracing::info!(hook_id = hook.id, owner_id, repo_id, "webhook created");
        Ok(hook)
    }

    /// Apply the supplied fields of `form` to `hook` and persist it. The event
    /// subscription is always recomputed from `form.events`.
    #[tracing::instrument(skip(self, form, hook), fields(hook_id = hook.id), err)]
    pub async fn edit_hook(&self, form: EditHookOption, hook: &mut Webhook) -> Result<(), HookError> {
        if let Some(url) = form.config.get("url") {
            validation::check_target_url(url, self.allow_private_hosts)?;
            hook.url.clone_from(url);
        }
        if let Some(ct) = form.config.get("content_type") {
            hook.content_type = content_type(ct)?;
        }
        if let Some(method) = http_method(&hook.hook_type, &form.config)? {
            hook.http_method = method;
        }
        if let Some(secret) = form.config.get("secret") {
            hook.secret.clone_from(secret);
        }
        match hook.hook_type.as_str() {
            hook_type::SLACK => hook.meta = slack_meta(get_slack_hook(hook), &form.config)?,
            hook_type::DISCORD => hook.meta = discord_meta(get_discord_hook(hook), &form.config)?,
            _ => {}
        }

        hook.events = chosen_events(&form.events);

        if let Some(value) = &form.authorization_header {
            hook.set_header_authorization(value, &self.master_key)?;
        }
        if let Some(active) = form.active {
            hook.is_active = active;
        }

        hook.updated_at = chrono::Utc::now();
        self.store.update(hook).await
    }
}
