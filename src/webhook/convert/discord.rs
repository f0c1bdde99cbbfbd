use serde::{Deserialize, Serialize};

use crate::webhook::error::HookError;
use crate::webhook::model::{HookTask, Webhook};
use crate::webhook::payload::{PackagePayload, User};

use super::general::{none_link_formatter, package_payload_info, user_link};
use super::{HookRequester, OutboundRequest, PayloadConvertor, new_json_request, parse_meta};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordMeta {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub icon_url: String,
}

pub fn get_discord_hook(hook: &Webhook) -> DiscordMeta {
    parse_meta(&hook.meta).unwrap_or_else(|e| {
        tracing::error!(hook_id = hook.id, error = %e, "invalid discord webhook meta");
        DiscordMeta::default()
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordEmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordEmbedAuthor {
    pub name: String,
    pub url: String,
    pub icon_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordEmbedField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub description: String,
    pub url: String,
    pub color: u32,
    pub footer: DiscordEmbedFooter,
    pub author: DiscordEmbedAuthor,
    pub fields: Option<Vec<DiscordEmbedField>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordPayload {
    pub wait: bool,
    pub content: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub avatar_url: String,
    pub tts: bool,
    pub embeds: Vec<DiscordEmbed>,
}

pub struct DiscordConvertor {
    pub username: String,
    pub avatar_url: String,
    pub app_url: String,
}

impl DiscordConvertor {
    fn create_payload(&self, sender: &User, title: String, text: String, url: &str, color: u32) -> DiscordPayload {
        DiscordPayload {
            wait: false,
            content: String::new(),
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
            tts: false,
            embeds: vec![DiscordEmbed {
                title,
                description: text,
                url: url.to_owned(),
                color,
                footer: DiscordEmbedFooter::default(),
                author: DiscordEmbedAuthor {
                    name: sender.login.clone(),
                    url: user_link(&self.app_url, &sender.login),
                    icon_url: sender.avatar_url.clone(),
                },
                fields: None,
            }],
        }
    }
}

impl PayloadConvertor for DiscordConvertor {
    type Output = DiscordPayload;

    fn package(&self, p: &PackagePayload) -> Result<DiscordPayload, HookError> {
        let (title, color) = package_payload_info(p, none_link_formatter, &self.app_url, false);
        Ok(self.create_payload(&p.sender, title, String::new(), &p.package.html_url, color))
    }
}

pub struct DiscordRequester {
    app_url: String,
}

impl DiscordRequester {
    pub fn new(app_url: &str) -> Self {
        Self {
            app_url: app_url.to_owned(),
        }
    }
}

impl HookRequester for DiscordRequester {
    fn new_request(&self, hook: &Webhook, task: &HookTask) -> Result<OutboundRequest, HookError> {
        let meta: DiscordMeta = parse_meta(&hook.meta)?;
        let convertor = DiscordConvertor {
            username: meta.username,
            avatar_url: meta.icon_url,
            app_url: self.app_url.clone(),
        };
        new_json_request(&convertor, hook, task, true)
    }
}
