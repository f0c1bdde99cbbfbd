use serde::{Deserialize, Serialize};

use crate::webhook::error::HookError;
use crate::webhook::model::{HookTask, Webhook};
use crate::webhook::payload::{PackagePayload, User};

use super::general::{none_link_formatter, package_payload_info};
use super::{HookRequester, OutboundRequest, PayloadConvertor, new_json_request};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsTeamsFact {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsTeamsSection {
    pub activity_title: String,
    pub activity_subtitle: String,
    pub activity_image: String,
    pub facts: Vec<MsTeamsFact>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsTeamsActionTarget {
    pub os: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsTeamsAction {
    #[serde(rename = "@type")]
    pub action_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<MsTeamsActionTarget>,
}

/// Legacy Office 365 connector card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsTeamsPayload {
    #[serde(rename = "@type")]
    pub card_type: String,
    #[serde(rename = "@context")]
    pub context: String,
    pub theme_color: String,
    pub title: String,
    pub summary: String,
    pub sections: Vec<MsTeamsSection>,
    pub potential_action: Vec<MsTeamsAction>,
}

fn create_payload(
    sender: &User,
    title: String,
    text: String,
    action_target: &str,
    color: u32,
    fact: Option<MsTeamsFact>,
) -> MsTeamsPayload {
    MsTeamsPayload {
        card_type: "MessageCard".into(),
        context: "https://schema.org/extensions".into(),
        theme_color: format!("{color:x}"),
        summary: title.clone(),
        title,
        sections: vec![MsTeamsSection {
            activity_title: sender.full_name.clone(),
            activity_subtitle: sender.login.clone(),
            activity_image: sender.avatar_url.clone(),
            facts: fact.into_iter().collect(),
            text,
        }],
        potential_action: vec![MsTeamsAction {
            action_type: "OpenUri".into(),
            name: "View in Forge".into(),
            targets: vec![MsTeamsActionTarget {
                os: "default".into(),
                uri: action_target.to_owned(),
            }],
        }],
    }
}

pub struct MsTeamsConvertor;

impl PayloadConvertor for MsTeamsConvertor {
    type Output = MsTeamsPayload;

    fn package(&self, p: &PackagePayload) -> Result<MsTeamsPayload, HookError> {
        let (title, color) = package_payload_info(p, none_link_formatter, "", false);
        Ok(create_payload(
            &p.sender,
            title,
            String::new(),
            &p.package.html_url,
            color,
            Some(MsTeamsFact {
                name: "Package:".into(),
                value: p.package.name.clone(),
            }),
        ))
    }
}

pub struct MsTeamsRequester;

impl HookRequester for MsTeamsRequester {
    fn new_request(&self, hook: &Webhook, task: &HookTask) -> Result<OutboundRequest, HookError> {
        new_json_request(&MsTeamsConvertor, hook, task, true)
    }
}
