use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::webhook::error::HookError;
use crate::webhook::model::{HookTask, Webhook};
use crate::webhook::payload::PackagePayload;

use super::general::package_payload_info;
use super::{HookRequester, OutboundRequest, PayloadConvertor, new_json_request, parse_meta};

/// Slack settings stored in `Webhook::meta`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackMeta {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub icon_url: String,
    #[serde(default)]
    pub color: String,
}

/// Slack metadata for display purposes. Corrupt metadata is logged and the
/// default returned.
pub fn get_slack_hook(hook: &Webhook) -> SlackMeta {
    parse_meta(&hook.meta).unwrap_or_else(|e| {
        tracing::error!(hook_id = hook.id, error = %e, "invalid slack webhook meta");
        SlackMeta::default()
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackPayload {
    pub channel: String,
    pub text: String,
    pub username: String,
    pub icon_url: String,
    pub unfurl_links: i32,
    pub link_names: i32,
    pub attachments: Option<Vec<SlackAttachment>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackAttachment {
    pub fallback: String,
    pub color: String,
    pub title: String,
    pub title_link: String,
    pub text: String,
}

/// Escape the three characters Slack treats as control sequences.
pub fn slack_text_formatter(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// First line only, escaped.
pub fn slack_short_text_formatter(s: &str) -> String {
    slack_text_formatter(s.split('\n').next().unwrap_or_default())
}

pub fn slack_link_formatter(url: &str, text: &str) -> String {
    format!("<{url}|{}>", slack_text_formatter(text))
}

static SLACK_CHANNEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#?[a-z0-9_-]{1,80}$").expect("valid slack channel pattern"));

pub fn is_valid_slack_channel(name: &str) -> bool {
    SLACK_CHANNEL.is_match(name)
}

pub struct SlackConvertor {
    pub meta: SlackMeta,
    pub app_url: String,
}

impl SlackConvertor {
    fn create_payload(&self, text: String, attachments: Option<Vec<SlackAttachment>>) -> SlackPayload {
        SlackPayload {
            channel: self.meta.channel.clone(),
            text,
            username: self.meta.username.clone(),
            icon_url: self.meta.icon_url.clone(),
            unfurl_links: 0,
            link_names: 0,
            attachments,
        }
    }
}

impl PayloadConvertor for SlackConvertor {
    type Output = SlackPayload;

    fn package(&self, p: &PackagePayload) -> Result<SlackPayload, HookError> {
        let (text, _) = package_payload_info(p, slack_link_formatter, &self.app_url, true);
        Ok(self.create_payload(text, None))
    }
}

pub struct SlackRequester {
    app_url: String,
}

impl SlackRequester {
    pub fn new(app_url: &str) -> Self {
        Self {
            app_url: app_url.to_owned(),
        }
    }
}

impl HookRequester for SlackRequester {
    fn new_request(&self, hook: &Webhook, task: &HookTask) -> Result<OutboundRequest, HookError> {
        let convertor = SlackConvertor {
            meta: parse_meta(&hook.meta)?,
            app_url: self.app_url.clone(),
        };
        new_json_request(&convertor, hook, task, true)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::webhook::convert::test_support::{hook, package_task};
    use crate::webhook::payload::PackageAction;
    use crate::webhook::payload::fixtures::package_payload;

    const APP_URL: &str = "https://try.forge.example/";

    #[test]
    fn package_created_text() {
        let c = SlackConvertor {
            meta: SlackMeta::default(),
            app_url: APP_URL.into(),
        };
        let pl = c.package(&package_payload(PackageAction::Created)).unwrap();
        assert_eq!(
            pl.text,
            "Package created: <http://localhost:3000/user1/-/packages/container/GiteaContainer/latest|GiteaContainer:latest> by <https://try.forge.example/user1|user1>"
        );
    }

    #[test]
    fn json_request_uses_meta_and_signs() {
        let h = hook(
            "slack",
            "https://slack.example.com/",
            r#"{"channel":"gitea","username":"forge-bot","icon_url":"http://x/i.png"}"#,
        );
        let req = SlackRequester::new(APP_URL)
            .new_request(&h, &package_task(h.id))
            .unwrap();

        assert_eq!(req.method, "POST");
        assert_eq!(req.url, "https://slack.example.com/");
        assert_eq!(req.header("X-Hub-Signature-256"), Some("sha256="));
        assert_eq!(req.header("Content-Type"), Some("application/json"));

        let body: SlackPayload = serde_json::from_str(&req.body).unwrap();
        assert_eq!(body.channel, "gitea");
        assert_eq!(body.username, "forge-bot");
        assert!(body.text.starts_with("Package created: <"));
        assert!(body.attachments.is_none());
    }

    #[test]
    fn corrupt_meta_fails_request() {
        let h = hook("slack", "https://slack.example.com/", "{broken");
        let err = SlackRequester::new(APP_URL)
            .new_request(&h, &package_task(h.id))
            .unwrap_err();
        assert!(matches!(err, HookError::InvalidMeta(_)));
    }

    #[test]
    fn get_slack_hook_tolerates_corrupt_meta() {
        let h = hook("slack", "https://slack.example.com/", "{broken");
        assert_eq!(get_slack_hook(&h), SlackMeta::default());

        let h = hook(
            "slack",
            "https://slack.example.com/",
            r#"{"channel": "foo", "username": "username", "color": "blue"}"#,
        );
        assert_eq!(
            get_slack_hook(&h),
            SlackMeta {
                channel: "foo".into(),
                username: "username".into(),
                icon_url: String::new(),
                color: "blue".into(),
            }
        );
    }

    #[rstest]
    #[case("gitea", true)]
    #[case("#gitea", true)]
    #[case("  ", false)]
    #[case("#", false)]
    #[case(" #", false)]
    #[case("gitea   ", false)]
    #[case("  gitea", false)]
    #[case("Gitea", false)]
    fn slack_channel_names(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_valid_slack_channel(name), expected, "channel {name:?}");
    }

    #[test]
    fn channel_length_limit() {
        assert!(is_valid_slack_channel(&"a".repeat(80)));
        assert!(!is_valid_slack_channel(&"a".repeat(81)));
    }

    #[test]
    fn text_formatters_escape() {
        assert_eq!(slack_text_formatter("a & <b>"), "a &amp; &lt;b&gt;");
        assert_eq!(slack_short_text_formatter("first <1>\nsecond"), "first &lt;1&gt;");
        assert_eq!(slack_link_formatter("http://x", "a<b"), "<http://x|a&lt;b>");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn conversion_is_deterministic(channel in "[a-z0-9_-]{1,20}", user in "[a-z]{1,10}") {
                let c = SlackConvertor {
                    meta: SlackMeta { channel, username: user, ..Default::default() },
                    app_url: APP_URL.into(),
                };
                let p = package_payload(PackageAction::Deleted);
                let a = serde_json::to_string_pretty(&c.package(&p).unwrap()).unwrap();
                let b = serde_json::to_string_pretty(&c.package(&p).unwrap()).unwrap();
                prop_assert_eq!(a, b);
            }

            #[test]
            fn escaped_text_has_no_angle_brackets(s in ".*") {
                let out = slack_text_formatter(&s);
                prop_assert!(!out.contains('<') && !out.contains('>'));
            }
        }
    }
}
