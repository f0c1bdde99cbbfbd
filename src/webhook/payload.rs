use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Canonical event payloads
// ---------------------------------------------------------------------------

/// Serialization contract for canonical payloads. The returned string is what
/// gets stored in `hook_task.payload_content`.
pub trait Payloader {
    fn json_payload(&self) -> serde_json::Result<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: i64,
    pub owner: User,
    pub creator: User,
    #[serde(rename = "type")]
    pub package_type: String,
    pub name: String,
    pub version: String,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageAction {
    Created,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagePayload {
    pub action: PackageAction,
    pub package: Package,
    pub sender: User,
}

impl Payloader for PackagePayload {
    fn json_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ---------------------------------------------------------------------------
// API representation
// ---------------------------------------------------------------------------

/// Public API view of a webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hook {
    pub id: i64,
    #[serde(rename = "type")]
    pub hook_type: String,
    pub url: String,
    pub config: HashMap<String, String>,
    pub events: Vec<String>,
    pub authorization_header: String,
    pub active: bool,
    pub is_system_webhook: bool,
    pub last_status: String,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Options for registering a hook. `config` must carry `url` and
/// `content_type`; Slack hooks also need `channel`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateHookOption {
    #[serde(rename = "type")]
    pub hook_type: String,
    pub config: HashMap<String, String>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub authorization_header: String,
    #[serde(default)]
    pub active: bool,
}

/// Partial update. Absent fields leave the stored value unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditHookOption {
    #[serde(default)]
    pub config: HashMap<String, String>,
    #[serde(default)]
    pub events: Vec<String>,
    pub authorization_header: Option<String>,
    pub active: Option<bool>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::TimeZone;

    use super::*;

    pub fn user1() -> User {
        User {
            id: 1,
            login: "user1".into(),
            full_name: "User One".into(),
            email: "user1@example.com".into(),
            avatar_url: "http://localhost:3000/user1/avatar".into(),
            html_url: "http://localhost:3000/user1".into(),
        }
    }

    pub fn package_payload(action: PackageAction) -> PackagePayload {
        PackagePayload {
            action,
            package: Package {
                id: 1,
                owner: user1(),
                creator: user1(),
                package_type: "container".into(),
                name: "GiteaContainer".into(),
                version: "latest".into(),
                html_url: "http://localhost:3000/user1/-/packages/container/GiteaContainer/latest"
                    .into(),
                created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            },
            sender: user1(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::package_payload;
    use super::*;

    #[test]
    fn json_payload_is_two_space_indented() {
        let json = package_payload(PackageAction::Created).json_payload().unwrap();
        assert!(json.starts_with("{\n  \"action\": \"created\""));
        assert!(json.contains("\n    \"type\": \"container\""));
    }

    #[test]
    fn stored_payload_reconstructs_original() {
        let payload = package_payload(PackageAction::Deleted);
        let stored = payload.json_payload().unwrap();
        let back: PackagePayload = serde_json::from_str(&stored).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn edit_option_distinguishes_absent_fields() {
        let opt: EditHookOption = serde_json::from_str(r#"{"active": false}"#).unwrap();
        assert_eq!(opt.active, Some(false));
        assert!(opt.authorization_header.is_none());
        assert!(opt.config.is_empty());

        let opt: EditHookOption = serde_json::from_str("{}").unwrap();
        assert!(opt.active.is_none());
    }
}
