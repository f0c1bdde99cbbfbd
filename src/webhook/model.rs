use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::secrets;

use super::error::HookError;
use super::event::{ALL_EVENT_TYPES, HookContentType, HookEvent, HookEventType, HookStatus};

/// Current schema version of `hook_task.payload_content`.
pub const PAYLOAD_VERSION: i32 = 2;

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

/// A configured delivery target. `repo_id` and `owner_id` are zero for
/// system webhooks, which additionally carry `is_system_webhook`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Webhook {
    pub id: i64,
    pub repo_id: i64,
    pub owner_id: i64,
    pub is_system_webhook: bool,
    pub url: String,
    pub http_method: String,
    pub content_type: HookContentType,
    pub secret: String,
    pub events: HookEvent,
    pub is_active: bool,
    pub hook_type: String,
    /// Provider-specific JSON, interpreted by the matching converter.
    pub meta: String,
    pub last_status: HookStatus,
    pub header_authorization_encrypted: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    pub fn new(hook_type: &str, url: &str) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            repo_id: 0,
            owner_id: 0,
            is_system_webhook: false,
            url: url.to_owned(),
            http_method: "POST".into(),
            content_type: HookContentType::Json,
            secret: String::new(),
            events: HookEvent::default(),
            is_active: false,
            hook_type: hook_type.to_owned(),
            meta: String::new(),
            last_status: HookStatus::None,
            header_authorization_encrypted: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_event(&self, event: HookEventType) -> bool {
        self.events.has(event)
    }

    /// Names of the event types this hook fires on.
    pub fn event_names(&self) -> Vec<String> {
        ALL_EVENT_TYPES
            .iter()
            .filter(|e| self.has_event(**e))
            .map(|e| e.as_str().to_owned())
            .collect()
    }

    pub fn header_authorization(&self, master_key: &[u8; 32]) -> Result<String, HookError> {
        secrets::decrypt_from_string(&self.header_authorization_encrypted, master_key)
            .map_err(|e| HookError::Crypto(e.to_string()))
    }

    pub fn set_header_authorization(
        &mut self,
        value: &str,
        master_key: &[u8; 32],
    ) -> Result<(), HookError> {
        self.header_authorization_encrypted = secrets::encrypt_to_string(value, master_key)
            .map_err(|e| HookError::Crypto(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HookTask
// ---------------------------------------------------------------------------

/// Request as sent, recorded for delivery history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookRequest {
    pub url: String,
    pub http_method: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// One delivery attempt of one event to one webhook. `payload_content` never
/// changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookTask {
    pub id: i64,
    pub hook_id: i64,
    pub uuid: String,
    #[serde(skip)]
    pub payload_content: String,
    pub event_type: HookEventType,
    pub payload_version: i32,
    pub is_delivered: bool,
    #[serde(skip)]
    pub replay_requested: bool,
    pub is_succeed: bool,
    /// Unix nanoseconds; zero until an attempt is recorded.
    pub delivered: i64,
    pub request_info: Option<HookRequest>,
    pub response_info: Option<HookResponse>,
}

impl HookTask {
    pub fn new(hook_id: i64, event_type: HookEventType, payload_content: String) -> Self {
        Self {
            id: 0,
            hook_id,
            uuid: Uuid::new_v4().to_string(),
            payload_content,
            event_type,
            payload_version: PAYLOAD_VERSION,
            is_delivered: false,
            replay_requested: false,
            is_succeed: false,
            delivered: 0,
            request_info: None,
            response_info: None,
        }
    }

    /// Pending means never attempted, or a replay is waiting.
    pub fn is_pending(&self) -> bool {
        !self.is_delivered || self.replay_requested
    }
}

pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}
