use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::HookError;

/// Event categories a webhook can subscribe to. Must match the `event_type`
/// column of `hook_task`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEventType {
    Create,
    Delete,
    Package,
}

pub const ALL_EVENT_TYPES: &[HookEventType] = &[
    HookEventType::Create,
    HookEventType::Delete,
    HookEventType::Package,
];

impl HookEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Package => "package",
        }
    }

    /// Name sent in the `X-*-Event` delivery headers.
    pub fn event(self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for HookEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookEventType {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "delete" => Ok(Self::Delete),
            "package" => Ok(Self::Package),
            other => Err(HookError::UnsupportedEvent(other.to_owned())),
        }
    }
}

impl Serialize for HookEventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HookEventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Per-event subscription flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookEvents {
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub package: bool,
}

impl HookEvents {
    /// Build the flag set from API event names. Unknown names are ignored.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let has = |event: HookEventType| {
            names
                .iter()
                .any(|n| n.as_ref().eq_ignore_ascii_case(event.as_str()))
        };
        Self {
            create: has(HookEventType::Create),
            delete: has(HookEventType::Delete),
            package: has(HookEventType::Package),
        }
    }

    pub fn get(&self, event: HookEventType) -> bool {
        match event {
            HookEventType::Create => self.create,
            HookEventType::Delete => self.delete,
            HookEventType::Package => self.package,
        }
    }
}

/// Subscription of a webhook. `send_everything` wins over the event mask;
/// the mask is only consulted when `choose_events` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookEvent {
    #[serde(default)]
    pub send_everything: bool,
    #[serde(default)]
    pub choose_events: bool,
    #[serde(default)]
    pub events: HookEvents,
}

impl HookEvent {
    pub fn has(&self, event: HookEventType) -> bool {
        self.send_everything || (self.choose_events && self.events.get(event))
    }
}

/// Provider identifiers. Each one must have a requester registered in
/// [`crate::webhook::convert::RequesterRegistry`].
pub mod hook_type {
    pub const GENERIC: &str = "generic";
    pub const SLACK: &str = "slack";
    pub const DISCORD: &str = "discord";
    pub const MSTEAMS: &str = "msteams";
}

/// Outcome of the most recent delivery to a webhook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookStatus {
    #[default]
    None,
    Succeed,
    Fail,
}

impl HookStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Succeed => "succeed",
            Self::Fail => "fail",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "succeed" => Self::Succeed,
            "fail" => Self::Fail,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookContentType {
    #[default]
    Json,
    Form,
}

impl HookContentType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Form => "form",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "json" => Some(Self::Json),
            "form" => Some(Self::Form),
            _ => None,
        }
    }
}

pub fn is_valid_hook_content_type(name: &str) -> bool {
    HookContentType::parse(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_event_types() {
        for event in ALL_EVENT_TYPES {
            let parsed: HookEventType = event.as_str().parse().unwrap();
            assert_eq!(*event, parsed);
        }
    }

    #[test]
    fn unknown_event_type_rejected() {
        let err = "push".parse::<HookEventType>().unwrap_err();
        assert!(matches!(err, HookError::UnsupportedEvent(ref e) if e == "push"));
    }

    #[test]
    fn send_everything_ignores_mask() {
        let ev = HookEvent {
            send_everything: true,
            choose_events: false,
            events: HookEvents::default(),
        };
        assert!(ev.has(HookEventType::Package));
        assert!(ev.has(HookEventType::Create));
    }

    #[test]
    fn choose_events_consults_mask() {
        let mut ev = HookEvent {
            send_everything: false,
            choose_events: true,
            events: HookEvents::default(),
        };
        assert!(!ev.has(HookEventType::Package));
        ev.events.package = true;
        assert!(ev.has(HookEventType::Package));
        assert!(!ev.has(HookEventType::Delete));
    }

    #[test]
    fn neither_flag_subscribes_to_nothing() {
        let ev = HookEvent {
            send_everything: false,
            choose_events: false,
            events: HookEvents {
                create: true,
                delete: true,
                package: true,
            },
        };
        for event in ALL_EVENT_TYPES {
            assert!(!ev.has(*event));
        }
    }

    #[test]
    fn events_from_names_case_insensitive() {
        let events = HookEvents::from_names(&["Package", "delete", "push"]);
        assert!(events.package);
        assert!(events.delete);
        assert!(!events.create);
    }

    #[test]
    fn content_type_names() {
        assert!(is_valid_hook_content_type("json"));
        assert!(is_valid_hook_content_type("form"));
        assert!(!is_valid_hook_content_type("xml"));
        assert_eq!(HookContentType::Form.name(), "form");
    }

    #[test]
    fn hook_event_serde_shape() {
        let ev = HookEvent {
            send_everything: false,
            choose_events: true,
            events: HookEvents {
                create: false,
                delete: false,
                package: true,
            },
        };
        let json = serde_json::to_value(ev).unwrap();
        assert_eq!(json["choose_events"], true);
        assert_eq!(json["events"]["package"], true);
        let back: HookEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }
}
