use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::event::HookEventType;
use super::payload::{Package, PackageAction, PackagePayload, User};
use super::service::{EventSource, WebhookService};

/// Package as reported by the package registry.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageDescriptor {
    pub id: i64,
    pub owner: User,
    pub creator: User,
    #[serde(rename = "type")]
    pub package_type: String,
    pub name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
}

impl PackageDescriptor {
    /// `{app_url}{owner}/-/packages/{type}/{name}/{version}`, segments escaped.
    pub fn html_url(&self, app_url: &str) -> String {
        let segments = [
            self.owner.login.as_str(),
            "-",
            "packages",
            self.package_type.as_str(),
            self.name.as_str(),
            self.version.as_str(),
        ];
        if let Ok(mut url) = url::Url::parse(app_url)
            && url
                .path_segments_mut()
                .map(|mut path| {
                    path.pop_if_empty().extend(segments);
                })
                .is_ok()
        {
            return url.to_string();
        }
        format!("{app_url}{}", segments.join("/"))
    }
}

/// Receiver of domain events. Every hook defaults to doing nothing.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn package_create(&self, _doer: &User, _pd: &PackageDescriptor) {}

    async fn package_delete(&self, _doer: &User, _pd: &PackageDescriptor) {}
}

/// Notifiers registered at startup. Read-only once traffic starts.
#[derive(Default, Clone)]
pub struct NotifierRegistry {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub async fn package_create(&self, doer: &User, pd: &PackageDescriptor) {
        for n in &self.notifiers {
            n.package_create(doer, pd).await;
        }
    }

    pub async fn package_delete(&self, doer: &User, pd: &PackageDescriptor) {
        for n in &self.notifiers {
            n.package_delete(doer, pd).await;
        }
    }
}

/// Turns package events into webhook deliveries.
pub struct WebhookNotifier {
    service: Arc<WebhookService>,
    app_url: String,
}

impl WebhookNotifier {
    pub fn new(service: Arc<WebhookService>, app_url: &str) -> Self {
        Self {
            service,
            app_url: app_url.to_owned(),
        }
    }

    fn package_payload(&self, sender: &User, pd: &PackageDescriptor, action: PackageAction) -> PackagePayload {
        PackagePayload {
            action,
            package: Package {
                id: pd.id,
                owner: pd.owner.clone(),
                creator: pd.creator.clone(),
                package_type: pd.package_type.clone(),
                name: pd.name.clone(),
                version: pd.version.clone(),
                html_url: pd.html_url(&self.app_url),
                created_at: pd.created_at,
            },
            sender: sender.clone(),
        }
    }

    async fn notify_package(&self, sender: &User, pd: &PackageDescriptor, action: PackageAction) {
        let source = EventSource::for_owner(pd.owner.clone());
        let payload = self.package_payload(sender, pd, action);
        if let Err(e) = self
            .service
            .prepare_webhooks(&source, HookEventType::Package, &payload)
            .await
        {
            tracing::error!(error = %e, package = %pd.name, "failed to prepare package webhooks");
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn package_create(&self, doer: &User, pd: &PackageDescriptor) {
        self.notify_package(doer, pd, PackageAction::Created).await;
    }

    async fn package_delete(&self, doer: &User, pd: &PackageDescriptor) {
        self.notify_package(doer, pd, PackageAction::Deleted).await;
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::TimeZone;

    use super::*;
    use crate::webhook::payload::fixtures::user1;

    pub fn container_descriptor() -> PackageDescriptor {
        PackageDescriptor {
            id: 1,
            owner: user1(),
            creator: user1(),
            package_type: "container".into(),
            name: "GiteaContainer".into(),
            version: "latest".into(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        }
    }
}
