use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::model::HookTask;

/// Hex HMAC-SHA256 of `body` keyed by `secret`. An empty secret yields an
/// empty string so receivers always see the header.
pub fn signature(secret: &[u8], body: &[u8]) -> String {
    if secret.is_empty() {
        return String::new();
    }
    match Hmac::<Sha256>::new_from_slice(secret) {
        Ok(mut mac) => {
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}

/// Attach delivery identity and signature headers. `body` must be the exact
/// bytes that will be sent (or, for the generic provider, the stored payload).
pub fn add_default_headers(
    headers: &mut BTreeMap<String, String>,
    secret: &[u8],
    task: &HookTask,
    body: &[u8],
) {
    let sig = signature(secret, body);
    let event = task.event_type.event();
    let event_type = task.event_type.as_str();

    for (name, value) in [
        ("X-Forge-Delivery", task.uuid.as_str()),
        ("X-Forge-Event", event),
        ("X-Forge-Event-Type", event_type),
        ("X-Forge-Signature", sig.as_str()),
        ("X-GitHub-Delivery", task.uuid.as_str()),
        ("X-GitHub-Event", event),
        ("X-GitHub-Event-Type", event_type),
    ] {
        headers.insert(name.to_owned(), value.to_owned());
    }
    headers.insert("X-Hub-Signature-256".into(), format!("sha256={sig}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::event::HookEventType;

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2
        assert_eq!(
            signature(b"Jefe", b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn empty_secret_keeps_header_shape() {
        let task = HookTask::new(1, HookEventType::Package, "{}".into());
        let mut headers = BTreeMap::new();
        add_default_headers(&mut headers, b"", &task, b"{}");

        assert_eq!(headers["X-Hub-Signature-256"], "sha256=");
        assert_eq!(headers["X-Forge-Signature"], "");
        assert_eq!(headers["X-Forge-Delivery"], task.uuid);
        assert_eq!(headers["X-GitHub-Delivery"], task.uuid);
        assert_eq!(headers["X-Forge-Event"], "package");
        assert_eq!(headers["X-GitHub-Event-Type"], "package");
    }

    #[test]
    fn signed_header_matches_bare_signature() {
        let task = HookTask::new(1, HookEventType::Package, "{}".into());
        let mut headers = BTreeMap::new();
        add_default_headers(&mut headers, b"s3cret", &task, b"body");

        let sig = signature(b"s3cret", b"body");
        assert_eq!(sig.len(), 64);
        assert_eq!(headers["X-Forge-Signature"], sig);
        assert_eq!(headers["X-Hub-Signature-256"], format!("sha256={sig}"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn deterministic(secret in proptest::collection::vec(any::<u8>(), 1..64),
                             body in proptest::collection::vec(any::<u8>(), 0..512)) {
                prop_assert_eq!(signature(&secret, &body), signature(&secret, &body));
            }

            #[test]
            fn one_byte_changes_signature(secret in proptest::collection::vec(any::<u8>(), 1..64),
                                          body in proptest::collection::vec(any::<u8>(), 1..512),
                                          idx in any::<prop::sample::Index>(),
                                          flip in 1u8..=255) {
                let mut changed = body.clone();
                let i = idx.index(changed.len());
                changed[i] ^= flip;
                prop_assert_ne!(signature(&secret, &body), signature(&secret, &changed));
            }
        }
    }
}
