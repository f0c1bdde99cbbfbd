//! Plain webhook: the stored payload is sent as-is.

use std::collections::BTreeMap;

use url::Url;

use crate::webhook::error::HookError;
use crate::webhook::event::HookContentType;
use crate::webhook::model::{HookTask, Webhook};
use crate::webhook::sign;

use super::{HookRequester, OutboundRequest};

pub struct GenericRequester;

impl HookRequester for GenericRequester {
    fn new_request(&self, hook: &Webhook, task: &HookTask) -> Result<OutboundRequest, HookError> {
        let method = if hook.http_method.is_empty() {
            "POST".to_owned()
        } else {
            hook.http_method.to_uppercase()
        };

        let mut headers = BTreeMap::new();
        let (url, body) = match method.as_str() {
            "POST" => match hook.content_type {
                HookContentType::Json => {
                    headers.insert("Content-Type".to_owned(), "application/json".to_owned());
                    (hook.url.clone(), task.payload_content.clone())
                }
                HookContentType::Form => {
                    headers.insert(
                        "Content-Type".to_owned(),
                        "application/x-www-form-urlencoded".to_owned(),
                    );
                    let body = url::form_urlencoded::Serializer::new(String::new())
                        .append_pair("payload", &task.payload_content)
                        .finish();
                    (hook.url.clone(), body)
                }
            },
            "GET" => {
                let mut url = Url::parse(&hook.url)
                    .map_err(|e| HookError::Validation(format!("invalid webhook url: {e}")))?;
                url.query_pairs_mut()
                    .append_pair("payload", &task.payload_content);
                (url.to_string(), String::new())
            }
            "PUT" => {
                headers.insert("Content-Type".to_owned(), "application/json".to_owned());
                (hook.url.clone(), task.payload_content.clone())
            }
            other => return Err(HookError::InvalidHttpMethod(other.to_owned())),
        };

        sign::add_default_headers(
            &mut headers,
            hook.secret.as_bytes(),
            task,
            task.payload_content.as_bytes(),
        );

        Ok(OutboundRequest {
            method,
            url,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::convert::test_support::{hook, package_task};

    #[test]
    fn post_json_sends_stored_payload() {
        let h = hook("generic", "https://example.com/hook", "");
        let task = package_task(h.id);
        let req = GenericRequester.new_request(&h, &task).unwrap();

        assert_eq!(req.method, "POST");
        assert_eq!(req.url, "https://example.com/hook");
        assert_eq!(req.body, task.payload_content);
        assert!(req.body.starts_with("{\n  \"action\": \"created\""));
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("X-Hub-Signature-256"), Some("sha256="));
    }

    #[test]
    fn post_form_wraps_payload() {
        let mut h = hook("generic", "https://example.com/hook", "");
        h.content_type = HookContentType::Form;
        h.secret = "secret".into();
        let task = package_task(h.id);
        let req = GenericRequester.new_request(&h, &task).unwrap();

        assert_eq!(
            req.header("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
        assert!(req.body.starts_with("payload=%7B"));
        let decoded: Vec<(String, String)> = url::form_urlencoded::parse(req.body.as_bytes())
            .into_owned()
            .collect();
        assert_eq!(decoded, vec![("payload".to_owned(), task.payload_content.clone())]);

        let expected = sign::signature(b"secret", task.payload_content.as_bytes());
        assert_eq!(
            req.header("X-Hub-Signature-256"),
            Some(format!("sha256={expected}").as_str())
        );
    }

    #[test]
    fn get_moves_payload_into_query() {
        let mut h = hook("generic", "https://example.com/hook?x=1", "");
        h.http_method = "get".into();
        let task = package_task(h.id);
        let req = GenericRequester.new_request(&h, &task).unwrap();

        assert_eq!(req.method, "GET");
        assert!(req.body.is_empty());
        let url = Url::parse(&req.url).unwrap();
        let pairs: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["x"], "1");
        assert_eq!(pairs["payload"], task.payload_content);
    }

    #[test]
    fn put_sends_json() {
        let mut h = hook("generic", "https://example.com/hook", "");
        h.http_method = "PUT".into();
        h.content_type = HookContentType::Form;
        let req = GenericRequester.new_request(&h, &package_task(h.id)).unwrap();
        assert_eq!(req.method, "PUT");
        assert_eq!(req.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn other_methods_rejected() {
        let mut h = hook("generic", "https://example.com/hook", "");
        h.http_method = "DELETE".into();
        let err = GenericRequester
            .new_request(&h, &package_task(h.id))
            .unwrap_err();
        assert!(matches!(err, HookError::InvalidHttpMethod(ref m) if m == "DELETE"));
    }
}
