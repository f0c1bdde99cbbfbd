//! Shared formatting for chat-style providers.

use url::Url;

use crate::webhook::payload::{PackageAction, PackagePayload};

pub type LinkFormatter = fn(&str, &str) -> String;

pub const GREEN_COLOR: u32 = 0x1a_c6_00;
pub const RED_COLOR: u32 = 0xff_32_32;

pub fn none_link_formatter(_url: &str, text: &str) -> String {
    text.to_owned()
}

pub fn html_link_formatter(url: &str, text: &str) -> String {
    format!(r#"<a href="{}">{}</a>"#, html_escape(url), html_escape(text))
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Profile URL of `login` under `app_url`, with the name path-escaped.
pub fn user_link(app_url: &str, login: &str) -> String {
    if let Ok(mut url) = Url::parse(app_url)
        && url
            .path_segments_mut()
            .map(|mut segments| {
                segments.pop_if_empty().push(login);
            })
            .is_ok()
    {
        return url.to_string();
    }
    format!("{app_url}{login}")
}

/// One-line summary of a package event and its color. With `with_sender`
/// the acting user is appended as a link.
pub fn package_payload_info(
    p: &PackagePayload,
    link_formatter: LinkFormatter,
    app_url: &str,
    with_sender: bool,
) -> (String, u32) {
    let ref_link = link_formatter(
        &p.package.html_url,
        &format!("{}:{}", p.package.name, p.package.version),
    );

    let (mut text, color) = match p.action {
        PackageAction::Created => (format!("Package created: {ref_link}"), GREEN_COLOR),
        PackageAction::Deleted => (format!("Package deleted: {ref_link}"), RED_COLOR),
    };

    if with_sender {
        let sender = &p.sender.login;
        text.push_str(" by ");
        text.push_str(&link_formatter(&user_link(app_url, sender), sender));
    }

    (text, color)
}
