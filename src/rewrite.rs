//! Rewriting of inline `cid:` references in HTML bodies.
//!
//! A quoted `cid:<token>` whose token is a known Content-ID is pointed at the
//! fingerprint of the attachment's generated file name, which is the name the
//! receiver sees for that attachment's upload. Unknown tokens are left alone:
//! they may reference content outside this message.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::fingerprint::fingerprint;
use crate::model::attachment::ContentReferenceMap;
use crate::model::mail::Message;

static CID_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(['"])cid:([^'"]+)(['"])"#).expect("CID pattern is valid")
});

/// Rewrite every known quoted `cid:` reference in `html`.
pub fn rewrite_cid_references(html: &str, map: &ContentReferenceMap) -> String {
    if map.is_empty() {
        return html.to_string();
    }
    CID_REFERENCE
        .replace_all(html, |caps: &Captures<'_>| match map.get(&caps[2]) {
            Some(file_name) => format!("{}cid:{}{}", &caps[1], fingerprint(file_name), &caps[3]),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Apply [`rewrite_cid_references`] to the HTML body and to every HTML alternative.
pub fn rewrite_message(message: &mut Message, map: &ContentReferenceMap) {
    if let Some(html) = message.html.as_mut() {
        *html = rewrite_cid_references(html, map);
    }
    for alternative in message.alternatives.iter_mut().filter(|a| a.is_html()) {
        alternative.content = rewrite_cid_references(&alternative.content, map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mail::Alternative;

    fn map(pairs: &[(&str, &str)]) -> ContentReferenceMap {
        pairs
            .iter()
            .map(|(cid, name)| (cid.to_string(), name.to_string()))
            .collect()
    }

    #[test]
    fn test_known_reference_is_rewritten() {
        let html = r#"<img src="cid:abc">"#;
        let out = rewrite_cid_references(html, &map(&[("abc", "photo.jpg")]));
        assert_eq!(out, format!(r#"<img src="cid:{}">"#, fingerprint("photo.jpg")));
    }

    #[test]
    fn test_single_quotes() {
        let html = "<img src='cid:abc'>";
        let out = rewrite_cid_references(html, &map(&[("abc", "photo.jpg")]));
        assert_eq!(out, format!("<img src='cid:{}'>", fingerprint("photo.jpg")));
    }

    #[test]
    fn test_unknown_reference_is_untouched() {
        let html = r#"<img src="cid:other@example.com"><img src="cid:abc">"#;
        let out = rewrite_cid_references(html, &map(&[("abc", "photo.jpg")]));
        assert!(out.starts_with(r#"<img src="cid:other@example.com">"#));
        assert!(!out.contains("cid:abc"));
    }

    #[test]
    fn test_unquoted_reference_is_untouched() {
        let html = "<img src=cid:abc>";
        assert_eq!(rewrite_cid_references(html, &map(&[("abc", "p.jpg")])), html);
    }

    #[test]
    fn test_second_pass_is_identity() {
        let m = map(&[("abc", "photo.jpg"), ("def", "doc.pdf")]);
        let html = r#"<a href="cid:def">x</a><img src="cid:abc"><img src="cid:zzz">"#;
        let once = rewrite_cid_references(html, &m);
        let twice = rewrite_cid_references(&once, &m);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_rewrite_message_touches_only_html() {
        let mut message = Message {
            html: Some(r#"<img src="cid:abc">"#.to_string()),
            text: Some("see cid:abc".to_string()),
            alternatives: vec![
                Alternative {
                    content_type: "text/html".to_string(),
                    content: r#"<img src="cid:abc">"#.to_string(),
                },
                Alternative {
                    content_type: "text/plain".to_string(),
                    content: r#""cid:abc""#.to_string(),
                },
            ],
            ..Message::default()
        };
        rewrite_message(&mut message, &map(&[("abc", "photo.jpg")]));
        let expected = fingerprint("photo.jpg");
        assert!(message.html.as_deref().is_some_and(|h| h.contains(&expected)));
        assert!(message.alternatives[0].content.contains(&expected));
        assert_eq!(message.alternatives[1].content, r#""cid:abc""#);
        assert_eq!(message.text.as_deref(), Some("see cid:abc"));
    }
}
