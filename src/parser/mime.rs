//! MIME decoding on top of `mail-parser`: headers, bodies and attachments.

use std::collections::HashSet;
use std::ops::ControlFlow;

use mail_parser::{Addr, Address, MessageParser, MessagePart, MimeHeaders, PartType};

use crate::error::{Result, UploadError};
use crate::model::address::EmailAddress;
use crate::model::attachment::AttachmentInfo;
use crate::model::mail::{Alternative, Message};
use crate::parser::naming::FileNamer;

/// A decoded attachment: its metadata and its bytes.
#[derive(Debug)]
pub struct DecodedAttachment {
    pub info: AttachmentInfo,
    pub contents: Vec<u8>,
}

/// Parse a complete raw message (headers + body).
///
/// Each attachment is handed to `on_attachment` as soon as it is decoded, in
/// discovery order, so only one decoded copy exists at a time on this side.
/// Returns `Ok(None)` if `on_attachment` breaks before the end.
///
/// A leading UTF-8 BOM and an mbox `From ` separator line are skipped.
pub fn parse_message<F>(raw_message: &[u8], mut on_attachment: F) -> Result<Option<Message>>
where
    F: FnMut(DecodedAttachment) -> ControlFlow<()>,
{
    let message_bytes = skip_from_line(raw_message);
    if message_bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(UploadError::Parse("input message is empty".into()));
    }

    let msg = MessageParser::default()
        .parse(message_bytes)
        .ok_or_else(|| UploadError::Parse("input is not a valid RFC 5322 message".into()))?;

    let from = msg.from().map(addresses).unwrap_or_default();
    let to = msg.to().map(addresses).unwrap_or_default();
    let subject = msg
        .subject()
        .map(str::to_string)
        .filter(|s| !s.is_empty());

    let mut used_parts = HashSet::new();

    let html = msg
        .html_body
        .iter()
        .copied()
        .find_map(|id| html_contents(msg.parts.get(id as usize)?).map(|html| (id, html)))
        .map(|(id, html)| {
            used_parts.insert(id);
            html
        });

    let text = msg
        .text_body
        .iter()
        .copied()
        .find_map(|id| text_contents(msg.parts.get(id as usize)?).map(|text| (id, text)))
        .map(|(id, text)| {
            used_parts.insert(id);
            text
        });

    let mut alternatives = Vec::new();
    for id in msg.html_body.iter().chain(msg.text_body.iter()).copied() {
        if !used_parts.insert(id) {
            continue;
        }
        let Some(part) = msg.parts.get(id as usize) else {
            continue;
        };
        if let Some(content) = html_contents(part).or_else(|| text_contents(part)) {
            alternatives.push(Alternative {
                content_type: content_type_of(part),
                content,
            });
        }
    }

    let mut namer = FileNamer::new();
    let mut infos = Vec::new();
    for part in msg.attachments() {
        let content_type = content_type_of(part);
        let info = AttachmentInfo {
            generated_file_name: namer.assign(part.attachment_name(), &content_type),
            content_type,
            content_id: part
                .content_id()
                .map(|cid| cid.trim().trim_matches(|c| c == '<' || c == '>').to_string())
                .filter(|cid| !cid.is_empty()),
        };
        infos.push(info.clone());
        let decoded = DecodedAttachment {
            info,
            contents: part.contents().to_vec(),
        };
        if on_attachment(decoded).is_break() {
            return Ok(None);
        }
    }

    Ok(Some(Message {
        from,
        to,
        subject,
        text,
        html,
        alternatives,
        attachments: infos,
    }))
}

fn addresses(addr: &Address<'_>) -> Vec<EmailAddress> {
    match addr {
        Address::List(list) => list.iter().map(email_address).collect(),
        Address::Group(groups) => groups
            .iter()
            .flat_map(|group| group.addresses.iter())
            .map(email_address)
            .collect(),
    }
}

fn email_address(addr: &Addr<'_>) -> EmailAddress {
    EmailAddress::from_parts(addr.name.as_deref(), addr.address.as_deref())
}

/// HTML content of a part that really is `text/html`.
fn html_contents(part: &MessagePart<'_>) -> Option<String> {
    match &part.body {
        PartType::Html(html) => Some(html.to_string()),
        _ => None,
    }
}

/// Text content of a part that really is `text/*` but not HTML.
fn text_contents(part: &MessagePart<'_>) -> Option<String> {
    match &part.body {
        PartType::Text(text) => Some(text.to_string()),
        _ => None,
    }
}

/// `type/subtype` of a part, lowercased.
fn content_type_of(part: &MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct: &mail_parser::ContentType| {
            let main = ct.ctype();
            match ct.subtype() {
                Some(sub) => format!("{main}/{sub}"),
                None => main.to_string(),
            }
        })
        .map(|ct| ct.to_ascii_lowercase())
        .unwrap_or_else(|| match part.body {
            PartType::Html(_) => "text/html".to_string(),
            PartType::Text(_) => "text/plain".to_string(),
            PartType::Message(_) => "message/rfc822".to_string(),
            _ => "application/octet-stream".to_string(),
        })
}

/// Skip a UTF-8 BOM and the `From ` separator line of mbox-exported messages.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}
