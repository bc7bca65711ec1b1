//! Typed multipart parts, the boundary token, and their exact wire encoding.
//!
//! All framing and escaping lives here so the byte length of a composed body
//! can be computed without touching any attachment data.

use std::collections::BTreeMap;

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::model::attachment::StoredAttachment;
use crate::model::mail::Message;

const CRLF: &str = "\r\n";

/// Delimiter token shared by every part of one composed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary(String);

impl Boundary {
    /// Timestamp plus random suffix. Not checked against any content.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let suffix: String = std::iter::repeat_with(|| rng.sample(Alphanumeric) as char)
            .take(16)
            .collect();
        Self(format!(
            "----MailUpload{}{}",
            Utc::now().timestamp_millis(),
            suffix
        ))
    }

    /// Generate a boundary that does not occur in any in-memory value of `parts`.
    ///
    /// Attachment bytes are not scanned; a collision there is assumed not to happen.
    pub fn avoiding(parts: &[FormPart]) -> Self {
        loop {
            let boundary = Self::generate();
            if !parts.iter().any(|part| part.mentions(&boundary.0)) {
                return boundary;
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value of the `Content-Type` header for a body using this boundary.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.0)
    }
}

impl std::fmt::Display for Boundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One element of the outbound body, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    /// A plain form field.
    Field { name: String, value: String },
    /// Delimiter and headers of the `file[index]` part.
    FileHeader {
        index: usize,
        filename: String,
        content_type: String,
    },
    /// The bytes of a temp object, streamed verbatim.
    FileBody { object: String, size: u64 },
    /// Line break closing a file part.
    FileTrailer,
    /// Final delimiter.
    Closing,
}

impl FormPart {
    /// Framing bytes of this part. Empty for [`FormPart::FileBody`], whose bytes are streamed.
    pub fn framing(&self, boundary: &Boundary) -> String {
        match self {
            Self::Field { name, value } => format!(
                "--{boundary}{CRLF}Content-Disposition: form-data; name=\"{}\"{CRLF}{CRLF}{value}{CRLF}",
                header_param(name)
            ),
            Self::FileHeader {
                index,
                filename,
                content_type,
            } => format!(
                "--{boundary}{CRLF}Content-Disposition: form-data; name=\"file[{index}]\"; filename=\"{}\"{CRLF}Content-Type: {}{CRLF}{CRLF}",
                header_param(filename),
                strip_controls(content_type)
            ),
            Self::FileBody { .. } => String::new(),
            Self::FileTrailer => CRLF.to_string(),
            Self::Closing => format!("--{boundary}--"),
        }
    }

    /// Exact number of bytes this part contributes to the body.
    pub fn encoded_len(&self, boundary: &Boundary) -> u64 {
        match self {
            Self::FileBody { size, .. } => *size,
            other => other.framing(boundary).len() as u64,
        }
    }

    fn mentions(&self, needle: &str) -> bool {
        match self {
            Self::Field { name, value } => name.contains(needle) || value.contains(needle),
            Self::FileHeader {
                filename,
                content_type,
                ..
            } => filename.contains(needle) || content_type.contains(needle),
            Self::FileBody { .. } | Self::FileTrailer | Self::Closing => false,
        }
    }
}

/// Exact byte length of the body composed from `parts`.
pub fn encoded_len(parts: &[FormPart], boundary: &Boundary) -> u64 {
    parts.iter().map(|part| part.encoded_len(boundary)).sum()
}

/// Backslash-escape double quotes in a header parameter value.
pub fn escape_quotes(value: &str) -> String {
    value.replace('"', "\\\"")
}

/// Quoted-parameter form of `value`: control characters removed, quotes escaped.
fn header_param(value: &str) -> String {
    escape_quotes(&strip_controls(value))
}

/// Drop control characters so a value cannot start a new header line.
fn strip_controls(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).collect()
}

/// Lay out the parts of a message in wire order.
///
/// Additional fields come first (sorted by name), then `from`, `to`,
/// `subject`, `htmlBody`, `textBody` when present and non-empty, then one
/// file part per attachment in discovery order, then the closing delimiter.
pub fn plan_parts(
    message: &Message,
    attachments: &[StoredAttachment],
    additional_fields: &BTreeMap<String, String>,
) -> Vec<FormPart> {
    let mut parts: Vec<FormPart> = additional_fields
        .iter()
        .map(|(name, value)| field(name, value.clone()))
        .collect();

    if let Some(sender) = message.from.first().filter(|addr| !addr.is_empty()) {
        parts.push(field("from", sender.form_value()));
    }

    let recipients: Vec<String> = message
        .to
        .iter()
        .filter(|addr| !addr.is_empty())
        .map(|addr| addr.form_value())
        .collect();
    if !recipients.is_empty() {
        parts.push(field("to", recipients.join(CRLF)));
    }

    let bodies = [
        ("subject", &message.subject),
        ("htmlBody", &message.html),
        ("textBody", &message.text),
    ];
    for (name, value) in bodies {
        if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
            parts.push(field(name, value.clone()));
        }
    }

    for (index, attachment) in attachments.iter().enumerate() {
        parts.push(FormPart::FileHeader {
            index,
            filename: attachment.generated_file_name.clone(),
            content_type: attachment.content_type.clone(),
        });
        parts.push(FormPart::FileBody {
            object: attachment.used_file_name.clone(),
            size: attachment.size,
        });
        parts.push(FormPart::FileTrailer);
    }

    parts.push(FormPart::Closing);
    parts
}

fn field(name: &str, value: String) -> FormPart {
    FormPart::Field {
        name: name.to_string(),
        value,
    }
}
