//! Parsed message representation.

use super::address::EmailAddress;
use super::attachment::AttachmentInfo;

/// A body part that was not chosen as the primary text or HTML body.
#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    /// Declared content type, e.g. `"text/html"`.
    pub content_type: String,
    /// Decoded content.
    pub content: String,
}

impl Alternative {
    /// `true` if this alternative is an HTML body and subject to CID rewriting.
    pub fn is_html(&self) -> bool {
        self.content_type.eq_ignore_ascii_case("text/html")
    }
}

/// A parsed message, owned by the pipeline for the duration of one conversion.
///
/// Attachment bytes are not part of this value; they are delivered as
/// separate streams before the parser reports the end of the message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Senders (`From:`). Only the first one is sent.
    pub from: Vec<EmailAddress>,

    /// Primary recipients (`To:`), in header order.
    pub to: Vec<EmailAddress>,

    /// Decoded subject line.
    pub subject: Option<String>,

    /// Plain-text body, only if the message really has a `text/plain` part.
    pub text: Option<String>,

    /// HTML body, only if the message really has a `text/html` part.
    pub html: Option<String>,

    /// Other body parts in message order.
    pub alternatives: Vec<Alternative>,

    /// Attachment metadata in discovery order.
    pub attachments: Vec<AttachmentInfo>,
}
