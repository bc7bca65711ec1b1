//! Attachment metadata and completion records.
//!
//! Attachment bytes never live in these types: they flow from the parser
//! straight into a temp object and from there into the composed body.

use std::collections::HashMap;

/// Metadata about an attachment as discovered by the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentInfo {
    /// File name from the message, or a generated one. Unique within one message.
    pub generated_file_name: String,

    /// MIME content type (e.g. `"image/jpeg"`, `"application/pdf"`).
    pub content_type: String,

    /// Content-ID (without angle brackets) for inline attachments referenced from HTML.
    pub content_id: Option<String>,
}

/// An attachment whose bytes have been fully persisted to a temp object.
///
/// Produced once per attachment by the sink and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAttachment {
    /// Name declared as `filename` in the outbound part.
    pub generated_file_name: String,

    /// Fingerprint of `generated_file_name`; the temp object name.
    pub used_file_name: String,

    /// MIME content type.
    pub content_type: String,

    /// Content-ID, if any.
    pub content_id: Option<String>,

    /// Number of bytes persisted.
    pub size: u64,
}

/// Mapping from Content-ID to the generated file name of the attachment carrying it.
#[derive(Debug, Clone, Default)]
pub struct ContentReferenceMap {
    entries: HashMap<String, String>,
}

impl ContentReferenceMap {
    /// Build the map from the complete, ordered attachment list.
    ///
    /// When two attachments share a Content-ID the later one wins.
    pub fn from_attachments(attachments: &[StoredAttachment]) -> Self {
        let entries = attachments
            .iter()
            .filter_map(|att| {
                att.content_id
                    .as_ref()
                    .map(|cid| (cid.clone(), att.generated_file_name.clone()))
            })
            .collect();
        Self { entries }
    }

    /// Generated file name for a Content-ID.
    pub fn get(&self, content_id: &str) -> Option<&str> {
        self.entries.get(content_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for ContentReferenceMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
