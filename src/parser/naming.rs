//! Generated attachment file names.
//!
//! Every attachment gets a name that is unique within its message, because
//! the name's fingerprint becomes the temp object name.

use std::collections::HashSet;

/// Assigns unique file names to the attachments of one message, in discovery order.
#[derive(Debug, Default)]
pub struct FileNamer {
    seen: HashSet<String>,
}

impl FileNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick a name for the next attachment.
    ///
    /// Uses the declared name when present, otherwise `attachment.<ext>` with
    /// an extension derived from the content type. Repeated names get a
    /// `-N` suffix before the extension: `a.txt`, `a-1.txt`, `a-2.txt`.
    pub fn assign(&mut self, declared: Option<&str>, content_type: &str) -> String {
        let base = match declared.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("attachment.{}", extension_for(content_type)),
        };

        let name = if self.seen.contains(&base) {
            let (stem, ext) = split_extension(&base);
            (1..)
                .map(|n| match ext {
                    Some(ext) => format!("{stem}-{n}.{ext}"),
                    None => format!("{stem}-{n}"),
                })
                .find(|candidate| !self.seen.contains(candidate))
                .unwrap_or_default()
        } else {
            base
        };

        self.seen.insert(name.clone());
        name
    }
}

/// Split `name` into stem and extension at the last dot, ignoring leading dots.
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => (&name[..pos], Some(&name[pos + 1..])),
        _ => (name, None),
    }
}

/// File extension for a MIME type.
fn extension_for(content_type: &str) -> &'static str {
    match content_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "text/plain" => "txt",
        "text/html" => "html",
        "text/calendar" => "ics",
        "text/csv" => "csv",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "application/json" => "json",
        "message/rfc822" => "eml",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_name_is_kept() {
        let mut namer = FileNamer::new();
        assert_eq!(namer.assign(Some("photo.jpg"), "image/jpeg"), "photo.jpg");
    }

    #[test]
    fn test_missing_name_uses_content_type() {
        let mut namer = FileNamer::new();
        assert_eq!(namer.assign(None, "image/png"), "attachment.png");
        assert_eq!(namer.assign(Some("  "), "application/x-unknown"), "attachment.bin");
    }

    #[test]
    fn test_duplicates_get_suffix() {
        let mut namer = FileNamer::new();
        assert_eq!(namer.assign(Some("a.txt"), "text/plain"), "a.txt");
        assert_eq!(namer.assign(Some("a.txt"), "text/plain"), "a-1.txt");
        assert_eq!(namer.assign(Some("a.txt"), "text/plain"), "a-2.txt");
        assert_eq!(namer.assign(None, "text/plain"), "attachment.txt");
        assert_eq!(namer.assign(None, "text/plain"), "attachment-1.txt");
    }

    #[test]
    fn test_duplicate_without_extension() {
        let mut namer = FileNamer::new();
        assert_eq!(namer.assign(Some("README"), "text/plain"), "README");
        assert_eq!(namer.assign(Some("README"), "text/plain"), "README-1");
        assert_eq!(namer.assign(Some(".env"), "text/plain"), ".env");
        assert_eq!(namer.assign(Some(".env"), "text/plain"), ".env-1");
    }

    #[test]
    fn test_suffix_skips_taken_names() {
        let mut namer = FileNamer::new();
        namer.assign(Some("a-1.txt"), "text/plain");
        namer.assign(Some("a.txt"), "text/plain");
        assert_eq!(namer.assign(Some("a.txt"), "text/plain"), "a-2.txt");
    }
}
