//! `mailupload` — convert an email message into a `multipart/form-data` upload.
//!
//! Attachments are streamed from the parser into temp objects as they are
//! discovered, a completion barrier waits for all of them, inline `cid:`
//! references are rewritten, and the body is composed and uploaded with
//! bounded memory.

pub mod compose;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod rewrite;
pub mod store;
pub mod upload;

pub use config::UploadOptions;
pub use error::{Result, UploadError};
pub use pipeline::conversion::{upload_mail, ComposedBody, MailComposer, MailUploader};
pub use upload::http::HttpTransport;
pub use upload::{UploadRequest, UploadResponse, UploadTransport};
