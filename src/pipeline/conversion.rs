//! One message in, one upload out.
//!
//! Stages, each finishing before the next starts:
//! 1. gather: parser events feed the attachment sink until the completion
//!    barrier opens, yielding the message and its completion records in
//!    discovery order;
//! 2. compose: CID rewriting, part planning and streaming into a temp object;
//! 3. upload: the temp object goes to the transport and is deleted.
//!
//! Any failure aborts the remaining stages, removes the temp objects created
//! so far and is returned as the single result of the conversion.
//!
//! [`MailComposer`] owns the first two stages and needs no transport;
//! [`MailUploader`] adds the third.

use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::compose::composer::MultipartComposer;
use crate::compose::part::{encoded_len, plan_parts, Boundary};
use crate::config::UploadOptions;
use crate::error::{Result, UploadError};
use crate::fingerprint::fingerprint;
use crate::model::attachment::{ContentReferenceMap, StoredAttachment};
use crate::model::mail::Message;
use crate::parser::events::{spawn_parser, ParserEvent};
use crate::pipeline::sink::{AttachmentSink, PendingAttachment};
use crate::pipeline::tracker::CompletionTracker;
use crate::rewrite::rewrite_message;
use crate::store::temp::TempObjectStore;
use crate::upload::http::HttpTransport;
use crate::upload::{UploadRequest, UploadResponse, UploadTransport};

/// A message whose attachments have all been persisted.
#[derive(Debug)]
pub struct GatheredMessage {
    pub message: Message,
    pub attachments: Vec<StoredAttachment>,
}

/// Summary of a composed body.
#[derive(Debug, Clone)]
pub struct ComposedBody {
    pub boundary: Boundary,
    /// Exact byte length of the body.
    pub length: u64,
    /// Number of `file[N]` parts.
    pub attachments: usize,
}

/// Turns messages into `multipart/form-data` bodies without sending them.
#[derive(Debug, Clone)]
pub struct MailComposer {
    options: UploadOptions,
    store: TempObjectStore,
}

impl MailComposer {
    pub fn new(options: UploadOptions) -> Self {
        let store = TempObjectStore::new(options.temp_dir.clone());
        Self { options, store }
    }

    /// Convert the message at `path` and write the multipart body to `dest`.
    pub async fn compose_file(&self, path: &Path, dest: &Path) -> Result<ComposedBody> {
        let input = open_input(path).await?;
        self.compose_to(input, dest).await
    }

    /// Convert a message read from `input` and write the multipart body to `dest`.
    ///
    /// `dest` is removed again if composition fails.
    pub async fn compose_to<R>(&self, input: R, dest: &Path) -> Result<ComposedBody>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let gathered = self
            .gather(spawn_parser(input, self.options.channel_capacity))
            .await?;
        let cleanup: Vec<String> = used_names(&gathered.attachments);

        let result = async {
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|e| UploadError::storage(dest, e))?;
            self.compose_into(gathered, &mut file, dest).await
        }
        .await;

        if result.is_err() {
            self.delete_all(&cleanup).await;
            let _ = tokio::fs::remove_file(dest).await;
        }
        result
    }

    /// Stage 1: drive the parser events through the sink up to the completion barrier.
    pub async fn gather(
        &self,
        mut events: mpsc::Receiver<Result<ParserEvent>>,
    ) -> Result<GatheredMessage> {
        let (tracker, barrier) = CompletionTracker::new();
        let sink = AttachmentSink::new(
            self.store.clone(),
            tracker.clone(),
            self.options.copy_buffer_size,
        );

        let mut pending: Vec<PendingAttachment> = Vec::new();
        let mut outcome = Err(UploadError::Parse(
            "parser finished without reporting the message end".into(),
        ));
        while let Some(event) = events.recv().await {
            match event {
                Ok(ParserEvent::Attachment(attachment)) => {
                    debug!(
                        file = %attachment.info.generated_file_name,
                        content_type = %attachment.info.content_type,
                        "Attachment discovered"
                    );
                    pending.push(sink.accept(attachment));
                }
                Ok(ParserEvent::End(message)) => {
                    outcome = Ok(message);
                    break;
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        drop(events);

        let message = match outcome.and_then(|message| tracker.decrement().map(|()| message)) {
            Ok(message) => message,
            Err(e) => {
                self.abandon(pending).await;
                return Err(e);
            }
        };

        if let Err(e) = barrier.await {
            self.abandon(pending).await;
            return Err(e);
        }
        debug!(attachments = pending.len(), "All sub-streams complete");

        let names: Vec<String> = pending
            .iter()
            .map(|p| p.used_file_name().to_string())
            .collect();
        let mut attachments = Vec::with_capacity(pending.len());
        let mut failure = None;
        for attachment in pending {
            match attachment.finish().await {
                Ok(record) => attachments.push(record),
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            self.delete_all(&names).await;
            return Err(e);
        }

        Ok(GatheredMessage {
            message,
            attachments,
        })
    }

    /// Stage 2: rewrite, plan and stream the body into `dest`.
    pub async fn compose_into<W>(
        &self,
        gathered: GatheredMessage,
        dest: &mut W,
        dest_path: &Path,
    ) -> Result<ComposedBody>
    where
        W: AsyncWrite + Unpin,
    {
        let GatheredMessage {
            mut message,
            attachments,
        } = gathered;

        let map = ContentReferenceMap::from_attachments(&attachments);
        if !map.is_empty() {
            debug!(references = map.len(), "Rewriting cid references");
            rewrite_message(&mut message, &map);
        }

        let parts = plan_parts(&message, &attachments, &self.options.additional_fields);
        let boundary = Boundary::avoiding(&parts);
        let planned = encoded_len(&parts, &boundary);
        let composer =
            MultipartComposer::new(self.store.clone(), boundary, self.options.copy_buffer_size);

        let written = match composer.compose(&parts, dest, dest_path).await {
            Ok(written) => written,
            Err(e) => {
                self.delete_all(&used_names(&attachments)).await;
                return Err(e);
            }
        };
        if written != planned {
            return Err(UploadError::Composition(format!(
                "composed {written} bytes but planned {planned}"
            )));
        }

        Ok(ComposedBody {
            boundary: composer.boundary().clone(),
            length: written,
            attachments: attachments.len(),
        })
    }

    /// Compose into the temp object `object` and check its size on disk.
    async fn compose_object(&self, gathered: GatheredMessage, object: &str) -> Result<ComposedBody> {
        let cleanup = used_names(&gathered.attachments);
        let mut file = match self.store.create(object).await {
            Ok(file) => file,
            Err(e) => {
                self.delete_all(&cleanup).await;
                return Err(e);
            }
        };
        let composed = self
            .compose_into(gathered, &mut file, &self.store.path_of(object))
            .await?;
        drop(file);

        let on_disk = self.store.len(object).await?;
        if on_disk != composed.length {
            return Err(UploadError::Composition(format!(
                "composed body is {on_disk} bytes on disk, expected {}",
                composed.length
            )));
        }
        Ok(composed)
    }

    /// Wait for every started attachment task, then delete what they wrote.
    async fn abandon(&self, pending: Vec<PendingAttachment>) {
        let names = pending
            .iter()
            .map(|p| p.used_file_name().to_string())
            .collect::<Vec<_>>();
        for attachment in pending {
            let _ = attachment.finish().await;
        }
        self.delete_all(&names).await;
    }

    async fn delete_all(&self, names: &[String]) {
        for name in names {
            self.store.delete(name).await;
        }
    }
}

/// Converts messages to `multipart/form-data` uploads.
pub struct MailUploader<T> {
    composer: MailComposer,
    transport: T,
}

impl<T: UploadTransport> MailUploader<T> {
    pub fn new(options: UploadOptions, transport: T) -> Self {
        Self {
            composer: MailComposer::new(options),
            transport,
        }
    }

    /// Convert the message stored at `path` and upload it to `url`.
    pub async fn upload_file(&self, path: &Path, url: &str) -> Result<UploadResponse> {
        let input = open_input(path).await?;
        self.upload_reader(input, url).await
    }

    /// Convert a message read from `input` and upload it to `url`.
    pub async fn upload_reader<R>(&self, input: R, url: &str) -> Result<UploadResponse>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let events = spawn_parser(input, self.composer.options.channel_capacity);
        self.upload_events(events, url).await
    }

    /// Convert a message delivered as parser events and upload it to `url`.
    pub async fn upload_events(
        &self,
        events: mpsc::Receiver<Result<ParserEvent>>,
        url: &str,
    ) -> Result<UploadResponse> {
        let store = &self.composer.store;
        let gathered = self.composer.gather(events).await?;

        let object = fingerprint(&format!("{}{}", Boundary::generate(), rand::random::<u64>()));
        let composed = match self.composer.compose_object(gathered, &object).await {
            Ok(composed) => composed,
            Err(e) => {
                store.delete(&object).await;
                return Err(e);
            }
        };

        let result = self.send(&object, &composed, url).await;
        store.delete(&object).await;
        match &result {
            Ok(response) => info!(
                url,
                status = response.status,
                bytes = composed.length,
                attachments = composed.attachments,
                "Message uploaded"
            ),
            Err(e) => warn!(url, error = %e, "Upload failed"),
        }
        result
    }

    /// Stage 3: hand the composed object to the transport.
    async fn send(&self, object: &str, composed: &ComposedBody, url: &str) -> Result<UploadResponse> {
        let body = self.composer.store.open_read(object).await?;
        self.transport
            .upload(UploadRequest {
                url: url.to_string(),
                content_type: composed.boundary.content_type(),
                content_length: composed.length,
                body,
            })
            .await
    }
}

/// Convert the message at `path` and upload it to `url` over HTTP.
pub async fn upload_mail(path: &Path, url: &str, options: UploadOptions) -> Result<UploadResponse> {
    let transport = HttpTransport::new(None)?;
    MailUploader::new(options, transport)
        .upload_file(path, url)
        .await
}

fn used_names(attachments: &[StoredAttachment]) -> Vec<String> {
    attachments
        .iter()
        .map(|a| a.used_file_name.clone())
        .collect()
}

async fn open_input(path: &Path) -> Result<tokio::fs::File> {
    tokio::fs::File::open(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            UploadError::FileNotFound(path.to_path_buf())
        } else {
            UploadError::Parse(format!("cannot open '{}': {e}", path.display()))
        }
    })
}
