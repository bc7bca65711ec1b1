//! Persists attachment streams to temp objects as they are discovered.

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{Result, UploadError};
use crate::fingerprint::fingerprint;
use crate::model::attachment::{AttachmentInfo, StoredAttachment};
use crate::parser::events::{AttachmentEvent, AttachmentStream};
use crate::pipeline::tracker::CompletionTracker;
use crate::store::temp::TempObjectStore;

/// Accepts attachment events and drains each one to disk on its own task.
#[derive(Clone)]
pub struct AttachmentSink {
    store: TempObjectStore,
    tracker: CompletionTracker,
    buffer_size: usize,
}

/// An attachment whose bytes are being persisted.
pub struct PendingAttachment {
    used_file_name: String,
    handle: JoinHandle<Result<StoredAttachment>>,
}

impl PendingAttachment {
    /// Temp object name the attachment is written to.
    pub fn used_file_name(&self) -> &str {
        &self.used_file_name
    }

    /// Wait for the write to finish and return its completion record.
    pub async fn finish(self) -> Result<StoredAttachment> {
        self.handle.await.map_err(|e| {
            UploadError::Composition(format!(
                "attachment task for '{}' failed: {e}",
                self.used_file_name
            ))
        })?
    }
}

impl AttachmentSink {
    pub fn new(store: TempObjectStore, tracker: CompletionTracker, buffer_size: usize) -> Self {
        Self {
            store,
            tracker,
            buffer_size: buffer_size.max(1),
        }
    }

    /// Register the attachment with the tracker and start persisting it.
    ///
    /// The tracker is incremented before this returns and decremented exactly
    /// once when the task ends, whether the write succeeded or not.
    pub fn accept(&self, event: AttachmentEvent) -> PendingAttachment {
        let used_file_name = fingerprint(&event.info.generated_file_name);
        self.tracker.increment();
        let guard = CompletionGuard {
            tracker: Some(self.tracker.clone()),
        };

        let store = self.store.clone();
        let buffer_size = self.buffer_size;
        let name = used_file_name.clone();
        let handle = tokio::spawn(async move {
            let written = write_object(&store, &name, event.stream, buffer_size).await;
            let completed = guard.complete();
            let size = written?;
            completed?;
            debug!(
                file = %event.info.generated_file_name,
                object = %name,
                size,
                "Attachment persisted"
            );
            Ok(stored(event.info, name, size))
        });

        PendingAttachment {
            used_file_name,
            handle,
        }
    }
}

fn stored(info: AttachmentInfo, used_file_name: String, size: u64) -> StoredAttachment {
    StoredAttachment {
        generated_file_name: info.generated_file_name,
        used_file_name,
        content_type: info.content_type,
        content_id: info.content_id,
        size,
    }
}

/// Copy `stream` into a new temp object through a fixed-size buffer.
async fn write_object(
    store: &TempObjectStore,
    name: &str,
    stream: AttachmentStream,
    buffer_size: usize,
) -> Result<u64> {
    let mut file = store.create(name).await?;
    let mut reader = BufReader::with_capacity(buffer_size, stream);
    let size = tokio::io::copy_buf(&mut reader, &mut file)
        .await
        .map_err(|e| UploadError::storage(store.path_of(name), e))?;
    file.flush()
        .await
        .map_err(|e| UploadError::storage(store.path_of(name), e))?;
    Ok(size)
}

/// Decrements the tracker once, even if the owning task is cancelled or panics.
struct CompletionGuard {
    tracker: Option<CompletionTracker>,
}

impl CompletionGuard {
    fn complete(mut self) -> Result<()> {
        match self.tracker.take() {
            Some(tracker) => tracker.decrement(),
            None => Ok(()),
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(tracker) = self.tracker.take() {
            let _ = tracker.decrement();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    use crate::model::attachment::AttachmentInfo;

    fn event(name: &str, bytes: &[u8]) -> AttachmentEvent {
        AttachmentEvent {
            info: AttachmentInfo {
                generated_file_name: name.to_string(),
                content_type: "application/octet-stream".to_string(),
                content_id: None,
            },
            stream: Box::new(Cursor::new(bytes.to_vec())),
        }
    }

    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::other("stream broke")))
        }
    }

    #[tokio::test]
    async fn test_persists_under_fingerprint_name() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = TempObjectStore::new(tmp.path());
        let (tracker, barrier) = CompletionTracker::new();
        let sink = AttachmentSink::new(store.clone(), tracker.clone(), 4);

        let pending = sink.accept(event("photo.jpg", b"0123456789"));
        assert_eq!(pending.used_file_name(), fingerprint("photo.jpg"));
        assert_eq!(tracker.outstanding(), 2);

        tracker.decrement().expect("message end");
        barrier.await.expect("barrier");

        let record = pending.finish().await.expect("stored");
        assert_eq!(record.size, 10);
        assert_eq!(record.generated_file_name, "photo.jpg");
        let on_disk = std::fs::read(store.path_of(&record.used_file_name)).expect("read");
        assert_eq!(on_disk, b"0123456789");
    }

    #[tokio::test]
    async fn test_write_failure_still_completes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = TempObjectStore::new(tmp.path().join("missing"));
        let (tracker, barrier) = CompletionTracker::new();
        let sink = AttachmentSink::new(store, tracker.clone(), 1024);

        let pending = sink.accept(event("a.bin", b"data"));
        tracker.decrement().expect("message end");
        barrier.await.expect("barrier opens despite failure");

        let err = pending.finish().await.unwrap_err();
        assert_eq!(err.kind(), "storage");
    }

    #[tokio::test]
    async fn test_stream_failure_is_storage_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = TempObjectStore::new(tmp.path());
        let (tracker, barrier) = CompletionTracker::new();
        let sink = AttachmentSink::new(store, tracker.clone(), 1024);

        let pending = sink.accept(AttachmentEvent {
            info: AttachmentInfo {
                generated_file_name: "broken.bin".to_string(),
                content_type: "application/octet-stream".to_string(),
                content_id: None,
            },
            stream: Box::new(FailingReader),
        });
        tracker.decrement().expect("message end");
        barrier.await.expect("barrier");
        assert!(matches!(
            pending.finish().await,
            Err(UploadError::Storage { .. })
        ));
    }
}
