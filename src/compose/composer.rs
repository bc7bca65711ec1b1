//! Streams a planned part sequence into one outbound body.
//!
//! Parts are written strictly in order and attachments one at a time. An
//! attachment body is moved through a single fixed buffer: the next chunk is
//! read from its temp object only after the previous one has been accepted by
//! the destination, so a saturated destination pauses the source.

use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::compose::part::{Boundary, FormPart};
use crate::error::{Result, UploadError};
use crate::store::temp::TempObjectStore;

/// Serializer for one conversion's multipart body.
#[derive(Debug, Clone)]
pub struct MultipartComposer {
    store: TempObjectStore,
    boundary: Boundary,
    buffer_size: usize,
}

impl MultipartComposer {
    pub fn new(store: TempObjectStore, boundary: Boundary, buffer_size: usize) -> Self {
        Self {
            store,
            boundary,
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Write every part to `dest`, then flush and shut it down.
    ///
    /// Each attachment's temp object is deleted as soon as its bytes have
    /// been written. `dest_path` names the destination in errors. Returns
    /// the number of bytes written.
    pub async fn compose<W>(&self, parts: &[FormPart], dest: &mut W, dest_path: &Path) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0u64;
        for part in parts {
            match part {
                FormPart::FileBody { object, size } => {
                    let copied = self.stream_object(object, dest, dest_path).await?;
                    self.store.delete(object).await;
                    if copied != *size {
                        return Err(UploadError::Composition(format!(
                            "temp object '{object}' holds {copied} bytes, expected {size}"
                        )));
                    }
                    written += copied;
                }
                other => {
                    let framing = other.framing(&self.boundary);
                    dest.write_all(framing.as_bytes())
                        .await
                        .map_err(|e| UploadError::storage(dest_path, e))?;
                    written += framing.len() as u64;
                }
            }
        }

        dest.flush()
            .await
            .map_err(|e| UploadError::storage(dest_path, e))?;
        dest.shutdown()
            .await
            .map_err(|e| UploadError::storage(dest_path, e))?;
        debug!(bytes = written, parts = parts.len(), "Composed multipart body");
        Ok(written)
    }

    /// Copy one temp object into `dest`, one buffer at a time.
    async fn stream_object<W>(&self, object: &str, dest: &mut W, dest_path: &Path) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut source = self.store.open_read(object).await?;
        let mut buf = vec![0u8; self.buffer_size];
        let mut copied = 0u64;
        loop {
            let n = source
                .read(&mut buf)
                .await
                .map_err(|e| UploadError::storage(self.store.path_of(object), e))?;
            if n == 0 {
                break;
            }
            // Suspends while the destination is saturated; no further reads until it drains.
            dest.write_all(&buf[..n])
                .await
                .map_err(|e| UploadError::storage(dest_path, e))?;
            copied += n as u64;
        }
        debug!(object, bytes = copied, "Streamed attachment body");
        Ok(copied)
    }
}
