//! Parser event stream: attachments as they are discovered, then the message.

use std::io::Cursor;
use std::ops::ControlFlow;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, UploadError};
use crate::model::attachment::AttachmentInfo;
use crate::model::mail::Message;
use crate::parser::mime;

/// Byte stream of one attachment.
pub type AttachmentStream = Box<dyn AsyncRead + Send + Unpin>;

/// One attachment as delivered by the parser.
pub struct AttachmentEvent {
    pub info: AttachmentInfo,
    pub stream: AttachmentStream,
}

impl std::fmt::Debug for AttachmentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentEvent")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Events emitted for one message: zero or more `Attachment`, then exactly one `End`.
#[derive(Debug)]
pub enum ParserEvent {
    Attachment(AttachmentEvent),
    End(Message),
}

/// Read `input` front to back on a background task and emit its events.
///
/// The input is buffered whole for the MIME parser. Attachments are sent as
/// each one is decoded, so a full channel pauses decoding until the receiver
/// catches up. A read or parse failure is delivered as a single `Err` item,
/// after which the channel closes. Emission stops early if the receiver is
/// dropped.
pub fn spawn_parser<R>(mut input: R, capacity: usize) -> mpsc::Receiver<Result<ParserEvent>>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));

    tokio::spawn(async move {
        let mut raw = Vec::new();
        if let Err(e) = input.read_to_end(&mut raw).await {
            let _ = tx
                .send(Err(UploadError::Parse(format!("failed to read message: {e}"))))
                .await;
            return;
        }
        debug!(bytes = raw.len(), "Read input message");

        let events = tx.clone();
        let decoding = tokio::task::spawn_blocking(move || emit_events(&raw, &events)).await;
        if let Err(e) = decoding {
            let _ = tx
                .send(Err(UploadError::Parse(format!("parser task failed: {e}"))))
                .await;
        }
    });

    rx
}

/// Decode `raw` on a blocking thread, sending each event as it becomes available.
fn emit_events(raw: &[u8], tx: &mpsc::Sender<Result<ParserEvent>>) {
    let outcome = mime::parse_message(raw, |attachment| {
        let event = AttachmentEvent {
            info: attachment.info,
            stream: Box::new(Cursor::new(attachment.contents)),
        };
        match tx.blocking_send(Ok(ParserEvent::Attachment(event))) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    });

    let _ = match outcome {
        Ok(Some(message)) => tx.blocking_send(Ok(ParserEvent::End(message))),
        Ok(None) => {
            debug!("Event receiver dropped, parsing stopped");
            Ok(())
        }
        Err(e) => tx.blocking_send(Err(e)),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_end_last() {
        let raw: &'static [u8] = b"Subject: Hi\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"B\"\r\n\
\r\n\
--B\r\n\
Content-Type: text/plain\r\n\
\r\n\
body\r\n\
--B\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"a.pdf\"\r\n\
\r\n\
PDF\r\n\
--B\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"a.pdf\"\r\n\
\r\n\
PDF2\r\n\
--B--\r\n";
        let mut rx = spawn_parser(raw, 4);

        let mut names = Vec::new();
        let mut ended = false;
        while let Some(event) = rx.recv().await {
            match event.expect("event") {
                ParserEvent::Attachment(att) => {
                    assert!(!ended, "attachment after end");
                    names.push(att.info.generated_file_name);
                }
                ParserEvent::End(msg) => {
                    ended = true;
                    assert_eq!(msg.subject.as_deref(), Some("Hi"));
                    assert_eq!(msg.attachments.len(), 2);
                }
            }
        }
        assert!(ended);
        assert_eq!(names, vec!["a.pdf", "a-1.pdf"]);
    }

    #[tokio::test]
    async fn test_first_attachment_arrives_before_end() {
        let raw: &'static [u8] = b"Subject: Stream\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"B\"\r\n\
\r\n\
--B\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=\"one.bin\"\r\n\
\r\n\
1\r\n\
--B\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=\"two.bin\"\r\n\
\r\n\
2\r\n\
--B\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=\"three.bin\"\r\n\
\r\n\
3\r\n\
--B--\r\n";
        let mut rx = spawn_parser(raw, 1);

        let first = rx.recv().await.expect("first event").expect("no error");
        match first {
            ParserEvent::Attachment(att) => {
                assert_eq!(att.info.generated_file_name, "one.bin");
            }
            ParserEvent::End(_) => panic!("end delivered before the first attachment"),
        }

        let mut rest = Vec::new();
        while let Some(event) = rx.recv().await {
            rest.push(event.expect("event"));
        }
        assert_eq!(rest.len(), 3);
        assert!(matches!(rest.last(), Some(ParserEvent::End(_))));
    }

    #[tokio::test]
    async fn test_empty_input_yields_single_error() {
        let mut rx = spawn_parser(&b""[..], 4);
        assert!(matches!(rx.recv().await, Some(Err(UploadError::Parse(_)))));
        assert!(rx.recv().await.is_none());
    }
}
