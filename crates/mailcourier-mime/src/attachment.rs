//! File attachments.

use crate::error::{Error, Result};
use crate::splitter::LineSplitter;
use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderWriter;
use std::fmt;
use std::io::{self, Read, Write};

const READ_CHUNK: usize = 8 * 1024;

enum Source {
    /// Not read yet.
    Pending(Box<dyn Read + Send>),
    /// Bytes kept from the first read (or supplied up front).
    Buffered(Vec<u8>),
    /// The reader failed part-way; the content is lost.
    Failed(io::ErrorKind, String),
}

/// A named attachment whose content is read lazily, when the message is built.
///
/// The source is read exactly once. Its bytes are kept so that later builds
/// of the same message reproduce the attachment.
pub struct Attachment {
    filename: String,
    source: Source,
}

impl Attachment {
    /// Creates an attachment reading its content from `reader` at build time.
    pub fn new(filename: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            filename: filename.into(),
            source: Source::Pending(Box::new(reader)),
        }
    }

    /// Creates an attachment from bytes already in memory.
    pub fn from_bytes(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            source: Source::Buffered(data.into()),
        }
    }

    /// Returns the display filename.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Returns true once the content source has been consumed.
    #[must_use]
    pub const fn is_read(&self) -> bool {
        !matches!(self.source, Source::Pending(_))
    }

    /// The `filename` parameter value: line breaks removed, quotes and
    /// backslashes escaped for a quoted-string.
    pub(crate) fn quoted_filename(&self) -> String {
        let mut quoted = String::with_capacity(self.filename.len());
        for c in self.filename.chars() {
            match c {
                '\r' | '\n' => {}
                '"' | '\\' => {
                    quoted.push('\\');
                    quoted.push(c);
                }
                _ => quoted.push(c),
            }
        }
        quoted
    }

    /// Streams the content, base64-encoded and folded at 76 columns, into `out`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attachment`] if the source cannot be read and
    /// [`Error::Io`] if writing to `out` fails.
    pub(crate) fn write_base64(&mut self, out: &mut impl Write) -> Result<()> {
        let mut encoder = EncoderWriter::new(LineSplitter::with_default_length(out), &STANDARD);

        let retained = match &mut self.source {
            Source::Pending(reader) => {
                let mut retained = Vec::new();
                match stream_source(reader.as_mut(), &mut encoder, &mut retained, &self.filename) {
                    Ok(()) => retained,
                    Err(err) => {
                        self.source = match &err {
                            Error::Attachment { source, .. } => {
                                Source::Failed(source.kind(), source.to_string())
                            }
                            // The output failed: keep the whole content so
                            // the next build is complete.
                            _ => match reader.read_to_end(&mut retained) {
                                Ok(_) => Source::Buffered(retained),
                                Err(e) => Source::Failed(e.kind(), e.to_string()),
                            },
                        };
                        return Err(err);
                    }
                }
            }
            Source::Buffered(data) => {
                encoder.write_all(data)?;
                encoder.finish()?;
                return Ok(());
            }
            Source::Failed(kind, message) => {
                return Err(Error::attachment(
                    &self.filename,
                    io::Error::new(*kind, message.clone()),
                ));
            }
        };

        encoder.finish()?;
        tracing::debug!(filename = %self.filename, bytes = retained.len(), "Attachment read");
        self.source = Source::Buffered(retained);
        Ok(())
    }
}

/// Copies `reader` into `encoder`, appending every byte read to `retained`
/// before it is encoded.
fn stream_source<W: Write>(
    reader: &mut dyn Read,
    encoder: &mut EncoderWriter<'_, base64::engine::GeneralPurpose, W>,
    retained: &mut Vec<u8>,
    filename: &str,
) -> Result<()> {
    let mut buf = [0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::attachment(filename, e)),
        };
        retained.extend_from_slice(&buf[..n]);
        encoder.write_all(&buf[..n])?;
    }

    Ok(())
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.source {
            Source::Pending(_) => "pending",
            Source::Buffered(_) => "read",
            Source::Failed(..) => "failed",
        };
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("source", &state)
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts how many times the reader reaches end of input.
    struct CountingReader {
        inner: Cursor<Vec<u8>>,
        eofs: Arc<AtomicUsize>,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.inner.read(buf)?;
            if n == 0 {
                self.eofs.fetch_add(1, Ordering::SeqCst);
            }
            Ok(n)
        }
    }

    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
    }

    #[test]
    fn test_encodes_lazily() {
        let mut attachment = Attachment::new("test.txt", Cursor::new(b"test".to_vec()));
        assert!(!attachment.is_read());

        let mut out = Vec::new();
        attachment.write_base64(&mut out).unwrap();
        assert_eq!(out, b"dGVzdA==");
        assert!(attachment.is_read());
    }

    #[test]
    fn test_source_read_once_and_reused() {
        let eofs = Arc::new(AtomicUsize::new(0));
        let reader = CountingReader {
            inner: Cursor::new(vec![7u8; 500]),
            eofs: Arc::clone(&eofs),
        };
        let mut attachment = Attachment::new("blob.bin", reader);

        let mut first = Vec::new();
        attachment.write_base64(&mut first).unwrap();
        let mut second = Vec::new();
        attachment.write_base64(&mut second).unwrap();

        assert_eq!(first, second);
        assert_eq!(eofs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_read_error_names_attachment() {
        let mut attachment = Attachment::new("secret.pdf", BrokenReader);
        let err = attachment.write_base64(&mut Vec::new()).unwrap_err();
        match err {
            Error::Attachment { filename, source } => {
                assert_eq!(filename, "secret.pdf");
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected error: {other}"),
        }

        // The failure sticks; the reader is never polled again.
        let err = attachment.write_base64(&mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Attachment { .. }));
    }

    /// Accepts `capacity` bytes, then fails every write.
    struct FailingSink {
        capacity: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.capacity == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
            }
            let n = self.capacity.min(buf.len());
            self.capacity -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_output_failure_keeps_full_content() {
        use base64::Engine;

        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let mut attachment = Attachment::new("large.bin", Cursor::new(data.clone()));

        let err = attachment
            .write_base64(&mut FailingSink { capacity: 600 })
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(attachment.is_read());

        let mut out = Vec::new();
        attachment.write_base64(&mut out).unwrap();
        let joined: Vec<u8> = out.into_iter().filter(|b| *b != b'\r' && *b != b'\n').collect();
        assert_eq!(STANDARD.decode(joined).unwrap(), data);
    }

    #[test]
    fn test_from_bytes_folds_lines() {
        let mut attachment = Attachment::from_bytes("zeros.bin", vec![0u8; 120]);
        let mut out = Vec::new();
        attachment.write_base64(&mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.split("\r\n").collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 76);
        assert_eq!(lines[1].len(), 76);
        assert_eq!(lines[2].len(), 8);
    }

    #[test]
    fn test_quoted_filename() {
        let attachment = Attachment::from_bytes("we\"ird\\\r\nname.txt", Vec::new());
        assert_eq!(attachment.quoted_filename(), "we\\\"ird\\\\name.txt");
    }

    #[test]
    fn test_debug_hides_content() {
        let attachment = Attachment::from_bytes("a.txt", b"hidden".to_vec());
        let debug = format!("{attachment:?}");
        assert!(debug.contains("a.txt"));
        assert!(!debug.contains("hidden"));
    }
}
