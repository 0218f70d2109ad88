//! Line-length-bounded writer.
//!
//! RFC 2045 §6.8 limits base64 body lines to 76 characters. [`LineSplitter`]
//! sits between an encoder and the output and inserts CRLF every time the
//! current line reaches the limit, no matter how the encoder chunks its
//! writes.
//!
//! ```
//! use std::io::Write;
//! use base64::engine::general_purpose::STANDARD;
//! use base64::write::EncoderWriter;
//! use mailcourier_mime::LineSplitter;
//!
//! let mut out = Vec::new();
//! let mut encoder = EncoderWriter::new(LineSplitter::new(&mut out, 76), &STANDARD);
//! encoder.write_all(b"test").unwrap();
//! encoder.finish().unwrap();
//! drop(encoder);
//! assert_eq!(out, b"dGVzdA==");
//! ```

use std::io::{self, Write};

/// Maximum encoded line length for base64 bodies (RFC 2045 §6.8).
pub const MAX_LINE_LENGTH: usize = 76;

const CRLF: &[u8] = b"\r\n";

/// A writer that folds its output into lines of at most `max_len` bytes.
///
/// The position within the current line survives across `write` calls, so
/// the folding is independent of how the input is chunked. A terminator is
/// only written once more content follows a full line; output that ends
/// exactly on a line boundary is left unterminated.
///
/// Nothing is buffered: every fragment goes straight to the inner writer.
#[derive(Debug)]
pub struct LineSplitter<W> {
    inner: W,
    max_len: usize,
    line_len: usize,
    /// Bytes of the pending line terminator already written.
    crlf_sent: usize,
}

impl<W: Write> LineSplitter<W> {
    /// Creates a splitter writing lines of at most `max_len` bytes to `inner`.
    ///
    /// A `max_len` of zero is treated as one.
    #[must_use]
    pub fn new(inner: W, max_len: usize) -> Self {
        Self {
            inner,
            max_len: max_len.max(1),
            line_len: 0,
            crlf_sent: 0,
        }
    }

    /// Creates a splitter using [`MAX_LINE_LENGTH`].
    #[must_use]
    pub fn with_default_length(inner: W) -> Self {
        Self::new(inner, MAX_LINE_LENGTH)
    }
}

impl<W> LineSplitter<W> {
    /// Returns the configured maximum line length.
    #[must_use]
    pub const fn max_len(&self) -> usize {
        self.max_len
    }

    /// Returns the number of bytes written since the last line break.
    #[must_use]
    pub const fn line_position(&self) -> usize {
        self.line_len
    }

    /// Returns a reference to the inner writer.
    #[must_use]
    pub const fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Returns a mutable reference to the inner writer.
    ///
    /// Writing to it directly desynchronizes the line position.
    pub const fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Unwraps the splitter, returning the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> LineSplitter<W> {
    /// Finishes the current line. A terminator cut short by an inner error
    /// is resumed on the next write rather than started again.
    fn write_terminator(&mut self) -> io::Result<()> {
        while self.crlf_sent < CRLF.len() {
            match self.inner.write(&CRLF[self.crlf_sent..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write line terminator",
                    ));
                }
                Ok(n) => self.crlf_sent += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        self.crlf_sent = 0;
        self.line_len = 0;
        Ok(())
    }
}

impl<W: Write> Write for LineSplitter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;

        while !rest.is_empty() {
            if self.line_len >= self.max_len {
                self.write_terminator()?;
            }

            let room = self.max_len - self.line_len;
            let fragment = &rest[..room.min(rest.len())];

            let written = match self.inner.write(fragment) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write line fragment",
                    ));
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            self.line_len += written;
            rest = &rest[written..];
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
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
    use base64::engine::general_purpose::STANDARD;
    use base64::write::EncoderWriter;
    use proptest::prelude::*;

    /// Reference folding: the whole input split at once.
    fn fold(data: &[u8], max_len: usize) -> Vec<u8> {
        data.chunks(max_len).collect::<Vec<_>>().join(CRLF)
    }

    fn encode_folded(chunks: &[&[u8]], max_len: usize) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = EncoderWriter::new(LineSplitter::new(&mut out, max_len), &STANDARD);
            for chunk in chunks {
                encoder.write_all(chunk).unwrap();
            }
            encoder.finish().unwrap();
        }
        out
    }

    /// Accepts up to `capacity` bytes, then fails every write.
    struct FailingSink {
        written: Vec<u8>,
        capacity: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.capacity - self.written.len();
            if room == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
            }
            let n = room.min(buf.len());
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_short_input_is_single_line() {
        let out = encode_folded(&[b"test"], MAX_LINE_LENGTH);
        assert_eq!(out, b"dGVzdA==");
    }

    #[test]
    fn test_209_bytes_fold_into_four_lines() {
        let data: Vec<u8> = (0..209u16).map(|i| (i * 37 + 11) as u8).collect();
        let out = encode_folded(&[&data], MAX_LINE_LENGTH);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.split("\r\n").collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].len(), 76);
        assert_eq!(lines[1].len(), 76);
        assert_eq!(lines[2].len(), 76);
        assert_eq!(lines[3].len(), 280 - 3 * 76);
        assert!(!text.ends_with("\r\n"));
    }

    #[test]
    fn test_exact_line_has_no_terminator() {
        let mut out = Vec::new();
        let mut w = LineSplitter::new(&mut out, 4);
        w.write_all(b"abcd").unwrap();
        assert_eq!(w.line_position(), 4);
        drop(w);
        assert_eq!(out, b"abcd");
    }

    #[test]
    fn test_one_past_limit_breaks_once() {
        let mut out = Vec::new();
        let mut w = LineSplitter::new(&mut out, 4);
        w.write_all(b"abcde").unwrap();
        assert_eq!(w.line_position(), 1);
        drop(w);
        assert_eq!(out, b"abcd\r\ne");
    }

    #[test]
    fn test_position_carries_across_calls() {
        let mut out = Vec::new();
        let mut w = LineSplitter::new(&mut out, 5);
        w.write_all(b"abc").unwrap();
        w.write_all(b"def").unwrap();
        w.write_all(b"ghijk").unwrap();
        w.write_all(b"l").unwrap();
        drop(w);
        assert_eq!(out, b"abcde\r\nfghij\r\nkl");
    }

    #[test]
    fn test_reports_caller_byte_count() {
        let mut out = Vec::new();
        let mut w = LineSplitter::new(&mut out, 3);
        assert_eq!(w.write(b"abcdefgh").unwrap(), 8);
        drop(w);
        assert_eq!(out.len(), 8 + 2 * 2);
    }

    #[test]
    fn test_chunked_writes_stay_within_limit() {
        let s = b"a 21 character string";
        let mut out = Vec::new();
        let mut w = LineSplitter::with_default_length(&mut out);
        for _ in 0..20 {
            assert_eq!(w.write(s).unwrap(), s.len());
        }
        drop(w);

        let expected = fold(&s.repeat(20), MAX_LINE_LENGTH);
        assert_eq!(out, expected);
        for line in String::from_utf8(out).unwrap().split("\r\n") {
            assert!(line.len() <= MAX_LINE_LENGTH);
        }
    }

    #[test]
    fn test_sink_error_keeps_written_prefix() {
        let sink = FailingSink {
            written: Vec::new(),
            capacity: 6,
        };
        let mut w = LineSplitter::new(sink, 4);
        let err = w.write(b"abcdefgh").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        // "abcd" + CRLF fill the sink; nothing of the second line got through.
        assert_eq!(w.get_ref().written, b"abcd\r\n");
        assert_eq!(w.line_position(), 0);
    }

    #[test]
    fn test_sink_error_mid_line() {
        let sink = FailingSink {
            written: Vec::new(),
            capacity: 2,
        };
        let mut w = LineSplitter::new(sink, 4);
        assert!(w.write(b"abcdef").is_err());
        assert_eq!(w.get_ref().written, b"ab");
        assert_eq!(w.line_position(), 2);
    }

    #[test]
    fn test_retry_completes_partial_terminator() {
        let sink = FailingSink {
            written: Vec::new(),
            capacity: 5,
        };
        let mut w = LineSplitter::new(sink, 4);
        assert!(w.write(b"abcde").is_err());
        assert_eq!(w.get_ref().written, b"abcd\r");

        w.get_mut().capacity = 100;
        w.write_all(b"e").unwrap();
        assert_eq!(w.get_ref().written, b"abcd\r\ne");
        assert_eq!(w.line_position(), 1);
    }

    #[test]
    fn test_zero_length_is_clamped() {
        let mut out = Vec::new();
        let mut w = LineSplitter::new(&mut out, 0);
        assert_eq!(w.max_len(), 1);
        w.write_all(b"ab").unwrap();
        drop(w);
        assert_eq!(out, b"a\r\nb");
    }

    proptest! {
        #[test]
        fn prop_chunk_invariance(
            data in proptest::collection::vec(any::<u8>(), 0..2048),
            cuts in proptest::collection::vec(0usize..2048, 0..16),
            max_len in 1usize..120,
        ) {
            let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c % (data.len() + 1)).collect();
            cuts.sort_unstable();

            let mut chunks: Vec<&[u8]> = Vec::new();
            let mut start = 0;
            for cut in cuts {
                chunks.push(&data[start..cut]);
                start = cut;
            }
            chunks.push(&data[start..]);

            let whole = encode_folded(&[&data], max_len);
            let pieces = encode_folded(&chunks, max_len);
            prop_assert_eq!(&whole, &pieces);

            let mut raw = Vec::new();
            {
                let mut w = LineSplitter::new(&mut raw, max_len);
                for chunk in &chunks {
                    w.write_all(chunk).unwrap();
                }
            }
            prop_assert_eq!(raw, fold(&data, max_len));
        }

        #[test]
        fn prop_lines_never_exceed_limit(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            max_len in 1usize..120,
        ) {
            let out = encode_folded(&[&data], max_len);
            let text = String::from_utf8(out).unwrap();
            for line in text.split("\r\n") {
                prop_assert!(line.len() <= max_len);
                prop_assert!(!line.is_empty() || data.is_empty());
            }
        }

        #[test]
        fn prop_round_trip(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            use base64::Engine;

            let out = encode_folded(&[&data], MAX_LINE_LENGTH);
            let joined: Vec<u8> = out.into_iter().filter(|b| *b != b'\r' && *b != b'\n').collect();
            let decoded = STANDARD.decode(joined).unwrap();
            prop_assert_eq!(decoded, data);
        }
    }
}
