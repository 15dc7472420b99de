use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tracing::warn;

/// Default upper bound on a single captured line.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Result of a bounded line read.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadLineResult {
    Line(Vec<u8>),
    Truncated(Vec<u8>),
    Eof,
}

/// Read one `\n`-terminated line, keeping at most `max_len` bytes of it.
///
/// The rest of an over-long line is consumed and dropped. A final line
/// without a terminator is returned as a line; `Eof` only follows it.
pub async fn read_line_with_limit<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_len: usize,
) -> io::Result<ReadLineResult> {
    buf.clear();
    let mut seen = 0usize;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(if seen == 0 {
                ReadLineResult::Eof
            } else if seen > max_len {
                ReadLineResult::Truncated(buf.clone())
            } else {
                ReadLineResult::Line(buf.clone())
            });
        }

        let (chunk_len, complete) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };

        let room = max_len.saturating_sub(buf.len());
        let keep = chunk_len.min(room);
        buf.extend_from_slice(available.get(..keep).unwrap_or_default());
        seen += chunk_len;
        reader.consume(chunk_len);

        if complete {
            return Ok(if seen > max_len {
                ReadLineResult::Truncated(buf.clone())
            } else {
                ReadLineResult::Line(buf.clone())
            });
        }
    }
}

/// Text accumulated from one child stream, shared with the reader task so a
/// partial capture survives the task being aborted.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    text: Arc<Mutex<String>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_line(&self, line: &[u8]) {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let mut text = self.text.lock();
        text.push_str(&String::from_utf8_lossy(line));
        text.push('\n');
    }

    /// Captured text with exactly one trailing newline removed.
    pub fn snapshot(&self) -> String {
        let text = self.text.lock();
        let text = text.as_str();
        text.strip_suffix('\n').unwrap_or(text).to_string()
    }
}

/// Drain `reader` line by line into `sink` until end of stream.
///
/// Returns the number of lines captured.
pub async fn collect_lines<R>(
    reader: R,
    sink: CaptureBuffer,
    max_line_bytes: usize,
    stream_name: &'static str,
) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut lines = 0usize;

    loop {
        match read_line_with_limit(&mut reader, &mut buf, max_line_bytes).await? {
            ReadLineResult::Line(line) => sink.push_line(&line),
            ReadLineResult::Truncated(line) => {
                warn!(
                    stream = stream_name,
                    max_line_bytes, "captured line exceeded limit and was truncated"
                );
                sink.push_line(&line);
            }
            ReadLineResult::Eof => return Ok(lines),
        }
        lines += 1;
    }
}
