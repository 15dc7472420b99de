//! Decoding of captured child output into UTF-8.
//!
//! Windows programs commonly write the active code page or UTF-16. The
//! pipeline wraps a raw byte stream in a streaming decoder chosen either by
//! name or, for [`TextEncoding::Auto`], by sniffing a byte-order mark. It only
//! ever decodes; input sent to the child is never re-encoded.

use std::fmt;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll, ready};

use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1252};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tracing::trace;

use crate::error::BridgeError;

/// Names accepted by [`TextEncoding::from_str`], as listed in error messages.
pub const SUPPORTED_ENCODINGS: &str = "utf8, cp1252, utf16le, utf16be, auto";

const RAW_CHUNK: usize = 8 * 1024;
const BOM_PEEK: usize = 4;

/// A decoded byte stream handed to the line reader.
pub type DecodedStream = Box<dyn AsyncRead + Send + Unpin>;

/// Output encoding selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    /// Already UTF-8; bytes pass through untouched.
    #[default]
    Utf8,
    /// Windows-1252, also used for `latin1` / `iso-8859-1`.
    Windows1252,
    Utf16Le,
    Utf16Be,
    /// Pick UTF-16LE/BE from a byte-order mark, otherwise pass through.
    Auto,
}

impl TextEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Utf8 => "utf8",
            Self::Windows1252 => "cp1252",
            Self::Utf16Le => "utf16le",
            Self::Utf16Be => "utf16be",
            Self::Auto => "auto",
        }
    }

    pub fn is_passthrough(self) -> bool {
        self == Self::Utf8
    }

    fn fixed_encoding(self) -> Option<&'static Encoding> {
        match self {
            Self::Utf8 | Self::Auto => None,
            Self::Windows1252 => Some(WINDOWS_1252),
            Self::Utf16Le => Some(UTF_16LE),
            Self::Utf16Be => Some(UTF_16BE),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextEncoding {
    type Err = BridgeError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "utf8" | "utf-8" => Ok(Self::Utf8),
            "cp1252" | "windows-1252" | "latin1" | "iso-8859-1" => Ok(Self::Windows1252),
            "utf16le" | "utf-16le" => Ok(Self::Utf16Le),
            "utf16be" | "utf-16be" => Ok(Self::Utf16Be),
            "auto" => Ok(Self::Auto),
            _ => Err(BridgeError::UnsupportedEncoding {
                name: name.to_string(),
            }),
        }
    }
}

/// Wrap `reader` so it yields UTF-8.
///
/// For [`TextEncoding::Auto`] up to four bytes are read to look for a
/// byte-order mark; they are put back in front of the stream, so the decoder
/// consumes the mark itself.
pub async fn wrap<R>(reader: R, encoding: TextEncoding) -> io::Result<DecodedStream>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    match encoding {
        TextEncoding::Utf8 => Ok(Box::new(reader)),
        TextEncoding::Auto => auto_detect(reader).await,
        fixed => match fixed.fixed_encoding() {
            Some(encoding) => Ok(Box::new(DecodingReader::new(reader, encoding))),
            None => Ok(Box::new(reader)),
        },
    }
}

async fn auto_detect<R>(mut reader: R) -> io::Result<DecodedStream>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut head = [0u8; BOM_PEEK];
    let mut filled = 0;
    while filled < 2 {
        let read = reader.read(&mut head[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }

    let peeked = head.get(..filled).unwrap_or_default().to_vec();
    let sniffed = Encoding::for_bom(&peeked).map(|(encoding, _)| encoding);
    let restored = Cursor::new(peeked).chain(reader);

    match sniffed {
        Some(encoding) if encoding != UTF_8 => {
            trace!(encoding = encoding.name(), "byte-order mark detected");
            Ok(Box::new(DecodingReader::new(restored, encoding)))
        }
        _ => Ok(Box::new(restored)),
    }
}

/// Streaming decoder from `encoding` to UTF-8.
pub struct DecodingReader<R> {
    inner: R,
    decoder: Decoder,
    raw: Box<[u8]>,
    decoded: Vec<u8>,
    position: usize,
    finished: bool,
}

impl<R> fmt::Debug for DecodingReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodingReader")
            .field("encoding", &self.decoder.encoding().name())
            .field("buffered", &(self.decoded.len() - self.position))
            .field("finished", &self.finished)
            .finish()
    }
}

impl<R> DecodingReader<R> {
    /// A leading byte-order mark matching `encoding` is dropped by the decoder.
    pub fn new(inner: R, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            decoder: encoding.new_decoder_with_bom_removal(),
            raw: vec![0u8; RAW_CHUNK].into_boxed_slice(),
            decoded: Vec::new(),
            position: 0,
            finished: false,
        }
    }
}

fn decode_into(decoder: &mut Decoder, mut src: &[u8], dst: &mut Vec<u8>, last: bool) {
    loop {
        let capacity = decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or(src.len().saturating_mul(3) + 16);
        let mut out = String::with_capacity(capacity);
        let (result, read, _replaced) = decoder.decode_to_string(src, &mut out, last);
        dst.extend_from_slice(out.as_bytes());
        src = src.get(read..).unwrap_or_default();
        if matches!(result, CoderResult::InputEmpty) {
            return;
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for DecodingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if this.position < this.decoded.len() {
                let available = this.decoded.get(this.position..).unwrap_or_default();
                let take = available.len().min(buf.remaining());
                buf.put_slice(available.get(..take).unwrap_or_default());
                this.position += take;
                return Poll::Ready(Ok(()));
            }
            if this.finished {
                return Poll::Ready(Ok(()));
            }

            this.decoded.clear();
            this.position = 0;

            let mut raw = ReadBuf::new(&mut this.raw);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut raw))?;
            let read = raw.filled().len();
            let last = read == 0;
            let chunk = this.raw.get(..read).unwrap_or_default();
            decode_into(&mut this.decoder, chunk, &mut this.decoded, last);
            if last {
                this.finished = true;
            }
        }
    }
}
