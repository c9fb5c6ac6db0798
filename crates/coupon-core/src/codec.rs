//! Streaming decompression of source files (gzip, Zstd, LZ4 frame)

use std::io::{self, BufRead, BufReader, Read};

use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const LZ4_FRAME_MAGIC: [u8; 4] = [0x04, 0x22, 0x4d, 0x18];

/// Compression applied to a source stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Detect from magic bytes; unrecognized streams are rejected
    #[default]
    Auto,
    /// gzip, including concatenated members
    Gzip,
    /// Zstandard frame stream
    Zstd,
    /// LZ4 frame format
    Lz4,
    /// Plain text
    None,
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Compression::Auto => "auto",
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
            Compression::Lz4 => "lz4",
            Compression::None => "none",
        };
        f.write_str(name)
    }
}

/// Identify the compression format from the leading bytes of a stream.
pub fn detect(head: &[u8]) -> Option<Compression> {
    if head.starts_with(&GZIP_MAGIC) {
        Some(Compression::Gzip)
    } else if head.starts_with(&ZSTD_MAGIC) {
        Some(Compression::Zstd)
    } else if head.starts_with(&LZ4_FRAME_MAGIC) {
        Some(Compression::Lz4)
    } else {
        None
    }
}

/// Wrap `reader` in an incremental decoder.
///
/// Returns the decoder and the format actually used. With
/// [`Compression::Auto`] the first bytes are peeked, not consumed.
pub fn decoder<R>(reader: R, compression: Compression) -> io::Result<(Box<dyn Read + Send>, Compression)>
where
    R: Read + Send + 'static,
{
    let mut buffered = BufReader::new(reader);
    let format = match compression {
        Compression::Auto => {
            let head = buffered.fill_buf()?;
            detect(head).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    "unrecognized compression format",
                )
            })?
        }
        explicit => explicit,
    };

    let decoded: Box<dyn Read + Send> = match format {
        Compression::Gzip => Box::new(MultiGzDecoder::new(buffered)),
        Compression::Zstd => Box::new(zstd::stream::read::Decoder::with_buffer(buffered)?),
        Compression::Lz4 => Box::new(lz4_flex::frame::FrameDecoder::new(buffered)),
        Compression::None | Compression::Auto => Box::new(buffered),
    };
    Ok((decoded, format))
}
