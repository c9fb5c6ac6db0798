//! Ingestion pipeline: compressed source → lines → candidate codes → index
//!
//! Each source stream is decoded incrementally and read line by line with a
//! hard cap on line length, so memory stays bounded by the read buffer plus
//! one line regardless of source size. A source that cannot be opened or
//! decoded is reported and skipped; the build carries on with the rest.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::codec::{self, Compression};
use crate::error::{CouponError, Result};
use crate::fingerprint::{fingerprint_normalized, is_well_formed, normalize};
use crate::index::{MembershipIndex, SourceBit, MAX_SOURCES};

/// Fewest sources for which quorum validation is meaningful
pub const MIN_SOURCES: usize = 2;

/// Maximal runs of ASCII letters and digits. Length is checked afterwards so
/// that an over-long run yields nothing rather than a truncated code.
const CODE_TOKEN_PATTERN: &str = "[0-9A-Za-z]+";

fn code_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CODE_TOKEN_PATTERN).expect("code token pattern is valid"))
}

/// A named, independently readable source stream.
pub trait SourceOpener: Send + Sync {
    /// Name used in reports and logs
    fn name(&self) -> &str;

    /// Compression of the opened stream
    fn compression(&self) -> Compression {
        Compression::Auto
    }

    /// Open a fresh raw (still compressed) stream.
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// A source file on the local filesystem
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
    compression: Compression,
}

impl FileSource {
    /// Source named after its path, compression detected from content
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self {
            path,
            name,
            compression: Compression::Auto,
        }
    }

    /// Override the reported name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override compression detection
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

impl SourceOpener for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn compression(&self) -> Compression {
        self.compression
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}

/// An in-memory source, mainly for tests and embedding
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    data: Bytes,
    compression: Compression,
}

impl MemorySource {
    /// Source over `data`, compression detected from content
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            compression: Compression::Auto,
        }
    }

    /// Uncompressed text source
    pub fn plain(name: impl Into<String>, text: impl Into<Bytes>) -> Self {
        Self::new(name, text).with_compression(Compression::None)
    }

    /// Override compression detection
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

impl SourceOpener for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn compression(&self) -> Compression {
        self.compression
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.data.clone())))
    }
}

/// Ingestion tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Lines longer than this many bytes are skipped
    pub max_line_bytes: usize,
    /// Buffer between the decoder and the line splitter
    pub read_buffer_bytes: usize,
    /// Ingest sources on one thread each instead of one after another
    pub parallel: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: 10 * 1024 * 1024,
            read_buffer_bytes: 4 * 1024 * 1024,
            parallel: true,
        }
    }
}

/// Outcome of ingesting one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceStatus {
    /// Stream read to the end
    Ingested,
    /// Stream could not be opened or decoded; codes read before the failure
    /// remain in the index
    Failed(String),
}

/// Per-source ingestion report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReport {
    /// Source name
    pub name: String,
    /// Bit assigned to this source
    pub bit: SourceBit,
    /// Format the stream was decoded as, if decoding started
    pub compression: Option<Compression>,
    /// Whether the source was ingested
    pub status: SourceStatus,
    /// Wall time spent on this source
    pub elapsed: Duration,
    /// Lines read, including skipped ones
    pub lines_read: u64,
    /// Lines skipped for exceeding the byte length cap. Lines are never
    /// decoded as text, so invalid UTF-8 does not cause a skip.
    pub lines_skipped: u64,
    /// Well-formed codes fed into the index (with repeats)
    pub codes_indexed: u64,
}

impl SourceReport {
    fn new(name: &str, bit: SourceBit) -> Self {
        Self {
            name: name.to_string(),
            bit,
            compression: None,
            status: SourceStatus::Ingested,
            elapsed: Duration::ZERO,
            lines_read: 0,
            lines_skipped: 0,
            codes_indexed: 0,
        }
    }

    /// True if the whole stream was read
    pub fn is_ingested(&self) -> bool {
        self.status == SourceStatus::Ingested
    }
}

/// Result of a full index build
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// The frozen membership index
    pub index: Arc<MembershipIndex>,
    /// One report per supplied source, in input order
    pub sources: Vec<SourceReport>,
    /// Wall time of the whole build
    pub total_elapsed: Duration,
    /// Distinct fingerprints in the index
    pub index_size: usize,
}

impl BuildReport {
    /// Number of sources read to the end
    pub fn ingested_count(&self) -> usize {
        self.sources.iter().filter(|s| s.is_ingested()).count()
    }

    /// Elapsed time per source, in input order
    pub fn source_durations(&self) -> Vec<Duration> {
        self.sources.iter().map(|s| s.elapsed).collect()
    }

    /// Fail unless enough sources were ingested for quorum validation.
    ///
    /// Callers must check this before serving.
    pub fn ensure_quorum_capable(&self) -> Result<()> {
        let available = self.ingested_count();
        if available < MIN_SOURCES {
            return Err(CouponError::InsufficientSources {
                required: MIN_SOURCES,
                available,
            });
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Line {
    Complete,
    TooLong,
    Eof,
}

fn append_capped(line: &mut Vec<u8>, overflow: &mut bool, chunk: &[u8], max_len: usize) {
    if *overflow {
        return;
    }
    if line.len() + chunk.len() > max_len {
        *overflow = true;
        line.clear();
    } else {
        line.extend_from_slice(chunk);
    }
}

/// Read the next `\n`-terminated line into `line` without the terminator.
///
/// An over-long line is consumed up to its terminator and reported as
/// [`Line::TooLong`]; at most `max_len` bytes of it are ever buffered.
fn next_line<R: BufRead>(reader: &mut R, line: &mut Vec<u8>, max_len: usize) -> io::Result<Line> {
    line.clear();
    let mut overflow = false;
    let mut started = false;
    loop {
        let (done, used) = {
            let available = match reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(match (started, overflow) {
                    (false, _) => Line::Eof,
                    (true, true) => Line::TooLong,
                    (true, false) => Line::Complete,
                });
            }
            started = true;
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    append_capped(line, &mut overflow, &available[..i], max_len);
                    (true, i + 1)
                }
                None => {
                    append_capped(line, &mut overflow, available, max_len);
                    (false, available.len())
                }
            }
        };
        reader.consume(used);
        if done {
            if overflow {
                return Ok(Line::TooLong);
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Ok(Line::Complete);
        }
    }
}

/// Feed every well-formed code on `line` into the index. Returns the count.
fn index_line(line: &[u8], bit: SourceBit, index: &MembershipIndex) -> u64 {
    let mut indexed = 0;
    for token in code_token_regex().find_iter(line) {
        let Ok(raw) = std::str::from_utf8(token.as_bytes()) else {
            continue;
        };
        let code = normalize(raw);
        if !is_well_formed(&code) {
            continue;
        }
        index.add(fingerprint_normalized(&code), bit);
        indexed += 1;
    }
    indexed
}

fn stream_into(
    source: &dyn SourceOpener,
    bit: SourceBit,
    index: &MembershipIndex,
    config: &IngestConfig,
    report: &mut SourceReport,
) -> Result<()> {
    let raw = source.open().map_err(|e| CouponError::SourceUnavailable {
        source_name: source.name().to_string(),
        reason: e.to_string(),
    })?;
    let decode_err = |e: io::Error| CouponError::Decompression {
        source_name: source.name().to_string(),
        reason: e.to_string(),
    };
    let (decoded, format) = codec::decoder(raw, source.compression()).map_err(decode_err)?;
    report.compression = Some(format);

    let mut reader = BufReader::with_capacity(config.read_buffer_bytes.max(1), decoded);
    let mut line = Vec::new();
    loop {
        match next_line(&mut reader, &mut line, config.max_line_bytes).map_err(decode_err)? {
            Line::Eof => break,
            Line::TooLong => {
                report.lines_read += 1;
                report.lines_skipped += 1;
            }
            Line::Complete => {
                report.lines_read += 1;
                report.codes_indexed += index_line(&line, bit, index);
            }
        }
    }
    Ok(())
}

/// Ingest one source into `index` under `bit`. Never fails: problems are
/// recorded in the returned report.
#[instrument(skip(source, bit, index, config), fields(source = source.name(), bit = bit.position()))]
pub fn ingest_source(
    source: &dyn SourceOpener,
    bit: SourceBit,
    index: &MembershipIndex,
    config: &IngestConfig,
) -> SourceReport {
    let start = Instant::now();
    let mut report = SourceReport::new(source.name(), bit);
    if let Err(e) = stream_into(source, bit, index, config, &mut report) {
        warn!(error = %e, lines_read = report.lines_read, "skipping source");
        report.status = SourceStatus::Failed(e.to_string());
    }
    report.elapsed = start.elapsed();
    if report.is_ingested() {
        info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            lines = report.lines_read,
            codes = report.codes_indexed,
            index_size = index.size(),
            "source indexed"
        );
    }
    debug!(lines_skipped = report.lines_skipped, "over-length lines skipped");
    report
}

/// Build the membership index from 2 or 3 ordered sources.
///
/// Source `i` is recorded under bit `1 << i`. Unreadable sources are skipped
/// and reported; call [`BuildReport::ensure_quorum_capable`] before serving.
/// The returned index is frozen.
#[instrument(skip_all, fields(sources = sources.len(), parallel = config.parallel))]
pub fn build_index(sources: &[Box<dyn SourceOpener>], config: &IngestConfig) -> Result<BuildReport> {
    if sources.len() > MAX_SOURCES {
        return Err(CouponError::TooManySources {
            max: MAX_SOURCES,
            supplied: sources.len(),
        });
    }
    if sources.len() < MIN_SOURCES {
        return Err(CouponError::InsufficientSources {
            required: MIN_SOURCES,
            available: sources.len(),
        });
    }
    let bits = (0..sources.len())
        .map(|p| {
            SourceBit::from_position(p).ok_or(CouponError::TooManySources {
                max: MAX_SOURCES,
                supplied: sources.len(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!("building membership index");
    let start = Instant::now();
    let index = Arc::new(MembershipIndex::new());

    let reports = if config.parallel {
        std::thread::scope(|scope| {
            let handles: Vec<_> = sources
                .iter()
                .zip(&bits)
                .map(|(source, &bit)| {
                    let index = &index;
                    let handle = scope.spawn(move || ingest_source(source.as_ref(), bit, index, config));
                    (source, bit, handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(source, bit, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        warn!(source = source.name(), "ingestion worker panicked");
                        let mut report = SourceReport::new(source.name(), bit);
                        report.status = SourceStatus::Failed("ingestion worker panicked".to_string());
                        report
                    })
                })
                .collect::<Vec<_>>()
        })
    } else {
        sources
            .iter()
            .zip(&bits)
            .map(|(source, &bit)| ingest_source(source.as_ref(), bit, &index, config))
            .collect()
    };

    index.freeze();
    let report = BuildReport {
        index_size: index.size(),
        index,
        sources: reports,
        total_elapsed: start.elapsed(),
    };
    if report.index_size == 0 {
        warn!("membership index built but no coupon codes were found");
    }
    info!(
        index_size = report.index_size,
        ingested = report.ingested_count(),
        total_ms = report.total_elapsed.as_millis() as u64,
        "membership index built"
    );
    Ok(report)
}
