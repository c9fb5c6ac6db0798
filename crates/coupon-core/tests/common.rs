//! Shared fixtures for coupon-core integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use coupon_core::{Compression, MemorySource, SourceOpener};
use tempfile::TempDir;

/// Route library logs to the test harness once per binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("coupon_core=debug")
        .with_test_writer()
        .try_init();
}

/// gzip-compress a text body
pub fn gzip(text: &str) -> Vec<u8> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(text.as_bytes()).unwrap();
    enc.finish().unwrap()
}

/// Encode a text body in the given format
pub fn encode(text: &str, compression: Compression) -> Vec<u8> {
    match compression {
        Compression::Gzip | Compression::Auto => gzip(text),
        Compression::Zstd => zstd::encode_all(text.as_bytes(), 3).unwrap(),
        Compression::Lz4 => {
            let mut enc = lz4_flex::frame::FrameEncoder::new(Vec::new());
            enc.write_all(text.as_bytes()).unwrap();
            enc.finish().unwrap()
        }
        Compression::None => text.as_bytes().to_vec(),
    }
}

/// gzip in-memory sources from text bodies, in order
pub fn gzip_sources(bodies: &[&str]) -> Vec<Box<dyn SourceOpener>> {
    bodies
        .iter()
        .enumerate()
        .map(|(i, body)| {
            Box::new(MemorySource::new(format!("source{}", i + 1), gzip(body)))
                as Box<dyn SourceOpener>
        })
        .collect()
}

/// Temporary directory holding compressed source files
pub struct SourceDir {
    dir: TempDir,
}

impl SourceDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Write `text` compressed with `compression` and return its path
    pub fn write(&self, file_name: &str, text: &str, compression: Compression) -> PathBuf {
        let path = self.dir.path().join(file_name);
        std::fs::write(&path, encode(text, compression)).unwrap();
        path
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}
