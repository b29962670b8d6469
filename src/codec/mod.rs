//! Compression registry for block payloads.
//!
//! Every block names its own compression in a single header byte, so one
//! store can mix algorithms freely and a reader needs nothing beyond the
//! block header to pick the right decoder. The registry is a closed set:
//! each known id gets a `match` arm here. On the write side an unknown id
//! assigned to a [`Compressor`] falls back to [`CompressionId::Store`] with
//! a warning; the read side treats unknown ids as fatal (see `block.rs`).
//!
//! Levels are abstract (`0` = minimum, `1` = normal, `2` = maximum) and are
//! resolved to each algorithm's native scale once, when the [`Compressor`]
//! is configured, not on every call.

use std::io::{Cursor, Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use thiserror::Error;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Wire id of a compression algorithm, as stored in every block header.
///
/// The numbering has holes: ids 2 and 5 through 8 belonged to algorithms
/// that were retired from the format and are never reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompressionId {
    /// No compression, payload stored verbatim.
    Store = 0,
    /// zlib-wrapped DEFLATE.
    Gzip = 1,
    Lzma = 3,
    Lz4 = 4,
    Brotli = 9,
    Zstd = 10,
}

impl CompressionId {
    pub const ALL: [CompressionId; 6] = [
        CompressionId::Store,
        CompressionId::Gzip,
        CompressionId::Lzma,
        CompressionId::Lz4,
        CompressionId::Brotli,
        CompressionId::Zstd,
    ];

    /// Resolve a wire id. Returns `None` for retired or unassigned ids.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(CompressionId::Store),
            1 => Some(CompressionId::Gzip),
            3 => Some(CompressionId::Lzma),
            4 => Some(CompressionId::Lz4),
            9 => Some(CompressionId::Brotli),
            10 => Some(CompressionId::Zstd),
            _ => None,
        }
    }

    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Human-readable name for diagnostics and the CLI; never parsed
    /// from disk.
    pub fn name(self) -> &'static str {
        match self {
            CompressionId::Store => "store",
            CompressionId::Gzip => "gzip",
            CompressionId::Lzma => "lzma",
            CompressionId::Lz4 => "lz4",
            CompressionId::Brotli => "brotli",
            CompressionId::Zstd => "zstd",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        let name = s.to_lowercase();
        CompressionId::ALL.iter().copied().find(|c| c.name() == name)
    }

    /// Native levels for the three abstract steps, minimum to maximum.
    fn levels(self) -> [i32; 3] {
        match self {
            CompressionId::Store => [0, 0, 0],
            CompressionId::Gzip => [1, 6, 9],
            CompressionId::Lzma => [0, 6, 9],
            CompressionId::Lz4 => [0, 0, 0],
            CompressionId::Brotli => [1, 2, 11],
            CompressionId::Zstd => [1, 3, 22],
        }
    }

    pub fn resolve_level(self, level: Level) -> i32 {
        self.levels()[level as usize]
    }

    /// Display label, e.g. `zstd level=3`.
    pub fn describe(self, level: Level) -> String {
        match self {
            CompressionId::Store | CompressionId::Lz4 => self.name().to_string(),
            _ => format!("{} level={}", self.name(), self.resolve_level(level)),
        }
    }

    pub fn compress(self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        match self {
            CompressionId::Store => Ok(data.to_vec()),
            CompressionId::Gzip => {
                let mut encoder =
                    ZlibEncoder::new(Vec::new(), flate2::Compression::new(level as u32));
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
            CompressionId::Lzma => {
                let mut out = Vec::new();
                lzma_rs::lzma_compress(&mut Cursor::new(data), &mut out)
                    .map_err(|e| CodecError::Compression(e.to_string()))?;
                Ok(out)
            }
            CompressionId::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            CompressionId::Brotli => {
                let quality = level.clamp(0, 11) as u32;
                let mut out = Vec::new();
                {
                    let mut w = brotli::CompressorWriter::new(&mut out, 4096, quality, 22);
                    w.write_all(data)
                        .map_err(|e| CodecError::Compression(e.to_string()))?;
                }
                Ok(out)
            }
            CompressionId::Zstd => {
                zstd::encode_all(data, level).map_err(|e| CodecError::Compression(e.to_string()))
            }
        }
    }

    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            CompressionId::Store => Ok(data.to_vec()),
            CompressionId::Gzip => {
                let mut out = Vec::new();
                ZlibDecoder::new(data)
                    .read_to_end(&mut out)
                    .map_err(|e| CodecError::Decompression(e.to_string()))?;
                Ok(out)
            }
            CompressionId::Lzma => {
                let mut out = Vec::new();
                lzma_rs::lzma_decompress(&mut Cursor::new(data), &mut out)
                    .map_err(|e| CodecError::Decompression(e.to_string()))?;
                Ok(out)
            }
            CompressionId::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| CodecError::Decompression(e.to_string())),
            CompressionId::Brotli => {
                let mut out = Vec::new();
                brotli::Decompressor::new(data, 4096)
                    .read_to_end(&mut out)
                    .map_err(|e| CodecError::Decompression(e.to_string()))?;
                Ok(out)
            }
            CompressionId::Zstd => {
                zstd::decode_all(data).map_err(|e| CodecError::Decompression(e.to_string()))
            }
        }
    }
}

// ── Levels ───────────────────────────────────────────────────────────────────

/// Abstract compression effort, mapped onto each algorithm's own scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Level {
    Minimum = 0,
    Normal = 1,
    Maximum = 2,
}

impl Level {
    /// Out-of-range values quietly normalize to [`Level::Normal`].
    pub fn from_id(id: u8) -> Self {
        match id {
            0 => Level::Minimum,
            2 => Level::Maximum,
            _ => Level::Normal,
        }
    }
}

// ── Write-side holder ────────────────────────────────────────────────────────

/// Write-side compression strategy: an algorithm plus its resolved level.
///
/// Type and level can be reassigned between blocks. An unknown type id
/// degrades to [`CompressionId::Store`] so a writer never fails outright
/// over a configuration value.
#[derive(Debug, Clone)]
pub struct Compressor {
    id: CompressionId,
    level: Level,
    numeric_level: i32,
}

impl Compressor {
    pub fn new(id: u8, level: u8) -> Self {
        let mut compressor = Compressor {
            id: CompressionId::Store,
            level: Level::Normal,
            numeric_level: 0,
        };
        compressor.set_level(level);
        compressor.set_type(id);
        compressor
    }

    pub fn set_type(&mut self, id: u8) {
        self.id = match CompressionId::from_id(id) {
            Some(compression) => compression,
            None => {
                log::warn!("unknown compression id {id}, falling back to store");
                CompressionId::Store
            }
        };
        self.numeric_level = self.id.resolve_level(self.level);
    }

    pub fn set_level(&mut self, level: u8) {
        self.level = Level::from_id(level);
        self.numeric_level = self.id.resolve_level(self.level);
    }

    pub fn id(&self) -> CompressionId {
        self.id
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn describe(&self) -> String {
        self.id.describe(self.level)
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.id.compress(data, self.numeric_level)
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.id.decompress(data)
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Tests ────────────────────────────────────────────────────────────────────
