//! Deflate-family compression of whole payloads

use crate::config::{CompressionConfig, CompressionFormat};
use crate::error::{Error, Result};
use flate2::Compression;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use std::io::{Read, Write};

/// Stateless payload compressor; cheap to clone into every worker
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    format: CompressionFormat,
    level: Compression,
}

impl Compressor {
    pub fn new(format: CompressionFormat, level: u32) -> Self {
        Self {
            format,
            level: Compression::new(level.min(9)),
        }
    }

    pub fn from_config(config: &CompressionConfig) -> Self {
        Self::new(config.format, config.level)
    }

    pub fn format(&self) -> CompressionFormat {
        self.format
    }

    /// Compress `data` into a complete, self-terminated stream
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        // Raw sensor payloads usually shrink well; start at half size
        let out = Vec::with_capacity(data.len() / 2 + 64);
        let compressed = match self.format {
            CompressionFormat::Gzip => {
                let mut encoder = GzEncoder::new(out, self.level);
                encoder.write_all(data).map_err(compression_error)?;
                encoder.finish()
            }
            CompressionFormat::Zlib => {
                let mut encoder = ZlibEncoder::new(out, self.level);
                encoder.write_all(data).map_err(compression_error)?;
                encoder.finish()
            }
            CompressionFormat::Deflate => {
                let mut encoder = DeflateEncoder::new(out, self.level);
                encoder.write_all(data).map_err(compression_error)?;
                encoder.finish()
            }
        };
        compressed.map_err(compression_error)
    }

    /// Inverse of [`compress`](Self::compress), used on the collector side
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 4);
        let result = match self.format {
            CompressionFormat::Gzip => GzDecoder::new(data).read_to_end(&mut out),
            CompressionFormat::Zlib => ZlibDecoder::new(data).read_to_end(&mut out),
            CompressionFormat::Deflate => DeflateDecoder::new(data).read_to_end(&mut out),
        };
        result.map_err(compression_error)?;
        Ok(out)
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::from_config(&CompressionConfig::default())
    }
}

fn compression_error(e: std::io::Error) -> Error {
    Error::Compression(e.to_string())
}
