//! Shared-Tier Payload Compression
//!
//! Tile payloads are JSON and compress well, so values bound for the
//! shared tier are LZ4-framed when it pays off. Every stored payload
//! starts with a one-byte algorithm tag so readers never guess.
//!
//! ```text
//! +------+---------------------------+
//! | tag  | body (raw or LZ4 block)   |
//! +------+---------------------------+
//!   0x00 = none, 0x01 = lz4 (size-prefixed block)
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported payload encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Stored as-is
    None,
    /// LZ4 block with size prefix
    #[default]
    Lz4,
}

impl CompressionAlgorithm {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Lz4 => "lz4",
        }
    }

    fn tag(&self) -> u8 {
        match self {
            CompressionAlgorithm::None => 0x00,
            CompressionAlgorithm::Lz4 => 0x01,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(CompressionAlgorithm::None),
            0x01 => Some(CompressionAlgorithm::Lz4),
            _ => None,
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Shared-tier compression settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompressionConfig {
    /// Algorithm used for payloads at or above `min_size_bytes`
    pub algorithm: CompressionAlgorithm,
    /// Smaller payloads are stored uncompressed
    pub min_size_bytes: usize,
    /// LZ4 high-compression level
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Lz4,
            min_size_bytes: 512,
            level: 3,
        }
    }
}

/// Frames payloads for the shared tier
#[derive(Debug, Clone, Default)]
pub struct PayloadCodec {
    config: CompressionConfig,
}

impl PayloadCodec {
    /// Create a codec with custom config
    pub fn with_config(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// Get configuration
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Encode a payload. Falls back to the uncompressed frame when
    /// compression fails or does not shrink the payload.
    pub fn encode(&self, data: &[u8]) -> Bytes {
        let algorithm = if data.len() < self.config.min_size_bytes {
            CompressionAlgorithm::None
        } else {
            self.config.algorithm
        };

        if algorithm == CompressionAlgorithm::Lz4 {
            match self.lz4_compress(data) {
                Ok(compressed) if compressed.len() < data.len() => {
                    return frame(CompressionAlgorithm::Lz4, &compressed);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Compression failed, storing uncompressed: {}", e),
            }
        }

        frame(CompressionAlgorithm::None, data)
    }

    /// Decode a framed payload
    pub fn decode(&self, framed: &[u8]) -> Result<Bytes> {
        let (&tag, body) = framed.split_first().ok_or_else(|| Error::DecompressionFailed {
            algorithm: "unknown".into(),
            reason: "empty payload".into(),
        })?;

        match CompressionAlgorithm::from_tag(tag) {
            Some(CompressionAlgorithm::None) => Ok(Bytes::copy_from_slice(body)),
            Some(CompressionAlgorithm::Lz4) => lz4::block::decompress(body, None)
                .map(Bytes::from)
                .map_err(|e| Error::DecompressionFailed {
                    algorithm: "lz4".into(),
                    reason: e.to_string(),
                }),
            None => Err(Error::DecompressionFailed {
                algorithm: format!("tag {:#04x}", tag),
                reason: "unknown algorithm tag".into(),
            }),
        }
    }

    /// Algorithm recorded in a framed payload
    pub fn algorithm_of(framed: &[u8]) -> Option<CompressionAlgorithm> {
        framed.first().copied().and_then(CompressionAlgorithm::from_tag)
    }

    fn lz4_compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(self.config.level)),
            true,
        )
        .map_err(|e| Error::CompressionFailed {
            algorithm: "lz4".into(),
            reason: e.to_string(),
        })
    }
}

fn frame(algorithm: CompressionAlgorithm, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(body.len() + 1);
    buf.put_u8(algorithm.tag());
    buf.put_slice(body);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile_json(items: usize) -> Vec<u8> {
        let items: Vec<String> = (0..items)
            .map(|i| format!(r#"{{"id":"farm-{}","lat":51.5,"lng":-0.12,"category":"dairy"}}"#, i))
            .collect();
        format!("[{}]", items.join(",")).into_bytes()
    }

    #[test]
    fn test_large_payload_is_compressed() {
        let codec = PayloadCodec::default();
        let data = tile_json(50);

        let framed = codec.encode(&data);
        assert_eq!(
            PayloadCodec::algorithm_of(&framed),
            Some(CompressionAlgorithm::Lz4)
        );
        assert!(framed.len() < data.len());
        assert_eq!(codec.decode(&framed).unwrap().as_ref(), data.as_slice());
    }

    #[test]
    fn test_small_payload_stored_raw() {
        let codec = PayloadCodec::default();
        let framed = codec.encode(b"[]");

        assert_eq!(framed.as_ref(), b"\x00[]");
        assert_eq!(codec.decode(&framed).unwrap().as_ref(), b"[]");
    }

    #[test]
    fn test_disabled_compression() {
        let codec = PayloadCodec::with_config(CompressionConfig {
            algorithm: CompressionAlgorithm::None,
            ..Default::default()
        });
        let data = tile_json(50);
        let framed = codec.encode(&data);
        assert_eq!(
            PayloadCodec::algorithm_of(&framed),
            Some(CompressionAlgorithm::None)
        );
        assert_eq!(framed.len(), data.len() + 1);
    }

    #[test]
    fn test_incompressible_payload_stored_raw() {
        let codec = PayloadCodec::with_config(CompressionConfig {
            min_size_bytes: 0,
            ..Default::default()
        });
        let data: Vec<u8> = (0..64u32).map(|i| (i.wrapping_mul(197) ^ 0x5a) as u8).collect();
        let framed = codec.encode(&data);
        assert_eq!(codec.decode(&framed).unwrap().as_ref(), data.as_slice());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = PayloadCodec::default();
        assert!(codec.decode(&[]).is_err());
        assert!(codec.decode(&[0x7f, 1, 2, 3]).is_err());
        assert!(codec.decode(&[0x01, 0xff, 0xff]).is_err());
    }
}
