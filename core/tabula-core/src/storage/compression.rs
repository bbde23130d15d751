//! Compression selection for Parquet table files.
//!
//! | Algorithm | Use Case |
//! |-----------|----------|
//! | Snappy | Default — balanced speed/ratio |
//! | Zstd | Smaller files for archived projects |
//! | None | Debugging/diagnostics |

use parquet::basic::{Compression, ZstdLevel};
use serde::{Deserialize, Serialize};

/// Compression codec used when writing table files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompressionAlgorithm {
    None,
    #[default]
    Snappy,
    Zstd,
}

impl CompressionAlgorithm {
    pub const ALL: &'static [CompressionAlgorithm] = &[
        CompressionAlgorithm::None,
        CompressionAlgorithm::Snappy,
        CompressionAlgorithm::Zstd,
    ];

    /// Convert to the Parquet writer setting.
    pub fn to_parquet_compression(self) -> Compression {
        match self {
            CompressionAlgorithm::None => Compression::UNCOMPRESSED,
            CompressionAlgorithm::Snappy => Compression::SNAPPY,
            CompressionAlgorithm::Zstd => Compression::ZSTD(ZstdLevel::default()),
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Snappy => write!(f, "Snappy"),
            Self::Zstd => write!(f, "ZSTD"),
        }
    }
}
