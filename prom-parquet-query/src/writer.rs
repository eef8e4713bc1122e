//! Writer/compactor interface (§4.8): the trait surface the core is
//! handed by the external writer/compactor, plus the block directory
//! layout constants. No implementation - building and compacting parts is
//! out of scope for this core.

use prom_parquet_core::errors::Result;
use prom_parquet_encoding::{FloatColumnCodec, GorillaEncoder};

/// One row to be appended to a part file: the fixed meta columns plus the
/// label values and encoded chunk payload for a single series/chunk.
pub struct Chunk {
    pub series_id: i64,
    pub min_t: i64,
    pub max_t: i64,
    pub labels: Vec<(String, String)>,
    pub chunk_bytes: Vec<u8>,
}

/// Encodes one chunk's sample values into the `chunk_bytes` payload a
/// `BlockWriter` stores, using the file's configured float codec.
pub fn encode_chunk_bytes(values: &[f64], codec: FloatColumnCodec) -> Vec<u8> {
    match codec {
        FloatColumnCodec::Xor => GorillaEncoder::encode(values).to_vec(),
        FloatColumnCodec::Plain => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
    }
}

/// Exposed to the external writer/compactor; the core only needs to know
/// this surface exists, not implement it.
pub trait BlockWriter {
    fn write_chunk(&mut self, chunk: Chunk) -> Result<()>;
    fn close(self) -> Result<()>;
}

/// Block directory layout, e.g. `part.3.parquet` / `part.3.metadata`.
pub fn part_file_name(part: u64) -> String {
    format!("part.{part}.parquet")
}

pub fn part_metadata_file_name(part: u64) -> String {
    format!("part.{part}.metadata")
}

pub const COMPACT_FILE_NAME: &str = "compact.parquet";
pub const COMPACT_METADATA_FILE_NAME: &str = "compact.metadata";
