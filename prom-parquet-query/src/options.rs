use std::path::PathBuf;

use prom_parquet_encoding::FloatColumnCodec;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_BATCH_SIZE: usize = 8192;
pub const DEFAULT_PREFETCH_ROW_GROUPS: usize = 2;
pub const DEFAULT_VALUE_POOL_CAPACITY: usize = 8;
pub const DEFAULT_PROJECTION_CONCURRENCY: usize = 4;
pub const DEFAULT_READ_AHEAD_PAD: u64 = 4 * 1024;
pub const DEFAULT_PREFETCH_CHANNEL_CAPACITY: usize = 16;

/// Where a loaded `Section`'s bytes are materialized.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SectionBackingStore {
    #[default]
    Memory,
    Disk(PathBuf),
}

/// Options governing a single scan: output batch size, how many row groups
/// ahead the scanner prefetches, and the float value column's codec for
/// this file (see `prom_parquet_encoding::FloatColumnCodec`).
#[derive(Clone)]
pub struct ScannerOptions {
    batch_size: usize,
    prefetch_row_groups: usize,
    float_codec: FloatColumnCodec,
    cancellation: CancellationToken,
}

impl ScannerOptions {
    pub fn with_defaults() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            prefetch_row_groups: DEFAULT_PREFETCH_ROW_GROUPS,
            float_codec: FloatColumnCodec::default(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn set_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn set_prefetch_row_groups(mut self, n: usize) -> Self {
        self.prefetch_row_groups = n;
        self
    }

    pub fn set_float_codec(mut self, codec: FloatColumnCodec) -> Self {
        self.float_codec = codec;
        self
    }

    pub fn set_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn build(self) -> Self {
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn prefetch_row_groups(&self) -> usize {
        self.prefetch_row_groups
    }

    pub fn float_codec(&self) -> FloatColumnCodec {
        self.float_codec
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Options for the paged-column projection engine: how many value-pool
/// slabs stay warm and how many columns are read concurrently per batch.
#[derive(Clone)]
pub struct ProjectionOptions {
    value_pool_capacity: usize,
    concurrency: usize,
}

impl ProjectionOptions {
    pub fn with_defaults() -> Self {
        Self {
            value_pool_capacity: DEFAULT_VALUE_POOL_CAPACITY,
            concurrency: DEFAULT_PROJECTION_CONCURRENCY,
        }
    }

    pub fn set_value_pool_capacity(mut self, n: usize) -> Self {
        self.value_pool_capacity = n;
        self
    }

    pub fn set_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn build(self) -> Self {
        self
    }

    pub fn value_pool_capacity(&self) -> usize {
        self.value_pool_capacity
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Options for the section loader: where materialized byte ranges are
/// cached, how much read-ahead padding is added when materializing a
/// range, and the bounded channel capacity for the background prefetcher.
#[derive(Clone)]
pub struct SectionLoaderOptions {
    backing_store: SectionBackingStore,
    read_ahead_pad: u64,
    prefetch_channel_capacity: usize,
}

impl SectionLoaderOptions {
    pub fn with_defaults() -> Self {
        Self {
            backing_store: SectionBackingStore::default(),
            read_ahead_pad: DEFAULT_READ_AHEAD_PAD,
            prefetch_channel_capacity: DEFAULT_PREFETCH_CHANNEL_CAPACITY,
        }
    }

    pub fn set_backing_store(mut self, store: SectionBackingStore) -> Self {
        self.backing_store = store;
        self
    }

    pub fn set_read_ahead_pad(mut self, pad: u64) -> Self {
        self.read_ahead_pad = pad;
        self
    }

    pub fn set_prefetch_channel_capacity(mut self, n: usize) -> Self {
        self.prefetch_channel_capacity = n;
        self
    }

    pub fn build(self) -> Self {
        self
    }

    pub fn backing_store(&self) -> &SectionBackingStore {
        &self.backing_store
    }

    pub fn read_ahead_pad(&self) -> u64 {
        self.read_ahead_pad
    }

    pub fn prefetch_channel_capacity(&self) -> usize {
        self.prefetch_channel_capacity
    }
}

impl Default for SectionLoaderOptions {
    fn default() -> Self {
        Self::with_defaults()
    }
}
