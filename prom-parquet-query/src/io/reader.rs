use std::sync::{Arc, OnceLock};
use std::{fs::File, os::unix::fs::FileExt};

use futures::executor::block_on;
use lazy_static::lazy_static;
use object_store::path::Path;
use object_store::ObjectStore;
use prom_parquet_core::errors::Result;

lazy_static! {
    static ref RUNTIME: tokio::runtime::Runtime = tokio::runtime::Runtime::new().unwrap();
}

/// Sync byte-range read abstraction over local files and object storage.
/// Everything above this seam (section loader, scanner, projection engine)
/// is written against this trait instead of `object_store`/`std::fs` directly.
pub trait Reader: Send + Sync {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()>;
    fn size(&self) -> Result<u64>;
}

impl Reader for File {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        FileExt::read_exact_at(self, buf, offset).map_err(Into::into)
    }

    fn size(&self) -> Result<u64> {
        File::metadata(self).map(|m| m.len()).map_err(Into::into)
    }
}

impl Reader for Arc<File> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        Reader::read_exact_at(self.as_ref(), buf, offset)
    }

    fn size(&self) -> Result<u64> {
        Reader::size(self.as_ref())
    }
}

impl Reader for [u8] {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        buf.copy_from_slice(&self[offset as usize..(offset as usize + buf.len())]);
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }
}

impl Reader for Vec<u8> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        Reader::read_exact_at(self.as_slice(), buf, offset)
    }

    fn size(&self) -> Result<u64> {
        Reader::size(self.as_slice())
    }
}

/// Bridges the sync `Reader` trait to an async `object_store::ObjectStore`
/// via a background Tokio runtime. File size is assumed stable across a
/// query's lifetime and cached after the first `size()` call.
#[derive(Clone)]
pub struct ObjectStoreReadAt {
    object_store: Arc<dyn ObjectStore>,
    location: Arc<Path>,
    cache_size: OnceLock<u64>,
}

impl ObjectStoreReadAt {
    pub fn new(object_store: Arc<dyn ObjectStore>, location: Arc<Path>) -> Self {
        Self {
            object_store,
            location,
            cache_size: OnceLock::new(),
        }
    }
}

impl Reader for ObjectStoreReadAt {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let start_range = offset as usize;
        let object_store = Arc::clone(&self.object_store);
        let location = self.location.clone();
        let len = buf.len();
        let result = block_on(async move {
            RUNTIME
                .spawn(async move {
                    object_store
                        .get_range(&location, start_range..(start_range + len))
                        .await
                })
                .await
                .unwrap()
        });
        let bytes = result.map_err(|e| {
            log::warn!("object store range read failed for {}: {e}", self.location);
            e
        })?;
        buf.copy_from_slice(bytes.as_ref());
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        if let Some(size) = self.cache_size.get() {
            return Ok(*size);
        }
        log::debug!("fetching object metadata for {}", self.location);
        let object_store = Arc::clone(&self.object_store);
        let location = self.location.clone();
        let meta = block_on(async move {
            RUNTIME
                .spawn(async move { object_store.head(&location).await })
                .await
                .unwrap()
        })?;
        Ok(*self.cache_size.get_or_init(|| meta.size as u64))
    }
}

impl Reader for Arc<ObjectStoreReadAt> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        Reader::read_exact_at(self.as_ref(), buf, offset)
    }

    fn size(&self) -> Result<u64> {
        Reader::size(self.as_ref())
    }
}
