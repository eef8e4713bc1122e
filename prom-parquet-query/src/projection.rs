//! Paged projection engine: parallel, batched column reads over a
//! `SelectionResult`, plus the `ValuePool`/`Unique`/`Concurrent` helpers
//! from §4.6.

use std::collections::HashSet;
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Mutex;

use arrow_array::{Array, ArrayRef};
use arrow_array::cast::AsArray;
use arrow_schema::DataType;
use prom_parquet_core::errors::{Error, Result};
use tokio_util::sync::CancellationToken;

use crate::options::ProjectionOptions;
use crate::pages::{select_pages, PageLocation};
use crate::section::Section;
use crate::selection::SelectionResult;

/// Reusable batch slabs. `get` grows the pool only when it's empty; `put`
/// always returns the slab rather than deallocating it - mirrors the
/// original's mutex-protected `valuesPool`.
pub struct ValuePool {
    capacity: usize,
    free: Mutex<Vec<Vec<ArrayRef>>>,
}

impl ValuePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            free: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self) -> Vec<ArrayRef> {
        self.free
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.capacity))
    }

    pub fn put(&self, mut slab: Vec<ArrayRef>) {
        slab.clear();
        self.free.lock().unwrap().push(slab);
    }
}

/// A decoded, sliced page ready to contribute rows to a batch.
pub trait ColumnPageReader: Send {
    /// Decodes the page at `page_offset`/`page_index`, returning an array
    /// covering the page's full row range; the caller slices it down to
    /// the selected `row_range`.
    fn read_page(&mut self, section: &Section, page_offset: i64, page_index: usize) -> Result<ArrayRef>;
}

/// Column-aligned, equal-length value vectors for one batch.
pub struct Batch {
    pub columns: Vec<ArrayRef>,
}

impl Batch {
    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Batch alignment invariant: every column has the same length.
    pub fn is_aligned(&self) -> bool {
        let len = self.num_rows();
        self.columns.iter().all(|c| c.len() == len)
    }
}

/// One column's share of a projection: its page locations, the rows
/// picked for it, the section its pages live in, and the decoder that
/// turns page bytes into an Arrow array.
pub struct ColumnProjection {
    locations: Vec<PageLocation>,
    num_rows: u64,
    selection: SelectionResult,
    section: Section,
    reader: Box<dyn ColumnPageReader>,
    cursor: usize,
}

impl ColumnProjection {
    pub fn new(
        locations: Vec<PageLocation>,
        num_rows: u64,
        selection: SelectionResult,
        section: Section,
        reader: Box<dyn ColumnPageReader>,
    ) -> Self {
        Self {
            locations,
            num_rows,
            selection,
            section,
            reader,
            cursor: 0,
        }
    }

    fn next_batch(&mut self, batch_size: usize) -> Result<Option<ArrayRef>> {
        let page_selections = select_pages(&self.locations, self.num_rows, &self.selection);
        if self.cursor >= page_selections.len() {
            return Ok(None);
        }
        let mut pieces: Vec<ArrayRef> = Vec::new();
        let mut collected = 0usize;
        while self.cursor < page_selections.len() && collected < batch_size {
            let sel = &page_selections[self.cursor];
            let page_first_row = self.locations[sel.page_index].first_row_index as u64;
            let array = self
                .reader
                .read_page(&self.section, sel.page_offset, sel.page_index)?;
            let start = (sel.row_range.from() - page_first_row) as usize;
            let len = sel.row_range.len() as usize;
            pieces.push(array.slice(start, len));
            collected += len;
            self.cursor += 1;
        }
        if pieces.is_empty() {
            return Ok(None);
        }
        if pieces.len() == 1 {
            return Ok(Some(pieces.remove(0)));
        }
        let refs: Vec<&dyn Array> = pieces.iter().map(|a| a.as_ref()).collect();
        Ok(Some(arrow::compute::concat(&refs)?))
    }
}

/// Drives one `ColumnProjection` per requested column, reading up to
/// `concurrency` of them at a time (one thread per column within a group)
/// for each `next_batch` call.
pub struct Projection {
    columns: Vec<ColumnProjection>,
    pool: ValuePool,
    batch_size: usize,
    concurrency: usize,
}

impl Projection {
    pub fn new(columns: Vec<ColumnProjection>, batch_size: usize, options: ProjectionOptions) -> Self {
        Self {
            columns,
            pool: ValuePool::new(options.value_pool_capacity()),
            batch_size,
            concurrency: options.concurrency().max(1),
        }
    }

    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        let batch_size = self.batch_size;
        let concurrency = self.concurrency;
        log::debug!(
            "projecting batch: {} columns, concurrency {concurrency}",
            self.columns.len()
        );
        let mut results: Vec<Result<Option<ArrayRef>>> = Vec::with_capacity(self.columns.len());
        for group in self.columns.chunks_mut(concurrency) {
            let mut group_results = std::thread::scope(|scope| {
                let handles: Vec<_> = group
                    .iter_mut()
                    .map(|col| scope.spawn(move || col.next_batch(batch_size)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().expect("column projection task panicked"))
                    .collect::<Vec<_>>()
            });
            results.append(&mut group_results);
        }

        let mut slab = self.pool.get();
        for r in results {
            match r? {
                Some(array) => slab.push(array),
                None => {
                    self.pool.put(slab);
                    return Ok(None);
                }
            }
        }
        let batch = Batch { columns: slab };
        if !batch.is_aligned() {
            return Err(Error::Corrupt(
                "projected columns disagree on row count".into(),
            ));
        }
        Ok(Some(batch))
    }

    pub fn release(&self, batch: Batch) {
        self.pool.put(batch.columns);
    }
}

/// Deduplicates rows of the wrapped projection by the value of one key
/// column, keeping the first occurrence of each key across batches.
pub struct Unique {
    inner: Projection,
    key_column: usize,
    seen: HashSet<Vec<u8>>,
}

impl Unique {
    pub fn new(inner: Projection, key_column: usize) -> Self {
        Self {
            inner,
            key_column,
            seen: HashSet::new(),
        }
    }

    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        loop {
            let Some(batch) = self.inner.next_batch()? else {
                return Ok(None);
            };
            let key_array = &batch.columns[self.key_column];
            let mut keep = Vec::with_capacity(batch.num_rows());
            for row in 0..batch.num_rows() {
                let key = row_key(key_array.as_ref(), row);
                if self.seen.insert(key) {
                    keep.push(row as u32);
                }
            }
            if keep.is_empty() {
                continue;
            }
            let indices = arrow_array::UInt32Array::from(keep);
            let columns = batch
                .columns
                .iter()
                .map(|c| arrow::compute::take(c.as_ref(), &indices, None).map_err(Error::from))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Some(Batch { columns }));
        }
    }
}

fn row_key(array: &dyn Array, row: usize) -> Vec<u8> {
    if array.is_null(row) {
        return vec![];
    }
    match array.data_type() {
        DataType::Int64 => array.as_primitive::<arrow_array::types::Int64Type>().value(row).to_le_bytes().to_vec(),
        DataType::Utf8 => array.as_string::<i32>().value(row).as_bytes().to_vec(),
        DataType::Dictionary(_, _) => {
            let dict = array.as_any_dictionary();
            let values = dict.values();
            let key = dict.normalized_keys()[row];
            row_key(values.as_ref(), key)
        }
        _ => format!("{:?}", array.as_any()).into_bytes(),
    }
}

/// Runs a producer thread ahead of the consumer, buffering up to
/// `buffer_size` batches.
pub struct Concurrent {
    rx: Receiver<Result<Batch>>,
}

impl Concurrent {
    pub fn new(mut projection: Projection, buffer_size: usize, cancellation: CancellationToken) -> Self {
        let (tx, rx) = sync_channel(buffer_size);
        std::thread::spawn(move || loop {
            if cancellation.is_cancelled() {
                log::debug!("projection producer thread cancelled");
                return;
            }
            match projection.next_batch() {
                Ok(Some(batch)) => {
                    if tx.send(Ok(batch)).is_err() {
                        log::debug!("projection consumer dropped, stopping producer thread");
                        return;
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    log::warn!("projection producer thread failed: {e}");
                    let _ = tx.send(Err(e));
                    return;
                }
            }
        });
        Self { rx }
    }

    pub fn next_batch(&self) -> Result<Option<Batch>> {
        match self.rx.recv() {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }
}
