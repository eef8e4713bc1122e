//! Series-set adapter (§4.7): maps projected batches, keyed by series id
//! plus the grouping labels, to a lazy sequence of series.

use std::collections::HashMap;

use arrow_array::cast::AsArray;
use arrow_array::types::Int64Type;
use arrow_array::Array;
use arrow_schema::SchemaRef;
use prom_parquet_core::errors::Result;
use prom_parquet_encoding::{FloatColumnCodec, GorillaDecoder};

use crate::projection::Batch;
use crate::schema::SERIES_ID;

/// Anything that can hand the series-set adapter its next batch -
/// `Projection`, `Unique` and `Concurrent` all fit this shape.
pub trait BatchSource {
    fn next_batch(&mut self) -> Result<Option<Batch>>;
}

impl BatchSource for crate::projection::Projection {
    fn next_batch(&mut self) -> Result<Option<Batch>> {
        crate::projection::Projection::next_batch(self)
    }
}

impl BatchSource for crate::projection::Unique {
    fn next_batch(&mut self) -> Result<Option<Batch>> {
        crate::projection::Unique::next_batch(self)
    }
}

impl BatchSource for crate::projection::Concurrent {
    fn next_batch(&mut self) -> Result<Option<Batch>> {
        crate::projection::Concurrent::next_batch(self)
    }
}

/// One distinct series id seen in the input: its pre-allocated label
/// vector (schema order) and the raw `chunk_bytes` payloads belonging to
/// it. Sample decoding is a later, parallel chunk projection - out of
/// scope here; this only carries the bytes forward.
#[derive(Debug, Clone)]
pub struct Series {
    pub series_id: i64,
    pub labels: Vec<Option<String>>,
    pub chunk_bytes: Vec<Vec<u8>>,
}

impl Series {
    /// Decodes every chunk's `chunk_bytes` payload with `codec` and
    /// concatenates the resulting samples in chunk order.
    pub fn decode_values(&self, codec: FloatColumnCodec) -> Result<Vec<f64>> {
        let mut values = Vec::new();
        for chunk in &self.chunk_bytes {
            match codec {
                FloatColumnCodec::Xor => values.extend(GorillaDecoder::decode(chunk)?),
                FloatColumnCodec::Plain => {
                    for word in chunk.chunks_exact(8) {
                        values.push(f64::from_le_bytes(word.try_into().unwrap()));
                    }
                }
            }
        }
        Ok(values)
    }
}

/// Groups projected rows by `series_id`, assigning label values in schema
/// order to each series' label vector as rows arrive. Series are yielded
/// in the order their id was first seen across batches.
pub struct SeriesSet<B> {
    source: B,
    series_id_col: usize,
    label_cols: Vec<(usize, String)>,
    chunk_bytes_col: Option<usize>,
    order: Vec<i64>,
    by_id: HashMap<i64, Series>,
}

impl<B: BatchSource> SeriesSet<B> {
    pub fn new(source: B, schema: &SchemaRef, chunk_bytes_column: &str) -> Self {
        let series_id_col = schema.index_of(SERIES_ID).expect("schema missing series_id");
        let chunk_bytes_col = schema.index_of(chunk_bytes_column).ok();
        let label_cols = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, f)| {
                *i != series_id_col && Some(*i) != chunk_bytes_col && matches!(
                    f.data_type(),
                    arrow_schema::DataType::Dictionary(_, _) | arrow_schema::DataType::Utf8
                )
            })
            .map(|(i, f)| (i, f.name().clone()))
            .collect();
        Self {
            source,
            series_id_col,
            label_cols,
            chunk_bytes_col,
            order: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    fn absorb(&mut self, batch: &Batch) {
        let id_array = batch.columns[self.series_id_col].as_primitive::<Int64Type>();
        for row in 0..batch.num_rows() {
            let series_id = id_array.value(row);
            let entry = self.by_id.entry(series_id).or_insert_with(|| {
                self.order.push(series_id);
                Series {
                    series_id,
                    labels: vec![None; self.label_cols.len()],
                    chunk_bytes: Vec::new(),
                }
            });
            for (slot, (col, _name)) in self.label_cols.iter().enumerate() {
                let array = &batch.columns[*col];
                if !array.is_null(row) {
                    entry.labels[slot] = Some(label_value(array.as_ref(), row));
                }
            }
            if let Some(col) = self.chunk_bytes_col {
                let array = batch.columns[col].as_binary::<i32>();
                if !array.is_null(row) {
                    entry.chunk_bytes.push(array.value(row).to_vec());
                }
            }
        }
    }

    /// Drains the source fully and returns series in first-seen order.
    pub fn collect(mut self) -> Result<Vec<Series>> {
        while let Some(batch) = self.source.next_batch()? {
            self.absorb(&batch);
        }
        Ok(self
            .order
            .into_iter()
            .map(|id| self.by_id.remove(&id).expect("series id tracked in order"))
            .collect())
    }
}

fn label_value(array: &dyn arrow_array::Array, row: usize) -> String {
    match array.data_type() {
        arrow_schema::DataType::Utf8 => array.as_string::<i32>().value(row).to_string(),
        arrow_schema::DataType::Dictionary(_, _) => {
            let dict = array.as_any_dictionary();
            let key = dict.normalized_keys()[row];
            dict.values().as_string::<i32>().value(key).to_string()
        }
        other => panic!("unsupported label column type: {other:?}"),
    }
}
