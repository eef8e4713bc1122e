//! Chunk row schema: the fixed meta columns plus one dictionary-encoded
//! string column per known label, and the column ordering the scanner
//! sorts predicates by.

use std::sync::Arc;

use arrow_schema::{DataType, Field, Fields, Schema, SchemaRef};

use crate::common::ColumnIndexSequence;

pub const SERIES_ID: &str = "series_id";
pub const MIN_T: &str = "min_t";
pub const MAX_T: &str = "max_t";
pub const CHUNK_BYTES: &str = "chunk_bytes";
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Builds the Arrow schema for a chunk row: `series_id`, `min_t`, `max_t`,
/// `chunk_bytes`, then one dictionary-encoded `Utf8` field per label -
/// `__name__` first if present, the rest ascending.
pub fn build_schema(labels: &[String]) -> SchemaRef {
    let mut fields = vec![
        Field::new(SERIES_ID, DataType::Int64, false),
        Field::new(MIN_T, DataType::Int64, false),
        Field::new(MAX_T, DataType::Int64, false),
        Field::new(CHUNK_BYTES, DataType::Binary, false),
    ];
    for label in sorted_labels(labels) {
        fields.push(Field::new(
            label,
            DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
            true,
        ));
    }
    Arc::new(Schema::new(Fields::from(fields)))
}

fn sorted_labels(labels: &[String]) -> Vec<String> {
    let mut rest: Vec<String> = labels
        .iter()
        .filter(|l| l.as_str() != METRIC_NAME_LABEL)
        .cloned()
        .collect();
    rest.sort();
    let mut out = Vec::with_capacity(labels.len());
    if labels.iter().any(|l| l == METRIC_NAME_LABEL) {
        out.push(METRIC_NAME_LABEL.to_string());
    }
    out.extend(rest);
    out
}

/// Column ordinals in the priority the scanner applies predicates in:
/// `__name__`, `min_t`, `max_t`, then the remaining label columns
/// ascending by name - the statistically most selective, cheapest-to-check
/// columns first.
pub fn predicate_column_priority(schema: &Schema) -> Vec<usize> {
    let mut meta = Vec::new();
    let mut labels: Vec<(String, usize)> = Vec::new();
    let mut ordinals = ColumnIndexSequence::new_start_from(0);
    for field in schema.fields().iter() {
        let i = ordinals.next_column_index() as usize;
        match field.name().as_str() {
            METRIC_NAME_LABEL => meta.push((0u8, i)),
            MIN_T => meta.push((1u8, i)),
            MAX_T => meta.push((2u8, i)),
            SERIES_ID | CHUNK_BYTES => {}
            name => labels.push((name.to_string(), i)),
        }
    }
    debug_assert_eq!(ordinals.get_current_index() as usize, schema.fields().len());
    meta.sort_by_key(|(rank, _)| *rank);
    labels.sort();
    meta.into_iter()
        .map(|(_, i)| i)
        .chain(labels.into_iter().map(|(_, i)| i))
        .collect()
}
