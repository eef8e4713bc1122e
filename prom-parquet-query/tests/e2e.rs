//! End-to-end coverage of the concrete seed scenarios and the
//! whole-crate properties they exercise: algebra idempotence, selection
//! totality, section reuse/ref-count safety, and batch alignment.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arrow_array::{ArrayRef, Int64Array};
use prom_parquet_core::errors::Result;
use prom_parquet_query::io::reader::Reader;
use prom_parquet_query::options::{ProjectionOptions, ScannerOptions, SectionLoaderOptions};
use prom_parquet_query::pages::PageLocation;
use prom_parquet_query::predicate::{BloomFilter, PageStats, PageValues, Predicate};
use prom_parquet_query::projection::{Batch, ColumnPageReader, ColumnProjection, Projection};
use prom_parquet_query::scanner::{RowGroupSource, Scanner};
use prom_parquet_query::section::{Section, SectionLoader};
use prom_parquet_query::selection::{RowRange, RowSelection, SelectionResult};
use tokio_util::sync::CancellationToken;

fn v(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

fn locs(first_rows: &[i64]) -> Vec<PageLocation> {
    first_rows
        .iter()
        .enumerate()
        .map(|(i, &fr)| PageLocation {
            offset: i as i64 * 1000,
            compressed_size: 1000,
            first_row_index: fr,
        })
        .collect()
}

struct Plain(Vec<Vec<u8>>);
impl PageValues for Plain {
    fn values(&self) -> &[Vec<u8>] {
        &self.0
    }
}

struct Column {
    locations: Vec<PageLocation>,
    stats: Vec<PageStats>,
    values: Vec<Vec<u8>>,
}

struct FakeRowGroup {
    num_rows: u64,
    columns: Vec<Column>,
}

impl RowGroupSource for FakeRowGroup {
    fn num_rows(&self) -> u64 {
        self.num_rows
    }
    fn locations(&self, column: usize) -> &[PageLocation] {
        &self.columns[column].locations
    }
    fn stats(&self, column: usize) -> &[PageStats] {
        &self.columns[column].stats
    }
    fn bloom(&self, _column: usize) -> Option<&dyn BloomFilter> {
        None
    }
    fn decode_pages(&self, column: usize, _survivors: &SelectionResult) -> Vec<Box<dyn PageValues>> {
        vec![Box::new(Plain(self.columns[column].values.clone()))]
    }
}

/// Scenario 2: single row across three pages of 3 rows each.
/// `ColumnA = "val2" ∧ ColumnB = "val5" ∧ ColumnA ≥ "val1"` picks row 4.
#[test]
fn seed_scenario_single_row_across_three_pages() {
    let col_a_values = vec![
        v("val1"), v("val1"), v("val1"),
        v("val2"), v("val2"), v("val2"),
        v("val3"), v("val3"), v("val3"),
    ];
    let col_b_values = vec![
        v("val1"), v("val2"), v("val3"),
        v("val4"), v("val5"), v("val6"),
        v("val1"), v("val2"), v("val3"),
    ];
    let rg = FakeRowGroup {
        num_rows: 9,
        columns: vec![
            Column {
                locations: locs(&[0, 3, 6]),
                stats: vec![
                    PageStats { min: v("val1"), max: v("val1") },
                    PageStats { min: v("val2"), max: v("val2") },
                    PageStats { min: v("val3"), max: v("val3") },
                ],
                values: col_a_values,
            },
            Column {
                locations: locs(&[0, 3, 6]),
                stats: vec![
                    PageStats { min: v("val1"), max: v("val3") },
                    PageStats { min: v("val4"), max: v("val6") },
                    PageStats { min: v("val1"), max: v("val3") },
                ],
                values: col_b_values,
            },
        ],
    };
    let scanner = Scanner::new(
        vec![
            Predicate::Equals { column: 0, value: v("val2") },
            Predicate::Equals { column: 1, value: v("val5") },
            Predicate::GreaterEq { column: 0, value: v("val1") },
        ],
        vec![0, 1],
        ScannerOptions::with_defaults(),
    );
    let results = scanner.select(&[rg]);
    assert_eq!(results[0].picks(), &[RowRange::pick(4, 5)]);
}

/// Scenario 4: pages of 4 and 3 rows; `ColumnA ≥ "val2" ∧ ColumnB = "val2"`.
#[test]
fn seed_scenario_cross_page_multi_row() {
    let col_a_values = vec![
        v("val1"), v("val1"), v("val2"), v("val2"),
        v("val2"), v("val2"), v("val2"),
    ];
    let col_b_values = vec![
        v("val1"), v("val1"), v("val2"), v("val2"),
        v("val2"), v("val2"), v("val1"),
    ];
    let rg = FakeRowGroup {
        num_rows: 7,
        columns: vec![
            Column {
                locations: locs(&[0, 4]),
                stats: vec![
                    PageStats { min: v("val1"), max: v("val2") },
                    PageStats { min: v("val2"), max: v("val2") },
                ],
                values: col_a_values,
            },
            Column {
                locations: locs(&[0, 4]),
                stats: vec![
                    PageStats { min: v("val1"), max: v("val2") },
                    PageStats { min: v("val1"), max: v("val2") },
                ],
                values: col_b_values,
            },
        ],
    };
    let scanner = Scanner::new(
        vec![
            Predicate::GreaterEq { column: 0, value: v("val2") },
            Predicate::Equals { column: 1, value: v("val2") },
        ],
        vec![0, 1],
        ScannerOptions::with_defaults(),
    );
    let results = scanner.select(&[rg]);
    assert_eq!(results[0].picks(), &[RowRange::pick(3, 6)]);
}

/// Algebra idempotence + selection totality, checked against the scanner's
/// own output rather than re-deriving the algebra by hand.
#[test]
fn algebra_idempotence_and_selection_totality_hold_for_scanner_output() {
    let rg = FakeRowGroup {
        num_rows: 6,
        columns: vec![Column {
            locations: locs(&[0, 3]),
            stats: vec![
                PageStats { min: v("a"), max: v("c") },
                PageStats { min: v("a"), max: v("c") },
            ],
            values: vec![v("a"), v("b"), v("c"), v("a"), v("b"), v("c")],
        }],
    };
    let scanner = Scanner::new(
        vec![Predicate::Equals { column: 0, value: v("b") }],
        vec![0],
        ScannerOptions::with_defaults(),
    );
    let result = &scanner.select(&[rg])[0];
    let picked: u64 = result.picks().iter().map(|r| r.len()).sum();
    let skipped = 6 - picked;
    assert_eq!(picked + skipped, 6);

    let skips = RowSelection::new(
        result
            .picks()
            .iter()
            .map(|p| RowRange::skip(p.from(), p.to()))
            .collect(),
    );
    let once = skips.merged_with(&RowSelection::empty());
    let twice = once.merged_with(&RowSelection::empty());
    assert_eq!(once, twice);
}

struct CountingReader {
    data: Vec<u8>,
    range_reads: Arc<AtomicUsize>,
}

impl Reader for CountingReader {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        self.range_reads.fetch_add(1, Ordering::SeqCst);
        buf.copy_from_slice(&self.data[offset as usize..offset as usize + buf.len()]);
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

/// Scenario 6: two projections over the same column-offset span reuse the
/// same materialized section, issuing exactly one range of reads against
/// the backing reader, and releasing both handles leaves no cache file.
#[test]
fn seed_scenario_section_reuse_and_ref_count_safety() {
    let dir = tempfile::tempdir().unwrap();
    let range_reads = Arc::new(AtomicUsize::new(0));
    let reader = Arc::new(CountingReader {
        data: vec![9u8; 4096],
        range_reads: range_reads.clone(),
    });
    let options = SectionLoaderOptions::with_defaults()
        .set_backing_store(prom_parquet_query::options::SectionBackingStore::Disk(
            dir.path().to_path_buf(),
        ))
        .set_read_ahead_pad(0);
    let loader = SectionLoader::new(reader, 4096, options, CancellationToken::new());

    let a = loader.new_section(0, 2048).unwrap();
    let b = loader.new_section(0, 1024).unwrap();
    a.load_all().unwrap();

    assert_eq!(a.from(), b.from());
    assert_eq!(a.to(), b.to());
    assert_eq!(range_reads.load(Ordering::SeqCst), 1);

    drop(a);
    drop(b);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

struct FixedPage(ArrayRef);
impl ColumnPageReader for FixedPage {
    fn read_page(&mut self, _section: &Section, _page_offset: i64, _page_index: usize) -> Result<ArrayRef> {
        Ok(self.0.clone())
    }
}

/// Batch alignment: a `Projection` over two differently-shaped columns
/// still yields equal-length column vectors per batch.
#[test]
fn batch_alignment_holds_across_columns() {
    let dir = tempfile::tempdir().unwrap();
    let reader = Arc::new(vec![0u8; 64]);
    let loader = SectionLoader::new(reader, 64, SectionLoaderOptions::with_defaults(), CancellationToken::new());
    let section = loader.new_section(0, 64).unwrap();

    let locations = locs(&[0]);
    let selection = SelectionResult::new(vec![RowRange::pick(0, 3)]);

    let col_a = ColumnProjection::new(
        locations.clone(),
        3,
        selection.clone(),
        section.clone(),
        Box::new(FixedPage(Arc::new(Int64Array::from(vec![1, 2, 3])))),
    );
    let col_b = ColumnProjection::new(
        locations,
        3,
        selection,
        section,
        Box::new(FixedPage(Arc::new(Int64Array::from(vec![10, 20, 30])))),
    );

    let mut projection = Projection::new(vec![col_a, col_b], 8192, ProjectionOptions::with_defaults());
    let batch: Batch = projection.next_batch().unwrap().expect("one batch expected");
    assert!(batch.is_aligned());
    assert_eq!(batch.num_rows(), 3);
}
