//! Scanner: composes a row group's predicates into a final `SelectionResult`
//! via two passes of the row-range algebra (§4.1) over phase-1/phase-2
//! skip sets from the predicate evaluators (§4.4).

use itertools::Itertools;

use crate::options::ScannerOptions;
use crate::pages::PageLocation;
use crate::predicate::{BloomFilter, PageStats, PageValues, Predicate};
use crate::selection::{RowSelection, SelectionResult};

/// What the scanner needs from one row group's column chunks: enough to
/// run both predicate phases without the scanner knowing how pages are
/// physically encoded or fetched.
pub trait RowGroupSource {
    fn num_rows(&self) -> u64;
    fn locations(&self, column: usize) -> &[PageLocation];
    fn stats(&self, column: usize) -> &[PageStats];
    fn bloom(&self, column: usize) -> Option<&dyn BloomFilter>;
    fn decode_pages(&self, column: usize, survivors: &SelectionResult) -> Vec<Box<dyn PageValues>>;
}

pub struct Scanner {
    predicates: Vec<Predicate>,
    /// Column ordinals in scan priority (meta columns first, then labels
    /// ascending) - see `schema::predicate_column_priority`.
    column_priority: Vec<usize>,
    options: ScannerOptions,
}

impl Scanner {
    /// `predicates` must already be resolved to valid leaf column indices;
    /// per §4.5 a predicate referencing a column absent from the schema is
    /// dropped before construction (the scanner returns all rows in that
    /// dimension rather than erroring).
    pub fn new(predicates: Vec<Predicate>, column_priority: Vec<usize>, options: ScannerOptions) -> Self {
        let predicates = predicates
            .into_iter()
            .sorted_by_key(|p| {
                column_priority
                    .iter()
                    .position(|&c| c == p.column())
                    .unwrap_or(usize::MAX)
            })
            .collect();
        Self {
            predicates,
            column_priority,
            options,
        }
    }

    pub fn select<S: RowGroupSource>(&self, row_groups: &[S]) -> Vec<SelectionResult> {
        let mut results = Vec::with_capacity(row_groups.len());
        for rg in row_groups {
            if self.options.cancellation().is_cancelled() {
                log::warn!("scan cancelled after {} of {} row groups", results.len(), row_groups.len());
                break;
            }
            results.push(self.select_row_group(rg));
        }
        results
    }

    fn select_row_group<S: RowGroupSource>(&self, source: &S) -> SelectionResult {
        let num_rows = source.num_rows();
        log::debug!("scanning row group: {num_rows} rows, {} predicates", self.predicates.len());
        if self.predicates.is_empty() {
            return RowSelection::empty().invert(num_rows);
        }

        let phase1: Vec<RowSelection> = self
            .predicates
            .iter()
            .map(|p| {
                p.select_rows(
                    source.locations(p.column()),
                    source.stats(p.column()),
                    num_rows,
                    source.bloom(p.column()),
                )
            })
            .collect();
        let phase1_merged = RowSelection::merge(&phase1);
        let interim = phase1_merged.invert(num_rows);

        let phase2: Vec<RowSelection> = self
            .predicates
            .iter()
            .map(|p| {
                let pages = source.decode_pages(p.column(), &interim);
                p.filter_rows(source.locations(p.column()), num_rows, &interim, &pages)
            })
            .collect();
        let phase2_merged = RowSelection::merge(&phase2);

        phase1_merged.merged_with(&phase2_merged).invert(num_rows)
    }
}
