//! Predicate evaluators: phase-1 bloom/statistics rejection
//! (`select_rows`) and phase-2 row-level confirmation on survivors
//! (`filter_rows`).

use crate::pages::{select_pages, PageLocation, PageSelection};
use crate::selection::{RowRange, RowSelection};

/// Per-page min/max, parallel to a column chunk's `PageLocation`s.
#[derive(Clone, Debug)]
pub struct PageStats {
    pub min: Vec<u8>,
    pub max: Vec<u8>,
}

/// Distinct-value membership test over a column chunk. Implemented over
/// `parquet::bloom_filter::Sbbf` at the metadata-conversion seam; tests
/// here use a plain `HashSet`.
pub trait BloomFilter {
    fn check(&self, value: &[u8]) -> bool;
}

/// Decoded contents of one data page, however it was physically encoded.
/// Dictionary-encoded pages expose `dictionary()`/`indices()`; anything
/// else exposes only `values()`. Supplied by the physical decode layer
/// (the projection engine's column reader), so predicate evaluation stays
/// independent of Parquet's on-disk encodings.
pub trait PageValues {
    fn values(&self) -> &[Vec<u8>];
    fn dictionary(&self) -> Option<&[Vec<u8>]> {
        None
    }
    fn indices(&self) -> Option<&[i32]> {
        None
    }
}

#[derive(Clone, Debug)]
pub enum Predicate {
    Equals { column: usize, value: Vec<u8> },
    GreaterEq { column: usize, value: Vec<u8> },
    LessEq { column: usize, value: Vec<u8> },
}

impl Predicate {
    pub fn column(&self) -> usize {
        match self {
            Predicate::Equals { column, .. }
            | Predicate::GreaterEq { column, .. }
            | Predicate::LessEq { column, .. } => *column,
        }
    }

    /// Phase 1: page-level rejection using bloom filters and min/max
    /// statistics, with no decoding.
    pub fn select_rows(
        &self,
        locations: &[PageLocation],
        stats: &[PageStats],
        num_rows: u64,
        bloom: Option<&dyn BloomFilter>,
    ) -> RowSelection {
        let mut skips = RowSelection::empty();
        match self {
            Predicate::Equals { value, .. } => {
                if let Some(bloom) = bloom {
                    if !bloom.check(value) {
                        skips.push(RowRange::skip(0, num_rows));
                        return skips;
                    }
                }
                for (i, s) in stats.iter().enumerate() {
                    if value.as_slice() < s.min.as_slice() || value.as_slice() > s.max.as_slice() {
                        skips.push(page_row_range(locations, i, num_rows));
                    }
                }
            }
            Predicate::GreaterEq { value, .. } => {
                for (i, s) in stats.iter().enumerate() {
                    if value.as_slice() > s.max.as_slice() {
                        skips.push(page_row_range(locations, i, num_rows));
                    }
                }
            }
            Predicate::LessEq { value, .. } => {
                for (i, s) in stats.iter().enumerate() {
                    if value.as_slice() < s.min.as_slice() {
                        skips.push(page_row_range(locations, i, num_rows));
                    }
                }
            }
        }
        skips
    }

    /// Phase 2: row-level confirmation on the rows phase 1 let through.
    /// `pages` is indexed the same way as `locations`/`stats` - one entry
    /// per page in the column chunk, decoded on demand.
    pub fn filter_rows<P: PageValues>(
        &self,
        locations: &[PageLocation],
        num_rows: u64,
        survivors: &crate::selection::SelectionResult,
        pages: &[P],
    ) -> RowSelection {
        let mut skips = RowSelection::empty();
        let page_selections = select_pages(locations, num_rows, survivors);
        for sel in &page_selections {
            let page = &pages[sel.page_index];
            let page_first_row = locations[sel.page_index].first_row_index as u64;
            match (page.dictionary(), page.indices()) {
                (Some(dict), Some(indices)) => {
                    skips.push_many(self.filter_dictionary_page(sel, page_first_row, dict, indices));
                }
                _ => {
                    skips.push_many(self.filter_decoding_page(sel, page_first_row, page.values()));
                }
            }
        }
        skips
    }

    fn matches(&self, value: &[u8]) -> bool {
        match self {
            Predicate::Equals { value: v, .. } => value == v.as_slice(),
            Predicate::GreaterEq { value: v, .. } => value >= v.as_slice(),
            Predicate::LessEq { value: v, .. } => value <= v.as_slice(),
        }
    }

    fn filter_dictionary_page(
        &self,
        sel: &PageSelection,
        page_first_row: u64,
        dict: &[Vec<u8>],
        indices: &[i32],
    ) -> Vec<RowRange> {
        if let Predicate::Equals { value, .. } = self {
            let needle = dict.iter().position(|d| d == value).map(|i| i as i32);
            let Some(needle) = needle else {
                return vec![RowRange::skip(sel.row_range.from(), sel.row_range.to())];
            };
            return coalesce_skips(sel, page_first_row, indices, |row| {
                indices[row] != needle
            });
        }
        coalesce_skips(sel, page_first_row, indices, |row| {
            let value = &dict[indices[row] as usize];
            !self.matches(value)
        })
    }

    fn filter_decoding_page(
        &self,
        sel: &PageSelection,
        page_first_row: u64,
        values: &[Vec<u8>],
    ) -> Vec<RowRange> {
        coalesce_skips(sel, page_first_row, values, |row| !self.matches(&values[row]))
    }
}

/// Builds the skip ranges for rows in `sel.row_range` that fail `reject`,
/// coalescing consecutive failing rows into a single range. `indexable` is
/// only used to bound the loop; the actual lookup happens inside `reject`.
fn coalesce_skips<T>(
    sel: &PageSelection,
    page_first_row: u64,
    indexable: &[T],
    reject: impl Fn(usize) -> bool,
) -> Vec<RowRange> {
    let _ = indexable;
    let mut out = Vec::new();
    let from_in_page = (sel.row_range.from() - page_first_row) as usize;
    let to_in_page = (sel.row_range.to() - page_first_row) as usize;
    let mut run_start: Option<usize> = None;
    for row in from_in_page..to_in_page {
        if reject(row) {
            run_start.get_or_insert(row);
        } else if let Some(start) = run_start.take() {
            out.push(RowRange::skip(
                page_first_row + start as u64,
                page_first_row + row as u64,
            ));
        }
    }
    if let Some(start) = run_start {
        out.push(RowRange::skip(
            page_first_row + start as u64,
            page_first_row + to_in_page as u64,
        ));
    }
    out
}

fn page_row_range(locations: &[PageLocation], page_index: usize, num_rows: u64) -> RowRange {
    let from = locations[page_index].first_row_index as u64;
    let to = if page_index + 1 < locations.len() {
        locations[page_index + 1].first_row_index as u64
    } else {
        num_rows
    };
    RowRange::skip(from, to)
}

impl RowSelection {
    pub fn push_many(&mut self, ranges: Vec<RowRange>) {
        for r in ranges {
            self.push(r);
        }
    }
}

impl PageValues for Box<dyn PageValues> {
    fn values(&self) -> &[Vec<u8>] {
        (**self).values()
    }

    fn dictionary(&self) -> Option<&[Vec<u8>]> {
        (**self).dictionary()
    }

    fn indices(&self) -> Option<&[i32]> {
        (**self).indices()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct SetBloom(HashSet<Vec<u8>>);
    impl BloomFilter for SetBloom {
        fn check(&self, value: &[u8]) -> bool {
            self.0.contains(value)
        }
    }

    struct PlainPage(Vec<Vec<u8>>);
    impl PageValues for PlainPage {
        fn values(&self) -> &[Vec<u8>] {
            &self.0
        }
    }

    fn locs(first_rows: &[i64]) -> Vec<PageLocation> {
        first_rows
            .iter()
            .enumerate()
            .map(|(i, &fr)| PageLocation {
                offset: i as i64 * 100,
                compressed_size: 100,
                first_row_index: fr,
            })
            .collect()
    }

    fn v(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    #[test]
    fn seed_scenario_single_page_single_predicate() {
        // rows: val1/val1, val1/val2, val1/val3 in one page; predicate col_b = val2
        let locations = locs(&[0]);
        let stats = vec![PageStats {
            min: v("val1"),
            max: v("val3"),
        }];
        let pred = Predicate::Equals {
            column: 1,
            value: v("val2"),
        };
        let phase1 = pred.select_rows(&locations, &stats, 3, None);
        let interim = phase1.invert(3);

        let pages = vec![PlainPage(vec![v("val1"), v("val2"), v("val3")])];
        let phase2 = pred.filter_rows(&locations, 3, &interim, &pages);
        let merged = phase1.merged_with(&phase2);
        let result = merged.invert(3);
        assert_eq!(result.picks(), &[RowRange::pick(1, 2)]);
    }

    #[test]
    fn seed_scenario_disjoint_picks_inside_one_page() {
        // col_b values: val1, val2, val1; predicate col_b = val1
        let locations = locs(&[0]);
        let stats = vec![PageStats {
            min: v("val1"),
            max: v("val2"),
        }];
        let pred = Predicate::Equals {
            column: 1,
            value: v("val1"),
        };
        let phase1 = pred.select_rows(&locations, &stats, 3, None);
        let interim = phase1.invert(3);
        let pages = vec![PlainPage(vec![v("val1"), v("val2"), v("val1")])];
        let phase2 = pred.filter_rows(&locations, 3, &interim, &pages);
        let result = phase1.merged_with(&phase2).invert(3);
        assert_eq!(
            result.picks(),
            &[RowRange::pick(0, 1), RowRange::pick(2, 3)]
        );
    }

    #[test]
    fn bloom_absence_skips_whole_row_group() {
        let locations = locs(&[0]);
        let stats = vec![PageStats {
            min: v("val1"),
            max: v("val9"),
        }];
        let bloom = SetBloom(HashSet::from([v("val1"), v("val2")]));
        let pred = Predicate::Equals {
            column: 0,
            value: v("missing"),
        };
        let selection = pred.select_rows(&locations, &stats, 10, Some(&bloom));
        assert_eq!(selection.skips(), &[RowRange::skip(0, 10)]);
    }

    #[test]
    fn greater_eq_rejects_pages_below_value() {
        let locations = locs(&[0, 3]);
        let stats = vec![
            PageStats { min: v("a"), max: v("b") },
            PageStats { min: v("c"), max: v("d") },
        ];
        let pred = Predicate::GreaterEq {
            column: 0,
            value: v("c"),
        };
        let selection = pred.select_rows(&locations, &stats, 6, None);
        assert_eq!(selection.skips(), &[RowRange::skip(0, 3)]);
    }

    #[test]
    fn dictionary_filter_rejects_non_matching_index() {
        struct DictPage {
            dict: Vec<Vec<u8>>,
            indices: Vec<i32>,
        }
        impl PageValues for DictPage {
            fn values(&self) -> &[Vec<u8>] {
                &[]
            }
            fn dictionary(&self) -> Option<&[Vec<u8>]> {
                Some(&self.dict)
            }
            fn indices(&self) -> Option<&[i32]> {
                Some(&self.indices)
            }
        }
        let locations = locs(&[0]);
        let pred = Predicate::Equals {
            column: 0,
            value: v("b"),
        };
        let page = DictPage {
            dict: vec![v("a"), v("b")],
            indices: vec![0, 1, 0, 1],
        };
        let survivors = crate::selection::SelectionResult::new(vec![RowRange::pick(0, 4)]);
        let skips = pred.filter_rows(&locations, 4, &survivors, &[page]);
        let result = skips.invert(4);
        assert_eq!(result.picks(), &[RowRange::pick(1, 2), RowRange::pick(3, 4)]);
    }
}
