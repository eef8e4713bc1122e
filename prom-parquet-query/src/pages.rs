//! Paged column view: intersects a row-group's page offset index with a
//! `SelectionResult`, producing an ascending stream of `(page_offset,
//! row_range)` pairs so the projection engine reads only the pages that
//! can contribute a picked row.

use crate::selection::{RowRange, SelectionResult};

/// Our own stand-in for `parquet::file::page_index::offset_index::PageLocation`
/// plus the row count derived from consecutive `first_row_index` values -
/// kept separate from the `parquet` crate's type so the walk below is
/// independently testable without constructing real Parquet metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLocation {
    pub offset: i64,
    pub compressed_size: i32,
    pub first_row_index: i64,
}

/// One page intersected with the selection: the byte offset of the page
/// that must be read, the picked row range (relative to the row group)
/// inside it, and which page in the offset index it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageSelection {
    pub page_offset: i64,
    pub page_index: usize,
    pub row_range: RowRange,
}

/// Walks a row group's page locations against a `SelectionResult`,
/// emitting one `PageSelection` per overlapping (page, pick) pair.
pub fn select_pages(
    locations: &[PageLocation],
    num_rows: u64,
    selection: &SelectionResult,
) -> Vec<PageSelection> {
    let mut out = Vec::new();
    if locations.is_empty() {
        return out;
    }
    let picks = selection.picks();
    let mut page_idx = 0usize;
    let mut pick_idx = 0usize;

    let page_range = |i: usize| -> RowRange {
        let from = locations[i].first_row_index as u64;
        let to = if i + 1 < locations.len() {
            locations[i + 1].first_row_index as u64
        } else {
            num_rows
        };
        RowRange::pick(from, to)
    };

    while page_idx < locations.len() && pick_idx < picks.len() {
        let page_span = page_range(page_idx);
        let pick = picks[pick_idx];
        if pick.overlaps(&page_span) {
            let intersected = pick.intersect(&page_span);
            if !intersected.is_empty() {
                out.push(PageSelection {
                    page_offset: locations[page_idx].offset,
                    page_index: page_idx,
                    row_range: intersected,
                });
            }
        }
        if pick.before(&page_span) {
            pick_idx += 1;
        } else {
            page_idx += 1;
        }
    }
    out
}

/// `(min(page_offset), max(page_offset) + its compressed size)` across the
/// selected pages - used to size the `Section` reservation for a column.
pub fn offset_range(locations: &[PageLocation], selections: &[PageSelection]) -> Option<(u64, u64)> {
    selections
        .iter()
        .map(|s| {
            let loc = &locations[s.page_index];
            (loc.offset as u64, (loc.offset + loc.compressed_size as i64) as u64)
        })
        .reduce(|(min_from, max_to), (from, to)| (min_from.min(from), max_to.max(to)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locs(first_rows: &[i64]) -> Vec<PageLocation> {
        first_rows
            .iter()
            .enumerate()
            .map(|(i, &fr)| PageLocation {
                offset: (i as i64) * 100,
                compressed_size: 100,
                first_row_index: fr,
            })
            .collect()
    }

    #[test]
    fn single_page_single_pick() {
        let locations = locs(&[0]);
        let selection = SelectionResult::new(vec![RowRange::pick(1, 2)]);
        let pages = select_pages(&locations, 3, &selection);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_offset, 0);
        assert_eq!(pages[0].row_range, RowRange::pick(1, 2));
    }

    #[test]
    fn cross_page_multi_row() {
        // pages of 4 and 3 rows: [pick(3,6)] spans both.
        let locations = locs(&[0, 4]);
        let selection = SelectionResult::new(vec![RowRange::pick(3, 6)]);
        let pages = select_pages(&locations, 7, &selection);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].row_range, RowRange::pick(3, 4));
        assert_eq!(pages[0].page_index, 0);
        assert_eq!(pages[1].row_range, RowRange::pick(4, 6));
        assert_eq!(pages[1].page_index, 1);
    }

    #[test]
    fn heterogeneous_page_sizes() {
        // page sizes [1,3,4,3,1] => first_row_index [0,1,4,8,11], total 12
        let locations = locs(&[0, 1, 4, 8, 11]);
        let selection = SelectionResult::new(vec![
            RowRange::pick(3, 6),
            RowRange::pick(8, 10),
            RowRange::pick(11, 12),
        ]);
        let pages = select_pages(&locations, 12, &selection);
        assert_eq!(
            pages,
            vec![
                PageSelection { page_offset: 100, page_index: 1, row_range: RowRange::pick(3, 4) },
                PageSelection { page_offset: 200, page_index: 2, row_range: RowRange::pick(4, 6) },
                PageSelection { page_offset: 300, page_index: 3, row_range: RowRange::pick(8, 10) },
                PageSelection { page_offset: 400, page_index: 4, row_range: RowRange::pick(11, 12) },
            ]
        );
    }

    #[test]
    fn offset_range_spans_selected_pages() {
        let locations = locs(&[0, 4, 8]);
        let selection = SelectionResult::new(vec![RowRange::pick(3, 9)]);
        let pages = select_pages(&locations, 10, &selection);
        let (from, to) = offset_range(&locations, &pages).unwrap();
        assert_eq!(from, 0);
        assert_eq!(to, 300);
    }
}
