//! Row-range algebra: `Skip`/`Pick` half-open intervals over `[0, N)` and the
//! merge/invert/intersect operations the scanner composes predicates with.

use std::cmp::{max, min};

/// A half-open `[from, to)` interval tagged with its role. Empty when
/// `from == to`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowRange {
    Skip { from: u64, to: u64 },
    Pick { from: u64, to: u64 },
}

impl RowRange {
    pub fn skip(from: u64, to: u64) -> Self {
        RowRange::Skip { from, to }
    }

    pub fn pick(from: u64, to: u64) -> Self {
        RowRange::Pick { from, to }
    }

    pub fn from(&self) -> u64 {
        match self {
            RowRange::Skip { from, .. } | RowRange::Pick { from, .. } => *from,
        }
    }

    pub fn to(&self) -> u64 {
        match self {
            RowRange::Skip { to, .. } | RowRange::Pick { to, .. } => *to,
        }
    }

    pub fn len(&self) -> u64 {
        self.to() - self.from()
    }

    pub fn is_empty(&self) -> bool {
        self.from() == self.to()
    }

    /// `a.before(b) <=> a.to <= b.from`.
    pub fn before(&self, other: &RowRange) -> bool {
        self.to() <= other.from()
    }

    /// `a.overlaps(b) <=> a.to > b.from && b.to > a.from`.
    pub fn overlaps(&self, other: &RowRange) -> bool {
        self.to() > other.from() && other.to() > self.from()
    }

    /// Clips `self` (expected to be a `Pick`) to `range`, returning an empty
    /// pick if they don't overlap.
    pub fn intersect(&self, range: &RowRange) -> RowRange {
        if !self.overlaps(range) {
            return RowRange::pick(self.from(), self.from());
        }
        RowRange::pick(max(self.from(), range.from()), min(self.to(), range.to()))
    }
}

/// A sequence of `Skip` ranges, possibly overlapping and unsorted until
/// `merge` normalizes it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowSelection {
    skips: Vec<RowRange>,
}

impl RowSelection {
    pub fn new(skips: Vec<RowRange>) -> Self {
        Self { skips }
    }

    pub fn empty() -> Self {
        Self { skips: Vec::new() }
    }

    pub fn push(&mut self, range: RowRange) {
        if !range.is_empty() {
            self.skips.push(range);
        }
    }

    pub fn skips(&self) -> &[RowRange] {
        &self.skips
    }

    pub fn is_empty(&self) -> bool {
        self.skips.is_empty()
    }

    /// Concatenates `self` with `other`'s skips, sorts ascending by `from`
    /// (ties by `to`), and folds overlapping/adjacent ranges into their
    /// union. Idempotent: `merge(merge(x)) == merge(x)`.
    pub fn merged_with(&self, other: &RowSelection) -> RowSelection {
        let mut all: Vec<RowRange> = self
            .skips
            .iter()
            .chain(other.skips.iter())
            .copied()
            .filter(|r| !r.is_empty())
            .collect();
        all.sort_by(|a, b| a.from().cmp(&b.from()).then(a.to().cmp(&b.to())));

        let mut merged: Vec<RowRange> = Vec::with_capacity(all.len());
        for r in all {
            match merged.last_mut() {
                Some(RowRange::Skip { from: _, to }) if r.from() <= *to => {
                    *to = max(*to, r.to());
                }
                _ => merged.push(r),
            }
        }
        RowSelection::new(merged)
    }

    pub fn merge(selections: &[RowSelection]) -> RowSelection {
        selections
            .iter()
            .fold(RowSelection::empty(), |acc, s| acc.merged_with(s))
    }

    /// Walks the normalized skip list and emits the complementary pick
    /// ranges within `[0, total_rows)`.
    pub fn invert(&self, total_rows: u64) -> SelectionResult {
        let normalized = self.merged_with(&RowSelection::empty());
        let mut picks = Vec::new();
        let mut cursor = 0u64;
        for s in normalized.skips() {
            if s.from() > cursor {
                picks.push(RowRange::pick(cursor, s.from()));
            }
            cursor = max(cursor, s.to());
        }
        if cursor < total_rows {
            picks.push(RowRange::pick(cursor, total_rows));
        }
        SelectionResult { picks }
    }
}

/// A sequence of non-empty, disjoint, ascending `Pick` ranges tied to one
/// row group. The union of picks is the complement of the merged skip set
/// within `[0, N)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionResult {
    picks: Vec<RowRange>,
}

impl SelectionResult {
    pub fn new(picks: Vec<RowRange>) -> Self {
        Self { picks }
    }

    pub fn empty() -> Self {
        Self { picks: Vec::new() }
    }

    pub fn picks(&self) -> &[RowRange] {
        &self.picks
    }

    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }

    pub fn total_picked(&self) -> u64 {
        self.picks.iter().map(|p| p.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_unions_overlapping_skips() {
        let s = RowSelection::new(vec![
            RowRange::skip(0, 3),
            RowRange::skip(2, 5),
            RowRange::skip(10, 12),
        ]);
        let merged = s.merged_with(&RowSelection::empty());
        assert_eq!(
            merged.skips(),
            &[RowRange::skip(0, 5), RowRange::skip(10, 12)]
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let s = RowSelection::new(vec![RowRange::skip(0, 3), RowRange::skip(2, 5)]);
        let once = s.merged_with(&RowSelection::empty());
        let twice = once.merged_with(&RowSelection::empty());
        assert_eq!(once.skips(), twice.skips());
    }

    #[test]
    fn invert_produces_complement() {
        let s = RowSelection::new(vec![RowRange::skip(2, 4), RowRange::skip(6, 8)]);
        let result = s.invert(10);
        assert_eq!(
            result.picks(),
            &[RowRange::pick(0, 2), RowRange::pick(4, 6), RowRange::pick(8, 10)]
        );
    }

    #[test]
    fn invert_with_no_skips_picks_everything() {
        let s = RowSelection::empty();
        let result = s.invert(5);
        assert_eq!(result.picks(), &[RowRange::pick(0, 5)]);
    }

    #[test]
    fn selection_totality_holds() {
        let s = RowSelection::new(vec![RowRange::skip(1, 3), RowRange::skip(5, 6)]);
        let merged = s.merged_with(&RowSelection::empty());
        let result = merged.invert(10);
        let skip_len: u64 = merged.skips().iter().map(|r| r.len()).sum();
        assert_eq!(result.total_picked() + skip_len, 10);
    }

    #[test]
    fn intersect_clips_to_overlap() {
        let pick = RowRange::pick(2, 8);
        let page = RowRange::pick(5, 10);
        assert_eq!(pick.intersect(&page), RowRange::pick(5, 8));

        let disjoint = RowRange::pick(0, 2);
        assert!(pick.intersect(&disjoint).is_empty());
    }

    #[test]
    fn before_and_overlaps_are_consistent() {
        let a = RowRange::pick(0, 3);
        let b = RowRange::pick(3, 6);
        assert!(a.before(&b));
        assert!(!a.overlaps(&b));

        let c = RowRange::pick(2, 5);
        assert!(a.overlaps(&c));
        assert!(!a.before(&c));
    }
}
