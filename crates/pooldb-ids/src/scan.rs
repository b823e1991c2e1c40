//! Gap scanning.
//!
//! Given every id in a column in ascending order, find the lowest `amount`
//! non-negative ids that are absent:
//!
//! ```text
//! column:  0 1 2 . . 5 6 . . 9
//! amount:  3
//! found:         3 4     7
//! ```
//!
//! Gaps between consecutive values are filled first; if the column runs out
//! before `amount` ids are found, the rest continue past the largest value.
//! Reading stops as soon as enough ids are collected.

use futures_core::Stream;
use futures_util::StreamExt;
use hashbrown::HashSet;

use crate::error::AllocError;

/// Result of a completed scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Free ids, ascending.
    pub ids: Vec<i64>,
    /// Reserved ids that turned out to be present in the column.
    pub seen_reserved: Vec<i64>,
}

/// Incremental gap finder over an ascending sequence of column values.
///
/// Ids in `reserved` are treated as occupied even when the column lacks
/// them. Negative values, repeats and out-of-order values are ignored.
#[derive(Debug)]
pub struct GapScanner<'r> {
    amount: usize,
    reserved: &'r HashSet<i64>,
    /// Largest value fed so far; -1 before the first.
    last: i64,
    found: Vec<i64>,
    seen_reserved: Vec<i64>,
}

impl<'r> GapScanner<'r> {
    /// Start a scan for `amount` free ids.
    #[must_use]
    pub fn new(amount: usize, reserved: &'r HashSet<i64>) -> Self {
        Self {
            amount,
            reserved,
            last: -1,
            found: Vec::with_capacity(amount),
            seen_reserved: Vec::new(),
        }
    }

    /// Whether `amount` ids have been found.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.found.len() >= self.amount
    }

    /// Feed the next column value.
    pub fn feed(&mut self, value: i64) {
        if self.is_complete() || value <= self.last {
            return;
        }
        if self.reserved.contains(&value) {
            self.seen_reserved.push(value);
        }

        let mut candidate = self.last + 1;
        while candidate < value && !self.is_complete() {
            self.take(candidate);
            candidate += 1;
        }
        self.last = value;
    }

    /// Finish the scan, continuing past the largest value fed if needed.
    pub fn finish(mut self) -> Result<ScanOutcome, AllocError> {
        let mut next = self.last.checked_add(1);
        while !self.is_complete() {
            let Some(candidate) = next else {
                return Err(AllocError::Exhausted);
            };
            self.take(candidate);
            next = candidate.checked_add(1);
        }

        Ok(ScanOutcome {
            ids: self.found,
            seen_reserved: self.seen_reserved,
        })
    }

    fn take(&mut self, candidate: i64) {
        if !self.reserved.contains(&candidate) {
            self.found.push(candidate);
        }
    }
}

/// Drive a [`GapScanner`] over an ascending id stream.
///
/// Stops pulling from `ids` once `amount` free ids are found.
pub async fn scan_gaps<S>(
    mut ids: S,
    amount: usize,
    reserved: &HashSet<i64>,
) -> Result<ScanOutcome, AllocError>
where
    S: Stream<Item = pooldb_client::Result<i64>> + Unpin,
{
    let mut scanner = GapScanner::new(amount, reserved);
    while !scanner.is_complete() {
        match ids.next().await {
            Some(value) => scanner.feed(value?),
            None => break,
        }
    }
    scanner.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn scan(values: &[i64], amount: usize) -> Vec<i64> {
        scan_reserved(values, amount, &HashSet::new()).ids
    }

    fn scan_reserved(values: &[i64], amount: usize, reserved: &HashSet<i64>) -> ScanOutcome {
        let mut scanner = GapScanner::new(amount, reserved);
        for &value in values {
            scanner.feed(value);
        }
        scanner.finish().unwrap()
    }

    #[test]
    fn test_gaps_filled_lowest_first() {
        assert_eq!(scan(&[0, 1, 2, 5, 6, 9], 3), vec![3, 4, 7]);
    }

    #[test]
    fn test_continues_past_maximum() {
        assert_eq!(scan(&[0, 1, 2], 3), vec![3, 4, 5]);
        assert_eq!(scan(&[0, 1, 2, 5, 6, 9], 6), vec![3, 4, 7, 8, 10, 11]);
    }

    #[test]
    fn test_empty_column_starts_at_zero() {
        assert_eq!(scan(&[], 4), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_leading_gap() {
        assert_eq!(scan(&[3, 4], 2), vec![0, 1]);
    }

    #[test]
    fn test_zero_amount() {
        assert!(scan(&[0, 5], 0).is_empty());
    }

    #[test]
    fn test_negative_and_repeated_values_ignored() {
        assert_eq!(scan(&[-5, -1, 0, 0, 1, 1, 3], 2), vec![2, 4]);
    }

    #[test]
    fn test_reserved_ids_skipped() {
        let reserved: HashSet<i64> = [3, 10].into_iter().collect();
        let outcome = scan_reserved(&[0, 1, 2, 5], 3, &reserved);
        assert_eq!(outcome.ids, vec![4, 6, 7]);
        assert!(outcome.seen_reserved.is_empty());
    }

    #[test]
    fn test_reserved_ids_found_in_column_are_reported() {
        let reserved: HashSet<i64> = [1, 4].into_iter().collect();
        let outcome = scan_reserved(&[0, 1, 2, 4], 2, &reserved);
        assert_eq!(outcome.ids, vec![3, 5]);
        assert_eq!(outcome.seen_reserved, vec![1, 4]);
    }

    #[test]
    fn test_values_near_the_top_of_the_range() {
        let reserved = HashSet::new();
        let mut scanner = GapScanner::new(2, &reserved);
        scanner.feed(i64::MAX - 1);
        assert!(scanner.is_complete());
        assert_eq!(scanner.finish().unwrap().ids, vec![0, 1]);

        let reserved: HashSet<i64> = [1].into_iter().collect();
        let mut scanner = GapScanner::new(1, &reserved);
        for value in [0, i64::MAX] {
            scanner.feed(value);
        }
        assert_eq!(scanner.finish().unwrap().ids, vec![2]);
    }

    #[tokio::test]
    async fn test_scan_gaps_stops_reading_early() {
        let values = vec![0, 1, 2, 5, 6, 9, 12, 20];
        let mut pulled = 0;
        let ids = stream::iter(values.into_iter().map(Ok)).inspect(|_| pulled += 1);

        let outcome = scan_gaps(ids, 3, &HashSet::new()).await.unwrap();
        assert_eq!(outcome.ids, vec![3, 4, 7]);
        assert_eq!(pulled, 6);
    }

    #[tokio::test]
    async fn test_scan_gaps_propagates_read_error() {
        let ids = stream::iter(vec![
            Ok(0),
            Err(pooldb_client::Error::unreachable("db", "reset")),
            Ok(5),
        ]);

        let err = scan_gaps(ids, 3, &HashSet::new()).await.unwrap_err();
        assert!(err.is_unreachable());
    }
}
