//! crates/manga_progress_core/src/merge.rs
//!
//! Reconciliation rules for combining a local and a remote copy of the ledger.

use crate::domain::{BookmarkSet, HistoryLedger};

/// Union of both sets: local ids first, then remote ids not seen locally.
/// A merge never drops an id.
pub fn merge_bookmarks(local: &BookmarkSet, remote: &BookmarkSet) -> BookmarkSet {
    local.iter().chain(remote.iter()).collect()
}

/// Union of both ledgers, one entry per manga, keeping whichever entry was
/// read last. On equal `lastReadAt` the remote entry wins.
pub fn merge_history(local: &HistoryLedger, remote: &HistoryLedger, capacity: usize) -> HistoryLedger {
    let entries = remote
        .entries()
        .iter()
        .chain(local.entries())
        .cloned()
        .collect();
    HistoryLedger::from_entries(entries, capacity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DisplayMeta, HistoryEntry, DEFAULT_HISTORY_CAPACITY};

    fn ledger(entries: &[(&str, &str, i64)]) -> HistoryLedger {
        HistoryLedger::from_entries(
            entries
                .iter()
                .map(|(m, c, t)| HistoryEntry::new(*m, *c, *t, DisplayMeta::default()))
                .collect(),
            DEFAULT_HISTORY_CAPACITY,
        )
    }

    fn members(set: &BookmarkSet) -> Vec<&str> {
        let mut ids: Vec<_> = set.iter().collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn bookmark_union_is_commutative_on_membership() {
        let a: BookmarkSet = ["A", "B"].into_iter().collect();
        let b: BookmarkSet = ["B", "C"].into_iter().collect();

        assert_eq!(members(&merge_bookmarks(&a, &b)), vec!["A", "B", "C"]);
        assert_eq!(members(&merge_bookmarks(&b, &a)), vec!["A", "B", "C"]);
    }

    #[test]
    fn bookmark_union_keeps_local_order_first() {
        let local: BookmarkSet = ["x", "y"].into_iter().collect();
        let remote: BookmarkSet = ["z", "x"].into_iter().collect();
        let merged = merge_bookmarks(&local, &remote);
        assert_eq!(merged.iter().collect::<Vec<_>>(), vec!["x", "y", "z"]);
    }

    #[test]
    fn newer_remote_entry_wins() {
        let local = ledger(&[("X", "local-ch", 100)]);
        let remote = ledger(&[("X", "remote-ch", 200)]);
        let merged = merge_history(&local, &remote, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.get("X").map(|e| e.chapter_id.as_str()), Some("remote-ch"));
    }

    #[test]
    fn newer_local_entry_wins() {
        let local = ledger(&[("X", "local-ch", 300)]);
        let remote = ledger(&[("X", "remote-ch", 200)]);
        let merged = merge_history(&local, &remote, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(merged.get("X").map(|e| e.chapter_id.as_str()), Some("local-ch"));
    }

    #[test]
    fn equal_timestamps_prefer_remote() {
        let local = ledger(&[("X", "local-ch", 200)]);
        let remote = ledger(&[("X", "remote-ch", 200)]);
        let merged = merge_history(&local, &remote, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(merged.get("X").map(|e| e.chapter_id.as_str()), Some("remote-ch"));
    }

    #[test]
    fn merged_history_is_sorted_and_truncated() {
        let local: Vec<_> = (0..15).map(|i| (format!("l{i}"), i * 2)).collect();
        let remote: Vec<_> = (0..15).map(|i| (format!("r{i}"), i * 2 + 1)).collect();
        let local = ledger(
            &local
                .iter()
                .map(|(m, t)| (m.as_str(), "1", *t))
                .collect::<Vec<_>>(),
        );
        let remote = ledger(
            &remote
                .iter()
                .map(|(m, t)| (m.as_str(), "1", *t))
                .collect::<Vec<_>>(),
        );

        let merged = merge_history(&local, &remote, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(merged.len(), DEFAULT_HISTORY_CAPACITY);
        let stamps: Vec<_> = merged.entries().iter().map(|e| e.last_read_at).collect();
        assert!(stamps.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(stamps[0], 29);
        assert_eq!(*stamps.last().unwrap(), 10);
    }
}
