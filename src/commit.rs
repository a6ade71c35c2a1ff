//! The Commit Advancer component: computes the new `commitIndex`
//! from the leader's view of `matchIndex` per peer, gated by the classic
//! Raft safety fix (only count entries from the current term).

use crate::store::LogStore;

/// Computes the new commit index, if it can legally advance.
///
/// `match_indices` must contain one entry per cluster member *other than*
/// the computation's own log position, which is passed separately as
/// `self_last_index` (the leader always "replicates" to itself).
///
/// Returns `Some(n)` only when `n > current_commit_index`; the caller is
/// responsible for `commitIndex = max(commitIndex, n)`, which this already
/// expresses by only returning a strictly larger value.
pub fn compute_commit_index(
    match_indices: &[u64],
    self_last_index: u64,
    cluster_size: usize,
    current_term: u64,
    current_commit_index: u64,
    log: &dyn LogStore,
) -> Option<u64> {
    let majority = cluster_size / 2 + 1;
    let mut indices: Vec<u64> = match_indices.to_vec();
    indices.push(self_last_index);
    debug_assert_eq!(indices.len(), cluster_size);
    indices.sort_unstable_by(|a, b| b.cmp(a));

    let candidate = *indices.get(majority - 1)?;
    if candidate <= current_commit_index {
        return None;
    }
    // Safety fix: only an entry from the leader's own current term can be
    // committed by counting replicas. Earlier-term entries become
    // committed as a side effect once a later-term entry commits,
    // never directly through the majority count.
    match log.get(candidate) {
        Some(entry) if entry.term == current_term => Some(candidate),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Entry, MemoryLog};

    fn log_with(entries: &[(u64, u64)]) -> MemoryLog {
        let log = MemoryLog::new();
        let entries: Vec<Entry> = entries.iter().map(|&(index, term)| Entry { index, term, payload: vec![] }).collect();
        log.append(&entries).unwrap();
        log
    }

    #[test]
    fn advances_to_majority_index_in_current_term() {
        // 3-node cluster (self + 2 peers), both peers at index 1, term 1.
        let log = log_with(&[(1, 1)]);
        let n = compute_commit_index(&[1, 1], 1, 3, 1, 0, &log);
        assert_eq!(n, Some(1));
    }

    #[test]
    fn does_not_advance_without_majority() {
        let log = log_with(&[(1, 1), (2, 1), (3, 1)]);
        // Only one peer (plus self) has index 3; cluster size 5 needs 3.
        let n = compute_commit_index(&[3, 0, 0], 3, 5, 1, 0, &log);
        assert_eq!(n, None);
    }

    #[test]
    fn refuses_to_commit_prior_term_entry_through_counting_alone() {
        // Leader at term 4, log ends [(5,2),(6,2)] replicated to a
        // majority, but committing index 6 by count alone is forbidden
        // because entry 6 is from term 2, not the leader's current term 4.
        let log = log_with(&[(4, 2), (5, 2), (6, 2)]);
        let n = compute_commit_index(&[6, 6], 6, 3, 4, 0, &log);
        assert_eq!(n, None, "must not commit a prior-term entry through counting alone");
    }

    #[test]
    fn commits_prior_term_entries_transitively_once_current_term_entry_commits() {
        // Continuing: leader appends (7,4) and replicates it to a
        // majority. Now entries 5, 6 and 7 all become committed together.
        let log = log_with(&[(4, 2), (5, 2), (6, 2), (7, 4)]);
        let n = compute_commit_index(&[7, 7], 7, 3, 4, 0, &log);
        assert_eq!(n, Some(7));
    }

    #[test]
    fn never_returns_a_value_at_or_below_current_commit_index() {
        let log = log_with(&[(1, 1), (2, 1)]);
        let n = compute_commit_index(&[2, 2], 2, 3, 1, 2, &log);
        assert_eq!(n, None);
    }
}
