//! The Term Store component: the current term, persisted atomically
//! with `votedFor` clearing whenever the term advances.
//!
//! Term/votedFor must be persisted before any response depending on them is
//! sent. This in-memory store models that ordering contract even
//! though it doesn't hit a disk; a durable implementation would fsync
//! inside `set` before returning.

use crate::member::MemberRegistry;
use std::sync::atomic::{AtomicU64, Ordering};

pub trait TermStore: Send + Sync {
    fn get(&self) -> u64;

    /// Sets the current term. Callers are responsible for clearing
    /// `votedFor` on the `MemberRegistry` when the term actually advances;
    /// `advance_and_clear_vote` does both atomically from the caller's
    /// perspective.
    fn set(&self, term: u64);

    /// Advances to `new_term` and clears `votedFor`, but only if `new_term`
    /// is strictly greater than the current term. Returns whether the term
    /// actually advanced.
    fn advance_and_clear_vote(&self, new_term: u64, members: &dyn MemberRegistry) -> bool {
        if new_term > self.get() {
            self.set(new_term);
            members.set_voted_for(None);
            true
        } else {
            false
        }
    }
}

#[derive(Default)]
pub struct InMemoryTermStore {
    term: AtomicU64,
}

impl InMemoryTermStore {
    pub fn new() -> InMemoryTermStore {
        InMemoryTermStore { term: AtomicU64::new(0) }
    }
}

impl TermStore for InMemoryTermStore {
    fn get(&self) -> u64 {
        self.term.load(Ordering::SeqCst)
    }

    fn set(&self, term: u64) {
        self.term.store(term, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{InMemoryMemberRegistry, MemberEntry};

    fn registry() -> InMemoryMemberRegistry {
        InMemoryMemberRegistry::new(
            MemberEntry { id: "a".into(), address: "127.0.0.1".into(), port: 1 },
            vec![],
        )
    }

    #[test]
    fn advance_clears_vote_only_when_strictly_greater() {
        let terms = InMemoryTermStore::new();
        let members = registry();
        members.set_voted_for(Some("a".into()));

        assert!(!terms.advance_and_clear_vote(0, &members));
        assert_eq!(members.voted_for(), Some("a".into()));

        assert!(terms.advance_and_clear_vote(1, &members));
        assert_eq!(terms.get(), 1);
        assert_eq!(members.voted_for(), None);
    }

    #[test]
    fn term_monotonic_under_repeated_sets() {
        let terms = InMemoryTermStore::new();
        terms.set(5);
        assert_eq!(terms.get(), 5);
        terms.set(5);
        assert_eq!(terms.get(), 5);
    }
}
