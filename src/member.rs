//! The Member Registry component: self identity, peer list,
//! `votedFor`, and the current leader hint.

use std::collections::HashMap;
use std::sync::RwLock;

/// One cluster member's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEntry {
    pub id: String,
    pub address: String,
    pub port: u16,
}

/// The Member Registry interface consumed by the rest of the core.
///
/// Everything but `votedFor` is read-mostly after startup; `votedFor` is
/// the only field mutated after construction, and it is owned by the Role
/// Supervisor.
pub trait MemberRegistry: Send + Sync {
    fn self_entry(&self) -> MemberEntry;
    fn list(&self) -> Vec<MemberEntry>;
    fn leader(&self) -> Option<String>;
    fn set_leader(&self, id: Option<String>);
    fn voted_for(&self) -> Option<String>;
    fn set_voted_for(&self, id: Option<String>);

    /// Total member count, including self: used to compute majority.
    fn cluster_size(&self) -> usize {
        self.list().len() + 1
    }
}

struct MutableState {
    leader: Option<String>,
    voted_for: Option<String>,
}

/// A `MemberRegistry` backed by an in-memory map over a fixed peer set
/// known at construction time.
pub struct InMemoryMemberRegistry {
    me: MemberEntry,
    peers: HashMap<String, MemberEntry>,
    state: RwLock<MutableState>,
}

impl InMemoryMemberRegistry {
    pub fn new(me: MemberEntry, peers: Vec<MemberEntry>) -> InMemoryMemberRegistry {
        let peers = peers.into_iter().map(|p| (p.id.clone(), p)).collect();
        InMemoryMemberRegistry {
            me,
            peers,
            state: RwLock::new(MutableState { leader: None, voted_for: None }),
        }
    }
}

impl MemberRegistry for InMemoryMemberRegistry {
    fn self_entry(&self) -> MemberEntry {
        self.me.clone()
    }

    fn list(&self) -> Vec<MemberEntry> {
        self.peers.values().cloned().collect()
    }

    fn leader(&self) -> Option<String> {
        self.state.read().unwrap().leader.clone()
    }

    fn set_leader(&self, id: Option<String>) {
        self.state.write().unwrap().leader = id;
    }

    fn voted_for(&self) -> Option<String> {
        self.state.read().unwrap().voted_for.clone()
    }

    fn set_voted_for(&self, id: Option<String>) {
        self.state.write().unwrap().voted_for = id;
    }
}
