//! The Election Engine component: runs a single election attempt to
//! completion and classifies its outcome. Owns none of the replica's
//! persistent state; it borrows what it needs for the one attempt.

use crate::member::MemberRegistry;
use crate::rpc::{Request, RequestSender, RequestVotePayload, Response};
use crate::store::LogStore;
use log::warn;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Outcome of one election attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Leader,
    Follower { observed_term: u64 },
    Split,
}

pub struct ElectionEngine {
    pub log: Arc<dyn LogStore>,
    pub members: Arc<dyn MemberRegistry>,
    pub sender: Arc<dyn RequestSender>,
    pub rpc_timeout: Duration,
}

impl ElectionEngine {
    /// Runs a single election attempt for `term`, returning once a
    /// majority is reached, a higher term is observed, or `timeout`
    /// elapses without a decision.
    pub fn request_vote(&self, term: u64, timeout: Duration) -> Outcome {
        let candidate_id = self.members.self_entry().id;
        let last_meta = self.log.last_meta();
        let payload = RequestVotePayload {
            term,
            candidate_id: candidate_id.clone(),
            last_log_index: last_meta.index,
            last_log_term: last_meta.term,
        };

        let peers = self.members.list();
        let cluster_size = peers.len() + 1;
        let majority = cluster_size / 2 + 1;

        let (tx, rx) = mpsc::channel();
        for peer in peers {
            let tx = tx.clone();
            let sender = self.sender.clone();
            let payload = payload.clone();
            let rpc_timeout = self.rpc_timeout;
            thread::spawn(move || {
                let result = sender.send(&Request::RequestVote(payload), &peer.address, peer.port, rpc_timeout);
                // Ignore disconnects: the engine may have already decided
                // and dropped its receiver.
                let _ = tx.send((peer.id, result));
            });
        }
        drop(tx);

        let mut granted = 1usize; // self
        let deadline = Instant::now() + timeout;
        loop {
            if granted >= majority {
                return Outcome::Leader;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Outcome::Split;
            }
            match rx.recv_timeout(remaining) {
                Ok((peer_id, Ok(Response::RequestVote(resp)))) => {
                    if resp.term > term {
                        return Outcome::Follower { observed_term: resp.term };
                    }
                    if resp.term == term && resp.vote_granted {
                        granted += 1;
                    }
                }
                Ok((peer_id, Ok(_))) => {
                    warn!("peer {peer_id} replied to RequestVote with the wrong response kind");
                }
                Ok((peer_id, Err(err))) => {
                    warn!("unable to request vote from {peer_id}: {err}");
                }
                Err(mpsc::RecvTimeoutError::Timeout) => return Outcome::Split,
                Err(mpsc::RecvTimeoutError::Disconnected) => return Outcome::Split,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use crate::member::{InMemoryMemberRegistry, MemberEntry};
    use crate::store::MemoryLog;
    use std::sync::Mutex;

    struct ScriptedSender {
        scripts: Mutex<std::collections::HashMap<String, Response>>,
    }

    impl RequestSender for ScriptedSender {
        fn send(&self, _request: &Request, address: &str, port: u16, _timeout: Duration) -> Result<Response, RpcError> {
            let key = format!("{address}:{port}");
            self.scripts
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .ok_or_else(|| RpcError::Timeout { address: key })
        }
    }

    fn member(id: &str, port: u16) -> MemberEntry {
        MemberEntry { id: id.into(), address: "127.0.0.1".into(), port }
    }

    fn engine(scripts: std::collections::HashMap<String, Response>, peers: Vec<MemberEntry>) -> ElectionEngine {
        ElectionEngine {
            log: Arc::new(MemoryLog::new()),
            members: Arc::new(InMemoryMemberRegistry::new(member("self", 1), peers)),
            sender: Arc::new(ScriptedSender { scripts: Mutex::new(scripts) }),
            rpc_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn wins_with_unanimous_grants() {
        use crate::rpc::RequestVoteResponse;
        let mut scripts = std::collections::HashMap::new();
        scripts.insert("127.0.0.1:2".to_string(), Response::RequestVote(RequestVoteResponse { term: 1, vote_granted: true }));
        scripts.insert("127.0.0.1:3".to_string(), Response::RequestVote(RequestVoteResponse { term: 1, vote_granted: true }));
        let engine = engine(scripts, vec![member("b", 2), member("c", 3)]);
        let outcome = engine.request_vote(1, Duration::from_millis(200));
        assert_eq!(outcome, Outcome::Leader);
    }

    #[test]
    fn steps_down_on_higher_term_response() {
        use crate::rpc::RequestVoteResponse;
        let mut scripts = std::collections::HashMap::new();
        scripts.insert("127.0.0.1:2".to_string(), Response::RequestVote(RequestVoteResponse { term: 9, vote_granted: false }));
        let engine = engine(scripts, vec![member("b", 2)]);
        let outcome = engine.request_vote(1, Duration::from_millis(200));
        assert_eq!(outcome, Outcome::Follower { observed_term: 9 });
    }

    #[test]
    fn splits_when_timer_fires_before_majority() {
        // Peer never responds (no script entry => Timeout error, ignored).
        let engine = engine(std::collections::HashMap::new(), vec![member("b", 2), member("c", 3)]);
        let outcome = engine.request_vote(1, Duration::from_millis(50));
        assert_eq!(outcome, Outcome::Split);
    }

    #[test]
    fn ignores_a_vote_granted_with_a_lower_term() {
        use crate::rpc::RequestVoteResponse;
        let mut scripts = std::collections::HashMap::new();
        // Stale reply from a prior term: must not be counted as a grant.
        scripts.insert("127.0.0.1:2".to_string(), Response::RequestVote(RequestVoteResponse { term: 0, vote_granted: true }));
        let engine = engine(scripts, vec![member("b", 2)]);
        let outcome = engine.request_vote(1, Duration::from_millis(50));
        assert_eq!(outcome, Outcome::Split);
    }
}
