//! The Replicator component: one long-lived background task per
//! peer, idling between wakes and catching the peer up to the leader's
//! log whenever nudged.

use crate::error::RpcError;
use crate::member::MemberEntry;
use crate::role::SupervisorMessage;
use crate::rpc::{AppendEntryPayload, Request, RequestSender, Response};
use crate::store::LogStore;
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

/// Messages a Replicator accepts from the Role Supervisor.
pub enum ReplicatorSignal {
    /// New entries were appended locally (or this is the initial kick on
    /// becoming leader); coalesced: any number of appends since the last
    /// wake collapse into a single catch-up pass.
    NudgeNewEntries,
    Shutdown,
}

/// Read-only context shared by every Replicator and the Heartbeat Emitter
/// for one leadership term. `commit_index` is updated by the Role
/// Supervisor (the sole writer) and read by background senders, so a
/// snapshot never requires a round trip through the supervisor's channel.
pub struct LeaderContext {
    pub term: u64,
    pub leader_id: String,
    pub commit_index: Arc<AtomicU64>,
}

pub struct ReplicatorHandle {
    pub peer_id: String,
    pub to_replicator: Sender<ReplicatorSignal>,
    pub thread: Option<JoinHandle<()>>,
}

impl ReplicatorHandle {
    pub fn nudge(&self) {
        // Panics only if the replicator thread has already exited, which
        // only happens after a Shutdown this handle itself sent.
        let _ = self.to_replicator.send(ReplicatorSignal::NudgeNewEntries);
    }

    /// Sends the shutdown signal and blocks until the background thread
    /// exits, bounded by one in-flight RPC timeout.
    pub fn shutdown(mut self) {
        let _ = self.to_replicator.send(ReplicatorSignal::Shutdown);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

struct Replicator {
    peer: MemberEntry,
    log: Arc<dyn LogStore>,
    sender: Arc<dyn RequestSender>,
    to_supervisor: Sender<SupervisorMessage>,
    from_supervisor: Receiver<ReplicatorSignal>,
    ctx: Arc<LeaderContext>,
    rpc_timeout: Duration,
    retry_backoff: Duration,
    batch_size: usize,
}

pub fn spawn(
    peer: MemberEntry,
    log: Arc<dyn LogStore>,
    sender: Arc<dyn RequestSender>,
    to_supervisor: Sender<SupervisorMessage>,
    ctx: Arc<LeaderContext>,
    rpc_timeout: Duration,
    retry_backoff: Duration,
    batch_size: usize,
) -> ReplicatorHandle {
    let (to_replicator, from_supervisor) = channel();
    let peer_id = peer.id.clone();
    let replicator = Replicator { peer, log, sender, to_supervisor, from_supervisor, ctx, rpc_timeout, retry_backoff, batch_size };
    let thread = thread::spawn(move || replicator.run());
    ReplicatorHandle { peer_id, to_replicator, thread: Some(thread) }
}

impl Replicator {
    fn run(mut self) {
        // nextIndex is reinitialized to lastLogIndex + 1 on every election
        // win; each Replicator is spawned fresh per leadership term.
        let mut next_index = self.log.last_meta().index + 1;
        loop {
            match self.from_supervisor.recv() {
                Err(_) | Ok(ReplicatorSignal::Shutdown) => return,
                Ok(ReplicatorSignal::NudgeNewEntries) => {
                    if self.drain_coalesced_nudges_requested_shutdown() {
                        return;
                    }
                    if !self.catch_up(&mut next_index) {
                        return; // Shutdown observed mid catch-up.
                    }
                }
            }
        }
    }

    /// A single wake covers any number of appends since the last one: drop
    /// any further pending nudges without blocking. Returns true if a
    /// Shutdown was consumed along the way.
    fn drain_coalesced_nudges_requested_shutdown(&self) -> bool {
        while let Ok(signal) = self.from_supervisor.try_recv() {
            if matches!(signal, ReplicatorSignal::Shutdown) {
                return true;
            }
        }
        false
    }

    /// Drives `next_index` forward until this peer matches the leader's
    /// log or a shutdown/step-down interrupts. Returns `false` if the
    /// replicator should exit entirely.
    fn catch_up(&self, next_index: &mut u64) -> bool {
        loop {
            if let Ok(ReplicatorSignal::Shutdown) = self.from_supervisor.try_recv() {
                return false;
            }

            let prev_log_index = *next_index - 1;
            let prev_log_term = if prev_log_index == 0 { 0 } else { self.log.get(prev_log_index).map(|e| e.term).unwrap_or(0) };
            let entries = self.log.entries_from(*next_index).into_iter().take(self.batch_size).collect::<Vec<_>>();
            let sent_count = entries.len() as u64;
            let payload = AppendEntryPayload {
                term: self.ctx.term,
                leader_id: self.ctx.leader_id.clone(),
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit: self.ctx.commit_index.load(Ordering::SeqCst),
            };

            match self.sender.send(&Request::AppendEntry(payload), &self.peer.address, self.peer.port, self.rpc_timeout) {
                Err(err) => {
                    warn!("append-entries to {} failed: {err}", self.peer.id);
                    self.backoff_or_exit(err);
                    continue; // do not advance indices on a transport failure
                }
                Ok(Response::AppendEntry(resp)) => {
                    if resp.term > self.ctx.term {
                        let _ = self.to_supervisor.send(SupervisorMessage::StepDown { observed_term: resp.term });
                        return false;
                    }
                    if resp.success {
                        let match_index = prev_log_index + sent_count;
                        *next_index = match_index + 1;
                        let _ = self.to_supervisor.send(SupervisorMessage::ReplicatorProgress {
                            peer_id: self.peer.id.clone(),
                            match_index,
                            for_term: self.ctx.term,
                        });
                        if self.log.entries_from(*next_index).is_empty() {
                            return true; // caught up; go idle until the next nudge
                        }
                        // More entries remain beyond this batch; keep going.
                    } else {
                        debug!("peer {} rejected append at index {prev_log_index}, decrementing nextIndex", self.peer.id);
                        *next_index = next_index.saturating_sub(1).max(1);
                    }
                }
                Ok(_) => unreachable!("AppendEntry request always yields an AppendEntry response"),
            }
        }
    }

    fn backoff_or_exit(&self, _err: RpcError) {
        thread::sleep(self.retry_backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use crate::rpc::AppendEntryResponse;
    use crate::store::{Entry, MemoryLog};
    use std::sync::mpsc::channel as std_channel;
    use std::sync::Mutex;

    struct ScriptedSender {
        responses: Mutex<Vec<Result<Response, RpcError>>>,
        observed: Mutex<Vec<AppendEntryPayload>>,
    }

    impl RequestSender for ScriptedSender {
        fn send(&self, request: &Request, _address: &str, _port: u16, _timeout: Duration) -> Result<Response, RpcError> {
            if let Request::AppendEntry(p) = request {
                self.observed.lock().unwrap().push(p.clone());
            }
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Ok(Response::AppendEntry(AppendEntryResponse { term: 0, success: true }));
            }
            responses.remove(0)
        }
    }

    fn entry(index: u64, term: u64) -> Entry {
        Entry { index, term, payload: vec![] }
    }

    fn member() -> MemberEntry {
        MemberEntry { id: "b".into(), address: "127.0.0.1".into(), port: 4002 }
    }

    #[test]
    fn catches_up_decrementing_on_mismatch_then_succeeding() {
        // Leader log ends [(1,1),(2,1),(3,1)]; peer log is [(1,1),(2,2)].
        let log = MemoryLog::new();
        log.append(&[entry(1, 1), entry(2, 1), entry(3, 1)]).unwrap();
        let commit_index = Arc::new(AtomicU64::new(0));
        let ctx = Arc::new(LeaderContext { term: 1, leader_id: "a".into(), commit_index });

        // First attempt (prevLogIndex=2) rejected, second (prevLogIndex=1) accepted.
        let sender = Arc::new(ScriptedSender {
            responses: Mutex::new(vec![
                Ok(Response::AppendEntry(AppendEntryResponse { term: 1, success: false })),
                Ok(Response::AppendEntry(AppendEntryResponse { term: 1, success: true })),
            ]),
            observed: Mutex::new(vec![]),
        });
        let (to_supervisor, from_replicator) = std_channel();
        let replicator = Replicator {
            peer: member(),
            log: Arc::new(log),
            sender: sender.clone(),
            to_supervisor,
            from_supervisor: std_channel().1,
            ctx,
            rpc_timeout: Duration::from_millis(50),
            retry_backoff: Duration::from_millis(1),
            batch_size: 64,
        };
        let mut next_index = 4; // leader's last index (3) + 1
        assert!(replicator.catch_up(&mut next_index));

        let observed = sender.observed.lock().unwrap();
        assert_eq!(observed.len(), 2);
        assert_eq!(observed[0].prev_log_index, 3);
        assert_eq!(observed[1].prev_log_index, 1);
        assert_eq!(observed[1].entries.len(), 2);

        match from_replicator.try_recv().unwrap() {
            SupervisorMessage::ReplicatorProgress { match_index, .. } => assert_eq!(match_index, 3),
            _ => panic!("expected a ReplicatorProgress message"),
        }
    }

    #[test]
    fn reports_step_down_on_higher_term_response() {
        let log = MemoryLog::new();
        log.append(&[entry(1, 1)]).unwrap();
        let ctx = Arc::new(LeaderContext { term: 1, leader_id: "a".into(), commit_index: Arc::new(AtomicU64::new(0)) });
        let sender = Arc::new(ScriptedSender {
            responses: Mutex::new(vec![Ok(Response::AppendEntry(AppendEntryResponse { term: 9, success: false }))]),
            observed: Mutex::new(vec![]),
        });
        let (to_supervisor, from_replicator) = std_channel();
        let replicator = Replicator {
            peer: member(),
            log: Arc::new(log),
            sender,
            to_supervisor,
            from_supervisor: std_channel().1,
            ctx,
            rpc_timeout: Duration::from_millis(50),
            retry_backoff: Duration::from_millis(1),
            batch_size: 64,
        };
        let mut next_index = 2;
        assert!(!replicator.catch_up(&mut next_index));
        match from_replicator.try_recv().unwrap() {
            SupervisorMessage::StepDown { observed_term } => assert_eq!(observed_term, 9),
            _ => panic!("expected a StepDown message"),
        }
    }
}
