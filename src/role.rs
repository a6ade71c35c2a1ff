//! The Role Supervisor component: a single-consumer actor that owns
//! `role`, `currentTerm`, `votedFor`, and the election timer. Every other
//! component talks to it only by message, which is what lets it mutate
//! role-scoped state without a lock.

use crate::applier::Applier;
use crate::commit;
use crate::config::Config;
use crate::election::{ElectionEngine, Outcome};
use crate::error::ClientCommandOutcome;
use crate::heartbeat::{self, HeartbeatContext, HeartbeatHandle};
use crate::member::MemberRegistry;
use crate::replicator::{self, LeaderContext, ReplicatorHandle};
use crate::rpc::{
    AppendEntryPayload, AppendEntryResponse, ClientCommandAck, RequestVotePayload, RequestVoteResponse, RequestSender,
};
use crate::store::{Entry, LastMeta, LogStore};
use crate::term::TermStore;
use log::{debug, info, warn};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// The replica's current role. `LeaderRuntime` lives inside the `Leader`
/// variant so it only exists between a winning election and the next
/// step-down; there's no way to observe it outside that window.
enum Role {
    Follower,
    Candidate,
    Leader(LeaderRuntime),
}

struct LeaderRuntime {
    match_index_by_peer: HashMap<String, u64>,
    replicators: Vec<ReplicatorHandle>,
    heartbeat: Option<HeartbeatHandle>,
    commit_index_shared: Arc<AtomicU64>,
    pending_acks: HashMap<u64, Sender<ClientCommandAck>>,
}

/// Messages accepted by the Role Supervisor's single inbound channel.
pub enum SupervisorMessage {
    AppendEntries(AppendEntryPayload, Sender<AppendEntryResponse>),
    RequestVote(RequestVotePayload, Sender<RequestVoteResponse>),
    ClientCommand(Vec<u8>, Sender<ClientCommandAck>),
    ElectionOutcome { for_term: u64, outcome: Outcome },
    ReplicatorProgress { peer_id: String, match_index: u64, for_term: u64 },
    StepDown { observed_term: u64 },
}

/// A cheap, cloneable handle callers (the transport layer, the CLI, tests)
/// use to talk to a running replica.
#[derive(Clone)]
pub struct ReplicaHandle {
    tx: Sender<SupervisorMessage>,
}

impl ReplicaHandle {
    pub fn append_entries(&self, req: AppendEntryPayload) -> AppendEntryResponse {
        let (resp_tx, resp_rx) = channel();
        self.tx.send(SupervisorMessage::AppendEntries(req, resp_tx)).expect("replica thread has exited");
        resp_rx.recv().expect("replica thread dropped the response channel")
    }

    pub fn request_vote(&self, req: RequestVotePayload) -> RequestVoteResponse {
        let (resp_tx, resp_rx) = channel();
        self.tx.send(SupervisorMessage::RequestVote(req, resp_tx)).expect("replica thread has exited");
        resp_rx.recv().expect("replica thread dropped the response channel")
    }

    /// Submits a client command. Blocks until it commits or leadership is
    /// lost before it does: this core never acks "appended but not
    /// yet committed".
    pub fn submit_command(&self, payload: Vec<u8>) -> ClientCommandAck {
        let (resp_tx, resp_rx) = channel();
        self.tx.send(SupervisorMessage::ClientCommand(payload, resp_tx)).expect("replica thread has exited");
        resp_rx.recv().expect("replica thread dropped the response channel")
    }
}

impl From<ClientCommandAck> for ClientCommandOutcome {
    fn from(ack: ClientCommandAck) -> Self {
        match ack {
            ClientCommandAck::Committed { index } => ClientCommandOutcome::Committed { index },
            ClientCommandAck::NotLeader { leader_hint } => ClientCommandOutcome::NotLeader { leader_hint },
            ClientCommandAck::Uncertain => ClientCommandOutcome::Uncertain,
        }
    }
}

/// Spawns the Role Supervisor on its own background thread and returns a
/// handle to it. The replica starts in the Follower role.
pub fn start(
    config: Config,
    log: Arc<dyn LogStore>,
    members: Arc<dyn MemberRegistry>,
    terms: Arc<dyn TermStore>,
    sender: Arc<dyn RequestSender>,
    applier: Arc<dyn Applier>,
) -> ReplicaHandle {
    let (tx, rx) = channel();
    let mut supervisor = Supervisor {
        role: Role::Follower,
        log,
        members,
        terms,
        sender,
        applier,
        election_deadline: Instant::now(),
        commit_index: 0,
        last_applied: 0,
        config,
        tx: tx.clone(),
        rx,
    };
    supervisor.election_deadline = Instant::now() + supervisor.random_election_timeout();
    thread::spawn(move || supervisor.run());
    ReplicaHandle { tx }
}

struct Supervisor {
    role: Role,
    log: Arc<dyn LogStore>,
    members: Arc<dyn MemberRegistry>,
    terms: Arc<dyn TermStore>,
    sender: Arc<dyn RequestSender>,
    applier: Arc<dyn Applier>,
    config: Config,
    commit_index: u64,
    last_applied: u64,
    election_deadline: Instant,
    tx: Sender<SupervisorMessage>,
    rx: Receiver<SupervisorMessage>,
}

impl Supervisor {
    fn run(mut self) {
        loop {
            match self.role {
                Role::Follower => {
                    let now = Instant::now();
                    if now >= self.election_deadline {
                        self.become_candidate();
                        continue;
                    }
                    match self.rx.recv_timeout(self.election_deadline - now) {
                        Ok(msg) => self.handle(msg),
                        Err(RecvTimeoutError::Timeout) => self.become_candidate(),
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                }
                // Candidates and leaders don't run on the election timer
                // themselves: a Candidate's deadline is enforced by
                // its own Election Engine thread, and a Leader ignores the
                // timer entirely.
                Role::Candidate | Role::Leader(_) => match self.rx.recv() {
                    Ok(msg) => self.handle(msg),
                    Err(_) => return,
                },
            }
        }
    }

    fn handle(&mut self, msg: SupervisorMessage) {
        match msg {
            SupervisorMessage::AppendEntries(req, resp_tx) => {
                let resp = self.handle_append_entries(req);
                let _ = resp_tx.send(resp);
            }
            SupervisorMessage::RequestVote(req, resp_tx) => {
                let resp = self.handle_request_vote(req);
                let _ = resp_tx.send(resp);
            }
            SupervisorMessage::ClientCommand(payload, resp_tx) => self.handle_client_command(payload, resp_tx),
            SupervisorMessage::ElectionOutcome { for_term, outcome } => self.handle_election_outcome(for_term, outcome),
            SupervisorMessage::ReplicatorProgress { peer_id, match_index, for_term } => {
                self.handle_replicator_progress(peer_id, match_index, for_term)
            }
            SupervisorMessage::StepDown { observed_term } => self.step_down(observed_term),
        }
    }

    fn random_election_timeout(&self) -> Duration {
        let min = self.config.election_timeout_min.as_millis() as u64;
        let max = self.config.election_timeout_max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..max))
    }

    fn reset_election_timer(&mut self) {
        self.election_deadline = Instant::now() + self.random_election_timeout();
    }

    // ---- Candidate / election -------------------------------------------------

    fn become_candidate(&mut self) {
        self.step_down_to_follower(); // a no-op unless we were already Leader
        let new_term = self.terms.get() + 1;
        self.terms.set(new_term);
        self.members.set_voted_for(Some(self.members.self_entry().id));
        self.role = Role::Candidate;
        let timeout = self.random_election_timeout();
        self.election_deadline = Instant::now() + timeout;
        info!("election timeout elapsed, becoming candidate for term {new_term}");

        let engine = ElectionEngine {
            log: self.log.clone(),
            members: self.members.clone(),
            sender: self.sender.clone(),
            rpc_timeout: self.config.rpc_timeout,
        };
        let tx = self.tx.clone();
        thread::spawn(move || {
            let outcome = engine.request_vote(new_term, timeout);
            let _ = tx.send(SupervisorMessage::ElectionOutcome { for_term: new_term, outcome });
        });
    }

    fn handle_election_outcome(&mut self, for_term: u64, outcome: Outcome) {
        if !matches!(self.role, Role::Candidate) || for_term != self.terms.get() {
            debug!("ignoring stale election outcome for term {for_term}");
            return;
        }
        match outcome {
            Outcome::Leader => self.become_leader(for_term),
            Outcome::Follower { observed_term } => {
                self.terms.advance_and_clear_vote(observed_term, self.members.as_ref());
                self.role = Role::Follower;
                self.reset_election_timer();
            }
            Outcome::Split => {
                info!("split vote for term {for_term}, retrying election");
                self.become_candidate();
            }
        }
    }

    fn become_leader(&mut self, term: u64) {
        let my_id = self.members.self_entry().id;
        info!("won election for term {term}, becoming leader");
        self.members.set_leader(Some(my_id.clone()));

        let commit_index_shared = Arc::new(AtomicU64::new(self.commit_index));
        let replicator_ctx = Arc::new(LeaderContext { term, leader_id: my_id.clone(), commit_index: commit_index_shared.clone() });
        let mut match_index_by_peer = HashMap::new();
        let mut replicators = Vec::new();
        for peer in self.members.list() {
            match_index_by_peer.insert(peer.id.clone(), 0);
            let handle = replicator::spawn(
                peer,
                self.log.clone(),
                self.sender.clone(),
                self.tx.clone(),
                replicator_ctx.clone(),
                self.config.rpc_timeout,
                self.config.replicator_retry_backoff,
                self.config.replication_batch_size,
            );
            // Bring a freshly-won cluster's followers up to date even if
            // no client command arrives immediately.
            handle.nudge();
            replicators.push(handle);
        }

        let hb_ctx = Arc::new(HeartbeatContext { term, leader_id: my_id, commit_index: commit_index_shared.clone() });
        let heartbeat = heartbeat::spawn(
            hb_ctx,
            self.members.clone(),
            self.log.clone(),
            self.sender.clone(),
            self.tx.clone(),
            self.config.heartbeat_interval,
            self.config.rpc_timeout,
        );

        self.role = Role::Leader(LeaderRuntime {
            match_index_by_peer,
            replicators,
            heartbeat: Some(heartbeat),
            commit_index_shared,
            pending_acks: HashMap::new(),
        });
    }

    /// Cancels any leader-only background tasks and resolves pending
    /// client acks as `Uncertain`. A no-op from Follower.
    fn step_down_to_follower(&mut self) {
        match std::mem::replace(&mut self.role, Role::Follower) {
            Role::Leader(state) => {
                info!("stepping down from leader");
                for replicator in state.replicators {
                    replicator.shutdown();
                }
                if let Some(hb) = state.heartbeat {
                    hb.shutdown();
                }
                for (_, resp_tx) in state.pending_acks {
                    let _ = resp_tx.send(ClientCommandAck::Uncertain);
                }
            }
            Role::Candidate => info!("stepping down from candidate"),
            Role::Follower => {}
        }
    }

    fn step_down(&mut self, observed_term: u64) {
        if observed_term <= self.terms.get() {
            return; // stale signal from a response that predates our current term
        }
        warn!("observed higher term {observed_term}, stepping down");
        self.terms.advance_and_clear_vote(observed_term, self.members.as_ref());
        self.step_down_to_follower();
        self.reset_election_timer();
    }

    // ---- Follower-side RPC handlers --------------------------------------------

    fn handle_append_entries(&mut self, req: AppendEntryPayload) -> AppendEntryResponse {
        let mut current_term = self.terms.get();
        if req.term < current_term {
            return AppendEntryResponse { term: current_term, success: false };
        }
        if req.term > current_term {
            self.terms.advance_and_clear_vote(req.term, self.members.as_ref());
            current_term = req.term;
        }
        // A legitimate leader for a term >= ours always forces step-down,
        // even a Candidate who merely shares this term.
        if !matches!(self.role, Role::Follower) {
            self.step_down_to_follower();
        }
        self.members.set_leader(Some(req.leader_id.clone()));
        self.reset_election_timer();

        if !self.log.matches(req.prev_log_index, req.prev_log_term) {
            return AppendEntryResponse { term: current_term, success: false };
        }

        self.reconcile_entries(req.entries);

        let last_new_index = self.log.last_meta().index;
        if req.leader_commit > self.commit_index {
            self.commit_index = req.leader_commit.min(last_new_index);
            self.apply_committed();
        }

        AppendEntryResponse { term: current_term, success: true }
    }

    /// Delete any conflicting entry and everything after it, then append
    /// whatever's new.
    fn reconcile_entries(&mut self, entries: Vec<Entry>) {
        let mut conflict_at = None;
        for entry in &entries {
            match self.log.get(entry.index) {
                Some(existing) if existing.term != entry.term => {
                    conflict_at = Some(entry.index);
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        if let Some(conflict_index) = conflict_at {
            self.log.truncate_after(conflict_index - 1);
        }
        let tail = self.log.last_meta().index;
        let new_entries: Vec<Entry> = entries.into_iter().filter(|e| e.index > tail).collect();
        if !new_entries.is_empty() {
            if let Err(err) = self.log.append(&new_entries) {
                warn!("failed to append entries: {err}");
            }
        }
    }

    fn handle_request_vote(&mut self, req: RequestVotePayload) -> RequestVoteResponse {
        let mut current_term = self.terms.get();
        if req.term < current_term {
            return RequestVoteResponse { term: current_term, vote_granted: false };
        }
        if req.term > current_term {
            self.terms.advance_and_clear_vote(req.term, self.members.as_ref());
            current_term = req.term;
            if !matches!(self.role, Role::Follower) {
                self.step_down_to_follower();
            }
        }

        let voted_for = self.members.voted_for();
        let can_vote = voted_for.is_none() || voted_for.as_deref() == Some(req.candidate_id.as_str());
        let candidate_meta = LastMeta { index: req.last_log_index, term: req.last_log_term };
        let log_ok = candidate_meta.at_least_as_up_to_date_as(&self.log.last_meta());

        if can_vote && log_ok {
            self.members.set_voted_for(Some(req.candidate_id));
            self.reset_election_timer();
            RequestVoteResponse { term: current_term, vote_granted: true }
        } else {
            RequestVoteResponse { term: current_term, vote_granted: false }
        }
    }

    // ---- Leader-side client commands & commit advancement ---------------------

    fn handle_client_command(&mut self, payload: Vec<u8>, resp_tx: Sender<ClientCommandAck>) {
        if !matches!(self.role, Role::Leader(_)) {
            let _ = resp_tx.send(ClientCommandAck::NotLeader { leader_hint: self.members.leader() });
            return;
        }
        let term = self.terms.get();
        let index = self.log.last_meta().index + 1;
        if let Err(err) = self.log.append(&[Entry { index, term, payload }]) {
            warn!("failed to append client command: {err}");
            let _ = resp_tx.send(ClientCommandAck::Uncertain);
            return;
        }
        if let Role::Leader(state) = &mut self.role {
            state.pending_acks.insert(index, resp_tx);
            for replicator in &state.replicators {
                replicator.nudge();
            }
        }
        // A single-node cluster (or one where peers already caught up)
        // may commit immediately without waiting on a ReplicatorProgress
        // message.
        self.try_advance_commit_index();
    }

    fn handle_replicator_progress(&mut self, peer_id: String, match_index: u64, for_term: u64) {
        if for_term != self.terms.get() {
            return; // stale report from a leadership term we've since left
        }
        let updated = if let Role::Leader(state) = &mut self.role {
            let slot = state.match_index_by_peer.entry(peer_id).or_insert(0);
            if match_index > *slot {
                *slot = match_index;
            }
            true
        } else {
            false
        };
        if updated {
            self.try_advance_commit_index();
        }
    }

    fn try_advance_commit_index(&mut self) {
        let current_term = self.terms.get();
        let self_last_index = self.log.last_meta().index;
        let cluster_size = self.members.cluster_size();
        let new_commit_index = if let Role::Leader(state) = &self.role {
            let match_indices: Vec<u64> = state.match_index_by_peer.values().copied().collect();
            commit::compute_commit_index(&match_indices, self_last_index, cluster_size, current_term, self.commit_index, self.log.as_ref())
        } else {
            None
        };
        if let Some(n) = new_commit_index {
            self.advance_commit_to(n);
        }
    }

    fn advance_commit_to(&mut self, n: u64) {
        self.commit_index = n;
        info!("commit index advanced to {n}");
        if let Role::Leader(state) = &mut self.role {
            state.commit_index_shared.store(n, Ordering::SeqCst);
        }
        self.apply_committed();
        self.resolve_pending_acks(n);
    }

    fn apply_committed(&mut self) {
        while self.last_applied < self.commit_index {
            self.last_applied += 1;
            if let Some(entry) = self.log.get(self.last_applied) {
                self.applier.apply(&entry);
            }
        }
    }

    fn resolve_pending_acks(&mut self, commit_index: u64) {
        if let Role::Leader(state) = &mut self.role {
            let ready: Vec<u64> = state.pending_acks.keys().copied().filter(|&idx| idx <= commit_index).collect();
            for idx in ready {
                if let Some(resp_tx) = state.pending_acks.remove(&idx) {
                    let _ = resp_tx.send(ClientCommandAck::Committed { index: idx });
                }
            }
        }
    }
}
