//! The Heartbeat Emitter: leader-only, fixed-interval, empty append-entries
//! broadcast. Each peer send runs on its own short-lived thread, joined
//! before the next tick starts.

use crate::member::MemberRegistry;
use crate::role::SupervisorMessage;
use crate::rpc::{AppendEntryPayload, Request, RequestSender, Response};
use crate::store::LogStore;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

pub struct HeartbeatHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    /// Signals the emitter to stop and blocks until its current tick (if
    /// any) finishes, bounded by one in-flight RPC timeout.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

pub struct HeartbeatContext {
    pub term: u64,
    pub leader_id: String,
    pub commit_index: Arc<AtomicU64>,
}

pub fn spawn(
    ctx: Arc<HeartbeatContext>,
    members: Arc<dyn MemberRegistry>,
    log: Arc<dyn LogStore>,
    sender: Arc<dyn RequestSender>,
    to_supervisor: Sender<SupervisorMessage>,
    interval: Duration,
    rpc_timeout: Duration,
) -> HeartbeatHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = stop.clone();
    let thread = thread::spawn(move || run(ctx, members, log, sender, to_supervisor, interval, rpc_timeout, thread_stop));
    HeartbeatHandle { stop, thread: Some(thread) }
}

fn run(
    ctx: Arc<HeartbeatContext>,
    members: Arc<dyn MemberRegistry>,
    _log: Arc<dyn LogStore>,
    sender: Arc<dyn RequestSender>,
    to_supervisor: Sender<SupervisorMessage>,
    interval: Duration,
    rpc_timeout: Duration,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        send_heartbeats(&ctx, &members, &sender, &to_supervisor, rpc_timeout);
        thread::sleep(interval);
    }
}

fn send_heartbeats(
    ctx: &Arc<HeartbeatContext>,
    members: &Arc<dyn MemberRegistry>,
    sender: &Arc<dyn RequestSender>,
    to_supervisor: &Sender<SupervisorMessage>,
    rpc_timeout: Duration,
) {
    info!("sending heartbeat from leader {} for term {}", ctx.leader_id, ctx.term);
    let peers = members.list();
    let handles: Vec<JoinHandle<()>> = peers
        .into_iter()
        .map(|peer| {
            let ctx = ctx.clone();
            let sender = sender.clone();
            let to_supervisor = to_supervisor.clone();
            thread::spawn(move || {
                // Heartbeats leave prevLogIndex/prevLogTerm at zero rather
                // than computing them; LogStore::matches special-cases
                // index 0 to always pass, so this never gets rejected on
                // a log mismatch the way a real AppendEntries would.
                let payload = AppendEntryPayload {
                    term: ctx.term,
                    leader_id: ctx.leader_id.clone(),
                    prev_log_index: 0,
                    prev_log_term: 0,
                    entries: vec![],
                    leader_commit: ctx.commit_index.load(Ordering::SeqCst),
                };
                match sender.send(&Request::AppendEntry(payload), &peer.address, peer.port, rpc_timeout) {
                    Err(err) => warn!("unable to send heartbeat to {}: {err}", peer.id),
                    Ok(Response::AppendEntry(resp)) => {
                        if resp.term > ctx.term {
                            let _ = to_supervisor.send(SupervisorMessage::StepDown { observed_term: resp.term });
                        }
                    }
                    Ok(_) => warn!("peer {} replied to a heartbeat with the wrong response kind", peer.id),
                }
            })
        })
        .collect();
    for handle in handles {
        let _ = handle.join();
    }
    info!("done sending heartbeats to all members");
}
