//! Top-level wiring: assembles the default in-memory collaborators, the
//! Role Supervisor, and the TCP transport into one running replica.

use crate::applier::{Applier, LoggingApplier};
use crate::config::Config;
use crate::member::{InMemoryMemberRegistry, MemberRegistry};
use crate::role::{self, ReplicaHandle};
use crate::rpc::RequestSender;
use crate::store::{LogStore, MemoryLog};
use crate::term::{InMemoryTermStore, TermStore};
use crate::transport::{self, TcpRequestSender};
use std::io;
use std::sync::Arc;

/// Starts a replica using the default in-memory `LogStore`/`MemberRegistry`/
/// `TermStore`/`Applier` and a TCP transport, and returns a handle other
/// code in this process can submit requests through directly (bypassing the
/// network). Listener binding failures bubble up; everything else about the
/// replica's lifetime runs on background threads.
pub fn bootstrap(config: Config) -> io::Result<ReplicaHandle> {
    bootstrap_with(config, Arc::new(LoggingApplier))
}

/// Same as [`bootstrap`], but with a caller-supplied `Applier` so a host
/// process can wire committed entries into its own state machine.
pub fn bootstrap_with(config: Config, applier: Arc<dyn Applier>) -> io::Result<ReplicaHandle> {
    let log: Arc<dyn LogStore> = Arc::new(MemoryLog::new());
    let members: Arc<dyn MemberRegistry> = Arc::new(InMemoryMemberRegistry::new(config.me.clone(), config.peers.clone()));
    let terms: Arc<dyn TermStore> = Arc::new(InMemoryTermStore::new());
    let sender: Arc<dyn RequestSender> = Arc::new(TcpRequestSender);

    let address = config.me.address.clone();
    let port = config.me.port;
    let handle = role::start(config, log, members, terms, sender, applier);
    transport::serve(&address, port, handle.clone())?;
    Ok(handle)
}
