//! A replica's control core for Raft leader election, log replication, and
//! commit advancement: the Role Supervisor, Election Engine, per-peer
//! Replicators, Heartbeat Emitter, and Commit Advancer, plus the storage
//! and membership traits they're built against.

pub mod applier;
pub mod commit;
pub mod config;
pub mod constants;
pub mod election;
pub mod error;
pub mod heartbeat;
pub mod member;
pub mod replicator;
pub mod role;
pub mod rpc;
pub mod server;
pub mod store;
pub mod term;
pub mod transport;

pub use config::Config;
pub use error::{ClientCommandOutcome, ConfigError, LogError, RpcError};
pub use member::{InMemoryMemberRegistry, MemberEntry, MemberRegistry};
pub use role::ReplicaHandle;
pub use rpc::{AppendEntryPayload, AppendEntryResponse, RequestVotePayload, RequestVoteResponse};
pub use store::{Entry, LogStore, MemoryLog};
pub use term::{InMemoryTermStore, TermStore};
