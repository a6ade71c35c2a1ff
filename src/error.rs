//! Typed errors for the replica core.
//!
//! Only transport and decode failures are surfaced to internal callers as
//! `Result`s; everything else (stale terms, log mismatches, "no decision"
//! elections) is modeled as a typed outcome rather than an error (see
//! `crate::election::Outcome`, `crate::replicator`).

use std::io;
use thiserror::Error;

/// Errors that can occur while sending or serving an RPC.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport failure talking to {address}: {source}")]
    TransportFailure {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("timed out waiting on {address}")]
    Timeout { address: String },
    #[error("failed to decode wire message: {0}")]
    DecodeFailure(#[from] bincode::Error),
}

impl RpcError {
    /// Decode failures are treated as transport failures for the purposes of
    /// a single RPC attempt: both just mean "this attempt produced no usable
    /// response."
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::TransportFailure { .. } | RpcError::Timeout { .. } | RpcError::DecodeFailure(_))
    }
}

/// Errors returned by a `LogStore` implementation.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("no log entry at index {0}")]
    NotFound(u64),
    #[error("log storage failure: {0}")]
    Storage(#[from] io::Error),
}

/// Errors raised while validating or loading a `Config`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("heartbeat interval ({heartbeat_ms}ms) must be strictly less than the minimum election timeout ({election_min_ms}ms)")]
    HeartbeatNotFasterThanElection {
        heartbeat_ms: u64,
        election_min_ms: u64,
    },
    #[error("election timeout minimum ({min}ms) must be less than the maximum ({max}ms)")]
    InvertedElectionTimeout { min: u64, max: u64 },
    #[error("self id {0} is not present in the cluster member list")]
    SelfNotInCluster(String),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Outcome of a client command submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommandOutcome {
    /// The command was appended and committed.
    Committed { index: u64 },
    /// This replica isn't the leader; `leader_hint` names the last-known
    /// leader, if any.
    NotLeader { leader_hint: Option<String> },
    /// The command was appended locally but leadership was lost before it
    /// committed. Callers must dedupe retries with an idempotency key
    /// (out of scope for this core).
    Uncertain,
}
