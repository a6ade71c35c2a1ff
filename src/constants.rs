//! Tunable constants. Most are overridable through `Config`; these are the
//! defaults used when a caller doesn't care to override them.

use std::time::Duration;

pub const ELECTION_TIMEOUT_MIN_MS: u64 = 150;
pub const ELECTION_TIMEOUT_MAX_MS: u64 = 300;
pub const HEARTBEAT_INTERVAL_MS: u64 = 75;
pub const RPC_TIMEOUT: Duration = Duration::from_millis(100);
pub const REPLICATOR_RETRY_BACKOFF: Duration = Duration::from_millis(25);
pub const REPLICATION_BATCH_SIZE: usize = 64;
