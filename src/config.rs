//! Cluster configuration. Generalizes peer addressing to string host/port
//! (so the in-process test transport and the TCP transport can share one
//! shape) and validates timing relationships at construction time.

use crate::error::ConfigError;
use crate::member::MemberEntry;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub me: MemberEntry,
    pub peers: Vec<MemberEntry>,
    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
    pub heartbeat_interval: Duration,
    pub rpc_timeout: Duration,
    pub replicator_retry_backoff: Duration,
    pub replication_batch_size: usize,
}

impl Config {
    /// Builds a config from explicit values, validating that the heartbeat
    /// interval and election timeouts are in a sane relative order.
    pub fn new(
        me: MemberEntry,
        peers: Vec<MemberEntry>,
        election_timeout_min: Duration,
        election_timeout_max: Duration,
        heartbeat_interval: Duration,
    ) -> Result<Config, ConfigError> {
        if election_timeout_min >= election_timeout_max {
            return Err(ConfigError::InvertedElectionTimeout {
                min: election_timeout_min.as_millis() as u64,
                max: election_timeout_max.as_millis() as u64,
            });
        }
        if heartbeat_interval >= election_timeout_min {
            return Err(ConfigError::HeartbeatNotFasterThanElection {
                heartbeat_ms: heartbeat_interval.as_millis() as u64,
                election_min_ms: election_timeout_min.as_millis() as u64,
            });
        }
        if peers.iter().any(|p| p.id == me.id) {
            return Err(ConfigError::SelfNotInCluster(me.id));
        }
        Ok(Config {
            me,
            peers,
            election_timeout_min,
            election_timeout_max,
            heartbeat_interval,
            rpc_timeout: crate::constants::RPC_TIMEOUT,
            replicator_retry_backoff: crate::constants::REPLICATOR_RETRY_BACKOFF,
            replication_batch_size: crate::constants::REPLICATION_BATCH_SIZE,
        })
    }

    /// Loads a config from a TOML file, for the CLI harness and manual
    /// cluster testing.
    pub fn from_file(path: &str) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_string(), source })?;
        let file: ConfigFile = toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_string(), source })?;
        let me = file
            .members
            .iter()
            .find(|m| m.id == file.self_id)
            .cloned()
            .ok_or_else(|| ConfigError::SelfNotInCluster(file.self_id.clone()))?;
        let peers = file.members.into_iter().filter(|m| m.id != file.self_id).collect();
        Config::new(
            MemberEntry { id: me.id, address: me.address, port: me.port },
            peers.into_iter().map(|m: MemberFile| MemberEntry { id: m.id, address: m.address, port: m.port }).collect(),
            Duration::from_millis(file.election_timeout_min_ms.unwrap_or(crate::constants::ELECTION_TIMEOUT_MIN_MS)),
            Duration::from_millis(file.election_timeout_max_ms.unwrap_or(crate::constants::ELECTION_TIMEOUT_MAX_MS)),
            Duration::from_millis(file.heartbeat_interval_ms.unwrap_or(crate::constants::HEARTBEAT_INTERVAL_MS)),
        )
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(rename = "self")]
    self_id: String,
    members: Vec<MemberFile>,
    election_timeout_min_ms: Option<u64>,
    election_timeout_max_ms: Option<u64>,
    heartbeat_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct MemberFile {
    id: String,
    address: String,
    port: u16,
}
