//! Wire payloads and the RPC Sender interface.
//!
//! The actual wire encoding lives in `crate::transport`; this module only
//! defines the typed request/response structs and the trait the core
//! dispatches through, so unit tests can swap in a fake sender without
//! touching any sockets.

use crate::error::RpcError;
use crate::store::Entry;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntryPayload {
    pub term: u64,
    pub leader_id: String,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<Entry>,
    pub leader_commit: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppendEntryResponse {
    pub term: u64,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVotePayload {
    pub term: u64,
    pub candidate_id: String,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestVoteResponse {
    pub term: u64,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCommandPayload {
    pub client_command: Vec<u8>,
}

/// Ack returned to a client. Leader-only; followers redirect or fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCommandAck {
    Committed { index: u64 },
    NotLeader { leader_hint: Option<String> },
    Uncertain,
}

/// Any outbound request the core can send, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    AppendEntry(AppendEntryPayload),
    RequestVote(RequestVotePayload),
    ClientCommand(ClientCommandPayload),
}

/// Any inbound response the core can receive, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    AppendEntry(AppendEntryResponse),
    RequestVote(RequestVoteResponse),
    ClientCommand(ClientCommandAck),
}

/// The RPC Sender interface consumed by the core: opaque
/// request-response transport with a per-attempt timeout supplied by the
/// caller.
pub trait RequestSender: Send + Sync {
    fn send(&self, request: &Request, address: &str, port: u16, timeout: Duration) -> Result<Response, RpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_entry_request_round_trips_through_bincode() {
        let req = Request::AppendEntry(AppendEntryPayload {
            term: 7,
            leader_id: "a".into(),
            prev_log_index: 3,
            prev_log_term: 2,
            entries: vec![Entry { index: 4, term: 2, payload: b"x".to_vec() }],
            leader_commit: 3,
        });
        let encoded = bincode::serialize(&req).unwrap();
        let decoded: Request = bincode::deserialize(&encoded).unwrap();
        match decoded {
            Request::AppendEntry(p) => {
                assert_eq!(p.term, 7);
                assert_eq!(p.entries.len(), 1);
                assert_eq!(p.entries[0].payload, b"x".to_vec());
            }
            other => panic!("expected AppendEntry, got {other:?}"),
        }
    }

    #[test]
    fn request_vote_response_round_trips_through_bincode() {
        let resp = Response::RequestVote(RequestVoteResponse { term: 9, vote_granted: true });
        let encoded = bincode::serialize(&resp).unwrap();
        let decoded: Response = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, resp);
    }

    #[test]
    fn client_command_ack_round_trips_through_bincode() {
        let ack = ClientCommandAck::NotLeader { leader_hint: Some("b".into()) };
        let encoded = bincode::serialize(&ack).unwrap();
        let decoded: ClientCommandAck = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, ack);
    }
}
