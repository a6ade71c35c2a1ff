//! A thin command-line harness for exercising a running replica's RPC
//! surface by hand: submit a client command, or send a raw AppendEntries
//! or RequestVote straight at a replica's address.

use clap::{Parser, Subcommand};
use raftcore::store::Entry;
use raftcore::transport::TcpRequestSender;
use raftcore::{AppendEntryPayload, RequestVotePayload};
use raftcore::rpc::{ClientCommandPayload, Request, RequestSender, Response};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "raftctl", about = "Exercise a replica's RPC surface directly")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a client command to the replica, expecting a leader ack or redirect.
    Clientcmd {
        #[arg(long, default_value = "127.0.0.1")]
        ip: String,
        #[arg(long, default_value_t = 4546)]
        port: u16,
        #[arg(long, default_value = "")]
        payload: String,
    },
    /// Send a raw AppendEntries RPC.
    Aecmd {
        #[arg(long, default_value = "127.0.0.1")]
        ip: String,
        #[arg(long, default_value_t = 4546)]
        port: u16,
        #[arg(long, default_value = "")]
        entries: String,
        #[arg(long)]
        leaderid: String,
        #[arg(long, default_value_t = 0)]
        prevlogindex: u64,
        #[arg(long, default_value_t = 0)]
        prevlogterm: u64,
        #[arg(long, default_value_t = 0)]
        leadercommit: u64,
        #[arg(long, default_value_t = 0)]
        term: u64,
    },
    /// Send a raw RequestVote RPC.
    Votecmd {
        #[arg(long, default_value = "127.0.0.1")]
        ip: String,
        #[arg(long, default_value_t = 4546)]
        port: u16,
        #[arg(long)]
        candidateid: String,
        #[arg(long, default_value_t = 0)]
        lastlogindex: u64,
        #[arg(long, default_value_t = 0)]
        lastlogterm: u64,
        #[arg(long, default_value_t = 0)]
        term: u64,
    },
}

const TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let sender = TcpRequestSender;

    let (ip, port, request) = match cli.command {
        Command::Clientcmd { ip, port, payload } => {
            println!("sending client command {payload:?} to {ip}:{port}");
            (ip, port, Request::ClientCommand(ClientCommandPayload { client_command: payload.into_bytes() }))
        }
        Command::Aecmd { ip, port, entries, leaderid, prevlogindex, prevlogterm, leadercommit, term } => {
            println!("sending append-entries to {ip}:{port}");
            let entries = if entries.is_empty() {
                vec![]
            } else {
                vec![Entry { index: prevlogindex + 1, term, payload: entries.into_bytes() }]
            };
            let payload = AppendEntryPayload {
                term,
                leader_id: leaderid,
                prev_log_index: prevlogindex,
                prev_log_term: prevlogterm,
                entries,
                leader_commit: leadercommit,
            };
            (ip, port, Request::AppendEntry(payload))
        }
        Command::Votecmd { ip, port, candidateid, lastlogindex, lastlogterm, term } => {
            println!("sending request-vote to {ip}:{port}");
            let payload = RequestVotePayload { term, candidate_id: candidateid, last_log_index: lastlogindex, last_log_term: lastlogterm };
            (ip, port, Request::RequestVote(payload))
        }
    };

    match sender.send(&request, &ip, port, TIMEOUT) {
        Ok(Response::AppendEntry(resp)) => {
            println!("{resp:?}");
            ExitCode::SUCCESS
        }
        Ok(Response::RequestVote(resp)) => {
            println!("{resp:?}");
            ExitCode::SUCCESS
        }
        Ok(Response::ClientCommand(ack)) => {
            println!("{ack:?}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("request failed: {err}");
            ExitCode::FAILURE
        }
    }
}
