//! The TCP transport: a length-prefixed bincode framing over
//! `std::net`, in the same blocking-thread style as the rest of this
//! codebase rather than an async runtime.

use crate::error::RpcError;
use crate::role::ReplicaHandle;
use crate::rpc::{Request, RequestSender, Response};
use log::{error, warn};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

/// Writes a 4-byte little-endian length prefix followed by `bytes`.
fn write_framed<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(bytes)?;
    writer.flush()
}

fn read_framed<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// The client side of the transport: dials, sends one request, reads one
/// response, all bounded by the caller-supplied per-attempt timeout.
pub struct TcpRequestSender;

impl RequestSender for TcpRequestSender {
    fn send(&self, request: &Request, address: &str, port: u16, timeout: Duration) -> Result<Response, RpcError> {
        let target = format!("{address}:{port}");
        let mut stream = TcpStream::connect_timeout(
            &target.parse().map_err(|_| RpcError::Timeout { address: target.clone() })?,
            timeout,
        )
        .map_err(|source| RpcError::TransportFailure { address: target.clone(), source })?;
        stream.set_read_timeout(Some(timeout)).ok();
        stream.set_write_timeout(Some(timeout)).ok();

        let encoded = bincode::serialize(request)?;
        write_framed(&mut stream, &encoded).map_err(|source| RpcError::TransportFailure { address: target.clone(), source })?;

        let response_bytes = read_framed(&mut stream).map_err(|source| RpcError::TransportFailure { address: target.clone(), source })?;
        let response = bincode::deserialize(&response_bytes)?;
        Ok(response)
    }
}

/// Binds a listener on `address:port` and serves inbound RPCs against
/// `handle` for as long as the process runs, one thread per connection
/// (mirroring the Replicator/Heartbeat "one thread per concurrent unit of
/// work" idiom used throughout this codebase).
pub fn serve(address: &str, port: u16, handle: ReplicaHandle) -> io::Result<()> {
    let listener = TcpListener::bind((address, port))?;
    thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let handle = handle.clone();
                    thread::spawn(move || handle_connection(stream, handle));
                }
                Err(err) => warn!("failed to accept inbound connection: {err}"),
            }
        }
    });
    Ok(())
}

fn handle_connection(mut stream: TcpStream, handle: ReplicaHandle) {
    loop {
        let request_bytes = match read_framed(&mut stream) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return,
            Err(err) => {
                warn!("connection read failed: {err}");
                return;
            }
        };
        let request: Request = match bincode::deserialize(&request_bytes) {
            Ok(req) => req,
            Err(err) => {
                warn!("failed to decode inbound request: {err}");
                return;
            }
        };

        let response = match request {
            Request::AppendEntry(payload) => Response::AppendEntry(handle.append_entries(payload)),
            Request::RequestVote(payload) => Response::RequestVote(handle.request_vote(payload)),
            Request::ClientCommand(payload) => Response::ClientCommand(handle.submit_command(payload.client_command)),
        };

        let encoded = match bincode::serialize(&response) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("failed to encode outbound response: {err}");
                return;
            }
        };
        if let Err(err) = write_framed(&mut stream, &encoded) {
            warn!("connection write failed: {err}");
            return;
        }
    }
}
