//! Per-connection transport, receive buffer, and I/O contracts.
//!
//! A connection is owned by exactly one worker at a time; ownership moves
//! between threads only through the event queue. All reads and writes are
//! blocking, with the socket read timeout carrying the engine's idle-timeout
//! policy.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;

use rustls::{ServerConfig, ServerConnection, StreamOwned};

use crate::error::{EngineError, Result};

/// Lifecycle of one connection while a worker drives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnState {
    /// Waiting for or reading the request head.
    ReadingHead,
    /// Streaming body bytes to the handler.
    ReadingBody,
    /// Handler is running.
    Dispatching,
    /// Streaming response bytes to the peer.
    Writing,
    /// Between keep-alive requests.
    Idle,
    /// Torn down; must never re-enter the event queue.
    Closing,
}

/// Plaintext or TLS transport over the accepted socket.
pub(crate) enum Transport {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ServerConnection, TcpStream>>),
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Plain(_) => f.write_str("Transport::Plain"),
            Transport::Tls(_) => f.write_str("Transport::Tls"),
        }
    }
}

/// Buffered, blocking connection handle.
#[derive(Debug)]
pub(crate) struct Connection {
    transport: Transport,
    client_index: usize,
    peer: SocketAddr,
    buf: Vec<u8>,
    start: usize,
    state: ConnState,
    pub(crate) keep_alive: bool,
    /// Remaining request-body byte allowance for this connection.
    body_budget: u64,
}

impl Connection {
    /// Wraps an accepted socket, attaching a TLS session in secure mode.
    pub(crate) fn new(
        stream: TcpStream,
        tls: Option<&Arc<ServerConfig>>,
        client_index: usize,
        peer: SocketAddr,
        body_budget: u64,
    ) -> Result<Self> {
        let transport = match tls {
            Some(config) => {
                let session = ServerConnection::new(config.clone())
                    .map_err(|e| EngineError::Tls(e.to_string()))?;
                Transport::Tls(Box::new(StreamOwned::new(session, stream)))
            }
            None => Transport::Plain(stream),
        };

        Ok(Self {
            transport,
            client_index,
            peer,
            buf: Vec::with_capacity(4096),
            start: 0,
            state: ConnState::ReadingHead,
            keep_alive: false,
            body_budget,
        })
    }

    pub(crate) fn client_index(&self) -> usize {
        self.client_index
    }

    pub(crate) fn state(&self) -> ConnState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ConnState) {
        self.state = state;
    }

    /// Peer address as an (ip, port) pair.
    pub(crate) fn peer_info(&self) -> (String, u16) {
        (self.peer.ip().to_string(), self.peer.port())
    }

    /// Runs the TLS handshake to completion. No-op for plaintext.
    pub(crate) fn complete_handshake(&mut self) -> Result<()> {
        if let Transport::Tls(tls) = &mut self.transport {
            while tls.conn.is_handshaking() {
                tls.conn
                    .complete_io(&mut tls.sock)
                    .map_err(map_tls_io_error)?;
            }
        }
        Ok(())
    }

    /// Bytes received but not yet consumed.
    pub(crate) fn buffered(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    /// Marks `n` buffered bytes as consumed.
    pub(crate) fn consume(&mut self, n: usize) {
        self.start = (self.start + n).min(self.buf.len());
        if self.start == self.buf.len() {
            self.buf.clear();
            self.start = 0;
        }
    }

    /// One blocking read appending to the receive buffer.
    ///
    /// Returns the number of bytes read; zero means the peer closed.
    pub(crate) fn read_more(&mut self) -> Result<usize> {
        let mut chunk = [0u8; 4096];
        let n = self.transport_read(&mut chunk)?;
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Reads up to `n` bytes into `out`, honoring the wait-vs-poll contract:
    /// with `wait` the call blocks until `n` bytes arrived or the peer
    /// closed; without it only already-buffered bytes are returned.
    pub(crate) fn read_bytes(&mut self, n: usize, out: &mut [u8], wait: bool) -> Result<usize> {
        let want = n.min(out.len());
        let mut copied = self.copy_buffered(&mut out[..want]);

        if !wait {
            return Ok(copied);
        }

        while copied < want {
            let mut chunk = [0u8; 4096];
            let take = (want - copied).min(chunk.len());
            let read = self.transport_read(&mut chunk[..take])?;
            if read == 0 {
                break;
            }
            out[copied..copied + read].copy_from_slice(&chunk[..read]);
            copied += read;
        }
        Ok(copied)
    }

    /// Writes all of `data` or fails; partial writes are retried internally.
    pub(crate) fn write_all_bytes(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.transport {
            Transport::Plain(stream) => {
                stream.write_all(data).map_err(EngineError::from_io)?;
                stream.flush().map_err(EngineError::from_io)?;
            }
            Transport::Tls(tls) => {
                tls.write_all(data).map_err(map_tls_io_error)?;
                tls.flush().map_err(map_tls_io_error)?;
            }
        }
        Ok(())
    }

    /// Remaining request-body byte allowance.
    pub(crate) fn body_budget(&self) -> u64 {
        self.body_budget
    }

    /// Charges `n` body bytes against the per-connection allowance.
    pub(crate) fn charge_body(&mut self, n: u64) -> Result<()> {
        if n > self.body_budget {
            self.body_budget = 0;
            return Err(EngineError::PayloadTooLarge);
        }
        self.body_budget -= n;
        Ok(())
    }

    /// Closes the connection, sending a TLS close-notify when applicable.
    pub(crate) fn close(&mut self) {
        self.state = ConnState::Closing;
        match &mut self.transport {
            Transport::Plain(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
            Transport::Tls(tls) => {
                tls.conn.send_close_notify();
                let _ = tls.conn.complete_io(&mut tls.sock);
                let _ = tls.sock.shutdown(Shutdown::Both);
            }
        }
    }

    fn copy_buffered(&mut self, out: &mut [u8]) -> usize {
        let available = self.buf.len() - self.start;
        let take = available.min(out.len());
        out[..take].copy_from_slice(&self.buf[self.start..self.start + take]);
        self.consume(take);
        take
    }

    fn transport_read(&mut self, out: &mut [u8]) -> Result<usize> {
        loop {
            let result = match &mut self.transport {
                Transport::Plain(stream) => stream.read(out).map_err(EngineError::from_io),
                Transport::Tls(tls) => tls.read(out).map_err(map_tls_io_error),
            };
            match result {
                Err(EngineError::Io(ref e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }
}

/// TLS reads surface record-layer failures as `InvalidData` I/O errors;
/// everything else keeps the socket-level classification.
fn map_tls_io_error(err: io::Error) -> EngineError {
    if err.kind() == io::ErrorKind::InvalidData {
        EngineError::Tls(err.to_string())
    } else {
        EngineError::from_io(err)
    }
}
