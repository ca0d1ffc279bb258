//! Accept loop feeding the worker event queue.
//!
//! One acceptor thread polls the listening sockets plus a waker used for the
//! shutdown wake-up. Accepted sockets are switched to blocking mode with the
//! configured read timeout and handed to the workers as `NewConnection`
//! events; the acceptor never reads request bytes itself.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener as StdTcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mio::net::TcpListener as MioTcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use slab::Slab;

use crate::config::EngineConfig;
use crate::connection::Connection;
use crate::error::{EngineError, Result};
use crate::event::{Event, EventSender};

const LISTEN_V4_TOKEN: Token = Token(usize::MAX);
const LISTEN_V6_TOKEN: Token = Token(usize::MAX - 1);
const WAKE_TOKEN: Token = Token(usize::MAX - 2);

/// Entry in the connection table: a second handle to the accepted socket so
/// shutdown can force-close connections owned by blocked workers.
#[derive(Debug)]
struct ConnSlot {
    stream: TcpStream,
}

/// Table of live connections, indexed by client slot.
#[derive(Debug, Default)]
pub(crate) struct ConnTable {
    slots: Mutex<Slab<ConnSlot>>,
}

impl ConnTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts a slot unless the table already holds `cap` connections.
    fn insert_within(&self, cap: usize, slot: ConnSlot) -> Option<usize> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.len() >= cap {
            return None;
        }
        Some(slots.insert(slot))
    }

    /// Releases a client slot once its connection is closed.
    pub(crate) fn remove(&self, index: usize) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.try_remove(index);
    }

    /// Shuts every tracked socket down, unblocking workers parked in reads.
    pub(crate) fn force_close_all(&self) {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        for (_, slot) in slots.iter() {
            let _ = slot.stream.shutdown(std::net::Shutdown::Both);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

struct ListenerEntry {
    accept: StdTcpListener,
    // keeps the mio registration alive; dropped with the acceptor
    _registration: MioTcpListener,
    token: Token,
}

/// Socket acceptor for the engine.
pub(crate) struct Acceptor {
    poll: Poll,
    listeners: Vec<ListenerEntry>,
    events_tx: EventSender,
    conn_table: Arc<ConnTable>,
    tls: Option<Arc<rustls::ServerConfig>>,
    shutdown: Arc<AtomicBool>,
    read_timeout: Duration,
    client_cap: usize,
    body_budget: u64,
}

impl std::fmt::Debug for Acceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acceptor")
            .field("listeners", &self.listeners.len())
            .field("client_cap", &self.client_cap)
            .finish()
    }
}

impl Acceptor {
    /// Binds the listener set and prepares the poll loop.
    ///
    /// The IPv4 listener is required; IPv6 is attempted on the same port and
    /// skipped with a warning when the bind fails.
    pub(crate) fn bind(
        config: &EngineConfig,
        events_tx: EventSender,
        conn_table: Arc<ConnTable>,
        tls: Option<Arc<rustls::ServerConfig>>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<(Self, Arc<Waker>)> {
        let poll = Poll::new().map_err(EngineError::from_io)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN).map_err(EngineError::from_io)?);

        let mut listeners = Vec::with_capacity(2);
        let v4_addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
        listeners.push(Self::bind_one(&poll, v4_addr, LISTEN_V4_TOKEN)?);

        let v6_addr: SocketAddr =
            (std::net::Ipv6Addr::UNSPECIFIED, config.port).into();
        match Self::bind_one(&poll, v6_addr, LISTEN_V6_TOKEN) {
            Ok(entry) => listeners.push(entry),
            Err(err) => {
                tracing::warn!(port = config.port, %err, "IPv6 listener unavailable");
            }
        }

        Ok((
            Self {
                poll,
                listeners,
                events_tx,
                conn_table,
                tls,
                shutdown,
                read_timeout: Duration::from_secs(u64::from(config.conn_timeout_secs)),
                client_cap: config.client_count,
                body_budget: config.max_data_per_conn_bytes(),
            },
            waker,
        ))
    }

    fn bind_one(poll: &Poll, addr: SocketAddr, token: Token) -> Result<ListenerEntry> {
        let listener = StdTcpListener::bind(addr).map_err(EngineError::from_io)?;
        listener.set_nonblocking(true).map_err(EngineError::from_io)?;
        let accept = listener.try_clone().map_err(EngineError::from_io)?;

        let mut registration = MioTcpListener::from_std(listener);
        poll.registry()
            .register(&mut registration, token, Interest::READABLE)
            .map_err(EngineError::from_io)?;

        Ok(ListenerEntry {
            accept,
            _registration: registration,
            token,
        })
    }

    /// Runs the accept loop until the shutdown flag is raised.
    pub(crate) fn run(&mut self) {
        let mut events = Events::with_capacity(64);

        loop {
            if let Err(err) = self.poll.poll(&mut events, None) {
                if err.kind() == ErrorKind::Interrupted {
                    continue;
                }
                tracing::error!(%err, "acceptor poll failed");
                return;
            }

            for event in events.iter() {
                match event.token() {
                    WAKE_TOKEN => {}
                    token => {
                        if !self.shutdown.load(Ordering::SeqCst) {
                            self.accept_ready(token);
                        }
                    }
                }
            }

            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    fn accept_ready(&mut self, token: Token) {
        let Some(index) = self.listeners.iter().position(|l| l.token == token) else {
            return;
        };

        loop {
            match self.listeners[index].accept.accept() {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(ref err) if err.kind() == ErrorKind::WouldBlock => return,
                Err(ref err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    tracing::error!(%err, "accept failed");
                    return;
                }
            }
        }
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(err) = Self::configure(&stream, self.read_timeout) {
            tracing::debug!(%peer, %err, "dropping connection: socket setup failed");
            return;
        }

        let table_handle = match stream.try_clone() {
            Ok(clone) => clone,
            Err(err) => {
                tracing::debug!(%peer, %err, "dropping connection: handle clone failed");
                return;
            }
        };

        let Some(client_index) = self
            .conn_table
            .insert_within(self.client_cap, ConnSlot { stream: table_handle })
        else {
            tracing::warn!(%peer, cap = self.client_cap, "client limit reached, dropping connection");
            let _ = stream.shutdown(std::net::Shutdown::Both);
            return;
        };

        match Connection::new(stream, self.tls.as_ref(), client_index, peer, self.body_budget) {
            Ok(conn) => {
                tracing::debug!(%peer, client_index, "accepted connection");
                if self.events_tx.send(Event::NewConnection(conn)).is_err() {
                    // workers are gone; nothing left to serve
                    self.conn_table.remove(client_index);
                }
            }
            Err(err) => {
                tracing::debug!(%peer, %err, "dropping connection: session setup failed");
                self.conn_table.remove(client_index);
            }
        }
    }

    fn configure(stream: &TcpStream, read_timeout: Duration) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(read_timeout))?;
        stream.set_nodelay(true)
    }
}

#[cfg(test)]
mod test {
    use super::{Acceptor, ConnTable};
    use crate::config::EngineConfig;
    use crate::event::event_queue;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn conn_table_enforces_capacity() {
        let table = ConnTable::new();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");

        let mut clients = Vec::new();
        for _ in 0..2 {
            clients.push(std::net::TcpStream::connect(addr).expect("connect"));
            let (stream, _) = listener.accept().expect("accept");
            assert!(table.insert_within(2, super::ConnSlot { stream }).is_some());
        }

        clients.push(std::net::TcpStream::connect(addr).expect("connect"));
        let (stream, _) = listener.accept().expect("accept");
        assert!(table.insert_within(2, super::ConnSlot { stream }).is_none());
        assert_eq!(2, table.len());

        table.remove(0);
        assert_eq!(1, table.len());
    }

    #[test]
    fn bind_attaches_ipv4_listener() {
        let mut config = EngineConfig::default();
        // port 0 keeps the test hermetic; the kernel picks a free port
        config.port = 0;

        let (tx, _rx) = event_queue();
        let result = Acceptor::bind(
            &config,
            tx,
            Arc::new(ConnTable::new()),
            None,
            Arc::new(AtomicBool::new(false)),
        );
        let (acceptor, _waker) = result.expect("bind succeeds");
        assert!(!acceptor.listeners.is_empty());
    }
}
