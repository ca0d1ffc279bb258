//! Workers process events occurring on connections: the TLS handshake,
//! request parsing, endpoint dispatch, and response completion. They are the
//! driver behind the entire request pipeline, besides accepting and
//! force-closing TCP connections.
//!
//! Workers run alongside each other, taking connections waiting to be
//! processed from the event queue. A worker stays pinned to its connection
//! for the whole request/response cycle; a keep-alive connection goes back
//! through the queue before its next request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::connection::{ConnState, Connection};
use crate::event::{Event, EventReceiver, EventSender};
use crate::exchange::Exchange;
use crate::limits::MAX_REQUEST_HEAD_LEN;
use crate::listener::ConnTable;
use crate::parser::parse_head;
use crate::registry::{EndpointRegistry, Lookup};
use crate::request::{BodyFraming, Request};
use crate::status::Status;

/// Worker that receives connections from the event queue and drives each
/// request to completion.
#[derive(Debug)]
pub(crate) struct Worker {
    events: EventReceiver,
    loopback: EventSender,
    registry: Arc<EndpointRegistry>,
    conn_table: Arc<ConnTable>,
    shutdown: Arc<AtomicBool>,
    strip_body_crlf: bool,
}

enum HeadOutcome {
    Complete(Vec<u8>),
    TooLarge,
    /// Peer gone or idle timeout; close without a response.
    Disconnected,
}

impl Worker {
    pub(crate) fn new(
        events: EventReceiver,
        loopback: EventSender,
        registry: Arc<EndpointRegistry>,
        conn_table: Arc<ConnTable>,
        shutdown: Arc<AtomicBool>,
        strip_body_crlf: bool,
    ) -> Self {
        Self {
            events,
            loopback,
            registry,
            conn_table,
            shutdown,
            strip_body_crlf,
        }
    }

    /// Main loop of the worker. Blocks the thread until a shutdown sentinel
    /// arrives or the queue is torn down.
    pub(crate) fn run(&self) {
        while let Ok(event) = self.events.recv() {
            match event {
                Event::Shutdown => return,
                Event::NewConnection(mut conn) => {
                    if self.shutdown.load(Ordering::SeqCst) {
                        self.close(conn);
                        continue;
                    }
                    if let Err(err) = conn.complete_handshake() {
                        tracing::debug!(code = err.code(), %err, "TLS handshake failed");
                        self.close(conn);
                        continue;
                    }
                    self.drive(conn);
                }
                Event::DataReady(conn) => {
                    if self.shutdown.load(Ordering::SeqCst) {
                        self.close(conn);
                        continue;
                    }
                    tracing::trace!(
                        client_index = conn.client_index(),
                        keep_alive = conn.keep_alive,
                        "connection re-armed"
                    );
                    self.drive(conn);
                }
            }
        }
    }

    fn drive(&self, mut conn: Connection) {
        let keep = self.serve_one(&mut conn);

        if keep && !self.shutdown.load(Ordering::SeqCst) && conn.state() != ConnState::Closing {
            conn.keep_alive = true;
            conn.set_state(ConnState::Idle);
            match self.loopback.send(Event::DataReady(conn)) {
                Ok(()) => return,
                Err(err) => {
                    // queue torn down mid-flight; reclaim the connection
                    if let Event::DataReady(conn) = err.0 {
                        self.close(conn);
                    }
                    return;
                }
            }
        }
        self.close(conn);
    }

    /// Serves a single request on `conn`, returning whether the connection
    /// may be re-armed for another.
    fn serve_one(&self, conn: &mut Connection) -> bool {
        conn.set_state(ConnState::ReadingHead);

        let head = match self.read_head(conn) {
            HeadOutcome::Complete(head) => head,
            HeadOutcome::TooLarge => {
                self.send_failure(conn, Status::RequestHeaderFieldsTooLarge);
                return false;
            }
            HeadOutcome::Disconnected => return false,
        };

        let request =
            match parse_head(&head).and_then(|h| Request::from_head(h, conn.client_index())) {
                Ok(request) => request,
                Err(err) => {
                    tracing::debug!(%err, "request head rejected");
                    self.send_failure(conn, err.status());
                    return false;
                }
            };

        // a declared body larger than the connection's remaining allowance
        // can never be admitted; refuse before reading any of it
        if let BodyFraming::ContentLength(n) = request.framing {
            if n > conn.body_budget() {
                self.send_failure(conn, Status::ContentTooLarge);
                return false;
            }
        }

        tracing::debug!(method = %request.method(), uri = request.uri(), "dispatching request");

        match self.registry.lookup(request.uri(), request.method()) {
            Lookup::NotRegistered => self.reject(conn, request, Status::NotFound),
            Lookup::MethodNotAllowed => self.reject(conn, request, Status::MethodNotAllowed),
            Lookup::Found(handler) => {
                conn.set_state(ConnState::Dispatching);
                let mut exchange = Exchange::new(conn, request, self.strip_body_crlf);
                match handler(&mut exchange) {
                    Ok(()) => {
                        let header_sent = exchange.response().header_sent();
                        match exchange.finish() {
                            Ok(keep) => keep,
                            Err(err) => {
                                tracing::debug!(code = err.code(), %err, "request teardown failed");
                                if !err.is_disconnect() && !header_sent {
                                    self.send_failure(conn, failure_status(&err));
                                }
                                false
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!(code = err.code(), %err, "handler failed");
                        let header_sent = exchange.response().header_sent();
                        drop(exchange);
                        if !header_sent && !err.is_disconnect() {
                            self.send_failure(conn, failure_status(&err));
                        }
                        false
                    }
                }
            }
        }
    }

    /// Answers a request that found no handler, draining its body so the
    /// connection stays reusable under keep-alive.
    fn reject(&self, conn: &mut Connection, request: Request, status: Status) -> bool {
        let mut exchange = Exchange::new(conn, request, false);
        if exchange.response_mut().set_status(status).is_err() {
            return false;
        }
        match exchange.finish() {
            Ok(keep) => keep,
            Err(err) => {
                tracing::debug!(code = err.code(), %err, "reject response failed");
                false
            }
        }
    }

    /// Accumulates bytes until the head terminator arrives. Stray CRLF pairs
    /// left over from the previous keep-alive request are swallowed first.
    fn read_head(&self, conn: &mut Connection) -> HeadOutcome {
        loop {
            let leading = conn
                .buffered()
                .iter()
                .take_while(|&&b| b == b'\r' || b == b'\n')
                .count();
            if leading > 0 {
                conn.consume(leading);
            }

            if let Some(pos) = find_head_end(conn.buffered()) {
                let head = conn.buffered()[..pos + 4].to_vec();
                conn.consume(pos + 4);
                return HeadOutcome::Complete(head);
            }

            if conn.buffered().len() > MAX_REQUEST_HEAD_LEN {
                return HeadOutcome::TooLarge;
            }

            match conn.read_more() {
                Ok(0) => return HeadOutcome::Disconnected,
                Ok(_) => {}
                Err(err) => {
                    tracing::trace!(code = err.code(), %err, "head read aborted");
                    return HeadOutcome::Disconnected;
                }
            }
        }
    }

    /// Writes a bare failure response. Used when no handler may run; the
    /// connection is closed afterwards, so `Connection: close` is advertised.
    fn send_failure(&self, conn: &mut Connection, status: Status) {
        conn.set_state(ConnState::Writing);
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            status,
            status.reason()
        );
        if let Err(err) = conn.write_all_bytes(head.as_bytes()) {
            tracing::trace!(code = err.code(), %err, "failure response not delivered");
        }
    }

    fn close(&self, mut conn: Connection) {
        let index = conn.client_index();
        conn.close();
        self.conn_table.remove(index);
        tracing::debug!(client_index = index, "connection closed");
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Status for a request that failed after dispatch began.
fn failure_status(err: &crate::error::EngineError) -> Status {
    use crate::error::EngineError;
    match err {
        EngineError::PayloadTooLarge => Status::ContentTooLarge,
        EngineError::ValidationFailed(_) => Status::BadRequest,
        _ => Status::InternalServerError,
    }
}
