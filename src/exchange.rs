//! Handler-side view of one request/response cycle.
//!
//! An [`Exchange`] pins the connection to the worker thread for the whole
//! cycle: the handler pulls request-body bytes and pushes response bytes
//! through it, and both directions block on socket I/O. Backpressure comes
//! from the blocking write; nothing is buffered beyond one chunk.

use crate::connection::{ConnState, Connection};
use crate::error::{EngineError, Result};
use crate::limits::{MAX_CHUNK_SIZE_LINE, MAX_DATA_BUFFER_LEN, MAX_HEADER_COUNT};
use crate::request::{BodyFraming, Request};
use crate::response::{Response, ResponseFraming};

/// One payload transfer delivered to the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadChunk {
    /// Bytes written into the caller's buffer.
    pub bytes: usize,
    /// True once the whole body has been delivered.
    pub done: bool,
}

/// Request/response pair bound to its connection for the handler's lifetime.
#[derive(Debug)]
pub struct Exchange<'c> {
    conn: &'c mut Connection,
    request: Request,
    response: Response,
    strip_body_crlf: bool,
}

impl<'c> Exchange<'c> {
    pub(crate) fn new(conn: &'c mut Connection, request: Request, strip_body_crlf: bool) -> Self {
        Self {
            conn,
            request,
            response: Response::new(),
            strip_body_crlf,
        }
    }

    /// The decoded request head.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The response under construction.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Mutable access to the response for status and header setup.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Peer address of the owning connection as an (ip, port) pair.
    pub fn peer_info(&self) -> (String, u16) {
        self.conn.peer_info()
    }

    /// Reads the next slice of the request body into `buf`.
    ///
    /// Delivers at most [`MAX_DATA_BUFFER_LEN`] bytes per call regardless of
    /// the caller's capacity. Returns `done` once the body is exhausted; a
    /// request without body framing reports `done` immediately with zero
    /// bytes.
    pub fn read_payload(&mut self, buf: &mut [u8]) -> Result<PayloadChunk> {
        if buf.is_empty() {
            return Err(EngineError::InvalidParams("payload buffer is empty"));
        }
        if self.request.body_done {
            return Ok(PayloadChunk {
                bytes: 0,
                done: true,
            });
        }

        self.send_continue_if_expected()?;
        self.conn.set_state(ConnState::ReadingBody);

        let result = match self.request.framing {
            BodyFraming::None => {
                self.request.body_done = true;
                Ok(PayloadChunk {
                    bytes: 0,
                    done: true,
                })
            }
            BodyFraming::ContentLength(_) => self.read_sized_payload(buf),
            BodyFraming::Chunked => self.read_chunked_payload(buf),
        };

        if result.is_err() {
            // a failed body read is unrecoverable for this request
            self.request.body_done = true;
        }
        result
    }

    /// Sends one slice of the response body, returning true once the
    /// response is complete.
    ///
    /// With `Content-Length` set, the handler must deliver the entire body
    /// in a single call and the engine emits status line, headers and body
    /// at once. With chunked framing the first call emits the header block,
    /// every call emits one chunk, and an empty slice emits the terminating
    /// chunk. Without either framing header the call fails.
    pub fn send_payload(&mut self, data: &[u8]) -> Result<bool> {
        self.conn.set_state(ConnState::Writing);
        match self.response.framing()? {
            ResponseFraming::None => Err(EngineError::ValidationFailed(
                "response declares neither Content-Length nor chunked framing",
            )),
            ResponseFraming::ContentLength(declared) => {
                if self.response.header_sent {
                    return Err(EngineError::ValidationFailed(
                        "fixed-length response already sent",
                    ));
                }
                if data.len() as u64 != declared {
                    return Err(EngineError::ValidationFailed(
                        "payload length must equal Content-Length",
                    ));
                }
                let mut wire = self.response.serialize_head().into_bytes();
                wire.extend_from_slice(data);
                self.conn.write_all_bytes(&wire)?;
                self.response.header_sent = true;
                self.response.body_done = true;
                Ok(true)
            }
            ResponseFraming::Chunked => {
                if self.response.body_done {
                    return Err(EngineError::ValidationFailed(
                        "chunked response already terminated",
                    ));
                }
                if data.len() > MAX_DATA_BUFFER_LEN {
                    return Err(EngineError::ValidationFailed(
                        "chunk exceeds per-transfer limit",
                    ));
                }
                if !self.response.header_sent {
                    let head = self.response.serialize_head();
                    self.conn.write_all_bytes(head.as_bytes())?;
                    self.response.header_sent = true;
                }
                if data.is_empty() {
                    self.conn.write_all_bytes(b"0\r\n\r\n")?;
                    self.response.body_done = true;
                    Ok(true)
                } else {
                    let mut wire = format!("{:x}\r\n", data.len()).into_bytes();
                    wire.extend_from_slice(data);
                    wire.extend_from_slice(b"\r\n");
                    self.conn.write_all_bytes(&wire)?;
                    Ok(false)
                }
            }
        }
    }

    /// Consumes any request-body bytes the handler left unread, then
    /// completes the response. Returns whether the connection may be kept
    /// alive for the next request.
    pub(crate) fn finish(mut self) -> Result<bool> {
        let mut scratch = [0u8; MAX_DATA_BUFFER_LEN];
        while !self.request.body_done {
            self.read_payload(&mut scratch)?;
        }

        if !self.response.header_sent {
            match self.response.framing()? {
                ResponseFraming::None => {
                    self.response.set_content_length(0);
                    self.send_payload(&[])?;
                }
                ResponseFraming::ContentLength(0) => {
                    self.send_payload(&[])?;
                }
                ResponseFraming::ContentLength(_) => {
                    return Err(EngineError::ValidationFailed(
                        "handler declared a body it never sent",
                    ));
                }
                ResponseFraming::Chunked => {
                    self.send_payload(&[])?;
                }
            }
        } else if !self.response.body_done {
            // only chunked responses can be mid-body here
            self.send_payload(&[])?;
        }

        Ok(self.request.persistent() && !self.response.wants_close())
    }

    fn read_sized_payload(&mut self, buf: &mut [u8]) -> Result<PayloadChunk> {
        let want = (self.request.data_remaining as usize)
            .min(MAX_DATA_BUFFER_LEN)
            .min(buf.len());
        let read = self.conn.read_bytes(want, buf, true)?;
        if read == 0 && want > 0 {
            return Err(EngineError::ConnectionClosed);
        }
        self.conn.charge_body(read as u64)?;
        self.request.data_remaining -= read as u64;
        if self.request.data_remaining == 0 {
            self.request.body_done = true;
        }

        let bytes = if self.strip_body_crlf {
            strip_crlf_in_place(&mut buf[..read])
        } else {
            read
        };
        Ok(PayloadChunk {
            bytes,
            done: self.request.body_done,
        })
    }

    fn read_chunked_payload(&mut self, buf: &mut [u8]) -> Result<PayloadChunk> {
        if !self.request.in_chunk {
            let chunk_size = self.read_chunk_size_line()?;
            if chunk_size == 0 {
                self.discard_trailers()?;
                self.request.body_done = true;
                return Ok(PayloadChunk {
                    bytes: 0,
                    done: true,
                });
            }
            self.conn.charge_body(chunk_size)?;
            self.request.in_chunk = true;
            self.request.data_remaining = chunk_size;
        }

        let want = (self.request.data_remaining as usize)
            .min(MAX_DATA_BUFFER_LEN)
            .min(buf.len());
        let read = self.conn.read_bytes(want, buf, true)?;
        if read == 0 && want > 0 {
            return Err(EngineError::ConnectionClosed);
        }
        self.request.data_remaining -= read as u64;

        if self.request.data_remaining == 0 {
            self.request.in_chunk = false;
            self.consume_chunk_terminator()?;
        }
        Ok(PayloadChunk {
            bytes: read,
            done: false,
        })
    }

    /// Reads one `<hex-size>[;ext]CRLF` line, blocking for more input as
    /// needed.
    fn read_chunk_size_line(&mut self) -> Result<u64> {
        loop {
            if let Some(pos) = find_crlf(self.conn.buffered()) {
                if pos > MAX_CHUNK_SIZE_LINE {
                    return Err(EngineError::ValidationFailed("chunk size line too long"));
                }
                let line = &self.conn.buffered()[..pos];
                let digits = match line.iter().position(|&b| b == b';') {
                    Some(semi) => &line[..semi],
                    None => line,
                };
                let digits = std::str::from_utf8(digits)
                    .map_err(|_| EngineError::ValidationFailed("chunk size is not hex"))?
                    .trim();
                let size = u64::from_str_radix(digits, 16)
                    .map_err(|_| EngineError::ValidationFailed("chunk size is not hex"))?;
                self.conn.consume(pos + 2);
                return Ok(size);
            }

            if self.conn.buffered().len() > MAX_CHUNK_SIZE_LINE {
                return Err(EngineError::ValidationFailed("chunk size line too long"));
            }
            if self.conn.read_more()? == 0 {
                return Err(EngineError::ConnectionClosed);
            }
        }
    }

    /// Discards the trailer section after the terminating chunk, up to and
    /// including the final empty line. Trailer fields are ignored.
    fn discard_trailers(&mut self) -> Result<()> {
        for _ in 0..=MAX_HEADER_COUNT {
            let line_len = loop {
                if let Some(pos) = find_crlf(self.conn.buffered()) {
                    break pos;
                }
                if self.conn.buffered().len() > MAX_DATA_BUFFER_LEN {
                    return Err(EngineError::ValidationFailed("trailer line too long"));
                }
                if self.conn.read_more()? == 0 {
                    return Err(EngineError::ConnectionClosed);
                }
            };
            self.conn.consume(line_len + 2);
            if line_len == 0 {
                return Ok(());
            }
        }
        Err(EngineError::ValidationFailed("too many trailer fields"))
    }

    fn consume_chunk_terminator(&mut self) -> Result<()> {
        let mut crlf = [0u8; 2];
        let read = self.conn.read_bytes(2, &mut crlf, true)?;
        if read < 2 {
            return Err(EngineError::ConnectionClosed);
        }
        if &crlf != b"\r\n" {
            return Err(EngineError::ValidationFailed("chunk missing CRLF suffix"));
        }
        Ok(())
    }

    fn send_continue_if_expected(&mut self) -> Result<()> {
        if self.request.expects_continue() && !self.request.continue_sent {
            self.conn.write_all_bytes(b"HTTP/1.1 100 Continue\r\n\r\n")?;
            self.request.continue_sent = true;
        }
        Ok(())
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Compacts `buf` dropping CR and LF bytes, returning the new length.
fn strip_crlf_in_place(buf: &mut [u8]) -> usize {
    let mut kept = 0;
    for i in 0..buf.len() {
        let b = buf[i];
        if b != b'\r' && b != b'\n' {
            buf[kept] = b;
            kept += 1;
        }
    }
    kept
}

#[cfg(test)]
mod test {
    use super::{strip_crlf_in_place, Exchange};
    use crate::connection::Connection;
    use crate::error::EngineError;
    use crate::parser::parse_head;
    use crate::request::Request;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let client = TcpStream::connect(addr).expect("connect");
        let (server, _) = listener.accept().expect("accept");
        (server, client)
    }

    fn exchange_for<'c>(
        conn: &'c mut Connection,
        head: &[u8],
        strip_body_crlf: bool,
    ) -> Exchange<'c> {
        let request =
            Request::from_head(parse_head(head).expect("head parses"), 0).expect("request");
        Exchange::new(conn, request, strip_body_crlf)
    }

    fn connection_over(server: TcpStream) -> Connection {
        let peer = server.peer_addr().expect("peer");
        Connection::new(server, None, 0, peer, 1024 * 1024).expect("connection")
    }

    #[test]
    fn sized_body_is_delivered_and_done_at_zero_remaining() {
        let (server, mut client) = socket_pair();
        let mut conn = connection_over(server);
        client.write_all(b"hello world").expect("write body");

        let mut exchange = exchange_for(
            &mut conn,
            b"POST /v1/pkg HTTP/1.1\r\nContent-Length: 11\r\n\r\n",
            false,
        );

        let mut collected = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let chunk = exchange.read_payload(&mut buf).expect("read payload");
            collected.extend_from_slice(&buf[..chunk.bytes]);
            if chunk.done {
                break;
            }
        }
        assert_eq!(b"hello world", collected.as_slice());
    }

    #[test]
    fn chunked_body_reassembles_across_chunks() {
        let (server, mut client) = socket_pair();
        let mut conn = connection_over(server);
        client
            .write_all(b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n")
            .expect("write body");

        let mut exchange = exchange_for(
            &mut conn,
            b"POST /v1/pkg HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n",
            false,
        );

        let mut collected = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let chunk = exchange.read_payload(&mut buf).expect("read payload");
            collected.extend_from_slice(&buf[..chunk.bytes]);
            if chunk.done {
                break;
            }
        }
        assert_eq!(b"hello world", collected.as_slice());
    }

    #[test]
    fn empty_body_reports_done_immediately() {
        let (server, _client) = socket_pair();
        let mut conn = connection_over(server);
        let mut exchange = exchange_for(&mut conn, b"GET /v1/pkg HTTP/1.1\r\nHost: x\r\n\r\n", false);

        let mut buf = [0u8; 8];
        let chunk = exchange.read_payload(&mut buf).expect("read payload");
        assert_eq!(0, chunk.bytes);
        assert!(chunk.done);
    }

    #[test]
    fn peer_disconnect_mid_body_fails_with_connection_closed() {
        let (server, mut client) = socket_pair();
        let mut conn = connection_over(server);
        client.write_all(b"hel").expect("write partial body");
        drop(client);

        let mut exchange = exchange_for(
            &mut conn,
            b"POST /v1/pkg HTTP/1.1\r\nContent-Length: 10\r\n\r\n",
            false,
        );

        let mut buf = [0u8; 16];
        // the partial read arrives, then EOF fails the next call
        let mut saw_error = false;
        for _ in 0..3 {
            match exchange.read_payload(&mut buf) {
                Ok(chunk) if chunk.done => break,
                Ok(_) => continue,
                Err(EngineError::ConnectionClosed) => {
                    saw_error = true;
                    break;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(saw_error);
        assert!(exchange.request().body_done());
    }

    #[test]
    fn fixed_length_response_is_sent_in_one_shot() {
        let (server, mut client) = socket_pair();
        let mut conn = connection_over(server);
        let mut exchange = exchange_for(&mut conn, b"GET /v1/pkg HTTP/1.1\r\nHost: x\r\n\r\n", false);

        exchange.response_mut().set_content_length(2);
        let done = exchange.send_payload(b"ok").expect("send");
        assert!(done);
        drop(exchange);
        conn.close();

        let mut wire = Vec::new();
        client.read_to_end(&mut wire).expect("read response");
        let text = String::from_utf8(wire).expect("utf8");
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\nok"));
    }

    #[test]
    fn fixed_length_response_rejects_mismatched_payload() {
        let (server, _client) = socket_pair();
        let mut conn = connection_over(server);
        let mut exchange = exchange_for(&mut conn, b"GET /v1/pkg HTTP/1.1\r\nHost: x\r\n\r\n", false);

        exchange.response_mut().set_content_length(5);
        let err = exchange.send_payload(b"ok").expect_err("length mismatch");
        assert!(matches!(err, EngineError::ValidationFailed(_)));
    }

    #[test]
    fn chunked_response_frames_every_write() {
        let (server, mut client) = socket_pair();
        let mut conn = connection_over(server);
        let mut exchange = exchange_for(&mut conn, b"GET /v1/pkg HTTP/1.1\r\nHost: x\r\n\r\n", false);

        exchange.response_mut().set_chunked();
        assert!(!exchange.send_payload(b"hello").expect("chunk"));
        assert!(!exchange.send_payload(b" world").expect("chunk"));
        assert!(exchange.send_payload(&[]).expect("terminator"));
        drop(exchange);
        conn.close();

        let mut wire = Vec::new();
        client.read_to_end(&mut wire).expect("read response");
        let text = String::from_utf8(wire).expect("utf8");
        let body_start = text.find("\r\n\r\n").expect("head terminator") + 4;
        assert_eq!(
            "5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
            &text[body_start..]
        );
    }

    #[test]
    fn payload_write_without_framing_header_fails() {
        let (server, _client) = socket_pair();
        let mut conn = connection_over(server);
        let mut exchange = exchange_for(&mut conn, b"GET /v1/pkg HTTP/1.1\r\nHost: x\r\n\r\n", false);

        let err = exchange.send_payload(b"data").expect_err("no framing");
        assert!(matches!(err, EngineError::ValidationFailed(_)));
    }

    #[test]
    fn finish_drains_unread_body_and_completes_response() {
        let (server, mut client) = socket_pair();
        let mut conn = connection_over(server);
        client.write_all(b"unread body").expect("write body");

        let exchange = exchange_for(
            &mut conn,
            b"POST /v1/pkg HTTP/1.1\r\nContent-Length: 11\r\n\r\n",
            false,
        );

        // handler never touched body or response; finish must tidy both
        let keep_alive = exchange.finish().expect("finish");
        assert!(keep_alive);
        conn.close();

        let mut wire = Vec::new();
        client.read_to_end(&mut wire).expect("read response");
        let text = String::from_utf8(wire).expect("utf8");
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn expect_continue_is_sent_before_first_body_read() {
        let (server, mut client) = socket_pair();
        let mut conn = connection_over(server);
        client.write_all(b"hi").expect("write body");

        let mut exchange = exchange_for(
            &mut conn,
            b"POST /v1/pkg HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 2\r\n\r\n",
            false,
        );

        let mut buf = [0u8; 8];
        let chunk = exchange.read_payload(&mut buf).expect("read payload");
        assert_eq!(2, chunk.bytes);
        assert!(chunk.done);
        drop(exchange);
        conn.close();

        let mut wire = Vec::new();
        client.read_to_end(&mut wire).expect("read");
        assert!(String::from_utf8(wire)
            .expect("utf8")
            .starts_with("HTTP/1.1 100 Continue\r\n\r\n"));
    }

    #[test]
    fn crlf_stripping_is_opt_in() {
        let mut data = *b"a\r\nb\nc\r";
        let kept = strip_crlf_in_place(&mut data);
        assert_eq!(b"abc", &data[..kept]);

        let (server, mut client) = socket_pair();
        let mut conn = connection_over(server);
        client.write_all(b"x\r\ny").expect("write body");

        // default: binary bytes pass through verbatim
        let mut exchange = exchange_for(
            &mut conn,
            b"POST /v1/pkg HTTP/1.1\r\nContent-Length: 4\r\n\r\n",
            false,
        );
        let mut buf = [0u8; 8];
        let chunk = exchange.read_payload(&mut buf).expect("read payload");
        assert_eq!(4, chunk.bytes);
        assert_eq!(b"x\r\ny", &buf[..4]);
    }
}
