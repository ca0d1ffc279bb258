//! Response model
//!
//! Holds the status line and header block until the first payload write
//! forces them onto the wire. The engine always emits `HTTP/1.1` regardless
//! of the request version.

use std::fmt::Write as _;

use crate::error::{EngineError, Result};
use crate::headers::Headers;
use crate::status::Status;

/// How the response body will be framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseFraming {
    /// No framing header set yet; payload writes are invalid.
    None,
    /// `Content-Length` with the declared size.
    ContentLength(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
}

/// Response model
#[derive(Debug)]
pub struct Response {
    status: Status,
    reason: Option<String>,
    headers: Headers,
    pub(crate) header_sent: bool,
    pub(crate) body_done: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Creates a response with the default `200 OK` status line.
    pub fn new() -> Self {
        Self {
            status: Status::Ok,
            reason: None,
            headers: Headers::new(),
            header_sent: false,
            body_done: false,
        }
    }

    /// Current status code.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Overrides the status line. Fails once the header block is on the wire.
    pub fn set_status(&mut self, status: Status) -> Result<()> {
        self.ensure_header_unsent()?;
        self.status = status;
        Ok(())
    }

    /// Overrides the reason phrase independently of the status code.
    pub fn set_reason(&mut self, reason: &str) -> Result<()> {
        self.ensure_header_unsent()?;
        self.reason = Some(reason.to_owned());
        Ok(())
    }

    /// Sets a response header. Fails once the header block is on the wire.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.ensure_header_unsent()?;
        if name.is_empty() {
            return Err(EngineError::InvalidParams("header name is empty"));
        }
        self.headers.set(name, value);
        Ok(())
    }

    /// Looks up a response header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Declares a fixed-size body of `len` bytes.
    pub fn set_content_length(&mut self, len: u64) {
        self.headers.remove("Transfer-Encoding");
        self.headers.set("Content-Length", &len.to_string());
    }

    /// Declares a chunked body.
    pub fn set_chunked(&mut self) {
        self.headers.remove("Content-Length");
        self.headers.set("Transfer-Encoding", "chunked");
    }

    /// True once the status line and header block are on the wire.
    pub fn header_sent(&self) -> bool {
        self.header_sent
    }

    /// Framing declared by the handler's headers.
    pub(crate) fn framing(&self) -> Result<ResponseFraming> {
        if self.headers.is_chunked() {
            return Ok(ResponseFraming::Chunked);
        }
        match self.headers.content_length() {
            Some(Ok(n)) => Ok(ResponseFraming::ContentLength(n)),
            Some(Err(())) => Err(EngineError::ValidationFailed(
                "response Content-Length is not a decimal integer",
            )),
            None => Ok(ResponseFraming::None),
        }
    }

    /// True when the handler asked for the connection to be closed.
    pub(crate) fn wants_close(&self) -> bool {
        self.headers
            .connection()
            .map(|v| v.trim().eq_ignore_ascii_case("close"))
            .unwrap_or(false)
    }

    /// Serializes the status line and header block.
    pub(crate) fn serialize_head(&self) -> String {
        let mut out = String::with_capacity(128);
        let reason = self
            .reason
            .as_deref()
            .unwrap_or_else(|| self.status.reason());
        let _ = write!(out, "HTTP/1.1 {} {}\r\n", self.status, reason);
        self.headers.write_lines(&mut out);
        out.push_str("\r\n");
        out
    }

    fn ensure_header_unsent(&self) -> Result<()> {
        if self.header_sent {
            return Err(EngineError::ValidationFailed(
                "response header block already sent",
            ));
        }
        Ok(())
    }
}
