//! Decoded request head and body-framing state.

use crate::headers::Headers;
use crate::parser::{Method, ParseError, ParseResult, RequestHead, Version};

/// How the remaining request body is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyFraming {
    /// No body-length header; the body is empty.
    None,
    /// `Content-Length` with the declared size.
    ContentLength(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
}

/// A parsed request, created once the head is complete and alive until the
/// handler returns and the response is fully written.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: String,
    version: Version,
    headers: Headers,
    client_index: usize,
    pub(crate) framing: BodyFraming,
    /// Bytes of the current body frame not yet delivered to the handler.
    pub(crate) data_remaining: u64,
    pub(crate) body_done: bool,
    /// Chunked only: a chunk body is in progress.
    pub(crate) in_chunk: bool,
    pub(crate) continue_sent: bool,
}

impl Request {
    /// Builds a request from a parsed head, deriving body framing.
    pub(crate) fn from_head(head: RequestHead, client_index: usize) -> ParseResult<Self> {
        let has_length = head.headers.get("Content-Length").is_some();
        let chunked = head.headers.is_chunked();
        if has_length && chunked {
            // ambiguous framing is a smuggling vector, not a recoverable quirk
            return Err(ParseError::ContentLength);
        }

        let framing = if chunked {
            BodyFraming::Chunked
        } else if has_length {
            match head.headers.content_length() {
                Some(Ok(n)) => BodyFraming::ContentLength(n),
                _ => return Err(ParseError::ContentLength),
            }
        } else {
            BodyFraming::None
        };

        let data_remaining = match framing {
            BodyFraming::ContentLength(n) => n,
            _ => 0,
        };

        Ok(Self {
            method: head.method,
            uri: head.uri,
            version: head.version,
            headers: head.headers,
            client_index,
            framing,
            data_remaining,
            body_done: matches!(framing, BodyFraming::None),
            in_chunk: false,
            continue_sent: false,
        })
    }

    /// Request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Request URI exactly as received.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// HTTP version from the request line.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Looks up a request header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// All request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Slot of the owning connection in the engine's connection table.
    pub fn client_index(&self) -> usize {
        self.client_index
    }

    /// True once the whole body has been delivered to the handler.
    pub fn body_done(&self) -> bool {
        self.body_done
    }

    /// Keep-alive decision for this request: HTTP/1.1 defaults to keep-open
    /// unless `Connection: close`; HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive`.
    pub fn persistent(&self) -> bool {
        let connection = self.headers.connection().map(str::trim);
        match self.version {
            Version::H1_1 => !connection
                .map(|v| v.eq_ignore_ascii_case("close"))
                .unwrap_or(false),
            Version::H1_0 => connection
                .map(|v| v.eq_ignore_ascii_case("keep-alive"))
                .unwrap_or(false),
        }
    }

    /// True when the client asked for `100 Continue` before sending its body.
    pub(crate) fn expects_continue(&self) -> bool {
        self.version == Version::H1_1
            && self
                .headers
                .expect()
                .map(|v| v.trim().eq_ignore_ascii_case("100-continue"))
                .unwrap_or(false)
    }
}
