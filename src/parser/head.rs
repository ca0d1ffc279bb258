// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Single-pass parse of a buffered request head.

use crate::headers::Headers;
use crate::limits::{MAX_HEADER_COUNT, MAX_HEADER_VAL_LEN, MAX_METHOD_LEN, MAX_URI_LEN};

use super::{HeadCursor, Method, ParseError, ParseResult, Version};

/// Decoded request line plus header block.
#[derive(Debug)]
pub struct RequestHead {
    /// Request method.
    pub method: Method,
    /// Request target exactly as received.
    pub uri: String,
    /// HTTP version from the request line.
    pub version: Version,
    /// Header block, well-known and misc.
    pub headers: Headers,
}

/// Parses a complete request head (request line through the bare-CRLF
/// terminator). The buffer must contain the whole head and nothing after it.
///
/// Stray CRLF pairs before the request line are skipped; RFC 9112 Section 2.2
/// asks servers to tolerate them for robustness with keep-alive clients.
pub fn parse_head(buf: &[u8]) -> ParseResult<RequestHead> {
    let mut cursor = HeadCursor::new(buf);
    cursor.skip_while(|b| b == b'\r' || b == b'\n');

    let (method, uri, version) = parse_request_line(&mut cursor)?;
    let headers = parse_header_block(&mut cursor)?;

    Ok(RequestHead {
        method,
        uri,
        version,
        headers,
    })
}

fn parse_request_line(cursor: &mut HeadCursor<'_>) -> ParseResult<(Method, String, Version)> {
    let method_token = cursor.token_until(b' ', ParseError::Method)?;
    if method_token.is_empty() || method_token.len() > MAX_METHOD_LEN {
        return Err(ParseError::Method);
    }
    let method = Method::from_token(method_token).ok_or(ParseError::Method)?;

    let uri_token = cursor.token_until(b' ', ParseError::Target)?;
    if uri_token.is_empty() {
        return Err(ParseError::Target);
    }
    if uri_token.len() > MAX_URI_LEN {
        return Err(ParseError::TargetTooLong);
    }
    if !uri_token.iter().all(|&b| is_target_byte(b)) {
        return Err(ParseError::Target);
    }
    // target bytes were checked against an ASCII-only set above
    let uri = String::from_utf8(uri_token.to_vec()).map_err(|_| ParseError::Target)?;

    let version_token = cursor.line()?;
    let version = match version_token {
        b"HTTP/1.0" => Version::H1_0,
        b"HTTP/1.1" => Version::H1_1,
        _ => return Err(ParseError::Version),
    };

    Ok((method, uri, version))
}

fn parse_header_block(cursor: &mut HeadCursor<'_>) -> ParseResult<Headers> {
    let mut headers = Headers::new();
    let mut count = 0usize;

    loop {
        let line = cursor.line()?;
        if line.is_empty() {
            return Ok(headers);
        }

        count += 1;
        if count > MAX_HEADER_COUNT {
            return Err(ParseError::HeadTooLarge);
        }

        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or(ParseError::HeaderName)?;
        let (name, rest) = line.split_at(colon);
        if name.is_empty() || !name.iter().all(|&b| is_header_name_byte(b)) {
            return Err(ParseError::HeaderName);
        }

        // one optional leading space after the colon
        let mut value = &rest[1..];
        if value.first() == Some(&b' ') {
            value = &value[1..];
        }
        if value.len() > MAX_HEADER_VAL_LEN {
            return Err(ParseError::HeaderValueTooLarge);
        }
        if !value.iter().all(|&b| is_header_value_byte(b)) {
            return Err(ParseError::HeaderValue);
        }

        let name = std::str::from_utf8(name).map_err(|_| ParseError::HeaderName)?;
        let value = std::str::from_utf8(value).map_err(|_| ParseError::HeaderValue)?;
        headers.set(name, value);
    }
}

/// request-target bytes: printable ASCII minus SP.
#[inline]
fn is_target_byte(b: u8) -> bool {
    (0x21..=0x7e).contains(&b)
}

/// tchar per RFC 9110 Section 5.6.2.
#[inline]
fn is_header_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

/// field-content bytes: VCHAR, SP, HTAB and obs-text.
#[inline]
fn is_header_value_byte(b: u8) -> bool {
    b == b' ' || b == b'\t' || (0x21..=0x7e).contains(&b) || b >= 0x80
}
