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

//! Byte cursor over a fully-buffered request head.

use super::{ParseError, ParseResult};

/// Forward-only cursor that yields delimited tokens from a head buffer.
///
/// The head is parsed in one pass: each `token_until` call consumes bytes up
/// to (and including) the delimiter and returns the token without it.
#[derive(Debug, Clone)]
pub(crate) struct HeadCursor<'a> {
    inner: &'a [u8],
    pos: usize,
}

impl<'a> HeadCursor<'a> {
    pub(crate) fn new(slice: &'a [u8]) -> Self {
        HeadCursor {
            inner: slice,
            pos: 0,
        }
    }

    #[inline]
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.pos == self.inner.len()
    }

    #[inline]
    pub(crate) fn peek(&self) -> Option<u8> {
        self.inner.get(self.pos).copied()
    }

    #[inline]
    fn next_byte(&mut self) -> Option<u8> {
        let b = self.inner.get(self.pos).copied();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    /// Consumes bytes while `predicate` holds without producing a token.
    #[inline]
    pub(crate) fn skip_while<F>(&mut self, predicate: F)
    where
        F: Fn(u8) -> bool,
    {
        while let Some(b) = self.peek() {
            if !predicate(b) {
                break;
            }
            self.pos += 1;
        }
    }

    /// Returns the token up to the next `delimiter` byte, consuming both.
    ///
    /// Fails when the delimiter never appears in the remaining input.
    #[inline]
    pub(crate) fn token_until(&mut self, delimiter: u8, err: ParseError) -> ParseResult<&'a [u8]> {
        let start = self.pos;
        while let Some(b) = self.next_byte() {
            if b == delimiter {
                return Ok(&self.inner[start..self.pos - 1]);
            }
        }
        self.pos = start;
        Err(err)
    }

    /// Returns one line, consuming its CRLF terminator.
    ///
    /// A bare LF or a CR not followed by LF is rejected.
    pub(crate) fn line(&mut self) -> ParseResult<&'a [u8]> {
        let start = self.pos;
        while let Some(b) = self.next_byte() {
            match b {
                b'\r' => {
                    return if self.next_byte() == Some(b'\n') {
                        Ok(&self.inner[start..self.pos - 2])
                    } else {
                        Err(ParseError::NewLine)
                    };
                }
                b'\n' => return Err(ParseError::NewLine),
                _ => {}
            }
        }
        Err(ParseError::NewLine)
    }
}

#[cfg(test)]
mod test {
    use super::HeadCursor;
    use crate::parser::ParseError;

    #[test]
    fn cursor_constructs_at_start() {
        let cur = HeadCursor::new(b"GET / HTTP/1.1");
        assert_eq!(0, cur.pos());
        assert!(!cur.is_empty());
    }

    #[test]
    fn token_until_consumes_token_and_delimiter() {
        let mut cur = HeadCursor::new(b"GET / HTTP/1.1");
        assert_eq!(
            Ok(b"GET" as &[u8]),
            cur.token_until(b' ', ParseError::Method)
        );
        assert_eq!(4, cur.pos());
        assert_eq!(Some(b'/'), cur.peek());
    }

    #[test]
    fn token_until_fails_without_delimiter_and_restores_position() {
        let mut cur = HeadCursor::new(b"GET/HTTP");
        assert_eq!(
            Err(ParseError::Method),
            cur.token_until(b' ', ParseError::Method)
        );
        assert_eq!(0, cur.pos());
    }

    #[test]
    fn line_consumes_crlf() {
        let mut cur = HeadCursor::new(b"Host: x\r\nNext");
        assert_eq!(Ok(b"Host: x" as &[u8]), cur.line());
        assert_eq!(Some(b'N'), cur.peek());
    }

    #[test]
    fn line_rejects_bare_lf() {
        let mut cur = HeadCursor::new(b"Host: x\nNext\r\n");
        assert_eq!(Err(ParseError::NewLine), cur.line());
    }

    #[test]
    fn skip_while_stops_at_first_mismatch() {
        let mut cur = HeadCursor::new(b"\r\n\r\nGET");
        cur.skip_while(|b| b == b'\r' || b == b'\n');
        assert_eq!(Some(b'G'), cur.peek());
    }
}
