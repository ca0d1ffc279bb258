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

//! Parser for the HTTP/1.x request head.

use std::fmt::Display;

use crate::status::Status;

mod cursor;
mod head;

pub use head::{parse_head, RequestHead};

pub(crate) use cursor::HeadCursor;

/// Representation of the requested HTTP Method
/// [IETF RFC 9110 Section 9](https://www.rfc-editor.org/rfc/rfc9110#section-9)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// RFC 9110 9.3.1
    Get,
    /// RFC 9110 9.3.2
    Head,
    /// RFC 9110 9.3.3
    Post,
    /// RFC 9110 9.3.4
    Put,
    /// RFC 9110 9.3.5
    Delete,
    /// RFC 5789
    Patch,
}

impl Method {
    /// Parses one of the recognized uppercase method tokens.
    pub fn from_token(token: &[u8]) -> Option<Self> {
        match token {
            b"GET" => Some(Self::Get),
            b"HEAD" => Some(Self::Head),
            b"POST" => Some(Self::Post),
            b"PUT" => Some(Self::Put),
            b"DELETE" => Some(Self::Delete),
            b"PATCH" => Some(Self::Patch),
            _ => None,
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        })
    }
}

/// Representation of the requested HTTP version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// HTTP/1.0
    H1_0,
    /// HTTP/1.1
    H1_1,
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::H1_0 => "HTTP/1.0",
            Self::H1_1 => "HTTP/1.1",
        })
    }
}

/// Represents possible failures while parsing
#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Unrecognized or malformed method token.
    Method,
    /// Invalid byte in target.
    Target,
    /// Target exceeds the URI length limit.
    TargetTooLong,
    /// Invalid or unsupported HTTP version.
    Version,
    /// Invalid byte in header name.
    HeaderName,
    /// Invalid byte in header value.
    HeaderValue,
    /// Header value exceeds the per-value limit.
    HeaderValueTooLarge,
    /// Header count or total head size exceeds the caps.
    HeadTooLarge,
    /// Invalid or missing new line.
    NewLine,
    /// Content-Length header did not parse as a decimal integer.
    ContentLength,
}

impl ParseError {
    fn description_str(&self) -> &'static str {
        match *self {
            ParseError::Method => "Invalid token in method",
            ParseError::Target => "Invalid token in target",
            ParseError::TargetTooLong => "Target exceeds URI length limit",
            ParseError::Version => "Invalid version",
            ParseError::HeaderName => "Invalid token in header name",
            ParseError::HeaderValue => "Invalid token in header value",
            ParseError::HeaderValueTooLarge => "Header value exceeds length limit",
            ParseError::HeadTooLarge => "Request head exceeds size limits",
            ParseError::NewLine => "Invalid or missing new line",
            ParseError::ContentLength => "Invalid Content-Length value",
        }
    }

    /// Status sent to the client when this error aborts a request.
    pub fn status(&self) -> Status {
        match *self {
            ParseError::Method => Status::NotImplemented,
            ParseError::TargetTooLong => Status::UriTooLong,
            ParseError::HeaderValueTooLarge | ParseError::HeadTooLarge => {
                Status::RequestHeaderFieldsTooLarge
            }
            _ => Status::BadRequest,
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description_str())
    }
}

impl std::error::Error for ParseError {}

/// Result whose Err variant is `ParseError`
pub type ParseResult<T> = std::result::Result<T, ParseError>;
