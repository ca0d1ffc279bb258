//! Header collections shared by requests and responses.
//!
//! Well-known headers the engine itself consults live in dedicated slots;
//! everything else lands in a misc sequence in insertion order. Names are
//! case-insensitive per RFC 9110 Section 5.1; duplicates overwrite.

use std::fmt::Write as _;

/// Header collection with dedicated slots for the engine's well-known set.
#[derive(Debug, Default, Clone)]
pub struct Headers {
    content_length: Option<String>,
    transfer_encoding: Option<String>,
    connection: Option<String>,
    host: Option<String>,
    expect: Option<String>,
    misc: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, overwriting any previous value for the same name.
    pub fn set(&mut self, name: &str, value: &str) {
        let value = value.to_owned();
        if let Some(slot) = self.known_slot(name) {
            *slot = Some(value);
            return;
        }

        match self
            .misc
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value,
            None => self.misc.push((name.to_owned(), value)),
        }
    }

    /// Looks a header up by case-insensitive name.
    pub fn get(&self, name: &str) -> Option<&str> {
        if name.eq_ignore_ascii_case("Content-Length") {
            return self.content_length.as_deref();
        }
        if name.eq_ignore_ascii_case("Transfer-Encoding") {
            return self.transfer_encoding.as_deref();
        }
        if name.eq_ignore_ascii_case("Connection") {
            return self.connection.as_deref();
        }
        if name.eq_ignore_ascii_case("Host") {
            return self.host.as_deref();
        }
        if name.eq_ignore_ascii_case("Expect") {
            return self.expect.as_deref();
        }

        self.misc
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes a header by case-insensitive name.
    pub fn remove(&mut self, name: &str) {
        if let Some(slot) = self.known_slot(name) {
            *slot = None;
            return;
        }
        self.misc.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Number of headers currently present.
    pub fn len(&self) -> usize {
        let known = [
            &self.content_length,
            &self.transfer_encoding,
            &self.connection,
            &self.host,
            &self.expect,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count();
        known + self.misc.len()
    }

    /// True when no header is present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parsed `Content-Length`, when present.
    pub fn content_length(&self) -> Option<Result<u64, ()>> {
        self.content_length
            .as_deref()
            .map(|v| v.trim().parse::<u64>().map_err(|_| ()))
    }

    /// True when `Transfer-Encoding: chunked` governs the body.
    pub fn is_chunked(&self) -> bool {
        self.transfer_encoding
            .as_deref()
            .map(|v| v.trim().eq_ignore_ascii_case("chunked"))
            .unwrap_or(false)
    }

    /// The `Connection` header value, when present.
    pub fn connection(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    /// The `Expect` header value, when present.
    pub fn expect(&self) -> Option<&str> {
        self.expect.as_deref()
    }

    /// Serializes all headers as `Name: Value\r\n` lines, well-known first.
    pub(crate) fn write_lines(&self, out: &mut String) {
        let known = [
            ("Content-Length", &self.content_length),
            ("Transfer-Encoding", &self.transfer_encoding),
            ("Connection", &self.connection),
            ("Host", &self.host),
            ("Expect", &self.expect),
        ];
        for (name, value) in known {
            if let Some(value) = value {
                let _ = write!(out, "{}: {}\r\n", name, value);
            }
        }
        for (name, value) in &self.misc {
            let _ = write!(out, "{}: {}\r\n", name, value);
        }
    }

    fn known_slot(&mut self, name: &str) -> Option<&mut Option<String>> {
        if name.eq_ignore_ascii_case("Content-Length") {
            Some(&mut self.content_length)
        } else if name.eq_ignore_ascii_case("Transfer-Encoding") {
            Some(&mut self.transfer_encoding)
        } else if name.eq_ignore_ascii_case("Connection") {
            Some(&mut self.connection)
        } else if name.eq_ignore_ascii_case("Host") {
            Some(&mut self.host)
        } else if name.eq_ignore_ascii_case("Expect") {
            Some(&mut self.expect)
        } else {
            None
        }
    }
}
