//! Wire-level size limits enforced by the engine.

/// Longest accepted request URI, in bytes.
pub const MAX_URI_LEN: usize = 8192;

/// Longest accepted header value, in bytes.
pub const MAX_HEADER_VAL_LEN: usize = 4096;

/// Longest accepted request method token, in bytes.
pub const MAX_METHOD_LEN: usize = 32;

/// Cap on the full request head (request line plus header block).
pub const MAX_REQUEST_HEAD_LEN: usize = 16384;

/// Cap on the number of header fields in one request.
pub const MAX_HEADER_COUNT: usize = 64;

/// Upper bound on a single payload transfer between engine and handler.
pub const MAX_DATA_BUFFER_LEN: usize = 4096;

/// Longest chunk-size line (hex digits plus extensions, without CRLF)
/// accepted in chunked bodies.
pub const MAX_CHUNK_SIZE_LINE: usize = 18;
