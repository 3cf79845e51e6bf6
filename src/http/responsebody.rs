//! Response body buffering.
//!
//! The whole body is collected before an exchange settles. When the server
//! declares a positive `content-length` the buffer is reserved up front and
//! the declared length is enforced; otherwise chunks are appended as they
//! arrive.

use crate::base::neterror::NetError;
use bytes::{Bytes, BytesMut};
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, Method, StatusCode};

/// Upper bound on the up-front reservation. Larger declared lengths are
/// still enforced, the buffer just grows past this as data arrives.
const MAX_PREALLOCATION: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub enum ResponseBuffer {
    /// Length declared by the server.
    Fixed { data: BytesMut, declared: u64 },
    /// Length unknown; reassembled by concatenation.
    Growing(BytesMut),
}

impl ResponseBuffer {
    /// Pick a strategy from a parsed `content-length`. Zero counts as unknown.
    pub fn from_content_length(declared: Option<u64>) -> Self {
        match declared {
            Some(n) if n > 0 => {
                let reserve = usize::try_from(n).unwrap_or(usize::MAX).min(MAX_PREALLOCATION);
                ResponseBuffer::Fixed {
                    data: BytesMut::with_capacity(reserve),
                    declared: n,
                }
            }
            _ => ResponseBuffer::Growing(BytesMut::new()),
        }
    }

    /// Pick a strategy for a response head.
    ///
    /// HEAD responses and 204/304 carry no body whatever the header says.
    pub fn for_response(method: &Method, status: StatusCode, headers: &HeaderMap) -> Self {
        if *method == Method::HEAD
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
        {
            return ResponseBuffer::Growing(BytesMut::new());
        }
        Self::from_content_length(parse_content_length(headers))
    }

    /// Append one chunk at the current offset.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), NetError> {
        match self {
            ResponseBuffer::Fixed { data, declared } => {
                let total = data.len() as u64 + chunk.len() as u64;
                if total > *declared {
                    tracing::warn!(declared = *declared, received = total, "response body overran content-length");
                    return Err(NetError::ContentLengthMismatch);
                }
                data.extend_from_slice(chunk);
            }
            ResponseBuffer::Growing(data) => data.extend_from_slice(chunk),
        }
        tracing::trace!(chunk = chunk.len(), total = self.len(), "buffered response chunk");
        Ok(())
    }

    /// Finish buffering. A declared body that ended short is an error.
    pub fn finish(self) -> Result<Bytes, NetError> {
        match self {
            ResponseBuffer::Fixed { data, declared } => {
                if (data.len() as u64) < declared {
                    tracing::warn!(declared, received = data.len(), "response body ended before content-length");
                    return Err(NetError::ContentLengthMismatch);
                }
                Ok(data.freeze())
            }
            ResponseBuffer::Growing(data) => Ok(data.freeze()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ResponseBuffer::Fixed { data, .. } | ResponseBuffer::Growing(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, ResponseBuffer::Fixed { .. })
    }
}

/// `content-length` as a number; absent or unparsable gives `None`.
pub fn parse_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers_with_length(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_declared_length_chunks() {
        let mut buf = ResponseBuffer::for_response(
            &Method::GET,
            StatusCode::OK,
            &headers_with_length("11"),
        );
        assert!(buf.is_fixed());
        buf.push(b"hello ").unwrap();
        buf.push(b"world").unwrap();
        assert_eq!(buf.finish().unwrap(), Bytes::from("hello world"));
    }

    #[test]
    fn test_unknown_length_reassembles() {
        let mut buf = ResponseBuffer::for_response(&Method::GET, StatusCode::OK, &HeaderMap::new());
        assert!(!buf.is_fixed());
        for chunk in [&b"ab"[..], &b""[..], &b"cde"[..], &b"f"[..]] {
            buf.push(chunk).unwrap();
        }
        assert_eq!(buf.finish().unwrap(), Bytes::from("abcdef"));
    }

    #[test]
    fn test_overflow_is_mismatch() {
        let mut buf = ResponseBuffer::from_content_length(Some(3));
        buf.push(b"ab").unwrap();
        assert_eq!(buf.push(b"cd"), Err(NetError::ContentLengthMismatch));
    }

    #[test]
    fn test_short_body_is_mismatch() {
        let mut buf = ResponseBuffer::from_content_length(Some(5));
        buf.push(b"abc").unwrap();
        assert_eq!(buf.finish(), Err(NetError::ContentLengthMismatch));
    }

    #[test]
    fn test_zero_and_garbage_lengths_grow() {
        assert!(!ResponseBuffer::from_content_length(Some(0)).is_fixed());
        assert_eq!(parse_content_length(&headers_with_length("abc")), None);
        assert_eq!(parse_content_length(&headers_with_length(" 42 ")), Some(42));
    }

    #[test]
    fn test_head_and_no_content_ignore_length() {
        let headers = headers_with_length("100");
        let head = ResponseBuffer::for_response(&Method::HEAD, StatusCode::OK, &headers);
        assert!(!head.is_fixed());
        assert_eq!(head.finish().unwrap(), Bytes::new());

        let not_modified =
            ResponseBuffer::for_response(&Method::GET, StatusCode::NOT_MODIFIED, &headers);
        assert!(not_modified.is_empty());
    }

    #[test]
    fn test_huge_declared_length_caps_reservation() {
        match ResponseBuffer::from_content_length(Some(u64::MAX)) {
            ResponseBuffer::Fixed { data, declared } => {
                assert!(data.capacity() <= MAX_PREALLOCATION);
                assert_eq!(declared, u64::MAX);
            }
            other => panic!("expected fixed buffer, got {other:?}"),
        }
    }
}
