//! Ergonomic error context helpers.
//!
//! Provides extension traits for adding context to `Result` types,
//! converting IO errors into `NetError` codes and logging where they came from.

use crate::base::neterror::NetError;
use std::io::{self, ErrorKind};

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Map a connect-phase IO error, logging the target.
    ///
    /// # Example
    /// ```ignore
    /// use rockinet::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect(addr).await
    ///     .connection_context("example.com", 443)?;
    /// ```
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError>;

    /// Map a DNS resolution IO error.
    fn dns_context(self, domain: &str) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError> {
        self.map_err(|e| {
            let err = classify_io(&e);
            tracing::debug!(host = %host, port, error = %e, code = err.as_i32(), "connect failed");
            err
        })
    }

    fn dns_context(self, domain: &str) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(domain = %domain, error = %e, "DNS resolution failed");
            NetError::NameNotResolved
        })
    }
}

/// Pick the error code for an IO error by its kind.
pub fn classify_io(err: &io::Error) -> NetError {
    match err.kind() {
        ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
        ErrorKind::ConnectionReset => NetError::ConnectionReset,
        ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
        ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof => NetError::ConnectionClosed,
        ErrorKind::TimedOut => NetError::ConnectionTimedOut,
        ErrorKind::AddrNotAvailable | ErrorKind::InvalidInput => NetError::AddressInvalid,
        ErrorKind::NotConnected => NetError::ConnectionClosed,
        _ => NetError::ConnectionFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Error;

    #[test]
    fn test_connection_context() {
        let result: Result<(), io::Error> =
            Err(Error::new(ErrorKind::ConnectionRefused, "refused"));
        let err = result.connection_context("example.com", 443).unwrap_err();
        assert_eq!(err, NetError::ConnectionRefused);
        assert_eq!(err.marker(), "ECONNREFUSED");
    }

    #[test]
    fn test_dns_context() {
        let result: Result<(), io::Error> = Err(Error::new(ErrorKind::NotFound, "no such host"));
        let err = result.dns_context("unknown.example.com").unwrap_err();
        assert_eq!(err, NetError::NameNotResolved);
    }

    #[test]
    fn test_classify_reset_and_eof() {
        assert_eq!(
            classify_io(&Error::new(ErrorKind::ConnectionReset, "rst")),
            NetError::ConnectionReset
        );
        assert_eq!(
            classify_io(&Error::new(ErrorKind::UnexpectedEof, "eof")),
            NetError::ConnectionClosed
        );
        assert_eq!(classify_io(&Error::other("weird")), NetError::ConnectionFailed);
    }
}
