//! Socket and connection management.
//!
//! - [`pool`]: Keep-alive connection pooling (128 active sockets by default)
//! - [`connectjob`]: DNS → TCP → TLS connection flow

pub mod connectjob;
pub mod pool;

pub use connectjob::{Target, Transport};
pub use pool::{ClientSocketPool, PoolConfig, PooledStream, SocketSlot};
