//! One HTTP/1.1 connection driven by hyper.

use crate::base::neterror::{self, NetError};
use crate::http::requestbody::ExchangeBody;
use crate::socket::connectjob::{ConnectJob, Io, Target};
use http::{Request, Response};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::time::Instant;

/// Wraps the sending half of a hyper connection.
/// Equivalent to net::HttpStream.
pub struct HttpStream {
    sender: http1::SendRequest<ExchangeBody>,
    target: Target,
    reused: bool,
    /// Set when the stream was last handed back to the pool.
    pub(crate) idle_since: Instant,
}

impl std::fmt::Debug for HttpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStream")
            .field("target", &self.target)
            .field("reused", &self.reused)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl HttpStream {
    /// Connect to `target` and run the HTTP/1.1 handshake.
    pub async fn connect(target: &Target) -> Result<Self, NetError> {
        let io = ConnectJob::connect(target).await?;
        Self::handshake(target.clone(), io).await
    }

    /// Handshake over an already-connected byte stream.
    pub async fn handshake(target: Target, io: Box<dyn Io>) -> Result<Self, NetError> {
        let (sender, conn) = http1::handshake(TokioIo::new(io))
            .await
            .map_err(|e| neterror::from_hyper(&e))?;

        // The connection driver lives until the sender is dropped or the peer closes.
        let driver_target = target.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(peer = %driver_target, error = %e, "connection driver ended");
            }
        });

        Ok(Self {
            sender,
            target,
            reused: false,
            idle_since: Instant::now(),
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// True once the stream has served a request before this one.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub(crate) fn mark_reused(&mut self) {
        self.reused = true;
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Wait until the connection can take another request.
    pub async fn ready(&mut self) -> Result<(), NetError> {
        self.sender
            .ready()
            .await
            .map_err(|e| neterror::from_hyper(&e))
    }

    pub async fn send_request(
        &mut self,
        req: Request<ExchangeBody>,
    ) -> Result<Response<Incoming>, NetError> {
        self.sender.send_request(req).await.map_err(|e| {
            tracing::warn!(peer = %self.target, error = %e, "request error");
            neterror::from_hyper(&e)
        })
    }
}
