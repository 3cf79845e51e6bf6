//! Single settlement of an exchange.
//!
//! The running exchange owns a [`Settlement`]; the caller holds the matching
//! [`ExchangeFuture`]. The sender is consumed by the first settlement, so a
//! second one cannot reach the caller.

use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;
use crate::http::response::HttpResponse;
use crate::http::transaction::ExchangeState;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{oneshot, watch};

/// What an exchange settles with.
pub type Outcome = Result<HttpResponse, NetError>;

/// `(error, status, headers, body)`: either the error is set, or the other three are.
pub type OutcomeParts = (
    Option<NetError>,
    Option<StatusCode>,
    Option<HeaderMap>,
    Option<Bytes>,
);

pub fn split_outcome(outcome: Outcome) -> OutcomeParts {
    match outcome {
        Ok(response) => {
            let (status, headers, body) = response.into_parts();
            (None, Some(status), Some(headers), Some(body))
        }
        Err(e) => (Some(e), None, None, None),
    }
}

/// The settling half, owned by the exchange task.
///
/// Dropped unsettled (the task panicked or its runtime shut down), it
/// settles with `ConnectionAborted` so the caller never hangs.
pub(crate) struct Settlement {
    tx: Option<oneshot::Sender<Outcome>>,
    state: watch::Sender<ExchangeState>,
}

impl Settlement {
    pub(crate) fn channel() -> (Settlement, ExchangeFuture) {
        let (tx, rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(ExchangeState::Started);
        (
            Settlement {
                tx: Some(tx),
                state: state_tx,
            },
            ExchangeFuture {
                rx,
                state: state_rx,
            },
        )
    }

    pub(crate) fn advance(&self, next: ExchangeState) {
        self.state.send_replace(next);
    }

    /// Deliver the outcome. Returns false if already settled.
    pub(crate) fn settle(&mut self, outcome: Outcome) -> bool {
        let Some(tx) = self.tx.take() else {
            return false;
        };
        self.advance(match outcome {
            Ok(_) => ExchangeState::SettledOk,
            Err(_) => ExchangeState::SettledError,
        });
        // A dropped receiver means the caller stopped listening; the exchange still counts as settled.
        let _ = tx.send(outcome);
        true
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.tx.is_none()
    }
}

impl Drop for Settlement {
    fn drop(&mut self) {
        if !self.is_settled() {
            tracing::warn!("exchange dropped before settling");
            self.settle(Err(NetError::ConnectionAborted));
        }
    }
}

/// Resolves once with the exchange's [`Outcome`].
///
/// Dropping it does not cancel the exchange.
#[derive(Debug)]
pub struct ExchangeFuture {
    rx: oneshot::Receiver<Outcome>,
    state: watch::Receiver<ExchangeState>,
}

impl ExchangeFuture {
    /// Where the exchange is right now.
    pub fn state(&self) -> ExchangeState {
        *self.state.borrow()
    }

    pub fn load_state(&self) -> LoadState {
        self.state().to_load_state()
    }
}

impl Future for ExchangeFuture {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(NetError::ConnectionAborted)),
            Poll::Pending => Poll::Pending,
        }
    }
}
