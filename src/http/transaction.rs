use crate::base::loadstate::LoadState;
use crate::base::neterror::{self, NetError};
use crate::http::options::CallOptions;
use crate::http::outcome::{ExchangeFuture, Outcome, Settlement};
use crate::http::response::HttpResponse;
use crate::http::responsebody::ResponseBuffer;
use crate::socket::pool::{ClientSocketPool, PooledStream};
use bytes::Bytes;
use http::header::CONNECTION;
use http::{HeaderMap, Response};
use http_body::Frame;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Where an exchange is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Acquiring a connection.
    Started,
    /// Request sent (or being sent), waiting for the response head.
    AwaitingResponse,
    /// Buffering the response body.
    ReceivingBody,
    SettledOk,
    SettledError,
}

impl ExchangeState {
    /// Map internal state to public LoadState.
    pub fn to_load_state(self) -> LoadState {
        match self {
            ExchangeState::Started => LoadState::Connecting,
            ExchangeState::AwaitingResponse => LoadState::WaitingForResponse,
            ExchangeState::ReceivingBody => LoadState::ReadingResponse,
            ExchangeState::SettledOk | ExchangeState::SettledError => LoadState::Idle,
        }
    }

    pub fn is_settled(self) -> bool {
        matches!(self, ExchangeState::SettledOk | ExchangeState::SettledError)
    }
}

type WriterTask = JoinHandle<Result<(), NetError>>;

/// Last time the exchange saw progress on its connection.
///
/// Idle limits count from the latest touch, so a body that keeps uploading
/// or a response that keeps arriving never expires.
#[derive(Debug, Clone)]
struct IdleClock {
    origin: Instant,
    last_nanos: Arc<AtomicU64>,
}

impl IdleClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    fn touch(&self) {
        let nanos = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.last_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    fn last_activity(&self) -> Instant {
        self.origin + Duration::from_nanos(self.last_nanos.load(Ordering::Relaxed))
    }
}

/// Run one exchange to its single outcome.
///
/// The exchange runs as its own task; the returned future only observes it.
/// Outside a Tokio runtime it settles at once with `NoRuntime`.
pub fn run(call: CallOptions) -> ExchangeFuture {
    let (mut settlement, future) = Settlement::channel();
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(HttpExchange::new(call, settlement).start());
        }
        Err(_) => {
            tracing::warn!("no Tokio runtime, exchange not started");
            settlement.settle(Err(NetError::NoRuntime));
        }
    }
    future
}

struct HttpExchange {
    call: CallOptions,
    pool: Arc<ClientSocketPool>,
    state: ExchangeState,
    stream: Option<PooledStream>,
    response: Option<Response<Incoming>>,
    writer: Option<WriterTask>,
    clock: IdleClock,
    settlement: Settlement,
}

impl HttpExchange {
    fn new(call: CallOptions, settlement: Settlement) -> Self {
        Self {
            pool: call.pool(),
            call,
            state: ExchangeState::Started,
            stream: None,
            response: None,
            writer: None,
            clock: IdleClock::new(),
            settlement,
        }
    }

    async fn start(mut self) {
        tracing::debug!(
            method = %self.call.method,
            peer = %self.call.target(),
            path = self.call.connection.path_or_default(),
            "starting exchange"
        );
        let outcome = self.do_loop().await;
        self.finish(outcome);
    }

    fn transition(&mut self, next: ExchangeState) {
        tracing::debug!(from = ?self.state, to = ?next, "exchange state");
        self.state = next;
        self.settlement.advance(next);
    }

    async fn do_loop(&mut self) -> Outcome {
        loop {
            match self.state {
                ExchangeState::Started => {
                    // Queueing for a slot is not idle time on a connection.
                    let slot = self.pool.wait_for_slot().await?;
                    let target = self.call.target();
                    let pooled = guarded(
                        &mut self.writer,
                        &self.clock,
                        self.call.request.request_timeout,
                        NetError::TimedOut,
                        self.pool.checkout(&target, slot),
                    )
                    .await?;
                    self.stream = Some(pooled);
                    self.transition(ExchangeState::AwaitingResponse);
                }
                ExchangeState::AwaitingResponse => {
                    let (req, pending) = self.call.build_request()?;
                    let clock = self.clock.clone();
                    let req = req.map(|body| {
                        body.map_frame(move |frame| {
                            clock.touch();
                            frame
                        })
                        .boxed_unsync()
                    });
                    if let Some((strategy, writer)) = pending {
                        self.writer = Some(tokio::spawn(strategy.write(writer)));
                    }

                    let pooled = self.stream.as_mut().ok_or(NetError::ConnectionFailed)?;
                    let response = guarded(
                        &mut self.writer,
                        &self.clock,
                        self.call.request.request_timeout,
                        NetError::TimedOut,
                        pooled.stream_mut().send_request(req),
                    )
                    .await?;
                    tracing::debug!(status = %response.status(), "response head received");
                    self.response = Some(response);
                    self.transition(ExchangeState::ReceivingBody);
                }
                ExchangeState::ReceivingBody => {
                    let response = self.response.take().ok_or(NetError::InvalidResponse)?;
                    let (parts, mut body) = response.into_parts();
                    let mut buffer =
                        ResponseBuffer::for_response(&self.call.method, parts.status, &parts.headers);

                    let (limit, on_timeout) = self.body_timeout();
                    while let Some(frame) =
                        guarded(&mut self.writer, &self.clock, limit, on_timeout, next_frame(&mut body))
                            .await?
                    {
                        if let Ok(data) = frame.into_data() {
                            buffer.push(&data)?;
                        }
                    }
                    let body = buffer.finish()?;
                    self.check_writer().await?;
                    return Ok(HttpResponse::from_parts(parts, body));
                }
                ExchangeState::SettledOk | ExchangeState::SettledError => {
                    return Err(NetError::Aborted);
                }
            }
        }
    }

    /// Idle limit between body chunks: the response timeout, else the request timeout.
    fn body_timeout(&self) -> (Option<Duration>, NetError) {
        match self.call.request.response_timeout {
            Some(limit) => (Some(limit), NetError::ResponseTimedOut),
            None => (self.call.request.request_timeout, NetError::TimedOut),
        }
    }

    /// Surface an external writer error that landed after the response ended.
    async fn check_writer(&mut self) -> Result<(), NetError> {
        match self.writer.take() {
            Some(task) if task.is_finished() => match task.await {
                Ok(result) => result,
                Err(_) => Err(NetError::BodySourceFailed),
            },
            other => {
                self.writer = other;
                Ok(())
            }
        }
    }

    fn finish(mut self, outcome: Outcome) {
        // A writer still running means the request body may be incomplete.
        let body_complete = self.writer.as_ref().map_or(true, JoinHandle::is_finished);
        if let Some(task) = self.writer.take() {
            task.abort();
        }

        match &outcome {
            Ok(response) => {
                if let Some(pooled) = self.stream.take() {
                    let reusable = body_complete && !wants_close(response.headers());
                    self.pool.release_stream(pooled, reusable);
                }
                tracing::debug!(status = %response.status(), bytes = response.body().len(), "exchange settled");
            }
            Err(e) => {
                // The connection is in an unknown state; dropping it discards it.
                self.stream = None;
                tracing::warn!(error = %e, code = e.as_i32(), marker = e.marker(), "exchange failed");
            }
        }

        if !self.settlement.settle(outcome) {
            tracing::debug!("exchange already settled, ignoring outcome");
        }
    }
}

fn wants_close(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("close"))
}

async fn next_frame(body: &mut Incoming) -> Result<Option<Frame<Bytes>>, NetError> {
    body.frame()
        .await
        .transpose()
        .map_err(|e| neterror::from_hyper(&e))
}

enum Step<T> {
    Done(Result<T, NetError>),
    Writer(Result<(), NetError>),
    Expired,
}

/// Await `op` under an idle limit while watching the external writer.
///
/// Whichever of op completion, writer failure, or expiry comes first decides
/// the result. The limit counts from the later of entry and the last touch
/// of `clock`. Expiry drops `op`, which tears down the in-flight request.
async fn guarded<T, F>(
    writer: &mut Option<WriterTask>,
    clock: &IdleClock,
    limit: Option<Duration>,
    on_timeout: NetError,
    op: F,
) -> Result<T, NetError>
where
    F: Future<Output = Result<T, NetError>>,
{
    tokio::pin!(op);
    clock.touch();

    loop {
        let step = tokio::select! {
            biased;
            res = join_writer(writer) => Step::Writer(res),
            res = &mut op => Step::Done(res),
            _ = expire(clock, limit) => Step::Expired,
        };

        match step {
            Step::Done(res) => return res,
            Step::Expired => {
                tracing::warn!(error = %on_timeout, marker = on_timeout.marker(), "exchange timed out");
                return Err(on_timeout);
            }
            Step::Writer(res) => {
                *writer = None;
                if let Err(e) = res {
                    tracing::warn!(error = %e, "external body writer failed");
                    return Err(e);
                }
            }
        }
    }
}

async fn join_writer(writer: &mut Option<WriterTask>) -> Result<(), NetError> {
    match writer.as_mut() {
        Some(task) => match task.await {
            Ok(result) => result,
            Err(_) => Err(NetError::BodySourceFailed),
        },
        None => std::future::pending().await,
    }
}

async fn expire(clock: &IdleClock, limit: Option<Duration>) {
    let Some(limit) = limit else {
        return std::future::pending().await;
    };
    loop {
        let at = clock.last_activity() + limit;
        if Instant::now() >= at {
            return;
        }
        tokio::time::sleep_until(at).await;
    }
}
