//! Connection options, request-shaping options, and their merge rules.
//!
//! Every field is optional so that "present in the override" is explicit:
//! a present override field replaces the base field wholesale, except
//! headers, which merge name by name with the override winning.

use crate::base::neterror::NetError;
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::requestbody::{
    BodySource, ExchangeBody, ExternalWrite, PendingWrite, SharedStream,
};
use crate::socket::connectjob::{Target, Transport};
use crate::socket::pool::{self, ClientSocketPool};
use bytes::Bytes;
use futures::Stream;
use http::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST};
use http::{Method, Request};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PATH: &str = "/";

/// Transport-level settings: where to connect and which headers to send.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub headers: OrderedHeaderMap,
    /// Pool to draw connections from; the shared pool for the transport when unset.
    pub pool: Option<Arc<ClientSocketPool>>,
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split an `http`/`https` URL into options plus the transport it names.
    pub fn from_url(url: &str) -> Result<(Transport, Self), NetError> {
        let url = Url::parse(url).map_err(|_| NetError::InvalidUrl)?;
        let transport = Transport::from_scheme(url.scheme())?;
        let host = url.host_str().ok_or(NetError::InvalidUrl)?;

        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        let options = Self {
            host: Some(host.to_string()),
            port: url.port(),
            path: Some(path),
            ..Self::default()
        };
        Ok((transport, options))
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add a header. Invalid names or values are dropped with a warning.
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        match (key.try_into(), value.try_into()) {
            (Ok(k), Ok(v)) => self.headers.set(k, v),
            _ => tracing::warn!("ignoring invalid header"),
        }
        self
    }

    pub fn headers(mut self, headers: OrderedHeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn pool(mut self, pool: Arc<ClientSocketPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Overlay `overrides` onto these options.
    pub fn merged(&self, overrides: ConnectionOptions) -> ConnectionOptions {
        ConnectionOptions {
            host: overrides.host.or_else(|| self.host.clone()),
            port: overrides.port.or(self.port),
            path: overrides.path.or_else(|| self.path.clone()),
            headers: self.headers.merged(&overrides.headers),
            pool: overrides.pool.or_else(|| self.pool.clone()),
        }
    }

    pub fn target(&self, transport: Transport) -> Target {
        Target::new(
            transport,
            self.host.as_deref().unwrap_or(DEFAULT_HOST),
            self.port.unwrap_or_else(|| transport.default_port()),
        )
    }

    pub fn path_or_default(&self) -> &str {
        self.path.as_deref().unwrap_or(DEFAULT_PATH)
    }
}

/// Behavioral flags and the body source for a request.
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Set `content-length` from `buffer` (default true).
    pub set_content_length_from_buffer: Option<bool>,
    /// Plain or encrypted transport.
    pub transport: Option<Transport>,
    /// Idle limit before the response head arrives (and during the body,
    /// unless `response_timeout` is set).
    pub request_timeout: Option<Duration>,
    /// Idle limit between response body chunks.
    pub response_timeout: Option<Duration>,
    pub buffer: Option<Bytes>,
    pub stream: Option<SharedStream>,
    pub external_write: Option<Arc<dyn ExternalWrite>>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed defaults a factory for `transport` starts from.
    pub fn defaults(transport: Transport) -> Self {
        Self {
            set_content_length_from_buffer: Some(true),
            transport: Some(transport),
            ..Self::default()
        }
    }

    pub fn set_content_length_from_buffer(mut self, enabled: bool) -> Self {
        self.set_content_length_from_buffer = Some(enabled);
        self
    }

    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    pub fn buffer(mut self, buffer: impl Into<Bytes>) -> Self {
        self.buffer = Some(buffer.into());
        self
    }

    pub fn stream<S>(mut self, stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.stream = Some(SharedStream::new(stream));
        self
    }

    pub fn external_write<W: ExternalWrite + 'static>(mut self, writer: W) -> Self {
        self.external_write = Some(Arc::new(writer));
        self
    }

    /// Overlay `overrides` onto these options.
    pub fn merged(&self, overrides: RequestOptions) -> RequestOptions {
        RequestOptions {
            set_content_length_from_buffer: overrides
                .set_content_length_from_buffer
                .or(self.set_content_length_from_buffer),
            transport: overrides.transport.or(self.transport),
            request_timeout: overrides.request_timeout.or(self.request_timeout),
            response_timeout: overrides.response_timeout.or(self.response_timeout),
            buffer: overrides.buffer.or_else(|| self.buffer.clone()),
            stream: overrides.stream.or_else(|| self.stream.clone()),
            external_write: overrides
                .external_write
                .or_else(|| self.external_write.clone()),
        }
    }

    pub fn content_length_from_buffer(&self) -> bool {
        self.set_content_length_from_buffer.unwrap_or(true)
    }

    pub fn transport_or_default(&self) -> Transport {
        self.transport.unwrap_or_default()
    }

    /// Pick the body by precedence: buffer, stream, external writer, nothing.
    pub fn body_source(&self) -> BodySource {
        if let Some(buffer) = &self.buffer {
            BodySource::Buffer(buffer.clone())
        } else if let Some(stream) = &self.stream {
            BodySource::Stream(stream.clone())
        } else if let Some(writer) = &self.external_write {
            BodySource::External(writer.clone())
        } else {
            BodySource::Empty
        }
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("set_content_length_from_buffer", &self.set_content_length_from_buffer)
            .field("transport", &self.transport)
            .field("request_timeout", &self.request_timeout)
            .field("response_timeout", &self.response_timeout)
            .field("buffer", &self.buffer.as_ref().map(Bytes::len))
            .field("stream", &self.stream)
            .field("external_write", &self.external_write.is_some())
            .finish()
    }
}

/// Fully merged options for one call.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub method: Method,
    pub connection: ConnectionOptions,
    pub request: RequestOptions,
}

impl CallOptions {
    pub fn transport(&self) -> Transport {
        self.request.transport_or_default()
    }

    pub fn target(&self) -> Target {
        self.connection.target(self.transport())
    }

    pub fn pool(&self) -> Arc<ClientSocketPool> {
        self.connection
            .pool
            .clone()
            .unwrap_or_else(|| pool::shared_pool(self.transport()))
    }

    /// Headers as they will go on the wire.
    pub fn outgoing_headers(&self) -> OrderedHeaderMap {
        let mut headers = self.connection.headers.clone();

        if !headers.contains(HOST.as_str()) {
            if let Ok(host) = HeaderValue::from_str(&self.target().authority()) {
                headers.set(HOST, host);
            }
        }

        if self.request.content_length_from_buffer() {
            if let Some(buffer) = &self.request.buffer {
                headers.set(CONTENT_LENGTH, HeaderValue::from(buffer.len()));
            }
        }

        if !self.pool().config().keep_alive && !headers.contains(CONNECTION.as_str()) {
            headers.set(CONNECTION, HeaderValue::from_static("close"));
        }

        headers
    }

    /// Build the outgoing request and, for an external writer, the writer to drive.
    pub(crate) fn build_request(
        &self,
    ) -> Result<(Request<ExchangeBody>, Option<PendingWrite>), NetError> {
        let (body, pending) = self.request.body_source().into_body();

        let mut req = Request::builder()
            .method(self.method.clone())
            .uri(self.connection.path_or_default())
            .body(body)
            .map_err(|_| NetError::InvalidUrl)?;
        *req.headers_mut() = self.outgoing_headers().to_header_map();

        Ok((req, pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(connection: ConnectionOptions, request: RequestOptions) -> CallOptions {
        CallOptions {
            method: Method::POST,
            connection,
            request,
        }
    }

    #[test]
    fn test_from_url() {
        let (transport, options) =
            ConnectionOptions::from_url("https://api.example.com:8443/v1/items?page=2").unwrap();
        assert_eq!(transport, Transport::Https);
        assert_eq!(options.host.as_deref(), Some("api.example.com"));
        assert_eq!(options.port, Some(8443));
        assert_eq!(options.path_or_default(), "/v1/items?page=2");
    }

    #[test]
    fn test_from_url_rejects_other_schemes() {
        assert_eq!(
            ConnectionOptions::from_url("ftp://example.com").err(),
            Some(NetError::UnknownUrlScheme)
        );
        assert_eq!(
            ConnectionOptions::from_url("not a url").err(),
            Some(NetError::InvalidUrl)
        );
    }

    #[test]
    fn test_connection_merge_replaces_present_fields() {
        let base = ConnectionOptions::new()
            .host("a.example")
            .port(8080)
            .path("/base")
            .header("x-keep", "1")
            .header("x-shared", "base");
        let merged = base.merged(
            ConnectionOptions::new()
                .path("/call")
                .header("X-Shared", "call"),
        );

        assert_eq!(merged.host.as_deref(), Some("a.example"));
        assert_eq!(merged.port, Some(8080));
        assert_eq!(merged.path_or_default(), "/call");
        assert_eq!(merged.headers.get("x-keep").unwrap(), "1");
        assert_eq!(merged.headers.get("x-shared").unwrap(), "call");
    }

    #[test]
    fn test_request_merge_and_defaults() {
        let base = RequestOptions::defaults(Transport::Https)
            .request_timeout(Duration::from_secs(5));
        let merged = base.merged(RequestOptions::new().set_content_length_from_buffer(false));

        assert_eq!(merged.transport, Some(Transport::Https));
        assert_eq!(merged.request_timeout, Some(Duration::from_secs(5)));
        assert!(!merged.content_length_from_buffer());
        assert!(RequestOptions::new().content_length_from_buffer());
    }

    #[test]
    fn test_body_precedence() {
        let writer =
            |_w: crate::http::requestbody::BodyWriter| async { Ok::<(), NetError>(()) };
        let all = RequestOptions::new()
            .external_write(writer)
            .stream(futures::stream::empty::<io::Result<Bytes>>())
            .buffer("x");
        assert_eq!(all.body_source().kind(), "buffer");

        let no_buffer = RequestOptions {
            buffer: None,
            ..all.clone()
        };
        assert_eq!(no_buffer.body_source().kind(), "stream");

        let only_writer = RequestOptions {
            stream: None,
            ..no_buffer
        };
        assert_eq!(only_writer.body_source().kind(), "external");
        assert_eq!(RequestOptions::new().body_source().kind(), "empty");
    }

    #[test]
    fn test_content_length_from_buffer() {
        let c = call(
            ConnectionOptions::new().host("example.com"),
            RequestOptions::defaults(Transport::Http).buffer("hello"),
        );
        let headers = c.outgoing_headers();
        assert_eq!(headers.get("content-length").unwrap(), "5");
        assert_eq!(headers.get("host").unwrap(), "example.com");
    }

    #[test]
    fn test_content_length_flag_off() {
        let c = call(
            ConnectionOptions::new(),
            RequestOptions::new()
                .buffer("hello")
                .set_content_length_from_buffer(false),
        );
        assert!(!c.outgoing_headers().contains("content-length"));
    }

    #[test]
    fn test_explicit_host_header_kept() {
        let c = call(
            ConnectionOptions::new()
                .host("10.0.0.1")
                .port(8080)
                .header("host", "virtual.example"),
            RequestOptions::new(),
        );
        assert_eq!(c.outgoing_headers().get("host").unwrap(), "virtual.example");
    }

    #[test]
    fn test_connection_close_without_keep_alive() {
        let pool = Arc::new(ClientSocketPool::new(crate::socket::pool::PoolConfig {
            keep_alive: false,
            ..Default::default()
        }));
        let c = call(ConnectionOptions::new().pool(pool), RequestOptions::new());
        assert_eq!(c.outgoing_headers().get("connection").unwrap(), "close");

        let pooled = call(ConnectionOptions::new(), RequestOptions::new());
        assert!(!pooled.outgoing_headers().contains("connection"));
    }

    #[test]
    fn test_build_request_uses_method_and_path() {
        let c = call(
            ConnectionOptions::new().path("/upload"),
            RequestOptions::new().buffer("abc"),
        );
        let (req, pending) = c.build_request().unwrap();
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri().path(), "/upload");
        assert_eq!(req.headers()["content-length"], "3");
        assert!(pending.is_none());
    }
}
