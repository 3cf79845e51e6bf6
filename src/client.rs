//! Request factory with one call per HTTP method.
//!
//! A factory holds base connection and request options for one target.
//! Each method call overlays per-call options on the base and runs one
//! exchange. Nothing touches the network until a method is called.
//!
//! # Example
//!
//! ```rust,ignore
//! use rockinet::client::make_http_request;
//! use rockinet::http::{ConnectionOptions, RequestOptions};
//!
//! let api = make_http_request(
//!     ConnectionOptions::new().host("127.0.0.1").port(8080),
//!     RequestOptions::new(),
//! );
//! let resp = api
//!     .post(
//!         ConnectionOptions::new().path("/items"),
//!         RequestOptions::new().buffer("hello"),
//!     )
//!     .await?;
//! println!("Status: {}", resp.status());
//! ```

use crate::base::neterror::NetError;
use crate::http::options::{CallOptions, ConnectionOptions, RequestOptions};
use crate::http::outcome::ExchangeFuture;
use crate::http::transaction;
use crate::socket::connectjob::Transport;
use http::Method;

/// Methods a factory exposes, in the order they are offered.
pub const HTTP_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::HEAD,
    Method::PATCH,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

/// Factory over the plain transport.
pub fn make_http_request(connection: ConnectionOptions, request: RequestOptions) -> RequestFactory {
    RequestFactory::new(Transport::Http, connection, request)
}

/// Factory over the encrypted transport.
pub fn make_https_request(
    connection: ConnectionOptions,
    request: RequestOptions,
) -> RequestFactory {
    RequestFactory::new(Transport::Https, connection, request)
}

/// Base options plus a callable per HTTP method.
#[derive(Debug, Clone)]
pub struct RequestFactory {
    connection: ConnectionOptions,
    request: RequestOptions,
}

impl RequestFactory {
    /// Merge `request` over the fixed defaults for `transport`.
    pub fn new(transport: Transport, connection: ConnectionOptions, request: RequestOptions) -> Self {
        Self {
            connection,
            request: RequestOptions::defaults(transport).merged(request),
        }
    }

    /// Factory for an `http`/`https` URL; host, port, and path come from the URL.
    pub fn from_url(url: &str, request: RequestOptions) -> Result<Self, NetError> {
        let (transport, connection) = ConnectionOptions::from_url(url)?;
        Ok(Self::new(transport, connection, request))
    }

    pub fn connection(&self) -> &ConnectionOptions {
        &self.connection
    }

    pub fn request(&self) -> &RequestOptions {
        &self.request
    }

    /// The merged options a call would run with.
    pub fn prepare(
        &self,
        method: Method,
        connection: ConnectionOptions,
        request: RequestOptions,
    ) -> CallOptions {
        CallOptions {
            method,
            connection: self.connection.merged(connection),
            request: self.request.merged(request),
        }
    }

    /// Merge and run one exchange with `method`.
    pub fn call(
        &self,
        method: Method,
        connection: ConnectionOptions,
        request: RequestOptions,
    ) -> ExchangeFuture {
        transaction::run(self.prepare(method, connection, request))
    }

    pub fn get(&self, connection: ConnectionOptions, request: RequestOptions) -> ExchangeFuture {
        self.call(Method::GET, connection, request)
    }

    pub fn post(&self, connection: ConnectionOptions, request: RequestOptions) -> ExchangeFuture {
        self.call(Method::POST, connection, request)
    }

    pub fn head(&self, connection: ConnectionOptions, request: RequestOptions) -> ExchangeFuture {
        self.call(Method::HEAD, connection, request)
    }

    pub fn patch(&self, connection: ConnectionOptions, request: RequestOptions) -> ExchangeFuture {
        self.call(Method::PATCH, connection, request)
    }

    pub fn put(&self, connection: ConnectionOptions, request: RequestOptions) -> ExchangeFuture {
        self.call(Method::PUT, connection, request)
    }

    pub fn delete(&self, connection: ConnectionOptions, request: RequestOptions) -> ExchangeFuture {
        self.call(Method::DELETE, connection, request)
    }

    pub fn options(&self, connection: ConnectionOptions, request: RequestOptions) -> ExchangeFuture {
        self.call(Method::OPTIONS, connection, request)
    }
}
