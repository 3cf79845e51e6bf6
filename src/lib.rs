//! # rockinet
//!
//! A pooled HTTP/HTTPS request helper.
//!
//! `rockinet` builds a request factory per target host and exposes one call
//! per HTTP method. Each call runs a single exchange over a keep-alive
//! connection pool and settles exactly once, with either an error or the
//! status, headers, and fully buffered body.
//!
//! ## Features
//!
//! - **Layered Options**: base options per factory, per-call overrides, header merging
//! - **Connection Pooling**: keep-alive, 128 active sockets per pool by default
//! - **Single Settlement**: errors, timeouts, and aborts collapse into one outcome
//! - **Body Buffering**: preallocated for a declared `content-length`, appended otherwise
//! - **TLS**: BoringSSL with default verification
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rockinet::client::make_http_request;
//! use rockinet::http::{ConnectionOptions, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let api = make_http_request(
//!         ConnectionOptions::new().host("127.0.0.1").port(8080),
//!         RequestOptions::new(),
//!     );
//!     let response = api
//!         .get(ConnectionOptions::new().path("/health"), RequestOptions::new())
//!         .await
//!         .unwrap();
//!     println!("Status: {}", response.status());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes and load states
//! - [`client`] - Request factory and per-method calls
//! - [`http`] - Options, bodies, the exchange runner, and responses
//! - [`socket`] - Connection pooling and the connect job

pub mod base;
pub mod client;
pub mod http;
pub mod socket;

pub use base::neterror::NetError;
pub use client::{make_http_request, make_https_request, RequestFactory};
pub use crate::http::{ConnectionOptions, ExchangeFuture, HttpResponse, Outcome, RequestOptions};
