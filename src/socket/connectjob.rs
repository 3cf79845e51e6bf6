use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use boring::ssl::{SslConnector, SslMethod};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Which transport an exchange runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Http,
    Https,
}

impl Transport {
    pub fn from_scheme(scheme: &str) -> Result<Self, NetError> {
        match scheme {
            "http" => Ok(Transport::Http),
            "https" => Ok(Transport::Https),
            _ => Err(NetError::UnknownUrlScheme),
        }
    }

    pub fn scheme(self) -> &'static str {
        match self {
            Transport::Http => "http",
            Transport::Https => "https",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Transport::Http => 80,
            Transport::Https => 443,
        }
    }
}

/// Where a connection goes. Also the pool's group key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(transport: Transport, host: impl Into<String>, port: u16) -> Self {
        Self {
            transport,
            host: host.into(),
            port,
        }
    }

    /// Value for the `Host` request header; the port is omitted when it is the default.
    pub fn authority(&self) -> String {
        if self.port == self.transport.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.transport.scheme(), self.host, self.port)
    }
}

/// Any byte stream hyper can drive.
pub trait Io: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Io for T {}

/// Manages the connection process: DNS -> TCP -> SSL.
/// Roughly equivalent to net::ConnectJob.
pub struct ConnectJob;

impl ConnectJob {
    pub async fn connect(target: &Target) -> Result<Box<dyn Io>, NetError> {
        // 1. DNS Resolution
        let addrs: Vec<_> = tokio::net::lookup_host((target.host.as_str(), target.port))
            .await
            .dns_context(&target.host)?
            .collect();
        if addrs.is_empty() {
            return Err(NetError::NameNotResolved);
        }

        // 2. TCP Connect, first address that answers wins
        let mut last_err = NetError::ConnectionFailed;
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect(addr)
                .await
                .connection_context(&target.host, target.port)
            {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = e,
            }
        }
        let stream = stream.ok_or(last_err)?;
        let _ = stream.set_nodelay(true);

        // 3. SSL Handshake (if https), default verification, HTTP/1.1 only
        match target.transport {
            Transport::Http => Ok(Box::new(stream)),
            Transport::Https => {
                let mut builder = SslConnector::builder(SslMethod::tls())
                    .map_err(|_| NetError::SslProtocolError)?;
                builder
                    .set_alpn_protos(b"\x08http/1.1")
                    .map_err(|_| NetError::SslProtocolError)?;

                let config = builder
                    .build()
                    .configure()
                    .map_err(|_| NetError::SslProtocolError)?;

                let tls_stream = tokio_boring::connect(config, &target.host, stream)
                    .await
                    .map_err(|e| {
                        tracing::warn!(peer = %target, error = ?e, "SSL handshake failed");
                        NetError::SslProtocolError
                    })?;

                Ok(Box::new(tls_stream))
            }
        }
    }
}
