use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A raw HTTP/1.1 server for driving the client against scripted responses.
#[allow(dead_code)]
pub struct MockHttpServer {
    listener: TcpListener,
    port: u16,
    accepts: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockHttpServer {
    /// Create a new mock server bound to a random port.
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            port,
            accepts: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Counter of accepted connections, usable after `start`.
    pub fn accepts(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.accepts)
    }

    /// Start the server; each connection is handed to `handler`.
    pub fn start<F, Fut>(self, handler: F) -> tokio::task::JoinHandle<()>
    where
        F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let handler = Arc::new(handler);
        tokio::spawn(async move {
            while let Ok((stream, _)) = self.listener.accept().await {
                self.accepts.fetch_add(1, Ordering::SeqCst);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    handler(stream).await;
                });
            }
        })
    }

    /// Serve every request on every connection with the same raw response.
    pub fn start_static(self, response: &'static str) -> tokio::task::JoinHandle<()> {
        self.start(move |mut stream| async move {
            while read_request(&mut stream).await.is_some() {
                if stream.write_all(response.as_bytes()).await.is_err() {
                    break;
                }
            }
        })
    }
}

/// One parsed request: the head as text and the decoded body.
#[allow(dead_code)]
#[derive(Debug)]
pub struct ReceivedRequest {
    pub head: String,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl ReceivedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    /// First value of a header, name compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim()
                .eq_ignore_ascii_case(name)
                .then(|| v.trim().to_string())
        })
    }
}

/// Read one request, decoding a content-length or chunked body.
/// Returns `None` once the peer closes.
pub async fn read_request(stream: &mut TcpStream) -> Option<ReceivedRequest> {
    let mut buf = Vec::new();
    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        if !fill(stream, &mut buf).await {
            return None;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut rest = buf[head_end..].to_vec();
    let req = ReceivedRequest {
        head,
        body: Vec::new(),
    };

    if let Some(len) = req.header("content-length") {
        let len: usize = len.parse().ok()?;
        while rest.len() < len {
            if !fill(stream, &mut rest).await {
                return None;
            }
        }
        rest.truncate(len);
        return Some(ReceivedRequest { body: rest, ..req });
    }

    let chunked = req
        .header("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"));
    if chunked {
        loop {
            if let Some(body) = decode_chunked(&rest) {
                return Some(ReceivedRequest { body, ..req });
            }
            if !fill(stream, &mut rest).await {
                return None;
            }
        }
    }

    Some(req)
}

async fn fill(stream: &mut TcpStream, buf: &mut Vec<u8>) -> bool {
    let mut chunk = [0u8; 4096];
    match stream.read(&mut chunk).await {
        Ok(0) | Err(_) => false,
        Ok(n) => {
            buf.extend_from_slice(&chunk[..n]);
            true
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Decode a complete chunked body, or `None` if more bytes are needed.
fn decode_chunked(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        let line_end = pos + find(&data[pos..], b"\r\n")?;
        let size_str = std::str::from_utf8(&data[pos..line_end]).ok()?;
        let size = usize::from_str_radix(size_str.split(';').next()?.trim(), 16).ok()?;
        pos = line_end + 2;
        if size == 0 {
            return (data.len() >= pos + 2).then_some(out);
        }
        if data.len() < pos + size + 2 {
            return None;
        }
        out.extend_from_slice(&data[pos..pos + size]);
        pos += size + 2;
    }
}
