//! Minimal HTTP/1.1 client for replaying captured requests.
//!
//! Purpose-built for the request emulator: one request per connection
//! (`Connection: close`), whole-body reads, content-length / chunked / EOF
//! framing, optional TLS. Pairs with asupersync for cancel-correctness.

use crate::error::{Error, Result};
use asupersync::io::ext::AsyncWriteExt;
use asupersync::io::{AsyncRead, AsyncWrite, ReadBuf};
use asupersync::net::tcp::stream::TcpStream;
use asupersync::tls::{TlsConnector, TlsConnectorBuilder};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use url::Url;

const DEFAULT_USER_AGENT: &str = concat!("rewind/", env!("CARGO_PKG_VERSION"));
const MAX_HEADER_BYTES: usize = 64 * 1024;
const READ_CHUNK_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Fully-read response of one replayed request.
#[derive(Debug, Clone)]
pub struct HttpResponseParts {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// One-shot HTTP/1.1 client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    tls: std::result::Result<TlsConnector, String>,
    user_agent: String,
}

impl HttpClient {
    #[must_use]
    pub fn new() -> Self {
        let tls = TlsConnectorBuilder::new()
            .with_native_roots()
            .and_then(|builder| builder.alpn_protocols(vec![b"http/1.1".to_vec()]).build())
            .map_err(|e| e.to_string());
        Self {
            tls,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Send `method url` with the given headers and body; read the full
    /// response. `timeout` bounds the whole exchange.
    pub async fn send(
        &self,
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &[u8],
        timeout: Option<Duration>,
    ) -> Result<HttpResponseParts> {
        let exchange = self.send_inner(method, url, headers, body);
        match timeout {
            Some(duration) => {
                asupersync::time::timeout(asupersync::time::wall_now(), duration, Box::pin(exchange))
                    .await
                    .map_err(|_| Error::http(format!("request to {url} timed out")))?
            }
            None => exchange.await,
        }
    }

    async fn send_inner(
        &self,
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &[u8],
    ) -> Result<HttpResponseParts> {
        let parsed =
            Url::parse(url).map_err(|e| Error::http(format!("invalid URL {url}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::http(format!("URL {url} has no host")))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| Error::http(format!("URL {url} has no port")))?;

        let tcp = TcpStream::connect((host.clone(), port)).await?;
        let mut transport = match parsed.scheme() {
            "http" => Transport::Tcp(tcp),
            "https" => {
                let tls = self
                    .tls
                    .as_ref()
                    .map_err(|e| Error::http(format!("TLS configuration error: {e}")))?;
                let stream = tls
                    .clone()
                    .connect(&host, tcp)
                    .await
                    .map_err(|e| Error::http(format!("TLS connect failed: {e}")))?;
                Transport::Tls(Box::new(stream))
            }
            other => return Err(Error::http(format!("unsupported scheme {other}"))),
        };

        let mut target = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            target.push('?');
            target.push_str(query);
        }

        let head = build_request_head(method, &target, &host, &self.user_agent, headers, body);
        transport.write_all(&head).await?;
        if !body.is_empty() {
            transport.write_all(body).await?;
        }
        transport.flush().await?;

        let mut reader = Reader::new(transport);
        let (status, response_headers) = reader.read_head().await?;
        let body = reader.read_body(&response_headers).await?;

        Ok(HttpResponseParts {
            status,
            headers: response_headers,
            body,
        })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip CR/LF from header names and values to prevent header injection.
fn sanitize(value: &str) -> String {
    value.chars().filter(|&c| c != '\r' && c != '\n').collect()
}

fn build_request_head(
    method: &str,
    target: &str,
    host: &str,
    user_agent: &str,
    headers: &BTreeMap<String, String>,
    body: &[u8],
) -> Vec<u8> {
    use std::fmt::Write as _;
    let mut out = String::new();
    let _ = write!(out, "{method} {target} HTTP/1.1\r\n");
    let _ = write!(out, "Host: {host}\r\n");
    let _ = write!(out, "Connection: close\r\n");
    if !headers.keys().any(|k| k.eq_ignore_ascii_case("user-agent")) {
        let _ = write!(out, "User-Agent: {user_agent}\r\n");
    }
    let _ = write!(out, "Content-Length: {}\r\n", body.len());
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("host")
            || name.eq_ignore_ascii_case("content-length")
            || name.eq_ignore_ascii_case("connection")
        {
            continue;
        }
        let _ = write!(out, "{}: {}\r\n", sanitize(name), sanitize(value));
    }
    out.push_str("\r\n");
    out.into_bytes()
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_head(head: &[u8]) -> Result<(u16, BTreeMap<String, String>)> {
    let text =
        std::str::from_utf8(head).map_err(|e| Error::http(format!("invalid headers: {e}")))?;
    let mut lines = text.split("\r\n");

    let status_line = lines.next().ok_or_else(|| Error::http("missing status line"))?;
    let mut parts = status_line.split_whitespace();
    let _version = parts.next().ok_or_else(|| Error::http("invalid status line"))?;
    let status: u16 = parts
        .next()
        .ok_or_else(|| Error::http("invalid status line"))?
        .parse()
        .map_err(|_| Error::http("invalid status code"))?;

    let mut headers = BTreeMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::http("invalid header line"))?;
        headers.insert(name.trim().to_string(), value.trim().to_string());
    }
    Ok((status, headers))
}

#[derive(Debug, Clone, Copy)]
enum BodyFraming {
    Empty,
    ContentLength(usize),
    Chunked,
    Eof,
}

fn body_framing(headers: &BTreeMap<String, String>) -> BodyFraming {
    let mut content_length = None;
    let mut chunked = false;
    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        if name == "content-length" {
            content_length = value.trim().parse::<usize>().ok();
        } else if name == "transfer-encoding"
            && value
                .to_ascii_lowercase()
                .split(',')
                .any(|v| v.trim() == "chunked")
        {
            chunked = true;
        }
    }
    if chunked {
        return BodyFraming::Chunked;
    }
    match content_length {
        Some(0) => BodyFraming::Empty,
        Some(n) => BodyFraming::ContentLength(n),
        None => BodyFraming::Eof,
    }
}

struct Reader<R> {
    transport: R,
    buf: Vec<u8>,
    pos: usize,
}

impl<R: AsyncRead + Unpin> Reader<R> {
    fn new(transport: R) -> Self {
        Self {
            transport,
            buf: Vec::with_capacity(8192),
            pos: 0,
        }
    }

    fn available(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    fn consume(&mut self, n: usize) {
        self.pos += n;
        if self.pos >= self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        }
    }

    fn take(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.available().len());
        let out = self.available()[..n].to_vec();
        self.consume(n);
        out
    }

    /// Read once from the transport into the buffer; 0 means EOF.
    async fn fill(&mut self) -> Result<usize> {
        if self.buf.len() - self.pos > MAX_BODY_BYTES {
            return Err(Error::http("response body too large"));
        }
        let mut scratch = [0u8; READ_CHUNK_BYTES];
        let n = read_some(&mut self.transport, &mut scratch).await?;
        self.buf.extend_from_slice(&scratch[..n]);
        Ok(n)
    }

    async fn read_head(&mut self) -> Result<(u16, BTreeMap<String, String>)> {
        loop {
            if self.available().len() > MAX_HEADER_BYTES {
                return Err(Error::http("response headers too large"));
            }
            if let Some(end) = find_double_crlf(self.available()) {
                let head = self.available()[..end - 4].to_vec();
                self.consume(end);
                return parse_head(&head);
            }
            if self.fill().await? == 0 {
                return Err(Error::http("connection closed before headers"));
            }
        }
    }

    async fn read_body(&mut self, headers: &BTreeMap<String, String>) -> Result<Vec<u8>> {
        match body_framing(headers) {
            BodyFraming::Empty => Ok(Vec::new()),
            BodyFraming::ContentLength(n) => self.read_exact_body(n).await,
            BodyFraming::Chunked => self.read_chunked_body().await,
            BodyFraming::Eof => self.read_to_eof().await,
        }
    }

    async fn read_exact_body(&mut self, n: usize) -> Result<Vec<u8>> {
        if n > MAX_BODY_BYTES {
            return Err(Error::http("response body too large"));
        }
        while self.available().len() < n {
            if self.fill().await? == 0 {
                return Err(Error::http("unexpected EOF reading body"));
            }
        }
        Ok(self.take(n))
    }

    async fn read_to_eof(&mut self) -> Result<Vec<u8>> {
        while self.fill().await? > 0 {}
        let len = self.available().len();
        Ok(self.take(len))
    }

    async fn read_chunked_body(&mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        loop {
            let line_end = loop {
                if let Some(end) = find_crlf(self.available()) {
                    break end;
                }
                if self.fill().await? == 0 {
                    return Err(Error::http("unexpected EOF reading chunk size"));
                }
            };
            let size_line = String::from_utf8_lossy(&self.available()[..line_end]).into_owned();
            let size_part = size_line.split(';').next().unwrap_or("").trim().to_string();
            let chunk_size = usize::from_str_radix(&size_part, 16)
                .map_err(|_| Error::http(format!("invalid chunk size {size_part}")))?;
            self.consume(line_end + 2);

            if chunk_size == 0 {
                // Trailer section ends at an empty line.
                loop {
                    if let Some(end) = find_crlf(self.available()) {
                        self.consume(end + 2);
                        if end == 0 {
                            return Ok(body);
                        }
                        continue;
                    }
                    if self.fill().await? == 0 {
                        // Tolerate a server that closes right after `0\r\n`.
                        return Ok(body);
                    }
                }
            }

            if body.len() + chunk_size > MAX_BODY_BYTES {
                return Err(Error::http("response body too large"));
            }
            while self.available().len() < chunk_size + 2 {
                if self.fill().await? == 0 {
                    return Err(Error::http("unexpected EOF reading chunk data"));
                }
            }
            body.extend_from_slice(&self.available()[..chunk_size]);
            let data_end = &self.available()[chunk_size..chunk_size + 2];
            if data_end != b"\r\n" {
                return Err(Error::http("invalid chunk terminator"));
            }
            self.consume(chunk_size + 2);
        }
    }
}

async fn read_some<R: AsyncRead + Unpin>(reader: &mut R, dst: &mut [u8]) -> std::io::Result<usize> {
    futures::future::poll_fn(|cx| {
        let mut read_buf = ReadBuf::new(dst);
        match Pin::new(&mut *reader).poll_read(cx, &mut read_buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(())) => Poll::Ready(Ok(read_buf.filled().len())),
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
        }
    })
    .await
}

#[derive(Debug)]
enum Transport {
    Tcp(TcpStream),
    Tls(Box<asupersync::tls::TlsStream<TcpStream>>),
}

impl Unpin for Transport {}

impl AsyncRead for Transport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(&mut **stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match &mut *self {
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(&mut **stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(&mut **stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(&mut **stream).poll_shutdown(cx),
        }
    }
}
