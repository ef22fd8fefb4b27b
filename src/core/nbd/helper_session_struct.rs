// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ETAG, IF_NONE_MATCH, RANGE};
use reqwest::StatusCode;

// From standard library
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

// From this library
use crate::core::errors::NbdServerError;
use crate::core::nbd::{
    HelperConfig, HelperErrorKind, HelperReport, NbdCommand, ReplyHeader, RequestHeader,
    ServerInfo, REQUEST_HEADER_SIZE, REQUEST_MAGIC,
};

/// Upper bound on read-ahead, so helper memory stays bounded.
pub const READAHEAD_WINDOW: u64 = 4 * 1024 * 1024;

/// Timeout of a single HTTP range request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transient fetch failures are retried this many times with doubling
/// backoff and jitter, capped.
const FETCH_RETRIES: u32 = 5;
const BACKOFF_START: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(15);

/// The data plane of the NBD helper process.
///
/// Receives NBD requests from its socket end, synthesizes HTTP range GETs
/// against the discovered bundle URL, and replies with the fetched bytes.
/// Sequential reads are coalesced through a bounded read-ahead buffer, so a
/// chunk-by-chunk stream does not turn into one request per 4 KiB.
///
/// The session runs inside the helper subprocess, keeping TLS and HTTP
/// state out of the control process.
#[derive(Debug)]
pub struct HelperSession {
    sock: UnixStream,
    client: Client,
    effective_url: String,
    data_size: u64,
    cache: Vec<u8>,
    cache_offset: u64,
    fetched_bytes: u64,
    requests: u64,
}

impl HelperSession {
    /// Runs a helper session over `sock`: configuration line in, discovery
    /// report out, then NBD request service until disconnect.
    pub fn run(sock: UnixStream) -> Result<(), NbdServerError> {
        let mut reader = BufReader::new(sock.try_clone()?);
        let mut line = String::new();
        reader.read_line(&mut line)?;

        let config: HelperConfig = serde_json::from_str(&line).map_err(|e| {
            NbdServerError::Protocol(format!("malformed helper configuration: {e}"))
        })?;

        log::debug!("HelperSession::run configured for {:?}", config.url);

        match Self::discover(&config) {
            Ok((client, info)) => {
                let session = HelperSession {
                    sock,
                    client,
                    effective_url: info.effective_url.clone(),
                    data_size: info.data_size,
                    cache: Vec::new(),
                    cache_offset: 0,
                    fetched_bytes: 0,
                    requests: 0,
                };

                send_report(&session.sock, &HelperReport::Ready { info })?;

                session.serve(reader)
            }
            Err(NbdServerError::NotModified(message)) => {
                send_report(&sock, &HelperReport::NotModified)?;
                log::debug!("HelperSession::run {}", message);

                Ok(())
            }
            Err(e) => {
                let kind = match &e {
                    NbdServerError::NotFound(_) => HelperErrorKind::NotFound,
                    NbdServerError::Unauthorized(_) => HelperErrorKind::Unauthorized,
                    NbdServerError::Configuration(_) => HelperErrorKind::Configuration,
                    NbdServerError::Timeout(_) => HelperErrorKind::Timeout,
                    _ => HelperErrorKind::Protocol,
                };
                send_report(
                    &sock,
                    &HelperReport::Error {
                        kind,
                        message: e.to_string(),
                    },
                )?;

                Err(e)
            }
        }
    }

    /// Builds the HTTP client and performs the HEAD-equivalent discovery
    /// request (a one-byte range GET, optionally conditional).
    fn discover(config: &HelperConfig) -> Result<(Client, ServerInfo), NbdServerError> {
        let client = build_client(config)?;

        let mut request = client.get(&config.url).header(RANGE, "bytes=0-0");
        if let Some(etag) = &config.etag {
            request = request.header(IF_NONE_MATCH, etag.as_str());
        }

        let response = request.send().map_err(request_error)?;

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                return Err(NbdServerError::NotModified(format!(
                    "bundle at {:?} is unchanged",
                    config.url
                )));
            }
            StatusCode::NOT_FOUND => {
                return Err(NbdServerError::NotFound(format!(
                    "bundle not found at {:?} (HTTP 404)",
                    config.url
                )));
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(NbdServerError::Unauthorized(format!(
                    "access to bundle at {:?} denied (HTTP {})",
                    config.url,
                    response.status().as_u16()
                )));
            }
            StatusCode::PARTIAL_CONTENT | StatusCode::OK => {}
            status => {
                return Err(NbdServerError::Protocol(format!(
                    "unexpected HTTP status {} from {:?}",
                    status.as_u16(),
                    config.url
                )));
            }
        }

        let data_size = if response.status() == StatusCode::PARTIAL_CONTENT {
            content_range_total(&response).ok_or_else(|| {
                NbdServerError::Protocol(format!(
                    "missing or malformed Content-Range from {:?}",
                    config.url
                ))
            })?
        } else {
            response.content_length().unwrap_or(0)
        };

        if data_size == 0 {
            return Err(NbdServerError::Protocol(format!(
                "server did not report a bundle size for {:?}",
                config.url
            )));
        }

        let header_string = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };

        let info = ServerInfo {
            data_size,
            effective_url: response.url().to_string(),
            current_time: header_string("date"),
            modified_time: header_string("last-modified"),
            etag: response
                .headers()
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
        };

        log::debug!(
            "HelperSession::discover bundle holds {} bytes at {:?}",
            info.data_size,
            info.effective_url
        );

        Ok((client, info))
    }

    fn serve(mut self, mut reader: BufReader<UnixStream>) -> Result<(), NbdServerError> {
        loop {
            let mut wire = [0u8; REQUEST_HEADER_SIZE];
            match reader.read_exact(&mut wire) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    log::debug!("HelperSession::serve control socket closed");
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let request = RequestHeader::decode(&wire);
            if request.magic != REQUEST_MAGIC {
                return Err(NbdServerError::Protocol(format!(
                    "unknown NBD request magic {:#010x}",
                    request.magic
                )));
            }

            match NbdCommand::try_from(request.command & 0xffff) {
                Ok(NbdCommand::Read) => self.serve_read(&request)?,
                Ok(NbdCommand::Disconnect) => {
                    log::info!(
                        "HelperSession::serve disconnect: served {} requests, fetched {} bytes over HTTP",
                        self.requests,
                        self.fetched_bytes
                    );
                    break;
                }
                Ok(NbdCommand::Write) => {
                    // The device is read-only; drain the payload the kernel
                    // already queued, then refuse.
                    std::io::copy(
                        &mut reader.by_ref().take(request.length as u64),
                        &mut std::io::sink(),
                    )?;
                    self.reply(request.handle, libc::EPERM as u32, &[])?;
                }
                Ok(NbdCommand::Trim) => {
                    self.reply(request.handle, libc::EPERM as u32, &[])?;
                }
                Ok(NbdCommand::Flush) | Err(_) => {
                    self.reply(request.handle, libc::EINVAL as u32, &[])?;
                }
            }
        }

        Ok(())
    }

    fn serve_read(&mut self, request: &RequestHeader) -> Result<(), NbdServerError> {
        self.requests += 1;

        let offset = request.offset;
        let length = request.length as u64;

        if length == 0 || offset.checked_add(length).map_or(true, |end| end > self.data_size) {
            return self.reply(request.handle, libc::EINVAL as u32, &[]);
        }

        if !self.cache_covers(offset, length) {
            let (start, len) = fetch_range(offset, length, self.data_size);
            match self.fetch(start, len) {
                Ok(body) => {
                    self.fetched_bytes += body.len() as u64;
                    self.cache = body;
                    self.cache_offset = start;
                }
                Err(errno) => return self.reply(request.handle, errno, &[]),
            }
        }

        let begin = (offset - self.cache_offset) as usize;
        let data = &self.cache[begin..begin + length as usize];

        self.reply(request.handle, 0, data)
    }

    fn cache_covers(&self, offset: u64, length: u64) -> bool {
        offset >= self.cache_offset
            && offset + length <= self.cache_offset + self.cache.len() as u64
    }

    /// Fetches `[start, start + length)` with bounded retries. Returns the
    /// body, or the errno to put in the NBD reply.
    fn fetch(&self, start: u64, length: u64) -> Result<Vec<u8>, u32> {
        let mut backoff = BACKOFF_START;

        for attempt in 0..FETCH_RETRIES {
            let range = format!("bytes={}-{}", start, start + length - 1);
            let result = self
                .client
                .get(&self.effective_url)
                .header(RANGE, range.clone())
                .send();

            match result {
                Ok(response) => match response.status() {
                    StatusCode::PARTIAL_CONTENT | StatusCode::OK => {
                        match response.bytes() {
                            Ok(body) if body.len() as u64 == length => {
                                return Ok(body.to_vec());
                            }
                            Ok(body) => {
                                log::warn!(
                                    "HelperSession::fetch short body: {} of {} bytes",
                                    body.len(),
                                    length
                                );
                                return Err(libc::EIO as u32);
                            }
                            Err(e) => {
                                log::warn!("HelperSession::fetch body read failed: {}", e);
                            }
                        }
                    }
                    StatusCode::NOT_FOUND => return Err(libc::ENOENT as u32),
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                        return Err(libc::EACCES as u32)
                    }
                    status if status.is_server_error() => {
                        log::warn!("HelperSession::fetch HTTP {} for {}", status.as_u16(), range);
                    }
                    status => {
                        log::warn!("HelperSession::fetch HTTP {} for {}", status.as_u16(), range);
                        return Err(libc::EIO as u32);
                    }
                },
                Err(e) if e.is_timeout() => {
                    log::warn!("HelperSession::fetch timed out: {}", e);
                }
                Err(e) => {
                    log::warn!("HelperSession::fetch request failed: {}", e);
                }
            }

            if attempt + 1 < FETCH_RETRIES {
                std::thread::sleep(jittered(backoff));
                backoff = (backoff * 2).min(BACKOFF_CAP);
            }
        }

        Err(libc::EIO as u32)
    }

    fn reply(&self, handle: [u8; 8], error: u32, data: &[u8]) -> Result<(), NbdServerError> {
        let mut sock = &self.sock;
        sock.write_all(&ReplyHeader::new(handle, error).encode())?;
        if !data.is_empty() {
            sock.write_all(data)?;
        }

        Ok(())
    }
}

/// Range to actually fetch for a read at `offset`: at least the request, at
/// most the read-ahead window, never past the end of the bundle.
fn fetch_range(offset: u64, length: u64, data_size: u64) -> (u64, u64) {
    let window = READAHEAD_WINDOW.max(length);
    let len = window.min(data_size - offset).max(length);

    (offset, len)
}

fn jittered(base: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..1.5);

    base.mul_f64(factor)
}

fn send_report(mut sock: &UnixStream, report: &HelperReport) -> Result<(), NbdServerError> {
    let mut line = serde_json::to_string(report)
        .map_err(|e| NbdServerError::Protocol(format!("failed to encode report: {e}")))?;
    line.push('\n');

    sock.write_all(line.as_bytes())?;

    Ok(())
}

fn build_client(config: &HelperConfig) -> Result<Client, NbdServerError> {
    let mut builder = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .danger_accept_invalid_certs(config.no_verify);

    if let Some(ca) = &config.tls_ca {
        let pem = std::fs::read(ca).map_err(|e| {
            NbdServerError::Configuration(format!("failed to read CA bundle {:?}: {}", ca, e))
        })?;
        let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
            NbdServerError::Configuration(format!("invalid CA bundle {:?}: {}", ca, e))
        })?;
        builder = builder.add_root_certificate(cert);
    }

    match (&config.tls_cert, &config.tls_key) {
        (Some(cert), Some(key)) => {
            if cert.starts_with("pkcs11:") || key.starts_with("pkcs11:") {
                return Err(NbdServerError::Configuration(
                    "PKCS#11 TLS material requires an external TLS engine".to_owned(),
                ));
            }

            let cert_pem = std::fs::read(cert).map_err(|e| {
                NbdServerError::Configuration(format!(
                    "failed to read TLS certificate {:?}: {}",
                    cert, e
                ))
            })?;
            let key_pem = std::fs::read(key).map_err(|e| {
                NbdServerError::Configuration(format!("failed to read TLS key {:?}: {}", key, e))
            })?;

            let identity =
                reqwest::Identity::from_pkcs8_pem(&cert_pem, &key_pem).map_err(|e| {
                    NbdServerError::Configuration(format!("invalid TLS client identity: {e}"))
                })?;
            builder = builder.identity(identity);
        }
        (None, None) => {}
        _ => {
            return Err(NbdServerError::Configuration(
                "TLS client certificate and key must be configured together".to_owned(),
            ));
        }
    }

    if !config.headers.is_empty() {
        let mut map = HeaderMap::new();
        for line in &config.headers {
            let (name, value) = parse_header_line(line)?;
            map.insert(name, value);
        }
        builder = builder.default_headers(map);
    }

    builder.build().map_err(|e| {
        NbdServerError::Configuration(format!("failed to build HTTP client: {e}"))
    })
}

/// Parses a `Name: value` header line.
fn parse_header_line(line: &str) -> Result<(HeaderName, HeaderValue), NbdServerError> {
    let (name, value) = line.split_once(':').ok_or_else(|| {
        NbdServerError::Configuration(format!("malformed header {:?}, expected `Name: value`", line))
    })?;

    let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| {
        NbdServerError::Configuration(format!("invalid header name in {:?}: {}", line, e))
    })?;
    let value = HeaderValue::from_str(value.trim()).map_err(|e| {
        NbdServerError::Configuration(format!("invalid header value in {:?}: {}", line, e))
    })?;

    Ok((name, value))
}

fn content_range_total(response: &reqwest::blocking::Response) -> Option<u64> {
    // `Content-Range: bytes 0-0/12345`
    response
        .headers()
        .get("content-range")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit_once('/'))
        .and_then(|(_, total)| total.parse().ok())
}

fn request_error(err: reqwest::Error) -> NbdServerError {
    if err.is_timeout() {
        NbdServerError::Timeout(format!("discovery request timed out: {err}"))
    } else {
        NbdServerError::Protocol(format!("discovery request failed: {err}"))
    }
}
