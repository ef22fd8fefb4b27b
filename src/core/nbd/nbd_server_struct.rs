// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use typed_builder::TypedBuilder;
use url::Url;

// From standard library
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::{Duration, Instant};

// From this library
use crate::core::errors::NbdServerError;
use crate::core::nbd::{
    HelperConfig, HelperErrorKind, HelperReport, NbdCommand, NbdDevice, ReplyHeader,
    RequestHeader, ServerInfo, REPLY_HEADER_SIZE, REPLY_MAGIC,
};
use crate::sys_utils;

/// Name of the helper binary shipped next to the library.
pub const HELPER_PROGRAM: &str = "rsupdate-nbd-helper";

/// How long a stopped helper may take to exit before escalating to SIGTERM,
/// then SIGKILL.
const REAP_TIMEOUT: Duration = Duration::from_secs(5);
const TERM_TIMEOUT: Duration = Duration::from_secs(2);

/// Control side of the bundle-over-network block device.
///
/// `NbdServer` spawns the helper subprocess that holds the HTTP/TLS state,
/// hands it one end of a socket pair, collects the discovery report, and
/// wires the socket into a kernel [`NbdDevice`]. Until the kernel owns the
/// socket, [`read`](Self::read) serves NBD-framed reads directly, which is
/// how the bundle tail is inspected before any device exists.
///
/// ```no_run
/// use rsupdate::core::nbd::NbdServer;
///
/// fn main() -> rsupdate::Result<()> {
///     let mut server = NbdServer::builder()
///         .url("https://updates.example.com/update.bundle")
///         .build();
///
///     server.start()?;
///     let device = server.attach()?.to_path_buf();
///     // layer dm-verity over `device` ...
///     server.stop()?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug, TypedBuilder)]
pub struct NbdServer {
    /// Bundle URL.
    #[builder(setter(into))]
    url: String,

    /// TLS client certificate: a local file path or a PKCS#11 URI.
    #[builder(default, setter(into, strip_option))]
    tls_cert: Option<String>,

    /// TLS client key: a local file path or a PKCS#11 URI.
    #[builder(default, setter(into, strip_option))]
    tls_key: Option<String>,

    /// CA bundle file path.
    #[builder(default, setter(into, strip_option))]
    tls_ca: Option<String>,

    /// Disables peer verification. Testing only.
    #[builder(default)]
    no_verify: bool,

    /// Extra request headers, `Name: value` each.
    #[builder(default)]
    headers: Vec<String>,

    /// Known bundle ETag; an unchanged bundle makes
    /// [`start`](Self::start) fail with
    /// [`NbdServerError::NotModified`].
    #[builder(default, setter(into, strip_option))]
    etag: Option<String>,

    /// Helper program to spawn. Defaults to [`HELPER_PROGRAM`] on `PATH`.
    #[builder(default = PathBuf::from(HELPER_PROGRAM), setter(into))]
    helper_program: PathBuf,

    #[builder(default, setter(skip))]
    sock: Option<UnixStream>,

    #[builder(default, setter(skip))]
    helper: Option<Child>,

    #[builder(default, setter(skip))]
    device: Option<NbdDevice>,

    #[builder(default, setter(skip))]
    info: Option<ServerInfo>,

    #[builder(default, setter(skip))]
    next_handle: u64,
}

impl NbdServer {
    /// Spawns the helper and performs bundle discovery.
    ///
    /// On success, [`info`](Self::info) describes the remote bundle and the
    /// server answers [`read`](Self::read) requests.
    pub fn start(&mut self) -> Result<(), NbdServerError> {
        log::debug!("NbdServer::start starting server for {:?}", self.url);

        self.check_configuration()?;

        let (control, helper_end) = socket_pair()?;

        sys_utils::set_cloexec(helper_end.as_raw_fd(), false)
            .map_err(|e| NbdServerError::Startup(format!("failed to pass helper socket: {e}")))?;

        let child = Command::new(&self.helper_program)
            .arg("--socket-fd")
            .arg(helper_end.as_raw_fd().to_string())
            .spawn()
            .map_err(|e| {
                let err_msg = format!(
                    "failed to spawn NBD helper {:?}: {}",
                    self.helper_program, e
                );
                log::debug!("NbdServer::start {}", err_msg);

                NbdServerError::Startup(err_msg)
            })?;
        drop(helper_end);

        self.helper = Some(child);
        self.sock = Some(control);

        match self.configure_helper() {
            Ok(info) => {
                log::debug!(
                    "NbdServer::start discovered {} bytes at {:?}",
                    info.data_size,
                    info.effective_url
                );
                self.info = Some(info);

                Ok(())
            }
            Err(e) => {
                self.stop_helper();
                self.sock = None;

                Err(e)
            }
        }
    }

    fn check_configuration(&self) -> Result<(), NbdServerError> {
        let url = Url::parse(&self.url).map_err(|e| {
            NbdServerError::Configuration(format!("invalid bundle URL {:?}: {}", self.url, e))
        })?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(NbdServerError::Configuration(format!(
                    "unsupported URL scheme {:?} in {:?}",
                    scheme, self.url
                )));
            }
        }

        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err(NbdServerError::Configuration(
                "TLS client certificate and key must be configured together".to_owned(),
            ));
        }

        Ok(())
    }

    fn configure_helper(&mut self) -> Result<ServerInfo, NbdServerError> {
        let sock = self.sock.as_ref().expect("socket exists while starting");

        let config = HelperConfig {
            url: self.url.clone(),
            tls_cert: self.tls_cert.clone(),
            tls_key: self.tls_key.clone(),
            tls_ca: self.tls_ca.clone(),
            no_verify: self.no_verify,
            headers: self.headers.clone(),
            etag: self.etag.clone(),
        };

        let mut line = serde_json::to_string(&config)
            .map_err(|e| NbdServerError::Protocol(format!("failed to encode config: {e}")))?;
        line.push('\n');

        let mut writer = sock;
        writer.write_all(line.as_bytes())?;

        let mut reader = BufReader::new(sock.try_clone()?);
        let mut report = String::new();
        reader.read_line(&mut report)?;

        if report.is_empty() {
            return Err(NbdServerError::Protocol(
                "NBD helper closed the control socket before reporting".to_owned(),
            ));
        }

        let report: HelperReport = serde_json::from_str(&report).map_err(|e| {
            NbdServerError::Protocol(format!("malformed helper report: {e}"))
        })?;

        match report {
            HelperReport::Ready { info } => Ok(info),
            HelperReport::NotModified => Err(NbdServerError::NotModified(format!(
                "bundle at {:?} is unchanged",
                self.url
            ))),
            HelperReport::Error { kind, message } => Err(match kind {
                HelperErrorKind::NotFound => NbdServerError::NotFound(message),
                HelperErrorKind::Unauthorized => NbdServerError::Unauthorized(message),
                HelperErrorKind::Configuration => NbdServerError::Configuration(message),
                HelperErrorKind::Timeout => NbdServerError::Timeout(message),
                HelperErrorKind::Protocol => NbdServerError::Protocol(message),
            }),
        }
    }

    /// Returns the discovered bundle state, once started.
    pub fn info(&self) -> Option<&ServerInfo> {
        self.info.as_ref()
    }

    /// Returns the bundle size, once started.
    pub fn data_size(&self) -> Option<u64> {
        self.info.as_ref().map(|info| info.data_size)
    }

    /// Hands the socket to the kernel and returns the block device path.
    ///
    /// After this call, [`read`](Self::read) is unavailable: the kernel owns
    /// the socket.
    pub fn attach(&mut self) -> Result<&Path, NbdServerError> {
        let info = self.info.as_ref().ok_or_else(|| {
            NbdServerError::Startup("server not started before attach".to_owned())
        })?;
        let sock = self.sock.as_ref().ok_or_else(|| {
            NbdServerError::Startup("control socket is gone".to_owned())
        })?;

        let device = NbdDevice::setup(sock, info.data_size)?;
        self.device = Some(device);

        Ok(self.device.as_ref().expect("device just set").path())
    }

    /// Reads `buf.len()` bytes at `offset` over the control socket, NBD
    /// framed.
    ///
    /// Available between [`start`](Self::start) and
    /// [`attach`](Self::attach) only.
    pub fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<(), NbdServerError> {
        if self.device.is_some() {
            return Err(NbdServerError::Protocol(
                "control reads are unavailable while the kernel owns the socket".to_owned(),
            ));
        }
        if self.sock.is_none() {
            return Err(NbdServerError::Startup(
                "server not started before read".to_owned(),
            ));
        }

        self.next_handle += 1;
        let request = RequestHeader::new(
            NbdCommand::Read.into(),
            self.next_handle,
            offset,
            buf.len() as u32,
        );
        let sock = self.sock.as_ref().expect("checked above");

        let mut writer = sock;
        writer.write_all(&request.encode())?;

        let mut wire = [0u8; REPLY_HEADER_SIZE];
        let mut reader = sock;
        reader.read_exact(&mut wire)?;

        let reply = ReplyHeader::decode(&wire);
        if reply.magic != REPLY_MAGIC {
            return Err(NbdServerError::Protocol(format!(
                "unknown NBD reply magic {:#010x}",
                reply.magic
            )));
        }
        if reply.handle != request.handle {
            return Err(NbdServerError::Protocol(
                "NBD reply answers a different request".to_owned(),
            ));
        }

        match reply.error as i32 {
            0 => {}
            libc::ENOENT => {
                return Err(NbdServerError::NotFound(format!(
                    "bundle vanished from {:?} (HTTP 404)",
                    self.url
                )));
            }
            libc::EACCES | libc::EPERM => {
                return Err(NbdServerError::Unauthorized(format!(
                    "access to bundle at {:?} denied",
                    self.url
                )));
            }
            libc::ETIMEDOUT => {
                return Err(NbdServerError::Timeout(format!(
                    "read of {} bytes at offset {} timed out",
                    buf.len(),
                    offset
                )));
            }
            errno => {
                return Err(std::io::Error::from_raw_os_error(errno).into());
            }
        }

        reader.read_exact(buf)?;

        Ok(())
    }

    /// Stops the device, the helper, and releases every kernel resource.
    pub fn stop(&mut self) -> Result<(), NbdServerError> {
        log::debug!("NbdServer::stop stopping server for {:?}", self.url);

        let mut result = Ok(());
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.disconnect() {
                result = Err(e.into());
            }
        }

        // Closing our end unblocks the helper's request loop.
        self.sock = None;
        self.stop_helper();
        self.info = None;

        result
    }

    /// Reaps the helper: bounded wait, SIGTERM, SIGKILL.
    fn stop_helper(&mut self) {
        let Some(mut child) = self.helper.take() else {
            return;
        };

        if wait_with_timeout(&mut child, REAP_TIMEOUT) {
            return;
        }

        log::warn!("NbdServer::stop helper did not exit, sending SIGTERM");
        unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };

        if wait_with_timeout(&mut child, TERM_TIMEOUT) {
            return;
        }

        log::warn!("NbdServer::stop helper ignored SIGTERM, sending SIGKILL");
        let _ = child.kill();
        let _ = child.wait();
    }
}

impl Drop for NbdServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("NbdServer::drop {}", e);
        }
    }
}

fn socket_pair() -> Result<(UnixStream, OwnedFd), NbdServerError> {
    let mut fds = [0 as libc::c_int; 2];
    let result = unsafe {
        libc::socketpair(
            libc::AF_UNIX,
            libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
            0,
            fds.as_mut_ptr(),
        )
    };

    if result != 0 {
        let e = std::io::Error::last_os_error();

        return Err(NbdServerError::Startup(format!(
            "failed to create socket pair: {}",
            sys_utils::os_error_string(&e)
        )));
    }

    let control = unsafe { UnixStream::from_raw_fd(fds[0]) };
    let helper_end = unsafe { OwnedFd::from_raw_fd(fds[1]) };

    Ok((control, helper_end))
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) => std::thread::sleep(Duration::from_millis(50)),
            Err(_) => return true,
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nbd_server_builder_applies_defaults() {
        let server = NbdServer::builder()
            .url("https://updates.example.com/update.bundle")
            .build();

        assert_eq!(server.helper_program, PathBuf::from(HELPER_PROGRAM));
        assert!(!server.no_verify);
        assert!(server.headers.is_empty());
        assert!(server.info().is_none());
    }

    #[test]
    fn nbd_server_rejects_a_malformed_url() {
        let mut server = NbdServer::builder().url("not a url").build();

        let actual = server.start();
        assert!(matches!(actual, Err(NbdServerError::Configuration(_))));
    }

    #[test]
    fn nbd_server_rejects_an_unsupported_scheme() {
        let mut server = NbdServer::builder()
            .url("ftp://updates.example.com/update.bundle")
            .build();

        let actual = server.start();
        assert!(matches!(actual, Err(NbdServerError::Configuration(_))));
    }

    #[test]
    fn nbd_server_rejects_tls_material_without_a_key() {
        let mut server = NbdServer::builder()
            .url("https://updates.example.com/update.bundle")
            .tls_cert("/etc/ssl/client.crt")
            .build();

        let actual = server.start();
        assert!(matches!(actual, Err(NbdServerError::Configuration(_))));
    }
}
