// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! NBD helper program.
//!
//! Spawned by the control side with one end of a socket pair; holds the
//! HTTP/TLS state and serves NBD requests until disconnect. Interface:
//! `rsupdate-nbd-helper --socket-fd <fd>`, where `<fd>` is inherited with
//! close-on-exec cleared.

// From dependency library

// From standard library
use std::os::unix::io::FromRawFd;
use std::os::unix::net::UnixStream;
use std::process::ExitCode;

// From this library
use rsupdate::core::nbd::HelperSession;

fn socket_fd_from_args() -> Option<i32> {
    let mut args = std::env::args().skip(1);

    match (args.next().as_deref(), args.next()) {
        (Some("--socket-fd"), Some(fd)) => fd.parse().ok(),
        _ => None,
    }
}

fn main() -> ExitCode {
    let Some(fd) = socket_fd_from_args() else {
        eprintln!("usage: rsupdate-nbd-helper --socket-fd <fd>");

        return ExitCode::from(2);
    };

    // The fd number comes from the parent, which owns the pair and clears
    // close-on-exec on this end before spawning us.
    let sock = unsafe { UnixStream::from_raw_fd(fd) };

    match HelperSession::run(sock) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rsupdate-nbd-helper: {e}");

            ExitCode::FAILURE
        }
    }
}
