//! TCP socket tuning for framed low-latency traffic.
//!
//! # Safety
//!
//! This module uses unsafe code to borrow the raw file descriptor/socket for
//! option configuration. The unsafe operations are encapsulated and safe to
//! use from the public API.

#![allow(unsafe_code)]

use std::io;

use crate::config::SOCKET_BUFFER_SIZE;

/// Apply the transport's socket options to a connected compio `TcpStream`:
/// `TCP_NODELAY = 1` and send/receive buffers sized for at least four
/// maximum frames.
///
/// # Errors
///
/// Returns an error if any socket option cannot be set.
pub fn configure_stream(stream: &compio::net::TcpStream) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::fd::{AsRawFd, FromRawFd};
        let fd = stream.as_raw_fd();
        let sock = unsafe { socket2::Socket::from_raw_fd(fd) };
        let result = apply(&sock);
        std::mem::forget(sock); // Don't close the fd
        result
    }

    #[cfg(windows)]
    {
        use std::os::windows::io::{AsRawSocket, FromRawSocket};
        let raw = stream.as_raw_socket();
        let sock = unsafe { socket2::Socket::from_raw_socket(raw) };
        let result = apply(&sock);
        std::mem::forget(sock); // Don't close the socket
        result
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = stream;
        Ok(())
    }
}

#[cfg(any(unix, windows))]
fn apply(sock: &socket2::Socket) -> io::Result<()> {
    sock.set_nodelay(true)?;
    sock.set_recv_buffer_size(SOCKET_BUFFER_SIZE)?;
    sock.set_send_buffer_size(SOCKET_BUFFER_SIZE)?;
    Ok(())
}
