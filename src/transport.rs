// src/transport.rs
//! Datagram transport used by the event loop.
//!
//! The engine only needs non-blocking send/receive and a bounded wait for
//! readiness. [`UdpTransport`] provides that over plain non-blocking std
//! UDP sockets, one per configured input port. With a single socket the wait
//! blocks in the kernel; with several it peeks each socket in short steps.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::config::LOCAL_HOST;

/// Largest datagram we expect to receive.
pub const RECV_BUFFER: usize = 1500;

const POLL_STEP: Duration = Duration::from_millis(10);

pub trait Transport {
    /// Receive one datagram if one is waiting; never blocks.
    fn receive_ready(&mut self) -> io::Result<Option<(Vec<u8>, SocketAddr)>>;

    /// Send one datagram from the local address `from`.
    ///
    /// `ErrorKind::WouldBlock` means the transport is not ready and the
    /// caller should retry later.
    fn send_datagram(&mut self, from: SocketAddr, to: SocketAddr, bytes: &[u8]) -> io::Result<usize>;

    /// Wait until a datagram may be readable, the caller has something to
    /// send, or `timeout` elapses.
    fn wait_ready(&mut self, timeout: Duration, want_send: bool) -> io::Result<()>;
}

/// Non-blocking UDP sockets bound on the loopback host.
pub struct UdpTransport {
    sockets: Vec<UdpSocket>,
    next: usize,
}

impl UdpTransport {
    /// Bind one socket per port on the loopback host.
    pub fn bind(ports: &[u16]) -> io::Result<Self> {
        let mut sockets = Vec::with_capacity(ports.len());
        for &port in ports {
            let socket = UdpSocket::bind((LOCAL_HOST, port))?;
            socket.set_nonblocking(true)?;
            debug!("bound {}", socket.local_addr()?);
            sockets.push(socket);
        }
        if sockets.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "no ports to bind"));
        }
        Ok(UdpTransport { sockets, next: 0 })
    }

    pub fn local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.sockets.iter().map(|s| s.local_addr()).collect()
    }

    fn socket_for(&self, from: SocketAddr) -> &UdpSocket {
        self.sockets
            .iter()
            .find(|s| s.local_addr().is_ok_and(|a| a == from))
            .unwrap_or(&self.sockets[0])
    }
}

/// Errors that only mean "nothing to read right now".
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}

impl Transport for UdpTransport {
    fn receive_ready(&mut self) -> io::Result<Option<(Vec<u8>, SocketAddr)>> {
        let mut buf = [0u8; RECV_BUFFER];
        let count = self.sockets.len();

        for i in 0..count {
            let idx = (self.next + i) % count;
            match self.sockets[idx].recv_from(&mut buf) {
                Ok((amt, src)) => {
                    self.next = (idx + 1) % count;
                    trace!("received {amt} bytes from {src}");
                    return Ok(Some((buf[..amt].to_vec(), src)));
                }
                Err(e) if is_transient(&e) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn send_datagram(&mut self, from: SocketAddr, to: SocketAddr, bytes: &[u8]) -> io::Result<usize> {
        self.socket_for(from).send_to(bytes, to)
    }

    fn wait_ready(&mut self, timeout: Duration, want_send: bool) -> io::Result<()> {
        if want_send || timeout.is_zero() {
            return Ok(());
        }
        if let [socket] = self.sockets.as_slice() {
            return wait_blocking(socket, timeout);
        }

        let deadline = Instant::now() + timeout;
        let mut peek = [0u8; 1];
        loop {
            for socket in &self.sockets {
                match socket.peek_from(&mut peek) {
                    Ok(_) => return Ok(()),
                    Err(e) if is_transient(&e) => {}
                    // let receive_ready surface the real error
                    Err(_) => return Ok(()),
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(POLL_STEP.min(deadline - now));
        }
    }
}

/// Block on one socket until a datagram is waiting or `timeout` passes,
/// then put it back in non-blocking mode.
fn wait_blocking(socket: &UdpSocket, timeout: Duration) -> io::Result<()> {
    socket.set_read_timeout(Some(timeout))?;
    socket.set_nonblocking(false)?;
    let mut peek = [0u8; 1];
    // data, timeout or error all end the wait; receive_ready surfaces errors
    let _ = socket.peek_from(&mut peek);
    socket.set_nonblocking(true)
}
