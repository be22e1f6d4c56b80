use std::io;
use std::net::SocketAddr;

/// Datagram transport the shell runs on.
///
/// Implemented for [`may::net::UdpSocket`]; calls block the current
/// coroutine, not the OS thread.
pub trait Transport: Send + Sync + 'static {
    /// Receive one datagram.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Send one datagram.
    fn send_to(&self, bytes: &[u8], peer: SocketAddr) -> io::Result<usize>;

    /// Address the transport is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Transport for may::net::UdpSocket {
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        may::net::UdpSocket::recv_from(self, buf)
    }

    fn send_to(&self, bytes: &[u8], peer: SocketAddr) -> io::Result<usize> {
        may::net::UdpSocket::send_to(self, bytes, peer)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        may::net::UdpSocket::local_addr(self)
    }
}
