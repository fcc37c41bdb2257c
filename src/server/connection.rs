//! One accepted socket and its single-read buffer.

use std::io::{self, Read};
use std::net::SocketAddr;

use bytes::BytesMut;
use mio::net::TcpStream;
use socket2::SockRef;

/// What a single read produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    /// `n` bytes are now in the buffer.
    Data(usize),
    /// The peer closed its side before sending anything.
    Eof,
    /// The readiness event was spurious; nothing to read yet.
    WouldBlock,
}

/// An accepted connection, owned by the poller's table until it is handed off.
#[derive(Debug)]
pub(crate) struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    buf: BytesMut,
    capacity: usize,
}

impl Connection {
    /// Applies the fixed socket policy: keep-alive on, Nagle off.
    pub(crate) fn configure(stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(true)?;
        SockRef::from(stream).set_keepalive(true)
    }

    pub(crate) fn new(stream: TcpStream, peer: SocketAddr, capacity: usize) -> Self {
        Self {
            stream,
            peer,
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Performs exactly one read of at most `capacity` bytes.
    ///
    /// Anything beyond `capacity` stays in the kernel and is never read.
    pub(crate) fn read_once(&mut self) -> io::Result<ReadOutcome> {
        self.buf.clear();
        self.buf.resize(self.capacity, 0);

        let read = loop {
            match self.stream.read(&mut self.buf[..]) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other,
            }
        };

        match read {
            Ok(0) => {
                self.buf.clear();
                Ok(ReadOutcome::Eof)
            }
            Ok(n) => {
                self.buf.truncate(n);
                Ok(ReadOutcome::Data(n))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.buf.clear();
                Ok(ReadOutcome::WouldBlock)
            }
            Err(e) => Err(e),
        }
    }

    /// Bytes captured by the last successful [`read_once`](Self::read_once).
    #[cfg(test)]
    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Puts the socket back in blocking mode so the writer can complete
    /// partial writes with `write_all`. Only valid once the socket is no
    /// longer registered with the poller.
    pub(crate) fn into_blocking(self) -> io::Result<Self> {
        SockRef::from(&self.stream).set_nonblocking(false)?;
        Ok(self)
    }

    pub(crate) fn into_parts(self) -> (TcpStream, SocketAddr, BytesMut) {
        (self.stream, self.peer, self.buf)
    }
}
