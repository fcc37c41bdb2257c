//! Readiness-driven TCP server.
//!
//! One thread owns a [`mio::Poll`], the listening socket and the table of
//! accepted connections. It is the only thread that waits for readiness,
//! accepts, reads, or touches the table. A readable connection is read once,
//! removed from the table and deregistered, then handed to the dispatcher,
//! which runs the [`Handler`] on a worker pool. From then on the worker owns the
//! socket exclusively and closing it never involves the poller.
//!
//! ```text
//!  wait ──► Acceptable ──► accept ─► configure ─► register(READABLE)
//!   ▲
//!   │  ───► Readable ───► read once ─┬─ 0 bytes ──► close, no handler
//!   │                                ├─ WouldBlock ► stay registered
//!   │                                └─ n bytes ──► deregister ─► submit
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no keep-alive: every connection carries one request and one
//! response. There is no graceful shutdown either; [`Server::run`] only returns
//! when waiting on the multiplexer fails.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, ServerConfig};
use crate::handler::Handler;

mod connection;
mod dispatcher;

use connection::{Connection, ReadOutcome};
use dispatcher::Dispatcher;

/// Errors that stop the server. Per-connection failures never surface here.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("readiness multiplexer failed: {0}")]
    Poll(#[source] io::Error),

    #[error("failed to start the dispatch runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

const LISTENER: Token = Token(0);

/// The pollhttp server.
///
/// Binding happens in [`Server::bind`]; connections are only accepted once
/// [`Server::run`] is entered.
///
/// # Examples
///
/// ```rust,no_run
/// use pollhttp::config::ServerConfig;
/// use pollhttp::handler::DemoHandler;
/// use pollhttp::server::Server;
///
/// fn main() -> Result<(), pollhttp::server::ServerError> {
///     let server = Server::bind(ServerConfig::default(), DemoHandler)?;
///     server.run()
/// }
/// ```
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    dispatcher: Dispatcher,
    config: ServerConfig,
}

impl Server {
    /// Opens the multiplexer, binds the listener and starts the dispatch runtime.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Config`] if `config` is invalid or its address does not resolve.
    /// - [`ServerError::Poll`] if the multiplexer cannot be opened.
    /// - [`ServerError::Bind`] if the address cannot be bound.
    /// - [`ServerError::Runtime`] if the worker pool cannot be started.
    pub fn bind(config: ServerConfig, handler: impl Handler) -> Result<Self, ServerError> {
        config.validate()?;
        let addr = config.listen_addr()?;

        let poll = Poll::new().map_err(ServerError::Poll)?;
        let mut listener = TcpListener::bind(addr).map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(ServerError::Poll)?;

        let dispatcher = Dispatcher::new(&config, Arc::new(handler)).map_err(ServerError::Runtime)?;

        Ok(Self {
            poll,
            listener,
            local_addr,
            connections: HashMap::new(),
            next_token: LISTENER.0 + 1,
            dispatcher,
            config,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the event loop on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Poll`] when waiting for readiness fails. The
    /// listener, the multiplexer and every connection still in the table are
    /// closed before returning; the process is expected to exit.
    pub fn run(mut self) -> Result<(), ServerError> {
        let mut events = Events::with_capacity(self.config.max_events);
        info!(address = %self.local_addr, "server started, waiting for requests");

        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %e, "readiness wait failed, shutting down");
                return Err(ServerError::Poll(e));
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_pending(),
                    token => self.read_ready(token),
                }
            }
        }
    }

    /// Drains the accept queue, one connection per `accept` call.
    ///
    /// Readiness is edge-triggered, so stopping before `WouldBlock` would leave
    /// queued connections without a future event.
    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = self.register(stream, peer) {
                        warn!(peer = %peer, error = %e, "failed to set up connection, closing");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    debug!(error = %e, "accept interrupted, retrying");
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    /// Configures and registers a fresh connection. On error the stream is
    /// dropped, which closes it.
    fn register(&mut self, mut stream: TcpStream, peer: SocketAddr) -> io::Result<()> {
        Connection::configure(&stream)?;
        let token = self.next_token();
        self.poll
            .registry()
            .register(&mut stream, token, Interest::READABLE)?;
        self.connections.insert(
            token,
            Connection::new(stream, peer, self.config.read_buffer_size),
        );
        debug!(peer = %peer, token = token.0, "connection accepted");
        Ok(())
    }

    fn read_ready(&mut self, token: Token) {
        // A connection handed off earlier in this batch has no entry anymore.
        let Some(connection) = self.connections.get_mut(&token) else {
            return;
        };
        let peer = connection.peer();

        match connection.read_once() {
            Ok(ReadOutcome::WouldBlock) => {}
            Ok(ReadOutcome::Eof) => {
                debug!(peer = %peer, "peer closed before sending a request");
                self.close(token);
            }
            Ok(ReadOutcome::Data(n)) => {
                debug!(peer = %peer, bytes = n, "request read");
                if let Some(connection) = self.detach(token) {
                    match connection.into_blocking() {
                        Ok(connection) => self.dispatcher.submit(connection),
                        Err(e) => warn!(peer = %peer, error = %e, "failed to hand off connection"),
                    }
                }
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "read failed, closing");
                self.close(token);
            }
        }
    }

    /// Removes a connection from the table and the multiplexer without closing it.
    fn detach(&mut self, token: Token) -> Option<Connection> {
        let mut connection = self.connections.remove(&token)?;
        if let Err(e) = self.poll.registry().deregister(connection.stream_mut()) {
            debug!(peer = %connection.peer(), error = %e, "deregister failed");
        }
        Some(connection)
    }

    fn close(&mut self, token: Token) {
        drop(self.detach(token));
    }

    fn next_token(&mut self) -> Token {
        loop {
            let token = Token(self.next_token);
            self.next_token = self.next_token.wrapping_add(1).max(LISTENER.0 + 1);
            if !self.connections.contains_key(&token) {
                return token;
            }
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("connections", &self.connections.len())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
