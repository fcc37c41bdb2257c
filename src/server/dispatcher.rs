//! The seam between readiness detection and handler execution.
//!
//! The poller thread calls [`Dispatcher::submit`] and returns to waiting at
//! once. Each submitted connection becomes one blocking task on a Tokio
//! runtime: parse the captured bytes, build the [`Response`], run the handler.
//! A small async task awaits it and reports the outcome, so a failing or
//! panicking handler costs only its own connection.

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, error, warn};

use super::connection::Connection;
use crate::config::ServerConfig;
use crate::handler::{BoxError, Handler};
use crate::http::{Request, RequestError, Response};

/// Why a dispatched connection was dropped without a complete response.
#[derive(Debug, Error)]
enum DispatchError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("handler failed: {0}")]
    Handler(BoxError),
}

pub(crate) struct Dispatcher {
    runtime: Runtime,
    handler: Arc<dyn Handler>,
    server_name: Arc<str>,
}

impl Dispatcher {
    pub(crate) fn new(config: &ServerConfig, handler: Arc<dyn Handler>) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .max_blocking_threads(config.max_handler_threads)
            .thread_name("pollhttp-worker")
            .build()?;

        Ok(Self {
            runtime,
            handler,
            server_name: Arc::from(config.server_name.as_str()),
        })
    }

    /// Schedules exactly one handler invocation for `connection`.
    ///
    /// Ownership of the connection moves to the worker; it is closed when the
    /// response is terminated or dropped.
    pub(crate) fn submit(&self, connection: Connection) {
        let handler = Arc::clone(&self.handler);
        let server_name = Arc::clone(&self.server_name);
        let peer = connection.peer();

        self.runtime.spawn(async move {
            let job = tokio::task::spawn_blocking(move || serve(connection, &*handler, &server_name));
            match job.await {
                Ok(Ok(())) => debug!(peer = %peer, "response complete, connection closed"),
                Ok(Err(DispatchError::Request(e))) => {
                    warn!(peer = %peer, error = %e, "dropping connection");
                }
                Ok(Err(e)) => error!(peer = %peer, error = %e, "dropping connection"),
                Err(e) if e.is_panic() => error!(peer = %peer, "handler panicked, dropping connection"),
                Err(e) => error!(peer = %peer, error = %e, "handler task cancelled"),
            }
        });
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

fn serve(connection: Connection, handler: &dyn Handler, server_name: &str) -> Result<(), DispatchError> {
    let (stream, peer, buf) = connection.into_parts();
    let request = Request::parse(&buf)?;

    debug!(
        peer = %peer,
        method = %request.method(),
        location = request.location(),
        "dispatching request"
    );

    let response = Response::new(stream).with_server_name(server_name);
    handler.handle(request, response).map_err(DispatchError::Handler)
}
