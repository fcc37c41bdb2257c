//! The application seam: one [`Handler`] per server.
//!
//! A handler receives the parsed [`Request`] and the [`Response`] bound to the
//! same connection. It must terminate the response exactly once, with
//! [`Response::end`] or with [`Response::chunked`] followed by
//! [`ChunkedResponse::flush_chunks`](crate::http::ChunkedResponse::flush_chunks).
//! Dropping the response without terminating it closes the connection with no
//! bytes written.
//!
//! Handlers run on the dispatcher's worker pool, never on the poller thread, so
//! they may block.

use tracing::info;

use crate::http::{Request, Response};

/// Error type handlers may return; anything `Error + Send + Sync` converts into it.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result returned by [`Handler::handle`].
pub type HandlerResult = Result<(), BoxError>;

/// Application logic invoked once per dispatched connection.
///
/// Implemented automatically for `Fn(Request, Response) -> HandlerResult`
/// closures.
///
/// # Examples
///
/// ```
/// use pollhttp::handler::{Handler, HandlerResult};
/// use pollhttp::http::{Request, Response};
///
/// struct Echo;
///
/// impl Handler for Echo {
///     fn handle(&self, request: Request, response: Response) -> HandlerResult {
///         response.content(request.location()).end()?;
///         Ok(())
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Request, response: Response) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(Request, Response) -> HandlerResult + Send + Sync + 'static,
{
    fn handle(&self, request: Request, response: Response) -> HandlerResult {
        self(request, response)
    }
}

/// Answers every request with `Hello Reactor!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoHandler;

impl DemoHandler {
    pub const BODY: &'static str = "Hello Reactor!";
}

impl Handler for DemoHandler {
    fn handle(&self, request: Request, response: Response) -> HandlerResult {
        info!(method = %request.method(), location = request.location(), "hello reactor...");
        response.content(Self::BODY).end()?;
        Ok(())
    }
}
