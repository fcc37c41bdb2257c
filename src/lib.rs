//! # pollhttp
//!
//! A minimal HTTP/1.1 server built directly on readiness-based non-blocking
//! I/O. One thread polls the listening socket and every accepted connection;
//! readable connections are handed to a worker pool where a single [`Handler`]
//! turns the parsed [`Request`] into a [`Response`]. Each connection carries
//! exactly one request and is closed after its response.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pollhttp::{Request, Response, Server, ServerConfig};
//! use pollhttp::handler::HandlerResult;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig { port: 8080, ..ServerConfig::default() };
//!     let server = Server::bind(config, |_req: Request, res: Response| -> HandlerResult {
//!         res.content("Hello, World!").end()?;
//!         Ok(())
//!     })?;
//!     server.run()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod handler;
pub mod http;
pub mod server;

pub use config::{ConfigError, ServerConfig};
pub use handler::{DemoHandler, Handler};
pub use http::{ChunkedResponse, Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
