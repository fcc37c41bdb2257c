//! End-to-end tests over real sockets. Each test runs its own server on an
//! ephemeral port in a background thread and talks to it with a Tokio client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use pollhttp::handler::HandlerResult;
use pollhttp::{DemoHandler, Handler, Request, Response, Server, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const GET_ROOT: &[u8] = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";

fn local_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        ..ServerConfig::default()
    }
}

fn spawn_server_with(config: ServerConfig, handler: impl Handler) -> SocketAddr {
    let server = Server::bind(config, handler).expect("bind test server");
    let addr = server.local_addr();
    std::thread::spawn(move || server.run());
    addr
}

fn spawn_server(handler: impl Handler) -> SocketAddr {
    spawn_server_with(local_config(), handler)
}

/// Sends `raw`, then reads until the server closes the connection.
async fn exchange(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut buf = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .expect("server did not close the connection")
        .unwrap();
    String::from_utf8(buf).unwrap()
}

fn body(response: &str) -> &str {
    let start = response.find("\r\n\r\n").expect("no header terminator") + 4;
    &response[start..]
}

#[derive(Clone, Default)]
struct Counting {
    calls: Arc<AtomicUsize>,
}

impl Handler for Counting {
    fn handle(&self, _request: Request, response: Response) -> HandlerResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        response.content("counted").end()?;
        Ok(())
    }
}

#[tokio::test]
async fn demo_handler_says_hello() {
    let addr = spawn_server(DemoHandler);
    let response = exchange(addr, GET_ROOT).await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("\r\nContent-Length: 14\r\n"));
    assert!(response.contains("\r\nConnection: close\r\n"));
    assert!(response.contains("\r\nServer: pollhttp\r\n"));
    assert_eq!(body(&response), "Hello Reactor!");
}

#[tokio::test]
async fn request_fields_reach_the_handler() {
    let addr = spawn_server(|req: Request, res: Response| -> HandlerResult {
        let summary = format!(
            "{}|{}|{}|{:?}|{}",
            req.method(),
            req.location(),
            req.version(),
            req.header("X-Token"),
            req.headers().len()
        );
        res.header("Content-Type", "text/plain").content(summary).end()?;
        Ok(())
    });

    let raw = b"post /items?id=3 HTTP/1.0\r\nHost: x\r\nX-Token:abc\r\nX-Token: def\r\n\r\n";
    let response = exchange(addr, raw).await;

    assert!(response.contains("\r\nContent-Type: text/plain\r\n"));
    assert_eq!(body(&response), "POST|/items?id=3|HTTP/1.0|Some(\" def\")|2");
}

#[tokio::test]
async fn empty_connection_is_closed_without_calling_the_handler() {
    let handler = Counting::default();
    let calls = Arc::clone(&handler.calls);
    let addr = spawn_server(handler);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut buf = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .expect("server did not close the connection")
        .unwrap();
    assert!(buf.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // The loop is still serving.
    let response = exchange(addr, GET_ROOT).await;
    assert_eq!(body(&response), "counted");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_request_is_dropped_without_a_response() {
    let handler = Counting::default();
    let calls = Arc::clone(&handler.calls);
    let addr = spawn_server(handler);

    assert_eq!(exchange(addr, b"GARBAGE\r\n\r\n").await, "");
    assert_eq!(exchange(addr, b"GET / HTTP/1.1\r\nno colon here\r\n\r\n").await, "");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let response = exchange(addr, GET_ROOT).await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
}

#[tokio::test]
async fn failing_and_panicking_handlers_only_lose_their_connection() {
    let addr = spawn_server(|req: Request, res: Response| -> HandlerResult {
        match req.location() {
            "/panic" => panic!("handler blew up"),
            "/no-body" => {
                res.end()?;
                Ok(())
            }
            _ => {
                res.content("fine").end()?;
                Ok(())
            }
        }
    });

    assert_eq!(exchange(addr, b"GET /panic HTTP/1.1\r\n\r\n").await, "");
    assert_eq!(exchange(addr, b"GET /no-body HTTP/1.1\r\n\r\n").await, "");
    let response = exchange(addr, GET_ROOT).await;
    assert_eq!(body(&response), "fine");
}

#[tokio::test]
async fn status_code_and_reason_are_written() {
    let addr = spawn_server(|_req: Request, res: Response| -> HandlerResult {
        res.code(404).reason("Nothing Here").content("").end()?;
        Ok(())
    });

    let response = exchange(addr, GET_ROOT).await;
    assert!(response.starts_with("HTTP/1.1 404 Nothing Here\r\n"));
    assert!(response.contains("\r\nContent-Length: 0\r\n"));
    assert_eq!(body(&response), "");
}

#[tokio::test]
async fn chunked_mode_streams_raw_bytes_then_content_length() {
    let addr = spawn_server(|_req: Request, res: Response| -> HandlerResult {
        let mut chunked = res.chunked()?;
        chunked.write_chunk("alpha")?.write_chunk("-beta")?;
        chunked.flush_chunks()?;
        Ok(())
    });

    let response = exchange(addr, GET_ROOT).await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    // No chunk-size lines, no blank line after the headers: not RFC 9112 framing.
    assert!(response.ends_with("Transfer-Encoding: chunked\r\nalpha-betaContent-Length: 10\r\n"));
    assert!(!response.contains("\r\n\r\n"));
}

#[tokio::test]
async fn server_name_comes_from_config() {
    let config = ServerConfig {
        server_name: "custom/1.0".to_owned(),
        ..local_config()
    };
    let addr = spawn_server_with(config, DemoHandler);
    let response = exchange(addr, GET_ROOT).await;
    assert!(response.contains("\r\nServer: custom/1.0\r\n"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_handlers_do_not_block_new_connections() {
    const SLOW: usize = 6;
    const DELAY: Duration = Duration::from_millis(600);

    let addr = spawn_server(|req: Request, res: Response| -> HandlerResult {
        if req.location() == "/slow" {
            std::thread::sleep(DELAY);
        }
        res.content(req.location().to_owned()).end()?;
        Ok(())
    });

    let started = Instant::now();
    let slow: Vec<_> = (0..SLOW)
        .map(|_| tokio::spawn(exchange(addr, b"GET /slow HTTP/1.1\r\n\r\n")))
        .collect();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let fast_started = Instant::now();
    let fast = exchange(addr, b"GET /fast HTTP/1.1\r\n\r\n").await;
    let fast_elapsed = fast_started.elapsed();

    assert_eq!(body(&fast), "/fast");
    assert!(
        fast_elapsed < Duration::from_millis(400),
        "fast request waited {fast_elapsed:?} behind sleeping handlers"
    );

    for handle in slow {
        let response = handle.await.unwrap();
        assert_eq!(body(&response), "/slow");
    }
    // The slow handlers ran side by side, not one after another.
    assert!(started.elapsed() < DELAY * 3);
}
