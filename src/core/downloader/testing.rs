// In-process HTTP origin for download tests.
// Speaks just enough HTTP/1.1 for reqwest: one GET per connection,
// Content-Length framed, connection closed after the reply.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub struct Reply {
    status: u16,
    body: Vec<u8>,
    delay: Duration,
    declared_len: Option<usize>,
}

impl Reply {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            body,
            delay: Duration::ZERO,
            declared_len: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: b"error".to_vec(),
            delay: Duration::ZERO,
            declared_len: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Announce `declared_len` bytes, send the body, then hang with the
    /// connection open.
    pub fn stalled_at(mut self, declared_len: usize) -> Self {
        self.declared_len = Some(declared_len);
        self
    }
}

#[derive(Default)]
struct OriginState {
    hits: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    times: Mutex<Vec<Instant>>,
    paths: Mutex<Vec<String>>,
}

pub struct TestOrigin {
    addr: SocketAddr,
    state: Arc<OriginState>,
}

impl TestOrigin {
    /// Start serving. `handler` gets the request path and the 1-based hit
    /// number across all paths.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str, usize) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(OriginState::default());
        let handler = Arc::new(handler);

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let state = accept_state.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    serve(socket, state, handler).await;
                });
            }
        });

        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn hit_times(&self) -> Vec<Instant> {
        self.state.times.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.state.paths.lock().unwrap().clone()
    }
}

async fn serve<F>(mut socket: TcpStream, state: Arc<OriginState>, handler: Arc<F>)
where
    F: Fn(&str, usize) -> Reply + Send + Sync + 'static,
{
    let Some(path) = read_request_path(&mut socket).await else {
        return;
    };

    let hit = state.hits.fetch_add(1, Ordering::SeqCst) + 1;
    state.times.lock().unwrap().push(Instant::now());
    state.paths.lock().unwrap().push(path.clone());
    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(now, Ordering::SeqCst);

    let reply = handler(&path, hit);
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    let head = format!(
        "HTTP/1.1 {} X\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        reply.status,
        reply.declared_len.unwrap_or(reply.body.len())
    );
    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(&reply.body).await;
    if reply.declared_len.is_some() {
        let _ = socket.flush().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
    let _ = socket.shutdown().await;
}

async fn read_request_path(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let text = String::from_utf8_lossy(&buf);
    let request_line = text.lines().next()?;
    request_line.split_whitespace().nth(1).map(str::to_string)
}
