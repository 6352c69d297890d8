//! Read-only HTTP surface.
//!
//! - `GET /health`
//! - `GET /api/status`: latest verdict and last alert
//! - `GET /api/incidents`: the incident log
//! - `GET /video_feed`: MJPEG stream of the latest frames
//!
//! Plain HTTP/1.1 over a std `TcpListener`. Each connection is served on its
//! own thread so open video streams do not block other requests.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::frame::FrameHub;
use crate::incidents::IncidentLog;
use crate::status::StatusBoard;

const MAX_REQUEST_BYTES: usize = 8192;
pub const MAX_VIDEO_STREAMS: usize = 4;
const STREAM_BOUNDARY: &str = "frame";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_streams: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5001".to_string(),
            max_streams: MAX_VIDEO_STREAMS,
        }
    }
}

/// Shared state the endpoints read from.
#[derive(Clone)]
pub struct ApiState {
    pub status: Arc<StatusBoard>,
    pub hub: Arc<FrameHub>,
    pub log: IncidentLog,
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting connections. Open video streams end within a second.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    state: ApiState,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, state: ApiState) -> Self {
        Self { cfg, state }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .map_err(|e| anyhow!("invalid api address '{}': {}", self.cfg.addr, e))?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let ctx = Arc::new(ServerContext {
            state: self.state,
            max_streams: self.cfg.max_streams,
            active_streams: AtomicUsize::new(0),
            shutdown: shutdown.clone(),
        });
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, ctx) {
                log::error!("http api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

struct ServerContext {
    state: ApiState,
    max_streams: usize,
    active_streams: AtomicUsize,
    shutdown: Arc<AtomicBool>,
}

fn run_api(listener: TcpListener, ctx: Arc<ServerContext>) -> Result<()> {
    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                let ctx = ctx.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &ctx) {
                        log::debug!("http request ended: {:#}", err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, ctx: &ServerContext) -> Result<()> {
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;

    let request = read_request(&mut stream)?;
    log::debug!(
        "{} {} from {} ({})",
        request.method,
        request.path,
        peer,
        request.user_agent().unwrap_or("-")
    );
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }
    match request.path.as_str() {
        "/health" => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        "/api/status" => {
            let payload = serde_json::to_vec(&ctx.state.status.snapshot())?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        "/api/incidents" => {
            let records = match ctx.state.log.load() {
                Ok(records) => records,
                Err(err) => {
                    log::error!("incident log unreadable: {:#}", err);
                    return write_json_response(&mut stream, 500, r#"{"error":"log_unreadable"}"#);
                }
            };
            let payload = serde_json::to_vec(&records)?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        "/video_feed" => serve_video(&mut stream, ctx),
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

struct StreamPermit<'a>(&'a AtomicUsize);

impl Drop for StreamPermit<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn acquire_stream(ctx: &ServerContext) -> Option<StreamPermit<'_>> {
    ctx.active_streams
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
            (active < ctx.max_streams).then_some(active + 1)
        })
        .ok()
        .map(|_| StreamPermit(&ctx.active_streams))
}

fn serve_video(stream: &mut TcpStream, ctx: &ServerContext) -> Result<()> {
    let Some(_permit) = acquire_stream(ctx) else {
        return write_json_response(stream, 503, r#"{"error":"too_many_streams"}"#);
    };

    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={STREAM_BOUNDARY}\r\nCache-Control: no-store\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(header.as_bytes())?;

    let hub = &ctx.state.hub;
    let mut last_seq = 0;
    while !ctx.shutdown.load(Ordering::SeqCst) {
        let Some((seq, frame)) = hub.wait_newer(last_seq, Duration::from_secs(1)) else {
            if hub.is_closed() {
                break;
            }
            continue;
        };
        last_seq = seq;
        let jpeg = hub.jpeg_for(seq, &frame)?;
        let part = format!(
            "--{STREAM_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            jpeg.len()
        );
        stream.write_all(part.as_bytes())?;
        stream.write_all(&jpeg)?;
        stream.write_all(b"\r\n")?;
    }
    Ok(())
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n",
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
}

impl HttpRequest {
    fn user_agent(&self) -> Option<&str> {
        self.headers.get("user-agent").map(String::as_str)
    }
}
