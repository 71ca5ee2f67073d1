//! Detection log sink over HTTP.
//!
//! `LogServer` accepts JSON detection logs on `POST /log` and writes each one
//! to its own file in the log directory. `upload_history` is the client side.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::history::HistoryView;

const MAX_HEADER_BYTES: usize = 8192;
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct LogServerConfig {
    pub addr: String,
    pub log_dir: PathBuf,
}

impl Default for LogServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5000".to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug)]
pub struct LogServerHandle {
    pub addr: SocketAddr,
    pub log_dir: PathBuf,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl LogServerHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("log server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct LogServer {
    cfg: LogServerConfig,
}

impl LogServer {
    pub fn new(cfg: LogServerConfig) -> Self {
        Self { cfg }
    }

    /// Bind, create the log directory and serve on a background thread.
    pub fn spawn(self) -> Result<LogServerHandle> {
        std::fs::create_dir_all(&self.cfg.log_dir).with_context(|| {
            format!("create log directory {}", self.cfg.log_dir.display())
        })?;

        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid log server address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let log_dir = self.cfg.log_dir.clone();
        let thread_dir = log_dir.clone();
        let join = std::thread::Builder::new()
            .name("log-server".to_string())
            .spawn(move || {
                if let Err(err) = run_server(listener, &thread_dir, shutdown_thread) {
                    log::error!("log server stopped: {}", err);
                }
            })?;

        log::info!("log server listening on http://{}", addr);
        Ok(LogServerHandle {
            addr,
            log_dir,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_server(listener: TcpListener, log_dir: &Path, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, log_dir) {
                    log::warn!("log request failed: {}", err);
                }
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

fn handle_connection(mut stream: TcpStream, log_dir: &Path) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            write_json_response(
                &mut stream,
                400,
                &json!({"status": "error", "message": err.to_string()}),
            )?;
            return Err(err);
        }
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => write_json_response(
            &mut stream,
            200,
            &json!({"status": "Backend is running", "endpoints": ["/log"]}),
        ),
        ("POST", "/log") => {
            let (status, body) = save_log(log_dir, &request.body);
            write_json_response(&mut stream, status, &body)
        }
        ("OPTIONS", "/" | "/log") => write_response(&mut stream, 204, "text/plain", b""),
        (_, "/" | "/log") => write_json_response(
            &mut stream,
            405,
            &json!({"status": "error", "message": "method not allowed"}),
        ),
        _ => write_json_response(
            &mut stream,
            404,
            &json!({"status": "error", "message": "not found"}),
        ),
    }
}

/// Persist one posted log. Returns the HTTP status and response body.
fn save_log(log_dir: &Path, body: &[u8]) -> (u16, Value) {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return no_data();
    }
    let data: Value = match serde_json::from_slice(body) {
        Ok(data) => data,
        Err(err) => {
            return (
                400,
                json!({"status": "error", "message": format!("invalid JSON: {err}")}),
            )
        }
    };
    if is_empty_payload(&data) {
        return no_data();
    }

    match write_log_file(log_dir, &data) {
        Ok(file) => {
            log::info!("saved detection log {}", file);
            (
                200,
                json!({"status": "success", "message": "Detection log saved", "file": file}),
            )
        }
        Err(err) => {
            log::error!("failed to save detection log: {:#}", err);
            (500, json!({"status": "error", "message": err.to_string()}))
        }
    }
}

fn no_data() -> (u16, Value) {
    (400, json!({"status": "error", "message": "No data received"}))
}

fn is_empty_payload(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
    }
}

/// Write `data` as pretty JSON to `log_<unix_secs>.json`, or
/// `log_<unix_secs>_<n>.json` when that name is taken. Returns the file name.
fn write_log_file(log_dir: &Path, data: &Value) -> Result<String> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before unix epoch")?
        .as_secs();
    let pretty = serde_json::to_string_pretty(data)?;

    let mut suffix = 0u32;
    loop {
        let name = if suffix == 0 {
            format!("log_{secs}.json")
        } else {
            format!("log_{secs}_{suffix}.json")
        };
        let path = log_dir.join(&name);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                file.write_all(pretty.as_bytes())
                    .with_context(|| format!("write {}", path.display()))?;
                return Ok(name);
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
            Err(err) => {
                return Err(anyhow::Error::new(err).context(format!("create {}", path.display())))
            }
        }
    }
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break data.len();
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if data.len() > MAX_HEADER_BYTES {
            bail!("request headers too large");
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
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

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length"))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        bail!("request body too large");
    }

    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            bail!("request body truncated");
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &Value) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    // Browser front ends post from another origin.
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\nConnection: close\r\n\r\n",
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

/// Body of a successful `POST /log`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogReceipt {
    pub status: String,
    pub message: String,
    pub file: String,
}

/// Post the current history to a log server at `addr` (`host:port`).
///
/// The body is `{"history": [...]}`, most recent entry first.
pub fn upload_history(addr: &str, history: &HistoryView<'_>) -> Result<LogReceipt> {
    if history.is_empty() {
        bail!("history is empty; nothing to upload");
    }
    let body = serde_json::to_string(&json!({ "history": history.to_vec() }))?;
    let url = format!("http://{addr}/log");

    let response = match ureq::post(&url)
        .timeout(Duration::from_secs(5))
        .set("Content-Type", "application/json")
        .send_string(&body)
    {
        Ok(response) => response,
        Err(ureq::Error::Status(code, response)) => {
            let text = response.into_string().unwrap_or_default();
            bail!("log server rejected upload with HTTP {}: {}", code, text);
        }
        Err(err) => return Err(anyhow::Error::new(err).context(format!("post {url}"))),
    };

    let text = response.into_string().context("read log server response")?;
    let receipt = serde_json::from_str(&text)
        .with_context(|| format!("unexpected log server response: {text}"))?;
    Ok(receipt)
}
