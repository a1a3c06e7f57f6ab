use crate::{Paths, is_plain, set_plain};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::cell::Cell;
use std::env;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Mutex, MutexGuard};
use std::thread;

pub(crate) static ENV_MUTEX: Mutex<()> = Mutex::new(());
pub(crate) static PLAIN_MUTEX: Mutex<()> = Mutex::new(());

thread_local! {
    static PLAIN_DEPTH: Cell<usize> = const { Cell::new(0) };
}

pub(crate) struct EnvVarGuard {
    key: String,
    prev: Option<String>,
}

pub(crate) struct PlainGuard {
    prev: bool,
    _lock: Option<MutexGuard<'static, ()>>,
}

fn set_env(key: &str, value: Option<&str>) -> Option<String> {
    let prev = env::var(key).ok();
    if let Some(value) = value {
        unsafe {
            env::set_var(key, value);
        }
    } else {
        unsafe {
            env::remove_var(key);
        }
    }
    prev
}

pub(crate) fn set_env_guard(key: &str, value: Option<&str>) -> EnvVarGuard {
    EnvVarGuard {
        key: key.to_string(),
        prev: set_env(key, value),
    }
}

pub(crate) fn set_plain_guard(value: bool) -> PlainGuard {
    let lock = PLAIN_DEPTH.with(|depth| {
        let current = depth.get();
        depth.set(current + 1);
        if current == 0 {
            Some(PLAIN_MUTEX.lock().unwrap_or_else(|err| err.into_inner()))
        } else {
            None
        }
    });
    let prev = is_plain();
    set_plain(value);
    PlainGuard { prev, _lock: lock }
}

fn restore_env(key: &str, prev: Option<String>) {
    if let Some(value) = prev {
        unsafe {
            env::set_var(key, value);
        }
    } else {
        unsafe {
            env::remove_var(key);
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        restore_env(&self.key, prev);
    }
}

impl Drop for PlainGuard {
    fn drop(&mut self) {
        set_plain(self.prev);
        PLAIN_DEPTH.with(|depth| {
            let current = depth.get();
            depth.set(current.saturating_sub(1));
        });
    }
}

/// A request as the mock server received it. Header names are lowercased.
pub(crate) struct CapturedRequest {
    pub(crate) path: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
}

impl CapturedRequest {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("json body")
    }

    pub(crate) fn cbor(&self) -> serde_json::Value {
        ciborium::from_reader(self.body.as_slice()).expect("cbor body")
    }
}

/// Reads the request head and as much body as `Content-Length` announces.
fn read_request(stream: &mut TcpStream) -> Option<CapturedRequest> {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let read = stream.read(&mut buf).ok()?;
        if read == 0 {
            return None;
        }
        received.extend_from_slice(&buf[..read]);
        let Some(head_end) = received.windows(4).position(|window| window == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&received[..head_end]).into_owned();
        let mut lines = head.lines();
        let path = lines
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or_default()
            .to_string();
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();
        let body_len = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .and_then(|(_, value)| value.parse::<usize>().ok())
            .unwrap_or(0);
        let body_start = head_end + 4;
        if received.len() >= body_start + body_len {
            let body = received[body_start..body_start + body_len].to_vec();
            return Some(CapturedRequest {
                path,
                headers,
                body,
            });
        }
    }
}

pub(crate) fn spawn_server(response: String) -> String {
    spawn_server_bytes(response.into_bytes())
}

pub(crate) fn spawn_server_bytes(response: Vec<u8>) -> String {
    serve(response, 1).0
}

/// Answers `count` connections with the same response, one at a time.
pub(crate) fn spawn_repeating_server(response: String, count: usize) -> String {
    serve(response.into_bytes(), count).0
}

/// Answers one connection and hands the received request back to the test.
pub(crate) fn spawn_capture_server(response: Vec<u8>) -> (String, Receiver<CapturedRequest>) {
    serve(response, 1)
}

fn serve(response: Vec<u8>, count: usize) -> (String, Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().unwrap();
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        for _ in 0..count {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            if let Some(request) = read_request(&mut stream) {
                let _ = sender.send(request);
            }
            let _ = stream.write_all(&response);
            let _ = stream.flush();
        }
    });
    (format!("http://{}", addr), receiver)
}

/// A URL nothing listens on.
pub(crate) fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/usage")
}

pub(crate) fn build_access_token(email: &str) -> String {
    let header = serde_json::json!({
        "alg": "none",
        "typ": "JWT",
    });
    let payload = serde_json::json!({
        "email": email,
        "sub": "user-1",
    });
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_string(&header).unwrap());
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_string(&payload).unwrap());
    format!("{header}.{payload}.")
}

pub(crate) fn http_ok_response(body: &str, content_type: &str) -> String {
    http_response("200 OK", body, content_type)
}

pub(crate) fn http_response(status: &str, body: &str, content_type: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len(),
    )
}

pub(crate) fn http_bytes_response(status: &str, body: &[u8], content_type: &str) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len(),
    )
    .into_bytes();
    response.extend_from_slice(body);
    response
}

pub(crate) fn cbor_body(value: &serde_json::Value) -> Vec<u8> {
    let mut body = Vec::new();
    ciborium::into_writer(value, &mut body).unwrap();
    body
}

pub(crate) fn make_paths(root: &Path) -> Paths {
    let home = root.to_path_buf();
    let tokens = home.join("tokens_export.json");
    let credentials = home.join("kiro-credentials.json");
    let env = home.join(".env");
    let tokens_lock = home.join("tokens_export.json.lock");
    Paths {
        home,
        tokens,
        credentials,
        env,
        tokens_lock,
    }
}
