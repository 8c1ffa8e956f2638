//! In-process stand-ins for the edge proxy's shared cache servers.

#![allow(dead_code)]

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

/// Key space shared by both fakes: values, hit/miss counters and a log of
/// every command received.
#[derive(Default)]
pub struct Keyspace {
    values: Mutex<HashMap<String, Vec<u8>>>,
    commands: Mutex<Vec<Vec<String>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    failing: AtomicBool,
}

enum Reply {
    Ok,
    Int(u64),
    Bulk(Option<Vec<u8>>),
    Error(String),
}

impl Keyspace {
    /// Every later command answers with an error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Commands received so far, lossily decoded.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }

    /// Last `SET` seen for `key`.
    pub fn last_set(&self, key: &str) -> Option<Vec<String>> {
        self.commands()
            .into_iter()
            .rev()
            .find(|c| c.len() >= 2 && c[0] == "SET" && c[1] == key)
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn execute(&self, args: &[Vec<u8>]) -> Reply {
        let text: Vec<String> = args
            .iter()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect();
        self.commands.lock().unwrap().push(text.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Reply::Error("ERR backing server unreachable".into());
        }

        let mut values = self.values.lock().unwrap();
        let name = text.first().map(|s| s.to_ascii_uppercase()).unwrap_or_default();
        match (name.as_str(), args) {
            ("GET", [_, _]) => {
                let value = values.get(&text[1]).cloned();
                let counter = if value.is_some() { &self.hits } else { &self.misses };
                counter.fetch_add(1, Ordering::SeqCst);
                Reply::Bulk(value)
            }
            ("SET", [_, _, value, ..]) => {
                values.insert(text[1].clone(), value.clone());
                Reply::Ok
            }
            ("DEL", [_, _]) => Reply::Int(values.remove(&text[1]).map_or(0, |_| 1)),
            ("EXISTS", [_, _]) => Reply::Int(u64::from(values.contains_key(&text[1]))),
            ("FLUSHDB", _) => {
                values.clear();
                Reply::Ok
            }
            ("DBSIZE", _) => Reply::Int(values.len() as u64),
            ("INFO", _) => {
                let used: usize = values.iter().map(|(k, v)| k.len() + v.len()).sum();
                Reply::Bulk(Some(
                    format!(
                        "# Memory\r\nused_memory:{used}\r\n# Stats\r\nkeyspace_hits:{}\r\nkeyspace_misses:{}\r\n",
                        self.hits.load(Ordering::SeqCst),
                        self.misses.load(Ordering::SeqCst)
                    )
                    .into_bytes(),
                ))
            }
            // connection setup chatter (CLIENT SETINFO, PING, SELECT)
            ("CLIENT", _) | ("SELECT", _) => Reply::Ok,
            ("PING", _) => Reply::Bulk(Some(b"PONG".to_vec())),
            _ => Reply::Error(format!("ERR unknown command '{name}'")),
        }
    }
}

/// Redis-over-HTTP endpoint: JSON array commands in, `{"result"}` or
/// `{"error"}` out. Values travel base64-encoded, exactly as sent.
pub async fn spawn_rest_store(token: &str) -> (Arc<Keyspace>, String) {
    let keyspace = Arc::new(Keyspace::default());
    let app = Router::new()
        .route("/", post(rest_command))
        .with_state((keyspace.clone(), format!("Bearer {token}")));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (keyspace, format!("http://{addr}"))
}

async fn rest_command(
    State((keyspace, expected)): State<(Arc<Keyspace>, String)>,
    headers: HeaderMap,
    Json(args): Json<Vec<String>>,
) -> Response {
    let authorised = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorised {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response();
    }

    let args: Vec<Vec<u8>> = args.into_iter().map(String::into_bytes).collect();
    match keyspace.execute(&args) {
        Reply::Ok => Json(json!({ "result": "OK" })).into_response(),
        Reply::Int(n) => Json(json!({ "result": n })).into_response(),
        Reply::Bulk(Some(v)) => {
            Json(json!({ "result": String::from_utf8_lossy(&v) })).into_response()
        }
        Reply::Bulk(None) => Json(json!({ "result": Value::Null })).into_response(),
        Reply::Error(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))).into_response(),
    }
}

/// Minimal RESP2 server over TCP.
pub async fn spawn_redis() -> (Arc<Keyspace>, String) {
    let keyspace = Arc::new(Keyspace::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shared = keyspace.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_resp(stream, shared.clone()));
        }
    });
    (keyspace, format!("redis://{addr}"))
}

async fn serve_resp(stream: TcpStream, keyspace: Arc<Keyspace>) {
    let (read, mut write) = stream.into_split();
    let mut read = BufReader::new(read);
    while let Some(args) = read_command(&mut read).await {
        let out = match keyspace.execute(&args) {
            Reply::Ok => b"+OK\r\n".to_vec(),
            Reply::Int(n) => format!(":{n}\r\n").into_bytes(),
            Reply::Bulk(Some(v)) => {
                let mut out = format!("${}\r\n", v.len()).into_bytes();
                out.extend_from_slice(&v);
                out.extend_from_slice(b"\r\n");
                out
            }
            Reply::Bulk(None) => b"$-1\r\n".to_vec(),
            Reply::Error(e) => format!("-{e}\r\n").into_bytes(),
        };
        if write.write_all(&out).await.is_err() {
            return;
        }
    }
}

async fn read_command(read: &mut BufReader<OwnedReadHalf>) -> Option<Vec<Vec<u8>>> {
    let mut line = String::new();
    if read.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        read.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0; len + 2];
        read.read_exact(&mut buf).await.ok()?;
        buf.truncate(len);
        args.push(buf);
    }
    Some(args)
}
