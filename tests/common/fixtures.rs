use std::{
    collections::BTreeMap,
    io::Cursor,
    sync::{Arc, Mutex},
};

use elevator_update::core::{
    auth::{AdminGate, Session},
    config::AppConfig,
    db::{Backend, LocalDb},
    photos::{PhotoStore, UploadFile},
    projects::ProjectStore,
};
use image::{ImageBuffer, ImageFormat, Rgb};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// Opens a LocalDb in a fresh temporary directory.
/// Returns both the database and the directory (which must be kept alive).
pub async fn create_test_db() -> (LocalDb, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let db = LocalDb::open(dir.path().join("test.db"))
        .await
        .expect("Failed to open test database");
    (db, dir)
}

/// Logged-in session using the default role table.
pub fn admin_session() -> Session {
    AdminGate::new(AppConfig::default().admin.roles)
        .login("admin1", "123456")
        .expect("default admin credentials")
}

/// Project and photo stores sharing one backend.
pub fn stores<B: Backend>(
    backend: B,
    max_upload_bytes: u64,
) -> (Arc<B>, ProjectStore<B>, PhotoStore<B>) {
    let backend = Arc::new(backend);
    let photos = PhotoStore::new(Arc::clone(&backend), max_upload_bytes);
    let projects = ProjectStore::new(Arc::clone(&backend), photos.clone(), Default::default());
    (backend, projects, photos)
}

/// An 8x8 red PNG.
pub fn png_bytes() -> Vec<u8> {
    let img = ImageBuffer::from_fn(8, 8, |_, _| Rgb([255u8, 0u8, 0u8]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("Failed to encode test image");
    out.into_inner()
}

pub fn png_upload(file_name: &str) -> UploadFile {
    UploadFile {
        file_name: file_name.to_string(),
        content_type: "image/png".to_string(),
        bytes: png_bytes(),
    }
}

#[derive(Debug, Clone)]
pub struct StubRequest {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    pub query: Option<String>,
    pub body: String,
}

/// Minimal HTTP/1.1 server answering every request through `handler`.
pub struct StubServer {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<StubRequest>>>,
}

impl StubServer {
    pub fn recorded(&self) -> Vec<StubRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<StubRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let first = head.lines().next().unwrap_or_default();
    let mut parts = first.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default();
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), Some(q.to_string())),
        None => (target.to_string(), None),
    };
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
    Some(StubRequest {
        method,
        path,
        query,
        body,
    })
}

pub async fn spawn_stub_server<F>(handler: F) -> StubServer
where
    F: Fn(&StubRequest) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("addr");
    let requests = Arc::new(Mutex::new(Vec::new()));
    let requests_bg = Arc::clone(&requests);
    let handler = Arc::new(handler);
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(v) => v,
                Err(_) => break,
            };
            let Some(request) = read_request(&mut stream).await else {
                continue;
            };
            let (status, body) = handler(&request);
            requests_bg.lock().expect("requests lock").push(request);
            let response = format!(
                "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    StubServer {
        base_url: format!("http://{addr}"),
        requests,
    }
}

/// Stub serving a fixed status and body for every request.
pub async fn spawn_fixed_server(status: u16, body: &str) -> StubServer {
    let body = body.to_string();
    spawn_stub_server(move |_| (status, body.clone())).await
}

/// In-memory JSON document store speaking the remote store's REST layout.
pub async fn spawn_document_store() -> StubServer {
    let docs: Mutex<BTreeMap<String, serde_json::Value>> = Mutex::new(BTreeMap::new());
    spawn_stub_server(move |req| {
        let mut docs = docs.lock().expect("docs lock");
        let segments: Vec<&str> = req.path.trim_matches('/').split('/').collect();
        match (req.method.as_str(), segments.as_slice()) {
            ("GET", ["projects"]) => {
                let projects: Vec<_> = docs
                    .iter()
                    .filter(|(k, _)| k.starts_with("projects/"))
                    .map(|(_, v)| v.clone())
                    .collect();
                if projects.is_empty() {
                    (404, String::new())
                } else {
                    (200, serde_json::Value::Array(projects).to_string())
                }
            }
            ("GET", ["projects", id, "photos"]) => {
                let step = req
                    .query
                    .as_deref()
                    .and_then(|q| q.strip_prefix("step="))
                    .and_then(|s| s.parse::<u64>().ok());
                let photos: Vec<_> = docs
                    .iter()
                    .filter(|(k, _)| k.starts_with("photos/"))
                    .map(|(_, v)| v.clone())
                    .filter(|v| v["projectId"] == *id)
                    .filter(|v| step.is_none_or(|s| v["stepId"] == s))
                    .collect();
                (200, serde_json::Value::Array(photos).to_string())
            }
            ("DELETE", ["projects", id, "photos"]) => {
                docs.retain(|k, v| !(k.starts_with("photos/") && v["projectId"] == *id));
                (200, "{}".to_string())
            }
            ("POST", ["photos"]) => {
                let value: serde_json::Value =
                    serde_json::from_str(&req.body).expect("photo body");
                let id = value["id"].as_str().unwrap_or_default().to_string();
                docs.insert(format!("photos/{id}"), value);
                (201, req.body.clone())
            }
            ("PUT", _) => {
                let value: serde_json::Value =
                    serde_json::from_str(&req.body).expect("document body");
                docs.insert(segments.join("/"), value);
                (200, req.body.clone())
            }
            ("GET", _) => match docs.get(&segments.join("/")) {
                Some(doc) => (200, doc.to_string()),
                None => (404, String::new()),
            },
            ("DELETE", _) => match docs.remove(&segments.join("/")) {
                Some(_) => (200, "{}".to_string()),
                None => (404, String::new()),
            },
            _ => (405, String::new()),
        }
    })
    .await
}
