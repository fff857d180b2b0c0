//! Test doubles shared by the client_core test modules.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    body::Bytes as AxumBytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use serde_json::Value;
use shared::domain::{FileRecord, UploadCredential};
use tokio::{
    net::TcpListener,
    sync::{Mutex, Notify},
};
use url::Url;

use crate::{
    error::{ListFetchError, UploadError},
    transport::UploadBackend,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPut {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Clone)]
pub struct HttpScript {
    pub credential: (StatusCode, String),
    pub put_status: StatusCode,
    pub files: (StatusCode, String),
    pub delay: Option<Duration>,
    pub put_delay: Option<Duration>,
}

impl Default for HttpScript {
    fn default() -> Self {
        Self {
            credential: (StatusCode::OK, String::new()),
            put_status: StatusCode::OK,
            files: (StatusCode::OK, "[]".to_string()),
            delay: None,
            put_delay: None,
        }
    }
}

#[derive(Clone)]
struct MockState {
    script: Arc<Mutex<HttpScript>>,
    credential_requests: Arc<Mutex<Vec<Value>>>,
    puts: Arc<Mutex<Vec<CapturedPut>>>,
    list_calls: Arc<AtomicUsize>,
}

/// A real HTTP server standing in for the credential, storage and listing endpoints.
pub struct MockHttpServer {
    pub base_url: String,
    state: MockState,
}

impl MockHttpServer {
    pub async fn spawn(script: HttpScript) -> Self {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let state = MockState {
            script: Arc::new(Mutex::new(script)),
            credential_requests: Arc::new(Mutex::new(Vec::new())),
            puts: Arc::new(Mutex::new(Vec::new())),
            list_calls: Arc::new(AtomicUsize::new(0)),
        };
        let app = Router::new()
            .route("/generate-presigned-url", post(handle_credential))
            .route("/store/object", put(handle_put))
            .route("/files", get(handle_files))
            .with_state(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub async fn replace_script(&self, script: HttpScript) {
        *self.state.script.lock().await = script;
    }

    pub fn store_url(&self) -> String {
        format!("{}/store/object", self.base_url)
    }

    pub async fn credential_requests(&self) -> Vec<Value> {
        self.state.credential_requests.lock().await.clone()
    }

    pub async fn puts(&self) -> Vec<CapturedPut> {
        self.state.puts.lock().await.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.list_calls.load(Ordering::SeqCst)
    }
}

fn json_response(status: StatusCode, body: String) -> impl IntoResponse {
    (status, [(header::CONTENT_TYPE, "application/json")], body)
}

async fn handle_credential(
    State(state): State<MockState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    state.credential_requests.lock().await.push(payload);
    let script = state.script.lock().await.clone();
    if let Some(delay) = script.delay {
        tokio::time::sleep(delay).await;
    }
    json_response(script.credential.0, script.credential.1)
}

async fn handle_put(
    State(state): State<MockState>,
    headers: HeaderMap,
    body: AxumBytes,
) -> StatusCode {
    state.puts.lock().await.push(CapturedPut {
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.to_vec(),
    });
    let script = state.script.lock().await.clone();
    if let Some(delay) = script.put_delay {
        tokio::time::sleep(delay).await;
    }
    script.put_status
}

async fn handle_files(State(state): State<MockState>) -> impl IntoResponse {
    state.list_calls.fetch_add(1, Ordering::SeqCst);
    let script = state.script.lock().await.clone();
    json_response(script.files.0, script.files.1)
}

/// Base url of a port nothing listens on.
pub async fn unreachable_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Credential { file_name: String, content_type: String },
    Put { url: String, content_type: String, body: Vec<u8> },
    List,
}

/// Holds a call until `release` is notified.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// In-memory backend with scripted results and optional gates per operation.
#[derive(Default)]
pub struct FakeBackend {
    pub calls: Mutex<Vec<BackendCall>>,
    pub credential_results: Mutex<VecDeque<Result<UploadCredential, UploadError>>>,
    pub put_results: Mutex<VecDeque<Result<(), UploadError>>>,
    pub list_results: Mutex<VecDeque<Result<Vec<FileRecord>, ListFetchError>>>,
    pub credential_gate: Option<Arc<Gate>>,
    pub put_gate: Option<Arc<Gate>>,
    pub put_delay: Option<Duration>,
    pub panic_on_put: bool,
    pub list_gates: Mutex<VecDeque<Arc<Gate>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_credential(&self, result: Result<UploadCredential, UploadError>) {
        self.credential_results.lock().await.push_back(result);
    }

    pub async fn push_put(&self, result: Result<(), UploadError>) {
        self.put_results.lock().await.push_back(result);
    }

    pub async fn push_list(&self, result: Result<Vec<FileRecord>, ListFetchError>) {
        self.list_results.lock().await.push_back(result);
    }

    pub async fn push_list_gate(&self, gate: Arc<Gate>) {
        self.list_gates.lock().await.push_back(gate);
    }

    pub async fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().await.clone()
    }

    pub async fn count(&self, matcher: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.lock().await.iter().filter(|c| matcher(c)).count()
    }
}

async fn pass_gate(gate: Option<&Arc<Gate>>) {
    if let Some(gate) = gate {
        gate.entered.notify_one();
        gate.release.notified().await;
    }
}

#[async_trait]
impl UploadBackend for FakeBackend {
    async fn request_credential(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<UploadCredential, UploadError> {
        self.calls.lock().await.push(BackendCall::Credential {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
        });
        pass_gate(self.credential_gate.as_ref()).await;
        self.credential_results
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(credential("https://store/x", "uploads/abc")))
    }

    async fn put_object(
        &self,
        upload_url: &Url,
        content_type: &str,
        body: Bytes,
    ) -> Result<(), UploadError> {
        self.calls.lock().await.push(BackendCall::Put {
            url: upload_url.to_string(),
            content_type: content_type.to_string(),
            body: body.to_vec(),
        });
        pass_gate(self.put_gate.as_ref()).await;
        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on_put {
            panic!("storage client crashed");
        }
        self.put_results.lock().await.pop_front().unwrap_or(Ok(()))
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>, ListFetchError> {
        self.calls.lock().await.push(BackendCall::List);
        let gate = self.list_gates.lock().await.pop_front();
        pass_gate(gate.as_ref()).await;
        self.list_results
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub fn credential(upload_url: &str, key: &str) -> UploadCredential {
    UploadCredential {
        upload_url: Url::parse(upload_url).expect("url"),
        key: key.to_string(),
    }
}
