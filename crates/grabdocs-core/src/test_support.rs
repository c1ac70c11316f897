//! Test doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use crate::api::{HttpBackend, HttpRequest, HttpResponse, ProgressFn, RequestBody, TransportFailure};
use crate::storage::{CredentialStore, MemoryBackend, StorageBackend, StorageError, StorageResult};

/// Credential store over two in-memory backends (preferred, fallback).
pub(crate) fn memory_store() -> (Arc<CredentialStore>, Arc<MemoryBackend>, Arc<MemoryBackend>) {
    let preferred = Arc::new(MemoryBackend::new());
    let fallback = Arc::new(MemoryBackend::new());
    let store = CredentialStore::new(preferred.clone(), fallback.clone());
    (Arc::new(store), preferred, fallback)
}

/// Backend whose every call fails, standing in for an unavailable keychain.
pub(crate) struct FailingBackend;

impl StorageBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Err(StorageError::Platform("backend unavailable".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Platform("backend unavailable".into()))
    }

    fn remove(&self, _key: &str) -> StorageResult<bool> {
        Err(StorageError::Platform("backend unavailable".into()))
    }
}

/// Backend that accepts every write and keeps nothing, like a keychain
/// built without a platform store.
pub(crate) struct ForgetfulBackend;

impl StorageBackend for ForgetfulBackend {
    fn name(&self) -> &'static str {
        "forgetful"
    }

    fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> StorageResult<bool> {
        Ok(false)
    }
}

/// Backend that blocks for a fixed time before answering.
pub(crate) struct SlowBackend {
    delay: Duration,
    inner: MemoryBackend,
}

impl SlowBackend {
    pub(crate) fn new(delay: Duration) -> Self {
        Self { delay, inner: MemoryBackend::new() }
    }
}

impl StorageBackend for SlowBackend {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        std::thread::sleep(self.delay);
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        std::thread::sleep(self.delay);
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        std::thread::sleep(self.delay);
        self.inner.remove(key)
    }
}

enum Scripted {
    Response { status: u16, body: Vec<u8> },
    Unreachable,
    Gated { gate: Arc<Notify>, status: u16, body: Vec<u8> },
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
    pub file_name: Option<String>,
}

/// In-process `HttpBackend` replaying canned responses per path, in order.
/// Paths without a scripted response answer 404.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    script: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, path: &str, entry: Scripted) {
        self.script
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(entry);
    }

    pub(crate) fn push_json(&self, path: &str, status: u16, body: Value) {
        self.push(path, Scripted::Response { status, body: body.to_string().into_bytes() });
    }

    pub(crate) fn push_raw(&self, path: &str, status: u16, body: &str) {
        self.push(path, Scripted::Response { status, body: body.as_bytes().to_vec() });
    }

    pub(crate) fn push_unreachable(&self, path: &str) {
        self.push(path, Scripted::Unreachable);
    }

    /// Response is held back until the returned gate is notified.
    pub(crate) fn push_gated_json(&self, path: &str, status: u16, body: Value) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.push(
            path,
            Scripted::Gated { gate: gate.clone(), status, body: body.to_string().into_bytes() },
        );
        gate
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, path: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| r.path == path).count()
    }
}

#[async_trait]
impl HttpBackend for ScriptedBackend {
    async fn execute(
        &self,
        request: HttpRequest,
        progress: Option<ProgressFn>,
    ) -> Result<HttpResponse, TransportFailure> {
        let (body, file_name) = match request.body {
            RequestBody::Empty => (None, None),
            RequestBody::Json(ref value) => (Some(value.clone()), None),
            RequestBody::File(ref part) => {
                let total = part.bytes.len() as u64;
                if let Some(report) = progress {
                    report(total / 2, total);
                    report(total, total);
                }
                (None, Some(part.file_name.clone()))
            }
        };
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method.to_string(),
            path: request.path.clone(),
            bearer: request.bearer.clone(),
            body,
            file_name,
        });

        let next = self
            .script
            .lock()
            .unwrap()
            .get_mut(&request.path)
            .and_then(|queue| queue.pop_front());

        match next {
            Some(Scripted::Response { status, body }) => Ok(HttpResponse { status, body }),
            Some(Scripted::Unreachable) => {
                Err(TransportFailure::Connect("connection refused".into()))
            }
            Some(Scripted::Gated { gate, status, body }) => {
                gate.notified().await;
                Ok(HttpResponse { status, body })
            }
            None => Ok(HttpResponse {
                status: 404,
                body: br#"{"success":false,"message":"no scripted response"}"#.to_vec(),
            }),
        }
    }
}
