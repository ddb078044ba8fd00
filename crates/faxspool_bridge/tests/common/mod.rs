//! Shared fixtures for bridge integration tests.

#![allow(dead_code)]

use faxspool_bridge::{
    EngineSettings, FaxTransport, OutboundFax, SpoolDir, SpoolEngine, TransportError,
};
use faxspool_protocol::{CorrelationField, SubmitResponse};
use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// One observed submission.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub fax: OutboundFax,
    /// Spool file names present when the transport was called.
    pub spool_files: Vec<String>,
}

/// Transport double that replays scripted responses and records calls.
pub struct RecordingTransport {
    spool_dir: PathBuf,
    responses: Mutex<VecDeque<Result<SubmitResponse, TransportError>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl RecordingTransport {
    pub fn new(spool_dir: &Path) -> Self {
        Self {
            spool_dir: spool_dir.to_path_buf(),
            responses: Mutex::new(VecDeque::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn accept(self, job_uuid: &str) -> Self {
        self.responses.lock().unwrap().push_back(Ok(SubmitResponse {
            job_uuid: job_uuid.to_string(),
            message: "queued".to_string(),
        }));
        self
    }

    pub fn reject(self, status: u16) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Status {
                status,
                body: "rejected".to_string(),
            }));
        self
    }

    pub fn calls_handle(&self) -> Arc<Mutex<Vec<RecordedCall>>> {
        Arc::clone(&self.calls)
    }
}

impl FaxTransport for RecordingTransport {
    fn submit(
        &self,
        fax: OutboundFax,
    ) -> impl Future<Output = Result<SubmitResponse, TransportError>> + Send {
        let mut spool_files = list_files(&self.spool_dir);
        spool_files.sort();
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall { fax, spool_files });
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Request("no scripted response".to_string())));
        async move { response }
    }
}

pub struct Fixture {
    pub temp: TempDir,
    pub engine: Arc<SpoolEngine<RecordingTransport>>,
    pub calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl Fixture {
    pub fn new(configure: impl FnOnce(RecordingTransport) -> RecordingTransport) -> Self {
        Self::with_settings(configure, |_| {})
    }

    pub fn with_settings(
        configure: impl FnOnce(RecordingTransport) -> RecordingTransport,
        adjust: impl FnOnce(&mut EngineSettings),
    ) -> Self {
        let temp = TempDir::new().unwrap();
        let transport = configure(RecordingTransport::new(temp.path()));
        let calls = transport.calls_handle();
        let mut settings = default_settings();
        adjust(&mut settings);
        let spool = SpoolDir::open(temp.path(), "").unwrap();
        let engine = Arc::new(SpoolEngine::new(spool, transport, settings));
        Self {
            temp,
            engine,
            calls,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.temp.path().join(name)
    }

    pub fn write(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.path(name)).unwrap()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

pub fn default_settings() -> EngineSettings {
    EngineSettings {
        caller_number: "+15550000000".to_string(),
        document_extensions: vec!["pdf".to_string()],
        correlation_field: CorrelationField::Uuid,
        retention: Duration::from_secs(3600),
    }
}

pub fn list_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

/// Poll until `check` passes or the timeout elapses.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
