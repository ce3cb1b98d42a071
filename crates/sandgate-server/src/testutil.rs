//! Shared fixtures for unit tests: an in-memory sandbox and connection
//! factories.

use crate::registry::Connection;
use crate::sandbox::Sandbox;
use async_trait::async_trait;
use sandgate_core::envelope::{ExecOptions, ExecutionResult, FileInfo, SandboxStatus};
use sandgate_core::{GatewayError, GatewayResult, OutboundEnvelope};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;

/// Queue capacity for test connections. Small on purpose so queue-full
/// behavior is easy to trigger.
pub const TEST_QUEUE: usize = 8;

/// In-memory [`Sandbox`] with scriptable outcomes.
pub struct MockSandbox {
    files: StdMutex<HashMap<String, String>>,
    exec_result: StdMutex<Option<ExecutionResult>>,
    exec_error: StdMutex<Option<String>>,
    write_error: StdMutex<Option<String>>,
    panic_exec: StdMutex<bool>,
}

impl MockSandbox {
    pub fn new() -> Self {
        Self {
            files: StdMutex::new(HashMap::new()),
            exec_result: StdMutex::new(None),
            exec_error: StdMutex::new(None),
            write_error: StdMutex::new(None),
            panic_exec: StdMutex::new(false),
        }
    }

    pub fn put_file(&self, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.into(), content.into());
    }

    pub fn file_content(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn set_exec_result(&self, result: ExecutionResult) {
        *self.exec_result.lock().unwrap() = Some(result);
    }

    pub fn fail_exec(&self, message: &str) {
        *self.exec_error.lock().unwrap() = Some(message.into());
    }

    pub fn fail_writes(&self, message: &str) {
        *self.write_error.lock().unwrap() = Some(message.into());
    }

    /// Make the next `execute` panic instead of returning, simulating a
    /// buggy sandbox implementation.
    pub fn panic_on_exec(&self) {
        *self.panic_exec.lock().unwrap() = true;
    }
}

impl Default for MockSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn execute(
        &self,
        _command: &str,
        _options: Option<&ExecOptions>,
    ) -> GatewayResult<ExecutionResult> {
        if *self.panic_exec.lock().unwrap() {
            panic!("mock sandbox exploded");
        }
        if let Some(message) = self.exec_error.lock().unwrap().clone() {
            return Err(GatewayError::Sandbox(message));
        }
        Ok(self
            .exec_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(ExecutionResult {
                success: true,
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(0),
                duration_ms: 0,
            }))
    }

    async fn read_file(&self, path: &str) -> GatewayResult<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| GatewayError::Sandbox(format!("no such file: {path}")))
    }

    async fn write_file(&self, path: &str, content: &str) -> GatewayResult<()> {
        if let Some(message) = self.write_error.lock().unwrap().clone() {
            return Err(GatewayError::Sandbox(message));
        }
        self.put_file(path, content);
        Ok(())
    }

    async fn list_files(&self, _path: &str) -> GatewayResult<Vec<FileInfo>> {
        let files = self.files.lock().unwrap();
        let mut entries: Vec<FileInfo> = files
            .iter()
            .map(|(path, content)| FileInfo {
                name: path.clone(),
                path: path.clone(),
                is_directory: false,
                size: content.len() as u64,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn status(&self) -> SandboxStatus {
        SandboxStatus {
            state: "running".into(),
            endpoint: self.endpoint(),
        }
    }

    fn endpoint(&self) -> String {
        "mock://test".into()
    }
}

/// Build a registrable connection backed by a fresh [`MockSandbox`]. The
/// returned receiver is the connection's outbound queue.
pub fn make_connection(
    user_id: &str,
    instance_id: &str,
) -> (Arc<Connection>, mpsc::Receiver<OutboundEnvelope>) {
    make_connection_with_sandbox(user_id, instance_id, Arc::new(MockSandbox::new()))
}

pub fn make_connection_with_sandbox(
    user_id: &str,
    instance_id: &str,
    sandbox: Arc<MockSandbox>,
) -> (Arc<Connection>, mpsc::Receiver<OutboundEnvelope>) {
    let (tx, rx) = mpsc::channel(TEST_QUEUE);
    let connection = Arc::new(Connection::new(
        user_id.into(),
        instance_id.into(),
        format!("ws-{instance_id}"),
        sandbox,
        tx,
    ));
    (connection, rx)
}
