//! Process-local sandbox: one directory per instance under a configured
//! root, commands executed via the system shell.
//!
//! This stands in for the real microVM provider in dev and tests. It is not
//! an isolation boundary — paths are confined to the instance directory,
//! but commands run with the server's own privileges.

use super::{Sandbox, SandboxProvider};
use async_trait::async_trait;
use sandgate_core::envelope::{ExecOptions, ExecutionResult, FileInfo, SandboxStatus};
use sandgate_core::{GatewayError, GatewayResult};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A sandbox backed by a directory on the local filesystem.
pub struct LocalSandbox {
    instance_id: String,
    root: PathBuf,
}

impl LocalSandbox {
    pub fn new(instance_id: String, root: PathBuf) -> Self {
        Self { instance_id, root }
    }

    /// Map a client-supplied path into the instance directory, rejecting
    /// anything that would escape it.
    fn resolve(&self, path: &str) -> GatewayResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(GatewayError::Sandbox(format!(
                        "path escapes sandbox root: {path}"
                    )))
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn execute(
        &self,
        command: &str,
        options: Option<&ExecOptions>,
    ) -> GatewayResult<ExecutionResult> {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command);

        let cwd = match options.and_then(|o| o.cwd.as_deref()) {
            Some(dir) => self.resolve(dir)?,
            None => self.root.clone(),
        };
        cmd.current_dir(cwd);
        if let Some(env) = options.and_then(|o| o.env.as_ref()) {
            cmd.envs(env);
        }

        let started = Instant::now();
        let output = cmd
            .output()
            .await
            .map_err(|e| GatewayError::Sandbox(format!("spawn failed: {e}")))?;
        let duration_ms = started.elapsed().as_millis() as u64;

        debug!(
            instance_id = %self.instance_id,
            exit = ?output.status.code(),
            duration_ms,
            "command finished"
        );

        Ok(ExecutionResult {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            duration_ms,
        })
    }

    async fn read_file(&self, path: &str) -> GatewayResult<String> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| GatewayError::Sandbox(format!("read {path}: {e}")))
    }

    async fn write_file(&self, path: &str, content: &str) -> GatewayResult<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GatewayError::Sandbox(format!("mkdir for {path}: {e}")))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| GatewayError::Sandbox(format!("write {path}: {e}")))
    }

    async fn list_files(&self, path: &str) -> GatewayResult<Vec<FileInfo>> {
        let full = self.resolve(path)?;
        let mut dir = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| GatewayError::Sandbox(format!("list {path}: {e}")))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| GatewayError::Sandbox(format!("list {path}: {e}")))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|e| GatewayError::Sandbox(format!("stat in {path}: {e}")))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let child_path = format!("{}/{}", path.trim_end_matches('/'), name);
            entries.push(FileInfo {
                name,
                path: child_path,
                is_directory: meta.is_dir(),
                size: meta.len(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn status(&self) -> SandboxStatus {
        SandboxStatus {
            state: "running".to_string(),
            endpoint: self.endpoint(),
        }
    }

    fn endpoint(&self) -> String {
        format!("local://{}", self.instance_id)
    }
}

/// Provisions [`LocalSandbox`] handles, one per instance, under a root
/// directory. Handles are shared: a second connection to the same instance
/// gets the same `Arc`.
pub struct LocalSandboxProvider {
    root: PathBuf,
    handles: RwLock<HashMap<String, Arc<LocalSandbox>>>,
}

impl LocalSandboxProvider {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            handles: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SandboxProvider for LocalSandboxProvider {
    async fn get_or_create(
        &self,
        instance_id: &str,
        _user_id: &str,
    ) -> GatewayResult<Arc<dyn Sandbox>> {
        {
            let handles = self.handles.read().await;
            if let Some(handle) = handles.get(instance_id) {
                return Ok(handle.clone());
            }
        }

        let dir = self.root.join(instance_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| GatewayError::Provisioning(format!("create {}: {e}", dir.display())))?;

        let mut handles = self.handles.write().await;
        let handle = handles
            .entry(instance_id.to_string())
            .or_insert_with(|| {
                info!(instance_id, path = %dir.display(), "provisioned local sandbox");
                Arc::new(LocalSandbox::new(instance_id.to_string(), dir))
            })
            .clone();
        Ok(handle)
    }
}
