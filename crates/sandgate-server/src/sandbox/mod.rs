//! Sandbox collaborator seam.
//!
//! A [`Sandbox`] is the capability handle for one running compute instance:
//! command execution and file I/O. A [`SandboxProvider`] resolves or
//! provisions the handle for `(instance, user)` at connect time. The actual
//! hypervisor/container lifecycle is out of scope; [`local`] provides a
//! process-local implementation for dev and tests.

pub mod local;

use async_trait::async_trait;
use sandgate_core::envelope::{ExecOptions, ExecutionResult, FileInfo, SandboxStatus};
use sandgate_core::GatewayResult;
use std::sync::Arc;

pub use local::{LocalSandbox, LocalSandboxProvider};

/// Capability handle to one running instance. Shared by reference across
/// all requests on a connection; never reassigned after connect.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run a command to completion and return its result. The gateway
    /// imposes no timeout; that policy belongs to the implementation.
    async fn execute(
        &self,
        command: &str,
        options: Option<&ExecOptions>,
    ) -> GatewayResult<ExecutionResult>;

    /// Read a file's contents as a string.
    async fn read_file(&self, path: &str) -> GatewayResult<String>;

    /// Write a file, creating parent directories as needed.
    async fn write_file(&self, path: &str, content: &str) -> GatewayResult<()>;

    /// List a directory.
    async fn list_files(&self, path: &str) -> GatewayResult<Vec<FileInfo>>;

    /// Current status snapshot.
    async fn status(&self) -> SandboxStatus;

    /// Externally reachable endpoint for this instance.
    fn endpoint(&self) -> String;
}

/// Provisions sandbox handles at connect time.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Resolve or create the handle for `(instance, user)`. Any failure
    /// (capacity, instance deleted, instance errored) aborts the connect
    /// path before the connection is registered.
    async fn get_or_create(
        &self,
        instance_id: &str,
        user_id: &str,
    ) -> GatewayResult<Arc<dyn Sandbox>>;
}
