//! Server configuration: TOML file + CLI overrides.

use sandgate_core::{GatewayError, GatewayResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
    /// Dev-mode seed records for the static instance directory.
    #[serde(default)]
    pub instances: Vec<InstanceSeed>,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_send_queue")]
    pub send_queue: usize,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    #[serde(default = "default_sandbox_root")]
    pub sandbox_root: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            send_queue: default_send_queue(),
            max_frame_bytes: default_max_frame_bytes(),
            sandbox_root: default_sandbox_root(),
        }
    }
}

/// `[auth]` section of the config TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSection {
    /// Hex-encoded HMAC secret shared with the token issuer. When absent a
    /// random secret is generated, which only makes sense for local dev.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_token_ttl")]
    pub token_ttl: u64,
}

/// One `[[instances]]` entry: a dev-mode instance record.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceSeed {
    pub id: String,
    pub workspace: String,
    #[serde(default)]
    pub members: Vec<String>,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8787
}
fn default_send_queue() -> usize {
    64
}
fn default_max_frame_bytes() -> usize {
    1_048_576
}
fn default_sandbox_root() -> String {
    "~/.sandgate/instances".to_string()
}
fn default_token_ttl() -> u64 {
    86400
}

/// Resolved server configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub send_queue: usize,
    pub max_frame_bytes: usize,
    pub sandbox_root: PathBuf,
    pub secret: Vec<u8>,
    pub token_ttl: u64,
    pub instance_seeds: Vec<InstanceSeed>,
}

impl ServerConfig {
    /// Load config from a TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_bind: Option<&str>,
        cli_port: Option<u16>,
        cli_sandbox_root: Option<&str>,
        cli_secret_hex: Option<&str>,
    ) -> GatewayResult<Self> {
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| GatewayError::Other(format!("config parse error: {e}")))?
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
        } else {
            ConfigFile::default()
        };

        let secret_hex = cli_secret_hex
            .map(|s| s.to_string())
            .or(file_config.auth.secret);
        let secret = match secret_hex {
            Some(hex_str) => hex::decode(hex_str.trim())
                .map_err(|e| GatewayError::Other(format!("invalid auth secret: {e}")))?,
            None => {
                info!("no auth secret configured, generating a random one (dev only)");
                sandgate_core::generate_secret()
            }
        };

        let bind = cli_bind
            .map(|s| s.to_string())
            .unwrap_or(file_config.server.bind);
        let port = cli_port.unwrap_or(file_config.server.port);
        let sandbox_root = cli_sandbox_root
            .map(|s| s.to_string())
            .unwrap_or(file_config.server.sandbox_root);

        Ok(Self {
            bind,
            port,
            send_queue: file_config.server.send_queue,
            max_frame_bytes: file_config.server.max_frame_bytes,
            sandbox_root: expand_tilde_str(&sandbox_root),
            secret,
            token_ttl: file_config.auth.token_ttl,
            instance_seeds: file_config.instances,
        })
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if s.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(&s[2..]);
        }
    }
    PathBuf::from(s)
}
