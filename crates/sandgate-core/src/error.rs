use thiserror::Error;

/// Errors produced by the gateway and its collaborators.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("user {user} is not a member of instance {instance}")]
    NotAMember { user: String, instance: String },

    #[error("provisioning failed: {0}")]
    Provisioning(String),

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("token error: {0}")]
    Token(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::InvalidMessage(e.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
