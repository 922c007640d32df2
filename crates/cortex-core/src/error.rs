use thiserror::Error;

#[derive(Debug, Error)]
pub enum CortexError {
    // Capability errors
    #[error("Capability not found: {0}")]
    CapabilityNotFound(String),

    #[error("Capability execution failed: {capability}: {message}")]
    CapabilityExecution { capability: String, message: String },

    #[error("Capability input validation failed: {capability}: {message}")]
    CapabilityValidation { capability: String, message: String },

    // Flow errors
    #[error("Flow normalization failed: {0}")]
    Normalization(String),

    #[error("Invalid flow graph: {0}")]
    InvalidGraph(String),

    // Job errors
    #[error("Job error: {0}")]
    Job(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Conversation log errors
    #[error("Conversation log error: {0}")]
    ConversationLog(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CortexError {
    /// Stable name of the error variant, surfaced as the `error` field of a
    /// failed node's output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CapabilityNotFound(_) => "CapabilityNotFound",
            Self::CapabilityExecution { .. } => "CapabilityExecution",
            Self::CapabilityValidation { .. } => "CapabilityValidation",
            Self::Normalization(_) => "Normalization",
            Self::InvalidGraph(_) => "InvalidGraph",
            Self::Job(_) => "Job",
            Self::Config(_) => "Config",
            Self::ConfigNotFound(_) => "ConfigNotFound",
            Self::ConversationLog(_) => "ConversationLog",
            Self::Io(_) => "Io",
            Self::Json(_) => "Json",
        }
    }

    /// The message without the variant prefix added by `Display`.
    pub fn message(&self) -> String {
        match self {
            Self::CapabilityNotFound(name) => format!("unknown capability '{}'", name),
            Self::CapabilityExecution { message, .. }
            | Self::CapabilityValidation { message, .. } => message.clone(),
            Self::Normalization(m)
            | Self::InvalidGraph(m)
            | Self::Job(m)
            | Self::Config(m)
            | Self::ConfigNotFound(m)
            | Self::ConversationLog(m) => m.clone(),
            Self::Io(e) => e.to_string(),
            Self::Json(e) => e.to_string(),
        }
    }

    pub fn execution(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CapabilityExecution {
            capability: capability.into(),
            message: message.into(),
        }
    }

    pub fn validation(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CapabilityValidation {
            capability: capability.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CortexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_variant_name() {
        assert_eq!(CortexError::CapabilityNotFound("x".into()).kind(), "CapabilityNotFound");
        assert_eq!(CortexError::execution("write_file", "disk full").kind(), "CapabilityExecution");
        let io = CortexError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io.kind(), "Io");
    }

    #[test]
    fn message_strips_prefix() {
        let err = CortexError::execution("write_file", "disk full");
        assert_eq!(err.message(), "disk full");
        assert_eq!(err.to_string(), "Capability execution failed: write_file: disk full");
    }
}
