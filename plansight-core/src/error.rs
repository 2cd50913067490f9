use thiserror::Error;

/// Failures of the session file or the secret vault.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to write session file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize sessions: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Secret vault error: {0}")]
    Vault(String),

    #[error("No stored secret for handle {0}")]
    UnknownSecret(String),

    #[error("No saved session named {0}")]
    UnknownSession(String),

    #[error("No session selected and no current session saved")]
    NoCurrentSession,
}

/// A capability probe that could not complete. Never leaves the probe module as an error;
/// it is logged and the capability degrades to absent.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe query failed: {0}")]
    Query(#[from] QueryExecutionError),

    #[error("unexpected probe result: {0}")]
    UnexpectedShape(String),
}

#[derive(Debug, Error)]
pub enum QueryExecutionError {
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Query timed out after {0} seconds")]
    Timeout(u64),

    #[error("Query failed: {0}")]
    Server(String),
}

/// Why a plan document could not be analyzed. Absorbed per row by the insight engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanParseError {
    #[error("plan document is empty")]
    Empty,

    #[error("malformed plan document: {0}")]
    Malformed(String),

    #[error("plan document has no root element")]
    NoRootElement,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to access file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid result set JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("top N must be between {min} and {max}, got {value}")]
    TopNOutOfRange { value: u32, min: u32, max: u32 },

    #[error("Unable to resolve app data directory")]
    NoDataDir,

    #[error("Failed to access data directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}
