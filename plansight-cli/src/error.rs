use plansight_core::error::{ConfigError, CredentialError, ExportError, QueryExecutionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Query(#[from] QueryExecutionError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("{0} contains no rows to analyze")]
    EmptyResultSet(String),
}
