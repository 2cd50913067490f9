//! Query Store diagnostics: session persistence, capability probing, diagnostic query
//! generation and execution-plan insights.

pub mod db;
pub mod error;
pub mod export;
pub mod insights;
pub mod models;
pub mod paths;
pub mod query_builder;
pub mod state;

pub use db::mssql::{ConnectionTarget, MssqlExecutor, QueryExecutor};
pub use state::AppState;
