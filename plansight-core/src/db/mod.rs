pub mod credentials;
pub mod mssql;
pub mod probe;
pub mod session_file;
