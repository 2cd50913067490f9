use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tiberius::{Client, ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;

use crate::error::QueryExecutionError;
use crate::models::{CapabilitySet, FilterConfig, PlanRow};
use crate::query_builder;

pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 300;

/// Where to connect. The password is the revealed cleartext and only lives in memory.
#[derive(Clone)]
pub struct ConnectionTarget {
    pub server: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub trust_server_certificate: bool,
}

impl std::fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ConnectionTarget {
    pub fn with_database(&self, database: &str) -> Self {
        ConnectionTarget {
            database: database.to_string(),
            ..self.clone()
        }
    }

    /// ADO.NET style connection string understood by tiberius
    pub fn connection_string(&self) -> String {
        let server = if self.server.starts_with("tcp:") {
            self.server.clone()
        } else {
            format!("tcp:{}", self.server)
        };

        format!(
            "server={};database={};user id={};password={};TrustServerCertificate={};Application Name=Plansight",
            quote_value(&server),
            quote_value(&self.database),
            quote_value(&self.username),
            quote_value(&self.password),
            self.trust_server_certificate
        )
    }
}

/// Quote a connection string value when it contains separators or quotes
fn quote_value(value: &str) -> String {
    if value.contains([';', '\'', '"', '=']) || value.trim() != value {
        format!("'{}'", value.replace('\'', "''"))
    } else {
        value.to_string()
    }
}

/// Byte length of the value at the start of `text`. A quoted value runs to its closing
/// quote, with a doubled quote standing for a literal one.
fn secret_value_len(text: &str) -> usize {
    let quote = match text.chars().next() {
        Some(q @ ('\'' | '"')) => q,
        _ => {
            return text
                .find(|c: char| c == ';' || c == '&' || c == '"' || c.is_whitespace())
                .unwrap_or(text.len())
        }
    };

    let mut chars = text.char_indices().skip(1).peekable();
    while let Some((index, c)) = chars.next() {
        if c != quote {
            continue;
        }
        if matches!(chars.peek(), Some((_, next)) if *next == quote) {
            chars.next();
            continue;
        }
        return index + c.len_utf8();
    }
    text.len()
}

/// Remove credentials from error text before it is logged or shown
pub fn sanitize_error(error: &str) -> String {
    let mut sanitized = error.to_string();

    for key in ["password=", "pwd="] {
        let mut search_from = 0;
        while let Some(offset) = sanitized[search_from..].to_ascii_lowercase().find(key) {
            let value_start = search_from + offset + key.len();
            let after = &sanitized[value_start..];
            let end_offset = secret_value_len(after);
            sanitized = format!(
                "{}[hidden]{}",
                &sanitized[..value_start],
                &after[end_offset..]
            );
            search_from = value_start + "[hidden]".len();
        }
    }

    sanitized
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<serde_json::Value>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Values of the first column rendered as strings, skipping nulls.
    pub fn first_column_strings(&self) -> Vec<String> {
        let Some(first) = self.columns.first() else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|row| match row.get(&first.name) {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
                _ => None,
            })
            .collect()
    }
}

/// Runs SQL text against a server and returns tabular rows.
pub trait QueryExecutor: Sync {
    fn execute(
        &self,
        connection_string: &str,
        sql: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<QueryResult, QueryExecutionError>> + Send;
}

/// [`QueryExecutor`] that opens a fresh TDS connection per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlExecutor;

impl QueryExecutor for MssqlExecutor {
    async fn execute(
        &self,
        connection_string: &str,
        sql: &str,
        timeout: Duration,
    ) -> Result<QueryResult, QueryExecutionError> {
        match tokio::time::timeout(timeout, run_query(connection_string, sql)).await {
            Ok(result) => result,
            Err(_) => Err(QueryExecutionError::Timeout(timeout.as_secs())),
        }
    }
}

async fn run_query(connection_string: &str, sql: &str) -> Result<QueryResult, QueryExecutionError> {
    let start = Instant::now();

    let config = Config::from_ado_string(connection_string).map_err(|e| {
        QueryExecutionError::InvalidConnectionString(sanitize_error(&e.to_string()))
    })?;

    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| QueryExecutionError::Connect(e.to_string()))?;
    tcp.set_nodelay(true)
        .map_err(|e| QueryExecutionError::Connect(e.to_string()))?;

    let mut client = Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| QueryExecutionError::Connect(sanitize_error(&e.to_string())))?;

    let rows = client
        .simple_query(sql)
        .await
        .map_err(|e| QueryExecutionError::Server(e.to_string()))?
        .into_first_result()
        .await
        .map_err(|e| QueryExecutionError::Server(e.to_string()))?;

    let execution_time_ms = start.elapsed().as_millis() as u64;

    let Some(first_row) = rows.first() else {
        return Ok(QueryResult {
            columns: vec![],
            rows: vec![],
            row_count: 0,
            execution_time_ms,
        });
    };

    let columns: Vec<ColumnDef> = first_row
        .columns()
        .iter()
        .map(|col| ColumnDef {
            name: col.name().to_string(),
            data_type: format!("{:?}", col.column_type()),
        })
        .collect();

    let json_rows: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|row| {
            let mut map = serde_json::Map::new();
            for (col, data) in columns.iter().zip(row) {
                map.insert(col.name.clone(), column_to_json(data));
            }
            serde_json::Value::Object(map)
        })
        .collect();

    Ok(QueryResult {
        row_count: json_rows.len(),
        columns,
        rows: json_rows,
        execution_time_ms,
    })
}

fn column_to_json(data: ColumnData<'static>) -> serde_json::Value {
    use serde_json::Value;

    match &data {
        ColumnData::U8(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I16(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I32(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I64(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::F32(v) => v
            .and_then(|n| serde_json::Number::from_f64(n as f64))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ColumnData::F64(v) => v
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ColumnData::Bit(v) => v.map(Value::Bool).unwrap_or(Value::Null),
        ColumnData::String(v) => v
            .as_ref()
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Guid(v) => v.map(|g| Value::String(g.to_string())).unwrap_or(Value::Null),
        ColumnData::Binary(v) => v
            .as_ref()
            .map(|b| Value::String(format!("0x{}", hex::encode_upper(b))))
            .unwrap_or(Value::Null),
        ColumnData::Numeric(v) => v
            .as_ref()
            .and_then(|n| {
                let scaled = n.value() as f64 / 10f64.powi(n.scale() as i32);
                serde_json::Number::from_f64(scaled)
            })
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ColumnData::DateTimeOffset(_) => chrono::DateTime::<chrono::FixedOffset>::from_sql(&data)
            .ok()
            .flatten()
            .map(|dt| Value::String(dt.to_rfc3339()))
            .unwrap_or(Value::Null),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            chrono::NaiveDateTime::from_sql(&data)
                .ok()
                .flatten()
                .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()))
                .unwrap_or(Value::Null)
        }
        ColumnData::Date(_) => chrono::NaiveDate::from_sql(&data)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Time(_) => chrono::NaiveTime::from_sql(&data)
            .ok()
            .flatten()
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null),
        // xml and udt columns are cast to nvarchar by every query we issue
        _ => Value::Null,
    }
}

fn json_i64(row: &serde_json::Value, key: &str) -> i64 {
    match row.get(key) {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    }
}

fn json_string(row: &serde_json::Value, key: &str) -> Option<String> {
    match row.get(key) {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Map one row of the diagnostic query onto a [`PlanRow`] with no insights yet.
pub fn plan_row_from_json(row: &serde_json::Value) -> PlanRow {
    let mut plan_row = PlanRow {
        query_id: json_i64(row, "query_id"),
        query_hash_hex: json_string(row, "query_hash_hex").unwrap_or_default(),
        plan_hash_hex: json_string(row, "query_plan_hash_hex"),
        sql_text: json_string(row, "query_sql_text").unwrap_or_default(),
        plan_id: json_i64(row, "plan_id"),
        last_execution_time: json_string(row, "last_execution_time"),
        plan_xml: json_string(row, "query_plan"),
        ..Default::default()
    };
    plan_row.set_duration(json_i64(row, "last_duration"));
    plan_row
}

/// Build the diagnostic query for `filter`, run it and map the rows.
pub async fn fetch_plan_rows<E: QueryExecutor>(
    executor: &E,
    target: &ConnectionTarget,
    filter: &FilterConfig,
    capabilities: &CapabilitySet,
    timeout: Duration,
) -> Result<Vec<PlanRow>, QueryExecutionError> {
    let sql = query_builder::build(filter, capabilities);
    log::debug!("Running diagnostic query against {}:\n{}", target.database, sql);

    let result = executor
        .execute(&target.connection_string(), &sql, timeout)
        .await?;
    log::info!(
        "Diagnostic query returned {} rows in {} ms",
        result.row_count,
        result.execution_time_ms
    );

    Ok(result.rows.iter().map(plan_row_from_json).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ConnectionTarget {
        ConnectionTarget {
            server: "sql01,1433".to_string(),
            database: "Sales".to_string(),
            username: "sa".to_string(),
            password: "p@ss;word".to_string(),
            trust_server_certificate: true,
        }
    }

    #[test]
    fn connection_string_quotes_separators() {
        let conn = target().connection_string();
        assert!(conn.starts_with("server=tcp:sql01,1433;database=Sales;user id=sa;"));
        assert!(conn.contains("password='p@ss;word';"));
        assert!(conn.contains("TrustServerCertificate=true"));
    }

    #[test]
    fn debug_output_hides_password() {
        let rendered = format!("{:?}", target());
        assert!(!rendered.contains("p@ss"));
    }

    #[test]
    fn sanitize_error_hides_password_values() {
        let msg = "login failed for server=tcp:x;Password=hunter2;database=db and pwd=abc";
        let sanitized = sanitize_error(msg);
        assert!(!sanitized.contains("hunter2"));
        assert!(!sanitized.contains("abc"));
        assert!(sanitized.contains("Password=[hidden];database=db"));
    }

    #[test]
    fn sanitize_error_hides_quoted_passwords_entirely() {
        let msg = format!("bad connection string: {}", target().connection_string());

        let sanitized = sanitize_error(&msg);

        assert!(!sanitized.contains("p@ss"), "{sanitized}");
        assert!(!sanitized.contains("word"), "{sanitized}");
        assert!(sanitized.contains("password=[hidden];TrustServerCertificate=true"));

        let mut quoted = target();
        quoted.password = "it's;a 'secret'".to_string();
        let sanitized = sanitize_error(&quoted.connection_string());
        assert!(!sanitized.contains("secret"), "{sanitized}");
        assert!(sanitized.ends_with("password=[hidden];TrustServerCertificate=true;Application Name=Plansight"));
    }

    #[test]
    fn maps_result_rows_and_derives_durations() {
        let row = serde_json::json!({
            "last_duration": 3_723_000_000i64,
            "query_id": 42,
            "query_hash_hex": "0xABCDEF",
            "query_plan_hash_hex": null,
            "query_sql_text": "SELECT 1",
            "plan_id": 7,
            "last_execution_time": "2024-01-02T03:04:05+00:00",
            "query_plan": "<ShowPlanXML/>"
        });

        let plan_row = plan_row_from_json(&row);

        assert_eq!(plan_row.duration_micros, 3_723_000_000);
        assert_eq!(plan_row.duration_hhmmss, "01:02:03");
        assert_eq!(plan_row.duration_seconds, 3723.0);
        assert_eq!(plan_row.query_id, 42);
        assert_eq!(plan_row.plan_hash_hex, None);
        assert_eq!(plan_row.plan_xml.as_deref(), Some("<ShowPlanXML/>"));
        assert_eq!(plan_row.insight_label, "");
    }

    #[tokio::test]
    async fn fetch_runs_built_query_and_maps_rows() {
        use crate::db::probe::tests::{target as probe_target, FakeExecutor};
        use crate::models::{TimeWindow, TopN};

        let executor = FakeExecutor::default().on(
            "FROM sys.query_store_runtime_stats",
            vec![serde_json::json!({
                "last_duration": 2_500_000,
                "query_id": 3,
                "plan_id": 9,
                "query_plan_hash_hex": "0x00FF",
                "query_plan": "<ShowPlanXML/>"
            })],
        );
        let filter = FilterConfig {
            time_window: TimeWindow::Last2Days,
            top_n: TopN::try_from(25).unwrap(),
            ..Default::default()
        };
        let caps = CapabilitySet {
            has_plan_hash_column: true,
            ..Default::default()
        };

        let rows = fetch_plan_rows(&executor, &probe_target(), &filter, &caps, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].plan_id, 9);
        assert_eq!(rows[0].duration_hhmmss, "00:00:02");
        assert_eq!(rows[0].plan_hash_hex.as_deref(), Some("0x00FF"));
        let calls = executor.calls.lock().unwrap();
        assert!(calls[0].starts_with("SELECT TOP (25)"));
        assert!(calls[0].contains("DATEADD(DAY, -2, SYSDATETIMEOFFSET())"));
    }

    #[tokio::test]
    async fn fetch_surfaces_execution_errors() {
        use crate::db::probe::tests::{target as probe_target, FakeExecutor};

        let executor = FakeExecutor::default().fail("query_store_runtime_stats", "Invalid object name");

        let result = fetch_plan_rows(
            &executor,
            &probe_target(),
            &FilterConfig::default(),
            &CapabilitySet::default(),
            Duration::from_secs(5),
        )
        .await;

        assert!(matches!(result, Err(QueryExecutionError::Server(_))));
    }

    #[test]
    fn first_column_strings_skips_nulls() {
        let result = QueryResult {
            columns: vec![ColumnDef {
                name: "name".to_string(),
                data_type: "NVarchar".to_string(),
            }],
            rows: vec![
                serde_json::json!({"name": "Sales"}),
                serde_json::json!({"name": null}),
                serde_json::json!({"name": "Ops"}),
            ],
            row_count: 3,
            execution_time_ms: 1,
        };
        assert_eq!(result.first_column_strings(), vec!["Sales", "Ops"]);
    }
}
