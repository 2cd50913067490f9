//! Discovery of optional Query Store features on a server.
//!
//! Every probe is read-only and absorbs its own failures: a probe that cannot run reports
//! the feature as unavailable and logs why.

use std::collections::BTreeSet;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::db::mssql::{sanitize_error, ConnectionTarget, QueryExecutor};
use crate::error::ProbeError;
use crate::models::CapabilitySet;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on per-database Query Store checks in flight at once.
pub const DATABASE_CHECK_CONCURRENCY: usize = 8;

pub const PLAN_HASH_TABLE: &str = "sys.query_store_plan";
pub const PLAN_HASH_COLUMN: &str = "query_plan_hash";

const QUERY_STORE_DATABASES_SQL: &str = r#"
SELECT name
FROM sys.databases
WHERE state = 0
  AND database_id > 4
  AND is_query_store_on = 1
ORDER BY name
"#;

const ONLINE_USER_DATABASES_SQL: &str = r#"
SELECT name
FROM sys.databases
WHERE state = 0
  AND database_id > 4
ORDER BY name
"#;

/// Quote an identifier for use inside square brackets
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a value as an N'' string literal
pub fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

fn query_store_state_sql(database: &str) -> String {
    format!(
        "SELECT COUNT(*) AS enabled FROM {}.sys.database_query_store_options WHERE actual_state IN (1, 2)",
        quote_identifier(database)
    )
}

fn column_exists_sql(table: &str, column: &str) -> String {
    format!(
        "SELECT COUNT(*) AS found FROM sys.all_columns WHERE object_id = OBJECT_ID({}) AND name = {}",
        quote_literal(table),
        quote_literal(column)
    )
}

async fn query_names<E: QueryExecutor>(
    executor: &E,
    target: &ConnectionTarget,
    sql: &str,
) -> Result<Vec<String>, ProbeError> {
    let result = executor
        .execute(&target.connection_string(), sql, PROBE_TIMEOUT)
        .await?;
    Ok(result.first_column_strings())
}

async fn query_count<E: QueryExecutor>(
    executor: &E,
    target: &ConnectionTarget,
    sql: &str,
) -> Result<i64, ProbeError> {
    let result = executor
        .execute(&target.connection_string(), sql, PROBE_TIMEOUT)
        .await?;
    result
        .first_column_strings()
        .first()
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| ProbeError::UnexpectedShape(format!("expected a count, got {} rows", result.row_count)))
}

/// Databases with Query Store enabled, sorted by name.
///
/// Tries one catalog query on `master` first. When that fails or finds nothing, checks
/// every online user database individually, at most [`DATABASE_CHECK_CONCURRENCY`] at a
/// time; a database whose check fails is skipped.
pub async fn list_query_store_databases<E: QueryExecutor>(
    executor: &E,
    target: &ConnectionTarget,
) -> BTreeSet<String> {
    let master = target.with_database("master");

    match query_names(executor, &master, QUERY_STORE_DATABASES_SQL).await {
        Ok(names) if !names.is_empty() => return names.into_iter().collect(),
        Ok(_) => log::info!("No Query Store databases listed in sys.databases, checking each database"),
        Err(e) => log::warn!(
            "Query Store database listing failed, checking each database: {}",
            sanitize_error(&e.to_string())
        ),
    }

    let candidates = match query_names(executor, &master, ONLINE_USER_DATABASES_SQL).await {
        Ok(names) => names,
        Err(e) => {
            log::warn!(
                "Failed to enumerate databases: {}",
                sanitize_error(&e.to_string())
            );
            return BTreeSet::new();
        }
    };

    let master = &master;
    let outcomes: Vec<_> = stream::iter(candidates)
        .map(|database| async move {
            let outcome = query_count(executor, master, &query_store_state_sql(&database)).await;
            (database, outcome)
        })
        .buffer_unordered(DATABASE_CHECK_CONCURRENCY)
        .collect()
        .await;

    let mut enabled = BTreeSet::new();
    for (database, outcome) in outcomes {
        match outcome {
            Ok(count) if count > 0 => {
                enabled.insert(database);
            }
            Ok(_) => {}
            Err(e) => log::warn!(
                "Skipping database {}: Query Store state check failed: {}",
                database,
                sanitize_error(&e.to_string())
            ),
        }
    }
    enabled
}

/// Whether `table` has `column` on the target database. Failures count as absent.
pub async fn probe_optional_column<E: QueryExecutor>(
    executor: &E,
    target: &ConnectionTarget,
    table: &str,
    column: &str,
) -> bool {
    match query_count(executor, target, &column_exists_sql(table, column)).await {
        Ok(count) => count > 0,
        Err(e) => {
            log::warn!(
                "Column probe for {}.{} failed, treating as absent: {}",
                table,
                column,
                sanitize_error(&e.to_string())
            );
            false
        }
    }
}

/// Probe everything the diagnostic query can adapt to.
pub async fn probe_capabilities<E: QueryExecutor>(
    executor: &E,
    target: &ConnectionTarget,
) -> CapabilitySet {
    let query_store_databases = list_query_store_databases(executor, target).await;
    let has_plan_hash_column =
        probe_optional_column(executor, target, PLAN_HASH_TABLE, PLAN_HASH_COLUMN).await;

    log::info!(
        "Capabilities: plan hash column {}, {} Query Store databases",
        if has_plan_hash_column { "present" } else { "absent" },
        query_store_databases.len()
    );

    CapabilitySet {
        has_plan_hash_column,
        query_store_databases,
    }
}
