//! Generation of the "longest running queries" diagnostic SQL.
//!
//! The output depends only on the [`FilterConfig`] and the [`CapabilitySet`], and the
//! projected column list is identical whatever the server supports.

use crate::models::{CapabilitySet, FilterConfig, TimeWindow};

/// Output column names, in projection order.
pub const PROJECTED_COLUMNS: [&str; 10] = [
    "last_duration",
    "last_duration_sec",
    "last_duration_hhmmss",
    "query_id",
    "query_hash_hex",
    "query_plan_hash_hex",
    "query_sql_text",
    "plan_id",
    "last_execution_time",
    "query_plan",
];

/// A named `WHERE` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub name: &'static str,
    pub sql: String,
}

/// Relative-time expression for a window preset.
pub fn time_window_expression(window: TimeWindow) -> &'static str {
    match window {
        TimeWindow::LastHour => "DATEADD(HOUR, -1, SYSDATETIMEOFFSET())",
        TimeWindow::Last2Hours => "DATEADD(HOUR, -2, SYSDATETIMEOFFSET())",
        TimeWindow::Last6Hours => "DATEADD(HOUR, -6, SYSDATETIMEOFFSET())",
        TimeWindow::Last12Hours => "DATEADD(HOUR, -12, SYSDATETIMEOFFSET())",
        TimeWindow::LastDay => "DATEADD(DAY, -1, SYSDATETIMEOFFSET())",
        TimeWindow::Last2Days => "DATEADD(DAY, -2, SYSDATETIMEOFFSET())",
        TimeWindow::Last5Days => "DATEADD(DAY, -5, SYSDATETIMEOFFSET())",
        TimeWindow::Last7Days => "DATEADD(DAY, -7, SYSDATETIMEOFFSET())",
        TimeWindow::Last10Days => "DATEADD(DAY, -10, SYSDATETIMEOFFSET())",
        TimeWindow::Last2Weeks => "DATEADD(WEEK, -2, SYSDATETIMEOFFSET())",
        TimeWindow::Last4Weeks => "DATEADD(WEEK, -4, SYSDATETIMEOFFSET())",
    }
}

pub const INDEX_OPS_PREDICATE: &str =
    "(qt.query_sql_text NOT LIKE N'%ALTER INDEX%' AND qt.query_sql_text NOT LIKE N'%CREATE%INDEX%')";

pub const STATS_OPS_PREDICATE: &str =
    "(qt.query_sql_text NOT LIKE N'%UPDATE STATISTICS%' AND qt.query_sql_text NOT LIKE N'%StatMan%')";

/// Filter conditions in emission order: time window, index exclusion, stats exclusion.
pub fn predicates(filter: &FilterConfig) -> Vec<Predicate> {
    let mut predicates = vec![Predicate {
        name: "time_window",
        sql: format!(
            "rs.last_execution_time >= {}",
            time_window_expression(filter.time_window)
        ),
    }];

    if filter.exclude_index_ops {
        predicates.push(Predicate {
            name: "exclude_index_ops",
            sql: INDEX_OPS_PREDICATE.to_string(),
        });
    }
    if filter.exclude_stats_ops {
        predicates.push(Predicate {
            name: "exclude_stats_ops",
            sql: STATS_OPS_PREDICATE.to_string(),
        });
    }

    predicates
}

fn select_list(capabilities: &CapabilitySet) -> Vec<String> {
    let plan_hash = if capabilities.has_plan_hash_column {
        "CONVERT(varchar(18), p.query_plan_hash, 1)"
    } else {
        "CAST(NULL AS varchar(18))"
    };

    let expressions = [
        "rs.last_duration",
        "CAST(rs.last_duration / 1000000.0 AS float)",
        "CONCAT(FORMAT(rs.last_duration / 3600000000, '00'), ':', FORMAT((rs.last_duration / 60000000) % 60, '00'), ':', FORMAT((rs.last_duration / 1000000) % 60, '00'))",
        "q.query_id",
        "CONVERT(varchar(18), q.query_hash, 1)",
        plan_hash,
        "qt.query_sql_text",
        "p.plan_id",
        "rs.last_execution_time",
        "CAST(p.query_plan AS nvarchar(max))",
    ];

    expressions
        .iter()
        .zip(PROJECTED_COLUMNS)
        .map(|(expr, name)| format!("{} AS {}", expr, name))
        .collect()
}

/// Build the diagnostic query text.
///
/// `filter.top_n` is already range checked by [`crate::models::TopN`].
pub fn build(filter: &FilterConfig, capabilities: &CapabilitySet) -> String {
    let mut sql = format!("SELECT TOP ({})\n", filter.top_n.get());
    sql.push_str("    ");
    sql.push_str(&select_list(capabilities).join(",\n    "));
    sql.push_str(
        "\nFROM sys.query_store_runtime_stats AS rs\n\
         JOIN sys.query_store_plan AS p ON p.plan_id = rs.plan_id\n\
         JOIN sys.query_store_query AS q ON q.query_id = p.query_id\n\
         JOIN sys.query_store_query_text AS qt ON qt.query_text_id = q.query_text_id\n",
    );

    for (i, predicate) in predicates(filter).iter().enumerate() {
        let keyword = if i == 0 { "WHERE" } else { "  AND" };
        sql.push_str(keyword);
        sql.push(' ');
        sql.push_str(&predicate.sql);
        sql.push('\n');
    }

    sql.push_str("ORDER BY rs.last_duration DESC;");
    sql
}
