use plansight_core::insights::BatchSummary;
use plansight_core::models::PlanRow;

const SQL_PREVIEW_CHARS: usize = 60;

/// Statement text on one line, cut to `max` characters.
pub fn sql_preview(sql: &str, max: usize) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max {
        collapsed
    } else {
        let cut: String = collapsed.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

pub fn print_rows(rows: &[PlanRow]) {
    println!(
        "{:>10} {:>10} {:>10} {:>12}  {:<40}  {}",
        "plan_id", "query_id", "duration", "seconds", "insights", "sql"
    );
    for row in rows {
        let marker = if row.flags.highlight().is_some() { "!" } else { " " };
        println!(
            "{:>10} {:>10} {:>10} {:>12.3}{} {:<40}  {}",
            row.plan_id,
            row.query_id,
            row.duration_hhmmss,
            row.duration_seconds,
            marker,
            row.insight_label,
            sql_preview(&row.sql_text, SQL_PREVIEW_CHARS)
        );
    }
}

pub fn print_summary(rows: usize, summary: Option<&BatchSummary>) {
    match summary {
        Some(s) if s.skipped > 0 => println!(
            "{} rows, {} analyzed, {} without a plan, {} not analyzed (interrupted)",
            rows, s.analyzed, s.unanalyzed, s.skipped
        ),
        Some(s) => println!(
            "{} rows, {} analyzed, {} without a plan",
            rows, s.analyzed, s.unanalyzed
        ),
        None => println!("{} rows", rows),
    }
}
