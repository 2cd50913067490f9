//! JSON export and re-import of diagnostic result sets.

use std::path::Path;

use serde::Deserialize;

use crate::error::ExportError;
use crate::models::PlanRow;

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<PlanRow>),
    One(Box<PlanRow>),
}

/// Write `rows` as a pretty printed JSON array. Returns the number of rows written.
pub fn export_rows(path: &Path, rows: &[PlanRow]) -> Result<usize, ExportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(rows)?;
    std::fs::write(path, json)?;
    log::info!("Exported {} rows to {}", rows.len(), path.display());
    Ok(rows.len())
}

/// Parse a previously exported result set, either one row object or an array of them.
///
/// Labels and duration renderings are always recomputed from the flags and
/// `last_duration`; any such values in the input are ignored.
pub fn parse_rows(json: &str) -> Result<Vec<PlanRow>, ExportError> {
    let mut rows = match serde_json::from_str::<OneOrMany>(json) {
        Ok(OneOrMany::Many(rows)) => rows,
        Ok(OneOrMany::One(row)) => vec![*row],
        // Untagged errors carry no detail, so re-parse as an array to report the position.
        Err(_) => serde_json::from_str::<Vec<PlanRow>>(json)?,
    };
    for row in &mut rows {
        row.set_duration(row.duration_micros);
        row.refresh_label();
    }
    Ok(rows)
}

pub fn import_rows(path: &Path) -> Result<Vec<PlanRow>, ExportError> {
    let json = std::fs::read_to_string(path)?;
    let rows = parse_rows(&json)?;
    log::info!("Imported {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InsightFlags;

    fn sample_row(plan_id: i64) -> PlanRow {
        let mut row = PlanRow {
            query_id: 10 + plan_id,
            query_hash_hex: "0x1A2B3C4D5E6F7081".to_string(),
            plan_hash_hex: Some("0x0102030405060708".to_string()),
            sql_text: "SELECT * FROM dbo.Orders WHERE CustomerId = @p0".to_string(),
            plan_id,
            last_execution_time: Some("2024-05-01T10:00:00+00:00".to_string()),
            plan_xml: Some("<ShowPlanXML/>".to_string()),
            ..Default::default()
        };
        row.set_duration(12_500_000);
        row.set_flags(InsightFlags {
            has_missing_index: true,
            has_warnings: true,
            ..Default::default()
        });
        row
    }

    #[test]
    fn exported_file_imports_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("rows.json");
        let rows = vec![sample_row(1), sample_row(2)];

        assert_eq!(export_rows(&path, &rows).unwrap(), 2);
        let imported = import_rows(&path).unwrap();

        assert_eq!(imported, rows);
    }

    #[test]
    fn single_object_is_accepted() {
        let rows = parse_rows(
            r#"{"plan_id": 5, "last_duration": 3723000000, "has_spill": 1, "has_row_goal": true}"#,
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].plan_id, 5);
        assert_eq!(rows[0].insight_label, "SPILL TO TEMPDB; ROW GOAL");
        assert_eq!(rows[0].duration_seconds, 3723.0);
        assert_eq!(rows[0].duration_hhmmss, "01:02:03");
    }

    #[test]
    fn stale_labels_are_recomputed() {
        let rows = parse_rows(
            r#"[{"plan_id": 1, "has_missing_index": 1, "plan_insights": "SOMETHING ELSE"},
                {"plan_id": 2, "plan_insights": "SPILL TO TEMPDB"}]"#,
        )
        .unwrap();

        assert_eq!(rows[0].insight_label, "MISSING INDEXES");
        assert_eq!(rows[1].insight_label, "");
    }

    #[test]
    fn stale_durations_are_recomputed() {
        let rows = parse_rows(
            r#"[{"plan_id": 1, "last_duration": 90000000, "last_duration_sec": 1.0, "last_duration_hhmmss": "99:99:99"}]"#,
        )
        .unwrap();

        assert_eq!(rows[0].duration_seconds, 90.0);
        assert_eq!(rows[0].duration_hhmmss, "00:01:30");
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(parse_rows("[{"), Err(ExportError::Json(_))));
        assert!(matches!(parse_rows("42"), Err(ExportError::Json(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            import_rows(&dir.path().join("absent.json")),
            Err(ExportError::Io(_))
        ));
    }
}
