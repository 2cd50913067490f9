//! Rule based classification of captured execution plans.
//!
//! A plan is parsed once and every detector in [`detectors::DETECTORS`] runs against it.
//! Rows whose plan is missing or unparsable are reset to "no insights" instead of failing,
//! and one bad row never stops a batch.

pub mod detectors;
pub mod plan_document;

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::PlanParseError;
use crate::models::{InsightFlags, PlanRow};
use plan_document::PlanDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Analyzed,
    Unanalyzed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub analyzed: usize,
    pub unanalyzed: usize,
    /// Rows not reached because the batch was cancelled.
    pub skipped: usize,
}

pub fn classify(xml: &str) -> Result<InsightFlags, PlanParseError> {
    let doc = PlanDocument::parse(xml)?;
    Ok(detectors::detect(&doc))
}

/// Recompute flags and label of `row` from its plan.
pub fn analyze(row: &mut PlanRow) -> Outcome {
    let classified = match row.plan_xml.as_deref() {
        Some(xml) => classify(xml),
        None => Err(PlanParseError::Empty),
    };

    match classified {
        Ok(flags) => {
            row.set_flags(flags);
            Outcome::Analyzed
        }
        Err(e) => {
            log::debug!("Plan {} left unanalyzed: {}", row.plan_id, e);
            row.set_flags(InsightFlags::default());
            Outcome::Unanalyzed
        }
    }
}

pub fn analyze_all(rows: &mut [PlanRow]) -> BatchSummary {
    analyze_all_cancellable(rows, &AtomicBool::new(false))
}

/// Like [`analyze_all`], checking `cancelled` before each row.
pub fn analyze_all_cancellable(rows: &mut [PlanRow], cancelled: &AtomicBool) -> BatchSummary {
    let mut summary = BatchSummary::default();
    let total = rows.len();

    for (index, row) in rows.iter_mut().enumerate() {
        if cancelled.load(Ordering::SeqCst) {
            summary.skipped = total - index;
            log::info!("Plan analysis cancelled with {} rows remaining", summary.skipped);
            break;
        }
        match analyze(row) {
            Outcome::Analyzed => summary.analyzed += 1,
            Outcome::Unanalyzed => summary.unanalyzed += 1,
        }
    }

    log::info!(
        "Analyzed {} plans ({} without a usable plan)",
        summary.analyzed,
        summary.unanalyzed
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Insight;

    const SHOWPLAN_NS: &str = "http://schemas.microsoft.com/sqlserver/2004/07/showplan";

    fn plan(body: &str) -> String {
        format!(
            r#"<ShowPlanXML xmlns="{SHOWPLAN_NS}" Version="1.564"><BatchSequence><Batch><Statements><StmtSimple><QueryPlan>{body}</QueryPlan></StmtSimple></Statements></Batch></BatchSequence></ShowPlanXML>"#
        )
    }

    fn row_with(xml: Option<String>) -> PlanRow {
        PlanRow {
            plan_id: 1,
            plan_xml: xml,
            ..Default::default()
        }
    }

    #[test]
    fn sort_spill_leads_the_label() {
        let mut row = row_with(Some(plan(
            r#"<MissingIndexes/><Warnings><PlanAffectingConvert ConvertIssue="Seek Plan"/></Warnings><RelOp><MemoryGrantWarning GrantWarningKind="Excessive Grant"/><SortSpillDetails GrantedMemoryKb="64"/></RelOp>"#,
        )));

        assert_eq!(analyze(&mut row), Outcome::Analyzed);

        assert!(row.flags.has_spill);
        assert!(row.insight_label.starts_with("SPILL TO TEMPDB"));
        assert_eq!(
            row.insight_label,
            "SPILL TO TEMPDB; MEMORY GRANT WARNING; PLAN AFFECTING CONVERT; MISSING INDEXES; OTHER WARNINGS"
        );
        assert_eq!(row.flags.highlight(), Some(Insight::Spill));
    }

    #[test]
    fn missing_index_with_hash_spill() {
        let mut row = row_with(Some(plan(
            r#"<MissingIndexes><MissingIndexGroup Impact="93.2"/></MissingIndexes><RelOp><Hash><HashSpillDetails/></Hash></RelOp>"#,
        )));

        analyze(&mut row);

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["has_spill"], 1);
        assert_eq!(json["has_missing_index"], 1);
        assert_eq!(row.insight_label, "SPILL TO TEMPDB; MISSING INDEXES");
    }

    #[test]
    fn blank_or_unparsable_plans_reset_to_defaults() {
        for xml in [None, Some(String::new()), Some("   ".to_string()), Some("<ShowPlanXML><QueryPlan>".to_string())] {
            let mut row = row_with(xml);
            row.flags.has_spill = true;
            row.insight_label = "stale".to_string();

            assert_eq!(analyze(&mut row), Outcome::Unanalyzed);

            assert_eq!(row.flags, InsightFlags::default());
            assert_eq!(row.insight_label, "");
        }
    }

    #[test]
    fn analysis_is_idempotent() {
        let mut row = row_with(Some(plan(
            r#"<Warnings><CardinalityEstimationWarning/></Warnings><RelOp EstimateRowsWithoutRowGoal="10"/>"#,
        )));

        analyze(&mut row);
        let first = row.clone();
        analyze(&mut row);

        assert_eq!(row, first);
        assert_eq!(row.insight_label, "ROW GOAL; CARDINALITY ESTIMATE WARNING");
    }

    #[test]
    fn batch_survives_a_malformed_row() {
        let mut rows = vec![
            row_with(Some(plan("<MissingIndexes/>"))),
            row_with(Some(plan("<SpillToTempDb SpillLevel=\"2\"/>"))),
            row_with(Some("<ShowPlanXML><Broken></ShowPlanXML>".to_string())),
            row_with(Some(plan(r#"<Warnings NoJoinPredicate="true"/>"#))),
        ];

        let summary = analyze_all(&mut rows);

        assert_eq!(
            summary,
            BatchSummary {
                analyzed: 3,
                unanalyzed: 1,
                skipped: 0
            }
        );
        assert_eq!(rows[0].insight_label, "MISSING INDEXES");
        assert_eq!(rows[1].insight_label, "SPILL TO TEMPDB");
        assert_eq!(rows[2].flags, InsightFlags::default());
        assert_eq!(rows[2].insight_label, "");
        assert_eq!(rows[3].insight_label, "NO JOIN PREDICATE; OTHER WARNINGS");
    }

    #[test]
    fn cancelled_batch_leaves_remaining_rows_untouched() {
        let mut rows = vec![row_with(Some(plan("<MissingIndexes/>"))); 3];
        let cancelled = AtomicBool::new(true);

        let summary = analyze_all_cancellable(&mut rows, &cancelled);

        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.analyzed, 0);
        assert!(rows.iter().all(|r| r.insight_label.is_empty()));
    }
}
