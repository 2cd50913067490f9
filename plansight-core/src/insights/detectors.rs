use super::plan_document::{is_truthy, PlanDocument};
use crate::models::InsightFlags;

/// A structural test against a parsed plan and the flag it drives.
pub struct Detector {
    pub flag: &'static str,
    pub test: fn(&PlanDocument) -> bool,
    set: fn(&mut InsightFlags, bool),
}

fn missing_index(doc: &PlanDocument) -> bool {
    doc.has_element("MissingIndexes") || doc.has_element("MissingIndexGroup")
}

fn implicit_conversion(doc: &PlanDocument) -> bool {
    doc.elements_named("Convert").any(|convert| {
        convert.attribute("Implicit").is_some_and(is_truthy)
            && doc.has_ancestor(convert, "ScalarOperator")
    })
}

fn plan_affecting_convert(doc: &PlanDocument) -> bool {
    doc.has_element("PlanAffectingConvert")
}

fn spill(doc: &PlanDocument) -> bool {
    ["SpillToTempDb", "SpillOccurred", "SortSpillDetails", "HashSpillDetails"]
        .iter()
        .any(|name| doc.has_element(name))
}

fn warnings(doc: &PlanDocument) -> bool {
    doc.elements_named("Warnings")
        .any(|w| w.child_count > 0 || !w.attributes.is_empty())
}

fn memory_grant_issue(doc: &PlanDocument) -> bool {
    doc.elements_named("MemoryGrantWarning").any(|w| {
        w.attribute("GrantWarningKind")
            .map_or(true, |kind| !kind.trim().eq_ignore_ascii_case("none"))
    })
}

fn no_join_predicate(doc: &PlanDocument) -> bool {
    doc.has_attribute("NoJoinPredicate", is_truthy) || doc.has_element("NoJoinPredicate")
}

fn row_goal(doc: &PlanDocument) -> bool {
    doc.has_attribute("EstimateRowsWithoutRowGoal", |_| true)
}

fn missing_stats(doc: &PlanDocument) -> bool {
    doc.has_element("ColumnsWithNoStatistics") || doc.has_element("ColumnsWithStaleStatistics")
}

fn ce_warning(doc: &PlanDocument) -> bool {
    doc.has_element("CardinalityEstimationWarning")
}

fn non_parallel_plan(doc: &PlanDocument) -> bool {
    doc.has_attribute("NonParallelPlanReason", |reason| !reason.trim().is_empty())
}

/// Every detector, in flag declaration order. Detectors are independent of each other.
pub const DETECTORS: [Detector; 11] = [
    Detector {
        flag: "has_missing_index",
        test: missing_index,
        set: |f, v| f.has_missing_index = v,
    },
    Detector {
        flag: "has_implicit_conversion",
        test: implicit_conversion,
        set: |f, v| f.has_implicit_conversion = v,
    },
    Detector {
        flag: "has_plan_affecting_convert",
        test: plan_affecting_convert,
        set: |f, v| f.has_plan_affecting_convert = v,
    },
    Detector {
        flag: "has_spill",
        test: spill,
        set: |f, v| f.has_spill = v,
    },
    Detector {
        flag: "has_warnings",
        test: warnings,
        set: |f, v| f.has_warnings = v,
    },
    Detector {
        flag: "has_memory_grant_issue",
        test: memory_grant_issue,
        set: |f, v| f.has_memory_grant_issue = v,
    },
    Detector {
        flag: "has_no_join_predicate",
        test: no_join_predicate,
        set: |f, v| f.has_no_join_predicate = v,
    },
    Detector {
        flag: "has_row_goal",
        test: row_goal,
        set: |f, v| f.has_row_goal = v,
    },
    Detector {
        flag: "has_missing_stats",
        test: missing_stats,
        set: |f, v| f.has_missing_stats = v,
    },
    Detector {
        flag: "has_ce_warning",
        test: ce_warning,
        set: |f, v| f.has_ce_warning = v,
    },
    Detector {
        flag: "has_non_parallel_plan",
        test: non_parallel_plan,
        set: |f, v| f.has_non_parallel_plan = v,
    },
];

pub fn detect(doc: &PlanDocument) -> InsightFlags {
    let mut flags = InsightFlags::default();
    for detector in &DETECTORS {
        (detector.set)(&mut flags, (detector.test)(doc));
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags_for(body: &str) -> InsightFlags {
        let xml = format!(
            r#"<ShowPlanXML xmlns="http://schemas.microsoft.com/sqlserver/2004/07/showplan"><QueryPlan>{body}</QueryPlan></ShowPlanXML>"#
        );
        detect(&PlanDocument::parse(&xml).unwrap())
    }

    #[test]
    fn clean_plan_sets_nothing() {
        assert_eq!(flags_for("<RelOp PhysicalOp=\"Index Seek\"/>"), InsightFlags::default());
    }

    #[test]
    fn implicit_conversion_requires_scalar_operator_context() {
        let inside = flags_for(
            r#"<ScalarOperator><Convert DataType="nvarchar" Implicit="1"/></ScalarOperator>"#,
        );
        assert!(inside.has_implicit_conversion);

        let outside = flags_for(r#"<Convert Implicit="1"/>"#);
        assert!(!outside.has_implicit_conversion);

        let explicit = flags_for(r#"<ScalarOperator><Convert Implicit="0"/></ScalarOperator>"#);
        assert!(!explicit.has_implicit_conversion);
    }

    #[test]
    fn each_spill_marker_counts() {
        for marker in [
            "<SpillToTempDb SpillLevel=\"1\"/>",
            "<SpillOccurred Detail=\"true\"/>",
            "<SortSpillDetails GrantedMemoryKb=\"1024\"/>",
            "<HashSpillDetails/>",
        ] {
            assert!(flags_for(marker).has_spill, "{marker}");
        }
    }

    #[test]
    fn empty_warnings_section_is_not_a_warning() {
        assert!(!flags_for("<Warnings/>").has_warnings);
        assert!(flags_for("<Warnings><PlanAffectingConvert/></Warnings>").has_warnings);
        assert!(flags_for("<Warnings NoJoinPredicate=\"true\"/>").has_warnings);
    }

    #[test]
    fn memory_grant_kind_none_is_ignored() {
        assert!(!flags_for(r#"<MemoryGrantWarning GrantWarningKind="None"/>"#).has_memory_grant_issue);
        assert!(
            flags_for(r#"<MemoryGrantWarning GrantWarningKind="Excessive Grant"/>"#).has_memory_grant_issue
        );
        assert!(flags_for("<MemoryGrantWarning/>").has_memory_grant_issue);
    }

    #[test]
    fn attribute_markers() {
        let flags = flags_for(
            r#"<Warnings NoJoinPredicate="1"/><RelOp EstimateRowsWithoutRowGoal="1000"/>"#,
        );
        assert!(flags.has_no_join_predicate);
        assert!(flags.has_row_goal);
        assert!(!flags_for(r#"<Warnings NoJoinPredicate="0"/>"#).has_no_join_predicate);
    }

    #[test]
    fn statistics_and_ce_markers() {
        assert!(flags_for("<ColumnsWithNoStatistics/>").has_missing_stats);
        assert!(flags_for("<ColumnsWithStaleStatistics/>").has_missing_stats);
        assert!(flags_for("<CardinalityEstimationWarning/>").has_ce_warning);
    }

    #[test]
    fn non_parallel_reason_must_be_non_blank() {
        let doc = |reason: &str| {
            let xml = format!(r#"<ShowPlanXML><QueryPlan NonParallelPlanReason="{reason}"/></ShowPlanXML>"#);
            detect(&PlanDocument::parse(&xml).unwrap())
        };
        assert!(doc("CouldNotGenerateValidParallelPlan").has_non_parallel_plan);
        assert!(!doc("  ").has_non_parallel_plan);
    }

    #[test]
    fn detector_table_covers_every_flag_once() {
        let mut names: Vec<_> = DETECTORS.iter().map(|d| d.flag).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 11);
    }
}
