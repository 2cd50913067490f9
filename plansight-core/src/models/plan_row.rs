use serde::{Deserialize, Serialize};

/// One diagnosable plan condition. Declaration order is the priority order used for
/// label composition and highlighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Insight {
    Spill,
    MemoryGrantIssue,
    ImplicitConversion,
    PlanAffectingConvert,
    MissingIndex,
    MissingOrStaleStats,
    NoJoinPredicate,
    RowGoal,
    CardinalityEstimateWarning,
    NonParallelPlan,
    OtherWarnings,
}

impl Insight {
    pub const PRIORITY: [Insight; 11] = [
        Insight::Spill,
        Insight::MemoryGrantIssue,
        Insight::ImplicitConversion,
        Insight::PlanAffectingConvert,
        Insight::MissingIndex,
        Insight::MissingOrStaleStats,
        Insight::NoJoinPredicate,
        Insight::RowGoal,
        Insight::CardinalityEstimateWarning,
        Insight::NonParallelPlan,
        Insight::OtherWarnings,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Insight::Spill => "SPILL TO TEMPDB",
            Insight::MemoryGrantIssue => "MEMORY GRANT WARNING",
            Insight::ImplicitConversion => "IMPLICIT CONVERSION",
            Insight::PlanAffectingConvert => "PLAN AFFECTING CONVERT",
            Insight::MissingIndex => "MISSING INDEXES",
            Insight::MissingOrStaleStats => "MISSING/STALE STATISTICS",
            Insight::NoJoinPredicate => "NO JOIN PREDICATE",
            Insight::RowGoal => "ROW GOAL",
            Insight::CardinalityEstimateWarning => "CARDINALITY ESTIMATE WARNING",
            Insight::NonParallelPlan => "NON-PARALLEL PLAN",
            Insight::OtherWarnings => "OTHER WARNINGS",
        }
    }
}

/// Serialize flags as `0`/`1`; accept booleans, integers and their string forms.
mod flag {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
        Text(String),
        Null(()),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => Ok(b),
            Raw::Int(n) => Ok(n != 0),
            Raw::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => Ok(true),
                "0" | "false" | "" => Ok(false),
                other => Err(de::Error::custom(format!("invalid flag value: {other}"))),
            },
            Raw::Null(()) => Ok(false),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightFlags {
    #[serde(default, with = "flag")]
    pub has_missing_index: bool,
    #[serde(default, with = "flag")]
    pub has_implicit_conversion: bool,
    #[serde(default, with = "flag")]
    pub has_plan_affecting_convert: bool,
    #[serde(default, with = "flag")]
    pub has_spill: bool,
    #[serde(default, with = "flag")]
    pub has_warnings: bool,
    #[serde(default, with = "flag")]
    pub has_memory_grant_issue: bool,
    #[serde(default, with = "flag")]
    pub has_no_join_predicate: bool,
    #[serde(default, with = "flag")]
    pub has_row_goal: bool,
    #[serde(default, with = "flag")]
    pub has_missing_stats: bool,
    #[serde(default, with = "flag")]
    pub has_ce_warning: bool,
    #[serde(default, with = "flag")]
    pub has_non_parallel_plan: bool,
}

impl InsightFlags {
    /// Whether `insight` contributes to the label. A warnings section that only carries a
    /// cardinality estimate warning is not reported a second time as other warnings.
    pub fn is_active(&self, insight: Insight) -> bool {
        match insight {
            Insight::Spill => self.has_spill,
            Insight::MemoryGrantIssue => self.has_memory_grant_issue,
            Insight::ImplicitConversion => self.has_implicit_conversion,
            Insight::PlanAffectingConvert => self.has_plan_affecting_convert,
            Insight::MissingIndex => self.has_missing_index,
            Insight::MissingOrStaleStats => self.has_missing_stats,
            Insight::NoJoinPredicate => self.has_no_join_predicate,
            Insight::RowGoal => self.has_row_goal,
            Insight::CardinalityEstimateWarning => self.has_ce_warning,
            Insight::NonParallelPlan => self.has_non_parallel_plan,
            Insight::OtherWarnings => self.has_warnings && !self.has_ce_warning,
        }
    }

    pub fn active(&self) -> impl Iterator<Item = Insight> + '_ {
        Insight::PRIORITY
            .into_iter()
            .filter(move |insight| self.is_active(*insight))
    }

    pub fn label(&self) -> String {
        self.active()
            .map(Insight::display_name)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Highest priority active insight, used to pick a row's highlight tier.
    pub fn highlight(&self) -> Option<Insight> {
        self.active().next()
    }
}

/// Format microseconds as `HH:MM:SS`; hours are not wrapped at 24.
pub fn format_hhmmss(micros: i64) -> String {
    let total_secs = micros.max(0) / 1_000_000;
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60
    )
}

pub fn micros_to_seconds(micros: i64) -> f64 {
    (micros as f64 / 1_000.0).round() / 1_000.0
}

/// One Query Store plan ranked by its last execution duration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanRow {
    #[serde(rename = "last_duration", default)]
    pub duration_micros: i64,
    #[serde(rename = "last_duration_sec", default)]
    pub duration_seconds: f64,
    #[serde(rename = "last_duration_hhmmss", default)]
    pub duration_hhmmss: String,
    #[serde(default)]
    pub query_id: i64,
    #[serde(default)]
    pub query_hash_hex: String,
    #[serde(rename = "query_plan_hash_hex", default)]
    pub plan_hash_hex: Option<String>,
    #[serde(rename = "query_sql_text", default)]
    pub sql_text: String,
    #[serde(default)]
    pub plan_id: i64,
    #[serde(default)]
    pub last_execution_time: Option<String>,
    #[serde(flatten)]
    pub flags: InsightFlags,
    #[serde(rename = "plan_insights", default)]
    pub insight_label: String,
    #[serde(rename = "query_plan", default)]
    pub plan_xml: Option<String>,
}

impl PlanRow {
    /// Set the duration and both derived renderings of it.
    pub fn set_duration(&mut self, micros: i64) {
        self.duration_micros = micros;
        self.duration_seconds = micros_to_seconds(micros);
        self.duration_hhmmss = format_hhmmss(micros);
    }

    pub fn set_flags(&mut self, flags: InsightFlags) {
        self.flags = flags;
        self.insight_label = flags.label();
    }

    /// Re-derive the label from the current flags.
    pub fn refresh_label(&mut self) {
        self.insight_label = self.flags.label();
    }
}
