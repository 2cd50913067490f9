use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

/// Relative look-back window applied to `last_execution_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeWindow {
    #[default]
    LastHour,
    Last2Hours,
    Last6Hours,
    Last12Hours,
    LastDay,
    Last2Days,
    Last5Days,
    Last7Days,
    Last10Days,
    Last2Weeks,
    Last4Weeks,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 11] = [
        TimeWindow::LastHour,
        TimeWindow::Last2Hours,
        TimeWindow::Last6Hours,
        TimeWindow::Last12Hours,
        TimeWindow::LastDay,
        TimeWindow::Last2Days,
        TimeWindow::Last5Days,
        TimeWindow::Last7Days,
        TimeWindow::Last10Days,
        TimeWindow::Last2Weeks,
        TimeWindow::Last4Weeks,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TimeWindow::LastHour => "Last 1 hour",
            TimeWindow::Last2Hours => "Last 2 hours",
            TimeWindow::Last6Hours => "Last 6 hours",
            TimeWindow::Last12Hours => "Last 12 hours",
            TimeWindow::LastDay => "Last 1 day",
            TimeWindow::Last2Days => "Last 2 days",
            TimeWindow::Last5Days => "Last 5 days",
            TimeWindow::Last7Days => "Last 7 days",
            TimeWindow::Last10Days => "Last 10 days",
            TimeWindow::Last2Weeks => "Last 2 weeks",
            TimeWindow::Last4Weeks => "Last 4 weeks",
        }
    }

    /// Unknown or missing selections fall back to the one hour window.
    pub fn from_label(label: Option<&str>) -> Self {
        label
            .map(str::trim)
            .and_then(|l| Self::ALL.into_iter().find(|w| w.label().eq_ignore_ascii_case(l)))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for TimeWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for TimeWindow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = Option::<String>::deserialize(deserializer)?;
        Ok(TimeWindow::from_label(label.as_deref()))
    }
}

/// Result bound for the diagnostic query, always inside `[MIN, MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TopN(u32);

impl TopN {
    pub const MIN: u32 = 10;
    pub const MAX: u32 = 10_000;

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for TopN {
    fn default() -> Self {
        TopN(50)
    }
}

impl TryFrom<u32> for TopN {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(TopN(value))
        } else {
            Err(ConfigError::TopNOutOfRange {
                value,
                min: Self::MIN,
                max: Self::MAX,
            })
        }
    }
}

impl From<TopN> for u32 {
    fn from(top: TopN) -> Self {
        top.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    #[serde(default)]
    pub time_window: TimeWindow,
    #[serde(default)]
    pub exclude_index_ops: bool,
    #[serde(default)]
    pub exclude_stats_ops: bool,
    #[serde(default)]
    pub top_n: TopN,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuerySettings {
    pub timeout_seconds: u64,
    pub default_top_n: TopN,
    pub default_time_window: TimeWindow,
    pub trust_server_certificate: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        QuerySettings {
            timeout_seconds: crate::db::mssql::DEFAULT_QUERY_TIMEOUT_SECS,
            default_top_n: TopN::default(),
            default_time_window: TimeWindow::default(),
            trust_server_certificate: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub query: QuerySettings,
}
