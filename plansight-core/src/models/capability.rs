use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Optional server features discovered for one connection attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySet {
    pub has_plan_hash_column: bool,
    pub query_store_databases: BTreeSet<String>,
}
