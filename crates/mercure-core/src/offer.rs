use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A normalized job offer, ready for downstream consumers.
///
/// Created once per structurally valid raw record, never mutated.
/// Invariants upheld by the normalizer: `technologies` is non-empty,
/// `posted_at` is never in the future, and the textual fields never
/// carry nulls (absent upstream data is replaced by deterministic
/// fallback strings).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOffer {
    /// Upstream identifier, unique per source.
    pub external_id: String,
    pub title: String,
    pub company: String,
    pub description: String,
    /// Technologies detected in title + description. Non-empty.
    pub technologies: BTreeSet<String>,
    /// Free-text location label as published upstream.
    pub location: String,
    /// Internal region id, when the location could be resolved.
    pub region_id: Option<i32>,
    /// Annual salary bounds in thousands of euros.
    pub salary_min_k: Option<i32>,
    pub salary_max_k: Option<i32>,
    /// Always `None`: the upstream experience field is not a reliable
    /// signal and is deliberately not mapped.
    pub experience_level: Option<String>,
    pub source_url: Option<String>,
    pub posted_at: DateTime<Utc>,
}
