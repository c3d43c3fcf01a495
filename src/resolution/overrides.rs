use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::models::{Resolution, ResolutionSource};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OverrideEntry {
    pub winning_outcome_index: i64,
    #[serde(default)]
    pub note: Option<String>,
}

/// Operator-supplied outcomes keyed by condition-id prefix.
///
/// File format: `{"0xabc123": {"winning_outcome_index": 1, "note": "..."}}`.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: HashMap<String, OverrideEntry>,
}

impl OverrideTable {
    pub fn new(entries: impl IntoIterator<Item = (String, OverrideEntry)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v))
                .filter(|(k, _)| !k.is_empty())
                .collect(),
        }
    }

    /// A missing file is an empty table. An unreadable one is logged and
    /// also treated as empty so settlement keeps running.
    pub async fn load(path: &Path) -> Self {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Failed to read resolution overrides");
                return Self::default();
            }
        };

        match serde_json::from_str::<HashMap<String, OverrideEntry>>(&raw) {
            Ok(entries) => {
                let table = Self::new(entries);
                tracing::info!(count = table.len(), path = %path.display(), "Resolution overrides loaded");
                table
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Ignoring malformed resolution overrides");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Longest matching prefix wins.
    pub fn lookup(&self, condition_id: &str) -> Option<&OverrideEntry> {
        let id = condition_id.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|(prefix, _)| id.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, entry)| entry)
    }

    pub fn resolution_for(&self, condition_id: &str) -> Option<Resolution> {
        self.lookup(condition_id).map(|entry| Resolution {
            winning_outcome_index: entry.winning_outcome_index,
            resolved_price: Decimal::ONE,
            resolution_time: None,
            source: ResolutionSource::Override,
        })
    }
}
