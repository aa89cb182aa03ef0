//! Lexical query expansion with a domain synonym table.
//!
//! Expansion only widens recall. A missed trigger degrades retrieval but
//! never changes the user's original words, which always stay at the front.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Immutable mapping from a trigger term to its expansion terms.
///
/// Triggers are matched as lower-cased substrings of the message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SynonymTable {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl SynonymTable {
    /// Build a table from `(trigger, expansions)` pairs. Triggers are lower-cased.
    pub fn new<I, T, E, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (T, E)>,
        T: AsRef<str>,
        E: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = BTreeMap::<String, BTreeSet<String>>::new();
        for (trigger, expansions) in entries {
            let trigger = trigger.as_ref().trim().to_lowercase();
            if trigger.is_empty() {
                continue;
            }
            table.entry(trigger).or_default().extend(expansions.into_iter().map(Into::into));
        }
        Self { entries: table }
    }

    /// The built-in HMSREG vocabulary (Norwegian and English terms).
    pub fn hmsreg_default() -> Self {
        Self::new([
            ("hms-kort", vec!["HMS card", "construction ID card", "ID card"]),
            ("hms card", vec!["HMS-kort", "construction ID card"]),
            ("kort", vec!["card", "HMS card", "ID card"]),
            ("mannskapsliste", vec!["crew list", "personnel list", "attendance"]),
            ("crew list", vec!["mannskapsliste", "personnel list"]),
            ("innsjekk", vec!["check-in", "registration", "attendance"]),
            ("check in", vec!["innsjekk", "check-in", "registration"]),
            ("leverandør", vec!["supplier", "subcontractor"]),
            ("underentreprenør", vec!["subcontractor", "supplier"]),
            ("subcontractor", vec!["underentreprenør", "leverandør", "supplier"]),
            ("timeliste", vec!["timesheet", "working hours"]),
            ("timesheet", vec!["timeliste", "working hours"]),
            ("byggeplass", vec!["construction site", "project"]),
            ("prosjekt", vec!["project", "construction site"]),
        ])
    }

    /// Load a table from a JSON object of `trigger → [expansions]`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_slice(&bytes)?;
        Ok(Self::new(raw))
    }

    /// Number of triggers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no triggers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Appends synonym expansions to a user question.
#[derive(Debug, Clone, Default)]
pub struct QueryExpander {
    table: SynonymTable,
}

impl QueryExpander {
    /// Create an expander over the given table.
    pub fn new(table: SynonymTable) -> Self {
        Self { table }
    }

    /// Return `message` followed by the union of expansions for every trigger
    /// found in it, space-joined. Unchanged if nothing matches.
    pub fn expand(&self, message: &str) -> String {
        let lowered = message.to_lowercase();
        let mut terms = BTreeSet::new();
        for (trigger, expansions) in &self.table.entries {
            if lowered.contains(trigger.as_str()) {
                terms.extend(expansions.iter().map(String::as_str));
            }
        }

        if terms.is_empty() {
            return message.to_string();
        }

        debug!(added = terms.len(), "expanded query");
        let mut expanded = String::from(message);
        for term in terms {
            expanded.push(' ');
            expanded.push_str(term);
        }
        expanded
    }
}
