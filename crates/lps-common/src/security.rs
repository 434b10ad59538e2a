//! Whitelist and startup-blocklist matching
//!
//! Both lists match case-insensitive substrings against process names, the
//! same rule the kill-authorization policy and the pre-flight gate apply.

use serde::{Deserialize, Serialize};

/// Process names permitted to start during a session.
///
/// A process name is considered safe when any whitelist entry is a
/// case-insensitive substring of it, so `"dllhost"` also covers
/// `"dllhost-helper"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Whitelist {
    entries: Vec<String>,
}

impl Whitelist {
    pub fn new(entries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| e.into().to_lowercase())
                .collect(),
        }
    }

    /// Build from newline-separated text, skipping blank lines.
    ///
    /// Matches the on-disk `whitelist.txt` format: one substring per line.
    pub fn from_lines(text: &str) -> Self {
        Self::new(text.lines().map(str::trim).filter(|l| !l.is_empty()))
    }

    /// Merge additional entries into the list
    pub fn extend(&mut self, entries: impl IntoIterator<Item = impl Into<String>>) {
        self.entries
            .extend(entries.into_iter().map(|e| e.into().to_lowercase()));
    }

    /// True when any entry is a substring of `name` (case-insensitive)
    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.entries.iter().any(|entry| name.contains(entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Return the names from `running` that match any blocklist entry.
///
/// Used by the pre-flight startup gate: the returned names must be closed
/// before a session may begin. Matching rule is the same case-insensitive
/// substring test as the whitelist.
pub fn blocked_names<'a>(
    running: impl IntoIterator<Item = &'a str>,
    blocklist: &[String],
) -> Vec<String> {
    let mut found = Vec::new();
    for name in running {
        let lower = name.to_lowercase();
        if blocklist.iter().any(|b| lower.contains(&b.to_lowercase())) {
            found.push(name.to_string());
        }
    }
    found.sort();
    found.dedup();
    found
}
