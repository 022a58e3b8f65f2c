//! Context selection over ranked search candidates.
//!
//! Selection runs in two greedy passes capped at `max_entries`:
//! 1. Preference: candidates whose source contains a preferred domain, one
//!    per distinct source string.
//! 2. Fill: remaining slots go to any candidate whose (chunk, metadata) pair
//!    is not already selected, in rank order.

use super::store::{Candidate, UNKNOWN_SOURCE};

pub const DEFAULT_MAX_CONTEXT: usize = 5;

/// One context entry ready for the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBlock {
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    entries: Vec<Candidate>,
}

impl Selection {
    pub fn entries(&self) -> &[Candidate] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in selection order, labelled with their source. An entry
    /// without a source is labelled `source_<n>` (1-based position).
    pub fn context_blocks(&self) -> Vec<ContextBlock> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| ContextBlock {
                source: entry
                    .metadata
                    .source
                    .clone()
                    .unwrap_or_else(|| format!("source_{}", i + 1)),
                text: entry.chunk.clone(),
            })
            .collect()
    }

    /// Distinct source labels in first-seen order.
    pub fn used_sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for block in self.context_blocks() {
            if !sources.contains(&block.source) {
                sources.push(block.source);
            }
        }
        sources
    }
}

#[derive(Debug, Clone)]
pub struct ContextSelector {
    preferred_domains: Vec<String>,
    max_entries: usize,
}

impl ContextSelector {
    pub fn new(preferred_domains: Vec<String>) -> Self {
        Self {
            preferred_domains,
            max_entries: DEFAULT_MAX_CONTEXT,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    fn is_preferred(&self, source: &str) -> bool {
        self.preferred_domains
            .iter()
            .any(|domain| source.contains(domain.as_str()))
    }

    pub fn select(&self, candidates: &[Candidate]) -> Selection {
        let mut selected: Vec<Candidate> = Vec::with_capacity(self.max_entries);
        let mut seen_sources: Vec<&str> = Vec::new();

        for candidate in candidates {
            if selected.len() >= self.max_entries {
                break;
            }
            let source = candidate.metadata.source_or(UNKNOWN_SOURCE);
            if self.is_preferred(source) && !seen_sources.contains(&source) {
                seen_sources.push(source);
                selected.push(candidate.clone());
            }
        }

        for candidate in candidates {
            if selected.len() >= self.max_entries {
                break;
            }
            if !selected.iter().any(|s| s.same_pair(candidate)) {
                selected.push(candidate.clone());
            }
        }

        tracing::debug!(
            "Selected {} of {} candidates ({} from preferred sources)",
            selected.len(),
            candidates.len(),
            seen_sources.len()
        );

        Selection { entries: selected }
    }
}
