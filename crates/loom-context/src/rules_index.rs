//! In-memory rules index with directory-prefix matching.
//!
//! [`RulesIndex`] answers "which rules match this file path?" using simple
//! directory-prefix matching. No glob patterns — a rule's `scope_dir` is a
//! directory prefix that activates when the agent touches any file under that
//! directory.
//!
//! ## Matching semantics
//!
//! A scoped rule matches a file path if:
//! - `file_path.starts_with(scope_dir + "/")`, OR
//! - `file_path == scope_dir`
//!
//! An empty `scope_dir` matches everything (root scope).
//!
//! Importantly, `packages/agent-tools` does NOT match `packages/agent` because
//! the slash boundary is enforced.

use crate::rules_discovery::DiscoveredRulesFile;

/// Index of discovered rules files with directory-prefix matching.
///
/// Separates rules into global (always-on) and scoped (directory-matched).
/// Scoped rules are sorted by `scope_dir` length descending (most specific
/// first) for deterministic matching order.
#[derive(Clone, Debug)]
pub struct RulesIndex {
    global_rules: Vec<DiscoveredRulesFile>,
    scoped_rules: Vec<DiscoveredRulesFile>,
}

impl RulesIndex {
    /// Create a new index from discovered rules files.
    ///
    /// Global rules (`is_global == true`) and scoped rules are separated.
    /// Scoped rules are sorted by `scope_dir` length descending so that
    /// more specific rules come first.
    #[must_use]
    pub fn new(rules_files: Vec<DiscoveredRulesFile>) -> Self {
        let mut global_rules = Vec::new();
        let mut scoped_rules = Vec::new();

        for file in rules_files {
            if file.is_global {
                global_rules.push(file);
            } else {
                scoped_rules.push(file);
            }
        }

        // Sort scoped rules by scope_dir length descending (most specific first)
        scoped_rules.sort_by(|a, b| b.scope_dir.len().cmp(&a.scope_dir.len()));

        Self {
            global_rules,
            scoped_rules,
        }
    }

    /// Get scoped rules that match a given relative file path.
    ///
    /// Returns only scoped rules — global rules are not included here since
    /// they always apply regardless of path.
    #[must_use]
    pub fn match_path(&self, relative_path: &str) -> Vec<&DiscoveredRulesFile> {
        self.scoped_rules
            .iter()
            .filter(|rule| path_starts_with(relative_path, &rule.scope_dir))
            .collect()
    }

    /// Get all global (always-on) rules.
    #[must_use]
    pub fn get_global_rules(&self) -> Vec<&DiscoveredRulesFile> {
        self.global_rules.iter().collect()
    }

    /// Get all scoped rules (for audit/debug).
    #[must_use]
    pub fn get_scoped_rules(&self) -> Vec<&DiscoveredRulesFile> {
        self.scoped_rules.iter().collect()
    }

    /// Total number of indexed rules (global + scoped).
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.global_rules.len() + self.scoped_rules.len()
    }

    /// Number of global rules.
    #[must_use]
    pub fn global_count(&self) -> usize {
        self.global_rules.len()
    }

    /// Number of scoped rules.
    #[must_use]
    pub fn scoped_count(&self) -> usize {
        self.scoped_rules.len()
    }
}

/// Check if a file path falls under a scope directory.
///
/// ```text
/// path_starts_with("packages/foo/src/bar.ts", "packages/foo") → true
/// path_starts_with("packages/foo-tools/bar.ts", "packages/foo") → false
/// path_starts_with("anything", "") → true
/// ```
fn path_starts_with(file_path: &str, scope_dir: &str) -> bool {
    if scope_dir.is_empty() {
        return true; // Root scope matches everything
    }
    file_path.starts_with(&format!("{scope_dir}/")) || file_path == scope_dir
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
