//! In-memory skill registry.
//!
//! Maintains a `HashMap` of skills keyed by name. Project skills take
//! precedence over global skills with the same name.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::loader;
use crate::types::{SkillInfo, SkillMetadata, SkillSource};

/// In-memory registry of available skills.
#[derive(Debug)]
pub struct SkillRegistry {
    skills: HashMap<String, SkillMetadata>,
}

impl SkillRegistry {
    /// Create a new empty skill registry.
    pub fn new() -> Self {
        Self {
            skills: HashMap::new(),
        }
    }

    /// Initialize the registry by scanning skill directories.
    ///
    /// Scans both global (`~/.loom/skills/`) and project-local skill directories.
    /// Project skills take precedence over global skills with the same name.
    pub fn initialize(&mut self, working_dir: &str) {
        let (global_result, project_result) = loader::scan_all(working_dir);

        // Add project skills first (they take precedence)
        for skill in project_result.skills {
            let _ = self.skills.insert(skill.name.clone(), skill);
        }

        for err in &project_result.errors {
            warn!(path = %err.path, message = %err.message, "Project skill scan error");
        }

        // Add global skills only if not shadowed by project
        for skill in global_result.skills {
            if self.skills.contains_key(&skill.name) {
                debug!(name = %skill.name, "Global skill shadowed by project skill");
            } else {
                let _ = self.skills.insert(skill.name.clone(), skill);
            }
        }

        for error in &global_result.errors {
            warn!(path = %error.path, message = %error.message, "Global skill scan error");
        }

        debug!(count = self.skills.len(), "Skill registry initialized");
    }

    /// Get a skill by name.
    pub fn get(&self, name: &str) -> Option<&SkillMetadata> {
        self.skills.get(name)
    }

    /// Check if a skill exists.
    pub fn has(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    /// List skills as lightweight `SkillInfo`, optionally filtered by source.
    ///
    /// Results are sorted alphabetically by name.
    pub fn list(&self, source: Option<SkillSource>) -> Vec<SkillInfo> {
        let mut infos: Vec<SkillInfo> = self
            .skills
            .values()
            .filter(|s| source.is_none_or(|src| s.source == src))
            .map(SkillInfo::from)
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// List skills with full metadata, optionally filtered by source.
    ///
    /// Results are sorted alphabetically by name.
    pub fn list_full(&self, source: Option<SkillSource>) -> Vec<&SkillMetadata> {
        let mut skills: Vec<&SkillMetadata> = self
            .skills
            .values()
            .filter(|s| source.is_none_or(|src| s.source == src))
            .collect();
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills
    }

    /// Get multiple skills by name.
    ///
    /// Returns `(found, not_found)` — found skills and names not in the registry.
    pub fn get_many(&self, names: &[&str]) -> (Vec<&SkillMetadata>, Vec<String>) {
        let mut found = Vec::new();
        let mut not_found = Vec::new();

        for name in names {
            match self.skills.get(*name) {
                Some(skill) => found.push(skill),
                None => not_found.push((*name).to_string()),
            }
        }

        (found, not_found)
    }

    /// Get the total number of skills.
    pub fn size(&self) -> usize {
        self.skills.len()
    }

    /// Clear and reload all skills.
    pub fn refresh(&mut self, working_dir: &str) {
        self.skills.clear();
        self.initialize(working_dir);
    }

    /// Insert a skill directly (for testing or programmatic use).
    pub fn insert(&mut self, skill: SkillMetadata) {
        let _ = self.skills.insert(skill.name.clone(), skill);
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}
