//! # loom-skills
//!
//! Skill loader, registry, and context injector.
//!
//! Skills are SKILL.md files with YAML frontmatter + markdown body.
//! The registry discovers skills from `~/.loom/skills/` and project-local paths,
//! and the injector handles per-session context injection.

#![deny(unsafe_code)]

pub mod constants;
pub mod denials;
pub mod errors;
pub mod injector;
pub mod loader;
pub mod parser;
pub mod registry;
pub mod tracker;
pub mod types;

pub use denials::{get_skill_subagent_mode, skill_frontmatter_to_denials};
pub use errors::SkillError;
pub use injector::{
    build_message_with_skill_context, build_skill_context, extract_skill_references,
    process_prompt_for_skills, remove_skill_references,
};
pub use loader::{global_skills_dir, project_skills_dirs, scan_all, scan_directory};
pub use registry::SkillRegistry;
pub use tracker::SkillTracker;
pub use types::{
    AddedSkillInfo, DenyPattern, SkillAddMethod, SkillDeniedPatternRule, SkillFrontmatter,
    SkillInfo, SkillInjectionResult, SkillMetadata, SkillReference, SkillRemoveReason,
    SkillScanError, SkillScanResult, SkillSource, SkillSubagentMode, ToolDenialConfig,
};
