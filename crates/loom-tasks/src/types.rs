//! Domain types for tasks, projects, and areas.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Enums
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle status of a task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet scheduled for work.
    Backlog,
    /// Scheduled, not started.
    #[default]
    Pending,
    /// Actively being worked.
    InProgress,
    /// Finished.
    Completed,
    /// Abandoned.
    Cancelled,
}

impl TaskStatus {
    /// SQL text representation.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this status is terminal (task is done, one way or another).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Priority of a task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Lowest priority.
    Low,
    /// Default priority.
    #[default]
    Medium,
    /// Important, should be done soon.
    High,
    /// Drop everything.
    Critical,
}

impl TaskPriority {
    /// SQL text representation.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Who or what created a task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    /// Created by the agent autonomously.
    #[default]
    Agent,
    /// Created directly by the user.
    User,
    /// Created by a skill invocation.
    Skill,
    /// Created by internal system logic.
    System,
}

impl TaskSource {
    /// SQL text representation.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::User => "user",
            Self::Skill => "skill",
            Self::System => "system",
        }
    }
}

/// Lifecycle status of a project.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Being actively worked.
    #[default]
    Active,
    /// Temporarily on hold.
    Paused,
    /// Finished.
    Completed,
    /// No longer relevant, kept for history.
    Archived,
}

impl ProjectStatus {
    /// SQL text representation.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

/// Lifecycle status of an area.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaStatus {
    /// Currently relevant.
    #[default]
    Active,
    /// No longer relevant, kept for history.
    Archived,
}

impl AreaStatus {
    /// SQL text representation.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

/// Relationship between two tasks in `task_dependencies`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyRelationship {
    /// The blocker must complete before the blocked task can proceed.
    Blocks,
    /// The two tasks are related but neither blocks the other.
    Related,
}

impl DependencyRelationship {
    /// SQL text representation.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::Related => "related",
        }
    }
}

/// Kind of activity logged against a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    /// Task was created.
    Created,
    /// `status` field changed.
    StatusChanged,
    /// Any other field changed.
    Updated,
    /// A note was appended.
    NoteAdded,
    /// Time was logged against the task.
    TimeLogged,
    /// A dependency edge was added.
    DependencyAdded,
    /// A dependency edge was removed.
    DependencyRemoved,
    /// Task was moved between project/area/parent.
    Moved,
    /// Task was deleted.
    Deleted,
}

impl ActivityAction {
    /// SQL text representation.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::StatusChanged => "status_changed",
            Self::Updated => "updated",
            Self::NoteAdded => "note_added",
            Self::TimeLogged => "time_logged",
            Self::DependencyAdded => "dependency_added",
            Self::DependencyRemoved => "dependency_removed",
            Self::Moved => "moved",
            Self::Deleted => "deleted",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────────────────────────

/// A task row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// `task-<uuid>` identifier.
    pub id: String,
    /// Owning project, if any.
    pub project_id: Option<String>,
    /// Parent task, if this is a subtask.
    pub parent_task_id: Option<String>,
    /// Workspace scope.
    pub workspace_id: Option<String>,
    /// Owning area, if any.
    pub area_id: Option<String>,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: Option<String>,
    /// Present-continuous form for UI spinners (e.g. "Fixing auth bug").
    pub active_form: Option<String>,
    /// Freeform append-only notes, timestamped per entry.
    pub notes: Option<String>,
    /// Current status.
    pub status: TaskStatus,
    /// Current priority.
    pub priority: TaskPriority,
    /// Who created the task.
    pub source: TaskSource,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// ISO 8601 due date, if any.
    pub due_date: Option<String>,
    /// Hidden from active lists until this timestamp.
    pub deferred_until: Option<String>,
    /// When work began (auto-set on transition to `InProgress`).
    pub started_at: Option<String>,
    /// When the task reached a terminal status.
    pub completed_at: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last-modified timestamp.
    pub updated_at: String,
    /// Estimated effort in minutes.
    pub estimated_minutes: Option<i64>,
    /// Accumulated logged minutes.
    pub actual_minutes: i64,
    /// Session that created the task.
    pub created_by_session_id: Option<String>,
    /// Session that last touched the task.
    pub last_session_id: Option<String>,
    /// Timestamp of the last session touch.
    pub last_session_at: Option<String>,
    /// Manual ordering within a list.
    pub sort_order: i64,
    /// Arbitrary caller-supplied metadata.
    pub metadata: Option<serde_json::Value>,
}

/// A project row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// `proj-<uuid>` identifier.
    pub id: String,
    /// Workspace scope.
    pub workspace_id: Option<String>,
    /// Owning area, if any.
    pub area_id: Option<String>,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: Option<String>,
    /// Current status.
    pub status: ProjectStatus,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last-modified timestamp.
    pub updated_at: String,
    /// When the project reached `Completed`.
    pub completed_at: Option<String>,
    /// Arbitrary caller-supplied metadata.
    pub metadata: Option<serde_json::Value>,
}

/// An area row (top of the PARA hierarchy).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    /// `area-<uuid>` identifier.
    pub id: String,
    /// Workspace scope (defaults to `"default"`).
    pub workspace_id: String,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: Option<String>,
    /// Current status.
    pub status: AreaStatus,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Manual ordering within a list.
    pub sort_order: f64,
    /// Creation timestamp.
    pub created_at: String,
    /// Last-modified timestamp.
    pub updated_at: String,
    /// Arbitrary caller-supplied metadata.
    pub metadata: Option<serde_json::Value>,
}

/// A directed edge in `task_dependencies`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDependency {
    /// The task that must complete first (for `Blocks`).
    pub blocker_task_id: String,
    /// The task that is blocked or related.
    pub blocked_task_id: String,
    /// The kind of relationship.
    pub relationship: DependencyRelationship,
    /// Creation timestamp.
    pub created_at: String,
}

/// An activity log entry for a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskActivity {
    /// Autoincrement row ID.
    pub id: i64,
    /// The task this entry is about.
    pub task_id: String,
    /// Session that performed the action, if any.
    pub session_id: Option<String>,
    /// Correlated event ID, if any.
    pub event_id: Option<String>,
    /// The kind of action.
    pub action: ActivityAction,
    /// Prior value, for change entries.
    pub old_value: Option<String>,
    /// New value, for change entries.
    pub new_value: Option<String>,
    /// Free-form detail string.
    pub detail: Option<String>,
    /// Minutes logged, for `TimeLogged` entries.
    pub minutes_logged: Option<i64>,
    /// When the action occurred.
    pub timestamp: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Create / update params
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters to create a task.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskCreateParams {
    /// Short title (required).
    pub title: String,
    /// Longer description.
    pub description: Option<String>,
    /// Present-continuous form.
    pub active_form: Option<String>,
    /// Initial status (defaults to `Pending`).
    pub status: Option<TaskStatus>,
    /// Initial priority (defaults to `Medium`).
    pub priority: Option<TaskPriority>,
    /// Creator (defaults to `Agent`).
    pub source: Option<TaskSource>,
    /// Initial tags.
    pub tags: Option<Vec<String>>,
    /// ISO 8601 due date.
    pub due_date: Option<String>,
    /// Hide from active lists until this timestamp.
    pub deferred_until: Option<String>,
    /// Estimated effort in minutes.
    pub estimated_minutes: Option<i64>,
    /// Owning project.
    pub project_id: Option<String>,
    /// Parent task (subtask creation).
    pub parent_task_id: Option<String>,
    /// Owning area.
    pub area_id: Option<String>,
    /// Workspace scope.
    pub workspace_id: Option<String>,
    /// Session that created the task.
    pub created_by_session_id: Option<String>,
    /// Arbitrary caller-supplied metadata.
    pub metadata: Option<serde_json::Value>,
}

/// Parameters to update a task. `None` fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskUpdateParams {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New present-continuous form.
    pub active_form: Option<String>,
    /// New status.
    pub status: Option<TaskStatus>,
    /// New priority.
    pub priority: Option<TaskPriority>,
    /// Reassign project (empty string clears it).
    pub project_id: Option<String>,
    /// Reassign parent (empty string clears it).
    pub parent_task_id: Option<String>,
    /// Reassign area (empty string clears it).
    pub area_id: Option<String>,
    /// New due date.
    pub due_date: Option<String>,
    /// New deferred-until timestamp.
    pub deferred_until: Option<String>,
    /// New estimate.
    pub estimated_minutes: Option<i64>,
    /// Tags to add (merged, deduplicated).
    pub add_tags: Option<Vec<String>>,
    /// Tags to remove.
    pub remove_tags: Option<Vec<String>>,
    /// A note to append (timestamped).
    pub add_note: Option<String>,
    /// Session performing the update.
    pub last_session_id: Option<String>,
    /// Replacement metadata.
    pub metadata: Option<serde_json::Value>,
}

/// Filter for listing tasks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskFilter {
    /// Restrict to this status.
    pub status: Option<TaskStatus>,
    /// Restrict to this priority.
    pub priority: Option<TaskPriority>,
    /// Restrict to this project.
    pub project_id: Option<String>,
    /// Restrict to this workspace.
    pub workspace_id: Option<String>,
    /// Restrict to this area.
    pub area_id: Option<String>,
    /// Restrict to subtasks of this parent.
    pub parent_task_id: Option<String>,
    /// Only tasks due on or before this date.
    pub due_before: Option<String>,
    /// Restrict to tasks carrying all of these tags.
    pub tags: Option<Vec<String>>,
    /// Include `Completed`/`Cancelled` tasks (excluded by default).
    pub include_completed: bool,
    /// Include tasks currently deferred (excluded by default).
    pub include_deferred: bool,
    /// Include `Backlog` tasks (excluded by default).
    pub include_backlog: bool,
}

/// A page of tasks with a total count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListResult {
    /// The page of tasks.
    pub tasks: Vec<Task>,
    /// Total matching rows, ignoring `limit`/`offset`.
    pub total: u32,
}

/// A task with its subtasks, dependencies, and recent activity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskWithDetails {
    /// The task itself.
    pub task: Task,
    /// Direct subtasks.
    pub subtasks: Vec<Task>,
    /// Tasks that block this one.
    pub blocked_by: Vec<TaskDependency>,
    /// Tasks this one blocks.
    pub blocks: Vec<TaskDependency>,
    /// Most recent activity entries.
    pub recent_activity: Vec<TaskActivity>,
}

/// Parameters to create a project.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectCreateParams {
    /// Short title (required).
    pub title: String,
    /// Longer description.
    pub description: Option<String>,
    /// Initial status (defaults to `Active`).
    pub status: Option<ProjectStatus>,
    /// Initial tags.
    pub tags: Option<Vec<String>>,
    /// Owning area.
    pub area_id: Option<String>,
    /// Workspace scope.
    pub workspace_id: Option<String>,
    /// Arbitrary caller-supplied metadata.
    pub metadata: Option<serde_json::Value>,
}

/// Parameters to update a project. `None` fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectUpdateParams {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New status.
    pub status: Option<ProjectStatus>,
    /// Reassign area.
    pub area_id: Option<String>,
    /// Tags to add (merged, deduplicated).
    pub add_tags: Option<Vec<String>>,
    /// Tags to remove.
    pub remove_tags: Option<Vec<String>>,
    /// Replacement metadata.
    pub metadata: Option<serde_json::Value>,
}

/// Filter for listing projects.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectFilter {
    /// Restrict to this status.
    pub status: Option<ProjectStatus>,
    /// Restrict to this workspace.
    pub workspace_id: Option<String>,
    /// Restrict to this area.
    pub area_id: Option<String>,
}

/// A project with its task-completion counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWithProgress {
    /// The project itself.
    pub project: Project,
    /// Total tasks under this project.
    pub task_count: u32,
    /// Tasks in a terminal status.
    pub completed_task_count: u32,
}

/// A page of projects-with-progress and a total count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListResult {
    /// The page of projects.
    pub projects: Vec<ProjectWithProgress>,
    /// Total matching rows, ignoring `limit`/`offset`.
    pub total: u32,
}

/// Parameters to create an area.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AreaCreateParams {
    /// Short title (required).
    pub title: String,
    /// Longer description.
    pub description: Option<String>,
    /// Initial status (defaults to `Active`).
    pub status: Option<AreaStatus>,
    /// Initial tags.
    pub tags: Option<Vec<String>>,
    /// Manual sort position.
    pub sort_order: Option<f64>,
    /// Workspace scope (defaults to `"default"`).
    pub workspace_id: Option<String>,
    /// Arbitrary caller-supplied metadata.
    pub metadata: Option<serde_json::Value>,
}

/// Parameters to update an area. `None` fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AreaUpdateParams {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New status.
    pub status: Option<AreaStatus>,
    /// New sort position.
    pub sort_order: Option<f64>,
    /// Tags to add (merged, deduplicated).
    pub add_tags: Option<Vec<String>>,
    /// Tags to remove.
    pub remove_tags: Option<Vec<String>>,
    /// Replacement metadata.
    pub metadata: Option<serde_json::Value>,
}

/// Filter for listing areas.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AreaFilter {
    /// Restrict to this status.
    pub status: Option<AreaStatus>,
    /// Restrict to this workspace.
    pub workspace_id: Option<String>,
}

/// An area with its project/task counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaWithCounts {
    /// The area itself.
    pub area: Area,
    /// Projects under this area.
    pub project_count: u32,
    /// Total tasks under this area.
    pub task_count: u32,
    /// Non-terminal tasks under this area.
    pub active_task_count: u32,
}

/// A page of areas-with-counts and a total count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaListResult {
    /// The page of areas.
    pub areas: Vec<AreaWithCounts>,
    /// Total matching rows, ignoring `limit`/`offset`.
    pub total: u32,
}

/// Parameters to log an activity entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogActivityParams {
    /// The task the activity concerns.
    pub task_id: String,
    /// Session that performed the action.
    pub session_id: Option<String>,
    /// Correlated event ID.
    pub event_id: Option<String>,
    /// The kind of action. Defaults to `Updated`.
    pub action: ActivityAction,
    /// Prior value, for change entries.
    pub old_value: Option<String>,
    /// New value, for change entries.
    pub new_value: Option<String>,
    /// Free-form detail string.
    pub detail: Option<String>,
    /// Minutes logged, for `TimeLogged` entries.
    pub minutes_logged: Option<i64>,
}

impl Default for ActivityAction {
    fn default() -> Self {
        Self::Updated
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Context-injection summaries
// ─────────────────────────────────────────────────────────────────────────────

/// Aggregate view of active work, for LLM context injection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTaskSummary {
    /// Tasks currently in progress, most urgent first.
    pub in_progress: Vec<Task>,
    /// Count of pending (not started) tasks.
    pub pending_count: u32,
    /// Count of overdue tasks.
    pub overdue_count: u32,
    /// Count of currently-deferred tasks.
    pub deferred_count: u32,
}

/// Completion progress for one active project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectProgressEntry {
    /// Project title.
    pub title: String,
    /// Completed (or cancelled) task count.
    pub completed: u32,
    /// Total task count.
    pub total: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_sql_roundtrip() {
        for s in [
            TaskStatus::Backlog,
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Cancelled,
        ] {
            assert!(!s.as_sql().is_empty());
        }
    }

    #[test]
    fn task_status_is_terminal() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(!TaskStatus::Backlog.is_terminal());
    }

    #[test]
    fn task_create_params_default_title_empty() {
        let p = TaskCreateParams::default();
        assert!(p.title.is_empty());
        assert!(p.status.is_none());
    }

    #[test]
    fn activity_action_default_is_updated() {
        assert_eq!(ActivityAction::default(), ActivityAction::Updated);
    }

    #[test]
    fn task_serde_camel_case() {
        let task = Task {
            id: "task-1".into(),
            project_id: None,
            parent_task_id: None,
            workspace_id: None,
            area_id: None,
            title: "t".into(),
            description: None,
            active_form: None,
            notes: None,
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            source: TaskSource::Agent,
            tags: vec![],
            due_date: None,
            deferred_until: None,
            started_at: None,
            completed_at: None,
            created_at: "now".into(),
            updated_at: "now".into(),
            estimated_minutes: None,
            actual_minutes: 0,
            created_by_session_id: None,
            last_session_id: None,
            last_session_at: None,
            sort_order: 0,
            metadata: None,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["parentTaskId"], serde_json::Value::Null);
        assert_eq!(json["actualMinutes"], 0);
    }
}
