use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// XP needed to advance one level.
pub const XP_PER_LEVEL: i32 = 100;
/// Fixed award for completing a task.
pub const TASK_COMPLETION_XP: i32 = 20;
/// Maximum concurrent module assignments per child.
pub const MAX_ACTIVE_ASSIGNMENTS: i64 = 3;
/// Largest single XP award accepted. Keeps the running total far from
/// i32 overflow even over many awards.
pub const MAX_XP_AWARD: i32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChildId(pub String);

impl fmt::Display for ChildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ChildId {
    fn from(value: &str) -> Self {
        ChildId(value.to_string())
    }
}

impl FromStr for ChildId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ChildId(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub String);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ModuleId {
    fn from(value: &str) -> Self {
        ModuleId(value.to_string())
    }
}

/// Per-module completion state of a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "NOT_STARTED",
            ProgressStatus::InProgress => "IN_PROGRESS",
            ProgressStatus::Completed => "COMPLETED",
        }
    }
}

impl FromStr for ProgressStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_STARTED" => Ok(ProgressStatus::NotStarted),
            "IN_PROGRESS" => Ok(ProgressStatus::InProgress),
            "COMPLETED" => Ok(ProgressStatus::Completed),
            other => Err(format!("unknown progress status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Completed => "COMPLETED",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "COMPLETED" => Ok(TaskStatus::Completed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Child entry as declared in server configuration and seeded into storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Child {
    pub id: String,
    pub display_name: String,
    pub email: String,
}

/// Catalog entry for a learning module. Only published modules are
/// assignable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    pub title: String,
    pub lesson_count: i32,
    #[serde(default = "default_published")]
    pub published: bool,
}

fn default_published() -> bool {
    true
}

/// Level reached with `xp` accumulated points. 0 XP is level 1, each full
/// hundred advances one level.
pub fn level_for_xp(xp: i32) -> i32 {
    xp / XP_PER_LEVEL + 1
}

/// Outcome of applying an XP award, as reported back to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpOutcome {
    pub new_xp: i32,
    pub new_level: i32,
    pub leveled_up: bool,
    pub xp_to_next_level: i32,
    pub next_level: i32,
}

impl XpOutcome {
    /// Computes the outcome of raising `previous_xp` by `amount`.
    pub fn apply(previous_xp: i32, amount: i32) -> Self {
        let new_xp = previous_xp + amount;
        let new_level = level_for_xp(new_xp);
        XpOutcome {
            new_xp,
            new_level,
            leveled_up: new_level > level_for_xp(previous_xp),
            xp_to_next_level: new_level * XP_PER_LEVEL - new_xp,
            next_level: new_level + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_boundaries() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(99), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(199), 2);
        assert_eq!(level_for_xp(200), 3);
    }

    #[test]
    fn award_that_crosses_a_level() {
        let out = XpOutcome::apply(0, 100);
        assert_eq!(out.new_xp, 100);
        assert_eq!(out.new_level, 2);
        assert!(out.leveled_up);
        assert_eq!(out.xp_to_next_level, 100);
        assert_eq!(out.next_level, 3);
    }

    #[test]
    fn award_within_a_level() {
        let out = XpOutcome::apply(0, 50);
        assert_eq!(out.new_xp, 50);
        assert_eq!(out.new_level, 1);
        assert!(!out.leveled_up);
        assert_eq!(out.xp_to_next_level, 50);
        assert_eq!(out.next_level, 2);
    }

    #[test]
    fn award_is_monotonic_over_repeated_task_xp() {
        let mut xp = 0;
        let mut last_level = 1;
        for _ in 0..20 {
            let out = XpOutcome::apply(xp, TASK_COMPLETION_XP);
            assert!(out.new_level >= last_level);
            xp = out.new_xp;
            last_level = out.new_level;
        }
        assert_eq!(xp, 400);
        assert_eq!(last_level, 5);
    }

    #[test]
    fn status_round_trip() {
        for s in [
            ProgressStatus::NotStarted,
            ProgressStatus::InProgress,
            ProgressStatus::Completed,
        ] {
            assert_eq!(s.as_str().parse::<ProgressStatus>().unwrap(), s);
        }
        assert!("DONE".parse::<ProgressStatus>().is_err());
    }
}
