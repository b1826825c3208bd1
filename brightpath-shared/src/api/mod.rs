use serde::{Deserialize, Serialize};

use crate::domain::{ChildId, ModuleId, ProgressStatus, TaskStatus};

pub mod endpoints;

pub const API_V1_PREFIX: &str = "/api/v1";

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthReq {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
}

// Children
#[derive(Debug, Serialize, Deserialize)]
pub struct ChildDto {
    pub id: ChildId,
    pub display_name: String,
    pub xp: i32,
    pub level: i32,
    pub avatar_url: Option<String>,
}

// Relationship linking
#[derive(Debug, Serialize, Deserialize)]
pub struct LinkChildReq {
    pub child_email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkChildResp {
    pub child_id: ChildId,
}

// Module catalog
#[derive(Debug, Serialize, Deserialize)]
pub struct ModuleDto {
    pub id: ModuleId,
    pub title: String,
    pub lesson_count: i32,
}

// Assignment & progress
#[derive(Debug, Serialize, Deserialize)]
pub struct AssignModuleReq {
    pub module_id: ModuleId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignmentDto {
    pub module_id: ModuleId,
    pub child_id: ChildId,
    pub assigned_by: String,
    pub assigned_at: String, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressDto {
    pub child_id: ChildId,
    pub module_id: ModuleId,
    pub status: ProgressStatus,
    pub completed_lessons: i32,
    pub last_updated: String, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignModuleResp {
    pub assignment: AssignmentDto,
    pub progress: ProgressDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignmentWithProgressDto {
    pub assignment: AssignmentDto,
    pub progress: ProgressDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveProgressReq {
    pub completed_lessons: u32,
    /// Defaults to IN_PROGRESS when omitted.
    pub status: Option<ProgressStatus>,
}

// Tasks
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskDto {
    pub id: i32,
    pub child_id: ChildId,
    pub title: String,
    pub status: TaskStatus,
    pub due_date: Option<String>,     // RFC3339 UTC
    pub completed_at: Option<String>, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskReq {
    pub title: String,
    pub due_date: Option<String>, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleTaskReq {
    pub completed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleTaskResp {
    pub task: TaskDto,
    /// Present only when this request awarded XP.
    pub xp: Option<XpSummaryDto>,
}

// Experience
#[derive(Debug, Serialize, Deserialize)]
pub struct AwardXpReq {
    pub amount: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct XpSummaryDto {
    pub new_xp: i32,
    pub new_level: i32,
    pub leveled_up: bool,
    pub xp_to_next_level: i32,
    pub next_level: i32,
}

// Media
#[derive(Debug, Serialize, Deserialize)]
pub struct AvatarResp {
    pub url: String,
    pub public_id: String,
    pub format: Option<String>,
}
