use crate::storage::schema::{
    assignments, children, modules, parent_links, progress, sessions, tasks,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = children)]
pub struct Child {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub xp: i32,
    pub level: i32,
    pub avatar_url: Option<String>,
    pub avatar_public_id: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = children)]
pub struct NewChild<'a> {
    pub id: &'a str,
    pub display_name: &'a str,
    pub email: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = parent_links)]
#[diesel(primary_key(child_id))]
#[diesel(belongs_to(Child, foreign_key = child_id))]
pub struct ParentLink {
    pub child_id: String,
    pub parent_username: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = parent_links)]
pub struct NewParentLink<'a> {
    pub child_id: &'a str,
    pub parent_username: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = modules)]
pub struct Module {
    pub id: String,
    pub title: String,
    pub lesson_count: i32,
    pub published: bool,
}

#[derive(Insertable)]
#[diesel(table_name = modules)]
pub struct NewModule<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub lesson_count: i32,
    pub published: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = assignments)]
#[diesel(belongs_to(Child, foreign_key = child_id))]
#[diesel(belongs_to(Module, foreign_key = module_id))]
pub struct Assignment {
    pub id: i32,
    pub module_id: String,
    pub child_id: String,
    pub assigned_by: String,
    pub assigned_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = assignments)]
pub struct NewAssignment<'a> {
    pub module_id: &'a str,
    pub child_id: &'a str,
    pub assigned_by: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = progress)]
#[diesel(primary_key(child_id, module_id))]
pub struct Progress {
    pub child_id: String,
    pub module_id: String,
    pub status: String,
    pub completed_lessons: i32,
    pub last_updated: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = progress)]
pub struct NewProgress<'a> {
    pub child_id: &'a str,
    pub module_id: &'a str,
    pub status: &'a str,
    pub completed_lessons: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(belongs_to(Child, foreign_key = child_id))]
pub struct Task {
    pub id: i32,
    pub child_id: String,
    pub title: String,
    pub status: String,
    pub due_date: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask<'a> {
    pub child_id: &'a str,
    pub title: &'a str,
    pub status: &'a str,
    pub due_date: Option<NaiveDateTime>,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub jti: &'a str,
    pub username: &'a str,
}
