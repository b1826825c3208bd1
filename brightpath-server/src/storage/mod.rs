pub mod models;
pub mod schema;

use brightpath_shared::domain::{self, MAX_ACTIVE_ASSIGNMENTS, TASK_COMPLETION_XP, XpOutcome};
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::{
    Assignment, Child, Module, NewAssignment, NewChild, NewModule, NewParentLink, NewProgress,
    NewSession, NewTask, ParentLink, Progress, Task,
};

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Entity absent, or hidden because the caller has no claim to it.
    #[error("not found: {0}")]
    NotFound(String),

    /// The child already has an active parent link.
    #[error("child already linked to a parent")]
    AlreadyLinked,

    /// An assignment for this (module, child) pair already exists.
    #[error("module already assigned to child")]
    AlreadyAssigned,

    /// The child already holds the maximum number of assignments.
    #[error("assignment limit reached")]
    AssignmentLimit,
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    pub async fn seed_from_config(
        &self,
        cfg_children: &[domain::Child],
        cfg_modules: &[domain::Module],
    ) -> Result<(), StorageError> {
        use schema::{children, modules};

        let pool = self.pool.clone();
        let children_owned = cfg_children.to_owned();
        let modules_owned = cfg_modules.to_owned();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;

            // Upsert children; xp/level are runtime state and never reset here
            for c in &children_owned {
                let new_child = NewChild {
                    id: &c.id,
                    display_name: &c.display_name,
                    email: &c.email,
                };
                diesel::insert_into(children::table)
                    .values(&new_child)
                    .on_conflict(children::id)
                    .do_update()
                    .set((
                        children::display_name.eq(new_child.display_name),
                        children::email.eq(new_child.email),
                    ))
                    .execute(&mut conn)?;
            }

            // Upsert module catalog
            for m in &modules_owned {
                let new_module = NewModule {
                    id: &m.id,
                    title: &m.title,
                    lesson_count: m.lesson_count,
                    published: m.published,
                };
                diesel::insert_into(modules::table)
                    .values(&new_module)
                    .on_conflict(modules::id)
                    .do_update()
                    .set((
                        modules::title.eq(new_module.title),
                        modules::lesson_count.eq(new_module.lesson_count),
                        modules::published.eq(new_module.published),
                    ))
                    .execute(&mut conn)?;
            }

            Ok(())
        })
        .await?
    }

    pub async fn get_child(&self, child: &str) -> Result<Option<Child>, StorageError> {
        use schema::children::dsl::*;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Child>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(children
                .filter(id.eq(&child_owned))
                .first::<Child>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn find_child_by_email(&self, email_: &str) -> Result<Option<Child>, StorageError> {
        use schema::children::dsl::*;
        let pool = self.pool.clone();
        let email_owned = email_.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Child>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(children
                .filter(email.eq(&email_owned))
                .first::<Child>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn list_children_for_parent(
        &self,
        parent: &str,
    ) -> Result<Vec<Child>, StorageError> {
        use schema::{children, parent_links};
        let pool = self.pool.clone();
        let parent_owned = parent.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<Child>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(children::table
                .inner_join(parent_links::table)
                .filter(parent_links::parent_username.eq(&parent_owned))
                .order(children::display_name.asc())
                .select(Child::as_select())
                .load::<Child>(&mut conn)?)
        })
        .await?
    }

    /// Records a parent->child link. A child holds at most one link, ever;
    /// re-linking fails with [`StorageError::AlreadyLinked`] regardless of
    /// which parent holds the existing link.
    pub async fn link_child(
        &self,
        parent: &str,
        child: &str,
    ) -> Result<ParentLink, StorageError> {
        use schema::parent_links;
        let pool = self.pool.clone();
        let parent_owned = parent.to_string();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<ParentLink, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<ParentLink, StorageError> {
                let existing: Option<ParentLink> = parent_links::table
                    .filter(parent_links::child_id.eq(&child_owned))
                    .first::<ParentLink>(conn)
                    .optional()?;
                if existing.is_some() {
                    return Err(StorageError::AlreadyLinked);
                }
                let new_link = NewParentLink {
                    child_id: &child_owned,
                    parent_username: &parent_owned,
                };
                Ok(diesel::insert_into(parent_links::table)
                    .values(&new_link)
                    .get_result::<ParentLink>(conn)?)
            })
        })
        .await?
    }

    pub async fn find_link(
        &self,
        parent: &str,
        child: &str,
    ) -> Result<Option<ParentLink>, StorageError> {
        use schema::parent_links::dsl::*;
        let pool = self.pool.clone();
        let parent_owned = parent.to_string();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<ParentLink>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(parent_links
                .filter(child_id.eq(&child_owned))
                .filter(parent_username.eq(&parent_owned))
                .first::<ParentLink>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn list_published_modules(&self) -> Result<Vec<Module>, StorageError> {
        use schema::modules::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Module>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(modules
                .filter(published.eq(true))
                .order(title.asc())
                .load::<Module>(&mut conn)?)
        })
        .await?
    }

    /// Assigns a published module to a linked child, creating the paired
    /// Assignment and Progress rows in one transaction.
    ///
    /// The whole precondition ladder runs inside `BEGIN IMMEDIATE`, so the
    /// capacity count and the insert are serialized against concurrent
    /// assignment attempts for the same child.
    pub async fn assign_module(
        &self,
        parent: &str,
        child: &str,
        module: &str,
    ) -> Result<(Assignment, Progress), StorageError> {
        use schema::{assignments, modules, parent_links, progress};
        let pool = self.pool.clone();
        let parent_owned = parent.to_string();
        let child_owned = child.to_string();
        let module_owned = module.to_string();
        tokio::task::spawn_blocking(move || -> Result<(Assignment, Progress), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<(Assignment, Progress), StorageError> {
                // A child not linked to this parent is reported exactly like a
                // missing child, so parents cannot probe for other families
                let linked: i64 = parent_links::table
                    .filter(parent_links::child_id.eq(&child_owned))
                    .filter(parent_links::parent_username.eq(&parent_owned))
                    .count()
                    .get_result(conn)?;
                if linked == 0 {
                    return Err(StorageError::NotFound(format!(
                        "child not found: {}",
                        child_owned
                    )));
                }

                let published: i64 = modules::table
                    .filter(modules::id.eq(&module_owned))
                    .filter(modules::published.eq(true))
                    .count()
                    .get_result(conn)?;
                if published == 0 {
                    return Err(StorageError::NotFound(format!(
                        "module not found: {}",
                        module_owned
                    )));
                }

                let duplicate: i64 = assignments::table
                    .filter(assignments::module_id.eq(&module_owned))
                    .filter(assignments::child_id.eq(&child_owned))
                    .count()
                    .get_result(conn)?;
                if duplicate > 0 {
                    return Err(StorageError::AlreadyAssigned);
                }

                let active: i64 = assignments::table
                    .filter(assignments::child_id.eq(&child_owned))
                    .count()
                    .get_result(conn)?;
                if active >= MAX_ACTIVE_ASSIGNMENTS {
                    return Err(StorageError::AssignmentLimit);
                }

                let new_assignment = NewAssignment {
                    module_id: &module_owned,
                    child_id: &child_owned,
                    assigned_by: &parent_owned,
                };
                let assignment = diesel::insert_into(assignments::table)
                    .values(&new_assignment)
                    .get_result::<Assignment>(conn)?;

                let new_progress = NewProgress {
                    child_id: &child_owned,
                    module_id: &module_owned,
                    status: domain::ProgressStatus::NotStarted.as_str(),
                    completed_lessons: 0,
                };
                let progress_row = diesel::insert_into(progress::table)
                    .values(&new_progress)
                    .get_result::<Progress>(conn)?;

                Ok((assignment, progress_row))
            })
        })
        .await?
    }

    pub async fn list_assignments_with_progress(
        &self,
        child: &str,
    ) -> Result<Vec<(Assignment, Progress)>, StorageError> {
        use schema::{assignments, progress};
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(
            move || -> Result<Vec<(Assignment, Progress)>, StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                Ok(assignments::table
                    .inner_join(
                        progress::table.on(progress::child_id
                            .eq(assignments::child_id)
                            .and(progress::module_id.eq(assignments::module_id))),
                    )
                    .filter(assignments::child_id.eq(&child_owned))
                    .order(assignments::assigned_at.asc())
                    .select((Assignment::as_select(), Progress::as_select()))
                    .load::<(Assignment, Progress)>(&mut conn)?)
            },
        )
        .await?
    }

    /// Upserts progress for an assigned module. The Assignment row must
    /// already exist; `completed_lessons` may not exceed the module's lesson
    /// count.
    pub async fn save_progress(
        &self,
        child: &str,
        module: &str,
        completed: i32,
        status: domain::ProgressStatus,
    ) -> Result<Progress, StorageError> {
        use schema::{assignments, modules, progress};
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        let module_owned = module.to_string();
        tokio::task::spawn_blocking(move || -> Result<Progress, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Progress, StorageError> {
                let assigned: i64 = assignments::table
                    .filter(assignments::module_id.eq(&module_owned))
                    .filter(assignments::child_id.eq(&child_owned))
                    .count()
                    .get_result(conn)?;
                if assigned == 0 {
                    return Err(StorageError::NotFound(format!(
                        "module not assigned: {}",
                        module_owned
                    )));
                }

                let lesson_count: i32 = modules::table
                    .filter(modules::id.eq(&module_owned))
                    .select(modules::lesson_count)
                    .first(conn)?;
                if completed > lesson_count {
                    return Err(StorageError::InvalidInput(format!(
                        "completed_lessons {} exceeds module lesson count {}",
                        completed, lesson_count
                    )));
                }

                let now = Utc::now().naive_utc();
                let new_progress = NewProgress {
                    child_id: &child_owned,
                    module_id: &module_owned,
                    status: status.as_str(),
                    completed_lessons: completed,
                };
                diesel::insert_into(progress::table)
                    .values(&new_progress)
                    .on_conflict((progress::child_id, progress::module_id))
                    .do_update()
                    .set((
                        progress::status.eq(status.as_str()),
                        progress::completed_lessons.eq(completed),
                        progress::last_updated.eq(now),
                    ))
                    .execute(conn)?;

                Ok(progress::table
                    .filter(progress::child_id.eq(&child_owned))
                    .filter(progress::module_id.eq(&module_owned))
                    .first::<Progress>(conn)?)
            })
        })
        .await?
    }

    pub async fn create_task(
        &self,
        child: &str,
        title_: &str,
        due: Option<chrono::NaiveDateTime>,
    ) -> Result<Task, StorageError> {
        use schema::tasks;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        let title_owned = title_.to_string();
        tokio::task::spawn_blocking(move || -> Result<Task, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let new_task = NewTask {
                child_id: &child_owned,
                title: &title_owned,
                status: domain::TaskStatus::Pending.as_str(),
                due_date: due,
            };
            Ok(diesel::insert_into(tasks::table)
                .values(&new_task)
                .get_result::<Task>(&mut conn)?)
        })
        .await?
    }

    pub async fn list_tasks_for_child(&self, child: &str) -> Result<Vec<Task>, StorageError> {
        use schema::tasks::dsl::*;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<Task>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(tasks
                .filter(child_id.eq(&child_owned))
                .order(created_at.asc())
                .load::<Task>(&mut conn)?)
        })
        .await?
    }

    /// Flips a task's completion state. XP is awarded exactly on the
    /// PENDING -> COMPLETED transition; re-completing an already completed
    /// task awards nothing, and un-completing never claws XP back.
    pub async fn toggle_task(
        &self,
        child: &str,
        task: i32,
        completed: bool,
    ) -> Result<(Task, Option<XpOutcome>), StorageError> {
        use schema::tasks;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(
            move || -> Result<(Task, Option<XpOutcome>), StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.immediate_transaction(
                    |conn| -> Result<(Task, Option<XpOutcome>), StorageError> {
                        // Scoping by child makes a foreign task indistinguishable
                        // from a missing one
                        let existing: Option<Task> = tasks::table
                            .filter(tasks::id.eq(task))
                            .filter(tasks::child_id.eq(&child_owned))
                            .first::<Task>(conn)
                            .optional()?;
                        let Some(existing) = existing else {
                            return Err(StorageError::NotFound(format!(
                                "task not found: {}",
                                task
                            )));
                        };

                        let was_completed =
                            existing.status == domain::TaskStatus::Completed.as_str();
                        let now = Utc::now().naive_utc();
                        let mut award = None;

                        if completed {
                            diesel::update(tasks::table.filter(tasks::id.eq(task)))
                                .set((
                                    tasks::status.eq(domain::TaskStatus::Completed.as_str()),
                                    tasks::completed_at.eq(Some(now)),
                                ))
                                .execute(conn)?;
                            if !was_completed {
                                award = Some(bump_child_xp(conn, &child_owned, TASK_COMPLETION_XP)?);
                            }
                        } else {
                            diesel::update(tasks::table.filter(tasks::id.eq(task)))
                                .set((
                                    tasks::status.eq(domain::TaskStatus::Pending.as_str()),
                                    tasks::completed_at
                                        .eq(None::<chrono::NaiveDateTime>),
                                ))
                                .execute(conn)?;
                        }

                        let updated = tasks::table
                            .filter(tasks::id.eq(task))
                            .first::<Task>(conn)?;
                        Ok((updated, award))
                    },
                )
            },
        )
        .await?
    }

    /// Adds `amount` XP to a child and recomputes the level, both committed
    /// in the same transaction.
    pub async fn award_xp(&self, child: &str, amount: i32) -> Result<XpOutcome, StorageError> {
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<XpOutcome, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| bump_child_xp(conn, &child_owned, amount))
        })
        .await?
    }

    /// Replaces a child's avatar reference, returning the previous public id
    /// (if any) so the caller can drop the old media object.
    pub async fn set_avatar(
        &self,
        child: &str,
        url: &str,
        public_id: &str,
    ) -> Result<Option<String>, StorageError> {
        use schema::children;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        let url_owned = url.to_string();
        let public_owned = public_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<String>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Option<String>, StorageError> {
                let previous: Option<Option<String>> = children::table
                    .filter(children::id.eq(&child_owned))
                    .select(children::avatar_public_id)
                    .first(conn)
                    .optional()?;
                let Some(previous) = previous else {
                    return Err(StorageError::NotFound(format!(
                        "child not found: {}",
                        child_owned
                    )));
                };
                diesel::update(children::table.filter(children::id.eq(&child_owned)))
                    .set((
                        children::avatar_url.eq(Some(url_owned.as_str())),
                        children::avatar_public_id.eq(Some(public_owned.as_str())),
                    ))
                    .execute(conn)?;
                Ok(previous)
            })
        })
        .await?
    }

    // Session helpers for JWT inactivity windows
    pub async fn create_session(&self, jti_: &str, username_: &str) -> Result<(), StorageError> {
        use schema::sessions;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        let u = username_.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let new = NewSession {
                jti: &j,
                username: &u,
            };
            diesel::insert_into(sessions::table)
                .values(&new)
                .on_conflict_do_nothing()
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    /// Touch session atomically, but only if it hasn't expired.
    /// Returns `true` if the session was found and updated, `false` otherwise.
    ///
    /// This combines the idle timeout check and the `last_used_at` update into
    /// a single atomic UPDATE, eliminating the race condition between checking
    /// and updating the session.
    pub async fn touch_session_with_cutoff(
        &self,
        jti_: &str,
        cutoff: chrono::NaiveDateTime,
    ) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            let updated =
                diesel::update(sessions.filter(jti.eq(&j)).filter(last_used_at.ge(cutoff)))
                    .set(last_used_at.eq(now))
                    .execute(&mut conn)?;
            Ok(updated > 0)
        })
        .await?
    }
}

/// Increment-in-place XP update plus level recompute. Runs on the caller's
/// connection so it composes into larger transactions (task completion).
fn bump_child_xp(
    conn: &mut SqliteConnection,
    child: &str,
    amount: i32,
) -> Result<XpOutcome, StorageError> {
    use schema::children::dsl::*;

    let updated = diesel::update(children.filter(id.eq(child)))
        .set(xp.eq(xp + amount))
        .execute(conn)?;
    if updated == 0 {
        return Err(StorageError::NotFound(format!("child not found: {}", child)));
    }
    let new_xp: i32 = children.filter(id.eq(child)).select(xp).first(conn)?;
    let outcome = XpOutcome::apply(new_xp - amount, amount);
    diesel::update(children.filter(id.eq(child)))
        .set(level.eq(outcome.new_level))
        .execute(conn)?;
    Ok(outcome)
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    // Ignore the result rows; Diesel's execute is fine for PRAGMAs
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    Ok(())
}
