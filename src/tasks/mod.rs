//! Task repository.
//!
//! Plain parameterized SQL over the shared [`Database`]. Tags are stored as a
//! comma-joined column and due dates as Unix seconds; every listing is ordered
//! by due date, earliest first.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Row};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::storage::Database;

const CREATE_TASK_TABLE: &str = "CREATE TABLE IF NOT EXISTS task (
    id   INTEGER PRIMARY KEY,
    text TEXT NOT NULL,
    tags TEXT NOT NULL,
    due  INTEGER NOT NULL,
    done INTEGER NOT NULL
);";

const SELECT_TASK: &str = "SELECT id, text, tags, due, done FROM task";

/// A stored task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub text: String,
    pub tags: Vec<String>,
    pub due: DateTime<Utc>,
    pub done: bool,
}

/// Task fields supplied by a client on create or update.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskInput {
    pub text: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Defaults to the time of the request when omitted
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,

    #[serde(default)]
    pub done: bool,
}

/// CRUD and filtered listings over the `task` table.
#[derive(Clone)]
pub struct TaskStore {
    db: Database,
}

impl TaskStore {
    /// Create the store, creating the `task` table if needed.
    pub fn new(db: Database) -> Result<Self, TaskError> {
        db.execute_batch(CREATE_TASK_TABLE)?;
        Ok(Self { db })
    }

    pub fn create(&self, input: TaskInput) -> Result<Task, TaskError> {
        let due = truncate_to_seconds(input.due.unwrap_or_else(Utc::now));
        let outcome = self.db.execute(
            "INSERT INTO task (text, tags, due, done) VALUES (?1, ?2, ?3, ?4)",
            params![input.text, join_tags(&input.tags), due.timestamp(), input.done],
        )?;

        Ok(Task {
            id: outcome.last_insert_id,
            text: input.text,
            tags: input.tags,
            due,
            done: input.done,
        })
    }

    pub fn update(&self, id: i64, input: TaskInput) -> Result<Task, TaskError> {
        let due = truncate_to_seconds(input.due.unwrap_or_else(Utc::now));
        let outcome = self.db.execute(
            "UPDATE task SET text = ?1, tags = ?2, due = ?3, done = ?4 WHERE id = ?5",
            params![input.text, join_tags(&input.tags), due.timestamp(), input.done, id],
        )?;
        if outcome.rows_affected == 0 {
            return Err(TaskError::NotFound { id });
        }

        Ok(Task {
            id,
            text: input.text,
            tags: input.tags,
            due,
            done: input.done,
        })
    }

    pub fn delete(&self, id: i64) -> Result<(), TaskError> {
        let outcome = self.db.execute("DELETE FROM task WHERE id = ?1", params![id])?;
        if outcome.rows_affected == 0 {
            return Err(TaskError::NotFound { id });
        }
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<Task>, TaskError> {
        let sql = format!("{} ORDER BY due ASC", SELECT_TASK);
        Ok(self.db.query(&sql, [], task_from_row)?)
    }

    pub fn by_done(&self, done: bool) -> Result<Vec<Task>, TaskError> {
        let sql = format!("{} WHERE done = ?1 ORDER BY due ASC", SELECT_TASK);
        Ok(self.db.query(&sql, params![done], task_from_row)?)
    }

    /// Tasks whose tag column contains any of `tags` as a literal substring.
    pub fn by_tags(&self, tags: &[String]) -> Result<Vec<Task>, TaskError> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let clause = vec!["tags LIKE ? ESCAPE '\\'"; tags.len()].join(" OR ");
        let sql = format!("{} WHERE {} ORDER BY due ASC", SELECT_TASK, clause);
        let patterns = tags.iter().map(|tag| format!("%{}%", escape_like(tag)));
        Ok(self.db.query(&sql, params_from_iter(patterns), task_from_row)?)
    }

    /// Tasks due on the given UTC calendar day.
    pub fn by_due(&self, year: i32, month: u32, day: u32) -> Result<Vec<Task>, TaskError> {
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or(TaskError::InvalidDate { year, month, day })?;
        let start = date
            .and_hms_opt(0, 0, 0)
            .ok_or(TaskError::InvalidDate { year, month, day })?
            .and_utc();
        let end = start + Duration::days(1);

        let sql = format!(
            "{} WHERE due >= ?1 AND due < ?2 ORDER BY due ASC",
            SELECT_TASK
        );
        Ok(self
            .db
            .query(&sql, params![start.timestamp(), end.timestamp()], task_from_row)?)
    }
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let tags: String = row.get(2)?;
    let due: i64 = row.get(3)?;
    Ok(Task {
        id: row.get(0)?,
        text: row.get(1)?,
        tags: split_tags(&tags),
        due: DateTime::from_timestamp(due, 0).unwrap_or_default(),
        done: row.get(4)?,
    })
}

fn join_tags(tags: &[String]) -> String {
    tags.join(",")
}

fn split_tags(tags: &str) -> Vec<String> {
    if tags.is_empty() {
        Vec::new()
    } else {
        tags.split(',').map(str::to_string).collect()
    }
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
