use crate::domain::models::{NewTask, Task, TaskPatch};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_connection;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<Task>, InfraError>;
    async fn create_task(&self, fields: NewTask) -> Result<Task, InfraError>;
    /// Patching an unknown id is a no-op.
    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<(), InfraError>;
    async fn delete_task(&self, task_id: &str) -> Result<(), InfraError>;
}

fn next_task_id() -> String {
    format!("tsk-{}", Uuid::new_v4())
}

fn build_task(fields: NewTask, now: DateTime<Utc>) -> Result<Task, InfraError> {
    let task = fields.into_task(next_task_id(), now);
    task.validate().map_err(InfraError::InvalidConfig)?;
    Ok(task)
}

#[derive(Clone)]
pub struct SqliteTaskStore {
    db_path: PathBuf,
    now_provider: NowProvider,
}

impl SqliteTaskStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }

    fn load(connection: &Connection, task_id: &str) -> Result<Option<Task>, InfraError> {
        let row = connection
            .query_row(
                "SELECT id, title, done, estimate_minutes, priority, tags, due, pinned_today, created_at
                 FROM tasks WHERE id = ?1",
                params![task_id],
                TaskRow::from_row,
            )
            .optional()?;
        row.map(TaskRow::into_task).transpose()
    }

    fn save(connection: &Connection, task: &Task) -> Result<(), InfraError> {
        connection.execute(
            "INSERT INTO tasks (id, title, done, estimate_minutes, priority, tags, due, pinned_today, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
               title = excluded.title,
               done = excluded.done,
               estimate_minutes = excluded.estimate_minutes,
               priority = excluded.priority,
               tags = excluded.tags,
               due = excluded.due,
               pinned_today = excluded.pinned_today,
               created_at = excluded.created_at",
            params![
                task.id,
                task.title,
                task.done,
                task.estimate_minutes,
                task.priority,
                serde_json::to_string(&task.tags)?,
                task.due.map(|due| due.to_rfc3339()),
                task.pinned_today,
                task.created_at.map(|created_at| created_at.to_rfc3339()),
            ],
        )?;
        Ok(())
    }
}

struct TaskRow {
    id: String,
    title: String,
    done: bool,
    estimate_minutes: u32,
    priority: Option<u8>,
    tags: String,
    due: Option<String>,
    pinned_today: bool,
    created_at: Option<String>,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            done: row.get(2)?,
            estimate_minutes: row.get(3)?,
            priority: row.get(4)?,
            tags: row.get(5)?,
            due: row.get(6)?,
            pinned_today: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_task(self) -> Result<Task, InfraError> {
        Ok(Task {
            due: parse_timestamp(self.due.as_deref(), "tasks.due")?,
            created_at: parse_timestamp(self.created_at.as_deref(), "tasks.created_at")?,
            tags: serde_json::from_str(&self.tags)?,
            id: self.id,
            title: self.title,
            done: self.done,
            estimate_minutes: self.estimate_minutes,
            priority: self.priority,
            pinned_today: self.pinned_today,
        })
    }
}

fn parse_timestamp(raw: Option<&str>, field_name: &str) -> Result<Option<DateTime<Utc>>, InfraError> {
    raw.map(|value| {
        DateTime::parse_from_rfc3339(value)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|error| InfraError::InvalidConfig(format!("invalid {field_name} '{value}': {error}")))
    })
    .transpose()
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn list_tasks(&self) -> Result<Vec<Task>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, title, done, estimate_minutes, priority, tags, due, pinned_today, created_at
             FROM tasks ORDER BY created_at, id",
        )?;
        let rows = statement
            .query_map([], TaskRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    async fn create_task(&self, fields: NewTask) -> Result<Task, InfraError> {
        let task = build_task(fields, (self.now_provider)())?;
        let connection = self.connect()?;
        Self::save(&connection, &task)?;
        Ok(task)
    }

    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let Some(mut task) = Self::load(&connection, task_id)? else {
            return Ok(());
        };
        task.apply_patch(&patch);
        task.validate().map_err(InfraError::InvalidConfig)?;
        Self::save(&connection, &task)
    }

    async fn delete_task(&self, task_id: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
        Ok(())
    }
}

pub struct InMemoryTaskStore {
    tasks: Mutex<Vec<Task>>,
    now_provider: NowProvider,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            now_provider: Arc::new(Utc::now),
        }
    }
}

impl InMemoryTaskStore {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            ..Self::default()
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Task>>, InfraError> {
        self.tasks
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("task store: {error}")))
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn list_tasks(&self) -> Result<Vec<Task>, InfraError> {
        Ok(self.lock()?.clone())
    }

    async fn create_task(&self, fields: NewTask) -> Result<Task, InfraError> {
        let task = build_task(fields, (self.now_provider)())?;
        self.lock()?.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<(), InfraError> {
        let mut tasks = self.lock()?;
        let Some(task) = tasks.iter_mut().find(|task| task.id == task_id) else {
            return Ok(());
        };
        let mut updated = task.clone();
        updated.apply_patch(&patch);
        updated.validate().map_err(InfraError::InvalidConfig)?;
        *task = updated;
        Ok(())
    }

    async fn delete_task(&self, task_id: &str) -> Result<(), InfraError> {
        self.lock()?.retain(|task| task.id != task_id);
        Ok(())
    }
}
