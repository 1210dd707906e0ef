use crate::domain::models::{Block, BlockContent, WorkItem};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_connection;
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[async_trait]
pub trait BlockRepository: Send + Sync {
    async fn list_blocks_for_date(&self, date: NaiveDate) -> Result<Vec<Block>, InfraError>;
    /// Replaces every stored block for `date` with `blocks`.
    async fn persist_blocks_for_date(&self, date: NaiveDate, blocks: &[Block]) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteBlockRepository {
    db_path: PathBuf,
}

impl SqliteBlockRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }
}

struct BlockRow {
    id: String,
    date: String,
    start_minute: u32,
    length_minutes: u32,
    kind: String,
    task_id: Option<String>,
    work_items: String,
}

impl BlockRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: row.get(1)?,
            start_minute: row.get(2)?,
            length_minutes: row.get(3)?,
            kind: row.get(4)?,
            task_id: row.get(5)?,
            work_items: row.get(6)?,
        })
    }

    fn into_block(self) -> Result<Block, InfraError> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid blocks.date '{}': {error}", self.date))
        })?;
        let content = match self.kind.as_str() {
            "atomic" => BlockContent::Atomic {
                task_id: self.task_id,
            },
            "work" => BlockContent::Work {
                items: serde_json::from_str::<Vec<WorkItem>>(&self.work_items)?,
            },
            other => {
                return Err(InfraError::InvalidConfig(format!(
                    "unknown blocks.kind '{other}' for block {}",
                    self.id
                )));
            }
        };
        Ok(Block {
            id: self.id,
            date,
            start_minute: self.start_minute,
            length_minutes: self.length_minutes,
            content,
        })
    }
}

#[async_trait]
impl BlockRepository for SqliteBlockRepository {
    async fn list_blocks_for_date(&self, date: NaiveDate) -> Result<Vec<Block>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, date, start_minute, length_minutes, kind, task_id, work_items
             FROM blocks WHERE date = ?1 ORDER BY start_minute, id",
        )?;
        let rows = statement
            .query_map(params![date.format(DATE_FORMAT).to_string()], BlockRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(BlockRow::into_block).collect()
    }

    async fn persist_blocks_for_date(&self, date: NaiveDate, blocks: &[Block]) -> Result<(), InfraError> {
        let date_key = date.format(DATE_FORMAT).to_string();
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        transaction.execute("DELETE FROM blocks WHERE date = ?1", params![date_key])?;
        for block in blocks.iter().filter(|block| block.date == date) {
            let (kind, task_id, work_items) = match &block.content {
                BlockContent::Atomic { task_id } => ("atomic", task_id.clone(), "[]".to_string()),
                BlockContent::Work { items } => ("work", None, serde_json::to_string(items)?),
            };
            transaction.execute(
                "INSERT INTO blocks (id, date, start_minute, length_minutes, kind, task_id, work_items)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    block.id,
                    date_key,
                    block.start_minute,
                    block.length_minutes,
                    kind,
                    task_id,
                    work_items
                ],
            )?;
        }
        transaction.commit()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBlockRepository {
    blocks: Mutex<HashMap<NaiveDate, Vec<Block>>>,
}

#[async_trait]
impl BlockRepository for InMemoryBlockRepository {
    async fn list_blocks_for_date(&self, date: NaiveDate) -> Result<Vec<Block>, InfraError> {
        let blocks = self
            .blocks
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("block repository: {error}")))?;
        Ok(blocks.get(&date).cloned().unwrap_or_default())
    }

    async fn persist_blocks_for_date(&self, date: NaiveDate, blocks: &[Block]) -> Result<(), InfraError> {
        let mut stored = self
            .blocks
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("block repository: {error}")))?;
        stored.insert(
            date,
            blocks.iter().filter(|block| block.date == date).cloned().collect(),
        );
        Ok(())
    }
}
