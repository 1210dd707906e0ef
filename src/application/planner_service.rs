use crate::application::bootstrap::bootstrap_workspace;
use crate::domain::block_store::{BlockDraft, BlockStore, ResizeEdge, SplitOutcome};
use crate::domain::drag::{DragInterpreter, DragOutcome, DragTarget, DropTarget, Modifiers, PointerPosition};
use crate::domain::error::PlannerError;
use crate::domain::models::{parse_date, Block, NewTask, Policy, Task, TaskPatch};
use crate::domain::overlap::{conflicting_block_ids, preview_conflicts};
use crate::domain::ranking::rank_backlog;
use crate::domain::scheduler::{AutoPlacer, BatchPlacement, Placement};
use crate::domain::time_math::{minutes_to_pixel_offset, positive_duration, GridMetrics};
use crate::domain::today::{resolve_today, TodayEntry};
use crate::infrastructure::block_repository::{BlockRepository, SqliteBlockRepository};
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::config::{load_policy, load_timezone};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_repository::{SqliteTaskStore, TaskStore};
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Mutex as TokioMutex;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Live drag preview plus whether it would land on another block.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DragPreview {
    pub block: Block,
    pub conflicts: bool,
}

struct RuntimeState {
    tasks: Vec<Task>,
    blocks: BlockStore,
    loaded_dates: HashSet<NaiveDate>,
    drag: DragInterpreter,
}

/// Wires the scheduling core to its collaborators. The in-memory block store
/// is the working copy; every committed block change is written back for its
/// date. The runtime lock is never held across an await. Every call that
/// loads, mutates or persists holds `mutations` for its whole sequence, so
/// the working copy and the repository see one mutation at a time.
pub struct PlannerService<T, B>
where
    T: TaskStore,
    B: BlockRepository,
{
    policy: Policy,
    placer: AutoPlacer,
    timezone: Tz,
    task_store: Arc<T>,
    block_repository: Arc<B>,
    runtime: Mutex<RuntimeState>,
    mutations: TokioMutex<()>,
    command_log: Option<CommandLog>,
    now_provider: NowProvider,
}

pub type SqlitePlannerService = PlannerService<SqliteTaskStore, SqliteBlockRepository>;

/// Bootstraps `workspace_root` and opens a service over its SQLite database,
/// configured from its `config/` directory.
pub fn open_workspace(workspace_root: &Path) -> Result<SqlitePlannerService, InfraError> {
    let bootstrap = bootstrap_workspace(workspace_root)?;
    let policy = load_policy(&bootstrap.config_dir)?;
    let timezone = load_timezone(&bootstrap.config_dir)?;

    let service = PlannerService::new(
        policy,
        Arc::new(SqliteTaskStore::new(&bootstrap.database_path)),
        Arc::new(SqliteBlockRepository::new(&bootstrap.database_path)),
    )?
    .with_timezone(timezone)
    .with_command_log(CommandLog::new(&bootstrap.logs_dir));
    Ok(service)
}

impl<T, B> PlannerService<T, B>
where
    T: TaskStore,
    B: BlockRepository,
{
    pub fn new(policy: Policy, task_store: Arc<T>, block_repository: Arc<B>) -> Result<Self, InfraError> {
        let grid = policy.slot_grid()?;
        let placer = AutoPlacer::from_policy(&policy)?;
        let drag = DragInterpreter::new(policy.estimate.clone());

        Ok(Self {
            policy,
            placer,
            timezone: Tz::UTC,
            task_store,
            block_repository,
            runtime: Mutex::new(RuntimeState {
                tasks: Vec::new(),
                blocks: BlockStore::new(grid),
                loaded_dates: HashSet::new(),
                drag,
            }),
            mutations: TokioMutex::new(()),
            command_log: None,
            now_provider: Arc::new(Utc::now),
        })
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn with_command_log(mut self, command_log: CommandLog) -> Self {
        self.command_log = Some(command_log);
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Calendar date of "now" in the configured timezone.
    pub fn today_date(&self) -> NaiveDate {
        (self.now_provider)().with_timezone(&self.timezone).date_naive()
    }

    pub fn now_minute(&self) -> u32 {
        let local = (self.now_provider)().with_timezone(&self.timezone);
        local.hour() * 60 + local.minute()
    }

    /// Pixel offset of the now line, or `None` outside the rendered day window.
    pub fn now_line_offset(&self, metrics: &GridMetrics) -> Option<f64> {
        let minute = self.now_minute();
        if !metrics.grid.bounds.contains(minute) {
            return None;
        }
        Some(minutes_to_pixel_offset(f64::from(minute), metrics))
    }

    pub async fn refresh_tasks(&self) -> Result<Vec<Task>, InfraError> {
        let _mutation = self.mutations.lock().await;
        self.reload_tasks().await
    }

    pub fn tasks(&self) -> Result<Vec<Task>, InfraError> {
        Ok(self.lock_runtime()?.tasks.clone())
    }

    pub async fn create_task(&self, fields: NewTask) -> Result<Task, InfraError> {
        let _mutation = self.mutations.lock().await;
        let task = match self.task_store.create_task(fields).await {
            Ok(task) => task,
            Err(error) => return Err(self.command_error("create_task", error)),
        };
        self.lock_runtime()?.tasks.push(task.clone());
        self.log_info("create_task", &format!("created task_id={}", task.id));
        Ok(task)
    }

    pub async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<Task, InfraError> {
        let _mutation = self.mutations.lock().await;
        self.apply_task_patch(task_id, patch).await
    }

    /// Sets a task's due date from text input (`YYYY-MM-DD` or RFC3339); blank input clears it.
    pub async fn set_task_due(&self, task_id: &str, value: &str) -> Result<Task, InfraError> {
        let patch = TaskPatch::due_input(value)?;
        self.update_task(task_id, patch).await
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<bool, InfraError> {
        let _mutation = self.mutations.lock().await;
        let known = self.lock_runtime()?.tasks.iter().any(|task| task.id == task_id);
        if !known {
            return Ok(false);
        }
        if let Err(error) = self.task_store.delete_task(task_id).await {
            return Err(self.command_error("delete_task", error));
        }
        self.lock_runtime()?.tasks.retain(|task| task.id != task_id);
        self.log_info("delete_task", &format!("deleted task_id={task_id}"));
        Ok(true)
    }

    pub async fn toggle_done(&self, task_id: &str) -> Result<Task, InfraError> {
        let _mutation = self.mutations.lock().await;
        let task = self.require_task(task_id)?;
        self.apply_task_patch(task_id, TaskPatch::done(!task.done)).await
    }

    pub async fn toggle_pinned(&self, task_id: &str) -> Result<Task, InfraError> {
        let _mutation = self.mutations.lock().await;
        let task = self.require_task(task_id)?;
        self.apply_task_patch(task_id, TaskPatch::pinned_today(!task.pinned_today))
            .await
    }

    /// Loads `date` from the repository, replacing the working copy for it.
    pub async fn load_blocks(&self, date: NaiveDate) -> Result<Vec<Block>, InfraError> {
        let _mutation = self.mutations.lock().await;
        self.reload_date(date).await
    }

    /// [`Self::load_blocks`] for a `YYYY-MM-DD` date string.
    pub async fn open_day(&self, date_input: &str) -> Result<Vec<Block>, InfraError> {
        let date = parse_date(date_input)?;
        self.load_blocks(date).await
    }

    pub fn blocks_for_date(&self, date: NaiveDate) -> Result<Vec<Block>, InfraError> {
        Ok(self.lock_runtime()?.blocks.blocks_for_date(date))
    }

    pub fn today(&self, date: NaiveDate) -> Result<Vec<TodayEntry>, InfraError> {
        let runtime = self.lock_runtime()?;
        Ok(resolve_today(&runtime.tasks, runtime.blocks.blocks(), date))
    }

    pub fn backlog(&self, date: NaiveDate) -> Result<Vec<Task>, InfraError> {
        let runtime = self.lock_runtime()?;
        Ok(rank_backlog(
            &runtime.tasks,
            runtime.blocks.blocks(),
            date,
            self.policy.micro_task_minutes,
        )
        .into_iter()
        .cloned()
        .collect())
    }

    pub fn conflicts(&self, date: NaiveDate) -> Result<BTreeSet<String>, InfraError> {
        Ok(conflicting_block_ids(self.lock_runtime()?.blocks.blocks(), date))
    }

    pub async fn add_block(&self, draft: BlockDraft) -> Result<Block, InfraError> {
        let _mutation = self.mutations.lock().await;
        positive_duration(draft.length_minutes)?;
        let date = draft.date;
        self.ensure_loaded(date).await?;
        let block = self.lock_runtime()?.blocks.add_block(draft);
        self.persist_date("add_block", date).await?;
        self.log_info("add_block", &format!("added block_id={}", block.id));
        Ok(block)
    }

    pub async fn add_work_block(
        &self,
        date: NaiveDate,
        start_minute: i64,
        length_minutes: i64,
    ) -> Result<Block, InfraError> {
        let _mutation = self.mutations.lock().await;
        positive_duration(length_minutes)?;
        self.ensure_loaded(date).await?;
        let block = self
            .lock_runtime()?
            .blocks
            .add_work_block(date, start_minute, length_minutes);
        self.persist_date("add_work_block", date).await?;
        self.log_info("add_work_block", &format!("added work block_id={}", block.id));
        Ok(block)
    }

    pub async fn move_block(&self, block_id: &str, start_minute: i64) -> Result<Option<Block>, InfraError> {
        let _mutation = self.mutations.lock().await;
        let moved = self.lock_runtime()?.blocks.move_block(block_id, start_minute);
        self.commit_block_change("move_block", moved).await
    }

    pub async fn resize_block(
        &self,
        block_id: &str,
        edge: ResizeEdge,
        boundary_minute: i64,
    ) -> Result<Option<Block>, InfraError> {
        let _mutation = self.mutations.lock().await;
        let resized = self
            .lock_runtime()?
            .blocks
            .resize_block(block_id, edge, boundary_minute);
        self.commit_block_change("resize_block", resized).await
    }

    pub async fn split_block(&self, block_id: &str) -> Result<Option<SplitOutcome>, InfraError> {
        let _mutation = self.mutations.lock().await;
        let outcome = self.lock_runtime()?.blocks.split_block(block_id);
        if let Some(SplitOutcome::Split { first, .. }) = &outcome {
            self.persist_date("split_block", first.date).await?;
            self.log_info("split_block", &format!("split block_id={block_id}"));
        }
        Ok(outcome)
    }

    pub async fn duplicate_block(&self, block_id: &str) -> Result<Option<Block>, InfraError> {
        let _mutation = self.mutations.lock().await;
        let copy = self.lock_runtime()?.blocks.duplicate_block(block_id);
        self.commit_block_change("duplicate_block", copy).await
    }

    pub async fn delete_block(&self, block_id: &str) -> Result<Option<Block>, InfraError> {
        let _mutation = self.mutations.lock().await;
        let removed = self.lock_runtime()?.blocks.delete_block(block_id);
        self.commit_block_change("delete_block", removed).await
    }

    /// Sends the listed blocks back to the unscheduled tray.
    pub async fn remove_blocks(&self, block_ids: &[String]) -> Result<Vec<Block>, InfraError> {
        let _mutation = self.mutations.lock().await;
        let removed = self.lock_runtime()?.blocks.remove_blocks_for_ids(block_ids);
        let dates = removed.iter().map(|block| block.date).collect::<BTreeSet<_>>();
        for date in dates {
            self.persist_date("remove_blocks", date).await?;
        }
        if !removed.is_empty() {
            self.log_info("remove_blocks", &format!("removed {} blocks", removed.len()));
        }
        Ok(removed)
    }

    pub async fn schedule_next_free_slot(
        &self,
        task_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Placement>, InfraError> {
        let _mutation = self.mutations.lock().await;
        let task = self.require_task(task_id)?;
        self.ensure_loaded(date).await?;
        let placement = {
            let mut runtime = self.lock_runtime()?;
            self.placer.schedule_next_free_slot(&mut runtime.blocks, &task, date)
        };
        if placement.is_some() {
            self.persist_date("schedule_next_free_slot", date).await?;
            self.log_info(
                "schedule_next_free_slot",
                &format!("placed task_id={task_id} on {date}"),
            );
        }
        Ok(placement)
    }

    pub async fn preview_placement(
        &self,
        task_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Placement>, InfraError> {
        let _mutation = self.mutations.lock().await;
        let task = self.require_task(task_id)?;
        self.ensure_loaded(date).await?;
        let runtime = self.lock_runtime()?;
        Ok(self.placer.plan(&runtime.blocks, &task, date))
    }

    pub async fn auto_place(&self, task_ids: &[String], date: NaiveDate) -> Result<BatchPlacement, InfraError> {
        let _mutation = self.mutations.lock().await;
        self.ensure_loaded(date).await?;
        let batch = {
            let mut runtime = self.lock_runtime()?;
            let RuntimeState { tasks, blocks, .. } = &mut *runtime;
            self.placer.auto_place_many(blocks, tasks, task_ids, date)
        };
        if !batch.placed.is_empty() {
            self.persist_date("auto_place", date).await?;
        }
        self.log_info(
            "auto_place",
            &format!(
                "placed {} tasks, {} unplaced on {date}",
                batch.placed.len(),
                batch.unplaced.len()
            ),
        );
        Ok(batch)
    }

    pub async fn begin_drag(
        &self,
        target: DragTarget,
        pointer: PointerPosition,
        metrics: GridMetrics,
    ) -> Result<bool, InfraError> {
        let _mutation = self.mutations.lock().await;
        match &target {
            DragTarget::EmptyGrid { date } | DragTarget::UnplacedTask { date, .. } => {
                self.ensure_loaded(*date).await?;
            }
            _ => {}
        }
        let mut runtime = self.lock_runtime()?;
        let RuntimeState { blocks, drag, .. } = &mut *runtime;
        Ok(drag.start(target, pointer, metrics, blocks))
    }

    pub fn drag_to(
        &self,
        pointer: PointerPosition,
        modifiers: Modifiers,
        over: Option<DropTarget>,
    ) -> Result<Option<DragPreview>, InfraError> {
        let mut runtime = self.lock_runtime()?;
        let RuntimeState { blocks, drag, .. } = &mut *runtime;
        Ok(drag.move_to(pointer, modifiers, over).map(|preview| DragPreview {
            conflicts: preview_conflicts(preview, blocks.blocks()),
            block: preview.clone(),
        }))
    }

    pub async fn end_drag(&self, drop: DropTarget) -> Result<DragOutcome, InfraError> {
        let _mutation = self.mutations.lock().await;
        let outcome = {
            let mut runtime = self.lock_runtime()?;
            let RuntimeState { blocks, drag, .. } = &mut *runtime;
            drag.end(drop, blocks)
        };
        match &outcome {
            DragOutcome::Created { block }
            | DragOutcome::Updated { block }
            | DragOutcome::Removed { block } => {
                self.persist_date("end_drag", block.date).await?;
                self.log_info("end_drag", &format!("committed block_id={}", block.id));
            }
            DragOutcome::Nothing => {}
        }
        Ok(outcome)
    }

    pub fn cancel_drag(&self) -> Result<(), InfraError> {
        self.lock_runtime()?.drag.cancel();
        Ok(())
    }

    // Callers hold `mutations`.
    async fn reload_tasks(&self) -> Result<Vec<Task>, InfraError> {
        let tasks = self.task_store.list_tasks().await?;
        self.lock_runtime()?.tasks = tasks.clone();
        Ok(tasks)
    }

    async fn apply_task_patch(&self, task_id: &str, patch: TaskPatch) -> Result<Task, InfraError> {
        self.require_task(task_id)?;
        if let Err(error) = self.task_store.update_task(task_id, patch).await {
            return Err(self.command_error("update_task", error));
        }
        self.reload_tasks().await?;
        let updated = self.require_task(task_id)?;
        self.log_info("update_task", &format!("updated task_id={task_id}"));
        Ok(updated)
    }

    async fn reload_date(&self, date: NaiveDate) -> Result<Vec<Block>, InfraError> {
        let blocks = self.block_repository.list_blocks_for_date(date).await?;
        let mut runtime = self.lock_runtime()?;
        let rejected = runtime.blocks.load_date(date, blocks);
        if !rejected.is_empty() {
            log::warn!("{} stored blocks on {date} were not loaded", rejected.len());
        }
        runtime.loaded_dates.insert(date);
        Ok(runtime.blocks.blocks_for_date(date))
    }

    async fn ensure_loaded(&self, date: NaiveDate) -> Result<(), InfraError> {
        if self.lock_runtime()?.loaded_dates.contains(&date) {
            return Ok(());
        }
        self.reload_date(date).await.map(|_| ())
    }

    async fn commit_block_change(
        &self,
        command: &str,
        changed: Option<Block>,
    ) -> Result<Option<Block>, InfraError> {
        let Some(block) = changed else {
            return Ok(None);
        };
        self.persist_date(command, block.date).await?;
        self.log_info(command, &format!("block_id={}", block.id));
        Ok(Some(block))
    }

    async fn persist_date(&self, command: &str, date: NaiveDate) -> Result<(), InfraError> {
        let snapshot = self.lock_runtime()?.blocks.blocks_for_date(date);
        self.block_repository
            .persist_blocks_for_date(date, &snapshot)
            .await
            .map_err(|error| self.command_error(command, error))
    }

    fn require_task(&self, task_id: &str) -> Result<Task, InfraError> {
        self.lock_runtime()?
            .tasks
            .iter()
            .find(|task| task.id == task_id)
            .cloned()
            .ok_or_else(|| InfraError::from(PlannerError::TaskNotFound(task_id.to_string())))
    }

    fn lock_runtime(&self) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
        self.runtime
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("planner runtime: {error}")))
    }

    fn log_info(&self, command: &str, message: &str) {
        match &self.command_log {
            Some(command_log) => command_log.info(command, message),
            None => log::info!("{command}: {message}"),
        }
    }

    fn command_error(&self, command: &str, error: InfraError) -> InfraError {
        match &self.command_log {
            Some(command_log) => command_log.error(command, &error.to_string()),
            None => log::error!("{command}: {error}"),
        }
        error
    }
}
