//! Auto-placement of unscheduled tasks into free gaps or under-filled work blocks.

use crate::domain::block_store::{BlockDraft, BlockStore};
use crate::domain::error::PlannerError;
use crate::domain::models::{Block, BlockContent, EstimatePolicy, Policy, Task, WorkItem};
use crate::domain::time_math::{clamp, round_to_step, DayBounds, SlotGrid};
use chrono::NaiveDate;
use serde::Serialize;

pub const PREVIEW_BLOCK_ID: &str = "preview";

/// Start of the first gap on `date` that fits `needed_minutes` inside
/// `bounds`. `None` is an ordinary outcome (a full day), not a fault.
pub fn find_next_free_gap(
    blocks: &[Block],
    date: NaiveDate,
    needed_minutes: u32,
    bounds: DayBounds,
) -> Option<u32> {
    let mut day = blocks
        .iter()
        .filter(|block| block.date == date)
        .collect::<Vec<_>>();
    day.sort_by_key(|block| block.start_minute);

    let needed = i64::from(needed_minutes);
    let mut cursor = i64::from(bounds.start_minute);
    for block in day {
        if i64::from(block.start_minute) - cursor >= needed {
            break;
        }
        // Never walk backwards past a block nested inside an earlier one.
        cursor = cursor.max(i64::from(block.end_minute()));
    }

    (i64::from(bounds.end_minute) - cursor >= needed).then_some(cursor as u32)
}

/// Rounds an estimate to the slot size and bounds it so auto-placed blocks are
/// never empty and never swallow the day.
pub fn normalize_estimate(estimate_minutes: u32, slot_minutes: u32, policy: &EstimatePolicy) -> u32 {
    let slot = slot_minutes.max(1);
    let estimate = if estimate_minutes == 0 {
        policy.default_minutes
    } else {
        estimate_minutes
    };
    let min = policy.min_minutes.div_ceil(slot).max(1) * slot;
    let max = (policy.max_minutes / slot * slot).max(min);
    let rounded = round_to_step(f64::from(estimate), slot).max(0) as u32;
    clamp(rounded, min, max)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Placement {
    WorkItem { block_id: String, estimate_minutes: u32 },
    Atomic { block: Block },
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BatchPlacement {
    pub placed: Vec<(String, Placement)>,
    pub unplaced: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AutoPlacer {
    grid: SlotGrid,
    work_bounds: DayBounds,
    estimate: EstimatePolicy,
    micro_task_minutes: u32,
}

impl AutoPlacer {
    pub fn new(
        grid: SlotGrid,
        work_bounds: DayBounds,
        estimate: EstimatePolicy,
        micro_task_minutes: u32,
    ) -> Self {
        // Placement never leaves the rendered day window.
        let start_minute = work_bounds.start_minute.max(grid.bounds.start_minute);
        let end_minute = work_bounds.end_minute.min(grid.bounds.end_minute).max(start_minute);
        Self {
            grid,
            work_bounds: DayBounds {
                start_minute,
                end_minute,
            },
            estimate,
            micro_task_minutes,
        }
    }

    pub fn from_policy(policy: &Policy) -> Result<Self, PlannerError> {
        Ok(Self::new(
            policy.slot_grid()?,
            policy.work_bounds()?,
            policy.estimate.clone(),
            policy.micro_task_minutes,
        ))
    }

    pub fn normalized_estimate(&self, task: &Task) -> u32 {
        normalize_estimate(task.estimate_minutes, self.grid.slot_minutes, &self.estimate)
    }

    /// Where `task` would go on `date`, without committing anything.
    pub fn plan(&self, store: &BlockStore, task: &Task, date: NaiveDate) -> Option<Placement> {
        let needed = self.normalized_estimate(task);

        if needed <= self.micro_task_minutes {
            let mut work_blocks = store
                .blocks()
                .iter()
                .filter(|block| block.date == date && block.is_work())
                .collect::<Vec<_>>();
            work_blocks.sort_by_key(|block| block.start_minute);
            if let Some(block) = work_blocks
                .into_iter()
                .find(|block| block.remaining_capacity().is_some_and(|free| free >= needed))
            {
                return Some(Placement::WorkItem {
                    block_id: block.id.clone(),
                    estimate_minutes: needed,
                });
            }
        }

        let start_minute = find_next_free_gap(store.blocks(), date, needed, self.work_bounds)?;
        Some(Placement::Atomic {
            block: Block {
                id: PREVIEW_BLOCK_ID.to_string(),
                date,
                start_minute,
                length_minutes: needed,
                content: BlockContent::Atomic {
                    task_id: Some(task.id.clone()),
                },
            },
        })
    }

    /// Places one task, preferring an existing work block for micro tasks.
    pub fn schedule_next_free_slot(
        &self,
        store: &mut BlockStore,
        task: &Task,
        date: NaiveDate,
    ) -> Option<Placement> {
        let Some(plan) = self.plan(store, task, date) else {
            log::warn!("no free slot for task_id={} on {date}", task.id);
            return None;
        };

        match plan {
            Placement::WorkItem {
                block_id,
                estimate_minutes,
            } => {
                store.add_work_item(
                    &block_id,
                    WorkItem {
                        task_id: task.id.clone(),
                        estimate_minutes,
                    },
                )?;
                log::debug!("placed task_id={} into work block_id={block_id}", task.id);
                Some(Placement::WorkItem {
                    block_id,
                    estimate_minutes,
                })
            }
            Placement::Atomic { block } => {
                let committed = store.add_block(BlockDraft {
                    date,
                    start_minute: i64::from(block.start_minute),
                    length_minutes: i64::from(block.length_minutes),
                    content: block.content,
                });
                log::debug!(
                    "placed task_id={} at {}+{}m on {date}",
                    task.id,
                    committed.start_minute,
                    committed.length_minutes
                );
                Some(Placement::Atomic { block: committed })
            }
        }
    }

    /// Places the listed tasks largest-first, one after another, so each
    /// placement sees the gaps left by the previous one. Tasks that do not fit
    /// (or are unknown) are reported as unplaced.
    pub fn auto_place_many(
        &self,
        store: &mut BlockStore,
        tasks: &[Task],
        task_ids: &[String],
        date: NaiveDate,
    ) -> BatchPlacement {
        let mut batch = BatchPlacement::default();
        let mut selected = Vec::with_capacity(task_ids.len());
        for task_id in task_ids {
            match tasks.iter().find(|task| &task.id == task_id) {
                Some(task) => selected.push(task),
                None => batch.unplaced.push(task_id.clone()),
            }
        }
        selected.sort_by(|left, right| right.estimate_minutes.cmp(&left.estimate_minutes));

        for task in selected {
            match self.schedule_next_free_slot(store, task, date) {
                Some(placement) => batch.placed.push((task.id.clone(), placement)),
                None => batch.unplaced.push(task.id.clone()),
            }
        }

        log::debug!(
            "auto-placed {} of {} tasks on {date}",
            batch.placed.len(),
            task_ids.len()
        );
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 24).expect("valid date")
    }

    fn task(id: &str, estimate_minutes: u32) -> Task {
        Task {
            id: id.to_string(),
            title: format!("Task {id}"),
            done: false,
            estimate_minutes,
            priority: Some(2),
            tags: Vec::new(),
            due: None,
            pinned_today: false,
            created_at: None,
        }
    }

    fn work_day_placer() -> AutoPlacer {
        let grid = SlotGrid::new(DayBounds::new(0, 1440).expect("valid bounds"), 15, 5);
        AutoPlacer::new(
            grid,
            DayBounds::new(540, 1020).expect("valid bounds"),
            EstimatePolicy::default(),
            15,
        )
    }

    fn store_with(blocks: &[(u32, u32)]) -> BlockStore {
        let mut store = BlockStore::new(SlotGrid::new(
            DayBounds::new(0, 1440).expect("valid bounds"),
            15,
            5,
        ));
        for (start, length) in blocks {
            store.add_atomic_block(day(), i64::from(*start), i64::from(*length), None);
        }
        store
    }

    #[test]
    fn finds_first_gap_that_fits() {
        let store = store_with(&[(540, 60), (660, 60)]);
        let bounds = DayBounds::new(540, 1020).expect("valid bounds");
        assert_eq!(find_next_free_gap(store.blocks(), day(), 45, bounds), Some(600));
        assert_eq!(find_next_free_gap(store.blocks(), day(), 90, bounds), Some(720));
        assert_eq!(find_next_free_gap(store.blocks(), day(), 301, bounds), None);
    }

    #[test]
    fn ignores_other_dates_and_nested_blocks() {
        let mut store = store_with(&[(540, 180), (570, 30)]);
        let tomorrow = day().succ_opt().expect("next day");
        store.add_atomic_block(tomorrow, 720, 300, None);
        let bounds = DayBounds::new(540, 1020).expect("valid bounds");
        assert_eq!(find_next_free_gap(store.blocks(), day(), 30, bounds), Some(720));
    }

    #[test]
    fn normalize_estimate_rounds_and_bounds() {
        let policy = EstimatePolicy::default();
        assert_eq!(normalize_estimate(25, 15, &policy), 30);
        assert_eq!(normalize_estimate(25, 5, &policy), 25);
        assert_eq!(normalize_estimate(1, 5, &policy), 5);
        assert_eq!(normalize_estimate(1, 15, &policy), 15);
        assert_eq!(normalize_estimate(500, 15, &policy), 180);
        assert_eq!(normalize_estimate(0, 15, &policy), 30);
    }

    #[test]
    fn empty_day_places_at_day_start() {
        let grid = SlotGrid::new(DayBounds::new(0, 1440).expect("valid bounds"), 15, 5);
        let placer = AutoPlacer::new(grid, grid.bounds, EstimatePolicy::default(), 15);
        let mut store = BlockStore::new(grid);

        let placement = placer
            .schedule_next_free_slot(&mut store, &task("t", 25), day())
            .expect("empty day has room");
        let Placement::Atomic { block } = placement else {
            panic!("expected atomic placement");
        };
        assert_eq!((block.start_minute, block.length_minutes), (0, 30));
        assert_ne!(block.id, PREVIEW_BLOCK_ID);
        assert_eq!(store.blocks(), &[block]);
    }

    #[test]
    fn micro_tasks_fill_work_blocks_first() {
        let placer = work_day_placer();
        let mut store = store_with(&[]);
        let roomy = store.add_work_block(day(), 600, 30);
        let nearly_full = store.add_work_block(day(), 540, 15);
        store.add_work_item(
            &nearly_full.id,
            WorkItem {
                task_id: "busy".to_string(),
                estimate_minutes: 10,
            },
        );

        let placement = placer
            .schedule_next_free_slot(&mut store, &task("micro", 10), day())
            .expect("work block has room");
        assert_eq!(
            placement,
            Placement::WorkItem {
                block_id: roomy.id.clone(),
                estimate_minutes: 15,
            }
        );
        assert_eq!(store.get(&roomy.id).and_then(Block::remaining_capacity), Some(15));
    }

    #[test]
    fn plan_does_not_commit() {
        let placer = work_day_placer();
        let store = store_with(&[(540, 60)]);
        let plan = placer.plan(&store, &task("t", 45), day()).expect("room left");
        assert!(matches!(plan, Placement::Atomic { ref block } if block.start_minute == 600));
        assert_eq!(store.blocks().len(), 1);
    }

    #[test]
    fn batch_skips_tasks_that_do_not_fit() {
        let placer = work_day_placer();
        let mut store = store_with(&[(540, 420)]);
        let tasks = vec![task("A", 500), task("B", 20)];

        let batch = placer.auto_place_many(
            &mut store,
            &tasks,
            &["B".to_string(), "A".to_string(), "ghost".to_string()],
            day(),
        );

        assert_eq!(batch.placed.len(), 1);
        assert_eq!(batch.placed[0].0, "B");
        assert_eq!(batch.unplaced, vec!["ghost".to_string(), "A".to_string()]);
    }

    #[test]
    fn batch_places_largest_first() {
        let placer = work_day_placer();
        let mut store = store_with(&[]);
        let tasks = vec![task("small", 30), task("big", 120)];

        let batch = placer.auto_place_many(
            &mut store,
            &tasks,
            &["small".to_string(), "big".to_string()],
            day(),
        );

        let starts = batch
            .placed
            .iter()
            .map(|(task_id, placement)| match placement {
                Placement::Atomic { block } => (task_id.as_str(), block.start_minute),
                Placement::WorkItem { .. } => (task_id.as_str(), 0),
            })
            .collect::<Vec<_>>();
        assert_eq!(starts, vec![("big", 540), ("small", 660)]);
    }
}
