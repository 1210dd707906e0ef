use crate::domain::models::{Block, Task};
use crate::domain::today::scheduled_task_ids;
use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::{Ordering, Reverse};

/// Earlier timestamps score higher. A missing timestamp scores above every
/// present one, so undated tasks are not pushed behind dated ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Earliness {
    At(Reverse<DateTime<Utc>>),
    Unset,
}

impl From<Option<DateTime<Utc>>> for Earliness {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Self::Unset, |at| Self::At(Reverse(at)))
    }
}

/// Sort key for backlog candidates. Tiers compare in declaration order:
/// priority, then the micro-task boost, then age, then due proximity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BacklogScore {
    priority_tier: u8,
    micro: bool,
    older_first: Earliness,
    due_soonest: Earliness,
}

impl BacklogScore {
    pub fn for_task(task: &Task, micro_task_minutes: u32) -> Self {
        Self {
            priority_tier: task.priority.map(|priority| 4u8.saturating_sub(priority)).unwrap_or(0),
            micro: task.estimate_minutes <= micro_task_minutes,
            older_first: task.created_at.into(),
            due_soonest: task.due.into(),
        }
    }
}

/// Not-done tasks with no block on `date`, best first. Pinned or due tasks stay
/// in the backlog until they are scheduled. Equal scores fall back to task id.
pub fn rank_backlog<'a>(
    tasks: &'a [Task],
    blocks: &[Block],
    date: NaiveDate,
    micro_task_minutes: u32,
) -> Vec<&'a Task> {
    let scheduled = scheduled_task_ids(blocks, date);
    let mut candidates = tasks
        .iter()
        .filter(|task| !task.done && !scheduled.contains(&task.id))
        .map(|task| (BacklogScore::for_task(task, micro_task_minutes), task))
        .collect::<Vec<_>>();

    candidates.sort_by(|(left_score, left), (right_score, right)| {
        match right_score.cmp(left_score) {
            Ordering::Equal => left.id.cmp(&right.id),
            other => other,
        }
    });
    candidates.into_iter().map(|(_, task)| task).collect()
}
