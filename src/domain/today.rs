//! Which tasks belong to a given day, and why.

use crate::domain::models::{Block, Task};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TodayOrigin {
    Scheduled,
    Pinned,
    Due,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TodayEntry {
    pub task_id: String,
    pub origins: BTreeSet<TodayOrigin>,
}

impl TodayEntry {
    pub fn has(&self, origin: TodayOrigin) -> bool {
        self.origins.contains(&origin)
    }
}

/// Task ids bound to any block on `date`, through atomic blocks or work items.
pub fn scheduled_task_ids(blocks: &[Block], date: NaiveDate) -> HashSet<String> {
    blocks
        .iter()
        .filter(|block| block.date == date)
        .flat_map(|block| block.task_ids())
        .map(ToOwned::to_owned)
        .collect()
}

/// Calendar-day comparison; the time of day is ignored.
pub fn is_due_on(task: &Task, date: NaiveDate) -> bool {
    task.due.is_some_and(|due| due.date_naive() == date)
}

/// Resolves the tasks for `date`, sorted by task id. Done tasks are excluded
/// from every origin, and so are block references to unknown tasks.
pub fn resolve_today(tasks: &[Task], blocks: &[Block], date: NaiveDate) -> Vec<TodayEntry> {
    let scheduled = scheduled_task_ids(blocks, date);
    let mut origins: BTreeMap<&str, BTreeSet<TodayOrigin>> = BTreeMap::new();

    for task in tasks.iter().filter(|task| !task.done) {
        let mut task_origins = BTreeSet::new();
        if scheduled.contains(&task.id) {
            task_origins.insert(TodayOrigin::Scheduled);
        }
        if task.pinned_today {
            task_origins.insert(TodayOrigin::Pinned);
        }
        if is_due_on(task, date) {
            task_origins.insert(TodayOrigin::Due);
        }
        if !task_origins.is_empty() {
            origins
                .entry(task.id.as_str())
                .or_default()
                .extend(task_origins);
        }
    }

    origins
        .into_iter()
        .map(|(task_id, origins)| TodayEntry {
            task_id: task_id.to_string(),
            origins,
        })
        .collect()
}

pub fn today_task_ids(tasks: &[Task], blocks: &[Block], date: NaiveDate) -> Vec<String> {
    resolve_today(tasks, blocks, date)
        .into_iter()
        .map(|entry| entry.task_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{BlockContent, WorkItem};
    use chrono::{DateTime, Utc};

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn due(value: &str) -> Option<DateTime<Utc>> {
        Some(
            DateTime::parse_from_rfc3339(value)
                .expect("valid datetime")
                .with_timezone(&Utc),
        )
    }

    fn task(id: &str, done: bool, pinned_today: bool, due: Option<DateTime<Utc>>) -> Task {
        Task {
            id: id.to_string(),
            title: format!("Task {id}"),
            done,
            estimate_minutes: 30,
            priority: Some(2),
            tags: Vec::new(),
            due,
            pinned_today,
            created_at: None,
        }
    }

    fn atomic(id: &str, task_id: &str, on: &str) -> Block {
        Block {
            id: id.to_string(),
            date: date(on),
            start_minute: 0,
            length_minutes: 30,
            content: BlockContent::Atomic {
                task_id: Some(task_id.to_string()),
            },
        }
    }

    fn fixture() -> (Vec<Task>, Vec<Block>) {
        let tasks = vec![
            task("1", false, false, None),
            task("2", false, true, None),
            task("3", false, false, due("2025-09-24T10:00:00.000Z")),
            task("4", true, false, None),
            task("5", false, true, None),
            task("6", false, false, due("2025-09-23T10:00:00.000Z")),
            task("7", false, false, None),
            task("8", true, true, None),
        ];
        let blocks = vec![
            atomic("b1", "1", "2025-09-24"),
            atomic("b2", "4", "2025-09-24"),
            atomic("b3", "5", "2025-09-24"),
            atomic("b4", "7", "2025-09-25"),
        ];
        (tasks, blocks)
    }

    #[test]
    fn includes_scheduled_pinned_and_due_tasks() {
        let (tasks, blocks) = fixture();
        let ids = today_task_ids(&tasks, &blocks, date("2025-09-24"));
        assert_eq!(ids, vec!["1", "2", "3", "5"]);
    }

    #[test]
    fn annotates_every_origin() {
        let (tasks, blocks) = fixture();
        let entries = resolve_today(&tasks, &blocks, date("2025-09-24"));
        let both = entries
            .iter()
            .find(|entry| entry.task_id == "5")
            .expect("task 5 is for today");
        assert!(both.has(TodayOrigin::Scheduled) && both.has(TodayOrigin::Pinned));
        assert!(!both.has(TodayOrigin::Due));
    }

    #[test]
    fn done_task_is_excluded_even_when_scheduled_and_pinned() {
        let tasks = vec![task("x", true, true, None)];
        let blocks = vec![atomic("b", "x", "2025-09-24")];
        assert!(resolve_today(&tasks, &blocks, date("2025-09-24")).is_empty());
    }

    #[test]
    fn due_matches_by_calendar_day() {
        let tasks = vec![task("late", false, false, due("2025-09-24T23:59:59Z"))];
        let entries = resolve_today(&tasks, &[], date("2025-09-24"));
        assert_eq!(entries.len(), 1);
        assert!(entries[0].has(TodayOrigin::Due));
    }

    #[test]
    fn work_items_count_as_scheduled() {
        let tasks = vec![task("w", false, false, None)];
        let blocks = vec![Block {
            id: "work".to_string(),
            date: date("2025-09-24"),
            start_minute: 540,
            length_minutes: 30,
            content: BlockContent::Work {
                items: vec![WorkItem {
                    task_id: "w".to_string(),
                    estimate_minutes: 10,
                }],
            },
        }];
        let entries = resolve_today(&tasks, &blocks, date("2025-09-24"));
        assert_eq!(entries[0].origins, BTreeSet::from([TodayOrigin::Scheduled]));
    }

    #[test]
    fn output_is_sorted_and_repeatable() {
        let tasks = vec![
            task("c", false, true, None),
            task("a", false, true, None),
            task("b", false, true, None),
        ];
        let first = resolve_today(&tasks, &[], date("2025-09-24"));
        let second = resolve_today(&tasks, &[], date("2025-09-24"));
        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|entry| entry.task_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
    }
}
