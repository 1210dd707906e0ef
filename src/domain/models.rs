use crate::domain::error::PlannerError;
use crate::domain::time_math::{DayBounds, SlotGrid};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TASK_ESTIMATE_MINUTES: u32 = 25;
pub const DEFAULT_TASK_PRIORITY: u8 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub done: bool,
    pub estimate_minutes: u32,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pinned_today: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        if self.estimate_minutes == 0 {
            return Err("task.estimate_minutes must be > 0".to_string());
        }
        if let Some(priority) = self.priority {
            if !(1..=3).contains(&priority) {
                return Err("task.priority must be between 1 and 3".to_string());
            }
        }
        for tag in &self.tags {
            validate_non_empty(tag, "task.tags[]")?;
            if tag.chars().any(char::is_uppercase) {
                return Err("task.tags[] must be lowercase".to_string());
            }
        }
        Ok(())
    }

    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(done) = patch.done {
            self.done = done;
        }
        if let Some(estimate) = patch.estimate_minutes {
            self.estimate_minutes = estimate;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(tags) = &patch.tags {
            self.tags = normalize_tags(tags);
        }
        if let Some(due) = patch.due {
            self.due = due;
        }
        if let Some(pinned) = patch.pinned_today {
            self.pinned_today = pinned;
        }
    }
}

/// Fields accepted when creating a task; unspecified values get product defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub estimate_minutes: Option<u32>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
}

impl NewTask {
    /// Sets `due` from text input; blank input leaves the task undated.
    pub fn with_due_input(mut self, value: &str) -> Result<Self, PlannerError> {
        self.due = parse_optional_due(value)?;
        Ok(self)
    }

    pub fn into_task(self, id: String, created_at: DateTime<Utc>) -> Task {
        Task {
            id,
            title: self.title.trim().to_string(),
            done: false,
            estimate_minutes: self
                .estimate_minutes
                .filter(|minutes| *minutes > 0)
                .unwrap_or(DEFAULT_TASK_ESTIMATE_MINUTES),
            priority: Some(self.priority.unwrap_or(DEFAULT_TASK_PRIORITY)),
            tags: normalize_tags(&self.tags),
            due: self.due,
            pinned_today: false,
            created_at: Some(created_at),
        }
    }
}

/// Partial update sent to the task store. `None` leaves a field untouched;
/// the nested options on `priority` and `due` allow clearing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub done: Option<bool>,
    pub estimate_minutes: Option<u32>,
    pub priority: Option<Option<u8>>,
    pub tags: Option<Vec<String>>,
    pub due: Option<Option<DateTime<Utc>>>,
    pub pinned_today: Option<bool>,
}

impl TaskPatch {
    pub fn done(done: bool) -> Self {
        Self {
            done: Some(done),
            ..Self::default()
        }
    }

    pub fn pinned_today(pinned: bool) -> Self {
        Self {
            pinned_today: Some(pinned),
            ..Self::default()
        }
    }

    /// Due-date change from text input; blank input clears the due date.
    pub fn due_input(value: &str) -> Result<Self, PlannerError> {
        Ok(Self {
            due: Some(parse_optional_due(value)?),
            ..Self::default()
        })
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkItem {
    pub task_id: String,
    pub estimate_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockContent {
    Atomic { task_id: Option<String> },
    Work { items: Vec<WorkItem> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub id: String,
    pub date: NaiveDate,
    pub start_minute: u32,
    pub length_minutes: u32,
    #[serde(flatten)]
    pub content: BlockContent,
}

impl Block {
    pub fn end_minute(&self) -> u32 {
        self.start_minute + self.length_minutes
    }

    pub fn is_work(&self) -> bool {
        matches!(self.content, BlockContent::Work { .. })
    }

    /// Every task this block is bound to, through its atomic task or its work items.
    pub fn task_ids(&self) -> Vec<&str> {
        match &self.content {
            BlockContent::Atomic { task_id } => task_id.as_deref().into_iter().collect(),
            BlockContent::Work { items } => items.iter().map(|item| item.task_id.as_str()).collect(),
        }
    }

    pub fn used_minutes(&self) -> u32 {
        match &self.content {
            BlockContent::Atomic { .. } => 0,
            BlockContent::Work { items } => items.iter().map(|item| item.estimate_minutes).sum(),
        }
    }

    /// Free minutes left in a work block; `None` for atomic blocks.
    pub fn remaining_capacity(&self) -> Option<u32> {
        match self.content {
            BlockContent::Atomic { .. } => None,
            BlockContent::Work { .. } => Some(self.length_minutes.saturating_sub(self.used_minutes())),
        }
    }

    pub fn validate(&self, grid: &SlotGrid) -> Result<(), String> {
        validate_non_empty(&self.id, "block.id")?;
        if self.length_minutes == 0 {
            return Err("block.length_minutes must be > 0".to_string());
        }
        if self.length_minutes % grid.grain() != 0 {
            return Err(format!(
                "block.length_minutes must be a multiple of {}",
                grid.grain()
            ));
        }
        if !grid.bounds.contains(self.start_minute) {
            return Err("block.start_minute must fall within the day window".to_string());
        }
        if self.used_minutes() > self.length_minutes {
            return Err("block work items must fit within block.length_minutes".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

impl TimeWindow {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn validate(&self, field_name: &str) -> Result<(), String> {
        self.bounds()
            .map(|_| ())
            .map_err(|error| format!("{field_name}: {error}"))
    }

    pub fn bounds(&self) -> Result<DayBounds, PlannerError> {
        DayBounds::from_clock(&self.start, &self.end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EstimatePolicy {
    pub default_minutes: u32,
    pub min_minutes: u32,
    pub max_minutes: u32,
}

impl Default for EstimatePolicy {
    fn default() -> Self {
        Self {
            default_minutes: 30,
            min_minutes: 5,
            max_minutes: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub day_window: TimeWindow,
    pub work_hours: TimeWindow,
    pub slot_minutes: u32,
    pub nudge_minutes: u32,
    #[serde(default)]
    pub estimate: EstimatePolicy,
    pub micro_task_minutes: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicyOverride {
    pub day_window: Option<TimeWindow>,
    pub work_hours: Option<TimeWindow>,
    pub slot_minutes: Option<u32>,
    pub nudge_minutes: Option<u32>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            day_window: TimeWindow::new("00:00", "24:00"),
            work_hours: TimeWindow::new("09:00", "17:00"),
            slot_minutes: 15,
            nudge_minutes: 5,
            estimate: EstimatePolicy::default(),
            micro_task_minutes: 15,
        }
    }
}

impl Policy {
    pub fn validate(&self) -> Result<(), String> {
        self.day_window.validate("policy.day_window")?;
        self.work_hours.validate("policy.work_hours")?;
        if self.slot_minutes == 0 {
            return Err("policy.slot_minutes must be > 0".to_string());
        }
        if self.nudge_minutes == 0 {
            return Err("policy.nudge_minutes must be > 0".to_string());
        }
        if self.estimate.min_minutes > self.estimate.max_minutes {
            return Err("policy.estimate.min_minutes must be <= max_minutes".to_string());
        }
        Ok(())
    }

    pub fn slot_grid(&self) -> Result<SlotGrid, PlannerError> {
        self.validate().map_err(PlannerError::InvalidPolicy)?;
        Ok(SlotGrid::new(
            self.day_window.bounds()?,
            self.slot_minutes,
            self.nudge_minutes,
        ))
    }

    pub fn work_bounds(&self) -> Result<DayBounds, PlannerError> {
        self.work_hours.bounds()
    }

    pub fn apply_override(&self, override_policy: &PolicyOverride) -> Policy {
        Policy {
            day_window: override_policy
                .day_window
                .clone()
                .unwrap_or_else(|| self.day_window.clone()),
            work_hours: override_policy
                .work_hours
                .clone()
                .unwrap_or_else(|| self.work_hours.clone()),
            slot_minutes: override_policy.slot_minutes.unwrap_or(self.slot_minutes),
            nudge_minutes: override_policy.nudge_minutes.unwrap_or(self.nudge_minutes),
            estimate: self.estimate.clone(),
            micro_task_minutes: self.micro_task_minutes,
        }
    }
}

/// Accepts an RFC3339 date-time or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_due_input(value: &str) -> Result<DateTime<Utc>, PlannerError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }
    Err(PlannerError::Format(format!(
        "'{value}' must be RFC3339 or YYYY-MM-DD"
    )))
}

fn parse_optional_due(value: &str) -> Result<Option<DateTime<Utc>>, PlannerError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    parse_due_input(value).map(Some)
}

pub fn parse_date(value: &str) -> Result<NaiveDate, PlannerError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|error| PlannerError::Format(format!("date must be YYYY-MM-DD: {error}")))
}

/// Tags are stored trimmed, lowercase and without duplicates, in first-seen order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_task() -> Task {
        Task {
            id: "tsk-1".to_string(),
            title: "Write tests".to_string(),
            done: false,
            estimate_minutes: 30,
            priority: Some(2),
            tags: vec!["focus".to_string()],
            due: Some(fixed_time("2025-09-24T10:00:00Z")),
            pinned_today: false,
            created_at: Some(fixed_time("2025-09-20T08:00:00Z")),
        }
    }

    fn sample_block() -> Block {
        Block {
            id: "blk-1".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 9, 24).expect("valid date"),
            start_minute: 540,
            length_minutes: 60,
            content: BlockContent::Work {
                items: vec![WorkItem {
                    task_id: "tsk-1".to_string(),
                    estimate_minutes: 15,
                }],
            },
        }
    }

    fn grid() -> SlotGrid {
        Policy::default().slot_grid().expect("default policy is valid")
    }

    #[test]
    fn task_validate_rejects_empty_title_and_bad_priority() {
        let mut task = sample_task();
        task.title = "   ".to_string();
        assert!(task.validate().is_err());

        let mut task = sample_task();
        task.priority = Some(4);
        assert!(task.validate().is_err());

        assert!(sample_task().validate().is_ok());
    }

    #[test]
    fn new_task_applies_defaults() {
        let created_at = fixed_time("2025-09-24T07:00:00Z");
        let task = NewTask {
            title: "  Plan the week ".to_string(),
            tags: vec!["Ritual".to_string(), "ritual".to_string(), " ".to_string()],
            ..NewTask::default()
        }
        .into_task("tsk-9".to_string(), created_at);

        assert_eq!(task.title, "Plan the week");
        assert_eq!(task.estimate_minutes, DEFAULT_TASK_ESTIMATE_MINUTES);
        assert_eq!(task.priority, Some(DEFAULT_TASK_PRIORITY));
        assert_eq!(task.tags, vec!["ritual".to_string()]);
        assert_eq!(task.created_at, Some(created_at));
        assert!(!task.done && !task.pinned_today);
    }

    #[test]
    fn task_patch_only_touches_given_fields() {
        let mut task = sample_task();
        task.apply_patch(&TaskPatch {
            due: Some(None),
            pinned_today: Some(true),
            ..TaskPatch::default()
        });
        assert_eq!(task.due, None);
        assert!(task.pinned_today);
        assert_eq!(task.title, "Write tests");
        assert!(TaskPatch::default().is_empty());
    }

    #[test]
    fn due_text_input_sets_or_clears_the_due_date() {
        let task = NewTask {
            title: "File taxes".to_string(),
            ..NewTask::default()
        }
        .with_due_input("2025-09-30")
        .expect("date input");
        assert_eq!(task.due, Some(fixed_time("2025-09-30T00:00:00Z")));

        let blank = NewTask::default().with_due_input("  ").expect("blank input");
        assert_eq!(blank.due, None);

        assert_eq!(
            TaskPatch::due_input("2025-09-30T17:00:00+02:00")
                .expect("datetime input")
                .due,
            Some(Some(fixed_time("2025-09-30T15:00:00Z")))
        );
        assert_eq!(TaskPatch::due_input("").expect("blank input").due, Some(None));
        assert!(matches!(
            TaskPatch::due_input("next tuesday"),
            Err(PlannerError::Format(_))
        ));
    }

    #[test]
    fn block_capacity_and_task_ids() {
        let block = sample_block();
        assert_eq!(block.end_minute(), 600);
        assert_eq!(block.remaining_capacity(), Some(45));
        assert_eq!(block.task_ids(), vec!["tsk-1"]);

        let atomic = Block {
            content: BlockContent::Atomic { task_id: None },
            ..sample_block()
        };
        assert_eq!(atomic.remaining_capacity(), None);
        assert!(atomic.task_ids().is_empty());
    }

    #[test]
    fn block_validate_enforces_invariants() {
        assert!(sample_block().validate(&grid()).is_ok());

        let mut zero = sample_block();
        zero.length_minutes = 0;
        assert!(zero.validate(&grid()).is_err());

        let mut ragged = sample_block();
        ragged.length_minutes = 62;
        assert!(ragged.validate(&grid()).is_err());

        let mut overfull = sample_block();
        overfull.length_minutes = 10;
        assert!(overfull.validate(&grid()).is_err());
    }

    #[test]
    fn parse_due_input_accepts_date_and_datetime() {
        assert_eq!(
            parse_due_input("2025-09-24").expect("date"),
            fixed_time("2025-09-24T00:00:00Z")
        );
        assert_eq!(
            parse_due_input("2025-09-24T23:59:59Z").expect("datetime"),
            fixed_time("2025-09-24T23:59:59Z")
        );
        assert!(parse_due_input("tomorrow").is_err());
        assert_eq!(
            parse_date(" 2025-09-24 ").expect("date"),
            NaiveDate::from_ymd_opt(2025, 9, 24).expect("valid date")
        );
        assert!(matches!(parse_date("24/09/2025"), Err(PlannerError::Format(_))));
    }

    #[test]
    fn policy_validate_rejects_inverted_window() {
        let mut policy = Policy::default();
        assert!(policy.validate().is_ok());
        policy.work_hours = TimeWindow::new("17:00", "09:00");
        assert!(policy.validate().is_err());
        assert!(policy.slot_grid().is_err());
    }

    proptest! {
        #[test]
        fn user_override_values_take_precedence(
            base_slot in 1u32..60u32,
            override_slot in 1u32..60u32,
            base_nudge in 1u32..30u32,
            override_nudge in 1u32..30u32
        ) {
            let mut base = Policy::default();
            base.slot_minutes = base_slot;
            base.nudge_minutes = base_nudge;

            let override_policy = PolicyOverride {
                day_window: None,
                work_hours: Some(TimeWindow::new("08:00", "12:00")),
                slot_minutes: Some(override_slot),
                nudge_minutes: Some(override_nudge),
            };

            let effective = base.apply_override(&override_policy);

            prop_assert_eq!(effective.slot_minutes, override_slot);
            prop_assert_eq!(effective.nudge_minutes, override_nudge);
            prop_assert_eq!(effective.work_hours, TimeWindow::new("08:00", "12:00"));
            prop_assert_eq!(effective.day_window, base.day_window);
        }
    }

    #[test]
    fn domain_models_support_serde_roundtrip() {
        let task = sample_task();
        let block = sample_block();
        let policy = Policy::default();

        let task_roundtrip: Task =
            serde_json::from_str(&serde_json::to_string(&task).expect("serialize task"))
                .expect("deserialize task");
        let block_json = serde_json::to_value(&block).expect("serialize block");
        let block_roundtrip: Block =
            serde_json::from_value(block_json.clone()).expect("deserialize block");
        let policy_roundtrip: Policy =
            serde_json::from_str(&serde_json::to_string(&policy).expect("serialize policy"))
                .expect("deserialize policy");

        assert_eq!(block_json["kind"], "work");
        assert_eq!(block_json["date"], "2025-09-24");
        assert_eq!(task_roundtrip, task);
        assert_eq!(block_roundtrip, block);
        assert_eq!(policy_roundtrip, policy);
    }
}
