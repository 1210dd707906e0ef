//! Scheduling and layout core for the Cadence daily planner: time blocks on a
//! minute grid, conflict detection, drag interpretation, auto-placement of
//! tasks into free gaps, today membership and backlog ranking.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::planner_service::{open_workspace, DragPreview, PlannerService, SqlitePlannerService};
pub use domain::block_store::{BlockDraft, BlockStore, ResizeEdge, SplitOutcome};
pub use domain::drag::{
    DragInterpreter, DragMode, DragOutcome, DragTarget, DropTarget, Modifiers, PointerPosition,
};
pub use domain::error::PlannerError;
pub use domain::models::{Block, BlockContent, NewTask, Policy, PolicyOverride, Task, TaskPatch, WorkItem};
pub use domain::scheduler::{AutoPlacer, BatchPlacement, Placement};
pub use domain::time_math::{DayBounds, GridMetrics, PixelScale, SlotGrid};
pub use domain::today::{TodayEntry, TodayOrigin};
pub use infrastructure::error::InfraError;
