//! Pointer drag state machine over the block store.
//!
//! Events arrive as abstract start/move/end/cancel calls carrying a pointer
//! position and modifier flags. The grid metrics captured at start are used
//! for every later move of the same gesture, and a gesture commits at most
//! one store mutation, on end.

use crate::domain::block_store::{resized_interval, BlockDraft, BlockStore, ResizeEdge};
use crate::domain::models::{Block, BlockContent, EstimatePolicy};
use crate::domain::scheduler::{normalize_estimate, PREVIEW_BLOCK_ID};
use crate::domain::time_math::{clamp, clamp_block_start, round_to_step, GridMetrics};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Modifiers {
    /// Snap to the fine nudge instead of the slot.
    pub fine: bool,
}

/// What the pointer went down on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DragTarget {
    BlockBody { block_id: String },
    BlockTopHandle { block_id: String },
    BlockBottomHandle { block_id: String },
    EmptyGrid { date: NaiveDate },
    UnplacedTask {
        task_id: String,
        estimate_minutes: u32,
        date: NaiveDate,
    },
}

/// Where the pointer is released, or hovering during a move.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DropTarget {
    Grid,
    RemoveTray,
    Outside,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DragMode {
    CreatingNewBlock,
    MovingBlock,
    ResizingTop,
    ResizingBottom,
    DraggingUnplacedTask,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DragOutcome {
    Created { block: Block },
    Updated { block: Block },
    Removed { block: Block },
    Nothing,
}

#[derive(Debug, Clone)]
enum DragKind {
    CreatingNewBlock { date: NaiveDate, anchor_minute: u32 },
    MovingBlock { original: Block, grab_offset: f64 },
    ResizingTop { original: Block },
    ResizingBottom { original: Block },
    DraggingUnplacedTask {
        task_id: String,
        date: NaiveDate,
        length_minutes: u32,
    },
}

impl DragKind {
    fn mode(&self) -> DragMode {
        match self {
            Self::CreatingNewBlock { .. } => DragMode::CreatingNewBlock,
            Self::MovingBlock { .. } => DragMode::MovingBlock,
            Self::ResizingTop { .. } => DragMode::ResizingTop,
            Self::ResizingBottom { .. } => DragMode::ResizingBottom,
            Self::DraggingUnplacedTask { .. } => DragMode::DraggingUnplacedTask,
        }
    }
}

#[derive(Debug, Clone)]
struct DragSession {
    metrics: GridMetrics,
    kind: DragKind,
    preview: Option<Block>,
}

#[derive(Debug, Clone, Default)]
enum DragState {
    #[default]
    Idle,
    Dragging(DragSession),
}

#[derive(Debug, Clone, Default)]
pub struct DragInterpreter {
    estimate: EstimatePolicy,
    state: DragState,
}

impl DragInterpreter {
    pub fn new(estimate: EstimatePolicy) -> Self {
        Self {
            estimate,
            state: DragState::Idle,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    pub fn mode(&self) -> Option<DragMode> {
        match &self.state {
            DragState::Idle => None,
            DragState::Dragging(session) => Some(session.kind.mode()),
        }
    }

    /// Transient block to render for the gesture in flight.
    pub fn preview(&self) -> Option<&Block> {
        match &self.state {
            DragState::Idle => None,
            DragState::Dragging(session) => session.preview.as_ref(),
        }
    }

    /// Classifies the target and captures `metrics` for the whole gesture.
    /// Returns `false` (staying idle) when the target block no longer exists.
    pub fn start(
        &mut self,
        target: DragTarget,
        pointer: PointerPosition,
        metrics: GridMetrics,
        store: &BlockStore,
    ) -> bool {
        if self.is_dragging() {
            log::debug!("drag restarted before the previous gesture ended");
            self.cancel();
        }

        let grid = metrics.grid;
        let pointer_minute = metrics.pointer_to_minutes(pointer.y);
        let (kind, preview) = match target {
            DragTarget::BlockBody { block_id } => {
                let Some(original) = store.get(&block_id).cloned() else {
                    return false;
                };
                let grab_offset = pointer_minute - f64::from(original.start_minute);
                let preview = Some(original.clone());
                (
                    DragKind::MovingBlock {
                        original,
                        grab_offset,
                    },
                    preview,
                )
            }
            DragTarget::BlockTopHandle { block_id } => {
                let Some(original) = store.get(&block_id).cloned() else {
                    return false;
                };
                let preview = Some(original.clone());
                (DragKind::ResizingTop { original }, preview)
            }
            DragTarget::BlockBottomHandle { block_id } => {
                let Some(original) = store.get(&block_id).cloned() else {
                    return false;
                };
                let preview = Some(original.clone());
                (DragKind::ResizingBottom { original }, preview)
            }
            DragTarget::EmptyGrid { date } => {
                let snapped = round_to_step(pointer_minute, grid.slot_minutes);
                let anchor_minute = clamp_block_start(snapped, grid.slot_minutes, &grid);
                let preview = Some(draft_preview(
                    date,
                    anchor_minute,
                    grid.slot_minutes,
                    None,
                ));
                (
                    DragKind::CreatingNewBlock {
                        date,
                        anchor_minute,
                    },
                    preview,
                )
            }
            DragTarget::UnplacedTask {
                task_id,
                estimate_minutes,
                date,
            } => {
                let length_minutes =
                    normalize_estimate(estimate_minutes, grid.slot_minutes, &self.estimate);
                (
                    DragKind::DraggingUnplacedTask {
                        task_id,
                        date,
                        length_minutes,
                    },
                    None,
                )
            }
        };

        self.state = DragState::Dragging(DragSession {
            metrics,
            kind,
            preview,
        });
        true
    }

    /// Recomputes the preview for a pointer move. `over` only matters for an
    /// unplaced task, which previews solely while hovering the grid.
    pub fn move_to(
        &mut self,
        pointer: PointerPosition,
        modifiers: Modifiers,
        over: Option<DropTarget>,
    ) -> Option<&Block> {
        let DragState::Dragging(session) = &mut self.state else {
            return None;
        };

        let metrics = session.metrics;
        let grid = metrics.grid;
        let step = grid.step(modifiers.fine);
        let current = metrics.pointer_to_minutes(pointer.y);
        let slot = i64::from(grid.slot_minutes);

        session.preview = match &session.kind {
            DragKind::CreatingNewBlock {
                date,
                anchor_minute,
            } => {
                let anchor = i64::from(*anchor_minute);
                let end = clamp(
                    round_to_step(current, step),
                    anchor + slot,
                    i64::from(grid.bounds.end_minute).max(anchor + slot),
                );
                Some(draft_preview(*date, *anchor_minute, (end - anchor) as u32, None))
            }
            DragKind::MovingBlock {
                original,
                grab_offset,
            } => {
                let start = round_to_step(current - grab_offset, step);
                Some(Block {
                    start_minute: clamp_block_start(start, original.length_minutes, &grid),
                    ..original.clone()
                })
            }
            DragKind::ResizingTop { original } => {
                Some(resized_preview(original, ResizeEdge::Top, current, step, &metrics))
            }
            DragKind::ResizingBottom { original } => {
                Some(resized_preview(original, ResizeEdge::Bottom, current, step, &metrics))
            }
            DragKind::DraggingUnplacedTask {
                task_id,
                date,
                length_minutes,
            } => (over == Some(DropTarget::Grid)).then(|| {
                let start = round_to_step(current, step);
                draft_preview(
                    *date,
                    clamp_block_start(start, *length_minutes, &grid),
                    *length_minutes,
                    Some(task_id.clone()),
                )
            }),
        };

        session.preview.as_ref()
    }

    /// Commits the gesture and returns to idle whatever the outcome. Only a
    /// release over the grid commits a new or updated block; a release over
    /// the remove tray deletes the dragged block.
    pub fn end(&mut self, drop: DropTarget, store: &mut BlockStore) -> DragOutcome {
        let DragState::Dragging(session) = std::mem::take(&mut self.state) else {
            return DragOutcome::Nothing;
        };

        let outcome = match (session.kind, drop) {
            (DragKind::MovingBlock { original, .. }, DropTarget::RemoveTray)
            | (DragKind::ResizingTop { original }, DropTarget::RemoveTray)
            | (DragKind::ResizingBottom { original }, DropTarget::RemoveTray) => store
                .delete_block(&original.id)
                .map(|block| DragOutcome::Removed { block }),
            (_, DropTarget::RemoveTray | DropTarget::Outside) => None,
            (DragKind::CreatingNewBlock { .. }, DropTarget::Grid)
            | (DragKind::DraggingUnplacedTask { .. }, DropTarget::Grid) => {
                session.preview.map(|preview| DragOutcome::Created {
                    block: store.add_block(BlockDraft {
                        date: preview.date,
                        start_minute: i64::from(preview.start_minute),
                        length_minutes: i64::from(preview.length_minutes),
                        content: preview.content,
                    }),
                })
            }
            (DragKind::MovingBlock { original, .. }, DropTarget::Grid) => session
                .preview
                .and_then(|preview| store.move_block(&original.id, i64::from(preview.start_minute)))
                .map(|block| DragOutcome::Updated { block }),
            (DragKind::ResizingTop { original }, DropTarget::Grid) => session
                .preview
                .and_then(|preview| {
                    store.resize_block(&original.id, ResizeEdge::Top, i64::from(preview.start_minute))
                })
                .map(|block| DragOutcome::Updated { block }),
            (DragKind::ResizingBottom { original }, DropTarget::Grid) => session
                .preview
                .and_then(|preview| {
                    store.resize_block(&original.id, ResizeEdge::Bottom, i64::from(preview.end_minute()))
                })
                .map(|block| DragOutcome::Updated { block }),
        };

        let outcome = outcome.unwrap_or(DragOutcome::Nothing);
        log::debug!("drag ended over {drop:?}: {outcome:?}");
        outcome
    }

    /// Drops all transient state without touching the store. Safe to repeat.
    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }
}

fn draft_preview(
    date: NaiveDate,
    start_minute: u32,
    length_minutes: u32,
    task_id: Option<String>,
) -> Block {
    Block {
        id: PREVIEW_BLOCK_ID.to_string(),
        date,
        start_minute,
        length_minutes,
        content: BlockContent::Atomic { task_id },
    }
}

fn resized_preview(
    original: &Block,
    edge: ResizeEdge,
    current_minute: f64,
    step: u32,
    metrics: &GridMetrics,
) -> Block {
    let boundary = round_to_step(current_minute, step);
    let (start_minute, length_minutes) = resized_interval(
        original.start_minute,
        original.length_minutes,
        edge,
        boundary,
        &metrics.grid,
    );
    Block {
        start_minute,
        length_minutes,
        ..original.clone()
    }
}
