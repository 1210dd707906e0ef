//! Live working copy of scheduled blocks.
//!
//! Overlaps are allowed here; they are only flagged when rendering. Every
//! mutation addressed to an unknown id is a no-op that reports `None`/`false`
//! instead of failing, so stale ids from an in-flight gesture never error out.

use crate::domain::models::{Block, BlockContent, WorkItem};
use crate::domain::time_math::{clamp, clamp_block_start, round_to_step, SlotGrid};
use chrono::NaiveDate;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeEdge {
    Top,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDraft {
    pub date: NaiveDate,
    pub start_minute: i64,
    pub length_minutes: i64,
    pub content: BlockContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitOutcome {
    Split { first: Block, second: Block },
    /// No valid split exists; the block is returned unchanged.
    Unchanged(Block),
}

pub fn next_block_id() -> String {
    format!("blk-{}", Uuid::new_v4())
}

/// Rounds a length to the grid grain, at least one slot and at most the whole day.
pub fn normalize_length(length_minutes: i64, grid: &SlotGrid) -> u32 {
    let grain = i64::from(grid.grain());
    let span = i64::from(grid.bounds.span()) / grain * grain;
    let min = i64::from(grid.slot_minutes).min(span.max(grain));
    let rounded = round_to_step(length_minutes as f64, grid.grain());
    clamp(rounded, min, span.max(min)) as u32
}

/// Grain-aligned start that keeps a block of `length_minutes` inside the day.
pub fn normalize_start(start_minute: i64, length_minutes: u32, grid: &SlotGrid) -> u32 {
    let snapped = round_to_step(start_minute as f64, grid.grain());
    clamp_block_start(snapped, length_minutes, grid)
}

/// Interval produced by dragging one edge of `[start, start + length)` to
/// `boundary`. The opposite edge stays put and the result is never shorter
/// than one slot.
pub fn resized_interval(
    start_minute: u32,
    length_minutes: u32,
    edge: ResizeEdge,
    boundary: i64,
    grid: &SlotGrid,
) -> (u32, u32) {
    let slot = i64::from(grid.slot_minutes);
    let start = i64::from(start_minute);
    let end = start + i64::from(length_minutes);
    let boundary = round_to_step(boundary as f64, grid.grain());

    match edge {
        ResizeEdge::Top => {
            let lo = i64::from(grid.bounds.start_minute);
            let hi = (end - slot).max(lo);
            let new_start = clamp(boundary, lo, hi);
            (new_start as u32, (end - new_start).max(slot) as u32)
        }
        ResizeEdge::Bottom => {
            let lo = start + slot;
            let hi = i64::from(grid.bounds.end_minute).max(lo);
            let new_end = clamp(boundary, lo, hi);
            (start_minute, (new_end - start) as u32)
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockStore {
    grid: SlotGrid,
    blocks: Vec<Block>,
}

impl BlockStore {
    pub fn new(grid: SlotGrid) -> Self {
        Self {
            grid,
            blocks: Vec::new(),
        }
    }

    pub fn grid(&self) -> &SlotGrid {
        &self.grid
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, block_id: &str) -> Option<&Block> {
        self.blocks.iter().find(|block| block.id == block_id)
    }

    /// Blocks on `date`, ascending by start minute.
    pub fn blocks_for_date(&self, date: NaiveDate) -> Vec<Block> {
        let mut blocks = self
            .blocks
            .iter()
            .filter(|block| block.date == date)
            .cloned()
            .collect::<Vec<_>>();
        blocks.sort_by_key(|block| block.start_minute);
        blocks
    }

    /// Replaces everything held for `date` with freshly loaded blocks.
    ///
    /// Rows stored under another grid are snapped onto this one. Rows that
    /// still fail validation are dropped and their ids returned.
    pub fn load_date(&mut self, date: NaiveDate, blocks: Vec<Block>) -> Vec<String> {
        self.blocks.retain(|block| block.date != date);
        let mut rejected = Vec::new();
        for mut block in blocks.into_iter().filter(|block| block.date == date) {
            if block.validate(&self.grid).is_err() {
                block.length_minutes = normalize_length(i64::from(block.length_minutes), &self.grid);
                block.start_minute =
                    normalize_start(i64::from(block.start_minute), block.length_minutes, &self.grid);
            }
            match block.validate(&self.grid) {
                Ok(()) => self.blocks.push(block),
                Err(error) => {
                    log::warn!("skipping stored block_id={} on {date}: {error}", block.id);
                    rejected.push(block.id);
                }
            }
        }
        rejected
    }

    pub fn add_block(&mut self, draft: BlockDraft) -> Block {
        let length_minutes = normalize_length(draft.length_minutes, &self.grid);
        let block = Block {
            id: next_block_id(),
            date: draft.date,
            start_minute: normalize_start(draft.start_minute, length_minutes, &self.grid),
            length_minutes,
            content: draft.content,
        };
        self.blocks.push(block.clone());
        block
    }

    pub fn add_atomic_block(
        &mut self,
        date: NaiveDate,
        start_minute: i64,
        length_minutes: i64,
        task_id: Option<String>,
    ) -> Block {
        self.add_block(BlockDraft {
            date,
            start_minute,
            length_minutes,
            content: BlockContent::Atomic { task_id },
        })
    }

    pub fn add_work_block(&mut self, date: NaiveDate, start_minute: i64, length_minutes: i64) -> Block {
        self.add_block(BlockDraft {
            date,
            start_minute,
            length_minutes,
            content: BlockContent::Work { items: Vec::new() },
        })
    }

    pub fn move_block(&mut self, block_id: &str, new_start_minute: i64) -> Option<Block> {
        let grid = self.grid;
        let block = self.get_mut(block_id)?;
        block.start_minute = normalize_start(new_start_minute, block.length_minutes, &grid);
        Some(block.clone())
    }

    pub fn resize_block(&mut self, block_id: &str, edge: ResizeEdge, boundary_minute: i64) -> Option<Block> {
        let grid = self.grid;
        let block = self.get_mut(block_id)?;
        let (start_minute, length_minutes) =
            resized_interval(block.start_minute, block.length_minutes, edge, boundary_minute, &grid);
        block.start_minute = start_minute;
        block.length_minutes = length_minutes;
        Some(block.clone())
    }

    /// Splits an atomic block of at least two slots into two contiguous halves.
    /// The first half is `length / 2` floored to the grid grain.
    pub fn split_block(&mut self, block_id: &str) -> Option<SplitOutcome> {
        let grain = self.grid.grain();
        let slot = self.grid.slot_minutes;
        let index = self.blocks.iter().position(|block| block.id == block_id)?;
        let original = self.blocks[index].clone();
        if original.is_work() || original.length_minutes < 2 * slot {
            return Some(SplitOutcome::Unchanged(original));
        }

        let first_length = (original.length_minutes / 2) / grain * grain;
        let first = Block {
            length_minutes: first_length,
            ..original.clone()
        };
        let second = Block {
            id: next_block_id(),
            start_minute: original.start_minute + first_length,
            length_minutes: original.length_minutes - first_length,
            ..original
        };
        self.blocks[index] = first.clone();
        self.blocks.insert(index + 1, second.clone());
        Some(SplitOutcome::Split { first, second })
    }

    /// Copies a block to start where the original ends, clamped into the day.
    pub fn duplicate_block(&mut self, block_id: &str) -> Option<Block> {
        let original = self.get(block_id)?.clone();
        let start_minute = clamp_block_start(
            i64::from(original.end_minute()),
            original.length_minutes,
            &self.grid,
        );
        let copy = Block {
            id: next_block_id(),
            start_minute,
            ..original
        };
        self.blocks.push(copy.clone());
        Some(copy)
    }

    pub fn delete_block(&mut self, block_id: &str) -> Option<Block> {
        let index = self.blocks.iter().position(|block| block.id == block_id)?;
        Some(self.blocks.remove(index))
    }

    /// Removes every listed block and returns the ones actually removed.
    pub fn remove_blocks_for_ids(&mut self, block_ids: &[String]) -> Vec<Block> {
        let wanted = block_ids.iter().map(String::as_str).collect::<HashSet<_>>();
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .blocks
            .drain(..)
            .partition(|block| wanted.contains(block.id.as_str()));
        self.blocks = kept;
        removed
    }

    /// Appends to a work block. Capacity is the caller's concern; atomic or
    /// unknown blocks are left alone.
    pub fn add_work_item(&mut self, block_id: &str, item: WorkItem) -> Option<Block> {
        let block = self.get_mut(block_id)?;
        let BlockContent::Work { items } = &mut block.content else {
            return None;
        };
        items.push(item);
        Some(block.clone())
    }

    fn get_mut(&mut self, block_id: &str) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|block| block.id == block_id)
    }
}
