//! Conversions between clock strings, minutes-since-midnight, grid pixels and
//! snapped slot boundaries. Everything here is pure.

use crate::domain::error::PlannerError;
use serde::{Deserialize, Serialize};

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// A half-open `[start_minute, end_minute)` window inside one day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayBounds {
    pub start_minute: u32,
    pub end_minute: u32,
}

impl DayBounds {
    pub fn new(start_minute: u32, end_minute: u32) -> Result<Self, PlannerError> {
        if end_minute > MINUTES_PER_DAY {
            return Err(PlannerError::InvalidPolicy(format!(
                "day window end {end_minute} exceeds {MINUTES_PER_DAY}"
            )));
        }
        if end_minute <= start_minute {
            return Err(PlannerError::InvalidPolicy(format!(
                "day window end {end_minute} must be after start {start_minute}"
            )));
        }
        Ok(Self {
            start_minute,
            end_minute,
        })
    }

    pub fn from_clock(start: &str, end: &str) -> Result<Self, PlannerError> {
        Self::new(parse_clock(start)?, parse_clock(end)?)
    }

    pub fn span(&self) -> u32 {
        self.end_minute.saturating_sub(self.start_minute)
    }

    pub fn contains(&self, minute: u32) -> bool {
        minute >= self.start_minute && minute < self.end_minute
    }
}

/// Slot configuration for one product surface. Different surfaces may use
/// different granularities, so nothing below assumes a global slot size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotGrid {
    pub bounds: DayBounds,
    pub slot_minutes: u32,
    pub nudge_minutes: u32,
}

impl SlotGrid {
    pub fn new(bounds: DayBounds, slot_minutes: u32, nudge_minutes: u32) -> Self {
        Self {
            bounds,
            slot_minutes: slot_minutes.max(1),
            nudge_minutes: nudge_minutes.max(1),
        }
    }

    /// Snap step for a gesture: the fine nudge when a modifier is held.
    pub fn step(&self, fine: bool) -> u32 {
        if fine {
            self.nudge_minutes
        } else {
            self.slot_minutes
        }
    }

    /// Finest length unit a committed block may take.
    pub fn grain(&self) -> u32 {
        gcd(self.slot_minutes, self.nudge_minutes)
    }

    pub fn total_slots(&self) -> u32 {
        self.bounds.span() / self.slot_minutes
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PixelScale {
    /// Explicit pixel height of one slot.
    PerSlot(f64),
    /// Total rendered height of the grid; pixels per slot is derived from it.
    ScrollHeight(f64),
}

/// Read-only snapshot of the rendering surface, captured once per gesture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridMetrics {
    pub top_px: f64,
    pub scroll_top_px: f64,
    pub grid: SlotGrid,
    pub scale: PixelScale,
}

impl GridMetrics {
    pub fn pixels_per_slot(&self) -> f64 {
        match self.scale {
            PixelScale::PerSlot(pixels) => pixels,
            PixelScale::ScrollHeight(height) => {
                let total_slots = self.grid.total_slots();
                if total_slots == 0 {
                    return 0.0;
                }
                height / f64::from(total_slots)
            }
        }
    }

    /// Grid-relative minute under a pointer given in client coordinates.
    pub fn pointer_to_minutes(&self, client_y: f64) -> f64 {
        pixel_offset_to_minutes(client_y - self.top_px + self.scroll_top_px, self)
    }
}

pub fn parse_clock(text: &str) -> Result<u32, PlannerError> {
    let malformed = || PlannerError::Format(format!("'{text}' must be HH:MM"));
    let value = text.trim();
    let (hour_str, minute_str) = value.split_once(':').ok_or_else(malformed)?;
    if hour_str.is_empty() || hour_str.len() > 2 || minute_str.len() != 2 {
        return Err(malformed());
    }
    if !hour_str.bytes().chain(minute_str.bytes()).all(|byte| byte.is_ascii_digit()) {
        return Err(malformed());
    }

    let hour = hour_str.parse::<u32>().map_err(|_| malformed())?;
    let minute = minute_str.parse::<u32>().map_err(|_| malformed())?;
    // 24:00 is accepted as the end-of-day boundary.
    if hour == 24 && minute == 0 {
        return Ok(MINUTES_PER_DAY);
    }
    if hour > 23 || minute > 59 {
        return Err(malformed());
    }
    Ok(hour * 60 + minute)
}

pub fn format_clock_24(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn format_clock_12(minutes: u32) -> String {
    let hour = (minutes / 60) % 24;
    let minute = minutes % 60;
    let period = if hour >= 12 { "PM" } else { "AM" };
    let display_hour = match hour % 12 {
        0 => 12,
        other => other,
    };
    format!("{display_hour}:{minute:02} {period}")
}

/// Boundary check for user-supplied durations, which are never coerced.
pub fn positive_duration(minutes: i64) -> Result<u32, PlannerError> {
    if minutes <= 0 {
        return Err(PlannerError::InvalidDuration(minutes));
    }
    u32::try_from(minutes).map_err(|_| PlannerError::InvalidDuration(minutes))
}

/// Nearest multiple of `step`; halves round up.
pub fn round_to_step(minutes: f64, step: u32) -> i64 {
    if step == 0 {
        return minutes.round() as i64;
    }
    let step = f64::from(step);
    ((minutes / step).round() * step) as i64
}

pub fn clamp<T: PartialOrd>(value: T, lo: T, hi: T) -> T {
    if value < lo {
        lo
    } else if value > hi {
        hi
    } else {
        value
    }
}

pub fn minutes_to_pixel_offset(minutes: f64, metrics: &GridMetrics) -> f64 {
    let slots_from_top =
        (minutes - f64::from(metrics.grid.bounds.start_minute)) / f64::from(metrics.grid.slot_minutes);
    slots_from_top * metrics.pixels_per_slot()
}

pub fn pixel_offset_to_minutes(pixels: f64, metrics: &GridMetrics) -> f64 {
    let day_start = f64::from(metrics.grid.bounds.start_minute);
    let pixels_per_slot = metrics.pixels_per_slot();
    if pixels_per_slot <= 0.0 {
        return day_start;
    }
    day_start + (pixels / pixels_per_slot) * f64::from(metrics.grid.slot_minutes)
}

/// Clamps a start so that `[start, start + max(length, slot))` stays inside the day.
pub fn clamp_block_start(start_minutes: i64, length_minutes: u32, grid: &SlotGrid) -> u32 {
    let lo = i64::from(grid.bounds.start_minute);
    let hi = i64::from(grid.bounds.end_minute) - i64::from(length_minutes.max(grid.slot_minutes));
    if hi < lo {
        return grid.bounds.start_minute;
    }
    clamp(start_minutes, lo, hi) as u32
}

fn gcd(mut left: u32, mut right: u32) -> u32 {
    while right != 0 {
        let remainder = left % right;
        left = right;
        right = remainder;
    }
    left.max(1)
}
