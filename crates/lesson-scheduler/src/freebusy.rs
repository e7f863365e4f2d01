//! Compute free wall-clock windows inside an open range, given booked lessons.
//!
//! Sorts busy windows by start time, merges overlapping ones, then computes
//! the gaps between merged windows within the open range.

use crate::time::{LessonWindow, WallTime};

/// Merge overlapping or adjacent busy windows, clipped to `range`.
///
/// Returns a sorted, non-overlapping list.
pub fn merge_busy(busy: &[LessonWindow], range: &LessonWindow) -> Vec<LessonWindow> {
    // Clip to the range, discarding windows entirely outside.
    let mut windows: Vec<LessonWindow> = busy
        .iter()
        .filter(|w| w.start < range.end && w.end > range.start)
        .map(|w| LessonWindow {
            start: w.start.max(range.start),
            end: w.end.min(range.end),
        })
        .collect();

    if windows.is_empty() {
        return Vec::new();
    }

    windows.sort_by_key(|w| (w.start, w.end));

    let mut merged: Vec<LessonWindow> = Vec::new();
    for w in windows {
        if let Some(last) = merged.last_mut() {
            if w.start <= last.end {
                last.end = last.end.max(w.end);
                continue;
            }
        }
        merged.push(w);
    }

    merged
}

/// Gaps inside `range` not covered by any busy window, sorted by start.
pub fn free_windows(busy: &[LessonWindow], range: &LessonWindow) -> Vec<LessonWindow> {
    let merged = merge_busy(busy, range);

    let mut free = Vec::new();
    let mut cursor = range.start;

    for window in &merged {
        if cursor < window.start {
            free.push(LessonWindow {
                start: cursor,
                end: window.start,
            });
        }
        cursor = cursor.max(window.end);
    }

    if cursor < range.end {
        free.push(LessonWindow {
            start: cursor,
            end: range.end,
        });
    }

    free
}

/// Lay back-to-back lessons of `lesson_minutes` into each free window,
/// starting at the window's start. Partial lessons are dropped.
pub fn fill_lessons(free: &[LessonWindow], lesson_minutes: u32) -> Vec<LessonWindow> {
    if lesson_minutes == 0 {
        return Vec::new();
    }
    let mut lessons = Vec::new();
    for window in free {
        let mut start: WallTime = window.start;
        while let Some(end) = start.checked_add_minutes(lesson_minutes) {
            if end > window.end {
                break;
            }
            lessons.push(LessonWindow { start, end });
            start = end;
        }
    }
    lessons
}
