//! Session-scoped staging of unsaved association edits.
//!
//! # Responsibility
//! - Record pending additions/removals toggled by one editing session.
//! - Answer what a save would add or remove relative to the session baseline.
//!
//! # Invariants
//! - At most one staged change per course.
//! - Toggling the same course twice returns it to neutral.
//! - Removing a staged addition erases it; it never becomes a removal.
//! - Staging order is preserved for additions.
//! - Nothing here is persisted; dropping the buffer discards every edit.

use crate::model::course::CourseId;
use crate::model::template::StagedChange;
use std::collections::{BTreeSet, HashSet};

/// Effect of one toggle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    StagedAdd,
    StagedRemove,
    /// A previously staged change was withdrawn.
    Cancelled,
    /// Nothing to do for this course.
    Unchanged,
}

/// Pending edits for one template, relative to a persisted baseline.
#[derive(Debug, Clone, Default)]
pub struct StagingBuffer {
    baseline: HashSet<CourseId>,
    entries: Vec<(CourseId, StagedChange)>,
}

impl StagingBuffer {
    /// Creates an empty buffer over the currently associated course ids.
    pub fn new(baseline: impl IntoIterator<Item = CourseId>) -> Self {
        Self {
            baseline: baseline.into_iter().collect(),
            entries: Vec::new(),
        }
    }

    /// Toggle from the candidate ("to be added") view.
    pub fn toggle_add(&mut self, course_id: CourseId) -> ToggleOutcome {
        if self.unstage(course_id).is_some() {
            return ToggleOutcome::Cancelled;
        }
        if self.baseline.contains(&course_id) {
            self.entries.push((course_id, StagedChange::PendingRemove));
            ToggleOutcome::StagedRemove
        } else {
            self.entries.push((course_id, StagedChange::PendingAdd));
            ToggleOutcome::StagedAdd
        }
    }

    /// Toggle from the current-associations view.
    pub fn toggle_remove(&mut self, course_id: CourseId) -> ToggleOutcome {
        if self.unstage(course_id).is_some() {
            return ToggleOutcome::Cancelled;
        }
        if self.baseline.contains(&course_id) {
            self.entries.push((course_id, StagedChange::PendingRemove));
            return ToggleOutcome::StagedRemove;
        }
        ToggleOutcome::Unchanged
    }

    /// Requests that `course_id` ends up associated. Never toggles back.
    ///
    /// Withdraws a staged removal; stages an addition only for courses
    /// outside the baseline.
    pub fn stage_add(&mut self, course_id: CourseId) -> ToggleOutcome {
        match self.staged(course_id) {
            Some(StagedChange::PendingAdd) => ToggleOutcome::Unchanged,
            Some(StagedChange::PendingRemove) => self.toggle_add(course_id),
            None if self.baseline.contains(&course_id) => ToggleOutcome::Unchanged,
            None => self.toggle_add(course_id),
        }
    }

    /// Requests that `course_id` ends up unassociated. Never toggles back.
    pub fn stage_remove(&mut self, course_id: CourseId) -> ToggleOutcome {
        match self.staged(course_id) {
            Some(StagedChange::PendingRemove) => ToggleOutcome::Unchanged,
            Some(StagedChange::PendingAdd) | None => self.toggle_remove(course_id),
        }
    }

    /// Courses staged for addition, in staging order.
    pub fn pending_additions(&self) -> Vec<CourseId> {
        self.ids_with(StagedChange::PendingAdd).collect()
    }

    /// Courses staged for removal.
    pub fn pending_removals(&self) -> BTreeSet<CourseId> {
        self.ids_with(StagedChange::PendingRemove).collect()
    }

    pub fn staged(&self, course_id: CourseId) -> Option<StagedChange> {
        self.entries
            .iter()
            .find(|(id, _)| *id == course_id)
            .map(|(_, change)| *change)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drops every staged change; the baseline is kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replaces the baseline after a re-fetch.
    ///
    /// Staged changes that no longer change anything are dropped: additions of
    /// courses now associated and removals of courses no longer associated.
    pub fn rebase(&mut self, baseline: impl IntoIterator<Item = CourseId>) {
        self.baseline = baseline.into_iter().collect();
        let baseline = &self.baseline;
        self.entries.retain(|(id, change)| match change {
            StagedChange::PendingAdd => !baseline.contains(id),
            StagedChange::PendingRemove => baseline.contains(id),
        });
    }

    fn unstage(&mut self, course_id: CourseId) -> Option<StagedChange> {
        let index = self.entries.iter().position(|(id, _)| *id == course_id)?;
        Some(self.entries.remove(index).1)
    }

    fn ids_with(&self, wanted: StagedChange) -> impl Iterator<Item = CourseId> + '_ {
        self.entries
            .iter()
            .filter(move |(_, change)| *change == wanted)
            .map(|(id, _)| *id)
    }
}
