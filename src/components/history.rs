#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::mpsc::{self, TryRecvError};

use crate::bake::DEFAULT_MAX_DIMENSION;
use crate::components::snapshot::ProjectSnapshot;
use crate::error::DecodeError;
use crate::ops::text::FontCache;
use crate::project::{Figure, Project};

// ============================================================================
// RESTORE STATUS
// ============================================================================

/// Outcome of polling an in-flight undo/redo.
#[derive(Debug)]
pub enum RestoreStatus {
    /// Nothing was in flight.
    Idle,
    /// The rehydration job has not finished yet.
    Pending,
    /// The restored state has been installed into the project.
    Applied,
    /// A panel failed to re-bake; the stacks were rolled back and the
    /// project left untouched.
    Failed(DecodeError),
}

impl RestoreStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, RestoreStatus::Pending)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

struct PendingRestore {
    direction: Direction,
    active_figure_index: usize,
    rx: mpsc::Receiver<Result<Vec<Figure>, DecodeError>>,
}

// ============================================================================
// HISTORY MANAGER - Snapshot-based undo/redo with async rehydration
// ============================================================================

/// Undo/redo history over whole-project snapshots.
///
/// The top of `undo_stack` is always the current state, so undo needs at
/// least two entries. Restores re-bake every panel on the rayon pool; while
/// one is in flight `is_restoring` is set, commits are ignored, and further
/// undo/redo requests are refused.
pub struct HistoryManager {
    undo_stack: VecDeque<ProjectSnapshot>,
    redo_stack: VecDeque<ProjectSnapshot>,
    max_history_size: usize,
    is_restoring: bool,
    pending: Option<PendingRestore>,
    fonts: Arc<FontCache>,
    max_dimension: u32,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(30, FontCache::system().shared())
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize, fonts: Arc<FontCache>) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(2),
            is_restoring: false,
            pending: None,
            fonts,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    /// Record the state of `project` after a mutation.
    ///
    /// Returns `false` (and records nothing) while a restore is in flight.
    pub fn commit(&mut self, project: &Project) -> bool {
        if self.is_restoring {
            tracing::trace!("commit suppressed during restore");
            return false;
        }
        self.redo_stack.clear();
        self.undo_stack.push_back(ProjectSnapshot::capture(project));
        self.prune();
        true
    }

    /// Drop all history and record `project` as the new baseline.
    pub fn reset(&mut self, project: &Project) {
        self.clear();
        self.undo_stack.push_back(ProjectSnapshot::capture(project));
    }

    /// Start restoring the previous state. Returns `false` when there is
    /// nothing to undo or a restore is already running.
    pub fn undo(&mut self) -> bool {
        if self.is_restoring || self.undo_stack.len() < 2 {
            return false;
        }
        let Some(current) = self.undo_stack.pop_back() else { return false };
        self.redo_stack.push_back(current);
        let Some(target) = self.undo_stack.back().cloned() else { return false };
        self.spawn_restore(target, Direction::Undo);
        true
    }

    /// Start re-applying the most recently undone state.
    pub fn redo(&mut self) -> bool {
        if self.is_restoring {
            return false;
        }
        let Some(target) = self.redo_stack.pop_back() else { return false };
        self.undo_stack.push_back(target.clone());
        self.spawn_restore(target, Direction::Redo);
        true
    }

    fn spawn_restore(&mut self, target: ProjectSnapshot, direction: Direction) {
        // Flag first so nothing committed before the job lands is recorded.
        self.is_restoring = true;
        let (tx, rx) = mpsc::channel();
        let fonts = self.fonts.clone();
        let max_dimension = self.max_dimension;
        let active_figure_index = target.active_figure_index;
        tracing::debug!(?direction, panels = target.panel_count(), "restoring snapshot");
        rayon::spawn(move || {
            let _ = tx.send(target.rebuild(&fonts, max_dimension));
        });
        self.pending = Some(PendingRestore { direction, active_figure_index, rx });
    }

    /// Non-blocking: install a finished restore into `project`.
    pub fn poll(&mut self, project: &mut Project) -> RestoreStatus {
        let Some(pending) = &self.pending else { return RestoreStatus::Idle };
        let received = match pending.rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return RestoreStatus::Pending,
            Err(TryRecvError::Disconnected) => {
                Err(DecodeError::new("<history>", "restore worker exited without a result"))
            }
        };
        self.settle(project, received)
    }

    /// Block until the in-flight restore (if any) has settled.
    pub fn finish_restore(&mut self, project: &mut Project) -> RestoreStatus {
        let Some(pending) = &self.pending else { return RestoreStatus::Idle };
        let received = pending
            .rx
            .recv()
            .unwrap_or_else(|_| Err(DecodeError::new("<history>", "restore worker exited without a result")));
        self.settle(project, received)
    }

    fn settle(&mut self, project: &mut Project, received: Result<Vec<Figure>, DecodeError>) -> RestoreStatus {
        let Some(pending) = self.pending.take() else { return RestoreStatus::Idle };
        let status = match received {
            Ok(figures) => {
                project.figures = figures;
                project.active_figure_index =
                    pending.active_figure_index.min(project.figures.len().saturating_sub(1));
                project.mark_dirty();
                RestoreStatus::Applied
            }
            Err(e) => {
                tracing::warn!("{:?} failed, history rolled back: {}", pending.direction, e);
                self.roll_back(pending.direction);
                RestoreStatus::Failed(e)
            }
        };
        self.is_restoring = false;
        status
    }

    fn roll_back(&mut self, direction: Direction) {
        match direction {
            Direction::Undo => {
                if let Some(s) = self.redo_stack.pop_back() {
                    self.undo_stack.push_back(s);
                }
            }
            Direction::Redo => {
                if let Some(s) = self.undo_stack.pop_back() {
                    self.redo_stack.push_back(s);
                }
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.is_restoring && self.undo_stack.len() >= 2
    }

    pub fn can_redo(&self) -> bool {
        !self.is_restoring && !self.redo_stack.is_empty()
    }

    pub fn is_restoring(&self) -> bool {
        self.is_restoring
    }

    /// Prune old snapshots to stay within the limit
    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            self.undo_stack.pop_front();
        }
    }

    pub fn set_max_history_size(&mut self, max: usize) {
        self.max_history_size = max.max(2);
        self.prune();
    }

    pub fn max_history_size(&self) -> usize {
        self.max_history_size
    }

    /// Drop every snapshot. An in-flight restore is abandoned.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.pending = None;
        self.is_restoring = false;
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// The snapshot that represents the current state.
    pub fn current(&self) -> Option<&ProjectSnapshot> {
        self.undo_stack.back()
    }
}
