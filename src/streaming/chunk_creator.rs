//! Parallel construction of a region's chunk bounding boxes
//!
//! A run fans out over chunk rows on the rayon pool. Progress and the partial
//! result are readable at any time; cancellation is checked between rows.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use rayon::prelude::*;

use crate::core::types::{UVec2, Vec2, Vec3};
use crate::core::{Error, Result};
use crate::math::Aabb;
use crate::streaming::cancel::CancelToken;
use crate::streaming::chunk::ChunkBox;

/// Everything needed to lay out one region's chunk grid
#[derive(Clone, Debug)]
pub struct ChunkGridInput {
    /// World x/y of the region's minimum corner
    pub origin: Vec2,
    pub chunk_size: f32,
    pub chunks_per_side: u32,
    /// World `(min, max)` height per chunk, row-major
    pub bounds: Vec<(f32, f32)>,
    pub min_height_extent: f32,
}

impl ChunkGridInput {
    pub fn chunk_count(&self) -> usize {
        (self.chunks_per_side * self.chunks_per_side) as usize
    }

    /// Box of chunk `(cx, cy)`, widened vertically about its mid-height when
    /// flatter than `min_height_extent`.
    pub fn chunk_box(&self, cx: u32, cy: u32) -> ChunkBox {
        let index = cy * self.chunks_per_side + cx;
        let (mut lo, mut hi) = self.bounds.get(index as usize).copied().unwrap_or((0.0, 0.0));
        if hi - lo < self.min_height_extent {
            let mid = (lo + hi) * 0.5;
            lo = mid - self.min_height_extent * 0.5;
            hi = mid + self.min_height_extent * 0.5;
        }

        let min_xy = self.origin + Vec2::new(cx as f32, cy as f32) * self.chunk_size;
        let max_xy = min_xy + Vec2::splat(self.chunk_size);
        ChunkBox {
            index,
            grid: UVec2::new(cx, cy),
            aabb: Aabb::new(min_xy.extend(lo), Vec3::new(max_xy.x, max_xy.y, hi)),
        }
    }

    fn row(&self, cy: u32) -> Vec<ChunkBox> {
        (0..self.chunks_per_side).map(|cx| self.chunk_box(cx, cy)).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunStatus {
    Idle,
    Running,
    Complete,
    Cancelled,
    Failed,
}

struct Shared {
    rows_done: AtomicUsize,
    rows_total: AtomicUsize,
    complete: AtomicBool,
    results: Mutex<Vec<ChunkBox>>,
    status: Mutex<RunStatus>,
    finished: Condvar,
}

impl Shared {
    fn new(rows_total: usize) -> Self {
        Self {
            rows_done: AtomicUsize::new(0),
            rows_total: AtomicUsize::new(rows_total),
            complete: AtomicBool::new(false),
            results: Mutex::new(Vec::new()),
            status: Mutex::new(RunStatus::Idle),
            finished: Condvar::new(),
        }
    }

    fn set_status(&self, status: RunStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
        self.finished.notify_all();
    }

    fn status(&self) -> RunStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builds `(2n)^2` chunk boxes in the background
pub struct ChunkCreator {
    shared: Arc<Shared>,
    cancel: CancelToken,
}

impl Default for ChunkCreator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkCreator {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new(0)),
            cancel: CancelToken::new(),
        }
    }

    /// Start a run. A run still in flight is cancelled and waited for first.
    pub fn start(&mut self, input: ChunkGridInput) -> Result<()> {
        if input.chunks_per_side == 0 {
            return Err(Error::InvalidState("chunk grid with zero chunks per side".into()));
        }
        if self.is_running() {
            self.cancel();
            self.wait();
        }

        let shared = Arc::new(Shared::new(input.chunks_per_side as usize));
        shared.set_status(RunStatus::Running);
        self.shared = shared.clone();
        self.cancel = CancelToken::new();
        let cancel = self.cancel.clone();

        rayon::spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| Self::run(&shared, &cancel, &input)));
            match outcome {
                Ok(true) => {
                    shared.complete.store(true, Ordering::Release);
                    shared.set_status(RunStatus::Complete);
                }
                Ok(false) => {
                    log::debug!("Chunk creation cancelled");
                    shared.set_status(RunStatus::Cancelled);
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".into());
                    log::error!("{}", Error::Concurrency(format!("chunk creation panicked: {}", message)));
                    shared.rows_done.store(0, Ordering::Release);
                    shared.complete.store(false, Ordering::Release);
                    shared.results.lock().unwrap_or_else(PoisonError::into_inner).clear();
                    shared.set_status(RunStatus::Failed);
                }
            }
        });
        Ok(())
    }

    /// Returns `false` when cancellation left rows unbuilt.
    fn run(shared: &Shared, cancel: &CancelToken, input: &ChunkGridInput) -> bool {
        let start = std::time::Instant::now();
        (0..input.chunks_per_side).into_par_iter().for_each(|cy| {
            if cancel.is_cancelled() {
                return;
            }
            let row = input.row(cy);
            shared
                .results
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(row);
            shared.rows_done.fetch_add(1, Ordering::AcqRel);
        });

        let done = shared.rows_done.load(Ordering::Acquire) == input.chunks_per_side as usize;
        if done {
            log::debug!(
                "Built {} chunk boxes in {:.2}ms",
                input.chunk_count(),
                start.elapsed().as_secs_f64() * 1000.0
            );
        }
        done
    }

    /// Build synchronously on the calling thread (rayon still fans out).
    pub fn build_blocking(input: &ChunkGridInput) -> Vec<ChunkBox> {
        (0..input.chunks_per_side)
            .into_par_iter()
            .flat_map_iter(|cy| input.row(cy))
            .collect()
    }

    /// Fraction of rows built, exactly `1.0` once complete
    pub fn progress(&self) -> f32 {
        if self.is_complete() {
            return 1.0;
        }
        let total = self.shared.rows_total.load(Ordering::Acquire);
        if total == 0 {
            return 0.0;
        }
        self.shared.rows_done.load(Ordering::Acquire) as f32 / total as f32
    }

    pub fn is_complete(&self) -> bool {
        self.shared.complete.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.shared.status() == RunStatus::Running
    }

    /// Ended without producing a result (cancelled or panicked)
    pub fn is_aborted(&self) -> bool {
        matches!(self.shared.status(), RunStatus::Cancelled | RunStatus::Failed)
    }

    /// All boxes sorted by index, `None` until the run has completed
    pub fn get_result(&self) -> Option<Vec<ChunkBox>> {
        if !self.is_complete() {
            return None;
        }
        Some(self.get_current_result())
    }

    /// Snapshot of the boxes built so far, sorted by index
    pub fn get_current_result(&self) -> Vec<ChunkBox> {
        let mut boxes = self
            .shared
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        boxes.sort_by_key(|b| b.index);
        boxes
    }

    /// Ask the current run to stop after the rows already in flight
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the current run is no longer running
    pub fn wait(&self) {
        let mut status = self.shared.status.lock().unwrap_or_else(PoisonError::into_inner);
        while *status == RunStatus::Running {
            status = self
                .shared
                .finished
                .wait(status)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Forget any previous run. Waits for one in flight.
    pub fn reset(&mut self) {
        if self.is_running() {
            self.cancel();
            self.wait();
        }
        self.shared = Arc::new(Shared::new(0));
        self.cancel = CancelToken::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(n: u32, bounds: Vec<(f32, f32)>) -> ChunkGridInput {
        ChunkGridInput {
            origin: Vec2::new(2000.0, -2000.0),
            chunk_size: 100.0,
            chunks_per_side: n,
            bounds,
            min_height_extent: 1.0,
        }
    }

    #[test]
    fn test_run_completes_with_all_boxes() {
        let mut creator = ChunkCreator::new();
        assert!(creator.get_result().is_none());
        creator.start(input(20, vec![(10.0, 50.0); 400])).unwrap();
        creator.wait();

        assert!(creator.is_complete());
        assert_eq!(creator.progress(), 1.0);
        let boxes = creator.get_result().unwrap();
        assert_eq!(boxes.len(), 400);
        for (i, b) in boxes.iter().enumerate() {
            assert_eq!(b.index as usize, i);
            assert_eq!(b.index, b.grid.y * 20 + b.grid.x);
        }
        assert_eq!(boxes[21].aabb.min, Vec3::new(2100.0, -1900.0, 10.0));
        assert_eq!(boxes[21].aabb.max, Vec3::new(2200.0, -1800.0, 50.0));
    }

    #[test]
    fn test_flat_chunk_widened() {
        let grid = input(2, vec![(5.0, 5.0), (0.0, 10.0), (3.0, 3.5), (1.0, 1.0)]);
        let flat = grid.chunk_box(0, 0);
        assert_eq!(flat.aabb.min.z, 4.5);
        assert_eq!(flat.aabb.max.z, 5.5);
        let tall = grid.chunk_box(1, 0);
        assert_eq!((tall.aabb.min.z, tall.aabb.max.z), (0.0, 10.0));
        let shallow = grid.chunk_box(0, 1);
        assert!((shallow.aabb.max.z - shallow.aabb.min.z - 1.0).abs() < 1e-6);
        assert!((shallow.aabb.center().z - 3.25).abs() < 1e-6);
    }

    #[test]
    fn test_build_blocking_matches_async() {
        let grid = input(6, (0..36).map(|i| (i as f32, i as f32 + 2.0)).collect());
        let mut blocking = ChunkCreator::build_blocking(&grid);
        blocking.sort_by_key(|b| b.index);

        let mut creator = ChunkCreator::new();
        creator.start(grid).unwrap();
        creator.wait();
        assert_eq!(creator.get_result().unwrap(), blocking);
    }

    #[test]
    fn test_cancel_before_start_of_rows() {
        let mut creator = ChunkCreator::new();
        creator.start(input(20, vec![(0.0, 1.0); 400])).unwrap();
        creator.cancel();
        creator.wait();
        // Either it finished before seeing the flag or it stopped early
        if creator.is_complete() {
            assert_eq!(creator.get_result().unwrap().len(), 400);
        } else {
            assert!(creator.get_result().is_none());
            assert!(creator.get_current_result().len() < 400);
            assert!(creator.is_aborted());
        }
    }

    #[test]
    fn test_zero_grid_rejected() {
        let mut creator = ChunkCreator::new();
        assert!(creator.start(input(0, Vec::new())).is_err());
        assert!(!creator.is_running());
    }

    #[test]
    fn test_reset_clears_result() {
        let mut creator = ChunkCreator::new();
        creator.start(input(4, vec![(0.0, 1.0); 16])).unwrap();
        creator.wait();
        assert!(creator.is_complete());
        creator.reset();
        assert!(!creator.is_complete());
        assert_eq!(creator.progress(), 0.0);
        assert!(creator.get_current_result().is_empty());
    }
}
