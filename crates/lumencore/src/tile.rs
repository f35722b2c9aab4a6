//! # Tile repository
//!
//! Partitions a film region into fixed-size tiles and hands them out to
//! worker threads in a ring pattern from the center outward, so the part of
//! the image a user is most likely looking at converges first. The only
//! shared mutable state is the tile queue itself, behind one
//! `parking_lot::Mutex` — matching the concurrency model's "single mutex per
//! piece of shared state" rule (see [`crate::scene::Scene`]'s edit-state
//! gate for the same pattern applied to scene mutation).

use parking_lot::Mutex;

pub const DEFAULT_TILE_SIZE: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct Tile {
    pub coord: TileCoord,
    pub samples_taken: u64,
    pub done: bool,
}

/// Lay `width x height` out into `tile_size`-square tiles (the last row/
/// column may be smaller), ordered by Chebyshev distance from the region's
/// center so the repository can hand them out ring-outward.
fn build_tiles(width: u32, height: u32, tile_size: u32) -> Vec<Tile> {
    let cols = width.div_ceil(tile_size);
    let rows = height.div_ceil(tile_size);
    let mut coords = Vec::with_capacity((cols * rows) as usize);
    for ty in 0..rows {
        for tx in 0..cols {
            let x = tx * tile_size;
            let y = ty * tile_size;
            let w = tile_size.min(width - x);
            let h = tile_size.min(height - y);
            coords.push(TileCoord { x, y, width: w, height: h });
        }
    }
    let center = (cols as f32 / 2.0, rows as f32 / 2.0);
    coords.sort_by(|a, b| {
        let da = ring_distance(a, tile_size, center);
        let db = ring_distance(b, tile_size, center);
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });
    coords.into_iter().map(|coord| Tile { coord, samples_taken: 0, done: false }).collect()
}

fn ring_distance(coord: &TileCoord, tile_size: u32, center: (f32, f32)) -> f32 {
    let tx = coord.x as f32 / tile_size as f32;
    let ty = coord.y as f32 / tile_size as f32;
    (tx - center.0).abs().max((ty - center.1).abs())
}

struct RepositoryState {
    tiles: Vec<Tile>,
    /// Index into `tiles` of the next candidate to hand out; wraps to 0 and
    /// advances `pass` once every tile has been visited this pass.
    cursor: usize,
    pass: u64,
    max_passes: Option<u64>,
}

/// Shared, lock-protected tile queue. Workers call [`TileRepository::pull`]
/// and [`TileRepository::mark_done`]; both take the single internal mutex
/// just long enough to update the vector, never while tracing rays.
pub struct TileRepository {
    state: Mutex<RepositoryState>,
}

impl TileRepository {
    pub fn new(width: u32, height: u32, tile_size: u32, max_passes: Option<u64>) -> Self {
        TileRepository {
            state: Mutex::new(RepositoryState { tiles: build_tiles(width, height, tile_size), cursor: 0, pass: 0, max_passes }),
        }
    }

    pub fn tile_count(&self) -> usize {
        self.state.lock().tiles.len()
    }

    pub fn current_pass(&self) -> u64 {
        self.state.lock().pass
    }

    /// Pull the next tile to render: `(tile_index, coord, pass)`. Returns
    /// `None` once every tile is `done` and the configured pass cap (if any)
    /// has been reached.
    pub fn pull(&self) -> Option<(usize, TileCoord, u64)> {
        let mut state = self.state.lock();
        let n = state.tiles.len();
        if n == 0 {
            return None;
        }
        for _ in 0..n {
            let idx = state.cursor;
            state.cursor = (state.cursor + 1) % n;
            if !state.tiles[idx].done {
                let coord = state.tiles[idx].coord;
                let pass = state.pass;
                return Some((idx, coord, pass));
            }
        }
        // Every tile in this pass is done; advance to the next pass if
        // allowed, resetting every tile so it is pulled again.
        if state.max_passes.is_none_or(|max| state.pass + 1 < max) {
            state.pass += 1;
            for t in &mut state.tiles {
                t.done = false;
            }
            state.cursor = 0;
            let coord = state.tiles[0].coord;
            let pass = state.pass;
            return Some((0, coord, pass));
        }
        None
    }

    /// Record that `tile_index` finished its samples for the current pass
    /// (either `aaSamples^2` per pixel with convergence below threshold, or
    /// the hard sample cap).
    pub fn mark_done(&self, tile_index: usize, samples_taken: u64) {
        let mut state = self.state.lock();
        if let Some(t) = state.tiles.get_mut(tile_index) {
            t.samples_taken = samples_taken;
            t.done = true;
        }
    }

    pub fn all_done(&self) -> bool {
        self.state.lock().tiles.iter().all(|t| t.done)
    }

    /// Snapshot of `(pass, per-tile done flags)` for the resume file.
    pub fn save_state(&self) -> (u64, Vec<bool>) {
        let state = self.state.lock();
        (state.pass, state.tiles.iter().map(|t| t.done).collect())
    }

    pub fn restore_state(&self, pass: u64, done: &[bool]) {
        let mut state = self.state.lock();
        state.pass = pass;
        for (t, &d) in state.tiles.iter_mut().zip(done.iter()) {
            t.done = d;
        }
        state.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_the_whole_region_without_gaps_or_overlaps() {
        let tiles = build_tiles(100, 64, 32);
        let mut covered = vec![false; 100 * 64];
        for t in &tiles {
            for y in t.coord.y..t.coord.y + t.coord.height {
                for x in t.coord.x..t.coord.x + t.coord.width {
                    let idx = (y * 100 + x) as usize;
                    assert!(!covered[idx], "pixel ({x},{y}) covered twice");
                    covered[idx] = true;
                }
            }
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn pulling_every_tile_then_marking_done_exhausts_a_single_pass() {
        let repo = TileRepository::new(64, 64, 32, Some(1));
        let mut pulled = Vec::new();
        while let Some((idx, _coord, pass)) = repo.pull() {
            assert_eq!(pass, 0);
            repo.mark_done(idx, 16);
            pulled.push(idx);
            if pulled.len() > repo.tile_count() * 2 {
                break;
            }
        }
        assert_eq!(pulled.len(), repo.tile_count());
        assert!(repo.all_done());
        assert!(repo.pull().is_none());
    }

    #[test]
    fn multiple_passes_reset_done_flags_and_advance_pass_counter() {
        let repo = TileRepository::new(32, 32, 32, Some(2));
        let (idx, _, pass0) = repo.pull().unwrap();
        repo.mark_done(idx, 1);
        assert_eq!(pass0, 0);
        let (idx2, _, pass1) = repo.pull().unwrap();
        assert_eq!(pass1, 1);
        repo.mark_done(idx2, 1);
        assert!(repo.pull().is_none());
    }

    #[test]
    fn resume_restores_pass_and_done_flags() {
        let repo = TileRepository::new(64, 64, 32, None);
        let (idx, _, _) = repo.pull().unwrap();
        repo.mark_done(idx, 4);
        let (pass, done) = repo.save_state();

        let repo2 = TileRepository::new(64, 64, 32, None);
        repo2.restore_state(pass, &done);
        assert_eq!(repo2.save_state(), (pass, done));
    }
}
