//! World collaborator.
//!
//! The simulation only needs two things from the world: a land/water query
//! for movement validation and a list of start positions. Both are behind the
//! [`Terrain`] trait so tests can substitute fixed maps.
//!
//! [`World`] is the seeded island map: a height grid built from fractal
//! Perlin noise plus a radial gradient, with start positions at the centroids
//! of reasonably large islands.

use std::sync::Arc;

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::debug;

use crate::math::Vec2;

/// Edge length of one height tile in world pixels.
pub const TILE_SIZE: f32 = 16.0;
pub const WORLD_TILES_X: usize = 150;
pub const WORLD_TILES_Y: usize = 100;
/// Heights at or above this are land.
pub const WATER_LEVEL: f32 = 90.0;
/// A start island must contain at least one tile above this height.
pub const ISLAND_MIN_HEIGHT: f32 = 110.0;
/// Islands of this many tiles or fewer are not start candidates.
pub const MIN_ISLAND_TILES: usize = 20;
/// Octaves of the height noise.
const NOISE_OCTAVES: usize = 4;
/// Noise-space step per tile.
const NOISE_SCALE: f64 = 0.05;

/// Land/water classification and start positions.
pub trait Terrain: Send + Sync {
    fn is_land(&self, pos: Vec2) -> bool;

    /// Candidate start positions, one per player in order.
    fn spawn_points(&self) -> &[Vec2];

    /// Map extent in world pixels.
    fn size(&self) -> Vec2;

    /// `pos` itself if it is water, else the centre of the closest water
    /// tile found by searching square rings of tiles outward, at most
    /// `max_rings` tiles away. `None` if everything in reach is land.
    fn nearest_water(&self, pos: Vec2, max_rings: i32) -> Option<Vec2> {
        if !self.is_land(pos) {
            return Some(pos);
        }
        let size = self.size();
        let tiles_x = (size.x / TILE_SIZE) as i32;
        let tiles_y = (size.y / TILE_SIZE) as i32;
        let cx = (pos.x / TILE_SIZE).floor() as i32;
        let cy = (pos.y / TILE_SIZE).floor() as i32;

        for ring in 1..=max_rings {
            let mut best: Option<(f32, Vec2)> = None;
            for dy in -ring..=ring {
                for dx in -ring..=ring {
                    if dx.abs() != ring && dy.abs() != ring {
                        continue;
                    }
                    let (tx, ty) = (cx + dx, cy + dy);
                    if tx < 0 || ty < 0 || tx >= tiles_x || ty >= tiles_y {
                        continue;
                    }
                    let centre = Vec2::new(
                        (tx as f32 + 0.5) * TILE_SIZE,
                        (ty as f32 + 0.5) * TILE_SIZE,
                    );
                    if self.is_land(centre) {
                        continue;
                    }
                    let d = pos.distance(centre);
                    if best.map_or(true, |(best_d, _)| d < best_d) {
                        best = Some((d, centre));
                    }
                }
            }
            if let Some((_, centre)) = best {
                return Some(centre);
            }
        }
        None
    }
}

/// Produces the terrain for a match from its seed.
pub trait WorldSource: Send + Sync {
    fn build(&self, seed: u64) -> Arc<dyn Terrain>;
}

/// Generates a fresh island map per seed.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeneratedWorlds;

impl WorldSource for GeneratedWorlds {
    fn build(&self, seed: u64) -> Arc<dyn Terrain> {
        Arc::new(World::generate(seed))
    }
}

/// Always hands out the same terrain regardless of seed.
#[derive(Clone)]
pub struct FixedWorld(pub Arc<dyn Terrain>);

impl WorldSource for FixedWorld {
    fn build(&self, _seed: u64) -> Arc<dyn Terrain> {
        Arc::clone(&self.0)
    }
}

/// Height-grid world.
#[derive(Debug, Clone)]
pub struct World {
    pub seed: u64,
    tiles_x: usize,
    tiles_y: usize,
    heights: Vec<f32>,
    spawn_points: Vec<Vec2>,
}

impl World {
    /// Generates the island map for `seed`.
    pub fn generate(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let fbm = Fbm::<Perlin>::new(noise_seed(seed)).set_octaves(NOISE_OCTAVES);

        let (tx, ty) = (WORLD_TILES_X, WORLD_TILES_Y);
        let center_x = tx as f32 / 2.0;
        let center_y = ty as f32 / 2.0;
        let max_dist = (center_x * center_x + center_y * center_y).sqrt();

        let mut heights = Vec::with_capacity(tx * ty);
        for y in 0..ty {
            for x in 0..tx {
                let n = fbm.get([x as f64 * NOISE_SCALE, y as f64 * NOISE_SCALE]) as f32;
                let dx = x as f32 - center_x;
                let dy = y as f32 - center_y;
                let gradient = (dx * dx + dy * dy).sqrt() / max_dist;
                let height = (n + (1.0 - gradient)) * 128.0 + 64.0;
                heights.push(height.clamp(0.0, 255.0));
            }
        }

        let mut world = Self {
            seed,
            tiles_x: tx,
            tiles_y: ty,
            heights,
            spawn_points: Vec::new(),
        };
        let mut islands = world.find_start_islands();
        islands.shuffle(&mut rng);
        debug!(seed, islands = islands.len(), "World generated");
        world.spawn_points = islands;
        world
    }

    /// All-water map of the given tile size.
    pub fn ocean(tiles_x: usize, tiles_y: usize) -> Self {
        Self::from_heights(tiles_x, tiles_y, vec![0.0; tiles_x * tiles_y], Vec::new())
    }

    /// Builds a world from an explicit row-major height grid.
    ///
    /// Panics if `heights` does not hold `tiles_x * tiles_y` entries.
    pub fn from_heights(
        tiles_x: usize,
        tiles_y: usize,
        heights: Vec<f32>,
        spawn_points: Vec<Vec2>,
    ) -> Self {
        assert_eq!(heights.len(), tiles_x * tiles_y, "height grid size mismatch");
        Self {
            seed: 0,
            tiles_x,
            tiles_y,
            heights,
            spawn_points,
        }
    }

    /// Raises the given tile rectangle (half-open ranges) to `height`.
    pub fn with_tiles(
        mut self,
        xs: std::ops::Range<usize>,
        ys: std::ops::Range<usize>,
        height: f32,
    ) -> Self {
        for y in ys.start..ys.end.min(self.tiles_y) {
            for x in xs.start..xs.end.min(self.tiles_x) {
                self.heights[y * self.tiles_x + x] = height;
            }
        }
        self
    }

    pub fn with_spawn_points(mut self, points: Vec<Vec2>) -> Self {
        self.spawn_points = points;
        self
    }

    /// Height at a world pixel position; 0 outside the map.
    pub fn height_at(&self, pos: Vec2) -> f32 {
        if pos.x < 0.0 || pos.y < 0.0 {
            return 0.0;
        }
        let tx = (pos.x / TILE_SIZE) as usize;
        let ty = (pos.y / TILE_SIZE) as usize;
        if tx < self.tiles_x && ty < self.tiles_y {
            self.heights[ty * self.tiles_x + tx]
        } else {
            0.0
        }
    }

    fn tile(&self, x: usize, y: usize) -> f32 {
        self.heights[y * self.tiles_x + x]
    }

    /// Flood-fills land from every high tile and keeps the centroids of the
    /// islands larger than [`MIN_ISLAND_TILES`].
    fn find_start_islands(&self) -> Vec<Vec2> {
        let mut islands = Vec::new();
        let mut visited = vec![false; self.heights.len()];
        let idx = |x: usize, y: usize| y * self.tiles_x + x;

        for y in 0..self.tiles_y {
            for x in 0..self.tiles_x {
                if visited[idx(x, y)] || self.tile(x, y) <= ISLAND_MIN_HEIGHT {
                    continue;
                }
                let mut size = 0usize;
                let (mut sum_x, mut sum_y) = (0usize, 0usize);
                let mut stack = vec![(x, y)];
                visited[idx(x, y)] = true;

                while let Some((cx, cy)) = stack.pop() {
                    size += 1;
                    sum_x += cx;
                    sum_y += cy;
                    let neighbours = [
                        (cx + 1, cy),
                        (cx.wrapping_sub(1), cy),
                        (cx, cy + 1),
                        (cx, cy.wrapping_sub(1)),
                    ];
                    for (nx, ny) in neighbours {
                        if nx < self.tiles_x
                            && ny < self.tiles_y
                            && !visited[idx(nx, ny)]
                            && self.tile(nx, ny) > WATER_LEVEL
                        {
                            visited[idx(nx, ny)] = true;
                            stack.push((nx, ny));
                        }
                    }
                }

                if size > MIN_ISLAND_TILES {
                    islands.push(Vec2::new(
                        (sum_x / size) as f32 * TILE_SIZE,
                        (sum_y / size) as f32 * TILE_SIZE,
                    ));
                }
            }
        }
        islands
    }
}

/// Folds the 64-bit match seed into the noise generator's 32-bit seed.
fn noise_seed(seed: u64) -> u32 {
    (seed ^ (seed >> 32)) as u32
}

impl Terrain for World {
    fn is_land(&self, pos: Vec2) -> bool {
        self.height_at(pos) >= WATER_LEVEL
    }

    fn spawn_points(&self) -> &[Vec2] {
        &self.spawn_points
    }

    fn size(&self) -> Vec2 {
        Vec2::new(
            self.tiles_x as f32 * TILE_SIZE,
            self.tiles_y as f32 * TILE_SIZE,
        )
    }
}
