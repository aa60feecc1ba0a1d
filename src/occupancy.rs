//! The occupancy grid: a flat array of cells covering a rectangular world region.
//!
//! Traversability is sampled once from an [ObstacleQuery] when the grid is built and can later be
//! re-sampled for sub-rectangles with [refresh_region](OccupancyGrid::refresh_region). Every
//! refresh is published to the listeners handed out by [subscribe](OccupancyGrid::subscribe), which
//! is how the scheduler keeps its snapshot in step without a full rebuild.
use crate::config::GridConfig;
use crate::error::{NavError, Result};
use crate::{GroupId, Vec2, N_SMALLVEC_SIZE};
use core::fmt;
use grid_util::point::Point;
use log::{debug, info};
use smallvec::SmallVec;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Geometry query consumed while sampling the grid: does a circle of `radius` around `point`
/// overlap blocking geometry?
pub trait ObstacleQuery {
    fn is_blocked(&self, point: Vec2, radius: f32) -> bool;
}

impl<F> ObstacleQuery for F
where
    F: Fn(Vec2, f32) -> bool,
{
    fn is_blocked(&self, point: Vec2, radius: f32) -> bool {
        self(point, radius)
    }
}

/// Canonical per-cell data. Search costs are kept in the search scratch, not here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridCell {
    pub pos: Point,
    pub group: GroupId,
}

/// Half-open rectangle of cells, `min` inclusive and `max` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub min: Point,
    pub max: Point,
}

impl Region {
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Region {
        Region {
            min: Point::new(min_x, min_y),
            max: Point::new(max_x, max_y),
        }
    }
    pub fn width(&self) -> usize {
        (self.max.x - self.min.x).max(0) as usize
    }
    pub fn height(&self) -> usize {
        (self.max.y - self.min.y).max(0) as usize
    }
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
    }
    /// Cells of the region in row-major order.
    pub fn points(&self) -> impl Iterator<Item = Point> {
        let (min, max) = (self.min, self.max);
        (min.y..max.y).flat_map(move |y| (min.x..max.x).map(move |x| Point::new(x, y)))
    }
}

/// New traversability of a region, row-major within the region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraversabilityPatch {
    pub region: Region,
    pub traversable: Vec<bool>,
}

/// Notification sent to grid listeners.
#[derive(Clone, Debug)]
pub enum GridChange {
    /// Traversability of a region was re-sampled. Walkability and groups are unchanged.
    Traversability(TraversabilityPatch),
    /// Walkability and groups were recomputed; the payload is the complete new grid.
    Rebuilt(Arc<OccupancyGrid>),
}

#[derive(Debug)]
pub struct OccupancyGrid {
    pub(crate) config: GridConfig,
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) cells: Vec<GridCell>,
    pub(crate) traversable: Vec<bool>,
    pub(crate) walkable: Vec<bool>,
    pub(crate) positions: Vec<Vec2>,
    pub(crate) group_count: GroupId,
    pub(crate) groups_dirty: bool,
    listeners: Vec<Sender<GridChange>>,
}

impl OccupancyGrid {
    /// Samples every cell with `query`, derives walkability and partitions the ground groups.
    pub fn new<Q: ObstacleQuery + ?Sized>(config: GridConfig, query: &Q) -> Result<OccupancyGrid> {
        let mut grid = Self::empty(config)?;
        for ix in 0..grid.len() {
            grid.traversable[ix] = !query.is_blocked(grid.positions[ix], grid.config.cell_radius);
        }
        grid.finish_build();
        Ok(grid)
    }

    /// Builds a grid from precomputed traversability flags in row-major order.
    pub fn from_traversable(config: GridConfig, traversable: Vec<bool>) -> Result<OccupancyGrid> {
        let mut grid = Self::empty(config)?;
        if traversable.len() != grid.len() {
            return Err(NavError::InvalidGrid(format!(
                "expected {} traversability flags for a {}x{} grid, got {}",
                grid.len(),
                grid.width,
                grid.height,
                traversable.len()
            )));
        }
        grid.traversable = traversable;
        grid.finish_build();
        Ok(grid)
    }

    fn empty(config: GridConfig) -> Result<OccupancyGrid> {
        config.validate()?;
        let (width, height) = config.grid_size();
        let len = width * height;
        let diameter = config.cell_diameter();
        let bottom_left = config.center - Vec2::new(config.area_size.x / 2.0, config.area_size.y / 2.0);
        let mut cells = Vec::with_capacity(len);
        let mut positions = Vec::with_capacity(len);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                cells.push(GridCell {
                    pos: Point::new(x, y),
                    group: 0,
                });
                positions.push(
                    bottom_left
                        + Vec2::new(
                            x as f32 * diameter + config.cell_radius,
                            y as f32 * diameter + config.cell_radius,
                        ),
                );
            }
        }
        Ok(OccupancyGrid {
            config,
            width,
            height,
            cells,
            traversable: vec![true; len],
            walkable: vec![false; len],
            positions,
            group_count: 0,
            groups_dirty: false,
            listeners: Vec::new(),
        })
    }

    fn finish_build(&mut self) {
        self.compute_walkable();
        self.generate_ground_groups();
        info!(
            "Built {}x{} grid with {} ground groups",
            self.width, self.height, self.group_count
        );
    }

    /// A cell is walkable when it belongs to a column of `walkable_height` traversable cells
    /// resting on a blocked cell.
    pub(crate) fn compute_walkable(&mut self) {
        let clearance = self.config.walkable_height as usize;
        if clearance == 0 {
            self.walkable.clone_from(&self.traversable);
            return;
        }
        self.walkable.iter_mut().for_each(|w| *w = false);
        let w = self.width;
        for y in clearance..self.height {
            for x in 0..w {
                let ground = (y - clearance) * w + x;
                if self.traversable[ground] {
                    continue;
                }
                if (0..clearance).all(|i| self.traversable[(y - i) * w + x]) {
                    for i in 0..clearance {
                        self.walkable[(y - i) * w + x] = true;
                    }
                }
            }
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }
    pub fn width(&self) -> usize {
        self.width
    }
    pub fn height(&self) -> usize {
        self.height
    }
    pub fn len(&self) -> usize {
        self.cells.len()
    }
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }
    pub fn cell(&self, ix: usize) -> &GridCell {
        &self.cells[ix]
    }
    /// Number of non-zero ground groups.
    pub fn group_count(&self) -> GroupId {
        self.group_count
    }
    /// Whether refreshes changed traversability since groups were last computed.
    pub fn groups_dirty(&self) -> bool {
        self.groups_dirty
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }
    pub fn point_in_bounds(&self, p: &Point) -> bool {
        self.in_bounds(p.x, p.y)
    }
    pub fn get_ix(&self, x: i32, y: i32) -> usize {
        y as usize * self.width + x as usize
    }
    pub fn get_ix_point(&self, p: &Point) -> usize {
        self.get_ix(p.x, p.y)
    }
    pub fn point(&self, ix: usize) -> Point {
        self.cells[ix].pos
    }

    pub fn is_traversable(&self, ix: usize) -> bool {
        self.traversable[ix]
    }
    /// Out of bounds points are never traversable.
    pub fn point_traversable(&self, p: &Point) -> bool {
        self.point_in_bounds(p) && self.traversable[self.get_ix_point(p)]
    }
    pub fn is_walkable(&self, ix: usize) -> bool {
        self.walkable[ix]
    }
    pub fn group(&self, ix: usize) -> GroupId {
        self.cells[ix].group
    }
    pub fn group_at(&self, p: &Point) -> GroupId {
        if self.point_in_bounds(p) {
            self.cells[self.get_ix_point(p)].group
        } else {
            0
        }
    }

    /// World position of the center of a cell.
    pub fn cell_center(&self, ix: usize) -> Vec2 {
        self.positions[ix]
    }

    /// Maps a world position to the cell containing it, clamping to the grid.
    pub fn world_to_grid(&self, pos: Vec2) -> Point {
        let size = self.config.area_size;
        let local = pos - self.config.center;
        let percent_x = ((local.x - self.config.cell_radius + size.x / 2.0) / size.x).clamp(0.0, 1.0);
        let percent_y = ((local.y - self.config.cell_radius + size.y / 2.0) / size.y).clamp(0.0, 1.0);
        let x = (self.width as f32 * percent_x)
            .clamp(0.0, (self.width - 1) as f32)
            .round();
        let y = (self.height as f32 * percent_y)
            .clamp(0.0, (self.height - 1) as f32)
            .round();
        Point::new(x as i32, y as i32)
    }

    /// Whether a single step from `from` to the 8-adjacent `to` is allowed: `to` must be
    /// traversable and a diagonal step may not squeeze between two blocked cells.
    pub fn can_move(&self, from: &Point, to: &Point) -> bool {
        debug_assert!((from.x - to.x).abs() <= 1 && (from.y - to.y).abs() <= 1);
        if !self.point_traversable(to) {
            return false;
        }
        if from.x != to.x && from.y != to.y {
            let side_a = Point::new(to.x, from.y);
            let side_b = Point::new(from.x, to.y);
            if !self.point_traversable(&side_a) && !self.point_traversable(&side_b) {
                return false;
            }
        }
        true
    }

    /// In-bounds 8-neighbourhood of a point, without any traversability filtering.
    pub fn moore_neighbourhood(&self, p: &Point) -> SmallVec<[Point; N_SMALLVEC_SIZE]> {
        let mut out = SmallVec::new();
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let n = Point::new(p.x + dx, p.y + dy);
                if self.point_in_bounds(&n) {
                    out.push(n);
                }
            }
        }
        out
    }

    /// Neighbours that can be stepped to from `p`.
    pub fn neighbourhood_points(&self, p: &Point) -> SmallVec<[Point; N_SMALLVEC_SIZE]> {
        self.moore_neighbourhood(p)
            .into_iter()
            .filter(|n| self.can_move(p, n))
            .collect()
    }

    /// Clamps a region to the grid bounds.
    pub fn clamp_region(&self, region: Region) -> Region {
        Region::new(
            region.min.x.max(0),
            region.min.y.max(0),
            region.max.x.min(self.width as i32),
            region.max.y.min(self.height as i32),
        )
    }

    /// Re-samples traversability inside `region`, marks the groups dirty when anything changed and
    /// notifies every listener. Walkability and groups are only recomputed by
    /// [update](Self::update).
    pub fn refresh_region<Q: ObstacleQuery + ?Sized>(
        &mut self,
        region: Region,
        query: &Q,
    ) -> Result<TraversabilityPatch> {
        let clamped = self.clamp_region(region);
        if clamped.is_empty() {
            return Err(NavError::EmptyRegion((
                region.min.x,
                region.min.y,
                region.max.x,
                region.max.y,
            )));
        }
        let radius = self.config.cell_radius;
        let traversable = clamped
            .points()
            .map(|p| !query.is_blocked(self.positions[self.get_ix_point(&p)], radius))
            .collect::<Vec<bool>>();
        let patch = TraversabilityPatch {
            region: clamped,
            traversable,
        };
        if self.apply_patch(&patch) {
            self.groups_dirty = true;
        }
        debug!("Refreshed region {:?}", clamped);
        self.publish(GridChange::Traversability(patch.clone()));
        Ok(patch)
    }

    /// Writes a patch into the traversability flags; returns whether anything changed.
    pub fn apply_patch(&mut self, patch: &TraversabilityPatch) -> bool {
        let mut changed = false;
        for (p, &value) in patch.region.points().zip(&patch.traversable) {
            if !self.point_in_bounds(&p) {
                continue;
            }
            let ix = self.get_ix_point(&p);
            changed |= self.traversable[ix] != value;
            self.traversable[ix] = value;
        }
        changed
    }

    /// Recomputes walkability and ground groups if refreshes made them dirty, then publishes the
    /// rebuilt grid. Returns whether a rebuild happened.
    pub fn update(&mut self) -> bool {
        if !self.groups_dirty {
            return false;
        }
        info!("Ground groups are dirty: regenerating");
        self.compute_walkable();
        self.generate_ground_groups();
        self.publish(GridChange::Rebuilt(Arc::new(self.snapshot())));
        true
    }

    /// Registers a listener for grid changes.
    pub fn subscribe(&mut self) -> Receiver<GridChange> {
        let (tx, rx) = mpsc::channel();
        self.listeners.push(tx);
        rx
    }

    fn publish(&mut self, change: GridChange) {
        // Listeners that hung up are dropped.
        self.listeners.retain(|tx| tx.send(change.clone()).is_ok());
    }

    /// A copy of the grid data without listeners.
    pub fn snapshot(&self) -> OccupancyGrid {
        self.clone()
    }
}

/// Listeners stay with the original; a clone starts without any.
impl Clone for OccupancyGrid {
    fn clone(&self) -> OccupancyGrid {
        OccupancyGrid {
            config: self.config.clone(),
            width: self.width,
            height: self.height,
            cells: self.cells.clone(),
            traversable: self.traversable.clone(),
            walkable: self.walkable.clone(),
            positions: self.positions.clone(),
            group_count: self.group_count,
            groups_dirty: self.groups_dirty,
            listeners: Vec::new(),
        }
    }
}

impl fmt::Display for OccupancyGrid {
    /// Top row first: `#` blocked, `.` traversable but not walkable, `o` walkable.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for y in (0..self.height as i32).rev() {
            let row = (0..self.width as i32)
                .map(|x| {
                    let ix = self.get_ix(x, y);
                    if !self.traversable[ix] {
                        '#'
                    } else if self.walkable[ix] {
                        'o'
                    } else {
                        '.'
                    }
                })
                .collect::<String>();
            writeln!(f, "{}", row)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked_cells(cells: &'static [(i32, i32)]) -> impl Fn(Vec2, f32) -> bool {
        move |p: Vec2, _r: f32| {
            cells
                .iter()
                .any(|&(x, y)| p.x.floor() as i32 == x && p.y.floor() as i32 == y)
        }
    }

    #[test]
    fn samples_query_at_cell_centers() {
        let grid = OccupancyGrid::new(GridConfig::unit(4, 3), &blocked_cells(&[(1, 2), (3, 0)]))
            .unwrap();
        assert_eq!(grid.len(), 12);
        assert!(!grid.point_traversable(&Point::new(1, 2)));
        assert!(!grid.point_traversable(&Point::new(3, 0)));
        assert!(grid.point_traversable(&Point::new(0, 0)));
        assert_eq!(grid.cell_center(grid.get_ix(2, 1)), Vec2::new(2.5, 1.5));
    }

    #[test]
    fn world_to_grid_round_trips_centers_and_clamps() {
        let grid = OccupancyGrid::new(GridConfig::unit(6, 4), &|_: Vec2, _: f32| false).unwrap();
        for ix in 0..grid.len() {
            assert_eq!(grid.world_to_grid(grid.cell_center(ix)), grid.point(ix));
        }
        assert_eq!(grid.world_to_grid(Vec2::new(-10.0, -10.0)), Point::new(0, 0));
        assert_eq!(grid.world_to_grid(Vec2::new(100.0, 100.0)), Point::new(5, 3));
    }

    #[test]
    fn walkable_needs_ground_and_clearance() {
        // Floor on row 0, a ledge at (3, 2) and a low ceiling above (5, 1).
        let config = GridConfig::unit(7, 5).with_walkable_height(2);
        let grid = OccupancyGrid::new(
            config,
            &blocked_cells(&[
                (0, 0),
                (1, 0),
                (2, 0),
                (3, 0),
                (4, 0),
                (5, 0),
                (6, 0),
                (3, 2),
                (5, 2),
            ]),
        )
        .unwrap();
        assert!(grid.is_walkable(grid.get_ix(0, 1)));
        assert!(grid.is_walkable(grid.get_ix(0, 2)));
        assert!(!grid.is_walkable(grid.get_ix(0, 3)));
        // Standing on the ledge.
        assert!(grid.is_walkable(grid.get_ix(3, 3)));
        assert!(grid.is_walkable(grid.get_ix(3, 4)));
        // One cell of headroom is not enough.
        assert!(!grid.is_walkable(grid.get_ix(5, 1)));
        assert!(grid.is_traversable(grid.get_ix(5, 1)));
    }

    #[test]
    fn diagonal_blocked_only_by_both_sides() {
        //  ___
        // |.#|
        // |#.|
        //  __
        let grid = OccupancyGrid::new(GridConfig::unit(2, 2), &blocked_cells(&[(1, 1), (0, 0)]))
            .unwrap();
        assert!(!grid.can_move(&Point::new(0, 1), &Point::new(1, 0)));
        let grid =
            OccupancyGrid::new(GridConfig::unit(2, 2), &blocked_cells(&[(1, 1)])).unwrap();
        assert!(grid.can_move(&Point::new(0, 1), &Point::new(1, 0)));
    }

    #[test]
    fn refresh_publishes_patch_and_marks_dirty() {
        let mut grid =
            OccupancyGrid::new(GridConfig::unit(5, 5), &|_: Vec2, _: f32| false).unwrap();
        let rx = grid.subscribe();
        let patch = grid
            .refresh_region(Region::new(-2, 1, 2, 3), &blocked_cells(&[(1, 2)]))
            .unwrap();
        assert_eq!(patch.region, Region::new(0, 1, 2, 3));
        assert!(patch.region.contains(&Point::new(1, 2)));
        assert!(!patch.region.contains(&Point::new(2, 2)));
        assert_eq!(patch.traversable, vec![true, true, true, false]);
        assert!(grid.groups_dirty());
        assert!(!grid.point_traversable(&Point::new(1, 2)));
        match rx.try_recv().unwrap() {
            GridChange::Traversability(received) => assert_eq!(received, patch),
            GridChange::Rebuilt(_) => panic!("expected a traversability patch"),
        }
        assert!(grid.update());
        assert!(matches!(rx.try_recv().unwrap(), GridChange::Rebuilt(_)));
        assert!(!grid.update());
    }

    #[test]
    fn clones_do_not_publish_to_the_original_listeners() {
        let mut grid =
            OccupancyGrid::new(GridConfig::unit(4, 4), &|_: Vec2, _: f32| false).unwrap();
        let rx = grid.subscribe();
        let mut copy = grid.clone();
        copy.refresh_region(Region::new(0, 0, 4, 4), &|_: Vec2, _: f32| true)
            .unwrap();
        assert!(copy.update());
        assert!(rx.try_recv().is_err());
        grid.refresh_region(Region::new(0, 0, 1, 1), &|_: Vec2, _: f32| true)
            .unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn refresh_outside_grid_is_an_error() {
        let mut grid =
            OccupancyGrid::new(GridConfig::unit(3, 3), &|_: Vec2, _: f32| false).unwrap();
        assert!(grid
            .refresh_region(Region::new(5, 5, 8, 8), &|_: Vec2, _: f32| true)
            .is_err());
    }

    #[test]
    fn traversability_length_is_checked() {
        assert!(OccupancyGrid::from_traversable(GridConfig::unit(3, 3), vec![true; 8]).is_err());
    }
}
