//! A* over the cells of an [OccupancyGrid].
//!
//! Cells are expanded over their 8-neighbourhood with cost [C] for straight and [D] for diagonal
//! steps; the heuristic is the octile distance to the end cell, which is exact on an empty grid.
//! Reconstructed paths only keep the cells where the direction of movement changes.
use crate::occupancy::OccupancyGrid;
use crate::search::{astar, ReversePath, SearchScratch, SearchSpace, Successors};
use crate::{octile_distance, C, D};
use grid_util::point::Point;
use itertools::Itertools;
use log::info;

/// The grid seen as a search space towards a fixed goal cell.
pub struct GridSpace<'a> {
    grid: &'a OccupancyGrid,
    goal: Point,
}

impl<'a> GridSpace<'a> {
    pub fn new(grid: &'a OccupancyGrid, goal: Point) -> GridSpace<'a> {
        GridSpace { grid, goal }
    }
}

impl SearchSpace for GridSpace<'_> {
    type Cost = i32;

    fn node_count(&self) -> usize {
        self.grid.len()
    }

    fn successors(&self, node: usize, out: &mut Successors<i32>) {
        let p = self.grid.point(node);
        for n in self.grid.neighbourhood_points(&p) {
            let cost = if n.x != p.x && n.y != p.y { D } else { C };
            out.push((self.grid.get_ix_point(&n), cost));
        }
    }

    fn heuristic(&self, node: usize) -> i32 {
        octile_distance(&self.grid.point(node), &self.goal)
    }
}

/// Searches a route between two cells.
///
/// The returned cells are in reverse order, target first, and never include the start cell. When
/// the end can not be reached the path leads to the opened cell that came closest to it, even if
/// that is further away than the start. It is empty only when the start has no open neighbour.
pub fn find_grid_path(
    grid: &OccupancyGrid,
    start: Point,
    end: Point,
    scratch: &mut SearchScratch<i32>,
) -> ReversePath {
    if start == end {
        return ReversePath {
            nodes: Vec::new(),
            success: true,
        };
    }
    let start_ix = grid.get_ix_point(&start);
    let end_ix = grid.get_ix_point(&end);
    let space = GridSpace::new(grid, end);
    let outcome = astar(&space, start_ix, end_ix, scratch);
    if !outcome.reached {
        info!("{} is not reachable from {}", end, start);
        if outcome.target == start_ix {
            return ReversePath::failed();
        }
    }
    ReversePath {
        nodes: compress(grid, scratch.trace(outcome.target, start_ix)),
        success: outcome.reached,
    }
}

/// Keeps the first cell of a traced path and every cell where the direction changes. The last
/// traced cell (the start) is dropped.
fn compress<I: Iterator<Item = usize>>(grid: &OccupancyGrid, trace: I) -> Vec<usize> {
    let mut trace = trace.peekable();
    let mut path = Vec::new();
    let Some(&target) = trace.peek() else {
        return path;
    };
    path.push(target);
    for (a, b, c) in trace.map(|ix| grid.point(ix)).tuple_windows() {
        if direction(&a, &b) != direction(&b, &c) {
            path.push(grid.get_ix_point(&b));
        }
    }
    path
}

fn direction(from: &Point, to: &Point) -> (i32, i32) {
    ((to.x - from.x).signum(), (to.y - from.y).signum())
}
