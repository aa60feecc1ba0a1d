//! # grid_nav
//!
//! Pathfinding for many agents over two complementary representations: a uniform
//! occupancy grid and a sparse waypoint graph. Both are searched with one
//! [A*](https://en.wikipedia.org/wiki/A*_search_algorithm) core using integer
//! [octile distances](https://github.com/riscy/a_star_on_grids). Pre-computes ground groups
//! ([connected components](https://en.wikipedia.org/wiki/Component_(graph_theory)) of walkable
//! cells) so that graph searches can pick endpoints cheaply and fall back to the closest
//! reachable point when no route exists.
//!
//! Searches are dispatched by a [Scheduler](scheduler::Scheduler) that caps how many searches
//! start per tick, runs them on a thread pool against immutable snapshots and delivers results
//! from [tick](scheduler::Scheduler::tick).
//!
//! The expected setup order is: build an [OccupancyGrid](occupancy::OccupancyGrid) (which
//! partitions ground groups), build a [WaypointGraph](waypoint_graph::WaypointGraph) on top of
//! it, create the [Scheduler](scheduler::Scheduler) and call `tick` once per frame.
pub mod config;
pub mod error;
pub mod graph_search;
pub mod grid_search;
pub mod groups;
pub mod heap;
pub mod occupancy;
pub mod scheduler;
pub mod search;
pub mod waypoint_graph;

use core::fmt;
use core::ops::{Add, Sub};
use grid_util::point::Point;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub use config::{GridConfig, SchedulerConfig, WaypointConfig};
pub use error::{NavError, Result};
pub use occupancy::{ObstacleQuery, OccupancyGrid};
pub use scheduler::{PathRequest, PathResult, PathTicket, Scheduler, SearchKind};
pub use waypoint_graph::WaypointGraph;

/// Cost of a cardinal (straight) move.
pub const C: i32 = 10;
/// Cost of a diagonal move, the scaled-integer approximation of `C * sqrt(2)`.
pub const D: i32 = 14;
/// Helper constant for the octile formula.
pub const E: i32 = 2 * C - D;
pub const N_SMALLVEC_SIZE: usize = 8;

/// Identifier of a ground group. Group 0 marks cells that are traversable but can not be stood
/// on; they are never search endpoints.
pub type GroupId = u32;

/// Position in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Vec2 {
        Vec2 { x, y }
    }
    pub fn manhattan_distance(&self, other: &Vec2) -> f32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// Uses C as cost for cardinal (straight) moves and D for diagonal moves.
pub fn octile_distance(p1: &Point, p2: &Point) -> i32 {
    let delta_x = (p1.x - p2.x).abs();
    let delta_y = (p1.y - p2.y).abs();
    // Formula from https://github.com/riscy/a_star_on_grids
    // to efficiently compute the cost of a path taking the maximal amount
    // of diagonal steps before going straight
    (E * (delta_x - delta_y).abs() + D * (delta_x + delta_y)) / 2
}

/// Sums the octile distance between consecutive points.
pub fn path_cost(path: &[Point]) -> i32 {
    path.iter()
        .tuple_windows()
        .map(|(a, b)| octile_distance(a, b))
        .sum()
}

/// Turns waypoints into a path on the grid which can be followed step by step. Legs between
/// waypoints produced by the grid search are straight or diagonal lines, so stepping along them
/// reproduces the searched cells exactly.
pub fn waypoints_to_path(waypoints: Vec<Point>) -> Vec<Point> {
    let mut waypoints = waypoints.into_iter();
    let mut path: Vec<Point> = Vec::new();
    let Some(mut current) = waypoints.next() else {
        return path;
    };
    path.push(current);
    for next in waypoints {
        while current != next {
            let step_x = (next.x - current.x).signum();
            let step_y = (next.y - current.y).signum();
            current = Point::new(current.x + step_x, current.y + step_y);
            path.push(current);
        }
    }
    path
}
