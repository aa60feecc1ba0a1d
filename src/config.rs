//! Configuration for the grid, the waypoint graph and the scheduler.
//!
//! Everything here is plain serde data so hosts can load it from whatever format they use.

use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};
use crate::Vec2;

/// Placement and resolution of the occupancy grid.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridConfig {
    /// World position of the center of the covered area.
    #[serde(default)]
    pub center: Vec2,

    /// Width and height of the covered area in world units.
    pub area_size: Vec2,

    /// Half the side length of a cell.
    #[serde(default = "default_cell_radius")]
    pub cell_radius: f32,

    /// Number of traversable cells needed above ground for a cell to be walkable
    /// (0 = every traversable cell is walkable).
    #[serde(default = "default_walkable_height")]
    pub walkable_height: u32,
}

fn default_cell_radius() -> f32 {
    0.5
}

fn default_walkable_height() -> u32 {
    2
}

impl GridConfig {
    /// A grid of unit cells whose bottom left corner sits at the world origin, so that cell
    /// `(x, y)` is centered on `(x + 0.5, y + 0.5)`.
    pub fn unit(width: usize, height: usize) -> GridConfig {
        let area_size = Vec2::new(width as f32, height as f32);
        GridConfig {
            center: Vec2::new(area_size.x / 2.0, area_size.y / 2.0),
            area_size,
            cell_radius: 0.5,
            walkable_height: 0,
        }
    }

    pub fn with_walkable_height(mut self, walkable_height: u32) -> GridConfig {
        self.walkable_height = walkable_height;
        self
    }

    pub fn cell_diameter(&self) -> f32 {
        self.cell_radius * 2.0
    }

    /// Number of cells along each axis.
    pub fn grid_size(&self) -> (usize, usize) {
        let d = self.cell_diameter();
        (
            (self.area_size.x / d).round().max(0.0) as usize,
            (self.area_size.y / d).round().max(0.0) as usize,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.cell_radius > 0.0) {
            return Err(NavError::InvalidGrid(format!(
                "cell radius must be positive, got {}",
                self.cell_radius
            )));
        }
        let (w, h) = self.grid_size();
        if w == 0 || h == 0 {
            return Err(NavError::InvalidGrid(format!(
                "area {} holds no cells of diameter {}",
                self.area_size,
                self.cell_diameter()
            )));
        }
        Ok(())
    }
}

/// Throttling of the [Scheduler](crate::scheduler::Scheduler).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Searches of one kind that may start per tick.
    #[serde(default = "default_max_dispatch_per_tick")]
    pub max_dispatch_per_tick: usize,

    /// Worker threads running searches (0 = one per core).
    #[serde(default)]
    pub worker_threads: usize,
}

fn default_max_dispatch_per_tick() -> usize {
    4
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_dispatch_per_tick: default_max_dispatch_per_tick(),
            worker_threads: 0,
        }
    }
}

/// A designated waypoint and its outgoing connections.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaypointPlacement {
    pub position: Vec2,

    /// Blocked waypoints stay in the graph but are never entered by a search.
    #[serde(default)]
    pub blocked: bool,

    #[serde(default)]
    pub connections: Vec<WaypointConnection>,
}

impl WaypointPlacement {
    pub fn new(position: Vec2) -> WaypointPlacement {
        WaypointPlacement {
            position,
            blocked: false,
            connections: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaypointConnection {
    /// Index of the target placement.
    pub target: usize,

    /// Clearance needed to take this connection.
    #[serde(default)]
    pub max_height: i32,

    /// Only the listed direction is connected; otherwise the reverse edge is added as well.
    #[serde(default)]
    pub one_directional: bool,
}

/// Ordered list of waypoints, as authored by an external editing layer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WaypointConfig {
    #[serde(default)]
    pub nodes: Vec<WaypointPlacement>,
}

impl WaypointConfig {
    /// Adds a waypoint and returns its index.
    pub fn add_node(&mut self, position: Vec2) -> usize {
        self.nodes.push(WaypointPlacement::new(position));
        self.nodes.len() - 1
    }

    pub fn connect(&mut self, from: usize, to: usize, max_height: i32, one_directional: bool) {
        if let Some(node) = self.nodes.get_mut(from) {
            node.connections.push(WaypointConnection {
                target: to,
                max_height,
                one_directional,
            });
        }
    }
}
