//! A* over a [WaypointGraph].
//!
//! The literal start and end positions are first resolved to graph nodes through the ground group
//! of the cell they fall in. Edge costs and the heuristic are octile distances between node cells.
//! Afterwards the path is trimmed at both ends so it stays anchored to the literal positions
//! instead of doubling back to a node behind them.
use crate::occupancy::OccupancyGrid;
use crate::search::{astar, ReversePath, SearchScratch, SearchSpace, Successors};
use crate::waypoint_graph::{NodeId, WaypointGraph};
use crate::{octile_distance, GroupId, Vec2};
use grid_util::point::Point;
use log::{info, warn};

/// The waypoint graph seen as a search space towards a fixed goal cell.
pub struct GraphSpace<'a> {
    graph: &'a WaypointGraph,
    goal: Point,
}

impl<'a> GraphSpace<'a> {
    pub fn new(graph: &'a WaypointGraph, goal: Point) -> GraphSpace<'a> {
        GraphSpace { graph, goal }
    }
}

impl SearchSpace for GraphSpace<'_> {
    type Cost = i32;

    fn node_count(&self) -> usize {
        self.graph.len()
    }

    fn successors(&self, node: usize, out: &mut Successors<i32>) {
        let from = self.graph.node(node).grid_pos;
        for edge in self.graph.outgoing(node) {
            let target = self.graph.node(edge.target);
            if target.traversable {
                out.push((edge.target, octile_distance(&from, &target.grid_pos)));
            }
        }
    }

    fn heuristic(&self, node: usize) -> i32 {
        octile_distance(&self.graph.node(node).grid_pos, &self.goal)
    }
}

/// Traversable node of `group` nearest to `pos`.
fn start_node(graph: &WaypointGraph, group: GroupId, pos: Vec2) -> Option<NodeId> {
    graph
        .nodes_in_group(group)
        .iter()
        .copied()
        .filter(|&id| graph.is_traversable(id))
        .min_by(|&a, &b| distance(graph, a, pos).total_cmp(&distance(graph, b, pos)))
}

/// Nearest traversable node of `group`, or the nearest node at all when none is traversable.
fn end_node(graph: &WaypointGraph, group: GroupId, pos: Vec2) -> Option<NodeId> {
    let mut nearest: Option<(NodeId, f32)> = None;
    let mut nearest_traversable: Option<(NodeId, f32)> = None;
    for &id in graph.nodes_in_group(group) {
        let d = distance(graph, id, pos);
        if nearest.map_or(true, |(_, best)| d < best) {
            nearest = Some((id, d));
        }
        if graph.is_traversable(id) && nearest_traversable.map_or(true, |(_, best)| d < best) {
            nearest_traversable = Some((id, d));
        }
    }
    nearest_traversable.or(nearest).map(|(id, _)| id)
}

fn distance(graph: &WaypointGraph, id: NodeId, pos: Vec2) -> f32 {
    graph.node(id).world_pos.manhattan_distance(&pos)
}

/// Searches a route of waypoints between two world positions.
///
/// Nodes are returned in reverse order, target first. Positions outside walkable ground, or in a
/// group without usable nodes, fail with an empty path. When the end node can not be reached the
/// path leads to the node that came closest to it, or is just the start node when none did.
pub fn find_graph_path(
    grid: &OccupancyGrid,
    graph: &WaypointGraph,
    start_pos: Vec2,
    end_pos: Vec2,
    scratch: &mut SearchScratch<i32>,
) -> ReversePath {
    let start_cell = grid.world_to_grid(start_pos);
    let end_cell = grid.world_to_grid(end_pos);
    let start_group = grid.group_at(&start_cell);
    let end_group = grid.group_at(&end_cell);
    if start_group == 0 || end_group == 0 {
        warn!(
            "Path from {} to {} starts or ends off walkable ground",
            start_pos, end_pos
        );
        return ReversePath::failed();
    }
    let Some(start) = start_node(graph, start_group, start_pos) else {
        warn!("No traversable waypoint in group {} near {}", start_group, start_pos);
        return ReversePath::failed();
    };
    let Some(end) = end_node(graph, end_group, end_pos) else {
        warn!("No waypoint in group {} near {}", end_group, end_pos);
        return ReversePath::failed();
    };
    if start == end {
        return ReversePath {
            nodes: vec![start],
            success: true,
        };
    }

    let space = GraphSpace::new(graph, graph.node(end).grid_pos);
    let outcome = astar(&space, start, end, scratch);
    let mut target = outcome.target;
    if !outcome.reached {
        info!("Waypoint {} is not reachable from {}", end, start);
        // A fallback no closer to the end than the start node is no progress.
        if space.heuristic(target) >= space.heuristic(start) {
            target = start;
        }
    }
    let mut nodes: Vec<NodeId> = scratch.trace(target, start).collect();

    // Start trim: `nodes` ends with the start node, the first hop sits right before it.
    if nodes.len() > 1 {
        let hop = graph.node(nodes[nodes.len() - 2]);
        let first = graph.node(start);
        if hop.group == first.group
            && octile_distance(&hop.grid_pos, &start_cell)
                <= octile_distance(&hop.grid_pos, &first.grid_pos)
        {
            nodes.pop();
        }
    }
    // End trim, only for routes that arrived.
    if outcome.reached && nodes.len() > 1 {
        let hop = graph.node(nodes[1]);
        let last = graph.node(end);
        if hop.group == last.group
            && octile_distance(&hop.grid_pos, &end_cell)
                < octile_distance(&hop.grid_pos, &last.grid_pos)
        {
            nodes.remove(0);
        }
    }
    ReversePath {
        nodes,
        success: outcome.reached,
    }
}
