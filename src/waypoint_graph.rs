//! Sparse waypoint graph layered on top of the occupancy grid.
//!
//! Nodes are the designated waypoints, tagged with the ground group of the cell beneath them.
//! Edges are directed; a bidirectional connection is stored as two mirrored edges. The group map
//! gives every node of a group in insertion order, which the graph search uses to choose its
//! endpoints.
use crate::config::WaypointConfig;
use crate::error::{NavError, Result};
use crate::occupancy::OccupancyGrid;
use crate::{GroupId, Vec2};
use fxhash::FxBuildHasher;
use grid_util::point::Point;
use indexmap::IndexMap;
use log::{info, warn};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use smallvec::SmallVec;

type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Dense node identifier, equal to the index of the placement in the [WaypointConfig].
pub type NodeId = usize;

#[derive(Clone, Debug, PartialEq)]
pub struct NavNode {
    pub id: NodeId,
    pub grid_pos: Point,
    pub world_pos: Vec2,
    pub group: GroupId,
    pub traversable: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    /// Clearance needed to take the edge.
    pub max_height: i32,
}

#[derive(Clone, Debug, Default)]
pub struct WaypointGraph {
    graph: DiGraph<NavNode, i32>,
    group_map: FxIndexMap<GroupId, SmallVec<[NodeId; 4]>>,
}

impl WaypointGraph {
    /// Places every configured waypoint on the grid and materialises its connections.
    pub fn new(config: &WaypointConfig, grid: &OccupancyGrid) -> Result<WaypointGraph> {
        let mut graph = DiGraph::with_capacity(config.nodes.len(), config.nodes.len() * 2);
        for (id, placement) in config.nodes.iter().enumerate() {
            let grid_pos = grid.world_to_grid(placement.position);
            graph.add_node(NavNode {
                id,
                grid_pos,
                world_pos: placement.position,
                group: 0,
                traversable: !placement.blocked,
            });
        }
        for (id, placement) in config.nodes.iter().enumerate() {
            for connection in &placement.connections {
                if connection.target >= config.nodes.len() {
                    return Err(NavError::UnknownWaypoint {
                        source_node: id,
                        target: connection.target,
                    });
                }
                let (a, b) = (NodeIndex::new(id), NodeIndex::new(connection.target));
                if graph.find_edge(a, b).is_none() {
                    graph.add_edge(a, b, connection.max_height);
                }
                if !connection.one_directional && graph.find_edge(b, a).is_none() {
                    graph.add_edge(b, a, connection.max_height);
                }
            }
        }
        let mut waypoint_graph = WaypointGraph {
            graph,
            group_map: FxIndexMap::default(),
        };
        waypoint_graph.assign_groups(grid);
        info!(
            "Built waypoint graph with {} nodes and {} edges",
            waypoint_graph.len(),
            waypoint_graph.edge_count()
        );
        Ok(waypoint_graph)
    }

    /// Sets every node's group from the cell beneath it and rebuilds the group map. Nodes that do
    /// not stand on walkable ground are reported but kept.
    pub fn assign_groups(&mut self, grid: &OccupancyGrid) {
        self.group_map.clear();
        for ix in self.graph.node_indices() {
            let node = &mut self.graph[ix];
            node.group = grid.group_at(&node.grid_pos);
            if node.group == 0 {
                warn!(
                    "Waypoint {} at {} is not on walkable ground",
                    node.id, node.world_pos
                );
            }
            self.group_map.entry(node.group).or_default().push(node.id);
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
    pub fn node(&self, id: NodeId) -> &NavNode {
        &self.graph[NodeIndex::new(id)]
    }
    pub fn nodes(&self) -> impl Iterator<Item = &NavNode> + '_ {
        self.graph.node_indices().map(move |ix| &self.graph[ix])
    }
    pub fn is_traversable(&self, id: NodeId) -> bool {
        self.node(id).traversable
    }

    pub fn set_blocked(&mut self, id: NodeId, blocked: bool) {
        if let Some(node) = self.graph.node_weight_mut(NodeIndex::new(id)) {
            node.traversable = !blocked;
        }
    }

    /// Outgoing edges of a node.
    pub fn outgoing(&self, id: NodeId) -> impl Iterator<Item = Edge> + '_ {
        self.graph.edges(NodeIndex::new(id)).map(|e| Edge {
            source: e.source().index(),
            target: e.target().index(),
            max_height: *e.weight(),
        })
    }

    /// All nodes standing in `group`, in placement order.
    pub fn nodes_in_group(&self, group: GroupId) -> &[NodeId] {
        self.group_map
            .get(&group)
            .map(|nodes| nodes.as_slice())
            .unwrap_or(&[])
    }
}
