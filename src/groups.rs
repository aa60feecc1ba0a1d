//! Ground groups: maximal sets of walkable cells that can reach each other through traversable
//! cells. Endpoints in different groups can never be connected by a walking route, which lets the
//! graph search reject them without expanding anything.
use crate::occupancy::OccupancyGrid;
use crate::GroupId;
use grid_util::point::Point;
use log::info;
use std::collections::VecDeque;

impl OccupancyGrid {
    /// Flood fills the grid in row-major order. Each unvisited walkable cell opens a new group
    /// that spreads over 8-neighbours (honouring corner-cut suppression). Traversable cells that
    /// are not walkable are labelled 0 and end the flood there.
    pub fn generate_ground_groups(&mut self) {
        info!("Generating ground groups");
        let len = self.len();
        let mut explored = vec![false; len];
        let mut queue: VecDeque<usize> = VecDeque::new();
        let mut current_group: GroupId = 0;
        for cell in self.cells.iter_mut() {
            cell.group = 0;
        }

        for ix in 0..len {
            if explored[ix] {
                continue;
            }
            explored[ix] = true;
            if !self.traversable[ix] || !self.walkable[ix] {
                continue;
            }
            current_group += 1;
            self.cells[ix].group = current_group;
            queue.push_back(ix);

            while let Some(explore_ix) = queue.pop_front() {
                let point = self.cells[explore_ix].pos;
                for n in self.neighbourhood_points(&point) {
                    let n_ix = self.get_ix_point(&n);
                    if explored[n_ix] {
                        continue;
                    }
                    explored[n_ix] = true;
                    if self.walkable[n_ix] {
                        self.cells[n_ix].group = current_group;
                        queue.push_back(n_ix);
                    } else {
                        self.cells[n_ix].group = 0;
                    }
                }
            }
        }
        self.group_count = current_group;
        self.groups_dirty = false;
        info!("Found {} ground groups", current_group);
    }

    /// Checks if start and goal stand in the same ground group.
    pub fn reachable(&self, start: &Point, goal: &Point) -> bool {
        let group = self.group_at(start);
        group != 0 && group == self.group_at(goal)
    }

    /// Checks if start and goal do not stand in the same ground group.
    pub fn unreachable(&self, start: &Point, goal: &Point) -> bool {
        !self.reachable(start, goal)
    }
}
