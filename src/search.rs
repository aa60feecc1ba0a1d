//! Generic A* shared by the grid and the graph searches.
//!
//! A [SearchSpace] provides neighbour expansion and the heuristic towards its goal; all per-search
//! state lives in a [SearchScratch] which can be reused between searches over spaces of the same
//! size. The canonical grid or graph is never written to.
use crate::heap::IndexedHeap;
use crate::N_SMALLVEC_SIZE;
use num_traits::{Bounded, Zero};
use smallvec::SmallVec;

pub type Successors<K> = SmallVec<[(usize, K); N_SMALLVEC_SIZE]>;

/// Something A* can search: dense node ids `0..node_count()`.
pub trait SearchSpace {
    type Cost: Zero + Bounded + Ord + Copy;

    fn node_count(&self) -> usize;

    /// Pushes every node reachable in one step from `node` together with the step cost. Nodes
    /// that can not be entered must be left out.
    fn successors(&self, node: usize, out: &mut Successors<Self::Cost>);

    /// Estimated remaining cost from `node` to the goal.
    fn heuristic(&self, node: usize) -> Self::Cost;
}

/// Working cost state of one node. `f` is always derived, never stored.
#[derive(Clone, Copy, Debug)]
pub struct NodeCost<K> {
    pub g: K,
    pub h: K,
    pub parent: usize,
}

impl<K: Zero + Copy> NodeCost<K> {
    pub fn f(&self) -> K {
        self.g + self.h
    }
}

/// Task-private memory of a search: the open heap, open and closed flags and the working costs.
#[derive(Clone, Debug)]
pub struct SearchScratch<K> {
    heap: IndexedHeap,
    open: Vec<bool>,
    closed: Vec<bool>,
    work: Vec<NodeCost<K>>,
    successors: Successors<K>,
}

impl<K: Zero + Bounded + Copy> SearchScratch<K> {
    pub fn new(capacity: usize) -> SearchScratch<K> {
        SearchScratch {
            heap: IndexedHeap::new(capacity),
            open: vec![false; capacity],
            closed: vec![false; capacity],
            work: vec![Self::unvisited(); capacity],
            successors: SmallVec::new(),
        }
    }

    fn unvisited() -> NodeCost<K> {
        NodeCost {
            g: K::max_value(),
            h: K::zero(),
            parent: usize::MAX,
        }
    }

    /// Clears all state and resizes to hold `capacity` nodes.
    pub fn reset(&mut self, capacity: usize) {
        self.heap.reset(capacity);
        self.open.clear();
        self.open.resize(capacity, false);
        self.closed.clear();
        self.closed.resize(capacity, false);
        self.work.clear();
        self.work.resize(capacity, Self::unvisited());
        self.successors.clear();
    }

    pub fn capacity(&self) -> usize {
        self.work.len()
    }

    pub fn cost(&self, node: usize) -> &NodeCost<K> {
        &self.work[node]
    }

    pub fn is_closed(&self, node: usize) -> bool {
        self.closed[node]
    }

    /// Walks the parent pointers from `from` back to `start`, yielding both ends.
    pub fn trace(&self, from: usize, start: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(from), move |&node| {
            if node == start {
                None
            } else {
                let parent = self.work[node].parent;
                (parent != usize::MAX).then_some(parent)
            }
        })
    }
}

/// How a search ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchOutcome<K> {
    /// Whether the goal was popped from the open set.
    pub reached: bool,
    /// The goal when reached, otherwise the opened node with the lowest heuristic, or the start
    /// when nothing was opened.
    pub target: usize,
    /// Accumulated cost to `target`.
    pub cost: K,
    /// Number of nodes taken from the open set.
    pub expanded: usize,
}

/// A reconstructed path as searches produce it: target first, walking back towards the start.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReversePath {
    pub nodes: Vec<usize>,
    pub success: bool,
}

impl ReversePath {
    pub fn failed() -> ReversePath {
        ReversePath::default()
    }

    /// Flips the path into travel order.
    pub fn into_forward(mut self) -> (Vec<usize>, bool) {
        self.nodes.reverse();
        (self.nodes, self.success)
    }
}

/// Runs A* from `start` towards `goal`.
///
/// A neighbour already open is only updated when the new path is strictly cheaper, in which case
/// its heap position is fixed with a decrease-key. Every newly opened node whose heuristic is lower
/// than any opened before becomes the fallback target used when the open set runs dry. The start
/// does not compete, so the first opened node is always a candidate.
pub fn astar<S: SearchSpace>(
    space: &S,
    start: usize,
    goal: usize,
    scratch: &mut SearchScratch<S::Cost>,
) -> SearchOutcome<S::Cost> {
    scratch.reset(space.node_count());
    let SearchScratch {
        heap,
        open,
        closed,
        work,
        successors,
    } = scratch;

    work[start] = NodeCost {
        g: Zero::zero(),
        h: space.heuristic(start),
        parent: usize::MAX,
    };
    heap.push(start, |i| work[i].f());
    open[start] = true;

    let mut best = start;
    let mut best_h = S::Cost::max_value();
    let mut expanded = 0;

    while let Some(current) = heap.pop(|i| work[i].f()) {
        open[current] = false;
        closed[current] = true;
        expanded += 1;
        if current == goal {
            return SearchOutcome {
                reached: true,
                target: goal,
                cost: work[goal].g,
                expanded,
            };
        }

        successors.clear();
        space.successors(current, successors);
        let current_g = work[current].g;
        for &(neighbour, step) in successors.iter() {
            if closed[neighbour] {
                continue;
            }
            let contains = open[neighbour];
            let new_g = current_g + step;
            if contains && new_g >= work[neighbour].g {
                continue;
            }
            let h = space.heuristic(neighbour);
            work[neighbour] = NodeCost {
                g: new_g,
                h,
                parent: current,
            };
            if contains {
                heap.decrease_key(neighbour, |i| work[i].f());
            } else {
                heap.push(neighbour, |i| work[i].f());
                open[neighbour] = true;
                if h < best_h {
                    best_h = h;
                    best = neighbour;
                }
            }
        }
    }
    SearchOutcome {
        reached: false,
        target: best,
        cost: work[best].g,
        expanded,
    }
}
