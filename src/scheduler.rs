//! Budgeted dispatch of path searches.
//!
//! Every request moves through `Queued -> Dispatched -> Completed`. A request is dispatched right
//! away while its kind still has budget left in the current frame, otherwise it waits in a FIFO
//! queue for that kind. Dispatched searches run on a [rayon] thread pool against `Arc` snapshots of
//! the grid and graph, each with its own scratch memory, so no locks are involved.
//!
//! Results are only ever delivered from [tick](Scheduler::tick) (or teardown), never from inside
//! a submission. Within one kind they are delivered in dispatch order.
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::graph_search::find_graph_path;
use crate::grid_search::find_grid_path;
use crate::occupancy::{GridChange, OccupancyGrid};
use crate::search::{ReversePath, SearchScratch};
use crate::waypoint_graph::WaypointGraph;
use crate::Vec2;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchKind {
    /// Cell by cell over the occupancy grid.
    Grid,
    /// Over the waypoint graph.
    Graph,
}

impl SearchKind {
    pub const ALL: [SearchKind; 2] = [SearchKind::Grid, SearchKind::Graph];

    fn index(self) -> usize {
        match self {
            SearchKind::Grid => 0,
            SearchKind::Graph => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathRequest {
    pub kind: SearchKind,
    pub start: Vec2,
    pub end: Vec2,
}

impl PathRequest {
    pub fn grid(start: Vec2, end: Vec2) -> PathRequest {
        PathRequest {
            kind: SearchKind::Grid,
            start,
            end,
        }
    }

    pub fn graph(start: Vec2, end: Vec2) -> PathRequest {
        PathRequest {
            kind: SearchKind::Graph,
            start,
            end,
        }
    }
}

/// A delivered path in travel order.
///
/// Grid paths hold cell indices (the turning points, start cell excluded); graph paths hold
/// waypoint ids. When `success` is false the path is the best approach found, possibly empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathResult {
    pub path: Vec<usize>,
    pub success: bool,
}

impl PathResult {
    pub fn failed() -> PathResult {
        PathResult::default()
    }
}

impl From<ReversePath> for PathResult {
    fn from(reverse: ReversePath) -> PathResult {
        let (path, success) = reverse.into_forward();
        PathResult { path, success }
    }
}

/// Receiving end of a [submit_ticket](Scheduler::submit_ticket) submission.
#[derive(Debug)]
pub struct PathTicket {
    rx: Receiver<PathResult>,
}

impl PathTicket {
    /// The result, if a tick has delivered it.
    pub fn try_recv(&self) -> Option<PathResult> {
        self.rx.try_recv().ok()
    }

    /// Blocks until the result is delivered. Delivery happens in [Scheduler::tick] or at
    /// teardown, so this must not be called from the thread driving the scheduler before the
    /// scheduler is shut down. Returns `None` if the scheduler went away without delivering.
    pub fn wait(self) -> Option<PathResult> {
        self.rx.recv().ok()
    }
}

type Callback = Box<dyn FnOnce(PathResult) + Send + 'static>;

enum Completion {
    Callback(Callback),
    Channel(Sender<PathResult>),
}

impl Completion {
    fn deliver(self, result: PathResult) {
        match self {
            Completion::Callback(callback) => callback(result),
            Completion::Channel(tx) => {
                // The ticket may have been dropped.
                let _ = tx.send(result);
            }
        }
    }
}

struct Pending {
    id: u64,
    request: PathRequest,
    completion: Completion,
}

struct TaskOutput {
    result: std::thread::Result<ReversePath>,
    scratch: SearchScratch<i32>,
}

struct InFlight {
    id: u64,
    completion: Completion,
    rx: Receiver<TaskOutput>,
}

/// Queue, in-flight tasks and frame budget of one search kind.
#[derive(Default)]
struct Lane {
    queue: VecDeque<Pending>,
    in_flight: VecDeque<InFlight>,
    dispatched: usize,
    scratch_pool: Vec<SearchScratch<i32>>,
}

impl Lane {
    fn take_scratch(&mut self) -> SearchScratch<i32> {
        self.scratch_pool
            .pop()
            .unwrap_or_else(|| SearchScratch::new(0))
    }

    /// Hands a finished task's result to its completion and keeps the scratch for reuse.
    fn complete(&mut self, id: u64, completion: Completion, output: TaskOutput) {
        self.scratch_pool.push(output.scratch);
        let result = match output.result {
            Ok(path) => PathResult::from(path),
            Err(_) => {
                error!("Path search {} panicked", id);
                PathResult::failed()
            }
        };
        debug!(
            "Completed path search {} (success: {}, {} nodes)",
            id,
            result.success,
            result.path.len()
        );
        completion.deliver(result);
    }

    /// Completes finished tasks from the front of the lane, stopping at the first one still
    /// running. Returns the number of deliveries.
    fn poll(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(task) = self.in_flight.front() {
            match task.rx.try_recv() {
                Ok(output) => {
                    if let Some(task) = self.in_flight.pop_front() {
                        self.complete(task.id, task.completion, output);
                        delivered += 1;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if let Some(task) = self.in_flight.pop_front() {
                        error!("Path search {} vanished without a result", task.id);
                        task.completion.deliver(PathResult::failed());
                        delivered += 1;
                    }
                }
            }
        }
        delivered
    }
}

fn run_search(
    grid: &OccupancyGrid,
    graph: &WaypointGraph,
    request: &PathRequest,
    scratch: &mut SearchScratch<i32>,
) -> ReversePath {
    match request.kind {
        SearchKind::Grid => find_grid_path(
            grid,
            grid.world_to_grid(request.start),
            grid.world_to_grid(request.end),
            scratch,
        ),
        SearchKind::Graph => find_graph_path(grid, graph, request.start, request.end, scratch),
    }
}

/// Dispatches path requests under a per-tick budget and delivers their results.
pub struct Scheduler {
    config: SchedulerConfig,
    pool: rayon::ThreadPool,
    grid: Arc<OccupancyGrid>,
    graph: Arc<WaypointGraph>,
    version: u64,
    changes: Receiver<GridChange>,
    lanes: [Lane; 2],
    next_id: u64,
}

impl Scheduler {
    /// Copies the grid and graph into snapshots and subscribes to changes of `grid`.
    pub fn new(
        config: SchedulerConfig,
        grid: &mut OccupancyGrid,
        graph: &WaypointGraph,
    ) -> Result<Scheduler> {
        let mut config = config;
        if config.max_dispatch_per_tick == 0 {
            warn!("max_dispatch_per_tick of 0 would never dispatch, using 1");
            config.max_dispatch_per_tick = 1;
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("grid-nav-{}", i))
            .build()?;
        info!(
            "Starting scheduler with {} workers and {} dispatches per tick",
            pool.current_num_threads(),
            config.max_dispatch_per_tick
        );
        Ok(Scheduler {
            config,
            pool,
            changes: grid.subscribe(),
            grid: Arc::new(grid.snapshot()),
            graph: Arc::new(graph.clone()),
            version: 0,
            lanes: Default::default(),
            next_id: 0,
        })
    }

    /// Queues a request whose callback fires from a later [tick](Self::tick).
    pub fn submit<F>(&mut self, request: PathRequest, callback: F)
    where
        F: FnOnce(PathResult) + Send + 'static,
    {
        self.enqueue(request, Completion::Callback(Box::new(callback)));
    }

    /// Queues a request whose result arrives on the returned ticket.
    pub fn submit_ticket(&mut self, request: PathRequest) -> PathTicket {
        let (tx, rx) = mpsc::channel();
        self.enqueue(request, Completion::Channel(tx));
        PathTicket { rx }
    }

    /// Runs a search on the calling thread, ignoring the budget.
    pub fn find_path_blocking(&mut self, request: PathRequest) -> PathResult {
        self.sync_snapshots();
        let lane = &mut self.lanes[request.kind.index()];
        let mut scratch = lane.take_scratch();
        let path = run_search(&self.grid, &self.graph, &request, &mut scratch);
        lane.scratch_pool.push(scratch);
        PathResult::from(path)
    }

    /// Delivers finished searches, then opens a new frame budget and dispatches queued requests
    /// up to it. Returns the number of results delivered.
    pub fn tick(&mut self) -> usize {
        self.sync_snapshots();
        let mut delivered = 0;
        for kind in SearchKind::ALL {
            let lane = &mut self.lanes[kind.index()];
            delivered += lane.poll();
            lane.dispatched = 0;
            while self.lanes[kind.index()].dispatched < self.config.max_dispatch_per_tick {
                let Some(pending) = self.lanes[kind.index()].queue.pop_front() else {
                    break;
                };
                self.dispatch(pending);
            }
        }
        delivered
    }

    /// Replaces the graph snapshot, assigning node groups from the current grid snapshot.
    pub fn replace_graph(&mut self, graph: &WaypointGraph) {
        let mut graph = graph.clone();
        graph.assign_groups(&self.grid);
        self.graph = Arc::new(graph);
        self.version += 1;
        info!("Published graph snapshot version {}", self.version);
    }

    /// Number of snapshot versions published since startup.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn grid(&self) -> &Arc<OccupancyGrid> {
        &self.grid
    }

    pub fn graph(&self) -> &Arc<WaypointGraph> {
        &self.graph
    }

    /// Searches dispatched but not yet delivered, over both kinds.
    pub fn in_flight_len(&self) -> usize {
        self.lanes.iter().map(|lane| lane.in_flight.len()).sum()
    }

    pub fn queued_len(&self, kind: SearchKind) -> usize {
        self.lanes[kind.index()].queue.len()
    }

    /// Waits for every running search and runs every queued one, delivering all results.
    pub fn shutdown(mut self) {
        self.finish_all();
    }

    fn finish_all(&mut self) {
        let outstanding = self.in_flight_len()
            + self.lanes.iter().map(|lane| lane.queue.len()).sum::<usize>();
        if outstanding > 0 {
            info!("Finishing {} outstanding path searches", outstanding);
        }
        for lane in self.lanes.iter_mut() {
            while let Some(task) = lane.in_flight.pop_front() {
                match task.rx.recv() {
                    Ok(output) => lane.complete(task.id, task.completion, output),
                    Err(_) => {
                        error!("Path search {} vanished without a result", task.id);
                        task.completion.deliver(PathResult::failed());
                    }
                }
            }
            while let Some(pending) = lane.queue.pop_front() {
                let mut scratch = lane.take_scratch();
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_search(&self.grid, &self.graph, &pending.request, &mut scratch)
                }));
                lane.complete(pending.id, pending.completion, TaskOutput { result, scratch });
            }
        }
    }

    fn enqueue(&mut self, request: PathRequest, completion: Completion) {
        self.sync_snapshots();
        let id = self.next_id;
        self.next_id += 1;
        let pending = Pending {
            id,
            request,
            completion,
        };
        let lane = &mut self.lanes[request.kind.index()];
        if lane.dispatched < self.config.max_dispatch_per_tick && lane.queue.is_empty() {
            self.dispatch(pending);
        } else {
            debug!("Queued path search {} ({:?})", id, request.kind);
            lane.queue.push_back(pending);
        }
    }

    fn dispatch(&mut self, pending: Pending) {
        let Pending {
            id,
            request,
            completion,
        } = pending;
        let lane = &mut self.lanes[request.kind.index()];
        let mut scratch = lane.take_scratch();
        let grid = Arc::clone(&self.grid);
        let graph = Arc::clone(&self.graph);
        let (tx, rx) = mpsc::channel();
        self.pool.spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                run_search(&grid, &graph, &request, &mut scratch)
            }));
            // The scheduler may be gone already.
            let _ = tx.send(TaskOutput { result, scratch });
        });
        lane.in_flight.push_back(InFlight { id, completion, rx });
        lane.dispatched += 1;
        debug!(
            "Dispatched path search {} ({:?} from {} to {})",
            id, request.kind, request.start, request.end
        );
    }

    /// Mirrors grid changes into a new snapshot version. Running searches keep the version they
    /// started with.
    fn sync_snapshots(&mut self) {
        while let Ok(change) = self.changes.try_recv() {
            match change {
                GridChange::Traversability(patch) => {
                    Arc::make_mut(&mut self.grid).apply_patch(&patch);
                }
                GridChange::Rebuilt(grid) => {
                    self.grid = grid;
                    Arc::make_mut(&mut self.graph).assign_groups(&self.grid);
                }
            }
            self.version += 1;
            info!("Published grid snapshot version {}", self.version);
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.finish_all();
    }
}
