use criterion::{criterion_group, criterion_main, Criterion};
use grid_nav::config::{GridConfig, SchedulerConfig, WaypointConfig};
use grid_nav::grid_search::find_grid_path;
use grid_nav::graph_search::find_graph_path;
use grid_nav::search::SearchScratch;
use grid_nav::{OccupancyGrid, PathRequest, Scheduler, SearchKind, Vec2, WaypointGraph};
use grid_util::point::Point;
use rand::prelude::*;
use std::hint::black_box;

const N: usize = 64;

fn random_grid(rng: &mut StdRng) -> OccupancyGrid {
    let mut traversable: Vec<bool> = (0..N * N).map(|_| !rng.gen_bool(0.25)).collect();
    traversable[0] = true;
    traversable[N * N - 1] = true;
    OccupancyGrid::from_traversable(GridConfig::unit(N, N), traversable).unwrap()
}

/// Waypoints on a coarse lattice, connected to their right and upper neighbours.
fn lattice(grid: &OccupancyGrid) -> WaypointGraph {
    let mut config = WaypointConfig::default();
    let step = 4;
    let side = N / step;
    for y in 0..side {
        for x in 0..side {
            let id = config.add_node(Vec2::new((x * step) as f32 + 0.5, (y * step) as f32 + 0.5));
            if x > 0 {
                config.connect(id - 1, id, 0, false);
            }
            if y > 0 {
                config.connect(id - side, id, 0, false);
            }
        }
    }
    WaypointGraph::new(&config, grid).unwrap()
}

fn grid_search_bench(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let grids: Vec<OccupancyGrid> = (0..20).map(|_| random_grid(&mut rng)).collect();
    let mut scratch = SearchScratch::new(N * N);
    let end = Point::new(N as i32 - 1, N as i32 - 1);
    c.bench_function(format!("grid {N}x{N}, corner to corner").as_str(), |b| {
        b.iter(|| {
            for grid in &grids {
                black_box(find_grid_path(grid, Point::new(0, 0), end, &mut scratch));
            }
        })
    });
}

fn graph_search_bench(c: &mut Criterion) {
    let grid = OccupancyGrid::new(GridConfig::unit(N, N), &|_: Vec2, _: f32| false).unwrap();
    let graph = lattice(&grid);
    let mut scratch = SearchScratch::new(graph.len());
    let (start, end) = (Vec2::new(0.5, 0.5), Vec2::new(N as f32 - 3.5, N as f32 - 3.5));
    c.bench_function("waypoint lattice, corner to corner", |b| {
        b.iter(|| black_box(find_graph_path(&grid, &graph, start, end, &mut scratch)))
    });
}

fn scheduler_bench(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);
    let mut grid = random_grid(&mut rng);
    let graph = lattice(&grid);
    let config = SchedulerConfig {
        max_dispatch_per_tick: 16,
        worker_threads: 0,
    };
    let mut scheduler = Scheduler::new(config, &mut grid, &graph).unwrap();
    let requests: Vec<PathRequest> = (0..64)
        .map(|_| {
            let start = Vec2::new(rng.gen_range(0.0..N as f32), rng.gen_range(0.0..N as f32));
            let end = Vec2::new(rng.gen_range(0.0..N as f32), rng.gen_range(0.0..N as f32));
            PathRequest::grid(start, end)
        })
        .collect();
    c.bench_function("scheduler, 64 grid requests at 16 per tick", |b| {
        b.iter(|| {
            let tickets: Vec<_> = requests
                .iter()
                .map(|&request| scheduler.submit_ticket(request))
                .collect();
            while scheduler.in_flight_len() > 0 || scheduler.queued_len(SearchKind::Grid) > 0 {
                scheduler.tick();
            }
            black_box(tickets)
        })
    });
}

criterion_group!(benches, grid_search_bench, graph_search_bench, scheduler_bench);
criterion_main!(benches);
