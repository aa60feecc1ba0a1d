use grid_nav::config::{GridConfig, SchedulerConfig, WaypointConfig};
use grid_nav::occupancy::Region;
use grid_nav::{OccupancyGrid, PathRequest, PathResult, Scheduler, SearchKind, Vec2, WaypointGraph};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// 40x6 level with a floor and a row of waypoints every 4 cells, chained together.
fn setup(budget: usize) -> (OccupancyGrid, Scheduler) {
    let mut grid = OccupancyGrid::new(
        GridConfig::unit(40, 6).with_walkable_height(2),
        &|p: Vec2, _: f32| p.y < 1.0,
    )
    .unwrap();
    let mut config = WaypointConfig::default();
    for i in 0..10 {
        let id = config.add_node(Vec2::new(i as f32 * 4.0 + 1.5, 1.5));
        if id > 0 {
            config.connect(id - 1, id, 2, false);
        }
    }
    let graph = WaypointGraph::new(&config, &grid).unwrap();
    let config = SchedulerConfig {
        max_dispatch_per_tick: budget,
        worker_threads: 3,
    };
    let scheduler = Scheduler::new(config, &mut grid, &graph).unwrap();
    (grid, scheduler)
}

fn is_idle(scheduler: &Scheduler) -> bool {
    scheduler.in_flight_len() == 0 && SearchKind::ALL.iter().all(|&k| scheduler.queued_len(k) == 0)
}

fn run_until_idle(scheduler: &mut Scheduler) -> usize {
    let mut delivered = 0;
    for _ in 0..2000 {
        delivered += scheduler.tick();
        if is_idle(scheduler) {
            return delivered;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("requests were not delivered");
}

#[test]
fn one_dispatch_per_tick_and_submission_order() {
    let (_grid, mut scheduler) = setup(1);
    let delivered = Arc::new(Mutex::new(Vec::new()));
    for i in 0..3 {
        let delivered = Arc::clone(&delivered);
        let request = PathRequest::graph(Vec2::new(1.5, 1.5), Vec2::new(30.0 + i as f32, 1.5));
        scheduler.submit(request, move |result: PathResult| {
            delivered.lock().unwrap().push((i, result.success));
        });
    }
    assert_eq!(scheduler.queued_len(SearchKind::Graph), 2);
    assert_eq!(scheduler.queued_len(SearchKind::Grid), 0);
    for queued in [1, 0] {
        scheduler.tick();
        assert_eq!(scheduler.queued_len(SearchKind::Graph), queued);
    }
    run_until_idle(&mut scheduler);
    assert_eq!(
        *delivered.lock().unwrap(),
        vec![(0, true), (1, true), (2, true)]
    );
}

#[test]
fn mixed_kinds_all_complete_once() {
    let (_grid, mut scheduler) = setup(2);
    let count = Arc::new(Mutex::new(0));
    let mut tickets = Vec::new();
    for i in 0..20 {
        let start = Vec2::new(1.5, 1.5);
        let end = Vec2::new(2.0 * i as f32 + 0.5, 1.5);
        if i % 2 == 0 {
            tickets.push(scheduler.submit_ticket(PathRequest::grid(start, end)));
        } else {
            let count = Arc::clone(&count);
            scheduler.submit(PathRequest::graph(start, end), move |_| {
                *count.lock().unwrap() += 1;
            });
        }
    }
    assert_eq!(run_until_idle(&mut scheduler), 20);
    assert_eq!(*count.lock().unwrap(), 10);
    for ticket in tickets {
        assert!(ticket.try_recv().unwrap().success);
        // Exactly once.
        assert!(ticket.try_recv().is_none());
    }
}

#[test]
fn dropping_the_scheduler_delivers_pending_requests() {
    let (_grid, mut scheduler) = setup(1);
    let count = Arc::new(Mutex::new(0));
    for _ in 0..6 {
        let count = Arc::clone(&count);
        let request = PathRequest::grid(Vec2::new(1.5, 1.5), Vec2::new(38.5, 1.5));
        scheduler.submit(request, move |_| {
            *count.lock().unwrap() += 1;
        });
    }
    assert_eq!(*count.lock().unwrap(), 0);
    drop(scheduler);
    assert_eq!(*count.lock().unwrap(), 6);
}

#[test]
fn same_cell_request_completes_successfully() {
    let (_grid, mut scheduler) = setup(4);
    let ticket = scheduler.submit_ticket(PathRequest::grid(Vec2::new(5.5, 1.5), Vec2::new(5.7, 1.2)));
    run_until_idle(&mut scheduler);
    assert_eq!(
        ticket.try_recv(),
        Some(PathResult {
            path: Vec::new(),
            success: true
        })
    );
}

#[test]
fn in_flight_searches_keep_their_snapshot() {
    let (mut grid, mut scheduler) = setup(4);
    let request = PathRequest::grid(Vec2::new(1.5, 1.5), Vec2::new(38.5, 1.5));
    let before = scheduler.submit_ticket(request);
    // Wall the level off after the first search was dispatched.
    grid.refresh_region(Region::new(20, 0, 21, 6), &|_: Vec2, _: f32| true)
        .unwrap();
    let after = scheduler.submit_ticket(request);
    run_until_idle(&mut scheduler);
    assert!(before.try_recv().unwrap().success);
    assert!(!after.try_recv().unwrap().success);
    assert_eq!(scheduler.version(), 1);
}
