use grid_nav::config::{GridConfig, SchedulerConfig, WaypointConfig};
use grid_nav::{waypoints_to_path, OccupancyGrid, PathRequest, Scheduler, Vec2, WaypointGraph};
use std::thread;
use std::time::Duration;

// A side-on level with a floor and a low wall:
// ..........
// ..........
// ....#.....
// S...#...E.
// ##########
// The grid route climbs over the wall, the waypoint route follows the connections.
fn main() {
    let blocked = |p: Vec2, _: f32| p.y < 1.0 || (p.x.floor() == 4.0 && p.y < 3.0);
    let mut grid = OccupancyGrid::new(GridConfig::unit(10, 5).with_walkable_height(1), &blocked)
        .expect("valid grid");
    print!("{}", grid);

    let mut waypoints = WaypointConfig::default();
    let left = waypoints.add_node(Vec2::new(1.5, 1.5));
    let top = waypoints.add_node(Vec2::new(4.5, 3.5));
    let right = waypoints.add_node(Vec2::new(8.5, 1.5));
    waypoints.connect(left, top, 2, false);
    waypoints.connect(top, right, 2, false);
    let graph = WaypointGraph::new(&waypoints, &grid).expect("valid waypoints");

    let mut scheduler =
        Scheduler::new(SchedulerConfig::default(), &mut grid, &graph).expect("thread pool");
    let (start, end) = (Vec2::new(0.5, 1.5), Vec2::new(8.5, 1.5));
    let grid_ticket = scheduler.submit_ticket(PathRequest::grid(start, end));
    scheduler.submit(PathRequest::graph(start, end), |result| {
        println!("Waypoint path (success: {}): {:?}", result.success, result.path);
    });

    // The host loop.
    loop {
        scheduler.tick();
        if scheduler.in_flight_len() == 0 {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }

    if let Some(result) = grid_ticket.try_recv() {
        let mut points = vec![grid.world_to_grid(start)];
        points.extend(result.path.iter().map(|&ix| grid.point(ix)));
        println!("Grid path (success: {}):", result.success);
        for p in waypoints_to_path(points) {
            println!("{:?}", p);
        }
    }
}
