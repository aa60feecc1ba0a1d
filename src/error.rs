//! Error types for building grids, graphs and schedulers.
//!
//! Searches themselves never fail with an error: an unreachable goal is reported through
//! `success = false` together with the best available approach path.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NavError {
    #[error("Invalid grid configuration: {0}")]
    InvalidGrid(String),

    #[error("Waypoint {source_node} connects to unknown waypoint {target}")]
    UnknownWaypoint { source_node: usize, target: usize },

    #[error("Region {0:?} does not overlap the grid")]
    EmptyRegion((i32, i32, i32, i32)),

    #[error("Could not start search workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, NavError>;
