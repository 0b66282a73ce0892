pub mod heuristic_detector;
pub mod shared_detector;
