pub mod centroid_tracker;
pub mod detection;
pub mod mask_detector;
