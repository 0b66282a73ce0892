pub mod file_snapshot_store;
