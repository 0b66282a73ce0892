pub mod memory_event_store;
