//! Core engine for mask-compliance monitoring.
//!
//! Turns raw per-frame face/label observations into stable, de-duplicated,
//! time-bounded alerts, and manages long-running video analysis as trackable
//! background jobs. Detection/classification models, durable event storage,
//! and file storage are external collaborators behind ports; this crate owns
//! the tracking, gating, session, and job logic between them.

pub mod alerting;
pub mod annotate;
pub mod detection;
pub mod events;
pub mod jobs;
pub mod pipeline;
pub mod session;
pub mod shared;
pub mod storage;
pub mod video;
