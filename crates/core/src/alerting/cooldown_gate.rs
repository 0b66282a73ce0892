//! Cooldown-gated alert decisions.
//!
//! One gate serves exactly one stream (live session or video job); the
//! stream component of the (stream, track, label) triple is carried by
//! ownership, so records are keyed by (track, label) here.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::detection::domain::detection::{MaskLabel, TrackId};

pub struct CooldownGate {
    cooldown: Duration,
    violations: HashSet<MaskLabel>,
    last_alert: HashMap<(TrackId, MaskLabel), Duration>,
}

impl CooldownGate {
    pub fn new(cooldown: Duration, violations: HashSet<MaskLabel>) -> Self {
        Self {
            cooldown,
            violations,
            last_alert: HashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Applied atomically between frames; already-recorded alert times keep
    /// their original timestamps.
    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.cooldown = cooldown;
    }

    /// Decides whether this observation constitutes a new alert, recording
    /// `now` as the last alert time when it does.
    ///
    /// `now` is stream time: wall-clock elapsed for live sessions, media
    /// time for video jobs. Non-violation labels never alert and never
    /// touch the table. A detection without a track identity cannot be
    /// de-duplicated and is always alert-worthy.
    pub fn should_alert(&mut self, track: Option<TrackId>, label: MaskLabel, now: Duration) -> bool {
        if !self.violations.contains(&label) {
            return false;
        }
        let Some(track) = track else {
            return true;
        };

        match self.last_alert.get_mut(&(track, label)) {
            None => {
                self.last_alert.insert((track, label), now);
                true
            }
            Some(last) if now.saturating_sub(*last) >= self.cooldown => {
                *last = now;
                true
            }
            Some(_) => false,
        }
    }

    /// Drops cooldown records for evicted tracks. Their ids are never
    /// reused, so a reappearing face starts a fresh cooldown history.
    pub fn evict_tracks(&mut self, evicted: &[TrackId]) {
        if evicted.is_empty() {
            return;
        }
        self.last_alert.retain(|(track, _), _| !evicted.contains(track));
    }

    pub fn record_count(&self) -> usize {
        self.last_alert.len()
    }
}
