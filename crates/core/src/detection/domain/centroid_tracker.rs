//! Centroid-based single-stream tracker.
//!
//! Assigns stable identities to faces re-observed across frames by greedy
//! nearest-centroid matching. One tracker instance serves exactly one
//! stream and is single-writer; no synchronization is needed.

use crate::detection::domain::detection::{Detection, MaskLabel, TrackId, TrackedDetection};

#[derive(Clone, Debug)]
struct TrackState {
    id: TrackId,
    centroid: (f64, f64),
    label: MaskLabel,
    last_seen_frame: u64,
    missed_count: usize,
}

/// Result of one tracker update: detections with assigned identities (input
/// order preserved) plus the tracks that were permanently forgotten.
#[derive(Clone, Debug, Default)]
pub struct TrackerUpdate {
    pub tracked: Vec<TrackedDetection>,
    pub evicted: Vec<TrackId>,
}

pub struct CentroidTracker {
    tracks: Vec<TrackState>,
    next_id: u64,
    match_distance: f64,
    max_missed: usize,
}

impl CentroidTracker {
    pub fn new(match_distance: f64, max_missed: usize) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            match_distance,
            max_missed,
        }
    }

    /// Matches detections against existing tracks and updates track state.
    ///
    /// Matching is mutually exclusive: each track takes at most one
    /// detection and vice versa, closest pairs first. Exact distance ties
    /// resolve by track insertion order. Unmatched detections open new
    /// tracks; tracks unmatched for more than `max_missed` consecutive
    /// frames are evicted and their ids are never reused.
    pub fn update(&mut self, detections: &[Detection], frame_index: u64) -> TrackerUpdate {
        let mut assigned: Vec<Option<TrackId>> = vec![None; detections.len()];
        let mut track_matched = vec![false; self.tracks.len()];

        for (ti, di) in self.match_pairs(detections) {
            self.apply_match(ti, &detections[di], frame_index);
            track_matched[ti] = true;
            assigned[di] = Some(self.tracks[ti].id);
        }

        for (di, slot) in assigned.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(self.register(&detections[di], frame_index));
            }
        }

        let evicted = self.age_unmatched(&track_matched);

        let tracked = detections
            .iter()
            .zip(assigned)
            .map(|(det, id)| TrackedDetection {
                detection: det.clone(),
                track_id: id.expect("every detection is assigned a track"),
            })
            .collect();

        TrackerUpdate { tracked, evicted }
    }

    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Greedy matching: all (track, detection) pairs within the distance
    /// threshold, closest first, each side used at most once. The pair list
    /// is generated track-major, so the stable sort keeps insertion order
    /// for equal distances.
    fn match_pairs(&self, detections: &[Detection]) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                let dist = euclidean(track.centroid, det.bbox.centroid());
                if dist <= self.match_distance {
                    pairs.push((ti, di, dist));
                }
            }
        }
        pairs.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut used_tracks = vec![false; self.tracks.len()];
        let mut used_dets = vec![false; detections.len()];
        let mut matches = Vec::new();

        for (ti, di, _) in pairs {
            if !used_tracks[ti] && !used_dets[di] {
                used_tracks[ti] = true;
                used_dets[di] = true;
                matches.push((ti, di));
            }
        }
        matches
    }

    fn apply_match(&mut self, track_idx: usize, det: &Detection, frame_index: u64) {
        let track = &mut self.tracks[track_idx];
        track.centroid = det.bbox.centroid();
        track.label = det.label;
        track.last_seen_frame = frame_index;
        track.missed_count = 0;
    }

    fn register(&mut self, det: &Detection, frame_index: u64) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        self.tracks.push(TrackState {
            id,
            centroid: det.bbox.centroid(),
            label: det.label,
            last_seen_frame: frame_index,
            missed_count: 0,
        });
        id
    }

    /// Ages every track that went unmatched this frame and evicts those
    /// past the miss budget. `track_matched` is indexed by pre-update
    /// track position; freshly registered tracks are never aged here.
    fn age_unmatched(&mut self, track_matched: &[bool]) -> Vec<TrackId> {
        for (i, matched) in track_matched.iter().enumerate() {
            if !matched {
                self.tracks[i].missed_count += 1;
            }
        }

        let max_missed = self.max_missed;
        let mut evicted = Vec::new();
        self.tracks.retain(|t| {
            if t.missed_count > max_missed {
                evicted.push(t.id);
                false
            } else {
                true
            }
        });
        evicted
    }
}

fn euclidean(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}
