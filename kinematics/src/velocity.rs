//! Position-based velocity analysis.
//!
//! # Per query (entity, frame)
//! 1. Instantaneous speed: displacement against the oldest position within
//!    `speed_window` frames, divided by the elapsed time
//! 2. Smoothed speed: mean of the instantaneous speeds over `smoothing_window`
//!    frames ending at the query frame
//! 3. Acceleration: first difference of the smoothed speed per second
//!
//! Speeds above `max_speed` and accelerations beyond `max_acceleration` are
//! reported as absent, never clamped. A frame without a position has no
//! kinematics at all.

use movement_core::types::{EntityId, KinematicsSnapshot, KinematicsSource};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Configuration for [`VelocityAnalyzer`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VelocityConfig {
    /// Video frame rate
    pub fps: f64,
    /// Metres per position unit (1.0 for court coordinates in metres)
    pub meters_per_unit: f64,
    /// Physical speed ceiling (m/s)
    pub max_speed: f64,
    /// Physical acceleration ceiling (m/s², both signs)
    pub max_acceleration: f64,
    /// Look-back for the instantaneous speed baseline (frames)
    pub speed_window: u64,
    /// Frames averaged into the smoothed speed
    pub smoothing_window: u64,
    /// Positions retained per entity
    pub history_frames: usize,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            meters_per_unit: 1.0,
            max_speed: 12.0,
            max_acceleration: 5.0,
            speed_window: 3,
            smoothing_window: 5,
            history_frames: 300, // 10 s @ 30 fps
        }
    }
}

/// Per-entity position history with derived kinematics.
#[derive(Clone, Debug, Default)]
pub struct VelocityAnalyzer {
    pub config: VelocityConfig,
    tracks: HashMap<EntityId, BTreeMap<u64, Vector2<f64>>>,
}

impl VelocityAnalyzer {
    pub fn new(config: VelocityConfig) -> Self {
        Self {
            config,
            tracks: HashMap::new(),
        }
    }

    /// Record the court position of `entity` at `frame`.
    pub fn record(&mut self, entity: EntityId, frame: u64, position: Vector2<f64>) {
        let track = self.tracks.entry(entity).or_default();
        track.insert(frame, position);
        while track.len() > self.config.history_frames.max(1) {
            track.pop_first();
        }
    }

    pub fn position(&self, entity: EntityId, frame: u64) -> Option<Vector2<f64>> {
        self.tracks.get(&entity)?.get(&frame).copied()
    }

    // -----------------------------------------------------------------------
    // Derived quantities
    // -----------------------------------------------------------------------

    pub fn speed_at(&self, entity: EntityId, frame: u64) -> Option<f64> {
        let track = self.tracks.get(&entity)?;
        let current = track.get(&frame)?;
        let start = frame.saturating_sub(self.config.speed_window.max(1));
        let (&then, earlier) = track.range(start..frame).next()?;
        let dt = (frame - then) as f64 / self.config.fps;
        let speed = (current - earlier).norm() * self.config.meters_per_unit / dt;
        (speed <= self.config.max_speed).then_some(speed)
    }

    pub fn smoothed_speed_at(&self, entity: EntityId, frame: u64) -> Option<f64> {
        let first = frame.saturating_sub(self.config.smoothing_window.max(1) - 1);
        let speeds: Vec<f64> = (first..=frame)
            .filter_map(|f| self.speed_at(entity, f))
            .collect();
        if speeds.is_empty() {
            return None;
        }
        Some(speeds.iter().sum::<f64>() / speeds.len() as f64)
    }

    pub fn acceleration_at(&self, entity: EntityId, frame: u64) -> Option<f64> {
        let now = self.smoothed_speed_at(entity, frame)?;
        let before = self.smoothed_speed_at(entity, frame.checked_sub(1)?)?;
        let acceleration = (now - before) * self.config.fps;
        (acceleration.abs() <= self.config.max_acceleration).then_some(acceleration)
    }

    /// Path length (m) over consecutive recorded frames in `[from, to]`.
    pub fn distance_traveled(&self, entity: EntityId, from: u64, to: u64) -> f64 {
        let Some(track) = self.tracks.get(&entity) else {
            return 0.0;
        };
        let points: Vec<(u64, Vector2<f64>)> =
            track.range(from..=to).map(|(&f, &p)| (f, p)).collect();
        points
            .windows(2)
            .filter(|w| w[1].0 - w[0].0 == 1)
            .map(|w| (w[1].1 - w[0].1).norm() * self.config.meters_per_unit)
            .filter(|d| d * self.config.fps <= self.config.max_speed)
            .sum()
    }

    /// Highest plausible instantaneous speed over `[from, to]`.
    pub fn max_speed(&self, entity: EntityId, from: u64, to: u64) -> Option<f64> {
        (from..=to)
            .filter_map(|f| self.speed_at(entity, f))
            .reduce(f64::max)
    }
}

impl KinematicsSource for VelocityAnalyzer {
    fn kinematics_at(&self, entity: EntityId, frame: u64) -> Option<KinematicsSnapshot> {
        self.position(entity, frame)?;
        Some(KinematicsSnapshot {
            speed: self.speed_at(entity, frame),
            speed_smoothed: self.smoothed_speed_at(entity, frame),
            acceleration: self.acceleration_at(entity, frame),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
