//! Fundamental types used across the entire workspace.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifier types — newtype wrappers so IDs are never confused at compile time
// ---------------------------------------------------------------------------

/// Identifier of one tracked player.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Movement states
// ---------------------------------------------------------------------------

/// Biomechanical movement state of a player.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MovementState {
    #[default]
    Idle,
    Walking,
    Running,
    Jumping,
    /// Transient state entered only from `Jumping`.
    Landing,
}

impl MovementState {
    /// All states, in declaration order. Used for deterministic tallies.
    pub const ALL: [MovementState; 5] = [
        MovementState::Idle,
        MovementState::Walking,
        MovementState::Running,
        MovementState::Jumping,
        MovementState::Landing,
    ];

    /// Dense index in [`MovementState::ALL`].
    pub fn index(self) -> usize {
        match self {
            MovementState::Idle => 0,
            MovementState::Walking => 1,
            MovementState::Running => 2,
            MovementState::Jumping => 3,
            MovementState::Landing => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementState::Idle => "idle",
            MovementState::Walking => "walking",
            MovementState::Running => "running",
            MovementState::Jumping => "jumping",
            MovementState::Landing => "landing",
        }
    }

    /// Ground locomotion states, i.e. everything except the airborne phase.
    pub fn is_locomotion(self) -> bool {
        matches!(
            self,
            MovementState::Idle | MovementState::Walking | MovementState::Running
        )
    }
}

impl fmt::Display for MovementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-state counters with a fixed, serializable layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub idle: u64,
    pub walking: u64,
    pub running: u64,
    pub jumping: u64,
    pub landing: u64,
}

impl StateCounts {
    pub fn increment(&mut self, state: MovementState) {
        *self.get_mut(state) += 1;
    }

    pub fn get(&self, state: MovementState) -> u64 {
        match state {
            MovementState::Idle => self.idle,
            MovementState::Walking => self.walking,
            MovementState::Running => self.running,
            MovementState::Jumping => self.jumping,
            MovementState::Landing => self.landing,
        }
    }

    fn get_mut(&mut self, state: MovementState) -> &mut u64 {
        match state {
            MovementState::Idle => &mut self.idle,
            MovementState::Walking => &mut self.walking,
            MovementState::Running => &mut self.running,
            MovementState::Jumping => &mut self.jumping,
            MovementState::Landing => &mut self.landing,
        }
    }

    pub fn total(&self) -> u64 {
        self.idle + self.walking + self.running + self.jumping + self.landing
    }
}

// ---------------------------------------------------------------------------
// Upstream inputs
// ---------------------------------------------------------------------------

/// Kinematics reported by the velocity provider for one entity and frame.
///
/// `None` is an explicit "no data" answer and is never read as zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KinematicsSnapshot {
    /// Instantaneous speed (m/s, ≥ 0)
    pub speed: Option<f64>,
    /// Smoothed speed (m/s)
    pub speed_smoothed: Option<f64>,
    /// Signed acceleration (m/s²)
    pub acceleration: Option<f64>,
}

impl KinematicsSnapshot {
    /// Snapshot with every field present.
    pub fn complete(speed: f64, speed_smoothed: f64, acceleration: f64) -> Self {
        Self {
            speed: Some(speed),
            speed_smoothed: Some(speed_smoothed),
            acceleration: Some(acceleration),
        }
    }

    /// Snapshot carrying only an instantaneous speed.
    pub fn speed_only(speed: f64) -> Self {
        Self {
            speed: Some(speed),
            ..Default::default()
        }
    }
}

/// One frame of upstream observations for one entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameInput {
    /// Frame index in the source video (monotonic, gaps allowed)
    pub frame: u64,
    /// Timestamp in seconds
    pub timestamp: f64,
    pub kinematics: KinematicsSnapshot,
    /// Silhouette (bounding box) height for this frame, pixels or normalised
    pub silhouette_height: Option<f64>,
}

impl FrameInput {
    pub fn new(
        frame: u64,
        timestamp: f64,
        kinematics: KinematicsSnapshot,
        silhouette_height: Option<f64>,
    ) -> Self {
        Self {
            frame,
            timestamp,
            kinematics,
            silhouette_height,
        }
    }
}

/// Upstream velocity-estimation collaborator.
pub trait KinematicsSource {
    /// Kinematics of `entity` at `frame`, or `None` when the provider has no data.
    fn kinematics_at(&self, entity: EntityId, frame: u64) -> Option<KinematicsSnapshot>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
