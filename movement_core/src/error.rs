//! Error taxonomy.
//!
//! - [`ConfigError`]  — malformed threshold configuration, fatal at construction.
//! - [`InvalidInput`] — per-frame input problems, always recovered locally.
//! - [`StageError`]   — failure surfaced by a pipeline [`Stage`](crate::stage::Stage).
//!
//! State machine rejections are not errors; see
//! [`RejectReason`](crate::state_machine::RejectReason).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `ThresholdSet` or classifier configuration violates an invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("threshold `{field}` must be finite and non-negative, got {value}")]
    NegativeOrNonFinite { field: &'static str, value: f64 },

    #[error("speed thresholds must be increasing: {0}")]
    SpeedOrdering(String),

    #[error("speed bands must overlap within the hysteresis margin: {0}")]
    BandOverlap(String),

    #[error("jump bbox shrink must lie in (0, 0.5), got {0}")]
    JumpShrinkRange(f64),

    #[error("jump duration min ({min}) must be less than max ({max})")]
    JumpDuration { min: u32, max: u32 },

    #[error("`{field}` must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        min: usize,
        value: usize,
    },

    #[error("confidence weights must sum to 1.0, got {0}")]
    WeightSum(f64),

    #[error("unknown preset `{0}` (available: default, aggressive, conservative)")]
    UnknownPreset(String),
}

/// Why a frame could not be turned into a valid feature record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidInput {
    /// The velocity provider returned no speed for this frame.
    MissingSpeed,
    /// Reported speed is negative.
    NegativeSpeed,
    /// A kinematic or silhouette value is NaN or infinite.
    NonFiniteSignal,
    /// Fewer than two silhouette samples in the trailing window.
    InsufficientSilhouette,
    /// Silhouette height is zero or negative.
    InvalidHeight,
    /// Timestamp earlier than the last frame seen for this entity.
    OutOfOrder,
    /// The session registry is full and the entity has no session.
    SessionCapacity,
}

impl InvalidInput {
    pub fn as_str(self) -> &'static str {
        match self {
            InvalidInput::MissingSpeed => "missing_speed",
            InvalidInput::NegativeSpeed => "negative_speed",
            InvalidInput::NonFiniteSignal => "non_finite_signal",
            InvalidInput::InsufficientSilhouette => "insufficient_silhouette",
            InvalidInput::InvalidHeight => "invalid_height",
            InvalidInput::OutOfOrder => "out_of_order",
            InvalidInput::SessionCapacity => "session_capacity",
        }
    }
}

impl fmt::Display for InvalidInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error("invalid input: {0}")]
    InvalidInput(InvalidInput),
}

impl From<InvalidInput> for StageError {
    fn from(reason: InvalidInput) -> Self {
        StageError::InvalidInput(reason)
    }
}
